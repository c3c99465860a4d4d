//! Configuration module for Stricture
//!
//! This module handles:
//! - Rule Set configuration (`stricture.toml` / `.stricturerc.json`)
//! - Rule enable/disable, severity and threshold overrides
//! - Metric extractor tunables and scan defaults

mod ruleset_config;

pub use ruleset_config::{
    is_excluded, load_config_file, load_ruleset_config, normalize_rule_id, ConfigError, ExcludeGlobs,
    RuleOverride, RuleSetConfig, ScanConfig, ThresholdValue, CONFIG_FILE_NAMES,
};
