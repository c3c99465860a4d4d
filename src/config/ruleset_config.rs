//! Rule Set configuration
//!
//! Loads the policy configuration from `stricture.toml` or
//! `.stricturerc.json` in the scan root, or from an explicit `--ruleset`
//! file.
//!
//! # Configuration Format
//!
//! ```toml
//! # stricture.toml
//!
//! [rules.param-count]
//! severity = "error"
//! thresholds = { max_params = 6 }
//!
//! [rules.generic-callable-name]
//! enabled = false
//!
//! [rules."file-size.uniform-exemption"]
//! enabled = false
//!
//! [metrics]
//! wrapper_io_allowance = 1
//!
//! [scan]
//! exclude = ["generated/**", "vendor/"]
//! workers = 8
//! timeout_secs = 300
//! fail_on = "error"
//! ```
//!
//! A file that exists but fails to parse or validate is fatal; the scan
//! does not start.

use crate::metrics::ExtractorConfig;
use crate::models::Severity;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Config file names searched in the scan root, in order
pub const CONFIG_FILE_NAMES: &[&str] = &["stricture.toml", ".stricturerc.json"];

/// Invalid or unreadable rule-set configuration. Always fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("rule '{rule}': {message}")]
    InvalidSeverity { rule: String, message: String },

    #[error("rule '{rule}': threshold '{key}' {message}")]
    InvalidThreshold {
        rule: String,
        key: String,
        message: String,
    },

    #[error("scan.{key}: {message}")]
    InvalidScanOption { key: String, message: String },

    #[error("unsupported config format for {} (expected .toml or .json)", path.display())]
    UnsupportedFormat { path: PathBuf },
}

/// Top-level configuration file
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RuleSetConfig {
    /// Per-rule overrides keyed by rule id (sub-rules included)
    #[serde(default)]
    pub rules: BTreeMap<String, RuleOverride>,

    #[serde(default)]
    pub metrics: ExtractorConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    /// File this configuration came from (not serialized)
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Configuration override for one rule or sub-rule
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RuleOverride {
    #[serde(default)]
    pub enabled: Option<bool>,

    /// error | warning | info
    #[serde(default)]
    pub severity: Option<String>,

    /// Rule-specific numeric overrides (max_lines, max_params, ...)
    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdValue>,
}

/// A threshold value as written in the file; only numbers are accepted
/// when a rule reads it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ThresholdValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
}

impl ThresholdValue {
    /// Non-negative whole number, if this value is one
    pub fn as_count(&self) -> Option<usize> {
        match self {
            ThresholdValue::Integer(v) if *v >= 0 => usize::try_from(*v).ok(),
            ThresholdValue::Float(v) if *v >= 0.0 && v.fract() == 0.0 => Some(*v as usize),
            _ => None,
        }
    }
}

/// `[scan]` section; CLI flags take precedence
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ScanConfig {
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub fail_on: Option<String>,
    #[serde(default)]
    pub cache: Option<bool>,
}

/// Discover and load configuration from the scan root.
///
/// Returns the default configuration when no file is present. A file that
/// exists but cannot be parsed is an error.
pub fn load_ruleset_config(root: &Path) -> Result<RuleSetConfig, ConfigError> {
    for name in CONFIG_FILE_NAMES {
        let path = root.join(name);
        if path.is_file() {
            return load_config_file(&path);
        }
    }
    debug!("No rule set config found in {}, using defaults", root.display());
    Ok(RuleSetConfig::default())
}

/// Load configuration from an explicit file; format is chosen by extension
pub fn load_config_file(path: &Path) -> Result<RuleSetConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let mut config: RuleSetConfig = match ext {
        "toml" => toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?,
        "json" => serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?,
        _ => {
            return Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };

    config.source = Some(path.to_path_buf());
    config.validate_scan()?;
    debug!("Loaded rule set config from {}", path.display());
    Ok(config)
}

impl RuleSetConfig {
    /// Override for a rule id, accepting `snake_case` and `kebab-case` keys
    pub fn rule(&self, id: &str) -> Option<&RuleOverride> {
        self.rules.get(id).or_else(|| {
            self.rules
                .iter()
                .find(|(key, _)| normalize_rule_id(key) == id)
                .map(|(_, v)| v)
        })
    }

    /// Enabled state; rules and sub-rules default to on
    pub fn is_enabled(&self, id: &str) -> bool {
        self.rule(id).and_then(|r| r.enabled).unwrap_or(true)
    }

    pub fn severity_override(&self, id: &str) -> Result<Option<Severity>, ConfigError> {
        match self.rule(id).and_then(|r| r.severity.as_deref()) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<Severity>()
                .map(Some)
                .map_err(|message| ConfigError::InvalidSeverity {
                    rule: id.to_string(),
                    message,
                }),
        }
    }

    /// Numeric threshold for a rule, or `default` when not configured
    pub fn threshold(&self, id: &str, key: &str, default: usize) -> Result<usize, ConfigError> {
        let Some(value) = self.rule(id).and_then(|r| r.thresholds.get(key)) else {
            return Ok(default);
        };
        value.as_count().ok_or_else(|| ConfigError::InvalidThreshold {
            rule: id.to_string(),
            key: key.to_string(),
            message: format!("must be a non-negative whole number, got {:?}", value),
        })
    }

    /// Configured fail threshold from `[scan] fail_on`
    pub fn fail_on(&self) -> Result<Option<Severity>, ConfigError> {
        self.scan
            .fail_on
            .as_deref()
            .map(|raw| {
                raw.parse::<Severity>()
                    .map_err(|message| ConfigError::InvalidScanOption {
                        key: "fail_on".to_string(),
                        message,
                    })
            })
            .transpose()
    }

    /// Whether a path (relative to the scan root) is excluded
    pub fn should_exclude(&self, path: &Path) -> bool {
        is_excluded(&self.scan.exclude, path)
    }

    fn validate_scan(&self) -> Result<(), ConfigError> {
        self.fail_on()?;
        ExcludeGlobs::new(&self.scan.exclude)?;
        if self.scan.workers == Some(0) {
            return Err(ConfigError::InvalidScanOption {
                key: "workers".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Compiled `[scan] exclude` globs.
///
/// `*` and `?` stay within one path segment and `**` spans segments. A
/// pattern also matches everything below a directory it names, so
/// `vendor/`, `vendor` and `vendor/**` are equivalent, while `vendor/**`
/// never matches `vendor_tools.py`.
#[derive(Debug, Clone)]
pub struct ExcludeGlobs {
    set: GlobSet,
}

impl ExcludeGlobs {
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            for expanded in expand_exclude(pattern) {
                let glob = GlobBuilder::new(&expanded)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| invalid_exclude(pattern, e))?;
                builder.add(glob);
            }
        }
        let set = builder.build().map_err(|e| invalid_exclude("", e))?;
        Ok(Self { set })
    }

    /// Whether a path relative to the scan root is excluded
    pub fn matches(&self, path: &Path) -> bool {
        let normalized = path.to_string_lossy().replace('\\', "/");
        self.set.is_match(normalized.trim_start_matches("./"))
    }
}

/// Whether a relative path matches any of the exclude globs.
/// Invalid patterns exclude nothing.
pub fn is_excluded(patterns: &[String], path: &Path) -> bool {
    match ExcludeGlobs::new(patterns) {
        Ok(globs) => globs.matches(path),
        Err(e) => {
            warn!("Ignoring exclude patterns: {}", e);
            false
        }
    }
}

/// The pattern itself plus the subtree below it when it can name a directory
fn expand_exclude(pattern: &str) -> Vec<String> {
    let base = pattern.trim().trim_start_matches("./").trim_end_matches('/');
    if base.is_empty() {
        return Vec::new();
    }
    if base == "**" || base.ends_with("/**") {
        return vec![base.to_string()];
    }
    vec![base.to_string(), format!("{}/**", base)]
}

fn invalid_exclude(pattern: &str, e: globset::Error) -> ConfigError {
    ConfigError::InvalidScanOption {
        key: "exclude".to_string(),
        message: format!("'{}': {}", pattern, e),
    }
}

/// Normalize a rule id for config lookup.
///
/// `ParamCount`, `param_count` and `param-count` all map to `param-count`;
/// the `.` separating a sub-rule is kept.
pub fn normalize_rule_id(name: &str) -> String {
    let mut result = String::new();
    let chars: Vec<char> = name.trim().chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_is_lower = i > 0 && chars[i - 1].is_lowercase();
            let is_acronym_end = i > 0
                && chars[i - 1].is_uppercase()
                && i + 1 < chars.len()
                && chars[i + 1].is_lowercase();
            if prev_is_lower || is_acronym_end {
                result.push('-');
            }
            result.extend(c.to_lowercase());
        } else if *c == '_' {
            result.push('-');
        } else {
            result.push(*c);
        }
    }

    result.trim_end_matches("-rule").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_rule_id() {
        assert_eq!(normalize_rule_id("param-count"), "param-count");
        assert_eq!(normalize_rule_id("param_count"), "param-count");
        assert_eq!(normalize_rule_id("ParamCountRule"), "param-count");
        assert_eq!(
            normalize_rule_id("file_size.uniform_exemption"),
            "file-size.uniform-exemption"
        );
    }

    fn excluded(pattern: &str, path: &str) -> bool {
        is_excluded(&[pattern.to_string()], Path::new(path))
    }

    #[test]
    fn test_exclude_globs() {
        assert!(excluded("generated/**", "generated/a/b.py"));
        assert!(excluded("**/vendor/**", "src/vendor/x.py"));
        assert!(excluded("**/vendor/**", "vendor/x.py"));
        assert!(excluded("*.pb.py", "api.pb.py"));
        assert!(excluded("build/", "build/out.py"));
        assert!(excluded("build", "build/out.py"));
        assert!(excluded("**/*.gen.py", "a/b/c.gen.py"));
        assert!(excluded("**/*.gen.py", "c.gen.py"));
        assert!(excluded("src/legacy.py", "src/legacy.py"));
        assert!(!excluded("build/", "rebuild/out.py"));
    }

    #[test]
    fn test_exclude_respects_segment_boundaries() {
        assert!(!excluded("generated/**", "generated_client.py"));
        assert!(!excluded("build/**", "buildtools.py"));
        assert!(!excluded("build", "build_steps/run.py"));
        assert!(!excluded("src/legacy.py", "src/legacy.py.bak"));
    }

    #[test]
    fn test_single_star_stays_in_one_segment() {
        assert!(excluded("*.py", "mod.py"));
        assert!(!excluded("*.py", "pkg/mod.py"));
        assert!(excluded("pkg/*_pb2.py", "pkg/user_pb2.py"));
        assert!(!excluded("pkg/*_pb2.py", "pkg/inner/user_pb2.py"));
        assert!(excluded("**/*.py", "pkg/mod.py"));
    }

    #[test]
    fn test_invalid_exclude_rejected() {
        let config: RuleSetConfig = toml::from_str(
            r#"
[scan]
exclude = ["src/[unclosed"]
"#,
        )
        .unwrap();
        let err = config.validate_scan().unwrap_err();
        assert!(err.to_string().contains("exclude"), "{}", err);
        assert!(!excluded("src/[unclosed", "src/app.py"));
    }

    #[test]
    fn test_threshold_value() {
        assert_eq!(ThresholdValue::Integer(42).as_count(), Some(42));
        assert_eq!(ThresholdValue::Float(6.0).as_count(), Some(6));
        assert_eq!(ThresholdValue::Float(2.5).as_count(), None);
        assert_eq!(ThresholdValue::Integer(-1).as_count(), None);
        assert_eq!(ThresholdValue::Boolean(true).as_count(), None);
    }

    #[test]
    fn test_default_config() {
        let config = RuleSetConfig::default();
        assert!(config.is_enabled("param-count"));
        assert!(config.is_enabled("file-size.uniform-exemption"));
        assert_eq!(config.severity_override("param-count").ok().flatten(), None);
        assert_eq!(config.threshold("param-count", "max_params", 4).ok(), Some(4));
        assert_eq!(config.metrics, ExtractorConfig::default());
    }

    #[test]
    fn test_parse_toml_config() {
        let content = r#"
[rules.param-count]
severity = "error"
thresholds = { max_params = 6 }

[rules.generic_callable_name]
enabled = false

[rules."file-size.uniform-exemption"]
enabled = false

[metrics]
wrapper_io_allowance = 2

[scan]
exclude = ["generated/**"]
workers = 4
fail_on = "error"
"#;
        let config: RuleSetConfig = toml::from_str(content).expect("valid toml");

        assert_eq!(
            config.severity_override("param-count").ok().flatten(),
            Some(Severity::Error)
        );
        assert_eq!(config.threshold("param-count", "max_params", 4).ok(), Some(6));
        assert!(!config.is_enabled("generic-callable-name"));
        assert!(!config.is_enabled("file-size.uniform-exemption"));
        assert_eq!(config.metrics.wrapper_io_allowance, 2);
        assert_eq!(config.metrics.wrapper_caller_allowance, 1);
        assert_eq!(config.fail_on().ok().flatten(), Some(Severity::Error));
        assert!(config.should_exclude(Path::new("generated/proto/x.py")));
        assert!(!config.should_exclude(Path::new("src/app.py")));
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let content = r#"
[rules.param-count]
severity = "critical"
thresholds = { max_params = "many" }
"#;
        let config: RuleSetConfig = toml::from_str(content).expect("valid toml");
        assert!(matches!(
            config.severity_override("param-count"),
            Err(ConfigError::InvalidSeverity { .. })
        ));
        assert!(matches!(
            config.threshold("param-count", "max_params", 4),
            Err(ConfigError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_load_discovers_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(".stricturerc.json"),
            r#"{"rules": {"nesting-depth": {"thresholds": {"max_nesting": 5}}}}"#,
        )
        .expect("write config");
        let config = load_ruleset_config(dir.path()).expect("load");
        assert_eq!(config.threshold("nesting-depth", "max_nesting", 3).ok(), Some(5));
        assert!(config.source.is_some());
    }

    #[test]
    fn test_broken_file_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("stricture.toml"), "[rules\nbroken").expect("write");
        assert!(matches!(
            load_ruleset_config(dir.path()),
            Err(ConfigError::Toml { .. })
        ));
        assert!(matches!(
            load_config_file(&dir.path().join("rules.yaml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
