//! File-level architecture rules: file size and mixed concerns

use super::{Rule, RuleScope, SubRule, UnitContext};
use crate::config::{ConfigError, RuleSetConfig};
use crate::metrics::category_name;
use crate::models::{Finding, Location, RuleCategory, Severity};

const FILE_SIZE: &str = "file-size";
const UNIFORM_EXEMPTION: &str = "file-size.uniform-exemption";
const MIXED_CONCERN: &str = "mixed-concern";

/// Thresholds for the file-size rule
#[derive(Debug, Clone)]
pub struct FileSizeThresholds {
    /// Body lines above this count are flagged
    pub max_lines: usize,
    /// Body lines above this count prompt a re-check even for uniform files
    pub recheck_lines: usize,
}

impl Default for FileSizeThresholds {
    fn default() -> Self {
        Self {
            max_lines: 500,
            recheck_lines: 1000,
        }
    }
}

/// Flags files that have grown past the soft size cap
#[derive(Debug, Clone)]
pub struct FileSizeRule {
    thresholds: FileSizeThresholds,
    uniform_exemption: bool,
}

impl Default for FileSizeRule {
    fn default() -> Self {
        Self {
            thresholds: FileSizeThresholds::default(),
            uniform_exemption: true,
        }
    }
}

impl FileSizeRule {
    pub fn with_config(config: &RuleSetConfig) -> Result<Self, ConfigError> {
        let defaults = FileSizeThresholds::default();
        Ok(Self {
            thresholds: FileSizeThresholds {
                max_lines: config.threshold(FILE_SIZE, "max_lines", defaults.max_lines)?,
                recheck_lines: config.threshold(
                    FILE_SIZE,
                    "recheck_lines",
                    defaults.recheck_lines,
                )?,
            },
            uniform_exemption: config.is_enabled(UNIFORM_EXEMPTION),
        })
    }
}

impl Rule for FileSizeRule {
    fn id(&self) -> &'static str {
        FILE_SIZE
    }

    fn description(&self) -> &'static str {
        "File body exceeds the line limit"
    }

    fn rationale(&self) -> &'static str {
        "Large files mix responsibilities and are hard to review; split them by concern."
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Architecture
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Unit
    }

    fn sub_rules(&self) -> &'static [SubRule] {
        &[SubRule {
            id: UNIFORM_EXEMPTION,
            description: "Files whose callables all share one structural category skip the size warning",
        }]
    }

    fn thresholds(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("max_lines", self.thresholds.max_lines),
            ("recheck_lines", self.thresholds.recheck_lines),
        ]
    }

    fn check_unit(&self, ctx: &UnitContext<'_>) -> Vec<Finding> {
        let m = ctx.metrics;
        let body = m.body_lines as usize;
        let categories: Vec<String> = m
            .categories
            .iter()
            .map(|c| category_name(*c).to_string())
            .collect();
        let mut findings = Vec::new();

        let exempt = m.uniform && self.uniform_exemption;
        if body > self.thresholds.max_lines && !exempt {
            findings.push(
                self.finding(
                    Severity::Warning,
                    Location::unit(&m.path),
                    format!(
                        "File has {} body lines (limit {}); split it by responsibility",
                        body, self.thresholds.max_lines
                    ),
                )
                .with_evidence("body_lines", m.body_lines)
                .with_evidence("max_lines", self.thresholds.max_lines)
                .with_evidence("categories", categories.clone()),
            );
        }

        if body > self.thresholds.recheck_lines {
            findings.push(
                self.finding(
                    Severity::Info,
                    Location::unit(&m.path),
                    format!(
                        "File has {} body lines (re-check above {}); confirm it still belongs together",
                        body, self.thresholds.recheck_lines
                    ),
                )
                .with_evidence("body_lines", m.body_lines)
                .with_evidence("recheck_lines", self.thresholds.recheck_lines)
                .with_evidence("uniform", m.uniform),
            );
        }

        findings
    }
}

/// Flags files mixing I/O callables with pure logic
#[derive(Debug, Clone)]
pub struct MixedConcernRule {
    min_io_callables: usize,
}

impl Default for MixedConcernRule {
    fn default() -> Self {
        Self { min_io_callables: 2 }
    }
}

impl MixedConcernRule {
    pub fn with_config(config: &RuleSetConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            min_io_callables: config.threshold(MIXED_CONCERN, "min_io_callables", 2)?,
        })
    }
}

impl Rule for MixedConcernRule {
    fn id(&self) -> &'static str {
        MIXED_CONCERN
    }

    fn description(&self) -> &'static str {
        "File mixes network/I-O callables with pure logic or data shapes"
    }

    fn rationale(&self) -> &'static str {
        "Keep I/O at the edges: separate API clients from business logic and data definitions."
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Architecture
    }

    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Unit
    }

    fn thresholds(&self) -> Vec<(&'static str, usize)> {
        vec![("min_io_callables", self.min_io_callables)]
    }

    fn check_unit(&self, ctx: &UnitContext<'_>) -> Vec<Finding> {
        let m = ctx.metrics;
        if !m.mixed_concern || m.io_callables < self.min_io_callables {
            return Vec::new();
        }

        let io_names: Vec<String> = m
            .callables
            .iter()
            .filter(|c| c.has_io())
            .map(|c| c.name.clone())
            .collect();

        vec![self
            .finding(
                Severity::Error,
                Location::unit(&m.path),
                format!(
                    "{} I/O callables share the file with {} pure callables; move the I/O into its own module",
                    m.io_callables, m.pure_callables
                ),
            )
            .with_evidence("io_callables", m.io_callables)
            .with_evidence("pure_callables", m.pure_callables)
            .with_evidence("io_callable_names", io_names)]
    }
}
