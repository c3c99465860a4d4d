//! Repository-wide rules evaluated against the cross-file index

use super::{Rule, RuleScope};
use crate::config::{ConfigError, RuleSetConfig};
use crate::index::CrossFileIndex;
use crate::models::{Finding, Location, RuleCategory, Severity};

const DUPLICATE_RETRY_HELPER: &str = "duplicate-retry-helper";
const DIRECTORY_DEPTH: &str = "directory-depth";
const PROMOTE_SHARED: &str = "promote-shared";

/// Flags repositories where several files hand-roll retry logic
#[derive(Debug, Clone)]
pub struct DuplicateRetryHelperRule {
    min_implementations: usize,
}

impl Default for DuplicateRetryHelperRule {
    fn default() -> Self {
        Self {
            min_implementations: 2,
        }
    }
}

impl DuplicateRetryHelperRule {
    pub fn with_config(config: &RuleSetConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            min_implementations: config.threshold(
                DUPLICATE_RETRY_HELPER,
                "min_implementations",
                2,
            )?,
        })
    }
}

impl Rule for DuplicateRetryHelperRule {
    fn id(&self) -> &'static str {
        DUPLICATE_RETRY_HELPER
    }

    fn description(&self) -> &'static str {
        "Several files implement retry/backoff independently"
    }

    fn rationale(&self) -> &'static str {
        "Write the retry helper once in a shared module and reuse it everywhere."
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Architecture
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Index
    }

    fn thresholds(&self) -> Vec<(&'static str, usize)> {
        vec![("min_implementations", self.min_implementations)]
    }

    fn check_index(&self, index: &CrossFileIndex) -> Vec<Finding> {
        let units = index.retry_units();
        if units.len() < self.min_implementations.max(2) {
            return Vec::new();
        }

        let related: Vec<Location> = units
            .values()
            .map(|imp| Location::callable(&imp.path, &imp.callable, imp.line))
            .collect();
        let Some(first) = related.first().cloned() else {
            return Vec::new();
        };
        let paths: Vec<String> = units
            .keys()
            .map(|p| p.display().to_string())
            .collect();

        vec![self
            .finding(
                Severity::Warning,
                first,
                format!(
                    "{} files implement their own retry logic; extract one shared helper",
                    units.len()
                ),
            )
            .with_evidence("implementations", units.len())
            .with_evidence("files", paths)
            .with_related(related)]
    }
}

/// Flags directories nested deeper than `max_depth`
#[derive(Debug, Clone)]
pub struct DirectoryDepthRule {
    max_depth: usize,
}

impl Default for DirectoryDepthRule {
    fn default() -> Self {
        Self { max_depth: 3 }
    }
}

impl DirectoryDepthRule {
    pub fn with_config(config: &RuleSetConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            max_depth: config.threshold(DIRECTORY_DEPTH, "max_depth", 3)?,
        })
    }
}

impl Rule for DirectoryDepthRule {
    fn id(&self) -> &'static str {
        DIRECTORY_DEPTH
    }

    fn description(&self) -> &'static str {
        "Directory nesting exceeds the depth limit"
    }

    fn rationale(&self) -> &'static str {
        "Keep the folder tree shallow (2-3 levels) so code is easy to find."
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Architecture
    }

    fn default_severity(&self) -> Severity {
        Severity::Info
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Index
    }

    fn thresholds(&self) -> Vec<(&'static str, usize)> {
        vec![("max_depth", self.max_depth)]
    }

    fn check_index(&self, index: &CrossFileIndex) -> Vec<Finding> {
        index
            .directories
            .iter()
            .filter(|(_, stats)| stats.depth > self.max_depth)
            .map(|(dir, stats)| {
                self.finding(
                    Severity::Info,
                    Location::unit(dir),
                    format!(
                        "'{}' is {} levels deep (limit {})",
                        dir.display(),
                        stats.depth,
                        self.max_depth
                    ),
                )
                .with_evidence("depth", stats.depth)
                .with_evidence("max_depth", self.max_depth)
                .with_evidence("file_count", stats.file_count)
            })
            .collect()
    }
}

/// Flags domain callables used widely enough to belong in a shared module
#[derive(Debug, Clone)]
pub struct PromoteSharedRule {
    min_fan_in: usize,
}

impl Default for PromoteSharedRule {
    fn default() -> Self {
        Self { min_fan_in: 3 }
    }
}

impl PromoteSharedRule {
    pub fn with_config(config: &RuleSetConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            min_fan_in: config.threshold(PROMOTE_SHARED, "min_fan_in", 3)?,
        })
    }
}

impl Rule for PromoteSharedRule {
    fn id(&self) -> &'static str {
        PROMOTE_SHARED
    }

    fn description(&self) -> &'static str {
        "Callable in a domain folder is used by many other files"
    }

    fn rationale(&self) -> &'static str {
        "Code used in 3+ files belongs in a shared module, not inside one domain."
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Architecture
    }

    fn default_severity(&self) -> Severity {
        Severity::Info
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Index
    }

    fn thresholds(&self) -> Vec<(&'static str, usize)> {
        vec![("min_fan_in", self.min_fan_in)]
    }

    fn check_index(&self, index: &CrossFileIndex) -> Vec<Finding> {
        let mut findings = Vec::new();

        for (name, definitions) in &index.definitions {
            // Same name defined in several files: references are ambiguous
            let [definition] = definitions.as_slice() else {
                continue;
            };
            if definition.shared || definition.domain.is_none() || name.starts_with('_') {
                continue;
            }

            let users = index.users_of(definition);
            if users.len() < self.min_fan_in {
                continue;
            }

            let related = users.iter().map(|p| Location::unit(*p)).collect();
            findings.push(
                self.finding(
                    Severity::Info,
                    Location::callable(&definition.path, name, definition.line),
                    format!(
                        "'{}' is used by {} other files; move it to a shared module",
                        name,
                        users.len()
                    ),
                )
                .with_evidence("fan_in", users.len())
                .with_related(related),
            );
        }

        findings
    }
}
