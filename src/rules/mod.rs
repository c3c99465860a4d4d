//! Policy rules
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        RuleSet                              │
//! │  - Ordered registry of every built-in rule                  │
//! │  - Applies enabled / severity / threshold overrides         │
//! │  - Runs callable + unit rules per file, index rules once    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Rule Trait                           │
//! │  - id(), category(), default_severity()                     │
//! │  - scope(): Callable | Unit | Index                         │
//! │  - check_callable / check_unit / check_index                │
//! └─────────────────────────────────────────────────────────────┘
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//! ┌──────────────────┐ ┌──────────────┐ ┌──────────────────┐
//! │ Callable rules   │ │ Unit rules   │ │ Index rules      │
//! │ (param-count,    │ │ (file-size,  │ │ (duplicate-retry │
//! │  retry-*, ...)   │ │  mixed-...)  │ │  -helper, ...)   │
//! └──────────────────┘ └──────────────┘ └──────────────────┘
//! ```
//!
//! Rules are total: "no violation" is an empty `Vec`, never an error.
//! Thresholds are read once, when the rule is built from configuration.

mod architecture;
mod async_usage;
mod error_handling;
mod logging;
mod naming;
mod repository;
mod retry;
mod security;
mod testability;

pub use architecture::{FileSizeRule, MixedConcernRule};
pub use async_usage::{BlockingCallInAsyncRule, MixedSyncAsyncIoRule};
pub use error_handling::SwallowedErrorRule;
pub use logging::{SensitiveLogContentRule, UnstructuredLogRule};
pub use naming::{GenericCallableNameRule, GenericFileNameRule};
pub use repository::{DirectoryDepthRule, DuplicateRetryHelperRule, PromoteSharedRule};
pub use retry::{
    NetworkMissingTimeoutRule, RetryMissingBackoffRule, RetryNonIdempotentRule,
    RetryNonTransientStatusRule, RetryUnboundedRule,
};
pub use security::SecretLiteralRule;
pub use testability::{NestingDepthRule, ParamCountRule};

use crate::config::{normalize_rule_id, ConfigError, RuleSetConfig};
use crate::index::CrossFileIndex;
use crate::metrics::{CallableMetrics, UnitMetrics};
use crate::models::{Finding, Location, RuleCategory, Severity};
use crate::symbols::{Callable, ParseError, SourceUnit};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, error, warn};

/// Id of the pseudo-rule every per-file failure is reported under
pub const SCAN_ERROR_RULE: &str = "scan-error";

/// What a rule is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleScope {
    /// Once per callable
    Callable,
    /// Once per source unit
    Unit,
    /// Once per scan, after the cross-file index is built
    Index,
    /// Never evaluated; carries findings the evaluator emits itself
    Diagnostic,
}

impl std::fmt::Display for RuleScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RuleScope::Callable => "callable",
            RuleScope::Unit => "unit",
            RuleScope::Index => "index",
            RuleScope::Diagnostic => "diagnostic",
        };
        f.write_str(s)
    }
}

/// An independently toggleable interpretation inside a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubRule {
    pub id: &'static str,
    pub description: &'static str,
}

/// Per-unit input to unit and callable rules
#[derive(Debug, Clone, Copy)]
pub struct UnitContext<'a> {
    pub unit: &'a SourceUnit,
    pub metrics: &'a UnitMetrics,
}

impl<'a> UnitContext<'a> {
    pub fn new(unit: &'a SourceUnit, metrics: &'a UnitMetrics) -> Self {
        Self { unit, metrics }
    }

    /// Callables paired with their metrics, in declaration order
    pub fn callables(&self) -> impl Iterator<Item = CallableContext<'a>> + 'a {
        let unit = self.unit;
        unit.callables
            .iter()
            .zip(self.metrics.callables.iter())
            .map(move |(callable, metrics)| CallableContext {
                unit,
                callable,
                metrics,
            })
    }
}

/// Per-callable input to callable rules
#[derive(Debug, Clone, Copy)]
pub struct CallableContext<'a> {
    pub unit: &'a SourceUnit,
    pub callable: &'a Callable,
    pub metrics: &'a CallableMetrics,
}

impl CallableContext<'_> {
    pub fn location(&self) -> Location {
        Location::callable(
            &self.unit.path,
            &self.callable.name,
            self.callable.line_start,
        )
    }

    pub fn location_at(&self, line: u32) -> Location {
        self.location().at_line(line)
    }
}

/// Trait for all policy rules
///
/// ```ignore
/// pub struct MyRule { limit: usize }
///
/// impl Rule for MyRule {
///     fn id(&self) -> &'static str { "my-rule" }
///     fn scope(&self) -> RuleScope { RuleScope::Callable }
///     fn check_callable(&self, ctx: &CallableContext<'_>) -> Vec<Finding> {
///         // inspect ctx.metrics, return findings
///         Vec::new()
///     }
///     // ...
/// }
/// ```
pub trait Rule: Send + Sync {
    /// Stable identifier used in configuration and reports
    fn id(&self) -> &'static str;

    /// One-line description of what the rule flags
    fn description(&self) -> &'static str;

    /// Why the policy exists; attached to every finding
    fn rationale(&self) -> &'static str;

    fn category(&self) -> RuleCategory;

    fn default_severity(&self) -> Severity;

    fn scope(&self) -> RuleScope;

    fn sub_rules(&self) -> &'static [SubRule] {
        &[]
    }

    /// Effective thresholds as (key, value)
    fn thresholds(&self) -> Vec<(&'static str, usize)> {
        Vec::new()
    }

    fn check_callable(&self, _ctx: &CallableContext<'_>) -> Vec<Finding> {
        Vec::new()
    }

    fn check_unit(&self, _ctx: &UnitContext<'_>) -> Vec<Finding> {
        Vec::new()
    }

    fn check_index(&self, _index: &CrossFileIndex) -> Vec<Finding> {
        Vec::new()
    }

    /// Start a finding owned by this rule
    fn finding(&self, severity: Severity, location: Location, message: String) -> Finding {
        Finding::new(self.id(), self.category(), severity, location, message)
            .with_rationale(self.rationale())
    }
}

/// The pseudo-rule behind scan-error findings
#[derive(Debug, Default)]
pub struct ScanErrorRule;

impl Rule for ScanErrorRule {
    fn id(&self) -> &'static str {
        SCAN_ERROR_RULE
    }

    fn description(&self) -> &'static str {
        "A file could not be analysed (unsupported language, parse failure, read error, rule panic)"
    }

    fn rationale(&self) -> &'static str {
        "Files that cannot be analysed are not covered by any other rule."
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::ScanError
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Diagnostic
    }
}

/// Every built-in rule with default thresholds
pub fn default_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(FileSizeRule::default()),
        Box::new(MixedConcernRule::default()),
        Box::new(ParamCountRule::default()),
        Box::new(NestingDepthRule::default()),
        Box::new(RetryNonIdempotentRule::default()),
        Box::new(RetryNonTransientStatusRule),
        Box::new(RetryMissingBackoffRule),
        Box::new(RetryUnboundedRule::default()),
        Box::new(NetworkMissingTimeoutRule),
        Box::new(SwallowedErrorRule),
        Box::new(BlockingCallInAsyncRule),
        Box::new(MixedSyncAsyncIoRule),
        Box::new(SecretLiteralRule::default()),
        Box::new(SensitiveLogContentRule),
        Box::new(UnstructuredLogRule),
        Box::new(GenericCallableNameRule),
        Box::new(GenericFileNameRule),
        Box::new(DuplicateRetryHelperRule::default()),
        Box::new(DirectoryDepthRule::default()),
        Box::new(PromoteSharedRule::default()),
        Box::new(ScanErrorRule),
    ]
}

/// Every built-in rule with thresholds read from configuration
pub fn configured_rules(config: &RuleSetConfig) -> Result<Vec<Box<dyn Rule>>, ConfigError> {
    Ok(vec![
        Box::new(FileSizeRule::with_config(config)?),
        Box::new(MixedConcernRule::with_config(config)?),
        Box::new(ParamCountRule::with_config(config)?),
        Box::new(NestingDepthRule::with_config(config)?),
        Box::new(RetryNonIdempotentRule::with_config(config)),
        Box::new(RetryNonTransientStatusRule),
        Box::new(RetryMissingBackoffRule),
        Box::new(RetryUnboundedRule::with_config(config)?),
        Box::new(NetworkMissingTimeoutRule),
        Box::new(SwallowedErrorRule),
        Box::new(BlockingCallInAsyncRule),
        Box::new(MixedSyncAsyncIoRule),
        Box::new(SecretLiteralRule::with_config(config)?),
        Box::new(SensitiveLogContentRule),
        Box::new(UnstructuredLogRule),
        Box::new(GenericCallableNameRule),
        Box::new(GenericFileNameRule),
        Box::new(DuplicateRetryHelperRule::with_config(config)?),
        Box::new(DirectoryDepthRule::with_config(config)?),
        Box::new(PromoteSharedRule::with_config(config)?),
        Box::new(ScanErrorRule),
    ])
}

/// A rule plus its effective enabled state and severity override
pub struct RuleEntry {
    rule: Box<dyn Rule>,
    enabled: bool,
    severity_override: Option<Severity>,
}

impl RuleEntry {
    pub fn rule(&self) -> &dyn Rule {
        self.rule.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn severity(&self) -> Severity {
        self.severity_override
            .unwrap_or_else(|| self.rule.default_severity())
    }

    /// An override replaces the severity of every finding the rule emits
    fn apply(&self, mut finding: Finding) -> Finding {
        if let Some(severity) = self.severity_override {
            finding.severity = severity;
        }
        finding
    }
}

impl std::fmt::Debug for RuleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEntry")
            .field("id", &self.rule.id())
            .field("enabled", &self.enabled)
            .field("severity_override", &self.severity_override)
            .finish()
    }
}

/// Ordered, configured collection of rules. Fixed for the whole scan.
#[derive(Debug)]
pub struct RuleSet {
    entries: Vec<RuleEntry>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::from_rules(default_rules())
    }
}

impl RuleSet {
    /// All rules enabled at default severity
    pub fn from_rules(rules: Vec<Box<dyn Rule>>) -> Self {
        let entries = rules
            .into_iter()
            .map(|rule| RuleEntry {
                rule,
                enabled: true,
                severity_override: None,
            })
            .collect();
        Self { entries }
    }

    /// Build the built-in rule set and apply configuration.
    ///
    /// Unknown rule ids and threshold keys are logged and ignored; invalid
    /// severities and non-numeric thresholds are errors.
    pub fn from_config(config: &RuleSetConfig) -> Result<Self, ConfigError> {
        let rules = configured_rules(config)?;

        let mut known: HashSet<&'static str> = HashSet::new();
        for rule in &rules {
            known.insert(rule.id());
            known.extend(rule.sub_rules().iter().map(|s| s.id));
        }
        for key in config.rules.keys() {
            let id = normalize_rule_id(key);
            if !known.contains(id.as_str()) {
                warn!("Unknown rule '{}' in configuration, ignoring", key);
            }
        }

        let mut entries = Vec::with_capacity(rules.len());
        for rule in rules {
            let id = rule.id();
            let severity_override = config.severity_override(id)?;

            if let Some(overrides) = config.rule(id) {
                let keys: Vec<&str> = rule.thresholds().iter().map(|(k, _)| *k).collect();
                for key in overrides.thresholds.keys() {
                    if !keys.contains(&key.as_str()) {
                        warn!("Rule '{}' has no threshold '{}', ignoring", id, key);
                    }
                }
            }
            for sub in rule.sub_rules() {
                if config.rule(sub.id).is_some_and(|o| o.severity.is_some()) {
                    warn!(
                        "Sub-rule '{}' only supports 'enabled'; severity ignored",
                        sub.id
                    );
                }
            }

            let mut enabled = config.is_enabled(id);
            if id == SCAN_ERROR_RULE && !enabled {
                warn!("'{}' cannot be disabled; files that fail to parse are always reported", id);
                enabled = true;
            }
            if !enabled {
                debug!("Rule '{}' disabled by configuration", id);
            }

            entries.push(RuleEntry {
                rule,
                enabled,
                severity_override,
            });
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RuleEntry> {
        self.entries.iter().find(|e| e.rule.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &RuleEntry> {
        self.entries.iter().filter(|e| e.enabled)
    }

    pub fn has_index_rules(&self) -> bool {
        self.enabled().any(|e| e.rule.scope() == RuleScope::Index)
    }

    /// Run every enabled callable and unit rule against one file
    pub fn evaluate_unit(&self, unit: &SourceUnit, metrics: &UnitMetrics) -> Vec<Finding> {
        let ctx = UnitContext::new(unit, metrics);
        let mut findings = Vec::new();

        for entry in self.enabled() {
            let produced = match entry.rule.scope() {
                RuleScope::Callable => ctx
                    .callables()
                    .flat_map(|c| entry.rule.check_callable(&c))
                    .collect(),
                RuleScope::Unit => entry.rule.check_unit(&ctx),
                RuleScope::Index | RuleScope::Diagnostic => continue,
            };
            findings.extend(produced.into_iter().map(|f| entry.apply(f)));
        }

        findings
    }

    /// Run every enabled index rule. A panicking rule becomes a scan-error
    /// finding; the other rules still run.
    pub fn evaluate_index(&self, index: &CrossFileIndex) -> Vec<Finding> {
        let mut findings = Vec::new();

        for entry in self.enabled().filter(|e| e.rule.scope() == RuleScope::Index) {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                entry.rule.check_index(index)
            }));
            match result {
                Ok(produced) => findings.extend(produced.into_iter().map(|f| entry.apply(f))),
                Err(panic_info) => {
                    let message = panic_message(panic_info.as_ref());
                    error!("Rule {} panicked: {}", entry.rule.id(), message);
                    findings.push(self.panic_finding(
                        Path::new("."),
                        &format!("rule '{}' failed: {}", entry.rule.id(), message),
                    ));
                }
            }
        }

        findings
    }

    fn scan_error_severity(&self) -> Severity {
        self.get(SCAN_ERROR_RULE)
            .map(RuleEntry::severity)
            .unwrap_or(Severity::Warning)
    }

    fn scan_error_finding(&self, location: Location, kind: &str, message: String) -> Finding {
        ScanErrorRule
            .finding(self.scan_error_severity(), location, message)
            .with_evidence("error_kind", kind)
    }

    /// Scan-error finding for a file the adapter could not turn into a unit
    pub fn parse_error_finding(&self, err: &ParseError) -> Finding {
        let mut location = Location::unit(err.path());
        if let Some(line) = err.line() {
            location = location.at_line(line);
        }
        let kind = match err {
            ParseError::UnsupportedLanguage { .. } => "unsupported-language",
            ParseError::ParseFailure { .. } => "parse-failure",
            ParseError::Io { .. } => "io",
        };
        self.scan_error_finding(location, kind, err.to_string())
    }

    /// Scan-error finding for a file whose pipeline panicked
    pub fn panic_finding(&self, path: &Path, message: &str) -> Finding {
        self.scan_error_finding(Location::unit(path), "panic", message.to_string())
    }
}

/// Extract a readable message from a panic payload
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers for rule tests

    use super::*;
    use crate::index::IndexBuilder;
    use crate::metrics::MetricExtractor;

    /// Run one callable or unit rule against a unit
    pub fn check(rule: &dyn Rule, unit: &SourceUnit) -> Vec<Finding> {
        let metrics = MetricExtractor::default().extract(unit);
        let ctx = UnitContext::new(unit, &metrics);
        match rule.scope() {
            RuleScope::Callable => ctx
                .callables()
                .flat_map(|c| rule.check_callable(&c))
                .collect(),
            RuleScope::Unit => rule.check_unit(&ctx),
            RuleScope::Index | RuleScope::Diagnostic => Vec::new(),
        }
    }

    /// Build an index over `units` and run one index rule
    pub fn check_index(rule: &dyn Rule, units: &[SourceUnit]) -> Vec<Finding> {
        let extractor = MetricExtractor::default();
        let mut builder = IndexBuilder::new();
        for unit in units {
            builder.add(unit, &extractor.extract(unit));
        }
        rule.check_index(&builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::Parameter;

    fn five_param_unit() -> SourceUnit {
        let mut unit = SourceUnit::new("svc.py", "python");
        let mut c = Callable::new("create", 1, 10);
        c.params = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|p| Parameter::named(*p))
            .collect();
        unit.callables.push(c);
        unit
    }

    #[test]
    fn test_rule_ids_are_unique() {
        let set = RuleSet::default();
        let mut seen = HashSet::new();
        for entry in set.entries() {
            assert!(seen.insert(entry.rule().id()), "duplicate {}", entry.rule().id());
            for sub in entry.rule().sub_rules() {
                assert!(sub.id.starts_with(entry.rule().id()));
                assert!(seen.insert(sub.id));
            }
        }
        assert!(set.contains(SCAN_ERROR_RULE));
    }

    #[test]
    fn test_severity_override_replaces_severity() {
        let config: RuleSetConfig = toml::from_str(
            r#"
[rules.param-count]
severity = "error"
"#,
        )
        .expect("valid toml");
        let set = RuleSet::from_config(&config).expect("valid config");
        let unit = five_param_unit();
        let metrics = crate::metrics::MetricExtractor::default().extract(&unit);
        let findings = set.evaluate_unit(&unit, &metrics);
        let param: Vec<_> = findings
            .iter()
            .filter(|f| f.rule_id == "param-count")
            .collect();
        assert_eq!(param.len(), 1);
        assert_eq!(param[0].severity, Severity::Error);
    }

    #[test]
    fn test_disabled_rule_emits_nothing() {
        let config: RuleSetConfig =
            toml::from_str("[rules.param_count]\nenabled = false\n").expect("valid toml");
        let set = RuleSet::from_config(&config).expect("valid config");
        let unit = five_param_unit();
        let metrics = crate::metrics::MetricExtractor::default().extract(&unit);
        assert!(set
            .evaluate_unit(&unit, &metrics)
            .iter()
            .all(|f| f.rule_id != "param-count"));
    }

    #[test]
    fn test_unknown_rule_is_not_fatal() {
        let config: RuleSetConfig =
            toml::from_str("[rules.no-such-rule]\nenabled = false\n").expect("valid toml");
        assert!(RuleSet::from_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_severity_is_fatal() {
        let config: RuleSetConfig =
            toml::from_str("[rules.nesting-depth]\nseverity = \"fatal\"\n").expect("valid toml");
        assert!(matches!(
            RuleSet::from_config(&config),
            Err(ConfigError::InvalidSeverity { .. })
        ));
    }

    #[test]
    fn test_findings_reference_active_rules() {
        let set = RuleSet::default();
        let unit = five_param_unit();
        let metrics = crate::metrics::MetricExtractor::default().extract(&unit);
        for finding in set.evaluate_unit(&unit, &metrics) {
            assert!(set.contains(&finding.rule_id));
        }
    }

    #[test]
    fn test_scan_error_cannot_be_disabled() {
        let config: RuleSetConfig = toml::from_str(
            "[rules.scan-error]\nenabled = false\nseverity = \"error\"\n",
        )
        .expect("valid toml");
        let set = RuleSet::from_config(&config).expect("valid config");
        let entry = set.get(SCAN_ERROR_RULE).expect("scan-error present");
        assert!(entry.is_enabled());

        let err = ParseError::ParseFailure {
            path: "bad.py".into(),
            line: 7,
            message: "unexpected indent".into(),
        };
        let finding = set.parse_error_finding(&err);
        assert_eq!(finding.severity, Severity::Error);
        assert_eq!(finding.location.line, Some(7));
        assert!(finding.is_scan_error());
    }
}
