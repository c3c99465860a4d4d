//! Parameter count and nesting depth

use super::{CallableContext, Rule, RuleScope};
use crate::config::{ConfigError, RuleSetConfig};
use crate::models::{Finding, RuleCategory, Severity};

const PARAM_COUNT: &str = "param-count";
const NESTING_DEPTH: &str = "nesting-depth";

/// Flags callables taking more than `max_params` parameters
#[derive(Debug, Clone)]
pub struct ParamCountRule {
    max_params: usize,
}

impl Default for ParamCountRule {
    fn default() -> Self {
        Self { max_params: 4 }
    }
}

impl ParamCountRule {
    pub fn with_config(config: &RuleSetConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            max_params: config.threshold(PARAM_COUNT, "max_params", 4)?,
        })
    }
}

impl Rule for ParamCountRule {
    fn id(&self) -> &'static str {
        PARAM_COUNT
    }

    fn description(&self) -> &'static str {
        "Callable takes too many parameters"
    }

    fn rationale(&self) -> &'static str {
        "Long parameter lists are hard to test exhaustively; group related values into a parameter object."
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Testability
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Callable
    }

    fn thresholds(&self) -> Vec<(&'static str, usize)> {
        vec![("max_params", self.max_params)]
    }

    fn check_callable(&self, ctx: &CallableContext<'_>) -> Vec<Finding> {
        let m = ctx.metrics;
        if m.param_count <= self.max_params {
            return Vec::new();
        }

        vec![self
            .finding(
                Severity::Warning,
                ctx.location(),
                format!(
                    "'{}' takes {} parameters (limit {})",
                    m.name, m.param_count, self.max_params
                ),
            )
            .with_evidence("param_count", m.param_count)
            .with_evidence("max_params", self.max_params)]
    }
}

/// Flags callables nesting blocks deeper than `max_nesting`
#[derive(Debug, Clone)]
pub struct NestingDepthRule {
    max_nesting: usize,
}

impl Default for NestingDepthRule {
    fn default() -> Self {
        Self { max_nesting: 3 }
    }
}

impl NestingDepthRule {
    pub fn with_config(config: &RuleSetConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            max_nesting: config.threshold(NESTING_DEPTH, "max_nesting", 3)?,
        })
    }
}

impl Rule for NestingDepthRule {
    fn id(&self) -> &'static str {
        NESTING_DEPTH
    }

    fn description(&self) -> &'static str {
        "Callable nests blocks too deeply"
    }

    fn rationale(&self) -> &'static str {
        "Deep nesting multiplies the paths a test must cover; use guard clauses and extract helpers."
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Testability
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Callable
    }

    fn thresholds(&self) -> Vec<(&'static str, usize)> {
        vec![("max_nesting", self.max_nesting)]
    }

    fn check_callable(&self, ctx: &CallableContext<'_>) -> Vec<Finding> {
        let m = ctx.metrics;
        if m.max_nesting <= self.max_nesting {
            return Vec::new();
        }

        vec![self
            .finding(
                Severity::Warning,
                ctx.location(),
                format!(
                    "'{}' nests {} levels deep (limit {})",
                    m.name, m.max_nesting, self.max_nesting
                ),
            )
            .with_evidence("max_nesting", m.max_nesting)
            .with_evidence("limit", self.max_nesting)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::check;
    use crate::symbols::{Block, BlockKind, Callable, Parameter, SourceUnit};

    fn with_params(n: usize) -> SourceUnit {
        let mut unit = SourceUnit::new("svc.py", "python");
        let mut c = Callable::new("handle", 3, 20);
        c.params = (0..n).map(|i| Parameter::named(format!("p{}", i))).collect();
        unit.callables.push(c);
        unit
    }

    #[test]
    fn test_param_count_threshold() {
        assert!(check(&ParamCountRule::default(), &with_params(4)).is_empty());

        let findings = check(&ParamCountRule::default(), &with_params(5));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings[0].location.callable.as_deref(), Some("handle"));
        assert_eq!(findings[0].location.line, Some(3));
    }

    #[test]
    fn test_param_count_configurable() {
        let config: RuleSetConfig =
            toml::from_str("[rules.param-count]\nthresholds = { max_params = 6 }\n")
                .expect("valid toml");
        let rule = ParamCountRule::with_config(&config).expect("valid config");
        assert!(check(&rule, &with_params(6)).is_empty());
        assert_eq!(check(&rule, &with_params(7)).len(), 1);
    }

    #[test]
    fn test_nesting_depth() {
        let mut unit = SourceUnit::new("svc.py", "python");
        let mut c = Callable::new("walk", 1, 30);
        c.body = vec![Block::new(BlockKind::Loop, 2).with_children(vec![Block::new(
            BlockKind::Branch,
            3,
        )
        .with_children(vec![Block::new(BlockKind::Try, 4)])])];
        unit.callables.push(c.clone());
        assert!(check(&NestingDepthRule::default(), &unit).is_empty());

        c.body = vec![Block::new(BlockKind::Loop, 2).with_children(vec![Block::new(
            BlockKind::Branch,
            3,
        )
        .with_children(vec![Block::new(BlockKind::Try, 4)
            .with_children(vec![Block::new(BlockKind::Branch, 5)])])])];
        unit.callables = vec![c];
        let findings = check(&NestingDepthRule::default(), &unit);
        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings[0].evidence.get("max_nesting"),
            Some(&crate::models::EvidenceValue::Int(4))
        );
    }
}
