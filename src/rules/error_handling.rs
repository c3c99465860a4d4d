//! Swallowed errors

use super::{CallableContext, Rule, RuleScope};
use crate::models::{Finding, RuleCategory, Severity};
use crate::symbols::HandlerAction;

/// Flags catch/guard blocks that discard the error
#[derive(Debug, Clone, Default)]
pub struct SwallowedErrorRule;

impl Rule for SwallowedErrorRule {
    fn id(&self) -> &'static str {
        "swallowed-error"
    }

    fn description(&self) -> &'static str {
        "Error handler discards the error without rethrowing, logging or recovering"
    }

    fn rationale(&self) -> &'static str {
        "Never silently swallow errors: rethrow, log with context, or fall back explicitly."
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::ErrorHandling
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Callable
    }

    fn check_callable(&self, ctx: &CallableContext<'_>) -> Vec<Finding> {
        ctx.callable
            .error_handlers
            .iter()
            .filter(|h| h.action == HandlerAction::Swallow)
            .map(|h| {
                let caught = if h.caught.is_empty() {
                    "every error".to_string()
                } else {
                    h.caught.join(", ")
                };
                self.finding(
                    Severity::Warning,
                    ctx.location_at(h.line),
                    format!("'{}' swallows {}", ctx.callable.name, caught),
                )
                .with_evidence("caught", h.caught.clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::check;
    use crate::symbols::{Callable, ErrorHandler, SourceUnit};

    #[test]
    fn test_one_finding_per_swallowing_handler() {
        let mut unit = SourceUnit::new("jobs.py", "python");
        let mut c = Callable::new("run", 1, 30);
        c.error_handlers = vec![
            ErrorHandler {
                line: 5,
                caught: vec!["ValueError".into()],
                action: HandlerAction::Swallow,
            },
            ErrorHandler {
                line: 9,
                caught: vec![],
                action: HandlerAction::Rethrow,
            },
            ErrorHandler {
                line: 14,
                caught: vec![],
                action: HandlerAction::Swallow,
            },
        ];
        unit.callables.push(c);

        let findings = check(&SwallowedErrorRule, &unit);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].location.line, Some(5));
        assert!(findings[1].message.contains("every error"));
    }
}
