//! Log line content and shape

use super::{CallableContext, Rule, RuleScope};
use crate::metrics::names::is_sensitive_name;
use crate::models::{Finding, RuleCategory, Severity};

/// Flags log calls that pass a sensitive parameter
#[derive(Debug, Clone, Default)]
pub struct SensitiveLogContentRule;

impl SensitiveLogContentRule {
    /// Parameters (or sensitive attributes of parameters) a log call leaks
    fn leaked<'a>(params: &[&str], args: &'a [String]) -> Vec<&'a str> {
        args.iter()
            .map(String::as_str)
            .filter(|arg| {
                let (root, last) = match (arg.split('.').next(), arg.rsplit('.').next()) {
                    (Some(root), Some(last)) => (root, last),
                    _ => return false,
                };
                params.iter().any(|p| *p == root)
                    && (is_sensitive_name(root) || is_sensitive_name(last))
            })
            .collect()
    }
}

impl Rule for SensitiveLogContentRule {
    fn id(&self) -> &'static str {
        "sensitive-log-content"
    }

    fn description(&self) -> &'static str {
        "Log call includes a credential or PII parameter"
    }

    fn rationale(&self) -> &'static str {
        "Never log tokens, passwords or personal data; log an identifier instead."
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Logging
    }

    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Callable
    }

    fn check_callable(&self, ctx: &CallableContext<'_>) -> Vec<Finding> {
        let params: Vec<&str> = ctx.callable.param_names().collect();
        if params.is_empty() {
            return Vec::new();
        }

        ctx.callable
            .log_calls
            .iter()
            .filter_map(|call| {
                let leaked = Self::leaked(&params, &call.args);
                if leaked.is_empty() {
                    return None;
                }
                let leaked: Vec<String> = leaked.into_iter().map(str::to_string).collect();
                Some(
                    self.finding(
                        Severity::Error,
                        ctx.location_at(call.line),
                        format!("'{}' logs {}", ctx.callable.name, leaked.join(", ")),
                    )
                    .with_evidence("arguments", leaked),
                )
            })
            .collect()
    }
}

/// Flags interpolated log messages carrying no structured fields
#[derive(Debug, Clone, Default)]
pub struct UnstructuredLogRule;

impl Rule for UnstructuredLogRule {
    fn id(&self) -> &'static str {
        "unstructured-log"
    }

    fn description(&self) -> &'static str {
        "Log message built by string interpolation with no structured fields"
    }

    fn rationale(&self) -> &'static str {
        "Structured fields can be searched and aggregated; interpolated text cannot."
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Logging
    }

    fn default_severity(&self) -> Severity {
        Severity::Info
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Callable
    }

    fn check_callable(&self, ctx: &CallableContext<'_>) -> Vec<Finding> {
        ctx.callable
            .log_calls
            .iter()
            .filter(|call| call.interpolated && call.fields.is_empty())
            .map(|call| {
                self.finding(
                    Severity::Info,
                    ctx.location_at(call.line),
                    format!(
                        "'{}' logs an interpolated message; pass values as structured fields",
                        ctx.callable.name
                    ),
                )
                .with_evidence("level", call.level.as_str())
            })
            .collect()
    }
}
