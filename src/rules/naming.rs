//! Naming rules: generic callable and file names

use super::{CallableContext, Rule, RuleScope, UnitContext};
use crate::models::{Finding, Location, RuleCategory, Severity};
use crate::symbols::StructuralCategory;

/// Callable names that say nothing about what the callable does
const GENERIC_CALLABLE_NAMES: &[&str] = &[
    "do", "doit", "do_it", "do_stuff", "do_work", "process", "process_data", "handle",
    "handle_data", "execute", "manage", "perform", "helper", "util", "utils", "data", "stuff",
    "thing", "things", "foo", "bar", "baz", "temp", "tmp", "func", "function", "method", "misc",
];

/// File stems that collect unrelated code
const GENERIC_FILE_NAMES: &[&str] = &["utils", "helpers", "misc", "common", "stuff", "manager"];

/// Flags callables with generic or single-character names
#[derive(Debug, Clone, Default)]
pub struct GenericCallableNameRule;

impl Rule for GenericCallableNameRule {
    fn id(&self) -> &'static str {
        "generic-callable-name"
    }

    fn description(&self) -> &'static str {
        "Callable name is generic or a single character"
    }

    fn rationale(&self) -> &'static str {
        "Names should say what a callable does in domain terms (verb + noun)."
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Naming
    }

    fn default_severity(&self) -> Severity {
        Severity::Info
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Callable
    }

    fn check_callable(&self, ctx: &CallableContext<'_>) -> Vec<Finding> {
        if matches!(
            ctx.callable.category,
            StructuralCategory::DataShape | StructuralCategory::Test
        ) {
            return Vec::new();
        }

        let full = ctx.callable.name.as_str();
        let short = full.rsplit('.').next().unwrap_or(full);
        let lower = short.to_lowercase();
        let single_char = short.chars().count() == 1 && short != "_";
        if !single_char && !GENERIC_CALLABLE_NAMES.contains(&lower.as_str()) {
            return Vec::new();
        }

        vec![self
            .finding(
                Severity::Info,
                ctx.location(),
                format!("'{}' does not say what it does", full),
            )
            .with_evidence("name", short)]
    }
}

/// Flags catch-all file names (`utils`, `helpers`, ...)
#[derive(Debug, Clone, Default)]
pub struct GenericFileNameRule;

impl Rule for GenericFileNameRule {
    fn id(&self) -> &'static str {
        "generic-file-name"
    }

    fn description(&self) -> &'static str {
        "File name is a catch-all (utils, helpers, misc, common, stuff, manager)"
    }

    fn rationale(&self) -> &'static str {
        "Catch-all files attract unrelated code; name files after the concept they hold."
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Naming
    }

    fn default_severity(&self) -> Severity {
        Severity::Info
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Unit
    }

    fn check_unit(&self, ctx: &UnitContext<'_>) -> Vec<Finding> {
        let stem = ctx.unit.stem();
        if !GENERIC_FILE_NAMES.contains(&stem.as_str()) {
            return Vec::new();
        }
        vec![self
            .finding(
                Severity::Info,
                Location::unit(&ctx.unit.path),
                format!("'{}' is a catch-all file name", stem),
            )
            .with_evidence("stem", stem.clone())]
    }
}
