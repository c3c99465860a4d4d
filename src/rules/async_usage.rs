//! Sync/async mixing

use super::{CallableContext, Rule, RuleScope, UnitContext};
use crate::models::{Finding, Location, RuleCategory, Severity};

/// Flags blocking calls made from inside an async callable
#[derive(Debug, Clone, Default)]
pub struct BlockingCallInAsyncRule;

impl Rule for BlockingCallInAsyncRule {
    fn id(&self) -> &'static str {
        "blocking-call-in-async"
    }

    fn description(&self) -> &'static str {
        "Async callable performs a blocking call"
    }

    fn rationale(&self) -> &'static str {
        "A blocking call inside async code stalls the event loop; use the async client or offload to a thread."
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Async
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Callable
    }

    fn check_callable(&self, ctx: &CallableContext<'_>) -> Vec<Finding> {
        let m = ctx.metrics;
        if !m.is_async {
            return Vec::new();
        }
        m.blocking_calls
            .iter()
            .map(|(target, line)| {
                self.finding(
                    Severity::Warning,
                    ctx.location_at(*line),
                    format!("async '{}' blocks on {}", m.name, target),
                )
                .with_evidence("call", target.as_str())
            })
            .collect()
    }
}

/// Flags files that do I/O both synchronously and asynchronously
#[derive(Debug, Clone, Default)]
pub struct MixedSyncAsyncIoRule;

impl Rule for MixedSyncAsyncIoRule {
    fn id(&self) -> &'static str {
        "mixed-sync-async-io"
    }

    fn description(&self) -> &'static str {
        "File mixes sync and async I/O callables"
    }

    fn rationale(&self) -> &'static str {
        "Pick one I/O model per module; mixing them invites blocking calls on the event loop."
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Async
    }

    fn default_severity(&self) -> Severity {
        Severity::Info
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Unit
    }

    fn check_unit(&self, ctx: &UnitContext<'_>) -> Vec<Finding> {
        let m = ctx.metrics;
        if m.async_io_callables == 0 || m.sync_io_callables == 0 {
            return Vec::new();
        }
        vec![self
            .finding(
                Severity::Info,
                Location::unit(&m.path),
                format!(
                    "{} async and {} sync I/O callables in one file",
                    m.async_io_callables, m.sync_io_callables
                ),
            )
            .with_evidence("async_io_callables", m.async_io_callables)
            .with_evidence("sync_io_callables", m.sync_io_callables)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::check;
    use crate::symbols::{Callable, SideEffect, SideEffectKind, SourceUnit};

    fn io(name: &str, is_async: bool, blocking: bool) -> Callable {
        let mut c = Callable {
            is_async,
            ..Callable::new(name, 1, 10)
        };
        let mut effect = SideEffect::new(SideEffectKind::Network, "requests.get", 3);
        if blocking {
            effect = effect.blocking();
        }
        c.side_effects.push(effect);
        c
    }

    #[test]
    fn test_blocking_call_in_async() {
        let mut unit = SourceUnit::new("svc.py", "python");
        unit.callables = vec![io("a", true, true), io("b", false, true), io("c", true, false)];
        let findings = check(&BlockingCallInAsyncRule, &unit);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].location.callable.as_deref(), Some("a"));
    }

    #[test]
    fn test_mixed_sync_async_io() {
        let mut unit = SourceUnit::new("svc.py", "python");
        unit.callables = vec![io("a", true, false)];
        assert!(check(&MixedSyncAsyncIoRule, &unit).is_empty());

        unit.callables.push(io("b", false, true));
        let findings = check(&MixedSyncAsyncIoRule, &unit);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Info);
    }
}
