//! Retry, backoff and timeout rules for API-client code

use super::{CallableContext, Rule, RuleScope, SubRule};
use crate::config::{ConfigError, RuleSetConfig};
use crate::metrics::{is_non_transient_status, RetrySource};
use crate::models::{Finding, RuleCategory, Severity};
use crate::symbols::SideEffectKind;

const RETRY_NON_IDEMPOTENT: &str = "retry-non-idempotent";
const IDEMPOTENCY_KEY_EXEMPTION: &str = "retry-non-idempotent.idempotency-key-exemption";
const RETRY_NON_TRANSIENT_STATUS: &str = "retry-non-transient-status";
const RETRY_MISSING_BACKOFF: &str = "retry-missing-backoff";
const RETRY_UNBOUNDED: &str = "retry-unbounded";
const NETWORK_MISSING_TIMEOUT: &str = "network-missing-timeout";

fn source_name(source: RetrySource) -> &'static str {
    match source {
        RetrySource::None => "none",
        RetrySource::Local => "local",
        RetrySource::Delegated => "delegated",
    }
}

/// Retrying POST/PATCH without an idempotency key can duplicate side effects
#[derive(Debug, Clone)]
pub struct RetryNonIdempotentRule {
    idempotency_key_exemption: bool,
}

impl Default for RetryNonIdempotentRule {
    fn default() -> Self {
        Self {
            idempotency_key_exemption: true,
        }
    }
}

impl RetryNonIdempotentRule {
    pub fn with_config(config: &RuleSetConfig) -> Self {
        Self {
            idempotency_key_exemption: config.is_enabled(IDEMPOTENCY_KEY_EXEMPTION),
        }
    }
}

impl Rule for RetryNonIdempotentRule {
    fn id(&self) -> &'static str {
        RETRY_NON_IDEMPOTENT
    }

    fn description(&self) -> &'static str {
        "Retry wraps a mutating (POST/PATCH) network call"
    }

    fn rationale(&self) -> &'static str {
        "Only retry idempotent operations; a retried POST may charge, send or create twice."
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::ErrorHandling
    }

    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Callable
    }

    fn sub_rules(&self) -> &'static [SubRule] {
        &[SubRule {
            id: IDEMPOTENCY_KEY_EXEMPTION,
            description: "An idempotency-key marker in the callable makes the retry acceptable",
        }]
    }

    fn check_callable(&self, ctx: &CallableContext<'_>) -> Vec<Finding> {
        let m = ctx.metrics;
        let Some(first) = m.mutating_network.first() else {
            return Vec::new();
        };
        if !m.retry.is_present() || (self.idempotency_key_exemption && m.has_idempotency_key) {
            return Vec::new();
        }

        let methods: Vec<String> = m
            .mutating_network
            .iter()
            .map(|c| c.method.to_string())
            .collect();

        vec![self
            .finding(
                Severity::Error,
                ctx.location_at(first.line),
                format!(
                    "'{}' retries a {} request without an idempotency key",
                    m.name, first.method
                ),
            )
            .with_evidence("methods", methods)
            .with_evidence("retry_source", source_name(m.retry.source))
            .with_evidence("has_idempotency_key", m.has_idempotency_key)]
    }
}

/// Retry logic that matches client errors will never succeed
#[derive(Debug, Clone, Default)]
pub struct RetryNonTransientStatusRule;

impl Rule for RetryNonTransientStatusRule {
    fn id(&self) -> &'static str {
        RETRY_NON_TRANSIENT_STATUS
    }

    fn description(&self) -> &'static str {
        "Retry status set includes a non-transient (4xx) code"
    }

    fn rationale(&self) -> &'static str {
        "Retry only transient failures (408, 425, 429, 5xx); 400/401/403/404 fail the same way every time."
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::ErrorHandling
    }

    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Callable
    }

    fn check_callable(&self, ctx: &CallableContext<'_>) -> Vec<Finding> {
        let retry = &ctx.metrics.retry;
        if !retry.is_present() {
            return Vec::new();
        }
        let non_transient: Vec<String> = retry
            .statuses
            .iter()
            .filter(|code| is_non_transient_status(**code))
            .map(i64::to_string)
            .collect();
        if non_transient.is_empty() {
            return Vec::new();
        }

        let line = retry.line.unwrap_or(ctx.callable.line_start);
        vec![self
            .finding(
                Severity::Error,
                ctx.location_at(line),
                format!(
                    "'{}' retries on non-transient status {}",
                    ctx.metrics.name,
                    non_transient.join(", ")
                ),
            )
            .with_evidence(
                "statuses",
                retry.statuses.iter().map(i64::to_string).collect::<Vec<_>>(),
            )
            .with_evidence("non_transient", non_transient)]
    }
}

/// Immediate retries hammer a struggling dependency
#[derive(Debug, Clone, Default)]
pub struct RetryMissingBackoffRule;

impl Rule for RetryMissingBackoffRule {
    fn id(&self) -> &'static str {
        RETRY_MISSING_BACKOFF
    }

    fn description(&self) -> &'static str {
        "Retry without exponential backoff"
    }

    fn rationale(&self) -> &'static str {
        "Retries should back off exponentially with jitter so they do not amplify an outage."
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
        let retry = &ctx.metrics.retry;
        if !retry.is_present() || retry.has_backoff {
            return Vec::new();
        }

        let line = retry.line.unwrap_or(ctx.callable.line_start);
        vec![self
            .finding(
                Severity::Warning,
                ctx.location_at(line),
                format!("'{}' retries without backoff", ctx.metrics.name),
            )
            .with_evidence("retry_source", source_name(retry.source))
            .with_evidence("has_backoff", false)]
    }
}

/// Retries need a bounded attempt count
#[derive(Debug, Clone)]
pub struct RetryUnboundedRule {
    max_attempts: usize,
}

impl Default for RetryUnboundedRule {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

impl RetryUnboundedRule {
    pub fn with_config(config: &RuleSetConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            max_attempts: config.threshold(RETRY_UNBOUNDED, "max_attempts", 5)?,
        })
    }
}

impl Rule for RetryUnboundedRule {
    fn id(&self) -> &'static str {
        RETRY_UNBOUNDED
    }

    fn description(&self) -> &'static str {
        "Retry has no attempt cap, or the cap is too high"
    }

    fn rationale(&self) -> &'static str {
        "Cap retries at a small number of attempts and surface the failure afterwards."
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

    fn thresholds(&self) -> Vec<(&'static str, usize)> {
        vec![("max_attempts", self.max_attempts)]
    }

    fn check_callable(&self, ctx: &CallableContext<'_>) -> Vec<Finding> {
        let retry = &ctx.metrics.retry;
        let line = retry.line.unwrap_or(ctx.callable.line_start);

        let message = match retry.attempt_cap {
            None if retry.source == RetrySource::Local => format!(
                "'{}' retries with no attempt cap",
                ctx.metrics.name
            ),
            Some(cap) if retry.is_present() && cap > self.max_attempts as i64 => format!(
                "'{}' retries up to {} times (limit {})",
                ctx.metrics.name, cap, self.max_attempts
            ),
            _ => return Vec::new(),
        };

        let mut finding = self
            .finding(Severity::Warning, ctx.location_at(line), message)
            .with_evidence("max_attempts", self.max_attempts);
        if let Some(cap) = retry.attempt_cap {
            finding = finding.with_evidence("retry_attempt_cap", cap);
        }
        vec![finding]
    }
}

/// Network calls without a timeout can hang forever
#[derive(Debug, Clone, Default)]
pub struct NetworkMissingTimeoutRule;

impl Rule for NetworkMissingTimeoutRule {
    fn id(&self) -> &'static str {
        NETWORK_MISSING_TIMEOUT
    }

    fn description(&self) -> &'static str {
        "Network call with no timeout configured"
    }

    fn rationale(&self) -> &'static str {
        "Every outbound call needs an explicit timeout; library defaults are often infinite."
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
        if ctx.metrics.network_calls == 0 || ctx.metrics.has_timeout {
            return Vec::new();
        }
        let Some(call) = ctx
            .callable
            .side_effects
            .iter()
            .find(|e| e.kind == SideEffectKind::Network)
        else {
            return Vec::new();
        };

        vec![self
            .finding(
                Severity::Warning,
                ctx.location_at(call.line),
                format!(
                    "'{}' calls {} without a timeout",
                    ctx.metrics.name, call.target
                ),
            )
            .with_evidence("network_calls", ctx.metrics.network_calls)
            .with_evidence("has_timeout", false)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::check;
    use crate::symbols::{
        ArgValue, Argument, CallSite, Callable, HttpMethod, LiteralToken, LiteralValue,
        SideEffect, SourceUnit,
    };

    /// A tenacity-decorated callable posting to an API
    fn retrying_post() -> Callable {
        let mut c = Callable::new("create_charge", 10, 25);
        c.decorators.push("retry".into());
        c.calls.push(CallSite {
            args: vec![Argument {
                keyword: Some("timeout".into()),
                value: ArgValue::Literal(LiteralValue::Int(10)),
            }],
            ..CallSite::new("requests.post", 14)
        });
        c.side_effects.push(
            SideEffect::new(SideEffectKind::Network, "requests.post", 14)
                .with_method(HttpMethod::Post)
                .blocking(),
        );
        c
    }

    fn unit_of(callable: Callable) -> SourceUnit {
        let mut unit = SourceUnit::new("payments/client.py", "python");
        unit.callables.push(callable);
        unit
    }

    #[test]
    fn test_retry_on_post_without_key() {
        let findings = check(&RetryNonIdempotentRule::default(), &unit_of(retrying_post()));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Error);
        assert_eq!(findings[0].location.line, Some(14));
    }

    #[test]
    fn test_idempotency_key_removes_finding() {
        let mut c = retrying_post();
        c.literals.push(LiteralToken::new(
            12,
            None,
            LiteralValue::Str("Idempotency-Key".into()),
        ));
        assert!(check(&RetryNonIdempotentRule::default(), &unit_of(c.clone())).is_empty());

        let config: RuleSetConfig = toml::from_str(
            "[rules.\"retry-non-idempotent.idempotency-key-exemption\"]\nenabled = false\n",
        )
        .expect("valid toml");
        let strict = RetryNonIdempotentRule::with_config(&config);
        assert_eq!(check(&strict, &unit_of(c)).len(), 1);
    }

    #[test]
    fn test_retry_on_get_is_fine() {
        let mut c = retrying_post();
        c.side_effects[0].method = Some(HttpMethod::Get);
        assert!(check(&RetryNonIdempotentRule::default(), &unit_of(c)).is_empty());
    }

    fn with_statuses(codes: &[i64]) -> SourceUnit {
        let mut c = Callable::new("session", 1, 10);
        c.calls.push(CallSite::new("Retry", 3));
        for code in codes {
            c.literals.push(LiteralToken::new(
                3,
                Some("status_forcelist"),
                LiteralValue::Int(*code),
            ));
        }
        unit_of(c)
    }

    #[test]
    fn test_non_transient_status() {
        let findings = check(&RetryNonTransientStatusRule, &with_statuses(&[404, 503]));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Error);

        assert!(check(&RetryNonTransientStatusRule, &with_statuses(&[429, 502, 503, 504])).is_empty());
    }

    #[test]
    fn test_missing_backoff() {
        let findings = check(&RetryMissingBackoffRule, &unit_of(retrying_post()));
        assert_eq!(findings.len(), 1);

        let mut c = retrying_post();
        c.calls.push(CallSite::new("wait_exponential", 9));
        assert!(check(&RetryMissingBackoffRule, &unit_of(c)).is_empty());
    }

    #[test]
    fn test_unbounded_local_retry() {
        let mut c = Callable::new("poll", 1, 20);
        c.calls.push(CallSite {
            in_loop: true,
            ..CallSite::new("requests.get", 4)
        });
        c.calls.push(CallSite {
            in_loop: true,
            ..CallSite::new("time.sleep", 6)
        });
        c.side_effects
            .push(SideEffect::new(SideEffectKind::Network, "requests.get", 4));
        c.side_effects
            .push(SideEffect::new(SideEffectKind::Sleep, "time.sleep", 6));
        assert_eq!(check(&RetryUnboundedRule::default(), &unit_of(c.clone())).len(), 1);

        c.literals
            .push(LiteralToken::new(2, Some("max_retries"), LiteralValue::Int(3)));
        assert!(check(&RetryUnboundedRule::default(), &unit_of(c.clone())).is_empty());

        c.literals[0].value = LiteralValue::Int(10);
        assert_eq!(check(&RetryUnboundedRule::default(), &unit_of(c)).len(), 1);
    }

    #[test]
    fn test_network_missing_timeout() {
        assert!(check(&NetworkMissingTimeoutRule, &unit_of(retrying_post())).is_empty());

        let mut c = retrying_post();
        c.calls[0].args.clear();
        let findings = check(&NetworkMissingTimeoutRule, &unit_of(c));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].location.line, Some(14));
    }
}
