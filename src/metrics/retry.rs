//! Retry, backoff and timeout detection for API-client code
//!
//! Everything here is lexical: call targets, keyword names and literal
//! bindings are matched against a small vocabulary. A negative result is a
//! valid answer, never an error.

use super::names::{has_segment, is_idempotency_key_name, name_segments};
use crate::symbols::{ArgValue, Callable, HandlerAction, LiteralValue, SideEffectKind};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// Call/decorator target segments that delegate to a retry helper
const RETRY_TARGETS: &[&str] = &[
    "retry",
    "retrying",
    "retries",
    "tenacity",
    "retrier",
    "retryable",
];

/// Segment pairs that delegate to a retry helper (`backoff.on_exception`)
const RETRY_TARGET_PAIRS: &[(&str, &str)] = &[("on", "exception"), ("on", "predicate")];

const BACKOFF_SEGMENTS: &[&str] = &["backoff", "exponential", "expo", "jitter", "exponent"];

const TIMEOUT_SEGMENTS: &[&str] = &["timeout", "timeouts", "deadline"];

const ATTEMPT_NAMES: &[&str] = &[
    "max_attempts",
    "max_retries",
    "max_tries",
    "retries",
    "attempts",
    "tries",
    "total",
    "stop_after_attempt",
    "retry_count",
    "max_retry",
];

const STATUS_SEGMENTS: &[&str] = &["status", "statuses", "forcelist"];

/// Segment pairs naming a retry status list (`retry_on`, `retryable_codes`)
const STATUS_PAIRS: &[(&str, &str)] = &[
    ("retry", "on"),
    ("retry", "codes"),
    ("retryable", "codes"),
    ("retryable", "errors"),
];

/// Where a callable's retry behaviour comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetrySource {
    #[default]
    None,
    /// Hand-written loop/handler retrying in place
    Local,
    /// Decorator or helper call from a retry library or shared module
    Delegated,
}

/// Retry-related facts for one callable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct RetryProfile {
    pub source: RetrySource,
    /// First line where retry behaviour was seen
    pub line: Option<u32>,
    pub has_backoff: bool,
    pub attempt_cap: Option<i64>,
    /// Status codes the retry logic matches on
    pub statuses: BTreeSet<i64>,
}

impl RetryProfile {
    pub fn is_present(&self) -> bool {
        self.source != RetrySource::None
    }
}

fn is_retry_target(target: &str) -> bool {
    let segments = name_segments(target);
    segments
        .iter()
        .any(|s| RETRY_TARGETS.contains(&s.as_str()) || s.starts_with("retry"))
        || segments.windows(2).any(|w| {
            RETRY_TARGET_PAIRS
                .iter()
                .any(|(a, b)| w[0] == *a && w[1] == *b)
        })
}

fn is_attempt_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    ATTEMPT_NAMES.contains(&lower.as_str())
}

/// `status_forcelist`, `status_code`, `retry_on`; not `error_code` or `port`
fn is_status_name(name: &str) -> bool {
    let segments = name_segments(name);
    segments.iter().any(|s| STATUS_SEGMENTS.contains(&s.as_str()))
        || segments
            .windows(2)
            .any(|w| STATUS_PAIRS.iter().any(|(a, b)| w[0] == *a && w[1] == *b))
}

/// Build the retry profile of a callable
pub fn retry_profile(callable: &Callable) -> RetryProfile {
    let mut profile = RetryProfile::default();

    // Local retry: a handler that retries, or a loop that calls the network
    // and sleeps between attempts.
    let loop_lines: HashSet<u32> = callable
        .calls
        .iter()
        .filter(|c| c.in_loop)
        .map(|c| c.line)
        .collect();
    let network_in_loop = callable
        .side_effects
        .iter()
        .filter(|e| e.kind == SideEffectKind::Network && loop_lines.contains(&e.line))
        .map(|e| e.line)
        .min();
    let sleep_in_loop = callable.calls.iter().any(|c| c.in_loop && c.short_name() == "sleep")
        || callable
            .side_effects
            .iter()
            .any(|e| e.kind == SideEffectKind::Sleep && loop_lines.contains(&e.line));
    let retry_handler = callable
        .error_handlers
        .iter()
        .filter(|h| h.action == HandlerAction::Retry)
        .map(|h| h.line)
        .min();

    let delegated_line = callable
        .decorators
        .iter()
        .find(|d| is_retry_target(d))
        .map(|_| callable.line_start)
        .or_else(|| {
            callable
                .calls
                .iter()
                .find(|c| is_retry_target(&c.target))
                .map(|c| c.line)
        });

    if let Some(line) = retry_handler {
        profile.source = RetrySource::Local;
        profile.line = Some(line);
    } else if let (Some(line), true) = (network_in_loop, sleep_in_loop) {
        profile.source = RetrySource::Local;
        profile.line = Some(line);
    } else if let Some(line) = delegated_line {
        profile.source = RetrySource::Delegated;
        profile.line = Some(line);
    }

    profile.has_backoff = detect_backoff(callable);
    profile.attempt_cap = detect_attempt_cap(callable);
    profile.statuses = detect_statuses(callable);
    profile
}

fn detect_backoff(callable: &Callable) -> bool {
    let in_targets = callable
        .decorators
        .iter()
        .chain(callable.calls.iter().map(|c| &c.target))
        .any(|t| has_segment(t, BACKOFF_SEGMENTS) || has_segment(t, &["wait"]) && t.contains('_'));
    if in_targets {
        return true;
    }

    let in_keywords = callable
        .calls
        .iter()
        .flat_map(|c| c.args.iter())
        .filter_map(|a| a.keyword.as_deref())
        .any(|k| has_segment(k, BACKOFF_SEGMENTS));
    if in_keywords {
        return true;
    }

    let in_bindings = callable
        .literals
        .iter()
        .filter_map(|l| l.binding.as_deref())
        .any(|b| has_segment(b, BACKOFF_SEGMENTS));
    if in_bindings {
        return true;
    }

    // A sleep whose delay is computed (`sleep(2 ** attempt)`) backs off;
    // a constant delay does not.
    callable.calls.iter().any(|c| {
        c.short_name() == "sleep"
            && c.args
                .first()
                .is_some_and(|a| !matches!(a.value, ArgValue::Literal(_)))
    })
}

fn detect_attempt_cap(callable: &Callable) -> Option<i64> {
    let from_literals = callable.literals.iter().find_map(|l| {
        let binding = l.binding.as_deref()?;
        if is_attempt_name(binding) {
            l.value.as_int()
        } else {
            None
        }
    });
    if from_literals.is_some() {
        return from_literals;
    }

    callable.calls.iter().find_map(|c| {
        if is_attempt_name(c.short_name()) {
            // stop_after_attempt(3)
            return c.args.iter().find_map(|a| match &a.value {
                ArgValue::Literal(LiteralValue::Int(i)) if a.keyword.is_none() => Some(*i),
                _ => None,
            });
        }
        c.args.iter().find_map(|a| match (&a.keyword, &a.value) {
            (Some(k), ArgValue::Literal(LiteralValue::Int(i))) if is_attempt_name(k) => Some(*i),
            _ => None,
        })
    })
}

fn detect_statuses(callable: &Callable) -> BTreeSet<i64> {
    let mut statuses = BTreeSet::new();
    let mut record = |binding: &str, value: &LiteralValue| {
        if let Some(code) = value.as_int() {
            if (100..=599).contains(&code) && is_status_name(binding) {
                statuses.insert(code);
            }
        }
    };

    for literal in &callable.literals {
        if let Some(binding) = literal.binding.as_deref() {
            record(binding, &literal.value);
        }
    }
    for arg in callable.calls.iter().flat_map(|c| c.args.iter()) {
        if let (Some(k), ArgValue::Literal(v)) = (arg.keyword.as_deref(), &arg.value) {
            record(k, v);
        }
    }
    statuses
}

/// Callable constructs or calls a client with a timeout
pub fn has_timeout(callable: &Callable) -> bool {
    callable.calls.iter().any(|c| {
        has_segment(&c.target, TIMEOUT_SEGMENTS)
            || c.args
                .iter()
                .filter_map(|a| a.keyword.as_deref())
                .any(|k| has_segment(k, TIMEOUT_SEGMENTS))
    }) || callable
        .literals
        .iter()
        .filter_map(|l| l.binding.as_deref())
        .any(|b| has_segment(b, TIMEOUT_SEGMENTS))
        || callable.decorators.iter().any(|d| has_segment(d, TIMEOUT_SEGMENTS))
}

/// An idempotency key is attached somewhere in the callable
pub fn has_idempotency_key(callable: &Callable) -> bool {
    callable.param_names().any(is_idempotency_key_name)
        || callable.literals.iter().any(|l| {
            l.binding.as_deref().is_some_and(is_idempotency_key_name)
                || l.value.as_str().is_some_and(is_idempotency_key_name)
        })
        || callable.calls.iter().any(|c| {
            is_idempotency_key_name(c.short_name())
                || c.args.iter().any(|a| {
                    a.keyword.as_deref().is_some_and(is_idempotency_key_name)
                        || matches!(&a.value, ArgValue::Identifier(id) if is_idempotency_key_name(id))
                        || matches!(&a.value, ArgValue::Literal(LiteralValue::Str(s)) if is_idempotency_key_name(s))
                })
        })
}

/// Non-transient status: 4xx except timeout/too-early/rate-limit
pub fn is_non_transient_status(code: i64) -> bool {
    (400..500).contains(&code) && !matches!(code, 408 | 425 | 429)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{Argument, CallSite, ErrorHandler, LiteralToken, SideEffect};

    fn http_call(target: &str, line: u32, in_loop: bool) -> CallSite {
        CallSite {
            in_loop,
            ..CallSite::new(target, line)
        }
    }

    #[test]
    fn test_delegated_retry_from_decorator() {
        let mut c = Callable::new("fetch", 10, 20);
        c.decorators.push("tenacity.retry".into());
        c.calls.push(CallSite {
            args: vec![Argument {
                keyword: None,
                value: ArgValue::Literal(LiteralValue::Int(3)),
            }],
            ..CallSite::new("stop_after_attempt", 9)
        });
        c.calls.push(CallSite::new("wait_exponential", 9));
        let p = retry_profile(&c);
        assert_eq!(p.source, RetrySource::Delegated);
        assert_eq!(p.attempt_cap, Some(3));
        assert!(p.has_backoff);
    }

    #[test]
    fn test_local_retry_loop_with_sleep() {
        let mut c = Callable::new("push", 1, 15);
        c.calls.push(http_call("requests.post", 4, true));
        c.calls.push(http_call("time.sleep", 8, true));
        c.side_effects
            .push(SideEffect::new(SideEffectKind::Network, "requests.post", 4));
        c.side_effects
            .push(SideEffect::new(SideEffectKind::Sleep, "time.sleep", 8));
        let p = retry_profile(&c);
        assert_eq!(p.source, RetrySource::Local);
        assert_eq!(p.line, Some(4));
        assert!(!p.has_backoff);
        assert_eq!(p.attempt_cap, None);
    }

    #[test]
    fn test_local_retry_from_handler() {
        let mut c = Callable::new("sync", 1, 15);
        c.error_handlers.push(ErrorHandler {
            line: 7,
            caught: vec!["ConnectionError".into()],
            action: HandlerAction::Retry,
        });
        assert_eq!(retry_profile(&c).source, RetrySource::Local);
    }

    #[test]
    fn test_statuses_from_bound_literals() {
        let mut c = Callable::new("session", 1, 10);
        for code in [429, 502, 503, 504] {
            c.literals.push(LiteralToken::new(
                3,
                Some("status_forcelist"),
                LiteralValue::Int(code),
            ));
        }
        c.literals
            .push(LiteralToken::new(4, Some("port"), LiteralValue::Int(443)));
        let p = retry_profile(&c);
        assert_eq!(p.statuses, BTreeSet::from([429, 502, 503, 504]));
    }

    #[test]
    fn test_status_bindings_need_a_status_name() {
        let mut c = Callable::new("sync", 1, 10);
        c.error_handlers.push(ErrorHandler {
            line: 5,
            caught: vec!["HTTPError".into()],
            action: HandlerAction::Retry,
        });
        c.literals
            .push(LiteralToken::new(3, Some("error_code"), LiteralValue::Int(404)));
        c.literals
            .push(LiteralToken::new(3, Some("exit_codes"), LiteralValue::Int(500)));
        c.literals
            .push(LiteralToken::new(4, Some("retry_on"), LiteralValue::Int(503)));
        c.calls.push(CallSite {
            args: vec![Argument {
                keyword: Some("status_code".into()),
                value: ArgValue::Literal(LiteralValue::Int(429)),
            }],
            ..CallSite::new("should_retry", 6)
        });
        assert_eq!(retry_profile(&c).statuses, BTreeSet::from([429, 503]));

        assert!(is_status_name("status_forcelist"));
        assert!(is_status_name("retryableCodes"));
        assert!(!is_status_name("error_code"));
        assert!(!is_status_name("region_code"));
    }

    #[test]
    fn test_non_transient_status() {
        assert!(is_non_transient_status(404));
        assert!(is_non_transient_status(401));
        assert!(!is_non_transient_status(429));
        assert!(!is_non_transient_status(503));
    }

    #[test]
    fn test_timeout_and_idempotency_markers() {
        let mut c = Callable::new("charge", 1, 10);
        c.calls.push(CallSite {
            args: vec![Argument {
                keyword: Some("timeout".into()),
                value: ArgValue::Literal(LiteralValue::Int(5)),
            }],
            ..CallSite::new("requests.post", 3)
        });
        assert!(has_timeout(&c));
        assert!(!has_idempotency_key(&c));

        c.literals.push(LiteralToken::new(
            2,
            None,
            LiteralValue::Str("Idempotency-Key".into()),
        ));
        assert!(has_idempotency_key(&c));
    }
}
