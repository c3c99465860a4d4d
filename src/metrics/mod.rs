//! Metric Extractor
//!
//! Pure functions from the immutable symbol model to per-callable and
//! per-unit metrics. Nothing here mutates a [`SourceUnit`]; running the
//! extractor twice on the same unit yields identical metrics.

pub mod names;
mod retry;

pub use retry::{
    has_idempotency_key, has_timeout, is_non_transient_status, retry_profile, RetryProfile,
    RetrySource,
};

use crate::models::EvidenceValue;
use crate::symbols::{
    Block, Callable, HttpMethod, SideEffectKind, SourceUnit, StructuralCategory,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Tunables for the mixed-concern predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// I/O callables a thin wrapper may hold before it counts as mixed
    pub wrapper_io_allowance: usize,
    /// Non-I/O callables a thin wrapper may hold alongside its I/O
    pub wrapper_caller_allowance: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            wrapper_io_allowance: 1,
            wrapper_caller_allowance: 1,
        }
    }
}

/// A mutating network call (method, line)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MutatingCall {
    pub method: HttpMethod,
    pub line: u32,
}

/// Metrics for one callable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallableMetrics {
    pub name: String,
    pub line: u32,
    pub category: StructuralCategory,
    pub param_count: usize,
    pub body_lines: u32,
    pub max_nesting: usize,
    pub is_async: bool,
    /// Side effects other than sleeps
    pub io_calls: usize,
    pub network_calls: usize,
    /// Lines of blocking side effects
    pub blocking_calls: Vec<(String, u32)>,
    pub has_timeout: bool,
    pub retry: RetryProfile,
    pub mutating_network: Vec<MutatingCall>,
    pub has_idempotency_key: bool,
    /// Parameters whose names look like credentials or personal data
    pub sensitive_params: Vec<String>,
}

impl CallableMetrics {
    pub fn has_io(&self) -> bool {
        self.io_calls > 0
    }

    /// Look up a metric by its exported name
    pub fn metric(&self, name: &str) -> Option<EvidenceValue> {
        let value = match name {
            "param_count" => self.param_count.into(),
            "body_lines" => self.body_lines.into(),
            "max_nesting" => self.max_nesting.into(),
            "io_calls" => self.io_calls.into(),
            "network_calls" => self.network_calls.into(),
            "is_async" => self.is_async.into(),
            "has_retry" => self.retry.is_present().into(),
            "has_timeout" => self.has_timeout.into(),
            "has_backoff" => self.retry.has_backoff.into(),
            "has_idempotency_key" => self.has_idempotency_key.into(),
            "retry_attempt_cap" => self.retry.attempt_cap?.into(),
            _ => return None,
        };
        Some(value)
    }
}

/// Metrics for one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitMetrics {
    pub path: PathBuf,
    pub line_count: u32,
    pub body_lines: u32,
    pub callables: Vec<CallableMetrics>,
    pub io_callables: usize,
    pub pure_callables: usize,
    pub categories: BTreeSet<StructuralCategory>,
    /// Every callable shares one structural category
    pub uniform: bool,
    pub mixed_concern: bool,
    pub async_io_callables: usize,
    pub sync_io_callables: usize,
    /// Callables that hand-roll retry logic (name, line)
    pub local_retry: Vec<(String, u32)>,
}

impl UnitMetrics {
    pub fn metric(&self, name: &str) -> Option<EvidenceValue> {
        let value = match name {
            "line_count" => self.line_count.into(),
            "body_lines" => self.body_lines.into(),
            "callable_count" => self.callables.len().into(),
            "io_callables" => self.io_callables.into(),
            "pure_callables" => self.pure_callables.into(),
            "uniform" => self.uniform.into(),
            "mixed_concern" => self.mixed_concern.into(),
            "categories" => EvidenceValue::List(
                self.categories
                    .iter()
                    .map(|c| category_name(*c).to_string())
                    .collect(),
            ),
            _ => return None,
        };
        Some(value)
    }

    pub fn callable(&self, name: &str) -> Option<&CallableMetrics> {
        self.callables.iter().find(|c| c.name == name)
    }
}

pub fn category_name(category: StructuralCategory) -> &'static str {
    match category {
        StructuralCategory::Logic => "logic",
        StructuralCategory::DataShape => "data-shape",
        StructuralCategory::Test => "test",
        StructuralCategory::Constant => "constant",
    }
}

/// Maximum block depth of a callable body
pub fn max_nesting(body: &[Block]) -> usize {
    body.iter().map(Block::depth).max().unwrap_or(0)
}

/// Computes [`CallableMetrics`] and [`UnitMetrics`]
#[derive(Debug, Clone, Default)]
pub struct MetricExtractor {
    config: ExtractorConfig,
}

impl MetricExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn extract_callable(&self, callable: &Callable) -> CallableMetrics {
        let io_calls = callable.side_effects.iter().filter(|e| e.is_io()).count();
        let network: Vec<_> = callable
            .side_effects
            .iter()
            .filter(|e| e.kind == SideEffectKind::Network)
            .collect();

        let mutating_network = network
            .iter()
            .filter_map(|e| {
                let method = e.method?;
                (!method.is_idempotent()).then_some(MutatingCall {
                    method,
                    line: e.line,
                })
            })
            .collect();

        let blocking_calls = callable
            .side_effects
            .iter()
            .filter(|e| e.blocking)
            .map(|e| (e.target.clone(), e.line))
            .collect();

        let sensitive_params = callable
            .param_names()
            .filter(|p| names::is_sensitive_name(p))
            .map(str::to_string)
            .collect();

        CallableMetrics {
            name: callable.name.clone(),
            line: callable.line_start,
            category: callable.category,
            param_count: callable.params.len(),
            body_lines: callable.body_lines(),
            max_nesting: max_nesting(&callable.body),
            is_async: callable.is_async,
            io_calls,
            network_calls: network.len(),
            blocking_calls,
            has_timeout: has_timeout(callable),
            retry: retry_profile(callable),
            mutating_network,
            has_idempotency_key: has_idempotency_key(callable),
            sensitive_params,
        }
    }

    pub fn extract(&self, unit: &SourceUnit) -> UnitMetrics {
        let callables: Vec<CallableMetrics> = unit
            .callables
            .iter()
            .map(|c| self.extract_callable(c))
            .collect();

        let (io, pure): (Vec<_>, Vec<_>) = callables
            .iter()
            .filter(|c| c.category != StructuralCategory::Test)
            .partition(|c| c.has_io());
        let (io_callables, pure_callables) = (io.len(), pure.len());
        let async_io_callables = io.iter().filter(|c| c.is_async).count();
        let categories: BTreeSet<_> = callables.iter().map(|c| c.category).collect();
        let local_retry = callables
            .iter()
            .filter(|c| c.retry.source == RetrySource::Local)
            .map(|c| (c.name.clone(), c.retry.line.unwrap_or(c.line)))
            .collect();

        UnitMetrics {
            path: unit.path.clone(),
            line_count: unit.line_count,
            body_lines: unit.body_lines(),
            io_callables,
            pure_callables,
            uniform: categories.len() <= 1,
            mixed_concern: self.is_mixed(io_callables, pure_callables),
            async_io_callables,
            sync_io_callables: io_callables - async_io_callables,
            categories,
            local_retry,
            callables,
        }
    }

    /// Mixed: I/O and non-I/O callables side by side, beyond what a thin
    /// wrapper is allowed.
    pub fn is_mixed(&self, io_callables: usize, pure_callables: usize) -> bool {
        io_callables >= 1
            && pure_callables >= 1
            && !(io_callables <= self.config.wrapper_io_allowance
                && pure_callables <= self.config.wrapper_caller_allowance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{BlockKind, Parameter, SideEffect};

    fn io_callable(name: &str, line: u32) -> Callable {
        let mut c = Callable::new(name, line, line + 5);
        c.side_effects.push(
            SideEffect::new(SideEffectKind::Network, "requests.post", line + 1)
                .with_method(HttpMethod::Post)
                .blocking(),
        );
        c
    }

    fn shape(name: &str, line: u32) -> Callable {
        Callable {
            category: StructuralCategory::DataShape,
            ..Callable::new(name, line, line + 3)
        }
    }

    #[test]
    fn test_callable_metrics() {
        let mut c = io_callable("submit", 10);
        c.params = vec![Parameter::named("order"), Parameter::named("api_token")];
        c.body = vec![Block::new(BlockKind::Loop, 11)
            .with_children(vec![Block::new(BlockKind::Branch, 12)])];
        let m = MetricExtractor::default().extract_callable(&c);
        assert_eq!(m.param_count, 2);
        assert_eq!(m.max_nesting, 2);
        assert_eq!(m.network_calls, 1);
        assert_eq!(m.mutating_network.len(), 1);
        assert_eq!(m.sensitive_params, vec!["api_token".to_string()]);
        assert_eq!(m.metric("param_count"), Some(EvidenceValue::Int(2)));
        assert_eq!(m.metric("retry_attempt_cap"), None);
    }

    #[test]
    fn test_thin_wrapper_is_not_mixed() {
        let mut unit = SourceUnit::new("client.py", "python");
        unit.callables = vec![io_callable("fetch", 1), Callable::new("fetch_all", 10, 12)];
        let m = MetricExtractor::default().extract(&unit);
        assert!(!m.mixed_concern);
    }

    #[test]
    fn test_mixed_unit() {
        let mut unit = SourceUnit::new("orders.py", "python");
        unit.callables = vec![
            shape("Order", 1),
            shape("Item", 10),
            shape("Address", 20),
            io_callable("send", 30),
            io_callable("sync", 40),
        ];
        let m = MetricExtractor::default().extract(&unit);
        assert!(m.mixed_concern);
        assert_eq!(m.io_callables, 2);
        assert_eq!(m.pure_callables, 3);
        assert!(!m.uniform);
    }

    #[test]
    fn test_uniform_unit() {
        let mut unit = SourceUnit::new("schemas.py", "python");
        unit.callables = vec![shape("A", 1), shape("B", 5)];
        let m = MetricExtractor::default().extract(&unit);
        assert!(m.uniform);
        assert!(!m.mixed_concern);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let mut unit = SourceUnit::new("orders.py", "python");
        unit.callables = vec![io_callable("a", 1), shape("B", 10), io_callable("c", 20)];
        let extractor = MetricExtractor::default();
        assert_eq!(extractor.extract(&unit), extractor.extract(&unit));
    }
}
