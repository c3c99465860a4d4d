//! Stricture - policy-compliance engine
//!
//! Evaluates a source tree against coding-standard heuristics (architecture,
//! testability, error handling, async usage, security, logging, naming) and
//! reports violations with evidence.
//!
//! ```text
//! files ─► SourceAdapter ─► SourceUnit ─► MetricExtractor ─► callable/unit rules ─┐
//!                                    └──► IndexBuilder ─► CrossFileIndex ─► index rules ─┤
//!                                                                      aggregate ◄───┘
//! ```

pub mod aggregate;
pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod index;
pub mod metrics;
pub mod models;
pub mod parsers;
pub mod reporters;
pub mod rules;
pub mod symbols;

pub use engine::{Evaluator, EvaluatorOptions};
pub use models::{Finding, ScanResult, Severity, Verdict};
pub use parsers::AdapterRegistry;
pub use rules::RuleSet;
