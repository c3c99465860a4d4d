//! Finding Aggregator
//!
//! Turns the raw findings of one run into the final [`ScanResult`]:
//! deterministic order, duplicates removed, summary counts attached.

use crate::models::{Finding, ScanResult, ScanSummary, Severity, Verdict};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

/// File counters gathered by the evaluator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileCounts {
    pub discovered: usize,
    pub analyzed: usize,
    pub failed: usize,
}

/// Report order: path, line, rule id, callable, message
pub fn compare_findings(a: &Finding, b: &Finding) -> Ordering {
    a.location
        .path
        .cmp(&b.location.path)
        .then_with(|| a.location.line.cmp(&b.location.line))
        .then_with(|| a.rule_id.cmp(&b.rule_id))
        .then_with(|| a.location.callable.cmp(&b.location.callable))
        .then_with(|| a.message.cmp(&b.message))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort into report order and drop duplicates (same rule, location and
/// evidence). Findings with equal keys sort next to each other, so one
/// pass over the sorted list is enough.
pub fn normalize(mut findings: Vec<Finding>) -> Vec<Finding> {
    findings.sort_by(compare_findings);
    findings.dedup_by(|later, earlier| later.dedupe_key() == earlier.dedupe_key());
    findings
}

/// Assemble the terminal result of one run
pub fn aggregate(findings: Vec<Finding>, files: FileCounts, incomplete: bool) -> ScanResult {
    let findings = normalize(findings);
    let mut summary = ScanSummary::from_findings(&findings);
    summary.files_discovered = files.discovered;
    summary.files_analyzed = files.analyzed;
    summary.files_failed = files.failed;

    ScanResult {
        findings,
        summary,
        incomplete,
    }
}

impl Verdict {
    /// Fail if any finding is at or above `threshold`
    pub fn for_threshold(result: &ScanResult, threshold: Severity) -> Self {
        result.verdict(threshold)
    }
}

pub fn group_by_rule(findings: &[Finding]) -> BTreeMap<&str, Vec<&Finding>> {
    let mut groups: BTreeMap<&str, Vec<&Finding>> = BTreeMap::new();
    for f in findings {
        groups.entry(f.rule_id.as_str()).or_default().push(f);
    }
    groups
}

pub fn group_by_file(findings: &[Finding]) -> BTreeMap<&Path, Vec<&Finding>> {
    let mut groups: BTreeMap<&Path, Vec<&Finding>> = BTreeMap::new();
    for f in findings {
        groups.entry(f.location.path.as_path()).or_default().push(f);
    }
    groups
}
