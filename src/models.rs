//! Core data models for Stricture
//!
//! These models are shared by rules, the evaluator, the aggregator and the
//! report adapters: severities, rule categories, findings and scan results.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

/// Generate a deterministic finding ID from the dedupe key.
///
/// Two findings with the same rule, location and evidence get the same ID,
/// so IDs are stable across runs and usable for suppression.
pub fn deterministic_finding_id(
    rule_id: &str,
    location: &Location,
    evidence: &BTreeMap<String, EvidenceValue>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rule_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(location.path.to_string_lossy().as_bytes());
    hasher.update(b"\n");
    hasher.update(location.callable.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"\n");
    hasher.update(location.line.unwrap_or(0).to_le_bytes());
    for (key, value) in evidence {
        hasher.update(b"\n");
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.to_string().as_bytes());
    }
    let digest = hasher.finalize();
    digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

/// Severity levels for findings
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Error, Severity::Warning, Severity::Info];
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            other => Err(format!(
                "unknown severity '{}' (expected error, warning or info)",
                other
            )),
        }
    }
}

/// Policy area a rule belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleCategory {
    Architecture,
    Naming,
    Testability,
    Async,
    ErrorHandling,
    Security,
    Logging,
    ScanError,
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RuleCategory::Architecture => "architecture",
            RuleCategory::Naming => "naming",
            RuleCategory::Testability => "testability",
            RuleCategory::Async => "async",
            RuleCategory::ErrorHandling => "error-handling",
            RuleCategory::Security => "security",
            RuleCategory::Logging => "logging",
            RuleCategory::ScanError => "scan-error",
        };
        f.write_str(s)
    }
}

/// Where a finding points: a unit, optionally a callable and a line
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl Location {
    pub fn unit(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            callable: None,
            line: None,
        }
    }

    pub fn callable(path: impl Into<PathBuf>, name: impl Into<String>, line: u32) -> Self {
        Self {
            path: path.into(),
            callable: Some(name.into()),
            line: Some(line),
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        if let Some(ref name) = self.callable {
            write!(f, " ({})", name)?;
        }
        Ok(())
    }
}

/// A metric value recorded as evidence for a finding.
///
/// No floating point variant: evidence takes part in equality and hashing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EvidenceValue {
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<String>),
}

impl std::fmt::Display for EvidenceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvidenceValue::Bool(b) => write!(f, "{}", b),
            EvidenceValue::Int(i) => write!(f, "{}", i),
            EvidenceValue::Text(s) => f.write_str(s),
            EvidenceValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<bool> for EvidenceValue {
    fn from(v: bool) -> Self {
        EvidenceValue::Bool(v)
    }
}

impl From<usize> for EvidenceValue {
    fn from(v: usize) -> Self {
        EvidenceValue::Int(v as i64)
    }
}

impl From<u32> for EvidenceValue {
    fn from(v: u32) -> Self {
        EvidenceValue::Int(v as i64)
    }
}

impl From<i64> for EvidenceValue {
    fn from(v: i64) -> Self {
        EvidenceValue::Int(v)
    }
}

impl From<&str> for EvidenceValue {
    fn from(v: &str) -> Self {
        EvidenceValue::Text(v.to_string())
    }
}

impl From<String> for EvidenceValue {
    fn from(v: String) -> Self {
        EvidenceValue::Text(v)
    }
}

impl From<Vec<String>> for EvidenceValue {
    fn from(v: Vec<String>) -> Self {
        EvidenceValue::List(v)
    }
}

/// A rule violation or scan diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub rule_id: String,
    pub category: RuleCategory,
    pub severity: Severity,
    pub message: String,
    pub location: Location,
    /// Other places taking part in the same violation (index-level rules)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<Location>,
    /// Metric values that triggered the finding
    #[serde(default)]
    pub evidence: BTreeMap<String, EvidenceValue>,
    /// Why the policy exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl Finding {
    /// Start a finding for `rule_id` at `location`.
    pub fn new(
        rule_id: &str,
        category: RuleCategory,
        severity: Severity,
        location: Location,
        message: impl Into<String>,
    ) -> Self {
        let mut finding = Self {
            id: String::new(),
            rule_id: rule_id.to_string(),
            category,
            severity,
            message: message.into(),
            location,
            related: Vec::new(),
            evidence: BTreeMap::new(),
            rationale: None,
        };
        finding.refresh_id();
        finding
    }

    pub fn with_evidence(mut self, key: &str, value: impl Into<EvidenceValue>) -> Self {
        self.evidence.insert(key.to_string(), value.into());
        self.refresh_id();
        self
    }

    pub fn with_related(mut self, related: Vec<Location>) -> Self {
        self.related = related;
        self
    }

    pub fn with_rationale(mut self, rationale: &str) -> Self {
        self.rationale = Some(rationale.to_string());
        self
    }

    /// The identity used for deduplication.
    pub fn dedupe_key(&self) -> (&str, &Location, &BTreeMap<String, EvidenceValue>) {
        (&self.rule_id, &self.location, &self.evidence)
    }

    pub fn is_scan_error(&self) -> bool {
        self.category == RuleCategory::ScanError
    }

    fn refresh_id(&mut self) {
        self.id = deterministic_finding_id(&self.rule_id, &self.location, &self.evidence);
    }
}

/// Summary counts for one scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
    pub total: usize,
    /// Findings produced by policy rules (excludes scan errors)
    pub rule_violations: usize,
    pub files_discovered: usize,
    pub files_analyzed: usize,
    pub files_failed: usize,
}

impl ScanSummary {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut summary = Self::default();
        for f in findings {
            match f.severity {
                Severity::Error => summary.errors += 1,
                Severity::Warning => summary.warnings += 1,
                Severity::Info => summary.infos += 1,
            }
            if !f.is_scan_error() {
                summary.rule_violations += 1;
            }
            summary.total += 1;
        }
        summary
    }

    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Error => self.errors,
            Severity::Warning => self.warnings,
            Severity::Info => self.infos,
        }
    }
}

/// Outcome of a run measured against a severity threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

/// Terminal artifact of one evaluator run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub findings: Vec<Finding>,
    pub summary: ScanSummary,
    /// Set when the run hit its timeout; findings are partial
    #[serde(default)]
    pub incomplete: bool,
}

impl ScanResult {
    /// Pass/fail against a threshold: fails if any finding is at or above it.
    pub fn verdict(&self, threshold: Severity) -> Verdict {
        if self.findings.iter().any(|f| f.severity >= threshold) {
            Verdict::Fail
        } else {
            Verdict::Pass
        }
    }

    pub fn findings_for_rule<'a>(&'a self, rule_id: &'a str) -> impl Iterator<Item = &'a Finding> {
        self.findings.iter().filter(move |f| f.rule_id == rule_id)
    }
}
