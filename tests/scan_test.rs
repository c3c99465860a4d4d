//! End-to-end scans through the library API
//!
//! Each test writes a small source tree into a temp dir, runs the evaluator
//! with the built-in adapters and checks the aggregated result.

use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;
use stricture::config::{load_ruleset_config, RuleSetConfig};
use stricture::engine::{Evaluator, EvaluatorOptions};
use stricture::models::{EvidenceValue, Severity, Verdict};
use stricture::parsers::AdapterRegistry;
use stricture::rules::RuleSet;
use stricture::ScanResult;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn scan_with(root: &Path, config: &RuleSetConfig) -> ScanResult {
    let rules = Arc::new(RuleSet::from_config(config).unwrap());
    let options = EvaluatorOptions {
        workers: 2,
        extractor: config.metrics,
        ..Default::default()
    };
    Evaluator::new(rules, options)
        .scan_path(root, Arc::new(AdapterRegistry::default()), &config.scan.exclude)
        .unwrap()
}

fn scan(root: &Path) -> ScanResult {
    scan_with(root, &load_ruleset_config(root).unwrap())
}

/// A ~600 line module: three wide data shapes plus two network callables
fn large_mixed_module() -> String {
    let mut src = String::from("from dataclasses import dataclass\n\nimport requests\n");
    for class in ["Invoice", "LineItem", "Customer"] {
        write!(src, "\n\n@dataclass\nclass {}:\n", class).unwrap();
        for i in 0..200 {
            writeln!(src, "    field_{}: int", i).unwrap();
        }
    }
    src.push_str(
        r#"

def fetch_invoice(base_url, invoice_id):
    return requests.get(f"{base_url}/invoices/{invoice_id}", timeout=5)


def send_invoice(base_url, invoice):
    return requests.put(f"{base_url}/invoices", json=invoice, timeout=5)
"#,
    );
    src
}

#[test]
fn test_large_mixed_module() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/billing/invoices.py", &large_mixed_module());

    let result = scan(dir.path());
    let rules: Vec<_> = result.findings.iter().map(|f| f.rule_id.as_str()).collect();
    assert_eq!(rules, vec!["file-size", "mixed-concern"], "{:#?}", result.findings);

    let size = &result.findings[0];
    assert_eq!(size.severity, Severity::Warning);
    let Some(EvidenceValue::Int(body)) = size.evidence.get("body_lines") else {
        panic!("body_lines evidence missing");
    };
    assert!(*body > 500 && *body < 1000, "body lines {}", body);

    let mixed = &result.findings[1];
    assert_eq!(mixed.severity, Severity::Error);
    assert_eq!(mixed.location.path, Path::new("src/billing/invoices.py"));

    assert_eq!(result.summary.files_analyzed, 1);
    assert_eq!(result.verdict(Severity::Error), Verdict::Fail);
    assert!(!result.incomplete);
}

#[test]
fn test_uniform_module_is_exempt_from_size_warning() {
    let dir = tempfile::tempdir().unwrap();
    let mut src = String::from("from enum import Enum\n\n\nclass Code(Enum):\n");
    for i in 0..600 {
        writeln!(src, "    CODE_{} = {}", i, i).unwrap();
    }
    write(dir.path(), "src/catalog/codes.py", &src);

    let result = scan(dir.path());
    assert!(result.findings_for_rule("file-size").next().is_none());
    assert_eq!(result.summary.total, 0, "{:#?}", result.findings);
}

#[test]
fn test_retry_policy_findings() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "src/payments/gateway.py",
        r#"
import time
import requests


def submit_payment(url, payload):
    for attempt in range(3):
        try:
            return requests.post(url, json=payload, timeout=10)
        except requests.ConnectionError:
            time.sleep(2 ** attempt)
            continue
"#,
    );

    let result = scan(dir.path());
    let finding = result
        .findings_for_rule("retry-non-idempotent")
        .next()
        .expect("non-idempotent retry");
    assert_eq!(finding.severity, Severity::Error);
    assert_eq!(finding.location.callable.as_deref(), Some("submit_payment"));
    assert!(result.findings_for_rule("retry-missing-backoff").next().is_none());
    assert!(result.findings_for_rule("network-missing-timeout").next().is_none());
}

#[test]
fn test_parse_failure_is_reported_and_scan_continues() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app/ok.py", "def total(items):\n    return sum(items)\n");
    write(dir.path(), "app/broken.py", "def broken(:\n    pass\n");

    let result = scan(dir.path());
    assert_eq!(result.summary.files_discovered, 2);
    assert_eq!(result.summary.files_analyzed, 1);
    assert_eq!(result.summary.files_failed, 1);

    let error = result.findings_for_rule("scan-error").next().expect("scan error");
    assert_eq!(error.location.path, Path::new("app/broken.py"));
    assert_eq!(error.severity, Severity::Warning);
    assert_eq!(result.summary.rule_violations, 0);
}

#[test]
fn test_configuration_disables_and_overrides() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/billing/invoices.py", &large_mixed_module());
    write(
        dir.path(),
        "stricture.toml",
        r#"
[rules.mixed-concern]
enabled = false

[rules.file-size]
severity = "error"
thresholds = { max_lines = 700 }

[scan]
exclude = ["vendor/**"]
"#,
    );
    write(dir.path(), "vendor/utils.py", "def x():\n    pass\n");

    let result = scan(dir.path());
    assert!(result.findings.is_empty(), "{:#?}", result.findings);
    assert_eq!(result.summary.files_discovered, 1);

    let config = load_ruleset_config(dir.path()).unwrap();
    let mut strict = config.clone();
    strict.rules.get_mut("file-size").unwrap().thresholds.clear();
    let result = scan_with(dir.path(), &strict);
    let size = result.findings_for_rule("file-size").next().expect("file-size");
    assert_eq!(size.severity, Severity::Error);
}

#[test]
fn test_symbol_manifest_for_other_languages() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "pkg/orders/client.go.symbols.json",
        r#"{
  "language": "go",
  "line_count": 40,
  "callables": [
    {
      "name": "Create",
      "line_start": 5,
      "line_end": 20,
      "params": [{"name": "ctx"}, {"name": "a"}, {"name": "b"}, {"name": "c"}, {"name": "d"}],
      "side_effects": [
        {"kind": "network", "target": "http.Post", "line": 9, "method": "POST", "blocking": true}
      ]
    }
  ]
}"#,
    );

    let result = scan(dir.path());
    let rules: Vec<_> = result.findings.iter().map(|f| f.rule_id.as_str()).collect();
    assert!(rules.contains(&"param-count"), "{:?}", rules);
    assert!(rules.contains(&"network-missing-timeout"), "{:?}", rules);
    assert!(result
        .findings
        .iter()
        .all(|f| f.location.path == Path::new("pkg/orders/client.go")));
}

#[test]
fn test_results_are_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    for domain in ["billing", "orders", "shipping"] {
        write(
            dir.path(),
            &format!("src/{}/api.py", domain),
            "import requests\n\n\ndef load(url):\n    return requests.get(url)\n\n\ndef x(a, b, c, d, e):\n    return a\n",
        );
    }

    let first = serde_json::to_string(&scan(dir.path())).unwrap();
    for _ in 0..3 {
        assert_eq!(serde_json::to_string(&scan(dir.path())).unwrap(), first);
    }
}

const RETRY_HELPER: &str = r#"
import time


def with_retry(fn, attempts=3):
    for attempt in range(attempts):
        try:
            return fn()
        except ConnectionError:
            time.sleep(2 ** attempt)
    raise RuntimeError("retries exhausted")
"#;

#[test]
fn test_duplicated_retry_helper_reported_once() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "billing/retrying.py", RETRY_HELPER);

    let single = scan(dir.path());
    assert!(single.findings_for_rule("duplicate-retry-helper").next().is_none());

    write(dir.path(), "orders/retrying.py", RETRY_HELPER);
    let result = scan(dir.path());
    let duplicates: Vec<_> = result.findings_for_rule("duplicate-retry-helper").collect();
    assert_eq!(duplicates.len(), 1, "{:#?}", result.findings);
    assert_eq!(
        duplicates[0].evidence.get("implementations"),
        Some(&EvidenceValue::Int(2))
    );
    assert_eq!(duplicates[0].location.callable.as_deref(), Some("with_retry"));
    assert!(result.findings_for_rule("retry-missing-backoff").next().is_none());
    assert!(result.findings_for_rule("retry-unbounded").next().is_none());
}

#[test]
fn test_dict_lookups_are_not_network_calls() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "reports/summary.py",
        r#"
def extract(api_response):
    return api_response.get("data")


def total(client_config):
    return client_config.get("total", 0) + 1
"#,
    );

    let result = scan(dir.path());
    assert!(
        result.findings_for_rule("network-missing-timeout").next().is_none(),
        "{:#?}",
        result.findings
    );
    assert!(result.findings_for_rule("mixed-concern").next().is_none());
}

#[test]
fn test_exclude_patterns_match_whole_segments() {
    let dir = tempfile::tempdir().unwrap();
    for rel in [
        "generated/proto.py",
        "generated_client.py",
        "build/out.py",
        "buildtools.py",
        "pkg/models_pb2.py",
        "pkg/inner/models_pb2.py",
    ] {
        write(dir.path(), rel, "def load(items):\n    return list(items)\n");
    }
    write(
        dir.path(),
        "stricture.toml",
        r#"
[scan]
exclude = ["generated/**", "build/", "pkg/*_pb2.py"]
"#,
    );

    let result = scan(dir.path());
    assert_eq!(result.summary.files_discovered, 3, "{:#?}", result.findings);
}
