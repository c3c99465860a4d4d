//! CLI contract tests
//!
//! Runs the built binary against temp workspaces and checks exit codes,
//! output formats, configuration handling and the symbol cache.

use std::path::Path;
use std::process::{Command, Output};

fn stricture_bin() -> String {
    env!("CARGO_BIN_EXE_stricture").to_string()
}

fn run(args: &[&str], cwd: &Path) -> Output {
    Command::new(stricture_bin())
        .args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .env_remove("STRICTURE_RULESET")
        .output()
        .unwrap()
}

fn setup_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src/orders")).unwrap();
    std::fs::write(
        dir.path().join("src/orders/pricing.py"),
        r#"
def order_total(items, discount, tax_rate, shipping, currency):
    subtotal = sum(item.price for item in items)
    return (subtotal - discount) * (1 + tax_rate) + shipping
"#,
    )
    .unwrap();
    dir
}

fn setup_clean_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src/orders")).unwrap();
    std::fs::write(
        dir.path().join("src/orders/pricing.py"),
        "def order_total(items):\n    return sum(item.price for item in items)\n",
    )
    .unwrap();
    dir
}

#[test]
fn test_clean_tree_passes() {
    let dir = setup_clean_repo();
    let out = run(&["scan", ".", "--no-cache"], dir.path());
    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).contains("No findings."));
}

#[test]
fn test_threshold_controls_exit_code() {
    let dir = setup_repo();

    let out = run(&["scan", ".", "--no-cache"], dir.path());
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stdout).contains("param-count"));

    let out = run(
        &["scan", ".", "--no-cache", "--severity-threshold", "error"],
        dir.path(),
    );
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn test_fail_on_from_config() {
    let dir = setup_repo();
    std::fs::write(dir.path().join("stricture.toml"), "[scan]\nfail_on = \"error\"\n").unwrap();
    let out = run(&["scan", ".", "--no-cache"], dir.path());
    assert_eq!(out.status.code(), Some(0));

    let out = run(
        &["scan", ".", "--no-cache", "--severity-threshold", "warning"],
        dir.path(),
    );
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn test_json_output() {
    let dir = setup_repo();
    let out = run(&["scan", ".", "--no-cache", "--format", "json"], dir.path());
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let findings = report["findings"].as_array().unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0]["rule_id"], "param-count");
    assert_eq!(findings[0]["location"]["path"], "src/orders/pricing.py");
    assert_eq!(report["summary"]["files_analyzed"], 1);
}

#[test]
fn test_output_file() {
    let dir = setup_repo();
    let out = run(
        &["scan", ".", "--no-cache", "--format", "json", "--output", "report.json"],
        dir.path(),
    );
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
    let content = std::fs::read_to_string(dir.path().join("report.json")).unwrap();
    let _: serde_json::Value = serde_json::from_str(&content).unwrap();
}

#[test]
fn test_missing_path_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(&["scan", "does-not-exist"], dir.path());
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("does-not-exist"));
}

#[test]
fn test_invalid_config_exits_2() {
    let dir = setup_repo();
    std::fs::write(
        dir.path().join("stricture.toml"),
        "[rules.param-count]\nseverity = \"critical\"\n",
    )
    .unwrap();
    let out = run(&["scan", ".", "--no-cache"], dir.path());
    assert_eq!(out.status.code(), Some(2));

    std::fs::write(
        dir.path().join("stricture.toml"),
        "[rules.param-count]\nthresholds = { max_params = \"many\" }\n",
    )
    .unwrap();
    let out = run(&["scan", ".", "--no-cache"], dir.path());
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn test_explicit_ruleset_file() {
    let dir = setup_repo();
    std::fs::write(
        dir.path().join("relaxed.json"),
        r#"{"rules": {"param-count": {"thresholds": {"max_params": 6}}}}"#,
    )
    .unwrap();
    let out = run(
        &["scan", ".", "--no-cache", "--ruleset", "relaxed.json"],
        dir.path(),
    );
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn test_cache_written_unless_disabled() {
    let dir = setup_repo();
    let cache = dir.path().join(".stricture/cache/symbols.json");

    run(&["scan", ".", "--no-cache"], dir.path());
    assert!(!cache.exists());

    let first = run(&["scan", ".", "--format", "json"], dir.path());
    assert!(cache.exists());

    let second = run(&["scan", ".", "--format", "json"], dir.path());
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn test_cache_drops_deleted_files() {
    let dir = setup_repo();
    std::fs::write(
        dir.path().join("src/orders/legacy.py"),
        "def old_total(items):\n    return 0\n",
    )
    .unwrap();
    let cache = dir.path().join(".stricture/cache/symbols.json");

    run(&["scan", "."], dir.path());
    assert!(std::fs::read_to_string(&cache).unwrap().contains("src/orders/legacy.py"));

    std::fs::remove_file(dir.path().join("src/orders/legacy.py")).unwrap();
    run(&["scan", "."], dir.path());
    let contents = std::fs::read_to_string(&cache).unwrap();
    assert!(!contents.contains("src/orders/legacy.py"));
    assert!(contents.contains("src/orders/pricing.py"));
}

#[test]
fn test_rules_lists_catalogue() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(&["rules"], dir.path());
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    for id in ["file-size", "mixed-concern", "retry-non-idempotent", "promote-shared", "scan-error"] {
        assert!(stdout.contains(id), "missing {}", id);
    }
}

#[test]
fn test_init_then_scan() {
    let dir = setup_repo();
    let out = run(&["init"], dir.path());
    assert_eq!(out.status.code(), Some(0));
    assert!(dir.path().join("stricture.toml").exists());

    let out = run(&["scan", ".", "--no-cache"], dir.path());
    assert_eq!(out.status.code(), Some(1));
}
