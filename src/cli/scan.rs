//! Scan command - evaluate a tree and report findings

use super::{ExitStatus, ScanArgs};
use crate::cache::{CachingAdapter, SymbolCache};
use crate::config::{load_config_file, load_ruleset_config, RuleSetConfig};
use crate::engine::{default_workers, Evaluator, EvaluatorOptions};
use crate::models::{ScanResult, Severity, Verdict};
use crate::parsers::AdapterRegistry;
use crate::reporters;
use crate::rules::RuleSet;
use crate::symbols::SourceAdapter;
use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Run the scan command
pub fn run(args: &ScanArgs) -> Result<ExitStatus> {
    let start = Instant::now();
    let path = args.path.as_path();
    if !path.exists() {
        anyhow::bail!("Path does not exist: {}", path.display());
    }
    let root = scan_root(path);

    let config = match &args.ruleset {
        Some(file) => load_config_file(file)?,
        None => load_ruleset_config(root)?,
    };
    let rules = Arc::new(RuleSet::from_config(&config)?);
    let format = args.output_format()?;
    let threshold = args
        .threshold()?
        .or(config.fail_on()?)
        .unwrap_or(Severity::Warning);

    let options = evaluator_options(args, &config);
    info!(
        "Scanning {} with {} workers, timeout {:?}, fail on {}",
        path.display(),
        options.workers,
        options.timeout,
        threshold
    );

    let registry: Arc<dyn SourceAdapter> = Arc::new(AdapterRegistry::default());
    let cache = (!args.no_cache && config.scan.cache.unwrap_or(true))
        .then(|| Arc::new(SymbolCache::open(root)));
    let adapter: Arc<dyn SourceAdapter> = match &cache {
        Some(cache) => Arc::new(CachingAdapter::new(registry, Arc::clone(cache))),
        None => registry,
    };

    let evaluator = Evaluator::new(rules, options);
    let result = evaluator.scan_path(path, adapter, &config.scan.exclude)?;

    if let Some(cache) = cache {
        if !result.incomplete {
            cache.retain_seen();
        }
        let stats = cache.stats();
        debug!(
            "Symbol cache: {} entries, {} hits, {} misses",
            stats.entries, stats.hits, stats.misses
        );
        if let Err(e) = cache.save() {
            warn!("Failed to save symbol cache: {:#}", e);
        }
    }

    let report = reporters::render(&result, format)?;
    match &args.output {
        Some(file) => {
            std::fs::write(file, &report)
                .with_context(|| format!("Failed to write report to {}", file.display()))?;
            eprintln!(
                "{} Report written to {}",
                style("✓").green(),
                style(file.display()).cyan()
            );
        }
        None => print!("{}", report),
    }

    info!(
        "Scan finished in {:.2}s: {} findings",
        start.elapsed().as_secs_f64(),
        result.summary.total
    );

    Ok(exit_status(&result, threshold))
}

/// A threshold violation wins over a timeout
fn exit_status(result: &ScanResult, threshold: Severity) -> ExitStatus {
    match Verdict::for_threshold(result, threshold) {
        Verdict::Fail => ExitStatus::ThresholdMet,
        Verdict::Pass if result.incomplete => ExitStatus::TimedOut,
        Verdict::Pass => ExitStatus::Pass,
    }
}

/// Directory configuration and cache are looked up in
fn scan_root(path: &Path) -> &Path {
    if path.is_file() {
        path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
    } else {
        path
    }
}

/// CLI flags first, then `[scan]`, then defaults
fn evaluator_options(args: &ScanArgs, config: &RuleSetConfig) -> EvaluatorOptions {
    let workers = args
        .workers
        .or(config.scan.workers)
        .unwrap_or_else(default_workers);
    let timeout = args
        .timeout
        .or(config.scan.timeout_secs)
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);
    EvaluatorOptions {
        workers,
        timeout,
        extractor: config.metrics,
    }
}
