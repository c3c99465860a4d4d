//! Evaluator: runs the rule set over a source tree
//!
//! ```text
//!   files ──► rayon pool ──► parse ─► metrics ─► callable/unit rules ──┐
//!             (one job per file, panics caught)                         │
//!                                                                        ▼
//!                                       crossbeam channel ◄── per-file outcome
//!                                              │ recv_deadline
//!                                              ▼
//!                          barrier: every file seen (or deadline passed)
//!                                              │
//!                        IndexBuilder::build ─► index rules (complete runs only)
//!                                              │
//!                                              ▼
//!                               aggregate: dedupe + sort ─► ScanResult
//! ```
//!
//! A file that fails to parse, or whose pipeline panics, becomes a single
//! `scan-error` finding; the rest of the run is unaffected.

use crate::aggregate::{aggregate, FileCounts};
use crate::config::ExcludeGlobs;
use crate::index::IndexBuilder;
use crate::metrics::{ExtractorConfig, MetricExtractor, UnitMetrics};
use crate::models::{Finding, ScanResult};
use crate::rules::{panic_message, RuleSet};
use crate::symbols::{ParseError, SourceAdapter, SourceFile, SourceUnit};
use anyhow::{bail, Context, Result};
use crossbeam_channel::RecvTimeoutError;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Name of the per-project ignore file honoured during discovery
pub const IGNORE_FILE_NAME: &str = ".strictureignore";

const MAX_DEFAULT_WORKERS: usize = 16;

/// Default worker count: available parallelism, capped at 16
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(MAX_DEFAULT_WORKERS)
}

#[derive(Debug, Clone)]
pub struct EvaluatorOptions {
    pub workers: usize,
    /// Scan-wide deadline; `None` waits for every file
    pub timeout: Option<Duration>,
    pub extractor: ExtractorConfig,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout: None,
            extractor: ExtractorConfig::default(),
        }
    }
}

type ParseJob = Box<dyn FnOnce() -> Result<SourceUnit, ParseError> + Send>;

/// What one file contributed to the run
enum FileOutcome {
    Analyzed {
        unit: SourceUnit,
        metrics: UnitMetrics,
        findings: Vec<Finding>,
    },
    Failed {
        path: PathBuf,
        finding: Finding,
    },
}

impl FileOutcome {
    fn path(&self) -> &Path {
        match self {
            FileOutcome::Analyzed { unit, .. } => &unit.path,
            FileOutcome::Failed { path, .. } => path,
        }
    }
}

pub struct Evaluator {
    rules: Arc<RuleSet>,
    extractor: Arc<MetricExtractor>,
    workers: usize,
    timeout: Option<Duration>,
}

impl Evaluator {
    pub fn new(rules: Arc<RuleSet>, options: EvaluatorOptions) -> Self {
        Self {
            rules,
            extractor: Arc::new(MetricExtractor::new(options.extractor)),
            workers: options.workers.max(1),
            timeout: options.timeout,
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Discover the files under `root` that `adapter` supports and evaluate them
    pub fn scan_path(
        &self,
        root: &Path,
        adapter: Arc<dyn SourceAdapter>,
        excludes: &[String],
    ) -> Result<ScanResult> {
        if !root.exists() {
            bail!("Path does not exist: {}", root.display());
        }

        if root.is_file() {
            let base = root.parent().unwrap_or(Path::new("")).to_path_buf();
            return Ok(self.evaluate_files(&base, vec![root.to_path_buf()], adapter));
        }

        let files = discover_files(root, adapter.as_ref(), excludes)
            .with_context(|| format!("Failed to walk {}", root.display()))?;
        info!(
            "Discovered {} source files under {}",
            files.len(),
            root.display()
        );
        Ok(self.evaluate_files(root, files, adapter))
    }

    /// Evaluate an explicit list of files; paths in findings are relative to `root`
    pub fn evaluate_files(
        &self,
        root: &Path,
        files: Vec<PathBuf>,
        adapter: Arc<dyn SourceAdapter>,
    ) -> ScanResult {
        let jobs = files
            .into_iter()
            .map(|absolute| {
                let file = SourceFile::new(root, absolute);
                let path = file.path.clone();
                let adapter = Arc::clone(&adapter);
                let job: ParseJob = Box::new(move || adapter.parse_file(&file, None));
                (path, job)
            })
            .collect();
        self.run(jobs)
    }

    /// Evaluate units an adapter has already produced
    pub fn evaluate_units(&self, units: Vec<Result<SourceUnit, ParseError>>) -> ScanResult {
        let jobs = units
            .into_iter()
            .map(|unit| {
                let path = match &unit {
                    Ok(u) => u.path.clone(),
                    Err(e) => e.path().to_path_buf(),
                };
                let job: ParseJob = Box::new(move || unit);
                (path, job)
            })
            .collect();
        self.run(jobs)
    }

    fn run(&self, jobs: Vec<(PathBuf, ParseJob)>) -> ScanResult {
        let start = Instant::now();
        let discovered = jobs.len();
        let (outcomes, incomplete) = self.run_files(jobs);

        let mut counts = FileCounts {
            discovered,
            ..FileCounts::default()
        };
        let mut findings = Vec::new();
        let mut builder = IndexBuilder::new();

        for outcome in outcomes {
            match outcome {
                FileOutcome::Analyzed {
                    unit,
                    metrics,
                    findings: produced,
                } => {
                    counts.analyzed += 1;
                    builder.add(&unit, &metrics);
                    findings.extend(produced);
                }
                FileOutcome::Failed { finding, .. } => {
                    counts.failed += 1;
                    findings.push(finding);
                }
            }
        }

        if incomplete {
            warn!(
                "Scan timed out after {} of {} files; skipping repository-wide rules",
                counts.analyzed + counts.failed,
                discovered
            );
        } else if self.rules.has_index_rules() {
            let index = builder.build();
            debug!("Cross-file index built over {} units", index.unit_count());
            findings.extend(self.rules.evaluate_index(&index));
        }

        let result = aggregate(findings, counts, incomplete);
        info!(
            "Evaluated {} files in {:?}: {} findings",
            discovered,
            start.elapsed(),
            result.summary.total
        );
        result
    }

    /// Phase 1: one pool job per file, collected until all report or the
    /// deadline passes. Returned outcomes are sorted by path.
    fn run_files(&self, jobs: Vec<(PathBuf, ParseJob)>) -> (Vec<FileOutcome>, bool) {
        let total = jobs.len();
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = crossbeam_channel::unbounded::<FileOutcome>();

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("stricture-worker-{}", i))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!("Failed to build worker pool, using the global pool: {}", e);
                None
            }
        };

        for (path, job) in jobs {
            let tx = tx.clone();
            let rules = Arc::clone(&self.rules);
            let extractor = Arc::clone(&self.extractor);
            let cancelled = Arc::clone(&cancelled);
            let task = move || {
                if cancelled.load(Ordering::Relaxed) {
                    return;
                }
                let outcome = process_file(&rules, &extractor, path, job);
                // The collector is gone once the deadline has passed
                let _ = tx.send(outcome);
            };
            match &pool {
                Some(pool) => pool.spawn(task),
                None => rayon::spawn(task),
            }
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(total);
        let mut incomplete = false;
        while outcomes.len() < total {
            let received = match deadline {
                Some(deadline) => rx.recv_deadline(deadline),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(outcome) => outcomes.push(outcome),
                Err(RecvTimeoutError::Timeout) => {
                    cancelled.store(true, Ordering::Relaxed);
                    incomplete = true;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        outcomes.sort_by(|a, b| a.path().cmp(b.path()));
        (outcomes, incomplete)
    }
}

/// Parse, measure and check one file. Never panics.
fn process_file(
    rules: &RuleSet,
    extractor: &MetricExtractor,
    path: PathBuf,
    job: ParseJob,
) -> FileOutcome {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| match job() {
        Ok(unit) => {
            let metrics = extractor.extract(&unit);
            let findings = rules.evaluate_unit(&unit, &metrics);
            FileOutcome::Analyzed {
                unit,
                metrics,
                findings,
            }
        }
        Err(err) => {
            debug!("Skipping {}: {}", err.path().display(), err);
            FileOutcome::Failed {
                path: err.path().to_path_buf(),
                finding: rules.parse_error_finding(&err),
            }
        }
    }));

    match result {
        Ok(outcome) => outcome,
        Err(panic_info) => {
            let message = panic_message(panic_info.as_ref());
            error!("Pipeline panicked on {}: {}", path.display(), message);
            let finding = rules.panic_finding(&path, &format!("analysis panicked: {}", message));
            FileOutcome::Failed { path, finding }
        }
    }
}

/// Walk `root` honouring .gitignore and `.strictureignore`, keeping files the
/// adapter supports and the exclude globs allow. Sorted absolute paths.
pub fn discover_files(
    root: &Path,
    adapter: &dyn SourceAdapter,
    excludes: &[String],
) -> Result<Vec<PathBuf>> {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .require_git(false)
        .add_custom_ignore_filename(IGNORE_FILE_NAME);

    let excludes = ExcludeGlobs::new(excludes)?;
    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() || !adapter.supports(path) {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        if excludes.matches(relative) {
            debug!("Excluded {}", relative.display());
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}
