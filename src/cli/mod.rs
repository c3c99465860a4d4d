//! CLI command definitions and handlers

mod init;
mod rules;
mod scan;

use crate::models::Severity;
use crate::reporters::OutputFormat;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Process exit status of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// No finding at or above the threshold
    Pass,
    /// At least one finding at or above the threshold
    ThresholdMet,
    /// The scan could not run (invalid path, configuration error)
    Failed,
    /// The scan timed out and the partial result met no threshold
    TimedOut,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Pass => 0,
            ExitStatus::ThresholdMet => 1,
            ExitStatus::Failed => 2,
            ExitStatus::TimedOut => 3,
        }
    }
}

/// Parse and validate workers count (1-64)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("workers must be at least 1".to_string())
    } else if n > 64 {
        Err("workers cannot exceed 64".to_string())
    } else {
        Ok(n)
    }
}

/// Stricture - coding-standard policy checks for source trees
#[derive(Parser, Debug)]
#[command(name = "stricture")]
#[command(
    version,
    about = "Evaluate a source tree against architecture, reliability, security and logging policies",
    after_help = "\
Examples:
  stricture scan .                                 Scan the current directory
  stricture scan src --format json -o report.json  JSON report for CI
  stricture scan . --severity-threshold error      Fail only on errors
  stricture rules                                  List the rule catalogue
  stricture init                                   Write a default stricture.toml

Exit codes: 0 pass, 1 threshold met, 2 scan could not run, 3 scan timed out"
)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a file or directory and report policy violations
    Scan(ScanArgs),

    /// List every rule with its category, scope, severity and thresholds
    Rules {
        /// Show the effective settings from this configuration file
        #[arg(long)]
        ruleset: Option<PathBuf>,
    },

    /// Write a commented default stricture.toml
    Init {
        /// Directory to write the configuration into
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing stricture.toml
        #[arg(long)]
        force: bool,
    },
}

#[derive(clap::Args, Debug)]
pub struct ScanArgs {
    /// File or directory to scan
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Rule set configuration file (default: stricture.toml or .stricturerc.json in the scan root)
    #[arg(long, env = "STRICTURE_RULESET")]
    pub ruleset: Option<PathBuf>,

    /// Fail when any finding is at or above this severity (default: warning)
    #[arg(long, value_parser = ["error", "warning", "info"])]
    pub severity_threshold: Option<String>,

    /// Output format: text, json
    #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
    pub format: String,

    /// Write the report to a file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Number of parallel workers (1-64)
    #[arg(long, value_parser = parse_workers)]
    pub workers: Option<usize>,

    /// Scan-wide timeout in seconds (0 disables)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Do not read or write the symbol cache
    #[arg(long)]
    pub no_cache: bool,
}

impl ScanArgs {
    fn threshold(&self) -> Result<Option<Severity>> {
        self.severity_threshold
            .as_deref()
            .map(|s| s.parse::<Severity>().map_err(anyhow::Error::msg))
            .transpose()
    }

    fn output_format(&self) -> Result<OutputFormat> {
        self.format.parse()
    }
}

/// Run a parsed command line
pub fn run(cli: Cli) -> Result<ExitStatus> {
    match cli.command {
        Commands::Scan(args) => scan::run(&args),
        Commands::Rules { ruleset } => rules::run(ruleset.as_deref()),
        Commands::Init { path, force } => init::run(&path, force),
    }
}
