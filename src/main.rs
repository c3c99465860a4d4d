//! Stricture - policy-compliance checks for source trees

use clap::Parser;
use console::style;
use std::process::ExitCode;
use stricture::cli::{self, Cli, ExitStatus};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level; logs go to stderr
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("stricture={}", cli.log_level)));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();

    let status = match cli::run(cli) {
        Ok(status) => status,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitStatus::Failed
        }
    };
    ExitCode::from(status.code())
}
