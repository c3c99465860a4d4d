//! Init command - write a default rule set configuration

use super::ExitStatus;
use crate::metrics::ExtractorConfig;
use crate::rules::{default_rules, Rule};
use anyhow::{Context, Result};
use console::style;
use std::fmt::Write;
use std::path::Path;

const CONFIG_FILE: &str = "stricture.toml";

/// Run the init command
pub fn run(path: &Path, force: bool) -> Result<ExitStatus> {
    if !path.is_dir() {
        anyhow::bail!("Path is not a directory: {}", path.display());
    }

    let config_path = path.join(CONFIG_FILE);
    if config_path.exists() && !force {
        println!(
            "{} {} already exists (use --force to overwrite)",
            style("!").yellow(),
            style(config_path.display()).cyan()
        );
        return Ok(ExitStatus::Pass);
    }

    std::fs::write(&config_path, default_config()?)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!(
        "{} Created {}",
        style("✓").green(),
        style(config_path.display()).cyan()
    );
    Ok(ExitStatus::Pass)
}

/// Commented configuration listing every rule at its defaults
pub fn default_config() -> Result<String> {
    let mut out = String::new();
    let metrics = ExtractorConfig::default();

    writeln!(out, "# Stricture rule set")?;
    writeln!(out, "# Severities: error | warning | info")?;
    writeln!(out)?;
    writeln!(out, "[scan]")?;
    writeln!(out, "# Globs relative to the scan root")?;
    writeln!(out, "exclude = []")?;
    writeln!(out, "# workers = 8")?;
    writeln!(out, "# timeout_secs = 120")?;
    writeln!(out, "# Fail when any finding is at or above this severity")?;
    writeln!(out, "fail_on = \"warning\"")?;
    writeln!(out, "cache = true")?;
    writeln!(out)?;
    writeln!(out, "[metrics]")?;
    writeln!(out, "# Thin-wrapper allowance for the mixed-concern predicate")?;
    writeln!(out, "wrapper_io_allowance = {}", metrics.wrapper_io_allowance)?;
    writeln!(out, "wrapper_caller_allowance = {}", metrics.wrapper_caller_allowance)?;

    for rule in default_rules() {
        write_rule(&mut out, rule.as_ref())?;
    }
    Ok(out)
}

fn write_rule(out: &mut String, rule: &dyn Rule) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "# {}", rule.description())?;
    writeln!(out, "[rules.{}]", rule.id())?;
    writeln!(out, "enabled = true")?;
    writeln!(out, "severity = \"{}\"", rule.default_severity())?;

    let thresholds = rule.thresholds();
    if !thresholds.is_empty() {
        let list: Vec<String> = thresholds
            .iter()
            .map(|(key, value)| format!("{} = {}", key, value))
            .collect();
        writeln!(out, "thresholds = {{ {} }}", list.join(", "))?;
    }

    for sub in rule.sub_rules() {
        writeln!(out)?;
        writeln!(out, "# {}", sub.description)?;
        writeln!(out, "[rules.\"{}\"]", sub.id)?;
        writeln!(out, "enabled = true")?;
    }
    Ok(())
}
