//! Rules command - list the rule catalogue

use super::ExitStatus;
use crate::config::load_config_file;
use crate::rules::{RuleEntry, RuleSet};
use anyhow::Result;
use console::style;
use std::fmt::Write;
use std::path::Path;

/// Run the rules command
pub fn run(ruleset: Option<&Path>) -> Result<ExitStatus> {
    let rules = match ruleset {
        Some(file) => RuleSet::from_config(&load_config_file(file)?)?,
        None => RuleSet::default(),
    };
    print!("{}", render(&rules)?);
    Ok(ExitStatus::Pass)
}

fn render(rules: &RuleSet) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "\n{} ({} rules)\n", style("RULES").bold(), rules.len())?;
    for entry in rules.entries() {
        write_entry(&mut out, entry)?;
    }
    Ok(out)
}

fn write_entry(out: &mut String, entry: &RuleEntry) -> Result<()> {
    let rule = entry.rule();
    let id = if entry.is_enabled() {
        style(rule.id()).bold()
    } else {
        style(rule.id()).dim()
    };
    writeln!(
        out,
        "{}  {} {} {}",
        id,
        style(rule.category()).cyan(),
        style(rule.scope()).dim(),
        entry.severity()
    )?;
    writeln!(out, "    {}", rule.description())?;

    let thresholds = rule.thresholds();
    if !thresholds.is_empty() {
        let list: Vec<String> = thresholds
            .iter()
            .map(|(key, value)| format!("{} = {}", key, value))
            .collect();
        writeln!(out, "    {} {}", style("thresholds:").dim(), list.join(", "))?;
    }
    for sub in rule.sub_rules() {
        writeln!(out, "    {} {}: {}", style("sub-rule").dim(), sub.id, sub.description)?;
    }
    writeln!(out)?;
    Ok(())
}
