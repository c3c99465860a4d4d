//! Text (terminal) reporter, findings grouped by file

use crate::aggregate::group_by_file;
use crate::models::{Finding, ScanResult, Severity};
use anyhow::Result;
use console::style;
use std::fmt::Write;

fn severity_label(severity: Severity) -> String {
    let label = format!("{:<7}", severity.to_string());
    match severity {
        Severity::Error => style(label).red().bold().to_string(),
        Severity::Warning => style(label).yellow().to_string(),
        Severity::Info => style(label).blue().to_string(),
    }
}

/// Render result as terminal output
pub fn render(result: &ScanResult) -> Result<String> {
    let mut out = String::new();

    writeln!(out, "\n{}", style("Stricture Scan").bold())?;
    writeln!(out, "{}", style("──────────────────────────────────────").dim())?;

    for (path, findings) in group_by_file(&result.findings) {
        writeln!(out, "\n{}", style(path.display()).bold().underlined())?;
        for finding in findings {
            write_finding(&mut out, finding)?;
        }
    }

    let s = &result.summary;
    writeln!(out)?;
    if s.total == 0 {
        writeln!(out, "{}", style("No findings.").green())?;
    } else {
        writeln!(
            out,
            "{} ({} total): {} errors, {} warnings, {} infos",
            style("FINDINGS").bold(),
            s.total,
            style(s.errors).red().bold(),
            style(s.warnings).yellow(),
            style(s.infos).blue()
        )?;
    }
    writeln!(
        out,
        "Files: {} discovered, {} analyzed, {} failed",
        s.files_discovered, s.files_analyzed, s.files_failed
    )?;

    if result.incomplete {
        writeln!(
            out,
            "{}",
            style("Scan timed out: results are partial and cross-file rules were skipped.")
                .yellow()
        )?;
    }

    Ok(out)
}

fn write_finding(out: &mut String, finding: &Finding) -> Result<()> {
    let line = finding
        .location
        .line
        .map(|l| l.to_string())
        .unwrap_or_else(|| "-".to_string());
    write!(
        out,
        "  {:>5}  {}  {:<28} {}",
        style(line).dim(),
        severity_label(finding.severity),
        finding.rule_id,
        finding.message
    )?;
    if let Some(ref callable) = finding.location.callable {
        write!(out, " {}", style(format!("[{}]", callable)).dim())?;
    }
    writeln!(out)?;

    for related in &finding.related {
        writeln!(out, "         {} {}", style("also:").dim(), related)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporters::tests::test_result;

    #[test]
    fn test_text_groups_by_file() {
        console::set_colors_enabled(false);
        let out = render(&test_result()).expect("render text");

        let invoice = out.find("src/billing/invoice.py").expect("invoice header");
        let settings = out.find("src/settings.py").expect("settings header");
        assert!(invoice < settings);
        assert!(out.contains("param-count"));
        assert!(out.contains("[build]"));
        assert!(out.contains("2 total"));
        assert!(!out.contains("timed out"));
    }

    #[test]
    fn test_text_empty_and_incomplete() {
        console::set_colors_enabled(false);
        let result = ScanResult {
            incomplete: true,
            ..Default::default()
        };
        let out = render(&result).expect("render text");
        assert!(out.contains("No findings."));
        assert!(out.contains("timed out"));
    }
}
