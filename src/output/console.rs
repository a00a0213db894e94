use crate::ir::Capability;
use crate::policy::Verdict;
use crate::{AuditReport, BatchReport};

/// Render a report for the terminal: the verdict, each ungranted capability
/// on its own line, and any units that could not be analyzed.
pub fn render(report: &AuditReport, verbose: bool) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "\n  {} ({}, {} unit(s))\n",
        report.package,
        report.locator,
        report.units.len()
    ));

    match &report.verdict {
        Verdict::Pass => {
            output.push_str("  Result: PASS, all required capabilities are granted\n");
        }
        Verdict::Fail { violations } => {
            output.push_str(&format!(
                "  Result: FAIL, {} capability(ies) required but not granted\n",
                violations.len()
            ));
            for v in violations {
                output.push_str(&format!("  - {}: REQUIRED but NOT GIVEN\n", v.capability));
            }
        }
        Verdict::ReportOnly => {
            output.push_str("  Result: no policy given, required capabilities:\n");
        }
    }

    if verbose || matches!(report.verdict, Verdict::ReportOnly) {
        output.push('\n');
        for line in record_lines(report) {
            output.push_str(&format!("    {line}\n"));
        }
    }

    if verbose && !report.indicators.is_empty() {
        output.push_str("\n  Evidence:\n");
        for indicator in &report.indicators {
            output.push_str(&format!(
                "    [{}] {}\n           at {}\n",
                indicator.capability, indicator.construct, indicator.location
            ));
        }
    }

    if !report.warnings.is_empty() {
        output.push_str(&format!(
            "\n  {} unit(s) could not be analyzed:\n",
            report.warnings.len()
        ));
        for warning in &report.warnings {
            output.push_str(&format!("    warning: {}\n", warning));
        }
    }

    output.push('\n');
    output
}

/// Render every report in a batch, then a one-line tally.
pub fn render_batch(batch: &BatchReport, verbose: bool) -> String {
    let mut output = String::new();
    let (mut passed, mut failed, mut errored) = (0usize, 0usize, 0usize);

    for entry in &batch.entries {
        match &entry.outcome {
            Ok(report) => {
                if report.verdict.is_fail() {
                    failed += 1;
                } else {
                    passed += 1;
                }
                output.push_str(&render(report, verbose));
            }
            Err(e) => {
                errored += 1;
                output.push_str(&format!("\n  {}\n  Result: ERROR, {}\n\n", entry.package, e));
            }
        }
    }

    output.push_str(&format!(
        "  {} package(s): {} passed, {} failed, {} error(s)\n\n",
        batch.entries.len(),
        passed,
        failed,
        errored
    ));
    output
}

/// `name: Yes/No` lines for a record, in capability order.
pub fn record_lines(report: &AuditReport) -> Vec<String> {
    Capability::ALL
        .iter()
        .map(|&cap| {
            let flag = if report.required.get(cap) { "Yes" } else { "No" };
            format!("{cap}: {flag}")
        })
        .collect()
}
