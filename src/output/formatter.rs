//! Output formatters for scenario reports
//!
//! Provides JSON, Table, and summary output formats.

use std::io::Write;

use crate::models::{RunSummary, ScenarioReport, TestStatus};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format a single scenario report
    pub fn format_report(&self, report: &ScenarioReport) -> String {
        match self.format {
            OutputFormat::Table => self.format_report_table(report),
            OutputFormat::Json => serde_json::to_string(report).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Summary => self.format_report_summary(report),
        }
    }

    fn status_label(&self, status: TestStatus) -> &'static str {
        if self.colorize {
            match status {
                TestStatus::Pass => "\x1b[32m✓ PASS\x1b[0m",
                TestStatus::Fail => "\x1b[31m✗ FAIL\x1b[0m",
                TestStatus::Skip => "\x1b[33m○ SKIP\x1b[0m",
                TestStatus::Error => "\x1b[31m! ERROR\x1b[0m",
            }
        } else {
            match status {
                TestStatus::Pass => "✓ PASS",
                TestStatus::Fail => "✗ FAIL",
                TestStatus::Skip => "○ SKIP",
                TestStatus::Error => "! ERROR",
            }
        }
    }

    fn format_report_table(&self, report: &ScenarioReport) -> String {
        let mut output = String::new();

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!(
            "║  {:<24} {:<35} ║\n",
            report.scenario.name(),
            report.function_name
        ));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        output.push_str(&format!(
            "  project {}  region {}  bucket {}\n",
            report.project_id, report.region, report.bucket_name
        ));
        output.push_str(&format!(
            "  started {}\n",
            report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        if !report.checks.is_empty() {
            output.push_str(&format!(
                "\n  Checks ({} of {} failed):\n",
                report.failed_checks(),
                report.checks.len()
            ));
            for check in &report.checks {
                output.push_str(&format!("    {check}\n"));
            }
        }

        match (&report.probe, &report.probe_skipped) {
            (Some(probe), _) => {
                let status = if probe.succeeded {
                    TestStatus::Pass
                } else {
                    TestStatus::Fail
                };
                output.push_str(&format!(
                    "\n  Probe: {} {} after {} attempt(s) in {}ms (last status {})\n",
                    status.symbol(),
                    probe.url,
                    probe.attempts_used,
                    probe.elapsed_ms,
                    probe
                        .last_status_code
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "-".to_string())
                ));
            }
            (None, Some(reason)) => {
                output.push_str(&format!("\n  Probe: {} {}\n", TestStatus::Skip.symbol(), reason));
            }
            (None, None) => {}
        }

        if !report.steps.is_empty() {
            let steps: Vec<String> = report
                .steps
                .iter()
                .map(|s| format!("{} {}ms", s.step, s.duration_ms))
                .collect();
            output.push_str(&format!("\n  Steps: {}\n", steps.join(", ")));
        }

        let states: Vec<String> = report.states.iter().map(|s| s.to_string()).collect();
        output.push_str(&format!("  States: {}\n", states.join(" -> ")));

        if let Some(err) = &report.error {
            output.push_str(&format!("\n  Error [{}]: {}\n", err.class, err.message));
        }
        for failure in &report.cleanup_failures {
            output.push_str(&format!(
                "  Cleanup failed [{}]: {}\n",
                failure.label, failure.message
            ));
        }

        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        output.push_str(&format!(
            "║  Result: {}  Duration: {:>8}ms\n",
            self.status_label(report.status),
            report.duration_ms
        ));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output
    }

    fn format_report_summary(&self, report: &ScenarioReport) -> String {
        format!(
            "{} {} {} ({}ms)",
            report.status.symbol(),
            report.scenario.slug(),
            report.function_name,
            report.duration_ms
        )
    }

    /// Format a whole run
    pub fn format_summary(&self, summary: &RunSummary) -> String {
        match self.format {
            OutputFormat::Table => self.format_summary_table(summary),
            OutputFormat::Json => serde_json::to_string(summary).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Summary => self.format_summary_brief(summary),
        }
    }

    fn format_summary_table(&self, summary: &RunSummary) -> String {
        let mut output = String::new();

        for report in &summary.reports {
            output.push_str(&self.format_report(report));
        }

        let pass_str = if self.colorize {
            format!("\x1b[32m{}\x1b[0m", summary.passed)
        } else {
            summary.passed.to_string()
        };
        let fail_str = if self.colorize && summary.failed + summary.errors > 0 {
            format!("\x1b[31m{}\x1b[0m", summary.failed)
        } else {
            summary.failed.to_string()
        };

        output.push_str(&format!(
            "\nTotal: {} | Pass: {} | Fail: {} | Error: {} | Pass Rate: {:.1}% | Duration: {}ms\n",
            summary.total,
            pass_str,
            fail_str,
            summary.errors,
            summary.pass_rate(),
            summary.total_duration_ms
        ));

        output
    }

    fn format_summary_brief(&self, summary: &RunSummary) -> String {
        let mut lines: Vec<String> = summary
            .reports
            .iter()
            .map(|r| self.format_report_summary(r))
            .collect();
        lines.push(format!(
            "{}/{} scenarios passed ({:.1}%) in {}ms",
            summary.passed,
            summary.total,
            summary.pass_rate(),
            summary.total_duration_ms
        ));
        lines.join("\n")
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

/// Write a run summary to a file
pub fn write_results_to_file(
    path: &str,
    summary: &RunSummary,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_summary(summary);

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
