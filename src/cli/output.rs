//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::harness::{flatten, ScenarioResult, TeardownOutcome};
use crate::reconciler::ApplyOutcome;
use crate::slb::LoadBalancer;
use crate::sweep::{SweepOutcome, SweepReport, SweeperDef};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Attribute row for table display.
#[derive(Tabled)]
struct AttributeRow {
    #[tabled(rename = "Attribute")]
    path: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Sweep entry row for table display.
#[derive(Tabled)]
struct SweepRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Verdict")]
    verdict: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
}

/// Sweeper row for table display.
#[derive(Tabled)]
struct SweeperRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Sweeper")]
    name: String,
    #[tabled(rename = "Depends on")]
    dependencies: String,
    #[tabled(rename = "Runner")]
    runner: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a live record.
    #[must_use]
    pub fn format_record(&self, record: &LoadBalancer) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(record).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!("\nLoad balancer {}\n\n", record.id.bold());
                output.push_str(&Self::attribute_table(record));
                output.push('\n');
                output
            }
        }
    }

    /// Formats the result of an apply.
    #[must_use]
    pub fn format_apply(&self, outcome: &ApplyOutcome) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(outcome).unwrap_or_default(),
            OutputFormat::Text => {
                let headline = match outcome {
                    ApplyOutcome::Created { record } => {
                        format!("{} Created {}", "+".green(), record.id)
                    }
                    ApplyOutcome::Updated { record, fields } => format!(
                        "{} Updated {} ({})",
                        "~".yellow(),
                        record.id,
                        fields.join(", ")
                    ),
                    ApplyOutcome::Unchanged { record } => {
                        format!("{} {} is up to date", "✓".green(), record.id)
                    }
                };

                let mut output = format!("{headline}\n\n");
                output.push_str(&Self::attribute_table(outcome.record()));
                output.push('\n');
                output
            }
        }
    }

    /// Formats a sweep report.
    #[must_use]
    pub fn format_sweep(&self, report: &SweepReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let mode = if report.dry_run { " (dry run)" } else { "" };
                let mut output = format!("\nSweep of {}{mode}\n\n", report.region.bold());

                if report.entries.is_empty() {
                    output.push_str("   No load balancers found.\n");
                    return output;
                }

                let rows: Vec<SweepRow> = report
                    .entries
                    .iter()
                    .map(|entry| SweepRow {
                        id: entry.candidate.record.id.clone(),
                        name: Self::truncate(&entry.candidate.record.name, 32),
                        verdict: entry.candidate.verdict.to_string(),
                        outcome: Self::format_sweep_outcome(&entry.outcome),
                    })
                    .collect();

                output.push_str(&Table::new(rows).to_string());
                output.push('\n');

                let _ = write!(
                    output,
                    "\nScanned {} in {} list calls: {} owned, {} deleted, {} skipped, {} failed\n",
                    report.scanned,
                    report.list_calls,
                    report.owned,
                    report.deleted.to_string().green(),
                    report.skipped.to_string().yellow(),
                    report.failed.to_string().red()
                );
                output
            }
        }
    }

    /// Formats sweepers in execution order.
    #[must_use]
    pub fn format_sweepers(&self, sweepers: &[SweeperDef]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(sweepers).unwrap_or_default(),
            OutputFormat::Text => {
                let rows: Vec<SweeperRow> = sweepers
                    .iter()
                    .enumerate()
                    .map(|(i, s)| SweeperRow {
                        index: i + 1,
                        name: s.name.clone(),
                        dependencies: if s.dependencies.is_empty() {
                            String::from("-")
                        } else {
                            s.dependencies.join(", ")
                        },
                        runner: if s.external { "external" } else { "slbctl" }.to_string(),
                    })
                    .collect();

                format!("{}\n", Table::new(rows))
            }
        }
    }

    /// Formats a scenario result.
    #[must_use]
    pub fn format_scenario(&self, name: &str, result: &ScenarioResult) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "scenario": name, "result": result });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let status = if result.passed {
                    format!("{} Scenario '{name}' passed", "✓".green())
                } else {
                    format!("{} Scenario '{name}' failed", "✗".red())
                };

                let mut output = format!("{status}\n\n");
                let _ = writeln!(output, "   Steps run: {}", result.steps_run);
                if let Some(id) = &result.resource_id {
                    let _ = writeln!(output, "   Resource: {id}");
                }
                if let Some(step) = result.failed_step {
                    let _ = writeln!(output, "   Failed step: {step}");
                }
                if let Some(failure) = &result.failure {
                    let _ = writeln!(output, "   Error: {failure}");
                }

                if !result.mismatches.is_empty() {
                    let _ = write!(output, "\n{} Mismatches:\n", "⚠".yellow());
                    for mismatch in &result.mismatches {
                        let _ = writeln!(output, "   - {mismatch}");
                    }
                }

                let teardown = match &result.teardown {
                    TeardownOutcome::NotNeeded => "not needed".dimmed().to_string(),
                    TeardownOutcome::Released => "released".green().to_string(),
                    TeardownOutcome::Failed(e) => format!("{} ({e})", "failed".red()),
                };
                let _ = writeln!(output, "\n   Teardown: {teardown}");
                output
            }
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid\n", "✓".green())
                } else {
                    let mut text = format!(
                        "{} Configuration has {} error(s):\n",
                        "✗".red(),
                        result.error_count()
                    );
                    for error in &result.errors {
                        let _ = writeln!(text, "   - {error}");
                    }
                    text
                };

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        self.message("success", &"✓".green().to_string(), message)
    }

    /// Formats an error message.
    #[must_use]
    pub fn error(&self, message: &str) -> String {
        self.message("error", &"✗".red().to_string(), message)
    }

    /// Formats a warning message.
    #[must_use]
    pub fn warning(&self, message: &str) -> String {
        self.message("warning", &"⚠".yellow().to_string(), message)
    }

    fn message(&self, status: &str, marker: &str, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": status, "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{marker} {message}"),
        }
    }

    fn attribute_table(record: &LoadBalancer) -> String {
        let rows: Vec<AttributeRow> = flatten(record)
            .into_iter()
            .map(|(path, value)| AttributeRow { path, value })
            .collect();
        Table::new(rows).to_string()
    }

    /// Formats a sweep outcome with color.
    fn format_sweep_outcome(outcome: &SweepOutcome) -> String {
        match outcome {
            SweepOutcome::Retained => "retained".dimmed().to_string(),
            SweepOutcome::Deleted => "deleted".green().to_string(),
            SweepOutcome::WouldDelete => "would delete".yellow().to_string(),
            SweepOutcome::Skipped(reason) => format!("{} ({reason})", "skipped".yellow()),
            SweepOutcome::Failed(reason) => {
                format!("{} ({})", "failed".red(), Self::truncate(reason, 40))
            }
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}
