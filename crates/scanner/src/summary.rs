//! Run summary output

use clap::ValueEnum;
use colored::Colorize;
use scanner_lib::{EvaluationFailure, RunReport};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for the run summary
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// One line of the summary, either a finished run or a failed pipeline
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct SummaryRow {
    #[tabled(rename = "Pipeline")]
    pub pipeline: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Fetched")]
    pub fetched: usize,
    #[tabled(rename = "Flagged")]
    pub included: usize,
    #[tabled(rename = "Excluded")]
    pub excluded: usize,
    #[tabled(rename = "Failures")]
    pub failures: usize,
    #[tabled(rename = "Elapsed")]
    pub elapsed: String,
    #[tabled(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Resources whose evaluation errored, panicked or timed out
    #[tabled(skip)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failure_reasons: Vec<EvaluationFailure>,
}

impl SummaryRow {
    pub fn finished(report: &RunReport) -> Self {
        let status = if report.failures.is_empty() {
            "ok"
        } else {
            "partial"
        };
        Self {
            pipeline: report.pipeline.clone(),
            status: status.to_string(),
            fetched: report.fetched,
            included: report.included,
            excluded: report.excluded,
            failures: report.failures.len(),
            elapsed: format_elapsed(report.elapsed.as_secs_f64()),
            error: None,
            failure_reasons: report.failures.clone(),
        }
    }

    pub fn failed(pipeline: &str, error: String) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            status: "failed".to_string(),
            fetched: 0,
            included: 0,
            excluded: 0,
            failures: 0,
            elapsed: "-".to_string(),
            error: Some(error),
            failure_reasons: Vec::new(),
        }
    }
}

/// Print the summary in the requested format
pub fn print_summary(rows: &[SummaryRow], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("{}", "No pipelines ran".yellow());
                return;
            }
            let colored: Vec<SummaryRow> = rows
                .iter()
                .cloned()
                .map(|mut row| {
                    row.status = color_status(&row.status);
                    row
                })
                .collect();
            let table = Table::new(&colored).with(Style::rounded()).to_string();
            println!("{}", table);

            for row in rows {
                if let Some(error) = &row.error {
                    print_error(&format!("{}: {}", row.pipeline, error));
                }
                for failure in &row.failure_reasons {
                    print_error(&format!(
                        "{}: {}: {}",
                        row.pipeline, failure.resource_id, failure.reason
                    ));
                }
            }
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(rows) {
                println!("{}", json);
            }
        }
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Format seconds as human-readable string
pub fn format_elapsed(secs: f64) -> String {
    if secs >= 60.0 {
        format!("{:.0}m{:02.0}s", (secs / 60.0).floor(), secs % 60.0)
    } else if secs >= 1.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.0}ms", secs * 1000.0)
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status {
        "ok" => status.green().to_string(),
        "partial" => status.yellow().to_string(),
        "failed" => status.red().to_string(),
        _ => status.to_string(),
    }
}
