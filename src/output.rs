//! Console Output and Reporting
//!
//! Per-file console lines as results arrive and the final report in the
//! selected [`OutputFormat`].

use std::time::Duration;

use crate::checker::{DocumentStatus, FileCheckResult};
use crate::cli::OutputFormat;
use crate::runner::{RunPhase, RunProgress, RunSummary};

/// Output formatter for run results
#[derive(Debug, Clone)]
pub struct Output {
    format: OutputFormat,
    show_colors: bool,
}

impl Output {
    /// Colors are enabled only for human output on a terminal
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            show_colors: format == OutputFormat::Human && atty::is(atty::Stream::Stdout),
        }
    }

    pub fn with_colors(mut self, enabled: bool) -> Self {
        self.show_colors = enabled;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    /// `<file name>\t is valid.` and friends
    pub fn file_line(&self, result: &FileCheckResult) -> String {
        let name = result.file_name();
        match &result.status {
            DocumentStatus::Valid => format!("{}\t {}", name, self.colorize("is valid.", "32")),
            DocumentStatus::Invalid { .. } => {
                format!("{}\t {}", name, self.colorize("is NOT valid.", "31"))
            }
            DocumentStatus::ReadFailed { .. } => {
                format!("{}\t {}", name, self.colorize("read failed", "33"))
            }
        }
    }

    /// Console line for a progress update; only per-file updates print anything,
    /// and only in human format
    pub fn progress_line(&self, progress: &RunProgress) -> Option<String> {
        if self.format != OutputFormat::Human || progress.phase != RunPhase::Validating {
            return None;
        }
        progress.result.as_ref().map(|result| self.file_line(result))
    }

    /// Final report for stdout
    pub fn format_report(&self, summary: &RunSummary) -> Result<String, serde_json::Error> {
        match self.format {
            OutputFormat::Human => Ok(self.format_human(summary)),
            OutputFormat::Json => serde_json::to_string_pretty(summary),
            OutputFormat::Summary => Ok(self.format_one_line(summary)),
        }
    }

    fn format_human(&self, summary: &RunSummary) -> String {
        let mut output = String::new();
        output.push_str("Validation Summary:\n");
        output.push_str(&format!("  Root: {}\n", summary.root_directory.display()));
        output.push_str(&format!("  Total files: {}\n", summary.total_files));
        output.push_str(&format!(
            "  {} {}\n",
            self.colorize("Valid:", "32"),
            summary.valid_files
        ));

        if summary.invalid_files > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Invalid:", "31"),
                summary.invalid_files
            ));
        }
        if summary.read_failed_files > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Read failed:", "33"),
                summary.read_failed_files
            ));
        }
        if summary.copy_failures > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Copy failures:", "33"),
                summary.copy_failures
            ));
        }
        output.push_str(&format!(
            "  Duration: {}\n",
            format_duration(summary.duration)
        ));

        let frequencies = summary.error_frequencies.sorted();
        if !frequencies.is_empty() {
            output.push_str("\nErrors by frequency:\n");
            for (message, count) in frequencies {
                output.push_str(&format!("{}\t{}\n", count, message));
            }
        }

        output
    }

    fn format_one_line(&self, summary: &RunSummary) -> String {
        format!(
            "total={} valid={} invalid={} read_failed={} distinct_errors={} duration={}",
            summary.total_files,
            summary.valid_files,
            summary.invalid_files,
            summary.read_failed_files,
            summary.error_frequencies.len(),
            format_duration(summary.duration)
        )
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}
