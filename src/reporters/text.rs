use std::io::{self, Write};
use colored::*;
use chrono::Local;

use crate::core::error::FleetError;
use crate::core::launcher::LaunchedTask;
use crate::core::record::{DeviceOutcome, DeviceResult, RunRecord};
use crate::core::summary::RunSummary;
use crate::reporters::Reporter;

/// Text reporter for console output
pub struct TextReporter {
    verbose: bool,
    quiet: bool,
}

impl TextReporter {
    /// Create a new text reporter
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    /// Format a duration in a human-readable format
    fn format_duration(&self, duration: std::time::Duration) -> String {
        let total_secs = duration.as_secs();
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Format a device outcome with color
    fn format_outcome(&self, outcome: DeviceOutcome) -> ColoredString {
        match outcome {
            DeviceOutcome::Passed => "✓ PASS".green().bold(),
            DeviceOutcome::Failed => "✗ FAIL".red().bold(),
            DeviceOutcome::TimedOut => "⏱ TIMEOUT".yellow().bold(),
            DeviceOutcome::NoReport => "⚠ NO REPORT".yellow(),
        }
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
    }
}

impl Reporter for TextReporter {
    fn report_start(&self, record: &RunRecord, device_count: usize) {
        if self.quiet {
            return;
        }

        println!("{}", "DEVICE RUN STARTING".bold());
        println!("===================");
        println!("Started: {}", Local::now().format("%Y-%m-%d %H:%M:%S %Z"));
        println!("Script: {}", record.script_ref.cyan());
        println!("Devices: {}", device_count);

        if self.verbose {
            println!("Log root: {}", record.log_root.display());
            if !record.device_results.is_empty() {
                println!("Previously recorded: {} ({} passed)",
                    record.device_results.len(),
                    record.success_count());
            }
        }

        println!();
        self.flush();
    }

    fn report_skip(&self, device: &str) {
        if self.quiet {
            return;
        }

        println!("{} {} (already passed)", "Skip".blue().bold(), device.cyan());
        self.flush();
    }

    fn report_launch(&self, task: &LaunchedTask) {
        if self.quiet {
            return;
        }

        if self.verbose {
            println!("Launched {} -> {}", task.device.cyan(), task.log_dir.display());
        } else {
            println!("Launched {}", task.device.cyan());
        }
        self.flush();
    }

    fn report_launch_failure(&self, device: &str, error: &FleetError) {
        if self.quiet {
            return;
        }

        eprintln!("{}: could not launch {}: {}", "ERROR".red().bold(), device, error);
    }

    fn report_device_result(&self, device: &str, result: &DeviceResult) {
        if self.quiet {
            return;
        }

        println!("{}: {} (status {}, {})",
            device.cyan().bold(),
            self.format_outcome(result.outcome()),
            result.status,
            result.device_name);

        if self.verbose && !result.report_path.is_empty() {
            println!("  Report: {}", result.report_path);
        }
        self.flush();
    }

    fn report_summary(&self, summary: &RunSummary) {
        if self.quiet {
            println!("{}/{} passed", summary.success, summary.count);
            return;
        }

        println!("\n{}", "DEVICE RUN RESULTS".bold());
        println!("==================");
        println!("Script: {}", summary.script_ref);
        println!("Started: {}", summary.start_display());
        println!("Elapsed: {} ({}s)", self.format_duration(summary.elapsed), summary.elapsed_display());
        println!();

        let max_name_len = summary.devices.iter()
            .map(|r| r.device.len())
            .max()
            .unwrap_or(10);

        for row in &summary.devices {
            println!("{}: {}{} (status {})",
                row.device.cyan().bold(),
                " ".repeat(max_name_len - row.device.len() + 2),
                self.format_outcome(DeviceOutcome::from_status(row.status)),
                row.status);
        }

        let passed = format!("{}/{}", summary.success, summary.count);
        println!("\n{}: {}",
            "PASSED".bold(),
            if summary.success == summary.count { passed.green().bold() } else { passed.red().bold() });

        if let Some(path) = &summary.report_path {
            println!("Report: {}", path.display());
        }
    }

    fn report_warning(&self, message: &str) {
        if self.quiet {
            return;
        }

        eprintln!("{}: {}", "WARNING".yellow().bold(), message);
    }

    fn report_info(&self, message: &str) {
        if self.quiet {
            return;
        }

        if self.verbose {
            println!("{}: {}", "INFO".blue().bold(), message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_format_duration() {
        let reporter = TextReporter::new(false, true);
        assert_eq!(reporter.format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(reporter.format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(reporter.format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_format_outcome_labels() {
        colored::control::set_override(false);
        let reporter = TextReporter::new(false, false);
        assert_eq!(reporter.format_outcome(DeviceOutcome::Passed).to_string(), "✓ PASS");
        assert_eq!(reporter.format_outcome(DeviceOutcome::TimedOut).to_string(), "⏱ TIMEOUT");
    }
}
