use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use askama::Template;
use chrono::{DateTime, Local};
use log::{info, warn};
use serde::Serialize;

use crate::core::config::FleetConfig;
use crate::core::error::Result;
use crate::core::record::RunRecord;

/// One row of the per-device table in a run summary.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceRow {
    pub device: String,
    pub device_name: String,
    pub status: i32,
    pub outcome: &'static str,
    pub passed: bool,
    pub report_path: String,
    pub log_path: String,
}

/// Aggregated view of a run, computed once all devices have been collected.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub start_time: DateTime<Local>,
    pub elapsed: Duration,
    pub success: usize,
    pub count: usize,
    pub script_ref: String,
    pub log_root: PathBuf,
    pub devices: Vec<DeviceRow>,
    pub report_path: Option<PathBuf>,
}

impl RunSummary {
    pub fn from_record(record: &RunRecord, now: DateTime<Local>) -> Self {
        let devices = record
            .device_results
            .iter()
            .map(|(device, result)| DeviceRow {
                device: device.clone(),
                device_name: result.device_name.clone(),
                status: result.status,
                outcome: result.outcome().label(),
                passed: result.status == 0,
                report_path: result.report_path.clone(),
                log_path: result.log_path.clone(),
            })
            .collect();

        Self {
            start_time: record.start_time,
            elapsed: (now - record.start_time).to_std().unwrap_or_default(),
            success: record.success_count(),
            count: record.device_results.len(),
            script_ref: record.script_ref.clone(),
            log_root: record.log_root.clone(),
            devices,
            report_path: None,
        }
    }

    /// Elapsed seconds with millisecond precision, e.g. `12.345`.
    pub fn elapsed_display(&self) -> String {
        format!("{:.3}", self.elapsed.as_secs_f64())
    }

    pub fn start_display(&self) -> String {
        self.start_time.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    pub fn failed(&self) -> usize {
        self.count - self.success
    }
}

#[derive(Template)]
#[template(path = "summary.html")]
struct SummaryTemplate<'a> {
    summary: &'a RunSummary,
    start: String,
    elapsed: String,
    log_root: String,
}

/// Renders the run-level report once collection has finished.
pub struct SummaryBuilder {
    summary_file_name: String,
    table_name: String,
    open_report: bool,
}

impl SummaryBuilder {
    pub fn new(config: &FleetConfig) -> Self {
        Self {
            summary_file_name: config.summary_file_name.clone(),
            table_name: config.summary_table_name.clone(),
            open_report: config.open_report,
        }
    }

    /// Compute the summary, write `report.html` and the CSV device table
    /// under the log root, then open the HTML report when configured to.
    pub fn summarize(&self, record: &RunRecord) -> Result<RunSummary> {
        let mut summary = RunSummary::from_record(record, Local::now());

        fs::create_dir_all(&record.log_root)?;
        let report_path = record.log_root.join(&self.summary_file_name);
        fs::write(&report_path, render_html(&summary)?)?;
        write_table(&record.log_root.join(&self.table_name), &summary)?;
        info!(
            "Run summary: {}/{} device(s) passed in {}s, report at {}",
            summary.success,
            summary.count,
            summary.elapsed_display(),
            report_path.display()
        );

        if self.open_report {
            if let Err(e) = open_in_browser(&report_path) {
                warn!("Could not open {}: {}", report_path.display(), e);
            }
        }

        summary.report_path = Some(report_path);
        Ok(summary)
    }
}

pub fn render_html(summary: &RunSummary) -> Result<String> {
    let template = SummaryTemplate {
        summary,
        start: summary.start_display(),
        elapsed: summary.elapsed_display(),
        log_root: summary.log_root.display().to_string(),
    };
    Ok(template.render()?)
}

/// Write the per-device table as CSV.
pub fn write_table(path: &Path, summary: &RunSummary) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    writer
        .write_record(["Device", "Name", "Status", "Outcome", "Report", "Log"])
        .map_err(csv_error)?;

    for row in &summary.devices {
        let status = row.status.to_string();
        writer
            .write_record([
                row.device.as_str(),
                row.device_name.as_str(),
                status.as_str(),
                row.outcome,
                row.report_path.as_str(),
                row.log_path.as_str(),
            ])
            .map_err(csv_error)?;
    }

    writer.flush()?;
    Ok(())
}

fn csv_error(e: csv::Error) -> crate::core::error::FleetError {
    crate::core::error::FleetError::IoError(e.into())
}

fn open_in_browser(path: &Path) -> std::io::Result<()> {
    #[cfg(target_os = "windows")]
    let mut command = {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    };
    #[cfg(target_os = "macos")]
    let mut command = Command::new("open");
    #[cfg(all(unix, not(target_os = "macos")))]
    let mut command = Command::new("xdg-open");

    command.arg(path).spawn()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use crate::core::record::DeviceResult;

    fn result(status: i32) -> DeviceResult {
        DeviceResult {
            status,
            device_name: "Pixel".to_string(),
            report_path: if status == -1 { String::new() } else { "d/log.html".to_string() },
            log_path: String::new(),
        }
    }

    fn five_device_record(dir: &Path) -> RunRecord {
        let start = Local::now() - ChronoDuration::seconds(90);
        let mut record = RunRecord::new("test.air", dir.join("run"), start);
        for (device, status) in [("A", 0), ("B", 0), ("C", 1), ("D", 0), ("E", -1)] {
            record.record(device, result(status));
        }
        record
    }

    #[test]
    fn test_summary_arithmetic() {
        let dir = tempfile::tempdir().unwrap();
        let record = five_device_record(dir.path());

        let summary = RunSummary::from_record(&record, Local::now());
        assert_eq!(summary.success, 3);
        assert_eq!(summary.count, 5);
        assert_eq!(summary.failed(), 2);
        assert!(summary.elapsed >= Duration::from_secs(90));
        assert!(summary.elapsed < Duration::from_secs(95));
    }

    #[test]
    fn test_elapsed_display_has_three_decimals() {
        let dir = tempfile::tempdir().unwrap();
        let record = RunRecord::new("test.air", dir.path().join("run"), Local::now());
        let mut summary = RunSummary::from_record(&record, Local::now());
        summary.elapsed = Duration::from_millis(12_345);
        assert_eq!(summary.elapsed_display(), "12.345");
    }

    #[test]
    fn test_empty_record_summary() {
        let dir = tempfile::tempdir().unwrap();
        let record = RunRecord::new("test.air", dir.path().join("run"), Local::now());
        let summary = RunSummary::from_record(&record, Local::now());
        assert_eq!(summary.success, 0);
        assert_eq!(summary.count, 0);
        assert!(summary.devices.is_empty());
    }

    #[test]
    fn test_summarize_writes_artifacts_without_touching_results() {
        let dir = tempfile::tempdir().unwrap();
        let record = five_device_record(dir.path());
        let before = record.device_results.clone();

        let config = FleetConfig {
            open_report: false,
            ..FleetConfig::default()
        };
        let summary = SummaryBuilder::new(&config).summarize(&record).unwrap();

        assert_eq!(record.device_results, before);
        let html_path = summary.report_path.unwrap();
        assert_eq!(html_path, record.log_root.join("report.html"));

        let html = fs::read_to_string(&html_path).unwrap();
        assert!(html.contains("test.air"));
        assert!(html.contains("3 / 5"));
        assert!(html.contains("log.html"));

        let table = fs::read_to_string(record.log_root.join("report.csv")).unwrap();
        assert_eq!(table.lines().count(), 6);
        assert!(table.starts_with("Device,Name,Status,Outcome,Report,Log"));
        assert!(table.contains("E,Pixel,-1,NO REPORT,,"));
    }

    #[test]
    fn test_html_escapes_device_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = RunRecord::new("test.air", dir.path().join("run"), Local::now());
        let mut r = result(0);
        r.device_name = "<script>".to_string();
        record.record("A", r);

        let html = render_html(&RunSummary::from_record(&record, Local::now())).unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
