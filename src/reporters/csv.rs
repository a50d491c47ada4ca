use std::fs::File;
use std::io::{self, Write};
use csv::Writer;

use crate::core::error::FleetError;
use crate::core::launcher::LaunchedTask;
use crate::core::record::{DeviceResult, RunRecord};
use crate::core::summary::RunSummary;
use crate::reporters::Reporter;

/// CSV reporter for spreadsheet-compatible output
pub struct CsvReporter {
    output_file: Option<String>,
}

impl CsvReporter {
    /// Create a new CSV reporter
    pub fn new(output_file: Option<String>) -> Self {
        Self { output_file }
    }

    /// Create a CSV writer
    fn create_writer(&self) -> io::Result<Writer<Box<dyn Write>>> {
        match &self.output_file {
            Some(path) => {
                let file = File::create(path)?;
                Ok(csv::Writer::from_writer(Box::new(file) as Box<dyn Write>))
            }
            None => {
                Ok(csv::Writer::from_writer(Box::new(io::stdout()) as Box<dyn Write>))
            }
        }
    }

    fn write_summary(&self, summary: &RunSummary) -> csv::Result<()> {
        let mut writer = self.create_writer()?;

        writer.write_record(["Device", "Name", "Status", "Result", "Report", "Log"])?;
        for row in &summary.devices {
            let status = row.status.to_string();
            writer.write_record([
                row.device.as_str(),
                row.device_name.as_str(),
                status.as_str(),
                row.outcome,
                row.report_path.as_str(),
                row.log_path.as_str(),
            ])?;
        }

        writer.write_record([""; 6])?;

        let start = summary.start_display();
        let elapsed = summary.elapsed_display();
        let success = summary.success.to_string();
        let count = summary.count.to_string();
        let log_root = summary.log_root.display().to_string();
        let summary_records = [
            ["Script", summary.script_ref.as_str()],
            ["Started", start.as_str()],
            ["Elapsed (s)", elapsed.as_str()],
            ["Passed", success.as_str()],
            ["Devices", count.as_str()],
            ["Log Root", log_root.as_str()],
        ];
        for [key, value] in summary_records {
            writer.write_record([key, value, "", "", "", ""])?;
        }

        writer.flush()?;
        Ok(())
    }
}

impl Reporter for CsvReporter {
    fn report_start(&self, _record: &RunRecord, _device_count: usize) {
        // CSV reporter doesn't output anything at start
    }

    fn report_skip(&self, _device: &str) {}

    fn report_launch(&self, _task: &LaunchedTask) {}

    fn report_launch_failure(&self, device: &str, error: &FleetError) {
        eprintln!("Error launching on device {}: {}", device, error);
    }

    fn report_device_result(&self, _device: &str, _result: &DeviceResult) {
        // Individual device results are only reported in the final output
    }

    fn report_summary(&self, summary: &RunSummary) {
        if let Err(e) = self.write_summary(summary) {
            eprintln!("Error writing CSV output: {}", e);
        }
    }

    fn report_warning(&self, _message: &str) {
        // CSV reporter doesn't output warnings
    }

    fn report_info(&self, _message: &str) {
        // CSV reporter doesn't output info messages
    }
}
