use std::io::{self, Write};
use std::fs::File;
use serde_json::{json, Value};

use crate::core::error::FleetError;
use crate::core::launcher::LaunchedTask;
use crate::core::record::{DeviceResult, RunRecord};
use crate::core::summary::RunSummary;
use crate::reporters::Reporter;

/// JSON reporter for machine-readable output
pub struct JsonReporter {
    output_file: Option<String>,
    verbose: bool,
}

impl JsonReporter {
    /// Create a new JSON reporter
    pub fn new(output_file: Option<String>, verbose: bool) -> Self {
        Self { output_file, verbose }
    }

    /// Build the final summary document
    pub fn summary_document(summary: &RunSummary) -> Value {
        let devices: Vec<Value> = summary.devices.iter()
            .map(|row| {
                json!({
                    "device": row.device,
                    "device_name": row.device_name,
                    "status": row.status,
                    "result": row.outcome,
                    "report_path": row.report_path,
                    "log_path": row.log_path,
                })
            })
            .collect();

        json!({
            "summary": {
                "script": summary.script_ref,
                "start": summary.start_time.to_rfc3339(),
                "time": summary.elapsed_display(),
                "success": summary.success,
                "failed": summary.failed(),
                "count": summary.count,
                "log_dir_path": summary.log_root.display().to_string(),
                "report": summary.report_path.as_ref().map(|p| p.display().to_string()),
            },
            "devices": devices,
        })
    }

    /// Write JSON to file or stdout
    fn write_json(&self, json_value: Value) -> io::Result<()> {
        let json_string = serde_json::to_string_pretty(&json_value)?;

        match &self.output_file {
            Some(path) => {
                let mut file = File::create(path)?;
                file.write_all(json_string.as_bytes())?;
            }
            None => {
                println!("{}", json_string);
            }
        }

        Ok(())
    }

    /// Emit a progress event; events only go to stdout, never to the output file
    fn emit_event(&self, event: Value) {
        if self.verbose && self.output_file.is_none() {
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{}", line);
            }
        }
    }
}

impl Reporter for JsonReporter {
    fn report_start(&self, record: &RunRecord, device_count: usize) {
        self.emit_event(json!({
            "event": "run_start",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "script": record.script_ref,
            "log_dir_path": record.log_root.display().to_string(),
            "devices": device_count,
            "recorded": record.device_results.len(),
        }));
    }

    fn report_skip(&self, device: &str) {
        self.emit_event(json!({
            "event": "device_skip",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "device": device,
        }));
    }

    fn report_launch(&self, task: &LaunchedTask) {
        self.emit_event(json!({
            "event": "device_launch",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "device": task.device,
            "log_dir": task.log_dir.display().to_string(),
        }));
    }

    fn report_launch_failure(&self, device: &str, error: &FleetError) {
        self.emit_event(json!({
            "event": "device_launch_failed",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "device": device,
            "error": error.to_string(),
        }));
    }

    fn report_device_result(&self, device: &str, result: &DeviceResult) {
        self.emit_event(json!({
            "event": "device_result",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "device": device,
            "status": result.status,
            "result": result.outcome(),
            "device_name": result.device_name,
            "report_path": result.report_path,
        }));
    }

    fn report_summary(&self, summary: &RunSummary) {
        if let Err(e) = self.write_json(Self::summary_document(summary)) {
            eprintln!("Error writing JSON output: {}", e);
        }
    }

    fn report_warning(&self, message: &str) {
        self.emit_event(json!({
            "event": "warning",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "message": message,
        }));
    }

    fn report_info(&self, message: &str) {
        self.emit_event(json!({
            "event": "info",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "message": message,
        }));
    }
}
