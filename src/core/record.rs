use std::collections::BTreeMap;
use std::path::PathBuf;
use chrono::{DateTime, Local};
use serde::{Serialize, Deserialize};

/// Exit status of a device whose log never appeared, so no report was built.
pub const STATUS_NO_REPORT: i32 = -1;
/// Exit status of a device task that was killed after exceeding its timeout.
pub const STATUS_TIMED_OUT: i32 = -2;
/// Exit status of a device task terminated by a signal without an exit code.
pub const STATUS_SIGNALED: i32 = -3;

/// Display name used when the metadata table has no entry for a device.
pub const DEVICE_NOT_FOUND: &str = "NULL";

/// One test-run session as stored in the ledger.
///
/// Field names on disk follow the ledger format read by the device-side
/// tooling: `start`, `script`, `log_dir_path` and `tests`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    #[serde(rename = "start", deserialize_with = "start_time::deserialize")]
    pub start_time: DateTime<Local>,
    #[serde(rename = "script")]
    pub script_ref: String,
    #[serde(rename = "log_dir_path")]
    pub log_root: PathBuf,
    #[serde(rename = "tests", default)]
    pub device_results: BTreeMap<String, DeviceResult>,
}

impl RunRecord {
    pub fn new(script_ref: &str, log_root: PathBuf, start_time: DateTime<Local>) -> Self {
        Self {
            start_time,
            script_ref: script_ref.to_string(),
            log_root,
            device_results: BTreeMap::new(),
        }
    }

    /// Returns `true` if the device already finished successfully in this ledger.
    pub fn has_passed(&self, device: &str) -> bool {
        self.device_results
            .get(device)
            .map_or(false, |r| r.status == 0)
    }

    pub fn success_count(&self) -> usize {
        self.device_results.values().filter(|r| r.status == 0).count()
    }

    pub fn record(&mut self, device: &str, result: DeviceResult) {
        self.device_results.insert(device.to_string(), result);
    }
}

mod start_time {
    use chrono::{DateTime, Local, TimeZone};
    use serde::{de, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        Timestamp(DateTime<Local>),
        EpochSeconds(f64),
    }

    /// Accepts RFC 3339 text or epoch seconds as written by older tooling.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Local>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Stored::deserialize(deserializer)? {
            Stored::Timestamp(time) => Ok(time),
            Stored::EpochSeconds(secs) => Local
                .timestamp_millis_opt((secs * 1000.0).round() as i64)
                .single()
                .ok_or_else(|| de::Error::custom(format!("start time out of range: {}", secs))),
        }
    }
}

/// Outcome of a device as classified from its recorded status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOutcome {
    Passed,
    Failed,
    TimedOut,
    NoReport,
}

impl DeviceOutcome {
    pub fn from_status(status: i32) -> Self {
        match status {
            0 => DeviceOutcome::Passed,
            STATUS_NO_REPORT => DeviceOutcome::NoReport,
            STATUS_TIMED_OUT => DeviceOutcome::TimedOut,
            _ => DeviceOutcome::Failed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeviceOutcome::Passed => "PASS",
            DeviceOutcome::Failed => "FAIL",
            DeviceOutcome::TimedOut => "TIMEOUT",
            DeviceOutcome::NoReport => "NO REPORT",
        }
    }
}

/// Per-device outcome, created once the device task has exited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceResult {
    pub status: i32,
    #[serde(default = "not_found")]
    pub device_name: String,
    #[serde(rename = "path", default)]
    pub report_path: String,
    #[serde(default)]
    pub log_path: String,
}

fn not_found() -> String {
    DEVICE_NOT_FOUND.to_string()
}

impl DeviceResult {
    /// Result for a device whose log file was absent or whose report could not be built.
    pub fn no_report(device_name: String) -> Self {
        Self {
            status: STATUS_NO_REPORT,
            device_name,
            report_path: String::new(),
            log_path: String::new(),
        }
    }

    pub fn outcome(&self) -> DeviceOutcome {
        DeviceOutcome::from_status(self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: i32) -> DeviceResult {
        DeviceResult {
            status,
            device_name: "Pixel 7".to_string(),
            report_path: "R58M1234/log.html".to_string(),
            log_path: "R58M1234/log.txt".to_string(),
        }
    }

    #[test]
    fn test_outcome_from_status() {
        assert_eq!(DeviceOutcome::from_status(0), DeviceOutcome::Passed);
        assert_eq!(DeviceOutcome::from_status(1), DeviceOutcome::Failed);
        assert_eq!(DeviceOutcome::from_status(STATUS_SIGNALED), DeviceOutcome::Failed);
        assert_eq!(DeviceOutcome::from_status(-1), DeviceOutcome::NoReport);
        assert_eq!(DeviceOutcome::from_status(-2), DeviceOutcome::TimedOut);
    }

    #[test]
    fn test_has_passed_requires_exact_zero() {
        let mut record = RunRecord::new("test.air", PathBuf::from("result/x"), Local::now());
        record.record("A", result(0));
        record.record("B", result(1));
        record.record("C", DeviceResult::no_report(not_found()));

        assert!(record.has_passed("A"));
        assert!(!record.has_passed("B"));
        assert!(!record.has_passed("C"));
        assert!(!record.has_passed("D"));
        assert_eq!(record.success_count(), 1);
    }

    #[test]
    fn test_record_overwrites_previous_result() {
        let mut record = RunRecord::new("test.air", PathBuf::from("result/x"), Local::now());
        record.record("A", result(1));
        record.record("A", result(0));
        assert_eq!(record.device_results.len(), 1);
        assert_eq!(record.device_results["A"].status, 0);
    }

    #[test]
    fn test_ledger_field_names() {
        let mut record = RunRecord::new("test.air", PathBuf::from("result/2024_01_02_03_04_05"), Local::now());
        record.record("R58M1234", result(0));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["script"], "test.air");
        assert_eq!(value["log_dir_path"], "result/2024_01_02_03_04_05");
        assert!(value["start"].is_string());
        assert_eq!(value["tests"]["R58M1234"]["status"], 0);
        assert_eq!(value["tests"]["R58M1234"]["path"], "R58M1234/log.html");
    }

    #[test]
    fn test_degraded_entry_without_name_parses() {
        let json = r#"{"status": -1, "path": ""}"#;
        let parsed: DeviceResult = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.status, -1);
        assert_eq!(parsed.device_name, DEVICE_NOT_FOUND);
        assert!(parsed.log_path.is_empty());
        assert_eq!(parsed.outcome(), DeviceOutcome::NoReport);
    }

    #[test]
    fn test_start_accepts_epoch_seconds() {
        let json = r#"{"start": 1704164645.5, "script": "test.air", "log_dir_path": "result/x"}"#;
        let parsed: RunRecord = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.start_time.timestamp_millis(), 1704164645500);
        assert!(parsed.device_results.is_empty());
    }

    #[test]
    fn test_start_round_trips_as_text() {
        let record = RunRecord::new("test.air", PathBuf::from("result/x"), Local::now());
        let parsed: RunRecord = serde_json::from_value(serde_json::to_value(&record).unwrap()).unwrap();
        assert_eq!(parsed.start_time, record.start_time);
    }
}
