use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use chrono::{DateTime, Local};
use log::{debug, info, warn};

use crate::core::config::FleetConfig;
use crate::core::error::{FleetError, Result};
use crate::core::record::RunRecord;

const LOG_ROOT_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// Durable, resumable record of a run's per-device progress.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    result_dir: PathBuf,
    pointer_name: String,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>, result_dir: impl Into<PathBuf>, pointer_name: &str) -> Self {
        Self {
            path: path.into(),
            result_dir: result_dir.into(),
            pointer_name: pointer_name.to_string(),
        }
    }

    pub fn from_config(config: &FleetConfig) -> Self {
        Self::new(config.ledger_path(), config.result_path(), &config.pointer_file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pointer_path(&self) -> PathBuf {
        self.result_dir.join(&self.pointer_name)
    }

    /// Resume the stored record when asked to and one exists, otherwise start
    /// a fresh record with a newly created log root.
    pub fn load_or_create(&self, script_ref: &str, resume: bool) -> Result<RunRecord> {
        let now = Local::now();

        if resume {
            if let Some(mut record) = self.load()? {
                info!(
                    "Resuming run from {} ({} device result(s) recorded)",
                    self.path.display(),
                    record.device_results.len()
                );
                if record.script_ref != script_ref {
                    warn!(
                        "Ledger was recorded for script {} but {} was requested",
                        record.script_ref, script_ref
                    );
                }
                record.start_time = now;
                fs::create_dir_all(&record.log_root)?;
                return Ok(record);
            }
            debug!("No ledger at {}, starting a new run", self.path.display());
        }

        let log_root = self.create_log_root(now)?;
        info!("Created log root {}", log_root.display());
        Ok(RunRecord::new(script_ref, log_root, now))
    }

    pub fn load(&self) -> Result<Option<RunRecord>> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let mut record = serde_json::from_str::<RunRecord>(&contents)?;
        record.log_root = self.resolve_log_root(&record.log_root);
        Ok(Some(record))
    }

    /// Replace the stored ledger with `record` in one rename.
    ///
    /// A log root under the ledger's directory is stored relative to it, so
    /// the whole working directory can move without breaking a resume.
    pub fn persist(&self, record: &RunRecord) -> Result<()> {
        let mut stored = record.clone();
        if let Ok(relative) = record.log_root.strip_prefix(self.base_dir()) {
            stored.log_root = relative.to_path_buf();
        }

        AtomicFile::new(&self.path, OverwriteBehavior::AllowOverwrite)
            .write(|file| serde_json::to_writer_pretty(file, &stored))
            .map_err(|e| match e {
                atomicwrites::Error::Internal(io) => FleetError::IoError(io),
                atomicwrites::Error::User(json) => FleetError::LedgerError(json),
            })?;

        debug!(
            "Persisted ledger with {} device result(s) to {}",
            record.device_results.len(),
            self.path.display()
        );
        Ok(())
    }

    fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Relative log roots are anchored at the ledger's directory. Either
    /// separator is accepted since ledgers may come from another platform.
    fn resolve_log_root(&self, stored: &Path) -> PathBuf {
        if stored.is_absolute() {
            return stored.to_path_buf();
        }
        let mut resolved = self.base_dir().to_path_buf();
        for part in stored.to_string_lossy().split(|c: char| c == '/' || c == '\\') {
            if !part.is_empty() && part != "." {
                resolved.push(part);
            }
        }
        resolved
    }

    /// Name of the log root most recently announced through the pointer file.
    pub fn read_pointer(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.pointer_path()) {
            Ok(contents) => Ok(Some(contents.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Claim a directory under the result dir named after `start`, suffixing
    /// `_1`, `_2`, ... when a run in the same second already owns the name.
    fn create_log_root(&self, start: DateTime<Local>) -> Result<PathBuf> {
        fs::create_dir_all(&self.result_dir)?;

        let base = start.format(LOG_ROOT_FORMAT).to_string();
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                base.clone()
            } else {
                format!("{}_{}", base, attempt)
            };
            let candidate = self.result_dir.join(&name);

            match fs::create_dir(&candidate) {
                Ok(()) => {
                    self.write_pointer(&name)?;
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write_pointer(&self, name: &str) -> Result<()> {
        let pointer = self.pointer_path();
        if self.read_pointer()?.as_deref() == Some(name) {
            return Ok(());
        }
        fs::write(&pointer, name)?;
        debug!("Recorded active log root {} in {}", name, pointer.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::DeviceResult;

    fn ledger_in(dir: &Path) -> Ledger {
        Ledger::new(dir.join("data.json"), dir.join("result"), "current_log_folder.txt")
    }

    fn passed() -> DeviceResult {
        DeviceResult {
            status: 0,
            device_name: "Galaxy S10".to_string(),
            report_path: "A/log.html".to_string(),
            log_path: "A/log.txt".to_string(),
        }
    }

    #[test]
    fn test_create_fresh_record() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(dir.path());

        let record = ledger.load_or_create("test.air", true).unwrap();
        assert_eq!(record.script_ref, "test.air");
        assert!(record.device_results.is_empty());
        assert!(record.log_root.is_dir());
        assert!(record.log_root.starts_with(dir.path().join("result")));

        let name = record.log_root.file_name().unwrap().to_str().unwrap().to_string();
        assert_eq!(ledger.read_pointer().unwrap(), Some(name));
    }

    #[test]
    fn test_log_roots_are_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(dir.path());

        let first = ledger.load_or_create("test.air", false).unwrap();
        let second = ledger.load_or_create("test.air", false).unwrap();
        assert_ne!(first.log_root, second.log_root);

        let name = second.log_root.file_name().unwrap().to_str().unwrap().to_string();
        assert_eq!(ledger.read_pointer().unwrap(), Some(name));
    }

    #[test]
    fn test_persist_then_resume() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(dir.path());

        let mut record = ledger.load_or_create("test.air", false).unwrap();
        record.record("A", passed());
        ledger.persist(&record).unwrap();

        let resumed = ledger.load_or_create("test.air", true).unwrap();
        assert_eq!(resumed.log_root, record.log_root);
        assert_eq!(resumed.device_results.get("A"), Some(&passed()));
        assert!(resumed.start_time >= record.start_time);
    }

    #[test]
    fn test_full_rerun_ignores_stored_record() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(dir.path());

        let mut record = ledger.load_or_create("test.air", false).unwrap();
        record.record("A", passed());
        ledger.persist(&record).unwrap();

        let fresh = ledger.load_or_create("test.air", false).unwrap();
        assert!(fresh.device_results.is_empty());
        assert_ne!(fresh.log_root, record.log_root);
    }

    #[test]
    fn test_persist_overwrites_whole_record() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(dir.path());

        let mut record = ledger.load_or_create("test.air", false).unwrap();
        record.record("A", passed());
        ledger.persist(&record).unwrap();
        record.device_results.clear();
        ledger.persist(&record).unwrap();

        let stored = ledger.load().unwrap().unwrap();
        assert!(stored.device_results.is_empty());
    }

    #[test]
    fn test_corrupt_ledger_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(dir.path());
        fs::write(ledger.path(), "{ not json").unwrap();

        let err = ledger.load_or_create("test.air", true).unwrap_err();
        assert!(matches!(err, FleetError::LedgerError(_)));
    }

    #[test]
    fn test_log_root_is_stored_relative_to_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(dir.path());

        let mut record = ledger.load_or_create("test.air", false).unwrap();
        record.record("A", passed());
        ledger.persist(&record).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(ledger.path()).unwrap()).unwrap();
        let stored = raw["log_dir_path"].as_str().unwrap();
        assert!(stored.starts_with("result"));
        assert!(Path::new(stored).is_relative());

        assert_eq!(ledger.load().unwrap().unwrap().log_root, record.log_root);
    }

    #[test]
    fn test_loads_ledger_from_older_tool() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(dir.path());
        fs::write(
            ledger.path(),
            r#"{
                "start": 1704164645.25,
                "script": "test.air",
                "log_dir_path": "result\\2024_01_02_03_04_05",
                "tests": {"R58M1234": {"status": 0, "device_name": "Galaxy S10", "path": "R58M1234/log.html"}}
            }"#,
        )
        .unwrap();

        let record = ledger.load().unwrap().unwrap();
        assert_eq!(record.start_time.timestamp(), 1704164645);
        assert_eq!(record.log_root, dir.path().join("result").join("2024_01_02_03_04_05"));
        assert!(record.has_passed("R58M1234"));
    }
}
