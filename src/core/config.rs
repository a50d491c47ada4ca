use serde::{Serialize, Deserialize};
use std::time::Duration;
use std::path::{Path, PathBuf};

use crate::core::command::CommandTemplate;
use crate::core::error::{FleetError, Result};

const MIN_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Directory the ledger, result tree and device tasks are rooted at.
    pub workdir: PathBuf,
    pub ledger_file: String,
    pub result_dir: String,
    pub pointer_file: String,
    pub device_info: PathBuf,
    pub adb_program: String,

    pub launch: CommandTemplate,
    pub report: CommandTemplate,

    pub log_file_name: String,
    pub report_file_name: String,
    pub summary_file_name: String,
    pub summary_table_name: String,

    #[serde(with = "humantime_opt")]
    pub task_timeout: Option<Duration>,
    pub open_report: bool,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
            ledger_file: "data.json".to_string(),
            result_dir: "result".to_string(),
            pointer_file: "current_log_folder.txt".to_string(),
            device_info: PathBuf::from("devices").join("device_info.csv"),
            adb_program: "adb".to_string(),

            launch: CommandTemplate::new(
                "airtest",
                &[
                    "run",
                    "{script}",
                    "--device",
                    "Android:///{device}",
                    "--log",
                    "{log_dir}",
                    "--recording",
                ],
            ),
            report: CommandTemplate::new(
                "airtest",
                &[
                    "report",
                    "{script}",
                    "--log_root",
                    "{log_dir}",
                    "--outfile",
                    "{outfile}",
                    "--lang",
                    "zh",
                ],
            ),

            log_file_name: "log.txt".to_string(),
            report_file_name: "log.html".to_string(),
            summary_file_name: "report.html".to_string(),
            summary_table_name: "report.csv".to_string(),

            task_timeout: None,
            open_report: true,
        }
    }
}

impl FleetConfig {
    pub fn ledger_path(&self) -> PathBuf {
        self.workdir.join(&self.ledger_file)
    }

    pub fn result_path(&self) -> PathBuf {
        self.workdir.join(&self.result_dir)
    }

    pub fn device_info_path(&self) -> PathBuf {
        self.workdir.join(&self.device_info)
    }

    /// Parse a per-task timeout such as `45m` or `2h`.
    pub fn parse_timeout(timeout_str: &str) -> std::result::Result<Duration, String> {
        let timeout = humantime::parse_duration(timeout_str)
            .map_err(|e| format!("Invalid timeout format: {}", e))?;

        check_timeout(timeout)?;
        Ok(timeout)
    }

    /// Load a configuration file, TOML when the extension says so and JSON otherwise.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FleetError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            FleetError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let config = if path.extension().and_then(|ext| ext.to_str()) == Some("toml") {
            toml::from_str::<Self>(&contents).map_err(|e| {
                FleetError::ConfigError(format!("Failed to parse TOML config: {}", e))
            })?
        } else {
            serde_json::from_str::<Self>(&contents).map_err(|e| {
                FleetError::ConfigError(format!("Failed to parse JSON config: {}", e))
            })?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.launch.program.trim().is_empty() {
            return Err(FleetError::ConfigError("launch.program must not be empty".to_string()));
        }
        if self.report.program.trim().is_empty() {
            return Err(FleetError::ConfigError("report.program must not be empty".to_string()));
        }
        if self.log_file_name.is_empty() || self.report_file_name.is_empty() {
            return Err(FleetError::ConfigError(
                "log_file_name and report_file_name must be set".to_string(),
            ));
        }
        if let Some(timeout) = self.task_timeout {
            check_timeout(timeout)
                .map_err(|e| FleetError::ConfigError(format!("task_timeout: {}", e)))?;
        }
        Ok(())
    }
}

fn check_timeout(timeout: Duration) -> std::result::Result<(), String> {
    if timeout < MIN_TIMEOUT {
        return Err("Timeout must be at least 1 second".to_string());
    }
    if timeout > MAX_TIMEOUT {
        return Err("Timeout cannot exceed 7 days".to_string());
    }
    Ok(())
}

mod humantime_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => {
                serializer.serialize_str(&humantime::format_duration(*duration).to_string())
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
