use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use log::{debug, error, info};

use crate::core::command::CommandTemplate;
use crate::core::config::FleetConfig;
use crate::core::device::device_dir_name;
use crate::core::error::{FleetError, Result};
use crate::core::record::RunRecord;
use crate::reporters::Reporter;

/// A device task that has been started and not yet collected.
#[derive(Debug)]
pub struct LaunchedTask {
    pub child: Child,
    pub device: String,
    pub script: String,
    /// Name of the device's directory under the log root.
    pub dir_name: String,
    pub log_dir: PathBuf,
    pub launched_at: Instant,
}

/// Devices whose tasks are running and have no recorded result yet.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<Mutex<BTreeSet<String>>>);

impl InFlight {
    pub fn insert(&self, device: &str) {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).insert(device.to_string());
    }

    pub fn remove(&self, device: &str) {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).remove(device);
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).iter().cloned().collect()
    }
}

/// Starts one external test process per eligible device.
pub struct Launcher {
    command: CommandTemplate,
    workdir: PathBuf,
    in_flight: InFlight,
    /// Files removed from a device directory before each launch so a resumed
    /// attempt never inherits the previous attempt's artifacts.
    stale_files: Vec<String>,
}

impl Launcher {
    pub fn new(command: CommandTemplate, workdir: impl Into<PathBuf>, in_flight: InFlight) -> Self {
        Self {
            command,
            workdir: workdir.into(),
            in_flight,
            stale_files: Vec::new(),
        }
    }

    pub fn from_config(config: &FleetConfig, in_flight: InFlight) -> Self {
        Self::new(config.launch.clone(), config.workdir.clone(), in_flight)
            .with_stale_files(&[config.log_file_name.as_str(), config.report_file_name.as_str()])
    }

    pub fn with_stale_files(mut self, names: &[&str]) -> Self {
        self.stale_files = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Launch `script` on every device that still needs a run.
    ///
    /// A device is skipped when `force_rerun` is off and the record already
    /// holds a zero status for it. Launch failures are reported per device
    /// and leave that device out of the returned tasks. A device whose
    /// directory name is already claimed by another device in this run is
    /// refused the same way.
    pub fn launch(
        &self,
        devices: &[String],
        script: &str,
        record: &RunRecord,
        force_rerun: bool,
        reporter: &dyn Reporter,
    ) -> Vec<LaunchedTask> {
        let mut tasks = Vec::new();
        let mut seen = HashSet::new();
        let mut claimed: HashMap<String, &str> = HashMap::new();

        for device in devices {
            if !seen.insert(device.as_str()) {
                continue;
            }

            let dir_name = device_dir_name(device);

            // A skipped device still owns its directory from the earlier attempt.
            if !force_rerun && record.has_passed(device) {
                info!("Skip device {}", device);
                reporter.report_skip(device);
                claimed.entry(dir_name).or_insert(device.as_str());
                continue;
            }

            let launched = match claimed.get(&dir_name) {
                Some(owner) => Err(FleetError::LogDirConflict {
                    device: device.clone(),
                    dir: dir_name.clone(),
                    owner: owner.to_string(),
                }),
                None => {
                    claimed.insert(dir_name.clone(), device.as_str());
                    self.launch_one(device, script, &record.log_root, dir_name)
                }
            };

            match launched {
                Ok(task) => {
                    self.in_flight.insert(device);
                    reporter.report_launch(&task);
                    tasks.push(task);
                }
                Err(e) => {
                    error!("Error running on device {}: {}", device, e);
                    reporter.report_launch_failure(device, &e);
                }
            }
        }

        tasks
    }

    fn launch_one(&self, device: &str, script: &str, log_root: &Path, dir_name: String) -> Result<LaunchedTask> {
        let log_dir = create_device_dir(log_root, &dir_name)?;
        self.clear_stale_files(&log_dir)?;

        let log_dir_arg = log_dir.to_string_lossy();
        let vars = [
            ("script", script),
            ("device", device),
            ("log_dir", log_dir_arg.as_ref()),
        ];

        info!("Launching on {}: {}", device, self.command.display(&vars));
        let child = self
            .command
            .to_command(&vars, &self.workdir)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| FleetError::SpawnError {
                device: device.to_string(),
                source,
            })?;

        Ok(LaunchedTask {
            child,
            device: device.to_string(),
            script: script.to_string(),
            dir_name,
            log_dir,
            launched_at: Instant::now(),
        })
    }

    fn clear_stale_files(&self, log_dir: &Path) -> Result<()> {
        for name in &self.stale_files {
            let path = log_dir.join(name);
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed previous attempt's {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Create `log_root/<dir_name>` and return it.
pub fn create_device_dir(log_root: &Path, dir_name: &str) -> Result<PathBuf> {
    let dir = log_root.join(dir_name);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}
