use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::thread;
use std::time::Duration;
use log::{error, info, warn};

use crate::core::command::CommandTemplate;
use crate::core::config::FleetConfig;
use crate::core::device::DeviceResolver;
use crate::core::error::{FleetError, Result};
use crate::core::launcher::{InFlight, LaunchedTask};
use crate::core::ledger::Ledger;
use crate::core::record::{
    DeviceResult, RunRecord, DEVICE_NOT_FOUND, STATUS_SIGNALED, STATUS_TIMED_OUT,
};
use crate::reporters::Reporter;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How a device task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskExit {
    Exited(i32),
    TimedOut,
}

impl TaskExit {
    pub fn status(&self) -> i32 {
        match self {
            TaskExit::Exited(code) => *code,
            TaskExit::TimedOut => STATUS_TIMED_OUT,
        }
    }
}

/// Waits for launched tasks and turns their logs into device results.
pub struct Collector<'a> {
    report: CommandTemplate,
    workdir: PathBuf,
    log_file_name: String,
    report_file_name: String,
    timeout: Option<Duration>,
    resolver: &'a dyn DeviceResolver,
    in_flight: InFlight,
}

impl<'a> Collector<'a> {
    pub fn new(config: &FleetConfig, resolver: &'a dyn DeviceResolver, in_flight: InFlight) -> Self {
        Self {
            report: config.report.clone(),
            workdir: config.workdir.clone(),
            log_file_name: config.log_file_name.clone(),
            report_file_name: config.report_file_name.clone(),
            timeout: config.task_timeout,
            resolver,
            in_flight,
        }
    }

    /// Wait for every task in launch order, recording and persisting each
    /// device's result as soon as it is known.
    ///
    /// Only ledger writes can fail this call; everything that goes wrong for
    /// a single device degrades to a sentinel result for that device.
    pub fn collect(
        &self,
        tasks: Vec<LaunchedTask>,
        record: &mut RunRecord,
        ledger: &Ledger,
        reporter: &dyn Reporter,
    ) -> Result<()> {
        for mut task in tasks {
            let result = match self.wait(&mut task) {
                Ok(exit) => {
                    if exit == TaskExit::TimedOut {
                        warn!("Device {} exceeded its timeout and was stopped", task.device);
                    }
                    self.build_result(&task, exit.status())
                }
                Err(e) => {
                    error!("Failed to wait for device {}: {}", task.device, e);
                    DeviceResult::no_report(self.device_name(&task.device))
                }
            };

            info!("Device {} finished with status {}", task.device, result.status);
            reporter.report_device_result(&task.device, &result);
            record.record(&task.device, result);
            ledger.persist(record)?;
            self.in_flight.remove(&task.device);
        }

        Ok(())
    }

    /// Block until the task exits, or until its deadline passes when a
    /// timeout is configured.
    pub fn wait(&self, task: &mut LaunchedTask) -> Result<TaskExit> {
        let timeout = match self.timeout {
            None => {
                let status = task.child.wait()?;
                return Ok(TaskExit::Exited(status.code().unwrap_or(STATUS_SIGNALED)));
            }
            Some(timeout) => timeout,
        };

        loop {
            if let Some(status) = task.child.try_wait()? {
                return Ok(TaskExit::Exited(status.code().unwrap_or(STATUS_SIGNALED)));
            }
            if task.launched_at.elapsed() >= timeout {
                // The process may exit between try_wait and kill.
                let _ = task.child.kill();
                task.child.wait()?;
                return Ok(TaskExit::TimedOut);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Build the device result for a finished task with the given status.
    pub fn build_result(&self, task: &LaunchedTask, status: i32) -> DeviceResult {
        let device_name = self.device_name(&task.device);
        let log_file = task.log_dir.join(&self.log_file_name);

        if !log_file.is_file() {
            warn!("Report build failed. File not found: {}", log_file.display());
            return DeviceResult::no_report(device_name);
        }

        if let Err(e) = self.generate_report(task) {
            error!("Report build failed for device {}: {}", task.device, e);
            return DeviceResult::no_report(device_name);
        }

        DeviceResult {
            status,
            device_name,
            report_path: format!("{}/{}", task.dir_name, self.report_file_name),
            log_path: format!("{}/{}", task.dir_name, self.log_file_name),
        }
    }

    fn device_name(&self, device: &str) -> String {
        self.resolver
            .resolve(device)
            .unwrap_or_else(|| DEVICE_NOT_FOUND.to_string())
    }

    fn generate_report(&self, task: &LaunchedTask) -> Result<()> {
        let outfile = task.log_dir.join(&self.report_file_name);
        let log_dir = path_arg(&task.log_dir);
        let outfile_arg = path_arg(&outfile);
        let vars = [
            ("script", task.script.as_str()),
            ("device", task.device.as_str()),
            ("log_dir", log_dir.as_str()),
            ("outfile", outfile_arg.as_str()),
        ];

        info!("Building report for {}: {}", task.device, self.report.display(&vars));
        let status = self
            .report
            .to_command(&vars, &self.workdir)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| FleetError::ReportError(format!("failed to start {}: {}", self.report.program, e)))?;

        if !status.success() {
            return Err(FleetError::ReportError(format!(
                "{} exited with {}",
                self.report.program, status
            )));
        }

        Ok(())
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
