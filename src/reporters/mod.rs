pub mod text;
pub mod json;
pub mod csv;

use crate::core::error::FleetError;
use crate::core::launcher::LaunchedTask;
use crate::core::record::{DeviceResult, RunRecord};
use crate::core::summary::RunSummary;

/// Reporter trait for operator-facing progress and results
pub trait Reporter {
    /// Report the start of a run over `device_count` requested devices
    fn report_start(&self, record: &RunRecord, device_count: usize);

    /// Report a device skipped because it already passed
    fn report_skip(&self, device: &str);

    /// Report a device task that was started
    fn report_launch(&self, task: &LaunchedTask);

    /// Report a device whose task could not be started
    fn report_launch_failure(&self, device: &str, error: &FleetError);

    /// Report the recorded result of one device
    fn report_device_result(&self, device: &str, result: &DeviceResult);

    /// Report the final run summary
    fn report_summary(&self, summary: &RunSummary);

    /// Report a warning message
    fn report_warning(&self, message: &str);

    /// Report an informational message
    fn report_info(&self, message: &str);
}
