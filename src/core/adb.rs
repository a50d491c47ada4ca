use std::process::Command;
use log::debug;

use crate::core::error::{FleetError, Result};

/// List serials of devices that `adb devices` reports in the `device` state.
pub fn discover_devices(adb_program: &str) -> Result<Vec<String>> {
    let output = Command::new(adb_program)
        .arg("devices")
        .output()
        .map_err(|e| FleetError::DiscoveryError(format!("failed to run {} devices: {}", adb_program, e)))?;

    if !output.status.success() {
        return Err(FleetError::DiscoveryError(format!(
            "{} devices exited with {}: {}",
            adb_program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let devices = parse_device_list(&stdout);
    debug!("adb reported {} ready device(s)", devices.len());
    Ok(devices)
}

/// Parse `adb devices` output, skipping the banner, daemon notices and any
/// device that is offline or unauthorized.
pub fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let serial = fields.next()?;
            let state = fields.next()?;
            if state == "device" && !serial.starts_with('*') {
                Some(serial.to_string())
            } else {
                None
            }
        })
        .collect()
}
