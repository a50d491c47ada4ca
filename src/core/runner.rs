use std::fs;
use log::{info, warn};

use crate::core::collector::Collector;
use crate::core::config::FleetConfig;
use crate::core::device::{CsvDeviceResolver, DeviceResolver};
use crate::core::error::{FleetError, Result};
use crate::core::launcher::{InFlight, Launcher};
use crate::core::ledger::Ledger;
use crate::core::summary::{RunSummary, SummaryBuilder};
use crate::reporters::Reporter;

/// Drives one run: load the ledger, launch eligible devices, collect each
/// device in launch order, then build the summary.
pub struct DeviceRunner {
    config: FleetConfig,
    reporter: Box<dyn Reporter>,
    resolver: Box<dyn DeviceResolver>,
    in_flight: InFlight,
}

impl DeviceRunner {
    /// Create a runner that resolves device names from the configured table
    pub fn new(config: FleetConfig, reporter: Box<dyn Reporter>) -> Self {
        let resolver = Box::new(CsvDeviceResolver::new(config.device_info_path()));
        Self::with_resolver(config, reporter, resolver)
    }

    pub fn with_resolver(
        config: FleetConfig,
        reporter: Box<dyn Reporter>,
        resolver: Box<dyn DeviceResolver>,
    ) -> Self {
        Self {
            config,
            reporter,
            resolver,
            in_flight: InFlight::default(),
        }
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Set up interrupt handler
    ///
    /// Ctrl-C does not stop device tasks; it names the devices that will have
    /// no recorded result and exits.
    pub fn setup_interrupt_handler(&self) -> Result<()> {
        let in_flight = self.in_flight.clone();

        ctrlc::set_handler(move || {
            let pending = in_flight.snapshot();
            if pending.is_empty() {
                eprintln!("\nReceived interrupt signal, exiting.");
            } else {
                eprintln!("\nReceived interrupt signal with {} device(s) still running: {}",
                    pending.len(),
                    pending.join(", "));
                eprintln!("Their results were not recorded; resume the run to launch them again.");
            }
            std::process::exit(130);
        })
        .map_err(|e| FleetError::UnexpectedError(format!("Failed to set Ctrl-C handler: {}", e)))?;

        Ok(())
    }

    /// Run `script` on `devices`.
    ///
    /// With `run_all` set, a new run is started and every device is launched.
    /// Otherwise the stored ledger is resumed and devices that already passed
    /// are skipped.
    pub fn run(&self, devices: &[String], script: &str, run_all: bool) -> Result<RunSummary> {
        let config = self.resolved_config()?;
        let ledger = Ledger::from_config(&config);
        let mut record = ledger.load_or_create(script, !run_all)?;

        self.reporter.report_start(&record, devices.len());

        let launcher = Launcher::from_config(&config, self.in_flight.clone());
        let tasks = launcher.launch(devices, script, &record, run_all, self.reporter.as_ref());

        if tasks.is_empty() {
            self.reporter.report_warning("No device tasks were launched");
        } else {
            self.reporter.report_info(&format!("Waiting for {} device task(s)", tasks.len()));
        }

        let collector = Collector::new(&config, self.resolver.as_ref(), self.in_flight.clone());
        collector.collect(tasks, &mut record, &ledger, self.reporter.as_ref())?;

        let summary = SummaryBuilder::new(&config).summarize(&record)?;
        self.reporter.report_summary(&summary);

        Ok(summary)
    }

    /// Re-render the summary of the run stored in the ledger, if any.
    pub fn summarize_stored(&self) -> Result<Option<RunSummary>> {
        let config = self.resolved_config()?;
        let ledger = Ledger::from_config(&config);

        let record = match ledger.load()? {
            Some(record) => record,
            None => {
                warn!("No ledger found at {}", ledger.path().display());
                return Ok(None);
            }
        };

        let summary = SummaryBuilder::new(&config).summarize(&record)?;
        self.reporter.report_summary(&summary);
        Ok(Some(summary))
    }

    /// Make the working directory absolute so device tasks and the ledger
    /// agree on every path regardless of the caller's cwd.
    fn resolved_config(&self) -> Result<FleetConfig> {
        let mut config = self.config.clone();
        fs::create_dir_all(&config.workdir)?;
        config.workdir = fs::canonicalize(&config.workdir)?;
        info!("Working directory: {}", config.workdir.display());
        Ok(config)
    }
}
