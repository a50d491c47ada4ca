use std::process;
use std::path::PathBuf;
use clap::{Parser, Subcommand, ValueEnum};
use anyhow::{Result, Context};
use indoc::indoc;
use log::{info, error};
use simple_logger::SimpleLogger;

use devfleet::core::adb;
use devfleet::core::config::FleetConfig;
use devfleet::core::runner::DeviceRunner;
use devfleet::reporters::{Reporter, text::TextReporter, json::JsonReporter, csv::CsvReporter};

const AFTER_HELP: &str = indoc! {"
    Examples:
      devfleet run test.air                     run on every device adb reports, resuming progress
      devfleet run test.air R58M1234 --run-all  start over on one device
      devfleet summary                          re-render the report of the stored run
"};


#[derive(Parser)]
#[command(author, version, about, long_about = None, after_help = AFTER_HELP)]
struct Cli {

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,


    #[arg(short, long)]
    output: Option<String>,


    #[arg(short, long)]
    verbose: bool,


    #[arg(short, long)]
    quiet: bool,


    #[arg(short, long)]
    config: Option<PathBuf>,


    #[command(subcommand)]
    command: Commands,
}


#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {

    Text,

    Json,

    Csv,
}


#[derive(Subcommand)]
enum Commands {
    /// Run a test script on a set of devices
    Run {
        /// Test script to execute on each device
        script: String,

        /// Device serials; defaults to every device reported by adb
        devices: Vec<String>,

        /// Start a new run instead of resuming the stored progress
        #[arg(short = 'a', long)]
        run_all: bool,

        /// Stop a device task after this long, e.g. 45m
        #[arg(short, long)]
        timeout: Option<String>,

        /// Do not open the HTML report when the run finishes
        #[arg(long)]
        no_open: bool,
    },

    /// List devices reported by adb
    Devices,

    /// Re-render the summary report of the stored run
    Summary {
        /// Do not open the HTML report
        #[arg(long)]
        no_open: bool,
    },
}

fn main() -> Result<()> {

    let cli = Cli::parse();


    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if cli.quiet {
        log::LevelFilter::Warn
    } else {
        log::LevelFilter::Info
    };

    SimpleLogger::new()
        .with_level(log_level)
        .init()
        .context("Failed to initialize logger")?;

    info!("Devfleet v{}", env!("CARGO_PKG_VERSION"));


    let mut config = match &cli.config {
        Some(path) => FleetConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => FleetConfig::default(),
    };


    let reporter: Box<dyn Reporter> = match cli.format {
        OutputFormat::Text => Box::new(TextReporter::new(cli.verbose, cli.quiet)),
        OutputFormat::Json => Box::new(JsonReporter::new(cli.output.clone(), cli.verbose)),
        OutputFormat::Csv => Box::new(CsvReporter::new(cli.output.clone())),
    };


    match cli.command {
        Commands::Devices => {
            return list_devices(&config);
        }

        Commands::Summary { no_open } => {
            if no_open {
                config.open_report = false;
            }
            let runner = DeviceRunner::new(config, reporter);
            match runner.summarize_stored() {
                Ok(Some(_)) => {}
                Ok(None) => process::exit(1),
                Err(e) => {
                    error!("Failed to build summary: {:#}", anyhow::Error::from(e));
                    process::exit(2);
                }
            }
        }

        Commands::Run { script, devices, run_all, timeout, no_open } => {
            if let Some(timeout) = timeout {
                config.task_timeout = Some(
                    FleetConfig::parse_timeout(&timeout).map_err(anyhow::Error::msg)?,
                );
            }
            if no_open {
                config.open_report = false;
            }

            let devices = if devices.is_empty() {
                adb::discover_devices(&config.adb_program)
                    .context("No devices given and adb discovery failed")?
            } else {
                devices
            };

            if devices.is_empty() {
                error!("No devices to run on. Connect a device or pass serials explicitly.");
                process::exit(1);
            }

            let runner = DeviceRunner::new(config, reporter);
            runner.setup_interrupt_handler()?;


            match runner.run(&devices, &script, run_all) {
                Ok(summary) => {
                    if summary.success < summary.count {
                        process::exit(1);
                    }
                }
                Err(e) => {
                    error!("Device run failed: {:#}", anyhow::Error::from(e));
                    process::exit(2);
                }
            }
        }
    }

    Ok(())
}


fn list_devices(config: &FleetConfig) -> Result<()> {
    let devices = adb::discover_devices(&config.adb_program)
        .context("Failed to list devices")?;

    if devices.is_empty() {
        println!("No devices attached");
        return Ok(());
    }

    println!("Attached devices:");
    for device in devices {
        println!("  {}", device);
    }

    Ok(())
}
