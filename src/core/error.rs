use thiserror::Error;
use std::io;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Ledger error: {0}")]
    LedgerError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to launch task on device {device}: {source}")]
    SpawnError {
        device: String,
        #[source]
        source: io::Error,
    },

    #[error("Log directory {dir} for device {device} is already used by device {owner}")]
    LogDirConflict {
        device: String,
        dir: String,
        owner: String,
    },

    #[error("Report generation failed: {0}")]
    ReportError(String),

    #[error("Template error: {0}")]
    TemplateError(#[from] askama::Error),

    #[error("Device discovery failed: {0}")]
    DiscoveryError(String),

    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

pub type Result<T> = std::result::Result<T, FleetError>;
