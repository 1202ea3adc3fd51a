use thiserror::Error;

use crate::slots::{Slot, SlotKind};

#[derive(Error, Debug)]
pub enum RipitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid {kind} slot number: {slot}")]
    InvalidSlot { slot: i64, kind: SlotKind },

    #[error("Invalid drive number: {0}")]
    InvalidDrive(i64),

    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Device failure: {0}")]
    DeviceFailure(String),

    #[error("Extraction failure: {0}")]
    ExtractionFailure(String),

    #[error("No slot can accept the disc in drive {drive} (last tried slot {slot}); error bank exhausted")]
    ResourceExhausted { drive: usize, slot: Slot },

    #[error("Worker error: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, RipitError>;
