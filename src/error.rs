use thiserror::Error;

use crate::validation::ValidationError;

/// Failures on the ingestion write path.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A reading references a device id with no asset row.
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Device already exists: {0}")]
    DuplicateDevice(String),

    #[error("Invalid asset: {0}")]
    InvalidAsset(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type IngestResult<T> = Result<T, IngestError>;
