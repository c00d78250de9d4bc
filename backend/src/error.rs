//! Error types for the progress trackers

use thiserror::Error;

/// An inbound value that could not be interpreted
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("unknown download status: {0}")]
    UnknownStatus(String),

    #[error("unknown sync stage: {0}")]
    UnknownStage(String),
}

/// A registry operation that referenced a download it does not hold
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("download {0} not found")]
    NotFound(u64),
}
