// src/errors.rs

//! Crate-wide error enum and result alias.

use thiserror::Error;

use crate::types::WorkflowStatus;

#[derive(Error, Debug)]
pub enum JobGraphError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Expert config already registered: {0}")]
    DuplicateConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Decomposition failed. `raw` is the planner output exactly as received.
    #[error("Planning error: {message}\nRaw planner output:\n{raw}")]
    Planning { message: String, raw: String },

    #[error("Graph is not a DAG: {0}")]
    NotADag(String),

    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Protocol violation: job {job_id} returned unsupported status {status}")]
    ProtocolViolation {
        job_id: String,
        status: WorkflowStatus,
    },

    #[error("Job {0} is too complicated and further decomposition is not supported")]
    JobTooComplicated(String),

    #[error("Deadlock detected: {0}")]
    Deadlock(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, JobGraphError>;
