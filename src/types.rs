// src/types.rs

//! Small shared enums: workflow status, query status, log level.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Outcome tag an expert attaches to every result it returns.
///
/// - `Success`: the scratchpad holds the deliverable.
/// - `InputDataError`: the expert judged its *inputs* defective; the
///   scheduler re-runs the direct predecessors with the attached lesson.
/// - `ExecutionError`: synthesized by the engine when an expert call raised.
/// - `JobTooComplicatedError`: the expert asks for further decomposition,
///   which this engine does not perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Success,
    InputDataError,
    ExecutionError,
    JobTooComplicatedError,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Success => "SUCCESS",
            WorkflowStatus::InputDataError => "INPUT_DATA_ERROR",
            WorkflowStatus::ExecutionError => "EXECUTION_ERROR",
            WorkflowStatus::JobTooComplicatedError => "JOB_TOO_COMPLICATED_ERROR",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SUCCESS" => Ok(WorkflowStatus::Success),
            "INPUT_DATA_ERROR" => Ok(WorkflowStatus::InputDataError),
            "EXECUTION_ERROR" => Ok(WorkflowStatus::ExecutionError),
            "JOB_TOO_COMPLICATED_ERROR" => Ok(WorkflowStatus::JobTooComplicatedError),
            other => Err(format!("invalid workflow status: {other}")),
        }
    }
}

/// Aggregate status reported by the query façade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryStatus {
    Running,
    Finished,
    /// The last run stopped on a fatal error.
    Failed,
    /// The last run was cancelled.
    Stopped,
}

/// Log level accepted in `[logging]` and by [`crate::logging::init_logging`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!(
                "invalid log level: {other} (expected error, warn, info, debug or trace)"
            )),
        }
    }
}
