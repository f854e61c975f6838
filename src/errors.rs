use crate::types::JobState;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Client input errors, reported synchronously at submission time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidateError {
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid port specification: {0}")]
    InvalidPorts(String),
}

/// Errors from driving one external scan process. Recorded on the job,
/// never surfaced to the submitter directly.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("failed to start scan process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("scan process exited with status {code}: {stderr}")]
    ScanFailed { code: i32, stderr: String },

    #[error("scan output could not be parsed: {0}")]
    UnparseableOutput(String),

    #[error("scan exceeded its {}s deadline", .0.as_secs())]
    TimedOut(Duration),

    #[error("scan cancelled")]
    Cancelled,
}

/// Job registry faults. Illegal transitions indicate a race or programming
/// defect; they are logged and the operation is rejected, never applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown job {0}")]
    UnknownJob(Uuid),

    #[error("illegal job state transition {from} -> {to}")]
    IllegalTransition { from: JobState, to: JobState },
}
