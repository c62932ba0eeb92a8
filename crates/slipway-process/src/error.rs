//! Error types for process execution

use std::io;
use thiserror::Error;

/// Process execution errors
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The OS could not create the process (missing executable,
    /// permission denied, resource exhaustion)
    #[error("failed to spawn process: {0}")]
    SpawnFailed(#[from] io::Error),

    /// A converter treated a completed process as a failure; carries the
    /// rendered command line and both captured streams so error messages
    /// need no further context lookup
    #[error("command `{command}` failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// Sequencing violation, e.g. registering a stdin handler after the
    /// process has started
    #[error("invalid process state: {0}")]
    InvalidState(String),
}

/// Result type for process operations
pub type Result<T> = std::result::Result<T, ProcessError>;
