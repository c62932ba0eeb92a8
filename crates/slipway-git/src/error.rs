//! Error types for git command composition

use slipway_process::ProcessError;
use thiserror::Error;

/// Git operation errors
#[derive(Debug, Error)]
pub enum GitError {
    /// The underlying process failed to launch, was killed, or a
    /// converter rejected its exit
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// No `git` executable on PATH
    #[error("git executable not found on PATH")]
    GitNotFound,

    /// The directory is not inside a git working tree
    #[error("not a git repository: {path}")]
    NotARepository { path: String },
}

/// Result type for git operations
pub type Result<T> = std::result::Result<T, GitError>;
