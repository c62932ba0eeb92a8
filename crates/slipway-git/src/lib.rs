//! # slipway-git
//!
//! **Purpose**: Typed git operations for Slipway release automation
//!
//! Composes the `slipway-process` engine into reusable git commands:
//! branch inspection, clean-tree checks, checkout/branch/merge/tag/push,
//! each with a result converter that decides what the exit code means for
//! that operation.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use slipway_git::GitCommand;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let git = GitCommand::open(".").await?;
//! if git.is_clean().await? {
//!     let branch = git.current_branch().await?;
//!     println!("releasing from {}", branch.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod git;
pub mod types;

pub use error::{GitError, Result};
pub use git::GitCommand;
pub use types::Branch;
