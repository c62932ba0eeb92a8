//! # slipway-process
//!
//! **Purpose**: Asynchronous process execution and supervision for Slipway
//!
//! Launches external processes, captures their output, enforces kill
//! deadlines, and converts exit code + captured streams into typed
//! results for the release-automation layers above.
//!
//! ## Features
//!
//! - **Process Spawning**: Async process creation with piped stdio
//! - **Lifecycle State**: Immutable, forward-only state snapshots
//! - **Listeners**: Exactly-once termination notification, late joiners
//!   notified immediately
//! - **Kill Deadlines**: A process-wide queue force-kills processes that
//!   outlive their deadline
//! - **Typed Results**: Pluggable converters from raw output to typed
//!   values
//! - **Stdin Handlers**: Caller-supplied input driven on write-readiness
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use slipway_process::{strings, CliCommand};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let status = CliCommand::new("git", strings())
//!     .args(["status", "--porcelain"])
//!     .kill_after(Duration::from_secs(30));
//!
//! let output = status.run().await?;
//! println!("{output}");
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod command;
pub mod config;
pub mod control;
pub mod convert;
pub mod error;
pub mod kill_queue;
pub mod state;

pub use callback::{ProcessCallback, ProcessListener, ProcessResult, StdinHandler};
pub use command::CliCommand;
pub use config::CommandSpec;
pub use control::ProcessControl;
pub use convert::{
    exit_code, exit_code_is_zero, has_output, strings, strings_if, ResultConverter,
};
pub use error::{ProcessError, Result};
pub use kill_queue::KillQueue;
pub use state::{Phase, ProcessState, KILL_EXIT_CODE};
