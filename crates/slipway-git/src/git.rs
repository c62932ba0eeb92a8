//! Typed git operations driven through the process engine
//!
//! Every operation shells out to the external `git` binary via
//! [`CliCommand`]; the converter attached to each command decides what a
//! non-zero exit means for that operation (merge conflicts are a normal
//! `false`, a rejected push is an error).

use std::path::{Path, PathBuf};
use std::time::Duration;

use slipway_process::{exit_code_is_zero, strings_if, CliCommand, ResultConverter};
use tracing::debug;

use crate::error::{GitError, Result};
use crate::types::Branch;

/// Release-automation git operations rooted at one working tree
#[derive(Debug)]
pub struct GitCommand {
    repo_root: PathBuf,
    timeout: Option<Duration>,
}

impl GitCommand {
    /// Bind to a working tree without checking it; use
    /// [`GitCommand::open`] to verify the directory first
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            timeout: None,
        }
    }

    /// Bind to a working tree, verifying it actually is one
    pub async fn open(repo_root: impl Into<PathBuf>) -> Result<Self> {
        let git = Self::new(repo_root);
        let inside = git
            .git(exit_code_is_zero())
            .args(["rev-parse", "--git-dir"])
            .run()
            .await?;
        if !inside {
            return Err(GitError::NotARepository {
                path: git.repo_root.display().to_string(),
            });
        }
        Ok(git)
    }

    /// Initialize a fresh repository at `path` and bind to it
    pub async fn init(path: impl Into<PathBuf>) -> Result<Self> {
        let git = Self::new(path);
        git.git(strings_if(|code| code == 0))
            .args(["init"])
            .run()
            .await?;
        Ok(git)
    }

    /// Locate the git executable on PATH
    pub fn ensure_installed() -> Result<PathBuf> {
        which::which("git").map_err(|_| GitError::GitNotFound)
    }

    /// Force-kill any git invocation that outlives `timeout`
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Working tree this command set is bound to
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    fn git<T>(&self, converter: impl ResultConverter<T> + 'static) -> CliCommand<T> {
        let mut command = CliCommand::new("git", converter)
            .current_dir(&self.repo_root)
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(timeout) = self.timeout {
            command = command.kill_after(timeout);
        }
        command
    }

    fn checked(&self) -> CliCommand<String> {
        self.git(strings_if(|code| code == 0))
    }

    /// Name of the currently checked-out branch
    pub async fn current_branch(&self) -> Result<Branch> {
        let name = self
            .checked()
            .args(["rev-parse", "--abbrev-ref", "HEAD"])
            .run()
            .await?;
        Ok(Branch::new(name.trim()).current())
    }

    /// Abbreviated commit hash of HEAD
    pub async fn short_sha(&self) -> Result<String> {
        let sha = self
            .checked()
            .args(["rev-parse", "--short", "HEAD"])
            .run()
            .await?;
        Ok(sha.trim().to_string())
    }

    /// Whether the working tree has no uncommitted or untracked changes
    ///
    /// A `git status` that fails outright (e.g. not a repository) is an
    /// error, never a claim of cleanliness.
    pub async fn is_clean(&self) -> Result<bool> {
        let clean = self
            .git(strings_if(|code| code == 0).map(|out: String| out.trim().is_empty()))
            .args(["status", "--porcelain"])
            .run()
            .await?;
        Ok(clean)
    }

    /// Check out an existing branch
    pub async fn checkout(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out");
        self.checked()
            .args(["checkout"])
            .run_with(|args| args.push(branch.to_string()))
            .await?;
        Ok(())
    }

    /// Create and check out a new branch
    pub async fn create_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "creating branch");
        self.checked()
            .args(["checkout", "-b"])
            .run_with(|args| args.push(branch.to_string()))
            .await?;
        Ok(())
    }

    /// Delete a local branch
    pub async fn delete_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "deleting branch");
        self.checked()
            .args(["branch", "-D"])
            .run_with(|args| args.push(branch.to_string()))
            .await?;
        Ok(())
    }

    /// Merge `branch` into the current branch
    ///
    /// Returns false when the merge stops on conflicts; the working tree
    /// is left mid-merge for the caller to resolve or abort.
    pub async fn merge(&self, branch: &str) -> Result<bool> {
        debug!(branch, "merging");
        let merged = self
            .git(exit_code_is_zero())
            .args(["merge", "--no-edit"])
            .run_with(|args| args.push(branch.to_string()))
            .await?;
        Ok(merged)
    }

    /// Abort a conflicted merge
    pub async fn abort_merge(&self) -> Result<()> {
        self.checked().args(["merge", "--abort"]).run().await?;
        Ok(())
    }

    /// Stage all changes
    pub async fn add_all(&self) -> Result<()> {
        self.checked().args(["add", "-A"]).run().await?;
        Ok(())
    }

    /// Commit staged changes
    pub async fn commit(&self, message: &str) -> Result<()> {
        debug!(message, "committing");
        self.checked()
            .args(["commit", "-m"])
            .run_with(|args| args.push(message.to_string()))
            .await?;
        Ok(())
    }

    /// Create a lightweight tag
    pub async fn tag(&self, name: &str) -> Result<()> {
        debug!(name, "tagging");
        self.checked()
            .args(["tag"])
            .run_with(|args| args.push(name.to_string()))
            .await?;
        Ok(())
    }

    /// Fetch from a remote
    pub async fn fetch(&self, remote: &str) -> Result<()> {
        debug!(remote, "fetching");
        self.checked()
            .args(["fetch"])
            .run_with(|args| args.push(remote.to_string()))
            .await?;
        Ok(())
    }

    /// Push a refspec to a remote; a rejected push is an error carrying
    /// git's stderr
    pub async fn push(&self, remote: &str, refspec: &str) -> Result<()> {
        debug!(remote, refspec, "pushing");
        self.checked()
            .args(["push"])
            .run_with(|args| {
                args.push(remote.to_string());
                args.push(refspec.to_string());
            })
            .await?;
        Ok(())
    }

    /// Run an arbitrary git subcommand, returning raw stdout
    pub async fn raw<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let out = self
            .checked()
            .args(args.into_iter().map(Into::into).collect::<Vec<_>>())
            .run()
            .await?;
        Ok(out)
    }
}
