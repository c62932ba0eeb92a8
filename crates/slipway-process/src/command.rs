//! Reusable command composition over the process engine

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::config::CommandSpec;
use crate::control::ProcessControl;
use crate::convert::ResultConverter;
use crate::error::Result;

/// An executable, its fixed arguments, and a converter for its output
///
/// The command object is reusable: every `run` assembles a fresh argument
/// list, so per-invocation arguments (a branch name, a tag) come in
/// through [`CliCommand::run_with`] without mutating the command itself.
pub struct CliCommand<T> {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: HashMap<String, String>,
    kill_after: Option<Duration>,
    converter: Box<dyn ResultConverter<T>>,
}

impl<T> CliCommand<T> {
    pub fn new(program: impl Into<String>, converter: impl ResultConverter<T> + 'static) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            working_dir: None,
            env: HashMap::new(),
            kill_after: None,
            converter: Box::new(converter),
        }
    }

    /// Set the fixed arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Append a fixed argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the working directory
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Force-kill the process if a run outlives `timeout`
    pub fn kill_after(mut self, timeout: Duration) -> Self {
        self.kill_after = Some(timeout);
        self
    }

    /// Run with the fixed arguments only
    pub async fn run(&self) -> Result<T> {
        self.run_with(|_| {}).await
    }

    /// Run with per-invocation arguments appended by `configure`
    ///
    /// Launch failure is reported here, synchronously; it never degrades
    /// into an empty result.
    pub async fn run_with(&self, configure: impl FnOnce(&mut Vec<String>)) -> Result<T> {
        let mut args = self.args.clone();
        configure(&mut args);

        let mut spec = CommandSpec::new(&self.program).args(args);
        if let Some(ref dir) = self.working_dir {
            spec = spec.working_dir(dir);
        }
        for (key, value) in &self.env {
            spec = spec.env(key, value);
        }

        let rendered = spec.render();
        debug!(command = %rendered, "running command");

        let control = ProcessControl::spawn(spec).await?;
        if let Some(timeout) = self.kill_after {
            control.kill_after(timeout);
        }
        let result = control.wait().await;
        self.converter.convert(&rendered, result)
    }
}
