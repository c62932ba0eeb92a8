//! Command descriptor for launching a supervised process

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::callback::StdinHandler;

/// Describes a process to launch: executable, arguments, working
/// directory, environment, and an optional stdin handler
///
/// Built once per launch; the stdin handler, if any, is consumed by the
/// spawn so it can only ever be registered before the process starts.
pub struct CommandSpec {
    /// Executable command
    pub command: String,
    /// Command arguments
    pub args: Vec<String>,
    /// Working directory (None = current dir)
    pub working_dir: Option<PathBuf>,
    /// Environment variables (added to parent env)
    pub env: HashMap<String, String>,
    /// Stdin handler and whether write-readiness should be armed on start
    stdin: Option<(Box<dyn StdinHandler>, bool)>,
}

impl CommandSpec {
    /// Create a new command descriptor
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: vec![],
            working_dir: None,
            env: HashMap::new(),
            stdin: None,
        }
    }

    /// Set command arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Append a single argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set working directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Register a stdin handler, invoked once the process signals it is
    /// ready for input
    ///
    /// `wants_write` arms write-readiness as soon as the process starts;
    /// when false the handler is held but never driven.
    pub fn stdin_handler(
        mut self,
        handler: impl StdinHandler + 'static,
        wants_write: bool,
    ) -> Self {
        self.stdin = Some((Box::new(handler), wants_write));
        self
    }

    pub(crate) fn take_stdin(&mut self) -> Option<(Box<dyn StdinHandler>, bool)> {
        self.stdin.take()
    }

    /// Human-readable command line, for log and error messages
    pub fn render(&self) -> String {
        let mut line = self.command.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("working_dir", &self.working_dir)
            .field("env", &self.env)
            .field("stdin", &self.stdin.as_ref().map(|(_, wants)| wants))
            .finish()
    }
}
