//! Strategies mapping a completed process to a typed result
//!
//! Converters decouple "how the process ran" from "what the caller wants
//! back". They run in the caller's continuation after `wait()`, never on
//! the event-dispatch path, so a slow conversion cannot stall other
//! processes' events.

use std::marker::PhantomData;

use crate::callback::ProcessResult;
use crate::error::{ProcessError, Result};

/// Maps a terminal [`ProcessResult`] to a typed value
///
/// `command` is the rendered command line, carried so failure values can
/// name what actually ran. Implementations decide for themselves whether
/// a non-zero exit is an error; [`strings`] passes output through
/// regardless, [`strings_if`] fails with [`ProcessError::CommandFailed`].
pub trait ResultConverter<T>: Send + Sync {
    fn convert(&self, command: &str, result: ProcessResult) -> Result<T>;

    /// Compose this converter with a pure transformation; failures
    /// propagate unchanged
    fn map<U, F>(self, f: F) -> Map<Self, F, T>
    where
        Self: Sized,
        F: Fn(T) -> U + Send + Sync,
    {
        Map {
            inner: self,
            f,
            _input: PhantomData,
        }
    }
}

/// See [`ResultConverter::map`]
///
/// Carries the inner converter's output type so the impl below stays
/// coherent; the marker is `fn() -> T` so `Map` is `Send + Sync`
/// independent of `T`.
pub struct Map<C, F, T> {
    inner: C,
    f: F,
    _input: PhantomData<fn() -> T>,
}

impl<T, U, C, F> ResultConverter<U> for Map<C, F, T>
where
    C: ResultConverter<T>,
    F: Fn(T) -> U + Send + Sync,
{
    fn convert(&self, command: &str, result: ProcessResult) -> Result<U> {
        self.inner.convert(command, result).map(&self.f)
    }
}

/// Raw captured stdout, regardless of exit code
pub struct Strings;

/// Captured stdout when `exit_ok` accepts the exit code, otherwise a
/// [`ProcessError::CommandFailed`] carrying both streams
pub struct StringsIf<F> {
    exit_ok: F,
}

/// Boolean exit-code predicate
pub struct ExitCode<F> {
    predicate: F,
}

/// True when trimmed stdout is non-empty; the "did anything change" shape
/// of check
pub struct HasOutput;

/// Converter yielding raw captured stdout
pub fn strings() -> Strings {
    Strings
}

/// Converter yielding stdout, failing when `exit_ok` rejects the exit code
pub fn strings_if<F>(exit_ok: F) -> StringsIf<F>
where
    F: Fn(i32) -> bool + Send + Sync,
{
    StringsIf { exit_ok }
}

/// Converter yielding `true` when the exit code is zero
pub fn exit_code_is_zero() -> ExitCode<fn(i32) -> bool> {
    ExitCode {
        predicate: |code| code == 0,
    }
}

/// Converter yielding the predicate's verdict on the exit code
pub fn exit_code<F>(predicate: F) -> ExitCode<F>
where
    F: Fn(i32) -> bool + Send + Sync,
{
    ExitCode { predicate }
}

/// Converter yielding whether the process printed anything to stdout
pub fn has_output() -> HasOutput {
    HasOutput
}

impl ResultConverter<String> for Strings {
    fn convert(&self, _command: &str, result: ProcessResult) -> Result<String> {
        Ok(result.stdout)
    }
}

impl<F> ResultConverter<String> for StringsIf<F>
where
    F: Fn(i32) -> bool + Send + Sync,
{
    fn convert(&self, command: &str, result: ProcessResult) -> Result<String> {
        if (self.exit_ok)(result.exit_code) {
            Ok(result.stdout)
        } else {
            Err(ProcessError::CommandFailed {
                command: command.to_string(),
                exit_code: result.exit_code,
                stdout: result.stdout,
                stderr: result.stderr,
            })
        }
    }
}

impl<F> ResultConverter<bool> for ExitCode<F>
where
    F: Fn(i32) -> bool + Send + Sync,
{
    fn convert(&self, _command: &str, result: ProcessResult) -> Result<bool> {
        Ok((self.predicate)(result.exit_code))
    }
}

impl ResultConverter<bool> for HasOutput {
    fn convert(&self, _command: &str, result: ProcessResult) -> Result<bool> {
        Ok(!result.stdout.trim().is_empty())
    }
}
