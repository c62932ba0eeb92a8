//! Bridge between native process lifecycle events and awaitable results
//!
//! A [`ProcessCallback`] is created per launch and shared between the
//! spawning task, the output pump tasks, any number of application tasks
//! calling `wait`/`listen`/`kill`, and the kill-queue worker thread. The
//! terminal exit code lives in a single compare-and-set cell, so exactly
//! one of {natural exit, forced kill} wins and notifies listeners.

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::error::{ProcessError, Result};
use crate::state::{Phase, ProcessState, KILL_EXIT_CODE};

/// Sentinel for "no exit code recorded yet"; outside the i32 range so it
/// can never collide with a real code
const UNSET: i64 = i64::MIN;

/// Terminal snapshot of a completed process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// Exit code, or [`KILL_EXIT_CODE`] when the engine killed the process
    pub exit_code: i32,
    /// Accumulated stdout text
    pub stdout: String,
    /// Accumulated stderr text
    pub stderr: String,
    /// Whether the engine force-killed the process
    pub was_killed: bool,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Notified exactly once when a process terminates
///
/// Closures `FnOnce(&ProcessResult)` implement this via the blanket impl.
pub trait ProcessListener: Send {
    fn process_terminated(self: Box<Self>, result: &ProcessResult);
}

impl<F> ProcessListener for F
where
    F: FnOnce(&ProcessResult) + Send,
{
    fn process_terminated(self: Box<Self>, result: &ProcessResult) {
        self(result)
    }
}

/// Supplies input when a process declares it is ready to accept it
///
/// `provide` fills `buf` with the next chunk of input and returns whether
/// more input may follow; returning false closes the process's stdin.
pub trait StdinHandler: Send {
    fn provide(&mut self, process: &ProcessCallback, buf: &mut String) -> bool;
}

impl<F> StdinHandler for F
where
    F: FnMut(&ProcessCallback, &mut String) -> bool + Send,
{
    fn provide(&mut self, process: &ProcessCallback, buf: &mut String) -> bool {
        self(process, buf)
    }
}

/// Listener slot: registration and the completion transition share one
/// lock, so a listener registered concurrently with completion is never
/// missed and late joiners observe the final result immediately
enum ListenerSlot {
    Waiting(Vec<Box<dyn ProcessListener>>),
    Done(ProcessResult),
}

/// Shared mutable heart of a supervised process
pub struct ProcessCallback {
    phase: AtomicU8,
    exit_code: AtomicI64,
    was_killed: AtomicBool,
    wants_input: AtomicBool,
    stdin_wants_write: AtomicBool,
    pid: AtomicU32,
    stdout: Mutex<String>,
    stderr: Mutex<String>,
    listeners: Mutex<ListenerSlot>,
    done: Notify,
    stdin: Mutex<Option<Box<dyn StdinHandler>>>,
}

impl ProcessCallback {
    pub(crate) fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Uninitialized as u8),
            exit_code: AtomicI64::new(UNSET),
            was_killed: AtomicBool::new(false),
            wants_input: AtomicBool::new(false),
            stdin_wants_write: AtomicBool::new(false),
            pid: AtomicU32::new(0),
            stdout: Mutex::new(String::new()),
            stderr: Mutex::new(String::new()),
            listeners: Mutex::new(ListenerSlot::Waiting(Vec::new())),
            done: Notify::new(),
            stdin: Mutex::new(None),
        }
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Process ID, if the process has started
    pub fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::Acquire) {
            0 => None,
            pid => Some(pid),
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running && !self.is_exited()
    }

    pub fn is_exited(&self) -> bool {
        self.exit_code.load(Ordering::Acquire) != UNSET
    }

    /// Immutable snapshot of the current lifecycle state
    pub fn state(&self) -> ProcessState {
        let mut state = ProcessState::new().to_phase(self.phase());
        if self.wants_input.load(Ordering::Acquire) {
            state = state.wanting_input();
        }
        if self.was_killed.load(Ordering::Acquire) {
            state = state.killed();
        }
        let code = self.exit_code.load(Ordering::Acquire);
        if code != UNSET {
            state = state.with_exit_code(code as i32);
        }
        state
    }

    /// Register a stdin handler; `wants_write` arms write-readiness once
    /// the process starts
    ///
    /// Fails fast when the process is already running: input arming is a
    /// pre-start decision.
    pub fn set_stdin_handler(
        &self,
        handler: Box<dyn StdinHandler>,
        wants_write: bool,
    ) -> Result<()> {
        if self.phase() >= Phase::Running {
            return Err(ProcessError::InvalidState(
                "stdin handler must be registered before the process starts".into(),
            ));
        }
        *self.stdin.lock() = Some(handler);
        self.stdin_wants_write.store(wants_write, Ordering::Release);
        Ok(())
    }

    /// Register a listener; if the process already terminated it is
    /// notified immediately with the recorded result
    pub fn listen<L>(&self, listener: L)
    where
        L: ProcessListener + 'static,
    {
        // Registration shares a lock with the completion transition, so a
        // listener registered concurrently with completion is never missed.
        let result = {
            let mut slot = self.listeners.lock();
            match &mut *slot {
                ListenerSlot::Waiting(waiting) => {
                    waiting.push(Box::new(listener));
                    return;
                }
                ListenerSlot::Done(result) => result.clone(),
            }
        };
        Box::new(listener).process_terminated(&result);
    }

    /// Forcibly terminate the process
    ///
    /// Idempotent and callable from any thread, including the kill-queue
    /// worker. Returns true when this call recorded the terminal state;
    /// false when the process already exited, already lost the race to a
    /// natural exit, or has not started yet.
    pub fn kill(&self) -> bool {
        if self.is_exited() {
            return false;
        }
        let pid = self.pid.load(Ordering::Acquire);
        if pid == 0 {
            debug!("kill requested before process started; nothing to do");
            return false;
        }
        terminate(pid);
        self.record_exit(KILL_EXIT_CODE, true)
    }

    /// Suspend until the terminal result is recorded; never polls
    pub async fn wait(&self) -> ProcessResult {
        loop {
            let notified = self.done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(result) = self.finished() {
                return result;
            }
            notified.await;
        }
    }

    /// Bounded wait; `None` means the process is still running, which is a
    /// normal outcome, not an error, and does not kill the process
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<ProcessResult> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }

    fn finished(&self) -> Option<ProcessResult> {
        match &*self.listeners.lock() {
            ListenerSlot::Done(result) => Some(result.clone()),
            ListenerSlot::Waiting(_) => None,
        }
    }

    pub(crate) fn on_pre_start(&self) {
        self.phase
            .fetch_max(Phase::Starting as u8, Ordering::AcqRel);
    }

    pub(crate) fn on_start(&self, pid: u32) {
        self.pid.store(pid, Ordering::Release);
        self.phase.fetch_max(Phase::Running as u8, Ordering::AcqRel);
        if self.stdin_wants_write.load(Ordering::Acquire) && self.stdin.lock().is_some() {
            self.wants_input.store(true, Ordering::Release);
        }
        trace!(pid, "process running");
    }

    pub(crate) fn on_stdout(&self, chunk: &[u8], last: bool) {
        if !chunk.is_empty() {
            self.stdout.lock().push_str(&String::from_utf8_lossy(chunk));
        }
        if last {
            trace!("stdout stream closed");
        }
    }

    pub(crate) fn on_stderr(&self, chunk: &[u8], last: bool) {
        if !chunk.is_empty() {
            self.stderr.lock().push_str(&String::from_utf8_lossy(chunk));
        }
        if last {
            trace!("stderr stream closed");
        }
    }

    /// Drive the registered stdin handler once; returns whether more input
    /// may follow. The handler is dropped as soon as it declares it is done.
    pub(crate) fn on_stdin_ready(&self, buf: &mut String) -> bool {
        let mut slot = self.stdin.lock();
        let more = match slot.as_mut() {
            Some(handler) => handler.provide(self, buf),
            None => false,
        };
        if !more {
            *slot = None;
            self.wants_input.store(false, Ordering::Release);
        }
        more
    }

    pub(crate) fn on_exit(&self, code: i32) {
        self.record_exit(code, false);
    }

    /// Record the terminal exit code; first writer wins
    ///
    /// The winner moves the phase to Exited, snapshots both output
    /// buffers, flips the listener slot to Done under its lock, notifies
    /// drained listeners, and releases the completion gate.
    fn record_exit(&self, code: i32, killed: bool) -> bool {
        if self
            .exit_code
            .compare_exchange(UNSET, code as i64, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if killed {
            self.was_killed.store(true, Ordering::Release);
        }
        self.wants_input.store(false, Ordering::Release);
        self.phase.fetch_max(Phase::Exited as u8, Ordering::AcqRel);

        let result = ProcessResult {
            exit_code: code,
            stdout: self.stdout.lock().clone(),
            stderr: self.stderr.lock().clone(),
            was_killed: killed,
        };
        let drained = {
            let mut slot = self.listeners.lock();
            match mem::replace(&mut *slot, ListenerSlot::Done(result.clone())) {
                ListenerSlot::Waiting(waiting) => waiting,
                ListenerSlot::Done(_) => Vec::new(),
            }
        };
        for listener in drained {
            listener.process_terminated(&result);
        }
        self.done.notify_waiters();
        debug!(exit_code = code, killed, "process terminated");
        true
    }
}

#[cfg(unix)]
fn terminate(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => debug!(pid, "sent SIGKILL"),
        // ESRCH: process already gone; the exit path will win the CAS
        Err(e) => debug!(pid, error = %e, "SIGKILL not delivered"),
    }
}

#[cfg(windows)]
fn terminate(pid: u32) {
    use std::process::{Command, Stdio};

    let status = Command::new("taskkill")
        .args(["/pid", &pid.to_string(), "/f", "/t"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(_) => debug!(pid, "taskkill issued"),
        Err(e) => debug!(pid, error = %e, "taskkill failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn exit_code_first_writer_wins() {
        let cb = ProcessCallback::new();
        cb.on_pre_start();
        cb.on_start(1);
        assert!(cb.record_exit(3, false));
        assert!(!cb.record_exit(9, false));
        assert!(!cb.record_exit(KILL_EXIT_CODE, true));

        let state = cb.state();
        assert_eq!(state.exit_code(), 3);
        assert!(!state.was_killed());
        assert!(state.is_exited());
    }

    #[test]
    fn listener_before_completion_notified_once() {
        let cb = ProcessCallback::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        cb.listen(move |result: &ProcessResult| {
            assert_eq!(result.exit_code, 0);
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 0);

        cb.on_stdout(b"out", false);
        cb.on_exit(0);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // losing writers never re-notify
        cb.on_exit(0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_join_notified_immediately() {
        let cb = ProcessCallback::new();
        cb.on_stdout(b"hello\n", false);
        cb.on_stderr(b"bye\n", true);
        cb.on_exit(4);

        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        cb.listen(move |result: &ProcessResult| {
            assert_eq!(result.exit_code, 4);
            assert_eq!(result.stdout, "hello\n");
            assert_eq!(result.stderr, "bye\n");
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stdin_handler_rejected_after_start() {
        let cb = ProcessCallback::new();
        cb.on_pre_start();
        assert!(cb
            .set_stdin_handler(Box::new(|_: &ProcessCallback, _: &mut String| false), true)
            .is_ok());

        cb.on_start(1);
        let err = cb
            .set_stdin_handler(Box::new(|_: &ProcessCallback, _: &mut String| false), true)
            .unwrap_err();
        assert!(matches!(err, ProcessError::InvalidState(_)));
    }

    #[test]
    fn stdin_handler_dropped_when_done() {
        let cb = ProcessCallback::new();
        cb.set_stdin_handler(
            Box::new(|_: &ProcessCallback, buf: &mut String| {
                buf.push_str("line\n");
                false
            }),
            true,
        )
        .unwrap();
        cb.on_pre_start();
        cb.on_start(1);
        assert!(cb.state().wants_input());

        let mut buf = String::new();
        assert!(!cb.on_stdin_ready(&mut buf));
        assert_eq!(buf, "line\n");
        assert!(!cb.state().wants_input());

        // handler is gone; further readiness is a no-op
        buf.clear();
        assert!(!cb.on_stdin_ready(&mut buf));
        assert!(buf.is_empty());
    }

    #[test]
    fn output_appended_in_order() {
        let cb = ProcessCallback::new();
        cb.on_stdout(b"a", false);
        cb.on_stdout(b"b", false);
        cb.on_stdout(&[], true);
        cb.on_stderr(b"x", true);
        cb.on_exit(0);

        let result = cb.finished().unwrap();
        assert_eq!(result.stdout, "ab");
        assert_eq!(result.stderr, "x");
    }

    #[test]
    fn invalid_utf8_replaced_not_rejected() {
        let cb = ProcessCallback::new();
        cb.on_stdout(&[0x66, 0xff, 0x6f], true);
        cb.on_exit(0);
        assert_eq!(cb.finished().unwrap().stdout, "f\u{fffd}o");
    }

    #[tokio::test]
    async fn wait_returns_recorded_result() {
        let cb = Arc::new(ProcessCallback::new());
        let waiter = Arc::clone(&cb);
        let handle = tokio::spawn(async move { waiter.wait().await });

        tokio::task::yield_now().await;
        cb.on_stdout(b"done", true);
        cb.on_exit(0);

        let result = handle.await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "done");
    }

    #[tokio::test]
    async fn wait_after_completion_returns_immediately() {
        let cb = ProcessCallback::new();
        cb.on_exit(5);
        let result = cb.wait().await;
        assert_eq!(result.exit_code, 5);
    }

    #[tokio::test]
    async fn wait_timeout_expires_without_killing() {
        let cb = ProcessCallback::new();
        cb.on_pre_start();
        cb.on_start(1);
        assert!(cb
            .wait_timeout(Duration::from_millis(20))
            .await
            .is_none());
        assert!(cb.is_running());
    }
}
