//! Facade over a launched process and its callback
//!
//! [`ProcessControl::spawn`] is the engine's boundary with the OS: it
//! builds the `tokio::process::Command`, surfaces launch failures
//! synchronously, and wires the pump tasks that translate raw stream and
//! exit events into [`ProcessCallback`] state.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::callback::{ProcessCallback, ProcessListener, ProcessResult};
use crate::config::CommandSpec;
use crate::error::Result;
use crate::kill_queue::KillQueue;
use crate::state::ProcessState;

/// The single object an application holds for a launched process
pub struct ProcessControl {
    callback: Arc<ProcessCallback>,
    rendered: String,
}

impl ProcessControl {
    /// Launch the described process bound to a fresh callback
    ///
    /// Launch failure (missing executable, permission denied) is reported
    /// here, synchronously; the process never reaches the running phase.
    pub async fn spawn(mut spec: CommandSpec) -> Result<ProcessControl> {
        let callback = Arc::new(ProcessCallback::new());
        let mut stdin_armed = false;
        if let Some((handler, wants_write)) = spec.take_stdin() {
            // callback is pre-start by construction, this cannot fail
            callback.set_stdin_handler(handler, wants_write)?;
            stdin_armed = wants_write;
        }

        callback.on_pre_start();
        debug!(command = %spec.command, args = ?spec.args, "spawning process");

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        if let Some(ref dir) = spec.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn()?;
        let pid = child.id().unwrap_or(0);
        callback.on_start(pid);
        info!(pid, command = %spec.command, "process spawned");

        let stdin = child.stdin.take();
        if stdin_armed {
            if let Some(stdin) = stdin {
                let cb = Arc::clone(&callback);
                tokio::spawn(pump_stdin(cb, stdin));
            }
        }
        // unused stdin is dropped here, so children reading it see EOF

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let cb = Arc::clone(&callback);
        tokio::spawn(async move {
            let out_pump = async {
                if let Some(out) = stdout {
                    pump_output(out, |chunk, last| cb.on_stdout(chunk, last)).await;
                }
            };
            let err_pump = async {
                if let Some(err) = stderr {
                    pump_output(err, |chunk, last| cb.on_stderr(chunk, last)).await;
                }
            };
            // both streams drain to EOF before the exit is recorded, so
            // listeners never observe a truncated final buffer
            let (status, _, _) = tokio::join!(child.wait(), out_pump, err_pump);
            let code = match status {
                Ok(status) => exit_code_of(&status),
                Err(e) => {
                    warn!(pid, error = %e, "waiting on process failed");
                    -1
                }
            };
            cb.on_exit(code);
        });

        Ok(ProcessControl {
            callback,
            rendered: spec.render(),
        })
    }

    /// Schedule a forced kill `timeout` from now with the process-wide
    /// [`KillQueue`]; a no-op when the process has already exited
    pub fn kill_after(&self, timeout: Duration) -> &Self {
        if !self.callback.is_exited() {
            KillQueue::global().schedule(&self.callback, Instant::now() + timeout);
        }
        self
    }

    /// Suspend until the terminal result is recorded
    pub async fn wait(&self) -> ProcessResult {
        self.callback.wait().await
    }

    /// Bounded wait; `None` means still running (normal outcome, the
    /// process is left alone)
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<ProcessResult> {
        self.callback.wait_timeout(timeout).await
    }

    /// Forcibly terminate the process; idempotent
    pub fn kill(&self) -> bool {
        self.callback.kill()
    }

    /// Register a termination listener; late joiners are notified
    /// immediately
    pub fn listen<L>(&self, listener: L)
    where
        L: ProcessListener + 'static,
    {
        self.callback.listen(listener);
    }

    /// Immutable snapshot of the current lifecycle state
    pub fn state(&self) -> ProcessState {
        self.callback.state()
    }

    /// Process ID, if the process started
    pub fn pid(&self) -> Option<u32> {
        self.callback.pid()
    }

    /// The rendered command line this control was launched with
    pub fn command_line(&self) -> &str {
        &self.rendered
    }
}

// the callback holds trait objects, so this cannot be derived
impl fmt::Debug for ProcessControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessControl")
            .field("command", &self.rendered)
            .field("state", &self.callback.state())
            .finish()
    }
}

/// Map an exit status to a code; signal death on Unix maps to the shell
/// convention `128 + signo`
fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

async fn pump_output<R>(mut reader: R, sink: impl Fn(&[u8], bool))
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 8192];
    // a multi-byte character can straddle a read boundary; incomplete
    // trailing bytes are held back until the next chunk completes them
    let mut carry: Vec<u8> = Vec::new();
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                sink(&carry, true);
                break;
            }
            Ok(n) => {
                carry.extend_from_slice(&buf[..n]);
                let boundary = utf8_boundary(&carry);
                sink(&carry[..boundary], false);
                carry.drain(..boundary);
            }
            Err(e) => {
                debug!(error = %e, "output stream closed");
                sink(&carry, true);
                break;
            }
        }
    }
}

/// Length of the longest prefix of `bytes` that does not end inside an
/// incomplete multi-byte sequence
///
/// Genuinely invalid bytes are forwarded, they can never become valid
/// with more input; only a truncated trailing sequence is held back.
fn utf8_boundary(bytes: &[u8]) -> usize {
    let mut consumed = 0;
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(_) => return bytes.len(),
            Err(e) => match e.error_len() {
                None => return consumed + e.valid_up_to(),
                Some(len) => {
                    let step = e.valid_up_to() + len;
                    consumed += step;
                    rest = &rest[step..];
                }
            },
        }
    }
}

async fn pump_stdin(cb: Arc<ProcessCallback>, mut stdin: tokio::process::ChildStdin) {
    let mut buf = String::new();
    loop {
        buf.clear();
        let more = cb.on_stdin_ready(&mut buf);
        if !buf.is_empty() {
            if let Err(e) = stdin.write_all(buf.as_bytes()).await {
                debug!(error = %e, "stdin pipe closed by child");
                break;
            }
            if let Err(e) = stdin.flush().await {
                debug!(error = %e, "stdin flush failed");
                break;
            }
        } else if more {
            // "nothing yet, ask again" must not monopolize the runtime
            tokio::task::yield_now().await;
        }
        if !more {
            break;
        }
    }
    // dropping stdin closes the pipe; the child sees EOF
}
