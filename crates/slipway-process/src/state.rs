//! Immutable process lifecycle state

use std::fmt;

/// Exit code recorded when the engine force-kills a process and the OS
/// never delivered a real one. A genuine process can exit with any code,
/// so the authoritative kill signal is [`ProcessState::was_killed`], not a
/// comparison against this value.
pub const KILL_EXIT_CODE: i32 = i32::MAX;

/// Lifecycle phase of a supervised process
///
/// Phases only ever advance: `Uninitialized → Starting → Running → Exited`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Phase {
    /// Callback created, process not yet launched
    Uninitialized = 0,
    /// Launch requested, native handle not yet confirmed
    Starting = 1,
    /// Process is running
    Running = 2,
    /// Terminal exit code recorded
    Exited = 3,
}

impl Phase {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Phase::Uninitialized,
            1 => Phase::Starting,
            2 => Phase::Running,
            _ => Phase::Exited,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Uninitialized => write!(f, "uninitialized"),
            Phase::Starting => write!(f, "starting"),
            Phase::Running => write!(f, "running"),
            Phase::Exited => write!(f, "exited"),
        }
    }
}

/// Immutable snapshot of a process's lifecycle
///
/// Every mutator returns a new value and leaves the receiver untouched.
/// `exit_code` is only authoritative once the phase is [`Phase::Exited`];
/// the killed flag is sticky and survives all later transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessState {
    phase: Phase,
    exit_code: i32,
    wants_input: bool,
    was_killed: bool,
}

impl ProcessState {
    /// Initial state: uninitialized, exit code 0, no stdin interest, not killed
    pub fn new() -> Self {
        Self {
            phase: Phase::Uninitialized,
            exit_code: 0,
            wants_input: false,
            was_killed: false,
        }
    }

    /// Copy of this state at the given phase
    pub fn to_phase(self, phase: Phase) -> Self {
        Self { phase, ..self }
    }

    /// Copy of this state with stdin-writability interest set
    pub fn wanting_input(self) -> Self {
        Self {
            wants_input: true,
            ..self
        }
    }

    /// Copy of this state with stdin-writability interest cleared
    pub fn not_wanting_input(self) -> Self {
        Self {
            wants_input: false,
            ..self
        }
    }

    /// Copy of this state marked as force-killed
    pub fn killed(self) -> Self {
        Self {
            was_killed: true,
            ..self
        }
    }

    /// Copy of this state with a terminal exit code
    ///
    /// The only mutator that moves the phase to [`Phase::Exited`].
    pub fn with_exit_code(self, code: i32) -> Self {
        Self {
            phase: Phase::Exited,
            exit_code: code,
            ..self
        }
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Recorded exit code, meaningful only when [`ProcessState::is_exited`]
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Whether the process has declared stdin-writability interest
    pub fn wants_input(&self) -> bool {
        self.wants_input
    }

    /// Whether the process was force-killed
    pub fn was_killed(&self) -> bool {
        self.was_killed
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    pub fn is_exited(&self) -> bool {
        self.phase == Phase::Exited
    }
}

impl Default for ProcessState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exited() {
            write!(f, "{} (code {})", self.phase, self.exit_code)?;
        } else {
            write!(f, "{}", self.phase)?;
        }
        if self.was_killed {
            write!(f, " [killed]")?;
        }
        Ok(())
    }
}
