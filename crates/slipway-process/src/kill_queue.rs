//! Process-wide deadline enforcement
//!
//! A single lazily-started worker thread owns all timeout-induced kills:
//! it sleeps until the soonest deadline, wakes, and force-kills every
//! still-running process whose deadline has elapsed. Entries hold only a
//! weak reference to their target; a process that exits (or is dropped)
//! before its deadline is discarded without a kill call.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Instant;

use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::callback::ProcessCallback;

static GLOBAL: Lazy<KillQueue> = Lazy::new(KillQueue::new);

/// Observer invoked after the worker successfully kills a target; used by
/// tests to verify which processes the queue actually touched
pub type KillObserver = Arc<dyn Fn(&ProcessCallback) + Send + Sync>;

struct Entry {
    deadline: Instant,
    seq: u64,
    target: Weak<ProcessCallback>,
}

// BinaryHeap is a max-heap; reverse the comparison so the soonest
// deadline surfaces first. seq breaks ties deterministically.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

struct Inner {
    entries: BinaryHeap<Entry>,
    worker_running: bool,
    next_seq: u64,
    observer: Option<KillObserver>,
}

/// Deadline-ordered forced-termination queue; one per process
pub struct KillQueue {
    inner: Mutex<Inner>,
    wake: Condvar,
}

impl KillQueue {
    fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: BinaryHeap::new(),
                worker_running: false,
                next_seq: 0,
                observer: None,
            }),
            wake: Condvar::new(),
        }
    }

    /// The process-wide queue; the backing worker starts on first schedule
    /// and lives for the remainder of the process
    pub fn global() -> &'static KillQueue {
        &GLOBAL
    }

    /// Register `target` for a forced kill at `deadline` if it is still
    /// running by then
    pub fn schedule(&self, target: &Arc<ProcessCallback>, deadline: Instant) {
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.entries.push(Entry {
            deadline,
            seq,
            target: Arc::downgrade(target),
        });
        trace!(pid = target.pid().unwrap_or(0), "kill deadline scheduled");
        if !inner.worker_running {
            let spawned = thread::Builder::new()
                .name("slipway-kill-queue".into())
                .spawn(|| KillQueue::global().run());
            match spawned {
                Ok(_) => inner.worker_running = true,
                Err(e) => warn!(error = %e, "failed to start kill queue worker"),
            }
        }
        self.wake.notify_one();
    }

    /// Install a kill observer. Default behavior is unchanged: the worker
    /// still kills; the observer is told about it afterwards. Test hook.
    pub fn set_kill_observer(&self, observer: impl Fn(&ProcessCallback) + Send + Sync + 'static) {
        self.inner.lock().observer = Some(Arc::new(observer));
    }

    /// Drop all pending entries and any installed observer. Test hook; the
    /// worker thread itself keeps running.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.observer = None;
    }

    /// Number of deadlines currently pending
    pub fn pending(&self) -> usize {
        self.inner.lock().entries.len()
    }

    fn run(&self) {
        let mut inner = self.inner.lock();
        loop {
            let now = Instant::now();
            let mut due = Vec::new();
            loop {
                let elapsed = inner
                    .entries
                    .peek()
                    .map_or(false, |entry| entry.deadline <= now);
                if !elapsed {
                    break;
                }
                if let Some(entry) = inner.entries.pop() {
                    due.push(entry);
                }
            }

            if !due.is_empty() {
                let observer = inner.observer.clone();
                // Kills happen outside the lock so schedule() is never
                // blocked behind signal delivery.
                MutexGuard::unlocked(&mut inner, || {
                    for entry in due {
                        fire(entry, observer.as_ref());
                    }
                });
                continue;
            }

            match inner.entries.peek().map(|entry| entry.deadline) {
                Some(deadline) => {
                    self.wake.wait_until(&mut inner, deadline);
                }
                None => self.wake.wait(&mut inner),
            }
        }
    }
}

/// Kill one elapsed entry; errors are logged, never fatal to the worker
fn fire(entry: Entry, observer: Option<&KillObserver>) {
    let Some(target) = entry.target.upgrade() else {
        trace!("deadline target already dropped");
        return;
    };
    if !target.is_running() {
        trace!("deadline target already exited; no kill issued");
        return;
    }
    debug!(
        pid = target.pid().unwrap_or(0),
        "deadline elapsed, killing process"
    );
    if target.kill() {
        if let Some(observer) = observer {
            observer(&target);
        }
    }
}
