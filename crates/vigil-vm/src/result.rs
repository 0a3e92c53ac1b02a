//! The write-once test verdict.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Single-assignment verdict cell. Completion attempts after the first
/// are no-ops.
pub(crate) struct ResultCell {
    state: Mutex<Option<bool>>,
    cond: Condvar,
}

impl ResultCell {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    /// Set the verdict; returns false if it was already set.
    pub(crate) fn complete(&self, verdict: bool) -> bool {
        let mut state = self.state.lock().expect("result lock poisoned");
        if state.is_some() {
            return false;
        }
        *state = Some(verdict);
        self.cond.notify_all();
        true
    }

    pub(crate) fn poll(&self) -> Option<bool> {
        *self.state.lock().expect("result lock poisoned")
    }

    pub(crate) fn wait(&self) -> bool {
        let mut state = self.state.lock().expect("result lock poisoned");
        while state.is_none() {
            state = self.cond.wait(state).expect("result lock poisoned");
        }
        state.unwrap_or(false)
    }

    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Option<bool> {
        let mut state = self.state.lock().expect("result lock poisoned");
        let deadline = std::time::Instant::now() + timeout;
        while state.is_none() {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (guard, timed_out) = self
                .cond
                .wait_timeout(state, remaining)
                .expect("result lock poisoned");
            state = guard;
            if timed_out.timed_out() && state.is_none() {
                return None;
            }
        }
        *state
    }
}

/// Handle on a pending test verdict: blocking `wait`, non-blocking `poll`.
#[derive(Clone)]
pub struct RunHandle {
    pub(crate) cell: Arc<ResultCell>,
}

impl RunHandle {
    /// Block until the test completes.
    pub fn wait(&self) -> bool {
        self.cell.wait()
    }

    /// Block until the test completes or the timeout elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<bool> {
        self.cell.wait_timeout(timeout)
    }

    /// The verdict, if already decided.
    pub fn poll(&self) -> Option<bool> {
        self.cell.poll()
    }
}
