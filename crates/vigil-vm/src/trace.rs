//! Transition tracing for diagnostics.
//!
//! The simulator reports through a [`Tracer`]; `NoopTracer` discards
//! everything, `TransitionLog` collects a line per step and can be cloned
//! to read the log after (or while) the test runs.

use std::sync::{Arc, Mutex};

use vigil_automaton::StateId;
use vigil_core::EventSymbol;

/// Observer of simulator steps.
pub trait Tracer: Send {
    /// A symbol is about to be matched.
    fn symbol(&mut self, _symbol: &EventSymbol) {}

    /// An internal action fired on a state.
    fn internal(&mut self, _state: StateId, _action: &str) {}

    /// The current-states set after a committed step.
    fn committed(&mut self, _states: &[StateId], _forwarded: bool) {}

    /// The machine entered the error state.
    fn errored(&mut self, _reason: &str) {}
}

/// Discards all trace events.
pub struct NoopTracer;

impl Tracer for NoopTracer {}

/// Collects a formatted line per trace event.
#[derive(Clone, Default)]
pub struct TransitionLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl TransitionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("trace lock poisoned").clone()
    }

    fn push(&self, line: String) {
        self.lines.lock().expect("trace lock poisoned").push(line);
    }
}

impl Tracer for TransitionLog {
    fn symbol(&mut self, symbol: &EventSymbol) {
        self.push(format!("symbol {symbol}"));
    }

    fn internal(&mut self, state: StateId, action: &str) {
        self.push(format!("internal s{state} {action}"));
    }

    fn committed(&mut self, states: &[StateId], forwarded: bool) {
        let ids: Vec<String> = states.iter().map(|id| format!("s{id}")).collect();
        let fwd = if forwarded { " fwd" } else { "" };
        self.push(format!("states [{}]{}", ids.join(" "), fwd));
    }

    fn errored(&mut self, reason: &str) {
        self.push(format!("error: {reason}"));
    }
}
