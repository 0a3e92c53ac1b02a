//! The state arena and construction API.
//!
//! States are stored in a flat vector and referenced by `StateId`;
//! transitions target by id, so cyclic loop edges need no special
//! representation. State 0 is always the error state.

use std::sync::Arc;

use indexmap::IndexSet;

use crate::block::Block;
use crate::label::{InternalLabel, Label};
use crate::state::{State, StateId, Transition};

/// Reserved id of the error state.
pub const ERROR_STATE: StateId = 0;

/// The compiled NFA.
pub struct Automaton {
    states: Vec<State>,
    start: StateId,
    accept: StateId,
    sealed: bool,
}

impl Automaton {
    /// Create an automaton whose state 0 is the error state.
    pub fn new(main_block: Arc<Block>) -> Self {
        let mut error = State::new(ERROR_STATE, main_block);
        error.flags.error = true;
        Self {
            states: vec![error],
            start: ERROR_STATE,
            accept: ERROR_STATE,
            sealed: false,
        }
    }

    pub fn add_state(&mut self, block: Arc<Block>) -> StateId {
        let id = self.states.len() as StateId;
        self.states.push(State::new(id, block));
        id
    }

    pub fn add_transition(&mut self, from: StateId, label: Label, target: StateId, forward: bool) {
        self.states[from as usize].transitions.push(Transition {
            label,
            target,
            forward,
        });
    }

    pub fn add_epsilon(&mut self, from: StateId, target: StateId) {
        self.add_transition(from, Label::Epsilon, target, false);
    }

    pub fn set_internal(&mut self, from: StateId, label: InternalLabel, target: StateId) {
        self.states[from as usize].internal = Some(Transition {
            label: Label::Internal(label),
            target,
            forward: false,
        });
    }

    pub fn set_loop_edge(&mut self, from: StateId, loop_to: StateId) {
        self.states[from as usize].loop_to = Some(loop_to);
    }

    pub fn set_exit_edge(&mut self, from: StateId, exit_to: StateId) {
        self.states[from as usize].exit_to = Some(exit_to);
    }

    pub fn mark_accept(&mut self, id: StateId) {
        self.states[id as usize].flags.accept = true;
        self.accept = id;
    }

    pub fn mark_repeat_start(&mut self, id: StateId) {
        self.states[id as usize].flags.repeat_start = true;
    }

    pub fn mark_repeat_end(&mut self, id: StateId) {
        self.states[id as usize].flags.repeat_end = true;
    }

    pub fn mark_kleene_start(&mut self, id: StateId) {
        self.states[id as usize].flags.kleene_start = true;
    }

    pub fn mark_kleene_end(&mut self, id: StateId) {
        self.states[id as usize].flags.kleene_end = true;
    }

    /// Register a block whose entry function cascades when `id` is
    /// entered. Outer blocks are registered after inner ones and must run
    /// first, hence the push-front.
    pub fn push_entry_block(&mut self, id: StateId, block: Arc<Block>) {
        self.states[id as usize].entry_blocks.insert(0, block);
    }

    pub fn set_start(&mut self, id: StateId) {
        self.start = id;
    }

    pub fn start(&self) -> StateId {
        self.start
    }

    pub fn accept(&self) -> StateId {
        self.accept
    }

    pub fn is_error(&self, id: StateId) -> bool {
        id == ERROR_STATE
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id as usize]
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Memoize epsilon closures. Call once after construction; the result
    /// is a fixed point (closing a closure adds nothing).
    pub fn seal(&mut self) {
        let mut closures: Vec<Vec<StateId>> = Vec::with_capacity(self.states.len());
        for id in 0..self.states.len() as StateId {
            let mut seen: IndexSet<StateId> = IndexSet::new();
            let mut stack = vec![id];
            while let Some(s) = stack.pop() {
                if !seen.insert(s) {
                    continue;
                }
                for t in &self.states[s as usize].transitions {
                    if t.label.is_epsilon() {
                        stack.push(t.target);
                    }
                }
            }
            closures.push(seen.into_iter().collect());
        }
        for (state, closure) in self.states.iter_mut().zip(closures) {
            state.closure = closure;
        }
        self.sealed = true;
    }
}
