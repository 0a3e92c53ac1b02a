//! NFA states and transitions.
//!
//! States live in a flat arena and reference their targets by integer id,
//! which makes the loop back-edges of repeat/Kleene fragments cheap to
//! represent.

use std::sync::Arc;

use crate::block::Block;
use crate::label::Label;

/// Index into the automaton's state arena.
pub type StateId = u32;

/// Marker flags on a state.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct StateFlags {
    pub accept: bool,
    pub error: bool,
    pub repeat_start: bool,
    pub repeat_end: bool,
    pub kleene_start: bool,
    pub kleene_end: bool,
}

/// A labeled edge to another state.
///
/// `forward` controls whether the event matched by this transition is
/// delivered to its real recipient.
#[derive(Clone)]
pub struct Transition {
    pub label: Label,
    pub target: StateId,
    pub forward: bool,
}

/// Node of the NFA.
pub struct State {
    pub(crate) id: StateId,
    pub(crate) block: Arc<Block>,
    pub(crate) transitions: Vec<Transition>,
    /// Deferred side effect fired without consuming input.
    pub(crate) internal: Option<Transition>,
    /// Loop terminal back-edge to the loop's own start.
    pub(crate) loop_to: Option<StateId>,
    /// Loop terminal exit edge past the loop.
    pub(crate) exit_to: Option<StateId>,
    pub(crate) flags: StateFlags,
    /// Blocks whose entry functions cascade when this state is entered,
    /// outermost first.
    pub(crate) entry_blocks: Vec<Arc<Block>>,
    /// Epsilon closure memoized by `Automaton::seal`.
    pub(crate) closure: Vec<StateId>,
}

impl State {
    pub(crate) fn new(id: StateId, block: Arc<Block>) -> Self {
        Self {
            id,
            block,
            transitions: Vec::new(),
            internal: None,
            loop_to: None,
            exit_to: None,
            flags: StateFlags::default(),
            entry_blocks: Vec::new(),
            closure: Vec::new(),
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn block(&self) -> &Arc<Block> {
        &self.block
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn internal(&self) -> Option<&Transition> {
        self.internal.as_ref()
    }

    pub fn loop_to(&self) -> Option<StateId> {
        self.loop_to
    }

    pub fn exit_to(&self) -> Option<StateId> {
        self.exit_to
    }

    pub fn flags(&self) -> StateFlags {
        self.flags
    }

    pub fn is_loop_start(&self) -> bool {
        self.flags.repeat_start || self.flags.kleene_start
    }

    pub fn is_loop_end(&self) -> bool {
        self.flags.repeat_end || self.flags.kleene_end
    }

    pub fn entry_blocks(&self) -> &[Arc<Block>] {
        &self.entry_blocks
    }

    /// Memoized epsilon closure, including this state.
    pub fn closure(&self) -> &[StateId] {
        &self.closure
    }

    /// True when this state consumes no input: its only move is the
    /// internal transition.
    pub fn is_active(&self) -> bool {
        self.internal.is_some()
    }

    /// True when nothing outgoing is labeled with a real expectation.
    pub fn is_epsilon_only(&self) -> bool {
        self.internal.is_none()
            && !self.flags.accept
            && !self.is_loop_end()
            && self.transitions.iter().all(|t| t.label.is_epsilon())
    }
}
