//! NFA representation shared by the vigil compiler and runtime.
//!
//! The compiler builds labels, blocks and states into a flat `Automaton`
//! arena; the runtime walks it. Construction-time attributes are
//! immutable once sealed; the only mutable runtime state lives behind
//! per-object mutexes (block counts and pending sets, unordered and
//! answer-request progress), serialized by the runtime's machine lock.

mod automaton;
mod block;
mod dump;
mod label;
mod state;
mod verify;

#[cfg(test)]
mod label_tests;

pub use automaton::{Automaton, ERROR_STATE};
pub use block::{Block, EntryFn, HeaderDecision, HeaderRule, IterationCount};
pub use label::{
    AnswerBatch, AnswerMode, AnswerOutcome, AnswerRequestLabel, EventLabel, EventMapper,
    EventPredicate, EventSupplier, FaultLabel, FaultMatcher, InternalLabel, Label, PredicateLabel,
    SnapshotPredicate, TriggerSource, UnorderedLabel, UnorderedOutcome,
};
pub use state::{State, StateFlags, StateId, Transition};
pub use verify::VerifyError;
