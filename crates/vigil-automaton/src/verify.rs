//! Structural validation of a sealed automaton.
//!
//! Lowering bugs surface here rather than as runtime misbehavior: every
//! edge must target an existing state and every loop terminal must carry
//! its back-edge.

use crate::automaton::{Automaton, ERROR_STATE};
use crate::state::StateId;

#[derive(Debug, Clone, thiserror::Error)]
pub enum VerifyError {
    /// `seal()` was never called.
    #[error("automaton is not sealed")]
    NotSealed,

    /// No state is marked accept.
    #[error("no accept state marked")]
    NoAccept,

    /// An edge targets a state outside the arena.
    #[error("transition from s{from} targets missing state s{target}")]
    DanglingTarget { from: StateId, target: StateId },

    /// A repeat or Kleene terminal has no loop edge.
    #[error("loop terminal s{state} has no loop edge")]
    MissingLoopEdge { state: StateId },

    /// A repeat terminal has no exit edge.
    #[error("repeat terminal s{state} has no exit edge")]
    MissingExitEdge { state: StateId },
}

impl Automaton {
    /// Check structural invariants. Cheap enough to run after every
    /// construction.
    pub fn verify(&self) -> Result<(), VerifyError> {
        if !self.is_sealed() {
            return Err(VerifyError::NotSealed);
        }
        if self.accept() == ERROR_STATE || !self.state(self.accept()).flags().accept {
            return Err(VerifyError::NoAccept);
        }

        let len = self.len() as StateId;
        let check = |from: StateId, target: StateId| {
            if target < len {
                Ok(())
            } else {
                Err(VerifyError::DanglingTarget { from, target })
            }
        };

        for state in self.states() {
            for t in state.transitions() {
                check(state.id(), t.target)?;
            }
            if let Some(t) = state.internal() {
                check(state.id(), t.target)?;
            }
            if let Some(target) = state.loop_to() {
                check(state.id(), target)?;
            }
            if let Some(target) = state.exit_to() {
                check(state.id(), target)?;
            }

            if state.is_loop_end() && state.loop_to().is_none() {
                return Err(VerifyError::MissingLoopEdge { state: state.id() });
            }
            if state.flags().repeat_end && state.exit_to().is_none() {
                return Err(VerifyError::MissingExitEdge { state: state.id() });
            }
        }
        Ok(())
    }
}
