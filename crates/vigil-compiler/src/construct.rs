//! Lowering the statement tree into the state arena.
//!
//! Fragments are spliced rightmost-first: each node is lowered with the
//! entry of its successor as the exit, so a child fragment's terminal is
//! the next fragment's entry.

use std::sync::Arc;
use std::time::Duration;

use vigil_automaton::{
    Automaton, Block, HeaderRule, IterationCount, Label, StateId,
};
use vigil_core::KindRegistry;

use crate::builder::{LoopNode, Node};
use crate::error::BuildError;
use crate::spec::CompiledSpec;

/// Compile the root block's statements into a sealed automaton.
pub(crate) fn lower(
    headers: Vec<HeaderRule>,
    expected: Vec<Label>,
    body: Vec<Node>,
    registry: KindRegistry,
    timeout: Duration,
) -> Result<CompiledSpec, BuildError> {
    let main = Block::root(headers, expected);
    let mut automaton = Automaton::new(Arc::clone(&main));
    let accept = automaton.add_state(Arc::clone(&main));
    automaton.mark_accept(accept);

    let mut lowerer = Lowerer {
        automaton: &mut automaton,
        next_block_id: 1,
    };
    let entry = lowerer.lower_seq(body, &main, accept)?;
    automaton.set_start(entry);
    automaton.seal();
    debug_assert!(
        automaton.verify().is_ok(),
        "lowering produced a malformed automaton"
    );

    tracing::debug!(states = automaton.len(), "spec compiled");
    Ok(CompiledSpec::new(automaton, registry, timeout))
}

struct Lowerer<'a> {
    automaton: &'a mut Automaton,
    next_block_id: u32,
}

impl Lowerer<'_> {
    /// Lower a statement sequence; returns its entry state.
    fn lower_seq(
        &mut self,
        nodes: Vec<Node>,
        block: &Arc<Block>,
        exit: StateId,
    ) -> Result<StateId, BuildError> {
        let mut entry = exit;
        for node in nodes.into_iter().rev() {
            entry = self.lower_node(node, block, entry)?;
        }
        Ok(entry)
    }

    fn lower_node(
        &mut self,
        node: Node,
        block: &Arc<Block>,
        exit: StateId,
    ) -> Result<StateId, BuildError> {
        match node {
            Node::Single { label, forward } => {
                let state = self.automaton.add_state(Arc::clone(block));
                match label {
                    Label::Internal(internal) => {
                        self.automaton.set_internal(state, internal, exit);
                    }
                    label => self.automaton.add_transition(state, label, exit, forward),
                }
                Ok(state)
            }

            Node::Loop(LoopNode {
                count,
                entry,
                headers,
                expected,
                body,
            }) => {
                let id = self.next_block_id;
                self.next_block_id += 1;
                let loop_block = Block::new(id, count, entry, headers, expected, Arc::clone(block));

                let terminal = self.automaton.add_state(Arc::clone(&loop_block));
                let start = self.lower_seq(body, &loop_block, terminal)?;
                self.automaton.set_loop_edge(terminal, start);

                match count {
                    IterationCount::Times(_) => {
                        self.automaton.mark_repeat_end(terminal);
                        self.automaton.set_exit_edge(terminal, exit);
                        self.automaton.mark_repeat_start(start);
                    }
                    IterationCount::Star => {
                        // Kleene terminals only loop; the zero-traversal
                        // exit is the start's epsilon edge.
                        self.automaton.mark_kleene_end(terminal);
                        self.automaton.mark_kleene_start(start);
                        self.automaton.add_epsilon(start, exit);
                    }
                }

                // Outer loops sharing this start cascade their entry
                // functions before inner ones.
                self.automaton.push_entry_block(start, loop_block);
                Ok(start)
            }

            Node::Conditional { branches } => {
                let state = self.automaton.add_state(Arc::clone(block));
                for branch in branches {
                    if branch.is_empty() {
                        return Err(BuildError::EmptyBranch);
                    }
                    let branch_entry = self.lower_seq(branch, block, exit)?;
                    self.automaton.add_epsilon(state, branch_entry);
                }
                Ok(state)
            }
        }
    }
}
