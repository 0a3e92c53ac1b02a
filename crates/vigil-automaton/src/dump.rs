//! Deterministic text rendering of a compiled automaton.
//!
//! Used by tests and diagnostics; the format is stable line-per-state
//! with indented transitions.

use std::fmt::Write;

use crate::automaton::Automaton;

impl Automaton {
    /// Render every state, its flags, transitions and loop edges.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for state in self.states() {
            let mut flags = Vec::new();
            if state.flags().error {
                flags.push("error");
            }
            if state.flags().accept {
                flags.push("accept");
            }
            if state.flags().repeat_start {
                flags.push("repeat-start");
            }
            if state.flags().repeat_end {
                flags.push("repeat-end");
            }
            if state.flags().kleene_start {
                flags.push("kleene-start");
            }
            if state.flags().kleene_end {
                flags.push("kleene-end");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(" "))
            };
            let _ = writeln!(out, "s{}{} block b{}", state.id(), flags, state.block().id());

            for t in state.transitions() {
                let fwd = if t.forward { " fwd" } else { "" };
                let _ = writeln!(out, "  {} -> s{}{}", t.label, t.target, fwd);
            }
            if let Some(t) = state.internal() {
                let _ = writeln!(out, "  internal {} => s{}", t.label, t.target);
            }
            if let Some(loop_to) = state.loop_to() {
                let _ = writeln!(out, "  loop -> s{loop_to}");
            }
            if let Some(exit_to) = state.exit_to() {
                let _ = writeln!(out, "  exit -> s{exit_to}");
            }
        }
        let _ = writeln!(out, "start: s{}", self.start());
        out
    }
}
