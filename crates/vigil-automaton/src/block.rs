//! Lexical scopes with iteration semantics and scope-wide rules.
//!
//! A block owns an iteration count (fixed or Kleene), an optional entry
//! function, header rules consulted LIFO, and block-scoped expectations.
//! Construction-time attributes are immutable behind `Arc`; the runtime
//! state (counts, pending, flags) sits behind a mutex serialized by the
//! runtime's machine lock.

use std::fmt;
use std::sync::{Arc, Mutex};

use vigil_core::{EventSymbol, KindRegistry};

use crate::label::Label;

pub type EntryFn = Arc<dyn Fn() + Send + Sync>;

/// How many times a block's body runs.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IterationCount {
    Times(u32),
    /// Kleene closure: zero or more.
    Star,
}

/// Scope-wide policy on events not matched by any ordered expectation.
#[derive(Clone)]
pub enum HeaderRule {
    /// Whitelist: forward without consuming an expectation.
    Allow(Label),
    /// Swallow silently.
    Drop(Label),
    /// Blacklist: fail the test.
    Disallow(Label),
}

/// First-match decision from a block's header rules.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HeaderDecision {
    Forward,
    Drop,
    Fail,
}

#[derive(Debug)]
struct BlockState {
    current_count: u32,
    /// Indices into `expected` still unmatched this iteration.
    pending: Vec<usize>,
    executing: bool,
    can_run_entry: bool,
}

/// A lexical scope in the compiled machine.
pub struct Block {
    id: u32,
    count: IterationCount,
    entry: Option<EntryFn>,
    headers: Vec<HeaderRule>,
    expected: Vec<Label>,
    parent: Option<Arc<Block>>,
    state: Mutex<BlockState>,
}

impl Block {
    /// The root block: runs once, has no parent, never closes.
    pub fn main() -> Arc<Self> {
        Self::root(Vec::new(), Vec::new())
    }

    /// The root block with its initial-header rules and expectations.
    pub fn root(headers: Vec<HeaderRule>, expected: Vec<Label>) -> Arc<Self> {
        Arc::new(Self::build(
            0,
            IterationCount::Times(1),
            None,
            headers,
            expected,
            None,
        ))
    }

    pub fn new(
        id: u32,
        count: IterationCount,
        entry: Option<EntryFn>,
        headers: Vec<HeaderRule>,
        expected: Vec<Label>,
        parent: Arc<Block>,
    ) -> Arc<Self> {
        Arc::new(Self::build(id, count, entry, headers, expected, Some(parent)))
    }

    fn build(
        id: u32,
        count: IterationCount,
        entry: Option<EntryFn>,
        headers: Vec<HeaderRule>,
        expected: Vec<Label>,
        parent: Option<Arc<Block>>,
    ) -> Self {
        let pending = (0..expected.len()).collect();
        let current_count = match count {
            IterationCount::Times(n) => n,
            IterationCount::Star => 0,
        };
        Self {
            id,
            count,
            entry,
            headers,
            expected,
            parent,
            state: Mutex::new(BlockState {
                current_count,
                pending,
                executing: false,
                can_run_entry: true,
            }),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn count(&self) -> IterationCount {
        self.count
    }

    pub fn parent(&self) -> Option<&Arc<Block>> {
        self.parent.as_ref()
    }

    pub fn is_kleene(&self) -> bool {
        self.count == IterationCount::Star
    }

    pub fn same(a: &Arc<Block>, b: &Arc<Block>) -> bool {
        Arc::ptr_eq(a, b)
    }

    /// Leaf-to-root chain starting at this block.
    pub fn chain(self: &Arc<Self>) -> Vec<Arc<Block>> {
        let mut out = vec![Arc::clone(self)];
        let mut cursor = self.parent.clone();
        while let Some(block) = cursor {
            cursor = block.parent.clone();
            out.push(block);
        }
        out
    }

    /// True if `ancestor` appears on this block's parent chain (reflexive).
    pub fn has_ancestor(self: &Arc<Self>, ancestor: &Arc<Block>) -> bool {
        self.chain().iter().any(|b| Arc::ptr_eq(b, ancestor))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BlockState> {
        self.state.lock().expect("block lock poisoned")
    }

    /// Enter the block: arm the count, reload pending, re-arm the entry
    /// function. No-op while already executing.
    pub fn open(&self) {
        let mut st = self.lock();
        if st.executing {
            return;
        }
        st.executing = true;
        st.current_count = match self.count {
            IterationCount::Times(n) => n,
            IterationCount::Star => 0,
        };
        st.pending = (0..self.expected.len()).collect();
        st.can_run_entry = true;
    }

    pub fn is_executing(&self) -> bool {
        self.lock().executing
    }

    pub fn has_pending(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Run the entry function if armed for this iteration.
    pub fn maybe_run_entry(&self) {
        let armed = {
            let mut st = self.lock();
            let armed = st.can_run_entry;
            st.can_run_entry = false;
            armed
        };
        if armed && let Some(entry) = &self.entry {
            entry();
        }
    }

    /// One body traversal finished: reload pending, decrement the count,
    /// re-arm the entry function.
    pub fn iteration_complete(&self) {
        let mut st = self.lock();
        st.pending = (0..self.expected.len()).collect();
        st.can_run_entry = true;
        if let IterationCount::Times(_) = self.count {
            st.current_count = st.current_count.saturating_sub(1);
        }
    }

    /// Iterations left after the one just completed. Kleene never runs dry.
    pub fn has_remaining(&self) -> bool {
        match self.count {
            IterationCount::Times(_) => self.lock().current_count > 0,
            IterationCount::Star => true,
        }
    }

    pub fn close(&self) {
        self.lock().executing = false;
    }

    /// Discontinued-branch reset: reload pending, clear the executing flag
    /// (Kleene included), re-arm count and entry so the block re-enters
    /// cleanly.
    pub fn reset(&self) {
        let mut st = self.lock();
        st.pending = (0..self.expected.len()).collect();
        st.executing = false;
        st.can_run_entry = true;
        st.current_count = match self.count {
            IterationCount::Times(n) => n,
            IterationCount::Star => 0,
        };
    }

    /// Match a block-scoped expectation, consuming one pending label.
    pub fn match_pending(&self, sym: &EventSymbol, registry: &KindRegistry) -> bool {
        let mut st = self.lock();
        let hit = st
            .pending
            .iter()
            .position(|&idx| self.expected[idx].matches_observed(sym, registry));
        match hit {
            Some(pos) => {
                st.pending.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Consult this block's header rules, LIFO, first match wins.
    pub fn match_headers(&self, sym: &EventSymbol, registry: &KindRegistry) -> Option<HeaderDecision> {
        for rule in self.headers.iter().rev() {
            match rule {
                HeaderRule::Allow(label) if label.matches_observed(sym, registry) => {
                    return Some(HeaderDecision::Forward);
                }
                HeaderRule::Drop(label) if label.matches_observed(sym, registry) => {
                    return Some(HeaderDecision::Drop);
                }
                HeaderRule::Disallow(label) if label.matches_observed(sym, registry) => {
                    return Some(HeaderDecision::Fail);
                }
                _ => {}
            }
        }
        None
    }

    /// Header decision over the whole chain, innermost block first.
    pub fn header_decision(
        self: &Arc<Self>,
        sym: &EventSymbol,
        registry: &KindRegistry,
    ) -> Option<HeaderDecision> {
        self.chain()
            .iter()
            .find_map(|block| block.match_headers(sym, registry))
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.lock();
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("count", &self.count)
            .field("expected", &self.expected.len())
            .field("headers", &self.headers.len())
            .field("pending", &st.pending)
            .field("executing", &st.executing)
            .finish()
    }
}
