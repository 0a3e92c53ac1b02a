//! The NFA simulator.
//!
//! Holds the current-states set and drives it with observed event
//! symbols. Matching follows a fixed policy per symbol: required internal
//! transitions, then the symbol match (ordered expectations, block-scoped
//! expectations, header rules), then forced internals, then registered
//! default actions. The committed set is closed under epsilon edges and
//! loop-terminal resolution.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexSet;

use vigil_automaton::{
    AnswerOutcome, Automaton, Block, ERROR_STATE, HeaderDecision, InternalLabel, Label, StateId,
    TriggerSource,
};
use vigil_core::{DefaultAction, EventSymbol, KindRegistry, PortId, SharedEvent};

use crate::io::Effector;
use crate::trace::{NoopTracer, Tracer};

/// Outcome of one simulator step.
pub struct TransitionResult {
    /// Forward the just-processed symbol to its real recipient.
    pub forward: bool,
    /// Symbols an unordered set released on completion, in match order.
    pub release: Vec<EventSymbol>,
    /// The current set contains the accept state.
    pub reached_final: bool,
    /// The machine is in the error state.
    pub errored: bool,
}

/// Ceiling on internal actions over a whole run; a Kleene body made only
/// of triggers would otherwise spin forever.
const INTERNAL_FUEL: u32 = 1_000_000;

/// Current-states NFA executor.
pub struct Simulator {
    automaton: Automaton,
    registry: KindRegistry,
    effector: Arc<dyn Effector>,
    tracer: Box<dyn Tracer>,
    current: IndexSet<StateId>,
    fuel: u32,
}

impl Simulator {
    pub fn new(automaton: Automaton, registry: KindRegistry, effector: Arc<dyn Effector>) -> Self {
        Self::with_tracer(automaton, registry, effector, Box::new(NoopTracer))
    }

    pub fn with_tracer(
        automaton: Automaton,
        registry: KindRegistry,
        effector: Arc<dyn Effector>,
        tracer: Box<dyn Tracer>,
    ) -> Self {
        let start = automaton.start();
        let mut sim = Self {
            automaton,
            registry,
            effector,
            tracer,
            current: IndexSet::new(),
            fuel: INTERNAL_FUEL,
        };
        // The root block is executing for the whole run.
        sim.automaton
            .state(sim.automaton.accept())
            .block()
            .open();
        sim.commit(vec![start]);
        sim
    }

    pub fn current_states(&self) -> Vec<StateId> {
        self.current.iter().copied().collect()
    }

    pub fn in_error(&self) -> bool {
        self.current.contains(&ERROR_STATE)
    }

    pub fn reached_final(&self) -> bool {
        self.current
            .iter()
            .any(|&id| self.automaton.state(id).flags().accept)
    }

    fn result(&self, forward: bool, release: Vec<EventSymbol>) -> TransitionResult {
        TransitionResult {
            forward,
            release,
            reached_final: self.reached_final(),
            errored: self.in_error(),
        }
    }

    /// Match one symbol, or land in the error state.
    pub fn do_transition(&mut self, sym: &mut EventSymbol) -> TransitionResult {
        self.tracer.symbol(sym);

        // A dead machine stays dead.
        if self.in_error() {
            return self.result(false, Vec::new());
        }

        // (1) Required internal transitions run to quiescence first.
        if let Some(result) = self.try_internal_transitions()
            && result.errored
        {
            return result;
        }

        // (2)-(4) Match, forcing internal rounds between attempts.
        loop {
            if let Some(result) = self.match_symbol(sym) {
                return result;
            }
            match self.force_internal_transitions() {
                Some(result) if result.errored => return result,
                Some(_) => continue,
                None => break,
            }
        }

        // (5) Registered default actions; the most specific registered
        // supertype of the symbol's kind wins.
        match self.registry.default_action_for(sym.kind()) {
            Some(DefaultAction::Handle) => {
                let forward = sym.should_forward();
                self.tracer.committed(&self.current_states(), forward);
                self.result(forward, Vec::new())
            }
            Some(DefaultAction::Drop) => {
                self.tracer.committed(&self.current_states(), false);
                self.result(false, Vec::new())
            }
            Some(DefaultAction::Fail) | None => {
                self.enter_error("no expectation, header rule or default action matched");
                self.result(false, Vec::new())
            }
        }
    }

    /// While every current state is active, fire one internal round per
    /// state. Returns the last round's result, or None when some state
    /// expects input.
    pub fn try_internal_transitions(&mut self) -> Option<TransitionResult> {
        let mut last = None;
        loop {
            if self.current.is_empty() || self.in_error() {
                break;
            }
            let all_active = self
                .current
                .iter()
                .all(|&id| self.automaton.state(id).is_active());
            if !all_active {
                break;
            }
            let round: Vec<StateId> = self.current.iter().copied().collect();
            let result = self.fire_internal_round(&round);
            let errored = result.errored;
            last = Some(result);
            if errored {
                break;
            }
        }
        last
    }

    /// Fire internal transitions on the subset of current states that
    /// can; states that cannot are dropped from the set. Returns None
    /// (and changes nothing) when no state has an internal transition.
    pub fn force_internal_transitions(&mut self) -> Option<TransitionResult> {
        let active: Vec<StateId> = self
            .current
            .iter()
            .copied()
            .filter(|&id| self.automaton.state(id).is_active())
            .collect();
        if active.is_empty() {
            return None;
        }
        Some(self.fire_internal_round(&active))
    }

    fn fire_internal_round(&mut self, ids: &[StateId]) -> TransitionResult {
        let mut planned: Vec<(StateId, InternalLabel, StateId)> = Vec::new();
        for &id in ids {
            if let Some(t) = self.automaton.state(id).internal()
                && let Label::Internal(action) = &t.label
            {
                planned.push((id, action.clone(), t.target));
            }
        }

        let mut targets = Vec::new();
        for (id, action, target) in planned {
            if self.fuel == 0 {
                self.enter_error("internal action limit exceeded");
                return self.result(false, Vec::new());
            }
            self.fuel -= 1;
            self.tracer.internal(id, &action.to_string());
            match self.execute_internal(&action) {
                Ok(()) => targets.push(target),
                Err(reason) => {
                    self.enter_error(&reason);
                    return self.result(false, Vec::new());
                }
            }
        }

        self.commit(targets);
        self.tracer.committed(&self.current_states(), false);
        self.result(false, Vec::new())
    }

    fn execute_internal(&self, action: &InternalLabel) -> Result<(), String> {
        match action {
            InternalLabel::Trigger { source, port } => {
                let event: SharedEvent = match source {
                    TriggerSource::Event(event) => Arc::clone(event),
                    TriggerSource::Supplier(supplier) => supplier(),
                    TriggerSource::Future(future) => future
                        .get()
                        .ok_or_else(|| "triggered future is unbound".to_string())?,
                };
                self.effector.trigger(event, *port);
                Ok(())
            }
            InternalLabel::Inspect { predicate, subject } => {
                let snapshot = self.effector.snapshot();
                if predicate(snapshot.as_ref()) {
                    Ok(())
                } else {
                    Err(format!("inspect predicate failed for {subject}"))
                }
            }
        }
    }

    /// One attempt at matching the symbol against the current set.
    /// Returns None when no state yields a candidate.
    fn match_symbol(&mut self, sym: &mut EventSymbol) -> Option<TransitionResult> {
        let ids: Vec<StateId> = self.current.iter().copied().collect();

        let mut candidates: Vec<StateId> = Vec::new();
        let mut forward = false;
        let mut release: Vec<EventSymbol> = Vec::new();
        let mut respond: Vec<(SharedEvent, PortId)> = Vec::new();
        let mut fail: Option<&'static str> = None;

        for id in ids {
            let state = self.automaton.state(id);

            // The error state matches nothing, not even header rules.
            if state.flags().error {
                continue;
            }
            // Resolved loop terminals wait for loop-end selection.
            if state.is_loop_end() && !state.block().has_pending() {
                continue;
            }

            // (a) Block-scoped expectations, innermost block first.
            if state
                .block()
                .chain()
                .iter()
                .any(|block| block.match_pending(sym, &self.registry))
            {
                candidates.push(id);
                forward = forward || sym.should_forward();
                continue;
            }

            // (b) Ordered expectations on outgoing transitions.
            let mut matched = false;
            for t in state.transitions() {
                match &t.label {
                    Label::Event(_) | Label::Predicate(_) | Label::Fault(_) => {
                        if t.label.matches_observed(sym, &self.registry) {
                            candidates.push(t.target);
                            forward = forward || (t.forward && sym.should_forward());
                            matched = true;
                        }
                    }
                    Label::Unordered(unordered) => {
                        if let Some(outcome) = unordered.try_match(sym, &self.registry) {
                            if outcome.errored {
                                fail = Some("future already bound in unordered set");
                            }
                            // Keep the current state while inner labels
                            // remain; move on once complete.
                            candidates.push(if outcome.complete { t.target } else { id });
                            forward = forward || outcome.forward_now;
                            release.extend(outcome.release);
                            respond.extend(outcome.respond);
                            matched = true;
                        }
                    }
                    Label::AnswerRequest(answer) => {
                        if let Some(outcome) = answer.try_match(sym, &self.registry) {
                            match outcome {
                                AnswerOutcome::Respond(response, port) => {
                                    respond.push((response, port));
                                }
                                AnswerOutcome::RespondAll(responses) => respond.extend(responses),
                                AnswerOutcome::Deferred | AnswerOutcome::Bound => {}
                                AnswerOutcome::AlreadyBound => {
                                    fail = Some("future already bound by another answer-request");
                                }
                            }
                            candidates.push(t.target);
                            matched = true;
                        }
                    }
                    Label::Internal(_) | Label::Epsilon => {}
                }
                if matched {
                    break;
                }
            }
            if matched {
                continue;
            }

            // (c) Header rules over the block chain, LIFO per block.
            match state.block().header_decision(sym, &self.registry) {
                Some(HeaderDecision::Forward) => {
                    candidates.push(id);
                    forward = forward || sym.should_forward();
                }
                Some(HeaderDecision::Drop) => candidates.push(id),
                Some(HeaderDecision::Fail) => {
                    fail = Some("event matched a disallow rule");
                }
                None => {}
            }
        }

        if let Some(reason) = fail {
            self.enter_error(reason);
            return Some(self.result(false, Vec::new()));
        }
        if candidates.is_empty() {
            return None;
        }

        self.commit(candidates);
        for (event, port) in respond {
            self.effector.trigger(event, port);
        }

        let forward = forward && sym.should_forward();
        self.tracer.committed(&self.current_states(), forward);
        Some(self.result(forward, release))
    }

    /// Replace the current set with the closure of `seeds`, then reset
    /// blocks discontinued by the switch.
    fn commit(&mut self, seeds: Vec<StateId>) {
        let prev = std::mem::take(&mut self.current);
        self.current = self.close(seeds);
        self.reset_discontinued(&prev);
    }

    /// Epsilon closure plus loop-terminal resolution and entry-function
    /// cascade. Pure-epsilon states are expanded, not retained.
    fn close(&self, seeds: Vec<StateId>) -> IndexSet<StateId> {
        let mut out = IndexSet::new();
        let mut visited: HashSet<StateId> = HashSet::new();
        let mut stack = seeds;
        stack.reverse();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let state = self.automaton.state(id);

            if state.flags().error {
                out.insert(id);
                continue;
            }

            // Entering a loop start opens its blocks and runs entry
            // functions, outermost first, once per iteration.
            if state.is_loop_start() {
                for block in state.entry_blocks() {
                    block.open();
                    block.maybe_run_entry();
                }
            }

            // Loop-end selection: follow the loop edge while iterations
            // remain, the exit edge once a repeat is exhausted; stay put
            // while block-scoped expectations are pending.
            if state.is_loop_end() && !state.block().has_pending() {
                let block = state.block();
                block.iteration_complete();
                if state.flags().kleene_end || block.has_remaining() {
                    if let Some(loop_to) = state.loop_to() {
                        stack.push(loop_to);
                    }
                } else {
                    block.close();
                    if let Some(exit_to) = state.exit_to() {
                        stack.push(exit_to);
                    }
                }
                continue;
            }

            for t in state.transitions() {
                if t.label.is_epsilon() {
                    stack.push(t.target);
                }
            }

            if !state.is_epsilon_only() {
                out.insert(id);
            }
        }

        out
    }

    /// Reset blocks that had a state in the previous set but neither a
    /// state nor a descendant state in the new set.
    fn reset_discontinued(&mut self, prev: &IndexSet<StateId>) {
        let mut seen: HashSet<u32> = HashSet::new();
        for &id in prev {
            let block = Arc::clone(self.automaton.state(id).block());
            if !seen.insert(block.id()) {
                continue;
            }
            let alive = self
                .current
                .iter()
                .any(|&cur| self.automaton.state(cur).block().has_ancestor(&block));
            if alive {
                continue;
            }
            block.reset();
            // Partially matched labels inside the discontinued scope must
            // not survive into a re-entry.
            for state in self.automaton.states() {
                if Block::same(state.block(), &block) {
                    for t in state.transitions() {
                        t.label.reset_runtime_state();
                    }
                }
            }
        }
    }

    fn enter_error(&mut self, reason: &str) {
        tracing::debug!(reason, "simulator entered the error state");
        self.tracer.errored(reason);
        self.current.clear();
        self.current.insert(ERROR_STATE);
    }
}
