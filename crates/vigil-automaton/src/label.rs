//! Match predicates on event symbols and deferred internal actions.
//!
//! A label is a tagged variant rather than a trait object; per-kind match
//! logic is pure. The multi-label kinds (unordered, answer-request) hold
//! interior runtime state behind a mutex, serialized by the runtime's
//! outer machine lock.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};

use vigil_core::{
    Direction, Event, EventFuture, EventKind, EventSymbol, Fault, KindRegistry, PortId,
    SharedEvent,
};

pub type EventPredicate = Arc<dyn Fn(&dyn Event) -> bool + Send + Sync>;
pub type FaultPredicate = Arc<dyn Fn(&Fault) -> bool + Send + Sync>;
pub type EventMapper = Arc<dyn Fn(&dyn Event) -> Option<SharedEvent> + Send + Sync>;
pub type EventSupplier = Arc<dyn Fn() -> SharedEvent + Send + Sync>;
pub type SnapshotPredicate = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> bool + Send + Sync>;

/// Match predicate on an event symbol, or a deferred internal action.
#[derive(Clone)]
pub enum Label {
    Event(EventLabel),
    Predicate(PredicateLabel),
    Fault(FaultLabel),
    Unordered(UnorderedLabel),
    AnswerRequest(AnswerRequestLabel),
    Internal(InternalLabel),
    /// Construction-time closure edges only; never matched by real symbols.
    Epsilon,
}

impl Label {
    pub fn is_epsilon(&self) -> bool {
        matches!(self, Label::Epsilon)
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Label::Internal(_))
    }

    /// Pure match for the single-label kinds. Unordered and answer-request
    /// labels have stateful entry points and always return false here.
    pub fn matches_observed(&self, sym: &EventSymbol, registry: &KindRegistry) -> bool {
        match self {
            Label::Event(l) => l.matches(sym, registry),
            Label::Predicate(l) => l.matches(sym, registry),
            Label::Fault(l) => l.matches(sym),
            _ => false,
        }
    }

    /// Clear any interior runtime state (partially matched unordered sets,
    /// batch buffers). Called when the owning branch is discontinued.
    pub fn reset_runtime_state(&self) {
        match self {
            Label::Unordered(l) => l.reset(),
            Label::AnswerRequest(l) => l.reset(),
            _ => {}
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Event(l) => write!(
                f,
                "expect {} {} {}",
                l.expected.describe(),
                l.direction,
                l.port
            ),
            Label::Predicate(l) => match l.kind {
                Some(kind) => write!(f, "expect <{} predicate> {} {}", kind, l.direction, l.port),
                None => write!(f, "expect <predicate> {} {}", l.direction, l.port),
            },
            Label::Fault(l) => match &l.matcher {
                FaultMatcher::Kind(kind) => write!(f, "fault {kind}"),
                FaultMatcher::Predicate(_) => f.write_str("fault <predicate>"),
            },
            Label::Unordered(l) => write!(
                f,
                "unordered({}{})",
                l.inner.len(),
                if l.forward_immediately { ", immediate" } else { "" }
            ),
            Label::AnswerRequest(l) => write!(f, "answer {}", l.port),
            Label::Internal(l) => fmt::Display::fmt(l, f),
            Label::Epsilon => f.write_str("eps"),
        }
    }
}

/// Event-equality label: matches on (port, direction, concrete event).
#[derive(Clone)]
pub struct EventLabel {
    pub(crate) expected: SharedEvent,
    pub(crate) port: PortId,
    pub(crate) direction: Direction,
}

impl EventLabel {
    pub fn new(expected: SharedEvent, port: PortId, direction: Direction) -> Self {
        Self {
            expected,
            port,
            direction,
        }
    }

    pub fn matches(&self, sym: &EventSymbol, registry: &KindRegistry) -> bool {
        sym.port() == self.port
            && sym.direction() == self.direction
            && registry.events_equal(self.expected.as_ref(), sym.event())
    }
}

/// Predicate label: matches (port, direction) and a caller-supplied
/// predicate, optionally gated on a declared kind (subtypes included).
#[derive(Clone)]
pub struct PredicateLabel {
    pub(crate) port: PortId,
    pub(crate) direction: Direction,
    pub(crate) kind: Option<EventKind>,
    predicate: EventPredicate,
}

impl PredicateLabel {
    /// Typed predicate on a concrete event type.
    pub fn of<E: Event>(
        port: PortId,
        direction: Direction,
        predicate: impl Fn(&E) -> bool + Send + Sync + 'static,
    ) -> Self {
        let wrapped: EventPredicate = Arc::new(move |event: &dyn Event| {
            event
                .as_any()
                .downcast_ref::<E>()
                .is_some_and(|event| predicate(event))
        });
        Self {
            port,
            direction,
            kind: Some(EventKind::of::<E>()),
            predicate: wrapped,
        }
    }

    /// Untyped predicate over `&dyn Event`, optionally kind-gated.
    pub fn raw(
        port: PortId,
        direction: Direction,
        kind: Option<EventKind>,
        predicate: EventPredicate,
    ) -> Self {
        Self {
            port,
            direction,
            kind,
            predicate,
        }
    }

    pub fn matches(&self, sym: &EventSymbol, registry: &KindRegistry) -> bool {
        if sym.port() != self.port || sym.direction() != self.direction {
            return false;
        }
        if let Some(kind) = self.kind
            && !registry.is_kind_or_subtype(sym.kind(), kind)
        {
            return false;
        }
        (self.predicate)(sym.event())
    }
}

/// Filter applied by a fault label.
#[derive(Clone)]
pub enum FaultMatcher {
    Kind(EventKind),
    Predicate(FaultPredicate),
}

/// Matches fault events only, by payload kind or by predicate.
#[derive(Clone)]
pub struct FaultLabel {
    pub(crate) matcher: FaultMatcher,
}

impl FaultLabel {
    /// Match faults whose payload is of type `E`.
    pub fn of_kind<E: 'static>() -> Self {
        Self {
            matcher: FaultMatcher::Kind(EventKind::of::<E>()),
        }
    }

    pub fn matching(predicate: impl Fn(&Fault) -> bool + Send + Sync + 'static) -> Self {
        Self {
            matcher: FaultMatcher::Predicate(Arc::new(predicate)),
        }
    }

    pub fn matches(&self, sym: &EventSymbol) -> bool {
        let Some(fault) = sym.as_fault() else {
            return false;
        };
        match &self.matcher {
            FaultMatcher::Kind(kind) => fault.kind() == *kind,
            FaultMatcher::Predicate(predicate) => predicate(fault),
        }
    }
}

/// Outcome of an answer-request match.
pub enum AnswerOutcome {
    /// Trigger this response now.
    Respond(SharedEvent, PortId),
    /// Batch member stored; responses fire when the last member matches.
    Deferred,
    /// Batch complete: trigger responses in declaration order.
    RespondAll(Vec<(SharedEvent, PortId)>),
    /// The future captured the request.
    Bound,
    /// The future was already bound; the machine must fail.
    AlreadyBound,
}

/// Shared response buffer for an answer-request batch.
#[derive(Clone)]
pub struct AnswerBatch {
    inner: Arc<Mutex<Vec<Option<(SharedEvent, PortId)>>>>,
}

impl AnswerBatch {
    pub fn with_len(len: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(vec![None; len])),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("batch lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn store(&self, slot: usize, response: (SharedEvent, PortId)) -> Option<AnswerOutcome> {
        let mut slots = self.inner.lock().expect("batch lock poisoned");
        slots[slot] = Some(response);
        if slot + 1 == slots.len() {
            // Sequencing in the automaton guarantees earlier slots filled.
            let drained: Vec<_> = slots.iter_mut().filter_map(Option::take).collect();
            Some(AnswerOutcome::RespondAll(drained))
        } else {
            Some(AnswerOutcome::Deferred)
        }
    }

    fn clear(&self) {
        let mut slots = self.inner.lock().expect("batch lock poisoned");
        for slot in slots.iter_mut() {
            *slot = None;
        }
    }
}

/// How a matched request is answered.
#[derive(Clone)]
pub enum AnswerMode {
    /// Synthesize the response with a mapper; `batch` is None for
    /// trigger-immediately.
    Mapper {
        map: EventMapper,
        response_port: PortId,
        batch: Option<(AnswerBatch, usize)>,
    },
    /// Capture the request into a future for a later trigger.
    Future(EventFuture),
}

/// Matches an outgoing request and synthesizes (or defers) the response.
/// A matched request is never forwarded; the test supplies the reply.
#[derive(Clone)]
pub struct AnswerRequestLabel {
    pub(crate) port: PortId,
    pub(crate) request_kind: Option<EventKind>,
    pub(crate) mode: AnswerMode,
}

impl AnswerRequestLabel {
    /// Map requests of type `Req` to responses, triggered immediately.
    pub fn mapper<Req: Event>(
        port: PortId,
        response_port: PortId,
        map: impl Fn(&Req) -> Option<SharedEvent> + Send + Sync + 'static,
    ) -> Self {
        let wrapped: EventMapper = Arc::new(move |event: &dyn Event| {
            event.as_any().downcast_ref::<Req>().and_then(|req| map(req))
        });
        Self {
            port,
            request_kind: Some(EventKind::of::<Req>()),
            mode: AnswerMode::Mapper {
                map: wrapped,
                response_port,
                batch: None,
            },
        }
    }

    /// Capture requests of type `Req` into `future`.
    pub fn future<Req: Event>(port: PortId, future: EventFuture) -> Self {
        Self {
            port,
            request_kind: Some(EventKind::of::<Req>()),
            mode: AnswerMode::Future(future),
        }
    }

    /// Attach this label to a batch slot (mapper mode only).
    pub fn with_batch(mut self, batch: AnswerBatch, slot: usize) -> Self {
        if let AnswerMode::Mapper { batch: b, .. } = &mut self.mode {
            *b = Some((batch, slot));
        }
        self
    }

    pub fn bound_future(&self) -> Option<&EventFuture> {
        match &self.mode {
            AnswerMode::Future(future) => Some(future),
            AnswerMode::Mapper { .. } => None,
        }
    }

    /// Attempt to match an outgoing request. On success the symbol's
    /// forward flag is cleared.
    pub fn try_match(
        &self,
        sym: &mut EventSymbol,
        registry: &KindRegistry,
    ) -> Option<AnswerOutcome> {
        if sym.direction() != Direction::Out || sym.port() != self.port {
            return None;
        }
        if let Some(kind) = self.request_kind
            && !registry.is_kind_or_subtype(sym.kind(), kind)
        {
            return None;
        }

        match &self.mode {
            AnswerMode::Mapper {
                map,
                response_port,
                batch,
            } => {
                let response = map(sym.event())?;
                sym.suppress_forward();
                match batch {
                    Some((batch, slot)) => batch.store(*slot, (response, *response_port)),
                    None => Some(AnswerOutcome::Respond(response, *response_port)),
                }
            }
            AnswerMode::Future(future) => {
                let bound = future.set(sym.shared_event());
                sym.suppress_forward();
                if bound {
                    Some(AnswerOutcome::Bound)
                } else {
                    Some(AnswerOutcome::AlreadyBound)
                }
            }
        }
    }

    fn reset(&self) {
        if let AnswerMode::Mapper {
            batch: Some((batch, _)),
            ..
        } = &self.mode
        {
            batch.clear();
        }
    }
}

/// Outcome of feeding a symbol to an unordered label.
pub struct UnorderedOutcome {
    /// All inner labels have now matched.
    pub complete: bool,
    /// Forward the just-matched symbol now.
    pub forward_now: bool,
    /// Symbols queued earlier, released on completion in match order.
    pub release: Vec<EventSymbol>,
    /// Answer-request responses to trigger, in registration order.
    pub respond: Vec<(SharedEvent, PortId)>,
    /// An inner answer-request hit an already-bound future.
    pub errored: bool,
}

#[derive(Default)]
struct UnorderedState {
    /// Indices into `inner` still unmatched this round.
    pending: Vec<usize>,
    /// Symbols withheld until completion (forward-immediately off).
    queued: Vec<EventSymbol>,
    /// Responses withheld until completion, keyed by registration index.
    responses: Vec<(usize, (SharedEvent, PortId))>,
}

/// Inner set of single labels matched in any order.
#[derive(Clone)]
pub struct UnorderedLabel {
    inner: Arc<Vec<Label>>,
    forward_immediately: bool,
    state: Arc<Mutex<UnorderedState>>,
}

impl UnorderedLabel {
    pub fn new(inner: Vec<Label>, forward_immediately: bool) -> Self {
        let pending = (0..inner.len()).collect();
        Self {
            inner: Arc::new(inner),
            forward_immediately,
            state: Arc::new(Mutex::new(UnorderedState {
                pending,
                queued: Vec::new(),
                responses: Vec::new(),
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn forward_immediately(&self) -> bool {
        self.forward_immediately
    }

    /// Attempt to match one pending inner label.
    pub fn try_match(
        &self,
        sym: &mut EventSymbol,
        registry: &KindRegistry,
    ) -> Option<UnorderedOutcome> {
        let mut state = self.state.lock().expect("unordered lock poisoned");

        let mut matched: Option<(usize, usize)> = None;
        let mut answer: Option<AnswerOutcome> = None;
        for (pos, &idx) in state.pending.iter().enumerate() {
            match &self.inner[idx] {
                Label::AnswerRequest(label) => {
                    if let Some(outcome) = label.try_match(sym, registry) {
                        answer = Some(outcome);
                        matched = Some((pos, idx));
                        break;
                    }
                }
                label => {
                    if label.matches_observed(sym, registry) {
                        matched = Some((pos, idx));
                        break;
                    }
                }
            }
        }

        let (pos, idx) = matched?;
        state.pending.remove(pos);

        let mut outcome = UnorderedOutcome {
            complete: false,
            forward_now: false,
            release: Vec::new(),
            respond: Vec::new(),
            errored: false,
        };

        match answer {
            Some(AnswerOutcome::Respond(response, port)) => {
                if self.forward_immediately {
                    outcome.respond.push((response, port));
                } else {
                    state.responses.push((idx, (response, port)));
                }
            }
            Some(AnswerOutcome::Bound) => {}
            Some(AnswerOutcome::AlreadyBound) => {
                outcome.errored = true;
            }
            // Batches are not nested inside unordered sets; the builder
            // only admits immediate mappers and futures here.
            Some(AnswerOutcome::Deferred | AnswerOutcome::RespondAll(_)) => {}
            None => {
                // Ordinary event label.
                if self.forward_immediately {
                    outcome.forward_now = sym.should_forward();
                } else {
                    state.queued.push(sym.clone());
                    sym.suppress_forward();
                }
            }
        }

        if state.pending.is_empty() {
            outcome.complete = true;
            outcome.release = std::mem::take(&mut state.queued);
            let mut responses = std::mem::take(&mut state.responses);
            responses.sort_by_key(|(idx, _)| *idx);
            outcome
                .respond
                .extend(responses.into_iter().map(|(_, r)| r));
            // Re-arm for the next loop iteration.
            state.pending = (0..self.inner.len()).collect();
        }

        Some(outcome)
    }

    /// True once every inner label of the current round has matched.
    pub fn has_partial_match(&self) -> bool {
        let state = self.state.lock().expect("unordered lock poisoned");
        state.pending.len() < self.inner.len()
    }

    fn reset(&self) {
        let mut state = self.state.lock().expect("unordered lock poisoned");
        state.pending = (0..self.inner.len()).collect();
        state.queued.clear();
        state.responses.clear();
        for label in self.inner.iter() {
            label.reset_runtime_state();
        }
    }
}

/// Deferred side effect: trigger an event or inspect the CUT.
#[derive(Clone)]
pub enum InternalLabel {
    Trigger {
        source: TriggerSource,
        port: PortId,
    },
    Inspect {
        predicate: SnapshotPredicate,
        subject: &'static str,
    },
}

/// Where a triggered event comes from.
#[derive(Clone)]
pub enum TriggerSource {
    Event(SharedEvent),
    Supplier(EventSupplier),
    Future(EventFuture),
}

impl InternalLabel {
    pub fn trigger(event: SharedEvent, port: PortId) -> Self {
        Self::Trigger {
            source: TriggerSource::Event(event),
            port,
        }
    }

    pub fn trigger_with(supplier: EventSupplier, port: PortId) -> Self {
        Self::Trigger {
            source: TriggerSource::Supplier(supplier),
            port,
        }
    }

    pub fn trigger_future(future: EventFuture, port: PortId) -> Self {
        Self::Trigger {
            source: TriggerSource::Future(future),
            port,
        }
    }

    /// Typed inspect predicate over the CUT snapshot.
    pub fn inspect<S: Any>(predicate: impl Fn(&S) -> bool + Send + Sync + 'static) -> Self {
        let wrapped: SnapshotPredicate = Arc::new(move |snapshot: &(dyn Any + Send + Sync)| {
            snapshot
                .downcast_ref::<S>()
                .is_some_and(|snapshot| predicate(snapshot))
        });
        Self::Inspect {
            predicate: wrapped,
            subject: std::any::type_name::<S>(),
        }
    }
}

impl fmt::Display for InternalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trigger { source, port } => match source {
                TriggerSource::Event(event) => {
                    write!(f, "trigger {} -> {}", event.describe(), port)
                }
                TriggerSource::Supplier(_) => write!(f, "trigger <lazy> -> {port}"),
                TriggerSource::Future(_) => write!(f, "trigger <future> -> {port}"),
            },
            Self::Inspect { subject, .. } => {
                let short = subject.rsplit("::").next().unwrap_or(subject);
                write!(f, "inspect {short}")
            }
        }
    }
}
