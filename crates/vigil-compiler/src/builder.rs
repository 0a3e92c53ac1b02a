//! The test specification builder.
//!
//! Statements are validated against a mode stack (`Header`, `Body`,
//! `Conditional`, `Unordered`, `AnswerRequest`); each opening statement
//! pushes, each `end` pops. The builder is consuming (`self ->
//! Result<Self, _>`), so once `construct` runs there is no builder left to
//! misuse.
//!
//! Entry functions and predicates run on the runtime's machine-lock
//! thread; keep them side-effect-bounded so the simulator is not stalled.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexSet;

use vigil_automaton::{
    AnswerBatch, AnswerRequestLabel, EntryFn, EventLabel, FaultLabel, HeaderRule, InternalLabel,
    IterationCount, Label, PredicateLabel, UnorderedLabel,
};
use vigil_core::{
    DefaultAction, Direction, Event, EventFuture, Fault, KindRegistry, PortId, SharedEvent,
};

use crate::construct;
use crate::error::{BuildError, Mode};
use crate::spec::CompiledSpec;

/// Default inactivity timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// One statement's worth of compiled structure.
pub(crate) enum Node {
    Single { label: Label, forward: bool },
    Loop(LoopNode),
    Conditional { branches: Vec<Vec<Node>> },
}

pub(crate) struct LoopNode {
    pub(crate) count: IterationCount,
    pub(crate) entry: Option<EntryFn>,
    pub(crate) headers: Vec<HeaderRule>,
    pub(crate) expected: Vec<Label>,
    pub(crate) body: Vec<Node>,
}

enum Frame {
    Root {
        headers: Vec<HeaderRule>,
        expected: Vec<Label>,
        body: Vec<Node>,
        in_header: bool,
    },
    Loop {
        node: LoopNode,
        in_header: bool,
    },
    Conditional {
        done: Vec<Vec<Node>>,
        current: Vec<Node>,
    },
    Unordered {
        labels: Vec<Label>,
        forward_immediately: bool,
    },
    Batch {
        members: Vec<AnswerRequestLabel>,
    },
}

/// Builds a test specification statement by statement.
pub struct SpecBuilder {
    frames: Vec<Frame>,
    registry: KindRegistry,
    timeout: Duration,
    /// Tokens of futures already bound by an answer-request, in binding
    /// order.
    bound_futures: IndexSet<usize>,
}

impl Default for SpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SpecBuilder {
    /// A fresh builder, positioned in the initial header of the root block.
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::Root {
                headers: Vec::new(),
                expected: Vec::new(),
                body: Vec::new(),
                in_header: true,
            }],
            registry: KindRegistry::new(),
            timeout: DEFAULT_TIMEOUT,
            bound_futures: IndexSet::new(),
        }
    }

    fn mode(&self) -> Mode {
        match self.frames.last() {
            Some(Frame::Root { in_header, .. }) | Some(Frame::Loop { in_header, .. }) => {
                if *in_header {
                    Mode::Header
                } else {
                    Mode::Body
                }
            }
            Some(Frame::Conditional { .. }) => Mode::Conditional,
            Some(Frame::Unordered { .. }) => Mode::Unordered,
            Some(Frame::Batch { .. }) => Mode::AnswerRequest,
            None => Mode::Body,
        }
    }

    fn invalid(&self, statement: &'static str) -> BuildError {
        BuildError::InvalidMode {
            statement,
            mode: self.mode(),
        }
    }

    fn in_initial_header(&self) -> bool {
        self.frames.len() == 1
            && matches!(self.frames.last(), Some(Frame::Root { in_header: true, .. }))
    }

    fn push_node(&mut self, node: Node) {
        match self.frames.last_mut() {
            Some(Frame::Root { body, .. }) => body.push(node),
            Some(Frame::Loop { node: owner, .. }) => owner.body.push(node),
            Some(Frame::Conditional { current, .. }) => current.push(node),
            _ => unreachable!("no body container in current mode"),
        }
    }

    fn require_body(&self, statement: &'static str) -> Result<(), BuildError> {
        match self.mode() {
            Mode::Body | Mode::Conditional => Ok(()),
            _ => Err(self.invalid(statement)),
        }
    }

    // ------------------------------------------------------------------
    // Initial header configuration
    // ------------------------------------------------------------------

    /// Override structural equality for events of type `E`.
    pub fn set_comparator<E: Event>(
        mut self,
        cmp: impl Fn(&E, &E) -> bool + Send + Sync + 'static,
    ) -> Result<Self, BuildError> {
        if !self.in_initial_header() {
            return Err(self.invalid("set_comparator"));
        }
        self.registry.set_comparator::<E>(cmp);
        Ok(self)
    }

    /// Default action for unmatched events of type `E`.
    pub fn set_default_action<E: Event>(
        mut self,
        action: DefaultAction,
    ) -> Result<Self, BuildError> {
        if !self.in_initial_header() {
            return Err(self.invalid("set_default_action"));
        }
        self.registry.set_default_action::<E>(action);
        Ok(self)
    }

    /// Default action for unmatched events of any kind.
    pub fn set_default_action_any(mut self, action: DefaultAction) -> Result<Self, BuildError> {
        if !self.in_initial_header() {
            return Err(self.invalid("set_default_action_any"));
        }
        self.registry.set_root_default_action(action);
        Ok(self)
    }

    /// Declare `Child` a subtype of `Parent` for default-action and
    /// predicate-kind lookup.
    pub fn declare_subtype<Child: Event, Parent: Event>(mut self) -> Result<Self, BuildError> {
        if !self.in_initial_header() {
            return Err(self.invalid("declare_subtype"));
        }
        self.registry.declare_subtype::<Child, Parent>();
        Ok(self)
    }

    /// Inactivity watchdog interval.
    pub fn set_timeout(mut self, timeout: Duration) -> Result<Self, BuildError> {
        if !self.in_initial_header() {
            return Err(self.invalid("set_timeout"));
        }
        self.timeout = timeout;
        Ok(self)
    }

    // ------------------------------------------------------------------
    // Header rules
    // ------------------------------------------------------------------

    fn push_header(&mut self, rule: HeaderRule, statement: &'static str) -> Result<(), BuildError> {
        if self.mode() != Mode::Header {
            return Err(self.invalid(statement));
        }
        match self.frames.last_mut() {
            Some(Frame::Root { headers, .. }) => headers.push(rule),
            Some(Frame::Loop { node, .. }) => node.headers.push(rule),
            _ => unreachable!("header mode implies a header frame"),
        }
        Ok(())
    }

    /// Whitelist: forward matching events without consuming expectations.
    pub fn allow<E: Event>(
        mut self,
        event: E,
        port: PortId,
        direction: Direction,
    ) -> Result<Self, BuildError> {
        let label = Label::Event(EventLabel::new(Arc::new(event), port, direction));
        self.push_header(HeaderRule::Allow(label), "allow")?;
        Ok(self)
    }

    pub fn allow_where<E: Event>(
        mut self,
        port: PortId,
        direction: Direction,
        predicate: impl Fn(&E) -> bool + Send + Sync + 'static,
    ) -> Result<Self, BuildError> {
        let label = Label::Predicate(PredicateLabel::of::<E>(port, direction, predicate));
        self.push_header(HeaderRule::Allow(label), "allow_where")?;
        Ok(self)
    }

    /// Swallow matching events silently.
    pub fn drop_event<E: Event>(
        mut self,
        event: E,
        port: PortId,
        direction: Direction,
    ) -> Result<Self, BuildError> {
        let label = Label::Event(EventLabel::new(Arc::new(event), port, direction));
        self.push_header(HeaderRule::Drop(label), "drop_event")?;
        Ok(self)
    }

    pub fn drop_where<E: Event>(
        mut self,
        port: PortId,
        direction: Direction,
        predicate: impl Fn(&E) -> bool + Send + Sync + 'static,
    ) -> Result<Self, BuildError> {
        let label = Label::Predicate(PredicateLabel::of::<E>(port, direction, predicate));
        self.push_header(HeaderRule::Drop(label), "drop_where")?;
        Ok(self)
    }

    /// Blacklist: fail the test on matching events.
    pub fn disallow<E: Event>(
        mut self,
        event: E,
        port: PortId,
        direction: Direction,
    ) -> Result<Self, BuildError> {
        let label = Label::Event(EventLabel::new(Arc::new(event), port, direction));
        self.push_header(HeaderRule::Disallow(label), "disallow")?;
        Ok(self)
    }

    pub fn disallow_where<E: Event>(
        mut self,
        port: PortId,
        direction: Direction,
        predicate: impl Fn(&E) -> bool + Send + Sync + 'static,
    ) -> Result<Self, BuildError> {
        let label = Label::Predicate(PredicateLabel::of::<E>(port, direction, predicate));
        self.push_header(HeaderRule::Disallow(label), "disallow_where")?;
        Ok(self)
    }

    /// Block-scoped expectation: matched in any position within the
    /// current block's iterations.
    pub fn block_expect<E: Event>(
        mut self,
        event: E,
        port: PortId,
        direction: Direction,
    ) -> Result<Self, BuildError> {
        if self.mode() != Mode::Header {
            return Err(self.invalid("block_expect"));
        }
        let label = Label::Event(EventLabel::new(Arc::new(event), port, direction));
        match self.frames.last_mut() {
            Some(Frame::Root { expected, .. }) => expected.push(label),
            Some(Frame::Loop { node, .. }) => node.expected.push(label),
            _ => unreachable!("header mode implies a header frame"),
        }
        Ok(self)
    }

    /// Leave the header, entering the block body.
    pub fn body(mut self) -> Result<Self, BuildError> {
        if self.mode() != Mode::Header {
            return Err(self.invalid("body"));
        }
        match self.frames.last_mut() {
            Some(Frame::Root { in_header, .. }) | Some(Frame::Loop { in_header, .. }) => {
                *in_header = false;
            }
            _ => unreachable!("header mode implies a header frame"),
        }
        Ok(self)
    }

    // ------------------------------------------------------------------
    // Expectations
    // ------------------------------------------------------------------

    fn push_expect(&mut self, label: Label, statement: &'static str) -> Result<(), BuildError> {
        match self.mode() {
            Mode::Body | Mode::Conditional => {
                self.push_node(Node::Single {
                    label,
                    forward: true,
                });
                Ok(())
            }
            Mode::Unordered => {
                match self.frames.last_mut() {
                    Some(Frame::Unordered { labels, .. }) => labels.push(label),
                    _ => unreachable!("unordered mode implies an unordered frame"),
                }
                Ok(())
            }
            _ => Err(self.invalid(statement)),
        }
    }

    /// Expect a concrete event on (port, direction).
    pub fn expect<E: Event>(
        mut self,
        event: E,
        port: PortId,
        direction: Direction,
    ) -> Result<Self, BuildError> {
        let label = Label::Event(EventLabel::new(Arc::new(event), port, direction));
        self.push_expect(label, "expect")?;
        Ok(self)
    }

    /// Expect any event of type `E` on (port, direction) satisfying the
    /// predicate.
    pub fn expect_where<E: Event>(
        mut self,
        port: PortId,
        direction: Direction,
        predicate: impl Fn(&E) -> bool + Send + Sync + 'static,
    ) -> Result<Self, BuildError> {
        let label = Label::Predicate(PredicateLabel::of::<E>(port, direction, predicate));
        self.push_expect(label, "expect_where")?;
        Ok(self)
    }

    /// Expect a fault whose payload is of type `E`.
    pub fn expect_fault<E: 'static>(mut self) -> Result<Self, BuildError> {
        self.require_body("expect_fault")?;
        self.push_node(Node::Single {
            label: Label::Fault(FaultLabel::of_kind::<E>()),
            forward: false,
        });
        Ok(self)
    }

    /// Expect a fault satisfying the predicate.
    pub fn expect_fault_where(
        mut self,
        predicate: impl Fn(&Fault) -> bool + Send + Sync + 'static,
    ) -> Result<Self, BuildError> {
        self.require_body("expect_fault_where")?;
        self.push_node(Node::Single {
            label: Label::Fault(FaultLabel::matching(predicate)),
            forward: false,
        });
        Ok(self)
    }

    // ------------------------------------------------------------------
    // Internal actions
    // ------------------------------------------------------------------

    /// Inject an event into the environment through the given port.
    pub fn trigger<E: Event>(mut self, event: E, port: PortId) -> Result<Self, BuildError> {
        self.require_body("trigger")?;
        self.push_node(Node::Single {
            label: Label::Internal(InternalLabel::trigger(Arc::new(event), port)),
            forward: false,
        });
        Ok(self)
    }

    /// Inject a lazily supplied event.
    pub fn trigger_with(
        mut self,
        supplier: impl Fn() -> SharedEvent + Send + Sync + 'static,
        port: PortId,
    ) -> Result<Self, BuildError> {
        self.require_body("trigger_with")?;
        self.push_node(Node::Single {
            label: Label::Internal(InternalLabel::trigger_with(Arc::new(supplier), port)),
            forward: false,
        });
        Ok(self)
    }

    /// Inject the event a previous answer-request captured into `future`.
    pub fn trigger_future(
        mut self,
        future: &EventFuture,
        port: PortId,
    ) -> Result<Self, BuildError> {
        self.require_body("trigger_future")?;
        if !self.bound_futures.contains(&future.token()) {
            return Err(BuildError::FutureNotBound);
        }
        self.push_node(Node::Single {
            label: Label::Internal(InternalLabel::trigger_future(future.clone(), port)),
            forward: false,
        });
        Ok(self)
    }

    /// Evaluate a predicate against a snapshot of the CUT once its work
    /// queue has drained.
    pub fn inspect<S: Any>(
        mut self,
        predicate: impl Fn(&S) -> bool + Send + Sync + 'static,
    ) -> Result<Self, BuildError> {
        self.require_body("inspect")?;
        self.push_node(Node::Single {
            label: Label::Internal(InternalLabel::inspect::<S>(predicate)),
            forward: false,
        });
        Ok(self)
    }

    // ------------------------------------------------------------------
    // Composite statements
    // ------------------------------------------------------------------

    fn open_loop(
        &mut self,
        count: IterationCount,
        entry: Option<EntryFn>,
        statement: &'static str,
    ) -> Result<(), BuildError> {
        self.require_body(statement)?;
        self.frames.push(Frame::Loop {
            node: LoopNode {
                count,
                entry,
                headers: Vec::new(),
                expected: Vec::new(),
                body: Vec::new(),
            },
            in_header: true,
        });
        Ok(())
    }

    /// Repeat the block body exactly `count` times.
    pub fn repeat(mut self, count: u32) -> Result<Self, BuildError> {
        if count == 0 {
            return Err(BuildError::NonPositiveCount);
        }
        self.open_loop(IterationCount::Times(count), None, "repeat")?;
        Ok(self)
    }

    /// Repeat with an entry function run at the top of every iteration.
    pub fn repeat_with(
        mut self,
        count: u32,
        entry: impl Fn() + Send + Sync + 'static,
    ) -> Result<Self, BuildError> {
        if count == 0 {
            return Err(BuildError::NonPositiveCount);
        }
        let entry: EntryFn = Arc::new(entry);
        self.open_loop(IterationCount::Times(count), Some(entry), "repeat_with")?;
        Ok(self)
    }

    /// Kleene closure: repeat the block body zero or more times.
    pub fn star(mut self) -> Result<Self, BuildError> {
        self.open_loop(IterationCount::Star, None, "star")?;
        Ok(self)
    }

    pub fn star_with(
        mut self,
        entry: impl Fn() + Send + Sync + 'static,
    ) -> Result<Self, BuildError> {
        let entry: EntryFn = Arc::new(entry);
        self.open_loop(IterationCount::Star, Some(entry), "star_with")?;
        Ok(self)
    }

    /// Open a conditional; statements up to `or`/`end` form the first
    /// branch.
    pub fn either(mut self) -> Result<Self, BuildError> {
        self.require_body("either")?;
        self.frames.push(Frame::Conditional {
            done: Vec::new(),
            current: Vec::new(),
        });
        Ok(self)
    }

    /// Close the current conditional branch and open the next.
    pub fn or(mut self) -> Result<Self, BuildError> {
        if self.mode() != Mode::Conditional {
            return Err(self.invalid("or"));
        }
        match self.frames.last_mut() {
            Some(Frame::Conditional { done, current }) => {
                if current.is_empty() {
                    return Err(BuildError::EmptyBranch);
                }
                done.push(std::mem::take(current));
            }
            _ => unreachable!("conditional mode implies a conditional frame"),
        }
        Ok(self)
    }

    /// Open an unordered set; matched events are withheld until every
    /// inner label has matched.
    pub fn unordered(mut self) -> Result<Self, BuildError> {
        self.require_body("unordered")?;
        self.frames.push(Frame::Unordered {
            labels: Vec::new(),
            forward_immediately: false,
        });
        Ok(self)
    }

    /// Open an unordered set that forwards each event as it matches.
    pub fn unordered_immediate(mut self) -> Result<Self, BuildError> {
        self.require_body("unordered_immediate")?;
        self.frames.push(Frame::Unordered {
            labels: Vec::new(),
            forward_immediately: true,
        });
        Ok(self)
    }

    /// Open an answer-request batch; responses fire in declaration order
    /// once the last request has matched.
    pub fn answer_requests(mut self) -> Result<Self, BuildError> {
        self.require_body("answer_requests")?;
        self.frames.push(Frame::Batch {
            members: Vec::new(),
        });
        Ok(self)
    }

    /// Answer requests of type `Req` with a mapped response.
    ///
    /// In body position the response triggers immediately; inside
    /// `answer_requests` it joins the batch; inside `unordered` it follows
    /// the unordered set's forwarding policy.
    pub fn answer_request<Req: Event>(
        mut self,
        request_port: PortId,
        response_port: PortId,
        map: impl Fn(&Req) -> Option<SharedEvent> + Send + Sync + 'static,
    ) -> Result<Self, BuildError> {
        let label = AnswerRequestLabel::mapper::<Req>(request_port, response_port, map);
        match self.mode() {
            Mode::Body | Mode::Conditional => {
                self.push_node(Node::Single {
                    label: Label::AnswerRequest(label),
                    forward: false,
                });
            }
            Mode::Unordered => match self.frames.last_mut() {
                Some(Frame::Unordered { labels, .. }) => {
                    labels.push(Label::AnswerRequest(label));
                }
                _ => unreachable!("unordered mode implies an unordered frame"),
            },
            Mode::AnswerRequest => match self.frames.last_mut() {
                Some(Frame::Batch { members }) => members.push(label),
                _ => unreachable!("answer-request mode implies a batch frame"),
            },
            _ => return Err(self.invalid("answer_request")),
        }
        Ok(self)
    }

    /// Capture requests of type `Req` into `future` for a later
    /// `trigger_future`.
    pub fn answer_request_future<Req: Event>(
        mut self,
        request_port: PortId,
        future: &EventFuture,
    ) -> Result<Self, BuildError> {
        if !self.bound_futures.insert(future.token()) {
            return Err(BuildError::FutureReuse);
        }
        let label = AnswerRequestLabel::future::<Req>(request_port, future.clone());
        match self.mode() {
            Mode::Body | Mode::Conditional => {
                self.push_node(Node::Single {
                    label: Label::AnswerRequest(label),
                    forward: false,
                });
            }
            Mode::Unordered => match self.frames.last_mut() {
                Some(Frame::Unordered { labels, .. }) => {
                    labels.push(Label::AnswerRequest(label));
                }
                _ => unreachable!("unordered mode implies an unordered frame"),
            },
            _ => return Err(self.invalid("answer_request_future")),
        }
        Ok(self)
    }

    /// Close the innermost open construct.
    pub fn end(mut self) -> Result<Self, BuildError> {
        match self.frames.pop() {
            None | Some(Frame::Root { .. }) => Err(BuildError::UnbalancedBlock),
            Some(Frame::Loop { node, in_header }) => {
                if in_header {
                    return Err(BuildError::InvalidMode {
                        statement: "end",
                        mode: Mode::Header,
                    });
                }
                if node.body.is_empty() {
                    return Err(BuildError::EmptyBlock);
                }
                self.push_node(Node::Loop(node));
                Ok(self)
            }
            Some(Frame::Conditional { mut done, current }) => {
                if current.is_empty() {
                    return Err(BuildError::EmptyBranch);
                }
                done.push(current);
                self.push_node(Node::Conditional { branches: done });
                Ok(self)
            }
            Some(Frame::Unordered {
                labels,
                forward_immediately,
            }) => {
                // An empty unordered set is a no-op.
                if !labels.is_empty() {
                    self.push_node(Node::Single {
                        label: Label::Unordered(UnorderedLabel::new(labels, forward_immediately)),
                        forward: false,
                    });
                }
                Ok(self)
            }
            Some(Frame::Batch { members }) => {
                if members.is_empty() {
                    return Err(BuildError::NoAnswerRequests);
                }
                let batch = AnswerBatch::with_len(members.len());
                for (slot, member) in members.into_iter().enumerate() {
                    let label = member.with_batch(batch.clone(), slot);
                    self.push_node(Node::Single {
                        label: Label::AnswerRequest(label),
                        forward: false,
                    });
                }
                Ok(self)
            }
        }
    }

    /// Close the root block and compile the specification.
    ///
    /// The builder is consumed; once constructed there is no builder left
    /// to re-invoke.
    pub fn construct(mut self) -> Result<CompiledSpec, BuildError> {
        if self.frames.len() != 1 {
            return Err(BuildError::UnbalancedBlock);
        }
        match self.frames.pop() {
            Some(Frame::Root {
                headers,
                expected,
                body,
                in_header,
            }) => {
                if in_header {
                    return Err(BuildError::InvalidMode {
                        statement: "construct",
                        mode: Mode::Header,
                    });
                }
                construct::lower(headers, expected, body, self.registry, self.timeout)
            }
            _ => Err(BuildError::UnbalancedBlock),
        }
    }
}

impl std::fmt::Debug for SpecBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecBuilder")
            .field("depth", &self.frames.len())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
