//! Ports, directions and the event symbol.
//!
//! An `EventSymbol` is the pipe between the event source and the
//! simulator: the immutable (event, port, direction) triple plus the
//! mutable forward decision attached while the symbol is processed.

use std::fmt;
use std::sync::Arc;

use crate::event::{Event, EventKind, Fault, SharedEvent};

/// Identifier of a port on the CUT boundary.
///
/// Allocated by the embedding framework; vigil only compares them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PortId(u32);

impl PortId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port{}", self.0)
    }
}

/// Direction of an event relative to the CUT.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Direction {
    /// Toward the CUT.
    In,
    /// Away from the CUT.
    Out,
}

impl Direction {
    pub fn flip(self) -> Self {
        match self {
            Self::In => Self::Out,
            Self::Out => Self::In,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::In => "in",
            Self::Out => "out",
        })
    }
}

/// Construction-time sentinel event; never delivered.
#[derive(Debug, PartialEq)]
struct EpsilonMarker;

/// An intercepted event with its port, direction and forward decision.
///
/// The forward flag defaults to true and is cleared when a label consumes
/// the event internally (answer-request). The optional forward target
/// overrides the default destination for responses rerouted back through
/// the proxy.
#[derive(Clone, Debug)]
pub struct EventSymbol {
    event: SharedEvent,
    port: PortId,
    direction: Direction,
    forward: bool,
    forward_to: Option<PortId>,
    request: bool,
}

impl EventSymbol {
    pub fn new(event: SharedEvent, port: PortId, direction: Direction) -> Self {
        Self {
            event,
            port,
            direction,
            forward: true,
            forward_to: None,
            request: false,
        }
    }

    pub fn from_event<E: Event>(event: E, port: PortId, direction: Direction) -> Self {
        Self::new(Arc::new(event), port, direction)
    }

    /// A fault symbol on the CUT's control port.
    pub fn fault(fault: Fault, control_port: PortId) -> Self {
        Self::new(Arc::new(fault), control_port, Direction::Out)
    }

    /// The construction-time epsilon sentinel.
    pub fn epsilon() -> Self {
        Self::from_event(EpsilonMarker, PortId::new(u32::MAX), Direction::In)
    }

    pub fn is_epsilon(&self) -> bool {
        self.event.as_any().is::<EpsilonMarker>()
    }

    pub fn event(&self) -> &dyn Event {
        self.event.as_ref()
    }

    pub fn shared_event(&self) -> SharedEvent {
        Arc::clone(&self.event)
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    pub fn port(&self) -> PortId {
        self.port
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn should_forward(&self) -> bool {
        self.forward
    }

    /// Mark the event as consumed internally; it will not be delivered.
    pub fn suppress_forward(&mut self) {
        self.forward = false;
    }

    pub fn forward_to(&self) -> Option<PortId> {
        self.forward_to
    }

    pub fn set_forward_to(&mut self, target: PortId) {
        self.forward_to = Some(target);
    }

    pub fn is_request(&self) -> bool {
        self.request
    }

    /// Flag set by the framework for incoming direct-requests.
    pub fn mark_request(&mut self) {
        self.request = true;
    }

    pub fn as_fault(&self) -> Option<&Fault> {
        self.event.as_any().downcast_ref()
    }

    pub fn is_fault(&self) -> bool {
        self.as_fault().is_some()
    }
}

impl fmt::Display for EventSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.event.describe(),
            self.direction,
            self.port
        )
    }
}
