//! The two narrow interfaces to the embedding framework.
//!
//! The framework delivers intercepted events by calling
//! [`crate::Controller::on_event`]; these traits cover the opposite
//! direction: forwarding decisions back out, and effects the test injects
//! into the environment.

use std::any::Any;
use std::sync::Arc;

use vigil_core::{EventSymbol, PortId, SharedEvent};

/// Outbound side of the event stream: the framework delivers the event to
/// its real recipients once the simulator decides to forward it.
pub trait EventSource: Send + Sync {
    /// Deliver the event to its default destination, or to the symbol's
    /// forward target when one is set.
    fn forward(&self, symbol: &EventSymbol);
}

/// Executes triggers and inspections against the environment.
pub trait Effector: Send + Sync {
    /// Inject an event into the framework on the given port.
    fn trigger(&self, event: SharedEvent, port: PortId);

    /// Block until the CUT has drained its pending work, then expose a
    /// handle for predicate evaluation.
    fn snapshot(&self) -> Arc<dyn Any + Send + Sync>;

    /// Rebind an incoming direct-request's origin to a proxy-owned port so
    /// the response traverses the simulator.
    fn rebind_origin(&self, symbol: &EventSymbol);
}
