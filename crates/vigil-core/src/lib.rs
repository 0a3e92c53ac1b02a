//! Core event model and registries for vigil.
//!
//! Two layers:
//! - **Event layer**: the `Event` trait, event kinds, ports and the
//!   `EventSymbol` triple that crosses the boundary of a component under
//!   test (CUT).
//! - **Registry layer**: per-kind comparators, default actions with
//!   declared-subtype lookup, and single-assignment event futures.

mod event;
mod future;
mod registry;
mod symbol;


pub use event::{Event, EventKind, Fault, SharedEvent};
pub use future::EventFuture;
pub use registry::{DefaultAction, KindRegistry};
pub use symbol::{Direction, EventSymbol, PortId};
