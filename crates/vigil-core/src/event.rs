//! The event trait, event kinds and fault events.
//!
//! Events are plain user types. Any `T: Debug + PartialEq + Send + Sync`
//! is an event via the blanket impl; there is nothing to derive beyond the
//! two standard traits. Events cross the CUT boundary as `Arc<dyn Event>`.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

/// An event observable at the CUT boundary.
///
/// Implemented automatically for every `Debug + PartialEq` type; do not
/// implement manually (the blanket impl would conflict).
pub trait Event: Any + fmt::Debug + Send + Sync {
    /// Runtime kind of this event (its concrete type).
    fn kind(&self) -> EventKind;

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Structural equality: same concrete type and `PartialEq`-equal.
    fn eq_event(&self, other: &dyn Event) -> bool;

    /// Human-readable rendering for logs and traces.
    fn describe(&self) -> String;
}

impl<T> Event for T
where
    T: Any + fmt::Debug + PartialEq + Send + Sync,
{
    fn kind(&self) -> EventKind {
        EventKind::of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_event(&self, other: &dyn Event) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn describe(&self) -> String {
        format!("{self:?}")
    }
}

/// Shared handle to a type-erased event.
pub type SharedEvent = Arc<dyn Event>;

/// Identity of an event type.
///
/// Compares and hashes by `TypeId`; the captured type name is for
/// diagnostics only.
#[derive(Clone, Copy, Debug)]
pub struct EventKind {
    type_id: TypeId,
    name: &'static str,
}

impl EventKind {
    /// Kind of a concrete event type.
    pub fn of<E: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            name: type_name::<E>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Unqualified type name (module path stripped).
    pub fn name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }
}

impl PartialEq for EventKind {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for EventKind {}

impl std::hash::Hash for EventKind {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fault raised by the CUT, delivered on its control port.
///
/// Carries the original payload for downcasting plus a debug summary.
/// Faults are events themselves (equality is kind + summary), so they flow
/// through the same label machinery as ordinary events.
#[derive(Clone)]
pub struct Fault {
    payload: Arc<dyn Any + Send + Sync>,
    kind: EventKind,
    summary: String,
}

impl Fault {
    pub fn new<E: Any + fmt::Debug + Send + Sync>(payload: E) -> Self {
        Self {
            kind: EventKind::of::<E>(),
            summary: format!("{payload:?}"),
            payload: Arc::new(payload),
        }
    }

    /// Kind of the fault payload (the "exception class").
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn downcast_ref<E: Any>(&self) -> Option<&E> {
        self.payload.downcast_ref()
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fault")
            .field("kind", &self.kind.name())
            .field("summary", &self.summary)
            .finish()
    }
}

impl PartialEq for Fault {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.summary == other.summary
    }
}
