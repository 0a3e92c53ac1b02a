//! Per-kind comparators, default actions and the declared subtype order.
//!
//! The source of truth for "how do two events compare" and "what happens
//! to an event nothing expected". Rust has no runtime class hierarchy, so
//! the embedder declares the subtype edges it cares about; lookups walk
//! those edges breadth-first and pick the minimal registered supertype.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::event::{Event, EventKind};

/// Policy applied to an event no expectation matched.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DefaultAction {
    /// Keep the machine where it is and forward the event.
    Handle,
    /// Keep the machine where it is and swallow the event.
    Drop,
    /// Fail the test.
    Fail,
}

type Comparator = dyn Fn(&dyn Event, &dyn Event) -> bool + Send + Sync;

/// Registry of comparators, default actions and subtype edges.
#[derive(Clone, Default)]
pub struct KindRegistry {
    comparators: HashMap<TypeId, Arc<Comparator>>,
    /// Registration order breaks ties between equally-distant supertypes.
    actions: IndexMap<EventKind, DefaultAction>,
    root_action: Option<DefaultAction>,
    /// Direct declared supertypes per kind.
    parents: HashMap<EventKind, Vec<EventKind>>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override structural equality for events of type `E`.
    pub fn set_comparator<E: Event>(
        &mut self,
        cmp: impl Fn(&E, &E) -> bool + Send + Sync + 'static,
    ) {
        let wrapped = move |a: &dyn Event, b: &dyn Event| {
            match (a.as_any().downcast_ref::<E>(), b.as_any().downcast_ref::<E>()) {
                (Some(a), Some(b)) => cmp(a, b),
                _ => false,
            }
        };
        self.comparators.insert(TypeId::of::<E>(), Arc::new(wrapped));
    }

    /// Register the default action for events of type `E`.
    pub fn set_default_action<E: Event>(&mut self, action: DefaultAction) {
        self.actions.insert(EventKind::of::<E>(), action);
    }

    /// Register the fallback action for any event kind.
    pub fn set_root_default_action(&mut self, action: DefaultAction) {
        self.root_action = Some(action);
    }

    /// Declare that `Child` events are a subtype of `Parent` events.
    pub fn declare_subtype<Child: Event, Parent: Event>(&mut self) {
        self.parents
            .entry(EventKind::of::<Child>())
            .or_default()
            .push(EventKind::of::<Parent>());
    }

    /// Equality under the registered comparator for the events' kind, or
    /// structural equality when none is registered. Events of different
    /// kinds are never equal.
    pub fn events_equal(&self, a: &dyn Event, b: &dyn Event) -> bool {
        if a.kind() != b.kind() {
            return false;
        }
        match self.comparators.get(&a.kind().type_id()) {
            Some(cmp) => cmp(a, b),
            None => a.eq_event(b),
        }
    }

    /// Default action for `kind`: the hierarchy-minimal registered
    /// supertype wins; equally distant supertypes tie-break by
    /// registration order; the root action is the final fallback.
    pub fn default_action_for(&self, kind: EventKind) -> Option<DefaultAction> {
        let mut seen: HashSet<EventKind> = HashSet::new();
        seen.insert(kind);
        let mut level = vec![kind];

        while !level.is_empty() {
            let mut hit: Option<(usize, DefaultAction)> = None;
            for k in &level {
                if let Some((index, _, action)) = self.actions.get_full(k)
                    && hit.is_none_or(|(best, _)| index < best)
                {
                    hit = Some((index, *action));
                }
            }
            if let Some((_, action)) = hit {
                return Some(action);
            }

            let mut next = Vec::new();
            for k in &level {
                if let Some(parents) = self.parents.get(k) {
                    for p in parents {
                        if seen.insert(*p) {
                            next.push(*p);
                        }
                    }
                }
            }
            level = next;
        }

        self.root_action
    }

    /// Reflexive-transitive check over the declared subtype edges.
    pub fn is_kind_or_subtype(&self, kind: EventKind, ancestor: EventKind) -> bool {
        if kind == ancestor {
            return true;
        }
        let mut seen: HashSet<EventKind> = HashSet::new();
        seen.insert(kind);
        let mut stack = vec![kind];
        while let Some(k) = stack.pop() {
            if let Some(parents) = self.parents.get(&k) {
                for p in parents {
                    if *p == ancestor {
                        return true;
                    }
                    if seen.insert(*p) {
                        stack.push(*p);
                    }
                }
            }
        }
        false
    }
}

impl std::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindRegistry")
            .field("comparators", &self.comparators.len())
            .field("actions", &self.actions)
            .field("root_action", &self.root_action)
            .finish()
    }
}
