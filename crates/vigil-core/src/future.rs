//! Single-assignment event futures.
//!
//! A future connects an answer-request statement to a later trigger
//! statement: the answer-request sets the captured request, the trigger
//! reads it back. Assignment is first-write-wins.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::event::SharedEvent;

/// Single-assignment channel for a captured request event.
#[derive(Clone, Default)]
pub struct EventFuture {
    inner: Arc<Mutex<Option<SharedEvent>>>,
}

impl EventFuture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the event; returns false if the future was already set.
    pub fn set(&self, event: SharedEvent) -> bool {
        let mut slot = self.inner.lock().expect("future lock poisoned");
        if slot.is_some() {
            return false;
        }
        *slot = Some(event);
        true
    }

    pub fn get(&self) -> Option<SharedEvent> {
        self.inner.lock().expect("future lock poisoned").clone()
    }

    pub fn is_set(&self) -> bool {
        self.inner.lock().expect("future lock poisoned").is_some()
    }

    /// Allocation identity, used to detect reuse across statements.
    pub fn token(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl fmt::Debug for EventFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_set() {
            f.write_str("EventFuture(set)")
        } else {
            f.write_str("EventFuture(empty)")
        }
    }
}
