//! The compiled specification handed to the runtime.

use std::fmt;
use std::time::Duration;

use vigil_automaton::Automaton;
use vigil_core::KindRegistry;

/// A sealed automaton plus the configuration collected by the builder.
pub struct CompiledSpec {
    automaton: Automaton,
    registry: KindRegistry,
    timeout: Duration,
}

impl CompiledSpec {
    pub(crate) fn new(automaton: Automaton, registry: KindRegistry, timeout: Duration) -> Self {
        Self {
            automaton,
            registry,
            timeout,
        }
    }

    pub fn automaton(&self) -> &Automaton {
        &self.automaton
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// Inactivity watchdog interval.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn into_parts(self) -> (Automaton, KindRegistry, Duration) {
        (self.automaton, self.registry, self.timeout)
    }
}

impl fmt::Debug for CompiledSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSpec")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
