//! Runtime simulator and controller for executing vigil test specs.
//!
//! The [`Simulator`] drives a compiled NFA with observed event symbols;
//! the [`Controller`] owns the event queue, the machine lock and the
//! inactivity watchdog, and exposes the test verdict as a [`RunHandle`].

mod controller;
mod error;
mod io;
mod result;
mod simulator;
mod trace;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod scenario_tests;

pub use controller::{Controller, ControllerBuilder};
pub use error::RunError;
pub use io::{Effector, EventSource};
pub use result::RunHandle;
pub use simulator::{Simulator, TransitionResult};
pub use trace::{NoopTracer, Tracer, TransitionLog};
