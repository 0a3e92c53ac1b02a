//! Test specification builder and NFA construction for vigil.
//!
//! A specification is a sequence of statements (expect, trigger, repeat,
//! either/or, unordered, answer-request, header rules). The builder
//! validates statement ordering against a mode stack and `construct()`
//! lowers the result into a sealed [`vigil_automaton::Automaton`].

mod builder;
mod construct;
mod error;
mod spec;

#[cfg(test)]
mod builder_tests;

pub use builder::SpecBuilder;
pub use error::{BuildError, Mode};
pub use spec::CompiledSpec;
