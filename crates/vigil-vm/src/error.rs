//! Errors that can occur when starting a test run.

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// `run()` was called twice on the same controller.
    #[error("test was already run")]
    AlreadyRan,

    /// The watchdog thread could not be spawned.
    #[error("failed to spawn watchdog thread")]
    Spawn(#[from] std::io::Error),
}
