//! Error types for replaybus

use thiserror::Error;

/// Errors that can occur in the event bus
///
/// Lock-primitive failures are deliberately absent: a poisoned or misused
/// lock is a programming error and panics instead of surfacing here.
#[derive(Debug, Error)]
pub enum BusError {
    /// A process-wide default bus was already installed
    #[error("Default bus already installed (label '{0}')")]
    DefaultAlreadyInstalled(String),

    /// A job was enqueued onto a task queue whose worker has terminated
    #[error("Task queue '{0}' has terminated")]
    QueueTerminated(String),

    /// Configuration parse failure
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type alias for bus operations
pub type Result<T> = std::result::Result<T, BusError>;
