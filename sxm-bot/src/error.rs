//! Error types for sxm-bot
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Soft failures (queue full, outbound channel full) are not errors: they are
//! logged and reported as a `false` return by the player operations.

use thiserror::Error;

/// Errors produced by output sink collaborators
#[derive(Error, Debug)]
pub enum SinkError {
    /// Operation did not finish within the caller-supplied bound
    #[error("Sink operation timed out: {0}")]
    Timeout(String),

    /// The sink refused the request
    #[error("Sink rejected request: {0}")]
    Rejected(String),

    /// The sink is no longer connected
    #[error("Sink is disconnected")]
    Disconnected,

    /// Underlying I/O failure
    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the audio player
#[derive(Error, Debug)]
pub enum PlayerError {
    /// Connecting or moving the output sink failed or timed out
    #[error("Voice connection error: {0}")]
    VoiceConnection(String),

    /// Source creation or playback failed
    #[error("Playback error: {0}")]
    Playback(String),

    /// Queue management errors
    #[error("Queue error: {0}")]
    Queue(String),

    /// Song repository failure
    #[error("Repository error: {0}")]
    Repository(#[from] sxm_common::Error),

    /// The player has been cleaned up
    #[error("Player is shutting down")]
    ShuttingDown,
}

/// Main error type for the sxm-bot service wiring
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Audio player errors
    #[error("Player error: {0}")]
    Player(#[from] PlayerError),

    /// Errors from the shared crate (database, config files)
    #[error(transparent)]
    Common(#[from] sxm_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using sxm-bot Error
pub type Result<T> = std::result::Result<T, Error>;
