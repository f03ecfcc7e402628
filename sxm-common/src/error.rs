//! Errors raised by the shared archive and configuration code

use thiserror::Error;

/// Result alias for sxm-common operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Song archive query or connection failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Creating the database directory failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file unreadable, malformed or invalid
    #[error("Configuration error: {0}")]
    Config(String),
}
