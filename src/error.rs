//! Error types for the keyed rate limiter.
//!
//! Table operations never fail; these errors only surface while loading
//! configuration for a host process.

use thiserror::Error;

/// Main error type for configuration and process wiring.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, LimiterError>;
