//! Capture session error types.

use thiserror::Error;
use framecap_core::error::Error as CoreError;

/// Capture error type.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The video codec rejected the negotiated formats.
    #[error("No codec for format {0}")]
    NoCodec(String),

    /// `start` was called on a session that is not idle.
    #[error("Session already started")]
    AlreadyStarted,

    /// `stop` was called on a session that never started.
    #[error("Session is not recording")]
    NotRecording,

    /// A worker thread could not be spawned.
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

/// Capture result type.
pub type Result<T> = std::result::Result<T, CaptureError>;
