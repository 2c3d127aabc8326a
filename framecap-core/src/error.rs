//! Error types for the framecap crates.
//!
//! Every fallible operation in the core types, the container traits and the
//! codecs returns [`Error`]. Container implementations convert their own error
//! types into it.

use crate::format::{FormatKey, ValueKind};
use thiserror::Error;

/// Main error type for the framecap library.
#[derive(Error, Debug)]
pub enum Error {
    /// A format value does not have the kind bound to its key.
    #[error("{key} holds {found}, expected {expected}")]
    TypeMismatch {
        key: FormatKey,
        expected: ValueKind,
        found: ValueKind,
    },

    /// The media type or encoding cannot be handled by this component.
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A codec could not process one buffer. The buffer is dropped and
    /// processing continues with the next one.
    #[error("{codec} codec failed: {message}")]
    CodecFailure { codec: String, message: String },

    /// A screen, cursor or audio source stopped delivering.
    #[error("Capture failure: {0}")]
    CaptureFailure(String),

    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The operation is not valid in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Errors raised by movie readers and writers.
#[derive(Error, Debug)]
pub enum ContainerError {
    /// The file does not have the layout of its format.
    #[error("Malformed file: {0}")]
    InvalidStructure(String),

    /// A chunk or element the format requires is absent.
    #[error("{0} is missing")]
    MissingElement(String),

    #[error("No track {index}")]
    TrackNotFound { index: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    pub fn codec(codec: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::CodecFailure {
            codec: codec.into(),
            message: msg.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }
}
