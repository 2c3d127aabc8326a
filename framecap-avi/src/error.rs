//! AVI errors and their mapping onto the core error type.

use crate::chunks::FourCC;
use framecap_core::error::{ContainerError, Error as CoreError};
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AviError>;

fn fourcc(id: &[u8; 4]) -> FourCC {
    FourCC(*id)
}

#[derive(Error, Debug)]
pub enum AviError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("not a RIFF file")]
    InvalidRiff,

    #[error("RIFF form is not AVI")]
    InvalidAvi,

    #[error("malformed {} chunk: {message}", fourcc(.id))]
    InvalidChunk { id: [u8; 4], message: String },

    #[error("required chunk {0} not found")]
    MissingChunk(&'static str),

    #[error("no stream {0}")]
    InvalidStream(usize),

    #[error("truncated data: {needed} bytes needed, {available} available")]
    InsufficientData { needed: usize, available: usize },

    /// Media type or encoding that AVI cannot carry
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Operation not allowed in the writer's current state, or a value out of
    /// range for the format
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<AviError> for CoreError {
    fn from(e: AviError) -> Self {
        match e {
            AviError::Io(io) => CoreError::Io(io),
            AviError::UnsupportedMediaType(msg) => CoreError::UnsupportedMediaType(msg),
            AviError::Unsupported(msg) => CoreError::InvalidState(msg),
            AviError::InvalidStream(index) => {
                CoreError::Container(ContainerError::TrackNotFound { index })
            }
            AviError::MissingChunk(name) => {
                CoreError::Container(ContainerError::MissingElement(name.into()))
            }
            structure => CoreError::Container(ContainerError::InvalidStructure(structure.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_chunk() {
        let err = AviError::InvalidChunk {
            id: [b's', b't', b'r', 0],
            message: "too short".into(),
        };
        assert_eq!(err.to_string(), "malformed str. chunk: too short");

        let err = AviError::InsufficientData {
            needed: 56,
            available: 40,
        };
        assert!(err.to_string().contains("56 bytes needed"));
    }

    #[test]
    fn test_core_mapping() {
        let err: CoreError = AviError::UnsupportedMediaType("midi".into()).into();
        assert!(matches!(err, CoreError::UnsupportedMediaType(_)));

        let err: CoreError = AviError::Unsupported("closed".into()).into();
        assert!(matches!(err, CoreError::InvalidState(_)));

        let err: CoreError = AviError::InvalidStream(4).into();
        assert!(matches!(
            err,
            CoreError::Container(ContainerError::TrackNotFound { index: 4 })
        ));

        let err: CoreError = AviError::MissingChunk("movi").into();
        assert!(matches!(
            err,
            CoreError::Container(ContainerError::MissingElement(name)) if name == "movi"
        ));

        let err: CoreError = AviError::InvalidAvi.into();
        assert!(matches!(
            err,
            CoreError::Container(ContainerError::InvalidStructure(_))
        ));
    }
}
