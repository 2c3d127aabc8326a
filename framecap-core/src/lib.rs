//! # Framecap Core
//!
//! Core types shared by every framecap crate:
//! - Exact rational time ([`Rational`])
//! - Typed media formats ([`Format`])
//! - The sample envelope ([`Buffer`])
//! - The [`Codec`] contract and built-in codecs
//! - Error handling types

pub mod error;
pub mod rational;
pub mod format;
pub mod buffer;
pub mod codec;

pub use error::{ContainerError, Error, Result};
pub use rational::Rational;
pub use format::{keys, ByteOrder, Format, FormatKey, FormatValue, Key, MediaType, ValueKind};
pub use buffer::{Buffer, BufferFlags, Payload, Raster};
pub use codec::{Codec, PassThroughCodec, RawVideoCodec};
