//! The codec contract.
//!
//! A [`Codec`] converts one [`Buffer`] into another. Codecs advertise the
//! formats they accept and produce; a caller negotiates concrete formats with
//! [`Codec::set_input_format`] / [`Codec::set_output_format`] before the first
//! call to [`Codec::process`].
//!
//! - [`PassThroughCodec`] - copies buffers, optionally restricted to a time window
//! - [`RawVideoCodec`] - encodes [`Raster`](crate::buffer::Raster) frames as 24-bit DIB rows

mod passthrough;
mod raw;

pub use passthrough::PassThroughCodec;
pub use raw::RawVideoCodec;

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::format::Format;

/// Common trait for buffer codecs.
pub trait Codec: Send {
    /// Codec name, used in logs and errors.
    fn name(&self) -> &str;

    /// Formats this codec accepts.
    fn input_formats(&self) -> &[Format];

    /// Formats this codec can produce for the current input format.
    fn output_formats(&self) -> &[Format];

    /// Negotiate the input format.
    ///
    /// Returns the accepted format, which may carry additional keys filled in
    /// by the codec, or `None` if the format is not supported.
    fn set_input_format(&mut self, format: Format) -> Option<Format>;

    /// Negotiate the output format. Same contract as [`Codec::set_input_format`].
    fn set_output_format(&mut self, format: Format) -> Option<Format>;

    /// Process one buffer.
    ///
    /// On failure implementations leave `output` marked DISCARD.
    fn process(&mut self, input: &Buffer, output: &mut Buffer) -> Result<()>;
}

/// Run `codec` and guarantee that a failed buffer is marked DISCARD.
///
/// Errors that are not already codec failures are wrapped in
/// [`Error::CodecFailure`].
pub fn process_or_discard(codec: &mut dyn Codec, input: &Buffer, output: &mut Buffer) -> Result<()> {
    match codec.process(input, output) {
        Ok(()) => Ok(()),
        Err(err) => {
            output.discard();
            tracing::debug!(codec = codec.name(), error = %err, "buffer discarded");
            match err {
                e @ Error::CodecFailure { .. } => Err(e),
                other => Err(Error::codec(codec.name(), other.to_string())),
            }
        }
    }
}

/// Pick the first supported format that matches `requested` and merge them.
pub fn negotiate(supported: &[Format], requested: &Format) -> Option<Format> {
    supported
        .iter()
        .find(|f| f.matches(requested))
        .map(|f| requested.append(f))
}
