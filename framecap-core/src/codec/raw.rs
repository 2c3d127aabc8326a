//! Uncompressed 24-bit DIB encoder.

use super::{negotiate, Codec};
use crate::buffer::{Buffer, BufferFlags, Payload, Raster};
use crate::error::{Error, Result};
use crate::format::{keys, Format, MediaType, ENCODING_AVI_DIB, ENCODING_RASTER};
use bytes::{BufMut, Bytes, BytesMut};

/// Encodes [`Raster`] frames into bottom-up BGR rows padded to 4 bytes.
///
/// Every output buffer is a keyframe. The last encoded frame is kept so that
/// an input marked SAME_DATA can be emitted without encoding again.
#[derive(Debug)]
pub struct RawVideoCodec {
    input_formats: Vec<Format>,
    output_formats: Vec<Format>,
    input_format: Option<Format>,
    output_format: Option<Format>,
    previous: Option<Bytes>,
}

impl Default for RawVideoCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl RawVideoCodec {
    pub fn new() -> Self {
        Self {
            input_formats: vec![Format::builder()
                .with(keys::MEDIA_TYPE, MediaType::Video)
                .with_str(keys::ENCODING, ENCODING_RASTER)
                .build()],
            output_formats: vec![Format::builder()
                .with(keys::MEDIA_TYPE, MediaType::Video)
                .with_str(keys::ENCODING, ENCODING_AVI_DIB)
                .with(keys::DEPTH, 24)
                .build()],
            input_format: None,
            output_format: None,
            previous: None,
        }
    }

    /// Size in bytes of one encoded frame.
    pub fn frame_size(width: u32, height: u32) -> usize {
        Self::stride(width) * height as usize
    }

    fn stride(width: u32) -> usize {
        (width as usize * 3 + 3) & !3
    }

    /// Encode one raster.
    pub fn encode(raster: &Raster) -> Bytes {
        let stride = Self::stride(raster.width());
        let padding = stride - raster.width() as usize * 3;
        let mut out = BytesMut::with_capacity(stride * raster.height() as usize);
        for y in (0..raster.height()).rev() {
            for &rgb in raster.row(y) {
                out.put_u8(rgb as u8);
                out.put_u8((rgb >> 8) as u8);
                out.put_u8((rgb >> 16) as u8);
            }
            out.put_bytes(0, padding);
        }
        out.freeze()
    }

    fn output_format_for(&self, input: &Buffer, raster: Option<&Raster>) -> Format {
        let mut format = self
            .output_format
            .clone()
            .unwrap_or_else(|| self.output_formats[0].clone());
        if let Some(r) = raster {
            format = format
                .with(keys::WIDTH, r.width() as i32)
                .with(keys::HEIGHT, r.height() as i32);
        }
        if let Some(rate) = input.format.get(keys::FRAME_RATE) {
            format = format.with(keys::FRAME_RATE, rate);
        }
        format
    }
}

impl Codec for RawVideoCodec {
    fn name(&self) -> &str {
        "raw-dib"
    }

    fn input_formats(&self) -> &[Format] {
        &self.input_formats
    }

    fn output_formats(&self) -> &[Format] {
        &self.output_formats
    }

    fn set_input_format(&mut self, format: Format) -> Option<Format> {
        self.input_format = negotiate(&self.input_formats, &format);
        self.input_format.clone()
    }

    fn set_output_format(&mut self, format: Format) -> Option<Format> {
        self.output_format = negotiate(&self.output_formats, &format);
        self.output_format.clone()
    }

    fn process(&mut self, input: &Buffer, output: &mut Buffer) -> Result<()> {
        output.set_meta_to(input);
        if input.is_discard() {
            return Ok(());
        }

        let data = match (&input.payload, &self.previous) {
            (_, Some(prev)) if input.is_same_data() => prev.clone(),
            (Payload::Raster(raster), _) => {
                let encoded = Self::encode(raster);
                self.previous = Some(encoded.clone());
                encoded
            }
            _ => {
                output.discard();
                return Err(Error::codec(self.name(), "input buffer carries no raster"));
            }
        };

        output.format = self.output_format_for(input, input.payload.as_raster().map(|r| &**r));
        output.payload = Payload::Bytes(data);
        output.flags.insert(BufferFlags::KEYFRAME);
        Ok(())
    }
}
