//! The sample envelope that flows between capture, codecs and containers.

use crate::format::Format;
use crate::rational::Rational;
use bitflags::bitflags;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

bitflags! {
    /// Flags for buffer properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        /// Every sample in this buffer is a keyframe.
        const KEYFRAME = 0x0001;
        /// The buffer must not be written.
        const DISCARD = 0x0002;
        /// No more buffers follow on this track.
        const END_OF_MEDIA = 0x0004;
        /// The payload is identical to the previous buffer of the track.
        const SAME_DATA = 0x0008;
    }
}

/// An uncompressed frame of `0x00RRGGBB` pixels, row-major, top row first.
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Raster {
    /// Create a black raster.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    /// Wrap existing pixels. Returns `None` if the length does not match.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u32>) -> Option<Self> {
        if pixels.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel at `(x, y)`, or `None` outside the raster.
    pub fn pixel(&self, x: i32, y: i32) -> Option<u32> {
        self.index(x, y).map(|i| self.pixels[i])
    }

    /// Set the pixel at `(x, y)`. Writes outside the raster are ignored.
    pub fn set_pixel(&mut self, x: i32, y: i32, rgb: u32) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] = rgb & 0x00ff_ffff;
        }
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }

    /// One row of pixels.
    pub fn row(&self, y: u32) -> &[u32] {
        let start = y as usize * self.width as usize;
        &self.pixels[start..start + self.width as usize]
    }

    /// Copy `src` into this raster with its top-left corner at `(x, y)`,
    /// clipping to the bounds.
    pub fn blit(&mut self, src: &Raster, x: i32, y: i32) {
        for sy in 0..src.height as i32 {
            let dy = y + sy;
            if dy < 0 || dy >= self.height as i32 {
                continue;
            }
            for sx in 0..src.width as i32 {
                let dx = x + sx;
                if dx < 0 || dx >= self.width as i32 {
                    continue;
                }
                let si = sy as usize * src.width as usize + sx as usize;
                let di = dy as usize * self.width as usize + dx as usize;
                self.pixels[di] = src.pixels[si];
            }
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            None
        } else {
            Some(y as usize * self.width as usize + x as usize)
        }
    }
}

impl fmt::Debug for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Buffer payload. Cloning shares the underlying storage.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    /// No data.
    #[default]
    Empty,
    /// Encoded bytes.
    Bytes(Bytes),
    /// An uncompressed frame.
    Raster(Arc<Raster>),
}

impl Payload {
    /// Check if there is no payload.
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    /// Encoded bytes, if the payload holds bytes.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The frame, if the payload holds a raster.
    pub fn as_raster(&self) -> Option<&Arc<Raster>> {
        match self {
            Payload::Raster(r) => Some(r),
            _ => None,
        }
    }
}

/// A timed group of samples belonging to one track.
#[derive(Debug, Clone)]
pub struct Buffer {
    /// Format of the payload.
    pub format: Format,
    /// Start time in seconds.
    pub timestamp: Rational,
    /// Duration of a single sample in seconds.
    pub sample_duration: Rational,
    /// Number of samples in the payload.
    pub sample_count: i64,
    /// Track index.
    pub track: usize,
    /// Buffer flags.
    pub flags: BufferFlags,
    /// The payload.
    pub payload: Payload,
}

impl Default for Buffer {
    fn default() -> Self {
        Self {
            format: Format::new(),
            timestamp: Rational::ZERO,
            sample_duration: Rational::ZERO,
            sample_count: 1,
            track: 0,
            flags: BufferFlags::empty(),
            payload: Payload::Empty,
        }
    }
}

impl Buffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy everything except the payload from `other`.
    pub fn set_meta_to(&mut self, other: &Buffer) {
        self.format = other.format.clone();
        self.timestamp = other.timestamp;
        self.sample_duration = other.sample_duration;
        self.sample_count = other.sample_count;
        self.track = other.track;
        self.flags = other.flags;
    }

    /// Share the payload of `other`.
    ///
    /// If `other` is marked SAME_DATA and this buffer already holds a payload,
    /// the existing payload is kept.
    pub fn set_data_to(&mut self, other: &Buffer) {
        if other.is_same_data() && !self.payload.is_empty() {
            return;
        }
        self.payload = other.payload.clone();
    }

    /// Total duration (`sample_duration * sample_count`).
    pub fn duration(&self) -> Rational {
        self.sample_duration.mul_int(self.sample_count)
    }

    /// Time right after the last sample.
    pub fn end_time(&self) -> Rational {
        self.timestamp + self.duration()
    }

    /// Move the payload out, leaving [`Payload::Empty`].
    pub fn take_payload(&mut self) -> Payload {
        std::mem::take(&mut self.payload)
    }

    /// Payload size in bytes. Rasters count 4 bytes per pixel.
    pub fn len(&self) -> usize {
        match &self.payload {
            Payload::Empty => 0,
            Payload::Bytes(b) => b.len(),
            Payload::Raster(r) => r.pixels().len() * 4,
        }
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_keyframe(&self) -> bool {
        self.flags.contains(BufferFlags::KEYFRAME)
    }

    pub fn is_discard(&self) -> bool {
        self.flags.contains(BufferFlags::DISCARD)
    }

    pub fn is_end_of_media(&self) -> bool {
        self.flags.contains(BufferFlags::END_OF_MEDIA)
    }

    pub fn is_same_data(&self) -> bool {
        self.flags.contains(BufferFlags::SAME_DATA)
    }

    /// Mark the buffer DISCARD, keeping its metadata.
    pub fn discard(&mut self) {
        self.flags.insert(BufferFlags::DISCARD);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{keys, MediaType};

    fn frame_buffer() -> Buffer {
        Buffer {
            format: Format::builder().with(keys::MEDIA_TYPE, MediaType::Video).build(),
            timestamp: Rational::new(1, 2),
            sample_duration: Rational::new(1, 30),
            sample_count: 3,
            track: 1,
            flags: BufferFlags::KEYFRAME,
            payload: Payload::Bytes(Bytes::from_static(b"abc")),
        }
    }

    #[test]
    fn test_duration_and_end_time() {
        let b = frame_buffer();
        assert_eq!(b.duration(), Rational::new(1, 10));
        assert_eq!(b.end_time(), Rational::new(3, 5));
    }

    #[test]
    fn test_set_meta_to_leaves_payload() {
        let src = frame_buffer();
        let mut dst = Buffer::new();
        dst.set_meta_to(&src);
        assert_eq!(dst.timestamp, src.timestamp);
        assert_eq!(dst.track, 1);
        assert!(dst.is_keyframe());
        assert!(dst.payload.is_empty());
    }

    #[test]
    fn test_set_data_to_shares() {
        let src = frame_buffer();
        let mut dst = Buffer::new();
        dst.set_data_to(&src);
        assert_eq!(dst.payload.as_bytes().map(|b| b.as_ref()), Some(&b"abc"[..]));
    }

    #[test]
    fn test_same_data_keeps_existing_payload() {
        let mut src = frame_buffer();
        src.flags |= BufferFlags::SAME_DATA;
        src.payload = Payload::Bytes(Bytes::from_static(b"new"));

        let mut dst = Buffer::new();
        dst.payload = Payload::Bytes(Bytes::from_static(b"old"));
        dst.set_data_to(&src);
        assert_eq!(dst.payload.as_bytes().map(|b| b.as_ref()), Some(&b"old"[..]));

        let mut empty = Buffer::new();
        empty.set_data_to(&src);
        assert_eq!(empty.payload.as_bytes().map(|b| b.as_ref()), Some(&b"new"[..]));
    }

    #[test]
    fn test_discard_keeps_metadata() {
        let mut b = frame_buffer();
        b.discard();
        assert!(b.is_discard());
        assert_eq!(b.sample_count, 3);
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn test_take_payload() {
        let mut b = frame_buffer();
        let p = b.take_payload();
        assert!(!p.is_empty());
        assert!(b.payload.is_empty());
    }

    #[test]
    fn test_raster_blit_clips() {
        let mut dst = Raster::new(4, 4);
        let src = Raster::from_pixels(2, 2, vec![0xff0000; 4]).unwrap();
        dst.blit(&src, 3, -1);
        assert_eq!(dst.pixel(3, 0), Some(0xff0000));
        assert_eq!(dst.pixel(2, 0), Some(0));
        assert_eq!(dst.pixel(3, 1), Some(0));
        assert_eq!(dst.pixel(4, 0), None);
    }
}
