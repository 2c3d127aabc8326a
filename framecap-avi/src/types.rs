//! Fixed layout header records: avih, strh and the two strf variants.
//!
//! Every record is little endian. Fields are read and written at their byte
//! offsets so that the writer can patch single fields after the fact.

use crate::error::{AviError, Result};
use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};
use framecap_core::MediaType;

fn too_short(id: &[u8; 4], what: &str, len: usize) -> AviError {
    AviError::InvalidChunk {
        id: *id,
        message: format!("{} needs more than {} bytes", what, len),
    }
}

fn u16_at(data: &[u8], at: usize) -> u16 {
    LittleEndian::read_u16(&data[at..at + 2])
}

fn u32_at(data: &[u8], at: usize) -> u32 {
    LittleEndian::read_u32(&data[at..at + 4])
}

fn i32_at(data: &[u8], at: usize) -> i32 {
    LittleEndian::read_i32(&data[at..at + 4])
}

fn fourcc_at(data: &[u8], at: usize) -> [u8; 4] {
    let mut code = [0u8; 4];
    code.copy_from_slice(&data[at..at + 4]);
    code
}

bitflags! {
    /// avih flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AviFlags: u32 {
        const HAS_INDEX = 0x0000_0010;
        const MUST_USE_INDEX = 0x0000_0020;
        const IS_INTERLEAVED = 0x0000_0100;
        const TRUST_CHUNK_TYPE = 0x0000_0800;
        const WAS_CAPTURE_FILE = 0x0001_0000;
        const COPYRIGHTED = 0x0002_0000;
    }
}

/// Main header (avih)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AviHeader {
    pub microseconds_per_frame: u32,
    pub max_bytes_per_sec: u32,
    pub padding_granularity: u32,
    pub flags: AviFlags,
    /// Chunks in the first video stream
    pub total_frames: u32,
    pub initial_frames: u32,
    pub streams: u32,
    pub suggested_buffer_size: u32,
    pub width: u32,
    pub height: u32,
}

impl AviHeader {
    pub const SIZE: usize = 56;

    pub const TOTAL_FRAMES_OFFSET: u64 = 16;

    pub const BUFFER_SIZE_OFFSET: u64 = 28;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(too_short(b"avih", "main header", data.len()));
        }
        let field = |n: usize| u32_at(data, 4 * n);
        Ok(AviHeader {
            microseconds_per_frame: field(0),
            max_bytes_per_sec: field(1),
            padding_granularity: field(2),
            flags: AviFlags::from_bits_retain(field(3)),
            total_frames: field(4),
            initial_frames: field(5),
            streams: field(6),
            suggested_buffer_size: field(7),
            width: field(8),
            height: field(9),
        })
    }

    /// The four reserved words at the end are zero.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = vec![0u8; Self::SIZE];
        LittleEndian::write_u32_into(
            &[
                self.microseconds_per_frame,
                self.max_bytes_per_sec,
                self.padding_granularity,
                self.flags.bits(),
                self.total_frames,
                self.initial_frames,
                self.streams,
                self.suggested_buffer_size,
                self.width,
                self.height,
            ],
            &mut data[..40],
        );
        data
    }
}

/// `fccType` of a stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Video,
    Audio,
    Text,
    Midi,
    Other([u8; 4]),
}

impl StreamType {
    const CODES: [(StreamType, [u8; 4]); 4] = [
        (StreamType::Video, *b"vids"),
        (StreamType::Audio, *b"auds"),
        (StreamType::Text, *b"txts"),
        (StreamType::Midi, *b"mids"),
    ];

    pub fn from_fourcc(code: [u8; 4]) -> Self {
        Self::CODES
            .iter()
            .find(|(_, c)| *c == code)
            .map_or(StreamType::Other(code), |(t, _)| *t)
    }

    pub fn fourcc(self) -> [u8; 4] {
        match self {
            StreamType::Other(code) => code,
            known => Self::CODES
                .iter()
                .find(|(t, _)| *t == known)
                .map_or([0; 4], |(_, c)| *c),
        }
    }

    pub fn media_type(self) -> Option<MediaType> {
        match self {
            StreamType::Video => Some(MediaType::Video),
            StreamType::Audio => Some(MediaType::Audio),
            StreamType::Text => Some(MediaType::Text),
            StreamType::Midi => Some(MediaType::Midi),
            StreamType::Other(_) => None,
        }
    }
}

/// Destination rectangle of a stream, in 16 bit coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i16,
    pub top: i16,
    pub right: i16,
    pub bottom: i16,
}

/// Stream header (strh).
///
/// A stream advances `rate / scale` ticks per second. For video one tick is
/// one chunk; for PCM audio one tick is one sample frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    pub stream_type: StreamType,
    pub handler: [u8; 4],
    pub flags: u32,
    pub priority: u16,
    pub language: u16,
    pub initial_frames: u32,
    pub scale: u32,
    pub rate: u32,
    /// Ticks before the first chunk
    pub start: u32,
    /// Ticks covered by the chunks
    pub length: u32,
    pub suggested_buffer_size: u32,
    /// 0 to 10000, `u32::MAX` for the codec default
    pub quality: u32,
    /// Bytes per tick, 0 when chunks vary in size
    pub sample_size: u32,
    pub frame: Rect,
}

impl Default for StreamHeader {
    fn default() -> Self {
        StreamHeader {
            stream_type: StreamType::Video,
            handler: [0; 4],
            flags: 0,
            priority: 0,
            language: 0,
            initial_frames: 0,
            scale: 1,
            rate: 30,
            start: 0,
            length: 0,
            suggested_buffer_size: 0,
            quality: u32::MAX,
            sample_size: 0,
            frame: Rect::default(),
        }
    }
}

impl StreamHeader {
    pub const SIZE: usize = 56;

    /// Older writers stop before the frame rectangle.
    const MIN_SIZE: usize = 48;

    pub const LENGTH_OFFSET: u64 = 32;

    pub const BUFFER_SIZE_OFFSET: u64 = 36;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(too_short(b"strh", "stream header", data.len()));
        }
        let frame = if data.len() >= Self::SIZE {
            let corner = |at: usize| LittleEndian::read_i16(&data[at..at + 2]);
            Rect {
                left: corner(48),
                top: corner(50),
                right: corner(52),
                bottom: corner(54),
            }
        } else {
            Rect::default()
        };

        Ok(StreamHeader {
            stream_type: StreamType::from_fourcc(fourcc_at(data, 0)),
            handler: fourcc_at(data, 4),
            flags: u32_at(data, 8),
            priority: u16_at(data, 12),
            language: u16_at(data, 14),
            initial_frames: u32_at(data, 16),
            scale: u32_at(data, 20),
            rate: u32_at(data, 24),
            start: u32_at(data, 28),
            length: u32_at(data, 32),
            suggested_buffer_size: u32_at(data, 36),
            quality: u32_at(data, 40),
            sample_size: u32_at(data, 44),
            frame,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = vec![0u8; Self::SIZE];
        data[0..4].copy_from_slice(&self.stream_type.fourcc());
        data[4..8].copy_from_slice(&self.handler);
        LittleEndian::write_u32(&mut data[8..12], self.flags);
        LittleEndian::write_u16(&mut data[12..14], self.priority);
        LittleEndian::write_u16(&mut data[14..16], self.language);
        LittleEndian::write_u32_into(
            &[
                self.initial_frames,
                self.scale,
                self.rate,
                self.start,
                self.length,
                self.suggested_buffer_size,
                self.quality,
                self.sample_size,
            ],
            &mut data[16..48],
        );
        LittleEndian::write_i16_into(
            &[
                self.frame.left,
                self.frame.top,
                self.frame.right,
                self.frame.bottom,
            ],
            &mut data[48..56],
        );
        data
    }
}

/// BITMAPINFOHEADER strf payload of a video stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFormat {
    pub size: u32,
    pub width: i32,
    /// Negative for top-down rows
    pub height: i32,
    pub planes: u16,
    pub bit_count: u16,
    /// All zero for uncompressed RGB
    pub compression: [u8; 4],
    pub image_size: u32,
    pub x_pels_per_meter: i32,
    pub y_pels_per_meter: i32,
    pub colors_used: u32,
    pub colors_important: u32,
}

impl Default for VideoFormat {
    fn default() -> Self {
        VideoFormat {
            size: Self::SIZE as u32,
            width: 0,
            height: 0,
            planes: 1,
            bit_count: 24,
            compression: [0; 4],
            image_size: 0,
            x_pels_per_meter: 0,
            y_pels_per_meter: 0,
            colors_used: 0,
            colors_important: 0,
        }
    }
}

impl VideoFormat {
    pub const SIZE: usize = 40;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(too_short(b"strf", "bitmap header", data.len()));
        }
        Ok(VideoFormat {
            size: u32_at(data, 0),
            width: i32_at(data, 4),
            height: i32_at(data, 8),
            planes: u16_at(data, 12),
            bit_count: u16_at(data, 14),
            compression: fourcc_at(data, 16),
            image_size: u32_at(data, 20),
            x_pels_per_meter: i32_at(data, 24),
            y_pels_per_meter: i32_at(data, 28),
            colors_used: u32_at(data, 32),
            colors_important: u32_at(data, 36),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = vec![0u8; Self::SIZE];
        LittleEndian::write_u32(&mut data[0..4], self.size);
        LittleEndian::write_i32_into(&[self.width, self.height], &mut data[4..12]);
        LittleEndian::write_u16_into(&[self.planes, self.bit_count], &mut data[12..16]);
        data[16..20].copy_from_slice(&self.compression);
        LittleEndian::write_u32(&mut data[20..24], self.image_size);
        LittleEndian::write_i32_into(
            &[self.x_pels_per_meter, self.y_pels_per_meter],
            &mut data[24..32],
        );
        LittleEndian::write_u32_into(&[self.colors_used, self.colors_important], &mut data[32..40]);
        data
    }

    pub fn abs_height(&self) -> u32 {
        self.height.unsigned_abs()
    }
}

/// WAVEFORMATEX strf payload of an audio stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    /// Bytes per sample frame
    pub block_align: u16,
    pub bits_per_sample: u16,
    /// Codec data following `cbSize`
    pub extra_data: Vec<u8>,
}

impl Default for AudioFormat {
    fn default() -> Self {
        AudioFormat {
            format_tag: Self::PCM,
            channels: 2,
            samples_per_sec: 44100,
            avg_bytes_per_sec: 176400,
            block_align: 4,
            bits_per_sample: 16,
            extra_data: Vec::new(),
        }
    }
}

impl AudioFormat {
    pub const PCM: u16 = 0x0001;

    /// WAVEFORMAT without `cbSize`
    const BASE_SIZE: usize = 16;

    const TAG_NAMES: [(u16, &'static str); 5] = [
        (0x0001, "PCM"),
        (0x0003, "IEEE Float"),
        (0x0006, "A-Law"),
        (0x0007, "u-Law"),
        (0x0055, "MP3"),
    ];

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::BASE_SIZE {
            return Err(too_short(b"strf", "wave format", data.len()));
        }
        let extra_data = match data.get(Self::BASE_SIZE..Self::BASE_SIZE + 2) {
            Some(cb_size) => {
                let rest = &data[Self::BASE_SIZE + 2..];
                let len = (LittleEndian::read_u16(cb_size) as usize).min(rest.len());
                rest[..len].to_vec()
            }
            None => Vec::new(),
        };

        Ok(AudioFormat {
            format_tag: u16_at(data, 0),
            channels: u16_at(data, 2),
            samples_per_sec: u32_at(data, 4),
            avg_bytes_per_sec: u32_at(data, 8),
            block_align: u16_at(data, 12),
            bits_per_sample: u16_at(data, 14),
            extra_data,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = vec![0u8; Self::BASE_SIZE + 2];
        LittleEndian::write_u16_into(&[self.format_tag, self.channels], &mut data[0..4]);
        LittleEndian::write_u32_into(
            &[self.samples_per_sec, self.avg_bytes_per_sec],
            &mut data[4..12],
        );
        LittleEndian::write_u16_into(
            &[
                self.block_align,
                self.bits_per_sample,
                self.extra_data.len() as u16,
            ],
            &mut data[12..18],
        );
        data.extend_from_slice(&self.extra_data);
        data
    }

    /// Readable name of the format tag
    pub fn tag_name(&self) -> &'static str {
        Self::TAG_NAMES
            .iter()
            .find(|(tag, _)| *tag == self.format_tag)
            .map_or("Unknown", |(_, name)| *name)
    }
}
