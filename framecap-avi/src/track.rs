//! Per-stream sample tables and time conversion.
//!
//! A track measures time in ticks of `scale / rate` seconds. Video samples
//! normally last one tick, audio samples last one tick per audio frame
//! (`block_align` bytes).

use crate::error::{AviError, Result};
use crate::types::{AudioFormat, Rect, StreamHeader, StreamType, VideoFormat};
use framecap_core::format::{
    keys, ByteOrder, Format, MediaType, ENCODING_AVI_DIB, ENCODING_PCM_SIGNED,
    ENCODING_PCM_UNSIGNED, ENCODING_RASTER,
};
use framecap_core::Rational;

/// One chunk of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Absolute file offset of the chunk data
    pub offset: u64,
    /// Chunk data length in bytes
    pub length: u32,
    /// Start in ticks, relative to the track start
    pub timestamp: i64,
    /// Duration in ticks
    pub duration: i64,
    /// Whether decoding can start at this sample
    pub keyframe: bool,
}

/// A stream of an AVI file with its sample table
#[derive(Debug, Clone)]
pub struct Track {
    header: StreamHeader,
    video: Option<VideoFormat>,
    audio: Option<AudioFormat>,
    format: Format,
    name: Option<String>,
    samples: Vec<Sample>,
    length: i64,
    unit_durations: bool,
    max_chunk_size: u32,
    pub(crate) read_index: usize,
}

impl Track {
    /// Build a track for an existing stream, deriving its [`Format`].
    pub fn from_stream(
        header: StreamHeader,
        video: Option<VideoFormat>,
        audio: Option<AudioFormat>,
        name: Option<String>,
    ) -> Self {
        let format = stream_format(&header, video.as_ref(), audio.as_ref());
        Track {
            header,
            video,
            audio,
            format,
            name,
            samples: Vec::new(),
            length: 0,
            unit_durations: true,
            max_chunk_size: 0,
            read_index: 0,
        }
    }

    /// Build a track for writing from a requested format.
    ///
    /// Video needs a positive [`keys::FRAME_RATE`], audio a positive
    /// [`keys::SAMPLE_RATE`]. Other media types are rejected.
    pub fn for_format(format: &Format) -> Result<Self> {
        match format.media_type() {
            Some(MediaType::Video) => Self::video_for_format(format),
            Some(MediaType::Audio) => Self::audio_for_format(format),
            other => Err(AviError::UnsupportedMediaType(format!(
                "AVI writer cannot store {:?} tracks",
                other
            ))),
        }
    }

    fn video_for_format(format: &Format) -> Result<Self> {
        let frame_rate = format
            .get(keys::FRAME_RATE)
            .filter(|r| r.is_positive() && !r.is_infinite())
            .ok_or_else(|| AviError::Unsupported("video track needs a positive frame rate".into()))?;
        let rate = u32::try_from(frame_rate.num())
            .map_err(|_| AviError::Unsupported(format!("frame rate {} out of range", frame_rate)))?;
        let scale = u32::try_from(frame_rate.den())
            .map_err(|_| AviError::Unsupported(format!("frame rate {} out of range", frame_rate)))?;

        let encoding = format.encoding().unwrap_or_else(|| ENCODING_AVI_DIB.to_string());
        if encoding == ENCODING_RASTER {
            return Err(AviError::UnsupportedMediaType(
                "raster frames must be encoded before muxing".into(),
            ));
        }
        let compression = fourcc_for_encoding(&encoding)?;
        let width = format.get_or(keys::WIDTH, 0);
        let height = format.get_or(keys::HEIGHT, 0);
        let depth = format.get_or(keys::DEPTH, 24);

        let image_size = if compression == [0; 4] {
            ((width as u32 * depth as u32 + 31) / 32) * 4 * height as u32
        } else {
            0
        };
        let video = VideoFormat {
            width,
            height,
            bit_count: depth as u16,
            compression,
            image_size,
            ..Default::default()
        };
        let header = StreamHeader {
            stream_type: StreamType::Video,
            handler: if compression == [0; 4] { *b"DIB " } else { compression },
            scale,
            rate,
            quality: format
                .get(keys::QUALITY)
                .map_or(u32::MAX, |q| (q.clamp(0.0, 1.0) * 10_000.0) as u32),
            frame: Rect {
                left: 0,
                top: 0,
                right: frame_extent(width),
                bottom: frame_extent(height),
            },
            ..Default::default()
        };

        let mut track = Self::from_stream(header, Some(video), None, None);
        track.format = format.append(&track.format);
        Ok(track)
    }

    fn audio_for_format(format: &Format) -> Result<Self> {
        let sample_rate = format
            .get(keys::SAMPLE_RATE)
            .filter(|r| r.is_positive() && !r.is_infinite())
            .ok_or_else(|| AviError::Unsupported("audio track needs a positive sample rate".into()))?;
        match format.encoding().as_deref() {
            None | Some(ENCODING_PCM_SIGNED) | Some(ENCODING_PCM_UNSIGNED) => {}
            Some(other) => {
                return Err(AviError::UnsupportedMediaType(format!(
                    "audio encoding {:?} is not PCM",
                    other
                )))
            }
        }
        if format.get(keys::BYTE_ORDER) == Some(ByteOrder::BigEndian) {
            return Err(AviError::UnsupportedMediaType(
                "AVI stores little endian PCM only".into(),
            ));
        }

        let samples_per_sec = u32::try_from(sample_rate.round(1).num())
            .map_err(|_| AviError::Unsupported(format!("sample rate {} out of range", sample_rate)))?;
        let channels = format.get_or(keys::CHANNELS, 1).max(1) as u16;
        let bits = format.get_or(keys::SAMPLE_SIZE_IN_BITS, 16).max(1) as u16;
        let block_align = format
            .get(keys::FRAME_SIZE)
            .map_or(channels * ((bits + 7) / 8), |f| f as u16)
            .max(1);

        let audio = AudioFormat {
            format_tag: AudioFormat::PCM,
            channels,
            samples_per_sec,
            avg_bytes_per_sec: samples_per_sec * block_align as u32,
            block_align,
            bits_per_sample: bits,
            extra_data: Vec::new(),
        };
        let header = StreamHeader {
            stream_type: StreamType::Audio,
            handler: [0; 4],
            scale: 1,
            rate: samples_per_sec,
            sample_size: block_align as u32,
            ..Default::default()
        };

        let mut track = Self::from_stream(header, None, Some(audio), None);
        track.format = format.append(&track.format);
        Ok(track)
    }

    /// Stream header
    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// BITMAPINFOHEADER of a video track
    pub fn video_format(&self) -> Option<&VideoFormat> {
        self.video.as_ref()
    }

    /// WAVEFORMATEX of an audio track
    pub fn audio_format(&self) -> Option<&AudioFormat> {
        self.audio.as_ref()
    }

    /// Track format
    pub fn format(&self) -> &Format {
        &self.format
    }

    /// Stream name from the strn chunk
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn stream_type(&self) -> StreamType {
        self.header.stream_type
    }

    pub fn media_type(&self) -> Option<MediaType> {
        self.header.stream_type.media_type()
    }

    /// Seconds per tick numerator
    pub fn scale(&self) -> u32 {
        self.header.scale
    }

    /// Ticks per second
    pub fn rate(&self) -> u32 {
        self.header.rate
    }

    /// Ticks per second as a rational
    pub fn time_scale(&self) -> Rational {
        Rational::new(self.header.rate as i64, self.header.scale as i64)
    }

    /// Track start in ticks
    pub fn start_time(&self) -> i64 {
        self.header.start as i64
    }

    /// Total length in ticks
    pub fn length(&self) -> i64 {
        self.length
    }

    /// Largest chunk so far
    pub fn max_chunk_size(&self) -> u32 {
        self.max_chunk_size
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Bytes per audio frame, or 0 for non audio tracks
    pub fn block_align(&self) -> u16 {
        self.audio.as_ref().map_or(0, |a| a.block_align)
    }

    /// Ticks covered by a chunk of `length` bytes
    pub fn ticks_for_chunk(&self, length: u32) -> i64 {
        match (self.header.stream_type, self.block_align()) {
            (StreamType::Audio, align) if align > 0 => length as i64 / align as i64,
            (StreamType::Audio, _) => length as i64,
            _ => 1,
        }
    }

    /// Append a sample at the end of the track.
    pub fn push_sample(&mut self, offset: u64, length: u32, duration: i64, keyframe: bool) {
        self.samples.push(Sample {
            offset,
            length,
            timestamp: self.length,
            duration,
            keyframe,
        });
        self.length += duration;
        self.unit_durations &= duration == 1;
        self.max_chunk_size = self.max_chunk_size.max(length);
    }

    /// Convert ticks (relative to the file start) to seconds
    pub fn ticks_to_time(&self, ticks: i64) -> Rational {
        if self.header.rate == 0 {
            return Rational::ZERO;
        }
        Rational::new(ticks, 1) * Rational::new(self.header.scale as i64, self.header.rate as i64)
    }

    /// Duration of the track including its start offset
    pub fn duration(&self) -> Rational {
        self.ticks_to_time(self.length + self.start_time())
    }

    /// Index of the sample playing at `time`, clamped to `[0, sample_count]`.
    pub fn time_to_sample(&self, time: Rational) -> usize {
        let count = self.samples.len();
        if time.is_infinite() {
            return if time.is_positive() { count } else { 0 };
        }
        if self.header.scale == 0 {
            return 0;
        }

        let num = time.num() as i128 * self.header.rate as i128;
        let den = time.den() as i128 * self.header.scale as i128;
        let ideal = num.div_euclid(den) - self.start_time() as i128;
        if ideal <= 0 {
            return 0;
        }

        let index = if self.unit_durations {
            ideal
        } else {
            // first sample whose end lies past the ideal tick
            self.samples
                .partition_point(|s| ((s.timestamp + s.duration) as i128) <= ideal)
                as i128
        };
        index.clamp(0, count as i128) as usize
    }

    /// Start time of a sample, or the end of the last sample past the end.
    pub fn sample_to_time(&self, sample: usize) -> Rational {
        let Some(last) = self.samples.len().checked_sub(1) else {
            return self.ticks_to_time(self.start_time());
        };
        let clamped = &self.samples[sample.min(last)];
        let mut ticks = self.start_time() + clamped.timestamp;
        if sample > last {
            ticks += clamped.duration;
        }
        self.ticks_to_time(ticks)
    }

    /// Move the read cursor to the closest keyframe at or before `time`.
    pub fn seek_keyframe(&mut self, time: Rational) {
        if self.samples.is_empty() {
            self.read_index = 0;
            return;
        }
        let mut index = self.time_to_sample(time).min(self.samples.len() - 1);
        while index > 0 && !self.samples[index].keyframe {
            index -= 1;
        }
        self.read_index = index;
    }

    /// Next sample to read, if any
    pub fn pending(&self) -> Option<&Sample> {
        self.samples.get(self.read_index)
    }

    /// Time of the next unread sample
    pub fn read_time(&self) -> Rational {
        self.sample_to_time(self.read_index)
    }

    pub(crate) fn set_length_in_header(&mut self) {
        self.header.length = self.length.clamp(0, u32::MAX as i64) as u32;
        self.header.suggested_buffer_size = self.max_chunk_size;
    }
}

/// Map an encoding string to the 4 byte compression code.
pub fn fourcc_for_encoding(encoding: &str) -> Result<[u8; 4]> {
    encoding
        .as_bytes()
        .try_into()
        .map_err(|_| AviError::UnsupportedMediaType(format!("encoding {:?} is not a FourCC", encoding)))
}

/// Map a compression code back to an encoding string.
pub fn encoding_for_fourcc(fourcc: [u8; 4]) -> String {
    if fourcc == [0; 4] || &fourcc == b"DIB " || &fourcc == b"RGB " {
        ENCODING_AVI_DIB.to_string()
    } else {
        String::from_utf8_lossy(&fourcc).into_owned()
    }
}

fn stream_format(
    header: &StreamHeader,
    video: Option<&VideoFormat>,
    audio: Option<&AudioFormat>,
) -> Format {
    let mut builder = Format::builder();
    if let Some(media) = header.stream_type.media_type() {
        builder = builder.with(keys::MEDIA_TYPE, media);
    }

    if let Some(vf) = video {
        builder = builder
            .with(keys::ENCODING, encoding_for_fourcc(vf.compression))
            .with(keys::WIDTH, vf.width)
            .with(keys::HEIGHT, vf.height.abs())
            .with(keys::DEPTH, vf.bit_count as i32);
        if header.scale > 0 && header.rate > 0 {
            builder = builder.with(
                keys::FRAME_RATE,
                Rational::new(header.rate as i64, header.scale as i64),
            );
        }
    }

    if let Some(af) = audio {
        builder = builder
            .with(keys::SAMPLE_RATE, Rational::from_int(af.samples_per_sec as i64))
            .with(keys::CHANNELS, af.channels as i32)
            .with(keys::SAMPLE_SIZE_IN_BITS, af.bits_per_sample as i32)
            .with(keys::FRAME_SIZE, af.block_align as i32);
        if af.format_tag == AudioFormat::PCM {
            let signed = af.bits_per_sample > 8;
            builder = builder
                .with_str(
                    keys::ENCODING,
                    if signed { ENCODING_PCM_SIGNED } else { ENCODING_PCM_UNSIGNED },
                )
                .with(keys::SIGNED, signed)
                .with(keys::BYTE_ORDER, ByteOrder::LittleEndian);
        } else {
            builder = builder.with_str(keys::ENCODING, af.tag_name());
        }
    }

    builder.build()
}

/// rcFrame only holds 16 bit coordinates; larger frames saturate.
fn frame_extent(size: i32) -> i16 {
    i16::try_from(size.unsigned_abs()).unwrap_or(i16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_track(samples: usize) -> Track {
        let format = Format::builder()
            .with(keys::MEDIA_TYPE, MediaType::Video)
            .with(keys::FRAME_RATE, Rational::from_int(30))
            .with(keys::WIDTH, 320)
            .with(keys::HEIGHT, 160)
            .build();
        let mut track = Track::for_format(&format).unwrap();
        for i in 0..samples {
            track.push_sample(i as u64 * 100, 100, 1, i % 10 == 0);
        }
        track
    }

    fn audio_track(chunks: &[u32]) -> Track {
        let format = Format::builder()
            .with(keys::MEDIA_TYPE, MediaType::Audio)
            .with(keys::SAMPLE_RATE, Rational::from_int(8000))
            .with(keys::CHANNELS, 1)
            .with(keys::SAMPLE_SIZE_IN_BITS, 16)
            .build();
        let mut track = Track::for_format(&format).unwrap();
        for &len in chunks {
            let ticks = track.ticks_for_chunk(len);
            track.push_sample(0, len, ticks, true);
        }
        track
    }

    #[test]
    fn test_video_track_from_format() {
        let track = video_track(0);
        assert_eq!(track.rate(), 30);
        assert_eq!(track.scale(), 1);
        assert_eq!(&track.header().handler, b"DIB ");
        assert_eq!(track.video_format().unwrap().image_size, 960 * 160);
        assert_eq!(track.format().get(keys::DEPTH), Some(24));
        assert_eq!(track.format().encoding().as_deref(), Some(ENCODING_AVI_DIB));
    }

    #[test]
    fn test_large_frame_saturates_rect() {
        let format = Format::builder()
            .with(keys::MEDIA_TYPE, MediaType::Video)
            .with(keys::FRAME_RATE, Rational::from_int(5))
            .with(keys::WIDTH, 40_000)
            .with(keys::HEIGHT, 32_767)
            .build();
        let track = Track::for_format(&format).unwrap();
        let rect = track.header().frame;
        assert_eq!((rect.right, rect.bottom), (i16::MAX, 32_767));
        assert_eq!(track.video_format().unwrap().width, 40_000);
        assert_eq!(video_track(0).header().frame.right, 320);
    }

    #[test]
    fn test_ntsc_frame_rate() {
        let format = Format::builder()
            .with(keys::MEDIA_TYPE, MediaType::Video)
            .with(keys::FRAME_RATE, Rational::new(30000, 1001))
            .build();
        let track = Track::for_format(&format).unwrap();
        assert_eq!((track.rate(), track.scale()), (30000, 1001));
    }

    #[test]
    fn test_rejects_other_media() {
        let midi = Format::builder().with(keys::MEDIA_TYPE, MediaType::Midi).build();
        assert!(matches!(
            Track::for_format(&midi),
            Err(AviError::UnsupportedMediaType(_))
        ));
        let raster = Format::builder()
            .with(keys::MEDIA_TYPE, MediaType::Video)
            .with(keys::FRAME_RATE, Rational::from_int(10))
            .with_str(keys::ENCODING, ENCODING_RASTER)
            .build();
        assert!(matches!(
            Track::for_format(&raster),
            Err(AviError::UnsupportedMediaType(_))
        ));
    }

    #[test]
    fn test_video_time_conversion() {
        let track = video_track(100);
        assert_eq!(track.duration(), Rational::new(10, 3));
        assert_eq!(track.time_to_sample(Rational::ZERO), 0);
        assert_eq!(track.time_to_sample(Rational::new(1, 2)), 15);
        assert_eq!(track.time_to_sample(Rational::new(-1, 2)), 0);
        assert_eq!(track.time_to_sample(Rational::from_int(100)), 100);
        assert_eq!(track.time_to_sample(Rational::INFINITY), 100);
        assert_eq!(track.time_to_sample(Rational::NEG_INFINITY), 0);

        assert_eq!(track.sample_to_time(15), Rational::new(1, 2));
        assert_eq!(track.sample_to_time(99), Rational::new(33, 10));
        assert_eq!(track.sample_to_time(100), Rational::new(10, 3));
        assert_eq!(track.sample_to_time(500), Rational::new(10, 3));
    }

    #[test]
    fn test_audio_time_conversion_scans_durations() {
        // 2 bytes per frame: chunks of 4000, 2000 and 4000 frames
        let track = audio_track(&[8000, 4000, 8000]);
        assert_eq!(track.length(), 10_000);
        assert_eq!(track.duration(), Rational::new(5, 4));
        assert_eq!(track.time_to_sample(Rational::new(1, 4)), 0);
        assert_eq!(track.time_to_sample(Rational::new(1, 2)), 1);
        assert_eq!(track.time_to_sample(Rational::new(3, 4)), 2);
        assert_eq!(track.time_to_sample(Rational::from_int(2)), 3);
        assert_eq!(track.sample_to_time(1), Rational::new(1, 2));
        assert_eq!(track.sample_to_time(3), Rational::new(5, 4));
    }

    #[test]
    fn test_seek_keyframe() {
        let mut track = video_track(30);
        track.seek_keyframe(Rational::new(15, 30));
        assert_eq!(track.read_index, 10);
        track.seek_keyframe(Rational::from_int(10));
        assert_eq!(track.read_index, 20);
        track.seek_keyframe(Rational::new(5, 30));
        assert_eq!(track.read_index, 0);
    }

    #[test]
    fn test_start_offset() {
        let mut header = video_track(0).header().clone();
        header.start = 30;
        let mut track = Track::from_stream(header, None, None, None);
        for _ in 0..30 {
            track.push_sample(0, 1, 1, true);
        }
        assert_eq!(track.sample_to_time(0), Rational::from_int(1));
        assert_eq!(track.time_to_sample(Rational::new(3, 2)), 15);
        assert_eq!(track.time_to_sample(Rational::new(1, 2)), 0);
        assert_eq!(track.duration(), Rational::from_int(2));
    }

    #[test]
    fn test_format_reconstruction() {
        let track = audio_track(&[]);
        let rebuilt = stream_format(track.header(), None, track.audio_format());
        assert_eq!(rebuilt.get(keys::FRAME_SIZE), Some(2));
        assert_eq!(rebuilt.get(keys::SIGNED), Some(true));
        assert_eq!(rebuilt.encoding().as_deref(), Some(ENCODING_PCM_SIGNED));
        assert!(rebuilt.matches(track.format()));
    }
}
