//! Recorder configuration.

use crate::compositor::CursorStyle;
use crate::error::{CaptureError, Result};
use crate::queue::OverflowPolicy;
use framecap_core::format::{keys, ByteOrder, Format, MediaType, ENCODING_PCM_SIGNED, ENCODING_PCM_UNSIGNED};
use framecap_core::Rational;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// PCM parameters of the audio track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioCaptureConfig {
    /// Frames per second.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Bits per sample.
    pub sample_size_in_bits: u16,
}

impl Default for AudioCaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            sample_size_in_bits: 16,
        }
    }
}

impl AudioCaptureConfig {
    /// Bytes per audio frame.
    pub fn frame_size(&self) -> usize {
        self.channels as usize * ((self.sample_size_in_bits as usize + 7) / 8)
    }

    /// Little endian PCM format for the audio track.
    pub fn format(&self) -> Format {
        let signed = self.sample_size_in_bits > 8;
        Format::builder()
            .with(keys::MEDIA_TYPE, MediaType::Audio)
            .with_str(
                keys::ENCODING,
                if signed { ENCODING_PCM_SIGNED } else { ENCODING_PCM_UNSIGNED },
            )
            .with(keys::SAMPLE_RATE, Rational::from_int(self.sample_rate as i64))
            .with(keys::CHANNELS, self.channels as i32)
            .with(keys::SAMPLE_SIZE_IN_BITS, self.sample_size_in_bits as i32)
            .with(keys::FRAME_SIZE, self.frame_size() as i32)
            .with(keys::SIGNED, signed)
            .with(keys::BYTE_ORDER, ByteOrder::LittleEndian)
            .build()
    }

    /// Frames per audio chunk: half a second for even rates, a second otherwise.
    pub fn frames_per_chunk(&self) -> usize {
        if self.sample_rate % 2 == 0 {
            self.sample_rate as usize / 2
        } else {
            self.sample_rate as usize
        }
    }
}

/// Capture session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Screen grabs per second.
    pub screen_rate: Rational,
    /// Cursor samples per second. Zero disables cursor capture.
    pub cursor_rate: Rational,
    /// Cursor sprite.
    pub cursor_style: CursorStyle,
    /// Longest video frame emitted while the cursor stands still.
    pub max_frame_duration: Duration,
    /// Wall clock length after which a new segment is started.
    pub max_segment_duration: Duration,
    /// Writer queue capacity. Derived from the video rate when `None`.
    pub writer_queue_capacity: Option<usize>,
    /// What producers do when the writer queue is full.
    pub writer_overflow: OverflowPolicy,
    /// What the cursor producer does when its queue is full.
    pub cursor_overflow: OverflowPolicy,
    /// Audio track parameters. `None` records video only.
    pub audio: Option<AudioCaptureConfig>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            screen_rate: Rational::from_int(15),
            cursor_rate: Rational::from_int(30),
            cursor_style: CursorStyle::Black,
            max_frame_duration: Duration::from_millis(1000),
            max_segment_duration: Duration::from_secs(60 * 60),
            writer_queue_capacity: None,
            writer_overflow: OverflowPolicy::Block,
            cursor_overflow: OverflowPolicy::DropOldest,
            audio: None,
        }
    }
}

impl RecorderConfig {
    pub fn with_screen_rate(mut self, rate: Rational) -> Self {
        self.screen_rate = rate;
        self
    }

    pub fn with_cursor_rate(mut self, rate: Rational) -> Self {
        self.cursor_rate = rate;
        self
    }

    pub fn with_cursor_style(mut self, style: CursorStyle) -> Self {
        self.cursor_style = style;
        self
    }

    pub fn with_max_frame_duration(mut self, duration: Duration) -> Self {
        self.max_frame_duration = duration;
        self
    }

    pub fn with_max_segment_duration(mut self, duration: Duration) -> Self {
        self.max_segment_duration = duration;
        self
    }

    pub fn with_writer_queue(mut self, capacity: usize, policy: OverflowPolicy) -> Self {
        self.writer_queue_capacity = Some(capacity);
        self.writer_overflow = policy;
        self
    }

    pub fn with_audio(mut self, audio: AudioCaptureConfig) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Check rates and durations.
    pub fn validate(&self) -> Result<()> {
        if !self.screen_rate.is_positive() || self.screen_rate.is_infinite() {
            return Err(CaptureError::InvalidConfig(format!(
                "screen rate must be positive, got {}",
                self.screen_rate
            )));
        }
        if self.cursor_rate.is_negative() || self.cursor_rate.is_infinite() {
            return Err(CaptureError::InvalidConfig(format!(
                "cursor rate must not be negative, got {}",
                self.cursor_rate
            )));
        }
        if self.max_frame_duration.is_zero() || self.max_segment_duration.is_zero() {
            return Err(CaptureError::InvalidConfig(
                "frame and segment durations must be non-zero".into(),
            ));
        }
        if self.writer_queue_capacity == Some(0) {
            return Err(CaptureError::InvalidConfig("writer queue needs room".into()));
        }
        if let Some(audio) = &self.audio {
            if audio.sample_rate == 0 || audio.channels == 0 || audio.sample_size_in_bits == 0 {
                return Err(CaptureError::InvalidConfig(format!(
                    "invalid audio parameters {:?}",
                    audio
                )));
            }
        }
        Ok(())
    }

    /// Whether the cursor is sampled at all.
    pub fn cursor_enabled(&self) -> bool {
        self.cursor_rate.is_positive()
    }

    /// Frame rate of the video track: the higher of the screen and cursor rates.
    pub fn video_rate(&self) -> Rational {
        if self.cursor_enabled() {
            self.screen_rate.max(self.cursor_rate)
        } else {
            self.screen_rate
        }
    }

    pub fn writer_capacity(&self) -> usize {
        self.writer_queue_capacity
            .unwrap_or_else(|| self.video_rate().ceil(1).to_i64().max(1) as usize + 1)
    }

    pub fn cursor_capacity(&self) -> usize {
        self.cursor_rate.ceil(1).to_i64().max(1) as usize
    }
}

/// Timer period for a rate, at least one millisecond.
pub(crate) fn period_for(rate: Rational) -> Duration {
    let millis = (Rational::from_int(1000) / rate).floor(1).to_i64().max(1);
    Duration::from_millis(millis as u64)
}
