//! Encoding, muxing and segment rollover.

use crate::error::{CaptureError, Result};
use crate::events::{EventBus, SessionEvent};
use crate::retime::FrameRetimer;
use crate::source::Clock;
use framecap_avi::{AviWriter, AviWriterConfig};
use framecap_containers::MovieWriter;
use framecap_core::codec::{process_or_discard, Codec};
use framecap_core::{keys, Buffer, Format, MediaType, Rational};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// A freshly opened output segment.
pub struct Segment {
    pub writer: Box<dyn MovieWriter>,
    /// Human readable name, usually the file path.
    pub name: String,
}

/// Opens the numbered output segments of a session.
pub trait SegmentFactory: Send {
    /// Open segment `index`, starting at 1.
    fn create(&mut self, index: usize) -> framecap_core::Result<Segment>;
}

/// Writes segments as `<prefix>-NNN.avi` into a directory.
#[derive(Debug, Clone)]
pub struct AviSegmentFactory {
    dir: PathBuf,
    prefix: String,
    config: AviWriterConfig,
}

impl AviSegmentFactory {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            config: AviWriterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AviWriterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}-{:03}.avi", self.prefix, index))
    }
}

impl SegmentFactory for AviSegmentFactory {
    fn create(&mut self, index: usize) -> framecap_core::Result<Segment> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(index);
        let writer = AviWriter::create_with_config(&path, self.config.clone())?;
        Ok(Segment {
            writer: Box::new(writer),
            name: path.display().to_string(),
        })
    }
}

/// A segment that was closed and its final track durations.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentReport {
    pub index: usize,
    pub name: String,
    pub durations: Vec<Rational>,
}

/// Totals reported when the writer is finished.
#[derive(Debug, Clone, Default)]
pub struct MuxSummary {
    pub track_durations: Vec<Rational>,
    pub segments: Vec<SegmentReport>,
    pub buffers_written: u64,
    pub buffers_discarded: u64,
    pub failure: Option<String>,
}

struct Open {
    index: usize,
    name: String,
    writer: Box<dyn MovieWriter>,
    started_millis: u64,
}

/// Feeds capture buffers into the current segment.
///
/// Track 0 carries raster video, which is re-timed onto a fixed frame grid
/// when the writer cannot store variable frame durations and encoded before
/// it is written. Other tracks are written unchanged. After each write the
/// segment is rolled over when it reaches its data limit or maximum length;
/// the old segment is closed on a background thread.
pub struct MuxWriter {
    factory: Box<dyn SegmentFactory>,
    tracks: Vec<Format>,
    codec: Box<dyn Codec>,
    retimer: Option<FrameRetimer>,
    current: Option<Open>,
    max_segment_millis: u64,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    closers: Vec<JoinHandle<framecap_core::Result<SegmentReport>>>,
    encoded: Buffer,
    summary: MuxSummary,
}

impl MuxWriter {
    /// Negotiate `codec` from `raster_format` to the container's encoding and
    /// open the first segment.
    ///
    /// `tracks[0]` must be the video track; its encoding and size select the
    /// codec output.
    pub fn open(
        factory: Box<dyn SegmentFactory>,
        mut codec: Box<dyn Codec>,
        raster_format: Format,
        mut tracks: Vec<Format>,
        max_segment_duration: Duration,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let video = tracks
            .first()
            .filter(|f| f.media_type() == Some(MediaType::Video))
            .cloned()
            .ok_or_else(|| CaptureError::InvalidConfig("track 0 must be video".into()))?;
        codec
            .set_input_format(raster_format.clone())
            .ok_or_else(|| CaptureError::NoCodec(raster_format.to_string()))?;
        let output = codec
            .set_output_format(video.clone())
            .ok_or_else(|| CaptureError::NoCodec(video.to_string()))?;
        tracks[0] = output;

        let mut mux = Self {
            factory,
            tracks,
            codec,
            retimer: None,
            current: None,
            max_segment_millis: max_segment_duration.as_millis() as u64,
            clock,
            events,
            closers: Vec::new(),
            encoded: Buffer::new(),
            summary: MuxSummary::default(),
        };
        mux.summary.track_durations = vec![Rational::ZERO; mux.tracks.len()];
        let first = mux.open_segment(1)?;
        if !first.writer.is_vfr_supported() {
            let rate = video.get(keys::FRAME_RATE).ok_or_else(|| {
                CaptureError::InvalidConfig("video track needs a frame rate".into())
            })?;
            mux.retimer = Some(FrameRetimer::new(rate));
        }
        mux.current = Some(first);
        Ok(mux)
    }

    /// Negotiated track formats, in track order.
    pub fn tracks(&self) -> &[Format] {
        &self.tracks
    }

    pub fn segment_index(&self) -> usize {
        self.current.as_ref().map_or(0, |open| open.index)
    }

    pub fn buffers_written(&self) -> u64 {
        self.summary.buffers_written
    }

    fn open_segment(&mut self, index: usize) -> Result<Open> {
        let Segment { mut writer, name } = self.factory.create(index)?;
        for (expected, format) in self.tracks.iter().enumerate() {
            let track = writer.add_track(format.clone())?;
            if track != expected {
                return Err(CaptureError::InvalidConfig(format!(
                    "segment {} assigned track {} instead of {}",
                    name, track, expected
                )));
            }
        }
        tracing::info!(segment = index, name = %name, "segment opened");
        self.events.publish(SessionEvent::SegmentOpened {
            index,
            name: name.clone(),
        });
        Ok(Open {
            index,
            name,
            writer,
            started_millis: self.clock.now_millis(),
        })
    }

    /// Write one capture buffer.
    ///
    /// Codec failures drop the buffer and are not returned; container
    /// failures are.
    pub fn write(&mut self, buffer: Buffer) -> Result<()> {
        if buffer.track >= self.tracks.len() {
            return Err(CaptureError::InvalidConfig(format!(
                "buffer for unknown track {}",
                buffer.track
            )));
        }
        if buffer.track != 0 {
            return self.write_to_segment(&buffer);
        }

        let frames = match self.retimer.as_mut() {
            Some(retimer) => retimer.retime(&buffer),
            None => vec![buffer],
        };
        for frame in frames {
            let mut encoded = std::mem::take(&mut self.encoded);
            let result = process_or_discard(self.codec.as_mut(), &frame, &mut encoded);
            if let Err(err) = result {
                tracing::warn!(error = %err, timestamp = %frame.timestamp, "frame dropped");
                self.summary.buffers_discarded += 1;
                self.encoded = encoded;
                continue;
            }
            let written = self.write_to_segment(&encoded);
            self.encoded = encoded;
            written?;
        }
        Ok(())
    }

    fn write_to_segment(&mut self, buffer: &Buffer) -> Result<()> {
        let open = self
            .current
            .as_mut()
            .ok_or_else(|| CaptureError::Core(framecap_core::Error::invalid_state("writer finished")))?;
        open.writer.write(buffer.track, buffer)?;
        if !buffer.is_discard() {
            self.summary.track_durations[buffer.track] =
                self.summary.track_durations[buffer.track] + buffer.duration();
            self.summary.buffers_written += 1;
        }

        let elapsed = self.clock.now_millis().saturating_sub(open.started_millis);
        if open.writer.is_data_limit_reached() || elapsed >= self.max_segment_millis {
            self.rollover()?;
        }
        Ok(())
    }

    /// Close the current segment in the background and open the next one.
    pub fn rollover(&mut self) -> Result<()> {
        let next = self.segment_index() + 1;
        let opened = self.open_segment(next)?;
        if let Some(old) = self.current.replace(opened) {
            tracing::debug!(segment = old.index, "closing segment in background");
            let events = Arc::clone(&self.events);
            let handle = std::thread::Builder::new()
                .name(format!("framecap-close-{}", old.index))
                .spawn(move || close_segment(old, &events))
                .map_err(|source| CaptureError::Spawn {
                    name: "segment closer",
                    source,
                })?;
            self.closers.push(handle);
        }
        Ok(())
    }

    /// Close the current segment, wait for background closes and report.
    pub fn finish(mut self) -> MuxSummary {
        let mut failures = Vec::new();
        let mut reports = Vec::new();
        for handle in self.closers.drain(..) {
            match handle.join() {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(err)) => failures.push(err.to_string()),
                Err(_) => failures.push("segment closer panicked".to_string()),
            }
        }
        if let Some(open) = self.current.take() {
            match close_segment(open, &self.events) {
                Ok(report) => reports.push(report),
                Err(err) => failures.push(err.to_string()),
            }
        }
        reports.sort_by_key(|r| r.index);
        self.summary.segments = reports;
        if !failures.is_empty() {
            self.summary.failure = Some(failures.join("; "));
        }
        self.summary
    }
}

fn close_segment(mut open: Open, events: &EventBus) -> framecap_core::Result<SegmentReport> {
    let durations = (0..open.writer.track_count())
        .map(|t| open.writer.duration(t))
        .collect::<framecap_core::Result<Vec<_>>>()?;
    if let Err(err) = open.writer.close() {
        tracing::error!(segment = open.index, error = %err, "failed to close segment");
        return Err(err);
    }
    tracing::info!(segment = open.index, name = %open.name, "segment closed");
    events.publish(SessionEvent::SegmentClosed {
        index: open.index,
        name: open.name.clone(),
        durations: durations.clone(),
    });
    Ok(SegmentReport {
        index: open.index,
        name: open.name,
        durations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SystemClock;
    use framecap_avi::AviReader;
    use framecap_containers::MovieReader;
    use framecap_core::format::{ENCODING_AVI_DIB, ENCODING_RASTER};
    use framecap_core::{Payload, Raster, RawVideoCodec};
    use parking_lot::Mutex;
    use std::io::{Cursor, Read, Seek, SeekFrom, Write};

    /// In-memory file shared between the writer and the test.
    #[derive(Clone, Default)]
    struct SharedFile(Arc<Mutex<Cursor<Vec<u8>>>>);

    impl Write for SharedFile {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Seek for SharedFile {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.0.lock().seek(pos)
        }
    }

    impl SharedFile {
        fn reader(&self) -> AviReader<Cursor<Vec<u8>>> {
            let mut bytes = Vec::new();
            let mut inner = self.0.lock();
            inner.set_position(0);
            inner.read_to_end(&mut bytes).unwrap();
            AviReader::new(Cursor::new(bytes)).unwrap()
        }
    }

    #[derive(Default)]
    struct MemoryFactory {
        files: Arc<Mutex<Vec<SharedFile>>>,
        config: AviWriterConfig,
    }

    impl SegmentFactory for MemoryFactory {
        fn create(&mut self, index: usize) -> framecap_core::Result<Segment> {
            let file = SharedFile::default();
            self.files.lock().push(file.clone());
            Ok(Segment {
                writer: Box::new(AviWriter::new(file, self.config.clone())),
                name: format!("memory-{}", index),
            })
        }
    }

    fn raster_format() -> Format {
        Format::builder()
            .with(keys::MEDIA_TYPE, MediaType::Video)
            .with_str(keys::ENCODING, ENCODING_RASTER)
            .with(keys::WIDTH, 8)
            .with(keys::HEIGHT, 4)
            .with(keys::FRAME_RATE, Rational::from_int(10))
            .build()
    }

    fn video_track() -> Format {
        Format::builder()
            .with(keys::MEDIA_TYPE, MediaType::Video)
            .with_str(keys::ENCODING, ENCODING_AVI_DIB)
            .with(keys::WIDTH, 8)
            .with(keys::HEIGHT, 4)
            .with(keys::FRAME_RATE, Rational::from_int(10))
            .build()
    }

    fn frame(ts_millis: i64, dur_millis: i64) -> Buffer {
        Buffer {
            format: raster_format(),
            timestamp: Rational::new(ts_millis, 1000),
            sample_duration: Rational::new(dur_millis, 1000),
            payload: Payload::Raster(Arc::new(Raster::new(8, 4))),
            ..Buffer::new()
        }
    }

    fn open(factory: MemoryFactory) -> MuxWriter {
        MuxWriter::open(
            Box::new(factory),
            Box::new(RawVideoCodec::new()),
            raster_format(),
            vec![video_track()],
            Duration::from_secs(3600),
            Arc::new(SystemClock),
            Arc::new(EventBus::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_variable_frames_are_retimed() {
        let factory = MemoryFactory::default();
        let files = Arc::clone(&factory.files);
        let mut mux = open(factory);
        assert_eq!(mux.tracks()[0].get(keys::DEPTH), Some(24));

        mux.write(frame(0, 250)).unwrap();
        mux.write(frame(250, 50)).unwrap();
        // 0..250 covers frames at 0, 100 and 200; 250..300 nothing new
        assert_eq!(mux.buffers_written(), 3);
        mux.write(frame(300, 100)).unwrap();
        assert_eq!(mux.buffers_written(), 4);

        let summary = mux.finish();
        assert_eq!(summary.track_durations, vec![Rational::new(2, 5)]);
        assert_eq!(summary.segments.len(), 1);
        assert_eq!(summary.segments[0].durations, vec![Rational::new(2, 5)]);

        let reader = files.lock()[0].reader();
        assert_eq!(reader.chunk_count(0).unwrap(), 4);
        assert_eq!(reader.duration(0).unwrap(), Rational::new(2, 5));
    }

    #[test]
    fn test_codec_failure_drops_frame() {
        let mut mux = open(MemoryFactory::default());
        let mut bad = frame(0, 100);
        bad.payload = Payload::Empty;
        mux.write(bad).unwrap();
        assert_eq!(mux.buffers_written(), 0);
        let summary = mux.finish();
        assert_eq!(summary.buffers_discarded, 1);
        assert!(summary.failure.is_none());
    }

    #[test]
    fn test_rollover_on_data_limit() {
        let factory = MemoryFactory {
            // room for two 8x4 frames after the header
            config: AviWriterConfig::default().with_max_riff_size(2300),
            ..Default::default()
        };
        let files = Arc::clone(&factory.files);
        let mut mux = open(factory);
        for n in 0..6 {
            mux.write(frame(n * 100, 100)).unwrap();
        }
        assert_eq!(mux.segment_index(), 4);
        let summary = mux.finish();
        assert_eq!(summary.buffers_written, 6);
        // the segment opened by the last rollover stays empty
        assert_eq!(summary.segments[3].durations, vec![Rational::ZERO]);

        let files = files.lock();
        assert_eq!(files.len(), summary.segments.len());
        let mut chunks = 0;
        for (file, report) in files.iter().zip(&summary.segments) {
            let reader = file.reader();
            chunks += reader.chunk_count(0).unwrap();
            assert_eq!(vec![reader.duration(0).unwrap()], report.durations);
        }
        assert_eq!(chunks as u64, summary.buffers_written);
    }

    #[test]
    fn test_rejects_unknown_track() {
        let mut mux = open(MemoryFactory::default());
        let mut buffer = frame(0, 100);
        buffer.track = 2;
        assert!(matches!(mux.write(buffer), Err(CaptureError::InvalidConfig(_))));
    }
}
