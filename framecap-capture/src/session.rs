//! Capture sessions.
//!
//! A session runs one producer thread per source and a single writer thread.
//! Screen grabs are composited with the cursor and pushed, together with
//! audio chunks, onto the writer queue. The writer thread drains that queue
//! into a [`MuxWriter`]. The active writer, the session start time and the
//! stop time live behind one lock; every container call happens under it.

use crate::compositor::{Compositor, CursorSprite};
use crate::config::{period_for, AudioCaptureConfig, RecorderConfig};
use crate::error::{CaptureError, Result};
use crate::events::{EventBus, SessionEvent, State};
use crate::queue::{BoundedQueue, Offer};
use crate::source::{
    AudioSource, Bounds, CaptureSources, Captured, Clock, CursorSource, Point, ScreenSource,
    SystemClock,
};
use crate::writer::{MuxWriter, SegmentFactory, SegmentReport};
use bytes::Bytes;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use framecap_core::codec::Codec;
use framecap_core::format::ENCODING_AVI_DIB;
use framecap_core::{keys, Buffer, BufferFlags, Format, MediaType, Payload, Rational, RawVideoCodec};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const AUDIO_TRACK: usize = 1;
const MIN_GRACE: Duration = Duration::from_millis(100);

/// What a stopped session produced.
#[derive(Debug, Clone)]
pub struct StopReport {
    /// Final state, [`State::Done`] or [`State::Failed`].
    pub state: State,
    /// Per-track sum of written sample durations over all segments.
    pub track_durations: Vec<Rational>,
    pub segments: Vec<SegmentReport>,
    pub buffers_written: u64,
    /// Buffers lost to queue overflow or codec failures.
    pub buffers_dropped: u64,
    pub failure: Option<String>,
}

struct Monitor {
    mux: Option<MuxWriter>,
    start_millis: u64,
    stop_millis: u64,
}

/// A producer thread with a cancel signal.
struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
    cancel: Option<Sender<()>>,
    exited: Receiver<()>,
    grace: Duration,
    // audio runs until it reaches the stop time by itself
    drain: bool,
}

impl Worker {
    fn spawn<F>(name: &'static str, grace: Duration, drain: bool, body: F) -> Result<Self>
    where
        F: FnOnce(Receiver<()>) + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = bounded::<()>(0);
        let (exit_tx, exit_rx) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name(format!("framecap-{}", name))
            .spawn(move || {
                let _exit = exit_tx;
                body(cancel_rx);
            })
            .map_err(|source| CaptureError::Spawn { name, source })?;
        Ok(Self {
            name,
            handle,
            cancel: Some(cancel_tx),
            exited: exit_rx,
            grace,
            drain,
        })
    }

    fn wait(&self, timeout: Duration) -> bool {
        matches!(
            self.exited.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    fn halt(mut self) {
        if !(self.drain && self.wait(self.grace)) {
            self.cancel.take();
            if !self.wait(self.grace) {
                tracing::warn!(worker = self.name, "worker did not stop in time, detaching");
                return;
            }
        }
        if self.handle.join().is_err() {
            tracing::error!(worker = self.name, "worker panicked");
        }
    }
}

fn is_cancelled(cancel: &Receiver<()>) -> bool {
    !matches!(cancel.try_recv(), Err(TryRecvError::Empty))
}

/// Call `tick` every `period` until it returns false or `cancel` fires.
/// Missed ticks are skipped.
fn run_timer(period: Duration, cancel: &Receiver<()>, mut tick: impl FnMut() -> bool) {
    let mut next = Instant::now();
    loop {
        if !tick() {
            break;
        }
        next += period;
        let now = Instant::now();
        if next < now {
            next = now;
        }
        match cancel.recv_deadline(next) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => break,
        }
    }
}

struct Shared {
    config: RecorderConfig,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    state: Mutex<State>,
    monitor: Mutex<Monitor>,
    writer_queue: BoundedQueue<Buffer>,
    cursor_queue: Option<BoundedQueue<Captured<Point>>>,
    workers: Mutex<Vec<Worker>>,
    writer_thread: Mutex<Option<JoinHandle<()>>>,
    failure: Mutex<Option<String>>,
    report: Mutex<Option<StopReport>>,
}

impl Shared {
    fn transition(&self, from: &[State], to: State) -> bool {
        let previous = {
            let mut state = self.state.lock();
            if !from.contains(&*state) {
                return false;
            }
            std::mem::replace(&mut *state, to)
        };
        tracing::info!(from = %previous, to = %to, "session state changed");
        self.events
            .publish(SessionEvent::StateChanged { from: previous, to });
        true
    }

    fn record_failure(&self, message: String) -> bool {
        tracing::error!(error = %message, "capture failed");
        self.failure.lock().get_or_insert_with(|| message.clone());
        let failed = self.transition(&[State::Recording], State::Failed);
        self.events.publish(SessionEvent::Failure { message });
        failed
    }

    /// Record a failure and stop the session from a helper thread.
    fn fail(self: &Arc<Self>, message: String) {
        if !self.record_failure(message) {
            return;
        }
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("framecap-stopper".into())
            .spawn(move || {
                if let Err(err) = shared.stop() {
                    tracing::error!(error = %err, "stopping failed session");
                }
            });
        if let Err(err) = spawned {
            tracing::error!(error = %err, "failed to spawn stopper thread");
        }
    }

    /// Queue a buffer for the writer. Returns false once the queue is closed.
    fn enqueue(&self, buffer: Buffer) -> bool {
        match self.writer_queue.offer(buffer) {
            Offer::Queued => true,
            Offer::Evicted | Offer::Rejected => {
                let total = self.writer_queue.dropped();
                tracing::debug!(total, "writer queue overflow");
                self.events.publish(SessionEvent::BuffersDropped {
                    queue: "writer",
                    total,
                });
                true
            }
            Offer::Closed => false,
        }
    }

    fn stop_millis(&self) -> u64 {
        self.monitor.lock().stop_millis
    }

    fn run_writer(self: &Arc<Self>) {
        while let Some(buffer) = self.writer_queue.take() {
            let result = match self.monitor.lock().mux.as_mut() {
                Some(mux) => mux.write(buffer),
                None => break,
            };
            if let Err(err) = result {
                self.fail(format!("writing failed: {}", err));
                self.writer_queue.close();
                break;
            }
        }
        tracing::debug!("writer thread finished");
    }

    fn stop(self: &Arc<Self>) -> Result<StopReport> {
        let mut report = self.report.lock();
        if let Some(done) = report.as_ref() {
            return Ok(done.clone());
        }
        if *self.state.lock() == State::Idle {
            return Err(CaptureError::NotRecording);
        }

        {
            let mut monitor = self.monitor.lock();
            monitor.stop_millis = monitor.stop_millis.min(self.clock.now_millis());
        }
        tracing::info!("stopping capture");

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            worker.halt();
        }
        if let Some(queue) = &self.cursor_queue {
            queue.close();
        }
        self.writer_queue.close();
        if let Some(handle) = self.writer_thread.lock().take() {
            if handle.join().is_err() {
                tracing::error!("writer thread panicked");
            }
        }

        let summary = self
            .monitor
            .lock()
            .mux
            .take()
            .map(MuxWriter::finish)
            .unwrap_or_default();
        if let Some(message) = &summary.failure {
            self.record_failure(message.clone());
        }
        self.transition(&[State::Recording], State::Done);

        let dropped = self.writer_queue.dropped()
            + self.cursor_queue.as_ref().map_or(0, |q| q.dropped())
            + summary.buffers_discarded;
        let done = StopReport {
            state: *self.state.lock(),
            track_durations: summary.track_durations,
            segments: summary.segments,
            buffers_written: summary.buffers_written,
            buffers_dropped: dropped,
            failure: self.failure.lock().clone(),
        };
        tracing::info!(
            state = %done.state,
            segments = done.segments.len(),
            written = done.buffers_written,
            dropped = done.buffers_dropped,
            "capture stopped"
        );
        *report = Some(done.clone());
        Ok(done)
    }
}

/// A recording of screen, cursor and audio sources into segmented files.
///
/// ```no_run
/// use framecap_capture::{AviSegmentFactory, CaptureSession, CaptureSources, RecorderConfig};
/// # fn screen() -> Box<dyn framecap_capture::ScreenSource> { unimplemented!() }
///
/// # fn main() -> framecap_capture::Result<()> {
/// let mut session = CaptureSession::new(
///     RecorderConfig::default(),
///     CaptureSources::new(screen()),
///     Box::new(AviSegmentFactory::new("recordings", "screen")),
/// )?;
/// session.start()?;
/// std::thread::sleep(std::time::Duration::from_secs(5));
/// let report = session.stop()?;
/// println!("{} segments", report.segments.len());
/// # Ok(())
/// # }
/// ```
pub struct CaptureSession {
    shared: Arc<Shared>,
    pending: Option<(CaptureSources, Box<dyn SegmentFactory>)>,
    codec: Option<Box<dyn Codec>>,
}

impl CaptureSession {
    /// Create an idle session.
    ///
    /// An audio source requires an audio configuration with a matching
    /// format, and the other way round.
    pub fn new(
        config: RecorderConfig,
        mut sources: CaptureSources,
        factory: Box<dyn SegmentFactory>,
    ) -> Result<Self> {
        config.validate()?;
        let bounds = sources.screen.bounds();
        if bounds.width == 0 || bounds.height == 0 {
            return Err(CaptureError::InvalidConfig(format!(
                "empty capture area {:?}",
                bounds
            )));
        }
        match (&config.audio, &sources.audio) {
            (Some(wanted), Some(source)) => {
                if !source.format().matches(&wanted.format()) {
                    return Err(CaptureError::InvalidConfig(format!(
                        "audio source delivers {}, configured {}",
                        source.format(),
                        wanted.format()
                    )));
                }
            }
            (None, None) => {}
            (Some(_), None) => {
                return Err(CaptureError::InvalidConfig("audio configured without a source".into()))
            }
            (None, Some(_)) => {
                return Err(CaptureError::InvalidConfig(
                    "audio source without an audio configuration".into(),
                ))
            }
        }
        if !config.cursor_enabled() {
            sources.cursor = None;
        }

        let cursor_queue = sources
            .cursor
            .as_ref()
            .map(|_| BoundedQueue::new(config.cursor_capacity(), config.cursor_overflow));
        let writer_queue = BoundedQueue::new(config.writer_capacity(), config.writer_overflow);
        let shared = Shared {
            config,
            clock: Arc::new(SystemClock),
            events: Arc::new(EventBus::new()),
            state: Mutex::new(State::Idle),
            monitor: Mutex::new(Monitor {
                mux: None,
                start_millis: 0,
                stop_millis: u64::MAX,
            }),
            writer_queue,
            cursor_queue,
            workers: Mutex::new(Vec::new()),
            writer_thread: Mutex::new(None),
            failure: Mutex::new(None),
            report: Mutex::new(None),
        };
        Ok(Self {
            shared: Arc::new(shared),
            pending: Some((sources, factory)),
            codec: None,
        })
    }

    /// Use `clock` for timestamps and segment lengths. Only effective before
    /// `start`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.clock = clock;
        }
        self
    }

    /// Encode video with `codec` instead of uncompressed DIB.
    pub fn with_codec(mut self, codec: Box<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.shared.config
    }

    pub fn state(&self) -> State {
        *self.shared.state.lock()
    }

    pub fn failure(&self) -> Option<String> {
        self.shared.failure.lock().clone()
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Open the first segment and start all capture threads.
    pub fn start(&mut self) -> Result<()> {
        if self.state() != State::Idle {
            return Err(CaptureError::AlreadyStarted);
        }
        let (sources, factory) = self.pending.take().ok_or(CaptureError::AlreadyStarted)?;
        let shared = &self.shared;
        let config = &shared.config;

        let start_millis = shared.clock.now_millis();
        let bounds = sources.screen.bounds();
        let video_rate = config.video_rate();
        let sprite = sources
            .cursor
            .as_ref()
            .map(|_| CursorSprite::arrow(config.cursor_style));
        let compositor = Compositor::new(
            bounds,
            video_rate,
            sprite,
            start_millis,
            config.max_frame_duration,
        );

        let mut tracks = vec![video_track_format(bounds, video_rate)];
        if let Some(audio) = &config.audio {
            tracks.push(audio.format());
        }
        let codec = self
            .codec
            .take()
            .unwrap_or_else(|| Box::new(RawVideoCodec::new()));
        let mux = MuxWriter::open(
            factory,
            codec,
            compositor.format().clone(),
            tracks,
            config.max_segment_duration,
            Arc::clone(&shared.clock),
            Arc::clone(&shared.events),
        )?;
        *shared.monitor.lock() = Monitor {
            mux: Some(mux),
            start_millis,
            stop_millis: u64::MAX,
        };
        shared.transition(&[State::Idle], State::Recording);

        if let Err(err) = self.spawn_threads(sources, compositor) {
            shared.record_failure(err.to_string());
            shared.stop()?;
            return Err(err);
        }
        Ok(())
    }

    fn spawn_threads(&self, sources: CaptureSources, compositor: Compositor) -> Result<()> {
        let shared = &self.shared;
        let writer = {
            let shared = Arc::clone(shared);
            thread::Builder::new()
                .name("framecap-writer".into())
                .spawn(move || shared.run_writer())
                .map_err(|source| CaptureError::Spawn {
                    name: "writer",
                    source,
                })?
        };
        *shared.writer_thread.lock() = Some(writer);

        let CaptureSources {
            screen,
            cursor,
            audio,
        } = sources;
        let mut workers = Vec::new();
        if let Some(cursor) = cursor {
            workers.push(spawn_cursor(shared, cursor)?);
        }
        workers.push(spawn_screen(shared, screen, compositor)?);
        if let (Some(audio), Some(config)) = (audio, shared.config.audio.clone()) {
            workers.push(spawn_audio(shared, audio, config)?);
        }
        shared.workers.lock().extend(workers);
        Ok(())
    }

    /// Stop capturing, drain the writer queue and close the last segment.
    ///
    /// Stopping a finished session returns the same report again.
    pub fn stop(&self) -> Result<StopReport> {
        self.shared.stop()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.state() == State::Recording {
            if let Err(err) = self.shared.stop() {
                tracing::warn!(error = %err, "stopping session on drop");
            }
        }
    }
}

fn video_track_format(bounds: Bounds, frame_rate: Rational) -> Format {
    Format::builder()
        .with(keys::MEDIA_TYPE, MediaType::Video)
        .with_str(keys::ENCODING, ENCODING_AVI_DIB)
        .with(keys::WIDTH, bounds.width as i32)
        .with(keys::HEIGHT, bounds.height as i32)
        .with(keys::FRAME_RATE, frame_rate)
        .build()
}

fn grace_for(period: Duration) -> Duration {
    period.max(MIN_GRACE)
}

fn spawn_screen(
    shared: &Arc<Shared>,
    mut screen: Box<dyn ScreenSource>,
    mut compositor: Compositor,
) -> Result<Worker> {
    let period = period_for(shared.config.screen_rate);
    let bounds = screen.bounds();
    let shared = Arc::clone(shared);
    Worker::spawn("screen", grace_for(period), false, move |cancel| {
        run_timer(period, &cancel, || {
            let started = shared.clock.now_millis();
            let grab = match screen.capture_frame() {
                Ok(grab) => grab,
                Err(err) => {
                    shared.fail(format!("screen capture failed: {}", err));
                    return false;
                }
            };
            if grab.value.width() != bounds.width || grab.value.height() != bounds.height {
                shared.fail(format!(
                    "screen grab is {}x{}, expected {}x{}",
                    grab.value.width(),
                    grab.value.height(),
                    bounds.width,
                    bounds.height
                ));
                return false;
            }
            let stop = shared.stop_millis();
            compositor
                .compose(started, grab, shared.cursor_queue.as_ref(), stop)
                .into_iter()
                .all(|frame| shared.enqueue(frame))
        });
    })
}

fn spawn_cursor(shared: &Arc<Shared>, mut cursor: Box<dyn CursorSource>) -> Result<Worker> {
    let period = period_for(shared.config.cursor_rate);
    let shared = Arc::clone(shared);
    Worker::spawn("cursor", grace_for(period), false, move |cancel| {
        let Some(queue) = shared.cursor_queue.as_ref() else {
            return;
        };
        run_timer(period, &cancel, || match cursor.position() {
            Ok(sample) => match queue.offer(sample) {
                Offer::Queued => true,
                Offer::Evicted | Offer::Rejected => {
                    shared.events.publish(SessionEvent::BuffersDropped {
                        queue: "cursor",
                        total: queue.dropped(),
                    });
                    true
                }
                Offer::Closed => false,
            },
            Err(err) => {
                shared.fail(format!("cursor capture failed: {}", err));
                false
            }
        });
    })
}

fn spawn_audio(
    shared: &Arc<Shared>,
    mut audio: Box<dyn AudioSource>,
    config: AudioCaptureConfig,
) -> Result<Worker> {
    let frames_per_chunk = config.frames_per_chunk();
    let chunk = Duration::from_millis(frames_per_chunk as u64 * 1000 / config.sample_rate as u64);
    let shared = Arc::clone(shared);
    Worker::spawn("audio", chunk + MIN_GRACE, true, move |cancel| {
        let format = config.format();
        let frame_size = config.frame_size();
        let rate = config.sample_rate as i64;
        let sample_duration = Rational::new(1, rate);
        let mut data = vec![0u8; frames_per_chunk * frame_size];
        let mut total_frames: i64 = 0;

        while !is_cancelled(&cancel) {
            let read = match audio.read(&mut data) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    shared.fail(format!("audio capture failed: {}", err));
                    break;
                }
            };
            let frames = (read / frame_size) as i64;
            if frames == 0 {
                continue;
            }

            let timestamp = sample_duration.mul_int(total_frames);
            total_frames += frames;
            let (start, stop) = {
                let monitor = shared.monitor.lock();
                (monitor.start_millis, monitor.stop_millis)
            };
            let mut count = frames;
            let mut last = false;
            if stop != u64::MAX {
                let stop_at = Rational::new(stop.saturating_sub(start) as i64, 1000);
                if timestamp + sample_duration.mul_int(frames) > stop_at {
                    count = ((stop_at - timestamp) * Rational::from_int(rate))
                        .floor(1)
                        .to_i64()
                        .clamp(0, frames);
                    last = true;
                }
            }

            if count > 0 {
                let buffer = Buffer {
                    format: format.clone(),
                    timestamp,
                    sample_duration,
                    sample_count: count,
                    track: AUDIO_TRACK,
                    flags: BufferFlags::KEYFRAME,
                    payload: Payload::Bytes(Bytes::copy_from_slice(
                        &data[..count as usize * frame_size],
                    )),
                };
                if !shared.enqueue(buffer) {
                    break;
                }
            }
            if last {
                break;
            }
        }
        tracing::debug!(frames = total_frames, "audio capture finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Segment;
    use framecap_core::Raster;

    struct StaticScreen;

    impl ScreenSource for StaticScreen {
        fn bounds(&self) -> Bounds {
            Bounds::new(0, 0, 16, 8)
        }

        fn capture_frame(&mut self) -> framecap_core::Result<Captured<Raster>> {
            Ok(Captured::new(Raster::new(16, 8), SystemClock.now_millis()))
        }
    }

    struct NoSegments;

    impl SegmentFactory for NoSegments {
        fn create(&mut self, _index: usize) -> framecap_core::Result<Segment> {
            Err(framecap_core::Error::invalid_state("no storage"))
        }
    }

    #[test]
    fn test_run_timer_stops_on_cancel() {
        let (tx, rx) = bounded::<()>(0);
        let mut ticks = 0;
        let handle = thread::spawn(move || {
            run_timer(Duration::from_millis(5), &rx, || {
                ticks += 1;
                true
            });
            ticks
        });
        thread::sleep(Duration::from_millis(50));
        drop(tx);
        assert!(handle.join().unwrap() >= 2);
    }

    #[test]
    fn test_run_timer_stops_when_tick_fails() {
        let (_tx, rx) = bounded::<()>(0);
        let mut ticks = 0;
        run_timer(Duration::from_millis(1), &rx, || {
            ticks += 1;
            ticks < 3
        });
        assert_eq!(ticks, 3);
    }

    #[test]
    fn test_stop_before_start() {
        let session = CaptureSession::new(
            RecorderConfig::default(),
            CaptureSources::new(Box::new(StaticScreen)),
            Box::new(NoSegments),
        )
        .unwrap();
        assert_eq!(session.state(), State::Idle);
        assert!(matches!(session.stop(), Err(CaptureError::NotRecording)));
    }

    #[test]
    fn test_start_fails_without_storage() {
        let mut session = CaptureSession::new(
            RecorderConfig::default(),
            CaptureSources::new(Box::new(StaticScreen)),
            Box::new(NoSegments),
        )
        .unwrap();
        assert!(matches!(session.start(), Err(CaptureError::Core(_))));
        assert_eq!(session.state(), State::Idle);
        // the sources were consumed
        assert!(matches!(session.start(), Err(CaptureError::AlreadyStarted)));
    }

    #[test]
    fn test_audio_requires_configuration() {
        struct Silence;
        impl AudioSource for Silence {
            fn format(&self) -> Format {
                AudioCaptureConfig::default().format()
            }
            fn read(&mut self, _buf: &mut [u8]) -> framecap_core::Result<usize> {
                Ok(0)
            }
        }
        let result = CaptureSession::new(
            RecorderConfig::default(),
            CaptureSources::new(Box::new(StaticScreen)).with_audio(Box::new(Silence)),
            Box::new(NoSegments),
        );
        assert!(matches!(result, Err(CaptureError::InvalidConfig(_))));

        let mismatched = RecorderConfig::default().with_audio(AudioCaptureConfig {
            sample_rate: 8000,
            ..Default::default()
        });
        let result = CaptureSession::new(
            mismatched,
            CaptureSources::new(Box::new(StaticScreen)).with_audio(Box::new(Silence)),
            Box::new(NoSegments),
        );
        assert!(matches!(result, Err(CaptureError::InvalidConfig(_))));
    }
}
