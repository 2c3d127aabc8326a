//! Screen capture sessions for the framecap crates.
//!
//! A [`CaptureSession`] records a screen area, optionally with the mouse
//! cursor drawn in and a PCM audio track, into a series of movie segments.
//! Screen grabs arrive at irregular times; the video track is re-timed to a
//! fixed frame rate when the container needs one. Segments roll over when a
//! file reaches its size limit or maximum length.
//!
//! Grabbing pixels, pointer positions and audio from the platform is left to
//! implementations of [`ScreenSource`], [`CursorSource`] and [`AudioSource`].

mod compositor;
mod config;
mod error;
mod events;
mod queue;
mod retime;
mod session;
mod source;
mod writer;

pub use compositor::{Compositor, CursorSprite, CursorStyle};
pub use config::{AudioCaptureConfig, RecorderConfig};
pub use error::{CaptureError, Result};
pub use events::{EventBus, SessionEvent, State};
pub use queue::{BoundedQueue, Offer, OverflowPolicy};
pub use retime::FrameRetimer;
pub use session::{CaptureSession, StopReport};
pub use source::{
    AudioSource, Bounds, CaptureSources, Captured, Clock, CursorSource, Point, ScreenSource,
    SystemClock,
};
pub use writer::{AviSegmentFactory, MuxSummary, MuxWriter, Segment, SegmentFactory, SegmentReport};
