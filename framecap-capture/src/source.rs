//! Capture sources and the session clock.
//!
//! Platform grabbing is out of scope for this crate: a screen, cursor or
//! audio device is plugged in through the traits below.

use framecap_core::{Format, Raster, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// A value stamped with the wall clock time it was taken, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured<T> {
    pub value: T,
    pub time_millis: u64,
}

impl<T> Captured<T> {
    pub fn new(value: T, time_millis: u64) -> Self {
        Self { value, time_millis }
    }
}

/// A position in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// The captured screen area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Translate a screen position into the captured area.
    pub fn to_local(&self, p: Point) -> Point {
        Point::new(p.x - self.x, p.y - self.y)
    }
}

/// Wall clock in milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// [`Clock`] backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Grabs frames of a fixed screen area.
pub trait ScreenSource: Send {
    /// The captured area. Every frame has its size.
    fn bounds(&self) -> Bounds;

    /// Grab one frame, stamped with the time the grab completed.
    fn capture_frame(&mut self) -> Result<Captured<Raster>>;
}

/// Samples the pointer position.
pub trait CursorSource: Send {
    fn position(&mut self) -> Result<Captured<Point>>;
}

/// A PCM line.
pub trait AudioSource: Send {
    /// Format of the bytes returned by [`AudioSource::read`].
    fn format(&self) -> Format;

    /// Fill `buf` with whole frames, blocking until data is available.
    ///
    /// Returns the number of bytes read. Zero means the line has ended.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// The sources a session records from.
pub struct CaptureSources {
    pub screen: Box<dyn ScreenSource>,
    pub cursor: Option<Box<dyn CursorSource>>,
    pub audio: Option<Box<dyn AudioSource>>,
}

impl CaptureSources {
    pub fn new(screen: Box<dyn ScreenSource>) -> Self {
        Self {
            screen,
            cursor: None,
            audio: None,
        }
    }

    pub fn with_cursor(mut self, cursor: Box<dyn CursorSource>) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn with_audio(mut self, audio: Box<dyn AudioSource>) -> Self {
        self.audio = Some(audio);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_local() {
        let bounds = Bounds::new(100, 50, 640, 480);
        assert_eq!(bounds.to_local(Point::new(110, 60)), Point::new(10, 10));
    }

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock;
        let a = clock.now_millis();
        let b = clock.now_millis();
        assert!(a > 0);
        assert!(b >= a);
    }
}
