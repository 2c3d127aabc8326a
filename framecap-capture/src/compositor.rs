//! Screen and cursor compositing.
//!
//! The compositor keeps one canvas the size of the captured area. Each screen
//! grab is painted onto it, then the cursor is drawn at every sampled
//! position that changed since the previous sample of the same grab. The
//! first sample of a grab always produces a frame. A frame lasts from the
//! previous emitted frame up to the cursor sample (or the grab) that
//! produced it, so a still cursor yields one long frame instead of many
//! identical ones.

use crate::queue::BoundedQueue;
use crate::source::{Bounds, Captured, Point};
use framecap_core::format::ENCODING_RASTER;
use framecap_core::{keys, Buffer, Format, MediaType, Payload, Raster, Rational};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Colour scheme of the drawn cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CursorStyle {
    /// Black arrow with a white outline.
    #[default]
    Black,
    /// White arrow with a black outline.
    White,
}

// 'X' is outline, '.' is fill, anything else is transparent. The tip is the
// hot spot.
const ARROW: [&str; 16] = [
    "X",
    "XX",
    "X.X",
    "X..X",
    "X...X",
    "X....X",
    "X.....X",
    "X......X",
    "X.......X",
    "X........X",
    "X.....XXXXX",
    "X..X..X",
    "X.X X..X",
    "XX  X..X",
    "X    X..X",
    "     XXX",
];

/// Cursor sprite: pixels to paint relative to the hot spot.
#[derive(Debug, Clone)]
pub struct CursorSprite {
    pixels: Vec<(i32, i32, u32)>,
    width: i32,
    height: i32,
}

impl CursorSprite {
    pub fn arrow(style: CursorStyle) -> Self {
        let (outline, fill) = match style {
            CursorStyle::Black => (0xffffff, 0x000000),
            CursorStyle::White => (0x000000, 0xffffff),
        };
        let mut pixels = Vec::new();
        let mut width = 0;
        for (y, row) in ARROW.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                let rgb = match c {
                    'X' => outline,
                    '.' => fill,
                    _ => continue,
                };
                pixels.push((x as i32, y as i32, rgb));
                width = width.max(x as i32 + 1);
            }
        }
        Self {
            pixels,
            width,
            height: ARROW.len() as i32,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    fn draw(&self, canvas: &mut Raster, at: Point) {
        for &(x, y, rgb) in &self.pixels {
            canvas.set_pixel(at.x + x, at.y + y, rgb);
        }
    }

    fn erase(&self, canvas: &mut Raster, backdrop: &Raster, at: Point) {
        for &(x, y, _) in &self.pixels {
            if let Some(rgb) = backdrop.pixel(at.x + x, at.y + y) {
                canvas.set_pixel(at.x + x, at.y + y, rgb);
            }
        }
    }
}

/// Turns screen grabs and cursor samples into timed raster buffers.
pub struct Compositor {
    bounds: Bounds,
    format: Format,
    canvas: Raster,
    sprite: Option<CursorSprite>,
    last_screen: Option<Arc<Raster>>,
    last_cursor: Option<Point>,
    start_millis: u64,
    emitted_until: u64,
    max_frame_millis: u64,
}

impl Compositor {
    /// `sprite` is `None` when the cursor is not recorded. Timestamps of the
    /// produced buffers are relative to `start_millis`.
    pub fn new(
        bounds: Bounds,
        frame_rate: Rational,
        sprite: Option<CursorSprite>,
        start_millis: u64,
        max_frame_duration: Duration,
    ) -> Self {
        let format = Format::builder()
            .with(keys::MEDIA_TYPE, MediaType::Video)
            .with_str(keys::ENCODING, ENCODING_RASTER)
            .with(keys::WIDTH, bounds.width as i32)
            .with(keys::HEIGHT, bounds.height as i32)
            .with(keys::FRAME_RATE, frame_rate)
            .build();
        Self {
            bounds,
            format,
            canvas: Raster::new(bounds.width, bounds.height),
            sprite,
            last_screen: None,
            last_cursor: None,
            start_millis,
            emitted_until: start_millis,
            max_frame_millis: max_frame_duration.as_millis() as u64,
        }
    }

    /// Format of the produced buffers.
    pub fn format(&self) -> &Format {
        &self.format
    }

    /// Wall clock time up to which frames have been emitted.
    pub fn emitted_until(&self) -> u64 {
        self.emitted_until
    }

    /// Composite one screen grab.
    ///
    /// `grab_started` is the wall clock time before the grab; the grab itself
    /// carries the completion time. The previous grab stays on screen for
    /// cursor samples taken before `grab_started`. Cursor samples older than
    /// the grab completion are consumed from `cursor`. Nothing is emitted
    /// past `stop_millis`.
    pub fn compose(
        &mut self,
        grab_started: u64,
        grab: Captured<Raster>,
        cursor: Option<&BoundedQueue<Captured<Point>>>,
        stop_millis: u64,
    ) -> Vec<Buffer> {
        let grab_done = grab.time_millis;
        let screen = Arc::new(grab.value);
        let mut backdrop = self
            .last_screen
            .replace(Arc::clone(&screen))
            .unwrap_or_else(|| Arc::clone(&screen));
        self.canvas.blit(&backdrop, 0, 0);

        let mut frames = Vec::new();
        let cursor = match (cursor, self.sprite.is_some()) {
            (Some(queue), true) => queue,
            _ => {
                self.emit_until(grab_done.min(stop_millis), &mut frames);
                return frames;
            }
        };

        let mut sampled = false;
        let mut previous: Option<Point> = None;
        while let Some(sample) = cursor.take_if(|c| c.time_millis < grab_done) {
            if sample.time_millis <= self.emitted_until {
                continue;
            }
            if sample.time_millis > grab_started && !Arc::ptr_eq(&backdrop, &screen) {
                backdrop = Arc::clone(&screen);
                self.canvas.blit(&backdrop, 0, 0);
            }
            if sample.time_millis > stop_millis {
                break;
            }
            sampled = true;

            let at = self.bounds.to_local(sample.value);
            let stale = sample.time_millis - self.emitted_until > self.max_frame_millis;
            if previous != Some(at) || stale {
                previous = Some(at);
                self.last_cursor = Some(at);
                self.draw_cursor(at);
                self.emit_until(sample.time_millis, &mut frames);
                self.erase_cursor(&backdrop, at);
            }
        }

        if !sampled {
            if let Some(at) = self.last_cursor {
                self.draw_cursor(at);
            }
            self.emit_until(grab_done.min(stop_millis), &mut frames);
            if let Some(at) = self.last_cursor {
                self.erase_cursor(&backdrop, at);
            }
        }
        frames
    }

    fn draw_cursor(&mut self, at: Point) {
        if let Some(sprite) = &self.sprite {
            sprite.draw(&mut self.canvas, at);
        }
    }

    fn erase_cursor(&mut self, backdrop: &Raster, at: Point) {
        if let Some(sprite) = &self.sprite {
            sprite.erase(&mut self.canvas, backdrop, at);
        }
    }

    fn emit_until(&mut self, end_millis: u64, frames: &mut Vec<Buffer>) {
        if end_millis <= self.emitted_until {
            return;
        }
        frames.push(Buffer {
            format: self.format.clone(),
            timestamp: Rational::new((self.emitted_until - self.start_millis) as i64, 1000),
            sample_duration: Rational::new((end_millis - self.emitted_until) as i64, 1000),
            payload: Payload::Raster(Arc::new(self.canvas.clone())),
            ..Buffer::new()
        });
        self.emitted_until = end_millis;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::OverflowPolicy;

    const START: u64 = 10_000;

    fn solid(rgb: u32, time: u64) -> Captured<Raster> {
        Captured::new(Raster::from_pixels(32, 32, vec![rgb; 32 * 32]).unwrap(), time)
    }

    fn compositor(cursor: bool) -> Compositor {
        Compositor::new(
            Bounds::new(0, 0, 32, 32),
            Rational::from_int(10),
            cursor.then(|| CursorSprite::arrow(CursorStyle::Black)),
            START,
            Duration::from_millis(1000),
        )
    }

    fn raster(buffer: &Buffer) -> &Raster {
        buffer.payload.as_raster().unwrap()
    }

    #[test]
    fn test_sprite_shape() {
        let sprite = CursorSprite::arrow(CursorStyle::White);
        assert_eq!(sprite.height(), 16);
        assert_eq!(sprite.width(), 11);
        assert!(sprite.pixels.contains(&(0, 0, 0x000000)));
        assert!(sprite.pixels.contains(&(1, 2, 0xffffff)));
    }

    #[test]
    fn test_without_cursor_one_frame_per_grab() {
        let mut comp = compositor(false);
        let frames = comp.compose(START, solid(0x112233, START + 100), None, u64::MAX);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].timestamp, Rational::ZERO);
        assert_eq!(frames[0].sample_duration, Rational::new(1, 10));
        assert_eq!(frames[0].format.encoding().as_deref(), Some(ENCODING_RASTER));

        // the previous grab covers the interval up to the new grab
        let frames = comp.compose(START + 150, solid(0x445566, START + 200), None, u64::MAX);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].timestamp, Rational::new(1, 10));
        assert_eq!(raster(&frames[0]).pixel(5, 5), Some(0x112233));
    }

    #[test]
    fn test_cursor_moves_emit_frames() {
        let mut comp = compositor(true);
        let queue = BoundedQueue::new(8, OverflowPolicy::DropOldest);
        queue.offer(Captured::new(Point::new(4, 4), START + 20));
        queue.offer(Captured::new(Point::new(4, 4), START + 40));
        queue.offer(Captured::new(Point::new(8, 8), START + 60));
        // taken after the grab completed; left for the next grab
        queue.offer(Captured::new(Point::new(9, 9), START + 120));

        let frames = comp.compose(START, solid(0x808080, START + 100), Some(&queue), u64::MAX);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].sample_duration, Rational::new(20, 1000));
        assert_eq!(frames[1].timestamp, Rational::new(20, 1000));
        assert_eq!(frames[1].sample_duration, Rational::new(40, 1000));
        assert_eq!(raster(&frames[0]).pixel(4, 4), Some(0xffffff));
        assert_eq!(raster(&frames[1]).pixel(8, 8), Some(0xffffff));
        assert_eq!(raster(&frames[1]).pixel(4, 4), Some(0x808080));
        assert_eq!(queue.len(), 1);
        assert_eq!(comp.emitted_until(), START + 60);
    }

    #[test]
    fn test_still_cursor_emits_after_max_frame_duration() {
        let mut comp = compositor(true);
        let queue = BoundedQueue::new(8, OverflowPolicy::DropOldest);
        queue.offer(Captured::new(Point::new(1, 1), START + 500));
        queue.offer(Captured::new(Point::new(1, 1), START + 1200));
        // same position, but more than a second after the last frame
        queue.offer(Captured::new(Point::new(1, 1), START + 1700));
        let frames = comp.compose(START, solid(0, START + 2000), Some(&queue), u64::MAX);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].sample_duration, Rational::new(1, 2));
        assert_eq!(frames[1].timestamp, Rational::new(1, 2));
        assert_eq!(frames[1].end_time(), Rational::new(17, 10));
    }

    #[test]
    fn test_parked_cursor_keeps_screen_updates() {
        let mut comp = compositor(true);
        let queue = BoundedQueue::new(8, OverflowPolicy::DropOldest);
        let mut total = 0;
        for i in 0..9u64 {
            let grab_started = START + i * 100;
            let colour = 0x101010 * (i as u32 + 1);
            queue.offer(Captured::new(Point::new(20, 20), grab_started + 50));
            let frames = comp.compose(
                grab_started,
                solid(colour, grab_started + 100),
                Some(&queue),
                u64::MAX,
            );
            assert_eq!(frames.len(), 1, "grab {}", i);
            assert_eq!(raster(&frames[0]).pixel(5, 5), Some(colour));
            assert_eq!(frames[0].end_time(), Rational::new(i as i64 * 100 + 50, 1000));
            total += frames.len();
        }
        assert_eq!(total, 9);
    }

    #[test]
    fn test_no_samples_draws_last_position() {
        let mut comp = compositor(true);
        let queue = BoundedQueue::new(8, OverflowPolicy::DropOldest);
        queue.offer(Captured::new(Point::new(2, 2), START + 10));
        comp.compose(START, solid(0x202020, START + 50), Some(&queue), u64::MAX);

        let frames = comp.compose(START + 60, solid(0x202020, START + 100), Some(&queue), u64::MAX);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].timestamp, Rational::new(10, 1000));
        assert_eq!(frames[0].end_time(), Rational::new(100, 1000));
        assert_eq!(raster(&frames[0]).pixel(2, 2), Some(0xffffff));
    }

    #[test]
    fn test_stop_time_trims() {
        let mut comp = compositor(false);
        let frames = comp.compose(START, solid(0, START + 100), None, START + 40);
        assert_eq!(frames[0].sample_duration, Rational::new(40, 1000));
        assert!(comp.compose(START + 100, solid(0, START + 200), None, START + 40).is_empty());
    }
}
