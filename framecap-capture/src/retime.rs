//! Conversion of variable rate video into fixed rate frames.

use framecap_core::{Buffer, BufferFlags, Rational};

/// Re-times variable length video buffers onto a fixed frame grid.
///
/// Output time starts at zero. For every input buffer, frames are emitted at
/// the current output time until the output time passes the end of the
/// input. Each emitted frame lasts one frame duration, and every frame after
/// the first of an input shares its payload and is marked SAME_DATA.
#[derive(Debug, Clone)]
pub struct FrameRetimer {
    frame_duration: Rational,
    output_time: Rational,
}

impl FrameRetimer {
    /// Retimer for a fixed `frame_rate`.
    pub fn new(frame_rate: Rational) -> Self {
        Self {
            frame_duration: frame_rate.inverse(),
            output_time: Rational::ZERO,
        }
    }

    pub fn frame_duration(&self) -> Rational {
        self.frame_duration
    }

    /// Start time of the next emitted frame.
    pub fn output_time(&self) -> Rational {
        self.output_time
    }

    pub fn retime(&mut self, input: &Buffer) -> Vec<Buffer> {
        let end = input.end_time();
        let mut frames = Vec::new();
        while self.output_time < end {
            let mut frame = Buffer::new();
            frame.set_meta_to(input);
            frame.timestamp = self.output_time;
            frame.sample_duration = self.frame_duration;
            frame.sample_count = 1;
            frame.payload = input.payload.clone();
            if !frames.is_empty() {
                frame.flags.insert(BufferFlags::SAME_DATA);
            }
            frames.push(frame);
            self.output_time = self.output_time + self.frame_duration;
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(ts: Rational, dur: Rational) -> Buffer {
        Buffer {
            timestamp: ts,
            sample_duration: dur,
            ..Buffer::new()
        }
    }

    #[test]
    fn test_long_frame_repeats() {
        let mut retimer = FrameRetimer::new(Rational::from_int(10));
        let frames = retimer.retime(&input(Rational::ZERO, Rational::new(3, 10)));
        assert_eq!(frames.len(), 3);
        assert!(!frames[0].is_same_data());
        assert!(frames[1].is_same_data());
        assert!(frames[2].is_same_data());
        assert_eq!(frames[2].timestamp, Rational::new(2, 10));
        assert_eq!(retimer.output_time(), Rational::new(3, 10));
    }

    #[test]
    fn test_short_frames_are_skipped() {
        let mut retimer = FrameRetimer::new(Rational::from_int(10));
        assert_eq!(retimer.retime(&input(Rational::ZERO, Rational::new(1, 20))).len(), 1);
        // already covered by the frame at 0..1/10
        assert!(retimer.retime(&input(Rational::new(1, 20), Rational::new(1, 40))).is_empty());
        let frames = retimer.retime(&input(Rational::new(3, 40), Rational::new(1, 20)));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].timestamp, Rational::new(1, 10));
    }

    #[test]
    fn test_input_flags_carry_over() {
        let mut retimer = FrameRetimer::new(Rational::from_int(2));
        let mut buffer = input(Rational::ZERO, Rational::ONE);
        buffer.flags = BufferFlags::KEYFRAME;
        buffer.track = 3;
        let frames = retimer.retime(&buffer);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.is_keyframe() && f.track == 3));
        assert!(frames.iter().all(|f| f.sample_duration == Rational::new(1, 2)));
    }
}
