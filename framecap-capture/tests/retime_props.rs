//! Property tests for fixed rate re-timing.

use framecap_capture::FrameRetimer;
use framecap_core::{Buffer, Rational};
use proptest::prelude::*;

fn span(timestamp: Rational, duration: Rational) -> Buffer {
    Buffer {
        timestamp,
        sample_duration: duration,
        ..Buffer::new()
    }
}

proptest! {
    #[test]
    fn prop_single_span_emits_ceiling(rate in 1i64..120, num in 1i64..10_000, den in 1i64..1000) {
        let mut retimer = FrameRetimer::new(Rational::from_int(rate));
        let length = Rational::new(num, den);
        let frames = retimer.retime(&span(Rational::ZERO, length));

        let expected = (length * Rational::from_int(rate)).ceil(1).to_i64();
        prop_assert_eq!(frames.len() as i64, expected);
        for (k, frame) in frames.iter().enumerate() {
            prop_assert_eq!(frame.timestamp, Rational::new(k as i64, rate));
            prop_assert_eq!(frame.is_same_data(), k > 0);
        }
    }

    #[test]
    fn prop_contiguous_spans_cover_end(
        rate in 1i64..60,
        lengths in proptest::collection::vec(1i64..500, 1..40),
    ) {
        let mut retimer = FrameRetimer::new(Rational::from_int(rate));
        let mut time = Rational::ZERO;
        let mut emitted = 0i64;
        for millis in lengths {
            let length = Rational::new(millis, 1000);
            for frame in retimer.retime(&span(time, length)) {
                prop_assert_eq!(frame.timestamp, Rational::new(emitted, rate));
                emitted += 1;
            }
            time = time + length;
        }

        prop_assert_eq!(emitted, (time * Rational::from_int(rate)).ceil(1).to_i64());
        prop_assert!(retimer.output_time() >= time);
        prop_assert!(retimer.output_time() - time < retimer.frame_duration());
    }
}
