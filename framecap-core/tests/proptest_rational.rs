//! Property-based tests for rational time and format algebra.

use framecap_core::{keys, Format, FormatKey, MediaType, Rational};
use proptest::prelude::*;

fn finite_rational() -> impl Strategy<Value = Rational> {
    (-1_000_000i64..=1_000_000, 1i64..=100_000).prop_map(|(n, d)| Rational::new(n, d))
}

fn nonzero_rational() -> impl Strategy<Value = Rational> {
    finite_rational().prop_filter("non-zero", |r| !r.is_zero())
}

// =============================================================================
// Rational Arithmetic
// =============================================================================

proptest! {
    #[test]
    fn inverse_is_involution(r in nonzero_rational()) {
        prop_assert_eq!(r.inverse().inverse(), r);
    }

    #[test]
    fn add_negation_is_zero(r in finite_rational()) {
        let sum = r + (-r);
        prop_assert_eq!(sum, Rational::ZERO);
        prop_assert_eq!(sum.den(), 1);
    }

    #[test]
    fn always_normalized(n in any::<i32>(), d in any::<i32>()) {
        let r = Rational::new(n as i64, d as i64);
        prop_assert!(r.den() >= 0);
        if r.den() == 0 {
            prop_assert!(r.num() == 1 || r.num() == -1);
        }
        if r.num() == 0 {
            prop_assert_eq!(r.den(), 1);
        }
    }

    #[test]
    fn floor_ceil_bracket_value(r in finite_rational(), d in 1i64..=1000) {
        let fl = r.floor(d);
        let cl = r.ceil(d);
        prop_assert!(fl <= r);
        prop_assert!(r <= cl);
        prop_assert!(cl - fl <= Rational::new(1, d));
        // both are representable with denominator d
        prop_assert_eq!((fl * d).den(), 1);
        prop_assert_eq!((cl * d).den(), 1);
    }

    #[test]
    fn integer_extremes_negate_cleanly(
        n in prop_oneof![Just(i64::MIN), Just(i64::MIN + 1), Just(i64::MAX), any::<i64>()]
    ) {
        let r = Rational::from_int(n);
        prop_assert!(!r.is_infinite());
        prop_assert_eq!(Rational::from(n), r);
        prop_assert_eq!(Rational::new(n, 1), r);
        prop_assert_eq!(r.negate().negate(), r);
        prop_assert_eq!(r + r.negate(), Rational::ZERO);
        prop_assert_eq!(r - r, Rational::ZERO);
    }

    #[test]
    fn finite_input_stays_finite(
        a in prop_oneof![Just(i64::MIN), Just(i64::MAX), any::<i64>()],
        b in prop_oneof![Just(i64::MIN), Just(i64::MAX), any::<i64>()],
    ) {
        let sum = Rational::from_int(a) + Rational::from_int(b);
        prop_assert!(!sum.is_infinite());
        prop_assert!(sum.num() > i64::MIN);
        prop_assert!(!(Rational::from_int(a) * Rational::from_int(b)).is_infinite());
        if b != 0 {
            let q = Rational::new(a, b);
            prop_assert!(!q.is_infinite());
            prop_assert!(q.num() > i64::MIN);
        }
    }

    #[test]
    fn round_is_nearest(r in finite_rational(), d in 1i64..=1000) {
        let rounded = r.round(d);
        prop_assert!((rounded - r).abs() <= Rational::new(1, 2 * d));
    }

    #[test]
    fn constant_duration_sum_is_exact(num in 1i64..=1001, den in 1i64..=60_000, n in 1usize..=2000) {
        let frame = Rational::new(num, den);
        let total: Rational = std::iter::repeat(frame).take(n).sum();
        prop_assert_eq!(total, frame * n as i64);
    }

    #[test]
    fn ordering_agrees_with_f64(a in finite_rational(), b in finite_rational()) {
        if a.to_f64() < b.to_f64() {
            prop_assert!(a < b);
        }
        prop_assert!(Rational::NEG_INFINITY < a);
        prop_assert!(a < Rational::INFINITY);
    }
}

// =============================================================================
// Format Algebra
// =============================================================================

fn arb_format() -> impl Strategy<Value = Format> {
    (
        prop::option::of(prop_oneof![Just(MediaType::Video), Just(MediaType::Audio)]),
        prop::option::of(1i32..=4),
        prop::option::of(1i32..=4),
        prop::option::of(1i64..=60),
    )
        .prop_map(|(media, width, height, rate)| {
            let mut f = Format::new();
            if let Some(m) = media {
                f = f.with(keys::MEDIA_TYPE, m);
            }
            if let Some(w) = width {
                f = f.with(keys::WIDTH, w);
            }
            if let Some(h) = height {
                f = f.with(keys::HEIGHT, h);
            }
            if let Some(r) = rate {
                f = f.with(keys::FRAME_RATE, Rational::from_int(r));
            }
            f
        })
}

proptest! {
    #[test]
    fn format_matches_itself(f in arb_format()) {
        prop_assert!(f.matches(&f));
    }

    #[test]
    fn append_prefers_self(a in arb_format(), b in arb_format()) {
        let c = a.append(&b);
        let expected = a.get(keys::WIDTH).or_else(|| b.get(keys::WIDTH));
        prop_assert_eq!(c.get(keys::WIDTH), expected);
        let expected = a.media_type().or_else(|| b.media_type());
        prop_assert_eq!(c.media_type(), expected);
    }

    #[test]
    fn intersection_matches_original(f in arb_format()) {
        let sub = f.intersect_keys(&[FormatKey::Width, FormatKey::FrameRate]);
        prop_assert!(sub.matches(&f));
        prop_assert!(sub.len() <= 2);
    }
}
