//! Exact rational number type used for every timestamp and duration.
//!
//! Values are always kept normalized:
//! - the denominator is never negative, the sign lives in the numerator;
//! - `1/0` and `-1/0` are the only representations of ±infinity;
//! - zero is always `0/1`;
//! - numerator and denominator are coprime;
//! - the numerator stays within `-i64::MAX..=i64::MAX`, so negation never
//!   overflows.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A rational number represented as a numerator and denominator.
///
/// Used for precise representation of timestamps, durations, frame rates and
/// sample rates. Summing `N` constant durations yields exactly `N` times that
/// duration, which is what keeps hour-long recordings drift-free.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(i64, i64)", into = "(i64, i64)")]
pub struct Rational {
    num: i64,
    den: i64,
}

impl Rational {
    /// Zero (`0/1`).
    pub const ZERO: Rational = Rational { num: 0, den: 1 };
    /// One (`1/1`).
    pub const ONE: Rational = Rational { num: 1, den: 1 };
    /// Positive infinity (`1/0`).
    pub const INFINITY: Rational = Rational { num: 1, den: 0 };
    /// Negative infinity (`-1/0`).
    pub const NEG_INFINITY: Rational = Rational { num: -1, den: 0 };

    /// Create a new rational number in lowest terms.
    ///
    /// A zero denominator yields ±infinity depending on the sign of the
    /// numerator, except for `0/0` which normalizes to zero.
    pub fn new(num: i64, den: i64) -> Self {
        Self::from_wide(num as i128, den as i128)
    }

    /// Create a rational from an integer. `i64::MIN` saturates to `-i64::MAX`.
    pub const fn from_int(n: i64) -> Self {
        let num = if n == i64::MIN { -i64::MAX } else { n };
        Self { num, den: 1 }
    }

    /// Normalize a wide fraction and narrow it back to `i64`.
    ///
    /// Fractions that still do not fit after reduction are approximated by
    /// halving both terms until they do. An integer that does not fit
    /// saturates to `±i64::MAX`; finite input never becomes infinite.
    fn from_wide(mut num: i128, mut den: i128) -> Self {
        if num == 0 {
            return Self::ZERO;
        }
        if den == 0 {
            return if num > 0 { Self::INFINITY } else { Self::NEG_INFINITY };
        }
        if den < 0 {
            num = -num;
            den = -den;
        }
        let g = gcd(num.unsigned_abs(), den.unsigned_abs()) as i128;
        num /= g;
        den /= g;

        const LIMIT: i128 = i64::MAX as i128;
        while num > LIMIT || num < -LIMIT || den > LIMIT {
            if den < 2 {
                num = num.clamp(-LIMIT, LIMIT);
                break;
            }
            num /= 2;
            den /= 2;
            if num == 0 {
                return Self::ZERO;
            }
        }
        let g = gcd(num.unsigned_abs(), den.unsigned_abs()) as i128;
        Self {
            num: (num / g) as i64,
            den: (den / g) as i64,
        }
    }

    /// Numerator (carries the sign).
    pub const fn num(&self) -> i64 {
        self.num
    }

    /// Denominator (never negative, zero for infinity).
    pub const fn den(&self) -> i64 {
        self.den
    }

    /// Check if this rational is zero.
    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    /// Check if this rational is ±infinity.
    pub fn is_infinite(&self) -> bool {
        self.den == 0
    }

    /// Check if this rational is positive.
    pub fn is_positive(&self) -> bool {
        self.num > 0
    }

    /// Check if this rational is negative.
    pub fn is_negative(&self) -> bool {
        self.num < 0
    }

    /// Absolute value.
    pub fn abs(&self) -> Self {
        if self.num < 0 {
            self.negate()
        } else {
            *self
        }
    }

    /// Convert to f64.
    pub fn to_f64(&self) -> f64 {
        if self.den == 0 {
            if self.num > 0 {
                f64::INFINITY
            } else {
                f64::NEG_INFINITY
            }
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /// Integer part, truncated toward zero. Infinity saturates.
    pub fn to_i64(&self) -> i64 {
        if self.den == 0 {
            if self.num > 0 {
                i64::MAX
            } else {
                i64::MIN
            }
        } else {
            self.num / self.den
        }
    }

    /// Approximate a floating point value with a continued fraction.
    ///
    /// NaN maps to zero, ±∞ to the infinite rationals.
    pub fn from_f64(value: f64) -> Self {
        if value == 0.0 || value.is_nan() {
            return Self::ZERO;
        }
        if value.is_infinite() {
            return if value > 0.0 { Self::INFINITY } else { Self::NEG_INFINITY };
        }
        continued_fraction(value, i32::MAX as f64, 100)
    }

    /// Add two rationals.
    pub fn add(&self, rhs: Rational) -> Self {
        if self.den == 0 || rhs.den == 0 {
            return Self::from_wide(
                self.num as i128 * i128::from(self.den == 0) + rhs.num as i128 * i128::from(rhs.den == 0),
                0,
            );
        }
        if self.den == rhs.den {
            return Self::from_wide(self.num as i128 + rhs.num as i128, self.den as i128);
        }
        let l = lcm(self.den as i128, rhs.den as i128);
        Self::from_wide(
            self.num as i128 * (l / self.den as i128) + rhs.num as i128 * (l / rhs.den as i128),
            l,
        )
    }

    /// Subtract `rhs` from this rational.
    pub fn subtract(&self, rhs: Rational) -> Self {
        self.add(rhs.negate())
    }

    /// Negate this rational.
    pub fn negate(&self) -> Self {
        match self.num.checked_neg() {
            Some(num) => Self { num, den: self.den },
            None => Self::from_wide(-(self.num as i128), self.den as i128),
        }
    }

    /// Get the reciprocal of this rational.
    ///
    /// The inverse of zero is positive infinity and the inverse of an infinity
    /// is zero.
    pub fn inverse(&self) -> Self {
        Self::from_wide(self.den as i128, self.num as i128)
    }

    /// Multiply by another rational.
    pub fn multiply(&self, rhs: Rational) -> Self {
        Self::from_wide(
            self.num as i128 * rhs.num as i128,
            self.den as i128 * rhs.den as i128,
        )
    }

    /// Multiply by an integer.
    pub fn mul_int(&self, n: i64) -> Self {
        Self::from_wide(self.num as i128 * n as i128, self.den as i128)
    }

    /// Divide by another rational.
    pub fn divide(&self, rhs: Rational) -> Self {
        Self::from_wide(
            self.num as i128 * rhs.den as i128,
            self.den as i128 * rhs.num as i128,
        )
    }

    /// Closest value with denominator `d` that is less than or equal to this one.
    ///
    /// # Panics
    ///
    /// Panics if `d` is not positive.
    pub fn floor(&self, d: i64) -> Self {
        assert!(d > 0, "Target denominator must be positive");
        if self.den == 0 || self.den == d {
            return *self;
        }
        let scaled = (self.num as i128 * d as i128).div_euclid(self.den as i128);
        Self::from_wide(scaled, d as i128)
    }

    /// Closest value with denominator `d` that is greater than or equal to this one.
    ///
    /// # Panics
    ///
    /// Panics if `d` is not positive.
    pub fn ceil(&self, d: i64) -> Self {
        assert!(d > 0, "Target denominator must be positive");
        if self.den == 0 || self.den == d {
            return *self;
        }
        let scaled = -(-(self.num as i128) * d as i128).div_euclid(self.den as i128);
        Self::from_wide(scaled, d as i128)
    }

    /// Closest value with denominator `d`. Ties resolve to [`Rational::floor`].
    ///
    /// # Panics
    ///
    /// Panics if `d` is not positive.
    pub fn round(&self, d: i64) -> Self {
        let fl = self.floor(d);
        let cl = self.ceil(d);
        let diff_fl = self.subtract(fl).abs();
        let diff_cl = self.subtract(cl).abs();
        if diff_fl <= diff_cl {
            fl
        } else {
            cl
        }
    }

    /// The larger of two rationals.
    pub fn max(self, other: Rational) -> Self {
        if self >= other {
            self
        } else {
            other
        }
    }

    /// The smaller of two rationals.
    pub fn min(self, other: Rational) -> Self {
        if self <= other {
            self
        } else {
            other
        }
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rational({}/{})", self.num, self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.num, self.den) {
            (n, 0) if n > 0 => write!(f, "inf"),
            (_, 0) => write!(f, "-inf"),
            (n, 1) => write!(f, "{}", n),
            (n, d) => write!(f, "{}/{}", n, d),
        }
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.den == 0 && other.den == 0 {
            return self.num.cmp(&other.num);
        }
        let lhs = self.num as i128 * other.den as i128;
        let rhs = other.num as i128 * self.den as i128;
        lhs.cmp(&rhs)
    }
}

impl Add for Rational {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Rational::add(&self, rhs)
    }
}

impl Sub for Rational {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self.subtract(rhs)
    }
}

impl Mul for Rational {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        self.multiply(rhs)
    }
}

impl Mul<i64> for Rational {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        self.mul_int(rhs)
    }
}

impl Div for Rational {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        self.divide(rhs)
    }
}

impl Neg for Rational {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self.negate()
    }
}

impl std::iter::Sum for Rational {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Rational::ZERO, |acc, r| acc + r)
    }
}

impl From<i32> for Rational {
    fn from(n: i32) -> Self {
        Self::from_int(n as i64)
    }
}

impl From<i64> for Rational {
    fn from(n: i64) -> Self {
        Self::from_int(n)
    }
}

impl From<(i32, i32)> for Rational {
    fn from((num, den): (i32, i32)) -> Self {
        Self::new(num as i64, den as i64)
    }
}

impl From<(i64, i64)> for Rational {
    fn from((num, den): (i64, i64)) -> Self {
        Self::new(num, den)
    }
}

impl From<Rational> for (i64, i64) {
    fn from(r: Rational) -> Self {
        (r.num, r.den)
    }
}

/// Greatest common divisor using the Euclidean algorithm.
fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a.max(1)
}

/// Least common multiple of two positive values.
fn lcm(a: i128, b: i128) -> i128 {
    a / gcd(a.unsigned_abs(), b.unsigned_abs()) as i128 * b
}

fn continued_fraction(x: f64, limit: f64, iterations: u32) -> Rational {
    let int_part = x.floor();
    let fract_part = x - int_part;
    let left = Rational::from_int(int_part as i64);
    if fract_part == 0.0 {
        return left;
    }
    let d = 1.0 / fract_part;
    if d > limit || iterations == 0 {
        left
    } else {
        left + continued_fraction(d, limit * 0.1, iterations - 1).inverse()
    }
}
