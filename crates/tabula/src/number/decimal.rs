//! Arbitrary-precision decimal fixed point.
//!
//! A finite value is a scaled `BigInt` significand plus a count of
//! fractional digits (its precision), following the bc rules for result
//! precision: add/subtract widen to the wider operand, multiply carries
//! `min(l+r, max(max(l, r), default))` digits, divide always produces the
//! default precision. On top of the fixed-point core sit signed infinities,
//! signed NaN and a signed zero, giving the IEEE-754-style totality the
//! value model requires.

use std::cmp::Ordering;
use std::fmt::{self, Display};

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero, pow};

use super::RoundMode;

/// Special-value flag for a decimal number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Special {
    Finite,
    Infinity { negative: bool },
    Nan { negative: bool },
}

/// A decimal fixed-point number with IEEE-style special values.
#[derive(Debug, Clone)]
pub struct DecimalNumber {
    /// Scaled significand; the numeric value is `magnitude / 10^frac_digits`.
    /// Zero for specials.
    magnitude: BigInt,
    /// Count of fractional digits. Zero for specials.
    frac_digits: usize,
    special: Special,
    /// `BigInt` cannot represent −0, so the zero sign rides here.
    negative_zero: bool,
}

fn pow10(exp: usize) -> BigInt {
    pow(BigInt::from(10), exp)
}

/// The shared rounding decision: given the discarded residue, should the
/// magnitude be bumped one unit away from zero?
///
/// * `negative` — sign of the value being rounded.
/// * `even` — whether the kept quotient is even.
/// * `half` — `scale` compared against twice the absolute residue
///   (`Greater`: below the halfway point, `Equal`: exactly half,
///   `Less`: above it).
/// * `exact` — whether the residue is zero.
/// * `ends_in_five_multiple` — whether the kept quotient is ≡ 0 (mod 5),
///   which is what the 5-up sticky mode keys on.
fn decide_round(
    negative: bool,
    even: bool,
    half: Ordering,
    exact: bool,
    ends_in_five_multiple: bool,
    mode: RoundMode,
) -> bool {
    match mode {
        RoundMode::TiesEven => half == Ordering::Less || (half == Ordering::Equal && !even),
        RoundMode::TiesAway => half != Ordering::Greater,
        RoundMode::TowardPositive => !negative && !exact,
        RoundMode::TowardNegative => negative && !exact,
        RoundMode::TowardZero => false,
        RoundMode::TiesOdd => half == Ordering::Less || (half == Ordering::Equal && even),
        RoundMode::TiesZero => half == Ordering::Less,
        RoundMode::AwayFromZero => !exact,
        RoundMode::DoubleBias => !exact && ends_in_five_multiple,
    }
}

impl DecimalNumber {
    #[must_use]
    pub fn zero() -> Self {
        Self {
            magnitude: BigInt::zero(),
            frac_digits: 0,
            special: Special::Finite,
            negative_zero: false,
        }
    }

    #[must_use]
    pub fn from_integer(value: i64) -> Self {
        Self {
            magnitude: BigInt::from(value),
            frac_digits: 0,
            special: Special::Finite,
            negative_zero: false,
        }
    }

    #[must_use]
    pub fn infinity(negative: bool) -> Self {
        Self {
            magnitude: BigInt::zero(),
            frac_digits: 0,
            special: Special::Infinity { negative },
            negative_zero: false,
        }
    }

    #[must_use]
    pub fn nan(negative: bool) -> Self {
        Self {
            magnitude: BigInt::zero(),
            frac_digits: 0,
            special: Special::Nan { negative },
            negative_zero: false,
        }
    }

    fn finite(magnitude: BigInt, frac_digits: usize, negative_zero: bool) -> Self {
        let negative_zero = negative_zero && magnitude.is_zero();
        Self {
            magnitude,
            frac_digits,
            special: Special::Finite,
            negative_zero,
        }
    }

    /// Parses a numeric literal.
    ///
    /// Understands the token shapes the lexers produce: digits with an
    /// optional `.` or `,` separator and an optional `e`/`E` exponent. A
    /// negative exponent deepens the fractional digit count; a positive one
    /// scales the significand and leaves the precision alone. Unparseable
    /// input yields zero, matching the forgiving bc-family front ends.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut pos = 0;
        let negative = match bytes.first() {
            Some(b'-') => {
                pos += 1;
                true
            }
            Some(b'+') => {
                pos += 1;
                false
            }
            _ => false,
        };

        let mut integer_digits = String::new();
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            integer_digits.push(bytes[pos] as char);
            pos += 1;
        }

        let mut frac_digits_text = String::new();
        if pos < bytes.len() && (bytes[pos] == b'.' || bytes[pos] == b',') {
            pos += 1;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                frac_digits_text.push(bytes[pos] as char);
                pos += 1;
            }
        }

        let mut exponent: i64 = 0;
        if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
            pos += 1;
            let exp_negative = match bytes.get(pos) {
                Some(b'-') => {
                    pos += 1;
                    true
                }
                Some(b'+') => {
                    pos += 1;
                    false
                }
                _ => false,
            };
            let mut exp_value: i64 = 0;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                exp_value = exp_value.saturating_mul(10) + i64::from(bytes[pos] - b'0');
                pos += 1;
            }
            exponent = if exp_negative { -exp_value } else { exp_value };
        }

        let mut frac_digits = frac_digits_text.len();
        let mut composed = integer_digits;
        composed.push_str(&frac_digits_text);
        let mut magnitude = composed.parse::<BigInt>().unwrap_or_else(|_| BigInt::zero());
        if negative {
            magnitude = -magnitude;
        }
        if exponent < 0 {
            frac_digits += exponent.unsigned_abs() as usize;
        } else if exponent > 0 {
            magnitude *= pow10(exponent as usize);
        }

        Self::finite(magnitude, frac_digits, negative)
    }

    #[must_use]
    pub fn is_signed(&self) -> bool {
        match self.special {
            Special::Infinity { negative } | Special::Nan { negative } => negative,
            Special::Finite => {
                if self.magnitude.is_zero() {
                    self.negative_zero
                } else {
                    self.magnitude.is_negative()
                }
            }
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.special == Special::Finite && self.magnitude.is_zero()
    }

    #[must_use]
    pub fn is_nan(&self) -> bool {
        matches!(self.special, Special::Nan { .. })
    }

    #[must_use]
    pub fn is_inf(&self) -> bool {
        matches!(self.special, Special::Infinity { .. })
    }

    #[must_use]
    pub fn is_integral(&self) -> bool {
        self.special == Special::Finite
            && (self.frac_digits == 0 || (&self.magnitude % pow10(self.frac_digits)).is_zero())
    }

    #[must_use]
    pub fn precision(&self) -> usize {
        self.frac_digits
    }

    #[must_use]
    pub fn to_f64(&self) -> f64 {
        match self.special {
            Special::Infinity { negative } => {
                if negative {
                    f64::NEG_INFINITY
                } else {
                    f64::INFINITY
                }
            }
            Special::Nan { .. } => f64::NAN,
            Special::Finite => {
                // Conversion feeds container indexing, so an integer suffices.
                let rounded = self.round_to_integer(super::round_mode());
                let scaled = &rounded.magnitude / pow10(rounded.frac_digits);
                scaled.to_f64().unwrap_or(f64::NAN)
            }
        }
    }

    #[must_use]
    pub fn neg(&self) -> Self {
        match self.special {
            Special::Infinity { negative } => Self::infinity(!negative),
            Special::Nan { negative } => Self::nan(!negative),
            Special::Finite => {
                if self.magnitude.is_zero() {
                    Self::finite(BigInt::zero(), self.frac_digits, !self.negative_zero)
                } else {
                    Self::finite(-&self.magnitude, self.frac_digits, false)
                }
            }
        }
    }

    /// Rescales to `new_precision` fractional digits, rounding discarded
    /// digits in `mode`.
    #[must_use]
    pub fn with_precision(&self, new_precision: usize, mode: RoundMode) -> Self {
        if self.special != Special::Finite || new_precision == self.frac_digits {
            return self.clone();
        }
        if new_precision > self.frac_digits {
            let scaled = &self.magnitude * pow10(new_precision - self.frac_digits);
            return Self::finite(scaled, new_precision, self.negative_zero);
        }
        let negative = self.magnitude.is_negative();
        let scale = pow10(self.frac_digits - new_precision);
        let (mut quotient, remainder) = self.magnitude.div_rem(&scale);
        let doubled = remainder.abs() * BigInt::from(2);
        if decide_round(
            negative,
            quotient.is_even(),
            scale.cmp(&doubled),
            remainder.is_zero(),
            (&quotient % BigInt::from(5)).is_zero(),
            mode,
        ) {
            quotient += if negative {
                BigInt::from(-1)
            } else {
                BigInt::from(1)
            };
        }
        let negative_zero = quotient.is_zero() && (negative || self.negative_zero);
        Self::finite(quotient, new_precision, negative_zero)
    }

    /// Rounds to an integral value in `mode`, keeping the precision.
    #[must_use]
    pub fn round_to_integer(&self, mode: RoundMode) -> Self {
        if self.special != Special::Finite || self.frac_digits == 0 {
            return self.clone();
        }
        let negative = self.magnitude.is_negative();
        let scale = pow10(self.frac_digits);
        let (mut quotient, remainder) = self.magnitude.div_rem(&scale);
        let doubled = remainder.abs() * BigInt::from(2);
        if decide_round(
            negative,
            quotient.is_even(),
            scale.cmp(&doubled),
            remainder.is_zero(),
            (&quotient % BigInt::from(5)).is_zero(),
            mode,
        ) {
            quotient += if negative {
                BigInt::from(-1)
            } else {
                BigInt::from(1)
            };
        }
        let negative_zero = quotient.is_zero() && (negative || self.negative_zero);
        Self::finite(quotient * scale, self.frac_digits, negative_zero)
    }

    /// Widens both operands to a common precision. Widening never rounds.
    fn aligned(&self, other: &Self) -> (BigInt, BigInt, usize) {
        match self.frac_digits.cmp(&other.frac_digits) {
            Ordering::Greater => (
                self.magnitude.clone(),
                &other.magnitude * pow10(self.frac_digits - other.frac_digits),
                self.frac_digits,
            ),
            Ordering::Less => (
                &self.magnitude * pow10(other.frac_digits - self.frac_digits),
                other.magnitude.clone(),
                other.frac_digits,
            ),
            Ordering::Equal => (
                self.magnitude.clone(),
                other.magnitude.clone(),
                self.frac_digits,
            ),
        }
    }

    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        match (self.special, other.special) {
            (Special::Nan { .. }, _) => self.clone(),
            (_, Special::Nan { .. }) => other.clone(),
            (Special::Infinity { negative: a }, Special::Infinity { negative: b }) => {
                if a == b {
                    self.clone()
                } else {
                    Self::nan(false)
                }
            }
            (Special::Infinity { .. }, _) => self.clone(),
            (_, Special::Infinity { .. }) => other.clone(),
            (Special::Finite, Special::Finite) => {
                let (lhs, rhs, frac_digits) = self.aligned(other);
                let sum = lhs + rhs;
                let negative_zero = sum.is_zero() && self.negative_zero && other.negative_zero;
                Self::finite(sum, frac_digits, negative_zero)
            }
        }
    }

    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        match (self.special, other.special) {
            (Special::Nan { .. }, _) => self.clone(),
            (_, Special::Nan { .. }) => other.clone(),
            (Special::Infinity { negative: a }, Special::Infinity { negative: b }) => {
                if a == b {
                    Self::nan(false)
                } else {
                    self.clone()
                }
            }
            (Special::Infinity { .. }, _) => self.clone(),
            (_, Special::Infinity { negative }) => Self::infinity(!negative),
            (Special::Finite, Special::Finite) => {
                let (lhs, rhs, frac_digits) = self.aligned(other);
                let difference = lhs - rhs;
                let negative_zero =
                    difference.is_zero() && self.negative_zero && !other.negative_zero;
                Self::finite(difference, frac_digits, negative_zero)
            }
        }
    }

    #[must_use]
    pub fn mul(&self, other: &Self, default_precision: usize, mode: RoundMode) -> Self {
        match (self.special, other.special) {
            (Special::Nan { .. }, _) => self.clone(),
            (_, Special::Nan { .. }) => other.clone(),
            (Special::Infinity { .. }, _) => {
                if other.is_zero() {
                    Self::nan(false)
                } else {
                    Self::infinity(self.is_signed() ^ other.is_signed())
                }
            }
            (_, Special::Infinity { .. }) => {
                if self.is_zero() {
                    Self::nan(false)
                } else {
                    Self::infinity(self.is_signed() ^ other.is_signed())
                }
            }
            (Special::Finite, Special::Finite) => {
                let negative = self.is_signed() ^ other.is_signed();
                let product = &self.magnitude * &other.magnitude;
                let wide = self.frac_digits + other.frac_digits;
                let result = Self::finite(product, wide, negative);
                // bc's result-scale rule, the reason this class exists.
                let target = wide.min(self.frac_digits.max(other.frac_digits).max(default_precision));
                result.with_precision(target, mode)
            }
        }
    }

    #[must_use]
    pub fn div(&self, other: &Self, default_precision: usize, mode: RoundMode) -> Self {
        match (self.special, other.special) {
            (Special::Nan { .. }, _) => self.clone(),
            (_, Special::Nan { .. }) => other.clone(),
            (Special::Infinity { .. }, Special::Infinity { .. }) => Self::nan(false),
            (Special::Infinity { .. }, _) => {
                Self::infinity(self.is_signed() ^ other.is_signed())
            }
            (_, Special::Infinity { .. }) => Self::finite(
                BigInt::zero(),
                default_precision,
                self.is_signed() ^ other.is_signed(),
            ),
            (Special::Finite, Special::Finite) => {
                if other.magnitude.is_zero() {
                    return if self.magnitude.is_zero() {
                        Self::nan(false)
                    } else {
                        Self::infinity(self.is_signed() ^ other.is_signed())
                    };
                }
                let negative = self.is_signed() ^ other.is_signed();

                // Scale so the quotient lands at the default precision:
                // raw scale is lhs − rhs fractional digits; the shortfall
                // goes onto whichever side needs it.
                let mut numerator = self.magnitude.clone();
                let mut denominator = other.magnitude.clone();
                if default_precision + other.frac_digits >= self.frac_digits {
                    numerator *= pow10(default_precision + other.frac_digits - self.frac_digits);
                } else {
                    denominator *=
                        pow10(self.frac_digits - default_precision - other.frac_digits);
                }

                let divisor_abs = denominator.abs();
                let (mut quotient, remainder) = numerator.div_rem(&denominator);
                let doubled = remainder.abs() * BigInt::from(2);
                if decide_round(
                    negative,
                    quotient.is_even(),
                    divisor_abs.cmp(&doubled),
                    remainder.is_zero(),
                    (&quotient % BigInt::from(5)).is_zero(),
                    mode,
                ) {
                    quotient += if negative {
                        BigInt::from(-1)
                    } else {
                        BigInt::from(1)
                    };
                }
                Self::finite(quotient, default_precision, negative)
            }
        }
    }

    /// IEEE-style comparison: `None` when either side is NaN; infinities
    /// order against everything; −0 equals +0.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self.special, other.special) {
            (Special::Nan { .. }, _) | (_, Special::Nan { .. }) => None,
            (Special::Infinity { negative: a }, Special::Infinity { negative: b }) => {
                Some(b.cmp(&a))
            }
            (Special::Infinity { negative }, _) => Some(if negative {
                Ordering::Less
            } else {
                Ordering::Greater
            }),
            (_, Special::Infinity { negative }) => Some(if negative {
                Ordering::Greater
            } else {
                Ordering::Less
            }),
            (Special::Finite, Special::Finite) => {
                let (lhs, rhs, _) = self.aligned(other);
                Some(lhs.cmp(&rhs))
            }
        }
    }

    /// Source rendering; specials become re-parseable division idioms.
    #[must_use]
    pub fn to_source_string(&self) -> String {
        match self.special {
            Special::Infinity { negative: false } => "1/0".to_owned(),
            Special::Infinity { negative: true } => "-1/0".to_owned(),
            Special::Nan { negative: false } => "0/0".to_owned(),
            Special::Nan { negative: true } => "-0/0".to_owned(),
            Special::Finite => self.to_string(),
        }
    }
}

impl Display for DecimalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.special {
            Special::Infinity { negative } => {
                return f.write_str(if negative { "-Infinity" } else { "Infinity" });
            }
            Special::Nan { .. } => return f.write_str("Not a Result"),
            Special::Finite => {}
        }
        let mut digits = self.magnitude.abs().to_string();
        let sign = if self.magnitude.is_negative() || self.negative_zero {
            "-"
        } else {
            ""
        };
        if self.frac_digits == 0 {
            return write!(f, "{sign}{digits}");
        }
        while digits.len() < self.frac_digits {
            digits.insert(0, '0');
        }
        if digits.len() == self.frac_digits {
            write!(f, "{sign}0.{digits}")
        } else {
            let split = digits.len() - self.frac_digits;
            write!(f, "{sign}{}.{}", &digits[..split], &digits[split..])
        }
    }
}
