//! The binary64 backend.
//!
//! A thin veneer over `f64`: hardware IEEE-754 semantics, a fixed reported
//! precision of 15 digits, and no-op precision changes. Present so embedders
//! that prefer speed over decimal exactness can swap it in at startup.

use std::cmp::Ordering;
use std::fmt::{self, Display};

/// An `f64` wrapped to the common backend operation contract.
#[derive(Debug, Clone)]
pub struct DoubleNumber(f64);

impl DoubleNumber {
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn parse(text: &str) -> Self {
        // The lexers may hand over a ',' decimal separator.
        let normalized = text.replace(',', ".");
        Self(normalized.trim().parse::<f64>().unwrap_or(0.0))
    }

    #[must_use]
    pub fn get(&self) -> f64 {
        self.0
    }

    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.0.is_sign_negative()
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }

    #[must_use]
    pub fn is_nan(&self) -> bool {
        self.0.is_nan()
    }

    #[must_use]
    pub fn is_inf(&self) -> bool {
        self.0.is_infinite()
    }

    #[must_use]
    pub fn is_integral(&self) -> bool {
        self.0.is_finite() && self.0.fract() == 0.0
    }

    #[must_use]
    pub fn precision(&self) -> usize {
        15
    }

    #[must_use]
    pub fn neg(&self) -> Self {
        Self(-self.0)
    }

    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        Self(self.0 + other.0)
    }

    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        Self(self.0 - other.0)
    }

    #[must_use]
    pub fn mul(&self, other: &Self) -> Self {
        Self(self.0 * other.0)
    }

    #[must_use]
    pub fn div(&self, other: &Self) -> Self {
        Self(self.0 / other.0)
    }

    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        self.0.partial_cmp(&other.0)
    }

    #[must_use]
    pub fn round(&self) -> Self {
        Self(self.0.round())
    }

    #[must_use]
    pub fn floor(&self) -> Self {
        Self(self.0.floor())
    }

    #[must_use]
    pub fn ceil(&self) -> Self {
        Self(self.0.ceil())
    }

    #[must_use]
    pub fn to_source_string(&self) -> String {
        if self.0.is_infinite() {
            return if self.0.is_sign_negative() {
                "-1/0".to_owned()
            } else {
                "1/0".to_owned()
            };
        }
        if self.0.is_nan() {
            return if self.0.is_sign_negative() {
                "-0/0".to_owned()
            } else {
                "0/0".to_owned()
            };
        }
        self.to_string()
    }
}

impl Display for DoubleNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_nan() {
            return f.write_str("Not a Result");
        }
        if self.0.is_infinite() {
            return f.write_str(if self.0.is_sign_negative() {
                "-Infinity"
            } else {
                "Infinity"
            });
        }
        if self.0.fract() == 0.0 && self.0.abs() < 1e15 {
            // Integral values print without the trailing ".0".
            return write!(f, "{}", self.0 as i64);
        }
        let mut buffer = ryu::Buffer::new();
        f.write_str(buffer.format(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(DoubleNumber::new(120.0).to_string(), "120");
        assert_eq!(DoubleNumber::new(1.5).to_string(), "1.5");
        assert_eq!(DoubleNumber::new(f64::NAN).to_string(), "Not a Result");
        assert_eq!(DoubleNumber::new(f64::NEG_INFINITY).to_string(), "-Infinity");
    }

    #[test]
    fn source_forms_for_specials() {
        assert_eq!(DoubleNumber::new(f64::INFINITY).to_source_string(), "1/0");
        assert_eq!(DoubleNumber::new(-f64::NAN).to_source_string(), "-0/0");
    }

    #[test]
    fn comma_separator_parses() {
        assert_eq!(DoubleNumber::parse("2,5").get(), 2.5);
    }
}
