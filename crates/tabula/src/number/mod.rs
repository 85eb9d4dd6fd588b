//! The numeric tower: interchangeable arbitrary-precision number backends.
//!
//! Every `Float` value in either language carries a [`Number`], a tagged
//! union over the payloads of the available backends. The backend in use,
//! the rounding mode and the default precision are process-wide state,
//! selected at startup and mutable from Script through the standard library
//! (`SetRoundMode`, `SetDefaultPrecision`). The evaluator is single-threaded
//! by contract, so that state lives in a thread-local cell; it is the only
//! global mutable state in the crate.

mod decimal;
mod double;

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

use strum::{Display as StrumDisplay, EnumString, IntoStaticStr};

pub use decimal::DecimalNumber;
pub use double::DoubleNumber;

/// Rounding modes understood by the numeric tower.
///
/// A backend that cannot honor a requested mode keeps the previous one: the
/// double backend only implements the four directed/nearest-even modes,
/// while the decimal backend implements all nine, including [`RoundMode::DoubleBias`]
/// (round up when the discarded digits are nonzero and the kept quotient is
/// divisible by five — the "5-up sticky" mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumString, IntoStaticStr)]
pub enum RoundMode {
    TiesEven,
    TiesAway,
    TowardPositive,
    TowardNegative,
    TowardZero,
    TiesOdd,
    TiesZero,
    AwayFromZero,
    DoubleBias,
}

impl RoundMode {
    /// Numeric encoding used by `GetRoundMode`/`SetRoundMode` in Script.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::TiesEven => 0,
            Self::TiesAway => 1,
            Self::TowardPositive => 2,
            Self::TowardNegative => 3,
            Self::TowardZero => 4,
            Self::TiesOdd => 5,
            Self::TiesZero => 6,
            Self::AwayFromZero => 7,
            Self::DoubleBias => 8,
        }
    }

    /// Decodes the Script-visible numeric encoding.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::TiesEven),
            1 => Some(Self::TiesAway),
            2 => Some(Self::TowardPositive),
            3 => Some(Self::TowardNegative),
            4 => Some(Self::TowardZero),
            5 => Some(Self::TiesOdd),
            6 => Some(Self::TiesZero),
            7 => Some(Self::AwayFromZero),
            8 => Some(Self::DoubleBias),
            _ => None,
        }
    }
}

/// Discriminator for the number backend in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, StrumDisplay, EnumString, IntoStaticStr)]
pub enum Backend {
    /// Arbitrary-precision decimal fixed point. Mandatory, and the default.
    #[default]
    Decimal,
    /// IEEE-754 binary64.
    Double,
}

/// Process-wide numeric configuration.
#[derive(Debug, Clone, Copy)]
struct NumberSystem {
    backend: Backend,
    mode: RoundMode,
    default_precision: usize,
}

impl Default for NumberSystem {
    fn default() -> Self {
        Self {
            backend: Backend::Decimal,
            mode: RoundMode::TiesEven,
            default_precision: 0,
        }
    }
}

thread_local! {
    static NUMBER_SYSTEM: RefCell<NumberSystem> = RefCell::new(NumberSystem::default());
}

/// Returns the active backend.
#[must_use]
pub fn backend() -> Backend {
    NUMBER_SYSTEM.with(|system| system.borrow().backend)
}

/// Selects the active backend. Values minted earlier keep their payload.
pub fn set_backend(backend: Backend) {
    NUMBER_SYSTEM.with(|system| system.borrow_mut().backend = backend);
}

/// Returns the rounding mode last accepted by a backend.
#[must_use]
pub fn round_mode() -> RoundMode {
    NUMBER_SYSTEM.with(|system| system.borrow().mode)
}

/// Requests a rounding mode.
///
/// The active backend decides whether it can honor the mode; a refused mode
/// leaves the previous one in force, silently. Returns the mode now in
/// force.
pub fn set_round_mode(mode: RoundMode) -> RoundMode {
    NUMBER_SYSTEM.with(|system| {
        let mut system = system.borrow_mut();
        let accepted = match system.backend {
            Backend::Decimal => true,
            Backend::Double => matches!(
                mode,
                RoundMode::TiesEven
                    | RoundMode::TowardPositive
                    | RoundMode::TowardNegative
                    | RoundMode::TowardZero
            ),
        };
        if accepted {
            system.mode = mode;
        }
        system.mode
    })
}

/// Returns the default precision, in fractional decimal digits.
#[must_use]
pub fn default_precision() -> usize {
    NUMBER_SYSTEM.with(|system| system.borrow().default_precision)
}

/// Sets the default precision. The double backend ignores it.
pub fn set_default_precision(precision: usize) {
    NUMBER_SYSTEM.with(|system| system.borrow_mut().default_precision = precision);
}

/// Resets the numeric configuration to its startup state.
///
/// Tests use this to isolate themselves from each other; embedders may call
/// it between independent runs.
pub fn reset_number_system() {
    NUMBER_SYSTEM.with(|system| *system.borrow_mut() = NumberSystem::default());
}

/// An arbitrary-precision number minted by one of the backends.
///
/// The operation contract is uniform across backends: IEEE-754-style
/// totality (NaN propagates, infinities absorb finite operands, zero is
/// signed), per-value precision with rule-based propagation, and the six
/// comparisons where any NaN operand yields `false` except for inequality.
#[derive(Debug, Clone)]
pub enum Number {
    Decimal(DecimalNumber),
    Double(DoubleNumber),
}

impl Number {
    /// Zero in the active backend.
    #[must_use]
    pub fn zero() -> Self {
        match backend() {
            Backend::Decimal => Self::Decimal(DecimalNumber::zero()),
            Backend::Double => Self::Double(DoubleNumber::new(0.0)),
        }
    }

    /// One in the active backend.
    #[must_use]
    pub fn one() -> Self {
        match backend() {
            Backend::Decimal => Self::Decimal(DecimalNumber::from_integer(1)),
            Backend::Double => Self::Double(DoubleNumber::new(1.0)),
        }
    }

    /// Quiet NaN in the active backend.
    #[must_use]
    pub fn nan() -> Self {
        match backend() {
            Backend::Decimal => Self::Decimal(DecimalNumber::nan(false)),
            Backend::Double => Self::Double(DoubleNumber::new(f64::NAN)),
        }
    }

    /// Positive infinity in the active backend.
    #[must_use]
    pub fn infinity() -> Self {
        match backend() {
            Backend::Decimal => Self::Decimal(DecimalNumber::infinity(false)),
            Backend::Double => Self::Double(DoubleNumber::new(f64::INFINITY)),
        }
    }

    /// Parses a numeric literal in the active backend.
    ///
    /// Accepts the source forms both lexers produce: optional sign, digits
    /// with a `.` or `,` separator, optional `e`/`E` exponent. Malformed
    /// trailing input is ignored, an empty number is zero.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match backend() {
            Backend::Decimal => Self::Decimal(DecimalNumber::parse(text)),
            Backend::Double => Self::Double(DoubleNumber::parse(text)),
        }
    }

    /// A small non-negative integer in the active backend.
    #[must_use]
    pub fn from_usize(value: usize) -> Self {
        match backend() {
            Backend::Decimal => Self::Decimal(DecimalNumber::from_integer(value as i64)),
            Backend::Double => Self::Double(DoubleNumber::new(value as f64)),
        }
    }

    /// Converts the other operand into this operand's backend.
    ///
    /// All numbers flowing through one run come from the active backend, so
    /// this is the identity in practice; it only matters if an embedder
    /// retains values across a backend switch.
    fn align(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Decimal(_), Self::Decimal(_)) | (Self::Double(_), Self::Double(_)) => {
                other.clone()
            }
            (Self::Decimal(_), Self::Double(rhs)) => Self::Decimal(if rhs.is_nan() {
                DecimalNumber::nan(rhs.is_signed())
            } else if rhs.is_inf() {
                DecimalNumber::infinity(rhs.is_signed())
            } else {
                DecimalNumber::parse(&rhs.to_string())
            }),
            (Self::Double(_), Self::Decimal(rhs)) => Self::Double(if rhs.is_nan() {
                DoubleNumber::new(if rhs.is_signed() { -f64::NAN } else { f64::NAN })
            } else if rhs.is_inf() {
                DoubleNumber::new(if rhs.is_signed() {
                    f64::NEG_INFINITY
                } else {
                    f64::INFINITY
                })
            } else {
                DoubleNumber::parse(&rhs.to_string())
            }),
        }
    }

    /// True when the value is negative (including −0, −∞ and −NaN).
    #[must_use]
    pub fn is_signed(&self) -> bool {
        match self {
            Self::Decimal(value) => value.is_signed(),
            Self::Double(value) => value.is_signed(),
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Decimal(value) => value.is_zero(),
            Self::Double(value) => value.is_zero(),
        }
    }

    #[must_use]
    pub fn is_nan(&self) -> bool {
        match self {
            Self::Decimal(value) => value.is_nan(),
            Self::Double(value) => value.is_nan(),
        }
    }

    #[must_use]
    pub fn is_inf(&self) -> bool {
        match self {
            Self::Decimal(value) => value.is_inf(),
            Self::Double(value) => value.is_inf(),
        }
    }

    /// Whether aggregate min/max should return this value unconditionally.
    ///
    /// The decimal backend short-circuits on NaN and on the infinities; the
    /// double backend only on NaN.
    #[must_use]
    pub fn short_min_max(&self) -> bool {
        match self {
            Self::Decimal(value) => value.is_nan() || value.is_inf(),
            Self::Double(value) => value.is_nan(),
        }
    }

    /// True for finite values with no fractional part.
    #[must_use]
    pub fn is_integral(&self) -> bool {
        match self {
            Self::Decimal(value) => value.is_integral(),
            Self::Double(value) => value.is_integral(),
        }
    }

    /// Lossy conversion used for container indexing.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        match self {
            Self::Decimal(value) => value.to_f64(),
            Self::Double(value) => value.get(),
        }
    }

    /// The precision of this value, in fractional decimal digits.
    #[must_use]
    pub fn precision(&self) -> usize {
        match self {
            Self::Decimal(value) => value.precision(),
            Self::Double(value) => value.precision(),
        }
    }

    /// Returns this value carried at a new precision, rounding in the
    /// ambient mode when digits are discarded.
    #[must_use]
    pub fn with_precision(&self, precision: usize) -> Self {
        match self {
            Self::Decimal(value) => Self::Decimal(value.with_precision(precision, round_mode())),
            Self::Double(value) => Self::Double(value.clone()),
        }
    }

    #[must_use]
    pub fn neg(&self) -> Self {
        match self {
            Self::Decimal(value) => Self::Decimal(value.neg()),
            Self::Double(value) => Self::Double(value.neg()),
        }
    }

    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        match (self, self.align(other)) {
            (Self::Decimal(lhs), Self::Decimal(rhs)) => Self::Decimal(lhs.add(&rhs)),
            (Self::Double(lhs), Self::Double(rhs)) => Self::Double(lhs.add(&rhs)),
            _ => unreachable!("operands are aligned"),
        }
    }

    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        match (self, self.align(other)) {
            (Self::Decimal(lhs), Self::Decimal(rhs)) => Self::Decimal(lhs.sub(&rhs)),
            (Self::Double(lhs), Self::Double(rhs)) => Self::Double(lhs.sub(&rhs)),
            _ => unreachable!("operands are aligned"),
        }
    }

    #[must_use]
    pub fn mul(&self, other: &Self) -> Self {
        match (self, self.align(other)) {
            (Self::Decimal(lhs), Self::Decimal(rhs)) => {
                Self::Decimal(lhs.mul(&rhs, default_precision(), round_mode()))
            }
            (Self::Double(lhs), Self::Double(rhs)) => Self::Double(lhs.mul(&rhs)),
            _ => unreachable!("operands are aligned"),
        }
    }

    #[must_use]
    pub fn div(&self, other: &Self) -> Self {
        match (self, self.align(other)) {
            (Self::Decimal(lhs), Self::Decimal(rhs)) => {
                Self::Decimal(lhs.div(&rhs, default_precision(), round_mode()))
            }
            (Self::Double(lhs), Self::Double(rhs)) => Self::Double(lhs.div(&rhs)),
            _ => unreachable!("operands are aligned"),
        }
    }

    /// IEEE-style partial comparison: `None` when a NaN is involved.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, self.align(other)) {
            (Self::Decimal(lhs), Self::Decimal(rhs)) => lhs.compare(&rhs),
            (Self::Double(lhs), Self::Double(rhs)) => lhs.compare(&rhs),
            _ => unreachable!("operands are aligned"),
        }
    }

    #[must_use]
    pub fn less(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Less)
    }

    #[must_use]
    pub fn less_equal(&self, other: &Self) -> bool {
        matches!(self.compare(other), Some(Ordering::Less | Ordering::Equal))
    }

    #[must_use]
    pub fn greater(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Greater)
    }

    #[must_use]
    pub fn greater_equal(&self, other: &Self) -> bool {
        matches!(
            self.compare(other),
            Some(Ordering::Greater | Ordering::Equal)
        )
    }

    #[must_use]
    pub fn equal_to(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// The one comparison a NaN operand satisfies.
    #[must_use]
    pub fn not_equal_to(&self, other: &Self) -> bool {
        self.compare(other) != Some(Ordering::Equal)
    }

    /// Rounds to an integral value, ties away from zero. Precision is kept.
    #[must_use]
    pub fn round(&self) -> Self {
        match self {
            Self::Decimal(value) => Self::Decimal(value.round_to_integer(RoundMode::TiesAway)),
            Self::Double(value) => Self::Double(value.round()),
        }
    }

    /// Rounds to the next integral value toward −∞. Precision is kept.
    #[must_use]
    pub fn floor(&self) -> Self {
        match self {
            Self::Decimal(value) => {
                Self::Decimal(value.round_to_integer(RoundMode::TowardNegative))
            }
            Self::Double(value) => Self::Double(value.floor()),
        }
    }

    /// Rounds to the next integral value toward +∞. Precision is kept.
    #[must_use]
    pub fn ceil(&self) -> Self {
        match self {
            Self::Decimal(value) => {
                Self::Decimal(value.round_to_integer(RoundMode::TowardPositive))
            }
            Self::Double(value) => Self::Double(value.ceil()),
        }
    }

    /// Source rendering: specials become the division idioms `1/0`, `-1/0`,
    /// `0/0`, `-0/0` so that rendered cell formulas re-parse.
    #[must_use]
    pub fn to_source_string(&self) -> String {
        match self {
            Self::Decimal(value) => value.to_source_string(),
            Self::Double(value) => value.to_source_string(),
        }
    }

    /// Total ordering for use as a dictionary key: −NaN below −∞, +NaN
    /// above +∞, −0 before +0, everything else by numeric value.
    #[must_use]
    pub fn key_cmp(&self, other: &Self) -> Ordering {
        fn rank(n: &Number) -> i8 {
            if n.is_nan() {
                if n.is_signed() { -2 } else { 2 }
            } else if n.is_inf() {
                if n.is_signed() { -1 } else { 1 }
            } else {
                0
            }
        }
        let (lhs_rank, rhs_rank) = (rank(self), rank(other));
        if lhs_rank != 0 || rhs_rank != 0 {
            return lhs_rank.cmp(&rhs_rank);
        }
        match self.compare(other) {
            Some(ordering) => ordering,
            None => unreachable!("NaN handled by rank"),
        }
    }

    /// Hashes the canonical numeric value, so `1.5` and `1.50` collide.
    pub fn canonical_hash<H: Hasher>(&self, state: &mut H) {
        if self.is_nan() {
            state.write_u8(if self.is_signed() { 0xFE } else { 0xFF });
            return;
        }
        if self.is_inf() {
            state.write_u8(if self.is_signed() { 0x02 } else { 0x01 });
            return;
        }
        // Canonical form: the display string with trailing fractional zeros
        // and a trailing separator removed.
        let text = self.to_string();
        let canonical = if text.contains('.') {
            text.trim_end_matches('0').trim_end_matches('.')
        } else {
            text.as_str()
        };
        let canonical = if canonical == "-0" { "0" } else { canonical };
        canonical.hash(state);
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decimal(value) => Display::fmt(value, f),
            Self::Double(value) => Display::fmt(value, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(text: &str) -> Number {
        Number::Decimal(DecimalNumber::parse(text))
    }

    #[test]
    fn round_mode_codes_round_trip() {
        for code in 0..=8 {
            let mode = RoundMode::from_code(code).unwrap();
            assert_eq!(mode.code(), code);
        }
        assert!(RoundMode::from_code(9).is_none());
    }

    #[test]
    fn double_backend_refuses_ties_away() {
        reset_number_system();
        set_backend(Backend::Double);
        assert_eq!(set_round_mode(RoundMode::TowardZero), RoundMode::TowardZero);
        assert_eq!(set_round_mode(RoundMode::TiesAway), RoundMode::TowardZero);
        reset_number_system();
    }

    #[test]
    fn key_ordering_is_total() {
        let neg_nan = Number::Decimal(DecimalNumber::nan(true));
        let pos_nan = Number::Decimal(DecimalNumber::nan(false));
        let neg_inf = Number::Decimal(DecimalNumber::infinity(true));
        let pos_inf = Number::Decimal(DecimalNumber::infinity(false));
        let small = dec("-3");
        let big = dec("7.5");
        let mut values = vec![
            pos_nan.clone(),
            big.clone(),
            neg_inf.clone(),
            small.clone(),
            pos_inf.clone(),
            neg_nan.clone(),
        ];
        values.sort_by(Number::key_cmp);
        let rendered: Vec<String> = values.iter().map(Number::to_source_string).collect();
        assert_eq!(rendered, vec!["-0/0", "-1/0", "-3", "7.5", "1/0", "0/0"]);
    }

    #[test]
    fn short_min_max_depends_on_backend() {
        assert!(Number::Decimal(DecimalNumber::infinity(false)).short_min_max());
        assert!(!Number::Double(DoubleNumber::new(f64::INFINITY)).short_min_max());
        assert!(Number::Double(DoubleNumber::new(f64::NAN)).short_min_max());
    }
}
