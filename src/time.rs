//! Virtual time for the simulation kernel.
//!
//! `VirtualTime` is a signed count of attoseconds stored in an `i128`. That
//! resolution is fine enough for any PHY model while the range (about
//! 5·10¹² years either side of zero) is never a practical constraint. Time
//! only moves when the engine executes an event; nothing here reads the
//! wall clock.
//!
//! Arithmetic never wraps. The `checked_*` methods report overflow as a
//! [`TimeError`]; the operator impls panic, the same contract
//! `std::time::Duration` has.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by time construction, parsing and arithmetic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("virtual time overflow in {op}")]
    Overflow { op: &'static str },

    #[error("time value is not finite")]
    NotFinite,

    #[error("invalid time literal: {0}")]
    Parse(String),
}

/// Units accepted by [`VirtualTime::from_unit`] and the string form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
    Millis,
    Micros,
    Nanos,
    Picos,
    Femtos,
    Attos,
}

impl TimeUnit {
    /// Every unit, largest first.
    pub const ALL: [TimeUnit; 10] = [
        TimeUnit::Days,
        TimeUnit::Hours,
        TimeUnit::Minutes,
        TimeUnit::Seconds,
        TimeUnit::Millis,
        TimeUnit::Micros,
        TimeUnit::Nanos,
        TimeUnit::Picos,
        TimeUnit::Femtos,
        TimeUnit::Attos,
    ];

    /// Number of attoseconds in one of this unit.
    pub const fn attos(self) -> i128 {
        match self {
            TimeUnit::Days => 86_400 * ATTOS_PER_SEC,
            TimeUnit::Hours => 3_600 * ATTOS_PER_SEC,
            TimeUnit::Minutes => 60 * ATTOS_PER_SEC,
            TimeUnit::Seconds => ATTOS_PER_SEC,
            TimeUnit::Millis => 1_000_000_000_000_000,
            TimeUnit::Micros => 1_000_000_000_000,
            TimeUnit::Nanos => 1_000_000_000,
            TimeUnit::Picos => 1_000_000,
            TimeUnit::Femtos => 1_000,
            TimeUnit::Attos => 1,
        }
    }

    /// Short suffix used when formatting.
    pub const fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Days => "d",
            TimeUnit::Hours => "h",
            TimeUnit::Minutes => "min",
            TimeUnit::Seconds => "s",
            TimeUnit::Millis => "ms",
            TimeUnit::Micros => "us",
            TimeUnit::Nanos => "ns",
            TimeUnit::Picos => "ps",
            TimeUnit::Femtos => "fs",
            TimeUnit::Attos => "as",
        }
    }
}

impl FromStr for TimeUnit {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "d" => Ok(TimeUnit::Days),
            "h" => Ok(TimeUnit::Hours),
            "min" => Ok(TimeUnit::Minutes),
            "s" | "sec" => Ok(TimeUnit::Seconds),
            "ms" => Ok(TimeUnit::Millis),
            "us" | "µs" => Ok(TimeUnit::Micros),
            "ns" => Ok(TimeUnit::Nanos),
            "ps" => Ok(TimeUnit::Picos),
            "fs" => Ok(TimeUnit::Femtos),
            "as" => Ok(TimeUnit::Attos),
            other => Err(TimeError::Parse(format!("unknown unit {:?}", other))),
        }
    }
}

const ATTOS_PER_SEC: i128 = 1_000_000_000_000_000_000;

/// A point (or offset) on the simulation's virtual timeline.
///
/// Zero is the start of the simulation. Offsets handed to the scheduling
/// calls use the same type; negative offsets are representable but the
/// engine rejects them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VirtualTime(i128);

impl VirtualTime {
    /// The zero-point of simulation time.
    pub const ZERO: VirtualTime = VirtualTime(0);

    /// The latest representable instant.
    pub const MAX: VirtualTime = VirtualTime(i128::MAX);

    /// The earliest representable instant.
    pub const MIN: VirtualTime = VirtualTime(i128::MIN);

    /// Builds a time from a count of `unit`, failing if the result does not
    /// fit the attosecond representation.
    pub fn from_unit(value: i128, unit: TimeUnit) -> Result<Self, TimeError> {
        value
            .checked_mul(unit.attos())
            .map(VirtualTime)
            .ok_or(TimeError::Overflow { op: "from_unit" })
    }

    // An i64 count of any unit up to seconds always fits in i128 attoseconds.

    #[inline]
    pub const fn from_secs(secs: i64) -> Self {
        VirtualTime(secs as i128 * ATTOS_PER_SEC)
    }

    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        VirtualTime(millis as i128 * TimeUnit::Millis.attos())
    }

    #[inline]
    pub const fn from_micros(micros: i64) -> Self {
        VirtualTime(micros as i128 * TimeUnit::Micros.attos())
    }

    #[inline]
    pub const fn from_nanos(nanos: i64) -> Self {
        VirtualTime(nanos as i128 * TimeUnit::Nanos.attos())
    }

    #[inline]
    pub const fn from_picos(picos: i64) -> Self {
        VirtualTime(picos as i128 * TimeUnit::Picos.attos())
    }

    #[inline]
    pub const fn from_attos(attos: i128) -> Self {
        VirtualTime(attos)
    }

    /// Builds a time from fractional seconds, rounding to the nearest
    /// attosecond.
    pub fn from_secs_f64(secs: f64) -> Result<Self, TimeError> {
        if !secs.is_finite() {
            return Err(TimeError::NotFinite);
        }
        let attos = (secs * ATTOS_PER_SEC as f64).round();
        if attos >= i128::MAX as f64 || attos < i128::MIN as f64 {
            return Err(TimeError::Overflow { op: "from_secs_f64" });
        }
        Ok(VirtualTime(attos as i128))
    }

    /// Raw attosecond count.
    #[inline]
    pub const fn attos(self) -> i128 {
        self.0
    }

    /// Whole units of `unit`, truncated toward zero.
    #[inline]
    pub const fn as_unit(self, unit: TimeUnit) -> i128 {
        self.0 / unit.attos()
    }

    /// Lossy conversion to seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / ATTOS_PER_SEC as f64
    }

    #[inline]
    pub const fn as_millis(self) -> i128 {
        self.as_unit(TimeUnit::Millis)
    }

    #[inline]
    pub const fn as_micros(self) -> i128 {
        self.as_unit(TimeUnit::Micros)
    }

    #[inline]
    pub const fn as_nanos(self) -> i128 {
        self.as_unit(TimeUnit::Nanos)
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `> 0`. Consumers use this to gate conditional scheduling.
    #[inline]
    pub const fn is_strictly_positive(self) -> bool {
        self.0 > 0
    }

    /// `>= 0`.
    #[inline]
    pub const fn is_positive(self) -> bool {
        self.0 >= 0
    }

    /// `< 0`.
    #[inline]
    pub const fn is_strictly_negative(self) -> bool {
        self.0 < 0
    }

    /// `<= 0`.
    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 <= 0
    }

    pub fn checked_add(self, rhs: VirtualTime) -> Result<Self, TimeError> {
        self.0
            .checked_add(rhs.0)
            .map(VirtualTime)
            .ok_or(TimeError::Overflow { op: "add" })
    }

    pub fn checked_sub(self, rhs: VirtualTime) -> Result<Self, TimeError> {
        self.0
            .checked_sub(rhs.0)
            .map(VirtualTime)
            .ok_or(TimeError::Overflow { op: "sub" })
    }

    pub fn checked_mul(self, factor: i64) -> Result<Self, TimeError> {
        self.0
            .checked_mul(factor as i128)
            .map(VirtualTime)
            .ok_or(TimeError::Overflow { op: "mul" })
    }

    pub fn checked_neg(self) -> Result<Self, TimeError> {
        self.0
            .checked_neg()
            .map(VirtualTime)
            .ok_or(TimeError::Overflow { op: "neg" })
    }

    pub fn checked_abs(self) -> Result<Self, TimeError> {
        self.0
            .checked_abs()
            .map(VirtualTime)
            .ok_or(TimeError::Overflow { op: "abs" })
    }

    /// Returns `true` if `self` is strictly before `other`.
    #[inline]
    pub fn is_before(self, other: VirtualTime) -> bool {
        self.0 < other.0
    }

    /// The largest unit that represents this value exactly.
    fn display_unit(self) -> TimeUnit {
        TimeUnit::ALL
            .into_iter()
            .find(|unit| self.0 % unit.attos() == 0)
            .unwrap_or(TimeUnit::Attos)
    }
}

impl Add for VirtualTime {
    type Output = VirtualTime;

    fn add(self, rhs: VirtualTime) -> VirtualTime {
        match self.checked_add(rhs) {
            Ok(t) => t,
            Err(e) => panic!("{}: {} + {}", e, self, rhs),
        }
    }
}

impl AddAssign for VirtualTime {
    fn add_assign(&mut self, rhs: VirtualTime) {
        *self = *self + rhs;
    }
}

impl Sub for VirtualTime {
    type Output = VirtualTime;

    fn sub(self, rhs: VirtualTime) -> VirtualTime {
        match self.checked_sub(rhs) {
            Ok(t) => t,
            Err(e) => panic!("{}: {} - {}", e, self, rhs),
        }
    }
}

impl SubAssign for VirtualTime {
    fn sub_assign(&mut self, rhs: VirtualTime) {
        *self = *self - rhs;
    }
}

impl Mul<i64> for VirtualTime {
    type Output = VirtualTime;

    fn mul(self, factor: i64) -> VirtualTime {
        match self.checked_mul(factor) {
            Ok(t) => t,
            Err(e) => panic!("{}: {} * {}", e, self, factor),
        }
    }
}

impl Neg for VirtualTime {
    type Output = VirtualTime;

    fn neg(self) -> VirtualTime {
        match self.checked_neg() {
            Ok(t) => t,
            Err(e) => panic!("{}: -({})", e, self),
        }
    }
}

impl From<std::time::Duration> for VirtualTime {
    /// `Duration` tops out near 1.8·10¹⁹ s, well inside the range.
    fn from(d: std::time::Duration) -> Self {
        VirtualTime(d.as_secs() as i128 * ATTOS_PER_SEC + d.subsec_nanos() as i128 * TimeUnit::Nanos.attos())
    }
}

impl fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "0s");
        }
        let unit = self.display_unit();
        write!(f, "{}{}", self.0 / unit.attos(), unit.suffix())
    }
}

impl FromStr for VirtualTime {
    type Err = TimeError;

    /// Parses `"<number><unit>"`, e.g. `"10ns"`, `"3 ms"`, `"-2s"`, `"1.5us"`.
    /// Fractions must land exactly on an attosecond.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_alphabetic())
            .ok_or_else(|| TimeError::Parse(format!("missing unit in {:?}", s)))?;
        let (number, unit) = s.split_at(split);
        let unit: TimeUnit = unit.trim().parse()?;

        let number = number.trim();
        let (negative, digits) = match number.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, number.strip_prefix('+').unwrap_or(number)),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
            return Err(TimeError::Parse(format!("bad number in {:?}", s)));
        }
        // 38 digits is the most an i128 fraction numerator can hold.
        if frac.len() > 38 {
            return Err(TimeError::Parse(format!("fraction too long in {:?}", s)));
        }

        let overflow = TimeError::Overflow { op: "parse" };
        let scale = unit.attos();
        let whole: i128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow.clone())?
        };
        let mut attos = whole.checked_mul(scale).ok_or_else(|| overflow.clone())?;

        if !frac.is_empty() {
            let numerator: i128 = frac.parse().map_err(|_| overflow.clone())?;
            let denominator = 10i128.pow(frac.len() as u32);
            let scaled = numerator.checked_mul(scale).ok_or_else(|| overflow.clone())?;
            if scaled % denominator != 0 {
                return Err(TimeError::Parse(format!(
                    "{:?} is finer than one attosecond",
                    s
                )));
            }
            attos = attos
                .checked_add(scaled / denominator)
                .ok_or_else(|| overflow.clone())?;
        }

        Ok(VirtualTime(if negative { -attos } else { attos }))
    }
}

impl TryFrom<String> for VirtualTime {
    type Error = TimeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<VirtualTime> for String {
    fn from(t: VirtualTime) -> String {
        t.to_string()
    }
}
