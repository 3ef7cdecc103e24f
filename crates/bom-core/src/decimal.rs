// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Exact fixed-point decimals for CO2 inputs and CFP outputs.
//!
//! Both types store a scaled `i128`:
//! - [`Co2`]: `real_value = raw / 10^8`
//! - [`Cfp`]: `real_value = raw / 10^4`
//!
//! CFP text is part of the hash contract: `base_hash = SHA-256(cfp text)`,
//! where the text is the SQL `CAST(DECIMAL(_, 4) AS CHAR)` rendering. That
//! means exactly four fractional digits, no exponent, no grouping, and a
//! leading `-` only for negative values (`12.3` → `"12.3000"`).
//!
//! Rounding from `Co2` scale to `Cfp` scale is half away from zero, matching
//! SQL `ROUND(x, 4)` on exact decimals.
use std::fmt;
use std::str::FromStr;

/// Fractional digits carried by [`Co2`].
pub const CO2_SCALE: u32 = 8;
/// Fractional digits carried by [`Cfp`].
pub const CFP_SCALE: u32 = 4;

const CO2_PER_CFP: i128 = 10_i128.pow(CO2_SCALE - CFP_SCALE);

/// Errors produced while parsing decimal text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecimalError {
    /// Input had no digits.
    #[error("[DECIMAL_EMPTY] no digits in {0:?}")]
    Empty(String),
    /// Input contained something other than sign, digits and one point.
    #[error("[DECIMAL_SYNTAX] invalid decimal literal {0:?}")]
    Syntax(String),
    /// More fractional digits than the target scale can represent exactly.
    #[error("[DECIMAL_PRECISION] {input:?} has more than {scale} fractional digits")]
    TooPrecise {
        /// Offending literal.
        input: String,
        /// Maximum fractional digits for the target type.
        scale: u32,
    },
    /// Value does not fit the scaled `i128` representation.
    #[error("[DECIMAL_OVERFLOW] {0:?} is out of range")]
    Overflow(String),
    /// Non-finite floating point input.
    #[error("[DECIMAL_NON_FINITE] {0} is not finite")]
    NonFinite(f64),
}

fn parse_scaled(input: &str, scale: u32) -> Result<i128, DecimalError> {
    let s = input.trim();
    let (negative, body) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(DecimalError::Empty(input.to_owned()));
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(DecimalError::Syntax(input.to_owned()));
    }
    // Trailing zeros beyond the scale are harmless (`1.50000000000`).
    let frac_trimmed = frac_part.trim_end_matches('0');
    if frac_trimmed.len() > scale as usize {
        return Err(DecimalError::TooPrecise {
            input: input.to_owned(),
            scale,
        });
    }

    let overflow = || DecimalError::Overflow(input.to_owned());
    let mut raw: i128 = 0;
    for b in int_part.bytes() {
        raw = raw
            .checked_mul(10)
            .and_then(|v| v.checked_add(i128::from(b - b'0')))
            .ok_or_else(overflow)?;
    }
    let mut frac_digits = frac_trimmed.bytes();
    for _ in 0..scale {
        let digit = frac_digits.next().map_or(0, |b| i128::from(b - b'0'));
        raw = raw
            .checked_mul(10)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(overflow)?;
    }
    Ok(if negative { -raw } else { raw })
}

fn write_scaled(f: &mut fmt::Formatter<'_>, raw: i128, scale: u32) -> fmt::Result {
    let one = 10_u128.pow(scale);
    let magnitude = raw.unsigned_abs();
    let sign = if raw < 0 { "-" } else { "" };
    write!(
        f,
        "{sign}{}.{:0width$}",
        magnitude / one,
        magnitude % one,
        width = scale as usize
    )
}

/// Divides by `divisor` (> 0), rounding half away from zero.
fn div_round_half_away(value: i128, divisor: i128) -> i128 {
    let q = value / divisor;
    let r = value % divisor;
    if r.unsigned_abs() * 2 >= divisor.unsigned_abs() {
        q + value.signum()
    } else {
        q
    }
}

/// Per-unit CO2 value of a part (8 fractional digits, exact).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Co2(i128);

impl Co2 {
    /// Zero emissions.
    pub const ZERO: Self = Self(0);

    /// Builds a value from its raw `10^-8` units.
    pub const fn from_raw(raw: i128) -> Self {
        Self(raw)
    }

    /// Raw `10^-8` units.
    pub const fn raw(self) -> i128 {
        self.0
    }

    /// Converts a floating point column value, rounding half away from zero
    /// at eight fractional digits.
    pub fn from_f64(value: f64) -> Result<Self, DecimalError> {
        if !value.is_finite() {
            return Err(DecimalError::NonFinite(value));
        }
        let scaled = (value * 1e8).round();
        if scaled.abs() >= 1.0e36 {
            return Err(DecimalError::Overflow(value.to_string()));
        }
        #[allow(clippy::cast_possible_truncation)]
        let raw = scaled as i128;
        Ok(Self(raw))
    }

    /// Multiplies by an aggregated quantity; `None` on overflow.
    pub fn checked_mul_qty(self, qty: u128) -> Option<i128> {
        i128::try_from(qty).ok().and_then(|q| self.0.checked_mul(q))
    }
}

impl FromStr for Co2 {
    type Err = DecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_scaled(s, CO2_SCALE).map(Self)
    }
}

impl fmt::Display for Co2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_scaled(f, self.0, CO2_SCALE)
    }
}

impl fmt::Debug for Co2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Co2({self})")
    }
}

/// Carbon footprint, rounded to four fractional digits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Cfp(i128);

impl Cfp {
    /// Zero footprint.
    pub const ZERO: Self = Self(0);

    /// Builds a value from its raw `10^-4` units.
    pub const fn from_raw(raw: i128) -> Self {
        Self(raw)
    }

    /// Raw `10^-4` units.
    pub const fn raw(self) -> i128 {
        self.0
    }

    /// Rounds an exact sum expressed in [`Co2`] units (`10^-8`) to four
    /// fractional digits, half away from zero.
    pub fn round_from_co2_units(sum: i128) -> Self {
        Self(div_round_half_away(sum, CO2_PER_CFP))
    }

    /// The canonical text hashed into the base hash.
    pub fn to_canonical_string(self) -> String {
        self.to_string()
    }
}

impl FromStr for Cfp {
    type Err = DecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_scaled(s, CFP_SCALE).map(Self)
    }
}

impl fmt::Display for Cfp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_scaled(f, self.0, CFP_SCALE)
    }
}

impl fmt::Debug for Cfp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cfp({self})")
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Cfp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Cfp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
