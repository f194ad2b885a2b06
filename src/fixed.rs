//! Exact fixed-point arithmetic for prices and monetary amounts.
//!
//! All prices and cash values in the engine are [`Fixed`]: a signed 64-bit
//! integer scaled by `10^8` (eight decimal places). Quantities are whole
//! units (`u32`). Multiplying a price by a quantity yields a [`Notional`]
//! (`i128`, same scale), which keeps intermediate products exact without
//! ever touching floating point. Divisions truncate toward zero.
//!
//! None of the operators here wrap or saturate: every arithmetic entry
//! point is checked and returns `Option`, and the engine treats `None` as
//! a fatal fault rather than continuing with a corrupted ledger.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of fixed-point units per whole unit (`10^8`).
pub const SCALE: i64 = 100_000_000;

/// Decimal digits carried after the point.
const DECIMALS: u32 = 8;

/// A signed monetary amount or price, scaled by [`SCALE`].
///
/// The raw representation is public through [`Fixed::raw`] /
/// [`Fixed::from_raw`] so the journal and tests can round-trip values
/// exactly; everything else goes through checked arithmetic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Fixed(i64);

/// A price multiplied by a quantity, still scaled by [`SCALE`].
///
/// `i128` gives enough headroom that any `i64` price times any `u32`
/// quantity is representable without overflow.
pub type Notional = i128;

impl Fixed {
    /// Zero.
    pub const ZERO: Fixed = Fixed(0);

    /// One whole unit (`1.0`).
    pub const ONE: Fixed = Fixed(SCALE);

    /// Builds a value from its raw scaled representation.
    #[must_use]
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Fixed(raw)
    }

    /// Returns the raw scaled representation.
    #[must_use]
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Builds a value from a whole number of units.
    ///
    /// Returns `None` if `units * SCALE` overflows `i64`.
    #[must_use]
    pub fn from_int(units: i64) -> Option<Self> {
        units.checked_mul(SCALE).map(Fixed)
    }

    /// `true` for values strictly greater than zero.
    #[must_use]
    #[inline]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[must_use]
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    #[must_use]
    #[inline]
    pub fn checked_add(self, rhs: Fixed) -> Option<Fixed> {
        self.0.checked_add(rhs.0).map(Fixed)
    }

    /// Checked subtraction.
    #[must_use]
    #[inline]
    pub fn checked_sub(self, rhs: Fixed) -> Option<Fixed> {
        self.0.checked_sub(rhs.0).map(Fixed)
    }

    /// Absolute difference, exact.
    #[must_use]
    pub fn abs_diff(self, rhs: Fixed) -> Fixed {
        Fixed((self.0 as i128 - rhs.0 as i128).unsigned_abs().min(i64::MAX as u128) as i64)
    }

    /// Price times quantity as an exact [`Notional`].
    ///
    /// Cannot overflow: `|i64| * u32 < i128::MAX` by a wide margin.
    #[must_use]
    #[inline]
    pub fn notional(self, qty: u32) -> Notional {
        self.0 as i128 * qty as i128
    }

    /// Multiplies by a fixed-point ratio (`self * pct / SCALE`), truncating
    /// toward zero.
    #[must_use]
    pub fn mul_pct(self, pct: Fixed) -> Option<Fixed> {
        let wide = self.0 as i128 * pct.0 as i128 / SCALE as i128;
        i64::try_from(wide).ok().map(Fixed)
    }

    /// `true` when `self` is an exact multiple of `tick`.
    ///
    /// A non-positive tick never validates anything.
    #[must_use]
    pub fn is_multiple_of(self, tick: Fixed) -> bool {
        tick.0 > 0 && self.0 % tick.0 == 0
    }

    /// Midpoint of two prices, truncating toward zero.
    #[must_use]
    pub fn mid(self, other: Fixed) -> Fixed {
        Fixed(((self.0 as i128 + other.0 as i128) / 2) as i64)
    }

    /// Converts an exact notional back to `Fixed`, failing on `i64`
    /// overflow.
    #[must_use]
    pub fn from_notional(n: Notional) -> Option<Fixed> {
        i64::try_from(n).ok().map(Fixed)
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / SCALE as u64;
        let frac = abs % SCALE as u64;
        if frac == 0 {
            return write!(f, "{sign}{whole}");
        }
        let mut frac_str = format!("{frac:08}");
        while frac_str.ends_with('0') {
            frac_str.pop();
        }
        write!(f, "{sign}{whole}.{frac_str}")
    }
}

/// Error returned when a decimal string cannot be parsed as [`Fixed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFixedError(String);

impl fmt::Display for ParseFixedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid fixed-point literal: {}", self.0)
    }
}

impl std::error::Error for ParseFixedError {}

impl FromStr for Fixed {
    type Err = ParseFixedError;

    /// Parses a plain decimal literal like `100`, `-3.5`, or `0.00000001`.
    ///
    /// More than eight fractional digits is an error rather than a silent
    /// truncation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseFixedError(s.to_string());
        let (sign, body) = match s.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, s),
        };
        if body.is_empty() {
            return Err(err());
        }
        let (whole_str, frac_str) = match body.split_once('.') {
            Some((w, f)) => (w, f),
            None => (body, ""),
        };
        if whole_str.is_empty() && frac_str.is_empty() {
            return Err(err());
        }
        if frac_str.len() > DECIMALS as usize {
            return Err(err());
        }
        let whole: i64 = if whole_str.is_empty() {
            0
        } else {
            whole_str.parse().map_err(|_| err())?
        };
        let frac: i64 = if frac_str.is_empty() {
            0
        } else {
            let padded = format!("{frac_str:0<8}");
            padded.parse().map_err(|_| err())?
        };
        let raw = whole
            .checked_mul(SCALE)
            .and_then(|w| w.checked_add(frac))
            .and_then(|v| v.checked_mul(sign))
            .ok_or_else(err)?;
        Ok(Fixed(raw))
    }
}
