//! Fixed-point decimal with two fractional digits.
//!
//! Prices, surface areas and budgets are stored as integer hundredths so
//! that a value written is exactly the value read back. Text and JSON forms
//! go through [`BigDecimal`].

use std::fmt;
use std::str::FromStr;

use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const SCALE: i64 = 2;

/// A non-floating decimal number with scale 2 (e.g. `1250000.50`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, sqlx::Type)]
#[sqlx(transparent)]
pub struct FixedDecimal(i64);

/// Error returned when a value cannot be held as a [`FixedDecimal`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid decimal '{0}': expected a number with at most two decimal places")]
pub struct ParseFixedDecimalError(String);

impl FixedDecimal {
    /// Zero.
    pub const ZERO: FixedDecimal = FixedDecimal(0);

    /// Build from a count of hundredths (`12345` is `123.45`).
    pub const fn from_hundredths(hundredths: i64) -> Self {
        FixedDecimal(hundredths)
    }

    /// Build from whole units (`12` is `12.00`).
    pub fn from_units(units: i64) -> Option<Self> {
        units.checked_mul(100).map(FixedDecimal)
    }

    /// The raw stored value in hundredths.
    pub const fn hundredths(self) -> i64 {
        self.0
    }

    /// The value as an arbitrary-precision decimal with scale 2.
    pub fn to_big_decimal(self) -> BigDecimal {
        BigDecimal::new(BigInt::from(self.0), SCALE)
    }
}

impl TryFrom<&BigDecimal> for FixedDecimal {
    type Error = ParseFixedDecimalError;

    /// Fails when the value has more than two significant fractional
    /// digits or does not fit in `i64` hundredths.
    fn try_from(value: &BigDecimal) -> Result<Self, Self::Error> {
        let err = || ParseFixedDecimalError(value.to_string());

        let rescaled = value.with_scale(SCALE);
        if &rescaled != value {
            return Err(err());
        }

        let (hundredths, _) = rescaled.as_bigint_and_exponent();
        hundredths.to_i64().map(FixedDecimal).ok_or_else(err)
    }
}

impl From<FixedDecimal> for BigDecimal {
    fn from(value: FixedDecimal) -> Self {
        value.to_big_decimal()
    }
}

impl fmt::Display for FixedDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_big_decimal(), f)
    }
}

impl FromStr for FixedDecimal {
    type Err = ParseFixedDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value =
            BigDecimal::from_str(s.trim()).map_err(|_| ParseFixedDecimalError(s.to_string()))?;
        FixedDecimal::try_from(&value)
    }
}

impl Serialize for FixedDecimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_big_decimal().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FixedDecimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = BigDecimal::deserialize(deserializer)?;
        FixedDecimal::try_from(&value).map_err(serde::de::Error::custom)
    }
}
