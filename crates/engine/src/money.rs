use std::{fmt, ops::Neg};

use crate::EngineError;

/// Signed ledger amount represented as **integer milliunits**.
///
/// One currency unit is 1000 milliunits, one cent is 10 milliunits. The
/// ledger accepts only this representation, so every amount that leaves a
/// provider goes through this type to avoid floating-point drift.
///
/// # Examples
///
/// ```rust
/// use engine::Milliunits;
///
/// assert_eq!(Milliunits::from_balance("81.1").unwrap().milliunits(), 81_100);
/// assert_eq!(Milliunits::from_balance("-1.23").unwrap().milliunits(), -1_230);
/// assert!(Milliunits::from_balance("12").is_err());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Milliunits(i64);

impl Milliunits {
    /// Creates a new amount from integer milliunits.
    #[must_use]
    pub const fn new(milliunits: i64) -> Self {
        Self(milliunits)
    }

    /// Returns the raw value in milliunits.
    #[must_use]
    pub const fn milliunits(self) -> i64 {
        self.0
    }

    /// Converts a decimal balance string (`[-]D+.C{1,2}`) into milliunits.
    ///
    /// The integer and fractional parts are parsed separately. A single
    /// fractional digit is read as tenths (`"81.1"` is 81 units 10 cents).
    /// When the integer part is negative the cents take the same sign before
    /// the two parts are combined.
    ///
    /// A balance with a zero integer part keeps the sign of the cents only
    /// if the cents themselves carry it: `"-0.50"` parses the integer part
    /// as `0`, which is not negative, so the result is `500`.
    pub fn from_balance(balance: &str) -> Result<Self, EngineError> {
        let invalid = || EngineError::InvalidAmount(format!("invalid balance \"{balance}\""));
        let overflow = || EngineError::InvalidAmount(format!("balance \"{balance}\" too large"));

        let parts: Vec<&str> = balance.split('.').collect();
        let [units_str, cents_str] = parts.as_slice() else {
            return Err(invalid());
        };

        if cents_str.is_empty()
            || cents_str.len() > 2
            || !cents_str.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }

        let units: i64 = units_str.parse().map_err(|_| invalid())?;
        let mut cents: i64 = cents_str.parse().map_err(|_| invalid())?;

        if cents_str.len() == 1 {
            cents *= 10;
        }
        if units < 0 {
            cents = -cents;
        }

        units
            .checked_mul(1000)
            .and_then(|v| v.checked_add(cents * 10))
            .map(Milliunits)
            .ok_or_else(overflow)
    }
}

impl fmt::Display for Milliunits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let units = abs / 1000;
        let rest = abs % 1000;
        write!(f, "{sign}{units}.{rest:03}")
    }
}

impl Neg for Milliunits {
    type Output = Milliunits;

    fn neg(self) -> Self::Output {
        Milliunits(-self.0)
    }
}
