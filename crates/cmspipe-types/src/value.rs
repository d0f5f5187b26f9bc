use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Rounding mode applied before a numeric value is rendered for
/// hashing or publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundingMode {
    HalfUp,
    HalfEven,
}

impl RoundingMode {
    #[must_use]
    pub const fn strategy(&self) -> RoundingStrategy {
        match self {
            Self::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            Self::HalfEven => RoundingStrategy::MidpointNearestEven,
        }
    }
}

/// A single typed cell in a frame.
///
/// Columns are homogeneous after casting, but raw parses hold
/// everything as `Str` until the kit casts them against the schema.
/// `Null` renders as the empty string in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Str(String),
    Int(i64),
    Dec(Decimal),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the string form, if this is a string cell.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Round a decimal to `precision` fractional digits and rescale so
    /// the rendered form always carries exactly that many digits.
    #[must_use]
    pub fn round_decimal(d: Decimal, precision: u32, mode: RoundingMode) -> Decimal {
        let mut rounded = d.round_dp_with_strategy(precision, mode.strategy());
        rounded.rescale(precision);
        rounded
    }

    /// Canonical rendering used for row hashing and parquet output.
    ///
    /// Decimals honor the column's declared precision so that
    /// `32.3465` always renders as `"32.3465"` regardless of how the
    /// source file spelled it. Dates render ISO (`YYYY-MM-DD`).
    #[must_use]
    pub fn canonical_render(&self, precision: Option<u32>, mode: RoundingMode) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Dec(d) => match precision {
                Some(p) => Self::round_decimal(*d, p, mode).to_string(),
                None => d.normalize().to_string(),
            },
            Self::Bool(b) => b.to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Null => String::new(),
        }
    }

    /// Total ordering used when finalizing frames. Same-type cells
    /// compare naturally; nulls sort last; mixed types fall back to
    /// the canonical rendering.
    #[must_use]
    pub fn cmp_canonical(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Greater,
            (_, Self::Null) => Ordering::Less,
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Dec(a), Self::Dec(b)) => a.cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            _ => self
                .canonical_render(None, RoundingMode::HalfUp)
                .cmp(&other.canonical_render(None, RoundingMode::HalfUp)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_render(None, RoundingMode::HalfUp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn decimal_renders_with_fixed_precision() {
        let d = Decimal::from_str("32.3465").unwrap();
        let v = Value::Dec(d);
        assert_eq!(
            v.canonical_render(Some(4), RoundingMode::HalfUp),
            "32.3465"
        );
        // Fewer source digits are padded out to the declared precision.
        let short = Value::Dec(Decimal::from_str("20").unwrap());
        assert_eq!(
            short.canonical_render(Some(4), RoundingMode::HalfUp),
            "20.0000"
        );
    }

    #[test]
    fn half_up_rounds_midpoints_away_from_zero() {
        let d = Decimal::from_str("1.005").unwrap();
        assert_eq!(
            Value::Dec(d).canonical_render(Some(2), RoundingMode::HalfUp),
            "1.01"
        );
        let e = Decimal::from_str("1.005").unwrap();
        assert_eq!(
            Value::Dec(e).canonical_render(Some(2), RoundingMode::HalfEven),
            "1.00"
        );
    }

    #[test]
    fn null_renders_empty_and_sorts_last() {
        assert_eq!(Value::Null.canonical_render(None, RoundingMode::HalfUp), "");
        assert_eq!(
            Value::Null.cmp_canonical(&Value::Str("a".into())),
            Ordering::Greater
        );
    }

    #[test]
    fn date_renders_iso() {
        let d = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(
            Value::Date(d).canonical_render(None, RoundingMode::HalfUp),
            "2025-01-01"
        );
    }
}
