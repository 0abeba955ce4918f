//! Decimal resource quantities
//!
//! Quantities follow the Kubernetes quantity grammar on the wire (`500m`,
//! `2`, `1.5Gi`, `10G`, ...) and are normalized to milli-units in an `i64`
//! internally so that addition, subtraction, and comparison are exact. A
//! quantity of exactly zero is the identity for addition. Negative values
//! are representable because propagation delta math needs them; they are
//! never valid inside a `hard` map.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Error;

/// Milli-units per whole unit.
const MILLI: i128 = 1000;

/// A decimal resource quantity normalized to milli-units.
///
/// `Quantity` parses the common Kubernetes suffixes: the milli suffix `m`,
/// decimal suffixes `k`/`K`, `M`, `G`, `T`, `P`, and binary suffixes `Ki`,
/// `Mi`, `Gi`, `Ti`, `Pi`. Values finer than one milli-unit are rejected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(i64);

impl Quantity {
    /// The zero quantity - identity for addition.
    pub const ZERO: Quantity = Quantity(0);

    /// Create the zero quantity.
    pub fn zero() -> Self {
        Self::ZERO
    }

    /// Create a quantity from raw milli-units.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Create a quantity from a whole number of units.
    pub fn from_units(units: i64) -> Self {
        Self(units.saturating_mul(1000))
    }

    /// Raw milli-unit value.
    pub fn millis(&self) -> i64 {
        self.0
    }

    /// True if this quantity is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// True if this quantity is strictly negative.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        *self = *self + rhs;
    }
}

impl Sub for Quantity {
    type Output = Quantity;

    fn sub(self, rhs: Quantity) -> Quantity {
        Quantity(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Quantity {
    fn sub_assign(&mut self, rhs: Quantity) {
        *self = *self - rhs;
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 1000 == 0 {
            write!(f, "{}", self.0 / 1000)
        } else {
            write!(f, "{}m", self.0)
        }
    }
}

/// Milli-units contributed by one whole unit of the given suffix.
fn suffix_multiplier(suffix: &str) -> Option<i128> {
    let m = match suffix {
        "" => MILLI,
        "m" => 1,
        "k" | "K" => 1_000 * MILLI,
        "M" => 1_000_000 * MILLI,
        "G" => 1_000_000_000 * MILLI,
        "T" => 1_000_000_000_000 * MILLI,
        "P" => 1_000_000_000_000_000 * MILLI,
        "Ki" => 1024 * MILLI,
        "Mi" => 1024 * 1024 * MILLI,
        "Gi" => 1024 * 1024 * 1024 * MILLI,
        "Ti" => 1024i128.pow(4) * MILLI,
        "Pi" => 1024i128.pow(5) * MILLI,
        _ => return None,
    };
    Some(m)
}

impl FromStr for Quantity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::decode("empty quantity"));
        }

        let (sign, rest) = match s.strip_prefix('-') {
            Some(rest) => (-1i128, rest),
            None => (1i128, s),
        };

        let split = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(split);
        if number.is_empty() {
            return Err(Error::decode(format!("quantity {s:?} has no digits")));
        }

        let multiplier = suffix_multiplier(suffix)
            .ok_or_else(|| Error::decode(format!("unknown quantity suffix {suffix:?}")))?;

        let (int_part, frac_part) = match number.split_once('.') {
            Some((i, f)) => (i, f),
            None => (number, ""),
        };
        if frac_part.contains('.') {
            return Err(Error::decode(format!("malformed quantity {s:?}")));
        }

        let mut mantissa: i128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| Error::decode(format!("malformed quantity {s:?}")))?
        };
        let mut denom: i128 = 1;
        for c in frac_part.chars() {
            let digit = c.to_digit(10).ok_or_else(|| {
                Error::decode(format!("malformed quantity {s:?}"))
            })? as i128;
            mantissa = mantissa * 10 + digit;
            denom *= 10;
        }

        let scaled = mantissa * multiplier;
        if scaled % denom != 0 {
            return Err(Error::decode(format!(
                "quantity {s:?} is finer than milli precision"
            )));
        }
        let millis = sign * (scaled / denom);
        i64::try_from(millis)
            .map(Quantity)
            .map_err(|_| Error::decode(format!("quantity {s:?} out of range")))
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

struct QuantityVisitor;

impl Visitor<'_> for QuantityVisitor {
    type Value = Quantity;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a quantity string like \"500m\" or \"2Gi\", or a number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Quantity, E> {
        v.parse().map_err(de::Error::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Quantity, E> {
        Ok(Quantity::from_units(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Quantity, E> {
        i64::try_from(v)
            .map(Quantity::from_units)
            .map_err(|_| de::Error::custom("quantity out of range"))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Quantity, E> {
        let millis = v * 1000.0;
        if !millis.is_finite() || millis.fract() != 0.0 {
            return Err(de::Error::custom(
                "quantity is finer than milli precision",
            ));
        }
        Ok(Quantity::from_millis(millis as i64))
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(QuantityVisitor)
    }
}

impl JsonSchema for Quantity {
    fn schema_name() -> String {
        "Quantity".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        // Serialized as a Kubernetes quantity string.
        String::json_schema(gen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_integers_as_whole_units() {
        assert_eq!("2".parse::<Quantity>().unwrap(), Quantity::from_units(2));
        assert_eq!("0".parse::<Quantity>().unwrap(), Quantity::ZERO);
        assert_eq!("10".parse::<Quantity>().unwrap().millis(), 10_000);
    }

    #[test]
    fn parses_milli_suffix() {
        assert_eq!("500m".parse::<Quantity>().unwrap().millis(), 500);
        assert_eq!("1500m".parse::<Quantity>().unwrap().millis(), 1500);
    }

    #[test]
    fn parses_decimal_fractions() {
        assert_eq!("1.5".parse::<Quantity>().unwrap().millis(), 1500);
        assert_eq!("0.25".parse::<Quantity>().unwrap().millis(), 250);
    }

    #[test]
    fn parses_decimal_and_binary_suffixes() {
        assert_eq!(
            "1Ki".parse::<Quantity>().unwrap().millis(),
            1024 * 1000
        );
        assert_eq!(
            "2Gi".parse::<Quantity>().unwrap().millis(),
            2 * 1024i64.pow(3) * 1000
        );
        assert_eq!(
            "1.5Gi".parse::<Quantity>().unwrap().millis(),
            3 * 1024i64.pow(3) * 500
        );
        assert_eq!(
            "10G".parse::<Quantity>().unwrap().millis(),
            10_000_000_000 * 1000
        );
        assert_eq!("1k".parse::<Quantity>().unwrap().millis(), 1_000_000);
    }

    #[test]
    fn parses_negative_quantities() {
        assert_eq!("-2".parse::<Quantity>().unwrap().millis(), -2000);
        assert!("-2".parse::<Quantity>().unwrap().is_negative());
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<Quantity>().is_err());
        assert!("abc".parse::<Quantity>().is_err());
        assert!("1Q".parse::<Quantity>().is_err());
        assert!("1.2.3".parse::<Quantity>().is_err());
        // 0.5m is below milli resolution
        assert!("0.5m".parse::<Quantity>().is_err());
    }

    #[test]
    fn zero_is_additive_identity() {
        let q = "750m".parse::<Quantity>().unwrap();
        assert_eq!(q + Quantity::zero(), q);
        assert_eq!(Quantity::zero() + q, q);
    }

    #[test]
    fn add_subtract_compare() {
        let four = Quantity::from_units(4);
        let two = Quantity::from_units(2);
        assert_eq!(four + two, Quantity::from_units(6));
        assert_eq!(four - two, two);
        assert_eq!(two - four, Quantity::from_units(-2));
        assert!(two < four);
        assert!(four > two);
        assert_eq!(four.cmp(&four), std::cmp::Ordering::Equal);
    }

    #[test]
    fn display_round_trips_whole_and_milli_values() {
        for raw in ["2", "500m", "1500m", "0", "-3"] {
            let q: Quantity = raw.parse().unwrap();
            assert_eq!(q.to_string(), raw);
            let back: Quantity = q.to_string().parse().unwrap();
            assert_eq!(back, q);
        }
    }

    #[test]
    fn serde_accepts_strings_and_numbers() {
        let q: Quantity = serde_json::from_str("\"250m\"").unwrap();
        assert_eq!(q.millis(), 250);
        let q: Quantity = serde_json::from_str("3").unwrap();
        assert_eq!(q, Quantity::from_units(3));
        let q: Quantity = serde_json::from_str("1.5").unwrap();
        assert_eq!(q.millis(), 1500);

        let json = serde_json::to_string(&Quantity::from_millis(1500)).unwrap();
        assert_eq!(json, "\"1500m\"");
    }
}
