//! Exact token amounts.
//!
//! Amounts are arbitrary-precision signed integers. They travel as decimal
//! strings so JSON consumers never round them through a float.

use num_bigint::BigInt;

use crate::error::DecodeError;

pub type Amount = BigInt;

/// Parse a base-10 amount, allowing a leading sign and surrounding blanks.
pub fn parse_amount(s: &str) -> Result<Amount, DecodeError> {
    let trimmed = s.trim();
    trimmed
        .parse::<BigInt>()
        .map_err(|_| DecodeError::Amount(trimmed.to_string()))
}

/// `#[serde(with = "...")]` adapter storing an [`Amount`] as a decimal string.
pub mod serde_decimal {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::{parse_amount, Amount};

    pub fn serialize<S>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        parse_amount(&encoded).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_values_beyond_u128() {
        let big = "340282366920938463463374607431768211456000";
        let amount = parse_amount(big).unwrap();
        assert_eq!(amount.to_string(), big);
        assert_eq!(parse_amount(" -5 ").unwrap(), BigInt::from(-5));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse_amount("12abc"), Err(DecodeError::Amount(_))));
        assert!(parse_amount("").is_err());
    }
}
