use std::fmt;
use std::str::FromStr;

use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DecodeError;

pub const ADDRESS_LEN: usize = 20;

/// Fixed-width account identifier, rendered as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| DecodeError::AddressHex(e.to_string()))?;
        let array: [u8; ADDRESS_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| DecodeError::AddressLength {
                    expected: ADDRESS_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(array))
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_prefix() {
        let text = "0x00112233445566778899aabbccddeeff00112233";
        let addr: Address = text.parse().unwrap();
        assert_eq!(addr.to_string(), text);
        let bare: Address = text[2..].parse().unwrap();
        assert_eq!(addr, bare);
    }

    #[test]
    fn rejects_wrong_length() {
        let err = "0xdeadbeef".parse::<Address>().unwrap_err();
        assert_eq!(
            err,
            DecodeError::AddressLength {
                expected: ADDRESS_LEN,
                actual: 4
            }
        );
        assert!(matches!(
            "0xzz".parse::<Address>(),
            Err(DecodeError::AddressHex(_))
        ));
    }

    #[test]
    fn serializes_as_json_string() {
        let addr = Address::from_bytes([0xab; ADDRESS_LEN]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{addr}\""));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
