use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use super::hash::Hash;
use crate::serial::{SerialBuffer, SerialDecode, SerialEncode, SerialError};

/// 20-byte account identifier, the trailing bytes of a key or content hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub const SIZE: usize = 20;
    pub const HEX_SIZE: usize = 40;

    pub const NULL: Address = Address([0u8; Self::SIZE]);
    /// Recipient placeholder that transaction constructors replace with the
    /// derived contract address.
    pub const CONTRACT_CREATION: Address = Address([0u8; Self::SIZE]);

    pub fn new(bytes: [u8; Self::SIZE]) -> Self {
        Address(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, SerialError> {
        let array: [u8; Self::SIZE] = bytes.try_into().map_err(|_| {
            SerialError::Malformed(format!(
                "address must be {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            ))
        })?;
        Ok(Address(array))
    }

    pub fn from_hash(hash: &Hash) -> Self {
        let bytes = hash.as_bytes();
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(&bytes[bytes.len() - Self::SIZE..]);
        Address(out)
    }

    pub fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, SerialError> {
        let bytes = hex::decode(s.trim()).map_err(|e| SerialError::Malformed(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn from_base64(s: &str) -> Result<Self, SerialError> {
        let bytes = BASE64
            .decode(s.trim())
            .map_err(|e| SerialError::Malformed(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// The user-friendly form is plain hex, spaces allowed between groups.
    pub fn from_user_friendly_address(s: &str) -> Result<Self, SerialError> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.len() != Self::HEX_SIZE {
            return Err(SerialError::Malformed(format!(
                "user friendly address must have {} hex digits",
                Self::HEX_SIZE
            )));
        }
        Self::from_hex(&compact)
    }

    pub fn to_user_friendly_address(&self) -> String {
        self.to_hex()
    }

    /// Tries the user-friendly form, then hex, then base64.
    pub fn from_any(s: &str) -> Result<Self, SerialError> {
        Self::from_user_friendly_address(s)
            .or_else(|_| Self::from_hex(s))
            .or_else(|_| Self::from_base64(s))
            .map_err(|_| SerialError::Malformed(format!("invalid address format '{}'", s)))
    }
}

impl SerialEncode for Address {
    fn serialize_to(&self, buf: &mut SerialBuffer) {
        buf.write(&self.0);
    }

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }
}

impl SerialDecode for Address {
    fn unserialize(buf: &mut SerialBuffer) -> Result<Self, SerialError> {
        Ok(Address(buf.read_array()?))
    }
}

impl FromStr for Address {
    type Err = SerialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_any(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_user_friendly_address())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl serde::Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_user_friendly_address())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::from_any(&s).map_err(serde::de::Error::custom)
    }
}
