use anyhow::{anyhow, Context};
use ecdsa::{SigningKey, VerifyingKey};
use k256::Secp256k1;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

use super::{address::Address, hash::Hash};
use crate::serial::{SerialBuffer, SerialDecode, SerialEncode, SerialError};

#[derive(Clone, Serialize, Deserialize)]
pub struct PrivateKey(#[serde(with = "signkey_serde")] SigningKey<Secp256k1>);

impl PrivateKey {
    pub const SIZE: usize = 32;

    pub fn generate() -> Self {
        PrivateKey(SigningKey::random(&mut OsRng))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, SerialError> {
        SigningKey::from_slice(bytes)
            .map(PrivateKey)
            .map_err(|e| SerialError::Malformed(format!("invalid private key: {}", e)))
    }

    pub fn to_bytes(&self) -> Zeroizing<[u8; 32]> {
        let mut out = Zeroizing::new([0u8; 32]);
        out.copy_from_slice(&self.0.to_bytes());
        out
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(*self.to_bytes()))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::derive(self)
    }
}

impl FromStr for PrivateKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = Zeroizing::new(
            hex::decode(s.trim()).context("Failed to hex-decode private key string")?,
        );
        PrivateKey::from_slice(&bytes).map_err(|e| anyhow!("{}", e))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PrivateKey(..)")
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        *self.to_bytes() == *other.to_bytes()
    }
}

impl Eq for PrivateKey {}

/// Uncompressed SEC1 secp256k1 point: `0x04 || x || y`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; 65]);

impl PublicKey {
    pub const SIZE: usize = 65;
    pub const COMPRESSED_SIZE: usize = 33;

    pub fn derive(private_key: &PrivateKey) -> Self {
        let point = private_key.0.verifying_key().to_encoded_point(false);
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(point.as_bytes());
        PublicKey(out)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, SerialError> {
        let array: [u8; Self::SIZE] = bytes.try_into().map_err(|_| {
            SerialError::Malformed(format!(
                "public key must be {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            ))
        })?;
        Ok(PublicKey(array))
    }

    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    pub fn compress(&self) -> Result<[u8; 33], SerialError> {
        let key = VerifyingKey::<Secp256k1>::from_sec1_bytes(&self.0)
            .map_err(|e| SerialError::Malformed(format!("invalid public key: {}", e)))?;
        let point = key.to_encoded_point(true);
        let mut out = [0u8; Self::COMPRESSED_SIZE];
        out.copy_from_slice(point.as_bytes());
        Ok(out)
    }

    /// The x coordinate, which is all a Schnorr verifier needs.
    pub(crate) fn x_only(&self) -> &[u8] {
        &self.0[1..33]
    }

    /// Keccak-256 over the key without its type byte.
    pub fn hash(&self) -> Hash {
        Hash::keccak256(&self.0[1..])
    }

    pub fn to_address(&self) -> Address {
        Address::from_hash(&self.hash())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl SerialEncode for PublicKey {
    fn serialize_to(&self, buf: &mut SerialBuffer) {
        buf.write(&self.0);
    }

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }
}

impl SerialDecode for PublicKey {
    fn unserialize(buf: &mut SerialBuffer) -> Result<Self, SerialError> {
        Ok(PublicKey(buf.read_array()?))
    }
}

impl FromStr for PublicKey {
    type Err = SerialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| SerialError::Malformed(e.to_string()))?;
        PublicKey::from_slice(&bytes)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self::from_private_key(PrivateKey::generate())
    }

    pub fn from_private_key(private_key: PrivateKey) -> Self {
        let public_key = private_key.public_key();
        KeyPair {
            private_key,
            public_key,
        }
    }

    pub fn address(&self) -> Address {
        self.public_key.to_address()
    }
}

mod signkey_serde {
    use serde::Deserialize;
    use zeroize::Zeroizing;

    pub fn serialize<S>(
        key: &super::SigningKey<super::Secp256k1>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let encoded = Zeroizing::new(hex::encode(key.to_bytes()));
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<super::SigningKey<super::Secp256k1>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let encoded = Zeroizing::new(String::deserialize(deserializer)?);
        let bytes = Zeroizing::new(hex::decode(encoded.as_str()).map_err(serde::de::Error::custom)?);
        super::SigningKey::from_slice(&bytes).map_err(|e| {
            serde::de::Error::custom(format!("Failed to create SigningKey from bytes: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_derivation() {
        let private_key = PrivateKey::generate();
        let public_key = private_key.public_key();
        assert_eq!(public_key.as_bytes()[0], 0x04);
        assert_eq!(public_key, PublicKey::derive(&private_key));

        let compressed = public_key.compress().unwrap();
        assert!(compressed[0] == 0x02 || compressed[0] == 0x03);
        assert_eq!(&compressed[1..], &public_key.as_bytes()[1..33]);
    }

    #[test]
    fn test_address_is_keccak_of_key_body() {
        let public_key = KeyPair::generate().public_key;
        let expected = Hash::keccak256(&public_key.as_bytes()[1..]);
        assert_eq!(public_key.to_address(), Address::from_hash(&expected));
    }

    #[test]
    fn test_private_key_hex_roundtrip() {
        let private_key = PrivateKey::generate();
        let parsed: PrivateKey = private_key.to_hex().parse().unwrap();
        assert_eq!(parsed, private_key);
        assert!("zz".parse::<PrivateKey>().is_err());
        assert_eq!(format!("{:?}", private_key), "PrivateKey(..)");
    }

    #[test]
    fn test_keypair_json() {
        let pair = KeyPair::generate();
        let json = serde_json::to_string(&pair).unwrap();
        let restored: KeyPair = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, pair);
    }
}
