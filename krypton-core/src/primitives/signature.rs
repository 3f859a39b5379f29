use anyhow::{anyhow, Result};
use ecdsa::signature::{Signer, Verifier};
use k256::schnorr;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::keys::{PrivateKey, PublicKey};
use crate::serial::{SerialBuffer, SerialDecode, SerialEncode, SerialError};

/// 64-byte Schnorr signature over secp256k1.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; 64]);

impl Signature {
    pub const SIZE: usize = 64;

    /// Placeholder carried by transactions that have not been signed yet.
    pub const EMPTY: Signature = Signature([0u8; 64]);

    pub fn create(private_key: &PrivateKey, public_key: &PublicKey, data: &[u8]) -> Result<Self> {
        if private_key.public_key() != *public_key {
            return Err(anyhow!("Public key does not belong to the signing key"));
        }
        let signing_key = schnorr::SigningKey::from_bytes(&private_key.to_bytes()[..])
            .map_err(|e| anyhow!("Invalid Schnorr signing key: {}", e))?;
        let signature: schnorr::Signature = signing_key
            .try_sign(data)
            .map_err(|e| anyhow!("Schnorr signing failed: {}", e))?;
        Ok(Signature(signature.to_bytes()))
    }

    pub fn verify(&self, public_key: &PublicKey, data: &[u8]) -> bool {
        let Ok(verifying_key) = schnorr::VerifyingKey::from_bytes(public_key.x_only()) else {
            return false;
        };
        let Ok(signature) = schnorr::Signature::try_from(&self.0[..]) else {
            return false;
        };
        verifying_key.verify(data, &signature).is_ok()
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, SerialError> {
        let array: [u8; Self::SIZE] = bytes.try_into().map_err(|_| {
            SerialError::Malformed(format!(
                "signature must be {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            ))
        })?;
        Ok(Signature(array))
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl SerialEncode for Signature {
    fn serialize_to(&self, buf: &mut SerialBuffer) {
        buf.write(&self.0);
    }

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }
}

impl SerialDecode for Signature {
    fn unserialize(buf: &mut SerialBuffer) -> Result<Self, SerialError> {
        Ok(Signature(buf.read_array()?))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Signature::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}
