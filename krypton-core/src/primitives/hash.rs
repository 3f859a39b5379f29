use anyhow::{anyhow, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use blake2::{digest::consts::U32, Blake2b};
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use sha3::Keccak256;
use std::fmt;

use crate::serial::{SerialBuffer, SerialDecode, SerialEncode, SerialError};

type Blake2b256 = Blake2b<U32>;

/// Argon2d is run with a fixed 11-byte salt.
const ARGON2D_SALT: &[u8] = b"kryptonrock";
const ARGON2D_ITERATIONS: u32 = 1;
const ARGON2D_MEMORY_KIB: u32 = 512;
const ARGON2D_LANES: u32 = 1;

const MAX_HASH_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum HashAlgorithm {
    Blake2b = 1,
    Argon2d = 2,
    Sha256 = 3,
    Sha512 = 4,
    Ripemd160 = 5,
    Keccak256 = 6,
}

impl HashAlgorithm {
    pub fn size(self) -> usize {
        match self {
            HashAlgorithm::Blake2b
            | HashAlgorithm::Argon2d
            | HashAlgorithm::Sha256
            | HashAlgorithm::Keccak256 => 32,
            HashAlgorithm::Sha512 => 64,
            HashAlgorithm::Ripemd160 => 20,
        }
    }
}

impl TryFrom<u8> for HashAlgorithm {
    type Error = SerialError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(HashAlgorithm::Blake2b),
            2 => Ok(HashAlgorithm::Argon2d),
            3 => Ok(HashAlgorithm::Sha256),
            4 => Ok(HashAlgorithm::Sha512),
            5 => Ok(HashAlgorithm::Ripemd160),
            6 => Ok(HashAlgorithm::Keccak256),
            other => Err(SerialError::InvalidValue {
                what: "hash algorithm",
                value: u64::from(other),
            }),
        }
    }
}

/// A digest tagged with the algorithm that produced it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash {
    algorithm: HashAlgorithm,
    bytes: [u8; MAX_HASH_SIZE],
}

impl Hash {
    pub const NULL: Hash = Hash {
        algorithm: HashAlgorithm::Blake2b,
        bytes: [0u8; MAX_HASH_SIZE],
    };

    pub fn new(algorithm: HashAlgorithm, digest: &[u8]) -> Result<Self, SerialError> {
        if digest.len() != algorithm.size() {
            return Err(SerialError::Malformed(format!(
                "{:?} digest must be {} bytes, got {}",
                algorithm,
                algorithm.size(),
                digest.len()
            )));
        }
        let mut bytes = [0u8; MAX_HASH_SIZE];
        bytes[..digest.len()].copy_from_slice(digest);
        Ok(Hash { algorithm, bytes })
    }

    fn from_digest(algorithm: HashAlgorithm, digest: &[u8]) -> Self {
        let mut bytes = [0u8; MAX_HASH_SIZE];
        bytes[..digest.len()].copy_from_slice(digest);
        Hash { algorithm, bytes }
    }

    /// The cheap hash used for identities and signatures.
    pub fn light(data: &[u8]) -> Self {
        Self::blake2b(data)
    }

    /// The memory-hard hash used for proof of work.
    pub fn hard(data: &[u8]) -> Result<Self> {
        Self::argon2d(data)
    }

    pub fn blake2b(data: &[u8]) -> Self {
        Self::from_digest(HashAlgorithm::Blake2b, &Blake2b256::digest(data))
    }

    pub fn argon2d(data: &[u8]) -> Result<Self> {
        let params = Params::new(
            ARGON2D_MEMORY_KIB,
            ARGON2D_ITERATIONS,
            ARGON2D_LANES,
            Some(HashAlgorithm::Argon2d.size()),
        )
        .map_err(|e| anyhow!("Failed to build Argon2d parameters: {}", e))?;
        let argon2 = Argon2::new(Algorithm::Argon2d, Version::V0x13, params);

        let mut out = [0u8; 32];
        argon2
            .hash_password_into(data, ARGON2D_SALT, &mut out)
            .map_err(|e| anyhow!("Argon2d hashing failed: {}", e))?;
        Ok(Self::from_digest(HashAlgorithm::Argon2d, &out))
    }

    pub fn sha256(data: &[u8]) -> Self {
        Self::from_digest(HashAlgorithm::Sha256, &Sha256::digest(data))
    }

    pub fn sha512(data: &[u8]) -> Self {
        Self::from_digest(HashAlgorithm::Sha512, &Sha512::digest(data))
    }

    pub fn ripemd160(data: &[u8]) -> Self {
        Self::from_digest(HashAlgorithm::Ripemd160, &Ripemd160::digest(data))
    }

    pub fn keccak256(data: &[u8]) -> Self {
        Self::from_digest(HashAlgorithm::Keccak256, &Keccak256::digest(data))
    }

    /// RIPEMD-160 over SHA-256.
    pub fn double_hash(data: &[u8]) -> Self {
        Self::ripemd160(&Sha256::digest(data))
    }

    /// Hashes with one of the algorithms allowed in hash-locked contracts.
    pub fn compute(data: &[u8], algorithm: HashAlgorithm) -> Result<Self, SerialError> {
        match algorithm {
            HashAlgorithm::Blake2b => Ok(Self::blake2b(data)),
            HashAlgorithm::Sha256 => Ok(Self::sha256(data)),
            other => Err(SerialError::InvalidValue {
                what: "hash lock algorithm",
                value: other as u64,
            }),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.algorithm.size()]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self, SerialError> {
        let bytes = hex::decode(s).map_err(|e| SerialError::Malformed(e.to_string()))?;
        Self::new(HashAlgorithm::Blake2b, &bytes)
    }

    pub fn from_base64(s: &str) -> Result<Self, SerialError> {
        let bytes = BASE64
            .decode(s)
            .map_err(|e| SerialError::Malformed(e.to_string()))?;
        Self::new(HashAlgorithm::Blake2b, &bytes)
    }

    /// Accepts hex or base64.
    pub fn from_string(s: &str) -> Result<Self, SerialError> {
        Self::from_hex(s)
            .or_else(|_| Self::from_base64(s))
            .map_err(|_| SerialError::Malformed(format!("invalid hash format '{}'", s)))
    }

    pub fn unserialize_with(
        buf: &mut SerialBuffer,
        algorithm: HashAlgorithm,
    ) -> Result<Self, SerialError> {
        let digest = buf.read(algorithm.size())?;
        Ok(Self::from_digest(algorithm, &digest))
    }
}

impl Default for Hash {
    fn default() -> Self {
        Hash::NULL
    }
}

impl SerialEncode for Hash {
    fn serialize_to(&self, buf: &mut SerialBuffer) {
        buf.write(self.as_bytes());
    }

    fn serialized_size(&self) -> usize {
        self.algorithm.size()
    }
}

impl SerialDecode for Hash {
    fn unserialize(buf: &mut SerialBuffer) -> Result<Self, SerialError> {
        Self::unserialize_with(buf, HashAlgorithm::Blake2b)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Hash({:?}:{})", self.algorithm, self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(|e| {
            serde::de::Error::custom(format!("Failed to deserialize Hash from hex string: {}", e))
        })?;
        // Plain form carries no tag; the length picks the algorithm.
        let algorithm = match bytes.len() {
            20 => HashAlgorithm::Ripemd160,
            64 => HashAlgorithm::Sha512,
            _ => HashAlgorithm::Blake2b,
        };
        Hash::new(algorithm, &bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            Hash::sha256(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            Hash::keccak256(b"").to_hex(),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
        assert_eq!(
            Hash::ripemd160(b"").to_hex(),
            "9c1185a5c5e9fc54612808977ee8f548b2258d31"
        );
        assert_eq!(Hash::sha512(b"abc").as_bytes().len(), 64);
        assert_eq!(Hash::blake2b(b"abc").as_bytes().len(), 32);
    }

    #[test]
    fn test_equality_includes_algorithm() {
        let digest = Hash::sha256(b"krypton");
        let retagged = Hash::new(HashAlgorithm::Blake2b, digest.as_bytes()).unwrap();
        assert_eq!(digest.as_bytes(), retagged.as_bytes());
        assert_ne!(digest, retagged);
    }

    #[test]
    fn test_double_hash_is_ripemd_of_sha() {
        let expected = Hash::ripemd160(Hash::sha256(b"data").as_bytes());
        assert_eq!(Hash::double_hash(b"data"), expected);
    }

    #[test]
    fn test_compute_only_allows_hash_lock_algorithms() {
        assert!(Hash::compute(b"x", HashAlgorithm::Blake2b).is_ok());
        assert!(Hash::compute(b"x", HashAlgorithm::Sha256).is_ok());
        assert!(Hash::compute(b"x", HashAlgorithm::Sha512).is_err());
        assert!(Hash::compute(b"x", HashAlgorithm::Argon2d).is_err());
    }

    #[test]
    fn test_argon2d_is_deterministic() {
        let a = Hash::argon2d(b"header").unwrap();
        let b = Hash::argon2d(b"header").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.algorithm(), HashAlgorithm::Argon2d);
        assert_ne!(a.as_bytes(), Hash::argon2d(b"other").unwrap().as_bytes());
    }

    #[test]
    fn test_string_forms() {
        let hash = Hash::light(b"krypton");
        assert_eq!(Hash::from_hex(&hash.to_hex()).unwrap(), hash);
        assert_eq!(Hash::from_string(&BASE64.encode(hash.as_bytes())).unwrap(), hash);
        assert!(Hash::from_string("nope").is_err());

        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(serde_json::from_str::<Hash>(&json).unwrap(), hash);
    }

    #[test]
    fn test_serialized_size_follows_algorithm() {
        let mut buf = SerialBuffer::new();
        Hash::ripemd160(b"a").serialize_to(&mut buf);
        assert_eq!(buf.len(), 20);
        let decoded = Hash::unserialize_with(&mut buf, HashAlgorithm::Ripemd160).unwrap();
        assert_eq!(decoded, Hash::ripemd160(b"a"));
    }
}
