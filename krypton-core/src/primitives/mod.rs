pub mod address;
pub mod hash;
pub mod keys;
pub mod signature;
pub mod signature_proof;

pub use address::Address;
pub use hash::{Hash, HashAlgorithm};
pub use keys::{KeyPair, PrivateKey, PublicKey};
pub use signature::Signature;
pub use signature_proof::{MerklePath, MerklePathNode, SignatureProof};
