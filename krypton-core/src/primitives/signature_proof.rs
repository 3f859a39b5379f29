use log::warn;

use super::{address::Address, hash::Hash, keys::PublicKey, signature::Signature};
use crate::serial::{SerialBuffer, SerialDecode, SerialEncode, SerialError};
use crate::transactions::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MerklePathNode {
    pub hash: Hash,
    pub left: bool,
}

/// Authentication path from a leaf up to a merkle root. An empty path makes
/// the leaf hash itself the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerklePath {
    nodes: Vec<MerklePathNode>,
}

impl MerklePath {
    pub fn new(nodes: Vec<MerklePathNode>) -> Result<Self, SerialError> {
        if nodes.len() > usize::from(u8::MAX) {
            return Err(SerialError::Malformed(format!(
                "merkle path of {} nodes exceeds 255",
                nodes.len()
            )));
        }
        Ok(MerklePath { nodes })
    }

    pub fn nodes(&self) -> &[MerklePathNode] {
        &self.nodes
    }

    pub fn compute_root(&self, leaf: Hash) -> Hash {
        self.nodes.iter().fold(leaf, |root, node| {
            let mut concat = SerialBuffer::with_capacity(64);
            if node.left {
                node.hash.serialize_to(&mut concat);
            }
            root.serialize_to(&mut concat);
            if !node.left {
                node.hash.serialize_to(&mut concat);
            }
            Hash::light(concat.as_bytes())
        })
    }

    fn left_bits(&self) -> Vec<u8> {
        let mut bits = vec![0u8; self.nodes.len().div_ceil(8)];
        for (i, node) in self.nodes.iter().enumerate() {
            if node.left {
                bits[i / 8] |= 0x80 >> (i % 8);
            }
        }
        bits
    }
}

impl SerialEncode for MerklePath {
    fn serialize_to(&self, buf: &mut SerialBuffer) {
        buf.write_u8(self.nodes.len() as u8);
        buf.write(&self.left_bits());
        for node in &self.nodes {
            node.hash.serialize_to(buf);
        }
    }

    fn serialized_size(&self) -> usize {
        1 + self.nodes.len().div_ceil(8) + self.nodes.len() * 32
    }
}

impl SerialDecode for MerklePath {
    fn unserialize(buf: &mut SerialBuffer) -> Result<Self, SerialError> {
        let count = usize::from(buf.read_u8()?);
        let bits = buf.read(count.div_ceil(8))?;
        let mut nodes = Vec::with_capacity(count);
        for i in 0..count {
            let left = bits[i / 8] & (0x80 >> (i % 8)) != 0;
            let hash = Hash::unserialize(buf)?;
            nodes.push(MerklePathNode { hash, left });
        }
        Ok(MerklePath { nodes })
    }
}

/// A public key, its position in a multisig merkle tree, and a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureProof {
    public_key: PublicKey,
    merkle_path: MerklePath,
    signature: Signature,
}

impl SignatureProof {
    pub fn new(public_key: PublicKey, merkle_path: MerklePath, signature: Signature) -> Self {
        SignatureProof {
            public_key,
            merkle_path,
            signature,
        }
    }

    pub fn single_sig(public_key: PublicKey, signature: Signature) -> Self {
        Self::new(public_key, MerklePath::default(), signature)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn merkle_path(&self) -> &MerklePath {
        &self.merkle_path
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Checks the signature over `data` and, when given, that the proof
    /// authenticates `address`.
    pub fn verify(&self, address: Option<&Address>, data: &[u8]) -> bool {
        if let Some(address) = address {
            if !self.is_signed_by(address) {
                return false;
            }
        }
        self.signature.verify(&self.public_key, data)
    }

    pub fn is_signed_by(&self, address: &Address) -> bool {
        let root = self.merkle_path.compute_root(self.public_key.hash());
        Address::from_hash(&root) == *address
    }

    /// Verifies a transaction whose whole proof field is one signature proof
    /// from its sender.
    pub fn verify_transaction(transaction: &Transaction) -> bool {
        let mut buf = SerialBuffer::from_bytes(transaction.proof());
        let proof = match SignatureProof::unserialize(&mut buf) {
            Ok(proof) => proof,
            Err(e) => {
                warn!("Failed to parse signature proof: {}", e);
                return false;
            }
        };
        if buf.remaining() != 0 {
            warn!("Invalid signature proof: trailing bytes");
            return false;
        }
        if !proof.verify(Some(transaction.sender()), &transaction.serialize_content()) {
            warn!("Invalid signature proof for {}", transaction.sender());
            return false;
        }
        true
    }
}

impl SerialEncode for SignatureProof {
    fn serialize_to(&self, buf: &mut SerialBuffer) {
        self.public_key.serialize_to(buf);
        self.merkle_path.serialize_to(buf);
        self.signature.serialize_to(buf);
    }

    fn serialized_size(&self) -> usize {
        PublicKey::SIZE + self.merkle_path.serialized_size() + Signature::SIZE
    }
}

impl SerialDecode for SignatureProof {
    fn unserialize(buf: &mut SerialBuffer) -> Result<Self, SerialError> {
        let public_key = PublicKey::unserialize(buf)?;
        let merkle_path = MerklePath::unserialize(buf)?;
        let signature = Signature::unserialize(buf)?;
        Ok(SignatureProof {
            public_key,
            merkle_path,
            signature,
        })
    }
}
