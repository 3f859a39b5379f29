mod plain;

pub use plain::PlainTransaction;

use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use log::warn;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

use crate::accounts::AccountType;
use crate::policy;
use crate::primitives::{Address, Hash, PublicKey, Signature, SignatureProof};
use crate::serial::{SerialBuffer, SerialDecode, SerialEncode, SerialError};
use crate::U256;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Malformed value")]
    InvalidValue,
    #[error("Malformed data: {0} bytes")]
    DataTooLarge(usize),
    #[error("Malformed proof: {0} bytes")]
    ProofTooLarge(usize),
    #[error("Malformed flags: {0:#04x}")]
    InvalidFlags(u8),
    #[error("Basic transaction: {0}")]
    InvalidBasic(&'static str),
    #[error(transparent)]
    Serial(#[from] SerialError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TransactionFormat {
    Basic = 0,
    Extended = 1,
}

impl TryFrom<u8> for TransactionFormat {
    type Error = SerialError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TransactionFormat::Basic),
            1 => Ok(TransactionFormat::Extended),
            other => Err(SerialError::InvalidValue {
                what: "transaction format",
                value: u64::from(other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct TransactionFlags(u8);

impl TransactionFlags {
    pub const NONE: TransactionFlags = TransactionFlags(0);
    pub const CONTRACT_CREATION: TransactionFlags = TransactionFlags(0b1);
    pub const ALL: TransactionFlags = TransactionFlags(0b1);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, flag: TransactionFlags) -> bool {
        self.0 & flag.0 > 0
    }
}

impl TryFrom<u8> for TransactionFlags {
    type Error = TransactionError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        if bits & !Self::ALL.0 != 0 {
            return Err(TransactionError::InvalidFlags(bits));
        }
        Ok(TransactionFlags(bits))
    }
}

impl From<TransactionFlags> for u8 {
    fn from(flags: TransactionFlags) -> u8 {
        flags.0
    }
}

/// Size of a single-signature proof without merkle nodes.
const BASIC_PROOF_SIZE: usize = PublicKey::SIZE + 1 + Signature::SIZE;

/// A value transfer between two accounts.
///
/// Basic transactions are basic-to-basic transfers identified by the sender's
/// public key and carry exactly one signature. Extended transactions name
/// both accounts and their types and carry arbitrary data and proof blobs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(into = "PlainTransaction", try_from = "PlainTransaction")]
pub struct Transaction {
    format: TransactionFormat,
    sender: Address,
    sender_type: AccountType,
    recipient: Address,
    recipient_type: AccountType,
    value: u128,
    fee: u128,
    validity_start_height: u32,
    network_id: u8,
    flags: TransactionFlags,
    data: Vec<u8>,
    proof: Vec<u8>,
    hash: OnceLock<Hash>,
    valid: OnceLock<bool>,
}

impl Transaction {
    /// Basic transfer. The signature may be attached later with
    /// [`Transaction::set_signature`].
    pub fn new_basic(
        sender_public_key: PublicKey,
        recipient: Address,
        value: u128,
        validity_start_height: u32,
        signature: Option<Signature>,
        network_id: u8,
    ) -> Result<Self, TransactionError> {
        let proof =
            SignatureProof::single_sig(sender_public_key, signature.unwrap_or(Signature::EMPTY));
        let tx = Self::from_parts(
            TransactionFormat::Basic,
            sender_public_key.to_address(),
            AccountType::Basic,
            recipient,
            AccountType::Basic,
            value,
            policy::tx_fee(validity_start_height),
            validity_start_height,
            network_id,
            TransactionFlags::NONE,
            Vec::new(),
            proof.to_bytes(),
        )?;
        Ok(tx.with_contract_address())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_extended(
        sender: Address,
        sender_type: AccountType,
        recipient: Address,
        recipient_type: AccountType,
        value: u128,
        validity_start_height: u32,
        flags: TransactionFlags,
        data: Vec<u8>,
        proof: Vec<u8>,
        network_id: u8,
    ) -> Result<Self, TransactionError> {
        let tx = Self::from_parts(
            TransactionFormat::Extended,
            sender,
            sender_type,
            recipient,
            recipient_type,
            value,
            policy::tx_fee(validity_start_height),
            validity_start_height,
            network_id,
            flags,
            data,
            proof,
        )?;
        Ok(tx.with_contract_address())
    }

    /// Builds a transaction with an explicit fee, as read from the wire.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        format: TransactionFormat,
        sender: Address,
        sender_type: AccountType,
        recipient: Address,
        recipient_type: AccountType,
        value: u128,
        fee: u128,
        validity_start_height: u32,
        network_id: u8,
        flags: TransactionFlags,
        data: Vec<u8>,
        proof: Vec<u8>,
    ) -> Result<Self, TransactionError> {
        if value == 0 {
            return Err(TransactionError::InvalidValue);
        }
        if data.len() > usize::from(u16::MAX) {
            return Err(TransactionError::DataTooLarge(data.len()));
        }
        if proof.len() > usize::from(u16::MAX) {
            return Err(TransactionError::ProofTooLarge(proof.len()));
        }
        let flags = TransactionFlags::try_from(flags.bits())?;

        if format == TransactionFormat::Basic {
            if sender_type != AccountType::Basic || recipient_type != AccountType::Basic {
                return Err(TransactionError::InvalidBasic("account types must be basic"));
            }
            if flags != TransactionFlags::NONE || !data.is_empty() {
                return Err(TransactionError::InvalidBasic("flags and data must be empty"));
            }
            let signature_proof = basic_signature_proof(&proof)?;
            if signature_proof.public_key().to_address() != sender {
                return Err(TransactionError::InvalidBasic("sender does not match public key"));
            }
        }

        Ok(Transaction {
            format,
            sender,
            sender_type,
            recipient,
            recipient_type,
            value,
            fee,
            validity_start_height,
            network_id,
            flags,
            data,
            proof,
            hash: OnceLock::new(),
            valid: OnceLock::new(),
        })
    }

    fn with_contract_address(mut self) -> Self {
        if self.recipient == Address::CONTRACT_CREATION {
            self.recipient = self.contract_creation_address();
        }
        self
    }

    pub fn format(&self) -> TransactionFormat {
        self.format
    }

    pub fn sender(&self) -> &Address {
        &self.sender
    }

    pub fn sender_type(&self) -> AccountType {
        self.sender_type
    }

    pub fn recipient(&self) -> &Address {
        &self.recipient
    }

    pub fn recipient_type(&self) -> AccountType {
        self.recipient_type
    }

    pub fn value(&self) -> u128 {
        self.value
    }

    pub fn fee(&self) -> u128 {
        self.fee
    }

    pub fn validity_start_height(&self) -> u32 {
        self.validity_start_height
    }

    pub fn network_id(&self) -> u8 {
        self.network_id
    }

    pub fn flags(&self) -> TransactionFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: TransactionFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn proof(&self) -> &[u8] {
        &self.proof
    }

    /// The sender's public key, for basic transactions.
    pub fn sender_public_key(&self) -> Option<PublicKey> {
        match self.format {
            TransactionFormat::Basic => basic_signature_proof(&self.proof)
                .ok()
                .map(|proof| *proof.public_key()),
            TransactionFormat::Extended => None,
        }
    }

    /// Replaces the proof. Basic transactions only accept a single-signature
    /// proof from the same public key.
    pub fn set_proof(&mut self, proof: Vec<u8>) -> Result<(), TransactionError> {
        if proof.len() > usize::from(u16::MAX) {
            return Err(TransactionError::ProofTooLarge(proof.len()));
        }
        if self.format == TransactionFormat::Basic {
            let signature_proof = basic_signature_proof(&proof)?;
            if signature_proof.public_key().to_address() != self.sender {
                return Err(TransactionError::InvalidBasic("sender does not match public key"));
            }
        }
        self.proof = proof;
        self.valid = OnceLock::new();
        Ok(())
    }

    /// Sets the signature of a basic transaction.
    pub fn set_signature(&mut self, signature: Signature) -> Result<(), TransactionError> {
        let proof = basic_signature_proof(&self.proof)?;
        let proof = SignatureProof::single_sig(*proof.public_key(), signature);
        self.set_proof(proof.to_bytes())
    }

    /// Everything except the proof; this is what gets signed and hashed.
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut buf = SerialBuffer::with_capacity(self.serialized_content_size());
        buf.write_u16(self.data.len() as u16);
        buf.write(&self.data);
        self.sender.serialize_to(&mut buf);
        buf.write_u8(self.sender_type as u8);
        self.recipient.serialize_to(&mut buf);
        buf.write_u8(self.recipient_type as u8);
        buf.write_u128(self.value);
        buf.write_u128(self.fee);
        buf.write_u32(self.validity_start_height);
        buf.write_u8(self.network_id);
        buf.write_u8(self.flags.bits());
        buf.into_bytes()
    }

    pub fn serialized_content_size(&self) -> usize {
        2 + self.data.len() + Address::SIZE + 1 + Address::SIZE + 1 + 16 + 16 + 4 + 1 + 1
    }

    pub fn hash(&self) -> Hash {
        *self
            .hash
            .get_or_init(|| Hash::light(&self.serialize_content()))
    }

    /// The address a contract created by this transaction lives at: the
    /// content hash with the recipient zeroed.
    pub fn contract_creation_address(&self) -> Address {
        let mut template = self.clone();
        template.recipient = Address::NULL;
        Address::from_hash(&Hash::light(&template.serialize_content()))
    }

    pub fn fee_per_byte(&self) -> BigDecimal {
        BigDecimal::new(BigInt::from(self.fee), 0) / BigDecimal::from(self.serialized_size() as u64)
    }

    /// `fee / size >= min` without rounding.
    pub fn fee_per_byte_at_least(&self, min: u128) -> bool {
        U256::from(self.fee) >= U256::from(min) * U256::from(self.serialized_size())
    }

    /// Checks network, sender/recipient, both account verifiers and the fee.
    /// The result is computed once and cached.
    pub fn verify(&self, network_id: u8) -> bool {
        *self.valid.get_or_init(|| self.verify_uncached(network_id))
    }

    fn verify_uncached(&self, network_id: u8) -> bool {
        if self.network_id != network_id {
            warn!("Transaction {} is not valid in network {}", self, network_id);
            return false;
        }
        if self.recipient == self.sender {
            warn!("Sender and recipient must not match: {}", self);
            return false;
        }
        if !self.sender_type.verify_outgoing_transaction(self) {
            warn!("Invalid for sender: {}", self);
            return false;
        }
        if !self.recipient_type.verify_incoming_transaction(self) {
            warn!("Invalid for recipient: {}", self);
            return false;
        }
        if self.fee != policy::tx_fee(self.validity_start_height) {
            warn!("Invalid for tx fee: {}", self);
            return false;
        }
        true
    }

    /// Mempool priority: higher fee per byte first, then larger, then higher
    /// fee, then higher value, then block order.
    pub fn compare(&self, other: &Transaction) -> Ordering {
        let size = self.serialized_size();
        let other_size = other.serialized_size();
        let density = U256::from(self.fee) * U256::from(other_size);
        let other_density = U256::from(other.fee) * U256::from(size);
        other_density
            .cmp(&density)
            .then_with(|| other_size.cmp(&size))
            .then_with(|| other.fee.cmp(&self.fee))
            .then_with(|| other.value.cmp(&self.value))
            .then_with(|| self.compare_block_order(other))
    }

    /// Canonical order of transactions inside a block. Equal exactly when
    /// the transactions are equal.
    pub fn compare_block_order(&self, other: &Transaction) -> Ordering {
        self.recipient
            .cmp(&other.recipient)
            .then_with(|| self.validity_start_height.cmp(&other.validity_start_height))
            .then_with(|| other.fee.cmp(&self.fee))
            .then_with(|| other.value.cmp(&self.value))
            .then_with(|| self.sender.cmp(&other.sender))
            .then_with(|| self.recipient_type.cmp(&other.recipient_type))
            .then_with(|| self.sender_type.cmp(&other.sender_type))
            .then_with(|| self.flags.cmp(&other.flags))
            .then_with(|| self.data.cmp(&other.data))
            .then_with(|| self.network_id.cmp(&other.network_id))
    }

    pub fn to_plain(&self) -> PlainTransaction {
        PlainTransaction::from(self.clone())
    }

    pub fn from_plain(plain: PlainTransaction) -> Result<Self, TransactionError> {
        Transaction::try_from(plain)
    }

    /// Accepts the hex wire form or a JSON plain object.
    pub fn from_any(s: &str) -> Result<Self, TransactionError> {
        let s = s.trim();
        if s.starts_with('{') {
            let plain: PlainTransaction = serde_json::from_str(s)
                .map_err(|e| SerialError::Malformed(format!("invalid plain transaction: {}", e)))?;
            return Self::from_plain(plain);
        }
        let bytes = hex::decode(s).map_err(|e| SerialError::Malformed(e.to_string()))?;
        Ok(Self::decode(&bytes)?)
    }
}

fn basic_signature_proof(proof: &[u8]) -> Result<SignatureProof, TransactionError> {
    if proof.len() != BASIC_PROOF_SIZE {
        return Err(TransactionError::InvalidBasic("proof must be a single signature"));
    }
    let signature_proof = SignatureProof::decode(proof)?;
    if !signature_proof.merkle_path().nodes().is_empty() {
        return Err(TransactionError::InvalidBasic("proof must be a single signature"));
    }
    Ok(signature_proof)
}

impl SerialEncode for Transaction {
    fn serialize_to(&self, buf: &mut SerialBuffer) {
        buf.write_u8(self.format as u8);
        match self.format {
            TransactionFormat::Basic => {
                // Public key, empty merkle path, signature.
                buf.write(&self.proof[..PublicKey::SIZE]);
                self.recipient.serialize_to(buf);
                buf.write_u128(self.value);
                buf.write_u128(self.fee);
                buf.write_u32(self.validity_start_height);
                buf.write_u8(self.network_id);
                buf.write(&self.proof[PublicKey::SIZE + 1..]);
            }
            TransactionFormat::Extended => {
                buf.write(&self.serialize_content());
                buf.write_u16(self.proof.len() as u16);
                buf.write(&self.proof);
            }
        }
    }

    fn serialized_size(&self) -> usize {
        match self.format {
            TransactionFormat::Basic => {
                1 + PublicKey::SIZE + Address::SIZE + 16 + 16 + 4 + 1 + Signature::SIZE
            }
            TransactionFormat::Extended => 1 + self.serialized_content_size() + 2 + self.proof.len(),
        }
    }
}

impl SerialDecode for Transaction {
    fn unserialize(buf: &mut SerialBuffer) -> Result<Self, SerialError> {
        let format = TransactionFormat::try_from(buf.read_u8()?)?;
        let tx = match format {
            TransactionFormat::Basic => {
                let public_key = PublicKey::unserialize(buf)?;
                let recipient = Address::unserialize(buf)?;
                let value = buf.read_u128()?;
                let fee = buf.read_u128()?;
                let validity_start_height = buf.read_u32()?;
                let network_id = buf.read_u8()?;
                let signature = Signature::unserialize(buf)?;
                Transaction::from_parts(
                    format,
                    public_key.to_address(),
                    AccountType::Basic,
                    recipient,
                    AccountType::Basic,
                    value,
                    fee,
                    validity_start_height,
                    network_id,
                    TransactionFlags::NONE,
                    Vec::new(),
                    SignatureProof::single_sig(public_key, signature).to_bytes(),
                )
            }
            TransactionFormat::Extended => {
                let data_len = usize::from(buf.read_u16()?);
                let data = buf.read(data_len)?;
                let sender = Address::unserialize(buf)?;
                let sender_type = AccountType::try_from(buf.read_u8()?)?;
                let recipient = Address::unserialize(buf)?;
                let recipient_type = AccountType::try_from(buf.read_u8()?)?;
                let value = buf.read_u128()?;
                let fee = buf.read_u128()?;
                let validity_start_height = buf.read_u32()?;
                let network_id = buf.read_u8()?;
                let flags = buf.read_u8()?;
                let proof_len = usize::from(buf.read_u16()?);
                let proof = buf.read(proof_len)?;
                TransactionFlags::try_from(flags).and_then(|flags| {
                    Transaction::from_parts(
                        format,
                        sender,
                        sender_type,
                        recipient,
                        recipient_type,
                        value,
                        fee,
                        validity_start_height,
                        network_id,
                        flags,
                        data,
                        proof,
                    )
                })
            }
        };
        tx.map_err(|e| match e {
            TransactionError::Serial(e) => e,
            other => SerialError::Malformed(other.to_string()),
        })
    }
}

/// Ignores format and proof, so equal transactions have equal hashes.
impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.sender == other.sender
            && self.sender_type == other.sender_type
            && self.recipient == other.recipient
            && self.recipient_type == other.recipient_type
            && self.value == other.value
            && self.fee == other.fee
            && self.validity_start_height == other.validity_start_height
            && self.network_id == other.network_id
            && self.flags == other.flags
            && self.data == other.data
    }
}

impl Eq for Transaction {}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Transaction{{sender={}, recipient={}, value={}, fee={}, validityStartHeight={}, networkId={}}}",
            self.sender.to_hex(),
            self.recipient.to_hex(),
            self.value,
            self.fee,
            self.validity_start_height,
            self.network_id
        )
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("format", &self.format)
            .field("sender", &self.sender)
            .field("sender_type", &self.sender_type)
            .field("recipient", &self.recipient)
            .field("recipient_type", &self.recipient_type)
            .field("value", &self.value)
            .field("fee", &self.fee)
            .field("validity_start_height", &self.validity_start_height)
            .field("network_id", &self.network_id)
            .field("flags", &self.flags)
            .field("data", &hex::encode(&self.data))
            .field("proof", &hex::encode(&self.proof))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::KeyPair;
    use crate::NETWORK_ID_TEST;

    fn signed_basic(pair: &KeyPair, recipient: Address, value: u128, height: u32) -> Transaction {
        let mut tx =
            Transaction::new_basic(pair.public_key, recipient, value, height, None, NETWORK_ID_TEST)
                .unwrap();
        let signature =
            Signature::create(&pair.private_key, &pair.public_key, &tx.serialize_content()).unwrap();
        tx.set_signature(signature).unwrap();
        tx
    }

    fn recipient() -> Address {
        Address::from_hash(&Hash::light(b"recipient"))
    }

    #[test]
    fn test_basic_wire_form() {
        let pair = KeyPair::generate();
        let tx = signed_basic(&pair, recipient(), 1_000, 10);
        let bytes = tx.to_bytes();
        assert_eq!(bytes.len(), 187);
        assert_eq!(tx.serialized_size(), 187);
        assert_eq!(bytes[0], 0);
        assert_eq!(&bytes[1..66], pair.public_key.as_bytes());

        let decoded = Transaction::decode(&bytes).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.proof(), tx.proof());
        assert_eq!(decoded.to_bytes(), bytes);
        assert_eq!(decoded.sender(), &pair.address());
        assert_eq!(decoded.fee(), policy::tx_fee(10));
        assert!(decoded.verify(NETWORK_ID_TEST));
    }

    #[test]
    fn test_extended_wire_form() {
        let pair = KeyPair::generate();
        let tx = Transaction::new_extended(
            pair.address(),
            AccountType::Basic,
            recipient(),
            AccountType::Basic,
            5,
            1,
            TransactionFlags::NONE,
            vec![1, 2, 3],
            vec![9; 10],
            NETWORK_ID_TEST,
        )
        .unwrap();
        let bytes = tx.to_bytes();
        assert_eq!(bytes.len(), 1 + 82 + 3 + 2 + 10);
        assert_eq!(&bytes[1..3], &[0, 3]);
        let decoded = Transaction::decode(&bytes).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.data(), &[1, 2, 3]);
        assert_eq!(decoded.proof(), &[9; 10]);
        assert_eq!(decoded.format(), TransactionFormat::Extended);
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        let pair = KeyPair::generate();
        let mut bytes = signed_basic(&pair, recipient(), 1, 1).to_bytes();
        bytes[0] = 7;
        assert!(Transaction::decode(&bytes).is_err());

        let tx = Transaction::new_extended(
            pair.address(),
            AccountType::Basic,
            recipient(),
            AccountType::Basic,
            5,
            1,
            TransactionFlags::NONE,
            vec![],
            vec![],
            NETWORK_ID_TEST,
        )
        .unwrap();
        let good = tx.to_bytes();
        // Unknown sender type.
        let mut bytes = good.clone();
        bytes[3 + 20] = 9;
        assert!(Transaction::decode(&bytes).is_err());
        // Unknown flag bits.
        let mut bytes = good.clone();
        bytes[82] = 0b10;
        assert!(Transaction::decode(&bytes).is_err());
        // Truncated.
        assert!(Transaction::decode(&good[..good.len() - 1]).is_err());
    }

    #[test]
    fn test_constructor_validation() {
        let pair = KeyPair::generate();
        assert!(matches!(
            Transaction::new_basic(pair.public_key, recipient(), 0, 1, None, NETWORK_ID_TEST),
            Err(TransactionError::InvalidValue)
        ));
        assert!(matches!(
            Transaction::new_extended(
                pair.address(),
                AccountType::Basic,
                recipient(),
                AccountType::Basic,
                1,
                1,
                TransactionFlags::NONE,
                vec![0; 65_536],
                vec![],
                NETWORK_ID_TEST,
            ),
            Err(TransactionError::DataTooLarge(65_536))
        ));
    }

    #[test]
    fn test_fee_follows_validity_start_height() {
        let pair = KeyPair::generate();
        for height in [0, 1, 2, 6_300_001, 40_000_000] {
            let a = signed_basic(&pair, recipient(), 7, height);
            let b = Transaction::new_basic(pair.public_key, recipient(), 99, height, None, 1).unwrap();
            assert_eq!(a.fee(), policy::tx_fee(height));
            assert_eq!(a.fee(), b.fee());
        }
    }

    #[test]
    fn test_verify_rejects_wrong_fee() {
        let pair = KeyPair::generate();
        let tx = signed_basic(&pair, recipient(), 7, 10);
        let mut bytes = tx.to_bytes();
        // Low byte of the fee field.
        bytes[1 + 65 + 20 + 16 + 15] ^= 1;
        let tampered = Transaction::decode(&bytes).unwrap();
        assert_ne!(tampered.fee(), tx.fee());
        assert!(!tampered.verify(NETWORK_ID_TEST));
    }

    #[test]
    fn test_verify_checks() {
        let pair = KeyPair::generate();
        let tx = signed_basic(&pair, recipient(), 7, 10);
        assert!(tx.verify(NETWORK_ID_TEST));
        // Memoized, so ask a fresh copy about another network.
        let copy = Transaction::decode(&tx.to_bytes()).unwrap();
        assert!(!copy.verify(crate::NETWORK_ID_MAIN));

        let unsigned =
            Transaction::new_basic(pair.public_key, recipient(), 7, 10, None, NETWORK_ID_TEST)
                .unwrap();
        assert!(!unsigned.verify(NETWORK_ID_TEST));

        let to_self = signed_basic(&pair, pair.address(), 7, 10);
        assert!(!to_self.verify(NETWORK_ID_TEST));
    }

    #[test]
    fn test_hash_excludes_proof() {
        let pair = KeyPair::generate();
        let signed = signed_basic(&pair, recipient(), 7, 10);
        let unsigned =
            Transaction::new_basic(pair.public_key, recipient(), 7, 10, None, NETWORK_ID_TEST)
                .unwrap();
        assert_eq!(signed.hash(), unsigned.hash());
        assert_eq!(signed, unsigned);
        assert_eq!(signed.hash(), Hash::light(&signed.serialize_content()));
    }

    #[test]
    fn test_contract_creation_address_is_deterministic() {
        let pair = KeyPair::generate();
        let create = |height: u32| {
            Transaction::new_extended(
                pair.address(),
                AccountType::Basic,
                Address::CONTRACT_CREATION,
                AccountType::Vesting,
                100,
                height,
                TransactionFlags::CONTRACT_CREATION,
                vec![0; 24],
                vec![],
                NETWORK_ID_TEST,
            )
            .unwrap()
        };
        let a = create(5);
        let b = create(5);
        let c = create(6);
        assert_ne!(a.recipient(), &Address::CONTRACT_CREATION);
        assert_eq!(a.recipient(), b.recipient());
        assert_ne!(a.recipient(), c.recipient());
        assert_eq!(a.recipient(), &a.contract_creation_address());

        // Decoding keeps the recipient as transmitted.
        let decoded = Transaction::decode(&a.to_bytes()).unwrap();
        assert_eq!(decoded.recipient(), a.recipient());
    }

    #[test]
    fn test_priority_order() {
        let pair = KeyPair::generate();
        // Same fee, the smaller basic transaction has the higher density.
        let basic = signed_basic(&pair, recipient(), 7, 10);
        let extended = Transaction::new_extended(
            pair.address(),
            AccountType::Basic,
            recipient(),
            AccountType::Basic,
            7,
            10,
            TransactionFlags::NONE,
            vec![0; 64],
            vec![0; 200],
            NETWORK_ID_TEST,
        )
        .unwrap();
        assert_eq!(basic.compare(&extended), Ordering::Less);
        assert_eq!(extended.compare(&basic), Ordering::Greater);

        // Free transactions: the larger one first.
        let free_small = signed_basic(&pair, recipient(), 7, 1);
        let free_large = Transaction::new_extended(
            pair.address(),
            AccountType::Basic,
            recipient(),
            AccountType::Basic,
            7,
            1,
            TransactionFlags::NONE,
            vec![],
            vec![0; 300],
            NETWORK_ID_TEST,
        )
        .unwrap();
        assert_eq!(free_large.compare(&free_small), Ordering::Less);

        // Then by value, descending.
        let high = signed_basic(&pair, recipient(), 9, 10);
        assert_eq!(high.compare(&basic), Ordering::Less);
        assert_eq!(basic.compare(&basic.clone()), Ordering::Equal);
    }

    #[test]
    fn test_block_order() {
        let pair = KeyPair::generate();
        let early = signed_basic(&pair, recipient(), 7, 3);
        let late = signed_basic(&pair, recipient(), 7, 4);
        assert_eq!(early.compare_block_order(&late), Ordering::Less);

        let other = signed_basic(&pair, Address::from_hash(&Hash::light(b"zzz")), 7, 3);
        let expected = recipient().cmp(other.recipient());
        assert_eq!(early.compare_block_order(&other), expected);
        assert_eq!(early.compare_block_order(&early.clone()), Ordering::Equal);
    }

    #[test]
    fn test_set_proof_on_basic_requires_single_sig() {
        let pair = KeyPair::generate();
        let mut tx =
            Transaction::new_basic(pair.public_key, recipient(), 7, 10, None, NETWORK_ID_TEST)
                .unwrap();
        assert!(tx.set_proof(vec![1, 2, 3]).is_err());
        let other = KeyPair::generate();
        let foreign = SignatureProof::single_sig(other.public_key, Signature::EMPTY);
        assert!(tx.set_proof(foreign.to_bytes()).is_err());
        assert_eq!(tx.sender_public_key(), Some(pair.public_key));
    }

    #[test]
    fn test_plain_round_trip() {
        let pair = KeyPair::generate();
        let tx = signed_basic(&pair, recipient(), 12_345, 10);
        let json = serde_json::to_string(&tx).unwrap();
        assert!(json.contains("\"value\":\"12345\""));
        let restored: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, tx);
        assert_eq!(restored.to_bytes(), tx.to_bytes());

        let from_hex = Transaction::from_any(&hex::encode(tx.to_bytes())).unwrap();
        assert_eq!(from_hex, tx);
        assert_eq!(Transaction::from_any(&json).unwrap(), tx);
    }
}
