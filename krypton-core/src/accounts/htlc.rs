use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use super::{verify_contract_incoming_transaction, AccountError, AccountType};
use crate::primitives::{Address, Hash, HashAlgorithm, SignatureProof};
use crate::serial::{SerialBuffer, SerialDecode, SerialEncode, SerialError};
use crate::transactions::Transaction;
use crate::U256;

/// How an HTLC withdrawal is authorized; the first byte of its proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProofType {
    /// Recipient reveals a hash-chain preimage before the timeout.
    RegularTransfer = 1,
    /// Recipient and sender both sign.
    EarlyResolve = 2,
    /// Sender reclaims after the timeout.
    TimeoutResolve = 3,
}

impl TryFrom<u8> for ProofType {
    type Error = SerialError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ProofType::RegularTransfer),
            2 => Ok(ProofType::EarlyResolve),
            3 => Ok(ProofType::TimeoutResolve),
            other => Err(SerialError::InvalidValue {
                what: "htlc proof type",
                value: u64::from(other),
            }),
        }
    }
}

fn is_lock_algorithm(algorithm: HashAlgorithm) -> bool {
    matches!(algorithm, HashAlgorithm::Blake2b | HashAlgorithm::Sha256)
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashedTimeLockedContract {
    #[serde_as(as = "DisplayFromStr")]
    pub(crate) balance: u128,
    pub(crate) sender: Address,
    pub(crate) recipient: Address,
    pub(crate) hash_algorithm: HashAlgorithm,
    #[serde(with = "hash_root_hex")]
    pub(crate) hash_root: Vec<u8>,
    pub(crate) hash_count: u8,
    pub(crate) timeout: u32,
    #[serde_as(as = "DisplayFromStr")]
    pub(crate) total_amount: u128,
}

mod hash_root_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

struct CreationData {
    sender: Address,
    recipient: Address,
    hash_root: Hash,
    hash_count: u8,
    timeout: u32,
}

impl CreationData {
    fn parse(data: &[u8]) -> Result<Self, AccountError> {
        let mut buf = SerialBuffer::from_bytes(data);
        let sender = Address::unserialize(&mut buf)?;
        let recipient = Address::unserialize(&mut buf)?;
        let algorithm = HashAlgorithm::try_from(buf.read_u8()?)?;
        if !is_lock_algorithm(algorithm) {
            return Err(AccountError::InvalidData(format!(
                "{:?} cannot lock a contract",
                algorithm
            )));
        }
        let hash_root = Hash::unserialize_with(&mut buf, algorithm)?;
        let hash_count = buf.read_u8()?;
        if hash_count == 0 {
            return Err(AccountError::InvalidData("hash count must be positive".to_string()));
        }
        let timeout = buf.read_u32()?;
        if buf.remaining() != 0 {
            return Err(AccountError::InvalidData("trailing htlc data".to_string()));
        }
        Ok(CreationData {
            sender,
            recipient,
            hash_root,
            hash_count,
            timeout,
        })
    }
}

impl HashedTimeLockedContract {
    pub fn new(
        balance: u128,
        sender: Address,
        recipient: Address,
        hash_root: Hash,
        hash_count: u8,
        timeout: u32,
        total_amount: u128,
    ) -> Self {
        HashedTimeLockedContract {
            balance,
            sender,
            recipient,
            hash_algorithm: hash_root.algorithm(),
            hash_root: hash_root.as_bytes().to_vec(),
            hash_count,
            timeout,
            total_amount,
        }
    }

    pub fn create(
        balance: u128,
        _block_height: u32,
        transaction: &Transaction,
    ) -> Result<Self, AccountError> {
        let data = CreationData::parse(transaction.data())?;
        Ok(HashedTimeLockedContract::new(
            balance,
            data.sender,
            data.recipient,
            data.hash_root,
            data.hash_count,
            data.timeout,
            transaction.value(),
        ))
    }

    pub fn sender(&self) -> &Address {
        &self.sender
    }

    pub fn recipient(&self) -> &Address {
        &self.recipient
    }

    pub fn hash_root(&self) -> Result<Hash, SerialError> {
        Hash::new(self.hash_algorithm, &self.hash_root)
    }

    pub fn hash_count(&self) -> u8 {
        self.hash_count
    }

    pub fn timeout(&self) -> u32 {
        self.timeout
    }

    pub fn total_amount(&self) -> u128 {
        self.total_amount
    }

    /// Checks the proof is well formed and its signatures and hash chain are
    /// valid. Who signed is checked when the transaction is applied.
    pub fn verify_outgoing_transaction(transaction: &Transaction) -> bool {
        Self::verify_proof(transaction).unwrap_or(false)
    }

    fn verify_proof(transaction: &Transaction) -> Result<bool, SerialError> {
        let content = transaction.serialize_content();
        let mut buf = SerialBuffer::from_bytes(transaction.proof());
        match ProofType::try_from(buf.read_u8()?)? {
            ProofType::RegularTransfer => {
                let algorithm = HashAlgorithm::try_from(buf.read_u8()?)?;
                let hash_depth = buf.read_u8()?;
                let hash_root = Hash::unserialize_with(&mut buf, algorithm)?;
                let mut pre_image = Hash::unserialize_with(&mut buf, algorithm)?;
                for _ in 0..hash_depth {
                    pre_image = Hash::compute(pre_image.as_bytes(), algorithm)?;
                }
                if hash_root != pre_image {
                    return Ok(false);
                }
                if !SignatureProof::unserialize(&mut buf)?.verify(None, &content) {
                    return Ok(false);
                }
            }
            ProofType::EarlyResolve => {
                for _ in 0..2 {
                    if !SignatureProof::unserialize(&mut buf)?.verify(None, &content) {
                        return Ok(false);
                    }
                }
            }
            ProofType::TimeoutResolve => {
                if !SignatureProof::unserialize(&mut buf)?.verify(None, &content) {
                    return Ok(false);
                }
            }
        }
        Ok(buf.remaining() == 0)
    }

    pub fn verify_incoming_transaction(transaction: &Transaction) -> bool {
        CreationData::parse(transaction.data()).is_ok()
            && verify_contract_incoming_transaction(transaction)
    }

    /// Locked part of the total after revealing `hash_depth` steps of the chain.
    fn min_cap(&self, hash_depth: u8) -> u128 {
        if hash_depth >= self.hash_count {
            return 0;
        }
        let locked = U256::from(self.total_amount) * U256::from(self.hash_count - hash_depth)
            / U256::from(self.hash_count);
        locked.low_u128()
    }

    pub(super) fn check_outgoing_transaction(
        &self,
        transaction: &Transaction,
        block_height: u32,
        revert: bool,
    ) -> Result<(), AccountError> {
        let mut buf = SerialBuffer::from_bytes(transaction.proof());
        let read_signer = |buf: &mut SerialBuffer| {
            SignatureProof::unserialize(buf).map_err(|_| AccountError::Proof)
        };

        let proof_type = buf
            .read_u8()
            .and_then(ProofType::try_from)
            .map_err(|_| AccountError::Proof)?;
        let min_cap = match proof_type {
            ProofType::RegularTransfer => {
                if self.timeout < block_height {
                    return Err(AccountError::Proof);
                }
                let algorithm = buf
                    .read_u8()
                    .and_then(HashAlgorithm::try_from)
                    .map_err(|_| AccountError::Proof)?;
                let hash_depth = buf.read_u8().map_err(|_| AccountError::Proof)?;
                let hash_root = Hash::unserialize_with(&mut buf, algorithm)
                    .map_err(|_| AccountError::Proof)?;
                if hash_root.algorithm() != self.hash_algorithm
                    || hash_root.as_bytes() != self.hash_root.as_slice()
                {
                    return Err(AccountError::Proof);
                }
                // The pre-image was checked in verify.
                Hash::unserialize_with(&mut buf, algorithm).map_err(|_| AccountError::Proof)?;
                if !read_signer(&mut buf)?.is_signed_by(&self.recipient) {
                    return Err(AccountError::Proof);
                }
                self.min_cap(hash_depth)
            }
            ProofType::EarlyResolve => {
                if !read_signer(&mut buf)?.is_signed_by(&self.recipient) {
                    return Err(AccountError::Proof);
                }
                if !read_signer(&mut buf)?.is_signed_by(&self.sender) {
                    return Err(AccountError::Proof);
                }
                0
            }
            ProofType::TimeoutResolve => {
                if self.timeout >= block_height {
                    return Err(AccountError::Proof);
                }
                if !read_signer(&mut buf)?.is_signed_by(&self.sender) {
                    return Err(AccountError::Proof);
                }
                0
            }
        };

        if !revert {
            let new_balance = self
                .balance
                .checked_sub(transaction.value())
                .and_then(|balance| balance.checked_sub(transaction.fee()))
                .ok_or(AccountError::Balance)?;
            if new_balance < min_cap {
                return Err(AccountError::Balance);
            }
        }
        Ok(())
    }

    pub(super) fn unserialize_fields(
        buf: &mut SerialBuffer,
        balance: u128,
    ) -> Result<Self, SerialError> {
        let sender = Address::unserialize(buf)?;
        let recipient = Address::unserialize(buf)?;
        let algorithm = HashAlgorithm::try_from(buf.read_u8()?)?;
        let hash_root = Hash::unserialize_with(buf, algorithm)?;
        let hash_count = buf.read_u8()?;
        let timeout = buf.read_u32()?;
        let total_amount = buf.read_u128()?;
        Ok(HashedTimeLockedContract::new(
            balance,
            sender,
            recipient,
            hash_root,
            hash_count,
            timeout,
            total_amount,
        ))
    }
}

impl SerialEncode for HashedTimeLockedContract {
    fn serialize_to(&self, buf: &mut SerialBuffer) {
        buf.write_u8(AccountType::Htlc as u8);
        buf.write_u128(self.balance);
        self.sender.serialize_to(buf);
        self.recipient.serialize_to(buf);
        buf.write_u8(self.hash_algorithm as u8);
        buf.write(&self.hash_root);
        buf.write_u8(self.hash_count);
        buf.write_u32(self.timeout);
        buf.write_u128(self.total_amount);
    }

    fn serialized_size(&self) -> usize {
        1 + 16 + Address::SIZE * 2 + 1 + self.hash_root.len() + 1 + 4 + 16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::test_utils::*;
    use crate::accounts::Account;
    use crate::primitives::{KeyPair, Signature};
    use crate::transaction_cache::TransactionCache;
    use crate::transactions::TransactionFlags;
    use crate::NETWORK_ID_TEST;

    struct Fixture {
        sender: KeyPair,
        recipient: KeyPair,
        secret: Hash,
        root: Hash,
        contract: Address,
        account: Account,
    }

    /// A contract over 2_000_000 locked with a four step Sha256 chain that
    /// times out at height 100.
    fn fixture() -> Fixture {
        let sender = KeyPair::generate();
        let recipient = KeyPair::generate();
        let secret = Hash::sha256(b"secret");
        let mut root = secret;
        for _ in 0..4 {
            root = Hash::sha256(root.as_bytes());
        }

        let mut data = sender.address().as_bytes().to_vec();
        data.extend_from_slice(recipient.address().as_bytes());
        data.push(HashAlgorithm::Sha256 as u8);
        data.extend_from_slice(root.as_bytes());
        data.push(4);
        data.extend_from_slice(&100u32.to_be_bytes());
        let creation_tx = creation(&sender, AccountType::Htlc, 2_000_000, 1, data);
        assert!(HashedTimeLockedContract::verify_incoming_transaction(&creation_tx));

        let account = Account::INITIAL
            .with_incoming_transaction(&creation_tx, 1, false)
            .and_then(|account| account.with_contract_command(&creation_tx, 1, false))
            .unwrap();
        Fixture {
            sender,
            recipient,
            secret,
            root,
            contract: *creation_tx.recipient(),
            account,
        }
    }

    fn withdrawal(fixture: &Fixture, value: u128, height: u32) -> Transaction {
        Transaction::new_extended(
            fixture.contract,
            AccountType::Htlc,
            recipient(),
            AccountType::Basic,
            value,
            height,
            TransactionFlags::NONE,
            Vec::new(),
            Vec::new(),
            NETWORK_ID_TEST,
        )
        .unwrap()
    }

    fn signature_proof(pair: &KeyPair, tx: &Transaction) -> Vec<u8> {
        let signature =
            Signature::create(&pair.private_key, &pair.public_key, &tx.serialize_content()).unwrap();
        SignatureProof::single_sig(pair.public_key, signature).to_bytes()
    }

    fn regular_proof(fixture: &Fixture, tx: &Transaction, depth: u8, pre_image: Hash) -> Vec<u8> {
        let mut proof = vec![ProofType::RegularTransfer as u8, HashAlgorithm::Sha256 as u8, depth];
        proof.extend_from_slice(fixture.root.as_bytes());
        proof.extend_from_slice(pre_image.as_bytes());
        proof.extend(signature_proof(&fixture.recipient, tx));
        proof
    }

    #[test]
    fn test_create_and_round_trip() {
        let fixture = fixture();
        let Account::Htlc(contract) = &fixture.account else {
            panic!("expected an htlc");
        };
        assert_eq!(contract.hash_count(), 4);
        assert_eq!(contract.timeout(), 100);
        assert_eq!(contract.total_amount(), 2_000_000);
        assert_eq!(contract.hash_root().unwrap(), fixture.root);

        let bytes = fixture.account.to_bytes();
        assert_eq!(bytes.len(), 1 + 16 + 40 + 1 + 32 + 1 + 4 + 16);
        assert_eq!(Account::decode(&bytes).unwrap(), fixture.account);

        let plain = fixture.account.to_plain();
        assert_eq!(Account::from_plain(plain).unwrap(), fixture.account);
    }

    #[test]
    fn test_regular_transfer_with_full_pre_image() {
        let fixture = fixture();
        let cache = TransactionCache::new();
        let mut tx = withdrawal(&fixture, 1_000_000, 50);
        let proof = regular_proof(&fixture, &tx, 4, fixture.secret);
        tx.set_proof(proof).unwrap();

        assert!(HashedTimeLockedContract::verify_outgoing_transaction(&tx));
        let after = fixture
            .account
            .with_outgoing_transaction(&tx, 50, &cache, false)
            .unwrap();
        assert_eq!(after.balance(), 0);
        assert!(after.is_to_be_pruned());
    }

    #[test]
    fn test_partial_pre_image_unlocks_part() {
        let fixture = fixture();
        let cache = TransactionCache::new();
        // One step above the secret unlocks three quarters of the total.
        let pre_image = Hash::sha256(fixture.secret.as_bytes());

        let mut tx = withdrawal(&fixture, 500_000, 50);
        let proof = regular_proof(&fixture, &tx, 3, pre_image);
        tx.set_proof(proof).unwrap();
        assert!(HashedTimeLockedContract::verify_outgoing_transaction(&tx));
        let after = fixture
            .account
            .with_outgoing_transaction(&tx, 50, &cache, false)
            .unwrap();
        assert_eq!(after.balance(), 500_000);

        let mut greedy = withdrawal(&fixture, 500_001, 50);
        let proof = regular_proof(&fixture, &greedy, 3, pre_image);
        greedy.set_proof(proof).unwrap();
        assert_eq!(
            fixture.account.with_outgoing_transaction(&greedy, 50, &cache, false),
            Err(AccountError::Balance)
        );
    }

    #[test]
    fn test_regular_transfer_rejections() {
        let fixture = fixture();
        let cache = TransactionCache::new();

        let mut wrong_pre_image = withdrawal(&fixture, 1, 50);
        let proof = regular_proof(&fixture, &wrong_pre_image, 4, Hash::sha256(b"guess"));
        wrong_pre_image.set_proof(proof).unwrap();
        assert!(!HashedTimeLockedContract::verify_outgoing_transaction(&wrong_pre_image));

        let mut expired = withdrawal(&fixture, 1, 101);
        let proof = regular_proof(&fixture, &expired, 4, fixture.secret);
        expired.set_proof(proof).unwrap();
        assert_eq!(
            fixture.account.with_outgoing_transaction(&expired, 101, &cache, false),
            Err(AccountError::Proof)
        );

        let mut by_sender = withdrawal(&fixture, 1, 50);
        let mut proof = vec![ProofType::RegularTransfer as u8, HashAlgorithm::Sha256 as u8, 4];
        proof.extend_from_slice(fixture.root.as_bytes());
        proof.extend_from_slice(fixture.secret.as_bytes());
        proof.extend(signature_proof(&fixture.sender, &by_sender));
        by_sender.set_proof(proof).unwrap();
        assert!(HashedTimeLockedContract::verify_outgoing_transaction(&by_sender));
        assert_eq!(
            fixture.account.with_outgoing_transaction(&by_sender, 50, &cache, false),
            Err(AccountError::Proof)
        );
    }

    #[test]
    fn test_early_resolve() {
        let fixture = fixture();
        let cache = TransactionCache::new();
        let mut tx = withdrawal(&fixture, 1_000_000, 50);
        let mut proof = vec![ProofType::EarlyResolve as u8];
        proof.extend(signature_proof(&fixture.recipient, &tx));
        proof.extend(signature_proof(&fixture.sender, &tx));
        tx.set_proof(proof).unwrap();
        assert!(HashedTimeLockedContract::verify_outgoing_transaction(&tx));
        assert!(fixture
            .account
            .with_outgoing_transaction(&tx, 50, &cache, false)
            .is_ok());

        let mut swapped = withdrawal(&fixture, 1_000_000, 50);
        let mut proof = vec![ProofType::EarlyResolve as u8];
        proof.extend(signature_proof(&fixture.sender, &swapped));
        proof.extend(signature_proof(&fixture.recipient, &swapped));
        swapped.set_proof(proof).unwrap();
        assert_eq!(
            fixture.account.with_outgoing_transaction(&swapped, 50, &cache, false),
            Err(AccountError::Proof)
        );
    }

    #[test]
    fn test_timeout_resolve() {
        let fixture = fixture();
        let cache = TransactionCache::new();

        let mut early = withdrawal(&fixture, 1_000_000, 100);
        let mut proof = vec![ProofType::TimeoutResolve as u8];
        proof.extend(signature_proof(&fixture.sender, &early));
        early.set_proof(proof).unwrap();
        assert_eq!(
            fixture.account.with_outgoing_transaction(&early, 100, &cache, false),
            Err(AccountError::Proof)
        );

        let mut late = withdrawal(&fixture, 1_000_000, 101);
        let mut proof = vec![ProofType::TimeoutResolve as u8];
        proof.extend(signature_proof(&fixture.sender, &late));
        late.set_proof(proof).unwrap();
        assert!(HashedTimeLockedContract::verify_outgoing_transaction(&late));
        let after = fixture
            .account
            .with_outgoing_transaction(&late, 101, &cache, false)
            .unwrap();
        assert_eq!(after.balance(), 0);
    }

    #[test]
    fn test_rejects_argon2_lock() {
        let sender = KeyPair::generate();
        let mut data = sender.address().as_bytes().to_vec();
        data.extend_from_slice(Address::NULL.as_bytes());
        data.push(HashAlgorithm::Argon2d as u8);
        data.extend_from_slice(&[0; 32]);
        data.push(1);
        data.extend_from_slice(&10u32.to_be_bytes());
        let tx = creation(&sender, AccountType::Htlc, 100, 1, data);
        assert!(!HashedTimeLockedContract::verify_incoming_transaction(&tx));
        assert!(HashedTimeLockedContract::create(100, 1, &tx).is_err());
    }
}
