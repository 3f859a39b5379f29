pub mod utils;

use anyhow::{anyhow, Result};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::accounts::PrunedAccount;
use crate::primitives::{Address, Hash, HashAlgorithm};
use crate::serial::{SerialBuffer, SerialDecode, SerialEncode, SerialError};
use crate::transactions::Transaction;
use crate::utils::merkle_root;
use crate::U256;

pub const BLOCK_VERSION: u16 = 1;
pub const MAX_EXTRA_DATA_SIZE: usize = 255;
/// Transactions and pruned accounts are each counted with a u16.
pub const MAX_BODY_ENTRIES: usize = u16::MAX as usize;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u16,
    pub prev_hash: Hash,
    pub interlink_hash: Hash,
    pub body_hash: Hash,
    pub accounts_hash: Hash,
    pub n_bits: u32,
    pub height: u32,
    pub timestamp: u32,
    pub nonce: u32,
}

impl Default for BlockHeader {
    fn default() -> Self {
        BlockHeader {
            version: BLOCK_VERSION,
            prev_hash: Hash::NULL,
            interlink_hash: Hash::NULL,
            body_hash: Hash::NULL,
            accounts_hash: Hash::NULL,
            n_bits: utils::target_to_compact(crate::policy::BLOCK_TARGET_MAX),
            height: 1,
            timestamp: 0,
            nonce: 0,
        }
    }
}

impl BlockHeader {
    pub const SIZE: usize = 2 + 4 * 32 + 4 * 4;

    /// Identity hash (Blake2b of the header).
    pub fn hash(&self) -> Hash {
        Hash::light(&self.to_bytes())
    }

    /// Proof-of-work hash (Argon2d of the header).
    pub fn pow(&self) -> Result<Hash> {
        Hash::hard(&self.to_bytes())
    }

    pub fn target(&self) -> U256 {
        utils::compact_to_target(self.n_bits)
    }

    pub fn difficulty(&self) -> Result<BigDecimal> {
        utils::compact_to_difficulty(self.n_bits)
    }

    pub fn verify_proof_of_work(&self) -> Result<bool> {
        Ok(utils::is_proof_of_work(&self.pow()?, self.target()))
    }

    pub fn is_immediate_successor_of(&self, prev: &BlockHeader) -> bool {
        self.height == prev.height + 1 && self.prev_hash == prev.hash()
    }
}

impl SerialEncode for BlockHeader {
    fn serialize_to(&self, buf: &mut SerialBuffer) {
        buf.write_u16(self.version);
        self.prev_hash.serialize_to(buf);
        self.interlink_hash.serialize_to(buf);
        self.body_hash.serialize_to(buf);
        self.accounts_hash.serialize_to(buf);
        buf.write_u32(self.n_bits);
        buf.write_u32(self.height);
        buf.write_u32(self.timestamp);
        buf.write_u32(self.nonce);
    }

    fn serialized_size(&self) -> usize {
        Self::SIZE
    }
}

impl SerialDecode for BlockHeader {
    fn unserialize(buf: &mut SerialBuffer) -> Result<Self, SerialError> {
        let version = buf.read_u16()?;
        if version != BLOCK_VERSION {
            return Err(SerialError::InvalidValue {
                what: "block version",
                value: u64::from(version),
            });
        }
        Ok(BlockHeader {
            version,
            prev_hash: Hash::unserialize_with(buf, HashAlgorithm::Blake2b)?,
            interlink_hash: Hash::unserialize_with(buf, HashAlgorithm::Blake2b)?,
            body_hash: Hash::unserialize_with(buf, HashAlgorithm::Blake2b)?,
            accounts_hash: Hash::unserialize_with(buf, HashAlgorithm::Blake2b)?,
            n_bits: buf.read_u32()?,
            height: buf.read_u32()?,
            timestamp: buf.read_u32()?,
            nonce: buf.read_u32()?,
        })
    }
}

/// Miner, transactions in block order, and the accounts the block prunes.
#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BlockBody {
    pub miner: Address,
    #[serde_as(as = "Hex")]
    pub extra_data: Vec<u8>,
    pub transactions: Vec<Transaction>,
    pub pruned_accounts: Vec<PrunedAccount>,
}

impl BlockBody {
    pub fn new(
        miner: Address,
        extra_data: Vec<u8>,
        mut transactions: Vec<Transaction>,
        mut pruned_accounts: Vec<PrunedAccount>,
    ) -> Result<Self> {
        if extra_data.len() > MAX_EXTRA_DATA_SIZE {
            return Err(anyhow!(
                "Extra data of {} bytes exceeds {}",
                extra_data.len(),
                MAX_EXTRA_DATA_SIZE
            ));
        }
        check_entry_counts(transactions.len(), pruned_accounts.len())?;
        transactions.sort_by(|a, b| a.compare_block_order(b));
        pruned_accounts.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(BlockBody {
            miner,
            extra_data,
            transactions,
            pruned_accounts,
        })
    }

    pub fn hash(&self) -> Hash {
        let mut leaves = Vec::with_capacity(2 + self.transactions.len() + self.pruned_accounts.len());
        leaves.push(Hash::light(self.miner.as_bytes()));
        leaves.push(Hash::light(&self.extra_data));
        leaves.extend(self.transactions.iter().map(|tx| Hash::light(&tx.to_bytes())));
        leaves.extend(self.pruned_accounts.iter().map(|acc| Hash::light(&acc.to_bytes())));
        merkle_root(&leaves)
    }

    /// Transactions must be unique and in block order, pruned accounts
    /// unique and sorted by address.
    pub fn verify(&self) -> Result<()> {
        check_entry_counts(self.transactions.len(), self.pruned_accounts.len())?;
        for pair in self.transactions.windows(2) {
            if pair[0].compare_block_order(&pair[1]) != std::cmp::Ordering::Less {
                return Err(anyhow!("Block transactions not ordered or duplicated"));
            }
        }
        for pair in self.pruned_accounts.windows(2) {
            if pair[0].address >= pair[1].address {
                return Err(anyhow!("Pruned accounts not ordered or duplicated"));
            }
        }
        for pruned in &self.pruned_accounts {
            if !pruned.account.is_to_be_pruned() {
                return Err(anyhow!(
                    "Account {} listed for pruning is not empty",
                    pruned.address
                ));
            }
        }
        Ok(())
    }
}

fn check_entry_counts(transactions: usize, pruned_accounts: usize) -> Result<()> {
    if transactions > MAX_BODY_ENTRIES || pruned_accounts > MAX_BODY_ENTRIES {
        return Err(anyhow!(
            "Block body with {} transactions and {} pruned accounts exceeds {} entries",
            transactions,
            pruned_accounts,
            MAX_BODY_ENTRIES
        ));
    }
    Ok(())
}

impl SerialEncode for BlockBody {
    fn serialize_to(&self, buf: &mut SerialBuffer) {
        self.miner.serialize_to(buf);
        buf.write_u8(self.extra_data.len() as u8);
        buf.write(&self.extra_data);
        buf.write_u16(self.transactions.len() as u16);
        for tx in &self.transactions {
            tx.serialize_to(buf);
        }
        buf.write_u16(self.pruned_accounts.len() as u16);
        for pruned in &self.pruned_accounts {
            pruned.serialize_to(buf);
        }
    }

    fn serialized_size(&self) -> usize {
        Address::SIZE
            + 1
            + self.extra_data.len()
            + 2
            + self.transactions.iter().map(|tx| tx.serialized_size()).sum::<usize>()
            + 2
            + self
                .pruned_accounts
                .iter()
                .map(|acc| acc.serialized_size())
                .sum::<usize>()
    }
}

impl SerialDecode for BlockBody {
    fn unserialize(buf: &mut SerialBuffer) -> Result<Self, SerialError> {
        let miner = Address::unserialize(buf)?;
        let extra_len = usize::from(buf.read_u8()?);
        let extra_data = buf.read(extra_len)?;
        let tx_count = buf.read_u16()?;
        let transactions = (0..tx_count)
            .map(|_| Transaction::unserialize(buf))
            .collect::<Result<Vec<_>, _>>()?;
        let pruned_count = buf.read_u16()?;
        let pruned_accounts = (0..pruned_count)
            .map(|_| PrunedAccount::unserialize(buf))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BlockBody {
            miner,
            extra_data,
            transactions,
            pruned_accounts,
        })
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub body: BlockBody,
}

impl Block {
    pub fn new(header: BlockHeader, body: BlockBody) -> Self {
        Block { header, body }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.body.transactions
    }

    pub fn miner(&self) -> &Address {
        &self.body.miner
    }

    /// Structural checks that need no chain state.
    pub fn verify(&self) -> Result<()> {
        if self.header.body_hash != self.body.hash() {
            return Err(anyhow!("Body hash mismatch in block {}", self.hash()));
        }
        if !utils::is_valid_compact(self.header.n_bits) {
            return Err(anyhow!("Invalid nBits {:#x}", self.header.n_bits));
        }
        let max_size = crate::policy::block_size(self.header.height);
        if self.serialized_size() > max_size {
            return Err(anyhow!(
                "Block of {} bytes exceeds the {} byte limit",
                self.serialized_size(),
                max_size
            ));
        }
        self.body.verify()
    }
}

impl SerialEncode for Block {
    fn serialize_to(&self, buf: &mut SerialBuffer) {
        self.header.serialize_to(buf);
        self.body.serialize_to(buf);
    }

    fn serialized_size(&self) -> usize {
        self.header.serialized_size() + self.body.serialized_size()
    }
}

impl SerialDecode for Block {
    fn unserialize(buf: &mut SerialBuffer) -> Result<Self, SerialError> {
        let header = BlockHeader::unserialize(buf)?;
        let body = BlockBody::unserialize(buf)?;
        Ok(Block { header, body })
    }
}
