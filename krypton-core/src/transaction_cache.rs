use anyhow::{anyhow, Result};
use std::collections::{HashSet, VecDeque};

use crate::block::Block;
use crate::policy::TRANSACTION_VALIDITY_WINDOW;
use crate::primitives::Hash;
use crate::transactions::Transaction;

/// Hashes of the transactions mined in the last
/// `TRANSACTION_VALIDITY_WINDOW` blocks. A transaction outside that window
/// cannot be mined again anyway, so older blocks are forgotten.
#[derive(Debug, Clone, Default)]
pub struct TransactionCache {
    transaction_hashes: HashSet<Hash>,
    blocks: VecDeque<(Hash, Vec<Hash>)>,
}

impl TransactionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_transaction(&self, transaction: &Transaction) -> bool {
        self.transaction_hashes.contains(&transaction.hash())
    }

    pub fn push_block(&mut self, block: &Block) {
        self.push_transactions(block.hash(), block.transactions());
    }

    pub fn push_transactions(&mut self, block_hash: Hash, transactions: &[Transaction]) {
        let hashes: Vec<Hash> = transactions.iter().map(|tx| tx.hash()).collect();
        self.transaction_hashes.extend(hashes.iter().copied());
        self.blocks.push_back((block_hash, hashes));

        while self.blocks.len() > TRANSACTION_VALIDITY_WINDOW as usize {
            if let Some((_, evicted)) = self.blocks.pop_front() {
                for hash in evicted {
                    self.transaction_hashes.remove(&hash);
                }
            }
        }
    }

    /// Only the most recent block can be reverted.
    pub fn revert_block(&mut self, block: &Block) -> Result<()> {
        let block_hash = block.hash();
        match self.blocks.back() {
            Some((head, _)) if *head == block_hash => {}
            _ => return Err(anyhow!("Block {} is not the cache head", block_hash)),
        }
        if let Some((_, hashes)) = self.blocks.pop_back() {
            for hash in hashes {
                self.transaction_hashes.remove(&hash);
            }
        }
        Ok(())
    }

    /// Re-adds blocks older than everything cached, oldest first. Used after
    /// a revert to refill the window.
    pub fn prepend_block(&mut self, block: &Block) {
        if self.missing_blocks() == 0 {
            return;
        }
        let hashes: Vec<Hash> = block.transactions().iter().map(|tx| tx.hash()).collect();
        self.transaction_hashes.extend(hashes.iter().copied());
        self.blocks.push_front((block.hash(), hashes));
    }

    pub fn missing_blocks(&self) -> u32 {
        TRANSACTION_VALIDITY_WINDOW.saturating_sub(self.blocks.len() as u32)
    }

    pub fn head(&self) -> Option<&Hash> {
        self.blocks.back().map(|(hash, _)| hash)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::test_utils::{recipient, signed_basic};
    use crate::block::{BlockBody, BlockHeader};
    use crate::primitives::{Address, KeyPair};

    fn block(height: u32, transactions: Vec<Transaction>) -> Block {
        let body = BlockBody::new(Address::NULL, Vec::new(), transactions, Vec::new()).unwrap();
        let header = BlockHeader {
            height,
            body_hash: body.hash(),
            ..BlockHeader::default()
        };
        Block::new(header, body)
    }

    #[test]
    fn test_push_and_revert() {
        let pair = KeyPair::generate();
        let tx = signed_basic(&pair, recipient(), 1, 1);
        let mut cache = TransactionCache::new();
        let first = block(2, vec![tx.clone()]);
        let second = block(3, vec![]);

        cache.push_block(&first);
        cache.push_block(&second);
        assert!(cache.contains_transaction(&tx));
        assert_eq!(cache.head(), Some(&second.hash()));
        assert_eq!(cache.missing_blocks(), TRANSACTION_VALIDITY_WINDOW - 2);

        assert!(cache.revert_block(&first).is_err());
        cache.revert_block(&second).unwrap();
        cache.revert_block(&first).unwrap();
        assert!(!cache.contains_transaction(&tx));
        assert!(cache.is_empty());

        cache.prepend_block(&first);
        assert!(cache.contains_transaction(&tx));
    }

    #[test]
    fn test_window_is_bounded() {
        let pair = KeyPair::generate();
        let tx = signed_basic(&pair, recipient(), 1, 1);
        let mut cache = TransactionCache::new();
        cache.push_transactions(Hash::light(b"old"), &[tx.clone()]);
        for i in 0..TRANSACTION_VALIDITY_WINDOW {
            assert!(cache.contains_transaction(&tx));
            cache.push_transactions(Hash::light(&i.to_be_bytes()), &[]);
        }
        assert!(!cache.contains_transaction(&tx));
        assert_eq!(cache.block_count(), TRANSACTION_VALIDITY_WINDOW as usize);
        assert_eq!(cache.missing_blocks(), 0);
    }
}
