use anyhow::{anyhow, Context, Result};
use bigdecimal::BigDecimal;
use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;

use crate::accounts::{AccountStore, Accounts};
use crate::block::{utils, Block, BlockBody, BlockHeader};
use crate::genesis::GenesisConfig;
use crate::primitives::{Address, Hash};
use crate::transaction_cache::TransactionCache;
use crate::transactions::Transaction;
use crate::U256;

/// Notifications about the main chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    /// `rebranching` is set for heads adopted while switching to a fork; a
    /// `Rebranched` event follows once the switch is complete.
    HeadChanged { head: Block, rebranching: bool },
    /// Blocks taken off the main chain, newest first.
    Rebranched { reverted_blocks: Vec<Block> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockId {
    Hash(Hash),
    Height(u32),
}

impl From<Hash> for BlockId {
    fn from(hash: Hash) -> Self {
        BlockId::Hash(hash)
    }
}

impl From<u32> for BlockId {
    fn from(height: u32) -> Self {
        BlockId::Height(height)
    }
}

/// What the mempool needs to know about the chain.
pub trait Blockchain: Send + Sync {
    fn network_id(&self) -> u8;

    fn height(&self) -> impl Future<Output = u32> + Send;

    fn head(&self) -> impl Future<Output = Block> + Send;

    fn transaction_cache(&self) -> impl Future<Output = Arc<TransactionCache>> + Send;

    /// Main chain lookup by height, any known block by hash.
    fn get_block(&self, id: BlockId) -> impl Future<Output = Option<Block>> + Send;

    fn subscribe(&self) -> flume::Receiver<ChainEvent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    Known,
    Extended,
    Rebranched,
    Forked,
    Orphan,
}

#[derive(Debug)]
struct ChainState {
    head: Block,
    /// Main chain hashes; index `h - 1` holds the block at height `h`.
    main_chain: Vec<Hash>,
    blocks: HashMap<Hash, Block>,
    total_difficulty: HashMap<Hash, BigDecimal>,
    transaction_cache: Arc<TransactionCache>,
}

impl ChainState {
    fn is_on_main_chain(&self, block: &Block) -> bool {
        block
            .height()
            .checked_sub(1)
            .and_then(|index| self.main_chain.get(index as usize))
            == Some(&block.hash())
    }

    fn main_chain_block(&self, height: u32) -> Option<&Block> {
        let index = height.checked_sub(1)? as usize;
        self.main_chain
            .get(index)
            .and_then(|hash| self.blocks.get(hash))
    }

    fn total_difficulty_of(&self, hash: &Hash) -> Result<BigDecimal> {
        self.total_difficulty
            .get(hash)
            .cloned()
            .ok_or_else(|| anyhow!("Missing total difficulty for {}", hash))
    }

    /// Target for the successor of `parent`, walking back along the
    /// parent's own branch.
    fn next_target(&self, parent: &Block) -> Result<U256> {
        let window = crate::policy::difficulty_block_window(parent.height());
        let tail_height = parent.height().saturating_sub(window).max(1);
        let mut tail = parent;
        while tail.height() > tail_height {
            tail = self
                .blocks
                .get(&tail.header.prev_hash)
                .ok_or_else(|| anyhow!("Missing predecessor of {}", tail.hash()))?;
        }
        let delta = self.total_difficulty_of(&parent.hash())?
            - self.total_difficulty_of(&tail.hash())?;
        utils::get_next_target(&parent.header, &tail.header, &delta)
    }
}

/// An in-memory chain: blocks by hash, the main chain by height, and the
/// account state at the head.
pub struct Chain {
    network_id: u8,
    verify_pow: bool,
    accounts: Arc<AccountStore>,
    state: RwLock<ChainState>,
    subscribers: Mutex<Vec<flume::Sender<ChainEvent>>>,
}

impl Chain {
    pub async fn from_genesis(config: &GenesisConfig) -> Result<Self> {
        let accounts = Arc::new(config.account_store());
        let genesis = config.genesis_block(accounts.hash().await)?;
        Self::new(config.network_id, genesis, accounts)
    }

    /// `accounts` must hold the state the genesis block commits to.
    pub fn new(network_id: u8, genesis: Block, accounts: Arc<AccountStore>) -> Result<Self> {
        genesis.verify().context("Invalid genesis block")?;
        let hash = genesis.hash();
        let mut transaction_cache = TransactionCache::new();
        transaction_cache.push_block(&genesis);
        info!("Chain initialised at genesis {}", hash);

        let state = ChainState {
            main_chain: vec![hash],
            total_difficulty: HashMap::from([(hash, genesis.header.difficulty()?)]),
            blocks: HashMap::from([(hash, genesis.clone())]),
            head: genesis,
            transaction_cache: Arc::new(transaction_cache),
        };
        Ok(Chain {
            network_id,
            verify_pow: true,
            accounts,
            state: RwLock::new(state),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Proof-of-work checks use Argon2d and are far too slow for tests.
    pub fn with_pow_verification(mut self, verify_pow: bool) -> Self {
        self.verify_pow = verify_pow;
        self
    }

    pub fn accounts(&self) -> &Arc<AccountStore> {
        &self.accounts
    }

    pub async fn head_hash(&self) -> Hash {
        self.state.read().await.head.hash()
    }

    pub async fn total_difficulty(&self) -> Result<BigDecimal> {
        let state = self.state.read().await;
        state.total_difficulty_of(&state.head.hash())
    }

    pub async fn next_target(&self) -> Result<U256> {
        let state = self.state.read().await;
        state.next_target(&state.head)
    }

    /// A block template on top of the current head. Pruned accounts and the
    /// accounts hash are filled in; the nonce is left at zero.
    pub async fn create_block(
        &self,
        miner: Address,
        extra_data: Vec<u8>,
        transactions: Vec<Transaction>,
        timestamp: u32,
    ) -> Result<Block> {
        let state = self.state.read().await;
        let height = state.head.height() + 1;
        let pruned_accounts = self
            .accounts
            .gather_to_be_pruned_accounts(&transactions, height, &state.transaction_cache)
            .await?;
        let body = BlockBody::new(miner, extra_data, transactions, pruned_accounts)?;
        let accounts_hash = self
            .accounts
            .hash_with_body(&body, height, &state.transaction_cache)
            .await?;
        let header = BlockHeader {
            prev_hash: state.head.hash(),
            body_hash: body.hash(),
            accounts_hash,
            n_bits: utils::target_to_compact(state.next_target(&state.head)?),
            height,
            timestamp,
            nonce: 0,
            ..BlockHeader::default()
        };
        Ok(Block::new(header, body))
    }

    pub async fn push_block(&self, block: Block) -> Result<PushResult> {
        let hash = block.hash();
        let mut events = Vec::new();
        let result = {
            let mut state = self.state.write().await;
            if state.blocks.contains_key(&hash) {
                return Ok(PushResult::Known);
            }

            self.verify_block(&block)?;

            let Some(prev) = state.blocks.get(&block.header.prev_hash).cloned() else {
                warn!("Orphan block {} at height {}", hash, block.height());
                return Ok(PushResult::Orphan);
            };
            if !block.header.is_immediate_successor_of(&prev.header) {
                return Err(anyhow!("Block {} does not succeed {}", hash, prev.hash()));
            }
            let expected_n_bits = utils::target_to_compact(state.next_target(&prev)?);
            if block.header.n_bits != expected_n_bits {
                return Err(anyhow!(
                    "Block {} has nBits {:#x}, expected {:#x}",
                    hash,
                    block.header.n_bits,
                    expected_n_bits
                ));
            }

            let total_difficulty =
                state.total_difficulty_of(&prev.hash())? + block.header.difficulty()?;

            if prev.hash() == state.head.hash() {
                self.extend(&mut state, &block).await?;
                state.total_difficulty.insert(hash, total_difficulty);
                state.blocks.insert(hash, block.clone());
                events.push(ChainEvent::HeadChanged {
                    head: block,
                    rebranching: false,
                });
                PushResult::Extended
            } else {
                let head_difficulty = state.total_difficulty_of(&state.head.hash())?;
                state.total_difficulty.insert(hash, total_difficulty.clone());
                state.blocks.insert(hash, block.clone());
                if total_difficulty > head_difficulty {
                    match self.rebranch(&mut state, &block).await {
                        Ok(mut rebranch_events) => {
                            events.append(&mut rebranch_events);
                            PushResult::Rebranched
                        }
                        Err(e) => {
                            state.blocks.remove(&hash);
                            state.total_difficulty.remove(&hash);
                            return Err(e);
                        }
                    }
                } else {
                    debug!("Stored fork block {} at height {}", hash, block.height());
                    PushResult::Forked
                }
            }
        };

        for event in events {
            self.notify(event);
        }
        Ok(result)
    }

    fn verify_block(&self, block: &Block) -> Result<()> {
        block.verify()?;
        if let Some(tx) = block
            .transactions()
            .par_iter()
            .find_any(|tx| !tx.verify(self.network_id))
        {
            return Err(anyhow!(
                "Block {} contains invalid transaction {}",
                block.hash(),
                tx.hash()
            ));
        }
        if self.verify_pow && !block.header.verify_proof_of_work()? {
            return Err(anyhow!("Block {} fails its proof of work", block.hash()));
        }
        Ok(())
    }

    /// Applies `block` on top of the current head.
    async fn extend(&self, state: &mut ChainState, block: &Block) -> Result<()> {
        let accounts_hash = self
            .accounts
            .hash_with_body(&block.body, block.height(), &state.transaction_cache)
            .await
            .with_context(|| format!("Block {} cannot be applied", block.hash()))?;
        if accounts_hash != block.header.accounts_hash {
            return Err(anyhow!(
                "Accounts hash mismatch in block {}: expected {}, got {}",
                block.hash(),
                accounts_hash,
                block.header.accounts_hash
            ));
        }
        self.accounts
            .commit_block(block, &state.transaction_cache)
            .await?;
        Arc::make_mut(&mut state.transaction_cache).push_block(block);
        state.main_chain.push(block.hash());
        state.head = block.clone();
        info!("Head is now #{} {}", block.height(), block.hash());
        Ok(())
    }

    async fn revert_head(&self, state: &mut ChainState) -> Result<Block> {
        let head = state.head.clone();
        let prev = state
            .blocks
            .get(&head.header.prev_hash)
            .cloned()
            .ok_or_else(|| anyhow!("Cannot revert genesis block {}", head.hash()))?;
        self.accounts
            .revert_block(&head, &state.transaction_cache)
            .await?;

        let cache = Arc::make_mut(&mut state.transaction_cache);
        cache.revert_block(&head)?;
        state.main_chain.pop();
        let oldest_cached = prev.height() + 1 - cache.block_count() as u32;
        if let Some(older) = oldest_cached
            .checked_sub(1)
            .and_then(|height| state.main_chain_block(height))
        {
            let older = older.clone();
            Arc::make_mut(&mut state.transaction_cache).prepend_block(&older);
        }

        state.head = prev;
        Ok(head)
    }

    /// Switches the main chain to the branch ending in `block`. On failure
    /// the previous main chain is restored.
    async fn rebranch(&self, state: &mut ChainState, block: &Block) -> Result<Vec<ChainEvent>> {
        let mut fork_chain = vec![block.clone()];
        let mut ancestor = state
            .blocks
            .get(&block.header.prev_hash)
            .cloned()
            .ok_or_else(|| anyhow!("Missing predecessor of {}", block.hash()))?;
        while !state.is_on_main_chain(&ancestor) {
            let prev = state
                .blocks
                .get(&ancestor.header.prev_hash)
                .cloned()
                .ok_or_else(|| anyhow!("Missing predecessor of {}", ancestor.hash()))?;
            fork_chain.push(std::mem::replace(&mut ancestor, prev));
        }
        info!(
            "Rebranching to {} from common ancestor #{} {}",
            block.hash(),
            ancestor.height(),
            ancestor.hash()
        );

        let mut reverted_blocks = Vec::new();
        while state.head.hash() != ancestor.hash() {
            reverted_blocks.push(self.revert_head(state).await?);
        }

        let mut events = Vec::new();
        for (applied, fork_block) in fork_chain.iter().rev().enumerate() {
            if let Err(e) = self.extend(state, fork_block).await {
                error!("Failed to apply fork block {}: {:#}", fork_block.hash(), e);
                for _ in 0..applied {
                    self.revert_head(state).await?;
                }
                for old in reverted_blocks.iter().rev() {
                    self.extend(state, old).await?;
                }
                return Err(e);
            }
            events.push(ChainEvent::HeadChanged {
                head: fork_block.clone(),
                rebranching: true,
            });
        }

        events.push(ChainEvent::Rebranched { reverted_blocks });
        Ok(events)
    }

    fn notify(&self, event: ChainEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

impl Blockchain for Chain {
    fn network_id(&self) -> u8 {
        self.network_id
    }

    async fn height(&self) -> u32 {
        self.state.read().await.head.height()
    }

    async fn head(&self) -> Block {
        self.state.read().await.head.clone()
    }

    async fn transaction_cache(&self) -> Arc<TransactionCache> {
        self.state.read().await.transaction_cache.clone()
    }

    async fn get_block(&self, id: BlockId) -> Option<Block> {
        let state = self.state.read().await;
        match id {
            BlockId::Hash(hash) => state.blocks.get(&hash).cloned(),
            BlockId::Height(height) => state.main_chain_block(height).cloned(),
        }
    }

    fn subscribe(&self) -> flume::Receiver<ChainEvent> {
        let (sender, receiver) = flume::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use crate::accounts::test_utils::{recipient, signed_basic};
    use crate::primitives::KeyPair;

    #[tokio::test]
    async fn test_extend_and_lookup() {
        let pair = KeyPair::generate();
        let chain = chain_with(&[&pair], 10_000_000).await;
        let events = chain.subscribe();
        assert_eq!(chain.height().await, 1);

        let tx = signed_basic(&pair, recipient(), 1_000, 1);
        let block = mine(&chain, vec![tx.clone()], b"").await;
        assert_eq!(chain.push_block(block.clone()).await.unwrap(), PushResult::Extended);
        assert_eq!(chain.push_block(block.clone()).await.unwrap(), PushResult::Known);

        assert_eq!(chain.height().await, 2);
        assert_eq!(chain.get_block(BlockId::Height(2)).await, Some(block.clone()));
        assert_eq!(chain.get_block(block.hash().into()).await, Some(block.clone()));
        assert!(chain.transaction_cache().await.contains_transaction(&tx));
        assert_eq!(
            chain.accounts().get(&recipient(), None).await.unwrap().balance(),
            1_000
        );
        assert_eq!(
            events.try_recv().unwrap(),
            ChainEvent::HeadChanged {
                head: block,
                rebranching: false
            }
        );
    }

    #[tokio::test]
    async fn test_rejects_bad_blocks() {
        let pair = KeyPair::generate();
        let chain = chain_with(&[&pair], 10_000_000).await;

        let mut wrong_accounts = mine(&chain, vec![], b"").await;
        wrong_accounts.header.accounts_hash = Hash::light(b"nope");
        assert!(chain.push_block(wrong_accounts).await.is_err());

        let mut wrong_bits = mine(&chain, vec![], b"").await;
        wrong_bits.header.n_bits = 0x1f00_8000;
        assert!(chain.push_block(wrong_bits).await.is_err());

        let mut orphan = mine(&chain, vec![], b"").await;
        orphan.header.prev_hash = Hash::light(b"unknown");
        assert_eq!(chain.push_block(orphan).await.unwrap(), PushResult::Orphan);
        assert_eq!(chain.height().await, 1);
    }

    #[tokio::test]
    async fn test_rebranch_reverts_and_applies() {
        let pair = KeyPair::generate();
        let chain = chain_with(&[&pair], 10_000_000).await;
        let genesis = chain.head().await;
        let tx = signed_basic(&pair, recipient(), 1_000, 1);

        let a1 = mine(&chain, vec![tx.clone()], b"a").await;
        chain.push_block(a1.clone()).await.unwrap();

        // A competing branch from genesis, built on a second chain instance
        // that shares the genesis state.
        let fork = chain_with(&[&pair], 10_000_000).await;
        assert_eq!(fork.head().await, genesis);
        let b1 = mine(&fork, vec![], b"b").await;
        fork.push_block(b1.clone()).await.unwrap();
        let b2 = mine(&fork, vec![], b"b").await;

        let events = chain.subscribe();
        assert_eq!(chain.push_block(b1.clone()).await.unwrap(), PushResult::Forked);
        assert_eq!(chain.push_block(b2.clone()).await.unwrap(), PushResult::Rebranched);

        assert_eq!(chain.head().await, b2);
        assert!(!chain.transaction_cache().await.contains_transaction(&tx));
        assert_eq!(
            chain.accounts().get(&recipient(), None).await.unwrap().balance(),
            0
        );
        let received: Vec<ChainEvent> = events.drain().collect();
        assert_eq!(
            received.last(),
            Some(&ChainEvent::Rebranched {
                reverted_blocks: vec![a1]
            })
        );
        assert_eq!(received.len(), 3);
    }
}
