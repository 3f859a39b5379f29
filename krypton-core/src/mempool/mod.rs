//! Pending transactions valid against the current chain head.
//!
//! All mutation happens on one worker task: submissions are queued on a
//! command channel and chain events on a second one, and the worker handles
//! them one at a time. The indices are shared behind a read-write lock so
//! queries never wait on the queue, and each admission or eviction commits
//! under a single write lock.

mod config;
mod filter;
mod pool;
mod transaction_set;

pub use config::{
    FilterRules, MempoolConfig, BLACKLIST_SIZE, FREE_TRANSACTIONS_PER_SENDER_MAX, SIZE_MAX,
    TRANSACTIONS_PER_SENDER_MAX, TRANSACTION_RELAY_FEE_MIN,
};
pub use filter::MempoolFilter;
pub use transaction_set::TransactionSet;

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, RwLock};
use tokio::task::JoinHandle;

use crate::accounts::{Account, AccountError, Accounts};
use crate::block::Block;
use crate::blockchain::{Blockchain, ChainEvent};
use crate::primitives::{Address, Hash};
use crate::serial::SerialEncode;
use crate::transaction_cache::TransactionCache;
use crate::transactions::Transaction;
use pool::Pool;

const EVENT_CAPACITY: usize = 1024;

/// Outcome of submitting a transaction.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i8)]
pub enum ReturnCode {
    Expired = -5,
    Mined = -4,
    Filtered = -3,
    FeeTooLow = -2,
    Invalid = -1,
    Accepted = 1,
    Known = 2,
}

impl ReturnCode {
    pub fn code(self) -> i8 {
        self as i8
    }

    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            -5 => Some(ReturnCode::Expired),
            -4 => Some(ReturnCode::Mined),
            -3 => Some(ReturnCode::Filtered),
            -2 => Some(ReturnCode::FeeTooLow),
            -1 => Some(ReturnCode::Invalid),
            1 => Some(ReturnCode::Accepted),
            2 => Some(ReturnCode::Known),
            _ => None,
        }
    }

    pub fn is_accepted(self) -> bool {
        self == ReturnCode::Accepted
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ReturnCode::Expired => "EXPIRED",
            ReturnCode::Mined => "MINED",
            ReturnCode::Filtered => "FILTERED",
            ReturnCode::FeeTooLow => "FEE_TOO_LOW",
            ReturnCode::Invalid => "INVALID",
            ReturnCode::Accepted => "ACCEPTED",
            ReturnCode::Known => "KNOWN",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MempoolEvent {
    TransactionAdded(Transaction),
    TransactionRemoved(Transaction),
    /// The pool has been re-checked after a head change.
    TransactionsReady,
}

enum Command {
    Push {
        transaction: Transaction,
        reply: oneshot::Sender<ReturnCode>,
    },
}

/// Handle to a running mempool. Cloning is cheap; the worker stops once the
/// last handle is dropped.
pub struct Mempool<B, A> {
    blockchain: Arc<B>,
    accounts: Arc<A>,
    pool: Arc<RwLock<Pool>>,
    commands: flume::Sender<Command>,
    events: broadcast::Sender<MempoolEvent>,
}

impl<B, A> Clone for Mempool<B, A> {
    fn clone(&self) -> Self {
        Mempool {
            blockchain: self.blockchain.clone(),
            accounts: self.accounts.clone(),
            pool: self.pool.clone(),
            commands: self.commands.clone(),
            events: self.events.clone(),
        }
    }
}

impl<B, A> Mempool<B, A>
where
    B: Blockchain + 'static,
    A: Accounts + 'static,
{
    pub fn spawn(blockchain: Arc<B>, accounts: Arc<A>, config: MempoolConfig) -> (Self, JoinHandle<()>) {
        let pool = Arc::new(RwLock::new(Pool::new(MempoolFilter::new(config.filter.clone()))));
        let (commands, command_receiver) = flume::unbounded();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let chain_events = blockchain.subscribe();

        let worker = Worker {
            blockchain: blockchain.clone(),
            accounts: accounts.clone(),
            pool: pool.clone(),
            config,
            events: events.clone(),
        };
        let handle = tokio::spawn(worker.run(command_receiver, chain_events));

        let mempool = Mempool {
            blockchain,
            accounts,
            pool,
            commands,
            events,
        };
        (mempool, handle)
    }

    /// Queues `transaction` for admission and waits for the verdict.
    pub async fn push_transaction(&self, transaction: Transaction) -> Result<ReturnCode> {
        let (reply, verdict) = oneshot::channel();
        self.commands
            .send_async(Command::Push { transaction, reply })
            .await
            .map_err(|_| anyhow!("Mempool worker has stopped"))?;
        verdict.await.context("Mempool worker dropped the request")
    }

    pub async fn get_transaction(&self, hash: &Hash) -> Option<Transaction> {
        self.pool.read().await.get(hash).cloned()
    }

    /// A fee-ordered walk over a snapshot of the pool.
    pub async fn transaction_generator(&self, max_size: usize) -> TransactionGenerator {
        let snapshot = self.pool.read().await.iter_by_fee().cloned().collect();
        TransactionGenerator::new(snapshot, max_size)
    }

    pub async fn get_transactions(&self, max_size: usize) -> Vec<Transaction> {
        self.pool.read().await.transactions(max_size)
    }

    /// Highest priority transactions that fit into `max_size` bytes together
    /// with the accounts they would prune, in block order.
    pub async fn get_transactions_for_block(&self, max_size: usize) -> Result<Vec<Transaction>> {
        let mut transactions = self.get_transactions(max_size).await;
        let height = self.blockchain.height().await + 1;
        let cache = self.blockchain.transaction_cache().await;
        let pruned_accounts = self
            .accounts
            .gather_to_be_pruned_accounts(&transactions, height, &cache)
            .await?;

        let mut size = pruned_accounts
            .iter()
            .map(|pruned| pruned.serialized_size())
            .sum::<usize>()
            + transactions
                .iter()
                .map(|tx| tx.serialized_size())
                .sum::<usize>();
        while size > max_size {
            match transactions.pop() {
                Some(tx) => size -= tx.serialized_size(),
                None => break,
            }
        }

        transactions.sort_by(|a, b| a.compare_block_order(b));
        Ok(transactions)
    }

    pub async fn get_pending_transactions(&self, address: &Address) -> Vec<Transaction> {
        self.get_transactions_by_sender(address).await
    }

    pub async fn get_transactions_by_sender(&self, address: &Address) -> Vec<Transaction> {
        self.pool.read().await.by_sender(address)
    }

    pub async fn get_transactions_by_recipient(&self, address: &Address) -> Vec<Transaction> {
        self.pool.read().await.by_recipient(address)
    }

    pub async fn get_transactions_by_addresses(
        &self,
        addresses: &[Address],
        max_transactions: usize,
    ) -> Vec<Transaction> {
        self.pool
            .read()
            .await
            .by_addresses(addresses, max_transactions)
    }

    pub async fn is_filtered(&self, hash: &Hash) -> bool {
        self.pool.read().await.filter.is_blacklisted(hash)
    }

    pub async fn len(&self) -> usize {
        self.pool.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MempoolEvent> {
        self.events.subscribe()
    }
}

/// Yields snapshot transactions in fee order while their sizes add up to
/// less than `max_size`, skipping any that would not fit.
#[derive(Debug, Clone)]
pub struct TransactionGenerator {
    transactions: Vec<Transaction>,
    max_size: usize,
    position: usize,
    size: usize,
}

impl TransactionGenerator {
    fn new(transactions: Vec<Transaction>, max_size: usize) -> Self {
        TransactionGenerator {
            transactions,
            max_size,
            position: 0,
            size: 0,
        }
    }

    /// Starts over from the highest priority transaction.
    pub fn restart(&mut self) {
        self.position = 0;
        self.size = 0;
    }
}

impl Iterator for TransactionGenerator {
    type Item = Transaction;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(tx) = self.transactions.get(self.position) {
            self.position += 1;
            let tx_size = tx.serialized_size();
            if self.size + tx_size >= self.max_size {
                continue;
            }
            self.size += tx_size;
            return Some(tx.clone());
        }
        None
    }
}

struct Worker<B, A> {
    blockchain: Arc<B>,
    accounts: Arc<A>,
    pool: Arc<RwLock<Pool>>,
    config: MempoolConfig,
    events: broadcast::Sender<MempoolEvent>,
}

impl<B, A> Worker<B, A>
where
    B: Blockchain + 'static,
    A: Accounts + 'static,
{
    async fn run(
        self,
        commands: flume::Receiver<Command>,
        chain_events: flume::Receiver<ChainEvent>,
    ) {
        let mut chain_open = true;
        loop {
            tokio::select! {
                command = commands.recv_async() => match command {
                    Ok(Command::Push { transaction, reply }) => {
                        let code = self.push_transaction(transaction).await;
                        // The caller may have given up waiting.
                        let _ = reply.send(code);
                    }
                    Err(_) => break,
                },
                event = chain_events.recv_async(), if chain_open => match event {
                    Ok(event) => self.on_chain_event(event).await,
                    Err(_) => {
                        warn!("Chain event stream closed");
                        chain_open = false;
                    }
                },
            }
        }
        info!("Mempool worker stopped");
    }

    async fn on_chain_event(&self, event: ChainEvent) {
        match event {
            ChainEvent::HeadChanged { rebranching: true, .. } => {}
            ChainEvent::HeadChanged { head, .. } => {
                debug!("Head changed to #{}, re-checking pool", head.height());
                self.evict_transactions().await;
            }
            ChainEvent::Rebranched { reverted_blocks } => {
                self.evict_transactions().await;
                self.restore_transactions(&reverted_blocks).await;
            }
        }
    }

    fn notify(&self, event: MempoolEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn blacklist(&self, hash: Hash) {
        self.pool.write().await.filter.blacklist(hash);
    }

    async fn push_transaction(&self, transaction: Transaction) -> ReturnCode {
        let hash = transaction.hash();
        let set = {
            let pool = self.pool.read().await;
            if pool.contains(&hash) {
                return ReturnCode::Known;
            }
            if pool.filter.is_blacklisted(&hash) {
                return ReturnCode::Filtered;
            }
            if !pool.filter.accepts_transaction(&transaction) {
                drop(pool);
                self.blacklist(hash).await;
                return ReturnCode::Filtered;
            }
            pool.sender_set(transaction.sender())
                .cloned()
                .unwrap_or_default()
        };

        if let Some(free_max) = self.config.free_transactions_per_sender_max {
            let relay_fee_min = self.config.transaction_relay_fee_min;
            if !transaction.fee_per_byte_at_least(relay_fee_min)
                && set.num_below_fee_per_byte(relay_fee_min) >= free_max
            {
                return ReturnCode::FeeTooLow;
            }
        }

        if !transaction.verify(self.blockchain.network_id()) {
            return ReturnCode::Invalid;
        }

        let height = self.blockchain.height().await + 1;
        let cache = self.blockchain.transaction_cache().await;

        let recipient = match self.project_recipient(&transaction, height).await {
            Ok(accounts) => accounts,
            Err(e) => {
                debug!("Rejected transaction {} from {} - {}", hash, transaction.sender(), e);
                return ReturnCode::Invalid;
            }
        };
        let accepts_recipient = self
            .pool
            .read()
            .await
            .filter
            .accepts_recipient_account(&transaction, &recipient.0, &recipient.1);
        if !accepts_recipient {
            self.blacklist(hash).await;
            return ReturnCode::Filtered;
        }

        let sender_account = match self
            .accounts
            .get(transaction.sender(), Some(transaction.sender_type()))
            .await
        {
            Ok(account) => account,
            Err(e) => {
                debug!("Rejected transaction {} from {} - {}", hash, transaction.sender(), e);
                return ReturnCode::Invalid;
            }
        };

        // Re-apply the whole pending set in priority order. A better paying
        // newcomer may push out transactions the balance no longer covers.
        let mut accepted = Vec::new();
        let mut displaced = Vec::new();
        let mut account = sender_account.clone();
        let candidates = set.copy_and_add(transaction.clone());
        for pending in candidates.transactions() {
            let outcome = if accepted.len() < self.config.transactions_per_sender_max {
                account
                    .with_outgoing_transaction(pending, height, &cache, false)
                    .map_err(Some)
            } else {
                Err(None)
            };
            match outcome {
                Ok(next) => {
                    account = next;
                    accepted.push(pending.clone());
                }
                Err(error) if *pending == transaction => {
                    let reason = error
                        .as_ref()
                        .map_or_else(|| "transactions per sender exceeded".to_string(), |e| e.to_string());
                    debug!("Rejected transaction {} from {} - {}", hash, transaction.sender(), reason);
                    return match error {
                        Some(AccountError::DoubleTransaction) => ReturnCode::Mined,
                        Some(AccountError::Validity) => ReturnCode::Expired,
                        _ => ReturnCode::Invalid,
                    };
                }
                Err(_) => displaced.push(pending.clone()),
            }
        }

        let mut removed = Vec::new();
        let popped = {
            let mut pool = self.pool.write().await;
            if !pool
                .filter
                .accepts_sender_account(&transaction, &sender_account, &account)
            {
                pool.filter.blacklist(hash);
                return ReturnCode::Filtered;
            }

            for tx in displaced {
                if pool.remove(&tx) {
                    removed.push(tx);
                }
            }
            pool.insert(transaction.clone(), TransactionSet::new(accepted));
            if pool.len() > self.config.size_max {
                pool.pop_low_fee()
            } else {
                None
            }
        };

        for tx in removed {
            debug!("Transaction {} displaced by {}", tx.hash(), hash);
            self.notify(MempoolEvent::TransactionRemoved(tx));
        }
        debug!("Accepted transaction {} from {}", hash, transaction.sender());
        self.notify(MempoolEvent::TransactionAdded(transaction));
        if let Some(tx) = popped {
            debug!("Pool full, dropped transaction {}", tx.hash());
            self.notify(MempoolEvent::TransactionRemoved(tx));
        }
        ReturnCode::Accepted
    }

    /// The recipient before and after receiving `transaction`.
    async fn project_recipient(
        &self,
        transaction: &Transaction,
        height: u32,
    ) -> Result<(Account, Account), AccountError> {
        let recipient = self.accounts.get(transaction.recipient(), None).await?;
        let updated = recipient
            .with_incoming_transaction(transaction, height, false)?
            .with_contract_command(transaction, height, false)?;
        Ok((recipient, updated))
    }

    async fn reapply(
        &self,
        account: &Account,
        transaction: &Transaction,
        height: u32,
        cache: &TransactionCache,
    ) -> Result<Account, AccountError> {
        let next = account.with_outgoing_transaction(transaction, height, cache, false)?;
        self.project_recipient(transaction, height).await?;
        Ok(next)
    }

    /// Drops whatever the new head made invalid. Each sender's set is
    /// re-applied in priority order; a failing transaction is removed and
    /// the ones after it are still tried.
    async fn evict_transactions(&self) {
        let height = self.blockchain.height().await + 1;
        let cache = self.blockchain.transaction_cache().await;
        let sets: Vec<(Address, TransactionSet)> = {
            let pool = self.pool.read().await;
            pool.senders()
                .into_iter()
                .filter_map(|sender| pool.sender_set(&sender).cloned().map(|set| (sender, set)))
                .collect()
        };

        let mut kept_sets = Vec::with_capacity(sets.len());
        let mut evicted = Vec::new();
        for (sender, set) in sets {
            let Some(sender_type) = set.sender_type() else {
                continue;
            };
            match self.accounts.get(&sender, Some(sender_type)).await {
                Ok(mut account) => {
                    let mut kept = Vec::new();
                    for tx in set.transactions() {
                        match self.reapply(&account, tx, height, &cache).await {
                            Ok(next) => {
                                account = next;
                                kept.push(tx.clone());
                            }
                            Err(e) => {
                                debug!("Evicting transaction {} - {}", tx.hash(), e);
                                evicted.push(tx.clone());
                            }
                        }
                    }
                    kept_sets.push((sender, TransactionSet::new(kept)));
                }
                Err(e) => {
                    debug!("Evicting all transactions of {} - {}", sender, e);
                    evicted.extend(set.transactions().iter().cloned());
                    kept_sets.push((sender, TransactionSet::default()));
                }
            }
        }

        let mut removed = Vec::new();
        {
            let mut pool = self.pool.write().await;
            for tx in evicted {
                if pool.remove(&tx) {
                    removed.push(tx);
                }
            }
            for (sender, set) in kept_sets {
                pool.replace_sender_set(sender, set);
            }
        }

        for tx in removed {
            self.notify(MempoolEvent::TransactionRemoved(tx));
        }
        self.notify(MempoolEvent::TransactionsReady);
    }

    /// Offers the transactions of reverted blocks again, oldest block first.
    async fn restore_transactions(&self, reverted_blocks: &[Block]) {
        for block in reverted_blocks.iter().rev() {
            for tx in block.transactions() {
                match self.push_transaction(tx.clone()).await {
                    code @ (ReturnCode::Accepted | ReturnCode::Known | ReturnCode::Mined) => {
                        debug!("Restored transaction {} from block #{}: {}", tx.hash(), block.height(), code)
                    }
                    code => warn!("Failed to restore transaction {} from block #{}: {}", tx.hash(), block.height(), code),
                }
            }
        }
    }
}
