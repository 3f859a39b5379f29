use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use tokio::sync::RwLock;

use super::{Account, AccountError, AccountType, PrunedAccount};
use crate::block::{Block, BlockBody};
use crate::policy;
use crate::primitives::{Address, Hash};
use crate::serial::SerialEncode;
use crate::transaction_cache::TransactionCache;
use crate::transactions::{Transaction, TransactionFlags};
use crate::utils::merkle_root;

/// Read access to the account state at the current head.
pub trait Accounts: Send + Sync {
    /// Addresses that were never touched resolve to `Account::INITIAL`. With
    /// an expected type, any other type is a `TypeMismatch`.
    fn get(
        &self,
        address: &Address,
        expected_type: Option<AccountType>,
    ) -> impl Future<Output = Result<Account, AccountError>> + Send;

    /// The accounts that `transactions`, mined at `block_height`, would leave
    /// empty and that the block therefore has to list for pruning.
    fn gather_to_be_pruned_accounts(
        &self,
        transactions: &[Transaction],
        block_height: u32,
        transactions_cache: &TransactionCache,
    ) -> impl Future<Output = Result<Vec<PrunedAccount>, AccountError>> + Send;
}

type Ledger = HashMap<Address, Account>;

/// In-memory account state. Blocks are applied to a scratch copy and only
/// swapped in when every step succeeds.
#[derive(Debug, Default)]
pub struct AccountStore {
    accounts: RwLock<Ledger>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_genesis(accounts: impl IntoIterator<Item = (Address, Account)>) -> Self {
        let mut ledger = Ledger::new();
        for (address, account) in accounts {
            put(&mut ledger, address, account);
        }
        AccountStore {
            accounts: RwLock::new(ledger),
        }
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }

    /// Merkle root over every non-initial account, ordered by address.
    pub async fn hash(&self) -> Hash {
        ledger_hash(&*self.accounts.read().await)
    }

    /// The accounts hash the state would have after `body` is committed at
    /// `block_height`. The store itself is left untouched.
    pub async fn hash_with_body(
        &self,
        body: &BlockBody,
        block_height: u32,
        transactions_cache: &TransactionCache,
    ) -> Result<Hash, AccountError> {
        let mut scratch = self.accounts.read().await.clone();
        commit_body(&mut scratch, body, block_height, transactions_cache)?;
        Ok(ledger_hash(&scratch))
    }

    pub async fn commit_block(
        &self,
        block: &Block,
        transactions_cache: &TransactionCache,
    ) -> Result<(), AccountError> {
        let mut accounts = self.accounts.write().await;
        let mut scratch = accounts.clone();
        commit_body(&mut scratch, &block.body, block.height(), transactions_cache)?;
        *accounts = scratch;
        debug!(
            "Committed block #{} ({} transactions, {} pruned)",
            block.height(),
            block.transactions().len(),
            block.body.pruned_accounts.len()
        );
        Ok(())
    }

    pub async fn revert_block(
        &self,
        block: &Block,
        transactions_cache: &TransactionCache,
    ) -> Result<(), AccountError> {
        let mut accounts = self.accounts.write().await;
        let mut scratch = accounts.clone();
        revert_body(&mut scratch, &block.body, block.height(), transactions_cache)?;
        *accounts = scratch;
        debug!("Reverted block #{}", block.height());
        Ok(())
    }
}

impl Accounts for AccountStore {
    async fn get(
        &self,
        address: &Address,
        expected_type: Option<AccountType>,
    ) -> Result<Account, AccountError> {
        lookup(&*self.accounts.read().await, address, expected_type)
    }

    async fn gather_to_be_pruned_accounts(
        &self,
        transactions: &[Transaction],
        block_height: u32,
        transactions_cache: &TransactionCache,
    ) -> Result<Vec<PrunedAccount>, AccountError> {
        let mut scratch = self.accounts.read().await.clone();
        apply_transactions(&mut scratch, transactions, block_height, transactions_cache)?;

        let mut pruned = BTreeMap::new();
        for tx in transactions {
            let account = lookup(&scratch, tx.sender(), None)?;
            if account.is_to_be_pruned() {
                pruned.insert(*tx.sender(), account);
            }
        }
        Ok(pruned
            .into_iter()
            .map(|(address, account)| PrunedAccount::new(address, account))
            .collect())
    }
}

fn lookup(
    ledger: &Ledger,
    address: &Address,
    expected_type: Option<AccountType>,
) -> Result<Account, AccountError> {
    let account = ledger.get(address).cloned().unwrap_or(Account::INITIAL);
    match expected_type {
        Some(expected) if account.account_type() != expected => Err(AccountError::TypeMismatch {
            expected,
            found: account.account_type(),
        }),
        _ => Ok(account),
    }
}

/// Initial accounts are not stored.
fn put(ledger: &mut Ledger, address: Address, account: Account) {
    if account.is_initial() {
        ledger.remove(&address);
    } else {
        ledger.insert(address, account);
    }
}

fn ledger_hash(ledger: &Ledger) -> Hash {
    let mut addresses: Vec<&Address> = ledger.keys().collect();
    addresses.sort();
    let leaves: Vec<Hash> = addresses
        .into_iter()
        .filter_map(|address| {
            ledger.get(address).map(|account| {
                let mut bytes = address.as_bytes().to_vec();
                bytes.extend_from_slice(&account.to_bytes());
                Hash::light(&bytes)
            })
        })
        .collect();
    merkle_root(&leaves)
}

/// Senders, then recipients, then contract commands.
fn apply_transactions(
    ledger: &mut Ledger,
    transactions: &[Transaction],
    block_height: u32,
    transactions_cache: &TransactionCache,
) -> Result<(), AccountError> {
    for tx in transactions {
        let sender = lookup(ledger, tx.sender(), Some(tx.sender_type()))?;
        let sender = sender.with_outgoing_transaction(tx, block_height, transactions_cache, false)?;
        put(ledger, *tx.sender(), sender);
    }
    for tx in transactions {
        let recipient = lookup(ledger, tx.recipient(), None)?;
        let recipient = recipient.with_incoming_transaction(tx, block_height, false)?;
        put(ledger, *tx.recipient(), recipient);
    }
    for tx in transactions {
        if tx.has_flag(TransactionFlags::CONTRACT_CREATION) {
            let recipient = lookup(ledger, tx.recipient(), None)?;
            let contract = recipient.with_contract_command(tx, block_height, false)?;
            put(ledger, *tx.recipient(), contract);
        }
    }
    Ok(())
}

fn total_fees(transactions: &[Transaction]) -> Result<u128, AccountError> {
    transactions
        .iter()
        .try_fold(0u128, |sum, tx| sum.checked_add(tx.fee()))
        .ok_or(AccountError::Balance)
}

fn commit_body(
    ledger: &mut Ledger,
    body: &BlockBody,
    block_height: u32,
    transactions_cache: &TransactionCache,
) -> Result<(), AccountError> {
    apply_transactions(ledger, &body.transactions, block_height, transactions_cache)?;

    for pruned in &body.pruned_accounts {
        let account = lookup(ledger, &pruned.address, None)?;
        if !account.is_to_be_pruned() || account != pruned.account {
            warn!("Account {} listed for pruning does not match", pruned.address);
            return Err(AccountError::InvalidData(format!(
                "account {} cannot be pruned",
                pruned.address
            )));
        }
        ledger.remove(&pruned.address);
    }

    let reward = policy::block_reward_at(block_height)
        .checked_add(total_fees(&body.transactions)?)
        .ok_or(AccountError::Balance)?;
    let miner = lookup(ledger, &body.miner, None)?;
    if miner.account_type().is_contract() {
        return Err(AccountError::IllegalIncoming);
    }
    let balance = miner
        .balance()
        .checked_add(reward)
        .ok_or(AccountError::Balance)?;
    put(ledger, body.miner, miner.with_balance(balance));

    for tx in &body.transactions {
        if ledger.get(tx.sender()).is_some_and(Account::is_to_be_pruned) {
            return Err(AccountError::InvalidData(format!(
                "account {} must be pruned",
                tx.sender()
            )));
        }
    }
    Ok(())
}

fn revert_body(
    ledger: &mut Ledger,
    body: &BlockBody,
    block_height: u32,
    transactions_cache: &TransactionCache,
) -> Result<(), AccountError> {
    let reward = policy::block_reward_at(block_height)
        .checked_add(total_fees(&body.transactions)?)
        .ok_or(AccountError::Balance)?;
    let miner = lookup(ledger, &body.miner, Some(AccountType::Basic))?;
    let balance = miner
        .balance()
        .checked_sub(reward)
        .ok_or(AccountError::Balance)?;
    put(ledger, body.miner, miner.with_balance(balance));

    for pruned in &body.pruned_accounts {
        if !lookup(ledger, &pruned.address, None)?.is_initial() {
            return Err(AccountError::InvalidData(format!(
                "pruned account {} was reused",
                pruned.address
            )));
        }
        ledger.insert(pruned.address, pruned.account.clone());
    }

    for tx in body.transactions.iter().rev() {
        if tx.has_flag(TransactionFlags::CONTRACT_CREATION) {
            let contract = lookup(ledger, tx.recipient(), None)?;
            let recipient = contract.with_contract_command(tx, block_height, true)?;
            put(ledger, *tx.recipient(), recipient);
        }
    }
    for tx in body.transactions.iter().rev() {
        let recipient = lookup(ledger, tx.recipient(), None)?;
        let recipient = recipient.with_incoming_transaction(tx, block_height, true)?;
        put(ledger, *tx.recipient(), recipient);
    }
    for tx in body.transactions.iter().rev() {
        let sender = lookup(ledger, tx.sender(), Some(tx.sender_type()))?;
        let sender = sender.with_outgoing_transaction(tx, block_height, transactions_cache, true)?;
        put(ledger, *tx.sender(), sender);
    }
    Ok(())
}
