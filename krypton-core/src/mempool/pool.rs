use log::error;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use super::filter::MempoolFilter;
use super::transaction_set::TransactionSet;
use crate::primitives::{Address, Hash};
use crate::serial::SerialEncode;
use crate::transactions::Transaction;

/// Orders the pool by fee priority, best first.
#[derive(Debug, Clone)]
struct ByFee(Transaction);

impl PartialEq for ByFee {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ByFee {}

impl PartialOrd for ByFee {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByFee {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.compare(&other.0)
    }
}

/// The committed mempool indices. Only the mempool worker mutates them, and
/// each admission or eviction is applied under a single write lock.
#[derive(Debug)]
pub(crate) struct Pool {
    by_hash: HashMap<Hash, Transaction>,
    by_fee: BTreeSet<ByFee>,
    by_sender: HashMap<Address, TransactionSet>,
    by_recipient: HashMap<Address, HashSet<Hash>>,
    pub(crate) filter: MempoolFilter,
}

impl Pool {
    pub fn new(filter: MempoolFilter) -> Self {
        Pool {
            by_hash: HashMap::new(),
            by_fee: BTreeSet::new(),
            by_sender: HashMap::new(),
            by_recipient: HashMap::new(),
            filter,
        }
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<&Transaction> {
        self.by_hash.get(hash)
    }

    pub fn sender_set(&self, sender: &Address) -> Option<&TransactionSet> {
        self.by_sender.get(sender)
    }

    pub fn senders(&self) -> Vec<Address> {
        self.by_sender.keys().copied().collect()
    }

    /// Adds `transaction` to the fee, hash and recipient indices and installs
    /// `set` as its sender's pending set.
    pub fn insert(&mut self, transaction: Transaction, set: TransactionSet) {
        let hash = transaction.hash();
        self.by_recipient
            .entry(*transaction.recipient())
            .or_default()
            .insert(hash);
        self.by_sender.insert(*transaction.sender(), set);
        self.by_fee.insert(ByFee(transaction.clone()));
        self.by_hash.insert(hash, transaction);
    }

    /// Drops `transaction` from the hash, fee and recipient indices. The
    /// sender set is left to the caller. Returns whether it was present.
    pub fn remove(&mut self, transaction: &Transaction) -> bool {
        let hash = transaction.hash();
        if self.by_hash.remove(&hash).is_none() {
            return false;
        }
        self.by_fee.remove(&ByFee(transaction.clone()));
        self.remove_from_recipient(transaction, &hash);
        true
    }

    pub fn replace_sender_set(&mut self, sender: Address, set: TransactionSet) {
        if set.is_empty() {
            self.by_sender.remove(&sender);
        } else {
            self.by_sender.insert(sender, set);
        }
    }

    /// Removes the transaction with the lowest fee priority from every index.
    pub fn pop_low_fee(&mut self) -> Option<Transaction> {
        let ByFee(transaction) = self.by_fee.pop_last()?;
        let hash = transaction.hash();
        if let Some(set) = self.by_sender.get_mut(transaction.sender()) {
            set.remove(&transaction);
            if set.is_empty() {
                self.by_sender.remove(transaction.sender());
            }
        }
        self.remove_from_recipient(&transaction, &hash);
        self.by_hash.remove(&hash);
        Some(transaction)
    }

    fn remove_from_recipient(&mut self, transaction: &Transaction, hash: &Hash) {
        match self.by_recipient.get_mut(transaction.recipient()) {
            Some(hashes) => {
                hashes.remove(hash);
                if hashes.is_empty() {
                    self.by_recipient.remove(transaction.recipient());
                }
            }
            None => error!("Invalid state: no transactions by recipient for {}", transaction),
        }
    }

    /// Best fee priority first.
    pub fn iter_by_fee(&self) -> impl Iterator<Item = &Transaction> {
        self.by_fee.iter().map(|ByFee(tx)| tx)
    }

    /// Fee-ordered transactions whose sizes add up to less than `max_size`.
    /// Transactions that do not fit are skipped, not ended on.
    pub fn transactions(&self, max_size: usize) -> Vec<Transaction> {
        let mut size = 0;
        let mut transactions = Vec::new();
        for tx in self.iter_by_fee() {
            let tx_size = tx.serialized_size();
            if size + tx_size >= max_size {
                continue;
            }
            size += tx_size;
            transactions.push(tx.clone());
        }
        transactions
    }

    pub fn by_sender(&self, sender: &Address) -> Vec<Transaction> {
        self.by_sender
            .get(sender)
            .map(|set| set.transactions().to_vec())
            .unwrap_or_default()
    }

    pub fn by_recipient(&self, recipient: &Address) -> Vec<Transaction> {
        self.by_recipient
            .get(recipient)
            .map(|hashes| {
                hashes
                    .iter()
                    .filter_map(|hash| self.by_hash.get(hash).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Outgoing transactions of each address first, then incoming ones,
    /// stopping at `max_transactions`.
    pub fn by_addresses(&self, addresses: &[Address], max_transactions: usize) -> Vec<Transaction> {
        let mut transactions = Vec::new();
        for address in addresses {
            for tx in self.by_sender(address).into_iter().chain(self.by_recipient(address)) {
                if transactions.len() >= max_transactions {
                    return transactions;
                }
                transactions.push(tx);
            }
        }
        transactions
    }
}
