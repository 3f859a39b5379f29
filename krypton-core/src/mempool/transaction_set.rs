use std::cmp::Ordering;

use crate::accounts::AccountType;
use crate::primitives::Address;
use crate::transactions::Transaction;

/// One sender's pending transactions, highest fee priority first.
#[derive(Debug, Clone, Default)]
pub struct TransactionSet {
    transactions: Vec<Transaction>,
}

impl TransactionSet {
    pub fn new(mut transactions: Vec<Transaction>) -> Self {
        transactions.sort_by(|a, b| a.compare(b));
        TransactionSet { transactions }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn sender(&self) -> Option<&Address> {
        self.transactions.first().map(|tx| tx.sender())
    }

    pub fn sender_type(&self) -> Option<AccountType> {
        self.transactions.first().map(|tx| tx.sender_type())
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// A copy with `transaction` inserted at its priority position.
    pub fn copy_and_add(&self, transaction: Transaction) -> Self {
        let position = self
            .transactions
            .partition_point(|tx| tx.compare(&transaction) == Ordering::Less);
        let mut transactions = self.transactions.clone();
        transactions.insert(position, transaction);
        TransactionSet { transactions }
    }

    pub fn remove(&mut self, transaction: &Transaction) -> bool {
        let hash = transaction.hash();
        match self.transactions.iter().position(|tx| tx.hash() == hash) {
            Some(index) => {
                self.transactions.remove(index);
                true
            }
            None => false,
        }
    }

    /// Transactions paying less than `fee_per_byte` satoshis per byte.
    pub fn num_below_fee_per_byte(&self, fee_per_byte: u128) -> usize {
        self.transactions
            .iter()
            .filter(|tx| !tx.fee_per_byte_at_least(fee_per_byte))
            .count()
    }
}
