use lru::LruCache;
use std::num::NonZeroUsize;

use super::config::FilterRules;
use crate::accounts::Account;
use crate::primitives::Hash;
use crate::transactions::{Transaction, TransactionFlags};

/// Policy thresholds on top of consensus validity, plus a bounded memory of
/// rejected hashes.
#[derive(Debug)]
pub struct MempoolFilter {
    rules: FilterRules,
    blacklist: LruCache<Hash, ()>,
}

impl MempoolFilter {
    pub fn new(rules: FilterRules) -> Self {
        let capacity = NonZeroUsize::new(rules.blacklist_size).unwrap_or(NonZeroUsize::MIN);
        MempoolFilter {
            rules,
            blacklist: LruCache::new(capacity),
        }
    }

    pub fn rules(&self) -> &FilterRules {
        &self.rules
    }

    pub fn accepts_transaction(&self, tx: &Transaction) -> bool {
        let rules = &self.rules;
        tx.fee() >= rules.fee
            && tx.value() >= rules.value
            && tx.value().saturating_add(tx.fee()) >= rules.total_value
            && (!tx.has_flag(TransactionFlags::CONTRACT_CREATION)
                || (tx.fee() >= rules.contract_fee
                    && tx.fee_per_byte_at_least(rules.contract_fee_per_byte)
                    && tx.value() >= rules.contract_value))
    }

    /// Creating an account costs extra.
    pub fn accepts_recipient_account(
        &self,
        tx: &Transaction,
        old_account: &Account,
        new_account: &Account,
    ) -> bool {
        let rules = &self.rules;
        new_account.balance() >= rules.recipient_balance
            && (!old_account.is_initial()
                || (tx.fee() >= rules.creation_fee
                    && tx.fee_per_byte_at_least(rules.creation_fee_per_byte)
                    && tx.value() >= rules.creation_value))
    }

    /// Senders may not leave dust behind; emptying the account entirely is
    /// fine.
    pub fn accepts_sender_account(
        &self,
        _tx: &Transaction,
        _old_account: &Account,
        new_account: &Account,
    ) -> bool {
        new_account.balance() >= self.rules.sender_balance
            || new_account.is_initial()
            || new_account.is_to_be_pruned()
    }

    pub fn blacklist(&mut self, hash: Hash) {
        self.blacklist.put(hash, ());
    }

    pub fn is_blacklisted(&self, hash: &Hash) -> bool {
        self.blacklist.contains(hash)
    }
}

impl Default for MempoolFilter {
    fn default() -> Self {
        Self::new(FilterRules::default())
    }
}
