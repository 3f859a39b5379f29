//! Ledger accounts. Every transition returns a new value; accounts are never
//! mutated in place, so the mempool can project a sender's pending set on a
//! scratch copy.

mod basic;
mod htlc;
mod store;
mod vesting;

pub use basic::BasicAccount;
pub use htlc::{HashedTimeLockedContract, ProofType};
pub use store::{AccountStore, Accounts};
pub use vesting::VestingContract;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::policy;
use crate::primitives::Address;
use crate::serial::{SerialBuffer, SerialDecode, SerialEncode, SerialError};
use crate::transaction_cache::TransactionCache;
use crate::transactions::{Transaction, TransactionFlags};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("Balance Error!")]
    Balance,
    #[error("Validity Error!")]
    Validity,
    #[error("Double Transaction Error!")]
    DoubleTransaction,
    #[error("Proof Error!")]
    Proof,
    #[error("Data Error!")]
    Data,
    #[error("Illegal incoming transaction")]
    IllegalIncoming,
    #[error("Invalid transaction data: {0}")]
    InvalidData(String),
    #[error("Account type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: AccountType,
        found: AccountType,
    },
    #[error(transparent)]
    Parse(#[from] SerialError),
}

/// Non-zero types are contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum AccountType {
    Basic = 0,
    Vesting = 1,
    Htlc = 2,
}

impl AccountType {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountType::Basic => "basic",
            AccountType::Vesting => "vesting",
            AccountType::Htlc => "htlc",
        }
    }

    pub fn is_contract(self) -> bool {
        self != AccountType::Basic
    }

    /// Whether an account of this type may send `transaction`.
    pub fn verify_outgoing_transaction(self, transaction: &Transaction) -> bool {
        match self {
            AccountType::Basic => BasicAccount::verify_outgoing_transaction(transaction),
            AccountType::Vesting => VestingContract::verify_outgoing_transaction(transaction),
            AccountType::Htlc => HashedTimeLockedContract::verify_outgoing_transaction(transaction),
        }
    }

    /// Whether an account of this type may receive `transaction`.
    pub fn verify_incoming_transaction(self, transaction: &Transaction) -> bool {
        match self {
            AccountType::Basic => BasicAccount::verify_incoming_transaction(transaction),
            AccountType::Vesting => VestingContract::verify_incoming_transaction(transaction),
            AccountType::Htlc => HashedTimeLockedContract::verify_incoming_transaction(transaction),
        }
    }
}

impl TryFrom<u8> for AccountType {
    type Error = SerialError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AccountType::Basic),
            1 => Ok(AccountType::Vesting),
            2 => Ok(AccountType::Htlc),
            other => Err(SerialError::InvalidValue {
                what: "account type",
                value: u64::from(other),
            }),
        }
    }
}

impl FromStr for AccountType {
    type Err = SerialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(AccountType::Basic),
            "vesting" => Ok(AccountType::Vesting),
            "htlc" => Ok(AccountType::Htlc),
            other => Err(SerialError::Malformed(format!("invalid account type '{}'", other))),
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AccountType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Accepts the name or the numeric tag.
impl<'de> Deserialize<'de> for AccountType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Tag(u8),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Tag(tag) => AccountType::try_from(tag).map_err(de::Error::custom),
            Repr::Name(name) => name.parse().map_err(de::Error::custom),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Account {
    Basic(BasicAccount),
    Vesting(VestingContract),
    Htlc(HashedTimeLockedContract),
}

impl Account {
    /// The state of every address that was never touched.
    pub const INITIAL: Account = Account::Basic(BasicAccount { balance: 0 });

    pub fn account_type(&self) -> AccountType {
        match self {
            Account::Basic(_) => AccountType::Basic,
            Account::Vesting(_) => AccountType::Vesting,
            Account::Htlc(_) => AccountType::Htlc,
        }
    }

    pub fn balance(&self) -> u128 {
        match self {
            Account::Basic(account) => account.balance,
            Account::Vesting(contract) => contract.balance,
            Account::Htlc(contract) => contract.balance,
        }
    }

    /// Same variant and fields, new balance.
    pub fn with_balance(&self, balance: u128) -> Account {
        match self {
            Account::Basic(_) => Account::Basic(BasicAccount { balance }),
            Account::Vesting(contract) => Account::Vesting(VestingContract {
                balance,
                ..contract.clone()
            }),
            Account::Htlc(contract) => Account::Htlc(HashedTimeLockedContract {
                balance,
                ..contract.clone()
            }),
        }
    }

    /// Builds the contract a creation transaction asks for, seeded with the
    /// balance already credited to the contract address.
    pub fn create(
        account_type: AccountType,
        balance: u128,
        block_height: u32,
        transaction: &Transaction,
    ) -> Result<Account, AccountError> {
        match account_type {
            AccountType::Basic => Ok(Account::Basic(BasicAccount { balance })),
            AccountType::Vesting => Ok(Account::Vesting(VestingContract::create(
                balance,
                block_height,
                transaction,
            )?)),
            AccountType::Htlc => Ok(Account::Htlc(HashedTimeLockedContract::create(
                balance,
                block_height,
                transaction,
            )?)),
        }
    }

    pub fn with_outgoing_transaction(
        &self,
        transaction: &Transaction,
        block_height: u32,
        transactions_cache: &TransactionCache,
        revert: bool,
    ) -> Result<Account, AccountError> {
        match self {
            Account::Basic(_) => {}
            Account::Vesting(contract) => {
                contract.check_outgoing_transaction(transaction, block_height, revert)?
            }
            Account::Htlc(contract) => {
                contract.check_outgoing_transaction(transaction, block_height, revert)?
            }
        }
        let balance = outgoing_balance(
            self.balance(),
            transaction,
            block_height,
            transactions_cache,
            revert,
        )?;
        Ok(self.with_balance(balance))
    }

    pub fn with_incoming_transaction(
        &self,
        transaction: &Transaction,
        block_height: u32,
        revert: bool,
    ) -> Result<Account, AccountError> {
        match self {
            Account::Basic(account) => {
                account.check_incoming_transaction(transaction, block_height, revert)?
            }
            // Contracts only come into existence through their creation
            // transaction and accept nothing afterwards.
            Account::Vesting(_) | Account::Htlc(_) => return Err(AccountError::IllegalIncoming),
        }
        let balance = incoming_balance(self.balance(), transaction, revert)?;
        Ok(self.with_balance(balance))
    }

    pub fn with_contract_command(
        &self,
        transaction: &Transaction,
        block_height: u32,
        revert: bool,
    ) -> Result<Account, AccountError> {
        let creates_contract = transaction.has_flag(TransactionFlags::CONTRACT_CREATION);
        match self {
            Account::Basic(account) => {
                if !revert && creates_contract && transaction.recipient_type() != AccountType::Basic {
                    return Account::create(
                        transaction.recipient_type(),
                        account.balance,
                        block_height,
                        transaction,
                    );
                }
                Ok(self.clone())
            }
            Account::Vesting(_) | Account::Htlc(_) => {
                if revert && creates_contract {
                    return Ok(Account::Basic(BasicAccount {
                        balance: self.balance(),
                    }));
                }
                Ok(self.clone())
            }
        }
    }

    pub fn is_initial(&self) -> bool {
        matches!(self, Account::Basic(account) if account.balance == 0)
    }

    /// An emptied contract; dropped from the account state.
    pub fn is_to_be_pruned(&self) -> bool {
        self.balance() == 0 && !self.is_initial()
    }

    pub fn from_plain(plain: serde_json::Value) -> Result<Account, AccountError> {
        serde_json::from_value(plain)
            .map_err(|e| AccountError::Parse(SerialError::Malformed(e.to_string())))
    }

    pub fn to_plain(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Default for Account {
    fn default() -> Self {
        Account::INITIAL
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Account::Basic(account) => write!(f, "BasicAccount{{balance={}}}", account.balance),
            Account::Vesting(contract) => write!(
                f,
                "VestingAccount{{balance={}, owner={}}}",
                contract.balance, contract.owner
            ),
            Account::Htlc(contract) => write!(
                f,
                "HashedTimeLockedContract{{balance={}, sender={}, recipient={}}}",
                contract.balance, contract.sender, contract.recipient
            ),
        }
    }
}

impl SerialEncode for Account {
    fn serialize_to(&self, buf: &mut SerialBuffer) {
        match self {
            Account::Basic(account) => account.serialize_to(buf),
            Account::Vesting(contract) => contract.serialize_to(buf),
            Account::Htlc(contract) => contract.serialize_to(buf),
        }
    }

    fn serialized_size(&self) -> usize {
        match self {
            Account::Basic(account) => account.serialized_size(),
            Account::Vesting(contract) => contract.serialized_size(),
            Account::Htlc(contract) => contract.serialized_size(),
        }
    }
}

impl SerialDecode for Account {
    fn unserialize(buf: &mut SerialBuffer) -> Result<Self, SerialError> {
        let account_type = AccountType::try_from(buf.read_u8()?)?;
        let balance = buf.read_u128()?;
        match account_type {
            AccountType::Basic => Ok(Account::Basic(BasicAccount { balance })),
            AccountType::Vesting => Ok(Account::Vesting(VestingContract::unserialize_fields(
                buf, balance,
            )?)),
            AccountType::Htlc => Ok(Account::Htlc(HashedTimeLockedContract::unserialize_fields(
                buf, balance,
            )?)),
        }
    }
}

/// An emptied account listed in a block so that reverting the block can
/// restore it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrunedAccount {
    pub address: Address,
    pub account: Account,
}

impl PrunedAccount {
    pub fn new(address: Address, account: Account) -> Self {
        PrunedAccount { address, account }
    }
}

impl SerialEncode for PrunedAccount {
    fn serialize_to(&self, buf: &mut SerialBuffer) {
        self.address.serialize_to(buf);
        self.account.serialize_to(buf);
    }

    fn serialized_size(&self) -> usize {
        Address::SIZE + self.account.serialized_size()
    }
}

impl SerialDecode for PrunedAccount {
    fn unserialize(buf: &mut SerialBuffer) -> Result<Self, SerialError> {
        Ok(PrunedAccount {
            address: Address::unserialize(buf)?,
            account: Account::unserialize(buf)?,
        })
    }
}

pub(crate) fn in_validity_window(transaction: &Transaction, block_height: u32) -> bool {
    let start = transaction.validity_start_height();
    block_height >= start
        && u64::from(block_height)
            < u64::from(start) + u64::from(policy::TRANSACTION_VALIDITY_WINDOW)
}

fn outgoing_balance(
    balance: u128,
    transaction: &Transaction,
    block_height: u32,
    transactions_cache: &TransactionCache,
    revert: bool,
) -> Result<u128, AccountError> {
    let amount = transaction
        .value()
        .checked_add(transaction.fee())
        .ok_or(AccountError::Balance)?;
    if !revert {
        let new_balance = balance.checked_sub(amount).ok_or(AccountError::Balance)?;
        if !in_validity_window(transaction, block_height) {
            return Err(AccountError::Validity);
        }
        if transactions_cache.contains_transaction(transaction) {
            return Err(AccountError::DoubleTransaction);
        }
        Ok(new_balance)
    } else {
        if !in_validity_window(transaction, block_height) {
            return Err(AccountError::Validity);
        }
        balance.checked_add(amount).ok_or(AccountError::Balance)
    }
}

fn incoming_balance(
    balance: u128,
    transaction: &Transaction,
    revert: bool,
) -> Result<u128, AccountError> {
    if !revert {
        balance
            .checked_add(transaction.value())
            .ok_or(AccountError::Balance)
    } else {
        balance
            .checked_sub(transaction.value())
            .ok_or(AccountError::Balance)
    }
}

/// Contracts live at the address their creation transaction derives.
pub(crate) fn verify_contract_incoming_transaction(transaction: &Transaction) -> bool {
    *transaction.recipient() == transaction.contract_creation_address()
}

#[cfg(test)]
pub(crate) mod test_utils {
    use crate::accounts::AccountType;
    use crate::primitives::{Address, Hash, KeyPair, Signature, SignatureProof};
    use crate::serial::SerialEncode;
    use crate::transactions::{Transaction, TransactionFlags};
    use crate::NETWORK_ID_TEST;

    pub fn recipient() -> Address {
        Address::from_hash(&Hash::light(b"recipient"))
    }

    pub fn signed_basic(pair: &KeyPair, recipient: Address, value: u128, height: u32) -> Transaction {
        let mut tx =
            Transaction::new_basic(pair.public_key, recipient, value, height, None, NETWORK_ID_TEST)
                .unwrap();
        let signature =
            Signature::create(&pair.private_key, &pair.public_key, &tx.serialize_content()).unwrap();
        tx.set_signature(signature).unwrap();
        tx
    }

    pub fn sign_proof(pair: &KeyPair, tx: &Transaction) -> Vec<u8> {
        let signature =
            Signature::create(&pair.private_key, &pair.public_key, &tx.serialize_content()).unwrap();
        SignatureProof::single_sig(pair.public_key, signature).to_bytes()
    }

    /// An extended transaction out of a contract, signed by `signer`.
    pub fn contract_outgoing(
        signer: &KeyPair,
        contract: Address,
        contract_type: AccountType,
        value: u128,
        height: u32,
    ) -> Transaction {
        let mut tx = Transaction::new_extended(
            contract,
            contract_type,
            recipient(),
            AccountType::Basic,
            value,
            height,
            TransactionFlags::NONE,
            Vec::new(),
            Vec::new(),
            NETWORK_ID_TEST,
        )
        .unwrap();
        let proof = sign_proof(signer, &tx);
        tx.set_proof(proof).unwrap();
        tx
    }

    pub fn creation(
        funder: &KeyPair,
        contract_type: AccountType,
        value: u128,
        height: u32,
        data: Vec<u8>,
    ) -> Transaction {
        let mut tx = Transaction::new_extended(
            funder.address(),
            AccountType::Basic,
            Address::CONTRACT_CREATION,
            contract_type,
            value,
            height,
            TransactionFlags::CONTRACT_CREATION,
            data,
            Vec::new(),
            NETWORK_ID_TEST,
        )
        .unwrap();
        let proof = sign_proof(funder, &tx);
        tx.set_proof(proof).unwrap();
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use crate::primitives::KeyPair;
    use crate::NETWORK_ID_TEST;

    #[test]
    fn test_account_type_tags_and_names() {
        assert_eq!(AccountType::try_from(2).unwrap(), AccountType::Htlc);
        assert!(AccountType::try_from(3).is_err());
        assert_eq!(serde_json::to_string(&AccountType::Vesting).unwrap(), "\"vesting\"");
        assert_eq!(serde_json::from_str::<AccountType>("1").unwrap(), AccountType::Vesting);
        assert_eq!(serde_json::from_str::<AccountType>("\"htlc\"").unwrap(), AccountType::Htlc);
    }

    #[test]
    fn test_initial_and_pruning() {
        assert!(Account::INITIAL.is_initial());
        assert!(!Account::INITIAL.is_to_be_pruned());
        let basic = Account::Basic(BasicAccount { balance: 5 });
        assert!(!basic.is_initial());
        assert!(basic.with_balance(0).is_initial());

        let vesting = Account::Vesting(VestingContract::new(0, Address::NULL, 0, 0, 0, 0));
        assert!(!vesting.is_initial());
        assert!(vesting.is_to_be_pruned());
        assert!(!vesting.with_balance(1).is_to_be_pruned());
    }

    #[test]
    fn test_basic_round_trip() {
        let account = Account::Basic(BasicAccount { balance: 1_000 });
        let bytes = account.to_bytes();
        assert_eq!(bytes.len(), 17);
        assert_eq!(bytes[0], 0);
        assert_eq!(Account::decode(&bytes).unwrap(), account);

        let mut bad = bytes.clone();
        bad[0] = 9;
        assert!(Account::decode(&bad).is_err());
    }

    #[test]
    fn test_basic_transitions() {
        let pair = KeyPair::generate();
        let cache = TransactionCache::new();
        let account = Account::Basic(BasicAccount { balance: 3_000_000 });
        let tx = signed_basic(&pair, recipient(), 100, 10);

        let sent = account
            .with_outgoing_transaction(&tx, 10, &cache, false)
            .unwrap();
        assert_eq!(sent.balance(), 3_000_000 - 100 - 1_000_000);
        let reverted = sent
            .with_outgoing_transaction(&tx, 10, &cache, true)
            .unwrap();
        assert_eq!(reverted, account);

        let received = Account::INITIAL
            .with_incoming_transaction(&tx, 10, false)
            .unwrap();
        assert_eq!(received.balance(), 100);
        assert_eq!(
            received.with_incoming_transaction(&tx, 10, true).unwrap(),
            Account::INITIAL
        );
        assert_eq!(
            Account::INITIAL.with_incoming_transaction(&tx, 10, true),
            Err(AccountError::Balance)
        );
    }

    #[test]
    fn test_outgoing_errors() {
        let pair = KeyPair::generate();
        let mut cache = TransactionCache::new();
        let account = Account::Basic(BasicAccount { balance: 2_000_000 });
        let tx = signed_basic(&pair, recipient(), 100, 10);

        assert_eq!(
            Account::Basic(BasicAccount { balance: 1_000_099 })
                .with_outgoing_transaction(&tx, 10, &cache, false),
            Err(AccountError::Balance)
        );
        assert_eq!(
            account.with_outgoing_transaction(&tx, 9, &cache, false),
            Err(AccountError::Validity)
        );
        assert_eq!(
            account.with_outgoing_transaction(&tx, 10 + policy::TRANSACTION_VALIDITY_WINDOW, &cache, false),
            Err(AccountError::Validity)
        );
        assert!(account
            .with_outgoing_transaction(&tx, 9 + policy::TRANSACTION_VALIDITY_WINDOW, &cache, false)
            .is_ok());

        cache.push_transactions(crate::primitives::Hash::light(b"block"), &[tx.clone()]);
        assert_eq!(
            account.with_outgoing_transaction(&tx, 10, &cache, false),
            Err(AccountError::DoubleTransaction)
        );
    }

    #[test]
    fn test_basic_rejects_unflagged_type_change() {
        let pair = KeyPair::generate();
        let tx = Transaction::new_extended(
            pair.address(),
            AccountType::Basic,
            recipient(),
            AccountType::Vesting,
            100,
            1,
            TransactionFlags::NONE,
            vec![0; 24],
            vec![],
            NETWORK_ID_TEST,
        )
        .unwrap();
        assert_eq!(
            Account::INITIAL.with_incoming_transaction(&tx, 1, false),
            Err(AccountError::Data)
        );
    }

    #[test]
    fn test_contract_creation_and_revert() {
        let funder = KeyPair::generate();
        let owner = KeyPair::generate();
        let mut data = owner.address().as_bytes().to_vec();
        data.extend_from_slice(&100u32.to_be_bytes());
        let tx = creation(&funder, AccountType::Vesting, 500, 1, data);
        assert!(tx.verify(NETWORK_ID_TEST));

        let incoming = Account::INITIAL
            .with_incoming_transaction(&tx, 1, false)
            .unwrap();
        let contract = incoming.with_contract_command(&tx, 1, false).unwrap();
        assert_eq!(contract.account_type(), AccountType::Vesting);
        assert_eq!(contract.balance(), 500);

        // A second creation at the same address is refused.
        assert_eq!(
            contract.with_incoming_transaction(&tx, 1, false),
            Err(AccountError::IllegalIncoming)
        );

        let basic = contract.with_contract_command(&tx, 1, true).unwrap();
        assert_eq!(basic, Account::Basic(BasicAccount { balance: 500 }));
        assert_eq!(
            basic.with_incoming_transaction(&tx, 1, true).unwrap(),
            Account::INITIAL
        );
    }

    #[test]
    fn test_plain_form() {
        let contract = Account::Vesting(VestingContract::new(1000, Address::NULL, 1, 1440, 1, 800));
        let plain = contract.to_plain();
        assert_eq!(plain["type"], "vesting");
        assert_eq!(plain["balance"], "1000");
        assert_eq!(Account::from_plain(plain).unwrap(), contract);
        assert!(Account::from_plain(serde_json::json!({"balance": "1"})).is_err());
    }

    #[test]
    fn test_pruned_account_wire_form() {
        let pruned = PrunedAccount::new(
            recipient(),
            Account::Vesting(VestingContract::new(0, Address::NULL, 0, 10, 5, 5)),
        );
        let bytes = pruned.to_bytes();
        assert_eq!(bytes.len(), 20 + 1 + 16 + 20 + 4 + 4 + 16 + 16);
        assert_eq!(PrunedAccount::decode(&bytes).unwrap(), pruned);
    }
}
