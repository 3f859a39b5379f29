use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as, DisplayFromStr};

use super::{Transaction, TransactionError, TransactionFlags, TransactionFormat};
use crate::accounts::AccountType;
use crate::primitives::{Address, Hash};
use crate::serial::SerialEncode;

/// JSON-friendly view of a transaction. Amounts are decimal strings so they
/// survive JavaScript number parsing on the other end.
#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlainTransaction {
    #[serde(default)]
    pub transaction_hash: Option<Hash>,
    pub format: TransactionFormat,
    pub sender: Address,
    pub sender_type: AccountType,
    pub recipient: Address,
    pub recipient_type: AccountType,
    #[serde_as(as = "DisplayFromStr")]
    pub value: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub fee: u128,
    pub validity_start_height: u32,
    pub network_id: u8,
    pub flags: u8,
    #[serde_as(as = "Hex")]
    pub data: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub proof: Vec<u8>,
    #[serde(default)]
    pub size: usize,
}

impl From<Transaction> for PlainTransaction {
    fn from(tx: Transaction) -> Self {
        PlainTransaction {
            transaction_hash: Some(tx.hash()),
            format: tx.format,
            sender: tx.sender,
            sender_type: tx.sender_type,
            recipient: tx.recipient,
            recipient_type: tx.recipient_type,
            value: tx.value,
            fee: tx.fee,
            validity_start_height: tx.validity_start_height,
            network_id: tx.network_id,
            flags: tx.flags.bits(),
            size: tx.serialized_size(),
            data: tx.data,
            proof: tx.proof,
        }
    }
}

/// Hash and size are derived values and are ignored on the way in.
impl TryFrom<PlainTransaction> for Transaction {
    type Error = TransactionError;

    fn try_from(plain: PlainTransaction) -> Result<Self, Self::Error> {
        Transaction::from_parts(
            plain.format,
            plain.sender,
            plain.sender_type,
            plain.recipient,
            plain.recipient_type,
            plain.value,
            plain.fee,
            plain.validity_start_height,
            plain.network_id,
            TransactionFlags::try_from(plain.flags)?,
            plain.data,
            plain.proof,
        )
    }
}
