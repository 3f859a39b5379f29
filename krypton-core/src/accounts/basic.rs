use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use super::{AccountError, AccountType};
use crate::primitives::SignatureProof;
use crate::serial::{SerialBuffer, SerialEncode};
use crate::transactions::{Transaction, TransactionFlags};

/// Incoming data larger than this is refused by basic accounts.
pub const MAX_INCOMING_DATA_SIZE: usize = 64;

/// A plain account that sends with its key's signature and receives anything.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAccount {
    #[serde_as(as = "DisplayFromStr")]
    pub(crate) balance: u128,
}

impl BasicAccount {
    pub fn new(balance: u128) -> Self {
        BasicAccount { balance }
    }

    pub fn balance(&self) -> u128 {
        self.balance
    }

    pub fn verify_outgoing_transaction(transaction: &Transaction) -> bool {
        SignatureProof::verify_transaction(transaction)
    }

    pub fn verify_incoming_transaction(transaction: &Transaction) -> bool {
        transaction.data().len() <= MAX_INCOMING_DATA_SIZE
    }

    /// The creation flag must be set exactly when the transaction turns this
    /// account into a contract.
    pub(super) fn check_incoming_transaction(
        &self,
        transaction: &Transaction,
        _block_height: u32,
        revert: bool,
    ) -> Result<(), AccountError> {
        if !revert {
            let is_contract_creation = transaction.has_flag(TransactionFlags::CONTRACT_CREATION);
            let is_type_change = transaction.recipient_type() != AccountType::Basic;
            if is_contract_creation != is_type_change {
                return Err(AccountError::Data);
            }
        }
        Ok(())
    }
}

impl SerialEncode for BasicAccount {
    fn serialize_to(&self, buf: &mut SerialBuffer) {
        buf.write_u8(AccountType::Basic as u8);
        buf.write_u128(self.balance);
    }

    fn serialized_size(&self) -> usize {
        1 + 16
    }
}
