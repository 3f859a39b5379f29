use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use super::{verify_contract_incoming_transaction, AccountError, AccountType};
use crate::primitives::{Address, SignatureProof};
use crate::serial::{SerialBuffer, SerialDecode, SerialEncode, SerialError};
use crate::transactions::Transaction;

/// Creation data layouts, by length.
const DATA_STEP_BLOCKS: usize = Address::SIZE + 4;
const DATA_STEP_AMOUNT: usize = Address::SIZE + 4 + 4 + 16;
const DATA_TOTAL_AMOUNT: usize = Address::SIZE + 4 + 4 + 16 + 16;

/// Funds that unlock in steps of `vesting_step_amount` every
/// `vesting_step_blocks` blocks after `vesting_start`. Only `owner` may
/// withdraw, and never below the still-locked amount.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VestingContract {
    #[serde_as(as = "DisplayFromStr")]
    pub(crate) balance: u128,
    pub(crate) owner: Address,
    pub(crate) vesting_start: u32,
    pub(crate) vesting_step_blocks: u32,
    #[serde_as(as = "DisplayFromStr")]
    pub(crate) vesting_step_amount: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub(crate) vesting_total_amount: u128,
}

impl VestingContract {
    pub fn new(
        balance: u128,
        owner: Address,
        vesting_start: u32,
        vesting_step_blocks: u32,
        vesting_step_amount: u128,
        vesting_total_amount: u128,
    ) -> Self {
        VestingContract {
            balance,
            owner,
            vesting_start,
            vesting_step_blocks,
            vesting_step_amount,
            vesting_total_amount,
        }
    }

    pub fn create(
        balance: u128,
        _block_height: u32,
        transaction: &Transaction,
    ) -> Result<Self, AccountError> {
        let data = transaction.data();
        let mut buf = SerialBuffer::from_bytes(data);
        let owner = Address::unserialize(&mut buf)?;
        let total = transaction.value();
        let contract = match data.len() {
            // Everything vests at once after `step_blocks`.
            DATA_STEP_BLOCKS => {
                let step_blocks = buf.read_u32()?;
                VestingContract::new(balance, owner, 0, step_blocks, total, total)
            }
            DATA_STEP_AMOUNT => {
                let start = buf.read_u32()?;
                let step_blocks = buf.read_u32()?;
                let step_amount = buf.read_u128()?;
                VestingContract::new(balance, owner, start, step_blocks, step_amount, total)
            }
            // The total may differ from the value, leaving part of it liquid.
            DATA_TOTAL_AMOUNT => {
                let start = buf.read_u32()?;
                let step_blocks = buf.read_u32()?;
                let step_amount = buf.read_u128()?;
                let total = buf.read_u128()?;
                VestingContract::new(balance, owner, start, step_blocks, step_amount, total)
            }
            other => {
                return Err(AccountError::InvalidData(format!(
                    "vesting data of {} bytes",
                    other
                )))
            }
        };
        Ok(contract)
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn vesting_start(&self) -> u32 {
        self.vesting_start
    }

    pub fn vesting_step_blocks(&self) -> u32 {
        self.vesting_step_blocks
    }

    pub fn vesting_step_amount(&self) -> u128 {
        self.vesting_step_amount
    }

    pub fn vesting_total_amount(&self) -> u128 {
        self.vesting_total_amount
    }

    /// Amount still locked at `block_height`.
    pub fn min_cap(&self, block_height: u32) -> u128 {
        if self.vesting_step_blocks == 0 || self.vesting_step_amount == 0 {
            return 0;
        }
        let step_blocks = i64::from(self.vesting_step_blocks);
        let elapsed = i64::from(block_height) - i64::from(self.vesting_start);
        let steps = elapsed.div_euclid(step_blocks);
        if steps < 0 {
            // Before the start nothing has vested yet.
            let extra = self.vesting_step_amount.saturating_mul(steps.unsigned_abs().into());
            return self.vesting_total_amount.saturating_add(extra);
        }
        let vested = self.vesting_step_amount.saturating_mul(steps.unsigned_abs().into());
        self.vesting_total_amount.saturating_sub(vested)
    }

    /// The proof must be a single signature proof over the content, with no
    /// trailing bytes. Ownership is checked when the transaction is applied.
    pub fn verify_outgoing_transaction(transaction: &Transaction) -> bool {
        let mut buf = SerialBuffer::from_bytes(transaction.proof());
        let proof = match SignatureProof::unserialize(&mut buf) {
            Ok(proof) => proof,
            Err(_) => return false,
        };
        proof.verify(None, &transaction.serialize_content()) && buf.remaining() == 0
    }

    pub fn verify_incoming_transaction(transaction: &Transaction) -> bool {
        match transaction.data().len() {
            DATA_STEP_BLOCKS | DATA_STEP_AMOUNT | DATA_TOTAL_AMOUNT => {
                verify_contract_incoming_transaction(transaction)
            }
            _ => false,
        }
    }

    pub(super) fn check_outgoing_transaction(
        &self,
        transaction: &Transaction,
        block_height: u32,
        revert: bool,
    ) -> Result<(), AccountError> {
        if revert {
            return Ok(());
        }
        let new_balance = self
            .balance
            .checked_sub(transaction.value())
            .and_then(|balance| balance.checked_sub(transaction.fee()))
            .ok_or(AccountError::Balance)?;
        if new_balance < self.min_cap(block_height) {
            return Err(AccountError::Balance);
        }

        let proof = SignatureProof::decode(transaction.proof()).map_err(|_| AccountError::Proof)?;
        if !proof.is_signed_by(&self.owner) {
            return Err(AccountError::Proof);
        }
        Ok(())
    }

    pub(super) fn unserialize_fields(
        buf: &mut SerialBuffer,
        balance: u128,
    ) -> Result<Self, SerialError> {
        Ok(VestingContract {
            balance,
            owner: Address::unserialize(buf)?,
            vesting_start: buf.read_u32()?,
            vesting_step_blocks: buf.read_u32()?,
            vesting_step_amount: buf.read_u128()?,
            vesting_total_amount: buf.read_u128()?,
        })
    }
}

impl SerialEncode for VestingContract {
    fn serialize_to(&self, buf: &mut SerialBuffer) {
        buf.write_u8(AccountType::Vesting as u8);
        buf.write_u128(self.balance);
        self.owner.serialize_to(buf);
        buf.write_u32(self.vesting_start);
        buf.write_u32(self.vesting_step_blocks);
        buf.write_u128(self.vesting_step_amount);
        buf.write_u128(self.vesting_total_amount);
    }

    fn serialized_size(&self) -> usize {
        1 + 16 + Address::SIZE + 4 + 4 + 16 + 16
    }
}
