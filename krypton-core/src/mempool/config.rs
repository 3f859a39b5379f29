use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

pub const TRANSACTION_RELAY_FEE_MIN: u128 = 1;
pub const TRANSACTIONS_PER_SENDER_MAX: usize = 2100;
pub const FREE_TRANSACTIONS_PER_SENDER_MAX: usize = 10;
pub const SIZE_MAX: usize = 2_100_000;
pub const BLACKLIST_SIZE: usize = 25_000;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MempoolConfig {
    /// Maximum number of transactions in the pool.
    #[serde(default = "default_size_max")]
    pub size_max: usize,

    #[serde(default = "default_transactions_per_sender_max")]
    pub transactions_per_sender_max: usize,

    /// Senders holding this many transactions below the relay fee get
    /// `FeeTooLow` for further free ones. `None` disables the limit.
    #[serde(default)]
    pub free_transactions_per_sender_max: Option<usize>,

    /// Satoshis per byte.
    #[serde(default = "default_transaction_relay_fee_min")]
    pub transaction_relay_fee_min: u128,

    #[serde(default)]
    pub filter: FilterRules,
}

fn default_size_max() -> usize {
    SIZE_MAX
}
fn default_transactions_per_sender_max() -> usize {
    TRANSACTIONS_PER_SENDER_MAX
}
fn default_transaction_relay_fee_min() -> u128 {
    TRANSACTION_RELAY_FEE_MIN
}

impl Default for MempoolConfig {
    fn default() -> Self {
        MempoolConfig {
            size_max: default_size_max(),
            transactions_per_sender_max: default_transactions_per_sender_max(),
            free_transactions_per_sender_max: None,
            transaction_relay_fee_min: default_transaction_relay_fee_min(),
            filter: FilterRules::default(),
        }
    }
}

/// Thresholds applied by `MempoolFilter`. Amounts are in satoshis, fee rates
/// in satoshis per byte; all default to zero.
#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct FilterRules {
    #[serde_as(as = "DisplayFromStr")]
    pub fee: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub value: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub total_value: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub recipient_balance: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub sender_balance: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub creation_fee: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub creation_fee_per_byte: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub creation_value: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub contract_fee: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub contract_fee_per_byte: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub contract_value: u128,
    pub blacklist_size: usize,
}

impl Default for FilterRules {
    fn default() -> Self {
        FilterRules {
            fee: 0,
            value: 0,
            total_value: 0,
            recipient_balance: 0,
            sender_balance: 0,
            creation_fee: 0,
            creation_fee_per_byte: 0,
            creation_value: 0,
            contract_fee: 0,
            contract_fee_per_byte: 0,
            contract_value: 0,
            blacklist_size: BLACKLIST_SIZE,
        }
    }
}
