pub mod accounts;
pub mod block;
pub mod blockchain;
pub mod currency;
pub mod genesis;
pub mod mempool;
pub mod network;
pub mod policy;
pub mod primitives;
pub mod serial;
pub mod subscription;
pub mod transaction_cache;
pub mod transactions;
pub mod utils;
pub mod wallet;

use serde::{Deserialize, Serialize};
use uint::construct_uint;

construct_uint! {
   #[derive(Serialize, Deserialize)]
   pub struct U256(4);
}

pub const NETWORK_ID_MAIN: u8 = 12;
pub const NETWORK_ID_TEST: u8 = 1;
pub const NETWORK_ID_DEV: u8 = 2;

pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024; // 10 MB
