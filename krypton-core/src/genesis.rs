use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use std::io::{Error as IoError, ErrorKind as IoErrorKind, Read, Result as IoResult, Write};

use crate::accounts::{Account, AccountStore};
use crate::block::{Block, BlockBody, BlockHeader};
use crate::primitives::{Address, Hash};
use crate::serial::{SerialBuffer, SerialDecode, SerialEncode, SerialError};
use crate::utils::Saveable;
use crate::{NETWORK_ID_DEV, NETWORK_ID_MAIN, NETWORK_ID_TEST};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GenesisAccount {
    pub address: Address,
    pub account: Account,
}

/// Everything needed to bootstrap a chain: which network it is and who holds
/// the coins at height 1.
#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GenesisConfig {
    pub network_id: u8,
    pub network_name: String,
    pub timestamp: u32,
    pub nonce: u32,
    #[serde_as(as = "Hex")]
    pub extra_data: Vec<u8>,
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
}

impl GenesisConfig {
    pub fn main() -> Self {
        GenesisConfig {
            network_id: NETWORK_ID_MAIN,
            network_name: "main".to_string(),
            timestamp: 1_727_060_400,
            nonce: 72_437,
            extra_data: b"QDEyMTFkbGM=".to_vec(),
            accounts: Vec::new(),
        }
    }

    pub fn test() -> Self {
        GenesisConfig {
            network_id: NETWORK_ID_TEST,
            network_name: "test".to_string(),
            timestamp: 1_720_681_200,
            nonce: 97_603,
            extra_data: b"TestNet".to_vec(),
            accounts: Vec::new(),
        }
    }

    pub fn dev() -> Self {
        GenesisConfig {
            network_id: NETWORK_ID_DEV,
            network_name: "dev".to_string(),
            timestamp: 1_522_338_300,
            nonce: 12_432,
            extra_data: b"DevNet".to_vec(),
            accounts: Vec::new(),
        }
    }

    /// Accepts a network name or its numeric id.
    pub fn from_any(network: &str) -> Result<Self> {
        let config = match network {
            "main" => Self::main(),
            "test" => Self::test(),
            "dev" => Self::dev(),
            other => {
                let id: u8 = other
                    .parse()
                    .map_err(|_| anyhow!("Unknown network '{}'", other))?;
                Self::from_network_id(id)?
            }
        };
        Ok(config)
    }

    pub fn from_network_id(network_id: u8) -> Result<Self> {
        [Self::main(), Self::test(), Self::dev()]
            .into_iter()
            .find(|config| config.network_id == network_id)
            .ok_or_else(|| anyhow!("Unable to find a network for id {}", network_id))
    }

    pub fn with_accounts(mut self, accounts: Vec<GenesisAccount>) -> Self {
        self.accounts = accounts;
        self
    }

    /// The compact account list form: `[count:u16]` followed by
    /// `[address][account]` entries.
    pub fn accounts_from_bytes(bytes: &[u8]) -> Result<Vec<GenesisAccount>, SerialError> {
        let mut buf = SerialBuffer::from_bytes(bytes);
        let count = buf.read_u16()?;
        (0..count)
            .map(|_| {
                Ok(GenesisAccount {
                    address: Address::unserialize(&mut buf)?,
                    account: Account::unserialize(&mut buf)?,
                })
            })
            .collect()
    }

    pub fn accounts_to_bytes(&self) -> Vec<u8> {
        let mut buf = SerialBuffer::new();
        buf.write_u16(self.accounts.len() as u16);
        for entry in &self.accounts {
            entry.address.serialize_to(&mut buf);
            entry.account.serialize_to(&mut buf);
        }
        buf.into_bytes()
    }

    pub fn account_store(&self) -> AccountStore {
        AccountStore::from_genesis(
            self.accounts
                .iter()
                .map(|entry| (entry.address, entry.account.clone())),
        )
    }

    /// The genesis block commits to the genesis account state; it is not
    /// applied to the accounts itself.
    pub fn genesis_block(&self, accounts_hash: Hash) -> Result<Block> {
        let body = BlockBody::new(Address::NULL, self.extra_data.clone(), Vec::new(), Vec::new())?;
        let header = BlockHeader {
            prev_hash: Hash::NULL,
            interlink_hash: Hash::NULL,
            body_hash: body.hash(),
            accounts_hash,
            height: 1,
            timestamp: self.timestamp,
            nonce: self.nonce,
            ..BlockHeader::default()
        };
        Ok(Block::new(header, body))
    }
}

impl Saveable for GenesisConfig {
    fn load<I: Read>(reader: I) -> IoResult<Self> {
        serde_json::from_reader(reader).map_err(|e| {
            IoError::new(
                IoErrorKind::InvalidData,
                format!("Failed to deserialize GenesisConfig: {}", e),
            )
        })
    }

    fn save<O: Write>(&self, writer: O) -> IoResult<()> {
        serde_json::to_writer_pretty(writer, self).map_err(|e| {
            IoError::new(
                IoErrorKind::InvalidData,
                format!("Failed to serialize GenesisConfig: {}", e),
            )
        })
    }
}
