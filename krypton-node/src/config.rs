use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use krypton_core::genesis::GenesisConfig;
use krypton_core::mempool::MempoolConfig;
use krypton_core::primitives::Address;
use krypton_core::subscription::Subscription;
use krypton_core::utils::Saveable;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NodeConfig {
    /// `main`, `test`, `dev` or a numeric network id.
    #[serde(default = "default_network")]
    pub network: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// A JSON genesis file replacing the built-in network preset.
    #[serde(default)]
    pub genesis_file: Option<PathBuf>,

    #[serde(default = "default_verify_pow")]
    pub verify_pow: bool,

    /// Mempool events touching these addresses are logged at `info`. Empty
    /// means every event.
    #[serde(default)]
    pub subscription_addresses: Vec<Address>,

    #[serde(default)]
    pub mempool: MempoolConfig,
}

fn default_network() -> String {
    "test".to_string()
}
fn default_port() -> u16 {
    8648
}
fn default_verify_pow() -> bool {
    true
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            network: default_network(),
            port: default_port(),
            genesis_file: None,
            verify_pow: default_verify_pow(),
            subscription_addresses: Vec::new(),
            mempool: MempoolConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn genesis(&self) -> Result<GenesisConfig> {
        match &self.genesis_file {
            Some(path) => GenesisConfig::load_from_file(path)
                .with_context(|| format!("Failed to load genesis file {}", path.display())),
            None => GenesisConfig::from_any(&self.network),
        }
    }

    pub fn subscription(&self) -> Subscription {
        if self.subscription_addresses.is_empty() {
            Subscription::Any
        } else {
            Subscription::from_addresses(self.subscription_addresses.iter().copied())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krypton_core::primitives::Hash;

    #[test]
    fn test_defaults() {
        let config: NodeConfig = toml::from_str("").unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.port, 8648);
        assert_eq!(config.genesis().unwrap().network_id, krypton_core::NETWORK_ID_TEST);
        assert_eq!(config.subscription(), Subscription::Any);
    }

    #[test]
    fn test_full_file() {
        let address = Address::from_hash(&Hash::light(b"watched"));
        let config: NodeConfig = toml::from_str(&format!(
            r#"
            network = "dev"
            port = 9100
            verify_pow = false
            subscription_addresses = ["{}"]

            [mempool]
            transactions_per_sender_max = 50

            [mempool.filter]
            fee = "10"
            "#,
            address.to_hex()
        ))
        .unwrap();
        assert_eq!(config.port, 9100);
        assert!(!config.verify_pow);
        assert_eq!(config.genesis().unwrap().network_id, krypton_core::NETWORK_ID_DEV);
        assert_eq!(config.mempool.transactions_per_sender_max, 50);
        assert_eq!(config.mempool.filter.fee, 10);
        assert_eq!(config.subscription(), Subscription::from_addresses([address]));
    }

    #[test]
    fn test_unknown_network() {
        let config = NodeConfig {
            network: "nowhere".to_string(),
            ..NodeConfig::default()
        };
        assert!(config.genesis().is_err());
    }
}
