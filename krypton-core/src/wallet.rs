use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{Error as IoError, ErrorKind as IoErrorKind, Read, Result as IoResult, Write};

use crate::primitives::{Address, KeyPair, PrivateKey, PublicKey, Signature, SignatureProof};
use crate::serial::SerialEncode;
use crate::transactions::{Transaction, TransactionFormat};
use crate::utils::Saveable;

/// A single key pair able to send from its basic account. Stored as plain
/// JSON; keeping the file safe is up to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    key_pair: KeyPair,
}

impl Wallet {
    pub fn generate() -> Self {
        Wallet {
            key_pair: KeyPair::generate(),
        }
    }

    pub fn from_key_pair(key_pair: KeyPair) -> Self {
        Wallet { key_pair }
    }

    /// Imports a hex encoded private key.
    pub fn from_private_key_hex(private_key: &str) -> Result<Self> {
        let private_key: PrivateKey = private_key.parse().context("Failed to import wallet")?;
        Ok(Wallet::from_key_pair(KeyPair::from_private_key(private_key)))
    }

    pub fn address(&self) -> Address {
        self.key_pair.address()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.key_pair.public_key
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// A signed basic transaction from this wallet. The fee follows
    /// `validity_start_height`.
    pub fn create_transaction(
        &self,
        recipient: Address,
        value: u128,
        validity_start_height: u32,
        network_id: u8,
    ) -> Result<Transaction> {
        let mut transaction = Transaction::new_basic(
            self.key_pair.public_key,
            recipient,
            value,
            validity_start_height,
            None,
            network_id,
        )?;
        self.sign_transaction(&mut transaction)?;
        Ok(transaction)
    }

    /// Signs `transaction` in place with a single-signature proof.
    pub fn sign_transaction(&self, transaction: &mut Transaction) -> Result<()> {
        let signature = Signature::create(
            &self.key_pair.private_key,
            &self.key_pair.public_key,
            &transaction.serialize_content(),
        )?;
        match transaction.format() {
            TransactionFormat::Basic => transaction.set_signature(signature)?,
            TransactionFormat::Extended => {
                let proof = SignatureProof::single_sig(self.key_pair.public_key, signature);
                transaction.set_proof(proof.to_bytes())?
            }
        }
        Ok(())
    }
}

impl Saveable for Wallet {
    fn load<I: Read>(reader: I) -> IoResult<Self> {
        serde_json::from_reader(reader).map_err(|e| {
            IoError::new(
                IoErrorKind::InvalidData,
                format!("Failed to deserialize Wallet: {}", e),
            )
        })
    }

    fn save<O: Write>(&self, writer: O) -> IoResult<()> {
        serde_json::to_writer_pretty(writer, self).map_err(|e| {
            IoError::new(
                IoErrorKind::InvalidData,
                format!("Failed to serialize Wallet: {}", e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::test_utils::recipient;
    use crate::accounts::AccountType;
    use crate::transactions::TransactionFlags;
    use crate::NETWORK_ID_TEST;

    #[test]
    fn test_created_transaction_verifies() {
        let wallet = Wallet::generate();
        let tx = wallet
            .create_transaction(recipient(), 500, 1, NETWORK_ID_TEST)
            .unwrap();
        assert_eq!(tx.sender(), &wallet.address());
        assert_eq!(tx.value(), 500);
        assert_eq!(tx.fee(), 0);
        assert!(tx.verify(NETWORK_ID_TEST));
    }

    #[test]
    fn test_signs_extended_transactions() {
        let wallet = Wallet::generate();
        let mut tx = Transaction::new_extended(
            wallet.address(),
            AccountType::Basic,
            recipient(),
            AccountType::Basic,
            500,
            2,
            TransactionFlags::NONE,
            b"memo".to_vec(),
            Vec::new(),
            NETWORK_ID_TEST,
        )
        .unwrap();
        assert!(!tx.verify(NETWORK_ID_TEST));

        let mut signed = tx.clone();
        wallet.sign_transaction(&mut signed).unwrap();
        assert!(signed.verify(NETWORK_ID_TEST));

        // Another wallet's proof does not authorize this sender.
        Wallet::generate().sign_transaction(&mut tx).unwrap();
        assert!(!tx.verify(NETWORK_ID_TEST));
    }

    #[test]
    fn test_import_and_save() {
        let wallet = Wallet::generate();
        let hex = wallet.key_pair().private_key.to_hex();
        let imported = Wallet::from_private_key_hex(&hex).unwrap();
        assert_eq!(imported, wallet);
        assert!(Wallet::from_private_key_hex("not hex").is_err());

        let mut file = Vec::new();
        wallet.save(&mut file).unwrap();
        assert_eq!(Wallet::load(file.as_slice()).unwrap(), wallet);
        assert!(Wallet::load(&b"{}"[..]).is_err());
    }
}
