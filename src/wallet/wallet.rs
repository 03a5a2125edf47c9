//! Wallet implementation for the ledger
//!
//! A wallet is a signing identity plus helpers to find its coins on a chain
//! and build signed payments from them.

use crate::core::{
    Blockchain, Transaction, TransactionInput, TransactionOutput, Utxo,
};
use crate::crypto::{KeyError, KeyPair};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File name of the node wallet inside the data directory
pub const WALLET_FILE: &str = "wallet.json";

/// Wallet-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("Amount overflow")]
    AmountOverflow,
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
}

/// Serializable wallet data for persistence
#[derive(Debug, Serialize, Deserialize)]
struct WalletData {
    private_key_hex: String,
    public_key_hash: String,
}

/// A signing identity that owns coins on the ledger
#[derive(Clone)]
pub struct Wallet {
    key_pair: KeyPair,
}

impl Wallet {
    /// Create a new wallet with a fresh key pair
    pub fn new() -> Self {
        Self {
            key_pair: KeyPair::generate(),
        }
    }

    /// Import a wallet from a private key
    pub fn from_private_key(private_key_hex: &str) -> Result<Self, WalletError> {
        let key_pair = KeyPair::from_private_key_hex(private_key_hex)?;
        Ok(Self { key_pair })
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Compressed public key (hex)
    pub fn public_key_hex(&self) -> String {
        self.key_pair.public_key_hex()
    }

    /// Destination hash that outputs are locked to
    pub fn public_key_hash(&self) -> String {
        self.key_pair.public_key_hash()
    }

    /// Base58 rendering of the public-key hash
    pub fn address(&self) -> String {
        let pkh = self.public_key_hash();
        let bytes = hex::decode(&pkh).unwrap_or_else(|_| pkh.into_bytes());
        bs58::encode(bytes).into_string()
    }

    /// Get the wallet's private key (hex)
    /// WARNING: Keep this secret!
    pub fn private_key(&self) -> String {
        self.key_pair.private_key_hex()
    }

    /// Sign every input of `tx` with this wallet's key
    pub fn sign_inputs(&self, tx: &mut Transaction) -> Result<(), WalletError> {
        tx.sign_inputs(&self.key_pair)?;
        Ok(())
    }

    /// Get UTXOs owned by this wallet
    pub fn utxos(&self, chain: &Blockchain) -> Vec<Utxo> {
        chain.unspent_outputs(&self.public_key_hash())
    }

    /// Get the balance from the chain
    pub fn balance(&self, chain: &Blockchain) -> u64 {
        chain.balance(&self.public_key_hash())
    }

    /// Build and sign a payment of `amount` to `recipient_hash`, leaving
    /// `fee` unclaimed and returning any change to this wallet
    pub fn create_payment(
        &self,
        chain: &Blockchain,
        recipient_hash: &str,
        amount: u64,
        fee: u64,
    ) -> Result<Transaction, WalletError> {
        let need = amount.checked_add(fee).ok_or(WalletError::AmountOverflow)?;
        let utxos = self.utxos(chain);
        let have: u64 = utxos.iter().map(|u| u.output.amount).sum();

        if have < need {
            return Err(WalletError::InsufficientFunds { have, need });
        }

        // Select UTXOs to cover the amount
        let mut inputs = Vec::new();
        let mut selected = 0u64;
        for utxo in utxos {
            inputs.push(TransactionInput::new(
                utxo.outpoint.transaction_hash,
                utxo.outpoint.output_index,
            ));
            selected += utxo.output.amount;
            if selected >= need {
                break;
            }
        }

        let mut outputs = vec![TransactionOutput::new(recipient_hash, amount)];
        let change = selected - need;
        if change > 0 {
            outputs.push(TransactionOutput::new(self.public_key_hash(), change));
        }

        let mut tx = Transaction::new(inputs, outputs);
        self.sign_inputs(&mut tx)?;
        Ok(tx)
    }

    /// Save wallet to file
    pub fn save(&self, path: &Path) -> Result<(), WalletError> {
        let data = WalletData {
            private_key_hex: self.private_key(),
            public_key_hash: self.public_key_hash(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&data)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load wallet from file
    pub fn load(path: &Path) -> Result<Self, WalletError> {
        let json = fs::read_to_string(path)?;
        let data: WalletData = serde_json::from_str(&json)?;
        Self::from_private_key(&data.private_key_hex)
    }

    /// Load the wallet at `path`, creating and saving a fresh one if absent
    pub fn load_or_create(path: &Path) -> Result<Self, WalletError> {
        if path.exists() {
            return Self::load(path);
        }
        let wallet = Self::new();
        wallet.save(path)?;
        log::info!("Created new wallet {}", wallet.address());
        Ok(wallet)
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConsensusParams, FundsPolicy};
    use crate::mining::Miner;

    fn funded(wallet: &Wallet, blocks: usize) -> Blockchain {
        let mut chain = Blockchain::new(ConsensusParams {
            difficulty: 1,
            block_reward: 40,
            funds_policy: FundsPolicy::AllowFee,
        });
        // distinct payees keep coinbase hashes distinct
        for i in 0..blocks {
            let payee = if i == 0 {
                wallet.public_key_hash()
            } else {
                format!("filler{}", i)
            };
            Miner::new(payee).mine_block(&mut chain, vec![]).unwrap();
        }
        chain
    }

    #[test]
    fn test_wallet_creation() {
        let wallet = Wallet::new();
        assert_eq!(wallet.public_key_hash().len(), 40);
        assert_eq!(wallet.public_key_hex().len(), 66);
        assert!(!wallet.address().is_empty());
        assert!(!wallet.private_key().is_empty());
    }

    #[test]
    fn test_wallet_import() {
        let wallet1 = Wallet::new();
        let wallet2 = Wallet::from_private_key(&wallet1.private_key()).unwrap();
        assert_eq!(wallet1.public_key_hash(), wallet2.public_key_hash());
        assert_eq!(wallet1.address(), wallet2.address());
    }

    #[test]
    fn test_wallet_save_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(WALLET_FILE);

        let wallet1 = Wallet::load_or_create(&path).unwrap();
        let wallet2 = Wallet::load_or_create(&path).unwrap();
        assert_eq!(wallet1.public_key_hash(), wallet2.public_key_hash());
    }

    #[test]
    fn test_create_payment_with_change() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let chain = funded(&alice, 1);
        assert_eq!(alice.balance(&chain), 40);

        let tx = alice
            .create_payment(&chain, &bob.public_key_hash(), 25, 5)
            .unwrap();

        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs[0].amount, 25);
        assert_eq!(tx.outputs[1].amount, 10);
        assert!(tx.outputs[1].is_locked_to(&alice.public_key_hash()));
        assert!(tx.inputs.iter().all(|i| i.is_signed()));
        assert_eq!(
            crate::core::TransactionValidator::new(&chain).validate(&tx),
            Ok(5)
        );
    }

    #[test]
    fn test_create_payment_exact_has_no_change() {
        let alice = Wallet::new();
        let chain = funded(&alice, 1);

        let tx = alice.create_payment(&chain, "bob", 40, 0).unwrap();
        assert_eq!(tx.outputs.len(), 1);
    }

    #[test]
    fn test_create_payment_insufficient_funds() {
        let alice = Wallet::new();
        let chain = funded(&alice, 2);

        assert!(matches!(
            alice.create_payment(&chain, "bob", 40, 1),
            Err(WalletError::InsufficientFunds { have: 40, need: 41 })
        ));
    }
}
