//! Block implementation for the ledger
//!
//! A block contains a header with metadata and a list of transactions.
//! The header hash is SHA-256 over a compact JSON object whose keys are in
//! lexicographic order: `index, merkle_root, nonce, previous_hash, timestamp`.

use crate::core::transaction::Transaction;
use crate::crypto::{merkle_root, sha256_hex};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Block header containing metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Position in the chain, starting at 1 for genesis
    pub index: u64,
    /// Hash of the previous header; `None` only for genesis
    pub previous_hash: Option<String>,
    /// Merkle root of the transaction signing payloads
    pub merkle_root: Option<String>,
    /// Nonce used for proof of work
    pub nonce: u64,
    /// Creation time in fractional UNIX seconds
    pub timestamp: f64,
}

/// Hashing view with keys in sorted order
#[derive(Serialize)]
struct HeaderEncoding<'a> {
    index: u64,
    merkle_root: &'a Option<String>,
    nonce: u64,
    previous_hash: &'a Option<String>,
    timestamp: f64,
}

impl BlockHeader {
    pub fn new(index: u64, previous_hash: Option<String>, merkle_root: Option<String>) -> Self {
        Self {
            index,
            previous_hash,
            merkle_root,
            nonce: 0,
            timestamp: now_timestamp(),
        }
    }

    /// Canonical header encoding
    pub fn encode(&self) -> Vec<u8> {
        let encoding = HeaderEncoding {
            index: self.index,
            merkle_root: &self.merkle_root,
            nonce: self.nonce,
            previous_hash: &self.previous_hash,
            timestamp: self.timestamp,
        };
        // numbers and optional strings only: serialisation cannot fail
        serde_json::to_vec(&encoding).unwrap_or_default()
    }

    /// Calculate the hash of the block header
    pub fn hash(&self) -> String {
        sha256_hex(&self.encode())
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash.is_none()
    }
}

/// A block in the chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    /// Arena slot of the predecessor, set when the block is linked in
    #[serde(skip)]
    pub previous_block: Option<usize>,
}

impl Block {
    /// Create a new (unmined) block over `transactions`
    pub fn new(index: u64, previous_hash: Option<String>, transactions: Vec<Transaction>) -> Self {
        let merkle_root = Self::calculate_merkle_root(&transactions);
        Self {
            header: BlockHeader::new(index, previous_hash, merkle_root),
            transactions,
            previous_block: None,
        }
    }

    /// Calculate the merkle root from transactions
    pub fn calculate_merkle_root(transactions: &[Transaction]) -> Option<String> {
        let leaves: Vec<Vec<u8>> = transactions
            .iter()
            .map(Transaction::signing_payload)
            .collect();
        merkle_root(&leaves)
    }

    /// Verify the block's merkle root
    pub fn verify_merkle_root(&self) -> bool {
        match &self.header.merkle_root {
            Some(root) => Self::calculate_merkle_root(&self.transactions).as_ref() == Some(root),
            None => false,
        }
    }

    pub fn hash(&self) -> String {
        self.header.hash()
    }

    /// Find a transaction in this block by its hash
    pub fn find_transaction(&self, tx_hash: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.hash() == tx_hash)
    }

    /// Coinbase transactions carried by this block
    pub fn coinbase_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|tx| tx.is_coin_base)
    }

    /// Get number of transactions in this block
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.transactions == other.transactions
    }
}

/// Current time as fractional UNIX seconds
pub fn now_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encoding_sorted_keys() {
        let header = BlockHeader {
            index: 2,
            previous_hash: Some("ab".to_string()),
            merkle_root: None,
            nonce: 5,
            timestamp: 1.5,
        };
        assert_eq!(
            String::from_utf8(header.encode()).unwrap(),
            r#"{"index":2,"merkle_root":null,"nonce":5,"previous_hash":"ab","timestamp":1.5}"#
        );
    }

    #[test]
    fn test_header_hash_covers_nonce() {
        let mut header = BlockHeader::new(1, None, Some("root".to_string()));
        let before = header.hash();
        header.nonce += 1;
        assert_ne!(header.hash(), before);
    }

    #[test]
    fn test_merkle_root_verification() {
        let mut block = Block::new(1, None, vec![Transaction::coinbase("addr1", 50)]);
        assert!(block.verify_merkle_root());

        block.transactions[0].outputs[0].amount = 5000;
        assert!(!block.verify_merkle_root());
    }

    #[test]
    fn test_find_transaction() {
        let tx = Transaction::coinbase("addr1", 50);
        let hash = tx.hash();
        let block = Block::new(1, None, vec![tx]);

        assert!(block.find_transaction(&hash).is_some());
        assert!(block.find_transaction("missing").is_none());
        assert_eq!(block.coinbase_transactions().count(), 1);
    }

    #[test]
    fn test_block_json_roundtrip_drops_link() {
        let mut block = Block::new(3, Some("prev".to_string()), vec![Transaction::coinbase("a", 1)]);
        block.previous_block = Some(1);

        let json = serde_json::to_string(&block).unwrap();
        let back: Block = serde_json::from_str(&json).unwrap();

        assert_eq!(back, block);
        assert_eq!(back.previous_block, None);
        assert_eq!(back.hash(), block.hash());
    }
}
