//! Cryptographic hashing utilities for the ledger
//!
//! Every hash in the ledger is rendered as a lowercase hex digest. Block
//! headers, transactions, Merkle nodes and gossip message ids use SHA-256;
//! public-key hashes apply RIPEMD-160 on top of the SHA-256 hex digest.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Computes RIPEMD-160 hash and returns it as a hex string
pub fn ripemd160_hex(data: &[u8]) -> String {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash-of-hash used for spending destinations.
///
/// The RIPEMD-160 is taken over the *text* of the SHA-256 hex digest, so the
/// same value is produced whether the input came off a script stack or from a
/// wallet.
pub fn hash160(data: &[u8]) -> String {
    ripemd160_hex(sha256_hex(data).as_bytes())
}

/// Checks whether a hex digest starts with `zeros` `'0'` characters
pub fn has_leading_zeros(hash_hex: &str, zeros: usize) -> bool {
    hash_hex.len() >= zeros && hash_hex.bytes().take(zeros).all(|b| b == b'0')
}
