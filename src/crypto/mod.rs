//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - SHA-256 / RIPEMD-160 hashing
//! - ECDSA signing identity (secp256k1)
//! - Merkle tree calculations

pub mod hash;
pub mod keys;
pub mod merkle;

pub use hash::{has_leading_zeros, hash160, ripemd160_hex, sha256, sha256_hex};
pub use keys::{public_key_from_hex, public_key_hash, verify_signature, KeyError, KeyPair};
pub use merkle::{merkle_root, MerkleNode, MerkleTree};
