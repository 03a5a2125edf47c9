//! ECDSA signing identity for the ledger
//!
//! Provides key pair generation, signing, and verification using
//! the secp256k1 elliptic curve. Signatures and public keys travel through
//! scripts as hex text, so the helpers here speak hex.

use rand::rngs::OsRng;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

use super::hash::{hash160, sha256};

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the private key as a hex string
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Get the public key as a hex string (compressed format)
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// Hash of the public key that outputs lock to
    pub fn public_key_hash(&self) -> String {
        public_key_hash(&self.public_key_hex())
    }

    /// Sign arbitrary bytes, returning a hex-encoded compact signature
    pub fn sign(&self, data: &[u8]) -> Result<String, KeyError> {
        let secp = Secp256k1::new();
        let message = Message::from_digest_slice(&sha256(data))?;
        let signature = secp.sign_ecdsa(&message, &self.secret_key);
        Ok(hex::encode(signature.serialize_compact()))
    }

    /// Verify a hex signature over `data` against a hex public key.
    ///
    /// Malformed keys or signatures verify as `false`.
    pub fn verify(signature_hex: &str, public_key_hex: &str, data: &[u8]) -> bool {
        match verify_signature(signature_hex, public_key_hex, data) {
            Ok(valid) => valid,
            Err(e) => {
                log::debug!("Signature verification error: {}", e);
                false
            }
        }
    }
}

/// Derive the spending destination for a hex public key
pub fn public_key_hash(public_key_hex: &str) -> String {
    hash160(public_key_hex.as_bytes())
}

/// Parse a public key from hex string
pub fn public_key_from_hex(hex_key: &str) -> Result<PublicKey, KeyError> {
    let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPublicKey)?;
    PublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

/// Verify a signature against a public key
pub fn verify_signature(
    signature_hex: &str,
    public_key_hex: &str,
    data: &[u8],
) -> Result<bool, KeyError> {
    let secp = Secp256k1::new();
    let public_key = public_key_from_hex(public_key_hex)?;
    let bytes = hex::decode(signature_hex).map_err(|_| KeyError::InvalidSignature)?;
    let signature = Signature::from_compact(&bytes).map_err(|_| KeyError::InvalidSignature)?;
    let message = Message::from_digest_slice(&sha256(data))?;

    Ok(secp.verify_ecdsa(&message, &signature, &public_key).is_ok())
}
