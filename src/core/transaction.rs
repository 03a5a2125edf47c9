//! Transaction handling for the ledger
//!
//! Implements a UTXO-based transaction model. Each input points at an output
//! of an earlier transaction and carries an unlocking script; each output
//! carries an amount and a locking script naming a public-key hash.
//!
//! The transaction hash is the SHA-256 of the *signing payload*: a compact
//! JSON encoding of the inputs (without their unlocking scripts) and the
//! outputs. Because scripts are excluded, a transaction can be hashed and
//! signed before any unlocking script is attached, and attaching one never
//! changes the hash.

use crate::core::script::Script;
use crate::crypto::{sha256_hex, KeyError, KeyPair};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Outpoints
// =============================================================================

/// Reference to one output of an earlier transaction.
///
/// Field order is part of the signing payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub transaction_hash: String,
    pub output_index: u32,
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_hash, self.output_index)
    }
}

impl OutPoint {
    pub fn new(transaction_hash: impl Into<String>, output_index: u32) -> Self {
        Self {
            transaction_hash: transaction_hash.into(),
            output_index,
        }
    }
}

// =============================================================================
// Transaction Input
// =============================================================================

/// Transaction input (reference to previous output)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionInput {
    /// Hash of the transaction that produced the output being spent
    pub transaction_hash: String,
    /// Index of the output in that transaction
    pub output_index: u32,
    /// Empty until the input is signed
    #[serde(default)]
    pub unlocking_script: String,
}

impl TransactionInput {
    pub fn new(transaction_hash: impl Into<String>, output_index: u32) -> Self {
        Self {
            transaction_hash: transaction_hash.into(),
            output_index,
            unlocking_script: String::new(),
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.transaction_hash.clone(), self.output_index)
    }

    pub fn is_signed(&self) -> bool {
        !self.unlocking_script.is_empty()
    }
}

// =============================================================================
// Transaction Output
// =============================================================================

/// Transaction output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionOutput {
    /// Amount of coins
    pub amount: u64,
    /// Hash of the public key allowed to spend this output
    pub public_key_hash: String,
    /// Locking program executed after the spender's unlocking script
    pub locking_script: String,
}

impl TransactionOutput {
    /// Create a pay-to-public-key-hash output
    pub fn new(public_key_hash: impl Into<String>, amount: u64) -> Self {
        let public_key_hash = public_key_hash.into();
        let locking_script = Script::pay_to_public_key_hash(&public_key_hash).to_string();
        Self {
            amount,
            public_key_hash,
            locking_script,
        }
    }

    /// Check if this output is locked to the given public-key hash
    pub fn is_locked_to(&self, public_key_hash: &str) -> bool {
        self.public_key_hash == public_key_hash
    }
}

/// Script-stripped view that gets hashed and signed
#[derive(Serialize)]
struct SigningPayload<'a> {
    inputs: Vec<OutPoint>,
    outputs: &'a [TransactionOutput],
}

// =============================================================================
// Transaction
// =============================================================================

/// A ledger transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    /// Whether this is a coinbase (mining reward) transaction
    #[serde(default)]
    pub is_coin_base: bool,
}

impl Transaction {
    /// Create a new transaction (unsigned)
    pub fn new(inputs: Vec<TransactionInput>, outputs: Vec<TransactionOutput>) -> Self {
        Self {
            inputs,
            outputs,
            is_coin_base: false,
        }
    }

    /// Create a coinbase (mining reward) transaction
    pub fn coinbase(public_key_hash: &str, amount: u64) -> Self {
        Self {
            inputs: Vec::new(),
            outputs: vec![TransactionOutput::new(public_key_hash, amount)],
            is_coin_base: true,
        }
    }

    /// Canonical script-stripped encoding; this is what gets signed
    pub fn signing_payload(&self) -> Vec<u8> {
        let payload = SigningPayload {
            inputs: self.inputs.iter().map(TransactionInput::outpoint).collect(),
            outputs: &self.outputs,
        };
        // strings and integers only: serialisation cannot fail
        serde_json::to_vec(&payload).unwrap_or_default()
    }

    /// Transaction hash over the signing payload
    pub fn hash(&self) -> String {
        sha256_hex(&self.signing_payload())
    }

    /// Sign every input with `owner`, attaching `<signature> <public key>`
    pub fn sign_inputs(&mut self, owner: &KeyPair) -> Result<(), KeyError> {
        let signature = owner.sign(&self.signing_payload())?;
        let unlocking_script =
            Script::signature_unlock(&signature, &owner.public_key_hex()).to_string();

        for input in &mut self.inputs {
            input.unlocking_script = unlocking_script.clone();
        }
        Ok(())
    }

    /// Get total output amount
    pub fn total_output(&self) -> u64 {
        self.outputs.iter().map(|o| o.amount).sum()
    }

    /// Outpoints this transaction spends
    pub fn outpoints(&self) -> impl Iterator<Item = OutPoint> + '_ {
        self.inputs.iter().map(TransactionInput::outpoint)
    }

    /// Whether any input spends `outpoint`
    pub fn spends(&self, outpoint: &OutPoint) -> bool {
        self.inputs.iter().any(|i| {
            i.output_index == outpoint.output_index
                && i.transaction_hash == outpoint.transaction_hash
        })
    }
}
