//! Transaction validation against the chain
//!
//! Inputs are resolved by walking the chain from the tip backwards; the
//! referenced outputs fund the transaction and their locking scripts decide
//! whether the spender may use them.

use crate::config::{ConsensusParams, FundsPolicy};
use crate::core::blockchain::Blockchain;
use crate::core::script::{verify_spend, Script, ScriptError};
use crate::core::transaction::{OutPoint, Transaction};
use std::collections::HashSet;
use thiserror::Error;

/// Transaction-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Unresolved input: transaction {0} not found in chain")]
    UnresolvedInput(String),
    #[error("Transaction {transaction_hash} has no output {output_index}")]
    MissingOutput {
        transaction_hash: String,
        output_index: u32,
    },
    #[error("Output {0} already spent")]
    AlreadySpent(OutPoint),
    #[error("Output {0} spent twice")]
    DuplicateInput(OutPoint),
    #[error("Insufficient funds: inputs {total_in}, outputs {total_out}")]
    InsufficientFunds { total_in: u64, total_out: u64 },
    #[error("Unbalanced transaction: inputs {total_in}, outputs {total_out}")]
    Unbalanced { total_in: u64, total_out: u64 },
    #[error("Amount overflow")]
    AmountOverflow,
    #[error("Transaction has no inputs")]
    NoInputs,
    #[error("Invalid coinbase: {0}")]
    InvalidCoinbase(String),
    #[error("Script failed on input {index}: {source}")]
    Script {
        index: usize,
        #[source]
        source: ScriptError,
    },
}

/// Validates transactions against a snapshot of the chain
pub struct TransactionValidator<'a> {
    chain: &'a Blockchain,
    params: ConsensusParams,
}

impl<'a> TransactionValidator<'a> {
    pub fn new(chain: &'a Blockchain) -> Self {
        Self {
            chain,
            params: *chain.params(),
        }
    }

    /// Full validation: shape, funds and scripts. Returns the fee paid.
    pub fn validate(&self, tx: &Transaction) -> Result<u64, TransactionError> {
        if tx.is_coin_base {
            return self.validate_coinbase(tx).map(|_| 0);
        }

        self.validate_outpoints(tx)?;
        let fee = self.validate_funds(tx)?;
        self.validate_scripts(tx)?;
        Ok(fee)
    }

    /// Coinbase: no inputs, payout at least the block reward
    pub fn validate_coinbase(&self, tx: &Transaction) -> Result<(), TransactionError> {
        if !tx.inputs.is_empty() {
            return Err(TransactionError::InvalidCoinbase(
                "coinbase must not have inputs".to_string(),
            ));
        }
        let total_out = total_output(tx)?;
        if total_out < self.params.block_reward {
            return Err(TransactionError::InvalidCoinbase(format!(
                "payout {} below block reward {}",
                total_out, self.params.block_reward
            )));
        }
        Ok(())
    }

    /// Every input must be present, unique within the transaction and unspent in the chain
    pub fn validate_outpoints(&self, tx: &Transaction) -> Result<(), TransactionError> {
        if tx.inputs.is_empty() {
            return Err(TransactionError::NoInputs);
        }

        let mut seen = HashSet::with_capacity(tx.inputs.len());
        for outpoint in tx.outpoints() {
            if !seen.insert(outpoint.clone()) {
                return Err(TransactionError::DuplicateInput(outpoint));
            }
            if self.chain.is_spent(&outpoint) {
                return Err(TransactionError::AlreadySpent(outpoint));
            }
        }
        Ok(())
    }

    /// Sum of the amounts of the outputs this transaction spends
    pub fn total_input(&self, tx: &Transaction) -> Result<u64, TransactionError> {
        tx.outpoints().try_fold(0u64, |total, outpoint| {
            let output = self.chain.resolve_output(&outpoint)?;
            total
                .checked_add(output.amount)
                .ok_or(TransactionError::AmountOverflow)
        })
    }

    /// Check input/output balance under the configured policy; returns the fee
    pub fn validate_funds(&self, tx: &Transaction) -> Result<u64, TransactionError> {
        let total_in = self.total_input(tx)?;
        let total_out = total_output(tx)?;

        match self.params.funds_policy {
            FundsPolicy::AllowFee if total_in >= total_out => Ok(total_in - total_out),
            FundsPolicy::AllowFee => Err(TransactionError::InsufficientFunds {
                total_in,
                total_out,
            }),
            FundsPolicy::Exact if total_in == total_out => Ok(0),
            FundsPolicy::Exact => Err(TransactionError::Unbalanced {
                total_in,
                total_out,
            }),
        }
    }

    /// Run unlock-then-lock for every input
    pub fn validate_scripts(&self, tx: &Transaction) -> Result<(), TransactionError> {
        let payload = tx.signing_payload();

        for (index, input) in tx.inputs.iter().enumerate() {
            let output = self.chain.resolve_output(&input.outpoint())?;
            let script_error = |source: ScriptError| TransactionError::Script { index, source };

            let unlocking = Script::parse(&input.unlocking_script).map_err(script_error)?;
            let locking = Script::parse(&output.locking_script).map_err(script_error)?;
            verify_spend(&unlocking, &locking, &payload).map_err(script_error)?;
        }
        Ok(())
    }
}

fn total_output(tx: &Transaction) -> Result<u64, TransactionError> {
    tx.outputs.iter().try_fold(0u64, |total, output| {
        total
            .checked_add(output.amount)
            .ok_or(TransactionError::AmountOverflow)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::{TransactionInput, TransactionOutput};
    use crate::core::Block;
    use crate::crypto::KeyPair;
    use crate::mining::ProofOfWork;

    fn params() -> ConsensusParams {
        ConsensusParams {
            difficulty: 1,
            block_reward: 40,
            funds_policy: FundsPolicy::AllowFee,
        }
    }

    fn mine(chain: &mut Blockchain, transactions: Vec<Transaction>) {
        let previous = chain.last_block().map(Block::hash);
        let mut block = Block::new(chain.length() + 1, previous, transactions);
        block.header.nonce = ProofOfWork::new(chain.params().difficulty).find_nonce(&block.header);
        chain.add_new_block(block).unwrap();
    }

    /// Chain whose genesis pays the block reward to `owner`
    fn funded_chain(owner: &KeyPair) -> (Blockchain, String) {
        let mut chain = Blockchain::new(params());
        let coinbase = Transaction::coinbase(&owner.public_key_hash(), 40);
        let hash = coinbase.hash();
        mine(&mut chain, vec![coinbase]);
        (chain, hash)
    }

    fn payment(from: &KeyPair, utxo: &str, outputs: Vec<TransactionOutput>) -> Transaction {
        let mut tx = Transaction::new(vec![TransactionInput::new(utxo, 0)], outputs);
        tx.sign_inputs(from).unwrap();
        tx
    }

    #[test]
    fn test_valid_payment_with_fee() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let (chain, utxo) = funded_chain(&alice);

        let tx = payment(&alice, &utxo, vec![TransactionOutput::new(bob.public_key_hash(), 35)]);
        assert_eq!(TransactionValidator::new(&chain).validate(&tx), Ok(5));
    }

    #[test]
    fn test_overspend_rejected() {
        let alice = KeyPair::generate();
        let (chain, utxo) = funded_chain(&alice);

        let tx = payment(&alice, &utxo, vec![TransactionOutput::new("x", 41)]);
        assert_eq!(
            TransactionValidator::new(&chain).validate(&tx),
            Err(TransactionError::InsufficientFunds {
                total_in: 40,
                total_out: 41
            })
        );
    }

    #[test]
    fn test_exact_policy_rejects_fee() {
        let alice = KeyPair::generate();
        let mut chain = Blockchain::new(ConsensusParams {
            funds_policy: FundsPolicy::Exact,
            ..params()
        });
        let coinbase = Transaction::coinbase(&alice.public_key_hash(), 40);
        let utxo = coinbase.hash();
        mine(&mut chain, vec![coinbase]);

        let tx = payment(&alice, &utxo, vec![TransactionOutput::new("x", 39)]);
        assert!(matches!(
            TransactionValidator::new(&chain).validate(&tx),
            Err(TransactionError::Unbalanced { .. })
        ));
    }

    #[test]
    fn test_unresolved_input() {
        let alice = KeyPair::generate();
        let (chain, _) = funded_chain(&alice);

        let tx = payment(&alice, "deadbeef", vec![TransactionOutput::new("x", 1)]);
        assert_eq!(
            TransactionValidator::new(&chain).validate(&tx),
            Err(TransactionError::UnresolvedInput("deadbeef".to_string()))
        );
    }

    #[test]
    fn test_missing_output_index() {
        let alice = KeyPair::generate();
        let (chain, utxo) = funded_chain(&alice);

        let mut tx = Transaction::new(
            vec![TransactionInput::new(utxo.clone(), 3)],
            vec![TransactionOutput::new("x", 1)],
        );
        tx.sign_inputs(&alice).unwrap();
        assert!(matches!(
            TransactionValidator::new(&chain).validate(&tx),
            Err(TransactionError::MissingOutput { output_index: 3, .. })
        ));
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let alice = KeyPair::generate();
        let mallory = KeyPair::generate();
        let (chain, utxo) = funded_chain(&alice);

        let tx = payment(&mallory, &utxo, vec![TransactionOutput::new("x", 40)]);
        assert_eq!(
            TransactionValidator::new(&chain).validate(&tx),
            Err(TransactionError::Script {
                index: 0,
                source: ScriptError::EqualVerifyFailed
            })
        );
    }

    #[test]
    fn test_unsigned_input_rejected() {
        let alice = KeyPair::generate();
        let (chain, utxo) = funded_chain(&alice);

        let tx = Transaction::new(
            vec![TransactionInput::new(utxo, 0)],
            vec![TransactionOutput::new("x", 40)],
        );
        assert!(matches!(
            TransactionValidator::new(&chain).validate(&tx),
            Err(TransactionError::Script { index: 0, .. })
        ));
    }

    #[test]
    fn test_duplicate_input_rejected() {
        let alice = KeyPair::generate();
        let (chain, utxo) = funded_chain(&alice);

        let mut tx = Transaction::new(
            vec![
                TransactionInput::new(utxo.clone(), 0),
                TransactionInput::new(utxo.clone(), 0),
            ],
            vec![TransactionOutput::new("x", 80)],
        );
        tx.sign_inputs(&alice).unwrap();
        assert_eq!(
            TransactionValidator::new(&chain).validate(&tx),
            Err(TransactionError::DuplicateInput(OutPoint::new(utxo, 0)))
        );
    }

    #[test]
    fn test_spent_output_rejected() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let (mut chain, utxo) = funded_chain(&alice);

        let first = payment(&alice, &utxo, vec![TransactionOutput::new(bob.public_key_hash(), 40)]);
        mine(
            &mut chain,
            vec![Transaction::coinbase(&bob.public_key_hash(), 40), first],
        );

        let second = payment(&alice, &utxo, vec![TransactionOutput::new("x", 40)]);
        assert_eq!(
            TransactionValidator::new(&chain).validate(&second),
            Err(TransactionError::AlreadySpent(OutPoint::new(utxo, 0)))
        );
    }

    #[test]
    fn test_coinbase_rules() {
        let chain = Blockchain::new(params());
        let validator = TransactionValidator::new(&chain);

        assert_eq!(validator.validate(&Transaction::coinbase("m", 40)), Ok(0));
        assert!(matches!(
            validator.validate(&Transaction::coinbase("m", 39)),
            Err(TransactionError::InvalidCoinbase(_))
        ));

        let mut with_input = Transaction::coinbase("m", 40);
        with_input.inputs.push(TransactionInput::new("aa", 0));
        assert!(matches!(
            validator.validate(&with_input),
            Err(TransactionError::InvalidCoinbase(_))
        ));
    }

    #[test]
    fn test_non_coinbase_without_inputs_rejected() {
        let chain = Blockchain::new(params());
        let tx = Transaction::new(vec![], vec![]);
        assert_eq!(
            TransactionValidator::new(&chain).validate(&tx),
            Err(TransactionError::NoInputs)
        );
    }
}
