//! Blockchain implementation
//!
//! Blocks live in an arena (`Vec<Block>`); each block records the arena slot
//! of its predecessor, so the chain is walked backwards from the tip without
//! shared ownership. Only `add_new_block` mutates the chain.

use crate::config::ConsensusParams;
use crate::core::block::Block;
use crate::core::transaction::{OutPoint, Transaction, TransactionOutput};
use crate::core::validation::{TransactionError, TransactionValidator};
use crate::mining::ProofOfWork;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Block validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("Invalid previous hash")]
    InvalidPreviousHash,
    #[error("Invalid hash")]
    InvalidHash,
    #[error("Invalid index: expected {expected}, got {got}")]
    InvalidIndex { expected: u64, got: u64 },
    #[error("Block has no transactions")]
    EmptyBlock,
    #[error("Invalid merkle root")]
    InvalidMerkleRoot,
    #[error("Invalid coinbase: {0}")]
    InvalidCoinbase(String),
    #[error("Invalid transactions: {0}")]
    InvalidTransactions(#[from] TransactionError),
}

/// An output still available for spending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub output: TransactionOutput,
}

/// The main blockchain structure
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    /// Arena slot of the last block
    tip: Option<usize>,
    length: u64,
    params: ConsensusParams,
}

impl Blockchain {
    /// Create an empty chain; the first appended block becomes genesis
    pub fn new(params: ConsensusParams) -> Self {
        Self {
            blocks: Vec::new(),
            tip: None,
            length: 0,
            params,
        }
    }

    /// Rebuild a chain from a peer-supplied list, newest block first.
    ///
    /// Blocks are replayed oldest-first through `add_new_block`; the first
    /// failure discards the whole candidate.
    pub fn from_blocks(newest_first: Vec<Block>, params: ConsensusParams) -> Result<Self, BlockError> {
        let mut chain = Self::new(params);
        for block in newest_first.into_iter().rev() {
            chain.add_new_block(block)?;
        }
        Ok(chain)
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// The chain tip
    pub fn last_block(&self) -> Option<&Block> {
        self.tip.and_then(|slot| self.blocks.get(slot))
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.tip.is_none()
    }

    /// Walk the chain from the tip back to genesis
    pub fn iter(&self) -> BlockIter<'_> {
        BlockIter {
            blocks: &self.blocks,
            next: self.tip,
        }
    }

    /// Clone of every block, newest first (the `/chain` wire shape)
    pub fn blocks_newest_first(&self) -> Vec<Block> {
        self.iter().cloned().collect()
    }

    /// Find a transaction by hash, searching from the tip backwards
    pub fn resolve(&self, tx_hash: &str) -> Option<&Transaction> {
        self.iter().find_map(|block| block.find_transaction(tx_hash))
    }

    /// Resolve the output an input points at
    pub fn resolve_output(&self, outpoint: &OutPoint) -> Result<&TransactionOutput, TransactionError> {
        let tx = self
            .resolve(&outpoint.transaction_hash)
            .ok_or_else(|| TransactionError::UnresolvedInput(outpoint.transaction_hash.clone()))?;

        tx.outputs
            .get(outpoint.output_index as usize)
            .ok_or_else(|| TransactionError::MissingOutput {
                transaction_hash: outpoint.transaction_hash.clone(),
                output_index: outpoint.output_index,
            })
    }

    /// Whether any input already in the chain spends `outpoint`
    pub fn is_spent(&self, outpoint: &OutPoint) -> bool {
        self.iter()
            .flat_map(|block| block.transactions.iter())
            .any(|tx| !tx.is_coin_base && tx.spends(outpoint))
    }

    /// Validate a candidate block against the current tip
    pub fn validate_block(&self, block: &Block) -> Result<(), BlockError> {
        match self.last_block() {
            Some(tip) => {
                if block.header.previous_hash.as_deref() != Some(tip.hash().as_str()) {
                    return Err(BlockError::InvalidPreviousHash);
                }
            }
            None => {
                if block.header.previous_hash.is_some() {
                    return Err(BlockError::InvalidPreviousHash);
                }
            }
        }

        let expected = self.length + 1;
        if block.header.index != expected {
            return Err(BlockError::InvalidIndex {
                expected,
                got: block.header.index,
            });
        }

        if !ProofOfWork::new(self.params.difficulty).is_valid_nonce(&block.header) {
            return Err(BlockError::InvalidHash);
        }

        if block.transactions.is_empty() {
            return Err(BlockError::EmptyBlock);
        }

        if !block.verify_merkle_root() {
            return Err(BlockError::InvalidMerkleRoot);
        }

        self.validate_transactions(block)
    }

    /// Every transaction against the pre-block chain, plus block-wide rules
    fn validate_transactions(&self, block: &Block) -> Result<(), BlockError> {
        let validator = TransactionValidator::new(self);
        let mut spent_in_block: HashSet<OutPoint> = HashSet::new();
        let mut fees = 0u64;
        let mut payout = None;

        for tx in &block.transactions {
            let fee = validator.validate(tx)?;

            if tx.is_coin_base {
                if payout.is_some() {
                    return Err(BlockError::InvalidCoinbase(
                        "more than one coinbase transaction".to_string(),
                    ));
                }
                payout = Some(tx.total_output());
                continue;
            }

            for outpoint in tx.outpoints() {
                if !spent_in_block.insert(outpoint.clone()) {
                    return Err(TransactionError::AlreadySpent(outpoint).into());
                }
            }
            fees = fees
                .checked_add(fee)
                .ok_or(TransactionError::AmountOverflow)?;
        }

        let allowed = self.params.block_reward.saturating_add(fees);
        match payout {
            Some(paid) if paid > allowed => Err(BlockError::InvalidCoinbase(format!(
                "payout {} exceeds reward plus fees {}",
                paid, allowed
            ))),
            _ => Ok(()),
        }
    }

    /// Validate and link `block` in as the new tip
    pub fn add_new_block(&mut self, mut block: Block) -> Result<(), BlockError> {
        self.validate_block(&block)?;

        block.previous_block = self.tip;
        let hash = block.hash();
        let tx_count = block.tx_count();
        self.blocks.push(block);
        self.tip = Some(self.blocks.len() - 1);
        self.length += 1;

        log::info!(
            "Block #{} appended: {} ({} transactions)",
            self.length,
            hash,
            tx_count
        );
        Ok(())
    }

    /// Every unspent output locked to `public_key_hash`
    pub fn unspent_outputs(&self, public_key_hash: &str) -> Vec<Utxo> {
        let spent: HashSet<OutPoint> = self
            .iter()
            .flat_map(|block| block.transactions.iter())
            .filter(|tx| !tx.is_coin_base)
            .flat_map(|tx| tx.outpoints())
            .collect();

        let mut seen = HashSet::new();
        let mut utxos = Vec::new();
        for tx in self.iter().flat_map(|block| block.transactions.iter()) {
            let tx_hash = tx.hash();
            for (index, output) in tx.outputs.iter().enumerate() {
                if !output.is_locked_to(public_key_hash) {
                    continue;
                }
                let outpoint = OutPoint::new(tx_hash.clone(), index as u32);
                // identical transactions share an outpoint; count it once
                if spent.contains(&outpoint) || !seen.insert(outpoint.clone()) {
                    continue;
                }
                utxos.push(Utxo {
                    outpoint,
                    output: output.clone(),
                });
            }
        }
        utxos
    }

    /// Sum of the unspent outputs locked to `public_key_hash`
    pub fn balance(&self, public_key_hash: &str) -> u64 {
        self.unspent_outputs(public_key_hash)
            .iter()
            .map(|utxo| utxo.output.amount)
            .sum()
    }
}

/// Iterator from the tip back to genesis
pub struct BlockIter<'a> {
    blocks: &'a [Block],
    next: Option<usize>,
}

impl<'a> Iterator for BlockIter<'a> {
    type Item = &'a Block;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.blocks.get(self.next?)?;
        self.next = block.previous_block;
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FundsPolicy;
    use crate::core::transaction::TransactionInput;
    use crate::crypto::KeyPair;

    const REWARD: u64 = 40;

    fn params() -> ConsensusParams {
        ConsensusParams {
            difficulty: 1,
            block_reward: REWARD,
            funds_policy: FundsPolicy::AllowFee,
        }
    }

    fn next_block(chain: &Blockchain, transactions: Vec<Transaction>) -> Block {
        let previous = chain.last_block().map(Block::hash);
        let mut block = Block::new(chain.length() + 1, previous, transactions);
        block.header.nonce = ProofOfWork::new(chain.params().difficulty).find_nonce(&block.header);
        block
    }

    fn mine(chain: &mut Blockchain, transactions: Vec<Transaction>) {
        let block = next_block(chain, transactions);
        chain.add_new_block(block).unwrap();
    }

    fn pay(from: &KeyPair, utxo: &str, to: &str, amount: u64) -> Transaction {
        let mut tx = Transaction::new(
            vec![TransactionInput::new(utxo, 0)],
            vec![TransactionOutput::new(to, amount)],
        );
        tx.sign_inputs(from).unwrap();
        tx
    }

    #[test]
    fn test_genesis_block() {
        let mut chain = Blockchain::new(params());
        assert!(chain.is_empty());

        mine(&mut chain, vec![Transaction::coinbase("miner", REWARD)]);

        assert_eq!(chain.length(), 1);
        let genesis = chain.last_block().unwrap();
        assert!(genesis.header.is_genesis());
        assert_eq!(genesis.previous_block, None);
        assert_eq!(chain.balance("miner"), REWARD);
    }

    #[test]
    fn test_genesis_must_not_link() {
        let mut chain = Blockchain::new(params());
        let mut block = Block::new(1, Some("ab".to_string()), vec![Transaction::coinbase("m", REWARD)]);
        block.header.nonce = ProofOfWork::new(1).find_nonce(&block.header);

        assert_eq!(chain.add_new_block(block), Err(BlockError::InvalidPreviousHash));
        assert!(chain.is_empty());
    }

    #[test]
    fn test_previous_hash_mismatch_leaves_length_unchanged() {
        let mut chain = Blockchain::new(params());
        mine(&mut chain, vec![Transaction::coinbase("a", REWARD)]);

        let mut block = Block::new(2, Some("wrong_hash".to_string()), vec![Transaction::coinbase("b", REWARD)]);
        block.header.nonce = ProofOfWork::new(1).find_nonce(&block.header);

        assert_eq!(chain.add_new_block(block), Err(BlockError::InvalidPreviousHash));
        assert_eq!(chain.length(), 1);
    }

    #[test]
    fn test_invalid_pow_rejected() {
        let mut chain = Blockchain::new(params());
        let mut block = Block::new(1, None, vec![Transaction::coinbase("m", REWARD)]);
        let pow = ProofOfWork::new(1);
        while pow.is_valid_nonce(&block.header) {
            block.header.nonce += 1;
        }

        assert_eq!(chain.add_new_block(block), Err(BlockError::InvalidHash));
        assert_eq!(chain.length(), 0);
    }

    #[test]
    fn test_wrong_index_rejected() {
        let chain = Blockchain::new(params());
        let mut block = Block::new(5, None, vec![Transaction::coinbase("m", REWARD)]);
        block.header.nonce = ProofOfWork::new(1).find_nonce(&block.header);

        assert_eq!(
            chain.validate_block(&block),
            Err(BlockError::InvalidIndex { expected: 1, got: 5 })
        );
    }

    #[test]
    fn test_empty_block_rejected() {
        let chain = Blockchain::new(params());
        let block = next_block(&chain, vec![]);
        assert_eq!(chain.validate_block(&block), Err(BlockError::EmptyBlock));
    }

    #[test]
    fn test_tampered_transactions_rejected() {
        let chain = Blockchain::new(params());
        let mut block = next_block(&chain, vec![Transaction::coinbase("m", REWARD)]);
        block.transactions[0].outputs[0].amount = 1_000;

        assert_eq!(chain.validate_block(&block), Err(BlockError::InvalidMerkleRoot));
    }

    #[test]
    fn test_double_spend_within_block_rejected() {
        let alice = KeyPair::generate();
        let mut chain = Blockchain::new(params());
        let coinbase = Transaction::coinbase(&alice.public_key_hash(), REWARD);
        let utxo = coinbase.hash();
        mine(&mut chain, vec![coinbase]);

        let first = pay(&alice, &utxo, "bob", 40);
        let second = pay(&alice, &utxo, "carol", 39);
        let block = next_block(&chain, vec![first, second]);

        assert_eq!(
            chain.add_new_block(block),
            Err(BlockError::InvalidTransactions(TransactionError::AlreadySpent(
                OutPoint::new(utxo, 0)
            )))
        );
        assert_eq!(chain.length(), 1);
    }

    #[test]
    fn test_single_coinbase_per_block() {
        let chain = Blockchain::new(params());
        let block = next_block(
            &chain,
            vec![Transaction::coinbase("a", REWARD), Transaction::coinbase("b", REWARD)],
        );
        assert!(matches!(
            chain.validate_block(&block),
            Err(BlockError::InvalidCoinbase(_))
        ));
    }

    #[test]
    fn test_coinbase_capped_by_reward_plus_fees() {
        let alice = KeyPair::generate();
        let mut chain = Blockchain::new(params());
        let coinbase = Transaction::coinbase(&alice.public_key_hash(), REWARD);
        let utxo = coinbase.hash();
        mine(&mut chain, vec![coinbase]);

        // fee of 5 allows a payout of 45 but not 46
        let greedy = next_block(
            &chain,
            vec![
                Transaction::coinbase("m", REWARD + 6),
                pay(&alice, &utxo, "bob", 35),
            ],
        );
        assert!(matches!(
            chain.validate_block(&greedy),
            Err(BlockError::InvalidCoinbase(_))
        ));

        let fair = next_block(
            &chain,
            vec![
                Transaction::coinbase("m", REWARD + 5),
                pay(&alice, &utxo, "bob", 35),
            ],
        );
        assert_eq!(chain.validate_block(&fair), Ok(()));
    }

    #[test]
    fn test_iter_walks_newest_first() {
        let mut chain = Blockchain::new(params());
        mine(&mut chain, vec![Transaction::coinbase("a", REWARD)]);
        mine(&mut chain, vec![Transaction::coinbase("b", REWARD)]);
        mine(&mut chain, vec![Transaction::coinbase("c", REWARD)]);

        let indexes: Vec<u64> = chain.iter().map(|b| b.header.index).collect();
        assert_eq!(indexes, vec![3, 2, 1]);
    }

    #[test]
    fn test_from_blocks_replays_chain() {
        let mut chain = Blockchain::new(params());
        mine(&mut chain, vec![Transaction::coinbase("a", REWARD)]);
        mine(&mut chain, vec![Transaction::coinbase("b", REWARD)]);

        let rebuilt = Blockchain::from_blocks(chain.blocks_newest_first(), params()).unwrap();
        assert_eq!(rebuilt.length(), 2);
        assert_eq!(
            rebuilt.last_block().map(Block::hash),
            chain.last_block().map(Block::hash)
        );
    }

    #[test]
    fn test_from_blocks_rejects_corrupt_chain() {
        let mut chain = Blockchain::new(params());
        mine(&mut chain, vec![Transaction::coinbase("a", REWARD)]);
        mine(&mut chain, vec![Transaction::coinbase("b", REWARD)]);

        let mut blocks = chain.blocks_newest_first();
        blocks[1].transactions[0].outputs[0].amount = 999;

        assert!(Blockchain::from_blocks(blocks, params()).is_err());
    }

    #[test]
    fn test_unspent_outputs_and_balance() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let mut chain = Blockchain::new(params());
        let coinbase = Transaction::coinbase(&alice.public_key_hash(), REWARD);
        let utxo = coinbase.hash();
        mine(&mut chain, vec![coinbase]);

        let mut tx = Transaction::new(
            vec![TransactionInput::new(utxo, 0)],
            vec![
                TransactionOutput::new(bob.public_key_hash(), 30),
                TransactionOutput::new(alice.public_key_hash(), 10),
            ],
        );
        tx.sign_inputs(&alice).unwrap();
        mine(&mut chain, vec![Transaction::coinbase("m", REWARD), tx]);

        assert_eq!(chain.balance(&bob.public_key_hash()), 30);
        assert_eq!(chain.balance(&alice.public_key_hash()), 10);
        assert_eq!(chain.unspent_outputs(&alice.public_key_hash()).len(), 1);
        assert_eq!(chain.balance("nobody"), 0);
    }
}
