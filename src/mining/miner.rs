//! Mining engine for the ledger
//!
//! Block assembly happens against a read-only view of the chain; the nonce
//! search itself needs only the assembled header, so callers can run it
//! without holding any chain lock and append the result afterwards.

use crate::core::{
    Block, BlockError, Blockchain, OutPoint, Transaction, TransactionValidator,
};
use crate::mining::pow::ProofOfWork;
use log::{info, warn};
use std::collections::HashSet;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Mining statistics
#[derive(Debug, Clone)]
pub struct MiningStats {
    /// Number of hash attempts
    pub hash_attempts: u64,
    /// Time taken in milliseconds
    pub time_ms: u128,
    /// Hash rate (hashes per second)
    pub hash_rate: f64,
}

/// An unmined block plus bookkeeping from assembly
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub block: Block,
    /// Sum of the fees of the included transactions
    pub fees: u64,
    /// Hashes of pending transactions that no longer validate
    pub rejected: Vec<String>,
}

impl BlockTemplate {
    /// Hashes of every pending transaction this template settles
    pub fn processed_hashes(&self) -> Vec<String> {
        self.block
            .transactions
            .iter()
            .filter(|tx| !tx.is_coin_base)
            .map(Transaction::hash)
            .chain(self.rejected.iter().cloned())
            .collect()
    }
}

/// Miner for creating new blocks
///
/// A coinbase hash covers only its payee and amount, so two coinbases paying
/// the same hash the same amount are one output as far as the ledger is
/// concerned: mining empty blocks repeatedly to one key credits the reward
/// once. Rotate the payee, or include fee-paying transactions, to keep
/// rewards distinct.
pub struct Miner {
    /// Public-key hash receiving the coinbase
    pub public_key_hash: String,
}

impl Miner {
    /// Create a new miner
    pub fn new(public_key_hash: impl Into<String>) -> Self {
        Self {
            public_key_hash: public_key_hash.into(),
        }
    }

    /// Build the next block from pending transactions.
    ///
    /// Transactions failing validation, or spending an output an earlier
    /// pending transaction already spends, are left out and reported in
    /// `rejected`. The coinbase pays `block_reward + fees` and comes first.
    pub fn assemble(&self, chain: &Blockchain, pending: Vec<Transaction>) -> BlockTemplate {
        let validator = TransactionValidator::new(chain);
        let mut spent: HashSet<OutPoint> = HashSet::new();
        let mut included = Vec::with_capacity(pending.len() + 1);
        let mut rejected = Vec::new();
        let mut fees = 0u64;

        for tx in pending {
            if tx.is_coin_base {
                rejected.push(tx.hash());
                continue;
            }

            let fee = match validator.validate(&tx) {
                Ok(fee) => fee,
                Err(e) => {
                    warn!("Dropping pending transaction {}: {}", tx.hash(), e);
                    rejected.push(tx.hash());
                    continue;
                }
            };

            let outpoints: Vec<OutPoint> = tx.outpoints().collect();
            if outpoints.iter().any(|outpoint| spent.contains(outpoint)) {
                warn!("Dropping conflicting pending transaction {}", tx.hash());
                rejected.push(tx.hash());
                continue;
            }

            let Some(total) = fees.checked_add(fee) else {
                rejected.push(tx.hash());
                continue;
            };
            fees = total;
            spent.extend(outpoints);
            included.push(tx);
        }

        let reward = chain.params().block_reward.saturating_add(fees);
        let mut transactions = vec![Transaction::coinbase(&self.public_key_hash, reward)];
        transactions.extend(included);

        let previous_hash = chain.last_block().map(Block::hash);
        BlockTemplate {
            block: Block::new(chain.length() + 1, previous_hash, transactions),
            fees,
            rejected,
        }
    }

    /// Run proof of work over `block`; `None` if `cancel` fired first
    pub fn mine(
        &self,
        mut block: Block,
        difficulty: usize,
        cancel: &CancellationToken,
    ) -> Option<(Block, MiningStats)> {
        let start = Instant::now();

        info!(
            "Mining block {} with difficulty {}...",
            block.header.index, difficulty
        );

        let pow = ProofOfWork::new(difficulty);
        let Some(solution) = pow.find_nonce_cancellable(&block.header, cancel) else {
            info!(
                "Mining of block {} cancelled after {}ms",
                block.header.index,
                start.elapsed().as_millis()
            );
            return None;
        };
        block.header.nonce = solution.nonce;

        let elapsed = start.elapsed().as_millis();
        let hash_rate = if elapsed > 0 {
            (solution.attempts as f64) / (elapsed as f64 / 1000.0)
        } else {
            solution.attempts as f64
        };

        let stats = MiningStats {
            hash_attempts: solution.attempts,
            time_ms: elapsed,
            hash_rate,
        };

        info!(
            "Block {} mined in {}ms ({} attempts, {:.2} H/s)",
            block.header.index, elapsed, solution.attempts, hash_rate
        );

        Some((block, stats))
    }

    /// Assemble, mine and append in one step, holding `chain` throughout
    pub fn mine_block(
        &self,
        chain: &mut Blockchain,
        pending: Vec<Transaction>,
    ) -> Result<(Block, MiningStats), BlockError> {
        let template = self.assemble(chain, pending);
        let never = CancellationToken::new();
        // an uncancelled search only ends on success
        let Some((block, stats)) = self.mine(template.block, chain.params().difficulty, &never)
        else {
            return Err(BlockError::InvalidHash);
        };

        chain.add_new_block(block.clone())?;
        Ok((block, stats))
    }
}
