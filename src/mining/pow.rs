//! Proof-of-work predicate and nonce search
//!
//! A header is valid when its hex hash starts with `difficulty` zero
//! characters. The search is an unbounded linear scan over nonces, so it
//! polls a cancellation token every `CANCEL_CHECK_INTERVAL` attempts.

use crate::core::BlockHeader;
use crate::crypto::has_leading_zeros;
use tokio_util::sync::CancellationToken;

/// Nonce attempts between cancellation checks
pub const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Outcome of a successful search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceSolution {
    pub nonce: u64,
    pub attempts: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: usize,
}

impl ProofOfWork {
    pub fn new(difficulty: usize) -> Self {
        Self { difficulty }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Check if the header hash meets the difficulty target
    pub fn is_valid_nonce(&self, header: &BlockHeader) -> bool {
        has_leading_zeros(&header.hash(), self.difficulty)
    }

    /// Search from the header's current nonce until one satisfies the target.
    ///
    /// Works on a copy: the caller's header is left untouched.
    pub fn find_nonce(&self, header: &BlockHeader) -> u64 {
        let never = CancellationToken::new();
        // an uncancelled search only ends on success
        self.search(header, &never)
            .map(|solution| solution.nonce)
            .unwrap_or(header.nonce)
    }

    /// Like `find_nonce`, but returns `None` once `cancel` fires
    pub fn find_nonce_cancellable(
        &self,
        header: &BlockHeader,
        cancel: &CancellationToken,
    ) -> Option<NonceSolution> {
        self.search(header, cancel)
    }

    fn search(&self, header: &BlockHeader, cancel: &CancellationToken) -> Option<NonceSolution> {
        let mut candidate = header.clone();
        let mut attempts = 0u64;

        loop {
            attempts += 1;
            if self.is_valid_nonce(&candidate) {
                return Some(NonceSolution {
                    nonce: candidate.nonce,
                    attempts,
                });
            }

            if attempts % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                log::debug!("Nonce search cancelled after {} attempts", attempts);
                return None;
            }

            candidate.nonce = candidate.nonce.wrapping_add(1);
        }
    }
}
