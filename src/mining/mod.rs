//! Mining module: proof of work and block assembly

pub mod miner;
pub mod pow;

pub use miner::{BlockTemplate, Miner, MiningStats};
pub use pow::{NonceSolution, ProofOfWork, CANCEL_CHECK_INTERVAL};
