//! Core ledger components
//!
//! This module contains the fundamental building blocks:
//! - Script engine (unlock-then-lock stack machine)
//! - Transactions (UTXO model, script-stripped hashing)
//! - Blocks (header hashing, merkle commitment)
//! - Blockchain (arena of blocks walked from the tip)
//! - Transaction validation (UTXO resolution, funds, scripts)

pub mod block;
pub mod blockchain;
pub mod script;
pub mod transaction;
pub mod validation;

pub use block::{now_timestamp, Block, BlockHeader};
pub use blockchain::{BlockError, BlockIter, Blockchain, Utxo};
pub use script::{verify_spend, OpCode, Script, ScriptError, StackScript, Token};
pub use transaction::{OutPoint, Transaction, TransactionInput, TransactionOutput};
pub use validation::{TransactionError, TransactionValidator};
