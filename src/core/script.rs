//! Script system for output locking conditions
//!
//! A tiny stack machine. A program is a whitespace-separated list of tokens;
//! tokens with the `OP_` prefix are opcodes, everything else is pushed onto
//! the stack verbatim. Spending runs the input's unlocking script and then the
//! referenced output's locking script against the same stack.

use crate::crypto::{hash160, KeyPair};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Prefix that marks a token as an opcode
pub const OPCODE_PREFIX: &str = "OP_";

// =============================================================================
// Script Errors
// =============================================================================

/// Script-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Stack underflow in {0}")]
    StackUnderflow(OpCode),
    #[error("Unknown opcode: {0}")]
    UnknownOpcode(String),
    #[error("Equality check failed")]
    EqualVerifyFailed,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Script finished without a signature check")]
    MissingSignatureCheck,
}

// =============================================================================
// Opcodes
// =============================================================================

/// The closed set of opcodes the interpreter understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Duplicate the top element
    Dup,
    /// Pop, push hash-of-hash
    Hash160,
    /// Pop two elements, fail unless equal
    EqualVerify,
    /// Pop public key then signature, verify against the signing payload
    CheckSig,
}

impl OpCode {
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Dup => "OP_DUP",
            OpCode::Hash160 => "OP_HASH160",
            OpCode::EqualVerify => "OP_EQUALVERIFY",
            OpCode::CheckSig => "OP_CHECKSIG",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OpCode {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OP_DUP" => Ok(OpCode::Dup),
            "OP_HASH160" => Ok(OpCode::Hash160),
            "OP_EQUALVERIFY" => Ok(OpCode::EqualVerify),
            "OP_CHECKSIG" => Ok(OpCode::CheckSig),
            other => Err(ScriptError::UnknownOpcode(other.to_string())),
        }
    }
}

/// One parsed script token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Op(OpCode),
    Push(String),
}

// =============================================================================
// Scripts
// =============================================================================

/// A parsed script program
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Script {
    tokens: Vec<Token>,
}

impl Script {
    /// Parse a program from its textual form
    pub fn parse(source: &str) -> Result<Self, ScriptError> {
        let tokens = source
            .split_whitespace()
            .map(|token| {
                if token.starts_with(OPCODE_PREFIX) {
                    token.parse().map(Token::Op)
                } else {
                    Ok(Token::Push(token.to_string()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tokens })
    }

    /// Standard pay-to-public-key-hash lock
    pub fn pay_to_public_key_hash(public_key_hash: &str) -> Self {
        Self {
            tokens: vec![
                Token::Op(OpCode::Dup),
                Token::Op(OpCode::Hash160),
                Token::Push(public_key_hash.to_string()),
                Token::Op(OpCode::EqualVerify),
                Token::Op(OpCode::CheckSig),
            ],
        }
    }

    /// Standard unlock: signature then public key
    pub fn signature_unlock(signature_hex: &str, public_key_hex: &str) -> Self {
        Self {
            tokens: vec![
                Token::Push(signature_hex.to_string()),
                Token::Push(public_key_hex.to_string()),
            ],
        }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match token {
                Token::Op(op) => f.write_str(op.name())?,
                Token::Push(value) => f.write_str(value)?,
            }
        }
        Ok(())
    }
}

// =============================================================================
// Interpreter
// =============================================================================

/// Stack machine bound to the payload that `OP_CHECKSIG` verifies against
pub struct StackScript<'a> {
    stack: Vec<String>,
    signing_payload: &'a [u8],
    /// Whether the most recent token was a passing `OP_CHECKSIG`
    signature_checked: bool,
}

impl<'a> StackScript<'a> {
    pub fn new(signing_payload: &'a [u8]) -> Self {
        Self {
            stack: Vec::new(),
            signing_payload,
            signature_checked: false,
        }
    }

    /// Execute a script against the current stack
    pub fn execute(&mut self, script: &Script) -> Result<(), ScriptError> {
        for token in script.tokens() {
            self.signature_checked = false;
            match token {
                Token::Push(value) => self.stack.push(value.clone()),
                Token::Op(op) => self.step(*op)?,
            }
        }
        Ok(())
    }

    fn step(&mut self, op: OpCode) -> Result<(), ScriptError> {
        match op {
            OpCode::Dup => {
                let top = self.stack.last().cloned().ok_or(ScriptError::StackUnderflow(op))?;
                self.stack.push(top);
            }
            OpCode::Hash160 => {
                let value = self.pop(op)?;
                self.stack.push(hash160(value.as_bytes()));
            }
            OpCode::EqualVerify => {
                let last = self.pop(op)?;
                let second_last = self.pop(op)?;
                if last != second_last {
                    return Err(ScriptError::EqualVerifyFailed);
                }
            }
            OpCode::CheckSig => {
                let public_key = self.pop(op)?;
                let signature = self.pop(op)?;
                if !KeyPair::verify(&signature, &public_key, self.signing_payload) {
                    return Err(ScriptError::InvalidSignature);
                }
                self.signature_checked = true;
            }
        }
        Ok(())
    }

    fn pop(&mut self, op: OpCode) -> Result<String, ScriptError> {
        self.stack.pop().ok_or(ScriptError::StackUnderflow(op))
    }

    pub fn stack(&self) -> &[String] {
        &self.stack
    }
}

/// Run `unlocking` followed by `locking` on one stack.
///
/// Succeeds only if every step passes and the final step is a passing
/// signature check.
pub fn verify_spend(
    unlocking: &Script,
    locking: &Script,
    signing_payload: &[u8],
) -> Result<(), ScriptError> {
    let mut machine = StackScript::new(signing_payload);
    machine.execute(unlocking)?;
    machine.execute(locking)?;

    if !machine.signature_checked {
        return Err(ScriptError::MissingSignatureCheck);
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
