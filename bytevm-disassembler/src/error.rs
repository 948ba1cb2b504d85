//! Decoder error types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown opcode {opcode:#04x} at offset {offset:#x}")]
    UnknownOpcode { opcode: u8, offset: u64 },

    #[error("truncated instruction at offset {offset:#x}: {needed} more bytes required")]
    Truncated { offset: u64, needed: usize },
}

pub type Result<T> = std::result::Result<T, DecodeError>;
