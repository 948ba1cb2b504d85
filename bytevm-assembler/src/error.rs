//! Assembler error types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssemblerError {
    #[error("line {line}: unexpected character '{found}'")]
    UnexpectedChar { line: usize, found: char },

    #[error("line {line}: unexpected token '{found}', expected {expected}")]
    UnexpectedToken {
        line: usize,
        found: String,
        expected: &'static str,
    },

    #[error("line {line}: unknown mnemonic '{name}'")]
    UnknownMnemonic { line: usize, name: String },

    #[error("line {line}: unknown register '{name}'")]
    UnknownRegister { line: usize, name: String },

    #[error("line {line}: unknown directive '.{name}'")]
    UnknownDirective { line: usize, name: String },

    #[error("line {line}: value {value} does not fit in {width} bytes")]
    ValueRange { line: usize, value: i128, width: usize },

    #[error("line {line}: unknown label '{name}'")]
    UnknownLabel { line: usize, name: String },

    #[error("line {line}: duplicate label '{name}'")]
    DuplicateLabel { line: usize, name: String },
}

pub type Result<T> = std::result::Result<T, AssemblerError>;
