//! # bytevm Assembler
//!
//! Assemble bytevm assembly text into an executable image.
//!
//! ## Example
//!
//! ```rust
//! use bytevm_assembler::assemble;
//!
//! let source = r#"
//!     push.b 0    ; exit code
//!     push.h 0    ; EXIT syscall id
//!     syscall
//! "#;
//!
//! let image = assemble(source).unwrap();
//! assert!(!image.is_empty());
//! ```

pub mod assembler;
pub mod encoder;
pub mod error;
pub mod lexer;
pub mod parser;

pub use assembler::assemble;
pub use encoder::{encode, encode_into, encode_program};
pub use error::{AssemblerError, Result};
pub use parser::parse_register;
