//! # bytevm
//!
//! A bytecode virtual machine for a small register+stack architecture,
//! with its assembler and disassembler.
//!
//! - [`spec`]: the ISA (opcodes, registers, instructions, image format)
//! - [`assembler`]: text to executable image
//! - [`disassembler`]: bytes back to instructions and listings
//! - [`runtime`]: the machine itself
//!
//! ## Example
//!
//! ```rust
//! let image = bytevm::assembler::assemble(
//!     r#"
//!     loadi r0.q, 7
//!     push.b 0
//!     push.h 0     ; EXIT
//!     syscall
//!     "#,
//! )
//! .unwrap();
//!
//! let status = bytevm::runtime::run(&image.bytes).unwrap();
//! assert_eq!(status.exit_code, 0);
//! ```

pub use bytevm_assembler as assembler;
pub use bytevm_disassembler as disassembler;
pub use bytevm_runtime as runtime;
pub use bytevm_spec as spec;
