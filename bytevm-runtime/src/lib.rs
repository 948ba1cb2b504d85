//! # bytevm Runtime
//!
//! The virtual machine core: a 64-slot register file and a flat linear
//! memory driven by a fetch/execute cycle loop, with the upward-growing
//! call stack living in the same memory above the flashed image.

pub mod error;
pub mod execute;
pub mod memory;
pub mod registers;
pub mod syscall;
pub mod vm;

pub use error::{Result, VmError};
pub use memory::LinearMemory;
pub use registers::RegisterFile;
pub use vm::{ExitStatus, Machine};

use bytevm_spec::DEFAULT_MEMORY_SIZE;

/// Flash an image into a default-sized machine and run it to completion.
pub fn run(image: &[u8]) -> Result<ExitStatus> {
    let mut machine = Machine::new(DEFAULT_MEMORY_SIZE);
    machine.flash(image)?;
    machine.start()
}
