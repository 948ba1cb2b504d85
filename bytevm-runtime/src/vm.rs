//! The machine aggregate and its cycle loop.
//!
//! A `Machine` owns its register file, linear memory, and the optional
//! debugger-signal handler; multiple machines can coexist. The cycle loop
//! fetches the instruction at IP, executes it, and advances IP by the
//! decoded length only if execution left IP untouched; control-flow
//! opcodes opt out of the advance by writing IP themselves.

use crate::error::{Result, VmError};
use crate::execute::execute;
use crate::memory::LinearMemory;
use crate::registers::RegisterFile;
use bytevm_disassembler::DecodeError;
use bytevm_spec::{Instruction, Reg};

/// Handler invoked synchronously by the DEBUGGER syscall.
pub type DebugHandler = Box<dyn FnMut(u64)>;

/// Outcome of a completed `start()` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Value of EXT when RUN cleared.
    pub exit_code: u8,
    /// Total cycles executed by this machine.
    pub cycles: u64,
}

pub struct Machine {
    pub(crate) regs: RegisterFile,
    pub(crate) memory: LinearMemory,
    pub(crate) executable_size: u64,
    pub(crate) debug_handler: Option<DebugHandler>,
    cycles: u64,
}

impl Machine {
    /// A powered-off machine with `memory_size` bytes of zeroed memory.
    pub fn new(memory_size: usize) -> Self {
        Machine {
            regs: RegisterFile::new(),
            memory: LinearMemory::new(memory_size),
            executable_size: 0,
            debug_handler: None,
            cycles: 0,
        }
    }

    /// Load an executable image.
    ///
    /// Fails without touching machine state if the image does not fit.
    /// On success the image occupies `[0, |image|)`, the rest of memory is
    /// zeroed, registers are cleared, and SP and FP both point just past
    /// the image. Execution will begin at IP = 0 unless the loader seeds
    /// IP before `start`.
    pub fn flash(&mut self, image: &[u8]) -> Result<()> {
        if image.len() > self.memory.len() {
            return Err(VmError::OutOfMemory {
                size: image.len(),
                capacity: self.memory.len(),
            });
        }
        self.memory.reset();
        self.memory.write(0, image)?;
        self.executable_size = image.len() as u64;
        self.regs.reset();
        self.regs.write_u64(Reg::SP, self.executable_size)?;
        self.regs.write_u64(Reg::FP, self.executable_size)?;
        Ok(())
    }

    /// Set RUN and cycle until it clears (the EXIT syscall) or a trap
    /// bubbles out. A trap does not clear RUN.
    pub fn start(&mut self) -> Result<ExitStatus> {
        self.regs.write_u64(Reg::RUN, 1)?;
        while self.regs.read_u64(Reg::RUN)? != 0 {
            self.cycle()?;
        }
        Ok(ExitStatus {
            exit_code: self.regs.read_u64(Reg::EXT)? as u8,
            cycles: self.cycles,
        })
    }

    /// One fetch/execute step.
    pub fn cycle(&mut self) -> Result<()> {
        let ip = self.regs.read_u64(Reg::IP)?;
        let (inst, len) = self.fetch(ip)?;

        tracing::trace!(cycle = self.cycles, ip, op = %inst.opcode(), "executing");

        execute(self, &inst, ip).map_err(|e| e.at_ip(ip))?;

        // Instructions that wrote IP (branches, calls, returns) skip the
        // automatic advance; everything else moves to the next opcode.
        if self.regs.read_u64(Reg::IP)? == ip {
            self.regs.write_u64(Reg::IP, ip + len)?;
        }

        self.cycles += 1;
        Ok(())
    }

    /// Run `n` cycles; the debugger's single-step entry point.
    pub fn cycle_n(&mut self, n: u64) -> Result<()> {
        for _ in 0..n {
            self.cycle()?;
        }
        Ok(())
    }

    /// Decode the instruction at `ip` out of linear memory.
    fn fetch(&self, ip: u64) -> Result<(Instruction, u64)> {
        bytevm_disassembler::decode(self.memory.as_slice(), ip).map_err(|e| match e {
            DecodeError::UnknownOpcode { opcode, .. } => {
                VmError::InvalidInstruction { opcode, ip }
            }
            DecodeError::Truncated { offset, .. } => {
                VmError::IllegalMemoryAccess { address: offset, ip }
            }
        })
    }

    /// Install the DEBUGGER syscall handler.
    pub fn set_debug_handler<F>(&mut self, handler: F)
    where
        F: FnMut(u64) + 'static,
    {
        self.debug_handler = Some(Box::new(handler));
    }

    /// Remove the DEBUGGER syscall handler.
    pub fn clear_debug_handler(&mut self) {
        self.debug_handler = None;
    }

    // ========================================================================
    // Stack engine
    //
    // The stack lives in `[executable_size, SP)` and grows toward higher
    // addresses; SP names the first free byte. Underflow is not checked
    // here, it surfaces as an illegal access on the read it provokes.
    // ========================================================================

    /// Push a byte run.
    pub fn stack_write(&mut self, bytes: &[u8]) -> Result<()> {
        let sp = self.regs.read_u64(Reg::SP)?;
        self.memory.write(sp, bytes)?;
        self.regs.write_u64(Reg::SP, sp + bytes.len() as u64)
    }

    /// Read the top `len` bytes without moving SP.
    pub fn stack_peek(&self, len: usize) -> Result<Vec<u8>> {
        let sp = self.regs.read_u64(Reg::SP)?;
        let addr = sp.wrapping_sub(len as u64);
        Ok(self.memory.read(addr, len)?.to_vec())
    }

    /// Pop the top `len` bytes.
    pub fn stack_pop(&mut self, len: usize) -> Result<Vec<u8>> {
        let bytes = self.stack_peek(len)?;
        let sp = self.regs.read_u64(Reg::SP)?;
        self.regs.write_u64(Reg::SP, sp - len as u64)?;
        Ok(bytes)
    }

    pub(crate) fn stack_pop_u8(&mut self) -> Result<u8> {
        Ok(self.stack_pop(1)?[0])
    }

    pub(crate) fn stack_pop_u16(&mut self) -> Result<u16> {
        let bytes = self.stack_pop(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn stack_pop_u64(&mut self) -> Result<u64> {
        let bytes = self.stack_pop(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(buf))
    }

    // ========================================================================
    // Inspection (debugger surface)
    // ========================================================================

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    pub fn memory(&self) -> &LinearMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut LinearMemory {
        &mut self.memory
    }

    /// Length of the flashed image; the stack region starts here.
    pub fn executable_size(&self) -> u64 {
        self.executable_size
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Whether RUN is set.
    pub fn is_running(&self) -> Result<bool> {
        Ok(self.regs.read_u64(Reg::RUN)? != 0)
    }
}
