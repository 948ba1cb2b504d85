//! Register file: 64 slots of 8 bytes.
//!
//! A slot always holds 8 bytes. Writing through an operand clears the whole
//! slot first, then copies at most the operand's width, so narrow writes
//! never leave stale high bytes behind. Reads return the slot's low `width`
//! bytes; scalar reads zero-extend.

use crate::error::{Result, VmError};
use bytevm_spec::{Reg, NUM_REGISTERS, SLOT_BYTES};

#[derive(Debug, Clone)]
pub struct RegisterFile {
    slots: [[u8; SLOT_BYTES]; NUM_REGISTERS],
}

impl RegisterFile {
    pub fn new() -> Self {
        RegisterFile {
            slots: [[0; SLOT_BYTES]; NUM_REGISTERS],
        }
    }

    #[inline]
    fn index(reg: Reg) -> Result<usize> {
        let code = reg.code();
        if (code as usize) < NUM_REGISTERS {
            Ok(code as usize)
        } else {
            Err(VmError::InvalidRegister { code })
        }
    }

    /// The operand's bytes: the low `width` bytes of the slot, little-endian.
    pub fn read(&self, reg: Reg) -> Result<&[u8]> {
        let idx = Self::index(reg)?;
        Ok(&self.slots[idx][..reg.bytecount()])
    }

    /// Read as an unsigned scalar, zero-extending narrower widths.
    pub fn read_u64(&self, reg: Reg) -> Result<u64> {
        let idx = Self::index(reg)?;
        let mut buf = [0u8; SLOT_BYTES];
        buf[..reg.bytecount()].copy_from_slice(&self.slots[idx][..reg.bytecount()]);
        Ok(u64::from_le_bytes(buf))
    }

    /// Read as a signed scalar. Narrower widths are zero-extended before
    /// reinterpretation, per the register read rule.
    pub fn read_i64(&self, reg: Reg) -> Result<i64> {
        Ok(self.read_u64(reg)? as i64)
    }

    /// Clear the slot, then copy at most `width` bytes of `bytes` into it.
    /// Excess source bytes are truncated.
    pub fn write(&mut self, reg: Reg, bytes: &[u8]) -> Result<()> {
        let idx = Self::index(reg)?;
        let len = bytes.len().min(reg.bytecount());
        self.slots[idx] = [0; SLOT_BYTES];
        self.slots[idx][..len].copy_from_slice(&bytes[..len]);
        Ok(())
    }

    /// Write a scalar through its little-endian byte layout.
    pub fn write_u64(&mut self, reg: Reg, value: u64) -> Result<()> {
        self.write(reg, &value.to_le_bytes())
    }

    /// Zero every slot.
    pub fn reset(&mut self) {
        self.slots = [[0; SLOT_BYTES]; NUM_REGISTERS];
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}
