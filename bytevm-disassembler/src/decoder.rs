//! Byte-stream instruction decoder.
//!
//! `decode` classifies the opcode at an offset and reads its operands,
//! returning the instruction together with its total encoded length. The
//! length of `LOADI` and `PUSH` comes from their embedded u32 size field;
//! every other opcode has a fixed length.

use crate::error::{DecodeError, Result};
use bytevm_spec::{Instruction, Opcode, Reg};

/// Little-endian reader over the instruction stream.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8], offset: u64) -> Self {
        Cursor { bytes, pos: offset as usize }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.bytes.len());
        match end {
            Some(end) => {
                let slice = &self.bytes[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(DecodeError::Truncated {
                offset: self.bytes.len() as u64,
                needed: self.pos.saturating_add(len) - self.bytes.len(),
            }),
        }
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn reg(&mut self) -> Result<Reg> {
        Ok(Reg::from_byte(self.u8()?))
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(self.u64()? as i64)
    }
}

/// Decode the instruction starting at `offset`. Returns the instruction
/// and its encoded length in bytes.
pub fn decode(bytes: &[u8], offset: u64) -> Result<(Instruction, u64)> {
    let mut cursor = Cursor::new(bytes, offset);

    let raw = cursor.u8()?;
    let opcode = Opcode::from_u8(raw).ok_or(DecodeError::UnknownOpcode {
        opcode: raw,
        offset,
    })?;

    let inst = match opcode {
        Opcode::Nop => Instruction::Nop,

        Opcode::Mov => Instruction::Mov { dst: cursor.reg()?, src: cursor.reg()? },
        Opcode::Loadi => {
            let dst = cursor.reg()?;
            let size = cursor.u32()?;
            let value = cursor.take(size as usize)?.to_vec();
            Instruction::Loadi { dst, value }
        }
        Opcode::Rst => Instruction::Rst { dst: cursor.reg()? },
        Opcode::Push => {
            let size = cursor.u32()?;
            let value = cursor.take(size as usize)?.to_vec();
            Instruction::Push { value }
        }
        Opcode::Rpush => Instruction::Rpush { src: cursor.reg()? },
        Opcode::Rpop => Instruction::Rpop { dst: cursor.reg()?, size: cursor.u32()? },

        Opcode::Load => Instruction::Load {
            dst: cursor.reg()?,
            size: cursor.u32()?,
            offset: cursor.i64()?,
        },
        Opcode::Loadr => Instruction::Loadr {
            dst: cursor.reg()?,
            size: cursor.u32()?,
            offset: cursor.reg()?,
        },
        Opcode::Loads => Instruction::Loads { size: cursor.u32()?, offset: cursor.i64()? },
        Opcode::Loadsr => Instruction::Loadsr { size: cursor.u32()?, offset: cursor.reg()? },
        Opcode::Store => Instruction::Store { offset: cursor.i64()?, src: cursor.reg()? },

        Opcode::Read => Instruction::Read { dst: cursor.reg()?, addr: cursor.reg()? },
        Opcode::Readc => Instruction::Readc { dst: cursor.reg()?, addr: cursor.u64()? },
        Opcode::Reads => Instruction::Reads { size: cursor.u32()?, addr: cursor.reg()? },
        Opcode::Readcs => Instruction::Readcs { size: cursor.u32()?, addr: cursor.u64()? },
        Opcode::Write => Instruction::Write { dst: cursor.reg()?, src: cursor.reg()? },
        Opcode::Writec => Instruction::Writec { addr: cursor.u64()?, src: cursor.reg()? },
        Opcode::Writes => Instruction::Writes { dst: cursor.reg()?, size: cursor.u32()? },
        Opcode::Writecs => Instruction::Writecs { addr: cursor.u64()?, size: cursor.u32()? },
        Opcode::Copy => Instruction::Copy {
            dst: cursor.reg()?,
            size: cursor.u32()?,
            src: cursor.reg()?,
        },
        Opcode::Copyc => Instruction::Copyc {
            dst: cursor.u64()?,
            size: cursor.u32()?,
            src: cursor.u64()?,
        },

        Opcode::Jmp => Instruction::Jmp { addr: cursor.u64()? },
        Opcode::Jmpr => Instruction::Jmpr { addr: cursor.reg()? },
        Opcode::Jz => Instruction::Jz { addr: cursor.u64()? },
        Opcode::Jzr => Instruction::Jzr { addr: cursor.reg()? },
        Opcode::Call => Instruction::Call { addr: cursor.u64()? },
        Opcode::Callr => Instruction::Callr { addr: cursor.reg()? },
        Opcode::Ret => Instruction::Ret,

        Opcode::Syscall => Instruction::Syscall,
    };

    Ok((inst, cursor.pos as u64 - offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytevm_spec::Width;

    #[test]
    fn test_decode_nop() {
        let (inst, len) = decode(&[0x00], 0).unwrap();
        assert_eq!(inst, Instruction::Nop);
        assert_eq!(len, 1);
    }

    #[test]
    fn test_decode_mov() {
        // mov r1.q, r0.b
        let bytes = [0x01, 0b1100_0001, 0b0000_0000];
        let (inst, len) = decode(&bytes, 0).unwrap();
        assert_eq!(
            inst,
            Instruction::Mov {
                dst: Reg::new(1, Width::Quad),
                src: Reg::new(0, Width::Byte),
            }
        );
        assert_eq!(len, 3);
    }

    #[test]
    fn test_decode_loadi_payload() {
        let mut bytes = vec![0x02, Reg::R0.to_byte()];
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[0xEF, 0xBE, 0xAD, 0xDE]);

        let (inst, len) = decode(&bytes, 0).unwrap();
        assert_eq!(
            inst,
            Instruction::Loadi { dst: Reg::R0, value: vec![0xEF, 0xBE, 0xAD, 0xDE] }
        );
        assert_eq!(len, 10);
    }

    #[test]
    fn test_decode_load_signed_offset() {
        let mut bytes = vec![0x10, Reg::AX.to_byte()];
        bytes.extend_from_slice(&8u32.to_le_bytes());
        bytes.extend_from_slice(&(-12i64).to_le_bytes());

        let (inst, len) = decode(&bytes, 0).unwrap();
        assert_eq!(
            inst,
            Instruction::Load { dst: Reg::AX, size: 8, offset: -12 }
        );
        assert_eq!(len, 14);
    }

    #[test]
    fn test_decode_at_offset() {
        let mut bytes = vec![0x00, 0x00]; // two nops
        bytes.push(0x30); // jmp
        bytes.extend_from_slice(&0x1234u64.to_le_bytes());

        let (inst, len) = decode(&bytes, 2).unwrap();
        assert_eq!(inst, Instruction::Jmp { addr: 0x1234 });
        assert_eq!(len, 9);
    }

    #[test]
    fn test_unknown_opcode() {
        let err = decode(&[0xEE], 0).unwrap_err();
        assert_eq!(err, DecodeError::UnknownOpcode { opcode: 0xEE, offset: 0 });
    }

    #[test]
    fn test_truncated_operands() {
        // jmp with only 3 of its 8 address bytes present
        let bytes = [0x30, 0x01, 0x02, 0x03];
        let err = decode(&bytes, 0).unwrap_err();
        assert_eq!(err, DecodeError::Truncated { offset: 4, needed: 5 });
    }

    #[test]
    fn test_truncated_payload() {
        // push declaring 100 bytes with none following
        let mut bytes = vec![0x04];
        bytes.extend_from_slice(&100u32.to_le_bytes());
        let err = decode(&bytes, 0).unwrap_err();
        assert_eq!(err, DecodeError::Truncated { offset: 5, needed: 100 });
    }

    #[test]
    fn test_decode_past_end() {
        let err = decode(&[0x00], 1).unwrap_err();
        assert_eq!(err, DecodeError::Truncated { offset: 1, needed: 1 });
    }
}
