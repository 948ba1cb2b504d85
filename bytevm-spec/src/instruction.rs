//! Decoded instruction representation.
//!
//! An `Instruction` carries its operands in native form; the assembler
//! encodes it to bytes and the disassembler decodes bytes back. `Display`
//! produces assembler syntax.

use crate::opcode::Opcode;
use crate::register::{Reg, Width};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fully decoded instruction.
///
/// Immediate payloads (`Loadi`, `Push`) are kept as raw little-endian bytes
/// because their size is part of the encoding, not a property of the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    Nop,

    // Data movement
    Mov { dst: Reg, src: Reg },
    Loadi { dst: Reg, value: Vec<u8> },
    Rst { dst: Reg },
    Push { value: Vec<u8> },
    Rpush { src: Reg },
    Rpop { dst: Reg, size: u32 },

    // Frame-relative memory
    Load { dst: Reg, size: u32, offset: i64 },
    Loadr { dst: Reg, size: u32, offset: Reg },
    Loads { size: u32, offset: i64 },
    Loadsr { size: u32, offset: Reg },
    Store { offset: i64, src: Reg },

    // Absolute memory
    Read { dst: Reg, addr: Reg },
    Readc { dst: Reg, addr: u64 },
    Reads { size: u32, addr: Reg },
    Readcs { size: u32, addr: u64 },
    Write { dst: Reg, src: Reg },
    Writec { addr: u64, src: Reg },
    Writes { dst: Reg, size: u32 },
    Writecs { addr: u64, size: u32 },
    Copy { dst: Reg, size: u32, src: Reg },
    Copyc { dst: u64, size: u32, src: u64 },

    // Control flow
    Jmp { addr: u64 },
    Jmpr { addr: Reg },
    Jz { addr: u64 },
    Jzr { addr: Reg },
    Call { addr: u64 },
    Callr { addr: Reg },
    Ret,

    Syscall,
}

impl Instruction {
    /// The opcode byte this instruction encodes to.
    pub const fn opcode(&self) -> Opcode {
        match self {
            Instruction::Nop => Opcode::Nop,
            Instruction::Mov { .. } => Opcode::Mov,
            Instruction::Loadi { .. } => Opcode::Loadi,
            Instruction::Rst { .. } => Opcode::Rst,
            Instruction::Push { .. } => Opcode::Push,
            Instruction::Rpush { .. } => Opcode::Rpush,
            Instruction::Rpop { .. } => Opcode::Rpop,
            Instruction::Load { .. } => Opcode::Load,
            Instruction::Loadr { .. } => Opcode::Loadr,
            Instruction::Loads { .. } => Opcode::Loads,
            Instruction::Loadsr { .. } => Opcode::Loadsr,
            Instruction::Store { .. } => Opcode::Store,
            Instruction::Read { .. } => Opcode::Read,
            Instruction::Readc { .. } => Opcode::Readc,
            Instruction::Reads { .. } => Opcode::Reads,
            Instruction::Readcs { .. } => Opcode::Readcs,
            Instruction::Write { .. } => Opcode::Write,
            Instruction::Writec { .. } => Opcode::Writec,
            Instruction::Writes { .. } => Opcode::Writes,
            Instruction::Writecs { .. } => Opcode::Writecs,
            Instruction::Copy { .. } => Opcode::Copy,
            Instruction::Copyc { .. } => Opcode::Copyc,
            Instruction::Jmp { .. } => Opcode::Jmp,
            Instruction::Jmpr { .. } => Opcode::Jmpr,
            Instruction::Jz { .. } => Opcode::Jz,
            Instruction::Jzr { .. } => Opcode::Jzr,
            Instruction::Call { .. } => Opcode::Call,
            Instruction::Callr { .. } => Opcode::Callr,
            Instruction::Ret => Opcode::Ret,
            Instruction::Syscall => Opcode::Syscall,
        }
    }

    /// Encoded length in bytes, including the opcode byte.
    pub fn encoded_len(&self) -> u64 {
        match self {
            Instruction::Loadi { value, .. } => 6 + value.len() as u64,
            Instruction::Push { value } => 5 + value.len() as u64,
            other => other
                .opcode()
                .fixed_len()
                .expect("non-payload opcodes have a fixed length"),
        }
    }
}

/// Format an immediate payload: small payloads as a hex integer, larger
/// ones as a byte list.
fn fmt_payload(f: &mut fmt::Formatter<'_>, value: &[u8]) -> fmt::Result {
    if value.len() <= 8 {
        let mut buf = [0u8; 8];
        buf[..value.len()].copy_from_slice(value);
        write!(f, "{:#x}", u64::from_le_bytes(buf))
    } else {
        write!(f, "[")?;
        for (i, byte) in value.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "]")
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Nop => write!(f, "nop"),
            Instruction::Mov { dst, src } => write!(f, "mov {}, {}", dst, src),
            Instruction::Loadi { dst, value } => {
                if value.len() == dst.bytecount() {
                    write!(f, "loadi {}, ", dst)?;
                } else {
                    write!(f, "loadi {}, {}, ", dst, value.len())?;
                }
                fmt_payload(f, value)
            }
            Instruction::Rst { dst } => write!(f, "rst {}", dst),
            Instruction::Push { value } => {
                match Width::from_bytes(value.len()) {
                    Some(width) => write!(f, "push.{} ", width.suffix())?,
                    None => write!(f, "push {}, ", value.len())?,
                }
                fmt_payload(f, value)
            }
            Instruction::Rpush { src } => write!(f, "rpush {}", src),
            Instruction::Rpop { dst, size } => write!(f, "rpop {}, {}", dst, size),
            Instruction::Load { dst, size, offset } => {
                write!(f, "load {}, {}, {}", dst, size, offset)
            }
            Instruction::Loadr { dst, size, offset } => {
                write!(f, "loadr {}, {}, {}", dst, size, offset)
            }
            Instruction::Loads { size, offset } => write!(f, "loads {}, {}", size, offset),
            Instruction::Loadsr { size, offset } => write!(f, "loadsr {}, {}", size, offset),
            Instruction::Store { offset, src } => write!(f, "store {}, {}", offset, src),
            Instruction::Read { dst, addr } => write!(f, "read {}, {}", dst, addr),
            Instruction::Readc { dst, addr } => write!(f, "readc {}, {:#x}", dst, addr),
            Instruction::Reads { size, addr } => write!(f, "reads {}, {}", size, addr),
            Instruction::Readcs { size, addr } => write!(f, "readcs {}, {:#x}", size, addr),
            Instruction::Write { dst, src } => write!(f, "write {}, {}", dst, src),
            Instruction::Writec { addr, src } => write!(f, "writec {:#x}, {}", addr, src),
            Instruction::Writes { dst, size } => write!(f, "writes {}, {}", dst, size),
            Instruction::Writecs { addr, size } => write!(f, "writecs {:#x}, {}", addr, size),
            Instruction::Copy { dst, size, src } => write!(f, "copy {}, {}, {}", dst, size, src),
            Instruction::Copyc { dst, size, src } => {
                write!(f, "copyc {:#x}, {}, {:#x}", dst, size, src)
            }
            Instruction::Jmp { addr } => write!(f, "jmp {:#x}", addr),
            Instruction::Jmpr { addr } => write!(f, "jmpr {}", addr),
            Instruction::Jz { addr } => write!(f, "jz {:#x}", addr),
            Instruction::Jzr { addr } => write!(f, "jzr {}", addr),
            Instruction::Call { addr } => write!(f, "call {:#x}", addr),
            Instruction::Callr { addr } => write!(f, "callr {}", addr),
            Instruction::Ret => write!(f, "ret"),
            Instruction::Syscall => write!(f, "syscall"),
        }
    }
}
