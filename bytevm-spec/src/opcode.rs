//! Opcode values and the instruction-length table.
//!
//! Every opcode is a single byte. Opcodes are grouped by family:
//! - 0x00: NOP
//! - 0x01-0x06: data movement (MOV, LOADI, RST, PUSH, RPUSH, RPOP)
//! - 0x10-0x14: frame-relative memory (LOAD, LOADR, LOADS, LOADSR, STORE)
//! - 0x20-0x29: absolute memory (READ*, WRITE*, COPY*)
//! - 0x30-0x36: control flow (JMP, JMPR, JZ, JZR, CALL, CALLR, RET)
//! - 0x40: SYSCALL
//!
//! Most instructions have a fixed encoded length; `LOADI` and `PUSH` carry
//! a u32 size field followed by that many payload bytes, so their total
//! length depends on the instruction stream.

use serde::{Deserialize, Serialize};

/// Instruction opcode (one byte).
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    /// NOP: no effect
    Nop = 0x00,

    // ========== Data movement (0x01-0x06) ==========
    /// MOV t, s: copy s's bytes into t
    Mov = 0x01,
    /// LOADI t, size, value: load an immediate into t
    Loadi = 0x02,
    /// RST t: zero t
    Rst = 0x03,
    /// PUSH size, value: push an immediate
    Push = 0x04,
    /// RPUSH s: push s's bytes
    Rpush = 0x05,
    /// RPOP t, size: pop size bytes into t
    Rpop = 0x06,

    // ========== Frame-relative (0x10-0x14) ==========
    /// LOAD t, size, off: t <- mem[FP+off]
    Load = 0x10,
    /// LOADR t, size, r: t <- mem[FP+r]
    Loadr = 0x11,
    /// LOADS size, off: push mem[FP+off]
    Loads = 0x12,
    /// LOADSR size, r: push mem[FP+r]
    Loadsr = 0x13,
    /// STORE off, s: mem[FP+off] <- s
    Store = 0x14,

    // ========== Absolute memory (0x20-0x29) ==========
    /// READ t, s: t <- mem[s]
    Read = 0x20,
    /// READC t, a: t <- mem[a]
    Readc = 0x21,
    /// READS size, s: push mem[s]
    Reads = 0x22,
    /// READCS size, a: push mem[a]
    Readcs = 0x23,
    /// WRITE t, s: mem[t] <- s
    Write = 0x24,
    /// WRITEC a, s: mem[a] <- s
    Writec = 0x25,
    /// WRITES t, size: pop size bytes to mem[t]
    Writes = 0x26,
    /// WRITECS a, size: pop size bytes to mem[a]
    Writecs = 0x27,
    /// COPY t, size, s: mem[t] <- mem[s]
    Copy = 0x28,
    /// COPYC t, size, s: mem[t] <- mem[s], absolute addresses
    Copyc = 0x29,

    // ========== Control flow (0x30-0x36) ==========
    /// JMP a: IP <- a
    Jmp = 0x30,
    /// JMPR r: IP <- r
    Jmpr = 0x31,
    /// JZ a: if ZERO, IP <- a
    Jz = 0x32,
    /// JZR r: if ZERO, IP <- r
    Jzr = 0x33,
    /// CALL a: push frame, IP <- a
    Call = 0x34,
    /// CALLR r: push frame, IP <- r
    Callr = 0x35,
    /// RET: pop frame
    Ret = 0x36,

    // ========== System (0x40) ==========
    /// SYSCALL: pop a u16 id and dispatch
    Syscall = 0x40,
}

impl Opcode {
    /// Try to convert from the raw opcode byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Opcode::Nop),

            0x01 => Some(Opcode::Mov),
            0x02 => Some(Opcode::Loadi),
            0x03 => Some(Opcode::Rst),
            0x04 => Some(Opcode::Push),
            0x05 => Some(Opcode::Rpush),
            0x06 => Some(Opcode::Rpop),

            0x10 => Some(Opcode::Load),
            0x11 => Some(Opcode::Loadr),
            0x12 => Some(Opcode::Loads),
            0x13 => Some(Opcode::Loadsr),
            0x14 => Some(Opcode::Store),

            0x20 => Some(Opcode::Read),
            0x21 => Some(Opcode::Readc),
            0x22 => Some(Opcode::Reads),
            0x23 => Some(Opcode::Readcs),
            0x24 => Some(Opcode::Write),
            0x25 => Some(Opcode::Writec),
            0x26 => Some(Opcode::Writes),
            0x27 => Some(Opcode::Writecs),
            0x28 => Some(Opcode::Copy),
            0x29 => Some(Opcode::Copyc),

            0x30 => Some(Opcode::Jmp),
            0x31 => Some(Opcode::Jmpr),
            0x32 => Some(Opcode::Jz),
            0x33 => Some(Opcode::Jzr),
            0x34 => Some(Opcode::Call),
            0x35 => Some(Opcode::Callr),
            0x36 => Some(Opcode::Ret),

            0x40 => Some(Opcode::Syscall),

            _ => None,
        }
    }

    /// Convert to the raw opcode byte.
    #[inline]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Total encoded length in bytes, including the opcode byte, for
    /// fixed-length opcodes. `None` for `LOADI` and `PUSH`, whose length
    /// depends on the embedded u32 size field.
    pub const fn fixed_len(self) -> Option<u64> {
        match self {
            Opcode::Nop => Some(1),
            Opcode::Mov => Some(3),
            Opcode::Loadi => None,
            Opcode::Rst => Some(2),
            Opcode::Push => None,
            Opcode::Rpush => Some(2),
            Opcode::Rpop => Some(6),

            Opcode::Load => Some(14),
            Opcode::Loadr => Some(7),
            Opcode::Loads => Some(13),
            Opcode::Loadsr => Some(6),
            Opcode::Store => Some(10),

            Opcode::Read => Some(3),
            Opcode::Readc => Some(10),
            Opcode::Reads => Some(6),
            Opcode::Readcs => Some(13),
            Opcode::Write => Some(3),
            Opcode::Writec => Some(10),
            Opcode::Writes => Some(6),
            Opcode::Writecs => Some(13),
            Opcode::Copy => Some(7),
            Opcode::Copyc => Some(21),

            Opcode::Jmp => Some(9),
            Opcode::Jmpr => Some(2),
            Opcode::Jz => Some(9),
            Opcode::Jzr => Some(2),
            Opcode::Call => Some(9),
            Opcode::Callr => Some(2),
            Opcode::Ret => Some(1),

            Opcode::Syscall => Some(1),
        }
    }

    /// Check if this opcode carries a trailing payload sized by a u32 field.
    #[inline]
    pub const fn has_payload(self) -> bool {
        matches!(self, Opcode::Loadi | Opcode::Push)
    }

    /// Check if this opcode may write IP (and thereby opt out of the
    /// automatic advance).
    #[inline]
    pub const fn is_control_flow(self) -> bool {
        matches!(
            self,
            Opcode::Jmp
                | Opcode::Jmpr
                | Opcode::Jz
                | Opcode::Jzr
                | Opcode::Call
                | Opcode::Callr
                | Opcode::Ret
        )
    }

    /// Check if this opcode addresses memory relative to FP.
    #[inline]
    pub const fn is_frame_relative(self) -> bool {
        matches!(
            self,
            Opcode::Load | Opcode::Loadr | Opcode::Loads | Opcode::Loadsr | Opcode::Store
        )
    }

    /// Assembler mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Mov => "mov",
            Opcode::Loadi => "loadi",
            Opcode::Rst => "rst",
            Opcode::Push => "push",
            Opcode::Rpush => "rpush",
            Opcode::Rpop => "rpop",
            Opcode::Load => "load",
            Opcode::Loadr => "loadr",
            Opcode::Loads => "loads",
            Opcode::Loadsr => "loadsr",
            Opcode::Store => "store",
            Opcode::Read => "read",
            Opcode::Readc => "readc",
            Opcode::Reads => "reads",
            Opcode::Readcs => "readcs",
            Opcode::Write => "write",
            Opcode::Writec => "writec",
            Opcode::Writes => "writes",
            Opcode::Writecs => "writecs",
            Opcode::Copy => "copy",
            Opcode::Copyc => "copyc",
            Opcode::Jmp => "jmp",
            Opcode::Jmpr => "jmpr",
            Opcode::Jz => "jz",
            Opcode::Jzr => "jzr",
            Opcode::Call => "call",
            Opcode::Callr => "callr",
            Opcode::Ret => "ret",
            Opcode::Syscall => "syscall",
        }
    }

    /// Look a mnemonic up, ignoring any width suffix.
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        match name {
            "nop" => Some(Opcode::Nop),
            "mov" => Some(Opcode::Mov),
            "loadi" => Some(Opcode::Loadi),
            "rst" => Some(Opcode::Rst),
            "push" => Some(Opcode::Push),
            "rpush" => Some(Opcode::Rpush),
            "rpop" => Some(Opcode::Rpop),
            "load" => Some(Opcode::Load),
            "loadr" => Some(Opcode::Loadr),
            "loads" => Some(Opcode::Loads),
            "loadsr" => Some(Opcode::Loadsr),
            "store" => Some(Opcode::Store),
            "read" => Some(Opcode::Read),
            "readc" => Some(Opcode::Readc),
            "reads" => Some(Opcode::Reads),
            "readcs" => Some(Opcode::Readcs),
            "write" => Some(Opcode::Write),
            "writec" => Some(Opcode::Writec),
            "writes" => Some(Opcode::Writes),
            "writecs" => Some(Opcode::Writecs),
            "copy" => Some(Opcode::Copy),
            "copyc" => Some(Opcode::Copyc),
            "jmp" => Some(Opcode::Jmp),
            "jmpr" => Some(Opcode::Jmpr),
            "jz" => Some(Opcode::Jz),
            "jzr" => Some(Opcode::Jzr),
            "call" => Some(Opcode::Call),
            "callr" => Some(Opcode::Callr),
            "ret" => Some(Opcode::Ret),
            "syscall" => Some(Opcode::Syscall),
            _ => None,
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_values() {
        assert_eq!(Opcode::Nop.to_u8(), 0x00);
        assert_eq!(Opcode::Mov.to_u8(), 0x01);
        assert_eq!(Opcode::Rpop.to_u8(), 0x06);
        assert_eq!(Opcode::Load.to_u8(), 0x10);
        assert_eq!(Opcode::Store.to_u8(), 0x14);
        assert_eq!(Opcode::Read.to_u8(), 0x20);
        assert_eq!(Opcode::Copyc.to_u8(), 0x29);
        assert_eq!(Opcode::Jmp.to_u8(), 0x30);
        assert_eq!(Opcode::Ret.to_u8(), 0x36);
        assert_eq!(Opcode::Syscall.to_u8(), 0x40);
    }

    #[test]
    fn test_opcode_from_u8() {
        assert_eq!(Opcode::from_u8(0x00), Some(Opcode::Nop));
        assert_eq!(Opcode::from_u8(0x34), Some(Opcode::Call));
        assert_eq!(Opcode::from_u8(0x07), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_roundtrip_all() {
        for byte in 0..=255u8 {
            if let Some(op) = Opcode::from_u8(byte) {
                assert_eq!(op.to_u8(), byte);
                assert_eq!(Opcode::from_mnemonic(op.mnemonic()), Some(op));
            }
        }
    }

    #[test]
    fn test_fixed_lengths() {
        assert_eq!(Opcode::Nop.fixed_len(), Some(1));
        assert_eq!(Opcode::Mov.fixed_len(), Some(3));
        assert_eq!(Opcode::Load.fixed_len(), Some(14));
        assert_eq!(Opcode::Copyc.fixed_len(), Some(21));
        assert_eq!(Opcode::Jmp.fixed_len(), Some(9));
        assert_eq!(Opcode::Jmpr.fixed_len(), Some(2));
        assert_eq!(Opcode::Loadi.fixed_len(), None);
        assert_eq!(Opcode::Push.fixed_len(), None);
    }

    #[test]
    fn test_payload_opcodes() {
        assert!(Opcode::Loadi.has_payload());
        assert!(Opcode::Push.has_payload());
        assert!(!Opcode::Rpop.has_payload());
    }

    #[test]
    fn test_control_flow_set() {
        assert!(Opcode::Jmp.is_control_flow());
        assert!(Opcode::Call.is_control_flow());
        assert!(Opcode::Ret.is_control_flow());
        assert!(!Opcode::Nop.is_control_flow());
        assert!(!Opcode::Syscall.is_control_flow());
    }
}
