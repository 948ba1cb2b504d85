//! Instruction encoder: `Instruction` values to wire bytes.

use bytevm_spec::{Instruction, Reg};

fn put_reg(out: &mut Vec<u8>, reg: Reg) {
    out.push(reg.to_byte());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Append the encoding of one instruction.
pub fn encode_into(inst: &Instruction, out: &mut Vec<u8>) {
    out.push(inst.opcode().to_u8());

    match inst {
        Instruction::Nop | Instruction::Ret | Instruction::Syscall => {}

        Instruction::Mov { dst, src } => {
            put_reg(out, *dst);
            put_reg(out, *src);
        }
        Instruction::Loadi { dst, value } => {
            put_reg(out, *dst);
            put_u32(out, value.len() as u32);
            out.extend_from_slice(value);
        }
        Instruction::Rst { dst } => put_reg(out, *dst),
        Instruction::Push { value } => {
            put_u32(out, value.len() as u32);
            out.extend_from_slice(value);
        }
        Instruction::Rpush { src } => put_reg(out, *src),
        Instruction::Rpop { dst, size } => {
            put_reg(out, *dst);
            put_u32(out, *size);
        }

        Instruction::Load { dst, size, offset } => {
            put_reg(out, *dst);
            put_u32(out, *size);
            put_i64(out, *offset);
        }
        Instruction::Loadr { dst, size, offset } => {
            put_reg(out, *dst);
            put_u32(out, *size);
            put_reg(out, *offset);
        }
        Instruction::Loads { size, offset } => {
            put_u32(out, *size);
            put_i64(out, *offset);
        }
        Instruction::Loadsr { size, offset } => {
            put_u32(out, *size);
            put_reg(out, *offset);
        }
        Instruction::Store { offset, src } => {
            put_i64(out, *offset);
            put_reg(out, *src);
        }

        Instruction::Read { dst, addr } => {
            put_reg(out, *dst);
            put_reg(out, *addr);
        }
        Instruction::Readc { dst, addr } => {
            put_reg(out, *dst);
            put_u64(out, *addr);
        }
        Instruction::Reads { size, addr } => {
            put_u32(out, *size);
            put_reg(out, *addr);
        }
        Instruction::Readcs { size, addr } => {
            put_u32(out, *size);
            put_u64(out, *addr);
        }
        Instruction::Write { dst, src } => {
            put_reg(out, *dst);
            put_reg(out, *src);
        }
        Instruction::Writec { addr, src } => {
            put_u64(out, *addr);
            put_reg(out, *src);
        }
        Instruction::Writes { dst, size } => {
            put_reg(out, *dst);
            put_u32(out, *size);
        }
        Instruction::Writecs { addr, size } => {
            put_u64(out, *addr);
            put_u32(out, *size);
        }
        Instruction::Copy { dst, size, src } => {
            put_reg(out, *dst);
            put_u32(out, *size);
            put_reg(out, *src);
        }
        Instruction::Copyc { dst, size, src } => {
            put_u64(out, *dst);
            put_u32(out, *size);
            put_u64(out, *src);
        }

        Instruction::Jmp { addr } => put_u64(out, *addr),
        Instruction::Jmpr { addr } => put_reg(out, *addr),
        Instruction::Jz { addr } => put_u64(out, *addr),
        Instruction::Jzr { addr } => put_reg(out, *addr),
        Instruction::Call { addr } => put_u64(out, *addr),
        Instruction::Callr { addr } => put_reg(out, *addr),
    }
}

/// Encode one instruction.
pub fn encode(inst: &Instruction) -> Vec<u8> {
    let mut out = Vec::with_capacity(inst.encoded_len() as usize);
    encode_into(inst, &mut out);
    out
}

/// Encode a straight-line sequence of instructions into image bytes.
pub fn encode_program(instructions: &[Instruction]) -> Vec<u8> {
    let mut out = Vec::new();
    for inst in instructions {
        encode_into(inst, &mut out);
    }
    out
}
