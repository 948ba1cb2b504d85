//! Per-opcode execution semantics.
//!
//! Operand values arrive already decoded; this module applies their
//! register, memory, and IP effects. Frame-relative addresses are computed
//! in two's complement, so an offset that lands below zero wraps to a huge
//! address and fails the bounds check of the access it provokes.

use crate::error::Result;
use crate::syscall::handle_syscall;
use crate::vm::Machine;
use bytevm_spec::{Instruction, Reg, FLAG_ZERO};

/// Absolute address of `FP + offset`.
fn frame_addr(m: &Machine, offset: i64) -> Result<u64> {
    let fp = m.regs.read_u64(Reg::FP)?;
    Ok((fp as i64).wrapping_add(offset) as u64)
}

fn zero_flag(m: &Machine) -> Result<bool> {
    Ok(m.regs.read_u64(Reg::FLAGS)? & FLAG_ZERO as u64 != 0)
}

/// Establish a callee frame: push saved FP and the return address, then
/// point FP at the frame base and jump.
///
/// The return address is the byte after the call instruction itself,
/// computed from its encoded length, never from the instruction at the
/// call target.
fn enter_frame(m: &mut Machine, return_address: u64, target: u64) -> Result<()> {
    let frame_base = m.regs.read_u64(Reg::SP)?;
    let saved_fp = m.regs.read_u64(Reg::FP)?;
    m.stack_write(&saved_fp.to_le_bytes())?;
    m.stack_write(&return_address.to_le_bytes())?;
    m.regs.write_u64(Reg::FP, frame_base)?;
    m.regs.write_u64(Reg::IP, target)
}

/// Tear a frame down: restore FP and IP from the frame, and drop the
/// argument area plus its 32-bit bytecount header. The return-value slot
/// below the arguments is left for the caller.
fn leave_frame(m: &mut Machine) -> Result<()> {
    let frame_base = m.regs.read_u64(Reg::FP)?;
    let saved_fp = m.memory.read_u64(frame_base)?;
    let return_address = m.memory.read_u64(frame_base + 8)?;
    let argc = m.memory.read_u32(frame_base.wrapping_sub(4))?;

    m.regs.write_u64(Reg::SP, frame_base.wrapping_sub(4 + argc as u64))?;
    m.regs.write_u64(Reg::FP, saved_fp)?;
    m.regs.write_u64(Reg::IP, return_address)
}

/// Execute one instruction fetched at `ip`.
pub fn execute(m: &mut Machine, inst: &Instruction, ip: u64) -> Result<()> {
    match inst {
        Instruction::Nop => {}

        // ========== Data movement ==========
        Instruction::Mov { dst, src } => {
            let bytes = m.regs.read(*src)?.to_vec();
            m.regs.write(*dst, &bytes)?;
        }

        Instruction::Loadi { dst, value } => {
            m.regs.write(*dst, value)?;
        }

        Instruction::Rst { dst } => {
            m.regs.write(*dst, &[])?;
        }

        Instruction::Push { value } => {
            m.stack_write(value)?;
        }

        Instruction::Rpush { src } => {
            let bytes = m.regs.read(*src)?.to_vec();
            m.stack_write(&bytes)?;
        }

        Instruction::Rpop { dst, size } => {
            let bytes = m.stack_pop(*size as usize)?;
            m.regs.write(*dst, &bytes)?;
        }

        // ========== Frame-relative memory ==========
        Instruction::Load { dst, size, offset } => {
            let addr = frame_addr(m, *offset)?;
            let bytes = m.memory.read(addr, *size as usize)?.to_vec();
            m.regs.write(*dst, &bytes)?;
        }

        Instruction::Loadr { dst, size, offset } => {
            let offset = m.regs.read_i64(*offset)?;
            let addr = frame_addr(m, offset)?;
            let bytes = m.memory.read(addr, *size as usize)?.to_vec();
            m.regs.write(*dst, &bytes)?;
        }

        Instruction::Loads { size, offset } => {
            let addr = frame_addr(m, *offset)?;
            let bytes = m.memory.read(addr, *size as usize)?.to_vec();
            m.stack_write(&bytes)?;
        }

        Instruction::Loadsr { size, offset } => {
            let offset = m.regs.read_i64(*offset)?;
            let addr = frame_addr(m, offset)?;
            let bytes = m.memory.read(addr, *size as usize)?.to_vec();
            m.stack_write(&bytes)?;
        }

        Instruction::Store { offset, src } => {
            let addr = frame_addr(m, *offset)?;
            let bytes = m.regs.read(*src)?.to_vec();
            m.memory.write(addr, &bytes)?;
        }

        // ========== Absolute memory ==========
        Instruction::Read { dst, addr } => {
            let addr = m.regs.read_u64(*addr)?;
            let bytes = m.memory.read(addr, dst.bytecount())?.to_vec();
            m.regs.write(*dst, &bytes)?;
        }

        Instruction::Readc { dst, addr } => {
            let bytes = m.memory.read(*addr, dst.bytecount())?.to_vec();
            m.regs.write(*dst, &bytes)?;
        }

        Instruction::Reads { size, addr } => {
            let addr = m.regs.read_u64(*addr)?;
            let bytes = m.memory.read(addr, *size as usize)?.to_vec();
            m.stack_write(&bytes)?;
        }

        Instruction::Readcs { size, addr } => {
            let bytes = m.memory.read(*addr, *size as usize)?.to_vec();
            m.stack_write(&bytes)?;
        }

        Instruction::Write { dst, src } => {
            let addr = m.regs.read_u64(*dst)?;
            let bytes = m.regs.read(*src)?.to_vec();
            m.memory.write(addr, &bytes)?;
        }

        Instruction::Writec { addr, src } => {
            let bytes = m.regs.read(*src)?.to_vec();
            m.memory.write(*addr, &bytes)?;
        }

        Instruction::Writes { dst, size } => {
            let addr = m.regs.read_u64(*dst)?;
            let bytes = m.stack_pop(*size as usize)?;
            m.memory.write(addr, &bytes)?;
        }

        Instruction::Writecs { addr, size } => {
            let bytes = m.stack_pop(*size as usize)?;
            m.memory.write(*addr, &bytes)?;
        }

        Instruction::Copy { dst, size, src } => {
            let src_addr = m.regs.read_u64(*src)?;
            let dst_addr = m.regs.read_u64(*dst)?;
            let bytes = m.memory.read(src_addr, *size as usize)?.to_vec();
            m.memory.write(dst_addr, &bytes)?;
        }

        Instruction::Copyc { dst, size, src } => {
            let bytes = m.memory.read(*src, *size as usize)?.to_vec();
            m.memory.write(*dst, &bytes)?;
        }

        // ========== Control flow ==========
        Instruction::Jmp { addr } => {
            m.regs.write_u64(Reg::IP, *addr)?;
        }

        Instruction::Jmpr { addr } => {
            let target = m.regs.read_u64(*addr)?;
            m.regs.write_u64(Reg::IP, target)?;
        }

        Instruction::Jz { addr } => {
            if zero_flag(m)? {
                m.regs.write_u64(Reg::IP, *addr)?;
            }
        }

        Instruction::Jzr { addr } => {
            if zero_flag(m)? {
                let target = m.regs.read_u64(*addr)?;
                m.regs.write_u64(Reg::IP, target)?;
            }
        }

        Instruction::Call { addr } => {
            enter_frame(m, ip + inst.encoded_len(), *addr)?;
        }

        Instruction::Callr { addr } => {
            let target = m.regs.read_u64(*addr)?;
            enter_frame(m, ip + inst.encoded_len(), target)?;
        }

        Instruction::Ret => {
            leave_frame(m)?;
        }

        Instruction::Syscall => {
            handle_syscall(m)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytevm_spec::Width;

    fn machine_with_stack() -> Machine {
        let mut m = Machine::new(1024);
        m.flash(&[]).unwrap();
        m
    }

    #[test]
    fn test_mov_copies_source_width() {
        let mut m = machine_with_stack();
        m.regs.write_u64(Reg::R0, 0x1122334455667788).unwrap();

        let inst = Instruction::Mov {
            dst: Reg::R1,
            src: Reg::R0.with_width(Width::Half),
        };
        execute(&mut m, &inst, 0).unwrap();
        assert_eq!(m.regs.read_u64(Reg::R1).unwrap(), 0x7788);
    }

    #[test]
    fn test_rst_zeroes() {
        let mut m = machine_with_stack();
        m.regs.write_u64(Reg::R3, 99).unwrap();
        execute(&mut m, &Instruction::Rst { dst: Reg::R3 }, 0).unwrap();
        assert_eq!(m.regs.read_u64(Reg::R3).unwrap(), 0);
    }

    #[test]
    fn test_store_then_load_frame_relative() {
        let mut m = machine_with_stack();
        // Put the frame somewhere with room on both sides.
        m.regs.write_u64(Reg::FP, 0x100).unwrap();
        m.regs.write_u64(Reg::R0, 0xABCD).unwrap();

        execute(&mut m, &Instruction::Store { offset: 16, src: Reg::R0 }, 0).unwrap();
        execute(
            &mut m,
            &Instruction::Load { dst: Reg::R1, size: 8, offset: 16 },
            0,
        )
        .unwrap();
        assert_eq!(m.regs.read_u64(Reg::R1).unwrap(), 0xABCD);

        // Negative offsets address below the frame base.
        execute(&mut m, &Instruction::Store { offset: -8, src: Reg::R0 }, 0).unwrap();
        assert_eq!(m.memory.read_u64(0x100 - 8).unwrap(), 0xABCD);
    }

    #[test]
    fn test_loadr_uses_register_offset() {
        let mut m = machine_with_stack();
        m.regs.write_u64(Reg::FP, 0x80).unwrap();
        m.memory.write_u64(0x78, 0x5A5A).unwrap();
        m.regs.write_u64(Reg::R2, (-8i64) as u64).unwrap();

        let inst = Instruction::Loadr { dst: Reg::R1, size: 8, offset: Reg::R2 };
        execute(&mut m, &inst, 0).unwrap();
        assert_eq!(m.regs.read_u64(Reg::R1).unwrap(), 0x5A5A);
    }

    #[test]
    fn test_negative_frame_address_traps() {
        let mut m = machine_with_stack();
        m.regs.write_u64(Reg::FP, 4).unwrap();

        let inst = Instruction::Load { dst: Reg::R1, size: 8, offset: -16 };
        let err = execute(&mut m, &inst, 0).unwrap_err();
        // FP-16 wraps below zero into an address no memory can satisfy.
        assert!(matches!(err, crate::VmError::IllegalMemoryAccess { .. }));
    }

    #[test]
    fn test_read_uses_destination_width() {
        let mut m = machine_with_stack();
        m.memory.write_u64(0x40, 0xDDCCBBAA99887766).unwrap();
        m.regs.write_u64(Reg::R0, 0x40).unwrap();

        let inst = Instruction::Read {
            dst: Reg::R1.with_width(Width::Word),
            addr: Reg::R0,
        };
        execute(&mut m, &inst, 0).unwrap();
        assert_eq!(m.regs.read_u64(Reg::R1).unwrap(), 0x99887766);
    }

    #[test]
    fn test_read_past_end_reports_address() {
        let mut m = machine_with_stack();
        m.regs.write_u64(Reg::R0, 1024).unwrap();

        let inst = Instruction::Read { dst: Reg::R1, addr: Reg::R0 };
        let err = execute(&mut m, &inst, 0).unwrap_err();
        assert_eq!(
            err,
            crate::VmError::IllegalMemoryAccess { address: 1024, ip: 0 }
        );
    }

    #[test]
    fn test_write_and_copy_between_addresses() {
        let mut m = machine_with_stack();
        m.regs.write_u64(Reg::R0, 0x200).unwrap();
        m.regs.write_u64(Reg::R1, 0x1234567890).unwrap();

        execute(&mut m, &Instruction::Write { dst: Reg::R0, src: Reg::R1 }, 0).unwrap();
        assert_eq!(m.memory.read_u64(0x200).unwrap(), 0x1234567890);

        execute(
            &mut m,
            &Instruction::Copyc { dst: 0x300, size: 8, src: 0x200 },
            0,
        )
        .unwrap();
        assert_eq!(m.memory.read_u64(0x300).unwrap(), 0x1234567890);
    }

    #[test]
    fn test_jz_only_on_zero_flag() {
        let mut m = machine_with_stack();

        // ZERO clear: IP untouched.
        execute(&mut m, &Instruction::Jz { addr: 0x50 }, 0).unwrap();
        assert_eq!(m.regs.read_u64(Reg::IP).unwrap(), 0);

        // ZERO set: branch taken.
        m.regs.write(Reg::FLAGS, &[FLAG_ZERO]).unwrap();
        execute(&mut m, &Instruction::Jz { addr: 0x50 }, 0).unwrap();
        assert_eq!(m.regs.read_u64(Reg::IP).unwrap(), 0x50);
    }

    #[test]
    fn test_call_lays_out_frame() {
        let mut m = machine_with_stack();
        let sp0 = m.regs.read_u64(Reg::SP).unwrap();
        let fp0 = m.regs.read_u64(Reg::FP).unwrap();

        let call = Instruction::Call { addr: 0x90 };
        execute(&mut m, &call, 0x10).unwrap();

        // Frame base is the SP at call time.
        assert_eq!(m.regs.read_u64(Reg::FP).unwrap(), sp0);
        assert_eq!(m.regs.read_u64(Reg::IP).unwrap(), 0x90);
        assert_eq!(m.regs.read_u64(Reg::SP).unwrap(), sp0 + 16);
        // Saved FP at [FP], return address at [FP+8].
        assert_eq!(m.memory.read_u64(sp0).unwrap(), fp0);
        assert_eq!(m.memory.read_u64(sp0 + 8).unwrap(), 0x10 + call.encoded_len());
    }

    #[test]
    fn test_call_ret_consumes_arguments() {
        let mut m = machine_with_stack();

        // Caller convention: return slot, one 8-byte argument, bytecount.
        m.stack_write(&0u64.to_le_bytes()).unwrap(); // return-value slot
        m.stack_write(&42u64.to_le_bytes()).unwrap(); // argument
        m.stack_write(&8u32.to_le_bytes()).unwrap(); // argument_bytecount
        let sp_before_call = m.regs.read_u64(Reg::SP).unwrap();

        execute(&mut m, &Instruction::Call { addr: 0x200 }, 0x20).unwrap();

        // Callee reads its argument at FP-12.
        let mut callee = Instruction::Load { dst: Reg::R0, size: 8, offset: -12 };
        execute(&mut m, &callee, 0x200).unwrap();
        assert_eq!(m.regs.read_u64(Reg::R0).unwrap(), 42);
        // And the bytecount at FP-4.
        callee = Instruction::Load {
            dst: Reg::R1.with_width(Width::Word),
            size: 4,
            offset: -4,
        };
        execute(&mut m, &callee, 0x200).unwrap();
        assert_eq!(m.regs.read_u64(Reg::R1).unwrap(), 8);

        execute(&mut m, &Instruction::Ret, 0x210).unwrap();

        // Arguments and bytecount gone, return slot still there.
        assert_eq!(m.regs.read_u64(Reg::SP).unwrap(), sp_before_call - 12);
        assert_eq!(
            m.regs.read_u64(Reg::IP).unwrap(),
            0x20 + Instruction::Call { addr: 0 }.encoded_len()
        );
        assert_eq!(m.regs.read_u64(Reg::FP).unwrap(), m.executable_size());
    }
}
