//! Syscall router.
//!
//! `SYSCALL` pops a 16-bit id from the stack and dispatches. The id space
//! is stable ABI (`bytevm_spec::syscall_ids`); unknown ids trap.

use crate::error::{Result, VmError};
use crate::vm::Machine;
use bytevm_spec::{syscall_ids, Reg};

/// Pop a syscall id and run it against the machine.
pub fn handle_syscall(m: &mut Machine) -> Result<()> {
    let id = m.stack_pop_u16()?;

    match id {
        // Pop an exit code byte; latch it into R0 and EXT, clear RUN so the
        // machine stops after this cycle.
        syscall_ids::EXIT => {
            let code = m.stack_pop_u8()?;
            tracing::debug!(code, "exit syscall");
            m.regs.write(Reg::R0, &[code])?;
            m.regs.write(Reg::EXT, &[code])?;
            m.regs.write(Reg::RUN, &[0])?;
        }

        // Pop a u64 argument and hand it to the registered handler; without
        // a handler this is a no-op.
        syscall_ids::DEBUGGER => {
            let arg = m.stack_pop_u64()?;
            tracing::debug!(arg, "debugger syscall");
            if let Some(handler) = m.debug_handler.as_mut() {
                handler(arg);
            }
        }

        // Double linear memory. Existing contents keep their addresses.
        syscall_ids::GROW => {
            let size = m.memory.len() * 2;
            tracing::debug!(size, "grow syscall");
            m.memory.grow(size);
        }

        id => return Err(VmError::InvalidSyscall { id }),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> Machine {
        let mut m = Machine::new(512);
        m.flash(&[]).unwrap();
        m
    }

    #[test]
    fn test_exit_latches_code_and_clears_run() {
        let mut m = machine();
        m.regs.write(Reg::RUN, &[1]).unwrap();
        m.stack_write(&[7]).unwrap();
        m.stack_write(&syscall_ids::EXIT.to_le_bytes()).unwrap();

        handle_syscall(&mut m).unwrap();

        assert_eq!(m.regs.read_u64(Reg::R0).unwrap(), 7);
        assert_eq!(m.regs.read_u64(Reg::EXT).unwrap(), 7);
        assert_eq!(m.regs.read_u64(Reg::RUN).unwrap(), 0);
    }

    #[test]
    fn test_debugger_without_handler_is_noop() {
        let mut m = machine();
        m.stack_write(&0xAAAAu64.to_le_bytes()).unwrap();
        m.stack_write(&syscall_ids::DEBUGGER.to_le_bytes()).unwrap();

        handle_syscall(&mut m).unwrap();
        // Argument and id consumed.
        assert_eq!(m.regs.read_u64(Reg::SP).unwrap(), 0);
    }

    #[test]
    fn test_grow_doubles() {
        let mut m = machine();
        m.stack_write(&syscall_ids::GROW.to_le_bytes()).unwrap();
        handle_syscall(&mut m).unwrap();
        assert_eq!(m.memory.len(), 1024);
    }

    #[test]
    fn test_unknown_id_traps() {
        let mut m = machine();
        m.stack_write(&999u16.to_le_bytes()).unwrap();
        let err = handle_syscall(&mut m).unwrap_err();
        assert_eq!(err, VmError::InvalidSyscall { id: 999 });
    }
}
