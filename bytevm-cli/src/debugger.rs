//! Interactive debugger shell.
//!
//! Drives the machine exclusively through its public operations: `cycle_n`
//! for stepping, the register file and memory accessors for inspection,
//! and the decoder for listings. Runs on the same thread as the machine;
//! the DEBUGGER syscall handler prints its argument between steps.

use std::io::{self, BufRead, Write};

use bytevm_runtime::{Machine, VmError};
use bytevm_spec::{Reg, Width};

const HELP: &str = "\
commands:
  s, step [n]      execute n cycles (default 1)
  c, continue      run until the machine halts or traps
  r, regs          print registers
  x, mem ADDR LEN  hex dump LEN bytes at ADDR
  stack            dump the stack region
  l, list [n]      disassemble n instructions at IP (default 8)
  q, quit          leave the debugger
  h, help          this text";

/// Run the shell until quit or machine halt. Returns the process exit
/// code: EXT if the program exited, 0 on plain quit.
pub fn shell(machine: &mut Machine) -> io::Result<u8> {
    machine.set_debug_handler(|arg| println!("debug: {:#x} ({})", arg, arg));
    // The cycle loop only advances a powered-on machine; EXIT clears this.
    machine.registers_mut().write_u64(Reg::RUN, 1).expect("RUN is a valid register");

    println!(
        "image {} bytes, memory {} bytes; type help for commands",
        machine.executable_size(),
        machine.memory().len()
    );

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("(bvm) ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else { break };
        let line = line?;
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or("");

        match command {
            "" => {}
            "s" | "step" => {
                let n = parse_count(words.next(), 1);
                step(machine, n);
                if halted(machine) {
                    return Ok(exit_code(machine));
                }
            }
            "c" | "continue" => {
                step(machine, u64::MAX);
                if halted(machine) {
                    return Ok(exit_code(machine));
                }
            }
            "r" | "regs" => print_registers(machine),
            "x" | "mem" => {
                let addr = parse_number(words.next());
                let len = parse_number(words.next());
                match (addr, len) {
                    (Some(addr), Some(len)) => dump(machine, addr, len as usize),
                    _ => println!("usage: mem ADDR LEN"),
                }
            }
            "stack" => {
                let base = machine.executable_size();
                match machine.registers().read_u64(Reg::SP) {
                    Ok(sp) if sp >= base => dump(machine, base, (sp - base) as usize),
                    Ok(sp) => println!("sp {:#x} below stack base {:#x}", sp, base),
                    Err(err) => println!("error: {}", err),
                }
            }
            "l" | "list" => {
                let n = parse_count(words.next(), 8);
                list(machine, n);
            }
            "q" | "quit" => break,
            "h" | "help" => println!("{}", HELP),
            other => println!("unknown command '{}'; try help", other),
        }
    }

    Ok(0)
}

fn parse_number(word: Option<&str>) -> Option<u64> {
    let word = word?;
    if let Some(hex) = word.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else {
        word.parse().ok()
    }
}

fn parse_count(word: Option<&str>, default: u64) -> u64 {
    parse_number(word).unwrap_or(default)
}

fn halted(machine: &Machine) -> bool {
    !machine.is_running().unwrap_or(false)
}

fn exit_code(machine: &Machine) -> u8 {
    let code = machine.registers().read_u64(Reg::EXT).unwrap_or(0) as u8;
    println!("machine halted, exit code {}", code);
    code
}

/// Step up to `n` cycles, stopping early on halt or trap.
fn step(machine: &mut Machine, n: u64) {
    for _ in 0..n {
        match machine.cycle() {
            Ok(()) => {}
            Err(err) => {
                print_trap(&err);
                return;
            }
        }
        if halted(machine) {
            return;
        }
    }
    print_location(machine);
}

fn print_trap(err: &VmError) {
    println!("trap: {}", err);
}

fn print_location(machine: &Machine) {
    let Ok(ip) = machine.registers().read_u64(Reg::IP) else { return };
    match bytevm_disassembler::decode(machine.memory().as_slice(), ip) {
        Ok((inst, _)) => println!("{:#08x}  {}", ip, inst),
        Err(_) => println!("{:#08x}  ??", ip),
    }
}

fn print_registers(machine: &Machine) {
    let regs = machine.registers();
    let named: [(&str, Reg); 7] = [
        ("ax", Reg::AX),
        ("ip", Reg::IP),
        ("sp", Reg::SP),
        ("fp", Reg::FP),
        ("flags", Reg::FLAGS),
        ("run", Reg::RUN),
        ("ext", Reg::EXT),
    ];

    for code in 0..10u8 {
        let reg = Reg::new(code, Width::Quad);
        if let Ok(value) = regs.read_u64(reg) {
            print!("r{:<2} {:#018x}  ", code, value);
            if code % 4 == 3 {
                println!();
            }
        }
    }
    println!();
    for (name, reg) in named {
        if let Ok(value) = regs.read_u64(reg) {
            println!("{:<5} {:#x}", name, value);
        }
    }
}

/// Disassemble `n` instructions starting at IP.
fn list(machine: &Machine, n: u64) {
    let Ok(mut offset) = machine.registers().read_u64(Reg::IP) else { return };
    let bytes = machine.memory().as_slice();
    for _ in 0..n {
        match bytevm_disassembler::decode(bytes, offset) {
            Ok((inst, len)) => {
                println!("{:#08x}  {}", offset, inst);
                offset += len;
            }
            Err(err) => {
                println!("{:#08x}  <{}>", offset, err);
                break;
            }
        }
    }
}

fn dump(machine: &Machine, addr: u64, len: usize) {
    match machine.memory().read(addr, len) {
        Ok(bytes) => {
            for (i, row) in bytes.chunks(16).enumerate() {
                print!("{:#08x} ", addr + (i * 16) as u64);
                for byte in row {
                    print!(" {:02x}", byte);
                }
                println!();
            }
        }
        Err(err) => println!("error: {}", err),
    }
}
