use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use argh::FromArgs;
use bytevm_runtime::Machine;
use bytevm_spec::DEFAULT_MEMORY_SIZE;

mod debugger;

/// Process exit code for usage errors and traps, as opposed to whatever
/// the guest program left in EXT.
const EXIT_USAGE: u8 = 2;

/// The bytevm toolchain: assemble images and execute them.
#[derive(FromArgs)]
struct Arguments {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunArguments),
    Build(BuildArguments),
}

/// Execute an image.
#[derive(FromArgs)]
#[argh(subcommand, name = "run")]
struct RunArguments {
    /// the image file to load
    #[argh(positional)]
    file: PathBuf,

    /// memory size in bytes (default 1 MiB)
    #[argh(option, short = 'm', default = "DEFAULT_MEMORY_SIZE")]
    memory: usize,

    /// start the interactive debugger instead of free-running
    #[argh(switch, short = 'd')]
    debug: bool,
}

/// Assemble a source file into an image.
#[derive(FromArgs)]
#[argh(subcommand, name = "build")]
struct BuildArguments {
    /// the assembly source file
    #[argh(positional)]
    file: PathBuf,

    /// output path (default: the input with a .bin extension)
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,

    /// print the listing and image digest
    #[argh(switch, short = 's')]
    summary: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let arguments = argh::from_env::<Arguments>();

    let code = match arguments.command {
        Command::Run(args) => run(&args),
        Command::Build(args) => build(&args),
    };
    ExitCode::from(code)
}

fn run(args: &RunArguments) -> u8 {
    let image = match fs::read(&args.file) {
        Ok(image) => image,
        Err(err) => {
            eprintln!("error: cannot read {}: {}", args.file.display(), err);
            return EXIT_USAGE;
        }
    };

    let mut machine = Machine::new(args.memory);
    if let Err(err) = machine.flash(&image) {
        eprintln!("error: {}", err);
        return EXIT_USAGE;
    }

    if args.debug {
        return match debugger::shell(&mut machine) {
            Ok(code) => code,
            Err(err) => {
                eprintln!("error: {}", err);
                EXIT_USAGE
            }
        };
    }

    machine.set_debug_handler(|arg| println!("debug: {:#x} ({})", arg, arg));
    match machine.start() {
        Ok(status) => {
            tracing::info!(cycles = status.cycles, code = status.exit_code, "halted");
            status.exit_code
        }
        Err(err) => {
            eprintln!("trap: {}", err);
            EXIT_USAGE
        }
    }
}

fn build(args: &BuildArguments) -> u8 {
    let source = match fs::read_to_string(&args.file) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: cannot read {}: {}", args.file.display(), err);
            return EXIT_USAGE;
        }
    };

    let image = match bytevm_assembler::assemble(&source) {
        Ok(image) => image,
        Err(err) => {
            eprintln!("error: {}", err);
            return 1;
        }
    };

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.file));
    if let Err(err) = fs::write(&output, &image.bytes) {
        eprintln!("error: cannot write {}: {}", output.display(), err);
        return EXIT_USAGE;
    }

    if args.summary {
        match bytevm_disassembler::disassemble(&image) {
            Ok(listing) => print!("{}", listing),
            Err(err) => eprintln!("warning: listing unavailable: {}", err),
        }
        for seg in &image.load_table {
            println!(
                "segment: file {:#x} size {} target {:#x}",
                seg.file_offset, seg.size, seg.target_address
            );
        }
        println!("sha256: {}", hex(&image.digest()));
    }

    println!("wrote {} ({} bytes)", output.display(), image.len());
    0
}

fn default_output(input: &Path) -> PathBuf {
    input.with_extension("bin")
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}
