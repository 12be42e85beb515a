//! The external harness that wires the library crate together end to
//! end: read a `.s` file, assemble it, load it into a flat RAM-backed
//! `MemoryMapper`, and run it to halt or timeout. Everything this binary
//! does — device-factory wiring, configuration files, hex dumps — beyond
//! that loop is deliberately out of scope; see the library crate for the
//! actual CPU/assembler/mapper contract.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use cpu6502::asm::Compiler;
use cpu6502::constants::TEST_ENTRY_LABEL;
use cpu6502::opcodes::InstructionSetVariant;
use cpu6502::simulation::Simulation;

#[derive(Parser)]
#[command(author, version, about = "A MOS 6502 assembler and execution harness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a source file and run it to halt or timeout.
    Run(RunArgs),
}

#[derive(Parser)]
struct RunArgs {
    /// Path to a `.s` assembly source file.
    path: PathBuf,

    /// Which instruction-set variant to assemble and execute against.
    #[arg(long, value_enum, default_value_t = Variant::Emu)]
    variant: Variant,

    /// Wall-clock execution budget before `ExecutionTimeout` is raised.
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum Variant {
    Default,
    Nmos6502,
    Emu,
}

impl From<Variant> for InstructionSetVariant {
    fn from(variant: Variant) -> InstructionSetVariant {
        match variant {
            Variant::Default => InstructionSetVariant::Default,
            Variant::Nmos6502 => InstructionSetVariant::NMOS6502,
            Variant::Emu => InstructionSetVariant::NMOS6502Emu,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let source = std::fs::read_to_string(&args.path)
        .with_context(|| format!("failed to read {}", args.path.display()))?;

    let variant: InstructionSetVariant = args.variant.into();
    let file_name = args.path.to_string_lossy().to_string();
    let compiler = Compiler::new(&file_name, variant);

    let program = compiler.compile_str(&source).map_err(|err| {
        eprintln!("{}", err.render(&source));
        anyhow::anyhow!("assembly failed")
    })?;

    let mut simulation = Simulation::with_flat_ram(variant);
    simulation.load_program(&program)?;

    if program.labels.contains_key(TEST_ENTRY_LABEL) {
        simulation.jump_to_label(&program, TEST_ENTRY_LABEL);
    } else {
        simulation.reset()?;
    }

    let outcome = simulation.run(Duration::from_millis(args.timeout_ms))?;

    println!("cycles: {}", outcome.cycles);
    match outcome.halt_code {
        Some(code) => println!("halted with code {:#04x}", code),
        None => println!("stopped without an explicit halt"),
    }

    Ok(())
}
