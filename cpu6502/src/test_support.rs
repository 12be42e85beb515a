//! Test-only glue, gated behind `#[cfg(test)]`/`feature = "test-support"`.
//! Assembles a fixture, loads it at the bottom of a flat RAM, jumps to
//! `TEST_ENTRY` if the program defines it (otherwise just starts at the
//! program's origin), and runs it to halt.

use std::time::Duration;

use crate::asm::Compiler;
use crate::constants::TEST_ENTRY_LABEL;
use crate::cpu::Cpu;
use crate::opcodes::InstructionSetVariant;
use crate::simulation::{Simulation, SimulationError};

/// Assemble `src` under `NMOS6502Emu`, load it, jump to `TEST_ENTRY` (or
/// leave `PC` at whatever the assembler set by default, `0x0000`, if the
/// program doesn't define that label), and run to halt with a generous
/// one-second timeout. Panics — via `unwrap` — on an assembler error or a
/// bus fault, since both indicate a broken fixture rather than an
/// expected test outcome.
pub fn run_to_halt(src: &str) -> (Cpu, u64) {
    let program = Compiler::for_variant(InstructionSetVariant::NMOS6502Emu)
        .compile_str(src)
        .expect("fixture source failed to assemble");

    let mut sim = Simulation::with_flat_ram(InstructionSetVariant::NMOS6502Emu);
    sim.load_program(&program).expect("fixture program failed to load");
    sim.jump_to_label(&program, TEST_ENTRY_LABEL);

    let outcome = sim
        .run(Duration::from_secs(1))
        .expect("fixture program did not halt cleanly");
    (sim.cpu().clone(), outcome.cycles)
}

/// Same as `run_to_halt`, but surfaces a fault instead of panicking, for
/// tests that specifically want to assert on the error.
pub fn try_run_to_halt(src: &str) -> Result<(Cpu, u64), SimulationError> {
    let program = Compiler::for_variant(InstructionSetVariant::NMOS6502Emu)
        .compile_str(src)
        .expect("fixture source failed to assemble");

    let mut sim = Simulation::with_flat_ram(InstructionSetVariant::NMOS6502Emu);
    sim.load_program(&program).expect("fixture program failed to load");
    sim.jump_to_label(&program, TEST_ENTRY_LABEL);

    let outcome = sim.run(Duration::from_secs(1))?;
    Ok((sim.cpu().clone(), outcome.cycles))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn run_to_halt_executes_up_to_the_halt_instruction() {
        let (cpu, cycles) = run_to_halt("TEST_ENTRY:\nLDA #$2A\nHLT_ACC\n");
        assert_eq!(cpu.registers.accumulator, 0x2A);
        assert_eq!(cycles, 3);
    }

    #[test]
    fn run_to_halt_falls_back_to_the_program_origin_without_test_entry() {
        let (cpu, _) = run_to_halt("LDX #$05\nHLT_IM 9\n");
        assert_eq!(cpu.registers.x, 0x05);
    }
}
