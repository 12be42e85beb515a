//! The debugger / simulation harness: owns a `Clock`, a `MemoryMapper`, and
//! a `Cpu`, wires them together, and runs a loaded program to halt or
//! timeout. Mirrors the original project's `EmuSimulation` / `Result` /
//! `SimulationFailedException` trio (`simulation.hpp`), reimplemented as a
//! `Result<SimulationOutcome, SimulationError>` instead of an exception
//! that carries a partial result alongside it.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::asm::Program;
use crate::clock::Clock;
use crate::cpu::Cpu;
use crate::error::CpuFault;
use crate::mapper::MemoryMapper;
use crate::memory::Ram;
use crate::opcodes::InstructionSetVariant;

/// The aggregate result of a run, whether it halted cleanly or faulted.
/// Always available, even on failure, so a caller can report "ran for N
/// cycles before X" rather than just "X".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub duration: Duration,
    pub cycles: u64,
    pub halt_code: Option<u8>,
}

/// Wraps a `CpuFault` that unwound out of `Simulation::run`, preserving the
/// aggregate result alongside it. The original project raises this as
/// `SimulationFailedException`, carrying its own `Result` plus the
/// original exception; this carries the fault by value instead of by
/// `exception_ptr`, since Rust errors are values, not stack unwinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("simulation failed after {} cycles: {fault}", outcome.cycles)]
pub struct SimulationError {
    pub fault: CpuFault,
    pub outcome: SimulationOutcome,
}

/// Owns the clock, the bus, and the CPU, and controls the order they're
/// torn down in: CPU first, then the mapper (and whatever devices it
/// owns), then the clock — never the reverse, since devices may hold
/// non-owning references back into the clock while they're alive.
pub struct Simulation {
    clock: Clock,
    mapper: MemoryMapper,
    cpu: Cpu,
}

impl Simulation {
    pub fn new(variant: InstructionSetVariant, mapper: MemoryMapper) -> Simulation {
        Simulation {
            clock: Clock::new(),
            mapper,
            cpu: Cpu::with_variant(variant),
        }
    }

    /// A simulation with a single RAM area spanning the full address
    /// space — the shape the CLI harness builds for `emu6502-cli run`.
    pub fn with_flat_ram(variant: InstructionSetVariant) -> Simulation {
        let mut mapper = MemoryMapper::strict();
        mapper.map_area(0x0000, 0xFFFF, Box::new(Ram::new(0x10000)));
        Simulation::new(variant, mapper)
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn mapper_mut(&mut self) -> &mut MemoryMapper {
        &mut self.mapper
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Copy every byte of `program`'s sparse image into the underlying
    /// bus, one `MemoryMapper::store` per byte so the usual access rules
    /// (overlap-free areas, strict/permissive miss handling) apply exactly
    /// as they would for any other write.
    pub fn load_program(&mut self, program: &Program) -> Result<(), CpuFault> {
        for (&address, &byte) in &program.sparse_binary_code {
            self.mapper.store(&mut self.clock, address, byte)?;
        }
        Ok(())
    }

    /// Jump straight to `label`'s resolved address, bypassing
    /// `Cpu::reset`. Used to start execution at `TEST_ENTRY` (or any other
    /// label) instead of whatever the reset vector happens to contain.
    pub fn jump_to_label(&mut self, program: &Program, label: &str) -> Option<()> {
        let offset = program.labels.get(label)?.offset?;
        self.cpu.registers.program_counter = offset;
        Some(())
    }

    /// Pull `PC` from the reset vector, as real power-on does.
    pub fn reset(&mut self) -> Result<(), CpuFault> {
        self.cpu.reset(&mut self.mapper, &mut self.clock)
    }

    /// Run until `HLT`, a bus fault, or `timeout` elapses, returning the
    /// aggregate result either way.
    pub fn run(&mut self, timeout: Duration) -> Result<SimulationOutcome, SimulationError> {
        let started = Instant::now();
        match self
            .cpu
            .execute_with_timeout(&mut self.mapper, &mut self.clock, timeout)
        {
            Ok(halt_code) => Ok(SimulationOutcome {
                duration: started.elapsed(),
                cycles: self.clock.current_cycle(),
                halt_code: Some(halt_code),
            }),
            Err(fault) => {
                let outcome = SimulationOutcome {
                    duration: started.elapsed(),
                    cycles: self.clock.current_cycle(),
                    halt_code: None,
                };
                log::info!(
                    "simulation faulted after {} cycles: {}",
                    outcome.cycles,
                    fault
                );
                Err(SimulationError { fault, outcome })
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::asm::Compiler;

    #[test]
    fn assembles_loads_and_runs_to_halt() {
        let program = Compiler::for_variant(InstructionSetVariant::NMOS6502Emu)
            .compile_str("LDA #$2A\nHLT_ACC\n")
            .unwrap();

        let mut sim = Simulation::with_flat_ram(InstructionSetVariant::NMOS6502Emu);
        sim.load_program(&program).unwrap();
        let outcome = sim.run(Duration::from_secs(1)).unwrap();

        assert_eq!(outcome.halt_code, Some(0x2A));
        assert_eq!(outcome.cycles, 3);
    }

    #[test]
    fn unmapped_store_surfaces_as_a_simulation_error_with_a_partial_outcome() {
        let mut mapper = MemoryMapper::strict();
        mapper.map_area(0x0000, 0x7FFF, Box::new(Ram::new(0x8000)));
        let mut sim = Simulation::new(InstructionSetVariant::NMOS6502Emu, mapper);

        let program = Compiler::for_variant(InstructionSetVariant::NMOS6502Emu)
            .compile_str("STA $C000\n")
            .unwrap();
        sim.load_program(&program).unwrap();

        let err = sim.run(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err.fault, CpuFault::Bus(_)));
        assert_eq!(err.outcome.halt_code, None);
    }

    #[test]
    fn jump_to_label_starts_execution_at_test_entry() {
        let program = Compiler::for_variant(InstructionSetVariant::NMOS6502Emu)
            .compile_str("JMP SKIP\n.byte $FF\nTEST_ENTRY:\nLDA #$07\nHLT_ACC\nSKIP:\nJMP TEST_ENTRY\n")
            .unwrap();

        let mut sim = Simulation::with_flat_ram(InstructionSetVariant::NMOS6502Emu);
        sim.load_program(&program).unwrap();
        sim.jump_to_label(&program, "TEST_ENTRY").unwrap();
        let outcome = sim.run(Duration::from_secs(1)).unwrap();

        assert_eq!(outcome.halt_code, Some(0x07));
    }
}
