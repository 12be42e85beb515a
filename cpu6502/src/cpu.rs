//! The execution core: decode/dispatch loop, interrupt servicing, and the
//! timeout-bounded run loop the test harness and CLI drive programs
//! through.

mod operand;
mod ops;

use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::constants::InterruptVector;
use crate::error::CpuFault;
use crate::mapper::MemoryMapper;
use crate::opcodes::{self, InstructionSetVariant};
use crate::registers::{Registers, StatusFlag};

/// An interrupt request the host can raise between instructions. Checked
/// only at instruction boundaries — never mid-instruction — matching the
/// `ExecuteWithTimeout` invariant that timing only ever changes between
/// whole instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Nmi,
    Irq,
}

#[derive(Clone)]
pub struct Cpu {
    pub registers: Registers,
    pub variant: InstructionSetVariant,
    pending_interrupt: Option<Interrupt>,
}

impl Cpu {
    pub fn new() -> Cpu {
        Cpu::with_variant(InstructionSetVariant::Default)
    }

    pub fn with_variant(variant: InstructionSetVariant) -> Cpu {
        Cpu {
            registers: Registers::new(),
            variant,
            pending_interrupt: None,
        }
    }

    /// Load `PC` from the reset vector, as real hardware does on power-up.
    /// Registers otherwise keep their `Registers::new()` defaults.
    pub fn reset(&mut self, mapper: &mut MemoryMapper, clock: &mut Clock) -> Result<(), CpuFault> {
        self.registers.program_counter =
            self.read_u16_at(mapper, clock, InterruptVector::Reset.address())?;
        Ok(())
    }

    /// Queue an `NMI`/`IRQ`. Serviced the next time `step` is called,
    /// before the next opcode is fetched; `IRQ` is still subject to the
    /// `InterruptDisable` flag, `NMI` never is.
    pub fn request_interrupt(&mut self, interrupt: Interrupt) {
        if interrupt == Interrupt::Nmi || !self.registers.is_flag_set(StatusFlag::InterruptDisable)
        {
            self.pending_interrupt = Some(interrupt);
        }
    }

    /// Execute exactly one instruction (servicing a pending interrupt
    /// first, if any), charging the clock for the opcode's declared cost
    /// plus whatever page-cross/branch-taken penalties apply.
    pub fn step(&mut self, mapper: &mut MemoryMapper, clock: &mut Clock) -> Result<(), CpuFault> {
        if let Some(interrupt) = self.pending_interrupt.take() {
            self.service_interrupt(mapper, clock, interrupt)?;
        }

        let cycle_start = clock.current_cycle();
        let opcode = mapper.load(clock, self.registers.program_counter)?;
        self.registers.program_counter = self.registers.program_counter.wrapping_add(1);

        let info = opcodes::lookup(self.variant, opcode)
            .ok_or(CpuFault::InvalidOpcode(opcode))?;

        let (operand, operand_crossed) = self.resolve_operand(mapper, clock, info.mode)?;

        let outcome = self.execute(mapper, clock, info.instruction, operand, operand_crossed);

        let address_penalty = if info.page_cross_extra && operand_crossed {
            1
        } else {
            0
        };

        let branch_extra = match outcome {
            Ok(extra) => extra,
            Err(fault) => {
                // Even a halting/faulting instruction has already paid for
                // its own opcode+operand fetch; top up to its declared
                // base cost before propagating so `cycles_elapsed` stays
                // accurate for `ExecutionTimeout`/diagnostics.
                self.charge_remaining_cycles(clock, cycle_start, info.base_cycles as u64);
                return Err(fault);
            }
        };

        let target = info.base_cycles as u64 + address_penalty as u64 + branch_extra as u64;
        self.charge_remaining_cycles(clock, cycle_start, target);

        Ok(())
    }

    fn charge_remaining_cycles(&self, clock: &mut Clock, cycle_start: u64, target: u64) {
        while clock.current_cycle() - cycle_start < target {
            clock.wait_for_next_cycle();
        }
    }

    /// The standard 7-cycle interrupt sequence: push `PC` and status
    /// (with `Break` clear, unlike `BRK`), set `InterruptDisable`, and
    /// load `PC` from the interrupt's vector.
    fn service_interrupt(
        &mut self,
        mapper: &mut MemoryMapper,
        clock: &mut Clock,
        interrupt: Interrupt,
    ) -> Result<(), CpuFault> {
        let cycle_start = clock.current_cycle();
        self.push_u16(mapper, clock, self.registers.program_counter)?;
        let pushed = (self.registers.status & !(StatusFlag::Break as u8)) | StatusFlag::Unused as u8;
        self.push_u8(mapper, clock, pushed)?;
        self.registers.set_flag(StatusFlag::InterruptDisable, true);
        let vector = match interrupt {
            Interrupt::Nmi => InterruptVector::Nmi,
            Interrupt::Irq => InterruptVector::IrqBrk,
        };
        self.registers.program_counter = self.read_u16_at(mapper, clock, vector.address())?;
        self.charge_remaining_cycles(clock, cycle_start, 7);
        Ok(())
    }

    /// Run until `HLT` halts execution, a bus fault propagates, or
    /// `deadline` elapses. The deadline is only ever checked between
    /// instructions, never mid-instruction, so timing stays deterministic
    /// regardless of host scheduling jitter.
    pub fn execute_with_timeout(
        &mut self,
        mapper: &mut MemoryMapper,
        clock: &mut Clock,
        timeout: Duration,
    ) -> Result<u8, CpuFault> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.step(mapper, clock) {
                Ok(()) => {
                    if Instant::now() >= deadline {
                        log::info!(
                            "execution timed out after {} cycles",
                            clock.current_cycle()
                        );
                        return Err(CpuFault::ExecutionTimeout {
                            cycles_elapsed: clock.current_cycle(),
                        });
                    }
                }
                Err(CpuFault::ExecutionHalted { code }) => {
                    log::info!("halted with code {:#04x}", code);
                    return Ok(code);
                }
                Err(fault) => return Err(fault),
            }
        }
    }
}

impl Default for Cpu {
    fn default() -> Cpu {
        Cpu::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::memory::Ram;

    fn harness() -> (Cpu, MemoryMapper, Clock) {
        let mut mapper = MemoryMapper::strict();
        mapper.map_area(0x0000, 0xFFFF, Box::new(Ram::new(0x10000)));
        (Cpu::new(), mapper, Clock::new())
    }

    fn load(mapper: &mut MemoryMapper, clock: &mut Clock, addr: u16, bytes: &[u8]) {
        for (i, byte) in bytes.iter().enumerate() {
            mapper.store(clock, addr + i as u16, *byte).unwrap();
        }
    }

    #[test]
    fn inx_wraps_and_takes_two_cycles() {
        let (mut cpu, mut mapper, mut clock) = harness();
        cpu = Cpu::with_variant(InstructionSetVariant::NMOS6502Emu);
        cpu.registers.program_counter = 0x0200;
        load(&mut mapper, &mut clock, 0x0200, &[0xE8]); // INX
        cpu.registers.x = 0xFF;

        clock = Clock::new();
        cpu.step(&mut mapper, &mut clock).unwrap();
        assert_eq!(cpu.registers.x, 0);
        assert!(cpu.registers.is_flag_set(StatusFlag::Zero));
        assert_eq!(clock.current_cycle(), 2);
    }

    #[test]
    fn lda_immediate_then_hlt_acc_reports_accumulator_as_halt_code() {
        let (mut cpu, mut mapper, mut clock) = harness();
        cpu = Cpu::with_variant(InstructionSetVariant::NMOS6502Emu);
        cpu.registers.program_counter = 0x0200;
        load(&mut mapper, &mut clock, 0x0200, &[0xA9, 0x2A, 0x22]); // LDA #$2A; HLT_ACC
        clock = Clock::new();

        let code = cpu
            .execute_with_timeout(&mut mapper, &mut clock, Duration::from_secs(1))
            .unwrap();
        assert_eq!(code, 0x2A);
        assert_eq!(clock.current_cycle(), 3); // 2 (LDA imm) + 1 (HLT_ACC)
    }

    #[test]
    fn branch_not_taken_skips_the_penalty() {
        let (mut cpu, mut mapper, mut clock) = harness();
        cpu.registers.program_counter = 0x0200;
        // BNE +2, with Zero set so it's not taken.
        load(&mut mapper, &mut clock, 0x0200, &[0xD0, 0x02]);
        cpu.registers.set_flag(StatusFlag::Zero, true);
        clock = Clock::new();

        cpu.step(&mut mapper, &mut clock).unwrap();
        assert_eq!(clock.current_cycle(), 2);
        assert_eq!(cpu.registers.program_counter, 0x0202);
    }

    #[test]
    fn branch_taken_across_a_page_boundary_costs_two_extra_cycles() {
        let (mut cpu, mut mapper, mut clock) = harness();
        cpu.registers.program_counter = 0x00FE;
        // BPL +$7F, taken; target crosses from page $00 to page $01.
        load(&mut mapper, &mut clock, 0x00FE, &[0x10, 0x7F]);
        clock = Clock::new();

        cpu.step(&mut mapper, &mut clock).unwrap();
        assert_eq!(clock.current_cycle(), 4);
        assert_eq!(cpu.registers.program_counter, 0x017F);
    }

    #[test]
    fn jsr_then_rts_returns_to_the_instruction_after_jsr() {
        let (mut cpu, mut mapper, mut clock) = harness();
        cpu.registers.program_counter = 0x0200;
        cpu.registers.stack_pointer = 0xFD;
        load(&mut mapper, &mut clock, 0x0200, &[0x20, 0x00, 0x03]); // JSR $0300
        load(&mut mapper, &mut clock, 0x0300, &[0x60]); // RTS
        clock = Clock::new();

        cpu.step(&mut mapper, &mut clock).unwrap(); // JSR
        assert_eq!(cpu.registers.program_counter, 0x0300);
        cpu.step(&mut mapper, &mut clock).unwrap(); // RTS
        assert_eq!(cpu.registers.program_counter, 0x0203);
    }

    #[test]
    fn jmp_indirect_reproduces_the_page_boundary_bug() {
        let (mut cpu, mut mapper, mut clock) = harness();
        cpu.registers.program_counter = 0x0400;
        load(&mut mapper, &mut clock, 0x0400, &[0x6C, 0xFF, 0x02]); // JMP ($02FF)
        // Low byte read from $02FF, high byte from $0200 (not $0300) —
        // the pointer never carries into its own high byte.
        load(&mut mapper, &mut clock, 0x02FF, &[0x34]);
        load(&mut mapper, &mut clock, 0x0300, &[0x12]);
        load(&mut mapper, &mut clock, 0x0200, &[0x78]);
        clock = Clock::new();

        cpu.step(&mut mapper, &mut clock).unwrap();
        assert_eq!(cpu.registers.program_counter, 0x7834);
    }

    #[test]
    fn adc_sets_carry_and_overflow_on_signed_overflow() {
        let (mut cpu, mut mapper, mut clock) = harness();
        cpu.registers.program_counter = 0x0200;
        load(&mut mapper, &mut clock, 0x0200, &[0x18, 0xA9, 0x7F, 0x69, 0x01]); // CLC; LDA #$7F; ADC #$01
        clock = Clock::new();

        cpu.step(&mut mapper, &mut clock).unwrap();
        cpu.step(&mut mapper, &mut clock).unwrap();
        cpu.step(&mut mapper, &mut clock).unwrap();

        assert_eq!(cpu.registers.accumulator, 0x80);
        assert!(cpu.registers.is_flag_set(StatusFlag::Negative));
        assert!(cpu.registers.is_flag_set(StatusFlag::Overflow));
        assert!(!cpu.registers.is_flag_set(StatusFlag::Carry));
        assert!(!cpu.registers.is_flag_set(StatusFlag::Zero));
    }

    #[test]
    fn adc_in_decimal_mode_carries_between_bcd_digits() {
        let (mut cpu, mut mapper, mut clock) = harness();
        cpu.variant = InstructionSetVariant::NMOS6502Emu;
        cpu.registers.program_counter = 0x0200;
        // SED; CLC; LDA #$58; ADC #$46 -> 58 + 46 = 104 in BCD.
        load(
            &mut mapper,
            &mut clock,
            0x0200,
            &[0xF8, 0x18, 0xA9, 0x58, 0x69, 0x46],
        );
        clock = Clock::new();

        for _ in 0..4 {
            cpu.step(&mut mapper, &mut clock).unwrap();
        }

        assert_eq!(cpu.registers.accumulator, 0x04);
        assert!(cpu.registers.is_flag_set(StatusFlag::Carry));
    }

    #[test]
    fn sbc_in_decimal_mode_borrows_between_bcd_digits() {
        let (mut cpu, mut mapper, mut clock) = harness();
        cpu.variant = InstructionSetVariant::NMOS6502Emu;
        cpu.registers.program_counter = 0x0200;
        // SED; SEC; LDA #$12; SBC #$34 -> 12 - 34 borrows to 78.
        load(
            &mut mapper,
            &mut clock,
            0x0200,
            &[0xF8, 0x38, 0xA9, 0x12, 0xE9, 0x34],
        );
        clock = Clock::new();

        for _ in 0..4 {
            cpu.step(&mut mapper, &mut clock).unwrap();
        }

        assert_eq!(cpu.registers.accumulator, 0x78);
        assert!(!cpu.registers.is_flag_set(StatusFlag::Carry));
    }

    #[test]
    fn decimal_flag_is_ignored_on_the_default_variant() {
        let (mut cpu, mut mapper, mut clock) = harness();
        cpu.variant = InstructionSetVariant::Default;
        cpu.registers.program_counter = 0x0200;
        // SED; CLC; LDA #$58; ADC #$46 -> binary sum $9E, BCD would be $04.
        load(
            &mut mapper,
            &mut clock,
            0x0200,
            &[0xF8, 0x18, 0xA9, 0x58, 0x69, 0x46],
        );
        clock = Clock::new();

        for _ in 0..4 {
            cpu.step(&mut mapper, &mut clock).unwrap();
        }

        assert_eq!(cpu.registers.accumulator, 0x9E);
    }

    #[test]
    fn unmapped_opcode_fetch_is_a_bus_fault_not_a_panic() {
        let mut mapper = MemoryMapper::strict();
        mapper.map_area(0x0000, 0x00FF, Box::new(Ram::new(0x100)));
        let mut clock = Clock::new();
        let mut cpu = Cpu::new();
        cpu.registers.program_counter = 0x8000;

        assert!(cpu.step(&mut mapper, &mut clock).is_err());
    }

    #[test]
    fn invalid_opcode_is_reported_rather_than_silently_skipped() {
        let (mut cpu, mut mapper, mut clock) = harness();
        cpu.registers.program_counter = 0x0200;
        // $02 is unassigned outside the Emu variant.
        load(&mut mapper, &mut clock, 0x0200, &[0x02]);
        clock = Clock::new();

        assert!(matches!(
            cpu.step(&mut mapper, &mut clock),
            Err(CpuFault::InvalidOpcode(0x02))
        ));
    }
}
