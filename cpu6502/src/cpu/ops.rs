//! Instruction semantics. Each function implements one mnemonic's effect
//! on registers/memory; `Cpu::step` resolves the addressing mode and
//! dispatches here. Grouped by category (move, logical, jump) in a single
//! file rather than split across several small ones.

use crate::clock::Clock;
use crate::constants::{InterruptVector, STACK_PAGE};
use crate::cpu::operand::Operand;
use crate::cpu::Cpu;
use crate::error::CpuFault;
use crate::mapper::MemoryMapper;
use crate::opcodes::Instruction;
use crate::registers::StatusFlag;

impl Cpu {
    /// Apply one decoded instruction. Returns any cycles owed *beyond* the
    /// opcode's declared base cost — currently only branches (taken, and
    /// taken-with-page-cross) produce a nonzero value. Page-cross
    /// penalties on indexed loads/stores are applied by the caller
    /// directly from `resolve_operand`'s result, since those don't depend
    /// on anything `execute` computes.
    pub(crate) fn execute(
        &mut self,
        mapper: &mut MemoryMapper,
        clock: &mut Clock,
        instruction: Instruction,
        operand: Operand,
        operand_page_crossed: bool,
    ) -> Result<u8, CpuFault> {
        use Instruction::*;
        match instruction {
            LDA => self.load(mapper, clock, &operand, Register::A).map(|_| 0),
            LDX => self.load(mapper, clock, &operand, Register::X).map(|_| 0),
            LDY => self.load(mapper, clock, &operand, Register::Y).map(|_| 0),
            STA => self.store(mapper, clock, &operand, Register::A).map(|_| 0),
            STX => self.store(mapper, clock, &operand, Register::X).map(|_| 0),
            STY => self.store(mapper, clock, &operand, Register::Y).map(|_| 0),
            TAX => self.transfer(Register::A, Register::X).map(|_| 0),
            TAY => self.transfer(Register::A, Register::Y).map(|_| 0),
            TXA => self.transfer(Register::X, Register::A).map(|_| 0),
            TYA => self.transfer(Register::Y, Register::A).map(|_| 0),
            TSX => {
                self.registers.x = self.registers.stack_pointer;
                self.registers.update_zero_and_negative(self.registers.x);
                Ok(0)
            }
            TXS => {
                // Unlike the other transfers, TXS does not touch N/Z.
                self.registers.stack_pointer = self.registers.x;
                Ok(0)
            }
            PHA => self
                .push_u8(mapper, clock, self.registers.accumulator)
                .map(|_| 0),
            PHP => {
                // The pushed copy always has Break and Unused set; neither
                // bit is a real latch, only a snapshot taken at push time.
                let pushed = self.registers.status
                    | StatusFlag::Break as u8
                    | StatusFlag::Unused as u8;
                self.push_u8(mapper, clock, pushed).map(|_| 0)
            }
            PLA => {
                let value = self.pull_u8(mapper, clock)?;
                self.registers.accumulator = value;
                self.registers.update_zero_and_negative(value);
                Ok(0)
            }
            PLP => {
                let value = self.pull_u8(mapper, clock)?;
                // Break and Unused are never stored back into live status.
                self.registers.status =
                    (value & !(StatusFlag::Break as u8)) | StatusFlag::Unused as u8;
                Ok(0)
            }
            ORA => self.alu(mapper, clock, &operand, |a, v| a | v).map(|_| 0),
            AND => self.alu(mapper, clock, &operand, |a, v| a & v).map(|_| 0),
            EOR => self.alu(mapper, clock, &operand, |a, v| a ^ v).map(|_| 0),
            ADC => self
                .add_with_carry(mapper, clock, &operand, false)
                .map(|_| 0),
            SBC => self
                .add_with_carry(mapper, clock, &operand, true)
                .map(|_| 0),
            CMP => self
                .compare(mapper, clock, &operand, Register::A)
                .map(|_| 0),
            CPX => self
                .compare(mapper, clock, &operand, Register::X)
                .map(|_| 0),
            CPY => self
                .compare(mapper, clock, &operand, Register::Y)
                .map(|_| 0),
            BIT => self.bit(mapper, clock, &operand).map(|_| 0),
            INC => self
                .increment_memory(mapper, clock, &operand, 1)
                .map(|_| 0),
            DEC => self
                .increment_memory(mapper, clock, &operand, -1i8 as u8)
                .map(|_| 0),
            INX => self.increment_register(Register::X, 1).map(|_| 0),
            INY => self.increment_register(Register::Y, 1).map(|_| 0),
            DEX => self
                .increment_register(Register::X, -1i8 as u8)
                .map(|_| 0),
            DEY => self
                .increment_register(Register::Y, -1i8 as u8)
                .map(|_| 0),
            ASL => self
                .shift(mapper, clock, &operand, Shift::Left, false)
                .map(|_| 0),
            ROL => self
                .shift(mapper, clock, &operand, Shift::Left, true)
                .map(|_| 0),
            LSR => self
                .shift(mapper, clock, &operand, Shift::Right, false)
                .map(|_| 0),
            ROR => self
                .shift(mapper, clock, &operand, Shift::Right, true)
                .map(|_| 0),
            JMP => {
                self.registers.program_counter = operand_address(&operand);
                Ok(0)
            }
            JSR => self.jsr(mapper, clock, &operand).map(|_| 0),
            RTS => self.rts(mapper, clock).map(|_| 0),
            RTI => self.rti(mapper, clock).map(|_| 0),
            BRK => self.brk(mapper, clock).map(|_| 0),
            BPL => Ok(self.branch(
                &operand,
                !self.registers.is_flag_set(StatusFlag::Negative),
                operand_page_crossed,
            )),
            BMI => Ok(self.branch(
                &operand,
                self.registers.is_flag_set(StatusFlag::Negative),
                operand_page_crossed,
            )),
            BVC => Ok(self.branch(
                &operand,
                !self.registers.is_flag_set(StatusFlag::Overflow),
                operand_page_crossed,
            )),
            BVS => Ok(self.branch(
                &operand,
                self.registers.is_flag_set(StatusFlag::Overflow),
                operand_page_crossed,
            )),
            BCC => Ok(self.branch(
                &operand,
                !self.registers.is_flag_set(StatusFlag::Carry),
                operand_page_crossed,
            )),
            BCS => Ok(self.branch(
                &operand,
                self.registers.is_flag_set(StatusFlag::Carry),
                operand_page_crossed,
            )),
            BNE => Ok(self.branch(
                &operand,
                !self.registers.is_flag_set(StatusFlag::Zero),
                operand_page_crossed,
            )),
            BEQ => Ok(self.branch(
                &operand,
                self.registers.is_flag_set(StatusFlag::Zero),
                operand_page_crossed,
            )),
            CLC => Ok(self.set_flag(StatusFlag::Carry, false)),
            SEC => Ok(self.set_flag(StatusFlag::Carry, true)),
            CLD => Ok(self.set_flag(StatusFlag::Decimal, false)),
            SED => Ok(self.set_flag(StatusFlag::Decimal, true)),
            CLI => Ok(self.set_flag(StatusFlag::InterruptDisable, false)),
            SEI => Ok(self.set_flag(StatusFlag::InterruptDisable, true)),
            CLV => Ok(self.set_flag(StatusFlag::Overflow, false)),
            NOP => Ok(0),
            HLT => Err(CpuFault::ExecutionHalted { code: 0 }),
            HLT_IM => {
                let code = self.load_operand(mapper, clock, &operand)?;
                Err(CpuFault::ExecutionHalted { code })
            }
            HLT_ACC => Err(CpuFault::ExecutionHalted {
                code: self.registers.accumulator,
            }),
        }
    }

    fn set_flag(&mut self, flag: StatusFlag, value: bool) -> u8 {
        self.registers.set_flag(flag, value);
        0
    }

    fn load(
        &mut self,
        mapper: &mut MemoryMapper,
        clock: &mut Clock,
        operand: &Operand,
        register: Register,
    ) -> Result<(), CpuFault> {
        let value = self.load_operand(mapper, clock, operand)?;
        self.write_register(register, value);
        self.registers.update_zero_and_negative(value);
        Ok(())
    }

    fn store(
        &mut self,
        mapper: &mut MemoryMapper,
        clock: &mut Clock,
        operand: &Operand,
        register: Register,
    ) -> Result<(), CpuFault> {
        let value = self.read_register(register);
        self.store_operand(mapper, clock, operand, value)
    }

    fn transfer(&mut self, from: Register, to: Register) -> Result<(), CpuFault> {
        let value = self.read_register(from);
        self.write_register(to, value);
        self.registers.update_zero_and_negative(value);
        Ok(())
    }

    fn read_register(&self, register: Register) -> u8 {
        match register {
            Register::A => self.registers.accumulator,
            Register::X => self.registers.x,
            Register::Y => self.registers.y,
        }
    }

    fn write_register(&mut self, register: Register, value: u8) {
        match register {
            Register::A => self.registers.accumulator = value,
            Register::X => self.registers.x = value,
            Register::Y => self.registers.y = value,
        }
    }

    fn alu(
        &mut self,
        mapper: &mut MemoryMapper,
        clock: &mut Clock,
        operand: &Operand,
        f: impl Fn(u8, u8) -> u8,
    ) -> Result<(), CpuFault> {
        let value = self.load_operand(mapper, clock, operand)?;
        self.registers.accumulator = f(self.registers.accumulator, value);
        self.registers.update_zero_and_negative(self.registers.accumulator);
        Ok(())
    }

    /// `ADC`/`SBC` share one implementation: `SBC` is `ADC` of the
    /// one's complement of the operand, relying on the caller having set
    /// Carry beforehand (the convention every 6502 assembler follows —
    /// `SEC` before the first `SBC` in a multi-byte subtraction).
    fn add_with_carry(
        &mut self,
        mapper: &mut MemoryMapper,
        clock: &mut Clock,
        operand: &Operand,
        subtract: bool,
    ) -> Result<(), CpuFault> {
        let raw = self.load_operand(mapper, clock, operand)?;
        let value = if subtract { !raw } else { raw };

        if !subtract && self.decimal_mode_active() {
            self.add_decimal(value);
            return Ok(());
        }
        if subtract && self.decimal_mode_active() {
            self.subtract_decimal(raw);
            return Ok(());
        }

        let sum = self.registers.carry_bit() as u16
            + self.registers.accumulator as u16
            + value as u16;
        let result = sum as u8;

        self.registers.set_flag(StatusFlag::Carry, sum & 0x100 != 0);
        let overflow = (!(self.registers.accumulator ^ value) & (self.registers.accumulator ^ result)) & 0x80;
        self.registers.set_flag(StatusFlag::Overflow, overflow != 0);
        self.registers.accumulator = result;
        self.registers.update_zero_and_negative(result);
        Ok(())
    }

    fn decimal_mode_active(&self) -> bool {
        self.variant.supports_decimal_mode() && self.registers.is_flag_set(StatusFlag::Decimal)
    }

    /// Packed-BCD addition. `Zero` is still derived from the binary sum
    /// per documented NMOS behavior; `Negative`/`Overflow` are left as the
    /// binary ALU computed them, which is what real NMOS silicon does
    /// (their BCD values are meaningless but deterministic).
    fn add_decimal(&mut self, operand: u8) {
        let a = self.registers.accumulator;
        let carry = self.registers.carry_bit();

        let binary_sum = a as u16 + operand as u16 + carry as u16;
        self.registers.set_flag(StatusFlag::Zero, binary_sum as u8 == 0);

        let mut lo = (a & 0x0F) + (operand & 0x0F) + carry;
        let mut hi = (a >> 4) + (operand >> 4);
        if lo > 9 {
            lo += 6;
            hi += 1;
        }
        self.registers.set_flag(
            StatusFlag::Negative,
            (hi << 4) & 0x80 != 0,
        );
        let overflow = !(a ^ operand) & (a ^ ((hi << 4) | (lo & 0x0F))) & 0x80;
        self.registers.set_flag(StatusFlag::Overflow, overflow != 0);
        if hi > 9 {
            hi += 6;
        }
        self.registers.set_flag(StatusFlag::Carry, hi > 15);
        self.registers.accumulator = ((hi << 4) | (lo & 0x0F)) as u8;
    }

    fn subtract_decimal(&mut self, operand: u8) {
        let a = self.registers.accumulator;
        let carry = self.registers.carry_bit();

        let binary_diff = a as i16 - operand as i16 - (1 - carry as i16);
        let binary_result = binary_diff as u8;
        self.registers.set_flag(StatusFlag::Zero, binary_result == 0);
        self.registers.set_flag(StatusFlag::Negative, binary_result & 0x80 != 0);
        let overflow = (a ^ operand) & (a ^ binary_result) & 0x80;
        self.registers.set_flag(StatusFlag::Overflow, overflow != 0);
        self.registers.set_flag(StatusFlag::Carry, binary_diff >= 0);

        let mut lo = (a & 0x0F) as i16 - (operand & 0x0F) as i16 - (1 - carry as i16);
        let mut hi = (a >> 4) as i16 - (operand >> 4) as i16;
        if lo < 0 {
            lo += 10;
            hi -= 1;
        }
        if hi < 0 {
            hi += 10;
        }
        self.registers.accumulator = (((hi << 4) | (lo & 0x0F)) & 0xFF) as u8;
    }

    fn compare(
        &mut self,
        mapper: &mut MemoryMapper,
        clock: &mut Clock,
        operand: &Operand,
        register: Register,
    ) -> Result<(), CpuFault> {
        let value = self.load_operand(mapper, clock, operand)?;
        let register_value = self.read_register(register);
        self.registers
            .update_zero_and_negative(register_value.wrapping_sub(value));
        self.registers.set_flag(StatusFlag::Carry, register_value >= value);
        Ok(())
    }

    fn bit(
        &mut self,
        mapper: &mut MemoryMapper,
        clock: &mut Clock,
        operand: &Operand,
    ) -> Result<(), CpuFault> {
        let value = self.load_operand(mapper, clock, operand)?;
        self.registers
            .set_flag(StatusFlag::Negative, value & 0b1000_0000 != 0);
        self.registers
            .set_flag(StatusFlag::Overflow, value & 0b0100_0000 != 0);
        self.registers
            .set_flag(StatusFlag::Zero, value & self.registers.accumulator == 0);
        Ok(())
    }

    fn increment_memory(
        &mut self,
        mapper: &mut MemoryMapper,
        clock: &mut Clock,
        operand: &Operand,
        delta: u8,
    ) -> Result<(), CpuFault> {
        let value = self.load_operand(mapper, clock, operand)?;
        let result = value.wrapping_add(delta);
        self.store_operand(mapper, clock, operand, result)?;
        self.registers.update_zero_and_negative(result);
        Ok(())
    }

    fn increment_register(&mut self, register: Register, delta: u8) -> Result<(), CpuFault> {
        let result = self.read_register(register).wrapping_add(delta);
        self.write_register(register, result);
        self.registers.update_zero_and_negative(result);
        Ok(())
    }

    fn shift(
        &mut self,
        mapper: &mut MemoryMapper,
        clock: &mut Clock,
        operand: &Operand,
        direction: Shift,
        rotate: bool,
    ) -> Result<(), CpuFault> {
        let value = self.load_operand(mapper, clock, operand)?;
        let carry_in = self.registers.carry_bit();
        let (result, carry_out) = match direction {
            Shift::Left => {
                let result = (value << 1) | if rotate { carry_in } else { 0 };
                (result, value & 0b1000_0000 != 0)
            }
            Shift::Right => {
                let result = (value >> 1) | if rotate { carry_in << 7 } else { 0 };
                (result, value & 0b0000_0001 != 0)
            }
        };
        self.store_operand(mapper, clock, operand, result)?;
        self.registers.set_flag(StatusFlag::Carry, carry_out);
        self.registers.update_zero_and_negative(result);
        Ok(())
    }

    /// `resolve_operand` has already computed the branch target (base `PC`
    /// plus the signed displacement) and whether reaching it crosses a
    /// page boundary. All that's left is to decide whether the branch is
    /// taken and, if so, charge the standard 1-cycle taken penalty plus a
    /// second cycle if the target is on a different page.
    fn branch(&mut self, operand: &Operand, take: bool, target_page_crossed: bool) -> u8 {
        if !take {
            return 0;
        }
        self.registers.program_counter = operand_address(operand);
        if target_page_crossed {
            2
        } else {
            1
        }
    }

    pub(crate) fn push_u8(&mut self, mapper: &mut MemoryMapper, clock: &mut Clock, value: u8) -> Result<(), CpuFault> {
        let address = u16::from_le_bytes([self.registers.stack_pointer, STACK_PAGE]);
        mapper.store(clock, address, value)?;
        self.registers.stack_pointer = self.registers.stack_pointer.wrapping_sub(1);
        Ok(())
    }

    pub(crate) fn pull_u8(&mut self, mapper: &mut MemoryMapper, clock: &mut Clock) -> Result<u8, CpuFault> {
        self.registers.stack_pointer = self.registers.stack_pointer.wrapping_add(1);
        let address = u16::from_le_bytes([self.registers.stack_pointer, STACK_PAGE]);
        Ok(mapper.load(clock, address)?)
    }

    pub(crate) fn push_u16(&mut self, mapper: &mut MemoryMapper, clock: &mut Clock, value: u16) -> Result<(), CpuFault> {
        let [lo, hi] = value.to_le_bytes();
        self.push_u8(mapper, clock, hi)?;
        self.push_u8(mapper, clock, lo)
    }

    pub(crate) fn pull_u16(&mut self, mapper: &mut MemoryMapper, clock: &mut Clock) -> Result<u16, CpuFault> {
        let lo = self.pull_u8(mapper, clock)?;
        let hi = self.pull_u8(mapper, clock)?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// `JSR` pushes the address of its *last* operand byte, not the
    /// address of the next instruction — `RTS` compensates by adding one
    /// back after popping. This is the real 6502 convention; the return
    /// address on the stack is `target - 1`.
    fn jsr(&mut self, mapper: &mut MemoryMapper, clock: &mut Clock, operand: &Operand) -> Result<(), CpuFault> {
        let target = operand_address(operand);
        let return_to = self.registers.program_counter.wrapping_sub(1);
        self.push_u16(mapper, clock, return_to)?;
        self.registers.program_counter = target;
        Ok(())
    }

    fn rts(&mut self, mapper: &mut MemoryMapper, clock: &mut Clock) -> Result<(), CpuFault> {
        let return_to = self.pull_u16(mapper, clock)?;
        self.registers.program_counter = return_to.wrapping_add(1);
        Ok(())
    }

    /// `BRK` is a two-byte instruction even though its operand is
    /// unused: the pushed return address is `PC + 1` (skipping the
    /// padding byte that conventionally follows `BRK`), and the pushed
    /// status byte has `Break` set so `RTI` can tell a software break from
    /// a hardware `IRQ`.
    fn brk(&mut self, mapper: &mut MemoryMapper, clock: &mut Clock) -> Result<(), CpuFault> {
        let return_to = self.registers.program_counter.wrapping_add(1);
        self.push_u16(mapper, clock, return_to)?;
        let pushed = self.registers.status | StatusFlag::Break as u8 | StatusFlag::Unused as u8;
        self.push_u8(mapper, clock, pushed)?;
        self.registers.set_flag(StatusFlag::InterruptDisable, true);
        self.registers.program_counter =
            self.read_u16_at(mapper, clock, InterruptVector::IrqBrk.address())?;
        Ok(())
    }

    fn rti(&mut self, mapper: &mut MemoryMapper, clock: &mut Clock) -> Result<(), CpuFault> {
        let status = self.pull_u8(mapper, clock)?;
        self.registers.status = (status & !(StatusFlag::Break as u8)) | StatusFlag::Unused as u8;
        self.registers.program_counter = self.pull_u16(mapper, clock)?;
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Register {
    A,
    X,
    Y,
}

#[derive(Clone, Copy)]
enum Shift {
    Left,
    Right,
}

fn operand_address(operand: &Operand) -> u16 {
    match operand {
        Operand::Address(address) => *address,
        Operand::Accumulator => unreachable!("jump/branch targets are never the accumulator"),
    }
}
