//! Addressing-mode resolution: turning an opcode's `AddressMode` into the
//! effective address (and, where one exists, the operand byte already read
//! from it).
//!
//! http://www.emulator101.com/6502-addressing-modes.html

use crate::clock::Clock;
use crate::cpu::Cpu;
use crate::error::CpuFault;
use crate::mapper::MemoryMapper;
use crate::opcodes::AddressMode;

/// The effective address an instruction operates on, or `None` for
/// `Accumulator`/`Implied` instructions that have no memory operand at
/// all and work directly on a register.
pub enum Operand {
    Address(u16),
    Accumulator,
}

impl Cpu {
    fn fetch_u8(&mut self, mapper: &mut MemoryMapper, clock: &mut Clock) -> Result<u8, CpuFault> {
        let value = mapper.load(clock, self.registers.program_counter)?;
        self.registers.program_counter = self.registers.program_counter.wrapping_add(1);
        Ok(value)
    }

    fn fetch_u16(&mut self, mapper: &mut MemoryMapper, clock: &mut Clock) -> Result<u16, CpuFault> {
        let lo = self.fetch_u8(mapper, clock)?;
        let hi = self.fetch_u8(mapper, clock)?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// Read a 16-bit value at `addr` without the zero-page-wraparound bug
    /// that `indirect_address` reproduces — used for absolute-indirect
    /// reads other than the `JMP (abs)` high-byte fetch.
    fn read_u16(&mut self, mapper: &mut MemoryMapper, clock: &mut Clock, addr: u16) -> Result<u16, CpuFault> {
        let lo = mapper.load(clock, addr)?;
        let hi = mapper.load(clock, addr.wrapping_add(1))?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// Resolve `mode`'s effective address, charging the mandatory operand
    /// fetch cycles along the way by ticking `clock` through `mapper`.
    /// Returns whether an indexed access crossed a page boundary, so the
    /// caller can decide whether to charge the mode's `page_cross_extra`
    /// cycle.
    pub(crate) fn resolve_operand(
        &mut self,
        mapper: &mut MemoryMapper,
        clock: &mut Clock,
        mode: AddressMode,
    ) -> Result<(Operand, bool), CpuFault> {
        match mode {
            AddressMode::Implied => Ok((Operand::Address(0), false)),
            AddressMode::Accumulator => Ok((Operand::Accumulator, false)),
            AddressMode::Immediate => {
                let address = self.registers.program_counter;
                self.registers.program_counter = self.registers.program_counter.wrapping_add(1);
                Ok((Operand::Address(address), false))
            }
            AddressMode::Relative => {
                // `base` is captured before the operand byte is fetched —
                // the address that byte lives at — matching how
                // `AbsoluteX`/`AbsoluteY`/`IndirectY` compare their
                // pre-index `base` against the final address. Capturing it
                // after the fetch would compare the target's page against
                // the address right past the whole instruction, which for
                // `PC=$80FE; BNE +4` lands on the same page as the target
                // and misses the crossing entirely.
                let base = self.registers.program_counter;
                let offset = self.fetch_u8(mapper, clock)? as i8;
                let target = self.registers.program_counter.wrapping_add(offset as i16 as u16);
                Ok((Operand::Address(target), crosses_page(base, target)))
            }
            AddressMode::ZeroPage => {
                let zp = self.fetch_u8(mapper, clock)?;
                Ok((Operand::Address(zp as u16), false))
            }
            AddressMode::ZeroPageX => {
                let zp = self.fetch_u8(mapper, clock)?.wrapping_add(self.registers.x);
                Ok((Operand::Address(zp as u16), false))
            }
            AddressMode::ZeroPageY => {
                let zp = self.fetch_u8(mapper, clock)?.wrapping_add(self.registers.y);
                Ok((Operand::Address(zp as u16), false))
            }
            AddressMode::Absolute => {
                let address = self.fetch_u16(mapper, clock)?;
                Ok((Operand::Address(address), false))
            }
            AddressMode::AbsoluteX => {
                let base = self.fetch_u16(mapper, clock)?;
                let address = base.wrapping_add(self.registers.x as u16);
                Ok((Operand::Address(address), crosses_page(base, address)))
            }
            AddressMode::AbsoluteY => {
                let base = self.fetch_u16(mapper, clock)?;
                let address = base.wrapping_add(self.registers.y as u16);
                Ok((Operand::Address(address), crosses_page(base, address)))
            }
            AddressMode::Indirect => {
                let pointer = self.fetch_u16(mapper, clock)?;
                Ok((Operand::Address(self.indirect_address(mapper, clock, pointer)?), false))
            }
            AddressMode::IndirectX => {
                // The pointer lives entirely in zero page, and wraps there:
                // `($FF,X)` never reads from $0100.
                let zp = self.fetch_u8(mapper, clock)?.wrapping_add(self.registers.x);
                let lo = mapper.load(clock, zp as u16)?;
                let hi = mapper.load(clock, zp.wrapping_add(1) as u16)?;
                Ok((Operand::Address(u16::from_le_bytes([lo, hi])), false))
            }
            AddressMode::IndirectY => {
                let zp = self.fetch_u8(mapper, clock)?;
                let lo = mapper.load(clock, zp as u16)?;
                let hi = mapper.load(clock, zp.wrapping_add(1) as u16)?;
                let base = u16::from_le_bytes([lo, hi]);
                let address = base.wrapping_add(self.registers.y as u16);
                Ok((Operand::Address(address), crosses_page(base, address)))
            }
        }
    }

    /// `JMP (abs)` reads its target through a pointer, reproducing the
    /// well-known hardware bug: if the pointer's low byte is `$FF`, the
    /// high byte is fetched from `pointer & $FF00` instead of from
    /// `pointer + 1`, because the real CPU never carries into the high
    /// byte of the pointer itself.
    fn indirect_address(
        &mut self,
        mapper: &mut MemoryMapper,
        clock: &mut Clock,
        pointer: u16,
    ) -> Result<u16, CpuFault> {
        let lo = mapper.load(clock, pointer)?;
        let hi_addr = if pointer & 0x00FF == 0x00FF {
            pointer & 0xFF00
        } else {
            pointer.wrapping_add(1)
        };
        let hi = mapper.load(clock, hi_addr)?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// Load the byte an operand refers to: the accumulator for
    /// `Operand::Accumulator`, otherwise whatever's at its address.
    pub(crate) fn load_operand(
        &mut self,
        mapper: &mut MemoryMapper,
        clock: &mut Clock,
        operand: &Operand,
    ) -> Result<u8, CpuFault> {
        match operand {
            Operand::Accumulator => Ok(self.registers.accumulator),
            Operand::Address(address) => Ok(mapper.load(clock, *address)?),
        }
    }

    /// Store a byte back through an operand, writing the accumulator
    /// directly for `Operand::Accumulator`.
    pub(crate) fn store_operand(
        &mut self,
        mapper: &mut MemoryMapper,
        clock: &mut Clock,
        operand: &Operand,
        value: u8,
    ) -> Result<(), CpuFault> {
        match operand {
            Operand::Accumulator => {
                self.registers.accumulator = value;
                Ok(())
            }
            Operand::Address(address) => Ok(mapper.store(clock, *address, value)?),
        }
    }

    pub(crate) fn read_u16_at(
        &mut self,
        mapper: &mut MemoryMapper,
        clock: &mut Clock,
        addr: u16,
    ) -> Result<u16, CpuFault> {
        self.read_u16(mapper, clock, addr)
    }
}

fn crosses_page(base: u16, offset: u16) -> bool {
    base & 0xFF00 != offset & 0xFF00
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::memory::Ram;

    fn cpu_with_program(bytes: &[u8]) -> (Cpu, MemoryMapper, Clock) {
        let mut mapper = MemoryMapper::strict();
        let mut ram = Ram::new(0x10000);
        ram.write_sparse(bytes.iter().enumerate().map(|(i, b)| (i as u16, *b)));
        mapper.map_area(0x0000, 0xFFFF, Box::new(ram));
        (Cpu::new(), mapper, Clock::new())
    }

    #[test]
    fn zero_page_x_wraps_within_the_zero_page() {
        let (mut cpu, mut mapper, mut clock) = cpu_with_program(&[0x80]);
        cpu.registers.x = 0xFF;
        let (operand, crossed) = cpu
            .resolve_operand(&mut mapper, &mut clock, AddressMode::ZeroPageX)
            .unwrap();
        assert!(!crossed);
        match operand {
            Operand::Address(addr) => assert_eq!(addr, 0x7F),
            _ => panic!("expected an address"),
        }
    }

    #[test]
    fn absolute_indexed_reports_page_crossings() {
        let (mut cpu, mut mapper, mut clock) = cpu_with_program(&[0xFF, 0x00]);
        cpu.registers.x = 0x01;
        let (_, crossed) = cpu
            .resolve_operand(&mut mapper, &mut clock, AddressMode::AbsoluteX)
            .unwrap();
        assert!(crossed);
    }

    #[test]
    fn jmp_indirect_does_not_carry_into_the_pointer_high_byte() {
        let (mut cpu, mut mapper, mut clock) = cpu_with_program(&[]);
        // Pointer at $02FF -> low byte read from $02FF, high byte from
        // $0200 (not $0300), per the documented hardware quirk.
        mapper.store(&mut clock, 0x02FF, 0x34).unwrap();
        mapper.store(&mut clock, 0x0300, 0x12).unwrap();
        mapper.store(&mut clock, 0x0200, 0x78).unwrap();

        let address = cpu.indirect_address(&mut mapper, &mut clock, 0x02FF).unwrap();
        assert_eq!(address, 0x7834);
    }

    #[test]
    fn indirect_x_wraps_the_pointer_within_zero_page() {
        let (mut cpu, mut mapper, mut clock) = cpu_with_program(&[0xFE]);
        cpu.registers.x = 0x02;
        mapper.store(&mut clock, 0x0000, 0xAD).unwrap();
        mapper.store(&mut clock, 0x00FF, 0xDE).unwrap();
        let (operand, _) = cpu
            .resolve_operand(&mut mapper, &mut clock, AddressMode::IndirectX)
            .unwrap();
        match operand {
            Operand::Address(addr) => assert_eq!(addr, 0xADDE),
            _ => panic!("expected an address"),
        }
    }
}
