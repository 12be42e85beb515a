//! The static instruction-set catalog: which byte decodes to which
//! mnemonic, in which addressing mode, at what cycle cost.
//!
//! Collapses what could be a per-opcode `enum` (one variant per byte,
//! including every undocumented/illegal opcode) into a single `lookup`
//! match over `(variant, byte)` that only knows about the documented NMOS
//! 6502 instruction set plus the synthetic `HLT` family the `Emu` variant
//! adds. Illegal opcodes are out of scope (see DESIGN.md); `InvalidOpcode`
//! is the terminal outcome for any byte this table doesn't recognize.

/// How an instruction's operand byte(s) are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    /// 16-bit indirect. `JMP` only; reproduces the page-boundary fetch bug.
    Indirect,
    IndirectX,
    IndirectY,
    /// Signed 8-bit, PC-relative. Branches only.
    Relative,
}

impl AddressMode {
    /// Operand byte count, not counting the opcode byte itself.
    pub fn operand_bytes(self) -> u8 {
        match self {
            AddressMode::Implied | AddressMode::Accumulator => 0,
            AddressMode::Immediate
            | AddressMode::ZeroPage
            | AddressMode::ZeroPageX
            | AddressMode::ZeroPageY
            | AddressMode::IndirectX
            | AddressMode::IndirectY
            | AddressMode::Relative => 1,
            AddressMode::Absolute
            | AddressMode::AbsoluteX
            | AddressMode::AbsoluteY
            | AddressMode::Indirect => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum Instruction {
    ADC, AND, ASL, BCC, BCS, BEQ, BIT, BMI, BNE, BPL, BRK, BVC, BVS,
    CLC, CLD, CLI, CLV, CMP, CPX, CPY, DEC, DEX, DEY, EOR, INC, INX, INY,
    JMP, JSR, LDA, LDX, LDY, LSR, NOP, ORA, PHA, PHP, PLA, PLP,
    ROL, ROR, RTI, RTS, SBC, SEC, SED, SEI, STA, STX, STY,
    TAX, TAY, TSX, TXA, TXS, TYA,
    /// Emu-only: halt execution, surfacing a halt code to the host.
    HLT,
    /// Emu-only: halt, consuming one operand byte as the halt code.
    HLT_IM,
    /// Emu-only: halt with the accumulator as the halt code.
    HLT_ACC,
}

pub fn mnemonic_for(instruction: Instruction) -> &'static str {
    use Instruction::*;
    match instruction {
        ADC => "ADC", AND => "AND", ASL => "ASL", BCC => "BCC", BCS => "BCS",
        BEQ => "BEQ", BIT => "BIT", BMI => "BMI", BNE => "BNE", BPL => "BPL",
        BRK => "BRK", BVC => "BVC", BVS => "BVS", CLC => "CLC", CLD => "CLD",
        CLI => "CLI", CLV => "CLV", CMP => "CMP", CPX => "CPX", CPY => "CPY",
        DEC => "DEC", DEX => "DEX", DEY => "DEY", EOR => "EOR", INC => "INC",
        INX => "INX", INY => "INY", JMP => "JMP", JSR => "JSR", LDA => "LDA",
        LDX => "LDX", LDY => "LDY", LSR => "LSR", NOP => "NOP", ORA => "ORA",
        PHA => "PHA", PHP => "PHP", PLA => "PLA", PLP => "PLP", ROL => "ROL",
        ROR => "ROR", RTI => "RTI", RTS => "RTS", SBC => "SBC", SEC => "SEC",
        SED => "SED", SEI => "SEI", STA => "STA", STX => "STX", STY => "STY",
        TAX => "TAX", TAY => "TAY", TSX => "TSX", TXA => "TXA", TXS => "TXS",
        TYA => "TYA", HLT => "HLT", HLT_IM => "HLT_IM", HLT_ACC => "HLT_ACC",
    }
}

pub fn match_instruction(name: &str) -> Option<Instruction> {
    use Instruction::*;
    let instruction = match name.to_uppercase().as_str() {
        "ADC" => ADC, "AND" => AND, "ASL" => ASL, "BCC" => BCC, "BCS" => BCS,
        "BEQ" => BEQ, "BIT" => BIT, "BMI" => BMI, "BNE" => BNE, "BPL" => BPL,
        "BRK" => BRK, "BVC" => BVC, "BVS" => BVS, "CLC" => CLC, "CLD" => CLD,
        "CLI" => CLI, "CLV" => CLV, "CMP" => CMP, "CPX" => CPX, "CPY" => CPY,
        "DEC" => DEC, "DEX" => DEX, "DEY" => DEY, "EOR" => EOR, "INC" => INC,
        "INX" => INX, "INY" => INY, "JMP" => JMP, "JSR" => JSR, "LDA" => LDA,
        "LDX" => LDX, "LDY" => LDY, "LSR" => LSR, "NOP" => NOP, "ORA" => ORA,
        "PHA" => PHA, "PHP" => PHP, "PLA" => PLA, "PLP" => PLP, "ROL" => ROL,
        "ROR" => ROR, "RTI" => RTI, "RTS" => RTS, "SBC" => SBC, "SEC" => SEC,
        "SED" => SED, "SEI" => SEI, "STA" => STA, "STX" => STX, "STY" => STY,
        "TAX" => TAX, "TAY" => TAY, "TSX" => TSX, "TXA" => TXA, "TXS" => TXS,
        "TYA" => TYA, "HLT" => HLT, "HLT_IM" => HLT_IM, "HLT_ACC" => HLT_ACC,
        _ => return None,
    };
    Some(instruction)
}

/// Which flavor of 6502 is executing. `Emu` is the only variant whose
/// opcode table includes the synthetic `HLT` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionSetVariant {
    Default,
    NMOS6502,
    NMOS6502Emu,
}

impl InstructionSetVariant {
    /// Whether `ADC`/`SBC` honor the `Decimal` flag. Per DESIGN.md's open-
    /// question resolution, BCD is declared per variant rather than always
    /// on; only `NMOS6502` and `NMOS6502Emu` enable it, matching real NMOS
    /// silicon.
    pub fn supports_decimal_mode(self) -> bool {
        !matches!(self, InstructionSetVariant::Default)
    }

    fn supports_hlt(self) -> bool {
        matches!(self, InstructionSetVariant::NMOS6502Emu)
    }
}

/// A fully decoded opcode: what to do, how to read its operand, and what
/// it costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub instruction: Instruction,
    pub mode: AddressMode,
    /// Total instruction length in bytes, including the opcode byte.
    pub bytes: u8,
    /// Cycle cost assuming no page-cross or branch-taken penalty.
    pub base_cycles: u8,
    /// Whether an indexed/indirect-indexed read that crosses a page
    /// boundary costs one extra cycle. Branches handle their own penalty
    /// separately (see `Cpu::branch`), since it depends on whether the
    /// branch is taken, not just the addressing mode.
    pub page_cross_extra: bool,
}

macro_rules! op {
    ($instruction:expr, $mode:expr, $cycles:expr) => {
        Some(OpcodeInfo {
            instruction: $instruction,
            mode: $mode,
            bytes: 1 + $mode.operand_bytes(),
            base_cycles: $cycles,
            page_cross_extra: false,
        })
    };
    ($instruction:expr, $mode:expr, $cycles:expr, page_cross) => {
        Some(OpcodeInfo {
            instruction: $instruction,
            mode: $mode,
            bytes: 1 + $mode.operand_bytes(),
            base_cycles: $cycles,
            page_cross_extra: true,
        })
    };
}

/// Decode `byte` under `variant`. Returns `None` for any byte the
/// variant's table leaves unassigned; the caller (`Cpu::step`) turns that
/// into `CpuFault::InvalidOpcode`.
pub fn lookup(variant: InstructionSetVariant, byte: u8) -> Option<OpcodeInfo> {
    use AddressMode::*;
    use Instruction::*;

    if variant.supports_hlt() {
        match byte {
            0x02 => return op!(HLT, Implied, 1),
            0x12 => return op!(HLT_IM, Immediate, 2),
            0x22 => return op!(HLT_ACC, Accumulator, 1),
            _ => {}
        }
    }

    match byte {
        0x00 => op!(BRK, Implied, 7),
        0x01 => op!(ORA, IndirectX, 6),
        0x05 => op!(ORA, ZeroPage, 3),
        0x06 => op!(ASL, ZeroPage, 5),
        0x08 => op!(PHP, Implied, 3),
        0x09 => op!(ORA, Immediate, 2),
        0x0A => op!(ASL, Accumulator, 2),
        0x0D => op!(ORA, Absolute, 4),
        0x0E => op!(ASL, Absolute, 6),
        0x10 => op!(BPL, Relative, 2),
        0x11 => op!(ORA, IndirectY, 5, page_cross),
        0x15 => op!(ORA, ZeroPageX, 4),
        0x16 => op!(ASL, ZeroPageX, 6),
        0x18 => op!(CLC, Implied, 2),
        0x19 => op!(ORA, AbsoluteY, 4, page_cross),
        0x1D => op!(ORA, AbsoluteX, 4, page_cross),
        0x1E => op!(ASL, AbsoluteX, 7),
        0x20 => op!(JSR, Absolute, 6),
        0x21 => op!(AND, IndirectX, 6),
        0x24 => op!(BIT, ZeroPage, 3),
        0x25 => op!(AND, ZeroPage, 3),
        0x26 => op!(ROL, ZeroPage, 5),
        0x28 => op!(PLP, Implied, 4),
        0x29 => op!(AND, Immediate, 2),
        0x2A => op!(ROL, Accumulator, 2),
        0x2C => op!(BIT, Absolute, 4),
        0x2D => op!(AND, Absolute, 4),
        0x2E => op!(ROL, Absolute, 6),
        0x30 => op!(BMI, Relative, 2),
        0x31 => op!(AND, IndirectY, 5, page_cross),
        0x35 => op!(AND, ZeroPageX, 4),
        0x36 => op!(ROL, ZeroPageX, 6),
        0x38 => op!(SEC, Implied, 2),
        0x39 => op!(AND, AbsoluteY, 4, page_cross),
        0x3D => op!(AND, AbsoluteX, 4, page_cross),
        0x3E => op!(ROL, AbsoluteX, 7),
        0x40 => op!(RTI, Implied, 6),
        0x41 => op!(EOR, IndirectX, 6),
        0x45 => op!(EOR, ZeroPage, 3),
        0x46 => op!(LSR, ZeroPage, 5),
        0x48 => op!(PHA, Implied, 3),
        0x49 => op!(EOR, Immediate, 2),
        0x4A => op!(LSR, Accumulator, 2),
        0x4C => op!(JMP, Absolute, 3),
        0x4D => op!(EOR, Absolute, 4),
        0x4E => op!(LSR, Absolute, 6),
        0x50 => op!(BVC, Relative, 2),
        0x51 => op!(EOR, IndirectY, 5, page_cross),
        0x55 => op!(EOR, ZeroPageX, 4),
        0x56 => op!(LSR, ZeroPageX, 6),
        0x58 => op!(CLI, Implied, 2),
        0x59 => op!(EOR, AbsoluteY, 4, page_cross),
        0x5D => op!(EOR, AbsoluteX, 4, page_cross),
        0x5E => op!(LSR, AbsoluteX, 7),
        0x60 => op!(RTS, Implied, 6),
        0x61 => op!(ADC, IndirectX, 6),
        0x65 => op!(ADC, ZeroPage, 3),
        0x66 => op!(ROR, ZeroPage, 5),
        0x68 => op!(PLA, Implied, 4),
        0x69 => op!(ADC, Immediate, 2),
        0x6A => op!(ROR, Accumulator, 2),
        0x6C => op!(JMP, Indirect, 5),
        0x6D => op!(ADC, Absolute, 4),
        0x6E => op!(ROR, Absolute, 6),
        0x70 => op!(BVS, Relative, 2),
        0x71 => op!(ADC, IndirectY, 5, page_cross),
        0x75 => op!(ADC, ZeroPageX, 4),
        0x76 => op!(ROR, ZeroPageX, 6),
        0x78 => op!(SEI, Implied, 2),
        0x79 => op!(ADC, AbsoluteY, 4, page_cross),
        0x7D => op!(ADC, AbsoluteX, 4, page_cross),
        0x7E => op!(ROR, AbsoluteX, 7),
        0x81 => op!(STA, IndirectX, 6),
        0x84 => op!(STY, ZeroPage, 3),
        0x85 => op!(STA, ZeroPage, 3),
        0x86 => op!(STX, ZeroPage, 3),
        0x88 => op!(DEY, Implied, 2),
        0x8A => op!(TXA, Implied, 2),
        0x8C => op!(STY, Absolute, 4),
        0x8D => op!(STA, Absolute, 4),
        0x8E => op!(STX, Absolute, 4),
        0x90 => op!(BCC, Relative, 2),
        0x91 => op!(STA, IndirectY, 6),
        0x94 => op!(STY, ZeroPageX, 4),
        0x95 => op!(STA, ZeroPageX, 4),
        0x96 => op!(STX, ZeroPageY, 4),
        0x98 => op!(TYA, Implied, 2),
        0x99 => op!(STA, AbsoluteY, 5),
        0x9A => op!(TXS, Implied, 2),
        0x9D => op!(STA, AbsoluteX, 5),
        0xA0 => op!(LDY, Immediate, 2),
        0xA1 => op!(LDA, IndirectX, 6),
        0xA2 => op!(LDX, Immediate, 2),
        0xA4 => op!(LDY, ZeroPage, 3),
        0xA5 => op!(LDA, ZeroPage, 3),
        0xA6 => op!(LDX, ZeroPage, 3),
        0xA8 => op!(TAY, Implied, 2),
        0xA9 => op!(LDA, Immediate, 2),
        0xAA => op!(TAX, Implied, 2),
        0xAC => op!(LDY, Absolute, 4),
        0xAD => op!(LDA, Absolute, 4),
        0xAE => op!(LDX, Absolute, 4),
        0xB0 => op!(BCS, Relative, 2),
        0xB1 => op!(LDA, IndirectY, 5, page_cross),
        0xB4 => op!(LDY, ZeroPageX, 4),
        0xB5 => op!(LDA, ZeroPageX, 4),
        0xB6 => op!(LDX, ZeroPageY, 4),
        0xB8 => op!(CLV, Implied, 2),
        0xB9 => op!(LDA, AbsoluteY, 4, page_cross),
        0xBA => op!(TSX, Implied, 2),
        0xBC => op!(LDY, AbsoluteX, 4, page_cross),
        0xBD => op!(LDA, AbsoluteX, 4, page_cross),
        0xBE => op!(LDX, AbsoluteY, 4, page_cross),
        0xC0 => op!(CPY, Immediate, 2),
        0xC1 => op!(CMP, IndirectX, 6),
        0xC4 => op!(CPY, ZeroPage, 3),
        0xC5 => op!(CMP, ZeroPage, 3),
        0xC6 => op!(DEC, ZeroPage, 5),
        0xC8 => op!(INY, Implied, 2),
        0xC9 => op!(CMP, Immediate, 2),
        0xCA => op!(DEX, Implied, 2),
        0xCC => op!(CPY, Absolute, 4),
        0xCD => op!(CMP, Absolute, 4),
        0xCE => op!(DEC, Absolute, 6),
        0xD0 => op!(BNE, Relative, 2),
        0xD1 => op!(CMP, IndirectY, 5, page_cross),
        0xD5 => op!(CMP, ZeroPageX, 4),
        0xD6 => op!(DEC, ZeroPageX, 6),
        0xD8 => op!(CLD, Implied, 2),
        0xD9 => op!(CMP, AbsoluteY, 4, page_cross),
        0xDD => op!(CMP, AbsoluteX, 4, page_cross),
        0xDE => op!(DEC, AbsoluteX, 7),
        0xE0 => op!(CPX, Immediate, 2),
        0xE1 => op!(SBC, IndirectX, 6),
        0xE4 => op!(CPX, ZeroPage, 3),
        0xE5 => op!(SBC, ZeroPage, 3),
        0xE6 => op!(INC, ZeroPage, 5),
        0xE8 => op!(INX, Implied, 2),
        0xE9 => op!(SBC, Immediate, 2),
        0xEA => op!(NOP, Implied, 2),
        0xEC => op!(CPX, Absolute, 4),
        0xED => op!(SBC, Absolute, 4),
        0xEE => op!(INC, Absolute, 6),
        0xF0 => op!(BEQ, Relative, 2),
        0xF1 => op!(SBC, IndirectY, 5, page_cross),
        0xF5 => op!(SBC, ZeroPageX, 4),
        0xF6 => op!(INC, ZeroPageX, 6),
        0xF8 => op!(SED, Implied, 2),
        0xF9 => op!(SBC, AbsoluteY, 4, page_cross),
        0xFD => op!(SBC, AbsoluteX, 4, page_cross),
        0xFE => op!(INC, AbsoluteX, 7),
        _ => None,
    }
}

/// The inverse of `lookup`: which byte encodes `instruction` in `mode`
/// under `variant`. Used by the assembler to encode instruction lines;
/// the execution core never needs this direction.
pub fn encode(variant: InstructionSetVariant, instruction: Instruction, mode: AddressMode) -> Option<(u8, OpcodeInfo)> {
    for byte in 0u8..=0xFF {
        if let Some(info) = lookup(variant, byte) {
            if info.instruction == instruction && info.mode == mode {
                return Some((byte, info));
            }
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_a_representative_spread_of_opcodes() {
        let info = lookup(InstructionSetVariant::Default, 0xA9).unwrap();
        assert_eq!(info.instruction, Instruction::LDA);
        assert_eq!(info.mode, AddressMode::Immediate);
        assert_eq!(info.bytes, 2);
        assert_eq!(info.base_cycles, 2);

        let info = lookup(InstructionSetVariant::Default, 0x6C).unwrap();
        assert_eq!(info.instruction, Instruction::JMP);
        assert_eq!(info.mode, AddressMode::Indirect);
        assert_eq!(info.bytes, 3);
    }

    #[test]
    fn hlt_family_is_emu_only() {
        assert!(lookup(InstructionSetVariant::Default, 0x02).is_none());
        assert!(lookup(InstructionSetVariant::NMOS6502, 0x02).is_none());

        let info = lookup(InstructionSetVariant::NMOS6502Emu, 0x12).unwrap();
        assert_eq!(info.instruction, Instruction::HLT_IM);
        assert_eq!(info.bytes, 2);
    }

    #[test]
    fn unassigned_bytes_decode_to_none() {
        // 0x03 is an illegal opcode in real silicon; this table doesn't
        // model illegal opcodes at all, so it's simply unassigned.
        assert!(lookup(InstructionSetVariant::Default, 0x03).is_none());
    }

    #[test]
    fn mnemonic_round_trips_through_match_instruction() {
        for byte in 0u8..=0xFF {
            if let Some(info) = lookup(InstructionSetVariant::NMOS6502Emu, byte) {
                let name = mnemonic_for(info.instruction);
                assert_eq!(match_instruction(name), Some(info.instruction));
            }
        }
    }

    #[test]
    fn default_variant_does_not_support_decimal_mode() {
        assert!(!InstructionSetVariant::Default.supports_decimal_mode());
        assert!(InstructionSetVariant::NMOS6502.supports_decimal_mode());
        assert!(InstructionSetVariant::NMOS6502Emu.supports_decimal_mode());
    }

    #[test]
    fn encode_is_the_inverse_of_lookup() {
        let (byte, info) = encode(InstructionSetVariant::Default, Instruction::LDA, AddressMode::ZeroPageX).unwrap();
        assert_eq!(byte, 0xB5);
        assert_eq!(info.base_cycles, 4);

        assert!(encode(InstructionSetVariant::Default, Instruction::HLT, AddressMode::Implied).is_none());
    }
}
