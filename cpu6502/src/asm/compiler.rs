use std::collections::HashMap;

use crate::opcodes::{self, AddressMode, Instruction, InstructionSetVariant};

use super::error::{AssemblerError, SourceToken};
use super::program::{Program, Relocation, RelocationMode};

/// A numeric or symbolic operand argument, before an addressing mode has
/// been chosen for it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum OperandValue {
    Byte(u8),
    Word(u16),
    Symbol(String),
}

/// The syntactic shape an operand was written in. Paired with the
/// mnemonic's available addressing modes, this is enough to pick one.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ParsedOperand {
    None,
    Accumulator,
    Immediate(OperandValue),
    Indirect(OperandValue),
    IndirectX(OperandValue),
    IndirectY(OperandValue),
    Direct(OperandValue),
    DirectX(OperandValue),
    DirectY(OperandValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    Byte,
    Word,
}

/// Walks a source file and assembles it into a `Program`. Two passes in
/// spirit, one walk in code: pass 1 emits bytes and records every label
/// definition and reference as it's encountered; `Program::relocate`
/// (pass 2) patches every recorded reference once the whole file has been
/// seen, so forward references to labels work the same as backward ones.
pub struct Compiler {
    file_name: Option<String>,
    variant: InstructionSetVariant,
}

impl Compiler {
    /// A compiler that attributes diagnostics to `file_name`, e.g. the
    /// path of a `.asm` file passed to the CLI.
    pub fn new(file_name: &str, variant: InstructionSetVariant) -> Compiler {
        Compiler {
            file_name: Some(file_name.to_string()),
            variant,
        }
    }

    /// A compiler for source that didn't come from a file (an in-memory
    /// test fixture, for instance); diagnostics omit the file name.
    pub fn for_variant(variant: InstructionSetVariant) -> Compiler {
        Compiler { file_name: None, variant }
    }

    pub fn compile_str(&self, source: &str) -> Result<Program, AssemblerError> {
        log::debug!("assembler pass 1 (emit): starting, {} source lines", source.lines().count());
        let mut program = Program::new();
        let mut position: u16 = 0;

        for (line_index, raw_line) in source.lines().enumerate() {
            let line_number = (line_index + 1) as u32;
            let without_comment = strip_comment(raw_line);
            let trimmed = without_comment.trim();
            if trimmed.is_empty() {
                continue;
            }

            let column = (raw_line.len() - raw_line.trim_start().len() + 1) as u32;
            let (label, rest) = split_label(trimmed);
            if let Some(name) = label {
                let token = self.token(line_number, column, name);
                program.define_label(name, position, &token)?;
            }

            let rest = rest.trim();
            if rest.is_empty() {
                continue;
            }

            let (head, tail) = split_first_word(rest);
            let token = self.token(line_number, column, head);

            if let Some(directive) = head.strip_prefix('.') {
                position = self.assemble_directive(&mut program, position, directive, tail, &token)?;
            } else {
                let instruction = opcodes::match_instruction(head).ok_or_else(|| AssemblerError::UnknownMnemonic(token.clone()))?;
                position = self.assemble_instruction(&mut program, position, instruction, tail, &token)?;
            }
        }

        log::debug!(
            "assembler pass 1 (emit): finished, {} bytes emitted",
            program.sparse_binary_code.len()
        );
        program.relocate()?;
        Ok(program)
    }

    fn token(&self, line: u32, column: u32, lexeme: &str) -> SourceToken {
        SourceToken::new(self.file_name.as_deref(), line, column, lexeme)
    }

    fn assemble_directive(
        &self,
        program: &mut Program,
        position: u16,
        directive: &str,
        argument: &str,
        token: &SourceToken,
    ) -> Result<u16, AssemblerError> {
        let argument = argument.trim();
        match directive.to_uppercase().as_str() {
            "ORG" => {
                let value = parse_value(argument, &program.aliases, token)?;
                match value {
                    OperandValue::Byte(b) => Ok(b as u16),
                    OperandValue::Word(w) => Ok(w),
                    OperandValue::Symbol(_) => Err(AssemblerError::InvalidOperandArgument(token.clone())),
                }
            }
            "BYTE" => {
                let mut cursor = position;
                for piece in split_commas(argument) {
                    let value = parse_value(piece, &program.aliases, token)?;
                    match value {
                        OperandValue::Byte(b) => program.emit_byte(cursor, b, token)?,
                        OperandValue::Word(w) => program.emit_byte(cursor, w as u8, token)?,
                        OperandValue::Symbol(name) => {
                            program.emit_byte(cursor, 0, token)?;
                            program.record_reference(
                                &name,
                                Relocation {
                                    mode: RelocationMode::ZeroPage,
                                    position: cursor,
                                    target_symbol: name.clone(),
                                    token: token.clone(),
                                },
                            );
                        }
                    }
                    cursor = cursor.wrapping_add(1);
                }
                Ok(cursor)
            }
            "WORD" => {
                let mut cursor = position;
                for piece in split_commas(argument) {
                    let value = parse_value(piece, &program.aliases, token)?;
                    match value {
                        OperandValue::Byte(b) => program.emit_bytes(cursor, &(b as u16).to_le_bytes(), token)?,
                        OperandValue::Word(w) => program.emit_bytes(cursor, &w.to_le_bytes(), token)?,
                        OperandValue::Symbol(name) => {
                            program.emit_bytes(cursor, &[0, 0], token)?;
                            program.record_reference(
                                &name,
                                Relocation {
                                    mode: RelocationMode::Absolute,
                                    position: cursor,
                                    target_symbol: name.clone(),
                                    token: token.clone(),
                                },
                            );
                        }
                    }
                    cursor = cursor.wrapping_add(2);
                }
                Ok(cursor)
            }
            "TEXT" => {
                let text = parse_string_literal(argument, token)?;
                program.emit_bytes(position, text.as_bytes(), token)?;
                Ok(position.wrapping_add(text.len() as u16))
            }
            "EQU" => {
                let (name, value_text) = split_first_word(argument);
                let value = parse_value(value_text.trim(), &program.aliases, token)?;
                let bytes = match value {
                    OperandValue::Byte(b) => vec![b],
                    OperandValue::Word(w) => w.to_le_bytes().to_vec(),
                    OperandValue::Symbol(_) => return Err(AssemblerError::InvalidOperandArgument(token.clone())),
                };
                program.aliases.insert(name.to_string(), bytes);
                Ok(position)
            }
            _ => Err(AssemblerError::UnknownMnemonic(token.clone())),
        }
    }

    fn assemble_instruction(
        &self,
        program: &mut Program,
        position: u16,
        instruction: Instruction,
        operand_text: &str,
        token: &SourceToken,
    ) -> Result<u16, AssemblerError> {
        let parsed = parse_operand(operand_text, &program.aliases, token)?;
        let is_branch = matches!(
            instruction,
            Instruction::BCC
                | Instruction::BCS
                | Instruction::BEQ
                | Instruction::BMI
                | Instruction::BNE
                | Instruction::BPL
                | Instruction::BVC
                | Instruction::BVS
        );

        if is_branch {
            return self.assemble_branch(program, position, instruction, parsed, token);
        }

        let (mode, value) = match parsed {
            ParsedOperand::None => {
                let mode = if opcodes::encode(self.variant, instruction, AddressMode::Implied).is_some() {
                    AddressMode::Implied
                } else if opcodes::encode(self.variant, instruction, AddressMode::Accumulator).is_some() {
                    AddressMode::Accumulator
                } else {
                    return Err(AssemblerError::OperandModeNotSupported(token.clone()));
                };
                (mode, None)
            }
            ParsedOperand::Accumulator => (AddressMode::Accumulator, None),
            ParsedOperand::Immediate(v) => (AddressMode::Immediate, Some((v, RelocationMode::ZeroPage))),
            ParsedOperand::Indirect(v) => (AddressMode::Indirect, Some((v, RelocationMode::Absolute))),
            ParsedOperand::IndirectX(v) => (AddressMode::IndirectX, Some((v, RelocationMode::ZeroPage))),
            ParsedOperand::IndirectY(v) => (AddressMode::IndirectY, Some((v, RelocationMode::ZeroPage))),
            ParsedOperand::Direct(v) => {
                let width = resolve_width(program, &v);
                let mode = self.pick_direct_mode(instruction, width, DirectKind::Plain, token)?;
                let reloc_mode = if matches!(mode, AddressMode::ZeroPage) {
                    RelocationMode::ZeroPage
                } else {
                    RelocationMode::Absolute
                };
                (mode, Some((v, reloc_mode)))
            }
            ParsedOperand::DirectX(v) => {
                let width = resolve_width(program, &v);
                let mode = self.pick_direct_mode(instruction, width, DirectKind::X, token)?;
                let reloc_mode = if matches!(mode, AddressMode::ZeroPageX) {
                    RelocationMode::ZeroPage
                } else {
                    RelocationMode::Absolute
                };
                (mode, Some((v, reloc_mode)))
            }
            ParsedOperand::DirectY(v) => {
                let width = resolve_width(program, &v);
                let mode = self.pick_direct_mode(instruction, width, DirectKind::Y, token)?;
                let reloc_mode = if matches!(mode, AddressMode::ZeroPageY) {
                    RelocationMode::ZeroPage
                } else {
                    RelocationMode::Absolute
                };
                (mode, Some((v, reloc_mode)))
            }
        };

        let (opcode_byte, info) = opcodes::encode(self.variant, instruction, mode).ok_or_else(|| AssemblerError::OperandModeNotSupported(token.clone()))?;
        program.emit_byte(position, opcode_byte, token)?;

        if let Some((value, reloc_mode)) = value {
            self.emit_operand_value(program, position.wrapping_add(1), value, reloc_mode, info.bytes - 1, token)?;
        }

        Ok(position.wrapping_add(info.bytes as u16))
    }

    fn assemble_branch(
        &self,
        program: &mut Program,
        position: u16,
        instruction: Instruction,
        parsed: ParsedOperand,
        token: &SourceToken,
    ) -> Result<u16, AssemblerError> {
        let value = match parsed {
            ParsedOperand::Direct(v) => v,
            _ => return Err(AssemblerError::OperandModeNotSupported(token.clone())),
        };
        let (opcode_byte, info) = opcodes::encode(self.variant, instruction, AddressMode::Relative).ok_or_else(|| AssemblerError::OperandModeNotSupported(token.clone()))?;
        program.emit_byte(position, opcode_byte, token)?;
        let operand_position = position.wrapping_add(1);

        match value {
            OperandValue::Symbol(name) => {
                program.emit_byte(operand_position, 0, token)?;
                program.record_reference(
                    &name,
                    Relocation {
                        mode: RelocationMode::Relative,
                        position: operand_position,
                        target_symbol: name,
                        token: token.clone(),
                    },
                );
            }
            OperandValue::Byte(_) | OperandValue::Word(_) => {
                let target = match value {
                    OperandValue::Byte(b) => b as u16,
                    OperandValue::Word(w) => w,
                    OperandValue::Symbol(_) => unreachable!(),
                };
                let next_instruction = operand_position.wrapping_add(1);
                let displacement = target as i32 - next_instruction as i32;
                if !(-128..=127).contains(&displacement) {
                    return Err(AssemblerError::InvalidOperandSize(token.clone()));
                }
                program.emit_byte(operand_position, displacement as i8 as u8, token)?;
            }
        }

        Ok(position.wrapping_add(info.bytes as u16))
    }

    fn emit_operand_value(
        &self,
        program: &mut Program,
        position: u16,
        value: OperandValue,
        reloc_mode: RelocationMode,
        width_bytes: u8,
        token: &SourceToken,
    ) -> Result<(), AssemblerError> {
        match value {
            OperandValue::Symbol(name) => {
                program.emit_bytes(position, &vec![0u8; width_bytes as usize], token)?;
                program.record_reference(
                    &name,
                    Relocation {
                        mode: reloc_mode,
                        position,
                        target_symbol: name,
                        token: token.clone(),
                    },
                );
                Ok(())
            }
            OperandValue::Byte(b) => {
                if width_bytes == 1 {
                    program.emit_byte(position, b, token)
                } else {
                    program.emit_bytes(position, &(b as u16).to_le_bytes(), token)
                }
            }
            OperandValue::Word(w) => {
                if width_bytes == 1 {
                    if w > 0x00FF {
                        return Err(AssemblerError::InvalidOperandSize(token.clone()));
                    }
                    program.emit_byte(position, w as u8, token)
                } else {
                    program.emit_bytes(position, &w.to_le_bytes(), token)
                }
            }
        }
    }

    fn pick_direct_mode(&self, instruction: Instruction, width: Option<Width>, kind: DirectKind, token: &SourceToken) -> Result<AddressMode, AssemblerError> {
        let (zero_page_mode, absolute_mode) = match kind {
            DirectKind::Plain => (AddressMode::ZeroPage, AddressMode::Absolute),
            DirectKind::X => (AddressMode::ZeroPageX, AddressMode::AbsoluteX),
            DirectKind::Y => (AddressMode::ZeroPageY, AddressMode::AbsoluteY),
        };

        let preferred = match width {
            Some(Width::Byte) | None => zero_page_mode,
            Some(Width::Word) => absolute_mode,
        };
        let fallback = if preferred == zero_page_mode { absolute_mode } else { zero_page_mode };

        if opcodes::encode(self.variant, instruction, preferred).is_some() {
            Ok(preferred)
        } else if opcodes::encode(self.variant, instruction, fallback).is_some() {
            Ok(fallback)
        } else {
            Err(AssemblerError::OperandModeNotSupported(token.clone()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectKind {
    Plain,
    X,
    Y,
}

/// Forward-referenced symbols default to absolute width: at parse time we
/// can't yet know whether a not-yet-defined label will land in the zero
/// page, so widening to the safe case avoids a spurious relocation
/// failure. Already-defined labels (backward references) use their real
/// address to prefer the zero-page form when it fits.
fn resolve_width(program: &Program, value: &OperandValue) -> Option<Width> {
    match value {
        OperandValue::Byte(_) => Some(Width::Byte),
        OperandValue::Word(_) => Some(Width::Word),
        OperandValue::Symbol(name) => match program.labels.get(name).and_then(|label| label.offset) {
            Some(offset) if offset <= 0x00FF => Some(Width::Byte),
            Some(_) => Some(Width::Word),
            None => Some(Width::Word),
        },
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(index) => &line[..index],
        None => line,
    }
}

/// Splits a leading `NAME:` label definition off the front of a line, if
/// present. Returns `(label, remainder)`.
fn split_label(line: &str) -> (Option<&str>, &str) {
    let (head, _) = split_first_word(line);
    if let Some(name) = head.strip_suffix(':') {
        if !name.is_empty() && is_identifier(name) {
            let remainder = &line[head.len()..];
            return (Some(name), remainder);
        }
    }
    (None, line)
}

fn split_first_word(text: &str) -> (&str, &str) {
    let trimmed = text.trim_start();
    match trimmed.find(char::is_whitespace) {
        Some(index) => (&trimmed[..index], &trimmed[index..]),
        None => (trimmed, ""),
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn split_commas(text: &str) -> Vec<&str> {
    text.split(',').map(|piece| piece.trim()).filter(|piece| !piece.is_empty()).collect()
}

fn parse_string_literal(text: &str, token: &SourceToken) -> Result<String, AssemblerError> {
    let text = text.trim();
    if text.len() < 2 || !text.starts_with('"') || !text.ends_with('"') {
        return Err(AssemblerError::MalformedToken(token.clone()));
    }
    Ok(text[1..text.len() - 1].to_string())
}

fn parse_value(text: &str, aliases: &HashMap<String, Vec<u8>>, token: &SourceToken) -> Result<OperandValue, AssemblerError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AssemblerError::MalformedToken(token.clone()));
    }

    if let Some(hex) = text.strip_prefix('$') {
        let value = u32::from_str_radix(hex, 16).map_err(|_| AssemblerError::InvalidOperandArgument(token.clone()))?;
        return width_from_digit_count(value, hex.len(), 2, 4, token);
    }
    if let Some(binary) = text.strip_prefix('%') {
        let value = u32::from_str_radix(binary, 2).map_err(|_| AssemblerError::InvalidOperandArgument(token.clone()))?;
        return width_from_digit_count(value, binary.len(), 8, 16, token);
    }
    if text.starts_with('\'') && text.ends_with('\'') && text.len() >= 3 {
        let ch = text[1..text.len() - 1].chars().next().ok_or_else(|| AssemblerError::MalformedToken(token.clone()))?;
        return Ok(OperandValue::Byte(ch as u8));
    }
    if text.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        let value: u32 = text.parse().map_err(|_| AssemblerError::InvalidOperandArgument(token.clone()))?;
        return if value <= 0xFF {
            Ok(OperandValue::Byte(value as u8))
        } else if value <= 0xFFFF {
            Ok(OperandValue::Word(value as u16))
        } else {
            Err(AssemblerError::InvalidOperandSize(token.clone()))
        };
    }

    if let Some(bytes) = aliases.get(text) {
        return match bytes.len() {
            1 => Ok(OperandValue::Byte(bytes[0])),
            2 => Ok(OperandValue::Word(u16::from_le_bytes([bytes[0], bytes[1]]))),
            _ => Err(AssemblerError::InvalidOperandSize(token.clone())),
        };
    }

    if is_identifier(text) {
        Ok(OperandValue::Symbol(text.to_string()))
    } else {
        Err(AssemblerError::MalformedToken(token.clone()))
    }
}

fn width_from_digit_count(value: u32, digit_count: usize, byte_digits: usize, word_digits: usize, token: &SourceToken) -> Result<OperandValue, AssemblerError> {
    if digit_count <= byte_digits {
        Ok(OperandValue::Byte(value as u8))
    } else if digit_count <= word_digits {
        Ok(OperandValue::Word(value as u16))
    } else {
        Err(AssemblerError::InvalidOperandSize(token.clone()))
    }
}

fn parse_operand(text: &str, aliases: &HashMap<String, Vec<u8>>, token: &SourceToken) -> Result<ParsedOperand, AssemblerError> {
    let text = strip_comment(text).trim();
    if text.is_empty() {
        return Ok(ParsedOperand::None);
    }
    if text.eq_ignore_ascii_case("A") {
        return Ok(ParsedOperand::Accumulator);
    }
    if let Some(rest) = text.strip_prefix('#') {
        return Ok(ParsedOperand::Immediate(parse_value(rest, aliases, token)?));
    }
    if let Some(rest) = text.strip_prefix('(') {
        let close = rest.find(')').ok_or_else(|| AssemblerError::MalformedToken(token.clone()))?;
        let inner = &rest[..close];
        let after = rest[close + 1..].trim();

        if !after.is_empty() {
            let suffix = after.trim_start_matches(',').trim();
            if suffix.eq_ignore_ascii_case("Y") {
                return Ok(ParsedOperand::IndirectY(parse_value(inner, aliases, token)?));
            }
            return Err(AssemblerError::MalformedToken(token.clone()));
        }

        if let Some(base) = strip_index_suffix(inner, 'X') {
            return Ok(ParsedOperand::IndirectX(parse_value(base, aliases, token)?));
        }
        return Ok(ParsedOperand::Indirect(parse_value(inner, aliases, token)?));
    }

    if let Some(base) = strip_index_suffix(text, 'X') {
        return Ok(ParsedOperand::DirectX(parse_value(base, aliases, token)?));
    }
    if let Some(base) = strip_index_suffix(text, 'Y') {
        return Ok(ParsedOperand::DirectY(parse_value(base, aliases, token)?));
    }
    Ok(ParsedOperand::Direct(parse_value(text, aliases, token)?))
}

fn strip_index_suffix(text: &str, register: char) -> Option<&str> {
    let comma = text.rfind(',')?;
    let suffix = text[comma + 1..].trim();
    let mut chars = suffix.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.to_ascii_uppercase() == register => Some(text[..comma].trim()),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::opcodes::InstructionSetVariant;

    fn assemble(source: &str) -> Program {
        Compiler::new("test.asm", InstructionSetVariant::NMOS6502Emu).compile_str(source).unwrap()
    }

    #[test]
    fn assembles_a_simple_immediate_load_and_store() {
        let program = assemble("LDA #$01\nSTA $0200\n");
        assert_eq!(program.sparse_binary_code[&0x0000], 0xA9);
        assert_eq!(program.sparse_binary_code[&0x0001], 0x01);
        assert_eq!(program.sparse_binary_code[&0x0002], 0x8D);
        assert_eq!(program.sparse_binary_code[&0x0003], 0x00);
        assert_eq!(program.sparse_binary_code[&0x0004], 0x02);
    }

    #[test]
    fn org_relocates_the_emission_cursor() {
        let program = assemble(".org $0400\nNOP\n");
        assert_eq!(program.sparse_binary_code[&0x0400], 0xEA);
    }

    #[test]
    fn labels_resolve_forward_references_to_an_absolute_address() {
        let program = assemble("JMP TARGET\nTARGET:\nNOP\n");
        assert_eq!(program.sparse_binary_code[&0x0000], 0x4C);
        assert_eq!(program.sparse_binary_code[&0x0001], 0x03);
        assert_eq!(program.sparse_binary_code[&0x0002], 0x00);
    }

    #[test]
    fn branches_resolve_to_a_signed_relative_displacement() {
        let program = assemble("LOOP:\nNOP\nBNE LOOP\n");
        // NOP at 0x0000, BNE opcode at 0x0001, operand at 0x0002.
        // Displacement = target(0x0000) - (operand_position + 1) = 0 - 3 = -3.
        assert_eq!(program.sparse_binary_code[&0x0001], 0xD0);
        assert_eq!(program.sparse_binary_code[&0x0002], 0xFD);
    }

    #[test]
    fn equ_defines_a_reusable_byte_alias() {
        let program = assemble(".equ LIMIT 10\nLDA #LIMIT\n");
        assert_eq!(program.sparse_binary_code[&0x0001], 10);
    }

    #[test]
    fn byte_and_word_directives_emit_raw_data() {
        let program = assemble(".byte 1, 2, $FF\n.word $1234\n");
        assert_eq!(program.sparse_binary_code[&0x0000], 1);
        assert_eq!(program.sparse_binary_code[&0x0001], 2);
        assert_eq!(program.sparse_binary_code[&0x0002], 0xFF);
        assert_eq!(program.sparse_binary_code[&0x0003], 0x34);
        assert_eq!(program.sparse_binary_code[&0x0004], 0x12);
    }

    #[test]
    fn zero_page_indexed_operand_selects_the_zero_page_mode() {
        let program = assemble("LDA $10,X\n");
        assert_eq!(program.sparse_binary_code[&0x0000], 0xB5);
        assert_eq!(program.sparse_binary_code[&0x0001], 0x10);
    }

    #[test]
    fn unknown_mnemonic_is_rejected() {
        let err = Compiler::new("test.asm", InstructionSetVariant::NMOS6502Emu).compile_str("FROB $01\n").unwrap_err();
        assert!(matches!(err, AssemblerError::UnknownMnemonic(_)));
    }

    #[test]
    fn indirect_indexed_addressing_modes_parse() {
        let program = assemble("LDA ($10,X)\nLDA ($20),Y\nJMP ($3000)\n");
        assert_eq!(program.sparse_binary_code[&0x0000], 0xA1);
        assert_eq!(program.sparse_binary_code[&0x0002], 0xB1);
        assert_eq!(program.sparse_binary_code[&0x0004], 0x6C);
    }
}
