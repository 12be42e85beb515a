//! A two-pass assembler for the dialect described alongside this crate:
//! labels, `.org`/`.byte`/`.word`/`.text`/`.equ` directives, and every
//! addressing mode `opcodes::lookup` knows how to decode.
//!
//! Pass 1 (`Compiler::compile_str`) walks the source once, emitting bytes and
//! recording every label definition and reference it sees. Pass 2
//! (`Program::relocate`) patches every recorded reference once the whole
//! file has been seen, so a label may be used before it's defined.

pub mod compiler;
pub mod error;
pub mod program;

pub use compiler::Compiler;
pub use error::{AssemblerError, SourceToken};
pub use program::{Label, Program, Relocation, RelocationMode};
