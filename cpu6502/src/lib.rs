//! A cycle-accurate MOS 6502 core: a two-pass assembler, the execution
//! unit, and a memory mapper to wire it to RAM and devices under a shared
//! clock.
//!
//! http://www.6502.org/
//! https://en.wikipedia.org/wiki/MOS_Technology_6502

pub mod asm;
pub mod clock;
pub mod constants;
pub mod cpu;
pub mod error;
pub mod mapper;
pub mod memory;
pub mod opcodes;
pub mod registers;
pub mod simulation;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::Clock;
pub use cpu::Cpu;
pub use error::{AddressSpaceError, CpuFault};
pub use mapper::MemoryMapper;
pub use memory::{MemoryInterface, Ram, Rom};
pub use opcodes::InstructionSetVariant;
pub use registers::Registers;
