use thiserror::Error;

/// Faults raised by a `MemoryInterface` or the `MemoryMapper` that routes
/// to one.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSpaceError {
    #[error("attempt to read unmapped address {0:#06x}")]
    UnmappedRead(u16),

    #[error("attempt to write unmapped address {0:#06x}")]
    UnmappedWrite(u16),

    #[error("attempt to write read-only address {0:#06x}")]
    ReadOnly(u16),
}

/// Faults that can unwind out of `Cpu::execute_with_timeout`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuFault {
    #[error("bus fault: {0}")]
    Bus(#[from] AddressSpaceError),

    #[error("execution halted with code {code:#04x}")]
    ExecutionHalted { code: u8 },

    #[error("execution timed out after {cycles_elapsed} cycles")]
    ExecutionTimeout { cycles_elapsed: u64 },

    #[error("invalid opcode {0:#04x}")]
    InvalidOpcode(u8),
}
