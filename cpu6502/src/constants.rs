//! Fixed addresses and layout constants for the 6502 address space.
//!
//! http://www.6502.org/
//! https://en.wikipedia.org/wiki/MOS_Technology_6502

/// The stack lives at page one, `0x0100 | SP`.
pub const STACK_PAGE: u8 = 0x01;

/// The 6502 reads a 16-bit vector from one of three fixed addresses whenever
/// it resets or services an interrupt. All three are little-endian.
#[rustfmt::skip]
pub enum InterruptVector {
    /// Non-Maskable Interrupt.
    Nmi   = 0xFFFA,
    Reset = 0xFFFC,
    /// Shared between `IRQ` and `BRK`.
    IrqBrk = 0xFFFE,
}

impl InterruptVector {
    pub fn address(self) -> u16 {
        self as u16
    }
}

/// Conventional entry-point label the test harness looks for when a program
/// doesn't set `PC` explicitly. See `test_support::run_to_halt`.
pub const TEST_ENTRY_LABEL: &str = "TEST_ENTRY";
