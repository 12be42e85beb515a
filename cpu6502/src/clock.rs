use std::thread;
use std::time::Duration;

/// A monotonic counter of elapsed CPU cycles and the sole synchronization
/// point in the system: the CPU and the `MemoryMapper` both tick it on
/// every bus access, and nothing else touches it.
///
/// `DebugRead` paths never call `wait_for_next_cycle`, so disassembly and
/// introspection never perturb cycle counts.
pub struct Clock {
    current_cycle: u64,
    /// When set, `wait_for_next_cycle` sleeps for this long after bumping
    /// the counter, approximating real hardware pacing. `None` means
    /// free-running: the counter still advances, but nothing blocks.
    pace: Option<Duration>,
}

impl Clock {
    pub fn new() -> Clock {
        Clock {
            current_cycle: 0,
            pace: None,
        }
    }

    /// Build a clock that paces itself to roughly `hz` cycles per second.
    pub fn with_pacing(hz: u64) -> Clock {
        Clock {
            current_cycle: 0,
            pace: Some(Duration::from_nanos(1_000_000_000 / hz.max(1))),
        }
    }

    pub fn current_cycle(&self) -> u64 {
        self.current_cycle
    }

    /// Advance the counter by exactly one tick. Blocks the caller only if
    /// real-time pacing was requested; free-running mode never blocks.
    pub fn wait_for_next_cycle(&mut self) {
        self.current_cycle += 1;
        if let Some(pace) = self.pace {
            thread::sleep(pace);
        }
    }
}

impl Default for Clock {
    fn default() -> Clock {
        Clock::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ticks_are_monotonic() {
        let mut clock = Clock::new();
        assert_eq!(clock.current_cycle(), 0);
        for expected in 1..=10 {
            clock.wait_for_next_cycle();
            assert_eq!(clock.current_cycle(), expected);
        }
    }

    #[test]
    fn free_running_does_not_block() {
        // With no pacing this should return effectively instantly; the test
        // itself times out if it doesn't.
        let mut clock = Clock::new();
        for _ in 0..100_000 {
            clock.wait_for_next_cycle();
        }
        assert_eq!(clock.current_cycle(), 100_000);
    }
}
