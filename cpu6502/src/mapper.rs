use crate::clock::Clock;
use crate::error::AddressSpaceError;
use crate::memory::MemoryInterface;

/// One non-overlapping address range bound to a `MemoryInterface`, e.g. RAM
/// at `[0x0000, 0x7FFF]` or a device's register block at `[0xC000, 0xC00F]`.
struct Area {
    lo: u16,
    hi: u16,
    interface: Box<dyn MemoryInterface>,
}

impl Area {
    fn contains(&self, addr: u16) -> bool {
        self.lo <= addr && addr <= self.hi
    }
}

/// Routes loads and stores to one of several non-overlapping address
/// ranges. Mirrors `emu::memory::MemoryMapper` from the original C++
/// project: areas are kept sorted by base address so lookups are a binary
/// search once the topology grows past a handful of regions, and mapping
/// a range that overlaps an existing one is rejected outright rather than
/// silently accepted.
///
/// In `strict` mode (the default, see DESIGN.md) a miss raises
/// `UnmappedRead`/`UnmappedWrite`. In permissive mode a miss on read
/// returns `0` and a miss on write is silently dropped, which is useful
/// for running programs that probe memory speculatively.
pub struct MemoryMapper {
    areas: Vec<Area>,
    strict: bool,
}

impl MemoryMapper {
    pub fn new(strict: bool) -> MemoryMapper {
        MemoryMapper {
            areas: Vec::new(),
            strict,
        }
    }

    /// Strict by default: an access that hits no area is a fatal bus fault.
    /// See DESIGN.md for why this implementation picked strict over
    /// permissive where the original left the choice to each call site.
    pub fn strict() -> MemoryMapper {
        MemoryMapper::new(true)
    }

    pub fn permissive() -> MemoryMapper {
        MemoryMapper::new(false)
    }

    /// Map `[lo, hi]` (inclusive) to `interface`. Panics if the new range
    /// overlaps an area that's already mapped — this is a programming
    /// error in harness wiring, not a runtime condition a caller can
    /// meaningfully recover from.
    pub fn map_area(&mut self, lo: u16, hi: u16, interface: Box<dyn MemoryInterface>) {
        assert!(lo <= hi, "MemoryMapper: empty range {:#06x}:{:#06x}", lo, hi);
        for area in &self.areas {
            let overlaps = lo <= area.hi && area.lo <= hi;
            assert!(
                !overlaps,
                "MemoryMapper: overlapping ranges {:#06x}:{:#06x} <-> {:#06x}:{:#06x}",
                lo, hi, area.lo, area.hi
            );
        }
        self.areas.push(Area { lo, hi, interface });
        self.areas.sort_by_key(|area| area.lo);
    }

    fn lookup(&mut self, addr: u16) -> Option<&mut Area> {
        // A sorted `Vec` supports binary search; for the small number of
        // areas a real system maps (RAM, a couple of device windows) a
        // linear scan is just as fast and much simpler, so that's what we
        // do here. Swap for `binary_search_by_key` if the topology grows.
        self.areas.iter_mut().find(|area| area.contains(addr))
    }

    /// Tick the clock, then load a byte through whichever area owns
    /// `addr`.
    pub fn load(&mut self, clock: &mut Clock, addr: u16) -> Result<u8, AddressSpaceError> {
        clock.wait_for_next_cycle();
        let strict = self.strict;
        match self.lookup(addr) {
            Some(area) => {
                let relative = addr - area.lo;
                let value = area.interface.load(relative)?;
                log::trace!("read {:#04x} from {:#06x}", value, addr);
                Ok(value)
            }
            None => {
                log::warn!("unmapped read at {:#06x}", addr);
                if strict {
                    Err(AddressSpaceError::UnmappedRead(addr))
                } else {
                    Ok(0)
                }
            }
        }
    }

    /// Tick the clock, then store a byte through whichever area owns
    /// `addr`.
    pub fn store(
        &mut self,
        clock: &mut Clock,
        addr: u16,
        value: u8,
    ) -> Result<(), AddressSpaceError> {
        clock.wait_for_next_cycle();
        let strict = self.strict;
        match self.lookup(addr) {
            Some(area) => {
                let relative = addr - area.lo;
                let result = area.interface.store(relative, value);
                if result.is_ok() {
                    log::trace!("wrote {:#04x} to {:#06x}", value, addr);
                }
                result
            }
            None => {
                log::warn!("unmapped write at {:#06x}", addr);
                if strict {
                    Err(AddressSpaceError::UnmappedWrite(addr))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Non-observable, non-clocking read for disassembly/inspection.
    pub fn debug_read(&self, addr: u16) -> Option<u8> {
        self.areas
            .iter()
            .find(|area| area.contains(addr))
            .and_then(|area| area.interface.debug_read(addr - area.lo))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::memory::{Ram, Rom};

    #[test]
    fn routes_to_the_owning_area() {
        let mut mapper = MemoryMapper::strict();
        mapper.map_area(0x0000, 0x00FF, Box::new(Ram::new(0x100)));
        mapper.map_area(0x8000, 0x80FF, Box::new(Ram::new(0x100)));

        let mut clock = Clock::new();
        mapper.store(&mut clock, 0x0010, 0xAA).unwrap();
        mapper.store(&mut clock, 0x8010, 0xBB).unwrap();

        assert_eq!(mapper.load(&mut clock, 0x0010).unwrap(), 0xAA);
        assert_eq!(mapper.load(&mut clock, 0x8010).unwrap(), 0xBB);
        assert_eq!(clock.current_cycle(), 4);
    }

    #[test]
    fn strict_miss_is_a_fault() {
        let mut mapper = MemoryMapper::strict();
        mapper.map_area(0x0000, 0x7FFF, Box::new(Ram::new(0x8000)));
        let mut clock = Clock::new();

        assert!(matches!(
            mapper.store(&mut clock, 0xC000, 1),
            Err(AddressSpaceError::UnmappedWrite(0xC000))
        ));
    }

    #[test]
    fn permissive_miss_is_silent() {
        let mut mapper = MemoryMapper::permissive();
        let mut clock = Clock::new();

        assert_eq!(mapper.load(&mut clock, 0xC000).unwrap(), 0);
        mapper.store(&mut clock, 0xC000, 0xFF).unwrap();
    }

    #[test]
    fn debug_read_never_ticks_the_clock() {
        let mut mapper = MemoryMapper::strict();
        mapper.map_area(0x0000, 0x00FF, Box::new(Ram::new(0x100)));
        let mut clock = Clock::new();
        mapper.store(&mut clock, 0x0000, 0x7F).unwrap();
        let before = clock.current_cycle();

        assert_eq!(mapper.debug_read(0x0000), Some(0x7F));
        assert_eq!(clock.current_cycle(), before);
    }

    #[test]
    fn store_into_a_rom_area_is_read_only() {
        let mut mapper = MemoryMapper::strict();
        mapper.map_area(0x8000, 0x8FFF, Box::new(Rom::new(0x1000, &[0x42])));
        let mut clock = Clock::new();

        assert_eq!(mapper.load(&mut clock, 0x8000).unwrap(), 0x42);
        assert!(matches!(
            mapper.store(&mut clock, 0x8000, 0xFF),
            Err(AddressSpaceError::ReadOnly(0x8000))
        ));
        assert_eq!(mapper.load(&mut clock, 0x8000).unwrap(), 0x42);
    }

    #[test]
    #[should_panic(expected = "overlapping ranges")]
    fn overlapping_areas_are_rejected() {
        let mut mapper = MemoryMapper::strict();
        mapper.map_area(0x0000, 0x00FF, Box::new(Ram::new(0x100)));
        mapper.map_area(0x0080, 0x018F, Box::new(Ram::new(0x110)));
    }
}
