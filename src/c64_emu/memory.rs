// Flat 64 KiB C64 address space shared by the CPU and the SID engine,
// plus the map of SID register windows that live inside it.
//
// Unlike a full C64 bus there is no banking layer here: the player routine
// sees plain RAM everywhere, and SID registers are just bytes the engine
// reads back on the next sample.

use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
//  Constants
// ─────────────────────────────────────────────────────────────────────────────

pub const MEM_SIZE: usize = 0x1_0000;

/// Processor port ($0001): LORAM/HIRAM/CHAREN in the low bits.
pub const PROCESSOR_PORT: u16 = 0x0001;

/// Base of the primary SID register window.
pub const SID1_BASE: u16 = 0xD400;

/// Number of SID registers per chip (0x00-0x1F).
pub const SID_REG_SIZE: u16 = 0x20;

pub const MAX_SIDS: usize = 3;

// ─────────────────────────────────────────────────────────────────────────────
//  Memory
// ─────────────────────────────────────────────────────────────────────────────

/// The single mutable substrate every component works on.
///
/// All accessors take `u16` addresses, so wraparound at $FFFF is a
/// property of the type rather than a runtime check.
#[derive(Clone)]
pub struct Memory {
    ram: Box<[u8; MEM_SIZE]>,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            ram: Box::new([0u8; MEM_SIZE]),
        }
    }

    pub fn clear(&mut self) {
        self.ram.fill(0);
    }

    /// Copy `data` to `addr`, dropping whatever would run past $FFFF.
    /// Returns the number of bytes placed.
    pub fn load(&mut self, addr: u16, data: &[u8]) -> usize {
        let a = addr as usize;
        let end = (a + data.len()).min(MEM_SIZE);
        self.ram[a..end].copy_from_slice(&data[..end - a]);
        end - a
    }

    #[inline(always)]
    pub fn read(&self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    #[inline(always)]
    pub fn write(&mut self, addr: u16, value: u8) {
        self.ram[addr as usize] = value;
    }

    /// Little-endian word at `addr`; the high byte wraps to $0000.
    #[inline]
    pub fn read_word(&self, addr: u16) -> u16 {
        self.read(addr) as u16 | ((self.read(addr.wrapping_add(1)) as u16) << 8)
    }

    /// Zero an inclusive address range.
    pub fn zero_range(&mut self, first: u16, last: u16) {
        self.ram[first as usize..=last as usize].fill(0);
    }

    #[inline]
    pub fn processor_port(&self) -> u8 {
        self.ram[PROCESSOR_PORT as usize]
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("port", &format_args!("${:02X}", self.processor_port()))
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  SID window map
// ─────────────────────────────────────────────────────────────────────────────

/// Register window bases for up to three SIDs. Slot 0 is always $D400;
/// slots 1 and 2 are 0 when the tune does not use that chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidMapper {
    bases: [u16; MAX_SIDS],
}

impl SidMapper {
    pub fn new(extra: [u16; 2]) -> Self {
        Self {
            bases: [SID1_BASE, extra[0], extra[1]],
        }
    }

    #[inline]
    pub fn base(&self, sid: usize) -> u16 {
        self.bases[sid]
    }

    /// Whether chip slot `sid` is in use.
    #[inline]
    pub fn is_active(&self, sid: usize) -> bool {
        self.bases[sid] != 0
    }

    /// Number of extra chips (0-2); indexes the mix attenuation table.
    pub fn extra_count(&self) -> usize {
        self.bases[1..].iter().filter(|&&b| b != 0).count()
    }

    pub fn num_sids(&self) -> usize {
        1 + self.extra_count()
    }

    /// True if `addr` falls in one of the extra chips' windows.
    ///
    /// The window is treated as 31 bytes wide ($xx00-$xx1E), which is
    /// what the tunes relying on the out-of-window redirect were tuned
    /// against.
    pub fn in_extra_window(&self, addr: u16) -> bool {
        self.bases[1..]
            .iter()
            .any(|&base| base != 0 && base <= addr && (addr as u32) < base as u32 + 0x1F)
    }
}

impl Default for SidMapper {
    fn default() -> Self {
        Self::new([0, 0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_clamps_at_top_of_memory() {
        let mut mem = Memory::new();
        let placed = mem.load(0xFFFE, &[1, 2, 3, 4]);
        assert_eq!(placed, 2);
        assert_eq!(mem.read(0xFFFE), 1);
        assert_eq!(mem.read(0xFFFF), 2);
        assert_eq!(mem.read(0x0000), 0);
    }

    #[test]
    fn read_word_wraps() {
        let mut mem = Memory::new();
        mem.write(0xFFFF, 0x34);
        mem.write(0x0000, 0x12);
        assert_eq!(mem.read_word(0xFFFF), 0x1234);
    }

    #[test]
    fn mapper_counts_and_windows() {
        let m = SidMapper::new([0xD420, 0]);
        assert_eq!(m.num_sids(), 2);
        assert_eq!(m.extra_count(), 1);
        assert!(m.in_extra_window(0xD420));
        assert!(m.in_extra_window(0xD43E));
        assert!(!m.in_extra_window(0xD43F));
        assert!(!m.in_extra_window(0xD440));

        let none = SidMapper::default();
        assert_eq!(none.num_sids(), 1);
        assert!(!none.in_extra_window(0x0010));
    }
}
