//! Cartridge ROM prefetch buffer state.
//!
//! When WAITCNT enables it, the cartridge bus speculatively fetches the
//! opcodes following the program counter during cycles the CPU spends off
//! the ROM bus. The buffer records the *addresses* of the prefetched slots;
//! the opcode data itself still comes out of the ROM image on consumption.
//!
//! The stepping logic lives in the bus (it has to interleave with cycle
//! charging); this struct is just the ring state.

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Prefetch {
    /// A fetch is in flight on the cartridge bus.
    pub active: bool,
    /// Cycles left until the in-flight fetch completes.
    pub countdown: i32,
    pub rd_pos: usize,
    pub wr_pos: usize,
    pub count: usize,
    /// Address of the most recently predicted slot; the next prediction
    /// continues from here.
    pub last_address: u32,
    pub address: [u32; 8],
}

impl Prefetch {
    /// Slots usable at the current opcode width: 8 half-words in Thumb,
    /// 4 words in ARM. The ring arithmetic stays modulo 8 in both modes.
    pub const fn capacity(thumb: bool) -> usize {
        if thumb {
            8
        } else {
            4
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_follows_opcode_width() {
        assert_eq!(Prefetch::capacity(true), 8);
        assert_eq!(Prefetch::capacity(false), 4);
    }

    #[test]
    fn reset_empties_the_ring() {
        let mut prefetch = Prefetch {
            active: true,
            countdown: 3,
            rd_pos: 2,
            wr_pos: 5,
            count: 3,
            last_address: 0x0800_0010,
            address: [0xFF; 8],
        };

        prefetch.reset();

        assert!(!prefetch.active);
        assert_eq!(prefetch.count, 0);
        assert_eq!(prefetch.rd_pos, prefetch.wr_pos);
    }
}
