//! WAITCNT and the per-region cycle lookup tables.
//!
//! Every bus access costs `1 + wait states` master cycles. The wait states
//! depend on the region, the access width and whether the access is
//! sequential, and for the cartridge regions on the WAITCNT configuration.
//! To keep the access hot path to a single indexed load, the costs are
//! precomputed into two `[access][page]` tables whenever WAITCNT changes.

use serde::{Deserialize, Serialize};

use super::{
    REGION_EWRAM, REGION_PRAM, REGION_ROM_W0_L, REGION_SRAM_1, REGION_SRAM_2, REGION_VRAM,
};
use crate::bitwise::Bits;
use crate::cpu::Access;

/// First-access (non-sequential) wait states, indexed by a 2-bit WAITCNT field.
const WS_NONSEQ: [i32; 4] = [4, 3, 2, 8];
/// Sequential wait states for waitstate region 0/1/2, indexed by a 1-bit field.
const WS_SEQ0: [i32; 2] = [2, 1];
const WS_SEQ1: [i32; 2] = [4, 1];
const WS_SEQ2: [i32; 2] = [8, 1];

/// The WAITCNT register (0x04000204), kept unpacked.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WaitControl {
    /// SRAM wait states (2 bits).
    pub sram: u8,
    pub ws0_n: u8,
    pub ws0_s: u8,
    pub ws1_n: u8,
    pub ws1_s: u8,
    pub ws2_n: u8,
    pub ws2_s: u8,
    /// PHI terminal output clock (not modeled beyond storage).
    pub phi: u8,
    /// Cartridge prefetch buffer enable.
    pub prefetch: bool,
    /// Cartridge type flag, read-only.
    pub cgb: bool,
}

impl WaitControl {
    pub fn value(self) -> u16 {
        u16::from(self.sram)
            | u16::from(self.ws0_n) << 2
            | u16::from(self.ws0_s) << 4
            | u16::from(self.ws1_n) << 5
            | u16::from(self.ws1_s) << 7
            | u16::from(self.ws2_n) << 8
            | u16::from(self.ws2_s) << 10
            | u16::from(self.phi) << 11
            | u16::from(self.prefetch) << 14
            | u16::from(self.cgb) << 15
    }

    /// Apply a write to WAITCNT. The cgb flag is read-only.
    pub fn set_value(&mut self, value: u16) {
        self.sram = value.get_bits(0..=1) as u8;
        self.ws0_n = value.get_bits(2..=3) as u8;
        self.ws0_s = value.get_bits(4..=4) as u8;
        self.ws1_n = value.get_bits(5..=6) as u8;
        self.ws1_s = value.get_bits(7..=7) as u8;
        self.ws2_n = value.get_bits(8..=9) as u8;
        self.ws2_s = value.get_bits(10..=10) as u8;
        self.phi = value.get_bits(11..=12) as u8;
        self.prefetch = value.get_bit(14);
    }
}

/// Precomputed `1 + waitstates` per `[access][page]` for 16-bit and 32-bit
/// accesses. Pages 16..256 are never decoded by the bus but keep lookups by
/// unmasked page (the prefetcher's predicted address) in bounds; they all
/// cost 1.
pub struct CycleLuts {
    pub cycles16: [[i32; 256]; 2],
    pub cycles32: [[i32; 256]; 2],
}

impl Default for CycleLuts {
    fn default() -> Self {
        Self {
            cycles16: [[1; 256]; 2],
            cycles32: [[1; 256]; 2],
        }
    }
}

impl CycleLuts {
    /// Rebuild the full tables: fixed on-board costs plus the
    /// WAITCNT-derived cartridge costs.
    pub fn reset(&mut self, waitcnt: WaitControl) {
        self.cycles16 = [[1; 256]; 2];
        self.cycles32 = [[1; 256]; 2];

        for access in 0..2 {
            // EWRAM sits on a 16-bit bus: a word access is two passes.
            self.cycles16[access][REGION_EWRAM as usize] = 3;
            self.cycles32[access][REGION_EWRAM as usize] = 6;
            self.cycles32[access][REGION_PRAM as usize] = 2;
            self.cycles32[access][REGION_VRAM as usize] = 2;
        }

        self.update(waitcnt);
    }

    /// Refresh the WAITCNT-derived entries; called on every WAITCNT write.
    pub fn update(&mut self, waitcnt: WaitControl) {
        let nonseq = Access::NonSequential as usize;
        let seq = Access::Sequential as usize;

        let sram_cycles = 1 + WS_NONSEQ[waitcnt.sram as usize];
        for access in 0..2 {
            for page in [REGION_SRAM_1 as usize, REGION_SRAM_2 as usize] {
                self.cycles16[access][page] = sram_cycles;
                self.cycles32[access][page] = sram_cycles;
            }
        }

        let first = [waitcnt.ws0_n, waitcnt.ws1_n, waitcnt.ws2_n];
        let second = [
            WS_SEQ0[waitcnt.ws0_s as usize],
            WS_SEQ1[waitcnt.ws1_s as usize],
            WS_SEQ2[waitcnt.ws2_s as usize],
        ];

        for ws in 0..3 {
            let lo = REGION_ROM_W0_L as usize + ws * 2;
            let hi = lo + 1;

            let cycles_n = 1 + WS_NONSEQ[first[ws] as usize];
            let cycles_s = 1 + second[ws];

            self.cycles16[nonseq][lo] = cycles_n;
            self.cycles16[nonseq][hi] = cycles_n;
            self.cycles16[seq][lo] = cycles_s;
            self.cycles16[seq][hi] = cycles_s;

            // A 32-bit ROM access is two 16-bit bus cycles:
            // 1N + 1S when non-sequential, 2S when sequential.
            self.cycles32[nonseq][lo] = cycles_n + cycles_s;
            self.cycles32[nonseq][hi] = cycles_n + cycles_s;
            self.cycles32[seq][lo] = cycles_s * 2;
            self.cycles32[seq][hi] = cycles_s * 2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn luts(waitcnt: WaitControl) -> CycleLuts {
        let mut luts = CycleLuts::default();
        luts.reset(waitcnt);
        luts
    }

    #[test]
    fn on_board_costs_are_fixed() {
        let luts = luts(WaitControl::default());
        let n = Access::NonSequential as usize;
        let s = Access::Sequential as usize;

        for access in [n, s] {
            assert_eq!(luts.cycles16[access][0x0], 1); // BIOS
            assert_eq!(luts.cycles16[access][0x3], 1); // IWRAM
            assert_eq!(luts.cycles16[access][0x4], 1); // MMIO
            assert_eq!(luts.cycles16[access][0x7], 1); // OAM
            assert_eq!(luts.cycles32[access][0x7], 1);

            assert_eq!(luts.cycles16[access][0x2], 3); // EWRAM
            assert_eq!(luts.cycles32[access][0x2], 6);

            assert_eq!(luts.cycles16[access][0x5], 1); // PRAM
            assert_eq!(luts.cycles32[access][0x5], 2);
            assert_eq!(luts.cycles16[access][0x6], 1); // VRAM
            assert_eq!(luts.cycles32[access][0x6], 2);
        }
    }

    #[test]
    fn rom_costs_at_reset() {
        let luts = luts(WaitControl::default());
        let n = Access::NonSequential as usize;
        let s = Access::Sequential as usize;

        // WS0: 4 non-seq waits, 2 seq waits
        assert_eq!(luts.cycles16[n][0x8], 5);
        assert_eq!(luts.cycles16[s][0x8], 3);
        assert_eq!(luts.cycles32[n][0x8], 8);
        assert_eq!(luts.cycles32[s][0x8], 6);
        // WS1: seq default is 4 waits
        assert_eq!(luts.cycles16[s][0xA], 5);
        // WS2: seq default is 8 waits
        assert_eq!(luts.cycles16[s][0xC], 9);
        // mirrors share the cost
        assert_eq!(luts.cycles16[n][0x9], luts.cycles16[n][0x8]);
        assert_eq!(luts.cycles32[s][0xD], luts.cycles32[s][0xC]);
    }

    #[test]
    fn sram_cost_follows_waitcnt() {
        let mut waitcnt = WaitControl::default();
        waitcnt.set_value(0b11); // sram = 3 -> 8 waits
        let luts = luts(waitcnt);

        for access in 0..2 {
            assert_eq!(luts.cycles16[access][0xE], 9);
            assert_eq!(luts.cycles32[access][0xF], 9);
        }
    }

    #[test]
    fn fast_rom_configuration() {
        let mut waitcnt = WaitControl::default();
        // ws0_n = 2 (2 waits), ws0_s = 1 (1 wait)
        waitcnt.set_value(0b1_1000);
        let luts = luts(waitcnt);

        assert_eq!(luts.cycles16[Access::NonSequential as usize][0x8], 3);
        assert_eq!(luts.cycles16[Access::Sequential as usize][0x8], 2);
        assert_eq!(luts.cycles32[Access::NonSequential as usize][0x8], 5);
        assert_eq!(luts.cycles32[Access::Sequential as usize][0x8], 4);
    }

    #[test]
    fn unreachable_pages_cost_one() {
        let luts = luts(WaitControl::default());
        for page in 16..256 {
            assert_eq!(luts.cycles16[0][page], 1);
            assert_eq!(luts.cycles32[1][page], 1);
        }
    }

    #[test]
    fn cgb_flag_is_read_only() {
        let mut waitcnt = WaitControl::default();
        waitcnt.set_value(0xFFFF);

        assert!(!waitcnt.cgb);
        assert!(waitcnt.prefetch);
        assert_eq!(waitcnt.value() & 0x8000, 0);
    }

    #[test]
    fn value_round_trips() {
        let mut waitcnt = WaitControl::default();
        waitcnt.set_value(0x4317);
        assert_eq!(waitcnt.value(), 0x4317);
    }
}
