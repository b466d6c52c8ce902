//! Display timing: DISPSTAT, VCOUNT and the scanline state machine.
//!
//! Rendering is out of scope for this core; what remains is the part the
//! rest of the machine can observe: blanking flags, the line counter, the
//! VBlank/HBlank/VCount interrupts and the DMA triggers tied to them. The
//! state machine runs off two alternating scheduler events per scanline:
//!
//! ```text
//! |---------- 1232 cycles ----------|
//! |---- 960 hdraw ----|- 272 hblank-|   x 228 lines (160 visible + vblank)
//! ```

use serde::{Deserialize, Serialize};

use super::dma::DmaTiming;
use super::interrupt_control::Interrupt;
use crate::bitwise::Bits;
use crate::bus::Bus;

pub const CYCLES_HDRAW: u64 = 960;
pub const CYCLES_HBLANK: u64 = 272;
pub const CYCLES_SCANLINE: u64 = CYCLES_HDRAW + CYCLES_HBLANK;
pub const LINES_VDRAW: u16 = 160;
pub const LINES_TOTAL: u16 = 228;

const VBLANK_FLAG: u8 = 0;
const HBLANK_FLAG: u8 = 1;
const VCOUNT_FLAG: u8 = 2;
const VBLANK_IRQ: u8 = 3;
const HBLANK_IRQ: u8 = 4;
const VCOUNT_IRQ: u8 = 5;

#[derive(Default, Serialize, Deserialize)]
pub struct Lcd {
    /// DISPCNT (0x04000000); only stored, the renderer is external.
    pub dispcnt: u16,
    pub green_swap: u16,
    /// DISPSTAT (0x04000004): flags in bits 0-2, IRQ enables in 3-5,
    /// VCOUNT match target in 8-15.
    pub dispstat: u16,
    /// VCOUNT (0x04000006): current scanline, read-only.
    pub vcount: u16,
}

impl Lcd {
    /// Byte write to DISPSTAT; the flag bits are read-only.
    pub fn write_dispstat(&mut self, byte_nth: u8, value: u8) {
        match byte_nth {
            0 => {
                let flags = self.dispstat & 0b111;
                self.dispstat.set_byte(0, value);
                self.dispstat = self.dispstat & !0b111 | flags;
            }
            1 => self.dispstat.set_byte(1, value),
            _ => panic!("DISPSTAT byte index out of range"),
        }
    }
}

/// Seed the scanline chain; called once at reset.
pub(crate) fn schedule_first_event(bus: &mut Bus) {
    bus.scheduler.add(CYCLES_HDRAW, on_hblank_start);
}

fn on_hblank_start(bus: &mut Bus) {
    bus.lcd.dispstat.set_bit(HBLANK_FLAG, true);

    if bus.lcd.dispstat.get_bit(HBLANK_IRQ) {
        bus.interrupt_control.raise(Interrupt::HBlank);
    }
    // HBlank DMA only runs on the visible lines.
    if bus.lcd.vcount < LINES_VDRAW {
        bus.dma_request(DmaTiming::HBlank);
    }

    bus.scheduler.add(CYCLES_HBLANK, on_hblank_end);
}

fn on_hblank_end(bus: &mut Bus) {
    bus.lcd.dispstat.set_bit(HBLANK_FLAG, false);
    bus.lcd.vcount = (bus.lcd.vcount + 1) % LINES_TOTAL;
    let vcount = bus.lcd.vcount;

    if vcount == LINES_VDRAW {
        bus.lcd.dispstat.set_bit(VBLANK_FLAG, true);
        if bus.lcd.dispstat.get_bit(VBLANK_IRQ) {
            bus.interrupt_control.raise(Interrupt::VBlank);
        }
        bus.dma_request(DmaTiming::VBlank);
    } else if vcount == LINES_TOTAL - 1 {
        // The flag already drops on the last line of the frame.
        bus.lcd.dispstat.set_bit(VBLANK_FLAG, false);
    }

    let target = bus.lcd.dispstat.get_bits(8..=15);
    let matched = vcount == target;
    bus.lcd.dispstat.set_bit(VCOUNT_FLAG, matched);
    if matched && bus.lcd.dispstat.get_bit(VCOUNT_IRQ) {
        bus.interrupt_control.raise(Interrupt::VCount);
    }

    bus.scheduler.add(CYCLES_HDRAW, on_hblank_start);
}
