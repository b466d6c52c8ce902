//! The four DMA channels.
//!
//! DMA and the CPU cannot use the memory bus at the same time: while any
//! channel is active the execution loop hands the whole cycle budget here
//! and the CPU is stalled. Transfers go through the ordinary bus entry
//! points, so waitstates, prefetch stealing and the 128 KiB ROM boundary
//! penalty all apply to DMA exactly as they do to the CPU.
//!
//! Channel priority is by index (0 highest). Enabling a channel latches
//! source, destination and count into internal registers; the I/O
//! registers themselves are write-only and keep the programmed values.

use serde::{Deserialize, Serialize};

use super::interrupt_control::Interrupt;
use crate::bitwise::Bits;
use crate::bus::Bus;
use crate::cpu::Access;

/// IF bits raised on channel completion.
pub const DMA_IRQ: [u16; 4] = [
    Interrupt::Dma0 as u16,
    Interrupt::Dma1 as u16,
    Interrupt::Dma2 as u16,
    Interrupt::Dma3 as u16,
];

/// Start timing selected in CNT_H bits 12-13. Special (sound FIFO / video
/// capture) is accepted but never triggered by this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaTiming {
    Immediate,
    VBlank,
    HBlank,
    Special,
}

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DmaChannel {
    /// SAD, write-only.
    pub source_address: u32,
    /// DAD, write-only.
    pub destination_address: u32,
    /// CNT_L, write-only; 0 means the channel maximum.
    pub word_count: u16,
    /// CNT_H.
    pub control: u16,

    pub(crate) latch_source: u32,
    pub(crate) latch_destination: u32,
    pub(crate) latch_count: u32,
    pub(crate) first_access: bool,
}

impl DmaChannel {
    pub fn enabled(self) -> bool {
        self.control.get_bit(15)
    }

    fn irq_enabled(self) -> bool {
        self.control.get_bit(14)
    }

    fn word(self) -> bool {
        self.control.get_bit(10)
    }

    fn repeat(self) -> bool {
        self.control.get_bit(9)
    }

    pub fn timing(self) -> DmaTiming {
        match self.control.get_bits(12..=13) {
            0 => DmaTiming::Immediate,
            1 => DmaTiming::VBlank,
            2 => DmaTiming::HBlank,
            _ => DmaTiming::Special,
        }
    }

    fn destination_adjust(self) -> u16 {
        self.control.get_bits(5..=6)
    }

    fn source_adjust(self) -> u16 {
        self.control.get_bits(7..=8)
    }

    fn reload_count(self, id: usize) -> u32 {
        let mask: u32 = if id == 3 { 0xFFFF } else { 0x3FFF };
        let count = u32::from(self.word_count) & mask;
        if count == 0 {
            mask + 1
        } else {
            count
        }
    }
}

#[derive(Default, Serialize, Deserialize)]
pub struct Dma {
    pub channels: [DmaChannel; 4],
    /// Bit n set while channel n has a pending or running transfer.
    pub(crate) active: u8,
}

impl Dma {
    /// Internal DMA buses are narrower than 32 bits on the low channels.
    const SOURCE_MASK: [u32; 4] = [0x07FF_FFFF, 0x0FFF_FFFF, 0x0FFF_FFFF, 0x0FFF_FFFF];
    const DESTINATION_MASK: [u32; 4] = [0x07FF_FFFF, 0x07FF_FFFF, 0x07FF_FFFF, 0x0FFF_FFFF];

    fn current_channel(&self) -> Option<usize> {
        if self.active == 0 {
            None
        } else {
            Some(self.active.trailing_zeros() as usize)
        }
    }
}

impl Bus {
    pub(crate) fn dma_is_running(&self) -> bool {
        self.dma.active != 0
    }

    /// React to a CNT_H write: latch on an enable rising edge, withdraw a
    /// disabled channel.
    pub(crate) fn dma_control_written(&mut self, id: usize, old_control: u16) {
        let channel = &mut self.dma.channels[id];

        if !old_control.get_bit(15) && channel.enabled() {
            channel.latch_source = channel.source_address & Dma::SOURCE_MASK[id];
            channel.latch_destination =
                channel.destination_address & Dma::DESTINATION_MASK[id];
            channel.latch_count = channel.reload_count(id);
            channel.first_access = true;

            if channel.timing() == DmaTiming::Immediate {
                self.dma.active |= 1 << id;
            }
        } else if !channel.enabled() {
            self.dma.active &= !(1 << id);
        }
    }

    /// Activate every enabled channel waiting on `timing`; the LCD driver
    /// calls this at the blanking edges.
    pub(crate) fn dma_request(&mut self, timing: DmaTiming) {
        for id in 0..4 {
            let channel = &mut self.dma.channels[id];
            if !channel.enabled() || channel.timing() != timing {
                continue;
            }

            // A repeating channel reloads its count (and, in reload mode,
            // its destination) on every trigger.
            if channel.latch_count == 0 {
                channel.latch_count = channel.reload_count(id);
                if channel.destination_adjust() == 3 {
                    channel.latch_destination =
                        channel.destination_address & Dma::DESTINATION_MASK[id];
                }
            }
            channel.first_access = true;
            self.dma.active |= 1 << id;
        }
    }

    /// Drain the CPU cycle budget into the highest-priority active channel.
    /// Leaves unfinished work active for the next slice.
    pub(crate) fn dma_run(&mut self) {
        while self.ticks_cpu_left > 0 {
            let Some(id) = self.dma.current_channel() else {
                return;
            };
            self.dma_transfer_unit(id);
        }
    }

    fn dma_transfer_unit(&mut self, id: usize) {
        let channel = self.dma.channels[id];
        let access = if channel.first_access {
            Access::NonSequential
        } else {
            Access::Sequential
        };

        let step = if channel.word() {
            let value = self.read_u32(channel.latch_source & !3, access);
            self.write_u32(channel.latch_destination & !3, value, access);
            4
        } else {
            let value = self.read_u16(channel.latch_source & !1, access);
            self.write_u16(channel.latch_destination & !1, value, access);
            2
        };

        let channel = &mut self.dma.channels[id];
        channel.first_access = false;

        match channel.source_adjust() {
            0 => channel.latch_source = channel.latch_source.wrapping_add(step),
            1 => channel.latch_source = channel.latch_source.wrapping_sub(step),
            // 2 = fixed; 3 is prohibited and behaves as fixed here
            _ => {}
        }
        match channel.destination_adjust() {
            0 | 3 => channel.latch_destination = channel.latch_destination.wrapping_add(step),
            1 => channel.latch_destination = channel.latch_destination.wrapping_sub(step),
            _ => {}
        }

        channel.latch_count -= 1;
        if channel.latch_count == 0 {
            self.dma.active &= !(1 << id);

            let channel = &mut self.dma.channels[id];
            if !channel.repeat() || channel.timing() == DmaTiming::Immediate {
                channel.control.set_bit(15, false);
            }
            if channel.irq_enabled() {
                self.interrupt_control.interrupt_request |= DMA_IRQ[id];
            }
        }
    }
}
