//! Byte-granular MMIO register dispatch.
//!
//! The hardware decodes I/O registers per byte lane, so 16/32-bit accesses
//! are decomposed by the bus and reassembled little-endian; every register
//! here only ever sees single bytes. Registers that exist but are not
//! modeled (sound, serial) behave like battery-less scratch: writes are
//! remembered and logged, reads return the scratch value or 0.

use logger::log;

use crate::bitwise::Bits;
use crate::bus::Bus;
use crate::cpu::hardware::interrupt_control::HaltControl;

impl Bus {
    pub(crate) fn read_mmio(&self, address: u32) -> u8 {
        match address {
            0x0400_0000..=0x0400_005F => self.read_lcd_raw(address),
            0x0400_00B0..=0x0400_00DF => self.read_dma_raw(address),
            0x0400_0100..=0x0400_010F => self.read_timers_raw(address),
            0x0400_0130..=0x0400_0133 => self.read_keypad_raw(address),
            0x0400_0200..=0x04FF_FFFF => self.read_control_raw(address),
            _ => self.read_unused_io(address),
        }
    }

    pub(crate) fn write_mmio(&mut self, address: u32, value: u8) {
        match address {
            0x0400_0000..=0x0400_005F => self.write_lcd_raw(address, value),
            0x0400_00B0..=0x0400_00DF => self.write_dma_raw(address, value),
            0x0400_0100..=0x0400_010F => self.write_timers_raw(address, value),
            0x0400_0130..=0x0400_0133 => self.write_keypad_raw(address, value),
            0x0400_0200..=0x04FF_FFFF => self.write_control_raw(address, value),
            _ => self.write_unused_io(address, value),
        }
    }

    fn read_lcd_raw(&self, address: u32) -> u8 {
        match address {
            0x0400_0000 => self.lcd.dispcnt.get_byte(0),
            0x0400_0001 => self.lcd.dispcnt.get_byte(1),
            0x0400_0002 => self.lcd.green_swap.get_byte(0),
            0x0400_0003 => self.lcd.green_swap.get_byte(1),
            0x0400_0004 => self.lcd.dispstat.get_byte(0),
            0x0400_0005 => self.lcd.dispstat.get_byte(1),
            0x0400_0006 => self.lcd.vcount.get_byte(0),
            0x0400_0007 => self.lcd.vcount.get_byte(1),
            _ => self.read_unused_io(address),
        }
    }

    fn write_lcd_raw(&mut self, address: u32, value: u8) {
        match address {
            0x0400_0000 => self.lcd.dispcnt.set_byte(0, value),
            0x0400_0001 => self.lcd.dispcnt.set_byte(1, value),
            0x0400_0002 => self.lcd.green_swap.set_byte(0, value),
            0x0400_0003 => self.lcd.green_swap.set_byte(1, value),
            0x0400_0004 | 0x0400_0005 => self
                .lcd
                .write_dispstat((address & 1) as u8, value),
            // VCOUNT is read-only
            0x0400_0006 | 0x0400_0007 => {}
            _ => self.write_unused_io(address, value),
        }
    }

    fn read_dma_raw(&self, address: u32) -> u8 {
        let offset = address - 0x0400_00B0;
        let channel = &self.dma.channels[(offset / 12) as usize];

        match offset % 12 {
            10 => channel.control.get_byte(0),
            11 => channel.control.get_byte(1),
            // source, destination and count are write-only
            _ => 0,
        }
    }

    fn write_dma_raw(&mut self, address: u32, value: u8) {
        let offset = address - 0x0400_00B0;
        let id = (offset / 12) as usize;
        let reg = offset % 12;
        let channel = &mut self.dma.channels[id];

        match reg {
            0..=3 => channel.source_address.set_byte(reg as u8, value),
            4..=7 => channel.destination_address.set_byte(reg as u8 - 4, value),
            8 => channel.word_count.set_byte(0, value),
            9 => channel.word_count.set_byte(1, value),
            10 => channel.control.set_byte(0, value),
            11 => {
                let old_control = channel.control;
                channel.control.set_byte(1, value);
                self.dma_control_written(id, old_control);
            }
            _ => unreachable!(),
        }
    }

    fn read_timers_raw(&self, address: u32) -> u8 {
        let offset = address - 0x0400_0100;
        let timer = &self.timers.channels[(offset / 4) as usize];

        match offset % 4 {
            0 => (timer.counter as u16).get_byte(0),
            1 => (timer.counter as u16).get_byte(1),
            2 => timer.control.get_byte(0),
            3 => timer.control.get_byte(1),
            _ => unreachable!(),
        }
    }

    fn write_timers_raw(&mut self, address: u32, value: u8) {
        let offset = address - 0x0400_0100;
        let id = (offset / 4) as usize;

        match offset % 4 {
            0 => self.timers.channels[id].reload.set_byte(0, value),
            1 => self.timers.channels[id].reload.set_byte(1, value),
            2 => self.timers.write_control(id, 0, value),
            3 => self.timers.write_control(id, 1, value),
            _ => unreachable!(),
        }
    }

    fn read_keypad_raw(&self, address: u32) -> u8 {
        match address {
            0x0400_0130 => self.keypad.key_input.get_byte(0),
            0x0400_0131 => self.keypad.key_input.get_byte(1),
            0x0400_0132 => self.keypad.key_interrupt_control.get_byte(0),
            0x0400_0133 => self.keypad.key_interrupt_control.get_byte(1),
            _ => unreachable!(),
        }
    }

    fn write_keypad_raw(&mut self, address: u32, value: u8) {
        match address {
            // Should be read-only, but the BIOS pokes it.
            0x0400_0130 => self.keypad.key_input.set_byte(0, value),
            0x0400_0131 => self.keypad.key_input.set_byte(1, value),
            0x0400_0132 => self.keypad.key_interrupt_control.set_byte(0, value),
            0x0400_0133 => self.keypad.key_interrupt_control.set_byte(1, value),
            _ => unreachable!(),
        }
    }

    fn read_control_raw(&self, address: u32) -> u8 {
        match address {
            0x0400_0200 => self.interrupt_control.interrupt_enable.get_byte(0),
            0x0400_0201 => self.interrupt_control.interrupt_enable.get_byte(1),
            0x0400_0202 => self.interrupt_control.interrupt_request.get_byte(0),
            0x0400_0203 => self.interrupt_control.interrupt_request.get_byte(1),
            0x0400_0204 => self.waitcnt.value().get_byte(0),
            0x0400_0205 => self.waitcnt.value().get_byte(1),
            0x0400_0208 => u8::from(self.interrupt_control.interrupt_master_enable),
            0x0400_0209 => 0,
            0x0400_0300 => self.interrupt_control.post_boot_flag,
            // HALTCNT is write-only
            0x0400_0301 => 0,
            _ => self.read_unused_io(address),
        }
    }

    fn write_control_raw(&mut self, address: u32, value: u8) {
        match address {
            0x0400_0200 => self.interrupt_control.interrupt_enable.set_byte(0, value),
            0x0400_0201 => self.interrupt_control.interrupt_enable.set_byte(1, value),
            // Writing 1 acknowledges (clears) the flag.
            0x0400_0202 => self.interrupt_control.interrupt_request &= !u16::from(value),
            0x0400_0203 => self.interrupt_control.interrupt_request &= !(u16::from(value) << 8),
            0x0400_0204 | 0x0400_0205 => {
                let mut raw = self.waitcnt.value();
                raw.set_byte((address & 1) as u8, value);
                self.waitcnt.set_value(raw);
                self.luts.update(self.waitcnt);
            }
            0x0400_0208 => self.interrupt_control.interrupt_master_enable = value.get_bit(0),
            0x0400_0209 => {}
            0x0400_0300 => self.interrupt_control.post_boot_flag = value,
            0x0400_0301 => {
                self.interrupt_control.halt_control = if value.get_bit(7) {
                    HaltControl::Stop
                } else {
                    HaltControl::Halt
                };
            }
            _ => self.write_unused_io(address, value),
        }
    }

    fn read_unused_io(&self, address: u32) -> u8 {
        log(format!("read on unused io {address:08X}"));
        self.unused_region.get(&address).map_or(0, |value| *value)
    }

    fn write_unused_io(&mut self, address: u32, value: u8) {
        log(format!("write on unused io {address:08X}"));
        self.unused_region.insert(address, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Access;

    #[test]
    fn interrupt_enable_round_trips() {
        let mut bus = Bus::default();

        bus.write_u16(0x0400_0200, 0x3FFF, Access::NonSequential);

        assert_eq!(bus.interrupt_control.interrupt_enable, 0x3FFF);
        assert_eq!(bus.read_u16(0x0400_0200, Access::NonSequential), 0x3FFF);
    }

    #[test]
    fn ime_uses_bit_zero_only() {
        let mut bus = Bus::default();

        bus.write_u16(0x0400_0208, 0xFFFF, Access::NonSequential);
        assert!(bus.interrupt_control.interrupt_master_enable);
        assert_eq!(bus.read_u16(0x0400_0208, Access::NonSequential), 1);

        bus.write_u8(0x0400_0208, 0, Access::NonSequential);
        assert!(!bus.interrupt_control.interrupt_master_enable);
    }

    #[test]
    fn timer_counter_reads_live_value() {
        let mut bus = Bus::default();

        bus.write_u16(0x0400_0100, 0xFF00, Access::NonSequential); // reload
        bus.write_u16(0x0400_0102, 0x0080, Access::NonSequential); // enable

        assert_eq!(bus.read_u16(0x0400_0100, Access::NonSequential), 0xFF00);

        bus.tick(0x10);
        assert_eq!(bus.read_u16(0x0400_0100, Access::NonSequential), 0xFF10);
        assert_eq!(bus.read_u16(0x0400_0102, Access::NonSequential), 0x0080);
    }

    #[test]
    fn dma_data_registers_are_write_only() {
        let mut bus = Bus::default();

        bus.write_u32(0x0400_00B0, 0x0200_0000, Access::NonSequential);
        bus.write_u16(0x0400_00B8, 0x0010, Access::NonSequential);

        assert_eq!(bus.dma.channels[0].source_address, 0x0200_0000);
        assert_eq!(bus.dma.channels[0].word_count, 0x0010);
        assert_eq!(bus.read_u32(0x0400_00B0, Access::NonSequential), 0);
        assert_eq!(bus.read_u16(0x0400_00B8, Access::NonSequential), 0);
    }

    #[test]
    fn unused_io_is_remembered_scratch() {
        let mut bus = Bus::default();

        assert_eq!(bus.read_u8(0x0400_0060, Access::NonSequential), 0);

        bus.write_u8(0x0400_0060, 0x42, Access::NonSequential);
        assert_eq!(bus.read_u8(0x0400_0060, Access::NonSequential), 0x42);
    }

    #[test]
    fn vcount_is_read_only() {
        let mut bus = Bus::default();
        bus.lcd.vcount = 100;

        bus.write_u16(0x0400_0006, 0, Access::NonSequential);

        assert_eq!(bus.lcd.vcount, 100);
        assert_eq!(bus.read_u16(0x0400_0006, Access::NonSequential), 100);
    }

    #[test]
    fn dispstat_flag_bits_are_read_only() {
        let mut bus = Bus::default();
        bus.lcd.dispstat = 0b0000_0011;

        bus.write_u16(0x0400_0004, 0xFF00 | 0b0011_1100, Access::NonSequential);

        // Enables latched, flags untouched, VCOUNT target stored.
        assert_eq!(bus.lcd.dispstat, 0xFF00 | 0b0011_1011);
    }
}
