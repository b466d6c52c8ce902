//! The memory bus: region dispatch, cycle charging and the execution loop.
//!
//! Every 8/16/32-bit access the CPU (or DMA) makes lands here. An access:
//!
//! 1. looks its cost up in the precomputed waitstate tables,
//! 2. hands the cost to the prefetcher (or ticks it directly when the
//!    prefetch buffer is disabled),
//! 3. dispatches on the region (bits 27..24 of the address).
//!
//! The bus also owns the execution loop: it arbitrates CPU, DMA and HALT
//! against the scheduler's deadlines, so one component owns wall-clock
//! time and everything observes the same cycle counter.

use std::collections::HashMap;

use logger::log;

use crate::bitwise::Bits;
use crate::cartridge::Cartridge;
use crate::cpu::hardware::dma::Dma;
use crate::cpu::hardware::internal_memory::{
    self as memory, fold_vram, InternalMemory,
};
use crate::cpu::hardware::interrupt_control::{HaltControl, Interrupt, InterruptControl};
use crate::cpu::hardware::keypad::{GbaButton, Keypad};
use crate::cpu::hardware::lcd::{self, Lcd};
use crate::cpu::hardware::prefetch::Prefetch;
use crate::cpu::hardware::timers::Timers;
use crate::cpu::hardware::waitstate::{CycleLuts, WaitControl};
use crate::cpu::hardware::{
    is_rom_address, region, REGION_BIOS, REGION_EWRAM, REGION_IWRAM, REGION_MMIO, REGION_OAM,
    REGION_PRAM, REGION_ROM_W0_L, REGION_ROM_W2_H, REGION_SRAM_1, REGION_SRAM_2, REGION_VRAM,
};
use crate::cpu::{Access, CpuState, Processor};
use crate::scheduler::Scheduler;

pub struct Bus {
    /// Processor state shared with the bus (BIOS gating, prefetch
    /// eligibility, open-bus values all depend on it).
    pub state: CpuState,

    pub internal_memory: InternalMemory,
    pub cartridge: Cartridge,
    pub lcd: Lcd,
    pub keypad: Keypad,
    pub timers: Timers,
    pub dma: Dma,
    pub interrupt_control: InterruptControl,
    pub waitcnt: WaitControl,
    pub scheduler: Scheduler,

    pub(crate) luts: CycleLuts,
    pub(crate) prefetch: Prefetch,
    pub(crate) last_rom_address: u32,

    /// Cycle budget left for the CPU in the current scheduler slice. May go
    /// negative on overshoot; carried into the next `run_for`.
    pub(crate) ticks_cpu_left: i32,
    /// Cached distance to the next scheduler deadline.
    pub(crate) ticks_to_event: i32,
    /// Total master cycles ever charged.
    pub(crate) cycles_count: u64,

    running: bool,
    pub(crate) unused_region: HashMap<u32, u8>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new([0; 0x4000], Cartridge::default())
    }
}

impl Bus {
    #[must_use]
    pub fn new(bios: [u8; 0x4000], cartridge: Cartridge) -> Self {
        let mut bus = Self {
            state: CpuState::default(),
            internal_memory: InternalMemory::new(bios),
            cartridge,
            lcd: Lcd::default(),
            keypad: Keypad::new(),
            timers: Timers::default(),
            dma: Dma::default(),
            interrupt_control: InterruptControl::default(),
            waitcnt: WaitControl::default(),
            scheduler: Scheduler::new(),
            luts: CycleLuts::default(),
            prefetch: Prefetch::default(),
            last_rom_address: 0,
            ticks_cpu_left: 0,
            ticks_to_event: 0,
            cycles_count: 0,
            running: false,
            unused_region: HashMap::new(),
        };
        bus.reset();
        bus
    }

    /// Restore power-on state. The BIOS and ROM images are kept.
    pub fn reset(&mut self) {
        self.internal_memory.clear();
        self.interrupt_control.reset();
        self.keypad = Keypad::new();
        self.timers.reset();
        self.dma = Dma::default();
        self.lcd = Lcd::default();

        self.waitcnt = WaitControl::default();
        self.luts.reset(self.waitcnt);

        self.prefetch.reset();
        self.last_rom_address = 0;

        self.scheduler.reset();
        self.ticks_cpu_left = 0;
        self.ticks_to_event = 0;

        lcd::schedule_first_event(self);
    }

    /// Total master cycles charged so far.
    pub fn cycles_count(&self) -> u64 {
        self.cycles_count
    }

    /// Host-facing button input; evaluates the KEYCNT interrupt condition.
    pub fn set_button(&mut self, button: GbaButton, pressed: bool) {
        self.keypad.set_button(button, pressed);
        if self.keypad.irq_condition() {
            self.interrupt_control.raise(Interrupt::Keypad);
        }
    }

    /// Advance the master clock: timers run, the CPU budget shrinks, an
    /// in-flight prefetch makes progress.
    pub(crate) fn tick(&mut self, cycles: i32) {
        self.cycles_count += cycles as u64;
        let irq = self.timers.run(cycles);
        if irq != 0 {
            self.interrupt_control.interrupt_request |= irq;
        }
        self.ticks_cpu_left -= cycles;

        if self.prefetch.active {
            self.prefetch.countdown -= cycles;

            if self.prefetch.countdown <= 0 {
                self.prefetch.count += 1;
                self.prefetch.wr_pos = (self.prefetch.wr_pos + 1) % 8;
                self.prefetch.active = false;
            }
        }
    }

    /// Internal CPU cycle: the bus is free, so the prefetcher may use it.
    /// Address 0 is never in ROM, which is all the step cares about.
    pub fn idle(&mut self) {
        if self.waitcnt.prefetch {
            self.prefetch_step(0, 1);
        } else {
            self.tick(1);
        }
    }

    fn prefetch_step(&mut self, address: u32, mut cycles: i32) {
        let thumb = self.state.cpsr.thumb;
        let capacity = Prefetch::capacity(thumb);

        if self.prefetch.active {
            // The fetch in flight targets exactly this opcode: let it
            // finish and pay only the remaining cycles.
            if address == self.prefetch.address[self.prefetch.wr_pos] {
                let count = self.prefetch.count;
                let wr_pos = self.prefetch.wr_pos;

                self.tick(self.prefetch.countdown);

                // The slot completed inside tick() but is consumed by this
                // very access; restore the pre-completion bookkeeping so
                // the buffer does not grow.
                self.prefetch.count = count;
                self.prefetch.wr_pos = wr_pos;

                self.last_rom_address = address;
                return;
            }

            // A different ROM access steals the cartridge bus; the partial
            // fetch is lost.
            if is_rom_address(address) {
                self.prefetch.active = false;
            }
        } else if self.prefetch.count < capacity
            && is_rom_address(self.state.r15)
            && !is_rom_address(address)
            && self.state.r15 == self.last_rom_address
        {
            let mut next_address = if self.prefetch.count > 0 {
                self.prefetch.last_address
            } else {
                self.state.r15
            };
            next_address += if thumb { 2 } else { 4 };
            self.prefetch.last_address = next_address;

            self.prefetch.active = true;
            self.prefetch.address[self.prefetch.wr_pos] = next_address;
            let luts = if thumb {
                &self.luts.cycles16
            } else {
                &self.luts.cycles32
            };
            self.prefetch.countdown =
                luts[Access::Sequential as usize][(next_address >> 24) as usize];
        }

        if is_rom_address(address) {
            self.last_rom_address = address;
        }

        if self.prefetch.count > 0 && address == self.state.r15 {
            if address == self.prefetch.address[self.prefetch.rd_pos] {
                // Opcode already prefetched: one cycle on the bus.
                cycles = 1;
                self.prefetch.count -= 1;
                self.prefetch.rd_pos = (self.prefetch.rd_pos + 1) % 8;
            } else {
                // The CPU branched away from the prefetched stream.
                self.prefetch.active = false;
                self.prefetch.count = 0;
                self.prefetch.rd_pos = 0;
                self.prefetch.wr_pos = 0;
            }
        }

        self.tick(cycles);
    }

    fn charge(&mut self, address: u32, cycles: i32) {
        if self.waitcnt.prefetch {
            self.prefetch_step(address, cycles);
        } else {
            self.tick(cycles);
        }
    }

    fn prefetched_opcode(&self, n: usize) -> u32 {
        self.state.pipe[n]
    }

    /// Open-bus value: nothing drives the data lines, so the CPU reads
    /// back whatever its own prefetches left there. What that is depends
    /// on the width of those fetches and the bus the PC is executing from.
    fn read_unused(&self, address: u32) -> u32 {
        let mut result = 0;

        if self.state.cpsr.thumb {
            let r15 = self.state.r15;

            match region(r15) {
                REGION_EWRAM | REGION_PRAM | REGION_VRAM
                | REGION_ROM_W0_L..=REGION_ROM_W2_H => {
                    result = self.prefetched_opcode(1).wrapping_mul(0x0001_0001);
                }
                REGION_BIOS | REGION_OAM => {
                    if r15 & 3 != 0 {
                        result = self.prefetched_opcode(0) | self.prefetched_opcode(1) << 16;
                    } else {
                        // Known-inaccurate: [$+6] has not been fetched yet,
                        // but this is what the latched bus observably does.
                        result = self.prefetched_opcode(1).wrapping_mul(0x0001_0001);
                    }
                }
                REGION_IWRAM => {
                    if r15 & 3 != 0 {
                        result = self.prefetched_opcode(0) | self.prefetched_opcode(1) << 16;
                    } else {
                        result = self.prefetched_opcode(1) | self.prefetched_opcode(0) << 16;
                    }
                }
                _ => {}
            }
        } else {
            result = self.prefetched_opcode(1);
        }

        result >> ((address & 3) * 8)
    }

    /// BIOS is readable only while executing inside it; otherwise the read
    /// returns the last opcode the BIOS bus latched.
    fn read_bios(&mut self, address: u32) -> u32 {
        let shift = (address & 3) * 8;
        let address = address & !3;

        if address >= 0x4000 {
            return self.read_unused(address) >> shift;
        }

        if self.state.r15 >= 0x4000 {
            return self.internal_memory.bios_opcode >> shift;
        }

        self.internal_memory.bios_opcode = memory::read_word(&self.internal_memory.bios, address);

        self.internal_memory.bios_opcode >> shift
    }

    /// Crossing a 128 KiB ROM page forces a non-sequential access on the
    /// cartridge bus regardless of what the CPU declared. The difference
    /// is zero for accesses that were already non-sequential.
    fn rom_boundary_penalty_16(&mut self, page: u32, access: Access) {
        self.tick(
            self.luts.cycles16[Access::NonSequential as usize][page as usize]
                - self.luts.cycles16[access as usize][page as usize],
        );
    }

    fn rom_boundary_penalty_32(&mut self, page: u32, access: Access) {
        self.tick(
            self.luts.cycles32[Access::NonSequential as usize][page as usize]
                - self.luts.cycles32[access as usize][page as usize],
        );
    }

    pub fn read_u8(&mut self, address: u32, access: Access) -> u8 {
        let page = region(address);
        let cycles = self.luts.cycles16[access as usize][page as usize];
        self.charge(address, cycles);

        match page {
            REGION_BIOS => self.read_bios(address) as u8,
            REGION_EWRAM => memory::read_byte(&self.internal_memory.ewram, address & 0x3FFFF),
            REGION_IWRAM => memory::read_byte(&self.internal_memory.iwram, address & 0x7FFF),
            REGION_MMIO => self.read_mmio(address),
            REGION_PRAM => memory::read_byte(&self.internal_memory.pram, address & 0x3FF),
            REGION_VRAM => memory::read_byte(&self.internal_memory.vram, fold_vram(address)),
            REGION_OAM => memory::read_byte(&self.internal_memory.oam, address & 0x3FF),
            REGION_ROM_W0_L..=REGION_ROM_W2_H => {
                let address = address & self.cartridge.mask;
                if address & 0x1FFFF == 0 {
                    self.rom_boundary_penalty_16(page, access);
                }
                self.cartridge.read_u8(address)
            }
            REGION_SRAM_1 | REGION_SRAM_2 => {
                let address = address & 0x0EFF_FFFF;
                if !self.cartridge.backup.is_present() || self.cartridge.backup.is_eeprom() {
                    return 0;
                }
                self.cartridge.backup.read(address)
            }
            _ => self.read_unused(address) as u8,
        }
    }

    pub fn read_u16(&mut self, address: u32, access: Access) -> u16 {
        let page = region(address);
        let cycles = self.luts.cycles16[access as usize][page as usize];
        self.charge(address, cycles);

        match page {
            REGION_BIOS => self.read_bios(address) as u16,
            REGION_EWRAM => memory::read_half(&self.internal_memory.ewram, address & 0x3FFFF),
            REGION_IWRAM => memory::read_half(&self.internal_memory.iwram, address & 0x7FFF),
            REGION_MMIO => {
                u16::from(self.read_mmio(address)) | u16::from(self.read_mmio(address + 1)) << 8
            }
            REGION_PRAM => memory::read_half(&self.internal_memory.pram, address & 0x3FF),
            REGION_VRAM => memory::read_half(&self.internal_memory.vram, fold_vram(address)),
            REGION_OAM => memory::read_half(&self.internal_memory.oam, address & 0x3FF),
            REGION_ROM_W0_L..=REGION_ROM_W2_H => {
                // 0x0D also decodes the EEPROM, but only for the DMA.
                if page == REGION_ROM_W2_H && self.cartridge.is_eeprom_address(address) {
                    if !self.dma_is_running() {
                        return 1;
                    }
                    return u16::from(self.cartridge.backup.read(address));
                }
                let address = address & self.cartridge.mask;
                if address & 0x1FFFF == 0 {
                    self.rom_boundary_penalty_16(page, access);
                }
                self.cartridge.read_u16(address)
            }
            REGION_SRAM_1 | REGION_SRAM_2 => {
                let address = address & 0x0EFF_FFFF;
                if !self.cartridge.backup.is_present() || self.cartridge.backup.is_eeprom() {
                    return 0;
                }
                u16::from(self.cartridge.backup.read(address)) * 0x0101
            }
            _ => self.read_unused(address) as u16,
        }
    }

    pub fn read_u32(&mut self, address: u32, access: Access) -> u32 {
        let page = region(address);
        let cycles = self.luts.cycles32[access as usize][page as usize];
        self.charge(address, cycles);

        match page {
            REGION_BIOS => self.read_bios(address),
            REGION_EWRAM => memory::read_word(&self.internal_memory.ewram, address & 0x3FFFF),
            REGION_IWRAM => memory::read_word(&self.internal_memory.iwram, address & 0x7FFF),
            REGION_MMIO => {
                u32::from(self.read_mmio(address))
                    | u32::from(self.read_mmio(address + 1)) << 8
                    | u32::from(self.read_mmio(address + 2)) << 16
                    | u32::from(self.read_mmio(address + 3)) << 24
            }
            REGION_PRAM => memory::read_word(&self.internal_memory.pram, address & 0x3FF),
            REGION_VRAM => memory::read_word(&self.internal_memory.vram, fold_vram(address)),
            REGION_OAM => memory::read_word(&self.internal_memory.oam, address & 0x3FF),
            REGION_ROM_W0_L..=REGION_ROM_W2_H => {
                let address = address & self.cartridge.mask;
                if address & 0x1FFFF == 0 {
                    self.rom_boundary_penalty_32(page, access);
                }
                self.cartridge.read_u32(address)
            }
            REGION_SRAM_1 | REGION_SRAM_2 => {
                let address = address & 0x0EFF_FFFF;
                if !self.cartridge.backup.is_present() || self.cartridge.backup.is_eeprom() {
                    return 0;
                }
                u32::from(self.cartridge.backup.read(address)) * 0x0101_0101
            }
            _ => self.read_unused(address),
        }
    }

    pub fn write_u8(&mut self, address: u32, value: u8, access: Access) {
        let page = region(address);
        let cycles = self.luts.cycles16[access as usize][page as usize];
        self.charge(address, cycles);

        match page {
            REGION_EWRAM => {
                memory::write_byte(&mut self.internal_memory.ewram, address & 0x3FFFF, value);
            }
            REGION_IWRAM => {
                memory::write_byte(&mut self.internal_memory.iwram, address & 0x7FFF, value);
            }
            REGION_MMIO => self.write_mmio(address, value),
            REGION_PRAM => {
                // 8-bit stores broadcast the byte to the whole halfword.
                memory::write_half(
                    &mut self.internal_memory.pram,
                    address & 0x3FF,
                    u16::from(value) * 0x0101,
                );
            }
            REGION_VRAM => {
                let address = fold_vram(address);
                // 8-bit stores into the OBJ half are dropped.
                if address >= 0x10000 {
                    return;
                }
                memory::write_half(
                    &mut self.internal_memory.vram,
                    address,
                    u16::from(value) * 0x0101,
                );
            }
            REGION_SRAM_1 | REGION_SRAM_2 => {
                let address = address & 0x0EFF_FFFF;
                if !self.cartridge.backup.is_present() || self.cartridge.backup.is_eeprom() {
                    return;
                }
                self.cartridge.backup.write(address, value);
            }
            // BIOS, OAM and ROM ignore byte stores; unmapped is discarded.
            _ => log(format!("discarded byte write at {address:08X}")),
        }
    }

    pub fn write_u16(&mut self, address: u32, value: u16, access: Access) {
        let page = region(address);
        let cycles = self.luts.cycles16[access as usize][page as usize];
        self.charge(address, cycles);

        match page {
            REGION_EWRAM => {
                memory::write_half(&mut self.internal_memory.ewram, address & 0x3FFFF, value);
            }
            REGION_IWRAM => {
                memory::write_half(&mut self.internal_memory.iwram, address & 0x7FFF, value);
            }
            REGION_MMIO => {
                self.write_mmio(address, value.get_byte(0));
                self.write_mmio(address + 1, value.get_byte(1));
            }
            REGION_PRAM => {
                memory::write_half(&mut self.internal_memory.pram, address & 0x3FF, value);
            }
            REGION_VRAM => {
                memory::write_half(&mut self.internal_memory.vram, fold_vram(address), value);
            }
            REGION_OAM => {
                memory::write_half(&mut self.internal_memory.oam, address & 0x3FF, value);
            }
            REGION_ROM_W2_H => {
                // EEPROM writes arrive serially through the DMA.
                if self.cartridge.is_eeprom_address(address) && self.dma_is_running() {
                    self.cartridge.backup.write(address, value as u8);
                }
            }
            REGION_SRAM_1 | REGION_SRAM_2 => {
                let address = address & 0x0EFF_FFFF;
                if !self.cartridge.backup.is_present() || self.cartridge.backup.is_eeprom() {
                    return;
                }
                // The 8-bit chip sees the same byte on both halves.
                self.cartridge.backup.write(address, value as u8);
                self.cartridge.backup.write(address + 1, value as u8);
            }
            _ => log(format!("discarded halfword write at {address:08X}")),
        }
    }

    pub fn write_u32(&mut self, address: u32, value: u32, access: Access) {
        let page = region(address);
        let cycles = self.luts.cycles32[access as usize][page as usize];
        self.charge(address, cycles);

        match page {
            REGION_EWRAM => {
                memory::write_word(&mut self.internal_memory.ewram, address & 0x3FFFF, value);
            }
            REGION_IWRAM => {
                memory::write_word(&mut self.internal_memory.iwram, address & 0x7FFF, value);
            }
            REGION_MMIO => {
                self.write_mmio(address, value.get_byte(0));
                self.write_mmio(address + 1, value.get_byte(1));
                self.write_mmio(address + 2, value.get_byte(2));
                self.write_mmio(address + 3, value.get_byte(3));
            }
            REGION_PRAM => {
                memory::write_word(&mut self.internal_memory.pram, address & 0x3FF, value);
            }
            REGION_VRAM => {
                memory::write_word(&mut self.internal_memory.vram, fold_vram(address), value);
            }
            REGION_OAM => {
                memory::write_word(&mut self.internal_memory.oam, address & 0x3FF, value);
            }
            REGION_SRAM_1 | REGION_SRAM_2 => {
                let address = address & 0x0EFF_FFFF;
                if !self.cartridge.backup.is_present() || self.cartridge.backup.is_eeprom() {
                    return;
                }
                for offset in 0..4 {
                    self.cartridge.backup.write(address + offset, value as u8);
                }
            }
            _ => log(format!("discarded word write at {address:08X}")),
        }
    }

    /// Advance the scheduler by `elapsed` cycles, firing everything that
    /// came due; each callback observes `now` as its own timestamp.
    /// Returns the distance to the next deadline.
    pub(crate) fn schedule(&mut self, elapsed: u64) -> u64 {
        let target = self.scheduler.now() + elapsed;

        while let Some(event) = self.scheduler.pop_due(target) {
            self.scheduler.jump_to(event.timestamp);
            (event.callback)(self);
        }
        self.scheduler.jump_to(target);

        self.scheduler.next_delta()
    }

    /// Run the core for `cycles` master cycles, arbitrating CPU, DMA and
    /// HALT against the scheduler's deadlines. Over- or undershoot carries
    /// into the next call.
    pub fn run_for(&mut self, mut cycles: i32, cpu: &mut impl Processor) {
        assert!(!self.running, "run_for is not re-entrant");
        self.running = true;

        cycles += self.ticks_cpu_left;

        while cycles > 0 {
            if cycles < self.ticks_to_event {
                self.ticks_to_event = cycles;
            }

            // The CPU may run until the next event deadline; memory
            // accesses, internal cycles and idle fast-forwards all drain
            // this budget through tick().
            self.ticks_cpu_left = self.ticks_to_event;

            while self.ticks_cpu_left > 0 {
                let fire = self.interrupt_control.fire();

                if self.interrupt_control.halt_control == HaltControl::Halt && fire != 0 {
                    self.interrupt_control.halt_control = HaltControl::Run;
                }

                if self.dma_is_running() {
                    // DMA owns the bus; the CPU is locked out.
                    self.dma_run();
                } else if self.interrupt_control.halt_control == HaltControl::Run {
                    if self.interrupt_control.interrupt_master_enable && fire != 0 {
                        cpu.signal_irq(self);
                    }
                    cpu.step(self);
                } else {
                    // Halted: skip ahead to whatever could wake us first.
                    let until_irq = self.timers.estimate_cycles_until_irq();
                    self.tick(until_irq.min(self.ticks_cpu_left));
                }
            }

            let elapsed = self.ticks_to_event - self.ticks_cpu_left;
            cycles -= elapsed;

            let next = self.schedule(elapsed as u64);
            self.ticks_to_event = next.min(i32::MAX as u64) as i32;
        }

        self.running = false;
    }
}
