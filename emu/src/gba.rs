use crate::bus::Bus;
use crate::cartridge::Cartridge;
use crate::cpu::Processor;

/// Top-level system: the bus/timing core plus whatever drives it.
///
/// The processor is a type parameter so the instruction decoder stays
/// fully external; it talks to the machine only through [`Bus`].
pub struct Gba<P: Processor> {
    pub bus: Bus,
    pub cpu: P,
}

impl<P: Processor> Gba<P> {
    pub fn new(cpu: P, bios: [u8; 0x4000], cartridge: Cartridge) -> Self {
        Self {
            bus: Bus::new(bios, cartridge),
            cpu,
        }
    }

    /// Run the whole machine for `cycles` master cycles. Overshoot from the
    /// last instruction carries into the next call, so frame-sized slices
    /// stay exact in the long run.
    pub fn run_for(&mut self, cycles: i32) {
        self.bus.run_for(cycles, &mut self.cpu);
    }

    pub fn reset(&mut self) {
        self.bus.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupKind;
    use crate::cpu::hardware::interrupt_control::HaltControl;
    use crate::cpu::Access;

    /// Minimal processor: every step is one idle cycle; counts activity.
    #[derive(Default)]
    struct Spin {
        steps: u64,
        irqs: u64,
        first_step_at: Option<u64>,
    }

    impl Processor for Spin {
        fn step(&mut self, bus: &mut Bus) {
            if self.first_step_at.is_none() {
                self.first_step_at = Some(bus.cycles_count());
            }
            self.steps += 1;
            bus.idle();
        }

        fn signal_irq(&mut self, _: &mut Bus) {
            self.irqs += 1;
        }
    }

    fn gba() -> Gba<Spin> {
        Gba::new(Spin::default(), [0; 0x4000], Cartridge::default())
    }

    #[test]
    fn run_for_consumes_the_requested_cycles() {
        let mut gba = gba();

        gba.run_for(1000);

        // The spin CPU charges exactly one cycle per step.
        assert_eq!(gba.bus.cycles_count(), 1000);
        assert_eq!(gba.bus.scheduler.now(), 1000);
        assert_eq!(gba.cpu.steps, 1000);
    }

    #[test]
    fn overshoot_carries_into_the_next_call() {
        struct Chunky;
        impl Processor for Chunky {
            fn step(&mut self, bus: &mut Bus) {
                // 7 cycles per instruction; will overshoot slice ends.
                for _ in 0..7 {
                    bus.idle();
                }
            }
            fn signal_irq(&mut self, _: &mut Bus) {}
        }

        let mut gba = Gba::new(Chunky, [0; 0x4000], Cartridge::default());

        gba.run_for(1000);
        gba.run_for(1000);

        // Total time spent is the request minus the carry left over.
        let spent = gba.bus.cycles_count() as i64;
        let carry = i64::from(gba.bus.ticks_cpu_left);
        assert_eq!(spent, 2000 - carry);
        // Within one instruction of the target.
        assert!((spent - 2000).abs() < 7);
    }

    #[test]
    fn halt_wakes_on_enabled_interrupt_without_ime() {
        fn raise_timer0(bus: &mut Bus) {
            bus.interrupt_control.interrupt_request |= 1;
        }

        let mut gba = gba();
        gba.bus.interrupt_control.halt_control = HaltControl::Halt;
        gba.bus.interrupt_control.interrupt_enable = 0x0001;
        gba.bus.interrupt_control.interrupt_master_enable = false;
        gba.bus.scheduler.add(500_000, raise_timer0);

        gba.run_for(1_000_000);

        // Halt released exactly at the event...
        assert_eq!(gba.bus.interrupt_control.halt_control, HaltControl::Run);
        assert_eq!(gba.cpu.first_step_at, Some(500_000));
        // ...the CPU ran the back half of the slice...
        assert_eq!(gba.cpu.steps, 500_000);
        // ...and IME=0 meant no exception entry.
        assert_eq!(gba.cpu.irqs, 0);
    }

    #[test]
    fn halted_cpu_executes_nothing() {
        let mut gba = gba();
        gba.bus.interrupt_control.halt_control = HaltControl::Halt;

        gba.run_for(100_000);

        assert_eq!(gba.cpu.steps, 0);
        assert_eq!(gba.bus.scheduler.now(), 100_000);
    }

    #[test]
    fn irq_fires_only_with_ime() {
        let mut gba = gba();
        gba.bus.interrupt_control.interrupt_enable = 0x0001;
        gba.bus.interrupt_control.interrupt_request = 0x0001;
        gba.bus.interrupt_control.interrupt_master_enable = false;

        gba.run_for(10);
        assert_eq!(gba.cpu.irqs, 0);

        gba.bus.interrupt_control.interrupt_master_enable = true;
        gba.run_for(10);
        assert!(gba.cpu.irqs > 0);
    }

    #[test]
    fn dma_starves_the_cpu() {
        let mut gba = gba();
        // Timer 0 ticking so we can see time pass for peripherals.
        gba.bus.write_u16(0x0400_0102, 0x0080, Access::NonSequential);
        gba.bus.cycles_count = 0;
        gba.bus.ticks_cpu_left = 0;

        // A long immediate transfer: 0x1000 words EWRAM -> EWRAM.
        gba.bus.dma.channels[0].source_address = 0x0200_0000;
        gba.bus.dma.channels[0].destination_address = 0x0201_0000;
        gba.bus.dma.channels[0].word_count = 0x1000;
        gba.bus.dma.channels[0].control = 1 << 15 | 1 << 10;
        gba.bus.dma_control_written(0, 0);
        assert!(gba.bus.dma_is_running());

        gba.run_for(2000);

        // The CPU never ran, but timers and the scheduler did.
        assert_eq!(gba.cpu.steps, 0);
        assert!(gba.bus.dma_is_running());
        assert!(gba.bus.timers.channels[0].counter > 0);
        assert!(gba.bus.lcd.vcount >= 1);
    }

    #[test]
    fn eeprom_is_reachable_only_through_dma() {
        let mut gba = Gba::new(
            Spin::default(),
            [0; 0x4000],
            Cartridge::with_backup(vec![0; 0x4000], BackupKind::Eeprom8K),
        );

        // A CPU access sees the ready bit / gets dropped.
        assert_eq!(
            gba.bus.read_u16(0x0D00_0000, Access::NonSequential),
            1
        );
        gba.bus.write_u16(0x0D00_0000, 1, Access::NonSequential);

        // The same access during DMA reaches the chip. Transfer a read
        // request ("11" + 14 address bits + stop) from EWRAM.
        let request: [u16; 17] = [1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        for (i, bit) in request.iter().enumerate() {
            gba.bus
                .write_u16(0x0200_0000 + i as u32 * 2, *bit, Access::NonSequential);
        }

        gba.bus.dma.channels[3].source_address = 0x0200_0000;
        gba.bus.dma.channels[3].destination_address = 0x0D00_0000;
        gba.bus.dma.channels[3].word_count = 17;
        gba.bus.dma.channels[3].control = 1 << 15 | 2 << 5; // fixed destination
        gba.bus.dma_control_written(3, 0);

        gba.run_for(1000);

        // The chip is now streaming the read request's data bits out:
        // 4 dummy bits first, during DMA.
        gba.bus.dma.channels[3].source_address = 0x0D00_0000;
        gba.bus.dma.channels[3].destination_address = 0x0200_0100;
        gba.bus.dma.channels[3].word_count = 68;
        gba.bus.dma.channels[3].control = 1 << 15 | 2 << 7; // fixed source
        gba.bus.dma_control_written(3, 0);

        gba.run_for(4000);

        // Erased EEPROM reads back all-ones data bits after the 4 dummies.
        assert_eq!(gba.bus.read_u16(0x0200_0100, Access::NonSequential), 0);
        assert_eq!(gba.bus.read_u16(0x0200_0108, Access::NonSequential), 1);
        assert_eq!(gba.bus.read_u16(0x0200_0186, Access::NonSequential), 1);
    }
}
