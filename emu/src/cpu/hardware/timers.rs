//! The four hardware timers.
//!
//! Timers are not scheduler events: they advance inside `Bus::tick`, so a
//! peripheral observing the clock after a CPU instruction sees exactly the
//! cycles the instruction charged. Each timer counts up from its reload
//! value at a prescaled rate (1, 64, 256 or 1024 master cycles per step) or,
//! in cascade mode, once per overflow of the timer below it.
//!
//! | Register | Offset in block | Meaning                         |
//! |----------|-----------------|---------------------------------|
//! | TMxCNT_L | +0              | read: counter, write: reload    |
//! | TMxCNT_H | +2              | prescaler, cascade, IRQ, enable |

use serde::{Deserialize, Serialize};

use super::interrupt_control::Interrupt;
use crate::bitwise::Bits;

/// IF bits raised by each timer's overflow.
pub const TIMER_IRQ: [u16; 4] = [
    Interrupt::Timer0 as u16,
    Interrupt::Timer1 as u16,
    Interrupt::Timer2 as u16,
    Interrupt::Timer3 as u16,
];

/// Returned by [`Timers::estimate_cycles_until_irq`] when no timer IRQ can
/// fire; large enough to never bound a fast-forward.
pub const NO_TIMER_IRQ: i32 = i32::MAX;

const CONTROL_CASCADE: u8 = 2;
const CONTROL_IRQ: u8 = 6;
const CONTROL_ENABLE: u8 = 7;

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Timer {
    /// Live counter. Kept wider than 16 bits so overflow math stays simple.
    pub counter: u32,
    /// Value the counter restarts from on overflow and enable.
    pub reload: u16,
    pub control: u16,
    /// Master cycles accumulated toward the next prescaled step.
    phase: i32,
}

impl Timer {
    fn enabled(self) -> bool {
        self.control.get_bit(CONTROL_ENABLE)
    }

    fn cascade(self) -> bool {
        self.control.get_bit(CONTROL_CASCADE)
    }

    fn prescaler_shift(self) -> u32 {
        [0, 6, 8, 10][(self.control & 0b11) as usize]
    }

    /// Apply counter increments, returning the number of overflows.
    fn advance(&mut self, increments: u32) -> u32 {
        let mut overflows = 0;
        let mut counter = self.counter + increments;
        while counter > 0xFFFF {
            counter = counter - 0x10000 + u32::from(self.reload);
            overflows += 1;
        }
        self.counter = counter;
        overflows
    }
}

#[derive(Default, Serialize, Deserialize)]
pub struct Timers {
    pub channels: [Timer; 4],
}

impl Timers {
    /// Advance all timers by `cycles` master cycles. Returns the IF bits to
    /// raise for overflowing timers with IRQ enabled.
    pub fn run(&mut self, cycles: i32) -> u16 {
        let mut irq = 0;
        let mut carried_overflows = 0;

        for id in 0..4 {
            let timer = &mut self.channels[id];
            if !timer.enabled() {
                carried_overflows = 0;
                continue;
            }

            // The cascade bit is ignored on timer 0: with no feeder below
            // it, hardware keeps counting off the prescaler.
            let overflows = if timer.cascade() && id > 0 {
                timer.advance(carried_overflows)
            } else {
                let shift = timer.prescaler_shift();
                let total = timer.phase + cycles;
                timer.phase = total & ((1 << shift) - 1);
                timer.advance((total >> shift) as u32)
            };

            if overflows > 0 && timer.control.get_bit(CONTROL_IRQ) {
                irq |= TIMER_IRQ[id];
            }
            carried_overflows = overflows;
        }

        irq
    }

    /// Lower bound on the master cycles until the next timer IRQ, used to
    /// fast-forward a halted CPU. Waking early is fine; waking late is not,
    /// so a cascading timer reports the distance to its feeder's next
    /// overflow rather than its own.
    pub fn estimate_cycles_until_irq(&self) -> i32 {
        let mut estimate = NO_TIMER_IRQ;

        for id in 0..4 {
            let timer = self.channels[id];
            if !timer.enabled() || !timer.control.get_bit(CONTROL_IRQ) {
                continue;
            }

            let mut id = id;
            while id > 0 && self.channels[id].cascade() && self.channels[id - 1].enabled() {
                id -= 1;
            }

            let clocked = self.channels[id];
            if id > 0 && clocked.cascade() {
                // No running feeder below: this chain can never fire.
                continue;
            }

            let remaining =
                ((0x10000 - clocked.counter as i32) << clocked.prescaler_shift()) - clocked.phase;
            estimate = estimate.min(remaining);
        }

        estimate
    }

    /// Write a TMxCNT_H byte. An enable rising edge reloads the counter and
    /// restarts the prescaler phase.
    pub fn write_control(&mut self, id: usize, byte_nth: u8, value: u8) {
        let timer = &mut self.channels[id];
        let was_enabled = timer.enabled();

        timer.control.set_byte(byte_nth, value);

        if !was_enabled && timer.enabled() {
            timer.counter = u32::from(timer.reload);
            timer.phase = 0;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
