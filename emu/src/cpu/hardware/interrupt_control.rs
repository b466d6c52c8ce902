use serde::{Deserialize, Serialize};

/// Interrupt sources, one bit each in IE and IF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    VBlank = 1 << 0,
    HBlank = 1 << 1,
    VCount = 1 << 2,
    Timer0 = 1 << 3,
    Timer1 = 1 << 4,
    Timer2 = 1 << 5,
    Timer3 = 1 << 6,
    Serial = 1 << 7,
    Dma0 = 1 << 8,
    Dma1 = 1 << 9,
    Dma2 = 1 << 10,
    Dma3 = 1 << 11,
    Keypad = 1 << 12,
    GamePak = 1 << 13,
}

/// Power state selected through HALTCNT. Halt is released by any enabled
/// pending interrupt regardless of IME; Stop needs a wake source this core
/// does not model and simply idles.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltControl {
    #[default]
    Run,
    Halt,
    Stop,
}

#[derive(Default, Serialize, Deserialize)]
pub struct InterruptControl {
    /// IE (0x04000200).
    pub interrupt_enable: u16,
    /// IF (0x04000202). Writes acknowledge: a written 1 clears the bit.
    pub interrupt_request: u16,
    /// IME (0x04000208), bit 0 only.
    pub interrupt_master_enable: bool,
    pub halt_control: HaltControl,
    /// POSTFLG (0x04000300).
    pub post_boot_flag: u8,
}

impl InterruptControl {
    pub fn raise(&mut self, interrupt: Interrupt) {
        self.interrupt_request |= interrupt as u16;
    }

    /// Enabled pending interrupts. The CPU takes the exception only when
    /// IME is also set; HALT is released on this alone.
    pub fn fire(&self) -> u16 {
        self.interrupt_enable & self.interrupt_request
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fire_needs_matching_enable() {
        let mut control = InterruptControl::default();
        control.raise(Interrupt::Timer1);

        assert_eq!(control.fire(), 0);

        control.interrupt_enable = Interrupt::Timer1 as u16;
        assert_eq!(control.fire(), Interrupt::Timer1 as u16);
    }

    #[test]
    fn raise_accumulates() {
        let mut control = InterruptControl::default();
        control.raise(Interrupt::VBlank);
        control.raise(Interrupt::Dma3);

        assert_eq!(
            control.interrupt_request,
            Interrupt::VBlank as u16 | Interrupt::Dma3 as u16
        );
    }
}
