use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

/// GBA button bit positions in KEYINPUT (pressed buttons read as 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GbaButton {
    A = 1 << 0,
    B = 1 << 1,
    Select = 1 << 2,
    Start = 1 << 3,
    Right = 1 << 4,
    Left = 1 << 5,
    Up = 1 << 6,
    Down = 1 << 7,
    R = 1 << 8,
    L = 1 << 9,
}

#[derive(Serialize, Deserialize)]
pub struct Keypad {
    /// KEYINPUT (0x04000130), active-low.
    pub key_input: u16,
    /// KEYCNT (0x04000132): selected buttons, IRQ enable (bit 14) and the
    /// AND/OR condition (bit 15).
    pub key_interrupt_control: u16,
}

impl Default for Keypad {
    fn default() -> Self {
        Self::new()
    }
}

impl Keypad {
    /// All ten buttons released.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            key_input: 0x03FF,
            key_interrupt_control: 0,
        }
    }

    /// Host-facing button state change. Active-low: pressing clears the bit.
    pub fn set_button(&mut self, button: GbaButton, pressed: bool) {
        if pressed {
            self.key_input &= !(button as u16);
        } else {
            self.key_input |= button as u16;
        }
    }

    /// Whether the KEYCNT condition currently holds: in OR mode any selected
    /// button held, in AND mode all selected buttons held.
    pub fn irq_condition(&self) -> bool {
        if !self.key_interrupt_control.get_bit(14) {
            return false;
        }

        let selected = self.key_interrupt_control.get_bits(0..=9);
        let held = !self.key_input & 0x03FF;

        if self.key_interrupt_control.get_bit(15) {
            selected != 0 && held & selected == selected
        } else {
            held & selected != 0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buttons_are_active_low() {
        let mut keypad = Keypad::new();
        assert_eq!(keypad.key_input, 0x03FF);

        keypad.set_button(GbaButton::A, true);
        assert_eq!(keypad.key_input & 1, 0);

        keypad.set_button(GbaButton::A, false);
        assert_eq!(keypad.key_input, 0x03FF);
    }

    #[test]
    fn or_mode_fires_on_any_selected_button() {
        let mut keypad = Keypad::new();
        keypad.key_interrupt_control = 1 << 14 | GbaButton::A as u16 | GbaButton::B as u16;

        assert!(!keypad.irq_condition());

        keypad.set_button(GbaButton::B, true);
        assert!(keypad.irq_condition());
    }

    #[test]
    fn and_mode_needs_every_selected_button() {
        let mut keypad = Keypad::new();
        keypad.key_interrupt_control =
            1 << 15 | 1 << 14 | GbaButton::Start as u16 | GbaButton::Select as u16;

        keypad.set_button(GbaButton::Start, true);
        assert!(!keypad.irq_condition());

        keypad.set_button(GbaButton::Select, true);
        assert!(keypad.irq_condition());
    }

    #[test]
    fn disabled_keycnt_never_fires() {
        let mut keypad = Keypad::new();
        keypad.key_interrupt_control = GbaButton::A as u16;
        keypad.set_button(GbaButton::A, true);

        assert!(!keypad.irq_condition());
    }
}
