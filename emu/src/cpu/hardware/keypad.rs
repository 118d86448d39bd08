use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::interrupt_control::{Interrupt, InterruptControl};
use crate::cpu::hardware::{NO_EVENT, Peripheral};

/// GBA button bit positions in KEYINPUT register (when pressed are set to 0).
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

const BUTTONS_MASK: u16 = 0x03FF;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keypad {
    pub key_input: u16,
    pub key_interrupt_control: u16,
    condition_was_met: bool,
}

impl Default for Keypad {
    fn default() -> Self {
        Self::new()
    }
}

impl Keypad {
    /// Create a new Keypad with all buttons released (all bits set to 1).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            key_input: BUTTONS_MASK,
            key_interrupt_control: 0,
            condition_was_met: false,
        }
    }

    /// Set button state: pressed = true, released = false.
    /// GBA uses active-low logic: bit 0 = pressed, bit 1 = released.
    pub const fn set_button(&mut self, button: GbaButton, pressed: bool) {
        if pressed {
            self.key_input &= !(button as u16);
        } else {
            self.key_input |= button as u16;
        }
    }

    /// KEYCNT condition: any selected button (OR) or all of them (AND).
    #[must_use]
    pub fn irq_condition(&self) -> bool {
        let control = self.key_interrupt_control;
        if !control.get_bit(14) {
            return false;
        }

        let selected = control & BUTTONS_MASK;
        let pressed = !self.key_input & BUTTONS_MASK;
        if control.get_bit(15) {
            selected != 0 && pressed & selected == selected
        } else {
            pressed & selected != 0
        }
    }

    /// Byte read at an offset from `KEYINPUT`.
    #[must_use]
    pub fn read(&self, offset: u32) -> u8 {
        match offset {
            0 => self.key_input.get_byte(0),
            1 => self.key_input.get_byte(1),
            2 => self.key_interrupt_control.get_byte(0),
            _ => self.key_interrupt_control.get_byte(1),
        }
    }

    /// KEYINPUT is read-only.
    pub fn write(&mut self, offset: u32, value: u8) {
        match offset {
            2 => self.key_interrupt_control.set_byte(0, value),
            3 => self.key_interrupt_control.set_byte(1, value & 0xC3),
            _ => {}
        }
    }
}

impl Peripheral for Keypad {
    fn update(&mut self, _elapsed: u32, interrupts: &mut InterruptControl) -> u32 {
        let met = self.irq_condition();
        if met && !self.condition_was_met {
            interrupts.request(Interrupt::Keypad);
        }
        self.condition_was_met = met;
        NO_EVENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn or_mode_raises_once_per_press() {
        let mut keypad = Keypad::new();
        let mut ic = InterruptControl::default();
        keypad.write(2, (GbaButton::A as u16 | GbaButton::Start as u16) as u8);
        keypad.write(3, 0b0100_0000);

        keypad.update(1, &mut ic);
        assert_eq!(ic.interrupt_request, 0);

        keypad.set_button(GbaButton::Start, true);
        keypad.update(1, &mut ic);
        assert_eq!(ic.interrupt_request, Interrupt::Keypad.mask());

        ic.acknowledge(0xFFFF);
        keypad.update(1, &mut ic);
        assert_eq!(ic.interrupt_request, 0);
    }

    #[test]
    fn and_mode_needs_every_selected_button() {
        let mut keypad = Keypad::new();
        keypad.key_interrupt_control = 0xC000 | GbaButton::L as u16 | GbaButton::R as u16;
        keypad.set_button(GbaButton::L, true);
        assert!(!keypad.irq_condition());
        keypad.set_button(GbaButton::R, true);
        assert!(keypad.irq_condition());
        assert_eq!(keypad.read(0), 0xFF);
        assert_eq!(keypad.read(1), 0x00);
    }
}
