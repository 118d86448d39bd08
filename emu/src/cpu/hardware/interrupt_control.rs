use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

/// Interrupt sources, by their bit in IE/IF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interrupt {
    VBlank = 0,
    HBlank = 1,
    VCounter = 2,
    Timer0 = 3,
    Timer1 = 4,
    Timer2 = 5,
    Timer3 = 6,
    Serial = 7,
    Dma0 = 8,
    Dma1 = 9,
    Dma2 = 10,
    Dma3 = 11,
    Keypad = 12,
    GamePak = 13,
}

impl Interrupt {
    pub const TIMERS: [Self; 4] = [Self::Timer0, Self::Timer1, Self::Timer2, Self::Timer3];
    pub const DMAS: [Self; 4] = [Self::Dma0, Self::Dma1, Self::Dma2, Self::Dma3];

    #[must_use]
    pub const fn mask(self) -> u16 {
        1 << self as u16
    }
}

/// Sources able to wake the CPU from STOP.
const STOP_WAKE_MASK: u16 =
    Interrupt::Keypad.mask() | Interrupt::GamePak.mask() | Interrupt::Serial.mask();

const IRQ_SOURCES_MASK: u16 = 0x3FFF;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct InterruptControl {
    pub interrupt_enable: u16,
    /// Interrupt Request Flags (IF), bits are set when interrupts are requested,
    /// cleared by writing 1 to the corresponding bit
    pub interrupt_request: u16,
    pub wait_state_control: u16,
    pub interrupt_master_enable: u16,
    pub post_boot_flag: u8,
}

impl InterruptControl {
    /// ORs a source into the pending latch. The only way collaborators
    /// signal the CPU.
    pub fn request(&mut self, interrupt: Interrupt) {
        tracing::trace!("IRQ requested: {interrupt:?}");
        self.interrupt_request |= interrupt.mask();
    }

    /// Software acknowledgment: clears every bit set in `mask`.
    pub const fn acknowledge(&mut self, mask: u16) {
        self.interrupt_request &= !mask;
    }

    #[must_use]
    pub const fn master_enabled(&self) -> bool {
        self.interrupt_master_enable & 1 == 1
    }

    #[must_use]
    pub const fn enabled_and_requested(&self) -> u16 {
        self.interrupt_enable & self.interrupt_request & IRQ_SOURCES_MASK
    }

    /// An IRQ is ready for the CPU, ignoring the CPSR I bit.
    #[must_use]
    pub const fn pending(&self) -> bool {
        self.master_enabled() && self.enabled_and_requested() != 0
    }

    /// HALT ends on any enabled request, even with IME cleared.
    #[must_use]
    pub const fn wakes_from_halt(&self) -> bool {
        self.enabled_and_requested() != 0
    }

    #[must_use]
    pub const fn wakes_from_stop(&self) -> bool {
        self.enabled_and_requested() & STOP_WAKE_MASK != 0
    }

    /// Byte read at an offset of the I/O region.
    #[must_use]
    pub fn read(&self, offset: u32) -> u8 {
        match offset {
            0x200 => self.interrupt_enable.get_byte(0),
            0x201 => self.interrupt_enable.get_byte(1),
            0x202 => self.interrupt_request.get_byte(0),
            0x203 => self.interrupt_request.get_byte(1),
            0x204 => self.wait_state_control.get_byte(0),
            0x205 => self.wait_state_control.get_byte(1),
            0x208 => self.interrupt_master_enable.get_byte(0),
            0x209 => self.interrupt_master_enable.get_byte(1),
            0x300 => self.post_boot_flag,
            _ => 0,
        }
    }

    pub fn write(&mut self, offset: u32, value: u8) {
        match offset {
            0x200 => self.interrupt_enable.set_byte(0, value),
            0x201 => self.interrupt_enable.set_byte(1, value & 0x3F),
            0x202 => self.acknowledge(u16::from(value)),
            0x203 => self.acknowledge(u16::from(value) << 8),
            0x204 => self.wait_state_control.set_byte(0, value),
            0x205 => self.wait_state_control.set_byte(1, value),
            0x208 => self.interrupt_master_enable.set_byte(0, value & 1),
            0x209 => {}
            0x300 => self.post_boot_flag = value & 1,
            _ => tracing::debug!("write on unused interrupt control register 0x{offset:03X}"),
        }
    }
}
