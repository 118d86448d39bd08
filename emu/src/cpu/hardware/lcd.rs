//! # LCD timing
//!
//! Only the clocking side of the video unit: scanline and frame counters,
//! the blanking flags in DISPSTAT and the interrupts and DMA triggers they
//! raise. Pixels are not produced here.
//!
//! ```text
//!  0          960            1232 clocks
//!  ├──HDraw────┼───HBlank────┤           one scanline = 308 dots * 4 clocks
//!  lines 0..160 visible, 160..228 VBlank  one frame = 228 lines
//! ```

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::Peripheral;
use crate::cpu::hardware::interrupt_control::{Interrupt, InterruptControl};

pub const CLOCKS_PER_DOT: u32 = 4;
pub const HDRAW_CLOCKS: u32 = 240 * CLOCKS_PER_DOT;
pub const CLOCKS_PER_LINE: u32 = 308 * CLOCKS_PER_DOT;
pub const VISIBLE_LINES: u16 = 160;
pub const LINES_PER_FRAME: u16 = 228;
pub const CLOCKS_PER_FRAME: u32 = CLOCKS_PER_LINE * LINES_PER_FRAME as u32;

/// DISPSTAT bits software may write.
const DISPSTAT_WRITABLE: u16 = 0xFF38;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Lcd {
    pub dispcnt: u16,
    pub dispstat: u16,
    pub vcount: u16,

    /// Completed frames since power on.
    pub frame: u64,

    clock_in_line: u32,
    hblank_started: bool,
    vblank_started: bool,
}

impl Lcd {
    #[must_use]
    pub fn in_vblank(&self) -> bool {
        self.dispstat.get_bit(0)
    }

    #[must_use]
    pub fn in_hblank(&self) -> bool {
        self.dispstat.get_bit(1)
    }

    /// Reports (and clears) a visible-line HBlank start since the last call.
    pub const fn take_hblank_start(&mut self) -> bool {
        std::mem::replace(&mut self.hblank_started, false)
    }

    /// Reports (and clears) a VBlank start since the last call.
    pub const fn take_vblank_start(&mut self) -> bool {
        std::mem::replace(&mut self.vblank_started, false)
    }

    #[must_use]
    pub fn read(&self, offset: u32) -> u8 {
        match offset {
            0x0 => self.dispcnt.get_byte(0),
            0x1 => self.dispcnt.get_byte(1),
            0x4 => self.dispstat.get_byte(0),
            0x5 => self.dispstat.get_byte(1),
            0x6 => self.vcount.get_byte(0),
            _ => 0,
        }
    }

    pub fn write(&mut self, offset: u32, value: u8) {
        match offset {
            0x0 => self.dispcnt.set_byte(0, value),
            0x1 => self.dispcnt.set_byte(1, value),
            0x4 => {
                let writable = DISPSTAT_WRITABLE.get_byte(0);
                let kept = self.dispstat.get_byte(0) & !writable;
                self.dispstat.set_byte(0, kept | (value & writable));
            }
            0x5 => self.dispstat.set_byte(1, value),
            _ => {}
        }
    }

    fn enter_hblank(&mut self, interrupts: &mut InterruptControl) {
        self.dispstat.set_bit_on(1);
        if self.dispstat.get_bit(4) {
            interrupts.request(Interrupt::HBlank);
        }
        if self.vcount < VISIBLE_LINES {
            self.hblank_started = true;
        }
    }

    fn next_line(&mut self, interrupts: &mut InterruptControl) {
        self.dispstat.set_bit_off(1);
        self.vcount += 1;
        if self.vcount == LINES_PER_FRAME {
            self.vcount = 0;
            self.frame += 1;
        }

        match self.vcount {
            VISIBLE_LINES => {
                self.dispstat.set_bit_on(0);
                self.vblank_started = true;
                if self.dispstat.get_bit(3) {
                    interrupts.request(Interrupt::VBlank);
                }
            }
            227 => self.dispstat.set_bit_off(0),
            _ => {}
        }

        let matches = self.vcount == self.dispstat.get_bits(8..=15);
        self.dispstat.set_bit(2, matches);
        if matches && self.dispstat.get_bit(5) {
            interrupts.request(Interrupt::VCounter);
        }
    }
}

impl Peripheral for Lcd {
    fn update(&mut self, elapsed: u32, interrupts: &mut InterruptControl) -> u32 {
        self.clock_in_line += elapsed;

        loop {
            if !self.in_hblank() && self.clock_in_line >= HDRAW_CLOCKS {
                self.enter_hblank(interrupts);
            } else if self.clock_in_line >= CLOCKS_PER_LINE {
                self.clock_in_line -= CLOCKS_PER_LINE;
                self.next_line(interrupts);
            } else {
                break;
            }
        }

        if self.in_hblank() {
            CLOCKS_PER_LINE - self.clock_in_line
        } else {
            HDRAW_CLOCKS - self.clock_in_line
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn horizons_walk_a_scanline() {
        let mut lcd = Lcd::default();
        let mut ic = InterruptControl::default();
        assert_eq!(lcd.update(0, &mut ic), HDRAW_CLOCKS);
        assert_eq!(lcd.update(HDRAW_CLOCKS, &mut ic), CLOCKS_PER_LINE - HDRAW_CLOCKS);
        assert!(lcd.in_hblank());
        assert!(lcd.take_hblank_start());
        assert!(!lcd.take_hblank_start());

        assert_eq!(lcd.update(CLOCKS_PER_LINE - HDRAW_CLOCKS, &mut ic), HDRAW_CLOCKS);
        assert_eq!(lcd.vcount, 1);
        assert!(!lcd.in_hblank());
    }

    #[test]
    fn a_frame_raises_vblank_once() {
        let mut lcd = Lcd::default();
        let mut ic = InterruptControl::default();
        lcd.write(0x4, 0b1000);

        lcd.update(CLOCKS_PER_LINE * 160, &mut ic);
        assert_eq!(lcd.vcount, 160);
        assert!(lcd.in_vblank());
        assert_eq!(ic.interrupt_request, Interrupt::VBlank.mask());
        assert!(lcd.take_vblank_start());

        lcd.update(CLOCKS_PER_LINE * 68, &mut ic);
        assert_eq!(lcd.vcount, 0);
        assert_eq!(lcd.frame, 1);
        assert!(!lcd.in_vblank());
    }

    #[test]
    fn vcounter_match() {
        let mut lcd = Lcd::default();
        let mut ic = InterruptControl::default();
        lcd.write(0x4, 0b10_0000);
        lcd.write(0x5, 3);

        lcd.update(CLOCKS_PER_LINE * 3, &mut ic);
        assert!(lcd.dispstat.get_bit(2));
        assert_eq!(ic.interrupt_request, Interrupt::VCounter.mask());
        // Status bits are read-only.
        lcd.write(0x4, 0);
        assert!(lcd.dispstat.get_bit(2));
    }
}
