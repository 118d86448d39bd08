//! # Timers
//!
//! Four 16-bit up-counters. Each one ticks every 1, 64, 256 or 1024 clocks,
//! or, in count-up mode, once every time the previous timer overflows. On
//! overflow the counter restarts from its reload value and may raise an IRQ.
//!
//! ```text
//! TMxCNT_H
//! 15      8 7 6 5   3 2 1 0
//! ┌────────┬─┬─┬─────┬─┬───┐
//! │ unused │E│I│     │C│ P │  E=enable I=IRQ C=count-up P=prescaler
//! └────────┴─┴─┴─────┴─┴───┘
//! ```

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::interrupt_control::{Interrupt, InterruptControl};
use crate::cpu::hardware::{NO_EVENT, Peripheral};

const PRESCALER_PERIODS: [u32; 4] = [1, 64, 256, 1024];

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct Timer {
    pub reload: u16,
    pub counter: u16,
    pub control: u16,
    /// Clocks accumulated toward the next prescaler tick.
    prescaler_clocks: u32,
}

impl Timer {
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.control.get_bit(7)
    }

    #[must_use]
    pub fn count_up(&self) -> bool {
        self.control.get_bit(2)
    }

    #[must_use]
    pub fn irq_enabled(&self) -> bool {
        self.control.get_bit(6)
    }

    #[must_use]
    pub fn period(&self) -> u32 {
        PRESCALER_PERIODS[usize::from(self.control & 0b11)]
    }

    /// Advances the counter by `ticks` and returns how many times it
    /// overflowed.
    fn tick(&mut self, ticks: u32) -> u32 {
        let to_first_overflow = 0x1_0000 - u32::from(self.counter);
        if ticks < to_first_overflow {
            self.counter += ticks as u16;
            return 0;
        }

        let span = 0x1_0000 - u32::from(self.reload);
        let after_first = ticks - to_first_overflow;
        self.counter = self.reload + (after_first % span) as u16;
        1 + after_first / span
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Timers {
    pub timers: [Timer; 4],
}

impl Timers {
    /// Counter value as seen `pending` clocks after the last update.
    #[must_use]
    pub fn read_counter(&self, index: usize, pending: u32) -> u16 {
        let timer = self.timers[index];
        if !timer.enabled() || (timer.count_up() && index > 0) {
            return timer.counter;
        }

        let mut preview = timer;
        let ticks = (preview.prescaler_clocks + pending) / preview.period();
        preview.tick(ticks);
        preview.counter
    }

    /// Byte read at an offset from `TM0CNT_L`.
    #[must_use]
    pub fn read(&self, offset: u32, pending: u32) -> u8 {
        let index = (offset / 4) as usize;
        match offset % 4 {
            0 => self.read_counter(index, pending).get_byte(0),
            1 => self.read_counter(index, pending).get_byte(1),
            2 => self.timers[index].control.get_byte(0),
            _ => self.timers[index].control.get_byte(1),
        }
    }

    pub fn write(&mut self, offset: u32, value: u8) {
        let timer = &mut self.timers[(offset / 4) as usize];
        match offset % 4 {
            0 => timer.reload.set_byte(0, value),
            1 => timer.reload.set_byte(1, value),
            2 => {
                let was_enabled = timer.enabled();
                timer.control.set_byte(0, value & 0b1100_0111);
                if !was_enabled && timer.enabled() {
                    timer.counter = timer.reload;
                    timer.prescaler_clocks = 0;
                }
            }
            _ => {}
        }
    }
}

impl Peripheral for Timers {
    fn update(&mut self, elapsed: u32, interrupts: &mut InterruptControl) -> u32 {
        let mut cascade = 0;
        let mut horizon = NO_EVENT;

        for (index, timer) in self.timers.iter_mut().enumerate() {
            if !timer.enabled() {
                cascade = 0;
                continue;
            }

            let overflows = if timer.count_up() && index > 0 {
                timer.tick(cascade)
            } else {
                let period = timer.period();
                let clocks = timer.prescaler_clocks + elapsed;
                timer.prescaler_clocks = clocks % period;
                let overflows = timer.tick(clocks / period);

                let until_overflow = (0x1_0000 - u32::from(timer.counter)) * period
                    - timer.prescaler_clocks;
                horizon = horizon.min(until_overflow);
                overflows
            };

            if overflows > 0 && timer.irq_enabled() {
                interrupts.request(Interrupt::TIMERS[index]);
            }
            cascade = overflows;
        }

        horizon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn start(timers: &mut Timers, index: usize, reload: u16, control: u8) {
        let base = index as u32 * 4;
        timers.write(base, reload.get_byte(0));
        timers.write(base + 1, reload.get_byte(1));
        timers.write(base + 2, control);
    }

    #[test]
    fn prescaler_and_overflow_irq() {
        let mut timers = Timers::default();
        let mut ic = InterruptControl::default();
        // prescaler 64, IRQ, enable
        start(&mut timers, 0, 0xFFF0, 0b1100_0001);

        let horizon = timers.update(0, &mut ic);
        assert_eq!(horizon, 16 * 64);

        timers.update(64 * 15 + 63, &mut ic);
        assert_eq!(timers.timers[0].counter, 0xFFFF);
        assert_eq!(ic.interrupt_request, 0);
        assert_eq!(timers.read_counter(0, 1), 0xFFF0);

        let horizon = timers.update(1, &mut ic);
        assert_eq!(timers.timers[0].counter, 0xFFF0);
        assert_eq!(ic.interrupt_request, Interrupt::Timer0.mask());
        assert_eq!(horizon, 16 * 64);
    }

    #[test]
    fn count_up_cascades_overflows() {
        let mut timers = Timers::default();
        let mut ic = InterruptControl::default();
        start(&mut timers, 0, 0xFFFF, 0b1000_0000);
        start(&mut timers, 1, 0xFFFE, 0b1100_0100);

        timers.update(1, &mut ic);
        assert_eq!(timers.timers[1].counter, 0xFFFF);
        timers.update(1, &mut ic);
        assert_eq!(timers.timers[1].counter, 0xFFFE);
        assert_eq!(ic.interrupt_request, Interrupt::Timer1.mask());
    }

    #[test]
    fn enabling_reloads_the_counter() {
        let mut timers = Timers::default();
        timers.timers[2].counter = 0x1234;
        start(&mut timers, 2, 0x8000, 0b1000_0000);
        assert_eq!(timers.read(8, 0), 0x00);
        assert_eq!(timers.read(9, 0), 0x80);
    }
}
