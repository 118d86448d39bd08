//! Sound register file and sample clock.
//!
//! Channel synthesis and mixing live outside the core. What stays here is
//! the register storage software pokes at and a clock that ticks once per
//! output sample so the scheduler wakes up at the mixer's rate.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::Peripheral;
use crate::cpu::hardware::interrupt_control::InterruptControl;

pub const SAMPLE_RATE: u32 = 32_768;
pub const CLOCKS_PER_SAMPLE: u32 = crate::CPU_CLOCK_HZ / SAMPLE_RATE;

/// Offset of the register block inside the I/O region.
pub const SOUND_BASE: u32 = 0x060;
const SOUND_REGISTERS_SIZE: usize = 0x50;
const SOUNDCNT_X: usize = 0x84 - SOUND_BASE as usize;
const SOUNDBIAS: usize = 0x88 - SOUND_BASE as usize;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sound {
    registers: Vec<u8>,
    sample_clock: u32,
    /// Samples the mixer would have produced so far.
    pub samples: u64,
}

impl Default for Sound {
    fn default() -> Self {
        let mut registers = vec![0; SOUND_REGISTERS_SIZE];
        registers[SOUNDBIAS + 1] = 0x02;
        Self {
            registers,
            sample_clock: 0,
            samples: 0,
        }
    }
}

impl Sound {
    #[must_use]
    pub fn master_enabled(&self) -> bool {
        self.registers[SOUNDCNT_X].get_bit(7)
    }

    #[must_use]
    pub fn bias(&self) -> u16 {
        u16::from_le_bytes([self.registers[SOUNDBIAS], self.registers[SOUNDBIAS + 1]])
    }

    /// Sets the bias level (bits 1-9), leaving the resolution bits alone.
    pub fn set_bias_level(&mut self, level: u16) {
        let bias = (self.bias() & !0x3FE) | (level & 0x3FE);
        self.registers[SOUNDBIAS..SOUNDBIAS + 2].copy_from_slice(&bias.to_le_bytes());
    }

    /// Byte read at an offset from `SOUND1CNT_L`.
    #[must_use]
    pub fn read(&self, offset: u32) -> u8 {
        self.registers.get(offset as usize).copied().unwrap_or(0)
    }

    pub fn write(&mut self, offset: u32, value: u8) {
        if let Some(register) = self.registers.get_mut(offset as usize) {
            *register = value;
        }
    }
}

impl Peripheral for Sound {
    fn update(&mut self, elapsed: u32, _interrupts: &mut InterruptControl) -> u32 {
        let clocks = self.sample_clock + elapsed;
        self.sample_clock = clocks % CLOCKS_PER_SAMPLE;
        if self.master_enabled() {
            self.samples += u64::from(clocks / CLOCKS_PER_SAMPLE);
        }
        CLOCKS_PER_SAMPLE - self.sample_clock
    }
}
