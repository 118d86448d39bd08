//! # DMA controller
//!
//! Four channels, each with a source, a destination, a unit count and a
//! control word. A started transfer copies all its units in one go; the
//! clocks it took are then owed to the scheduler, which lets them elapse
//! while the CPU is stalled.
//!
//! ```text
//! DMAxCNT_H
//!  15  14  13-12  11  10   9   8-7   6-5   4-0
//! ┌───┬───┬──────┬───┬───┬───┬─────┬─────┬─────┐
//! │ E │ I │Timing│DRQ│32 │Rep│ Src │ Dst │     │
//! └───┴───┴──────┴───┴───┴───┴─────┴─────┴─────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::interrupt_control::{Interrupt, InterruptControl};
use crate::cpu::hardware::{NO_EVENT, Peripheral};

/// Bytes of register space per channel (SAD, DAD, CNT_L, CNT_H).
const CHANNEL_STRIDE: u32 = 12;

/// Fixed setup cost of a transfer (2 internal cycles).
pub const TRANSFER_OVERHEAD: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DmaTiming {
    Immediate,
    VBlank,
    HBlank,
    Special,
}

impl From<u16> for DmaTiming {
    fn from(control: u16) -> Self {
        match control.get_bits(12..=13) {
            0 => Self::Immediate,
            1 => Self::VBlank,
            2 => Self::HBlank,
            _ => Self::Special,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressControl {
    Increment,
    Decrement,
    Fixed,
    IncrementReload,
}

impl From<u16> for AddressControl {
    fn from(bits: u16) -> Self {
        match bits & 0b11 {
            0 => Self::Increment,
            1 => Self::Decrement,
            2 => Self::Fixed,
            _ => Self::IncrementReload,
        }
    }
}

impl AddressControl {
    const fn step(self, unit: u32) -> u32 {
        match self {
            Self::Increment | Self::IncrementReload => unit,
            Self::Decrement => unit.wrapping_neg(),
            Self::Fixed => 0,
        }
    }
}

/// Everything the bus needs to perform one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    pub channel: usize,
    pub source: u32,
    pub destination: u32,
    pub units: u32,
    pub word: bool,
    pub source_step: u32,
    pub destination_step: u32,
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct DmaChannel {
    pub source_address: u32,
    pub destination_address: u32,
    pub word_count: u16,
    pub control: u16,

    internal_source: u32,
    internal_destination: u32,
    pending: bool,
}

impl DmaChannel {
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.control.get_bit(15)
    }

    #[must_use]
    pub fn timing(&self) -> DmaTiming {
        DmaTiming::from(self.control)
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Dma {
    pub channels: [DmaChannel; 4],

    /// Clocks of finished transfers not yet handed to the scheduler.
    pub busy_clocks: u32,
}

impl Dma {
    /// True while a transfer is waiting to run or its cost is still owed.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy_clocks > 0 || self.channels.iter().any(|c| c.pending)
    }

    /// Marks every enabled channel waiting on `timing` as ready to run.
    pub fn trigger(&mut self, timing: DmaTiming) {
        for (index, channel) in self.channels.iter_mut().enumerate() {
            if channel.enabled() && channel.timing() == timing {
                tracing::trace!("DMA{index} triggered by {timing:?}");
                channel.pending = true;
            }
        }
    }

    /// Takes the highest-priority ready channel and describes its transfer.
    pub fn next_transfer(&mut self) -> Option<TransferPlan> {
        let channel = self.channels.iter().position(|c| c.pending)?;
        let state = &mut self.channels[channel];
        state.pending = false;

        let word = state.control.get_bit(10);
        let unit = if word { 4 } else { 2 };
        let max_units = if channel == 3 { 0x1_0000 } else { 0x4000 };
        let units = match u32::from(state.word_count) {
            0 => max_units,
            n => n.min(max_units),
        };

        Some(TransferPlan {
            channel,
            source: state.internal_source,
            destination: state.internal_destination,
            units,
            word,
            source_step: AddressControl::from(state.control.get_bits(7..=8)).step(unit),
            destination_step: AddressControl::from(state.control.get_bits(5..=6)).step(unit),
        })
    }

    /// Books a completed transfer: final addresses, repeat or disable, IRQ
    /// and the clocks the scheduler has to let pass.
    pub fn finish(
        &mut self,
        plan: &TransferPlan,
        source: u32,
        destination: u32,
        clocks: u32,
        interrupts: &mut InterruptControl,
    ) {
        let channel = &mut self.channels[plan.channel];
        channel.internal_source = source;
        channel.internal_destination = destination;

        let repeat = channel.control.get_bit(9) && channel.timing() != DmaTiming::Immediate;
        if repeat {
            if AddressControl::from(channel.control.get_bits(5..=6))
                == AddressControl::IncrementReload
            {
                channel.internal_destination = channel.destination_address;
            }
        } else {
            channel.control.set_bit_off(15);
        }

        if channel.control.get_bit(14) {
            interrupts.request(Interrupt::DMAS[plan.channel]);
        }

        self.busy_clocks += clocks + TRANSFER_OVERHEAD;
    }

    /// Byte read at an offset from `DMA0SAD`. Only the control word is
    /// readable.
    #[must_use]
    pub fn read(&self, offset: u32) -> u8 {
        let channel = &self.channels[(offset / CHANNEL_STRIDE) as usize];
        match offset % CHANNEL_STRIDE {
            10 => channel.control.get_byte(0),
            11 => channel.control.get_byte(1),
            _ => 0,
        }
    }

    /// Returns true when the write started an immediate transfer.
    pub fn write(&mut self, offset: u32, value: u8) -> bool {
        let index = (offset / CHANNEL_STRIDE) as usize;
        let channel = &mut self.channels[index];
        match offset % CHANNEL_STRIDE {
            n @ 0..=3 => channel.source_address.set_byte(n as u8, value),
            n @ 4..=7 => channel.destination_address.set_byte((n - 4) as u8, value),
            8 => channel.word_count.set_byte(0, value),
            9 => channel.word_count.set_byte(1, value),
            10 => channel.control.set_byte(0, value & 0xE0),
            _ => {
                let was_enabled = channel.enabled();
                channel.control.set_byte(1, value);
                if !was_enabled && channel.enabled() {
                    let source_mask = if index == 0 { 0x07FF_FFFF } else { 0x0FFF_FFFF };
                    let destination_mask = if index == 3 { 0x0FFF_FFFF } else { 0x07FF_FFFF };
                    channel.internal_source = channel.source_address & source_mask;
                    channel.internal_destination = channel.destination_address & destination_mask;

                    match channel.timing() {
                        DmaTiming::Immediate => {
                            channel.pending = true;
                            return true;
                        }
                        DmaTiming::Special => {
                            tracing::debug!("DMA{index}: special start timing is not emulated");
                        }
                        DmaTiming::VBlank | DmaTiming::HBlank => {}
                    }
                }
            }
        }

        false
    }
}

impl Peripheral for Dma {
    fn update(&mut self, elapsed: u32, _interrupts: &mut InterruptControl) -> u32 {
        self.busy_clocks = self.busy_clocks.saturating_sub(elapsed);
        if self.busy_clocks > 0 {
            self.busy_clocks
        } else {
            NO_EVENT
        }
    }
}
