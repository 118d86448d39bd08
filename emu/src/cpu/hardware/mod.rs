//! # Peripheral collaborators
//!
//! Every subsystem the scheduler drives exposes the same contract: it is
//! told how many clocks elapsed since the last call and answers with how
//! many clocks may pass before it has something to do again. It talks
//! back to the CPU only through memory-mapped registers and the interrupt
//! latch it is handed.

pub mod dma;
pub mod interrupt_control;
pub mod keypad;
pub mod lcd;
pub mod sound;
pub mod timers;

use interrupt_control::InterruptControl;

/// Horizon reported by a collaborator with no scheduled event.
pub const NO_EVENT: u32 = u32::MAX;

pub trait Peripheral {
    /// Advances the collaborator by `elapsed` clocks and returns the clocks
    /// until its next internal event.
    fn update(&mut self, elapsed: u32, interrupts: &mut InterruptControl) -> u32;
}
