#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
mod bitwise;

#[allow(clippy::missing_panics_doc)]
#[allow(clippy::cast_lossless)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::large_stack_frames)]
#[allow(clippy::unreadable_literal)]
pub mod bus;

pub mod config;
pub mod cpu;
pub mod error;

#[allow(clippy::missing_errors_doc)]
pub mod gba;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_possible_wrap)]
pub mod scheduler;

/// System clock of the console, 2^24 Hz.
pub const CPU_CLOCK_HZ: u32 = 16_777_216;
