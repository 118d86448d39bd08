#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
pub mod alu;

mod arm;

#[allow(clippy::cast_lossless)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::large_stack_frames)]
#[allow(clippy::module_name_repetitions)]
pub mod arm7tdmi;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::unreadable_literal)]
pub mod bios;

pub mod condition;
pub mod cpu_modes;
pub mod exceptions;

#[allow(clippy::cast_possible_truncation)]
mod flags;

#[allow(clippy::cast_possible_truncation)]
pub mod hardware;
pub mod psr;
pub mod register_bank;
pub mod registers;
mod thumb;
