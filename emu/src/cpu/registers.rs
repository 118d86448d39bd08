//! # ARM7TDMI Register File
//!
//! The 16 general-purpose registers visible at any time.
//!
//! - **R0-R12**: General purpose
//! - **R13 (SP)**: Stack pointer (by convention)
//! - **R14 (LR)**: Link register (return address)
//! - **R15 (PC)**: Program counter (+8 ARM, +4 Thumb due to pipeline)
//!
//! For register banking by mode, see [`cpu_modes`](super::cpu_modes) and
//! [`register_bank`](super::register_bank).

use serde::{Deserialize, Serialize};

/// Stack Pointer register index.
pub const REG_SP: usize = 0xD;

/// Link Register index (return address for subroutines).
pub const REG_LR: usize = 0xE;

/// The 16 general-purpose registers visible to the CPU.
///
/// R15 holds the address of the next instruction to fetch. Software sees
/// it through [`Arm7tdmi::read_register`](super::arm7tdmi::Arm7tdmi::read_register),
/// which adds the pipeline offset.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers([u32; 16]);

impl Registers {
    #[must_use]
    pub const fn program_counter(&self) -> u32 {
        self.0[15]
    }

    pub const fn set_program_counter(&mut self, new_value: u32) {
        self.0[15] = new_value;
    }

    pub fn set_register_at(&mut self, reg: usize, new_value: u32) {
        debug_assert!(reg <= 15, "Invalid register index: {reg} (0x{reg:X})");
        self.0[reg & 0xF] = new_value;
    }

    #[must_use]
    pub const fn register_at(&self, reg: usize) -> u32 {
        self.0[reg & 0xF]
    }

    #[must_use]
    pub const fn to_array(&self) -> [u32; 16] {
        self.0
    }
}

impl From<[u32; 16]> for Registers {
    fn from(values: [u32; 16]) -> Self {
        Self(values)
    }
}
