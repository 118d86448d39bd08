//! # Program Status Registers (CPSR and SPSR)
//!
//! The PSR contains condition flags (N, Z, C, V) and control bits (mode, state, interrupts).
//!
//! ```text
//! 31 30 29 28 27 26      8 7 6 5 4   0
//! ┌──┬──┬──┬──┬──┬────────┬─┬─┬─┬─────┐
//! │N │Z │C │V │Q │Reserved│I│F│T│Mode │
//! └──┴──┴──┴──┴──┴────────┴─┴─┴─┴─────┘
//! ```
//!
//! - **Flags (28-31)**: See [`condition`](super::condition) for how these are tested
//! - **Mode (0-4)**: See [`cpu_modes`](super::cpu_modes) for operating modes
//! - **T bit (5)**: ARM (0) or Thumb (1) state
//! - **I/F bits (6-7)**: IRQ/FIQ disable
//!
//! Inside the core the PSR is a record of named fields. The raw bit layout
//! above only exists at the boundary, in the `From<u32>`/`From<Psr>`
//! conversions used by MRS/MSR, exception entry and the debugger.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::alu::ArithmeticOpResult;
use crate::cpu::{condition::Condition, cpu_modes::Mode};

/// Program Status Register (CPSR or SPSR).
///
/// # Example
///
/// ```
/// use emu::cpu::psr::Psr;
///
/// let mut cpsr = Psr::default();
/// cpsr.zero = true;
/// cpsr.carry = true;
/// assert_eq!(u32::from(cpsr) & 0x6000_0000, 0x6000_0000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Psr {
    /// N, bit 31
    pub sign: bool,
    /// Z, bit 30
    pub zero: bool,
    /// C, bit 29
    pub carry: bool,
    /// V, bit 28
    pub overflow: bool,
    /// I, bit 7 (1=Disable)
    pub irq_disable: bool,
    /// F, bit 6 (1=Disable)
    pub fiq_disable: bool,
    /// T, bit 5
    pub state: CpuState,
    /// M4-M0
    pub mode: Mode,
    /// Bits 27-8. Unused on ARMv4T but they read back what was written.
    reserved: u32,
}

impl Default for Psr {
    fn default() -> Self {
        Self::from(Mode::Supervisor)
    }
}

impl Psr {
    const RESERVED_MASK: u32 = 0x0FFF_FF00;

    #[must_use]
    pub const fn can_execute(self, cond: Condition) -> bool {
        cond.holds(self.sign, self.zero, self.carry, self.overflow)
    }

    pub const fn set_flags(&mut self, op_result: &ArithmeticOpResult) {
        self.carry = op_result.carry;
        self.zero = op_result.zero;
        self.sign = op_result.sign;
        self.overflow = op_result.overflow;
    }

    /// Sets N and Z from a result, leaving C and V alone.
    pub const fn set_nz(&mut self, result: u32) {
        self.zero = result == 0;
        self.sign = result >> 31 == 1;
    }

    /// Overwrites only the flag byte (bits 31-24), as `MSR PSR_f` does.
    pub fn write_flags(&mut self, raw: u32) {
        self.sign = raw.get_bit(31);
        self.zero = raw.get_bit(30);
        self.carry = raw.get_bit(29);
        self.overflow = raw.get_bit(28);
        self.reserved = (self.reserved & 0x00FF_FF00) | (raw & 0x0F00_0000);
    }

    /// Overwrites the control byte (bits 7-0). The caller is responsible for
    /// the register bank swap when the mode changes.
    pub fn write_control(&mut self, raw: u32) {
        self.irq_disable = raw.get_bit(7);
        self.fiq_disable = raw.get_bit(6);
        self.state = raw.get_bit(5).into();
        self.mode = mode_from_bits(raw);
    }

    #[must_use]
    pub const fn cpu_state(self) -> CpuState {
        self.state
    }
}

/// The BIOS sometimes writes invalid mode values (like 0) to SPSR.
/// Those decode as Supervisor.
fn mode_from_bits(raw: u32) -> Mode {
    let mode_bits = raw.get_bits(0..=4);
    Mode::try_from(mode_bits).unwrap_or_else(|_| {
        tracing::debug!(
            "Invalid mode bits 0b{mode_bits:05b} in PSR=0x{raw:08X}, defaulting to Supervisor"
        );
        Mode::Supervisor
    })
}

impl From<Mode> for Psr {
    fn from(mode: Mode) -> Self {
        Self {
            sign: false,
            zero: false,
            carry: false,
            overflow: false,
            irq_disable: false,
            fiq_disable: false,
            state: CpuState::Arm,
            mode,
            reserved: 0,
        }
    }
}

impl From<u32> for Psr {
    fn from(raw: u32) -> Self {
        let mut psr = Self::from(Mode::Supervisor);
        psr.write_flags(raw);
        psr.write_control(raw);
        psr.reserved = raw & Self::RESERVED_MASK;
        psr
    }
}

impl From<Psr> for u32 {
    fn from(p: Psr) -> Self {
        let mut raw = p.reserved & Psr::RESERVED_MASK;
        raw.set_bit(31, p.sign);
        raw.set_bit(30, p.zero);
        raw.set_bit(29, p.carry);
        raw.set_bit(28, p.overflow);
        raw.set_bit(7, p.irq_disable);
        raw.set_bit(6, p.fiq_disable);
        raw.set_bit(5, p.state.into());
        raw | Self::from(p.mode)
    }
}

impl std::fmt::Display for Psr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flag = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}{} {}{}{} {}",
            flag(self.sign, 'N'),
            flag(self.zero, 'Z'),
            flag(self.carry, 'C'),
            flag(self.overflow, 'V'),
            flag(self.irq_disable, 'I'),
            flag(self.fiq_disable, 'F'),
            flag(self.state == CpuState::Thumb, 'T'),
            self.mode,
        )
    }
}

/// The CPU execution state (ARM or Thumb).
///
/// Controlled by the T bit (bit 5) in CPSR. Switch via `BX Rn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CpuState {
    /// Thumb: 16-bit instructions. See `thumb` module.
    Thumb,
    /// ARM: 32-bit instructions. See `arm` module.
    #[default]
    Arm,
}

impl CpuState {
    /// Width in bytes of one instruction in this state.
    #[must_use]
    pub const fn instruction_size(self) -> u32 {
        match self {
            Self::Arm => 4,
            Self::Thumb => 2,
        }
    }
}

impl From<CpuState> for bool {
    fn from(state: CpuState) -> Self {
        match state {
            CpuState::Arm => false,
            CpuState::Thumb => true,
        }
    }
}

impl From<bool> for CpuState {
    fn from(state: bool) -> Self {
        if state { Self::Thumb } else { Self::Arm }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn flags_land_on_their_bits() {
        let mut cpsr = Psr::from(0);
        cpsr.sign = true;
        assert_eq!(u32::from(cpsr) & 0xF000_0000, 0x8000_0000);
        cpsr.sign = false;
        cpsr.overflow = true;
        assert_eq!(u32::from(cpsr) & 0xF000_0000, 0x1000_0000);
    }

    #[test]
    fn raw_round_trip_keeps_every_defined_bit() {
        for raw in [
            0x0000_001F_u32,
            0xF000_00D3,
            0x6000_0030,
            0x1234_5692,
            0x8FFF_FF11,
        ] {
            assert_eq!(u32::from(Psr::from(raw)), raw, "0x{raw:08X}");
        }
    }

    #[test]
    fn invalid_mode_bits_decode_as_supervisor() {
        let psr = Psr::from(0x0000_0000_u32);
        assert_eq!(psr.mode, Mode::Supervisor);
    }

    #[test]
    fn modes() {
        for mode in Mode::ALL {
            let psr = Psr::from(mode);
            assert_eq!(u32::from(psr) & 0b11111, u32::from(mode));
            assert_eq!(Psr::from(u32::from(mode)).mode, mode);
        }
    }

    #[test]
    fn write_flags_leaves_control_alone() {
        let mut psr = Psr::from(0x0000_00D2_u32);
        psr.write_flags(0xA000_00FF);
        assert_eq!(u32::from(psr), 0xA000_00D2);
    }

    #[test]
    fn state_bit() {
        let mut cpsr = Psr::from(Mode::User);
        cpsr.state = CpuState::Thumb;
        assert_eq!(u32::from(cpsr), 0b11_0000);
        assert_eq!(cpsr.cpu_state().instruction_size(), 2);
    }

    #[test]
    fn condition_uses_named_flags() {
        let mut cpsr = Psr::from(Mode::User);
        cpsr.zero = true;
        assert!(cpsr.can_execute(Condition::EQ));
        assert!(!cpsr.can_execute(Condition::NE));
        assert!(cpsr.can_execute(Condition::LE));
    }
}
