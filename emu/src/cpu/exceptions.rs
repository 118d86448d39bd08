//! # Exception entry
//!
//! ```text
//! ┌──────────────────┬────────┬────────────┬───────────────────────┐
//! │ Exception        │ Vector │ Mode       │ LR                    │
//! ├──────────────────┼────────┼────────────┼───────────────────────┤
//! │ Reset            │ 0x00   │ Supervisor │ -                     │
//! │ Undefined        │ 0x04   │ Undefined  │ next instruction      │
//! │ SWI              │ 0x08   │ Supervisor │ next instruction      │
//! │ Prefetch abort   │ 0x0C   │ Abort      │ -                     │
//! │ Data abort       │ 0x10   │ Abort      │ -                     │
//! │ IRQ              │ 0x18   │ IRQ        │ next instruction + 4  │
//! │ FIQ              │ 0x1C   │ FIQ        │ next instruction + 4  │
//! └──────────────────┴────────┴────────────┴───────────────────────┘
//! ```
//!
//! Handlers return themselves (`MOVS PC, LR` or `SUBS PC, LR, #4`).

use serde::{Deserialize, Serialize};

use crate::bus::Bus;
use crate::cpu::arm7tdmi::{Arm7tdmi, HaltState};
use crate::cpu::cpu_modes::Mode;
use crate::cpu::psr::CpuState;
use crate::cpu::registers::REG_LR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exception {
    Reset,
    Undefined,
    SoftwareInterrupt,
    PrefetchAbort,
    DataAbort,
    Irq,
    Fiq,
}

impl Exception {
    #[must_use]
    pub const fn vector(self) -> u32 {
        match self {
            Self::Reset => 0x00,
            Self::Undefined => 0x04,
            Self::SoftwareInterrupt => 0x08,
            Self::PrefetchAbort => 0x0C,
            Self::DataAbort => 0x10,
            Self::Irq => 0x18,
            Self::Fiq => 0x1C,
        }
    }

    #[must_use]
    pub const fn mode(self) -> Mode {
        match self {
            Self::Reset | Self::SoftwareInterrupt => Mode::Supervisor,
            Self::Undefined => Mode::Undefined,
            Self::PrefetchAbort | Self::DataAbort => Mode::Abort,
            Self::Irq => Mode::Irq,
            Self::Fiq => Mode::Fiq,
        }
    }
}

impl Arm7tdmi {
    /// Enters `exception`, storing `return_address` in the new mode's LR.
    pub fn enter_exception(&mut self, exception: Exception, return_address: u32) {
        tracing::debug!(
            "{exception:?} from {} at 0x{:08X}, LR=0x{return_address:08X}",
            self.cpsr.mode,
            self.current_address
        );

        let old_cpsr = self.cpsr;
        let mode = exception.mode();
        self.enter_mode(mode);
        self.register_bank.spsr[mode.bank().index()] = old_cpsr;
        self.registers.set_register_at(REG_LR, return_address);

        self.cpsr.state = CpuState::Arm;
        self.cpsr.irq_disable = true;
        if matches!(exception, Exception::Fiq | Exception::Reset) {
            self.cpsr.fiq_disable = true;
        }

        self.write_register(15, exception.vector());
        self.halt = HaltState::Running;
    }

    /// Dispatches a pending IRQ between two instructions, charging the
    /// pipeline refill at the vector like any other branch.
    pub fn service_irq(&mut self, bus: &mut Bus) {
        let next = self.program_counter();
        self.enter_exception(Exception::Irq, next.wrapping_add(4));
        bus.refill_pipeline(self.program_counter(), 4);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::cpu_modes::Bank;
    use crate::cpu::psr::Psr;
    use pretty_assertions::assert_eq;

    fn thumb_cpu_in_system_mode() -> Arm7tdmi {
        let mut cpu = Arm7tdmi::default();
        cpu.set_cpsr(Psr::from(Mode::System));
        cpu.cpsr.state = CpuState::Thumb;
        cpu.cpsr.carry = true;
        cpu.registers.set_register_at(REG_LR, 0x0800_1111);
        cpu.registers.set_program_counter(0x0800_0102);
        cpu.halt = HaltState::Halted;
        cpu
    }

    #[test]
    fn irq_entry() {
        let mut cpu = thumb_cpu_in_system_mode();
        let mut bus = Bus::new(vec![0; 0x100], None);
        let before = cpu.cpsr;

        cpu.service_irq(&mut bus);

        assert_eq!(cpu.cpsr.mode, Mode::Irq);
        assert_eq!(cpu.register_bank.spsr[Bank::Irq.index()], before);
        assert_eq!(cpu.link_register(), 0x0800_0106);
        assert_eq!(cpu.halt, HaltState::Running);
        assert_eq!(cpu.cpsr.state, CpuState::Arm);
        assert!(cpu.cpsr.irq_disable);
        assert!(!cpu.cpsr.fiq_disable);
        assert_eq!(cpu.program_counter(), 0x18);
        // Two BIOS fetches refill the pipeline at the vector.
        assert_eq!(bus.take_cycles(), 2);
        // The interrupted mode's LR is banked, not overwritten.
        assert_eq!(cpu.register_bank.link_register(Bank::UserSystem), 0x0800_1111);
    }

    #[test]
    fn swi_from_thumb_returns_past_the_swi() {
        let mut cpu = thumb_cpu_in_system_mode();
        cpu.current_address = 0x0800_0100;
        cpu.enter_exception(Exception::SoftwareInterrupt, 0x0800_0102);
        assert_eq!(cpu.cpsr.mode, Mode::Supervisor);
        assert_eq!(cpu.link_register(), 0x0800_0102);
        assert_eq!(cpu.spsr().state, CpuState::Thumb);
        assert_eq!(cpu.program_counter(), 0x08);
    }

    #[test]
    fn fiq_masks_both_interrupt_kinds() {
        let mut cpu = thumb_cpu_in_system_mode();
        cpu.enter_exception(Exception::Fiq, 0);
        assert!(cpu.cpsr.irq_disable && cpu.cpsr.fiq_disable);
        assert_eq!(cpu.cpsr.mode, Mode::Fiq);
    }
}
