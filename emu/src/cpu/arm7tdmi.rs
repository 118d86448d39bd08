//! # ARM7TDMI core
//!
//! Register file, status words and the fetch/decode/execute step. The
//! instruction semantics live in [`arm`](super::arm) and
//! [`thumb`](super::thumb); exception entry in
//! [`exceptions`](super::exceptions).
//!
//! ## Program counter
//!
//! ```text
//!            fetch        decode       execute
//! ARM     addr + 8     addr + 4       addr        R15 reads as addr + 8
//! THUMB   addr + 4     addr + 2       addr        R15 reads as addr + 4
//! ```
//!
//! The pipeline is not simulated. `registers` holds the address of the next
//! instruction between steps; reads of R15 during execution return the
//! lookahead value and writes of R15 are branches.

use serde::{Deserialize, Serialize};

use crate::bus::Bus;
use crate::config::TrigAccuracy;
use crate::cpu::arm::instructions::ArmModeInstruction;
use crate::cpu::cpu_modes::Mode;
use crate::cpu::psr::{CpuState, Psr};
use crate::cpu::register_bank::{RegisterBank, swap_bank};
use crate::cpu::registers::{REG_LR, REG_SP, Registers};
use crate::cpu::thumb::instruction::Instruction;

pub const SIZE_OF_ARM_INSTRUCTION: u32 = 4;
pub const SIZE_OF_THUMB_INSTRUCTION: u32 = 2;

/// Post-boot stack pointers left by the BIOS intro.
pub const SP_SUPERVISOR: u32 = 0x0300_7FE0;
pub const SP_IRQ: u32 = 0x0300_7FA0;
pub const SP_USER: u32 = 0x0300_7F00;

/// Cartridge entry point.
pub const ROM_ENTRY: u32 = 0x0800_0000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltState {
    #[default]
    Running,
    /// Resumes on any enabled interrupt request.
    Halted,
    /// Resumes only on keypad, game pak or serial interrupts.
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arm7tdmi {
    pub cpsr: Psr,
    pub registers: Registers,
    pub register_bank: RegisterBank,
    pub halt: HaltState,

    /// Address of the instruction being executed (or last executed).
    pub current_address: u32,

    pub trig_accuracy: TrigAccuracy,
    pub hle_bios: bool,

    /// Set by writes to R15 during the current instruction.
    branched: bool,
    execution_break: bool,
    /// An `IntrWait` SWI was rewound and will run again after the next IRQ.
    pub(crate) intr_wait_retry: bool,
}

impl Default for Arm7tdmi {
    fn default() -> Self {
        Self {
            cpsr: Psr::from(Mode::Supervisor),
            registers: Registers::default(),
            register_bank: RegisterBank::default(),
            halt: HaltState::Running,
            current_address: 0,
            trig_accuracy: TrigAccuracy::default(),
            hle_bios: true,
            branched: false,
            execution_break: false,
            intr_wait_retry: false,
        }
    }
}

impl Arm7tdmi {
    #[must_use]
    pub fn new(trig_accuracy: TrigAccuracy, hle_bios: bool) -> Self {
        let mut cpu = Self {
            trig_accuracy,
            hle_bios,
            ..Default::default()
        };
        cpu.cpsr.irq_disable = true;
        cpu.cpsr.fiq_disable = true;
        cpu
    }

    /// Register state the BIOS intro leaves behind when it jumps to the
    /// cartridge.
    pub fn skip_bios(&mut self) {
        self.enter_mode(Mode::Supervisor);
        self.registers.set_register_at(REG_SP, SP_SUPERVISOR);
        self.enter_mode(Mode::Irq);
        self.registers.set_register_at(REG_SP, SP_IRQ);
        self.enter_mode(Mode::System);
        self.registers.set_register_at(REG_SP, SP_USER);

        self.cpsr = Psr::from(Mode::System);
        self.registers.set_program_counter(ROM_ENTRY);
        self.halt = HaltState::Running;
    }

    #[must_use]
    pub const fn instruction_size(&self) -> u32 {
        self.cpsr.state.instruction_size()
    }

    /// Address of the next instruction to fetch.
    #[must_use]
    pub const fn program_counter(&self) -> u32 {
        self.registers.program_counter()
    }

    /// Reads a live register. R15 reads as the current instruction address
    /// plus two instruction widths.
    #[must_use]
    pub const fn read_register(&self, reg: usize) -> u32 {
        if reg == 15 {
            self.current_address
                .wrapping_add(2 * self.cpsr.state.instruction_size())
        } else {
            self.registers.register_at(reg)
        }
    }

    /// Writes a live register. A write to R15 is a branch: the target is
    /// aligned for the current state and the sequential advance is skipped.
    pub fn write_register(&mut self, reg: usize, value: u32) {
        if reg == 15 {
            let aligned = match self.cpsr.state {
                CpuState::Arm => value & !3,
                CpuState::Thumb => value & !1,
            };
            self.registers.set_program_counter(aligned);
            self.branched = true;
        } else {
            self.registers.set_register_at(reg, value);
        }
    }

    /// Switches processor mode, swapping banked registers. No-op when the
    /// mode does not change.
    pub fn enter_mode(&mut self, new_mode: Mode) {
        let old_mode = self.cpsr.mode;
        if old_mode == new_mode {
            return;
        }
        (self.registers, self.register_bank) =
            swap_bank(self.registers, self.register_bank, old_mode, new_mode);
        self.cpsr.mode = new_mode;
    }

    /// SPSR of the current mode. User and System have none and read the
    /// CPSR instead.
    #[must_use]
    pub fn spsr(&self) -> Psr {
        if self.cpsr.mode.has_spsr() {
            self.register_bank.spsr[self.cpsr.mode.bank().index()]
        } else {
            tracing::debug!("SPSR read in {} mode", self.cpsr.mode);
            self.cpsr
        }
    }

    pub fn set_spsr(&mut self, psr: Psr) {
        if self.cpsr.mode.has_spsr() {
            self.register_bank.spsr[self.cpsr.mode.bank().index()] = psr;
        } else {
            tracing::debug!("SPSR write ignored in {} mode", self.cpsr.mode);
        }
    }

    /// Replaces the whole CPSR, banking registers if the mode changes.
    pub fn set_cpsr(&mut self, psr: Psr) {
        self.enter_mode(psr.mode);
        self.cpsr = psr;
    }

    /// Restores CPSR from SPSR, as exception returns do.
    pub fn restore_cpsr(&mut self) {
        if self.cpsr.mode.has_spsr() {
            self.set_cpsr(self.spsr());
        } else {
            tracing::warn!(
                "exception return without SPSR in {} mode at 0x{:08X}",
                self.cpsr.mode,
                self.current_address
            );
        }
    }

    #[must_use]
    pub const fn link_register(&self) -> u32 {
        self.registers.register_at(REG_LR)
    }

    pub const fn request_break(&mut self) {
        self.execution_break = true;
    }

    #[must_use]
    pub const fn is_break_requested(&self) -> bool {
        self.execution_break
    }

    pub const fn take_break(&mut self) -> bool {
        std::mem::replace(&mut self.execution_break, false)
    }

    pub(crate) const fn has_branched(&self) -> bool {
        self.branched
    }

    /// Decodes the instruction at `address` in the current state without
    /// touching timing or open bus.
    #[must_use]
    pub fn disassemble(&self, bus: &Bus, address: u32) -> String {
        match self.cpsr.state {
            CpuState::Arm => ArmModeInstruction::from(bus.peek_word(address)).to_string(),
            CpuState::Thumb => Instruction::from(bus.peek_half_word(address)).to_string(),
        }
    }

    /// Fetches, decodes and executes one instruction. Returns the clocks it
    /// took: fetch, data accesses and internal cycles.
    pub fn step(&mut self, bus: &mut Bus) -> u32 {
        self.current_address = self.registers.program_counter();
        self.branched = false;
        let width = self.instruction_size();

        match self.cpsr.state {
            CpuState::Arm => {
                let op_code = bus.fetch_word(self.current_address);
                let instruction = ArmModeInstruction::from(op_code);
                tracing::trace!("0x{:08X}: {instruction}", self.current_address);

                if self.cpsr.can_execute(instruction.condition()) {
                    self.execute_arm(bus, instruction);
                }
            }
            CpuState::Thumb => {
                let op_code = bus.fetch_half_word(self.current_address);
                let instruction = Instruction::from(op_code);
                tracing::trace!("0x{:08X}: {instruction}", self.current_address);

                self.execute_thumb(bus, instruction);
            }
        }

        if self.branched {
            bus.refill_pipeline(self.registers.program_counter(), self.instruction_size());
        } else {
            self.registers
                .set_program_counter(self.current_address.wrapping_add(width));
        }

        if let Some(state) = bus.take_halt_request() {
            tracing::debug!("CPU entering {state:?} at 0x{:08X}", self.current_address);
            self.halt = state;
        }

        bus.take_cycles()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::cpu_modes::Bank;
    use pretty_assertions::assert_eq;

    #[test]
    fn r15_reads_ahead_of_the_current_instruction() {
        let mut cpu = Arm7tdmi::default();
        cpu.current_address = 0x0800_0100;
        assert_eq!(cpu.read_register(15), 0x0800_0108);
        cpu.cpsr.state = CpuState::Thumb;
        assert_eq!(cpu.read_register(15), 0x0800_0104);
    }

    #[test]
    fn r15_writes_are_aligned_branches() {
        let mut cpu = Arm7tdmi::default();
        cpu.write_register(15, 0x0800_0203);
        assert_eq!(cpu.program_counter(), 0x0800_0200);
        assert!(cpu.has_branched());

        cpu.cpsr.state = CpuState::Thumb;
        cpu.write_register(15, 0x0800_0203);
        assert_eq!(cpu.program_counter(), 0x0800_0202);
    }

    #[test]
    fn entering_the_same_mode_changes_nothing() {
        let mut cpu = Arm7tdmi::default();
        cpu.registers.set_register_at(REG_SP, 0x1234);
        let before = cpu.clone();
        cpu.enter_mode(Mode::Supervisor);
        assert_eq!(cpu.registers, before.registers);
        assert_eq!(cpu.register_bank, before.register_bank);
    }

    #[test]
    fn post_boot_state() {
        let mut cpu = Arm7tdmi::new(TrigAccuracy::Polynomial, true);
        cpu.skip_bios();
        assert_eq!(cpu.cpsr.mode, Mode::System);
        assert_eq!(cpu.registers.register_at(REG_SP), SP_USER);
        assert_eq!(cpu.register_bank.stack_pointer(Bank::Irq), SP_IRQ);
        assert_eq!(cpu.register_bank.stack_pointer(Bank::Supervisor), SP_SUPERVISOR);
        assert_eq!(cpu.program_counter(), ROM_ENTRY);
        assert!(!cpu.cpsr.irq_disable);
    }

    #[test]
    fn set_cpsr_swaps_banks() {
        let mut cpu = Arm7tdmi::default();
        cpu.registers.set_register_at(REG_SP, 0xAAAA);
        cpu.set_cpsr(Psr::from(Mode::Irq));
        cpu.registers.set_register_at(REG_SP, 0xBBBB);
        cpu.set_cpsr(Psr::from(Mode::Supervisor));
        assert_eq!(cpu.registers.register_at(REG_SP), 0xAAAA);
        assert_eq!(cpu.register_bank.stack_pointer(Bank::Irq), 0xBBBB);
    }

    #[test]
    fn spsr_of_user_mode_is_cpsr() {
        let mut cpu = Arm7tdmi::default();
        cpu.set_cpsr(Psr::from(Mode::User));
        cpu.set_spsr(Psr::from(Mode::Fiq));
        assert_eq!(cpu.spsr(), cpu.cpsr);
    }
}
