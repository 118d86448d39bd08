//! # Emulation session
//!
//! [`Gba`] owns everything one running cartridge needs: the CPU, the bus
//! with its memories and peripherals, and the scheduler state that carries
//! clocks between calls. Hosts create one per ROM and drive it with
//! [`Gba::run`] or [`Gba::run_frame`].

use crate::bus::{BIOS_SIZE, Bus, ROM_MAX_SIZE};
use crate::config::EmuConfig;
use crate::cpu::arm7tdmi::{Arm7tdmi, HaltState};
use crate::cpu::hardware::keypad::GbaButton;
use crate::cpu::hardware::lcd::CLOCKS_PER_FRAME;
use crate::cpu::psr::Psr;
use crate::error::EmuError;
use crate::scheduler::Scheduler;

pub struct Gba {
    cpu: Arm7tdmi,
    bus: Bus,
    scheduler: Scheduler,
    config: EmuConfig,
}

impl Gba {
    /// Builds a session from already loaded images.
    ///
    /// Without a BIOS image the built-in vectors are mapped and execution
    /// always starts at the cartridge with the post-boot register state.
    pub fn new(config: EmuConfig, rom: Vec<u8>, bios: Option<Vec<u8>>) -> Result<Self, EmuError> {
        if rom.is_empty() {
            return Err(EmuError::EmptyRom);
        }
        if rom.len() > ROM_MAX_SIZE {
            return Err(EmuError::RomTooLarge {
                max: ROM_MAX_SIZE,
                actual: rom.len(),
            });
        }
        match &bios {
            Some(image) if image.len() != BIOS_SIZE => {
                return Err(EmuError::BiosSize {
                    expected: BIOS_SIZE,
                    actual: image.len(),
                });
            }
            _ => {}
        }

        let skip_intro = config.skip_bios_intro || bios.is_none();
        tracing::info!(
            "ROM {} bytes, {} BIOS, HLE {}, trig {:?}",
            rom.len(),
            if bios.is_some() { "external" } else { "built-in" },
            if config.hle_bios { "on" } else { "off" },
            config.trig_accuracy,
        );

        let mut bus = Bus::new(rom, bios);
        let mut cpu = Arm7tdmi::new(config.trig_accuracy, config.hle_bios);
        if skip_intro {
            cpu.skip_bios();
            bus.interrupt_control.post_boot_flag = 1;
        }

        Ok(Self {
            cpu,
            bus,
            scheduler: Scheduler::new(config.cpu_step_clocks),
            config,
        })
    }

    /// Runs for `clocks` plus whatever the previous call left over. A
    /// pending break is cleared first, so calling again resumes. Returns
    /// the clocks executed.
    pub fn run(&mut self, clocks: u32) -> u64 {
        self.cpu.take_break();
        self.scheduler.run(&mut self.cpu, &mut self.bus, clocks)
    }

    pub fn run_frame(&mut self) -> u64 {
        self.run(CLOCKS_PER_FRAME)
    }

    /// Executes one instruction (or one IRQ entry, or one slice of a DMA
    /// stall), ignoring a breakpoint at the current address.
    pub fn step_instruction(&mut self) -> u32 {
        self.cpu.take_break();
        self.scheduler.step(&mut self.cpu, &mut self.bus)
    }

    pub fn add_breakpoint(&mut self, address: u32) {
        tracing::debug!("breakpoint set at 0x{address:08X}");
        self.scheduler.add_breakpoint(address);
    }

    pub fn remove_breakpoint(&mut self, address: u32) -> bool {
        self.scheduler.remove_breakpoint(address)
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = u32> + '_ {
        self.scheduler.breakpoints()
    }

    /// Raises the break flag; the scheduler stops at the top of its loop.
    /// [`run`](Self::run) and [`step_instruction`](Self::step_instruction)
    /// clear the flag on entry, so a request made between calls is only
    /// visible through [`is_break_requested`](Self::is_break_requested).
    pub const fn request_break(&mut self) {
        self.cpu.request_break();
    }

    #[must_use]
    pub const fn is_break_requested(&self) -> bool {
        self.cpu.is_break_requested()
    }

    pub const fn set_button(&mut self, button: GbaButton, pressed: bool) {
        self.bus.keypad.set_button(button, pressed);
    }

    #[must_use]
    pub const fn cpu(&self) -> &Arm7tdmi {
        &self.cpu
    }

    #[must_use]
    pub const fn bus(&self) -> &Bus {
        &self.bus
    }

    #[must_use]
    pub const fn config(&self) -> &EmuConfig {
        &self.config
    }

    /// Live registers; R15 is the next fetch address.
    #[must_use]
    pub const fn registers(&self) -> [u32; 16] {
        self.cpu.registers.to_array()
    }

    #[must_use]
    pub const fn cpsr(&self) -> Psr {
        self.cpu.cpsr
    }

    #[must_use]
    pub const fn halt_state(&self) -> HaltState {
        self.cpu.halt
    }

    /// Clocks owed to (positive) or borrowed from (negative) the next run.
    #[must_use]
    pub const fn residual_clocks(&self) -> i64 {
        self.scheduler.residual()
    }

    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.bus.lcd.frame
    }

    /// Disassembly of the instruction about to execute.
    #[must_use]
    pub fn next_instruction(&self) -> String {
        self.cpu.disassemble(&self.bus, self.cpu.program_counter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::arm7tdmi::{ROM_ENTRY, SP_USER};
    use crate::cpu::cpu_modes::Mode;
    use pretty_assertions::assert_eq;

    const BRANCH_TO_SELF: [u8; 4] = 0xEAFF_FFFE_u32.to_le_bytes();

    #[test]
    fn image_sizes_are_validated() {
        let config = EmuConfig::default();
        assert_eq!(
            Gba::new(config, Vec::new(), None).err(),
            Some(EmuError::EmptyRom)
        );
        assert_eq!(
            Gba::new(config, vec![0; ROM_MAX_SIZE + 1], None).err(),
            Some(EmuError::RomTooLarge {
                max: ROM_MAX_SIZE,
                actual: ROM_MAX_SIZE + 1
            })
        );
        assert_eq!(
            Gba::new(config, BRANCH_TO_SELF.to_vec(), Some(vec![0; 16])).err(),
            Some(EmuError::BiosSize {
                expected: BIOS_SIZE,
                actual: 16
            })
        );
    }

    #[test]
    fn starts_at_the_cartridge_without_a_bios() {
        let config = EmuConfig {
            skip_bios_intro: false,
            ..EmuConfig::default()
        };
        let gba = Gba::new(config, BRANCH_TO_SELF.to_vec(), None).unwrap();
        assert_eq!(gba.registers()[15], ROM_ENTRY);
        assert_eq!(gba.registers()[13], SP_USER);
        assert_eq!(gba.cpsr().mode, Mode::System);
        assert_eq!(gba.bus().interrupt_control.post_boot_flag, 1);
    }

    #[test]
    fn real_bios_starts_at_the_reset_vector() {
        let config = EmuConfig {
            skip_bios_intro: false,
            ..EmuConfig::default()
        };
        let gba = Gba::new(config, BRANCH_TO_SELF.to_vec(), Some(vec![0; BIOS_SIZE])).unwrap();
        assert_eq!(gba.registers()[15], 0);
        assert_eq!(gba.cpsr().mode, Mode::Supervisor);
        assert!(gba.cpsr().irq_disable);
    }

    #[test]
    fn frames_advance_the_video_counter() {
        let mut gba = Gba::new(EmuConfig::default(), BRANCH_TO_SELF.to_vec(), None).unwrap();
        for _ in 0..3 {
            gba.run_frame();
        }
        assert_eq!(gba.frame(), 3);
        assert_eq!(gba.next_instruction(), "B #-8");
    }

    #[test]
    fn run_resumes_after_a_requested_break() {
        let mut gba = Gba::new(EmuConfig::default(), BRANCH_TO_SELF.to_vec(), None).unwrap();
        gba.request_break();
        assert!(gba.is_break_requested());
        assert!(gba.run(1_000) > 0);
        assert!(!gba.is_break_requested());

        gba.request_break();
        assert!(gba.step_instruction() > 0);
        assert!(!gba.is_break_requested());
    }
}
