//! # BIOS services
//!
//! `SWI n` calls into the firmware. With `hle_bios` set the call is served
//! here directly and returns to the next instruction; otherwise the CPU
//! takes the SWI exception and the BIOS image runs its own handler.
//!
//! ARM encodes the service number in bits 23-16 of the comment field,
//! THUMB in bits 7-0. Both decoders hand over the same 8-bit index.
//!
//! ```text
//! ┌──────┬──────────────────────────┬──────┬──────────────────────────┐
//! │ 0x00 │ SoftReset                │ 0x0F │ ObjAffineSet             │
//! │ 0x01 │ RegisterRamReset         │ 0x10 │ BitUnPack                │
//! │ 0x02 │ Halt                     │ 0x11 │ LZ77UnCompWram           │
//! │ 0x03 │ Stop                     │ 0x12 │ LZ77UnCompVram           │
//! │ 0x04 │ IntrWait                 │ 0x13 │ HuffUnComp               │
//! │ 0x05 │ VBlankIntrWait           │ 0x14 │ RLUnCompWram             │
//! │ 0x06 │ Div                      │ 0x15 │ RLUnCompVram             │
//! │ 0x07 │ DivArm                   │ 0x16 │ Diff8bitUnFilterWram     │
//! │ 0x08 │ Sqrt                     │ 0x17 │ Diff8bitUnFilterVram     │
//! │ 0x09 │ ArcTan                   │ 0x18 │ Diff16bitUnFilter        │
//! │ 0x0A │ ArcTan2                  │ 0x19 │ SoundBias                │
//! │ 0x0B │ CpuSet                   │ 0x26 │ HardReset                │
//! │ 0x0C │ CpuFastSet               │ 0x27 │ CustomHalt               │
//! │ 0x0D │ GetBiosChecksum          │      │                          │
//! │ 0x0E │ BgAffineSet              │      │                          │
//! └──────┴──────────────────────────┴──────┴──────────────────────────┘
//! ```
//!
//! Failures never unwind out of the SWI: they are logged and raise the
//! execution break so the session stops in an inspectable state.

pub mod affine;
pub mod arithmetic;
pub mod decompress;
pub mod memory_ops;

use thiserror::Error;

use crate::bitwise::Bits;
use crate::bus::{Bus, MemoryRegion};
use crate::config::TrigAccuracy;
use crate::cpu::arm7tdmi::{Arm7tdmi, ROM_ENTRY};
use crate::cpu::exceptions::Exception;
use crate::cpu::registers::REG_LR;

/// Interrupt flags the game's handler sets for `IntrWait` (mirror of
/// `0x03007FF8`).
const BIOS_INTERRUPT_FLAGS: u32 = 0x0300_7FF8;
/// Non-zero when `SoftReset` should restart from EWRAM.
const RESET_TO_RAM_FLAG: u32 = 0x0300_7FFA;
const HALTCNT: u32 = 0x0400_0301;
const EWRAM_ENTRY: u32 = 0x0200_0000;
const BIOS_CHECKSUM: u32 = 0xBAAE_187F;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BiosError {
    #[error("BIOS service 0x{0:02X} is not implemented")]
    UnknownService(u8),

    #[error("{format} header 0x{header:08X} is malformed")]
    BadHeader { format: &'static str, header: u32 },

    #[error("back reference {distance} bytes behind output position {position}")]
    BadReference { position: usize, distance: usize },

    #[error("Huffman tree node {index} lies outside the {size} byte tree")]
    BadTreeNode { index: usize, size: usize },

    #[error("compressed data ran out after {consumed} bytes")]
    SourceExhausted { consumed: usize },

    #[error("cannot allocate {size} bytes of output")]
    Allocation { size: usize },
}

impl Arm7tdmi {
    /// Entry point of `SWI` in both states.
    pub(crate) fn software_interrupt(&mut self, bus: &mut Bus, service: u8) {
        if !self.hle_bios {
            let return_address = self.current_address.wrapping_add(self.instruction_size());
            self.enter_exception(Exception::SoftwareInterrupt, return_address);
            return;
        }

        tracing::trace!(
            "SWI 0x{service:02X} at 0x{:08X} (r0=0x{:08X} r1=0x{:08X} r2=0x{:08X})",
            self.current_address,
            self.read_register(0),
            self.read_register(1),
            self.read_register(2)
        );

        if let Err(error) = self.call_bios(bus, service) {
            tracing::error!(
                "SWI 0x{service:02X} at 0x{:08X} failed: {error}",
                self.current_address
            );
            self.request_break();
        }
    }

    fn call_bios(&mut self, bus: &mut Bus, service: u8) -> Result<(), BiosError> {
        let r0 = self.read_register(0);
        let r1 = self.read_register(1);
        let r2 = self.read_register(2);
        let r3 = self.read_register(3);

        match service {
            0x00 => self.soft_reset(bus),
            0x01 => register_ram_reset(bus, r0),
            0x02 => bus.write_byte(HALTCNT, 0),
            0x03 => bus.write_byte(HALTCNT, 0x80),
            0x04 => self.interrupt_wait(bus, r0 != 0, r1 as u16),
            0x05 => self.interrupt_wait(bus, true, 1),
            0x06 => self.write_division(arithmetic::div(r0 as i32, r1 as i32)),
            0x07 => self.write_division(arithmetic::div(r1 as i32, r0 as i32)),
            0x08 => self.write_register(0, u32::from(arithmetic::sqrt(r0))),
            0x09 => {
                let (angle, a, b) = match self.trig_accuracy {
                    TrigAccuracy::Polynomial => arithmetic::arc_tan(r0 as i32),
                    TrigAccuracy::Exact => (arithmetic::arc_tan_exact(r0 as i32), 0, 0),
                };
                self.write_register(0, i32::from(angle) as u32);
                self.write_register(1, a as u32);
                self.write_register(3, b as u32);
            }
            0x0A => {
                let (angle, square) = match self.trig_accuracy {
                    TrigAccuracy::Polynomial => arithmetic::arc_tan2(r0 as i32, r1 as i32),
                    TrigAccuracy::Exact => (arithmetic::arc_tan2_exact(r0 as i32, r1 as i32), None),
                };
                self.write_register(0, u32::from(angle));
                if let Some(square) = square {
                    self.write_register(1, square as u32);
                }
                self.write_register(3, 0x170);
            }
            0x0B => memory_ops::cpu_set(bus, r0, r1, r2),
            0x0C => memory_ops::cpu_fast_set(bus, r0, r1, r2),
            0x0D => {
                self.write_register(0, BIOS_CHECKSUM);
                self.write_register(1, 1);
                self.write_register(3, 0x4000);
            }
            0x0E => affine::bg_affine_set(bus, r0, r1, r2),
            0x0F => affine::obj_affine_set(bus, r0, r1, r2, r3),
            0x10 => memory_ops::bit_unpack(bus, r0, r1, r2)?,
            0x11 => decompress::lz77(bus, r0, r1, decompress::Unit::Byte)?,
            0x12 => decompress::lz77(bus, r0, r1, decompress::Unit::HalfWord)?,
            0x13 => decompress::huffman(bus, r0, r1)?,
            0x14 => decompress::run_length(bus, r0, r1, decompress::Unit::Byte)?,
            0x15 => decompress::run_length(bus, r0, r1, decompress::Unit::HalfWord)?,
            0x16 => decompress::diff_unfilter(bus, r0, r1, decompress::Unit::Byte)?,
            0x17 | 0x18 => decompress::diff_unfilter(bus, r0, r1, decompress::Unit::HalfWord)?,
            0x19 => bus.sound.set_bias_level(if r0 == 0 { 0 } else { 0x200 }),
            0x26 => {
                register_ram_reset(bus, 0xFF);
                bus.write_byte(RESET_TO_RAM_FLAG, 0);
                self.soft_reset(bus);
            }
            0x27 => bus.write_byte(HALTCNT, r2 as u8),
            _ => return Err(BiosError::UnknownService(service)),
        }
        Ok(())
    }

    fn write_division(&mut self, result: arithmetic::Division) {
        self.write_register(0, result.quotient as u32);
        self.write_register(1, result.remainder as u32);
        self.write_register(3, result.absolute_quotient);
    }

    /// Restarts the cartridge (or the EWRAM program) with fresh stacks.
    fn soft_reset(&mut self, bus: &mut Bus) {
        let entry = if bus.read_byte(RESET_TO_RAM_FLAG) == 0 {
            ROM_ENTRY
        } else {
            EWRAM_ENTRY
        };
        for address in (0x0300_7E00..0x0300_8000).step_by(4) {
            bus.write_word(address, 0);
        }

        self.skip_bios();
        for reg in 0..=12 {
            self.write_register(reg, 0);
        }
        self.write_register(REG_LR, entry);
        self.write_register(15, entry);
        tracing::debug!("soft reset to 0x{entry:08X}");
    }

    /// Waits until one of `flags` shows up in the BIOS interrupt flags.
    ///
    /// The SWI is re-executed after each interrupt: while no wanted flag is
    /// set the PC is rewound and the CPU halted. Retries never discard.
    fn interrupt_wait(&mut self, bus: &mut Bus, discard_old: bool, flags: u16) {
        bus.interrupt_control.interrupt_master_enable = 1;

        let mut bios_flags = bus.read_half_word(BIOS_INTERRUPT_FLAGS);
        if discard_old && !self.intr_wait_retry {
            bios_flags &= !flags;
            bus.write_half_word(BIOS_INTERRUPT_FLAGS, bios_flags);
        }

        if bios_flags & flags == 0 {
            self.intr_wait_retry = true;
            self.write_register(15, self.current_address);
            bus.write_byte(HALTCNT, 0);
        } else {
            self.intr_wait_retry = false;
            bus.write_half_word(BIOS_INTERRUPT_FLAGS, bios_flags & !flags);
        }
    }
}

/// `RegisterRamReset`: bits of `flags` select what to clear.
///
/// ```text
/// 0 EWRAM   1 IWRAM (except the top 0x200)   2 palette   3 VRAM
/// 4 OAM     5 serial registers   6 sound registers   7 other registers
/// ```
fn register_ram_reset(bus: &mut Bus, flags: u32) {
    // The display is always forced blank.
    bus.write_half_word(0x0400_0000, 0x0080);

    let regions = [
        MemoryRegion::Ewram,
        MemoryRegion::Iwram,
        MemoryRegion::Palette,
        MemoryRegion::Vram,
        MemoryRegion::Oam,
    ];
    for (bit, region) in regions.into_iter().enumerate() {
        if flags.get_bit(bit as u8) {
            bus.clear_region(region);
        }
    }

    let mut clear_io = |range: std::ops::Range<u32>| {
        for address in range.step_by(2) {
            bus.write_half_word(0x0400_0000 + address, 0);
        }
    };
    if flags.get_bit(5) {
        clear_io(0x120..0x160);
    }
    if flags.get_bit(6) {
        clear_io(0x60..0xA8);
    }
    if flags.get_bit(7) {
        clear_io(0x04..0x60);
        clear_io(0xB0..0x120);
        clear_io(0x200..0x20A);
    }
    if flags.get_bit(6) {
        bus.sound.set_bias_level(0x200);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::arm7tdmi::HaltState;
    use crate::cpu::cpu_modes::Mode;
    use crate::cpu::psr::{CpuState, Psr};
    use pretty_assertions::assert_eq;

    const CODE: u32 = 0x0300_0000;

    fn setup(program: &[u16]) -> (Arm7tdmi, Bus) {
        let mut bus = Bus::new(vec![0; 0x100], None);
        for (i, op) in program.iter().enumerate() {
            bus.write_half_word(CODE + i as u32 * 2, *op);
        }
        let mut cpu = Arm7tdmi::default();
        cpu.set_cpsr(Psr::from(Mode::System));
        cpu.cpsr.state = CpuState::Thumb;
        cpu.registers.set_program_counter(CODE);
        (cpu, bus)
    }

    #[test]
    fn thumb_swi_divides_and_continues() {
        let (mut cpu, mut bus) = setup(&[0xDF06]);
        cpu.registers.set_register_at(0, (-7_i32) as u32);
        cpu.registers.set_register_at(1, 2);
        cpu.step(&mut bus);
        assert_eq!(cpu.read_register(0) as i32, -3);
        assert_eq!(cpu.read_register(1) as i32, -1);
        assert_eq!(cpu.read_register(3), 3);
        assert_eq!(cpu.program_counter(), CODE + 2);
        assert_eq!(cpu.cpsr.mode, Mode::System);
    }

    #[test]
    fn arm_swi_takes_the_service_from_bits_16_to_23() {
        let mut bus = Bus::new(vec![0; 0x100], None);
        bus.write_word(CODE, 0xEF07_0000); // swi 0x070000 (DivArm)
        let mut cpu = Arm7tdmi::default();
        cpu.set_cpsr(Psr::from(Mode::System));
        cpu.registers.set_program_counter(CODE);
        cpu.registers.set_register_at(0, 3);
        cpu.registers.set_register_at(1, 10);
        cpu.step(&mut bus);
        assert_eq!(cpu.read_register(0), 3);
        assert_eq!(cpu.read_register(1), 1);
    }

    #[test]
    fn unknown_service_breaks() {
        let (mut cpu, mut bus) = setup(&[0xDF20]);
        cpu.step(&mut bus);
        assert!(cpu.take_break());
        assert_eq!(cpu.program_counter(), CODE + 2);
    }

    #[test]
    fn without_hle_swi_enters_supervisor() {
        let (mut cpu, mut bus) = setup(&[0xDF06]);
        cpu.hle_bios = false;
        cpu.step(&mut bus);
        assert_eq!(cpu.cpsr.mode, Mode::Supervisor);
        assert_eq!(cpu.cpsr.state, CpuState::Arm);
        assert_eq!(cpu.link_register(), CODE + 2);
        assert_eq!(cpu.program_counter(), 0x08);
    }

    #[test]
    fn halt_service_halts() {
        let (mut cpu, mut bus) = setup(&[0xDF02]);
        cpu.step(&mut bus);
        assert_eq!(cpu.halt, HaltState::Halted);

        let (mut cpu, mut bus) = setup(&[0xDF27]);
        cpu.registers.set_register_at(2, 0x80);
        cpu.step(&mut bus);
        assert_eq!(cpu.halt, HaltState::Stopped);
    }

    #[test]
    fn vblank_wait_halts_until_flag_is_set() {
        let (mut cpu, mut bus) = setup(&[0xDF05]);
        cpu.step(&mut bus);
        assert_eq!(cpu.halt, HaltState::Halted);
        assert_eq!(cpu.program_counter(), CODE);
        assert!(bus.interrupt_control.master_enabled());

        // The game's handler acknowledges VBlank in the BIOS flags.
        cpu.halt = HaltState::Running;
        bus.write_half_word(BIOS_INTERRUPT_FLAGS, 1);
        cpu.step(&mut bus);
        assert_eq!(cpu.halt, HaltState::Running);
        assert_eq!(cpu.program_counter(), CODE + 2);
        assert_eq!(bus.peek_half_word(BIOS_INTERRUPT_FLAGS), 0);
    }

    #[test]
    fn intr_wait_without_discard_returns_on_old_flag() {
        let (mut cpu, mut bus) = setup(&[0xDF04]);
        bus.write_half_word(BIOS_INTERRUPT_FLAGS, 0b1000);
        cpu.registers.set_register_at(0, 0);
        cpu.registers.set_register_at(1, 0b1000);
        cpu.step(&mut bus);
        assert_eq!(cpu.halt, HaltState::Running);
        assert_eq!(cpu.program_counter(), CODE + 2);
    }

    #[test]
    fn arc_tan2_leaves_the_polynomial_square_in_r1() {
        let (mut cpu, mut bus) = setup(&[0xDF0A, 0xDF0A]);
        cpu.registers.set_register_at(0, 0x100);
        cpu.registers.set_register_at(1, 0x80);
        cpu.step(&mut bus);
        assert_eq!(cpu.read_register(0), 0x12E4);
        assert_eq!(cpu.read_register(1) as i32, -0x1000);
        assert_eq!(cpu.read_register(3), 0x170);

        // On an axis the polynomial is skipped and r1 keeps its input.
        cpu.registers.set_register_at(0, 0);
        cpu.registers.set_register_at(1, 7);
        cpu.step(&mut bus);
        assert_eq!(cpu.read_register(0), 0x4000);
        assert_eq!(cpu.read_register(1), 7);
    }

    #[test]
    fn checksum_and_sound_bias() {
        let (mut cpu, mut bus) = setup(&[0xDF0D, 0xDF19]);
        cpu.step(&mut bus);
        assert_eq!(cpu.read_register(0), BIOS_CHECKSUM);
        cpu.registers.set_register_at(0, 0);
        cpu.step(&mut bus);
        assert_eq!(bus.sound.bias() & 0x3FE, 0);
    }

    #[test]
    fn soft_reset_restarts_the_cartridge() {
        let (mut cpu, mut bus) = setup(&[0xDF00]);
        cpu.registers.set_register_at(4, 0x1234);
        bus.write_word(0x0300_7F00, 0xFFFF_FFFF);
        cpu.step(&mut bus);
        assert_eq!(cpu.program_counter(), ROM_ENTRY);
        assert_eq!(cpu.cpsr.state, CpuState::Arm);
        assert_eq!(cpu.cpsr.mode, Mode::System);
        assert_eq!(cpu.read_register(4), 0);
        assert_eq!(cpu.link_register(), ROM_ENTRY);
        assert_eq!(bus.peek_word(0x0300_7F00), 0);
    }

    #[test]
    fn register_ram_reset_clears_selected_regions() {
        let (mut cpu, mut bus) = setup(&[0xDF01]);
        bus.write_word(0x0200_0000, 0xAAAA_AAAA);
        bus.write_word(0x0700_0000, 0xBBBB_BBBB);
        cpu.registers.set_register_at(0, 0b1_0001);
        cpu.step(&mut bus);
        assert_eq!(bus.peek_word(0x0200_0000), 0);
        assert_eq!(bus.peek_word(0x0700_0000), 0);
        assert_eq!(bus.lcd.dispcnt, 0x0080);
        // Code in IWRAM is untouched.
        assert_eq!(bus.peek_half_word(CODE), 0xDF01);
    }
}
