//! # Memory bus
//!
//! Width-typed accessors over the whole address space. Every access is
//! charged to a cycle counter the CPU drains after each instruction, so the
//! bus doubles as the per-instruction cost table.
//!
//! ```text
//! 0x00000000  BIOS           16 KiB   (readable only while executing it)
//! 0x02000000  EWRAM         256 KiB   16-bit bus, 3 clocks per unit
//! 0x03000000  IWRAM          32 KiB   mirrored through the whole region
//! 0x04000000  I/O registers   1 KiB
//! 0x05000000  Palette         1 KiB
//! 0x06000000  VRAM           96 KiB   upper 32 KiB mirrored
//! 0x07000000  OAM             1 KiB
//! 0x08000000  Game Pak ROM   32 MiB   mirrored at 0x0A and 0x0C, 5/3 clocks
//! 0x0E000000  Game Pak SRAM  64 KiB   8-bit bus
//! ```
//!
//! Anything else reads as open bus: the last opcode the CPU fetched.

use crate::bitwise::Bits;
use crate::cpu::arm7tdmi::HaltState;
use crate::cpu::hardware::dma::{Dma, DmaTiming};
use crate::cpu::hardware::interrupt_control::InterruptControl;
use crate::cpu::hardware::keypad::Keypad;
use crate::cpu::hardware::lcd::Lcd;
use crate::cpu::hardware::sound::{SOUND_BASE, Sound};
use crate::cpu::hardware::timers::Timers;
use crate::cpu::hardware::{NO_EVENT, Peripheral};

pub const BIOS_SIZE: usize = 0x4000;
pub const ROM_MAX_SIZE: usize = 0x0200_0000;
const EWRAM_SIZE: usize = 0x4_0000;
const IWRAM_SIZE: usize = 0x8000;
const IO_SIZE: usize = 0x400;
const PALETTE_SIZE: usize = 0x400;
const VRAM_SIZE: usize = 0x1_8000;
const OAM_SIZE: usize = 0x400;
const SRAM_SIZE: usize = 0x1_0000;

/// Vectors and IRQ dispatcher installed when no BIOS image is supplied.
///
/// - `0x08`: `movs pc, lr`, so an SWI that reaches the vector returns.
/// - `0x18`: `b 0x128`
/// - `0x128`: push the caller-saved registers, call the handler stored at
///   `0x03FFFFFC` (mirror of `0x03007FFC`), pop and `subs pc, lr, #4`.
const BUILTIN_BIOS: [(usize, u32); 8] = [
    (0x08, 0xE1B0_F00E),
    (0x18, 0xEA00_0042),
    (0x128, 0xE92D_500F),
    (0x12C, 0xE3A0_0301),
    (0x130, 0xE28F_E000),
    (0x134, 0xE510_F004),
    (0x138, 0xE8BD_500F),
    (0x13C, 0xE25E_F004),
];

pub struct Bus {
    bios: Box<[u8]>,
    ewram: Box<[u8]>,
    iwram: Box<[u8]>,
    /// Storage for I/O registers without a dedicated model.
    io: Box<[u8]>,
    palette: Box<[u8]>,
    vram: Box<[u8]>,
    oam: Box<[u8]>,
    rom: Box<[u8]>,
    sram: Box<[u8]>,

    pub interrupt_control: InterruptControl,
    pub lcd: Lcd,
    pub timers: Timers,
    pub dma: Dma,
    pub sound: Sound,
    pub keypad: Keypad,

    /// Clocks charged since the CPU last drained them.
    cycles: u32,
    /// Clocks charged since the peripherals last caught up.
    clocks_since_sync: u32,
    /// Address following the previous access, for sequential timing.
    next_sequential: u32,
    open_bus: u32,
    last_bios_opcode: u32,
    executing_bios: bool,
    sync_requested: bool,
    halt_request: Option<HaltState>,
}

impl Bus {
    /// A bus with the given cartridge and, optionally, a real BIOS image.
    /// Sizes are validated by the caller.
    #[must_use]
    pub fn new(rom: Vec<u8>, bios: Option<Vec<u8>>) -> Self {
        let bios = bios.unwrap_or_else(|| {
            let mut image = vec![0; BIOS_SIZE];
            for (address, opcode) in BUILTIN_BIOS {
                image[address..address + 4].copy_from_slice(&opcode.to_le_bytes());
            }
            image
        });

        Self {
            bios: bios.into_boxed_slice(),
            ewram: vec![0; EWRAM_SIZE].into_boxed_slice(),
            iwram: vec![0; IWRAM_SIZE].into_boxed_slice(),
            io: vec![0; IO_SIZE].into_boxed_slice(),
            palette: vec![0; PALETTE_SIZE].into_boxed_slice(),
            vram: vec![0; VRAM_SIZE].into_boxed_slice(),
            oam: vec![0; OAM_SIZE].into_boxed_slice(),
            rom: rom.into_boxed_slice(),
            sram: vec![0xFF; SRAM_SIZE].into_boxed_slice(),
            interrupt_control: InterruptControl::default(),
            lcd: Lcd::default(),
            timers: Timers::default(),
            dma: Dma::default(),
            sound: Sound::default(),
            keypad: Keypad::new(),
            cycles: 0,
            clocks_since_sync: 0,
            next_sequential: 0,
            open_bus: 0,
            last_bios_opcode: 0,
            executing_bios: false,
            sync_requested: false,
            halt_request: None,
        }
    }

    /// Clocks charged since the previous call.
    pub const fn take_cycles(&mut self) -> u32 {
        std::mem::replace(&mut self.cycles, 0)
    }

    /// Adds clocks spent without a memory access.
    pub const fn idle(&mut self, clocks: u32) {
        self.cycles += clocks;
        self.clocks_since_sync += clocks;
    }

    /// A register write changed peripheral timing; the CPU batch should end.
    pub const fn take_sync_request(&mut self) -> bool {
        std::mem::replace(&mut self.sync_requested, false)
    }

    /// Low-power state requested through HALTCNT.
    pub const fn take_halt_request(&mut self) -> Option<HaltState> {
        self.halt_request.take()
    }

    pub fn request_halt(&mut self, state: HaltState) {
        self.halt_request = Some(state);
        self.sync_requested = true;
    }

    fn access_cost(&self, address: u32, width: u32) -> u32 {
        let sequential = address == self.next_sequential;
        match address >> 24 {
            0x02 => 3 * width.div_ceil(2),
            0x05 | 0x06 => width.div_ceil(2),
            0x08..=0x0D => {
                let first = if sequential { 3 } else { 5 };
                if width == 4 { first + 3 } else { first }
            }
            0x0E | 0x0F => 5,
            _ => 1,
        }
    }

    fn charge(&mut self, address: u32, width: u32) {
        let cost = self.access_cost(address, width);
        self.cycles += cost;
        self.clocks_since_sync += cost;
        self.next_sequential = address.wrapping_add(width);
    }

    const fn open_bus_byte(&self, address: u32) -> u8 {
        self.open_bus.to_le_bytes()[(address & 3) as usize]
    }

    fn read_raw(&self, address: u32) -> u8 {
        match address >> 24 {
            0x00 if (address as usize) < BIOS_SIZE => {
                if self.executing_bios {
                    self.bios[address as usize]
                } else {
                    self.last_bios_opcode.get_byte((address & 3) as u8)
                }
            }
            0x02 => self.ewram[address as usize % EWRAM_SIZE],
            0x03 => self.iwram[address as usize % IWRAM_SIZE],
            0x04 if address & 0x00FF_FFFF < IO_SIZE as u32 => self.read_io(address & 0x3FF),
            0x05 => self.palette[address as usize % PALETTE_SIZE],
            0x06 => self.vram[vram_offset(address)],
            0x07 => self.oam[address as usize % OAM_SIZE],
            0x08..=0x0D => {
                let offset = (address & 0x01FF_FFFF) as usize;
                self.rom.get(offset).copied().unwrap_or_else(|| {
                    // Unmapped cartridge space echoes the halfword address.
                    ((offset >> 1) as u16).get_byte((offset & 1) as u8)
                })
            }
            0x0E | 0x0F => self.sram[address as usize % SRAM_SIZE],
            _ => self.open_bus_byte(address),
        }
    }

    fn write_raw(&mut self, address: u32, value: u8) {
        match address >> 24 {
            0x02 => self.ewram[address as usize % EWRAM_SIZE] = value,
            0x03 => self.iwram[address as usize % IWRAM_SIZE] = value,
            0x04 if address & 0x00FF_FFFF < IO_SIZE as u32 => self.write_io(address & 0x3FF, value),
            0x05 => self.palette[address as usize % PALETTE_SIZE] = value,
            0x06 => self.vram[vram_offset(address)] = value,
            0x07 => self.oam[address as usize % OAM_SIZE] = value,
            0x0E | 0x0F => self.sram[address as usize % SRAM_SIZE] = value,
            _ => tracing::trace!("write 0x{value:02X} to read-only or unmapped 0x{address:08X}"),
        }
    }

    fn read_io(&self, offset: u32) -> u8 {
        match offset {
            0x000..=0x007 => self.lcd.read(offset),
            0x060..=0x0AF => self.sound.read(offset - SOUND_BASE),
            0x0B0..=0x0DF => self.dma.read(offset - 0x0B0),
            0x100..=0x10F => self.timers.read(offset - 0x100, self.clocks_since_sync),
            0x130..=0x133 => self.keypad.read(offset - 0x130),
            0x200..=0x20B | 0x300 => self.interrupt_control.read(offset),
            0x301 => 0,
            _ => self.io[offset as usize],
        }
    }

    fn write_io(&mut self, offset: u32, value: u8) {
        match offset {
            0x000..=0x007 => self.lcd.write(offset, value),
            0x060..=0x0AF => self.sound.write(offset - SOUND_BASE, value),
            0x0B0..=0x0DF => {
                if self.dma.write(offset - 0x0B0, value) {
                    self.sync_requested = true;
                }
            }
            0x100..=0x10F => {
                self.timers.write(offset - 0x100, value);
                self.sync_requested = true;
            }
            0x130..=0x133 => self.keypad.write(offset - 0x130, value),
            0x200..=0x20B | 0x300 => {
                self.interrupt_control.write(offset, value);
                self.sync_requested = true;
            }
            0x301 => {
                let state = if value.get_bit(7) {
                    HaltState::Stopped
                } else {
                    HaltState::Halted
                };
                self.request_halt(state);
            }
            _ => self.io[offset as usize] = value,
        }
    }

    #[must_use]
    pub fn read_byte(&mut self, address: u32) -> u8 {
        self.charge(address, 1);
        self.read_raw(address)
    }

    /// Reads the halfword containing `address` (the low bit is ignored).
    #[must_use]
    pub fn read_half_word(&mut self, address: u32) -> u16 {
        self.charge(address & !1, 2);
        self.peek_half_word(address)
    }

    /// Reads the word containing `address` (the low two bits are ignored).
    #[must_use]
    pub fn read_word(&mut self, address: u32) -> u32 {
        self.charge(address & !3, 4);
        self.peek_word(address)
    }

    pub fn write_byte(&mut self, address: u32, value: u8) {
        self.charge(address, 1);
        match address >> 24 {
            // Byte writes to palette and background VRAM hit both halves
            // of the halfword; OAM and object VRAM ignore them.
            0x05 => {
                self.write_raw(address & !1, value);
                self.write_raw(address | 1, value);
            }
            0x06 if vram_offset(address) < 0x1_0000 => {
                self.write_raw(address & !1, value);
                self.write_raw(address | 1, value);
            }
            0x06 | 0x07 => {}
            _ => self.write_raw(address, value),
        }
    }

    /// SRAM sits on an 8-bit bus: wide writes store the byte lane selected
    /// by the unaligned address.
    pub fn write_half_word(&mut self, address: u32, value: u16) {
        if matches!(address >> 24, 0x0E | 0x0F) {
            self.charge(address, 2);
            self.write_raw(address, value.get_byte((address & 1) as u8));
            return;
        }
        let address = address & !1;
        self.charge(address, 2);
        self.write_raw(address, value.get_byte(0));
        self.write_raw(address + 1, value.get_byte(1));
    }

    pub fn write_word(&mut self, address: u32, value: u32) {
        if matches!(address >> 24, 0x0E | 0x0F) {
            self.charge(address, 4);
            self.write_raw(address, value.get_byte((address & 3) as u8));
            return;
        }
        let address = address & !3;
        self.charge(address, 4);
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.write_raw(address + i as u32, byte);
        }
    }

    /// Charges the two fetches that refill the pipeline after a branch.
    pub fn refill_pipeline(&mut self, target: u32, width: u32) {
        self.charge(target, width);
        self.charge(target.wrapping_add(width), width);
    }

    /// Instruction fetch: a timed read that also feeds open bus.
    pub fn fetch_word(&mut self, address: u32) -> u32 {
        self.executing_bios = (address as usize) < BIOS_SIZE;
        let opcode = self.read_word(address);
        self.open_bus = opcode;
        if self.executing_bios {
            self.last_bios_opcode = opcode;
        }
        opcode
    }

    pub fn fetch_half_word(&mut self, address: u32) -> u16 {
        self.executing_bios = (address as usize) < BIOS_SIZE;
        let opcode = self.read_half_word(address);
        self.open_bus = u32::from(opcode) * 0x0001_0001;
        if self.executing_bios {
            self.last_bios_opcode = self.open_bus;
        }
        opcode
    }

    /// Untimed read, for the debugger and tests.
    #[must_use]
    pub fn peek_byte(&self, address: u32) -> u8 {
        self.read_raw(address)
    }

    #[must_use]
    pub fn peek_half_word(&self, address: u32) -> u16 {
        if matches!(address >> 24, 0x0E | 0x0F) {
            return u16::from(self.read_raw(address)) * 0x0101;
        }
        let address = address & !1;
        u16::from_le_bytes([self.read_raw(address), self.read_raw(address + 1)])
    }

    #[must_use]
    pub fn peek_word(&self, address: u32) -> u32 {
        if matches!(address >> 24, 0x0E | 0x0F) {
            return u32::from(self.read_raw(address)) * 0x0101_0101;
        }
        let address = address & !3;
        u32::from_le_bytes(std::array::from_fn(|i| self.read_raw(address + i as u32)))
    }

    /// Performs every ready DMA transfer, highest priority first, and books
    /// their cost in [`Dma::busy_clocks`].
    pub fn run_pending_dma(&mut self) {
        let cpu_cycles = self.take_cycles();
        while let Some(plan) = self.dma.next_transfer() {
            let mut source = plan.source;
            let mut destination = plan.destination;
            for _ in 0..plan.units {
                if plan.word {
                    let value = self.read_word(source);
                    self.write_word(destination, value);
                } else {
                    let value = self.read_half_word(source);
                    self.write_half_word(destination, value);
                }
                source = source.wrapping_add(plan.source_step);
                destination = destination.wrapping_add(plan.destination_step);
            }

            let clocks = self.take_cycles();
            tracing::trace!(
                "DMA{} copied {} units from 0x{:08X} to 0x{:08X} in {clocks} clocks",
                plan.channel,
                plan.units,
                plan.source,
                plan.destination
            );
            self.dma.finish(&plan, source, destination, clocks, &mut self.interrupt_control);
        }
        self.cycles = cpu_cycles;
    }

    /// Feeds `elapsed` clocks to every collaborator and returns the nearest
    /// horizon among them.
    pub fn update_peripherals(&mut self, elapsed: u32) -> u32 {
        let irq = &mut self.interrupt_control;
        let mut horizon = NO_EVENT;
        horizon = horizon.min(self.lcd.update(elapsed, irq));
        horizon = horizon.min(self.timers.update(elapsed, irq));
        horizon = horizon.min(self.sound.update(elapsed, irq));
        horizon = horizon.min(self.keypad.update(elapsed, irq));
        horizon = horizon.min(self.dma.update(elapsed, irq));

        if self.lcd.take_hblank_start() {
            self.dma.trigger(DmaTiming::HBlank);
        }
        if self.lcd.take_vblank_start() {
            self.dma.trigger(DmaTiming::VBlank);
        }

        self.clocks_since_sync = 0;
        horizon
    }

    /// Clears a work RAM or video region, as the firmware reset service does.
    pub fn clear_region(&mut self, region: MemoryRegion) {
        match region {
            MemoryRegion::Ewram => self.ewram.fill(0),
            // The top 512 bytes hold the BIOS stacks and IRQ vector.
            MemoryRegion::Iwram => self.iwram[..IWRAM_SIZE - 0x200].fill(0),
            MemoryRegion::Palette => self.palette.fill(0),
            MemoryRegion::Vram => self.vram.fill(0),
            MemoryRegion::Oam => self.oam.fill(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRegion {
    Ewram,
    Iwram,
    Palette,
    Vram,
    Oam,
}

/// VRAM is 96 KiB in a 128 KiB window: the last 32 KiB mirror the
/// previous 32 KiB.
const fn vram_offset(address: u32) -> usize {
    let offset = (address & 0x1_FFFF) as usize;
    if offset >= VRAM_SIZE {
        offset - 0x8000
    } else {
        offset
    }
}
