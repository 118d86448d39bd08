//! Block copy and fill services: `CpuSet`, `CpuFastSet`, `BitUnPack`.

use crate::bitwise::Bits;
use crate::bus::Bus;
use crate::cpu::bios::BiosError;

/// Sources below EWRAM (the BIOS itself) are refused by the firmware.
const LOWEST_SOURCE: u32 = 0x0200_0000;

/// `CpuSet`: `control` bits 0-20 hold the unit count, bit 24 selects fill
/// (the first source unit is repeated), bit 26 selects 32-bit units.
pub fn cpu_set(bus: &mut Bus, source: u32, destination: u32, control: u32) {
    if source < LOWEST_SOURCE {
        tracing::warn!("CpuSet from BIOS address 0x{source:08X} ignored");
        return;
    }

    let count = control.get_bits(0..=20);
    let fill = control.get_bit(24);
    if control.get_bit(26) {
        transfer_words(bus, source & !3, destination & !3, count, fill);
    } else {
        let (mut source, mut destination) = (source & !1, destination & !1);
        let fill_value = fill.then(|| bus.read_half_word(source));
        for _ in 0..count {
            let value = fill_value.unwrap_or_else(|| {
                let value = bus.read_half_word(source);
                source = source.wrapping_add(2);
                value
            });
            bus.write_half_word(destination, value);
            destination = destination.wrapping_add(2);
        }
    }
}

/// `CpuFastSet`: always 32-bit, the count is rounded up to a multiple of
/// eight words.
pub fn cpu_fast_set(bus: &mut Bus, source: u32, destination: u32, control: u32) {
    if source < LOWEST_SOURCE {
        tracing::warn!("CpuFastSet from BIOS address 0x{source:08X} ignored");
        return;
    }

    let count = control.get_bits(0..=20).next_multiple_of(8);
    transfer_words(bus, source & !3, destination & !3, count, control.get_bit(24));
}

fn transfer_words(bus: &mut Bus, mut source: u32, mut destination: u32, count: u32, fill: bool) {
    let fill_value = fill.then(|| bus.read_word(source));
    for _ in 0..count {
        let value = fill_value.unwrap_or_else(|| {
            let value = bus.read_word(source);
            source = source.wrapping_add(4);
            value
        });
        bus.write_word(destination, value);
        destination = destination.wrapping_add(4);
    }
}

/// `BitUnPack`: widens every `source_width`-bit field of the source to
/// `destination_width` bits, adding the bias offset.
///
/// ```text
/// info + 0  u16  source length in bytes
/// info + 2  u8   source width    1, 2, 4, 8
/// info + 3  u8   destination width  1, 2, 4, 8, 16, 32
/// info + 4  u32  bits 0-30 offset, bit 31 also offsets zero fields
/// ```
pub fn bit_unpack(bus: &mut Bus, source: u32, destination: u32, info: u32) -> Result<(), BiosError> {
    let mut remaining = bus.read_half_word(info);
    let source_width = u32::from(bus.read_byte(info.wrapping_add(2)));
    let destination_width = u32::from(bus.read_byte(info.wrapping_add(3)));
    let bias = bus.read_word(info.wrapping_add(4));

    if !matches!(source_width, 1 | 2 | 4 | 8)
        || !matches!(destination_width, 1 | 2 | 4 | 8 | 16 | 32)
        || source_width > destination_width
    {
        return Err(BiosError::BadHeader {
            format: "BitUnPack",
            header: (destination_width << 8) | source_width,
        });
    }

    let offset = bias.get_bits(0..=30);
    let offset_zero = bias.get_bit(31);
    let mask = (1 << source_width) - 1;

    let (mut source, mut destination) = (source, destination & !3);
    let mut out = 0_u32;
    let mut filled = 0;
    while remaining > 0 {
        let mut byte = u32::from(bus.read_byte(source));
        source = source.wrapping_add(1);
        remaining -= 1;

        for _ in 0..8 / source_width {
            let mut field = byte & mask;
            byte >>= source_width;
            if field != 0 || offset_zero {
                field = field.wrapping_add(offset);
            }
            out |= field.wrapping_shl(filled);
            filled += destination_width;
            if filled == 32 {
                bus.write_word(destination, out);
                destination = destination.wrapping_add(4);
                out = 0;
                filled = 0;
            }
        }
    }
    Ok(())
}
