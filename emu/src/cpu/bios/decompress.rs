//! # Decompression services
//!
//! Every stream starts with a 32-bit header:
//!
//! ```text
//! bits 0-3   format parameter (Huffman data size, Diff unit size)
//! bits 4-7   format: 1 LZ77, 2 Huffman, 3 run-length, 8 difference filter
//! bits 8-31  decompressed size in bytes
//! ```
//!
//! Streams are decoded into a buffer first and copied to the destination
//! only once decoding succeeded, so a corrupt stream leaves memory as it
//! was. "Wram" variants write bytes, "Vram" variants 16-bit units since
//! VRAM ignores byte writes.

use crate::bitwise::Bits;
use crate::bus::Bus;
use crate::cpu::bios::BiosError;

/// Highest address of the bus.
const ADDRESS_SPACE_END: u32 = 0x0FFF_FFFF;

/// Width of the writes that copy the output to memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Byte,
    HalfWord,
    Word,
}

/// Compressed bytes, read in order.
pub trait Source {
    fn next_byte(&mut self) -> Result<u8, BiosError>;

    fn next_word(&mut self) -> Result<u32, BiosError> {
        let mut bytes = [0; 4];
        for byte in &mut bytes {
            *byte = self.next_byte()?;
        }
        Ok(u32::from_le_bytes(bytes))
    }
}

/// Reads through the bus, charging each access.
pub struct BusSource<'a> {
    bus: &'a mut Bus,
    address: u32,
    consumed: usize,
}

impl<'a> BusSource<'a> {
    pub fn new(bus: &'a mut Bus, address: u32) -> Self {
        Self {
            bus,
            address,
            consumed: 0,
        }
    }
}

impl Source for BusSource<'_> {
    fn next_byte(&mut self) -> Result<u8, BiosError> {
        if self.address > ADDRESS_SPACE_END {
            return Err(BiosError::SourceExhausted {
                consumed: self.consumed,
            });
        }
        let byte = self.bus.read_byte(self.address);
        self.address += 1;
        self.consumed += 1;
        Ok(byte)
    }
}

fn read_header<S: Source>(
    source: &mut S,
    format: &'static str,
    kind: u32,
) -> Result<(u32, usize), BiosError> {
    let header = source.next_word()?;
    if header.get_bits(4..=7) != kind {
        return Err(BiosError::BadHeader { format, header });
    }
    Ok((header, header.get_bits(8..=31) as usize))
}

fn output_buffer(size: usize) -> Result<Vec<u8>, BiosError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(size)
        .map_err(|_| BiosError::Allocation { size })?;
    Ok(buffer)
}

/// LZ77: each flag byte describes the next eight blocks, msb first. A set
/// bit is a two byte back reference.
///
/// ```text
/// byte 0: bits 4-7 length - 3, bits 0-3 distance - 1 (high)
/// byte 1: distance - 1 (low)
/// ```
pub fn decode_lz77<S: Source>(source: &mut S) -> Result<Vec<u8>, BiosError> {
    let (_, size) = read_header(source, "LZ77", 1)?;
    let mut output = output_buffer(size)?;

    while output.len() < size {
        let flags = source.next_byte()?;
        for block in (0..8).rev() {
            if output.len() >= size {
                break;
            }
            if !flags.get_bit(block) {
                output.push(source.next_byte()?);
                continue;
            }

            let high = source.next_byte()?;
            let low = source.next_byte()?;
            let length = usize::from(high >> 4) + 3;
            let distance = ((usize::from(high & 0xF) << 8) | usize::from(low)) + 1;
            if distance > output.len() {
                return Err(BiosError::BadReference {
                    position: output.len(),
                    distance,
                });
            }
            for _ in 0..length.min(size - output.len()) {
                output.push(output[output.len() - distance]);
            }
        }
    }
    Ok(output)
}

/// Run-length: flag bit 7 set is a run of `(flag & 0x7F) + 3` copies of
/// the next byte, clear is `(flag & 0x7F) + 1` literal bytes.
pub fn decode_run_length<S: Source>(source: &mut S) -> Result<Vec<u8>, BiosError> {
    let (_, size) = read_header(source, "run-length", 3)?;
    let mut output = output_buffer(size)?;

    while output.len() < size {
        let flag = source.next_byte()?;
        let left = size - output.len();
        if flag.get_bit(7) {
            let length = usize::from(flag & 0x7F) + 3;
            let value = source.next_byte()?;
            output.resize(output.len() + length.min(left), value);
        } else {
            let length = usize::from(flag & 0x7F) + 1;
            for _ in 0..length.min(left) {
                output.push(source.next_byte()?);
            }
        }
    }
    Ok(output)
}

/// Huffman with 4- or 8-bit leaves.
///
/// After the header comes the tree: a size byte (`size / 2 - 1`) followed
/// by the nodes, root first. A node holds the offset to its children in
/// bits 0-5; bit 7 marks the left child as a leaf, bit 6 the right one.
/// The bitstream follows in 32-bit words read msb first.
pub fn decode_huffman<S: Source>(source: &mut S) -> Result<Vec<u8>, BiosError> {
    const ROOT: usize = 1;

    let (header, size) = read_header(source, "Huffman", 2)?;
    let data_bits = header.get_bits(0..=3);
    if !matches!(data_bits, 4 | 8) {
        return Err(BiosError::BadHeader {
            format: "Huffman",
            header,
        });
    }

    let size_byte = source.next_byte()?;
    let tree_size = (usize::from(size_byte) + 1) * 2;
    let mut tree = vec![size_byte; tree_size];
    for node in &mut tree[1..] {
        *node = source.next_byte()?;
    }

    let mut output = output_buffer(size)?;
    let mut low_nibble = None;
    let mut node = ROOT;
    'stream: while output.len() < size {
        let bits = source.next_word()?;
        for bit in (0..32).rev() {
            let right = bits.get_bit(bit);
            let value = tree[node];
            let child = (node & !1) + usize::from(value & 0x3F) * 2 + 2 + usize::from(right);
            if child >= tree_size {
                return Err(BiosError::BadTreeNode {
                    index: child,
                    size: tree_size,
                });
            }

            let leaf = if right { value.get_bit(6) } else { value.get_bit(7) };
            if !leaf {
                node = child;
                continue;
            }

            let data = tree[child];
            if data_bits == 8 {
                output.push(data);
            } else if let Some(low) = low_nibble.take() {
                output.push(low | ((data & 0xF) << 4));
            } else {
                low_nibble = Some(data & 0xF);
            }
            node = ROOT;
            if output.len() >= size {
                break 'stream;
            }
        }
    }
    Ok(output)
}

/// Difference filter: every unit is the running sum of the deltas so far.
pub fn decode_diff<S: Source>(source: &mut S) -> Result<Vec<u8>, BiosError> {
    let (header, size) = read_header(source, "difference", 8)?;
    let mut output = output_buffer(size)?;

    match header.get_bits(0..=3) {
        1 => {
            let mut value = 0_u8;
            for _ in 0..size {
                value = value.wrapping_add(source.next_byte()?);
                output.push(value);
            }
        }
        2 => {
            let mut value = 0_u16;
            while output.len() < size {
                let delta = u16::from_le_bytes([source.next_byte()?, source.next_byte()?]);
                value = value.wrapping_add(delta);
                output.extend_from_slice(&value.to_le_bytes());
            }
            output.truncate(size);
        }
        _ => {
            return Err(BiosError::BadHeader {
                format: "difference",
                header,
            });
        }
    }
    Ok(output)
}

fn write_out(bus: &mut Bus, destination: u32, data: &[u8], unit: Unit) {
    match unit {
        Unit::Byte => {
            for (i, byte) in data.iter().enumerate() {
                bus.write_byte(destination.wrapping_add(i as u32), *byte);
            }
        }
        Unit::HalfWord => {
            for (i, chunk) in data.chunks(2).enumerate() {
                let mut bytes = [0; 2];
                bytes[..chunk.len()].copy_from_slice(chunk);
                bus.write_half_word(destination.wrapping_add(i as u32 * 2), u16::from_le_bytes(bytes));
            }
        }
        Unit::Word => {
            for (i, chunk) in data.chunks(4).enumerate() {
                let mut bytes = [0; 4];
                bytes[..chunk.len()].copy_from_slice(chunk);
                bus.write_word(destination.wrapping_add(i as u32 * 4), u32::from_le_bytes(bytes));
            }
        }
    }
}

pub fn lz77(bus: &mut Bus, source: u32, destination: u32, unit: Unit) -> Result<(), BiosError> {
    let data = decode_lz77(&mut BusSource::new(bus, source))?;
    write_out(bus, destination, &data, unit);
    Ok(())
}

pub fn run_length(bus: &mut Bus, source: u32, destination: u32, unit: Unit) -> Result<(), BiosError> {
    let data = decode_run_length(&mut BusSource::new(bus, source))?;
    write_out(bus, destination, &data, unit);
    Ok(())
}

pub fn huffman(bus: &mut Bus, source: u32, destination: u32) -> Result<(), BiosError> {
    let data = decode_huffman(&mut BusSource::new(bus, source & !3))?;
    write_out(bus, destination & !3, &data, Unit::Word);
    Ok(())
}

pub fn diff_unfilter(bus: &mut Bus, source: u32, destination: u32, unit: Unit) -> Result<(), BiosError> {
    let data = decode_diff(&mut BusSource::new(bus, source))?;
    write_out(bus, destination, &data, unit);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct SliceSource<'a> {
        data: &'a [u8],
        position: usize,
    }

    impl Source for SliceSource<'_> {
        fn next_byte(&mut self) -> Result<u8, BiosError> {
            let byte = self.data.get(self.position).copied().ok_or(
                BiosError::SourceExhausted {
                    consumed: self.position,
                },
            )?;
            self.position += 1;
            Ok(byte)
        }
    }

    fn source(data: &[u8]) -> SliceSource<'_> {
        SliceSource { data, position: 0 }
    }

    fn header(kind: u8, parameter: u8, size: u32) -> Vec<u8> {
        ((size << 8) | u32::from(kind << 4 | parameter))
            .to_le_bytes()
            .to_vec()
    }

    #[test]
    fn lz77_literals() {
        let mut stream = header(1, 0, 8);
        stream.push(0x00);
        stream.extend_from_slice(b"SATSUMA!");
        assert_eq!(decode_lz77(&mut source(&stream)).unwrap(), b"SATSUMA!");
    }

    #[test]
    fn lz77_back_reference_overlaps() {
        let mut stream = header(1, 0, 9);
        stream.push(0b0001_0000);
        stream.extend_from_slice(b"ABC");
        stream.extend_from_slice(&[0x30, 0x02]);
        assert_eq!(decode_lz77(&mut source(&stream)).unwrap(), b"ABCABCABC");
    }

    #[test]
    fn lz77_reference_before_start_is_rejected() {
        let mut stream = header(1, 0, 4);
        stream.extend_from_slice(&[0x80, 0x00, 0x00]);
        assert_eq!(
            decode_lz77(&mut source(&stream)),
            Err(BiosError::BadReference {
                position: 0,
                distance: 1
            })
        );
    }

    #[test]
    fn truncated_stream_is_reported() {
        let mut stream = header(1, 0, 8);
        stream.extend_from_slice(&[0x00, b'A']);
        assert_eq!(
            decode_lz77(&mut source(&stream)),
            Err(BiosError::SourceExhausted { consumed: 6 })
        );
    }

    #[test]
    fn wrong_format_is_rejected() {
        let stream = header(3, 0, 8);
        assert_eq!(
            decode_lz77(&mut source(&stream)),
            Err(BiosError::BadHeader {
                format: "LZ77",
                header: 0x0000_0830
            })
        );
    }

    #[test]
    fn run_length_runs_and_literals() {
        let mut stream = header(3, 0, 7);
        stream.extend_from_slice(&[0x81, 0xAA, 0x02, 1, 2, 3]);
        assert_eq!(
            decode_run_length(&mut source(&stream)).unwrap(),
            [0xAA, 0xAA, 0xAA, 0xAA, 1, 2, 3]
        );
    }

    #[test]
    fn huffman_eight_bit_leaves() {
        let mut stream = header(2, 8, 4);
        stream.extend_from_slice(&[0x01, 0xC0, b'A', b'B']);
        stream.extend_from_slice(&0x6000_0000_u32.to_le_bytes());
        assert_eq!(decode_huffman(&mut source(&stream)).unwrap(), b"ABBA");
    }

    #[test]
    fn huffman_four_bit_leaves_pack_low_nibble_first() {
        let mut stream = header(2, 4, 2);
        stream.extend_from_slice(&[0x01, 0xC0, 0x1, 0x2]);
        stream.extend_from_slice(&0x6000_0000_u32.to_le_bytes());
        assert_eq!(decode_huffman(&mut source(&stream)).unwrap(), [0x21, 0x12]);
    }

    #[test]
    fn huffman_node_outside_tree_is_rejected() {
        let mut stream = header(2, 8, 4);
        stream.extend_from_slice(&[0x01, 0x3F, b'A', b'B']);
        stream.extend_from_slice(&0_u32.to_le_bytes());
        assert_eq!(
            decode_huffman(&mut source(&stream)),
            Err(BiosError::BadTreeNode { index: 128, size: 4 })
        );
    }

    #[test]
    fn difference_filters() {
        let mut stream = header(8, 1, 4);
        stream.extend_from_slice(&[1, 1, 1, 1]);
        assert_eq!(decode_diff(&mut source(&stream)).unwrap(), [1, 2, 3, 4]);

        let mut stream = header(8, 2, 4);
        stream.extend_from_slice(&[0x00, 0x01, 0x01, 0x00]);
        assert_eq!(
            decode_diff(&mut source(&stream)).unwrap(),
            [0x00, 0x01, 0x01, 0x01]
        );
    }

    #[test]
    fn vram_variant_writes_halfwords_through_the_bus() {
        let mut bus = Bus::new(vec![0; 0x100], None);
        let mut stream = header(1, 0, 4);
        stream.push(0x00);
        stream.extend_from_slice(&[1, 2, 3, 4]);
        for (address, byte) in (0x0200_0000..).zip(&stream) {
            bus.write_byte(address, *byte);
        }
        lz77(&mut bus, 0x0200_0000, 0x0600_0000, Unit::HalfWord).unwrap();
        assert_eq!(bus.peek_word(0x0600_0000), 0x0403_0201);
    }

    #[test]
    fn failed_decode_leaves_destination_alone() {
        let mut bus = Bus::new(vec![0; 0x100], None);
        let mut stream = header(1, 0, 4);
        stream.extend_from_slice(&[0x80, 0x00, 0x00]);
        for (address, byte) in (0x0200_0000..).zip(&stream) {
            bus.write_byte(address, *byte);
        }
        bus.write_word(0x0200_1000, 0x1234_5678);
        assert!(lz77(&mut bus, 0x0200_0000, 0x0200_1000, Unit::Byte).is_err());
        assert_eq!(bus.peek_word(0x0200_1000), 0x1234_5678);
    }

    const STREAM: u32 = 0x0200_0000;
    const TOP: u32 = 0xFFFF_FFFC;

    fn bus_with_stream(stream: &[u8]) -> Bus {
        let mut bus = Bus::new(vec![0; 0x100], None);
        for (i, byte) in stream.iter().enumerate() {
            bus.write_byte(STREAM + i as u32, *byte);
        }
        bus
    }

    // Output running past 0xFFFFFFFF continues at address 0, where the
    // BIOS ignores it.
    #[test]
    fn destination_at_the_top_of_memory_wraps() {
        let mut lz = header(1, 0, 8);
        lz.push(0x00);
        lz.extend_from_slice(b"SATSUMA!");
        for unit in [Unit::Byte, Unit::HalfWord, Unit::Word] {
            let mut bus = bus_with_stream(&lz);
            assert_eq!(lz77(&mut bus, STREAM, TOP, unit), Ok(()));
            let literals: Vec<u8> = (0..8).map(|i| bus.peek_byte(STREAM + 5 + i)).collect();
            assert_eq!(literals, b"SATSUMA!");
        }

        let mut rl = header(3, 0, 7);
        rl.extend_from_slice(&[0x81, 0xAA, 0x02, 1, 2, 3]);
        for unit in [Unit::Byte, Unit::HalfWord] {
            let mut bus = bus_with_stream(&rl);
            assert_eq!(run_length(&mut bus, STREAM, TOP + 1, unit), Ok(()));
            assert_eq!(bus.peek_byte(STREAM + 5), 0xAA);
        }

        let mut huff = header(2, 8, 8);
        huff.extend_from_slice(&[0x01, 0xC0, b'A', b'B']);
        huff.extend_from_slice(&0x6000_0000_u32.to_le_bytes());
        huff.extend_from_slice(&0x6000_0000_u32.to_le_bytes());
        let mut bus = bus_with_stream(&huff);
        assert_eq!(huffman(&mut bus, STREAM, TOP), Ok(()));
        assert_eq!(bus.peek_byte(STREAM + 6), b'A');

        let mut diff = header(8, 1, 6);
        diff.extend_from_slice(&[1, 1, 1, 1, 1, 1]);
        for unit in [Unit::Byte, Unit::HalfWord] {
            let mut bus = bus_with_stream(&diff);
            assert_eq!(diff_unfilter(&mut bus, STREAM, TOP + 2, unit), Ok(()));
            assert_eq!(bus.peek_word(STREAM + 4), 0x0101_0101);
        }
    }

    #[test]
    fn source_past_the_bus_is_exhausted_at_once() {
        let mut bus = Bus::new(vec![0; 0x100], None);
        assert_eq!(
            lz77(&mut bus, TOP, STREAM, Unit::Byte),
            Err(BiosError::SourceExhausted { consumed: 0 })
        );
        assert_eq!(bus.peek_word(STREAM), 0);
    }
}
