//! Rotation/scaling matrix services: `BgAffineSet` and `ObjAffineSet`.
//!
//! ```text
//! [ pa pb ]   [ sx  0 ]   [ cos θ  -sin θ ]
//! [ pc pd ] = [ 0  sy ] * [ sin θ   cos θ ]
//! ```
//!
//! Scales and matrix entries are signed 8.8 fixed point, angles take the
//! upper byte of a 16-bit circle. Sines come from a 256 entry 1.14 table
//! as in the firmware.

use std::f64::consts::TAU;

use crate::bus::Bus;

/// `sin` of `angle / 256` of a turn, in 1.14 fixed point.
fn sine(angle: u8) -> i32 {
    let radians = f64::from(angle) * TAU / 256.0;
    (radians.sin() * f64::from(0x4000)).round() as i32
}

fn cosine(angle: u8) -> i32 {
    sine(angle.wrapping_add(64))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Matrix {
    pa: i32,
    pb: i32,
    pc: i32,
    pd: i32,
}

impl Matrix {
    fn new(scale_x: i32, scale_y: i32, angle: u16) -> Self {
        let angle = (angle >> 8) as u8;
        let (sin, cos) = (sine(angle), cosine(angle));
        Self {
            pa: (scale_x * cos) >> 14,
            pb: -((scale_x * sin) >> 14),
            pc: (scale_y * sin) >> 14,
            pd: (scale_y * cos) >> 14,
        }
    }
}

/// Reads `count` 20-byte source records and writes 16-byte background
/// parameter blocks (`pa pb pc pd` then the 19.8 reference point).
///
/// ```text
/// +0  i32  texture center x (19.8)   +8   i16  screen center x
/// +4  i32  texture center y (19.8)   +10  i16  screen center y
/// +12 i16  scale x (8.8)             +14  i16  scale y (8.8)
/// +16 u16  angle
/// ```
pub fn bg_affine_set(bus: &mut Bus, mut source: u32, mut destination: u32, count: u32) {
    for _ in 0..count {
        let origin_x = bus.read_word(source) as i32;
        let origin_y = bus.read_word(source.wrapping_add(4)) as i32;
        let center_x = i32::from(bus.read_half_word(source.wrapping_add(8)) as i16);
        let center_y = i32::from(bus.read_half_word(source.wrapping_add(10)) as i16);
        let scale_x = i32::from(bus.read_half_word(source.wrapping_add(12)) as i16);
        let scale_y = i32::from(bus.read_half_word(source.wrapping_add(14)) as i16);
        let matrix = Matrix::new(scale_x, scale_y, bus.read_half_word(source.wrapping_add(16)));

        let start_x = origin_x.wrapping_sub(
            (matrix.pa.wrapping_mul(center_x)).wrapping_add(matrix.pb.wrapping_mul(center_y)),
        );
        let start_y = origin_y.wrapping_sub(
            (matrix.pc.wrapping_mul(center_x)).wrapping_add(matrix.pd.wrapping_mul(center_y)),
        );

        bus.write_half_word(destination, matrix.pa as u16);
        bus.write_half_word(destination.wrapping_add(2), matrix.pb as u16);
        bus.write_half_word(destination.wrapping_add(4), matrix.pc as u16);
        bus.write_half_word(destination.wrapping_add(6), matrix.pd as u16);
        bus.write_word(destination.wrapping_add(8), start_x as u32);
        bus.write_word(destination.wrapping_add(12), start_y as u32);

        source = source.wrapping_add(20);
        destination = destination.wrapping_add(16);
    }
}

/// Reads `count` 8-byte records (`sx sy angle`, padded) and writes the four
/// entries `stride` bytes apart: 2 for a packed matrix, 8 for OAM.
pub fn obj_affine_set(bus: &mut Bus, mut source: u32, mut destination: u32, count: u32, stride: u32) {
    for _ in 0..count {
        let scale_x = i32::from(bus.read_half_word(source) as i16);
        let scale_y = i32::from(bus.read_half_word(source.wrapping_add(2)) as i16);
        let matrix = Matrix::new(scale_x, scale_y, bus.read_half_word(source.wrapping_add(4)));

        for (i, entry) in [matrix.pa, matrix.pb, matrix.pc, matrix.pd].into_iter().enumerate() {
            let address = destination.wrapping_add((i as u32).wrapping_mul(stride));
            bus.write_half_word(address, entry as u16);
        }

        source = source.wrapping_add(8);
        destination = destination.wrapping_add(stride.wrapping_mul(4));
    }
}
