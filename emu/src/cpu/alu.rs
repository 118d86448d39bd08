//! # Barrel shifter and adder
//!
//! Pure helpers shared by both executors. None of them touch the CPU: they
//! take the carry flag in and hand the new flags back in the result, and
//! the caller decides whether the instruction is allowed to commit them.
//!
//! The shifter has two encodings with different edge cases:
//!
//! | Amount | Immediate form       | Register form (Rs & 0xFF)              |
//! |--------|----------------------|----------------------------------------|
//! | 0      | LSL: unchanged       | every kind: unchanged, C unchanged     |
//! |        | LSR/ASR: by 32       |                                        |
//! |        | ROR: RRX             |                                        |
//! | 32     | n/a                  | LSL: 0, C=bit0. LSR: 0, C=bit31        |
//! |        |                      | ASR: sign fill. ROR: unchanged, C=bit31|
//! | >32    | n/a                  | LSL/LSR: 0, C=0. ASR: sign fill        |
//! |        |                      | ROR: by amount mod 32                  |

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::flags::ShiftKind;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArithmeticOpResult {
    pub result: u32,
    pub carry: bool,
    pub overflow: bool,
    pub sign: bool,
    pub zero: bool,
}

/// Output of the barrel shifter together with its carry-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftResult {
    pub result: u32,
    pub carry: bool,
}

/// Shift encoded with a 5-bit immediate amount (bits 11-7). Zero amounts
/// carry the special meanings of that encoding.
#[must_use]
pub fn shift_immediate(kind: ShiftKind, amount: u32, rm: u32, carry: bool) -> ShiftResult {
    match (kind, amount & 0x1F) {
        (ShiftKind::Lsl, 0) => ShiftResult { result: rm, carry },
        (ShiftKind::Lsr | ShiftKind::Asr, 0) => shift_register(kind, 32, rm, carry),
        (ShiftKind::Ror, 0) => ShiftResult {
            result: (u32::from(carry) << 31) | (rm >> 1),
            carry: rm.get_bit(0),
        },
        (_, amount) => shift_register(kind, amount, rm, carry),
    }
}

/// Shift by the bottom byte of a register.
#[must_use]
pub fn shift_register(kind: ShiftKind, amount: u32, rm: u32, carry: bool) -> ShiftResult {
    let amount = amount & 0xFF;
    if amount == 0 {
        return ShiftResult { result: rm, carry };
    }

    match kind {
        ShiftKind::Lsl => match amount {
            1..=31 => ShiftResult {
                result: rm << amount,
                carry: rm.get_bit((32 - amount) as u8),
            },
            32 => ShiftResult {
                result: 0,
                carry: rm.get_bit(0),
            },
            _ => ShiftResult {
                result: 0,
                carry: false,
            },
        },
        ShiftKind::Lsr => match amount {
            1..=31 => ShiftResult {
                result: rm >> amount,
                carry: rm.get_bit((amount - 1) as u8),
            },
            32 => ShiftResult {
                result: 0,
                carry: rm.get_bit(31),
            },
            _ => ShiftResult {
                result: 0,
                carry: false,
            },
        },
        ShiftKind::Asr => match amount {
            1..=31 => ShiftResult {
                result: ((rm as i32) >> amount) as u32,
                carry: rm.get_bit((amount - 1) as u8),
            },
            _ => ShiftResult {
                result: ((rm as i32) >> 31) as u32,
                carry: rm.get_bit(31),
            },
        },
        ShiftKind::Ror => {
            let rotation = amount & 0x1F;
            if rotation == 0 {
                ShiftResult {
                    result: rm,
                    carry: rm.get_bit(31),
                }
            } else {
                ShiftResult {
                    result: rm.rotate_right(rotation),
                    carry: rm.get_bit((rotation - 1) as u8),
                }
            }
        }
    }
}

/// Rotated 8-bit immediate of data processing and MSR. A zero rotation
/// leaves the carry alone.
#[must_use]
pub fn rotated_immediate(base: u32, rotate: u32, carry: bool) -> ShiftResult {
    let rotation = rotate * 2;
    if rotation == 0 {
        ShiftResult {
            result: base,
            carry,
        }
    } else {
        let result = base.rotate_right(rotation);
        ShiftResult {
            result,
            carry: result.get_bit(31),
        }
    }
}

/// `a + b + carry_in` with all four flags.
#[must_use]
pub fn add_with_carry(a: u32, b: u32, carry_in: bool) -> ArithmeticOpResult {
    let wide = u64::from(a) + u64::from(b) + u64::from(carry_in);
    let result = wide as u32;
    ArithmeticOpResult {
        result,
        carry: wide > u64::from(u32::MAX),
        overflow: ((a ^ result) & (b ^ result)).get_bit(31),
        sign: result.get_bit(31),
        zero: result == 0,
    }
}

/// `a - b - !carry_in`. Carry is set when no borrow occurred, so plain
/// subtraction passes `carry_in = true`.
#[must_use]
pub fn sub_with_carry(a: u32, b: u32, carry_in: bool) -> ArithmeticOpResult {
    add_with_carry(a, !b, carry_in)
}

/// Internal cycles (`m`) the multiplier array needs for operand `rs`.
/// Signed multiplies also terminate early on leading ones.
#[must_use]
pub fn multiply_cycles(rs: u32, signed: bool) -> u32 {
    let check = |mask: u32| {
        let top = rs & mask;
        top == 0 || (signed && top == mask)
    };
    if check(0xFFFF_FF00) {
        1
    } else if check(0xFFFF_0000) {
        2
    } else if check(0xFF00_0000) {
        3
    } else {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const AMOUNTS: [u32; 6] = [0, 1, 31, 32, 33, 255];
    const RM: u32 = 0x8000_0001;

    fn r(result: u32, carry: bool) -> ShiftResult {
        ShiftResult { result, carry }
    }

    #[test]
    fn register_form_boundary_grid() {
        // Expected results for RM = 0x8000_0001 with an incoming carry of 0,
        // in the order of AMOUNTS.
        let grid = [
            (
                ShiftKind::Lsl,
                [
                    r(RM, false),
                    r(0x0000_0002, true),
                    r(0x8000_0000, false),
                    r(0, true),
                    r(0, false),
                    r(0, false),
                ],
            ),
            (
                ShiftKind::Lsr,
                [
                    r(RM, false),
                    r(0x4000_0000, true),
                    r(0x0000_0001, false),
                    r(0, true),
                    r(0, false),
                    r(0, false),
                ],
            ),
            (
                ShiftKind::Asr,
                [
                    r(RM, false),
                    r(0xC000_0000, true),
                    r(0xFFFF_FFFF, false),
                    r(0xFFFF_FFFF, true),
                    r(0xFFFF_FFFF, true),
                    r(0xFFFF_FFFF, true),
                ],
            ),
            (
                ShiftKind::Ror,
                [
                    r(RM, false),
                    r(0xC000_0000, true),
                    r(0x0000_0003, false),
                    r(RM, true),
                    r(0xC000_0000, true),
                    r(0x0000_0003, false),
                ],
            ),
        ];

        for (kind, expected) in grid {
            for (amount, want) in AMOUNTS.into_iter().zip(expected) {
                assert_eq!(
                    shift_register(kind, amount, RM, false),
                    want,
                    "{kind} by register {amount}"
                );
            }
        }
    }

    #[test]
    fn register_form_zero_keeps_carry() {
        for kind in [ShiftKind::Lsl, ShiftKind::Lsr, ShiftKind::Asr, ShiftKind::Ror] {
            assert_eq!(shift_register(kind, 0, RM, true), r(RM, true));
            // Only the bottom byte of Rs counts.
            assert_eq!(shift_register(kind, 0x100, RM, true), r(RM, true));
        }
    }

    #[test]
    fn immediate_form_zero_encodings() {
        assert_eq!(shift_immediate(ShiftKind::Lsl, 0, RM, true), r(RM, true));
        // LSR #0 means LSR #32.
        assert_eq!(shift_immediate(ShiftKind::Lsr, 0, RM, false), r(0, true));
        // ASR #0 means ASR #32.
        assert_eq!(
            shift_immediate(ShiftKind::Asr, 0, RM, false),
            r(0xFFFF_FFFF, true)
        );
        assert_eq!(
            shift_immediate(ShiftKind::Asr, 0, 0x7FFF_FFFF, true),
            r(0, false)
        );
        // ROR #0 means RRX.
        assert_eq!(
            shift_immediate(ShiftKind::Ror, 0, RM, true),
            r(0xC000_0000, true)
        );
        assert_eq!(
            shift_immediate(ShiftKind::Ror, 0, 0x0000_0002, false),
            r(0x0000_0001, false)
        );
    }

    #[test]
    fn immediate_form_matches_register_form_for_1_to_31() {
        for kind in [ShiftKind::Lsl, ShiftKind::Lsr, ShiftKind::Asr, ShiftKind::Ror] {
            for amount in [1, 31] {
                assert_eq!(
                    shift_immediate(kind, amount, RM, false),
                    shift_register(kind, amount, RM, false)
                );
            }
        }
    }

    #[test]
    fn rotated_immediate_carry() {
        assert_eq!(rotated_immediate(0xFF, 0, true), r(0xFF, true));
        assert_eq!(rotated_immediate(0x02, 1, false), r(0x8000_0000, true));
        assert_eq!(rotated_immediate(0xFF, 4, true), r(0xFF00_0000, true));
        assert_eq!(rotated_immediate(0xFF, 12, true), r(0x0000_FF00, false));
    }

    #[test]
    fn adder_flags() {
        let res = add_with_carry(0x7FFF_FFFF, 1, false);
        assert_eq!(res.result, 0x8000_0000);
        assert!(res.overflow && res.sign && !res.carry && !res.zero);

        let res = add_with_carry(0xFFFF_FFFF, 1, false);
        assert!(res.zero && res.carry && !res.overflow);

        let res = sub_with_carry(5, 5, true);
        assert!(res.zero && res.carry);

        let res = sub_with_carry(3, 5, true);
        assert_eq!(res.result, (-2_i32) as u32);
        assert!(!res.carry && res.sign);

        let res = sub_with_carry(0x8000_0000, 1, true);
        assert!(res.overflow && res.carry);
    }

    #[test]
    fn multiplier_early_termination() {
        assert_eq!(multiply_cycles(0xFF, false), 1);
        assert_eq!(multiply_cycles(0xFFFF_FF80, true), 1);
        assert_eq!(multiply_cycles(0xFFFF_FF80, false), 4);
        assert_eq!(multiply_cycles(0x1234, false), 2);
        assert_eq!(multiply_cycles(0x12_3456, false), 3);
        assert_eq!(multiply_cycles(0x1234_5678, true), 4);
    }
}
