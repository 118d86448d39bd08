//! # Thumb Instruction Decoding
//!
//! This module handles decoding 16-bit Thumb instructions.
//!
//! ## Thumb Instruction Formats
//!
//! Thumb instructions are grouped into 19 formats, identified by their high bits:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Thumb Instruction Formats                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  Format 1:  000 xx          Move shifted register                       │
//! │  Format 2:  00011           Add/subtract                                │
//! │  Format 3:  001 xx          Move/compare/add/subtract immediate         │
//! │  Format 4:  010000          ALU operations                              │
//! │  Format 5:  010001          Hi register operations / BX                 │
//! │  Format 6:  01001           PC-relative load                            │
//! │  Format 7:  0101 xx0        Load/store with register offset             │
//! │  Format 8:  0101 xx1        Load/store sign-extended byte/halfword      │
//! │  Format 9:  011 xx          Load/store with immediate offset            │
//! │  Format 10: 1000 x          Load/store halfword                         │
//! │  Format 11: 1001 x          SP-relative load/store                      │
//! │  Format 12: 1010 x          Load address                                │
//! │  Format 13: 10110000        Add offset to stack pointer                 │
//! │  Format 14: 1011 x10x       Push/pop registers                          │
//! │  Format 15: 1100 x          Multiple load/store                         │
//! │  Format 16: 1101 xxxx       Conditional branch                          │
//! │  Format 17: 11011111        Software interrupt                          │
//! │  Format 18: 11100           Unconditional branch                        │
//! │  Format 19: 1111 x          Long branch with link                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Long Branch (BL)
//!
//! The BL instruction spans ±4MB but requires two 16-bit instructions:
//!
//! ```text
//! First:  1111 0xxx xxxx xxxx  ; LR = PC + (offset_hi << 12)
//! Second: 1111 1xxx xxxx xxxx  ; PC = LR + (offset_lo << 1), LR = next | 1
//! ```
//!
//! The first half only stages the high offset in LR; nothing branches until
//! the second half runs.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::condition::Condition;
use crate::cpu::flags::{LoadStoreKind, OperandKind, ReadWriteKind, ShiftKind};
use crate::cpu::thumb::alu_instructions::{
    MoveCompareOperation, ThumbHighRegisterOperation, ThumbModeAluInstruction,
};

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum Instruction {
    MoveShiftedRegister {
        shift_operation: ShiftKind,
        offset5: u32,
        source_register: usize,
        destination_register: usize,
    },
    AddSubtract {
        operation_kind: OperandKind,
        subtract: bool,
        rn_offset3: u32,
        source_register: usize,
        destination_register: usize,
    },
    MoveCompareAddSubtractImm {
        operation: MoveCompareOperation,
        destination_register: usize,
        offset: u32,
    },
    AluOp {
        alu_operation: ThumbModeAluInstruction,
        source_register: usize,
        destination_register: usize,
    },
    HiRegisterOpBX {
        register_operation: ThumbHighRegisterOperation,
        source_register: usize,
        destination_register: usize,
    },
    PCRelativeLoad {
        destination_register: usize,
        offset: u32,
    },
    LoadStoreRegisterOffset {
        load_store: LoadStoreKind,
        byte_word: ReadWriteKind,
        offset_register: usize,
        base_register: usize,
        destination_register: usize,
    },
    LoadStoreSignExtByteHalfword {
        h: bool,
        sign_extend_flag: bool,
        offset_register: usize,
        base_register: usize,
        destination_register: usize,
    },
    LoadStoreImmOffset {
        load_store: LoadStoreKind,
        byte_word: ReadWriteKind,
        offset: u32,
        base_register: usize,
        destination_register: usize,
    },
    LoadStoreHalfword {
        load_store: LoadStoreKind,
        offset: u32,
        base_register: usize,
        source_destination_register: usize,
    },
    SPRelativeLoadStore {
        load_store: LoadStoreKind,
        destination_register: usize,
        offset: u32,
    },
    LoadAddress {
        sp: bool,
        destination_register: usize,
        offset: u32,
    },
    AddOffsetSP {
        negative: bool,
        offset: u32,
    },
    PushPopReg {
        load_store: LoadStoreKind,
        pc_lr: bool,
        register_list: u16,
    },
    MultipleLoadStore {
        load_store: LoadStoreKind,
        base_register: usize,
        register_list: u16,
    },
    CondBranch {
        condition: Condition,
        immediate_offset: i32,
    },
    Swi {
        comment: u8,
    },
    UncondBranch {
        offset: i32,
    },
    LongBranchLink {
        h: bool,
        offset: u32,
    },
    /// Unallocated encodings, executed as NOP.
    Undefined {
        op_code: u16,
    },
}

impl From<u16> for Instruction {
    #[allow(clippy::too_many_lines)]
    fn from(op_code: u16) -> Self {
        use Instruction::{
            AddOffsetSP, AddSubtract, AluOp, CondBranch, HiRegisterOpBX, LoadAddress,
            LoadStoreHalfword, LoadStoreImmOffset, LoadStoreRegisterOffset,
            LoadStoreSignExtByteHalfword, LongBranchLink, MoveCompareAddSubtractImm,
            MoveShiftedRegister, MultipleLoadStore, PCRelativeLoad, PushPopReg,
            SPRelativeLoadStore, Swi, UncondBranch, Undefined,
        };

        let reg = |from: u8| usize::from(op_code.get_bits(from..=from + 2));
        let bits = |range| u32::from(op_code.get_bits(range));

        match op_code.get_bits(13..=15) {
            0b000 if op_code.get_bits(11..=12) == 0b11 => AddSubtract {
                operation_kind: op_code.get_bit(10).into(),
                subtract: op_code.get_bit(9),
                rn_offset3: bits(6..=8),
                source_register: reg(3),
                destination_register: reg(0),
            },
            0b000 => MoveShiftedRegister {
                shift_operation: ShiftKind::from(bits(11..=12)),
                offset5: bits(6..=10),
                source_register: reg(3),
                destination_register: reg(0),
            },
            0b001 => MoveCompareAddSubtractImm {
                operation: op_code.get_bits(11..=12).into(),
                destination_register: reg(8),
                offset: bits(0..=7),
            },
            0b010 => match op_code.get_bits(10..=12) {
                0b000 => AluOp {
                    alu_operation: op_code.get_bits(6..=9).into(),
                    source_register: reg(3),
                    destination_register: reg(0),
                },
                0b001 => HiRegisterOpBX {
                    register_operation: op_code.get_bits(8..=9).into(),
                    source_register: usize::from(op_code.get_bits(3..=6)),
                    destination_register: reg(0) | (usize::from(op_code.get_bit(7)) << 3),
                },
                0b010 | 0b011 => PCRelativeLoad {
                    destination_register: reg(8),
                    offset: bits(0..=7) << 2,
                },
                _ if !op_code.get_bit(9) => LoadStoreRegisterOffset {
                    load_store: op_code.get_bit(11).into(),
                    byte_word: op_code.get_bit(10).into(),
                    offset_register: reg(6),
                    base_register: reg(3),
                    destination_register: reg(0),
                },
                _ => LoadStoreSignExtByteHalfword {
                    h: op_code.get_bit(11),
                    sign_extend_flag: op_code.get_bit(10),
                    offset_register: reg(6),
                    base_register: reg(3),
                    destination_register: reg(0),
                },
            },
            0b011 => {
                let byte_word = ReadWriteKind::from(op_code.get_bit(12));
                let offset = match byte_word {
                    ReadWriteKind::Word => bits(6..=10) << 2,
                    ReadWriteKind::Byte => bits(6..=10),
                };
                LoadStoreImmOffset {
                    load_store: op_code.get_bit(11).into(),
                    byte_word,
                    offset,
                    base_register: reg(3),
                    destination_register: reg(0),
                }
            }
            0b100 if !op_code.get_bit(12) => LoadStoreHalfword {
                load_store: op_code.get_bit(11).into(),
                offset: bits(6..=10) << 1,
                base_register: reg(3),
                source_destination_register: reg(0),
            },
            0b100 => SPRelativeLoadStore {
                load_store: op_code.get_bit(11).into(),
                destination_register: reg(8),
                offset: bits(0..=7) << 2,
            },
            0b101 if !op_code.get_bit(12) => LoadAddress {
                sp: op_code.get_bit(11),
                destination_register: reg(8),
                offset: bits(0..=7) << 2,
            },
            0b101 if op_code.get_bits(8..=11) == 0b0000 => AddOffsetSP {
                negative: op_code.get_bit(7),
                offset: bits(0..=6) << 2,
            },
            0b101 if op_code.get_bits(9..=10) == 0b10 => PushPopReg {
                load_store: op_code.get_bit(11).into(),
                pc_lr: op_code.get_bit(8),
                register_list: op_code.get_bits(0..=7),
            },
            0b110 if !op_code.get_bit(12) => MultipleLoadStore {
                load_store: op_code.get_bit(11).into(),
                base_register: reg(8),
                register_list: op_code.get_bits(0..=7),
            },
            0b110 => match op_code.get_bits(8..=11) {
                0b1111 => Swi {
                    comment: op_code.get_bits(0..=7) as u8,
                },
                0b1110 => Undefined { op_code },
                condition => CondBranch {
                    condition: Condition::from(condition as u8),
                    immediate_offset: (bits(0..=7) << 1).sign_extended(9) as i32,
                },
            },
            0b111 => match op_code.get_bits(11..=12) {
                0b00 => UncondBranch {
                    offset: (bits(0..=10) << 1).sign_extended(12) as i32,
                },
                0b01 => Undefined { op_code },
                high_or_low => LongBranchLink {
                    h: high_or_low == 0b11,
                    offset: bits(0..=10),
                },
            },
            _ => Undefined { op_code },
        }
    }
}

impl Instruction {
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn disassembler(&self) -> String {
        match self {
            Self::MoveShiftedRegister {
                shift_operation,
                offset5,
                source_register,
                destination_register,
            } => format!("{shift_operation} R{destination_register}, R{source_register}, #{offset5}"),
            Self::AddSubtract {
                operation_kind,
                subtract,
                rn_offset3,
                source_register,
                destination_register,
            } => {
                let op = if *subtract { "SUB" } else { "ADD" };
                let operand = match operation_kind {
                    OperandKind::Immediate => format!("#{rn_offset3}"),
                    OperandKind::Register => format!("R{rn_offset3}"),
                };
                format!("{op} R{destination_register}, R{source_register}, {operand}")
            }
            Self::MoveCompareAddSubtractImm {
                operation,
                destination_register,
                offset,
            } => format!("{operation} R{destination_register}, #{offset}"),
            Self::AluOp {
                alu_operation,
                source_register,
                destination_register,
            } => format!("{alu_operation} R{destination_register}, R{source_register}"),
            Self::HiRegisterOpBX {
                register_operation: ThumbHighRegisterOperation::Bx,
                source_register,
                ..
            } => format!("BX R{source_register}"),
            Self::HiRegisterOpBX {
                register_operation,
                source_register,
                destination_register,
            } => format!("{register_operation} R{destination_register}, R{source_register}"),
            Self::PCRelativeLoad {
                destination_register,
                offset,
            } => format!("LDR R{destination_register}, [PC, #{offset}]"),
            Self::LoadStoreRegisterOffset {
                load_store,
                byte_word,
                offset_register,
                base_register,
                destination_register,
            } => {
                let b = if *byte_word == ReadWriteKind::Byte { "B" } else { "" };
                format!(
                    "{load_store}{b} R{destination_register}, [R{base_register}, R{offset_register}]"
                )
            }
            Self::LoadStoreSignExtByteHalfword {
                h,
                sign_extend_flag,
                offset_register,
                base_register,
                destination_register,
            } => {
                let op = match (sign_extend_flag, h) {
                    (false, false) => "STRH",
                    (false, true) => "LDRH",
                    (true, false) => "LDSB",
                    (true, true) => "LDSH",
                };
                format!("{op} R{destination_register}, [R{base_register}, R{offset_register}]")
            }
            Self::LoadStoreImmOffset {
                load_store,
                byte_word,
                offset,
                base_register,
                destination_register,
            } => {
                let b = if *byte_word == ReadWriteKind::Byte { "B" } else { "" };
                format!("{load_store}{b} R{destination_register}, [R{base_register}, #{offset}]")
            }
            Self::LoadStoreHalfword {
                load_store,
                offset,
                base_register,
                source_destination_register,
            } => format!(
                "{load_store}H R{source_destination_register}, [R{base_register}, #{offset}]"
            ),
            Self::SPRelativeLoadStore {
                load_store,
                destination_register,
                offset,
            } => format!("{load_store} R{destination_register}, [SP, #{offset}]"),
            Self::LoadAddress {
                sp,
                destination_register,
                offset,
            } => {
                let base = if *sp { "SP" } else { "PC" };
                format!("ADD R{destination_register}, {base}, #{offset}")
            }
            Self::AddOffsetSP { negative, offset } => {
                let sign = if *negative { "-" } else { "" };
                format!("ADD SP, #{sign}{offset}")
            }
            Self::PushPopReg {
                load_store,
                pc_lr,
                register_list,
            } => {
                let (op, extra) = match load_store {
                    LoadStoreKind::Store => ("PUSH", "LR"),
                    LoadStoreKind::Load => ("POP", "PC"),
                };
                let mut registers = register_names(*register_list);
                if *pc_lr {
                    registers.push(extra.to_string());
                }
                format!("{op} {{{}}}", registers.join(", "))
            }
            Self::MultipleLoadStore {
                load_store,
                base_register,
                register_list,
            } => {
                let op = match load_store {
                    LoadStoreKind::Store => "STMIA",
                    LoadStoreKind::Load => "LDMIA",
                };
                format!(
                    "{op} R{base_register}!, {{{}}}",
                    register_names(*register_list).join(", ")
                )
            }
            Self::CondBranch {
                condition,
                immediate_offset,
            } => format!("B{condition} #{immediate_offset}"),
            Self::Swi { comment } => format!("SWI 0x{comment:02X}"),
            Self::UncondBranch { offset } => format!("B #{offset}"),
            Self::LongBranchLink { h: false, offset } => {
                format!("BL (high) #0x{offset:03X}")
            }
            Self::LongBranchLink { h: true, offset } => format!("BL (low) #0x{offset:03X}"),
            Self::Undefined { op_code } => format!("UND 0x{op_code:04X}"),
        }
    }
}

fn register_names(list: u16) -> Vec<String> {
    (0..8)
        .filter(|i| list.get_bit(*i))
        .map(|i| format!("R{i}"))
        .collect()
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.disassembler())
    }
}
