//! # ARM Instruction Decoding
//!
//! This module decodes 32-bit ARM instructions into their component
//! fields and classifies them by type.
//!
//! ## Instruction Categories
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    ARM Instruction Categories                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Bits 27-25 determine the basic category:                               │
//! │                                                                         │
//! │  000 + special patterns  →  BX, SWP, Multiply, Halfword, MRS/MSR        │
//! │  00x                     →  Data Processing                             │
//! │  011 + bit 4             →  Undefined                                   │
//! │  01x                     →  Load/Store                                  │
//! │  100                     →  Block Data Transfer (LDM/STM)               │
//! │  101                     →  Branch (B/BL)                               │
//! │  110, 1110               →  Coprocessor (no coprocessor on the GBA)     │
//! │  1111                    →  Software Interrupt                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Decoding Priority
//!
//! Some instructions overlap with data processing. The decoder checks them
//! in this order:
//!
//! 1. Branch and Exchange (BX)
//! 2. Single Data Swap (SWP/SWPB)
//! 3. Multiply (MUL, MLA)
//! 4. Multiply Long (UMULL, SMULL, UMLAL, SMLAL)
//! 5. Halfword Data Transfer (LDRH, STRH, LDRSB, LDRSH)
//! 6. PSR Transfer (MRS, MSR), the TST/TEQ/CMP/CMN encodings with S=0
//! 7. Data Processing
//! 8. Undefined, Load/Store, LDM/STM, Branch, Coprocessor, SWI

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::arm::alu_instruction::{
    AluSecondOperandInfo, ArmModeAluInstruction, MsrOperand, PsrKind, PsrOpKind,
};
use crate::cpu::condition::Condition;
use crate::cpu::flags::{
    HalfwordDataTransferOffsetKind, HalfwordTransferKind, Indexing, LoadStoreKind, Offsetting,
    ReadWriteKind, ShiftKind,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SingleDataTransferOffsetInfo {
    Immediate {
        offset: u32,
    },
    RegisterImmediate {
        shift_amount: u32,
        shift_kind: ShiftKind,
        reg_offset: usize,
    },
}

impl From<u32> for SingleDataTransferOffsetInfo {
    fn from(op_code: u32) -> Self {
        if op_code.get_bit(25) {
            Self::RegisterImmediate {
                shift_amount: op_code.get_bits(7..=11),
                shift_kind: ShiftKind::from(op_code.get_bits(5..=6)),
                reg_offset: op_code.get_bits(0..=3) as usize,
            }
        } else {
            Self::Immediate {
                offset: op_code.get_bits(0..=11),
            }
        }
    }
}

impl std::fmt::Display for SingleDataTransferOffsetInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate { offset } => write!(f, "#{offset}"),
            Self::RegisterImmediate {
                shift_amount: 0,
                shift_kind: ShiftKind::Lsl,
                reg_offset,
            } => write!(f, "R{reg_offset}"),
            Self::RegisterImmediate {
                shift_amount,
                shift_kind,
                reg_offset,
            } => write!(f, "R{reg_offset}, {shift_kind} #{shift_amount}"),
        }
    }
}

/// All ARM instruction types after decoding.
///
/// | Variant                | Example Instructions       |
/// |------------------------|----------------------------|
/// | `DataProcessing`       | AND, ADD, CMP, MOV         |
/// | `Multiply`             | MUL, MLA                   |
/// | `MultiplyLong`         | UMULL, SMLAL               |
/// | `PsrTransfer`          | MRS, MSR                   |
/// | `SingleDataSwap`       | SWP, SWPB                  |
/// | `BranchAndExchange`    | BX                         |
/// | `HalfwordDataTransfer` | LDRH, STRH, LDRSB, LDRSH   |
/// | `SingleDataTransfer`   | LDR, STR, LDRB, STRB       |
/// | `BlockDataTransfer`    | LDM, STM, PUSH, POP        |
/// | `Branch`               | B, BL                      |
/// | `SoftwareInterrupt`    | SWI                        |
/// | `Coprocessor`          | CDP, LDC, STC, MRC, MCR    |
/// | `Undefined`            | -                          |
#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum ArmModeInstruction {
    DataProcessing {
        condition: Condition,
        alu_instruction: ArmModeAluInstruction,
        set_conditions: bool,
        rn: usize,
        destination: usize,
        op2: AluSecondOperandInfo,
    },
    Multiply {
        condition: Condition,
        accumulate: bool,
        set_conditions: bool,
        destination: usize,
        accumulator: usize,
        rs: usize,
        rm: usize,
    },
    MultiplyLong {
        condition: Condition,
        signed: bool,
        accumulate: bool,
        set_conditions: bool,
        rd_hi: usize,
        rd_lo: usize,
        rs: usize,
        rm: usize,
    },
    PsrTransfer {
        condition: Condition,
        psr_kind: PsrKind,
        kind: PsrOpKind,
    },
    SingleDataSwap {
        condition: Condition,
        quantity: ReadWriteKind,
        rn: usize,
        rd: usize,
        rm: usize,
    },
    BranchAndExchange {
        condition: Condition,
        register: usize,
    },
    HalfwordDataTransfer {
        condition: Condition,
        indexing: Indexing,
        offsetting: Offsetting,
        write_back: bool,
        load_store_kind: LoadStoreKind,
        offset_kind: HalfwordDataTransferOffsetKind,
        base_register: usize,
        source_destination_register: usize,
        transfer_kind: HalfwordTransferKind,
    },
    SingleDataTransfer {
        condition: Condition,
        load_store: LoadStoreKind,
        quantity: ReadWriteKind,
        write_back: bool,
        indexing: Indexing,
        rd: usize,
        base_register: usize,
        offset_info: SingleDataTransferOffsetInfo,
        offsetting: Offsetting,
    },
    BlockDataTransfer {
        condition: Condition,
        indexing: Indexing,
        offsetting: Offsetting,
        load_psr: bool,
        write_back: bool,
        load_store: LoadStoreKind,
        rn: usize,
        register_list: u16,
    },
    Branch {
        condition: Condition,
        link: bool,
        /// Signed byte offset from R15.
        offset: i32,
    },
    SoftwareInterrupt {
        condition: Condition,
        comment: u32,
    },
    Coprocessor {
        condition: Condition,
        op_code: u32,
    },
    Undefined {
        condition: Condition,
        op_code: u32,
    },
}

impl From<u32> for ArmModeInstruction {
    #[allow(clippy::too_many_lines)]
    fn from(op_code: u32) -> Self {
        let condition = Condition::from(op_code);
        let reg = |from: u8| op_code.get_bits(from..=from + 3) as usize;

        if op_code & 0x0FFF_FFF0 == 0x012F_FF10 {
            Self::BranchAndExchange {
                condition,
                register: reg(0),
            }
        } else if op_code & 0x0FB0_0FF0 == 0x0100_0090 {
            Self::SingleDataSwap {
                condition,
                quantity: op_code.get_bit(22).into(),
                rn: reg(16),
                rd: reg(12),
                rm: reg(0),
            }
        } else if op_code & 0x0FC0_00F0 == 0x0000_0090 {
            Self::Multiply {
                condition,
                accumulate: op_code.get_bit(21),
                set_conditions: op_code.get_bit(20),
                destination: reg(16),
                accumulator: reg(12),
                rs: reg(8),
                rm: reg(0),
            }
        } else if op_code & 0x0F80_00F0 == 0x0080_0090 {
            Self::MultiplyLong {
                condition,
                signed: op_code.get_bit(22),
                accumulate: op_code.get_bit(21),
                set_conditions: op_code.get_bit(20),
                rd_hi: reg(16),
                rd_lo: reg(12),
                rs: reg(8),
                rm: reg(0),
            }
        } else if op_code & 0x0E00_0090 == 0x0000_0090 && op_code.get_bits(5..=6) != 0 {
            let offset_kind = if op_code.get_bit(22) {
                HalfwordDataTransferOffsetKind::Immediate {
                    offset: (op_code.get_bits(8..=11) << 4) | op_code.get_bits(0..=3),
                }
            } else {
                HalfwordDataTransferOffsetKind::Register { register: reg(0) as u32 }
            };
            let transfer_kind = HalfwordTransferKind::try_from(op_code.get_bits(5..=6))
                .unwrap_or(HalfwordTransferKind::UnsignedHalfwords);

            Self::HalfwordDataTransfer {
                condition,
                indexing: op_code.get_bit(24).into(),
                offsetting: op_code.get_bit(23).into(),
                write_back: op_code.get_bit(21),
                load_store_kind: op_code.get_bit(20).into(),
                offset_kind,
                base_register: reg(16),
                source_destination_register: reg(12),
                transfer_kind,
            }
        } else if op_code & 0x0D90_0000 == 0x0100_0000 {
            let psr_kind = PsrKind::from(op_code.get_bit(22));
            let kind = if op_code.get_bit(21) {
                let operand = if op_code.get_bit(25) {
                    MsrOperand::Immediate(
                        op_code
                            .get_bits(0..=7)
                            .rotate_right(op_code.get_bits(8..=11) * 2),
                    )
                } else {
                    MsrOperand::Register(reg(0))
                };
                PsrOpKind::Msr {
                    field_mask: op_code.get_bits(16..=19),
                    operand,
                }
            } else {
                PsrOpKind::Mrs {
                    destination_register: reg(12),
                }
            };

            Self::PsrTransfer {
                condition,
                psr_kind,
                kind,
            }
        } else if op_code.get_bits(26..=27) == 0b00 {
            Self::DataProcessing {
                condition,
                alu_instruction: ArmModeAluInstruction::from(op_code.get_bits(21..=24)),
                set_conditions: op_code.get_bit(20),
                rn: reg(16),
                destination: reg(12),
                op2: AluSecondOperandInfo::from(op_code),
            }
        } else if op_code & 0x0E00_0010 == 0x0600_0010 {
            Self::Undefined { condition, op_code }
        } else if op_code.get_bits(26..=27) == 0b01 {
            Self::SingleDataTransfer {
                condition,
                load_store: op_code.get_bit(20).into(),
                quantity: op_code.get_bit(22).into(),
                write_back: op_code.get_bit(21),
                indexing: op_code.get_bit(24).into(),
                rd: reg(12),
                base_register: reg(16),
                offset_info: SingleDataTransferOffsetInfo::from(op_code),
                offsetting: op_code.get_bit(23).into(),
            }
        } else if op_code.get_bits(25..=27) == 0b100 {
            Self::BlockDataTransfer {
                condition,
                indexing: op_code.get_bit(24).into(),
                offsetting: op_code.get_bit(23).into(),
                load_psr: op_code.get_bit(22),
                write_back: op_code.get_bit(21),
                load_store: op_code.get_bit(20).into(),
                rn: reg(16),
                register_list: op_code.get_bits(0..=15) as u16,
            }
        } else if op_code.get_bits(25..=27) == 0b101 {
            Self::Branch {
                condition,
                link: op_code.get_bit(24),
                offset: (op_code.get_bits(0..=23) << 2).sign_extended(26) as i32,
            }
        } else if op_code.get_bits(24..=27) == 0b1111 {
            Self::SoftwareInterrupt {
                condition,
                comment: op_code.get_bits(0..=23),
            }
        } else {
            Self::Coprocessor { condition, op_code }
        }
    }
}

impl ArmModeInstruction {
    #[must_use]
    pub const fn condition(&self) -> Condition {
        match *self {
            Self::DataProcessing { condition, .. }
            | Self::Multiply { condition, .. }
            | Self::MultiplyLong { condition, .. }
            | Self::PsrTransfer { condition, .. }
            | Self::SingleDataSwap { condition, .. }
            | Self::BranchAndExchange { condition, .. }
            | Self::HalfwordDataTransfer { condition, .. }
            | Self::SingleDataTransfer { condition, .. }
            | Self::BlockDataTransfer { condition, .. }
            | Self::Branch { condition, .. }
            | Self::SoftwareInterrupt { condition, .. }
            | Self::Coprocessor { condition, .. }
            | Self::Undefined { condition, .. } => condition,
        }
    }

    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn disassembler(&self) -> String {
        match self {
            Self::DataProcessing {
                condition,
                alu_instruction,
                set_conditions,
                rn,
                destination,
                op2,
            } => {
                let set_string = if *set_conditions { "S" } else { "" };
                if !alu_instruction.writes_result() {
                    format!("{alu_instruction}{condition} R{rn}, {op2}")
                } else if !alu_instruction.uses_rn() {
                    format!("{alu_instruction}{condition}{set_string} R{destination}, {op2}")
                } else {
                    format!(
                        "{alu_instruction}{condition}{set_string} R{destination}, R{rn}, {op2}"
                    )
                }
            }
            Self::Multiply {
                condition,
                accumulate,
                set_conditions,
                destination,
                accumulator,
                rs,
                rm,
            } => {
                let s = if *set_conditions { "S" } else { "" };
                if *accumulate {
                    format!("MLA{condition}{s} R{destination}, R{rm}, R{rs}, R{accumulator}")
                } else {
                    format!("MUL{condition}{s} R{destination}, R{rm}, R{rs}")
                }
            }
            Self::MultiplyLong {
                condition,
                signed,
                accumulate,
                set_conditions,
                rd_hi,
                rd_lo,
                rs,
                rm,
            } => {
                let sign = if *signed { "S" } else { "U" };
                let op = if *accumulate { "MLAL" } else { "MULL" };
                let s = if *set_conditions { "S" } else { "" };
                format!("{sign}{op}{condition}{s} R{rd_lo}, R{rd_hi}, R{rm}, R{rs}")
            }
            Self::PsrTransfer {
                condition,
                psr_kind,
                kind,
            } => match kind {
                PsrOpKind::Mrs {
                    destination_register,
                } => format!("MRS{condition} R{destination_register}, {psr_kind}"),
                PsrOpKind::Msr {
                    field_mask,
                    operand,
                } => {
                    let fields: String = [(3, 'f'), (2, 's'), (1, 'x'), (0, 'c')]
                        .into_iter()
                        .filter(|(bit, _)| field_mask.get_bit(*bit))
                        .map(|(_, name)| name)
                        .collect();
                    format!("MSR{condition} {psr_kind}_{fields}, {operand}")
                }
            },
            Self::SingleDataSwap {
                condition,
                quantity,
                rn,
                rd,
                rm,
            } => {
                let b = if *quantity == ReadWriteKind::Byte { "B" } else { "" };
                format!("SWP{condition}{b} R{rd}, R{rm}, [R{rn}]")
            }
            Self::BranchAndExchange {
                condition,
                register,
            } => format!("BX{condition} R{register}"),
            Self::HalfwordDataTransfer {
                condition,
                indexing,
                offsetting,
                load_store_kind,
                transfer_kind,
                source_destination_register,
                offset_kind,
                base_register,
                write_back,
            } => {
                let sign = match offsetting {
                    Offsetting::Up => "",
                    Offsetting::Down => "-",
                };
                let offset = match offset_kind {
                    HalfwordDataTransferOffsetKind::Immediate { offset: 0 } => String::new(),
                    HalfwordDataTransferOffsetKind::Immediate { offset } => {
                        format!(", #{sign}{offset}")
                    }
                    HalfwordDataTransferOffsetKind::Register { register } => {
                        format!(", {sign}R{register}")
                    }
                };
                let address =
                    format_address(*base_register, &offset, *indexing, *write_back);
                format!(
                    "{load_store_kind}{condition}{transfer_kind} R{source_destination_register}, {address}"
                )
            }
            Self::SingleDataTransfer {
                condition,
                load_store,
                quantity,
                write_back,
                indexing,
                rd,
                base_register,
                offset_info,
                offsetting,
            } => {
                let b = if *quantity == ReadWriteKind::Byte { "B" } else { "" };
                let sign = match offsetting {
                    Offsetting::Up => "",
                    Offsetting::Down => "-",
                };
                let offset = match offset_info {
                    SingleDataTransferOffsetInfo::Immediate { offset: 0 } => String::new(),
                    SingleDataTransferOffsetInfo::Immediate { offset } => {
                        format!(", #{sign}{offset}")
                    }
                    register => format!(", {sign}{register}"),
                };
                let address = format_address(*base_register, &offset, *indexing, *write_back);
                format!("{load_store}{condition}{b} R{rd}, {address}")
            }
            Self::BlockDataTransfer {
                condition,
                indexing,
                offsetting,
                load_psr,
                write_back,
                load_store,
                rn,
                register_list,
            } => {
                let op = match load_store {
                    LoadStoreKind::Store => "STM",
                    LoadStoreKind::Load => "LDM",
                };
                let offset_modifier = match offsetting {
                    Offsetting::Down => "D",
                    Offsetting::Up => "I",
                };
                let index_type = match indexing {
                    Indexing::Pre => "B",
                    Indexing::Post => "A",
                };
                let registers = (0..16)
                    .filter(|i| register_list.get_bit(*i))
                    .map(|i| format!("R{i}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let w = if *write_back { "!" } else { "" };
                let user = if *load_psr { "^" } else { "" };

                format!(
                    "{op}{condition}{offset_modifier}{index_type} R{rn}{w}, {{{registers}}}{user}"
                )
            }
            Self::Branch {
                condition,
                link,
                offset,
            } => {
                let l = if *link { "L" } else { "" };
                format!("B{l}{condition} #{offset}")
            }
            Self::SoftwareInterrupt { condition, comment } => {
                format!("SWI{condition} 0x{:02X}", comment.get_bits(16..=23))
            }
            Self::Coprocessor { condition, op_code } => {
                format!("CP{condition} 0x{op_code:08X}")
            }
            Self::Undefined { condition, op_code } => {
                format!("UND{condition} 0x{op_code:08X}")
            }
        }
    }
}

fn format_address(base: usize, offset: &str, indexing: Indexing, write_back: bool) -> String {
    match indexing {
        Indexing::Pre => {
            let w = if write_back { "!" } else { "" };
            format!("[R{base}{offset}]{w}")
        }
        Indexing::Post => format!("[R{base}]{offset}"),
    }
}

impl std::fmt::Display for ArmModeInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.disassembler())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::arm::alu_instruction::ShiftOperator;
    use pretty_assertions::assert_eq;

    #[test]
    fn decode_data_processing() {
        let op = ArmModeInstruction::from(0xE081_0182);
        assert_eq!(
            op,
            ArmModeInstruction::DataProcessing {
                condition: Condition::AL,
                alu_instruction: ArmModeAluInstruction::Add,
                set_conditions: false,
                rn: 1,
                destination: 0,
                op2: AluSecondOperandInfo::Register {
                    shift_op: ShiftOperator::Immediate(3),
                    shift_kind: ShiftKind::Lsl,
                    register: 2,
                },
            }
        );
        assert_eq!(op.to_string(), "ADD R0, R1, R2, LSL #3");
    }

    #[test]
    fn decode_branch_and_exchange() {
        let op = ArmModeInstruction::from(0xE12F_FF11);
        assert_eq!(
            op,
            ArmModeInstruction::BranchAndExchange {
                condition: Condition::AL,
                register: 1,
            }
        );
        assert_eq!(op.to_string(), "BX R1");
    }

    #[test]
    fn decode_branch_backwards() {
        // b . (offset -8)
        let op = ArmModeInstruction::from(0xEAFF_FFFE);
        assert_eq!(
            op,
            ArmModeInstruction::Branch {
                condition: Condition::AL,
                link: false,
                offset: -8,
            }
        );
    }

    #[test]
    fn decode_multiplies() {
        assert_eq!(
            ArmModeInstruction::from(0xE002_0193),
            ArmModeInstruction::Multiply {
                condition: Condition::AL,
                accumulate: false,
                set_conditions: false,
                destination: 2,
                accumulator: 0,
                rs: 1,
                rm: 3,
            }
        );
        assert_eq!(
            ArmModeInstruction::from(0xE0C1_0392).to_string(),
            "SMULL R0, R1, R2, R3"
        );
    }

    #[test]
    fn decode_psr_transfers() {
        assert_eq!(
            ArmModeInstruction::from(0xE10F_0000).to_string(),
            "MRS R0, CPSR"
        );
        assert_eq!(
            ArmModeInstruction::from(0xE129_F000).to_string(),
            "MSR CPSR_fc, R0"
        );
        assert_eq!(
            ArmModeInstruction::from(0xE328_F20F),
            ArmModeInstruction::PsrTransfer {
                condition: Condition::AL,
                psr_kind: PsrKind::Cpsr,
                kind: PsrOpKind::Msr {
                    field_mask: 0b1000,
                    operand: MsrOperand::Immediate(0xF000_0000),
                },
            }
        );
    }

    #[test]
    fn decode_transfers() {
        assert_eq!(
            ArmModeInstruction::from(0xE591_0004).to_string(),
            "LDR R0, [R1, #4]"
        );
        assert_eq!(
            ArmModeInstruction::from(0xE1D1_00B2).to_string(),
            "LDRH R0, [R1, #2]"
        );
        assert_eq!(
            ArmModeInstruction::from(0xE92D_500F).to_string(),
            "STMDB R13!, {R0, R1, R2, R3, R12, R14}"
        );
        assert_eq!(
            ArmModeInstruction::from(0xE101_0092).to_string(),
            "SWP R0, R2, [R1]"
        );
    }

    #[test]
    fn decode_swi_undefined_and_coprocessor() {
        assert_eq!(ArmModeInstruction::from(0xEF06_0000).to_string(), "SWI 0x06");
        assert!(matches!(
            ArmModeInstruction::from(0xE600_0010),
            ArmModeInstruction::Undefined { .. }
        ));
        assert!(matches!(
            ArmModeInstruction::from(0xEE01_0F10),
            ArmModeInstruction::Coprocessor { .. }
        ));
    }
}
