use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::flags::ShiftKind;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum ArmModeAluInstruction {
    And = 0x0,
    Eor = 0x1,
    Sub = 0x2,
    Rsb = 0x3,
    Add = 0x4,
    Adc = 0x5,
    Sbc = 0x6,
    Rsc = 0x7,
    Tst = 0x8,
    Teq = 0x9,
    Cmp = 0xA,
    Cmn = 0xB,
    Orr = 0xC,
    Mov = 0xD,
    Bic = 0xE,
    Mvn = 0xF,
}

impl Display for ArmModeAluInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::And => f.write_str("AND"),
            Self::Eor => f.write_str("EOR"),
            Self::Sub => f.write_str("SUB"),
            Self::Rsb => f.write_str("RSB"),
            Self::Add => f.write_str("ADD"),
            Self::Adc => f.write_str("ADC"),
            Self::Sbc => f.write_str("SBC"),
            Self::Rsc => f.write_str("RSC"),
            Self::Tst => f.write_str("TST"),
            Self::Teq => f.write_str("TEQ"),
            Self::Cmp => f.write_str("CMP"),
            Self::Cmn => f.write_str("CMN"),
            Self::Orr => f.write_str("ORR"),
            Self::Mov => f.write_str("MOV"),
            Self::Bic => f.write_str("BIC"),
            Self::Mvn => f.write_str("MVN"),
        }
    }
}

#[derive(Eq, PartialEq, Debug)]
pub enum AluInstructionKind {
    /// C comes from the shifter, V is untouched.
    Logical,
    /// All four flags come from the adder.
    Arithmetic,
}

pub trait Kind {
    fn kind(&self) -> AluInstructionKind;
}

impl Kind for ArmModeAluInstruction {
    fn kind(&self) -> AluInstructionKind {
        use ArmModeAluInstruction::{
            Adc, Add, And, Bic, Cmn, Cmp, Eor, Mov, Mvn, Orr, Rsb, Rsc, Sbc, Sub, Teq, Tst,
        };
        match &self {
            And | Eor | Tst | Teq | Orr | Mov | Bic | Mvn => AluInstructionKind::Logical,
            Sub | Rsb | Add | Adc | Sbc | Rsc | Cmp | Cmn => AluInstructionKind::Arithmetic,
        }
    }
}

impl ArmModeAluInstruction {
    /// TST, TEQ, CMP and CMN only set flags.
    #[must_use]
    pub const fn writes_result(self) -> bool {
        !matches!(self, Self::Tst | Self::Teq | Self::Cmp | Self::Cmn)
    }

    /// MOV and MVN ignore Rn.
    #[must_use]
    pub const fn uses_rn(self) -> bool {
        !matches!(self, Self::Mov | Self::Mvn)
    }
}

impl From<u32> for ArmModeAluInstruction {
    fn from(alu_op_code: u32) -> Self {
        use ArmModeAluInstruction::{
            Adc, Add, And, Bic, Cmn, Cmp, Eor, Mov, Mvn, Orr, Rsb, Rsc, Sbc, Sub, Teq, Tst,
        };
        match alu_op_code & 0xF {
            0x0 => And,
            0x1 => Eor,
            0x2 => Sub,
            0x3 => Rsb,
            0x4 => Add,
            0x5 => Adc,
            0x6 => Sbc,
            0x7 => Rsc,
            0x8 => Tst,
            0x9 => Teq,
            0xA => Cmp,
            0xB => Cmn,
            0xC => Orr,
            0xD => Mov,
            0xE => Bic,
            _ => Mvn,
        }
    }
}

/// Where the shift amount of a register operand comes from.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum ShiftOperator {
    /// 5-bit amount in bits 11-7.
    Immediate(u32),
    /// Bottom byte of a register (bits 11-8). Costs one internal cycle.
    Register(usize),
}

impl Display for ShiftOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate(amount) => write!(f, "#{amount}"),
            Self::Register(register) => write!(f, "R{register}"),
        }
    }
}

/// Operand 2 of data processing.
///
/// ```text
/// I=1:  11-8 rotate  7-0 immediate
/// I=0:  11-7 amount  6-5 type  4=0  3-0 Rm
///       11-8 Rs      7=0  6-5 type  4=1  3-0 Rm
/// ```
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum AluSecondOperandInfo {
    Register {
        shift_op: ShiftOperator,
        shift_kind: ShiftKind,
        register: usize,
    },
    Immediate {
        base: u32,
        shift: u32,
    },
}

impl From<u32> for AluSecondOperandInfo {
    fn from(op_code: u32) -> Self {
        if op_code.get_bit(25) {
            Self::Immediate {
                base: op_code.get_bits(0..=7),
                shift: op_code.get_bits(8..=11),
            }
        } else {
            let shift_op = if op_code.get_bit(4) {
                ShiftOperator::Register(op_code.get_bits(8..=11) as usize)
            } else {
                ShiftOperator::Immediate(op_code.get_bits(7..=11))
            };
            Self::Register {
                shift_op,
                shift_kind: ShiftKind::from(op_code.get_bits(5..=6)),
                register: op_code.get_bits(0..=3) as usize,
            }
        }
    }
}

impl Display for AluSecondOperandInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate { base, shift } => write!(f, "#{}", base.rotate_right(shift * 2)),
            Self::Register {
                shift_op: ShiftOperator::Immediate(0),
                shift_kind: ShiftKind::Lsl,
                register,
            } => write!(f, "R{register}"),
            Self::Register {
                shift_op,
                shift_kind,
                register,
            } => write!(f, "R{register}, {shift_kind} {shift_op}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum PsrKind {
    Cpsr,
    Spsr,
}

impl From<bool> for PsrKind {
    fn from(spsr: bool) -> Self {
        if spsr { Self::Spsr } else { Self::Cpsr }
    }
}

impl Display for PsrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpsr => f.write_str("CPSR"),
            Self::Spsr => f.write_str("SPSR"),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum MsrOperand {
    Register(usize),
    Immediate(u32),
}

impl Display for MsrOperand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register(register) => write!(f, "R{register}"),
            Self::Immediate(value) => write!(f, "#0x{value:X}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum PsrOpKind {
    Mrs {
        destination_register: usize,
    },
    /// `field_mask` is bits 19-16: flags, status, extension, control.
    Msr {
        field_mask: u32,
        operand: MsrOperand,
    },
}
