//! Execution of decoded THUMB instructions.
//!
//! Loads, stores and block transfers are expressed as their ARM
//! equivalents and share the ARM helpers, so alignment, rotation and
//! write-back rules are the same in both states.

use crate::bitwise::Bits;
use crate::bus::Bus;
use crate::cpu::alu::{
    ArithmeticOpResult, add_with_carry, multiply_cycles, shift_immediate, shift_register,
    sub_with_carry,
};
use crate::cpu::arm::operations::{BlockTransfer, Transfer};
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::flags::{
    HalfwordTransferKind, Indexing, LoadStoreKind, Offsetting, OperandKind, ReadWriteKind,
    ShiftKind,
};
use crate::cpu::registers::{REG_LR, REG_SP};
use crate::cpu::thumb::alu_instructions::{
    MoveCompareOperation, ThumbHighRegisterOperation, ThumbModeAluInstruction,
};
use crate::cpu::thumb::instruction::Instruction;

impl Arm7tdmi {
    #[allow(clippy::too_many_lines)]
    pub(crate) fn execute_thumb(&mut self, bus: &mut Bus, instruction: Instruction) {
        match instruction {
            Instruction::MoveShiftedRegister {
                shift_operation,
                offset5,
                source_register,
                destination_register,
            } => self.move_shifted_reg(shift_operation, offset5, source_register, destination_register),
            Instruction::AddSubtract {
                operation_kind,
                subtract,
                rn_offset3,
                source_register,
                destination_register,
            } => {
                let operand = match operation_kind {
                    OperandKind::Immediate => rn_offset3,
                    OperandKind::Register => self.read_register(rn_offset3 as usize),
                };
                let rs = self.read_register(source_register);
                let result = if subtract {
                    sub_with_carry(rs, operand, true)
                } else {
                    add_with_carry(rs, operand, false)
                };
                self.write_register(destination_register, result.result);
                self.cpsr.set_flags(&result);
            }
            Instruction::MoveCompareAddSubtractImm {
                operation,
                destination_register,
                offset,
            } => self.move_compare_add_sub_imm(operation, destination_register, offset),
            Instruction::AluOp {
                alu_operation,
                source_register,
                destination_register,
            } => self.alu_op(bus, alu_operation, source_register, destination_register),
            Instruction::HiRegisterOpBX {
                register_operation,
                source_register,
                destination_register,
            } => self.hi_reg_operation_branch_ex(
                register_operation,
                source_register,
                destination_register,
            ),
            Instruction::PCRelativeLoad {
                destination_register,
                offset,
            } => {
                let address = (self.read_register(15) & !3).wrapping_add(offset);
                let value = bus.read_word(address);
                bus.idle(1);
                self.write_register(destination_register, value);
            }
            Instruction::LoadStoreRegisterOffset {
                load_store,
                byte_word,
                offset_register,
                base_register,
                destination_register,
            } => {
                let offset = self.read_register(offset_register);
                self.single_data_transfer(
                    bus,
                    load_store,
                    byte_word,
                    Transfer::offset(base_register, destination_register, offset),
                );
            }
            Instruction::LoadStoreSignExtByteHalfword {
                h,
                sign_extend_flag,
                offset_register,
                base_register,
                destination_register,
            } => {
                let (load_store, kind) = match (sign_extend_flag, h) {
                    (false, false) => (LoadStoreKind::Store, HalfwordTransferKind::UnsignedHalfwords),
                    (false, true) => (LoadStoreKind::Load, HalfwordTransferKind::UnsignedHalfwords),
                    (true, false) => (LoadStoreKind::Load, HalfwordTransferKind::SignedByte),
                    (true, true) => (LoadStoreKind::Load, HalfwordTransferKind::SignedHalfwords),
                };
                let offset = self.read_register(offset_register);
                self.halfword_data_transfer(
                    bus,
                    load_store,
                    kind,
                    Transfer::offset(base_register, destination_register, offset),
                );
            }
            Instruction::LoadStoreImmOffset {
                load_store,
                byte_word,
                offset,
                base_register,
                destination_register,
            } => self.single_data_transfer(
                bus,
                load_store,
                byte_word,
                Transfer::offset(base_register, destination_register, offset),
            ),
            Instruction::LoadStoreHalfword {
                load_store,
                offset,
                base_register,
                source_destination_register,
            } => self.halfword_data_transfer(
                bus,
                load_store,
                HalfwordTransferKind::UnsignedHalfwords,
                Transfer::offset(base_register, source_destination_register, offset),
            ),
            Instruction::SPRelativeLoadStore {
                load_store,
                destination_register,
                offset,
            } => self.single_data_transfer(
                bus,
                load_store,
                ReadWriteKind::Word,
                Transfer::offset(REG_SP, destination_register, offset),
            ),
            Instruction::LoadAddress {
                sp,
                destination_register,
                offset,
            } => {
                let base = if sp {
                    self.read_register(REG_SP)
                } else {
                    self.read_register(15) & !3
                };
                self.write_register(destination_register, base.wrapping_add(offset));
            }
            Instruction::AddOffsetSP { negative, offset } => {
                let sp = self.read_register(REG_SP);
                let sp = if negative {
                    sp.wrapping_sub(offset)
                } else {
                    sp.wrapping_add(offset)
                };
                self.write_register(REG_SP, sp);
            }
            Instruction::PushPopReg {
                load_store,
                pc_lr,
                register_list,
            } => self.push_pop(bus, load_store, pc_lr, register_list),
            Instruction::MultipleLoadStore {
                load_store,
                base_register,
                register_list,
            } => self.block_data_transfer(
                bus,
                BlockTransfer {
                    indexing: Indexing::Post,
                    offsetting: Offsetting::Up,
                    load_psr: false,
                    write_back: true,
                    load_store,
                    rn: base_register,
                    register_list,
                },
            ),
            Instruction::CondBranch {
                condition,
                immediate_offset,
            } => {
                if self.cpsr.can_execute(condition) {
                    let target = self.read_register(15).wrapping_add_signed(immediate_offset);
                    self.write_register(15, target);
                }
            }
            Instruction::Swi { comment } => self.software_interrupt(bus, comment),
            Instruction::UncondBranch { offset } => {
                let target = self.read_register(15).wrapping_add_signed(offset);
                self.write_register(15, target);
            }
            Instruction::LongBranchLink { h, offset } => self.long_branch_link(h, offset),
            Instruction::Undefined { op_code } => {
                tracing::warn!(
                    "unallocated THUMB opcode 0x{op_code:04X} at 0x{:08X}, skipped",
                    self.current_address
                );
            }
        }
    }

    fn move_shifted_reg(&mut self, op: ShiftKind, offset5: u32, rs: usize, rd: usize) {
        let shifted = shift_immediate(op, offset5, self.read_register(rs), self.cpsr.carry);
        self.write_register(rd, shifted.result);
        self.cpsr.carry = shifted.carry;
        self.cpsr.set_nz(shifted.result);
    }

    fn move_compare_add_sub_imm(&mut self, op: MoveCompareOperation, rd: usize, offset: u32) {
        let value = self.read_register(rd);
        match op {
            MoveCompareOperation::Mov => {
                self.write_register(rd, offset);
                self.cpsr.set_nz(offset);
            }
            MoveCompareOperation::Cmp => {
                self.cpsr.set_flags(&sub_with_carry(value, offset, true));
            }
            MoveCompareOperation::Add => {
                let result = add_with_carry(value, offset, false);
                self.write_register(rd, result.result);
                self.cpsr.set_flags(&result);
            }
            MoveCompareOperation::Sub => {
                let result = sub_with_carry(value, offset, true);
                self.write_register(rd, result.result);
                self.cpsr.set_flags(&result);
            }
        }
    }

    fn alu_op(&mut self, bus: &mut Bus, op: ThumbModeAluInstruction, rs: usize, rd: usize) {
        use ThumbModeAluInstruction::{
            Adc, And, Asr, Bic, Cmn, Cmp, Eor, Lsl, Lsr, Mul, Mvn, Neg, Orr, Ror, Sbc, Tst,
        };

        let source = self.read_register(rs);
        let destination = self.read_register(rd);
        let carry = self.cpsr.carry;

        let logical = |value: u32, carry: bool| ArithmeticOpResult {
            result: value,
            carry,
            overflow: self.cpsr.overflow,
            sign: value.get_bit(31),
            zero: value == 0,
        };

        let result = match op {
            And | Tst => logical(destination & source, carry),
            Eor => logical(destination ^ source, carry),
            Orr => logical(destination | source, carry),
            Bic => logical(destination & !source, carry),
            Mvn => logical(!source, carry),
            Lsl | Lsr | Asr | Ror => {
                bus.idle(1);
                let kind = match op {
                    Lsl => ShiftKind::Lsl,
                    Lsr => ShiftKind::Lsr,
                    Asr => ShiftKind::Asr,
                    _ => ShiftKind::Ror,
                };
                let shifted = shift_register(kind, source & 0xFF, destination, carry);
                logical(shifted.result, shifted.carry)
            }
            Adc => add_with_carry(destination, source, carry),
            Sbc => sub_with_carry(destination, source, carry),
            Neg => sub_with_carry(0, source, true),
            Cmp => sub_with_carry(destination, source, true),
            Cmn => add_with_carry(destination, source, false),
            Mul => {
                bus.idle(multiply_cycles(destination, true));
                logical(destination.wrapping_mul(source), carry)
            }
        };

        if !matches!(op, Tst | Cmp | Cmn) {
            self.write_register(rd, result.result);
        }
        self.cpsr.set_flags(&result);
    }

    /// ADD, CMP and MOV reach R8-R15. Only CMP sets flags.
    fn hi_reg_operation_branch_ex(
        &mut self,
        op: ThumbHighRegisterOperation,
        rs: usize,
        rd: usize,
    ) {
        let source = self.read_register(rs);
        match op {
            ThumbHighRegisterOperation::Add => {
                let result = self.read_register(rd).wrapping_add(source);
                self.write_register(rd, result);
            }
            ThumbHighRegisterOperation::Cmp => {
                let result = sub_with_carry(self.read_register(rd), source, true);
                self.cpsr.set_flags(&result);
            }
            ThumbHighRegisterOperation::Mov => self.write_register(rd, source),
            ThumbHighRegisterOperation::Bx => self.branch_and_exchange(rs),
        }
    }

    /// PUSH is `STMDB SP!`, POP is `LDMIA SP!`. A popped PC stays in THUMB.
    fn push_pop(&mut self, bus: &mut Bus, load_store: LoadStoreKind, pc_lr: bool, list: u16) {
        let (indexing, offsetting, extra) = match load_store {
            LoadStoreKind::Store => (Indexing::Pre, Offsetting::Down, REG_LR),
            LoadStoreKind::Load => (Indexing::Post, Offsetting::Up, 15),
        };
        let register_list = if pc_lr { list | (1 << extra) } else { list };
        self.block_data_transfer(
            bus,
            BlockTransfer {
                indexing,
                offsetting,
                load_psr: false,
                write_back: true,
                load_store,
                rn: REG_SP,
                register_list,
            },
        );
    }

    /// The first half stages the upper offset in LR, the second half jumps
    /// and leaves the return address (with bit 0 set) in LR.
    fn long_branch_link(&mut self, low: bool, offset: u32) {
        if low {
            let target = self.read_register(REG_LR).wrapping_add(offset << 1);
            let return_address = self.current_address.wrapping_add(2) | 1;
            self.write_register(REG_LR, return_address);
            self.write_register(15, target);
        } else {
            let high = (offset << 12).sign_extended(23);
            let staged = self.read_register(15).wrapping_add(high);
            self.write_register(REG_LR, staged);
        }
    }
}
