//! Execution of decoded ARM instructions.

use crate::bitwise::Bits;
use crate::bus::Bus;
use crate::cpu::alu::{
    ArithmeticOpResult, add_with_carry, multiply_cycles, rotated_immediate, shift_immediate,
    shift_register, sub_with_carry,
};
use crate::cpu::arm::alu_instruction::{
    AluInstructionKind, AluSecondOperandInfo, ArmModeAluInstruction, Kind, MsrOperand, PsrKind,
    PsrOpKind, ShiftOperator,
};
use crate::cpu::arm::instructions::{ArmModeInstruction, SingleDataTransferOffsetInfo};
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::cpu_modes::Mode;
use crate::cpu::exceptions::Exception;
use crate::cpu::flags::{
    HalfwordDataTransferOffsetKind, HalfwordTransferKind, Indexing, LoadStoreKind, Offsetting,
    ReadWriteKind,
};
use crate::cpu::psr::CpuState;
use crate::cpu::registers::REG_LR;

impl Arm7tdmi {
    pub(crate) fn execute_arm(&mut self, bus: &mut Bus, instruction: ArmModeInstruction) {
        match instruction {
            ArmModeInstruction::DataProcessing {
                alu_instruction,
                set_conditions,
                rn,
                destination,
                op2,
                ..
            } => self.data_processing(bus, alu_instruction, set_conditions, rn, destination, op2),
            ArmModeInstruction::Multiply {
                accumulate,
                set_conditions,
                destination,
                accumulator,
                rs,
                rm,
                ..
            } => self.multiply(bus, accumulate, set_conditions, destination, accumulator, rs, rm),
            ArmModeInstruction::MultiplyLong {
                signed,
                accumulate,
                set_conditions,
                rd_hi,
                rd_lo,
                rs,
                rm,
                ..
            } => self.multiply_long(
                bus,
                signed,
                accumulate,
                set_conditions,
                (rd_hi, rd_lo),
                rs,
                rm,
            ),
            ArmModeInstruction::PsrTransfer { psr_kind, kind, .. } => {
                self.psr_transfer(psr_kind, kind);
            }
            ArmModeInstruction::SingleDataSwap {
                quantity, rn, rd, rm, ..
            } => self.single_data_swap(bus, quantity, rn, rd, rm),
            ArmModeInstruction::BranchAndExchange { register, .. } => {
                self.branch_and_exchange(register);
            }
            ArmModeInstruction::HalfwordDataTransfer {
                indexing,
                offsetting,
                write_back,
                load_store_kind,
                offset_kind,
                base_register,
                source_destination_register,
                transfer_kind,
                ..
            } => {
                let offset = match offset_kind {
                    HalfwordDataTransferOffsetKind::Immediate { offset } => offset,
                    HalfwordDataTransferOffsetKind::Register { register } => {
                        self.read_register(register as usize)
                    }
                };
                let transfer = Transfer {
                    indexing,
                    offsetting,
                    write_back,
                    base_register,
                    rd: source_destination_register,
                    offset,
                };
                self.halfword_data_transfer(bus, load_store_kind, transfer_kind, transfer);
            }
            ArmModeInstruction::SingleDataTransfer {
                load_store,
                quantity,
                write_back,
                indexing,
                rd,
                base_register,
                offset_info,
                offsetting,
                ..
            } => {
                let offset = match offset_info {
                    SingleDataTransferOffsetInfo::Immediate { offset } => offset,
                    SingleDataTransferOffsetInfo::RegisterImmediate {
                        shift_amount,
                        shift_kind,
                        reg_offset,
                    } => {
                        shift_immediate(
                            shift_kind,
                            shift_amount,
                            self.read_register(reg_offset),
                            self.cpsr.carry,
                        )
                        .result
                    }
                };
                let transfer = Transfer {
                    indexing,
                    offsetting,
                    write_back,
                    base_register,
                    rd,
                    offset,
                };
                self.single_data_transfer(bus, load_store, quantity, transfer);
            }
            ArmModeInstruction::BlockDataTransfer {
                indexing,
                offsetting,
                load_psr,
                write_back,
                load_store,
                rn,
                register_list,
                ..
            } => self.block_data_transfer(
                bus,
                BlockTransfer {
                    indexing,
                    offsetting,
                    load_psr,
                    write_back,
                    load_store,
                    rn,
                    register_list,
                },
            ),
            ArmModeInstruction::Branch { link, offset, .. } => self.branch(link, offset),
            ArmModeInstruction::SoftwareInterrupt { comment, .. } => {
                self.software_interrupt(bus, comment.get_bits(16..=23) as u8);
            }
            ArmModeInstruction::Coprocessor { op_code, .. } => {
                tracing::warn!(
                    "coprocessor instruction 0x{op_code:08X} at 0x{:08X}, no coprocessor present",
                    self.current_address
                );
                self.undefined_instruction();
            }
            ArmModeInstruction::Undefined { op_code, .. } => {
                tracing::warn!(
                    "undefined instruction 0x{op_code:08X} at 0x{:08X}",
                    self.current_address
                );
                self.undefined_instruction();
            }
        }
    }

    pub(crate) fn undefined_instruction(&mut self) {
        let return_address = self.current_address.wrapping_add(self.instruction_size());
        self.enter_exception(Exception::Undefined, return_address);
    }

    /// With a register-specified shift the pipeline has advanced one more
    /// word, so R15 reads 12 bytes ahead.
    fn read_register_for_shift(&self, reg: usize) -> u32 {
        let value = self.read_register(reg);
        if reg == 15 { value.wrapping_add(4) } else { value }
    }

    fn data_processing(
        &mut self,
        bus: &mut Bus,
        alu_instruction: ArmModeAluInstruction,
        set_conditions: bool,
        rn: usize,
        destination: usize,
        op2: AluSecondOperandInfo,
    ) {
        let carry = self.cpsr.carry;
        let (operand2, shifter_carry, op1) = match op2 {
            AluSecondOperandInfo::Immediate { base, shift } => {
                let shifted = rotated_immediate(base, shift, carry);
                (shifted.result, shifted.carry, self.read_register(rn))
            }
            AluSecondOperandInfo::Register {
                shift_op: ShiftOperator::Immediate(amount),
                shift_kind,
                register,
            } => {
                let shifted =
                    shift_immediate(shift_kind, amount, self.read_register(register), carry);
                (shifted.result, shifted.carry, self.read_register(rn))
            }
            AluSecondOperandInfo::Register {
                shift_op: ShiftOperator::Register(rs),
                shift_kind,
                register,
            } => {
                bus.idle(1);
                let amount = self.read_register(rs) & 0xFF;
                let shifted = shift_register(
                    shift_kind,
                    amount,
                    self.read_register_for_shift(register),
                    carry,
                );
                (shifted.result, shifted.carry, self.read_register_for_shift(rn))
            }
        };

        let result = self.alu(alu_instruction, op1, operand2, shifter_carry);

        if alu_instruction.writes_result() && destination == 15 {
            if set_conditions {
                self.restore_cpsr();
            }
            self.write_register(15, result.result);
            return;
        }

        if alu_instruction.writes_result() {
            self.write_register(destination, result.result);
        }
        if set_conditions {
            self.cpsr.set_flags(&result);
        }
    }

    /// Evaluates an ALU opcode. Logical results take C from the shifter and
    /// keep V.
    fn alu(
        &self,
        alu_instruction: ArmModeAluInstruction,
        op1: u32,
        op2: u32,
        shifter_carry: bool,
    ) -> ArithmeticOpResult {
        use ArmModeAluInstruction::{
            Adc, Add, And, Bic, Cmn, Cmp, Eor, Mov, Mvn, Orr, Rsb, Rsc, Sbc, Sub, Teq, Tst,
        };

        let carry = self.cpsr.carry;
        match alu_instruction.kind() {
            AluInstructionKind::Logical => {
                let value = match alu_instruction {
                    And | Tst => op1 & op2,
                    Eor | Teq => op1 ^ op2,
                    Orr => op1 | op2,
                    Bic => op1 & !op2,
                    Mov => op2,
                    _ => !op2,
                };
                ArithmeticOpResult {
                    result: value,
                    carry: shifter_carry,
                    overflow: self.cpsr.overflow,
                    sign: value.get_bit(31),
                    zero: value == 0,
                }
            }
            AluInstructionKind::Arithmetic => match alu_instruction {
                Sub | Cmp => sub_with_carry(op1, op2, true),
                Rsb => sub_with_carry(op2, op1, true),
                Add | Cmn => add_with_carry(op1, op2, false),
                Adc => add_with_carry(op1, op2, carry),
                Sbc => sub_with_carry(op1, op2, carry),
                _ => sub_with_carry(op2, op1, carry),
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn multiply(
        &mut self,
        bus: &mut Bus,
        accumulate: bool,
        set_conditions: bool,
        destination: usize,
        accumulator: usize,
        rs: usize,
        rm: usize,
    ) {
        let rs_value = self.read_register(rs);
        let mut result = self.read_register(rm).wrapping_mul(rs_value);
        let mut internal = multiply_cycles(rs_value, true);
        if accumulate {
            result = result.wrapping_add(self.read_register(accumulator));
            internal += 1;
        }
        bus.idle(internal);

        self.write_register(destination, result);
        if set_conditions {
            self.cpsr.set_nz(result);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn multiply_long(
        &mut self,
        bus: &mut Bus,
        signed: bool,
        accumulate: bool,
        set_conditions: bool,
        (rd_hi, rd_lo): (usize, usize),
        rs: usize,
        rm: usize,
    ) {
        let rm_value = self.read_register(rm);
        let rs_value = self.read_register(rs);
        let product = if signed {
            (i64::from(rm_value as i32) * i64::from(rs_value as i32)) as u64
        } else {
            u64::from(rm_value) * u64::from(rs_value)
        };

        let mut internal = multiply_cycles(rs_value, signed) + 1;
        let result = if accumulate {
            internal += 1;
            let hi = u64::from(self.read_register(rd_hi));
            let lo = u64::from(self.read_register(rd_lo));
            product.wrapping_add((hi << 32) | lo)
        } else {
            product
        };
        bus.idle(internal);

        self.write_register(rd_lo, result as u32);
        self.write_register(rd_hi, (result >> 32) as u32);
        if set_conditions {
            self.cpsr.zero = result == 0;
            self.cpsr.sign = result.get_bit(63);
        }
    }

    fn psr_transfer(&mut self, psr_kind: PsrKind, kind: PsrOpKind) {
        match kind {
            PsrOpKind::Mrs {
                destination_register,
            } => {
                let value = match psr_kind {
                    PsrKind::Cpsr => u32::from(self.cpsr),
                    PsrKind::Spsr => u32::from(self.spsr()),
                };
                self.write_register(destination_register, value);
            }
            PsrOpKind::Msr {
                field_mask,
                operand,
            } => {
                let value = match operand {
                    MsrOperand::Register(register) => self.read_register(register),
                    MsrOperand::Immediate(value) => value,
                };
                let privileged = self.cpsr.mode.is_privileged();

                match psr_kind {
                    PsrKind::Cpsr => {
                        let mut psr = self.cpsr;
                        if field_mask.get_bit(3) {
                            psr.write_flags(value);
                        }
                        if field_mask.get_bit(0) && privileged {
                            psr.write_control(value);
                            // T only changes through BX and exception returns.
                            psr.state = self.cpsr.state;
                        }
                        self.set_cpsr(psr);
                    }
                    PsrKind::Spsr => {
                        let mut psr = self.spsr();
                        if field_mask.get_bit(3) {
                            psr.write_flags(value);
                        }
                        if field_mask.get_bit(0) {
                            psr.write_control(value);
                        }
                        self.set_spsr(psr);
                    }
                }
            }
        }
    }

    fn single_data_swap(
        &mut self,
        bus: &mut Bus,
        quantity: ReadWriteKind,
        rn: usize,
        rd: usize,
        rm: usize,
    ) {
        let address = self.read_register(rn);
        let source = self.read_register(rm);
        let old = match quantity {
            ReadWriteKind::Byte => {
                let old = bus.read_byte(address);
                bus.write_byte(address, source as u8);
                u32::from(old)
            }
            ReadWriteKind::Word => {
                let old = bus.read_word(address).rotate_right((address & 3) * 8);
                bus.write_word(address, source);
                old
            }
        };
        bus.idle(1);
        self.write_register(rd, old);
    }

    /// `BX Rn`: bit 0 of the target selects THUMB.
    pub(crate) fn branch_and_exchange(&mut self, register: usize) {
        let target = self.read_register(register);
        self.cpsr.state = CpuState::from(target.get_bit(0));
        self.write_register(15, target);
    }

    pub(crate) fn single_data_transfer(
        &mut self,
        bus: &mut Bus,
        load_store: LoadStoreKind,
        quantity: ReadWriteKind,
        transfer: Transfer,
    ) {
        let (address, offset_address) = self.transfer_addresses(transfer);
        match load_store {
            LoadStoreKind::Load => {
                let value = match quantity {
                    ReadWriteKind::Word => bus.read_word(address).rotate_right((address & 3) * 8),
                    ReadWriteKind::Byte => u32::from(bus.read_byte(address)),
                };
                bus.idle(1);
                self.finish_load(transfer, offset_address, value);
            }
            LoadStoreKind::Store => {
                let value = self.store_value(transfer.rd);
                match quantity {
                    ReadWriteKind::Word => bus.write_word(address, value),
                    ReadWriteKind::Byte => bus.write_byte(address, value as u8),
                }
                if transfer.writes_back() {
                    self.write_register(transfer.base_register, offset_address);
                }
            }
        }
    }

    pub(crate) fn halfword_data_transfer(
        &mut self,
        bus: &mut Bus,
        load_store: LoadStoreKind,
        transfer_kind: HalfwordTransferKind,
        transfer: Transfer,
    ) {
        let (address, offset_address) = self.transfer_addresses(transfer);
        match load_store {
            LoadStoreKind::Load => {
                let value = match transfer_kind {
                    HalfwordTransferKind::UnsignedHalfwords => {
                        u32::from(bus.read_half_word(address)).rotate_right((address & 1) * 8)
                    }
                    HalfwordTransferKind::SignedByte => {
                        u32::from(bus.read_byte(address)).sign_extended(8)
                    }
                    // A misaligned LDRSH loads the addressed byte only.
                    HalfwordTransferKind::SignedHalfwords if address & 1 == 1 => {
                        u32::from(bus.read_byte(address)).sign_extended(8)
                    }
                    HalfwordTransferKind::SignedHalfwords => {
                        u32::from(bus.read_half_word(address)).sign_extended(16)
                    }
                };
                bus.idle(1);
                self.finish_load(transfer, offset_address, value);
            }
            LoadStoreKind::Store => {
                if transfer_kind != HalfwordTransferKind::UnsignedHalfwords {
                    tracing::debug!(
                        "signed store STR{transfer_kind} at 0x{:08X} treated as STRH",
                        self.current_address
                    );
                }
                let value = self.store_value(transfer.rd);
                bus.write_half_word(address, value as u16);
                if transfer.writes_back() {
                    self.write_register(transfer.base_register, offset_address);
                }
            }
        }
    }

    /// Transfer address and the base after applying the offset.
    fn transfer_addresses(&self, transfer: Transfer) -> (u32, u32) {
        let base = self.read_register(transfer.base_register);
        let offset_address = transfer.offsetting.apply(base, transfer.offset);
        let address = match transfer.indexing {
            Indexing::Pre => offset_address,
            Indexing::Post => base,
        };
        (address, offset_address)
    }

    /// A stored R15 is 12 bytes past the instruction.
    fn store_value(&self, rd: usize) -> u32 {
        let value = self.read_register(rd);
        if rd == 15 { value.wrapping_add(4) } else { value }
    }

    /// Base write-back happens first so a load into the base register wins.
    fn finish_load(&mut self, transfer: Transfer, offset_address: u32, value: u32) {
        if transfer.writes_back() {
            self.write_register(transfer.base_register, offset_address);
        }
        self.write_register(transfer.rd, value);
    }

    pub(crate) fn block_data_transfer(&mut self, bus: &mut Bus, block: BlockTransfer) {
        let base = self.read_register(block.rn);
        // An empty list transfers R15 and moves the base by 0x40.
        let (list, span) = if block.register_list == 0 {
            (1_u16 << 15, 0x40)
        } else {
            (block.register_list, block.register_list.count_ones() * 4)
        };

        let lowest = match (block.offsetting, block.indexing) {
            (Offsetting::Up, Indexing::Pre) => base.wrapping_add(4),
            (Offsetting::Up, Indexing::Post) => base,
            (Offsetting::Down, Indexing::Pre) => base.wrapping_sub(span),
            (Offsetting::Down, Indexing::Post) => base.wrapping_sub(span).wrapping_add(4),
        };
        let new_base = match block.offsetting {
            Offsetting::Up => base.wrapping_add(span),
            Offsetting::Down => base.wrapping_sub(span),
        };

        let includes_pc = list.get_bit(15);
        let restores_cpsr = block.load_psr && block.load_store == LoadStoreKind::Load && includes_pc;
        let user_bank = block.load_psr && !restores_cpsr;
        let mode = self.cpsr.mode;
        if user_bank {
            self.enter_mode(Mode::User);
        }

        let registers = (0..16_u8).filter(|r| list.get_bit(*r)).map(usize::from);
        let mut address = lowest;
        match block.load_store {
            LoadStoreKind::Store => {
                let first = list.trailing_zeros() as usize;
                for reg in registers {
                    let value = if reg == block.rn && block.write_back && reg != first {
                        new_base
                    } else {
                        self.store_value(reg)
                    };
                    bus.write_word(address, value);
                    address = address.wrapping_add(4);
                }
                if user_bank {
                    self.enter_mode(mode);
                }
                if block.write_back {
                    self.write_register(block.rn, new_base);
                }
            }
            LoadStoreKind::Load => {
                // A loaded base wins over write-back. With the user bank
                // active the base belongs to the current mode instead.
                let write_back = block.write_back && !list.get_bit(block.rn as u8);
                if write_back && !user_bank {
                    self.write_register(block.rn, new_base);
                }
                let mut pc = None;
                for reg in registers {
                    let value = bus.read_word(address);
                    if reg == 15 {
                        pc = Some(value);
                    } else {
                        self.write_register(reg, value);
                    }
                    address = address.wrapping_add(4);
                }
                bus.idle(1);

                if user_bank {
                    self.enter_mode(mode);
                    if write_back {
                        self.write_register(block.rn, new_base);
                    }
                }
                if let Some(target) = pc {
                    if restores_cpsr {
                        self.restore_cpsr();
                    }
                    self.write_register(15, target);
                }
            }
        }
    }

    fn branch(&mut self, link: bool, offset: i32) {
        let target = self.read_register(15).wrapping_add_signed(offset);
        if link {
            self.write_register(REG_LR, self.current_address.wrapping_add(4));
        }
        self.write_register(15, target);
    }
}

/// Operands shared by single and halfword transfers of both instruction
/// sets.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Transfer {
    pub(crate) indexing: Indexing,
    pub(crate) offsetting: Offsetting,
    pub(crate) write_back: bool,
    pub(crate) base_register: usize,
    pub(crate) rd: usize,
    pub(crate) offset: u32,
}

impl Transfer {
    /// `[base, #offset]` without write-back, the only THUMB addressing mode.
    pub(crate) const fn offset(base_register: usize, rd: usize, offset: u32) -> Self {
        Self {
            indexing: Indexing::Pre,
            offsetting: Offsetting::Up,
            write_back: false,
            base_register,
            rd,
            offset,
        }
    }

    /// Post-indexed transfers always write the base back.
    fn writes_back(self) -> bool {
        self.write_back || self.indexing == Indexing::Post
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockTransfer {
    pub(crate) indexing: Indexing,
    pub(crate) offsetting: Offsetting,
    pub(crate) load_psr: bool,
    pub(crate) write_back: bool,
    pub(crate) load_store: LoadStoreKind,
    pub(crate) rn: usize,
    pub(crate) register_list: u16,
}
