//! # Banked Registers for Exception Modes
//!
//! Storage for registers that are swapped when changing CPU modes.
//! See [`cpu_modes`](super::cpu_modes) for the banking table and mode details.
//!
//! Each exception mode has its own R13 (SP), R14 (LR), and SPSR.
//! FIQ additionally banks R8-R12 for faster interrupt handling.
//!
//! Storage is indexed by [`Bank`], and the swap itself is the pure
//! function [`swap_bank`]: it takes the live registers and the bank by
//! value and hands back the new pair, so it can be tested without a CPU.

use serde::{Deserialize, Serialize};

use crate::cpu::cpu_modes::{Bank, Mode};
use crate::cpu::psr::Psr;
use crate::cpu::registers::{REG_LR, REG_SP, Registers};

/// Storage for banked registers across all CPU modes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBank {
    /// R8-R12 of every non-FIQ mode, parked here while FIQ is active.
    pub shared_r8_r12: [u32; 5],

    /// R8-R12 private to FIQ, parked here while any other mode is active.
    pub fiq_r8_r12: [u32; 5],

    /// R13 and R14 of every bank. The slot of the active bank is stale
    /// until the next swap writes it back.
    pub sp_lr: [[u32; 2]; Bank::COUNT],

    /// One SPSR per bank. The User/System slot is never read.
    pub spsr: [Psr; Bank::COUNT],
}

impl RegisterBank {
    #[must_use]
    pub const fn stack_pointer(&self, bank: Bank) -> u32 {
        self.sp_lr[bank.index()][0]
    }

    pub const fn set_stack_pointer(&mut self, bank: Bank, value: u32) {
        self.sp_lr[bank.index()][0] = value;
    }

    #[must_use]
    pub const fn link_register(&self, bank: Bank) -> u32 {
        self.sp_lr[bank.index()][1]
    }
}

/// Saves the outgoing mode's banked registers and loads the incoming
/// mode's. A no-op when both modes share a bank (User and System).
#[must_use]
pub fn swap_bank(
    mut registers: Registers,
    mut bank: RegisterBank,
    old_mode: Mode,
    new_mode: Mode,
) -> (Registers, RegisterBank) {
    let old = old_mode.bank();
    let new = new_mode.bank();
    if old == new {
        return (registers, bank);
    }

    bank.sp_lr[old.index()] = [
        registers.register_at(REG_SP),
        registers.register_at(REG_LR),
    ];

    if old == Bank::Fiq || new == Bank::Fiq {
        let live: [u32; 5] = std::array::from_fn(|i| registers.register_at(8 + i));
        let incoming = if new == Bank::Fiq {
            bank.shared_r8_r12 = live;
            bank.fiq_r8_r12
        } else {
            bank.fiq_r8_r12 = live;
            bank.shared_r8_r12
        };
        for (i, value) in incoming.into_iter().enumerate() {
            registers.set_register_at(8 + i, value);
        }
    }

    let [sp, lr] = bank.sp_lr[new.index()];
    registers.set_register_at(REG_SP, sp);
    registers.set_register_at(REG_LR, lr);

    (registers, bank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};

    fn random_state(rng: &mut StdRng) -> (Registers, RegisterBank) {
        let registers = Registers::from(std::array::from_fn(|_| rng.next_u32()));
        let mut bank = RegisterBank::default();
        bank.shared_r8_r12 = std::array::from_fn(|_| rng.next_u32());
        bank.fiq_r8_r12 = std::array::from_fn(|_| rng.next_u32());
        for slot in &mut bank.sp_lr {
            *slot = [rng.next_u32(), rng.next_u32()];
        }
        (registers, bank)
    }

    #[test]
    fn round_trip_for_every_ordered_pair() {
        let mut rng = StdRng::seed_from_u64(0x4152_4D37);
        for a in Mode::ALL {
            for b in Mode::ALL {
                let (registers, bank) = random_state(&mut rng);

                let (in_b, bank_b) = swap_bank(registers, bank, a, b);
                let (back, bank_back) = swap_bank(in_b, bank_b, b, a);

                assert_eq!(back, registers, "{a} -> {b} -> {a}");

                // Every slot other than the one `a` owns is untouched.
                for other in Mode::ALL.map(Mode::bank) {
                    if other != a.bank() {
                        assert_eq!(bank_back.sp_lr[other.index()], bank.sp_lr[other.index()]);
                    }
                }

                // Going to `b` again shows the same view as the first time.
                let (in_b_again, _) = swap_bank(back, bank_back, a, b);
                assert_eq!(in_b_again, in_b, "{a} -> {b} second visit");
            }
        }
    }

    #[test]
    fn user_to_system_is_a_no_op() {
        let mut rng = StdRng::seed_from_u64(7);
        let (registers, bank) = random_state(&mut rng);
        assert_eq!(
            swap_bank(registers, bank, Mode::User, Mode::System),
            (registers, bank)
        );
    }

    #[test]
    fn fiq_swaps_r8_to_r14_and_irq_only_r13_r14() {
        let mut values = [0_u32; 16];
        for (i, v) in values.iter_mut().enumerate() {
            *v = i as u32;
        }
        let registers = Registers::from(values);
        let mut bank = RegisterBank::default();
        bank.fiq_r8_r12 = [80, 90, 100, 110, 120];
        bank.sp_lr[Bank::Fiq.index()] = [130, 140];
        bank.sp_lr[Bank::Irq.index()] = [0x0300_7FA0, 0x0800_0004];

        let (fiq, bank_fiq) = swap_bank(registers, bank, Mode::System, Mode::Fiq);
        assert_eq!(fiq.register_at(8), 80);
        assert_eq!(fiq.register_at(12), 120);
        assert_eq!(fiq.register_at(REG_SP), 130);
        assert_eq!(fiq.register_at(7), 7);
        assert_eq!(bank_fiq.shared_r8_r12, [8, 9, 10, 11, 12]);

        let (irq, _) = swap_bank(registers, bank, Mode::System, Mode::Irq);
        assert_eq!(irq.register_at(8), 8);
        assert_eq!(irq.register_at(REG_SP), 0x0300_7FA0);
        assert_eq!(irq.register_at(REG_LR), 0x0800_0004);
    }
}
