//! ARM state: the 32-bit instruction set.
//!
//! ```text
//! 31    28 27  25 24                                  0
//! [ cond ] [ fmt ] [ format specific                   ]
//! ```
//!
//! Every instruction carries a condition and is skipped when it fails.
//! [`instructions`] decodes and prints, [`operations`] executes and
//! [`alu_instruction`] holds the data-processing opcodes and operand 2.

#[allow(clippy::cast_possible_truncation)]
pub mod alu_instruction;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::similar_names)]
pub mod instructions;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::similar_names)]
pub mod operations;
