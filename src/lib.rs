//! LS-8 byte-code virtual machine.
//!
//! Loads LS-8 machine code into a flat 256-byte memory and executes it with
//! a fetch-decode-execute cycle over eight byte-wide registers, a condition
//! flags register, and a stack growing downward from `0xF4`.
//!
//! # Architecture
//!
//! - **Memory**: 256 byte cells, addresses are a single byte
//! - **Registers**: eight one-byte registers; `r7` is the stack pointer
//! - **Instruction format**: one opcode byte (`AABCDDDD`) followed by 0-2
//!   operand bytes
//! - **Execution model**: arithmetic/compare on the ALU subunit, data
//!   movement, stack operations, and call/return/conditional jumps
//!
//! # Modules
//!
//! - [`cpu`]: the machine core, instruction handlers, and ALU
//! - [`errors`]: load and execution error types
//! - [`isa`]: instruction set definition and opcode decoding
//! - [`loader`]: program file parsing
//! - [`output`]: output sink for the PRN instruction
//! - [`utils`]: logging

pub mod cpu;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod loader;
pub mod output;
pub mod utils;
