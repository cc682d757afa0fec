//! Instruction Set Architecture (ISA) definitions.
//!
//! Defines the LS-8 instruction set. The [`for_each_instruction!`](crate::for_each_instruction)
//! macro holds the canonical instruction definitions and invokes a callback
//! macro for code generation, so every module that needs the opcode table
//! derives it from one source of truth.
//!
//! This module generates:
//! - The [`Instruction`] enum with opcode values
//! - `TryFrom<u8>` for decoding fetched opcodes
//! - Accessors for mnemonic, operand count, and execution [`Class`]
//!
//! # Opcode format
//!
//! Every instruction is a single byte laid out as `AABCDDDD`:
//! - `AA`: number of operand bytes following the opcode (0-2)
//! - `B`: set when the instruction executes on the ALU
//! - `C`: set when the instruction writes the program counter
//! - `DDDD`: instruction identifier
//!
//! The table below is the authority for dispatch; the `AA` and `B` fields are
//! checked against it in `isa_static_check`.

use crate::errors::VmError;

/// Invokes a callback macro with the complete instruction definition list.
///
/// This macro enables code generation for instructions in multiple modules
/// without duplicating the instruction definitions.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            /// HLT ; clears the running flag and stops execution
            Hlt = 0b0000_0001, "HLT", 0, Direct,
            /// RET ; PC = mem[SP]
            Ret = 0b0001_0001, "RET", 0, Direct,
            /// PUSH reg ; SP -= 1, mem[SP] = reg
            Push = 0b0100_0101, "PUSH", 1, Direct,
            /// POP reg ; reg = mem[SP], SP += 1
            Pop = 0b0100_0110, "POP", 1, Direct,
            /// PRN reg ; emits reg as a decimal line on the output sink
            Prn = 0b0100_0111, "PRN", 1, Direct,
            /// CALL reg ; SP -= 1, mem[SP] = PC + 2, PC = reg
            Call = 0b0101_0000, "CALL", 1, Direct,
            /// JMP reg ; PC = reg
            Jmp = 0b0101_0100, "JMP", 1, Direct,
            /// JEQ reg ; if the Equal flag is set then PC = reg
            Jeq = 0b0101_0101, "JEQ", 1, Direct,
            /// JNE reg ; if the Equal flag is clear then PC = reg
            Jne = 0b0101_0110, "JNE", 1, Direct,
            /// LDI reg, imm8 ; reg = imm8
            Ldi = 0b1000_0010, "LDI", 2, Direct,
            /// ADD rega, regb ; rega = rega + regb (mod 256)
            Add = 0b1010_0000, "ADD", 2, Alu,
            /// MUL rega, regb ; rega = rega * regb (mod 256)
            Mul = 0b1010_0010, "MUL", 2, Alu,
            /// CMP rega, regb ; FL = Equal, Greater, or Less
            Cmp = 0b1010_0111, "CMP", 2, Alu,
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal, $operands:expr, $class:ident
        ),* $(,)?
    ) => {
        /// Execution path an instruction is dispatched through.
        ///
        /// Mirrors bit 5 of the opcode: `Alu` instructions receive the two
        /// pre-fetched operand bytes and run on the ALU subunit, `Direct`
        /// instructions go straight to their handler.
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum Class {
            Direct,
            Alu,
        }

        // =========================
        // VM instruction enum
        // =========================
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Instruction {
            type Error = VmError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Instruction::$name), )*
                    _ => Err(VmError::UnknownOpcode {
                        opcode: value,
                        addr: 0,
                    }),
                }
            }
        }

        impl Instruction {
            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Returns the number of operand bytes following the opcode.
            pub const fn operand_count(&self) -> u8 {
                match self {
                    $( Instruction::$name => $operands, )*
                }
            }

            /// Returns the execution path this instruction dispatches through.
            pub const fn class(&self) -> Class {
                match self {
                    $( Instruction::$name => Class::$class, )*
                }
            }

            /// Whether this instruction runs on the ALU subunit.
            pub const fn is_alu(&self) -> bool {
                matches!(self.class(), Class::Alu)
            }

            /// Total encoded size: opcode plus operands.
            pub const fn size(&self) -> u8 {
                1 + self.operand_count()
            }
        }
    };
}

for_each_instruction!(define_instructions);
