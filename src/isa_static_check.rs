#[cfg(test)]
mod tests {
    use crate::isa::Instruction;

    macro_rules! collect_isa {
        (
            $( $(#[$doc:meta])* $name:ident = $opcode:expr, $mnemonic:literal, $operands:expr, $class:ident ),* $(,)?
        ) => {
            &[ $( Instruction::$name ),* ]
        };
    }

    fn all_instructions() -> &'static [Instruction] {
        crate::for_each_instruction!(collect_isa)
    }

    // Opcode layout is AABCDDDD: AA = operand count, B = ALU bit. The table
    // carries both fields explicitly, so they must agree with the encoding.

    #[test]
    fn operand_count_matches_encoding() {
        for instr in all_instructions() {
            assert_eq!(
                instr.operand_count(),
                (*instr as u8) >> 6,
                "operand count of {} disagrees with its opcode",
                instr.mnemonic()
            );
        }
    }

    #[test]
    fn classification_matches_alu_bit() {
        for instr in all_instructions() {
            assert_eq!(
                instr.is_alu(),
                (*instr as u8 >> 5) & 1 == 1,
                "classification of {} disagrees with its opcode",
                instr.mnemonic()
            );
        }
    }

    #[test]
    fn opcodes_are_unique_and_round_trip() {
        let all = all_instructions();
        for instr in all {
            assert_eq!(Instruction::try_from(*instr as u8).unwrap(), *instr);
        }
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(*a as u8, *b as u8, "{} and {}", a.mnemonic(), b.mnemonic());
            }
        }
    }
}
