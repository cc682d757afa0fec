use ls8_derive::Error;

/// Errors that can occur while loading or executing a program.
///
/// Every error is fatal: the machine does not resume after any of them.
#[derive(Debug, Error)]
pub enum VmError {
    /// Program file could not be opened or read.
    #[error("cannot read program {path}: {reason}")]
    Io { path: String, reason: String },
    /// A program line is not an 8-bit binary literal.
    #[error("line {line}: {token:?} is not an 8-bit binary literal")]
    InvalidLiteral { line: usize, token: String },
    /// Program holds more words than memory has cells.
    #[error("program is {words} words but memory holds {capacity}")]
    ProgramTooLarge { words: usize, capacity: usize },
    /// Fetched byte has no entry in the instruction table.
    #[error("unknown opcode {opcode:#010b} at address {addr:#04x}")]
    UnknownOpcode { opcode: u8, addr: u8 },
    /// ALU path reached with an instruction that has no ALU effect.
    #[error("unsupported ALU operation {opcode:#010b} at address {addr:#04x}")]
    UnsupportedAluOperation { opcode: u8, addr: u8 },
    /// Operand names a register outside the register file.
    #[error("register index {index} out of bounds (register file holds {available})")]
    InvalidRegister { index: u8, available: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_opcode_displays_binary() {
        let err = VmError::UnknownOpcode {
            opcode: 0xFF,
            addr: 3,
        };
        assert_eq!(
            format!("{err}"),
            "unknown opcode 0b11111111 at address 0x03"
        );
    }

    #[test]
    fn invalid_literal_names_line_and_token() {
        let err = VmError::InvalidLiteral {
            line: 4,
            token: "10000210".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "line 4: \"10000210\" is not an 8-bit binary literal"
        );
    }
}
