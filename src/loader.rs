//! Program file loading.
//!
//! Parses the LS-8 text format into instruction words for [`Cpu::load`](crate::cpu::Cpu::load):
//! one 8-bit binary literal per line, `#` starts a comment (whole-line or
//! after the payload), blank and comment-only lines are skipped. Words land
//! in memory in file order starting at address 0.
//!
//! # Example
//!
//! ```text
//! # print8.ls8
//! 10000010 # LDI r0, 8
//! 00000000
//! 00001000
//! 01000111 # PRN r0
//! 00000000
//! 00000001 # HLT
//! ```

use crate::errors::VmError;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = '#';

/// Parses program source into instruction words.
///
/// Fails with [`VmError::InvalidLiteral`] on the first line whose payload is
/// not an 8-bit binary literal, carrying the 1-based line number.
pub fn parse_program(source: &str) -> Result<Vec<u8>, VmError> {
    let mut words = Vec::new();

    for (idx, raw) in source.lines().enumerate() {
        let payload = raw.split(COMMENT_CHAR).next().unwrap_or("").trim();
        if payload.is_empty() {
            continue;
        }
        let word = u8::from_str_radix(payload, 2).map_err(|_| VmError::InvalidLiteral {
            line: idx + 1,
            token: payload.to_string(),
        })?;
        words.push(word);
    }

    Ok(words)
}

/// Reads and parses the program file at `path`.
///
/// Fails with [`VmError::Io`] if the file cannot be read.
pub fn load_file(path: &Path) -> Result<Vec<u8>, VmError> {
    let source = fs::read_to_string(path).map_err(|e| VmError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_program(&source)
}
