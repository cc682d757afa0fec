//! Output sink for the PRN instruction.
//!
//! The CPU emits register values through the [`Output`] trait, which keeps
//! the machine core free of terminal concerns and lets tests capture what a
//! program printed.

/// Line-oriented sink receiving values produced by PRN.
pub trait Output {
    /// Emits one register value; implementations render it in decimal on
    /// its own line.
    fn emit(&mut self, value: u8);
}

/// Writes each emitted value to stdout.
pub struct Console;

impl Output for Console {
    fn emit(&mut self, value: u8) {
        println!("{value}");
    }
}
