//! LS-8 emulator command line.
//!
//! Loads a machine-code program file into memory and runs it until HLT.
//!
//! # Usage
//! ```text
//! ls8 <program.ls8>
//! ```
//!
//! # Arguments
//! - `program.ls8`: text file with one 8-bit binary instruction word per
//!   line; `#` starts a comment
//!
//! # Environment
//! - `LS8_TRACE`: when set, logs a per-cycle machine trace to stderr
//!
//! Exits non-zero with a diagnostic if the program cannot be loaded or a
//! fatal decode/execution error occurs.

use ls8::cpu::Cpu;
use ls8::error;
use ls8::loader;
use ls8::output::Console;
use ls8::utils::log::VERBOSE;
use std::env;
use std::path::Path;
use std::process;
use std::sync::atomic::Ordering;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }
    if args.len() > 2 {
        eprintln!("Unexpected argument: {}\n", args[2]);
        print_usage(&args[0]);
        process::exit(1);
    }

    if env::var_os("LS8_TRACE").is_some() {
        VERBOSE.store(true, Ordering::Relaxed);
    }

    let program = match loader::load_file(Path::new(&args[1])) {
        Ok(program) => program,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let mut cpu = Cpu::new();
    if let Err(e) = cpu.load(&program) {
        error!("{e}");
        process::exit(1);
    }
    if let Err(e) = cpu.run(&mut Console) {
        error!("{e}");
        process::exit(1);
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage: {program} <program.ls8>");
    eprintln!();
    eprintln!("Runs an LS-8 machine-code program until it halts.");
}
