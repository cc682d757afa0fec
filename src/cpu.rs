//! Core virtual machine implementation.
//!
//! The CPU executes LS-8 machine code from a flat 256-byte memory with a
//! fetch-decode-execute cycle over eight byte-wide registers. All arithmetic
//! uses wrapping semantics so results stay within one byte instead of
//! panicking on overflow.

use crate::debug;
use crate::errors::VmError;
use crate::isa::Instruction;
use crate::output::Output;
use std::fmt::Write;

/// Number of memory cells; addresses are a single byte.
pub const MEMORY_SIZE: usize = 256;
/// Number of general-purpose registers.
pub const NUM_REGISTERS: usize = 8;
/// Register reserved for the stack pointer.
pub const SP: u8 = 7;
/// Initial stack pointer; the stack grows toward lower addresses.
pub const STACK_START: u8 = 0xF4;

/// Flag bit set by CMP when the operands are equal.
pub const FL_EQ: u8 = 0b001;
/// Flag bit set by CMP when the first operand is greater.
pub const FL_GT: u8 = 0b010;
/// Flag bit set by CMP when the second operand is greater.
pub const FL_LT: u8 = 0b100;

/// Program counter contract returned by every instruction handler.
///
/// The run loop alone applies the result, so a fixed-shape instruction
/// cannot forget its advance and a control transfer cannot accidentally take
/// the positional advance on top of its jump.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Step {
    /// Move the PC past the instruction and its operands.
    Advance(u8),
    /// Transfer control to an absolute address.
    Jump(u8),
    /// Clear the running flag; the PC is left untouched.
    Halt,
}

/// Register file holding the eight general-purpose byte registers.
///
/// An operand byte can name any index 0-255 while the file only has eight
/// slots, so reads and writes are bounds-checked.
struct Registers {
    regs: [u8; NUM_REGISTERS],
}

impl Registers {
    fn new() -> Self {
        let mut regs = [0; NUM_REGISTERS];
        regs[SP as usize] = STACK_START;
        Self { regs }
    }

    /// Returns the value in register `idx`.
    ///
    /// Returns [`VmError::InvalidRegister`] if `idx` is out of bounds.
    fn get(&self, idx: u8) -> Result<u8, VmError> {
        self.regs
            .get(idx as usize)
            .copied()
            .ok_or(VmError::InvalidRegister {
                index: idx,
                available: NUM_REGISTERS,
            })
    }

    /// Stores a value into register `idx`.
    ///
    /// Returns [`VmError::InvalidRegister`] if `idx` is out of bounds.
    fn set(&mut self, idx: u8, value: u8) -> Result<(), VmError> {
        let slot = self
            .regs
            .get_mut(idx as usize)
            .ok_or(VmError::InvalidRegister {
                index: idx,
                available: NUM_REGISTERS,
            })?;
        *slot = value;
        Ok(())
    }

    /// Current stack pointer (register 7).
    fn sp(&self) -> u8 {
        self.regs[SP as usize]
    }

    fn set_sp(&mut self, value: u8) {
        self.regs[SP as usize] = value;
    }
}

/// LS-8 machine core.
///
/// Owns memory, registers, flags, and the program counter. A program is
/// placed into memory with [`Cpu::load`] and executed with [`Cpu::run`];
/// nothing else mutates the machine while it runs.
pub struct Cpu {
    /// Flat memory, one byte per address.
    ram: [u8; MEMORY_SIZE],
    /// General-purpose registers; r7 is the stack pointer.
    registers: Registers,
    /// Address of the next instruction to fetch.
    pc: u8,
    /// Opcode fetched for the current cycle.
    ir: u8,
    /// Flags written by CMP and read by the conditional jumps.
    fl: u8,
    /// Cleared only by HLT; sole termination condition of the run loop.
    running: bool,
}

impl Cpu {
    /// Creates a machine with zeroed memory and registers, SP at
    /// [`STACK_START`], and the PC at address 0.
    pub fn new() -> Self {
        Self {
            ram: [0; MEMORY_SIZE],
            registers: Registers::new(),
            pc: 0,
            ir: 0,
            fl: 0,
            running: false,
        }
    }

    /// Copies a program into memory starting at address 0.
    pub fn load(&mut self, program: &[u8]) -> Result<(), VmError> {
        if program.len() > MEMORY_SIZE {
            return Err(VmError::ProgramTooLarge {
                words: program.len(),
                capacity: MEMORY_SIZE,
            });
        }
        self.ram[..program.len()].copy_from_slice(program);
        Ok(())
    }

    /// Reads the byte at `addr`.
    pub fn mem_read(&self, addr: u8) -> u8 {
        self.ram[addr as usize]
    }

    /// Writes `value` to `addr`.
    pub fn mem_write(&mut self, addr: u8, value: u8) {
        self.ram[addr as usize] = value;
    }

    /// Executes instructions until HLT or a fatal error.
    ///
    /// Each cycle fetches the opcode at the PC and unconditionally pre-reads
    /// the two following bytes as candidate operands (wrapping within the
    /// address space), decodes against the instruction table, dispatches
    /// through the ALU or the direct handler set depending on the
    /// classification, and applies the handler's [`Step`] to the PC.
    ///
    /// A byte with no table entry aborts with [`VmError::UnknownOpcode`]
    /// before any register or PC mutation. There is no instruction limit; a
    /// program without HLT runs forever.
    pub fn run<O: Output>(&mut self, out: &mut O) -> Result<(), VmError> {
        self.running = true;

        while self.running {
            let pc = self.pc;
            self.ir = self.mem_read(pc);
            let operand_a = self.mem_read(pc.wrapping_add(1));
            let operand_b = self.mem_read(pc.wrapping_add(2));
            debug!("{}", self.trace());

            let instr =
                Instruction::try_from(self.ir).map_err(|_| VmError::UnknownOpcode {
                    opcode: self.ir,
                    addr: pc,
                })?;

            let step = if instr.is_alu() {
                self.alu(instr, operand_a, operand_b)?
            } else {
                self.exec(instr, out, operand_a, operand_b)?
            };

            match step {
                Step::Advance(n) => self.pc = pc.wrapping_add(n),
                Step::Jump(addr) => self.pc = addr,
                Step::Halt => self.running = false,
            }
        }
        Ok(())
    }

    /// Formats the classic one-line machine trace: PC, FL, the three bytes
    /// at the PC, and every register, all in hex.
    pub fn trace(&self) -> String {
        let mut line = String::new();
        let _ = write!(
            line,
            "TRACE: {:02X} | {:02X}  {:02X} {:02X} {:02X} |",
            self.pc,
            self.fl,
            self.mem_read(self.pc),
            self.mem_read(self.pc.wrapping_add(1)),
            self.mem_read(self.pc.wrapping_add(2)),
        );
        for r in &self.registers.regs {
            let _ = write!(line, " {r:02X}");
        }
        line
    }

    /// Dispatches a directly-handled instruction.
    fn exec<O: Output>(
        &mut self,
        instr: Instruction,
        out: &mut O,
        a: u8,
        b: u8,
    ) -> Result<Step, VmError> {
        match instr {
            Instruction::Hlt => Ok(Step::Halt),
            Instruction::Ldi => self.op_ldi(a, b),
            Instruction::Prn => self.op_prn(out, a),
            Instruction::Push => self.op_push(a),
            Instruction::Pop => self.op_pop(a),
            Instruction::Call => self.op_call(a),
            Instruction::Ret => self.op_ret(),
            Instruction::Jmp => self.op_jmp(a),
            Instruction::Jeq => self.op_jeq(a),
            Instruction::Jne => self.op_jne(a),
            // The run loop routes ALU-classified opcodes to the ALU before
            // this match; forwarding keeps both paths on one table.
            Instruction::Add | Instruction::Mul | Instruction::Cmp => self.alu(instr, a, b),
        }
    }

    /// Executes an ALU-classified instruction on the two operand registers.
    fn alu(&mut self, instr: Instruction, a: u8, b: u8) -> Result<Step, VmError> {
        match instr {
            Instruction::Add => {
                let sum = self.registers.get(a)?.wrapping_add(self.registers.get(b)?);
                self.registers.set(a, sum)?;
                Ok(Step::Advance(3))
            }
            Instruction::Mul => {
                let product = self.registers.get(a)?.wrapping_mul(self.registers.get(b)?);
                self.registers.set(a, product)?;
                Ok(Step::Advance(3))
            }
            Instruction::Cmp => {
                let va = self.registers.get(a)?;
                let vb = self.registers.get(b)?;
                // Exactly one flag bit per comparison.
                self.fl = if va == vb {
                    FL_EQ
                } else if va > vb {
                    FL_GT
                } else {
                    FL_LT
                };
                Ok(Step::Advance(3))
            }
            other => Err(VmError::UnsupportedAluOperation {
                opcode: other as u8,
                addr: self.pc,
            }),
        }
    }

    /// LDI: load an immediate into a register.
    fn op_ldi(&mut self, reg: u8, value: u8) -> Result<Step, VmError> {
        self.registers.set(reg, value)?;
        Ok(Step::Advance(3))
    }

    /// PRN: emit a register's value on the output sink.
    fn op_prn<O: Output>(&mut self, out: &mut O, reg: u8) -> Result<Step, VmError> {
        out.emit(self.registers.get(reg)?);
        Ok(Step::Advance(2))
    }

    /// PUSH: grow the stack downward and store a register at the new top.
    fn op_push(&mut self, reg: u8) -> Result<Step, VmError> {
        let value = self.registers.get(reg)?;
        let sp = self.registers.sp().wrapping_sub(1);
        self.registers.set_sp(sp);
        self.mem_write(sp, value);
        Ok(Step::Advance(2))
    }

    /// POP: load the stack top into a register and shrink the stack.
    fn op_pop(&mut self, reg: u8) -> Result<Step, VmError> {
        let sp = self.registers.sp();
        self.registers.set(reg, self.mem_read(sp))?;
        self.registers.set_sp(sp.wrapping_add(1));
        Ok(Step::Advance(2))
    }

    /// CALL: push the address of the following instruction and jump to the
    /// address held in `reg`.
    fn op_call(&mut self, reg: u8) -> Result<Step, VmError> {
        let target = self.registers.get(reg)?;
        let sp = self.registers.sp().wrapping_sub(1);
        self.registers.set_sp(sp);
        self.mem_write(sp, self.pc.wrapping_add(2));
        Ok(Step::Jump(target))
    }

    /// RET: resume at the return address on top of the stack.
    ///
    /// The stack pointer is left where CALL put it instead of being
    /// incremented past the return address. Known defect, kept on purpose:
    /// each CALL/RET pair leaks one stack slot, which the tests pin. See
    /// DESIGN.md for the rationale.
    fn op_ret(&mut self) -> Result<Step, VmError> {
        Ok(Step::Jump(self.mem_read(self.registers.sp())))
    }

    /// JMP: unconditional transfer to the address held in `reg`.
    fn op_jmp(&mut self, reg: u8) -> Result<Step, VmError> {
        Ok(Step::Jump(self.registers.get(reg)?))
    }

    /// JEQ: transfer to the address in `reg` if the Equal flag is set.
    fn op_jeq(&mut self, reg: u8) -> Result<Step, VmError> {
        if self.fl & FL_EQ != 0 {
            Ok(Step::Jump(self.registers.get(reg)?))
        } else {
            Ok(Step::Advance(2))
        }
    }

    /// JNE: transfer to the address in `reg` if the Equal flag is clear.
    fn op_jne(&mut self, reg: u8) -> Result<Step, VmError> {
        if self.fl & FL_EQ == 0 {
            Ok(Step::Jump(self.registers.get(reg)?))
        } else {
            Ok(Step::Advance(2))
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::Captured;

    const HLT: u8 = Instruction::Hlt as u8;
    const LDI: u8 = Instruction::Ldi as u8;
    const PRN: u8 = Instruction::Prn as u8;
    const PUSH: u8 = Instruction::Push as u8;
    const POP: u8 = Instruction::Pop as u8;
    const CALL: u8 = Instruction::Call as u8;
    const RET: u8 = Instruction::Ret as u8;
    const JMP: u8 = Instruction::Jmp as u8;
    const JEQ: u8 = Instruction::Jeq as u8;
    const JNE: u8 = Instruction::Jne as u8;
    const ADD: u8 = Instruction::Add as u8;
    const MUL: u8 = Instruction::Mul as u8;
    const CMP: u8 = Instruction::Cmp as u8;

    fn run_cpu(program: &[u8]) -> (Cpu, Vec<u8>) {
        let mut cpu = Cpu::new();
        cpu.load(program).expect("load failed");
        let mut out = Captured::new();
        cpu.run(&mut out).expect("run failed");
        (cpu, out.values)
    }

    fn run_expect_err(program: &[u8]) -> (Cpu, VmError) {
        let mut cpu = Cpu::new();
        cpu.load(program).expect("load failed");
        let mut out = Captured::new();
        let err = cpu.run(&mut out).expect_err("expected error");
        (cpu, err)
    }

    // ==================== Construction and loading ====================

    #[test]
    fn new_machine_state() {
        let cpu = Cpu::new();
        assert_eq!(cpu.pc, 0);
        assert_eq!(cpu.fl, 0);
        assert!(!cpu.running);
        assert_eq!(cpu.registers.sp(), STACK_START);
        assert_eq!(cpu.registers.regs[..7], [0; 7]);
        assert!(cpu.ram.iter().all(|b| *b == 0));
    }

    #[test]
    fn load_writes_from_address_zero() {
        let mut cpu = Cpu::new();
        cpu.load(&[LDI, 0, 8, HLT]).unwrap();
        assert_eq!(cpu.mem_read(0), LDI);
        assert_eq!(cpu.mem_read(3), HLT);
        assert_eq!(cpu.mem_read(4), 0);
    }

    #[test]
    fn load_rejects_oversized_program() {
        let mut cpu = Cpu::new();
        assert!(matches!(
            cpu.load(&[0; MEMORY_SIZE + 1]),
            Err(VmError::ProgramTooLarge {
                words: 257,
                capacity: 256,
            })
        ));
    }

    // ==================== Data movement ====================

    #[test]
    fn ldi_sets_register() {
        let (cpu, _) = run_cpu(&[LDI, 3, 0xAB, HLT]);
        assert_eq!(cpu.registers.get(3).unwrap(), 0xAB);
    }

    #[test]
    fn ldi_rejects_register_out_of_range() {
        let (_, err) = run_expect_err(&[LDI, 8, 1, HLT]);
        assert!(matches!(
            err,
            VmError::InvalidRegister {
                index: 8,
                available: 8,
            }
        ));
    }

    #[test]
    fn prn_emits_register_value() {
        let (_, output) = run_cpu(&[LDI, 0, 42, PRN, 0, HLT]);
        assert_eq!(output, vec![42]);
    }

    // ==================== ALU ====================

    #[test]
    fn add_sums_into_first_register() {
        let (cpu, _) = run_cpu(&[LDI, 0, 10, LDI, 1, 32, ADD, 0, 1, HLT]);
        assert_eq!(cpu.registers.get(0).unwrap(), 42);
        assert_eq!(cpu.registers.get(1).unwrap(), 32);
    }

    #[test]
    fn add_wraps_modulo_256() {
        let (cpu, _) = run_cpu(&[LDI, 0, 200, LDI, 1, 100, ADD, 0, 1, HLT]);
        assert_eq!(cpu.registers.get(0).unwrap(), 44);
    }

    #[test]
    fn mul_multiplies_into_first_register() {
        let (cpu, _) = run_cpu(&[LDI, 0, 8, LDI, 1, 9, MUL, 0, 1, HLT]);
        assert_eq!(cpu.registers.get(0).unwrap(), 72);
    }

    #[test]
    fn mul_wraps_modulo_256() {
        let (cpu, _) = run_cpu(&[LDI, 0, 16, LDI, 1, 16, MUL, 0, 1, HLT]);
        assert_eq!(cpu.registers.get(0).unwrap(), 0);
    }

    #[test]
    fn cmp_sets_exactly_one_flag() {
        let (cpu, _) = run_cpu(&[LDI, 0, 5, LDI, 1, 5, CMP, 0, 1, HLT]);
        assert_eq!(cpu.fl, FL_EQ);

        let (cpu, _) = run_cpu(&[LDI, 0, 9, LDI, 1, 5, CMP, 0, 1, HLT]);
        assert_eq!(cpu.fl, FL_GT);

        let (cpu, _) = run_cpu(&[LDI, 0, 5, LDI, 1, 9, CMP, 0, 1, HLT]);
        assert_eq!(cpu.fl, FL_LT);

        assert_eq!(cpu.fl.count_ones(), 1);
    }

    #[test]
    fn cmp_overwrites_previous_flags() {
        let (cpu, _) = run_cpu(&[
            LDI, 0, 9, LDI, 1, 5, CMP, 0, 1, // greater
            CMP, 1, 0, // then less
            HLT,
        ]);
        assert_eq!(cpu.fl, FL_LT);
    }

    // ==================== Stack ====================

    #[test]
    fn push_grows_stack_downward() {
        let (cpu, _) = run_cpu(&[LDI, 0, 42, PUSH, 0, HLT]);
        assert_eq!(cpu.registers.sp(), STACK_START - 1);
        assert_eq!(cpu.mem_read(STACK_START - 1), 42);
    }

    #[test]
    fn push_pop_round_trips() {
        let (cpu, _) = run_cpu(&[LDI, 0, 42, PUSH, 0, LDI, 0, 0, POP, 0, HLT]);
        assert_eq!(cpu.registers.get(0).unwrap(), 42);
        assert_eq!(cpu.registers.sp(), STACK_START);
    }

    #[test]
    fn pop_returns_values_in_lifo_order() {
        let (cpu, _) = run_cpu(&[
            LDI, 0, 1, LDI, 1, 2, PUSH, 0, PUSH, 1, POP, 2, POP, 3, HLT,
        ]);
        assert_eq!(cpu.registers.get(2).unwrap(), 2);
        assert_eq!(cpu.registers.get(3).unwrap(), 1);
        assert_eq!(cpu.registers.sp(), STACK_START);
    }

    // ==================== Control transfer ====================

    #[test]
    fn call_pushes_return_address_and_jumps() {
        // 0: LDI r0, 6
        // 3: CALL r0   (return address is 5)
        // 5: 0xFF      (would abort if CALL fell through)
        // 6: HLT
        let (cpu, _) = run_cpu(&[LDI, 0, 6, CALL, 0, 0xFF, HLT]);
        assert_eq!(cpu.pc, 6);
        assert_eq!(cpu.registers.sp(), STACK_START - 1);
        assert_eq!(cpu.mem_read(STACK_START - 1), 5);
    }

    #[test]
    fn ret_resumes_after_call() {
        // 0: LDI r0, 6
        // 3: CALL r0
        // 5: HLT
        // 6: RET
        let (cpu, _) = run_cpu(&[LDI, 0, 6, CALL, 0, HLT, RET]);
        assert_eq!(cpu.pc, 5);
    }

    #[test]
    fn ret_leaves_sp_where_call_put_it() {
        // RET reads the return address without popping it; the slot CALL
        // claimed stays claimed. Pinned so a "fix" does not slip in
        // silently.
        let (cpu, _) = run_cpu(&[LDI, 0, 6, CALL, 0, HLT, RET]);
        assert_eq!(cpu.registers.sp(), STACK_START - 1);
        assert_eq!(cpu.mem_read(STACK_START - 1), 5);
    }

    #[test]
    fn jmp_transfers_unconditionally() {
        // 0: LDI r0, 6
        // 3: JMP r0
        // 5: 0xFF      (skipped when the jump is taken)
        // 6: HLT
        let (cpu, _) = run_cpu(&[LDI, 0, 6, JMP, 0, 0xFF, HLT]);
        assert_eq!(cpu.pc, 6);
    }

    #[test]
    fn jeq_taken_when_equal() {
        // 0: LDI r0, 1 / 3: LDI r1, 1 / 6: CMP r0, r1
        // 9: LDI r2, 15 / 12: JEQ r2
        // 14: 0xFF 15: HLT
        let (cpu, _) = run_cpu(&[
            LDI, 0, 1, LDI, 1, 1, CMP, 0, 1, LDI, 2, 15, JEQ, 2, 0xFF, HLT,
        ]);
        assert_eq!(cpu.pc, 15);
    }

    #[test]
    fn jeq_falls_through_when_not_equal() {
        // 14: HLT on the fall-through path, 15: 0xFF at the jump target.
        let (_, output) = run_cpu(&[
            LDI, 0, 1, LDI, 1, 2, CMP, 0, 1, LDI, 2, 15, JEQ, 2, HLT, 0xFF,
        ]);
        assert_eq!(output, vec![]);
    }

    #[test]
    fn jne_taken_when_not_equal() {
        let (cpu, _) = run_cpu(&[
            LDI, 0, 1, LDI, 1, 2, CMP, 0, 1, LDI, 2, 15, JNE, 2, 0xFF, HLT,
        ]);
        assert_eq!(cpu.pc, 15);
    }

    #[test]
    fn jne_falls_through_when_equal() {
        let (cpu, _) = run_cpu(&[
            LDI, 0, 1, LDI, 1, 1, CMP, 0, 1, LDI, 2, 15, JNE, 2, HLT, 0xFF,
        ]);
        assert_eq!(cpu.pc, 14);
    }

    // ==================== Halting and errors ====================

    #[test]
    fn hlt_stops_before_following_bytes() {
        let (cpu, output) = run_cpu(&[HLT, 0xFF, 0xFF]);
        assert_eq!(cpu.pc, 0);
        assert_eq!(output, vec![]);
    }

    #[test]
    fn unknown_opcode_aborts_without_side_effects() {
        let (cpu, err) = run_expect_err(&[LDI, 0, 5, 0xFF]);
        assert!(matches!(
            err,
            VmError::UnknownOpcode {
                opcode: 0xFF,
                addr: 3,
            }
        ));
        // The failing fetch left the machine as the previous instruction
        // ended it.
        assert_eq!(cpu.pc, 3);
        assert_eq!(cpu.registers.get(0).unwrap(), 5);
        assert_eq!(cpu.registers.sp(), STACK_START);
    }

    #[test]
    fn alu_rejects_direct_instruction() {
        let mut cpu = Cpu::new();
        assert!(matches!(
            cpu.alu(Instruction::Ldi, 0, 0),
            Err(VmError::UnsupportedAluOperation { .. })
        ));
    }

    // ==================== End to end ====================

    #[test]
    fn mult_program_prints_72() {
        let (_, output) = run_cpu(&[LDI, 0, 8, LDI, 1, 9, MUL, 0, 1, PRN, 0, HLT]);
        assert_eq!(output, vec![72]);
    }

    #[test]
    fn trace_formats_machine_state() {
        let mut cpu = Cpu::new();
        cpu.load(&[LDI, 0, 8]).unwrap();
        assert_eq!(
            cpu.trace(),
            "TRACE: 00 | 00  82 00 08 | 00 00 00 00 00 00 00 F4"
        );
    }
}
