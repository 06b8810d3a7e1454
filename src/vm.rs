//! The Grol virtual machine: an accumulator+stack register machine
//! executing 64-bit instruction words out of a mutable program memory.

use std::fmt::{Display, Formatter};
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use lazy_static::lazy_static;
use log::{debug, error, trace, warn};
use prettytable::{format as TableFormat, row, table, Table};
use thiserror::Error;

use crate::bytecode::isa::DecodeError;
use crate::bytecode::str8;
use crate::bytecode::{Instruction, Opcode, Syscall, Word};

/// Fixed capacity of the call/data stack, in words.
pub const STACK_SIZE: usize = 256;

/**
  A fatal runtime fault. Each class carries its own process exit code:
  the unknown-opcode and unknown-syscall codes are contractual, the rest
  are this implementation's choices.
*/
#[derive(Copy, Clone, Eq, PartialEq, Debug, Error)]
pub enum ExecError {
  #[error("unknown opcode 0x{opcode:02x} at pc {pc}")]
  UnknownOpcode { opcode: u8, pc: i64 },

  #[error("unknown syscall id {id} at pc {pc}")]
  UnknownSyscall { id: u8, pc: i64 },

  #[error("division by zero at pc {pc}")]
  DivisionByZero { pc: i64 },

  #[error("program memory access out of range at pc {pc}: index {index} of {len}")]
  ProgramOutOfBounds { index: i64, len: usize, pc: i64 },

  #[error("stack access out of range at pc {pc}: position {position}")]
  StackFault { position: i64, pc: i64 },

  #[error("read syscall length out of range (1 to 255): {len} at pc {pc}")]
  InvalidReadLength { len: i64, pc: i64 },
}

impl ExecError {
  /// The exit code the process reports when this fault aborts the VM.
  pub fn exit_code(&self) -> i64 {
    match self {
      ExecError::UnknownOpcode { .. }      => -1,
      ExecError::UnknownSyscall { .. }     => 99,
      ExecError::DivisionByZero { .. }     => 98,
      ExecError::ProgramOutOfBounds { .. } => 97,
      ExecError::StackFault { .. }         => 96,
      ExecError::InvalidReadLength { .. }  => 95,
    }
  }
}

pub struct GVM {
  // Registers //
  accumulator :  i64,
  pc          :  i64,
  sp          :  i64, // -1 = empty stack

  // Memory stores //
  program :  Vec<Word>,
  stack   :  [Word; STACK_SIZE],
}

impl GVM {
  // region Construction and accessors

  pub fn new(program: Vec<Word>) -> GVM {
    GVM {
      accumulator :  0,
      pc          :  0,
      sp          :  -1,

      program,
      stack       :  [0; STACK_SIZE],
    }
  }

  pub fn accumulator(&self) -> i64 {
    self.accumulator
  }

  /// Number of live stack slots.
  pub fn stack_depth(&self) -> i64 {
    self.sp + 1
  }

  /// Program memory, mutable at runtime, so possibly not what was loaded.
  pub fn program(&self) -> &[Word] {
    &self.program
  }

  // endregion

  // region Memory access

  fn prog(&self, index: i64) -> Result<Word, ExecError> {
    match (0..self.program.len() as i64).contains(&index) {
      true  => Ok(self.program[index as usize]),
      false => Err(ExecError::ProgramOutOfBounds {
        index,
        len: self.program.len(),
        pc: self.pc,
      }),
    }
  }

  fn prog_set(&mut self, index: i64, value: Word) -> Result<(), ExecError> {
    match (0..self.program.len() as i64).contains(&index) {
      true => {
        self.program[index as usize] = value;
        Ok(())
      }
      false => Err(ExecError::ProgramOutOfBounds {
        index,
        len: self.program.len(),
        pc: self.pc,
      }),
    }
  }

  /// The stack slot at `stack[SP - offset]`.
  fn stack_at(&self, offset: i64) -> Result<Word, ExecError> {
    let index = self.sp - offset;
    match (0..STACK_SIZE as i64).contains(&index) {
      true  => Ok(self.stack[index as usize]),
      false => Err(ExecError::StackFault { position: index, pc: self.pc }),
    }
  }

  fn stack_set(&mut self, offset: i64, value: Word) -> Result<(), ExecError> {
    let index = self.sp - offset;
    match (0..STACK_SIZE as i64).contains(&index) {
      true => {
        self.stack[index as usize] = value;
        Ok(())
      }
      false => Err(ExecError::StackFault { position: index, pc: self.pc }),
    }
  }

  fn push(&mut self, value: Word) -> Result<(), ExecError> {
    self.sp += 1;
    match (0..STACK_SIZE as i64).contains(&self.sp) {
      true => {
        self.stack[self.sp as usize] = value;
        Ok(())
      }
      false => Err(ExecError::StackFault { position: self.sp, pc: self.pc }),
    }
  }

  fn nonzero(&self, divisor: i64) -> Result<i64, ExecError> {
    match divisor {
      0 => Err(ExecError::DivisionByZero { pc: self.pc }),
      _ => Ok(divisor),
    }
  }

  // endregion

  // region Execution

  /// Runs the program against the real standard streams.
  pub fn execute(&mut self) -> Result<i64, ExecError> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    self.execute_with(&mut stdin.lock(), &mut stdout.lock())
  }

  /**
    Runs the program to completion against the given streams and returns
    the exit code: the `Exit` syscall's operand, or 0 with a warning when
    the PC falls off the end of program memory.
  */
  pub fn execute_with<R: Read, W: Write>(
    &mut self,
    input: &mut R,
    output: &mut W,
  ) -> Result<i64, ExecError> {
    let result = self.dispatch(input, output);
    if let Err(fault) = &result {
      debug!("machine state at fault ({}):\n{}", fault, self);
    }
    result
  }

  fn dispatch<R: Read, W: Write>(
    &mut self,
    input: &mut R,
    output: &mut W,
  ) -> Result<i64, ExecError> {
    use Opcode::*;

    while self.pc < self.program.len() as i64 {
      let word = self.prog(self.pc)?;
      let instruction = match Instruction::try_decode(word) {
        Ok(instruction) => instruction,
        Err(DecodeError::UnknownOpcode(opcode)) => {
          return Err(ExecError::UnknownOpcode { opcode, pc: self.pc });
        }
        Err(DecodeError::UnknownSyscall(id)) => {
          return Err(ExecError::UnknownSyscall { id, pc: self.pc });
        }
      };
      trace!("pc {:>4}  a {:>20}  {}", self.pc, self.accumulator, instruction);

      match instruction {
        Instruction::Wide { opcode, operand } => {
          match opcode {
            // Immediates //
            LoadI  => self.accumulator = operand,
            AddI   => self.accumulator = self.accumulator.wrapping_add(operand),
            SubI   => self.accumulator = self.accumulator.wrapping_sub(operand),
            MulI   => self.accumulator = self.accumulator.wrapping_mul(operand),
            DivI   => self.accumulator = self.accumulator.wrapping_div(self.nonzero(operand)?),
            ModI   => self.accumulator = self.accumulator.wrapping_rem(self.nonzero(operand)?),
            ShiftI => self.accumulator = shifted(self.accumulator, operand),
            AndI   => self.accumulator &= operand,

            JumpR => {
              self.pc += operand;
              continue;
            }

            // Program-memory relative //
            LoadR  => self.accumulator = self.prog(self.pc + operand)?,
            AddR   => {
              self.accumulator = self.accumulator.wrapping_add(self.prog(self.pc + operand)?)
            }
            SubR   => {
              self.accumulator = self.accumulator.wrapping_sub(self.prog(self.pc + operand)?)
            }
            MulR   => {
              self.accumulator = self.accumulator.wrapping_mul(self.prog(self.pc + operand)?)
            }
            DivR   => {
              let divisor = self.nonzero(self.prog(self.pc + operand)?)?;
              self.accumulator = self.accumulator.wrapping_div(divisor);
            }
            StoreR => self.prog_set(self.pc + operand, self.accumulator)?,

            // Call frame //
            Call => {
              self.push(self.pc + 1)?;
              self.pc += operand;
              continue;
            }
            Ret => {
              // The locals declared by `var` sit above the return PC, so
              // they are dropped first.
              if operand > 0 {
                self.sp -= operand;
              }
              self.pc = self.stack_at(0)?;
              self.sp -= 1;
              continue;
            }
            Push => {
              for _ in 0..operand.max(0) {
                self.push(0)?;
              }
              self.push(self.accumulator)?;
            }
            Pop => {
              self.accumulator = self.stack_at(0)?;
              self.sp -= 1;
              if operand > 0 {
                self.sp -= operand;
              }
            }

            // Stack relative //
            LoadS  => self.accumulator = self.stack_at(operand)?,
            StoreS => self.stack_set(operand, self.accumulator)?,
            AddS   => {
              self.accumulator = self.accumulator.wrapping_add(self.stack_at(operand)?)
            }
            SubS   => {
              self.accumulator = self.accumulator.wrapping_sub(self.stack_at(operand)?)
            }
            MulS   => {
              self.accumulator = self.accumulator.wrapping_mul(self.stack_at(operand)?)
            }
            DivS   => {
              let divisor = self.nonzero(self.stack_at(operand)?)?;
              self.accumulator = self.accumulator.wrapping_div(divisor);
            }
            IdivS => {
              // Quotient replaces the slot, remainder lands in A.
              let current = self.stack_at(operand)?;
              let divisor = self.nonzero(self.accumulator)?;
              self.stack_set(operand, current.wrapping_div(divisor))?;
              self.accumulator = current.wrapping_rem(divisor);
            }

            _ => {
              unreachable!("the opcode {} was decoded as {}", opcode, instruction);
            }
          }
        }

        Instruction::Packed { opcode, small, operand } => {
          match opcode {
            Jne | Jeq | Jlt | Jgt | Jgte | Jlte => {
              if jump_taken(opcode, self.accumulator, i64::from(small)) {
                self.pc += operand;
                continue;
              }
            }

            IncrR => {
              let address = self.pc + operand;
              let value = self.prog(address)?.wrapping_add(i64::from(small as i8));
              self.prog_set(address, value)?;
              self.accumulator = value;
            }

            IncrS => {
              let value = self.stack_at(operand)?.wrapping_add(i64::from(small as i8));
              self.stack_set(operand, value)?;
              self.accumulator = value;
            }

            StoreSb => {
              // `operand` is the base of the byte span, `small` the stack
              // index holding the byte offset within it.
              let byte_offset = self.stack_at(i64::from(small))?;
              let position = (self.sp - operand) * 8 + byte_offset;
              if position < 0 {
                return Err(ExecError::StackFault { position, pc: self.pc });
              }
              str8::set_byte_at(&mut self.stack, position as usize, self.accumulator as u8)
                .ok_or(ExecError::StackFault { position, pc: self.pc })?;
            }

            _ => {
              unreachable!("the opcode {} was decoded as {}", opcode, instruction);
            }
          }
        }

        Instruction::Syscall { opcode, call, operand } => {
          let on_stack = opcode == SysS;
          debug!(
            "syscall {} at pc {}, accumulator {}, operand {}",
            call, self.pc, self.accumulator, operand
          );
          match call {
            Syscall::Exit => return Ok(operand),

            Syscall::Sleep => thread::sleep(Duration::from_millis(operand.max(0) as u64)),

            Syscall::Read => {
              self.accumulator = self.sys_read(input, on_stack, operand)?;
            }

            Syscall::Write => {
              self.accumulator = self.sys_write(output, on_stack, operand)?;
            }
          }
        }
      }

      #[cfg(feature = "trace_execution")]
      println!("{}", self);

      self.pc += 1;
    }

    warn!(
      "program ended without an explicit Exit syscall; accumulator {}, pc {}",
      self.accumulator, self.pc
    );
    Ok(0)
  }

  // endregion

  // region Syscalls

  /**
    Reads up to `accumulator` bytes (1 to 255) from `input` into the str8
    slot at `PC + operand` (program memory) or `SP − operand` (stack). The
    actual count goes into the slot's length byte and is returned; 0 on
    EOF, −1 on an I/O error.
  */
  fn sys_read<R: Read>(
    &mut self,
    input: &mut R,
    on_stack: bool,
    operand: i64,
  ) -> Result<i64, ExecError> {
    let want = self.accumulator;
    if !(1..=255).contains(&want) {
      return Err(ExecError::InvalidReadLength { len: want, pc: self.pc });
    }

    let mut buffer = [0u8; 255];
    let got = match input.read(&mut buffer[..want as usize]) {
      Ok(count) => count,
      Err(e) => {
        error!("read syscall failed: {}", e);
        return Ok(-1);
      }
    };
    trace!("read syscall: {} bytes from input", got);
    if got == 0 {
      return Ok(0);
    }

    let word_index = match on_stack {
      true  => self.sp - operand,
      false => self.pc + operand,
    };
    let pc = self.pc;
    let program_len = self.program.len();
    let oob = |position: i64| match on_stack {
      true  => ExecError::StackFault { position, pc },
      false => ExecError::ProgramOutOfBounds { index: position, len: program_len, pc },
    };
    if word_index < 0 {
      return Err(oob(word_index));
    }

    let words: &mut [Word] = match on_stack {
      true  => &mut self.stack,
      false => &mut self.program,
    };
    let base = word_index as usize * 8;
    str8::set_byte_at(words, base, got as u8).ok_or_else(|| oob(word_index))?;
    for (offset, &byte) in buffer[..got].iter().enumerate() {
      str8::set_byte_at(words, base + 1 + offset, byte).ok_or_else(|| oob(word_index))?;
    }
    Ok(got as i64)
  }

  /**
    Writes the str8 at `PC + operand` (program memory, from byte 0 of the
    word) or at `SP − operand` with the accumulator as a byte offset (stack)
    to `output`. Returns the byte count, or −1 on an I/O error or short
    write.
  */
  fn sys_write<W: Write>(
    &mut self,
    output: &mut W,
    on_stack: bool,
    operand: i64,
  ) -> Result<i64, ExecError> {
    let position = match on_stack {
      true  => (self.sp - operand) * 8 + self.accumulator,
      false => (self.pc + operand) * 8,
    };
    let pc = self.pc;
    let program_len = self.program.len();
    let oob = |position: i64| match on_stack {
      true  => ExecError::StackFault { position, pc },
      false => ExecError::ProgramOutOfBounds {
        index: position.div_euclid(8),
        len: program_len,
        pc,
      },
    };
    if position < 0 {
      return Err(oob(position));
    }

    let words: &[Word] = match on_stack {
      true  => &self.stack,
      false => &self.program,
    };
    let bytes = str8::decode_at(words, position as usize).ok_or_else(|| oob(position))?;
    if bytes.is_empty() {
      return Ok(0);
    }

    trace!("write syscall: {} bytes", bytes.len());
    match output.write_all(&bytes).and_then(|_| output.flush()) {
      Ok(()) => Ok(bytes.len() as i64),
      Err(e) => {
        // With SIGPIPE ignored (the Rust runtime's default), a closed pipe
        // lands here as an error rather than killing the process.
        error!("write syscall failed: {}", e);
        Ok(-1)
      }
    }
  }

  // endregion
}

/// `ShiftI`: positive amounts shift left, negative shift right
/// (arithmetic). Amounts past the word size saturate instead of wrapping.
fn shifted(value: i64, amount: i64) -> i64 {
  if amount < 0 {
    value >> amount.unsigned_abs().min(63)
  } else if amount >= 64 {
    0
  } else {
    value.wrapping_shl(amount as u32)
  }
}

fn jump_taken(opcode: Opcode, accumulator: i64, value: i64) -> bool {
  match opcode {
    Opcode::Jne  => accumulator != value,
    Opcode::Jeq  => accumulator == value,
    Opcode::Jlt  => accumulator < value,
    Opcode::Jgt  => accumulator > value,
    Opcode::Jgte => accumulator >= value,
    Opcode::Jlte => accumulator <= value,
    _ => unreachable!("{} is not a conditional jump", opcode),
  }
}

// region State display

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

fn make_memory_table(name: &str, cells: &[Word], highlight: i64) -> Table {
  let mut table = Table::new();

  table.set_format(*TABLE_DISPLAY_FORMAT);
  table.set_titles(row![ubr->"Address", ubl->"Contents"]);

  for (i, word) in cells.iter().enumerate() {
    let contents = format!("{:#018x}", word);
    match i as i64 == highlight {
      true => {
        table.add_row(row![r->format!("* --> {}[{}] =", name, i), contents]);
      }
      false => {
        table.add_row(row![r->format!("{}[{}] =", name, i), contents]);
      }
    }
  }
  table
}

impl Display for GVM {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let program_table = make_memory_table("P", &self.program, self.pc);
    let live = (self.sp + 1).max(0) as usize;
    let stack_table = make_memory_table("S", &self.stack[..live], self.sp);

    let mut combined_table = table!([program_table, stack_table]);
    combined_table.set_titles(row![ub->"Program", ub->"Stack"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    write!(
      f,
      "A: {}  PC: {}  SP: {}\n{}",
      self.accumulator, self.pc, self.sp, combined_table
    )
  }
}

// endregion

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assembler::assemble;

  /// Assembles and runs a source program with empty input, returning the
  /// machine and its exit code.
  fn run(source: &str) -> (GVM, i64) {
    run_with_input(source, b"")
  }

  fn run_with_input(source: &str, input: &[u8]) -> (GVM, i64) {
    let code = assemble(source).expect("assembly failed");
    let mut vm = GVM::new(code);
    let mut reader = &input[..];
    let mut output = Vec::new();
    let exit = vm.execute_with(&mut reader, &mut output).expect("vm fault");
    (vm, exit)
  }

  fn run_fault(source: &str) -> ExecError {
    let code = assemble(source).expect("assembly failed");
    let mut vm = GVM::new(code);
    let mut reader = &b""[..];
    let mut output = Vec::new();
    vm.execute_with(&mut reader, &mut output)
      .expect_err("expected a fault")
  }

  #[test]
  fn exit_with_code() {
    let (_, exit) = run("sys exit 7");
    assert_eq!(exit, 7);
  }

  #[test]
  fn immediate_arithmetic() {
    let (vm, exit) = run("LoadI 2\nAddI 3\nSys Exit 0");
    assert_eq!(exit, 0);
    assert_eq!(vm.accumulator(), 5);

    let (vm, _) = run("LoadI 7\nMulI 6\nSubI 2\nDivI 4\nModI 7\nsys exit 0");
    assert_eq!(vm.accumulator(), 3); // ((7*6 - 2) / 4) % 7 = 10 % 7

    let (vm, _) = run("LoadI 1\nShiftI 4\nAddI 1\nShiftI -2\nAndI 5\nsys exit 0");
    assert_eq!(vm.accumulator(), 4); // ((16+1) >> 2) & 5
  }

  #[test]
  fn division_truncates_toward_zero() {
    let (vm, _) = run("LoadI -7\nDivI 2\nsys exit 0");
    assert_eq!(vm.accumulator(), -3);
    let (vm, _) = run("LoadI -7\nModI 2\nsys exit 0");
    assert_eq!(vm.accumulator(), -1);
  }

  #[test]
  fn countdown_loop() {
    let (vm, exit) = run("LoadI 3\nloop: AddI -1\nJNE 0 loop\nSys Exit 0");
    assert_eq!(exit, 0);
    assert_eq!(vm.accumulator(), 0);
  }

  #[test]
  fn forward_conditional_jump() {
    // A == 1, so JEQ 1 skips the LoadI 9.
    let (vm, _) = run("LoadI 1\nJEQ 1 skip\nLoadI 9\nskip: sys exit 0");
    assert_eq!(vm.accumulator(), 1);
  }

  #[test]
  fn falling_off_the_end_returns_zero() {
    let (vm, exit) = run("LoadI 5");
    assert_eq!(exit, 0);
    assert_eq!(vm.accumulator(), 5);
  }

  #[test]
  fn call_with_locals_and_params() {
    let source = "LoadI 41
Push 0
Call f
sys exit 0
f: var x
param a
LoadS a
AddI 1
StoreS x
return";
    let (vm, exit) = run(source);
    assert_eq!(exit, 0);
    assert_eq!(vm.accumulator(), 42);
    assert_eq!(vm.stack_depth(), 1); // only the caller-pushed parameter remains
  }

  #[test]
  fn call_ret_balance() {
    let (vm, exit) = run("Call f\nsys exit 0\nf: var x\nreturn");
    assert_eq!(exit, 0);
    assert_eq!(vm.stack_depth(), 0);
  }

  #[test]
  fn push_and_pop_counts() {
    // Push 2 = two zero slots plus A; Pop 2 = A from the top, then 2 more.
    let (vm, _) = run("LoadI 9\nPush 2\nLoadI 0\nPop 2\nsys exit 0");
    assert_eq!(vm.accumulator(), 9);
    assert_eq!(vm.stack_depth(), 0);
  }

  #[test]
  fn stack_arithmetic() {
    let (vm, _) = run("LoadI 10\nPush 0\nLoadI 4\nAddS 0\nMulS 0\nSubS 0\nsys exit 0");
    assert_eq!(vm.accumulator(), 130); // ((4+10) * 10) - 10
  }

  #[test]
  fn idivs_quotient_and_remainder() {
    let (vm, _) = run("LoadI 17\nPush 0\nLoadI 5\nIdivS 0\nsys exit 0");
    assert_eq!(vm.accumulator(), 2); // remainder
    let (vm, _) = run("LoadI 17\nPush 0\nLoadI 5\nIdivS 0\nPop 0\nsys exit 0");
    assert_eq!(vm.accumulator(), 3); // quotient left in the slot
  }

  #[test]
  fn incrs_updates_slot_and_accumulator() {
    let (vm, _) = run("LoadI 40\nPush 0\nIncrS 2 0\nPop 0\nsys exit 0");
    assert_eq!(vm.accumulator(), 42);
  }

  #[test]
  fn incrr_is_self_modifying() {
    let (vm, _) = run("JumpR start\ncounter: data 40\nstart: IncrR 2 counter\nsys exit 0");
    assert_eq!(vm.accumulator(), 42);
    assert_eq!(vm.program()[1], 42);
  }

  #[test]
  fn storer_writes_program_memory() {
    let (vm, _) = run("LoadI 7\nStoreR 2\nsys exit 0\ndata 0");
    assert_eq!(vm.program()[3], 7);
  }

  #[test]
  fn loadr_reads_program_memory() {
    let (vm, _) = run("JumpR start\nvalue: data 1234\nstart: LoadR value\nsys exit 0");
    assert_eq!(vm.accumulator(), 1234);
  }

  #[test]
  fn sleep_preserves_accumulator() {
    let (vm, exit) = run("LoadI 9\nsys sleep 0\nsys exit 0");
    assert_eq!(exit, 0);
    assert_eq!(vm.accumulator(), 9);
  }

  #[test]
  fn write_str8_from_program_memory() {
    let source = "JumpR prog\nmsg: str8 \"Hi\"\nprog: sys write msg\nsys exit 0";
    let code = assemble(source).unwrap();
    let mut vm = GVM::new(code);
    let mut output = Vec::new();
    let exit = vm.execute_with(&mut &b""[..], &mut output).unwrap();
    assert_eq!(exit, 0);
    assert_eq!(output, b"Hi");
    assert_eq!(vm.accumulator(), 2); // bytes written
  }

  #[test]
  fn read_and_write_through_the_stack() {
    // Reserve one stack word, read up to 5 bytes into it as a str8, then
    // write it back out.
    let source = "LoadI 0
Push 0
LoadI 5
syss read 0
LoadI 0
syss write 0
sys exit 0";
    let code = assemble(source).unwrap();
    let mut vm = GVM::new(code);
    let mut output = Vec::new();
    let exit = vm.execute_with(&mut &b"hello"[..], &mut output).unwrap();
    assert_eq!(exit, 0);
    assert_eq!(output, b"hello");
  }

  #[test]
  fn read_reports_eof_as_zero() {
    let (vm, exit) = run_with_input("LoadI 5\nLoadI 0\nPush 0\nLoadI 5\nsyss read 0\nsys exit 0", b"");
    assert_eq!(exit, 0);
    assert_eq!(vm.accumulator(), 0);
  }

  #[test]
  fn storesb_builds_a_string_byte_by_byte() {
    // Stack: offset 1 holds the str8 word, offset 0 tracks the byte cursor.
    let source = "LoadI 0
Push 1
LoadI 2
StoreSB 1 0
IncrS 1 0
LoadI 0x41
StoreSB 1 0
IncrS 1 0
LoadI 0x42
StoreSB 1 0
LoadI 0
SysS Write 1
sys exit 0";
    let code = assemble(source).unwrap();
    let mut vm = GVM::new(code);
    let mut output = Vec::new();
    let exit = vm.execute_with(&mut &b""[..], &mut output).unwrap();
    assert_eq!(exit, 0);
    assert_eq!(output, b"AB");
  }

  #[test]
  fn unknown_opcode_faults() {
    let mut vm = GVM::new(vec![0xFE]);
    let fault = vm.execute_with(&mut &b""[..], &mut Vec::new()).unwrap_err();
    assert!(matches!(fault, ExecError::UnknownOpcode { opcode: 0xFE, pc: 0 }));
    assert_eq!(fault.exit_code(), -1);
  }

  #[test]
  fn unknown_syscall_faults() {
    // Sys opcode with syscall id 9 in the middle byte.
    let word = crate::bytecode::word::set_opcode(0x0900, Opcode::Sys.code());
    let mut vm = GVM::new(vec![word]);
    let fault = vm.execute_with(&mut &b""[..], &mut Vec::new()).unwrap_err();
    assert!(matches!(fault, ExecError::UnknownSyscall { id: 9, .. }));
    assert_eq!(fault.exit_code(), 99);
  }

  #[test]
  fn division_by_zero_faults() {
    let fault = run_fault("LoadI 5\nDivI 0");
    assert!(matches!(fault, ExecError::DivisionByZero { pc: 1 }));
    assert_eq!(fault.exit_code(), 98);

    let fault = run_fault("LoadI 5\nPush 0\nLoadI 0\nIdivS 0");
    assert!(matches!(fault, ExecError::DivisionByZero { .. }));
  }

  #[test]
  fn program_access_out_of_range_faults() {
    let fault = run_fault("LoadR 100");
    assert!(matches!(fault, ExecError::ProgramOutOfBounds { index: 100, .. }));
    assert_eq!(fault.exit_code(), 97);
  }

  #[test]
  fn stack_underflow_and_overflow_fault() {
    let fault = run_fault("Pop 0");
    assert!(matches!(fault, ExecError::StackFault { position: -1, .. }));
    assert_eq!(fault.exit_code(), 96);

    let fault = run_fault("Push 300");
    assert!(matches!(fault, ExecError::StackFault { position: 256, .. }));
  }

  #[test]
  fn bad_read_length_faults() {
    // Accumulator is 0 when the read syscall fires.
    let fault = run_fault("LoadI 0\nPush 0\nLoadI 0\nsyss read 0");
    assert!(matches!(fault, ExecError::InvalidReadLength { len: 0, .. }));
    assert_eq!(fault.exit_code(), 95);
  }

  #[test]
  fn shift_saturation() {
    assert_eq!(shifted(1, 3), 8);
    assert_eq!(shifted(16, -2), 4);
    assert_eq!(shifted(-16, -2), -4); // arithmetic right shift
    assert_eq!(shifted(1, 200), 0);
    assert_eq!(shifted(-1, -200), -1); // sign fill
    assert_eq!(shifted(i64::MIN, -63), -1);
  }
}
