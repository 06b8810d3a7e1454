/*!
  The instruction set and syscall tables, and the decoded view of an
  instruction word.

  Opcodes are grouped by operand format, and the numeric order of the
  variants is significant: the assembler treats every opcode numerically at
  or above `LoadS` as stack-family, meaning arguments that begin with a
  letter are resolved through the current function's variable map.
  Order-dependencies:
      ```
      Opcode::is_stack_family()
      Opcode::format()
      ```
*/

use std::fmt::{Display, Formatter};

use bimap::BiMap;
use lazy_static::lazy_static;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::IntoEnumIterator;
use strum_macros::{Display as StrumDisplay, EnumIter, IntoStaticStr};
use thiserror::Error;

use super::word::{self, Word};

/**
  Opcodes of the virtual machine.

  Value 0 is deliberately unassigned so that an accidental all-zeros word
  decodes as an unknown opcode instead of silently executing.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumIter,     TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,           PartialEq,        PartialOrd,
  Ord,          Debug,         Hash,
)]
#[repr(u8)]
pub enum Opcode {
  // Immediate arithmetic: 56-bit signed operand //
  LoadI = 1,
  AddI,
  SubI,
  MulI,
  DivI,
  ModI,
  ShiftI,
  AndI,

  // Conditional jumps: comparison byte + 48-bit PC-relative delta //
  Jne,
  Jeq,
  Jlt,
  Jgt,
  Jgte,
  Jlte,
  JumpR,

  // Program-memory relative: 56-bit signed offset from PC //
  LoadR,
  AddR,
  SubR,
  MulR,
  DivR,
  StoreR,
  IncrR, // 8-bit delta + 48-bit offset

  Sys, // syscall id + 48-bit operand (address = PC + operand)

  // Call frame //
  Call,
  Ret,
  Push,
  Pop,

  // Stack relative: everything from here on is stack-family //
  LoadS,
  StoreS,
  AddS,
  SubS,
  MulS,
  DivS,
  IncrS, // 8-bit delta + 48-bit index
  IdivS,
  StoreSb, // byte-offset index + 48-bit base
  SysS,    // syscall id + 48-bit operand (address = SP − operand)
}

/// The three operand layouts an instruction word can have.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OperandFormat {
  /// [operand:56][opcode:8]
  Wide,
  /// [operand:48][small:8][opcode:8]
  Packed,
  /// [operand:48][syscall:8][opcode:8]
  Syscall,
}

impl Opcode {
  /// Gives the 8-bit numeric value that represents the opcode.
  pub fn code(self) -> u8 {
    self.into()
  }

  /// Stack-family opcodes have their leading-letter arguments resolved
  /// through the variable map by the assembler.
  pub fn is_stack_family(self) -> bool {
    self >= Opcode::LoadS
  }

  pub fn format(self) -> OperandFormat {
    use Opcode::*;
    match self {
      Sys | SysS => OperandFormat::Syscall,
      Jne | Jeq | Jlt | Jgt | Jgte | Jlte | IncrR | IncrS | StoreSb => OperandFormat::Packed,
      _ => OperandFormat::Wide,
    }
  }

  /// Case-insensitive mnemonic lookup.
  pub fn from_mnemonic(name: &str) -> Option<Opcode> {
    MNEMONICS.get_by_left(name.to_lowercase().as_str()).copied()
  }
}

/**
  Syscall ids dispatched by the `Sys`/`SysS` instructions. As with opcodes,
  0 is skipped to catch accidental zeros.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,       PartialEq,        Debug,          Hash,
)]
#[repr(u8)]
pub enum Syscall {
  Exit = 1,
  Sleep,
  Read,
  Write,
}

impl Syscall {
  pub fn code(self) -> u8 {
    self.into()
  }

  /// Case-insensitive syscall name lookup.
  pub fn from_name(name: &str) -> Option<Syscall> {
    SYSCALLS.get_by_left(name.to_lowercase().as_str()).copied()
  }
}

lazy_static! {
  /// Bidirectional mnemonic table, keyed by lower-cased name.
  pub static ref MNEMONICS: BiMap<String, Opcode> =
    Opcode::iter().map(|op| (op.to_string().to_lowercase(), op)).collect();

  /// Bidirectional syscall name table, keyed by lower-cased name.
  pub static ref SYSCALLS: BiMap<String, Syscall> =
    Syscall::iter().map(|s| (s.to_string().to_lowercase(), s)).collect();
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Error)]
pub enum DecodeError {
  #[error("unknown opcode 0x{0:02x}")]
  UnknownOpcode(u8),

  #[error("unknown syscall id {0}")]
  UnknownSyscall(u8),
}

/**
  Holds the unpacked fields of an instruction word. The variants follow the
  operand formats so that field extraction lives here rather than being
  open-coded per opcode in the execution engine.
*/
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Instruction {
  /// [operand:56][opcode:8]
  Wide { opcode: Opcode, operand: i64 },

  /// [operand:48][small:8][opcode:8] — `small` is read unsigned here; the
  /// engine reinterprets it as an `i8` delta where the opcode calls for one.
  Packed { opcode: Opcode, small: u8, operand: i64 },

  /// [operand:48][syscall:8][opcode:8]
  Syscall { opcode: Opcode, call: Syscall, operand: i64 },
}

impl Instruction {
  pub fn try_decode(word: Word) -> Result<Instruction, DecodeError> {
    let code = word::opcode(word);
    let opcode = Opcode::try_from(code).map_err(|_| DecodeError::UnknownOpcode(code))?;

    let instruction = match opcode.format() {
      OperandFormat::Wide => Instruction::Wide {
        opcode,
        operand: word::operand(word),
      },

      OperandFormat::Packed => Instruction::Packed {
        opcode,
        small: word::mid_byte(word),
        operand: word::operand48(word),
      },

      OperandFormat::Syscall => {
        let id = word::mid_byte(word);
        let call = Syscall::try_from(id).map_err(|_| DecodeError::UnknownSyscall(id))?;
        Instruction::Syscall {
          opcode,
          call,
          operand: word::operand48(word),
        }
      }
    };

    Ok(instruction)
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Instruction::Wide { opcode, operand } => {
        write!(f, "{}({})", opcode, operand)
      }

      Instruction::Packed { opcode, small, operand } => {
        write!(f, "{}({}, {})", opcode, small, operand)
      }

      Instruction::Syscall { opcode, call, operand } => {
        write!(f, "{}({}, {})", opcode, call, operand)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::word::{set_opcode, set_operand, set_operand48};

  #[test]
  fn mnemonic_lookup_is_case_insensitive() {
    assert_eq!(Opcode::from_mnemonic("loadi"), Some(Opcode::LoadI));
    assert_eq!(Opcode::from_mnemonic("LoadI"), Some(Opcode::LoadI));
    assert_eq!(Opcode::from_mnemonic("STORESB"), Some(Opcode::StoreSb));
    assert_eq!(Opcode::from_mnemonic("syss"), Some(Opcode::SysS));
    assert_eq!(Opcode::from_mnemonic("nosuch"), None);
  }

  #[test]
  fn syscall_lookup_is_case_insensitive() {
    assert_eq!(Syscall::from_name("exit"), Some(Syscall::Exit));
    assert_eq!(Syscall::from_name("Write"), Some(Syscall::Write));
    assert_eq!(Syscall::from_name("SLEEP"), Some(Syscall::Sleep));
    assert_eq!(Syscall::from_name("fork"), None);
  }

  #[test]
  fn mnemonic_table_is_bidirectional() {
    for opcode in Opcode::iter() {
      let name = MNEMONICS.get_by_right(&opcode).unwrap();
      assert_eq!(Opcode::from_mnemonic(name), Some(opcode));
    }
  }

  #[test]
  fn stack_family_boundary() {
    assert!(!Opcode::Pop.is_stack_family());
    assert!(Opcode::LoadS.is_stack_family());
    assert!(Opcode::StoreSb.is_stack_family());
    assert!(Opcode::SysS.is_stack_family());
    assert!(!Opcode::Sys.is_stack_family());
  }

  #[test]
  fn decode_wide() {
    let word = set_operand(set_opcode(0, Opcode::AddI.code()), -7).unwrap();
    assert_eq!(
      Instruction::try_decode(word),
      Ok(Instruction::Wide { opcode: Opcode::AddI, operand: -7 })
    );
  }

  #[test]
  fn decode_packed() {
    // Jne with comparison value 3 and delta -2.
    let mut word = set_opcode(0, Opcode::Jne.code());
    word = set_operand(word, 3).unwrap();
    word = set_operand48(word, -2).unwrap();
    assert_eq!(
      Instruction::try_decode(word),
      Ok(Instruction::Packed { opcode: Opcode::Jne, small: 3, operand: -2 })
    );
  }

  #[test]
  fn decode_syscall() {
    let mut word = set_opcode(0, Opcode::Sys.code());
    word = set_operand(word, Syscall::Exit.code() as i64).unwrap();
    word = set_operand48(word, 7).unwrap();
    assert_eq!(
      Instruction::try_decode(word),
      Ok(Instruction::Syscall { opcode: Opcode::Sys, call: Syscall::Exit, operand: 7 })
    );
  }

  #[test]
  fn decode_rejects_unknown_codes() {
    assert_eq!(Instruction::try_decode(0), Err(DecodeError::UnknownOpcode(0)));
    assert_eq!(Instruction::try_decode(0xFE), Err(DecodeError::UnknownOpcode(0xFE)));

    let word = set_opcode(0, Opcode::Sys.code()); // syscall id 0
    assert_eq!(Instruction::try_decode(word), Err(DecodeError::UnknownSyscall(0)));
  }

  #[test]
  fn disassembly_rendering() {
    let word = set_operand(set_opcode(0, Opcode::LoadI.code()), 42).unwrap();
    let instruction = Instruction::try_decode(word).unwrap();
    assert_eq!(format!("{}", instruction), "LoadI(42)");
  }
}
