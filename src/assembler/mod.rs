/*!
  The assembler: a label-resolving two-pass translator from mnemonic source
  to a word image.

  Pass 1 streams logical lines out of the tokenizer, registers labels, and
  turns each statement into a provisional record — an encoded word plus a
  pending label reference and the width of the slot it resolves into. Pass 2
  walks the records in order, resolves every label to a PC-relative delta,
  and produces the finished word vector.
*/

mod chariter;
pub mod compile;
mod literal;
pub mod tokenizer;

pub use compile::assemble;

use thiserror::Error;

use crate::bytecode::str8::Str8Error;
use crate::bytecode::word::WordError;

/// An assembly failure, pinned to the source line that produced it.
#[derive(Debug, Error, PartialEq)]
#[error("line {line}: {kind}")]
pub struct AsmError {
  pub line :  usize,
  pub kind :  AsmErrorKind,
}

#[derive(Debug, Error, PartialEq)]
pub enum AsmErrorKind {
  #[error("{0}")]
  Syntax(String),

  #[error("unknown instruction: {0}")]
  UnknownInstruction(String),

  #[error("unknown syscall: {0}")]
  UnknownSyscall(String),

  #[error("unknown label: {0}")]
  UnknownLabel(String),

  #[error("unknown stack variable: {0}")]
  UnknownVariable(String),

  #[error("duplicate label: {0}")]
  DuplicateLabel(String),

  #[error("expected {expected} argument(s) for {mnemonic}, got {got}")]
  WrongArgumentCount {
    mnemonic :  String,
    expected :  &'static str,
    got      :  usize,
  },

  #[error("failed to parse integer argument {0:?}")]
  BadInteger(String),

  #[error("argument out of range ({low} to {high}): {value}")]
  ArgumentOutOfRange { value: i64, low: i64, high: i64 },

  #[error(transparent)]
  Operand(#[from] WordError),

  #[error(transparent)]
  Str8(#[from] Str8Error),
}
