/*!
  Packing and unpacking of 64-bit instruction words.

  A word carries its opcode in the low 8 bits. The rest is operand space and
  comes in two splits: a 56-bit signed operand in the high bits, or a small
  8-bit sub-operand (a syscall id, a comparison byte, an increment delta) in
  the middle byte with a 48-bit signed operand above it. Raw data words use
  all 64 bits and bypass this module entirely.

  Both splits are two's-complement; extraction is an arithmetic right shift,
  so sign-extension is free. Encoding range-checks the operand and refuses
  values that do not fit.
*/

use thiserror::Error;

// If you change this you must also change the str8 codec and the image
// format, which both assume 8-byte little-endian words.
pub type Word = i64;

pub const OPERAND_MAX: i64 = (1 << 55) - 1;
pub const OPERAND_MIN: i64 = -(1 << 55);

pub const OPERAND48_MAX: i64 = (1 << 47) - 1;
pub const OPERAND48_MIN: i64 = -(1 << 47);

#[derive(Copy, Clone, Eq, PartialEq, Debug, Error)]
pub enum WordError {
  #[error("operand out of range for the 56-bit field: {0}")]
  OperandOutOfRange(i64),

  #[error("operand out of range for the 48-bit field: {0}")]
  Operand48OutOfRange(i64),
}

/// Gives the opcode byte of an instruction word.
pub fn opcode(word: Word) -> u8 {
  (word & 0xFF) as u8
}

/// Gives the sign-extended 56-bit operand (bits 8..64).
pub fn operand(word: Word) -> i64 {
  word >> 8
}

/// Gives the sign-extended 48-bit operand (bits 16..64).
pub fn operand48(word: Word) -> i64 {
  word >> 16
}

/// Gives the middle byte (bits 8..16): the sub-operand of the packed
/// instruction forms, or the syscall id of `Sys`/`SysS`.
pub fn mid_byte(word: Word) -> u8 {
  ((word >> 8) & 0xFF) as u8
}

/// Replaces the low 8 bits with `opcode`, leaving the operand bits alone.
pub fn set_opcode(word: Word, opcode: u8) -> Word {
  (word & !0xFF) | Word::from(opcode)
}

/**
  Replaces the high 56 bits with a signed operand.

  A value outside [−2⁵⁵, 2⁵⁵−1] is a fatal encoding error. The assembler
  surfaces it as an operand-range abort; the execution engine never encodes,
  so hitting it at runtime would be a programming bug.
*/
pub fn set_operand(word: Word, operand: i64) -> Result<Word, WordError> {
  if !(OPERAND_MIN..=OPERAND_MAX).contains(&operand) {
    return Err(WordError::OperandOutOfRange(operand));
  }
  Ok((word & 0xFF) | (operand << 8))
}

/**
  Replaces the high 48 bits with a signed operand, keeping the low 16 bits
  unchanged. Used when the middle byte already holds a sub-operand or a
  syscall id.
*/
pub fn set_operand48(word: Word, operand: i64) -> Result<Word, WordError> {
  if !(OPERAND48_MIN..=OPERAND48_MAX).contains(&operand) {
    return Err(WordError::Operand48OutOfRange(operand));
  }
  Ok((word & 0xFFFF) | (operand << 16))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn operand_roundtrip() {
    let values = [
      OPERAND_MIN,
      -(1 << 54),
      -(1 << 32),
      -(1 << 16),
      -1000,
      -1,
      0,
      1,
      1000,
      1 << 16,
      1 << 32,
      1 << 54,
      OPERAND_MAX,
    ];
    for value in values {
      let word = set_operand(0, value).unwrap();
      assert_eq!(operand(word), value, "roundtrip failed for {}", value);
    }
  }

  #[test]
  fn operand_boundaries() {
    assert!(set_operand(0, OPERAND_MAX).is_ok());
    assert!(set_operand(0, OPERAND_MIN).is_ok());
    assert_eq!(
      set_operand(0, OPERAND_MAX + 1),
      Err(WordError::OperandOutOfRange(OPERAND_MAX + 1))
    );
    assert_eq!(
      set_operand(0, OPERAND_MIN - 1),
      Err(WordError::OperandOutOfRange(OPERAND_MIN - 1))
    );
  }

  #[test]
  fn operand48_roundtrip() {
    let values = [
      OPERAND48_MIN,
      -(1 << 46),
      -(1 << 32),
      -1000,
      -1,
      0,
      1,
      1000,
      1 << 32,
      1 << 46,
      OPERAND48_MAX,
    ];
    for value in values {
      let word = set_operand48(0, value).unwrap();
      assert_eq!(operand48(word), value, "roundtrip failed for {}", value);
    }
  }

  #[test]
  fn operand48_boundaries() {
    assert!(set_operand48(0, OPERAND48_MAX).is_ok());
    assert!(set_operand48(0, OPERAND48_MIN).is_ok());
    assert!(set_operand48(0, OPERAND48_MAX + 1).is_err());
    assert!(set_operand48(0, OPERAND48_MIN - 1).is_err());
  }

  #[test]
  fn opcode_and_operand_are_independent() {
    let mut word = set_opcode(0, 0x2A);
    word = set_operand(word, 42).unwrap();
    assert_eq!(opcode(word), 0x2A);
    assert_eq!(operand(word), 42);

    word = set_opcode(word, 0x07);
    assert_eq!(opcode(word), 0x07);
    assert_eq!(operand(word), 42);

    word = set_operand(word, -100).unwrap();
    assert_eq!(opcode(word), 0x07);
    assert_eq!(operand(word), -100);
  }

  #[test]
  fn operand48_preserves_low_sixteen_bits() {
    let mut word: Word = 0x1234;
    word = set_operand48(word, 42).unwrap();
    assert_eq!(word & 0xFFFF, 0x1234);
    assert_eq!(operand48(word), 42);

    word = set_operand48(word, -100).unwrap();
    assert_eq!(word & 0xFFFF, 0x1234);
    assert_eq!(operand48(word), -100);
  }

  #[test]
  fn mid_byte_reads_bits_eight_to_sixteen() {
    let word = set_operand(0, 0x0403).unwrap();
    assert_eq!(mid_byte(word), 0x03);
    assert_eq!(operand48(word), 0x04);
  }
}
