/*!
  The on-disk image format: an 8-byte header followed by an unbounded
  little-endian word stream. The word count is implicit in the file length;
  there is no trailing checksum.
*/

use std::io::{self, Read, Write};

use thiserror::Error;

use super::word::Word;

/// Image header: a version byte then ASCII "GROL VM". Starts with a
/// non-printable byte so the file is recognizably binary.
pub const HEADER: [u8; 8] = *b"\x01GROL VM";

#[derive(Debug, Error)]
pub enum ImageError {
  #[error("invalid image header: {0:02x?}")]
  BadHeader([u8; 8]),

  #[error("image ends mid-word ({0} trailing bytes)")]
  TruncatedWord(usize),

  #[error(transparent)]
  Io(#[from] io::Error),
}

/// Writes the header followed by each word little-endian.
pub fn write_image<W: Write>(out: &mut W, words: &[Word]) -> io::Result<()> {
  out.write_all(&HEADER)?;
  for &word in words {
    out.write_all(&word.to_le_bytes())?;
  }
  Ok(())
}

/**
  Validates the header and slurps the word stream into program memory.
  A file whose payload is not a multiple of 8 bytes is rejected.
*/
pub fn read_image<R: Read>(input: &mut R) -> Result<Vec<Word>, ImageError> {
  let mut header = [0u8; 8];
  input.read_exact(&mut header)?;
  if header != HEADER {
    return Err(ImageError::BadHeader(header));
  }

  let mut program = Vec::new();
  let mut buffer = [0u8; 8];
  loop {
    // `read_exact` cannot tell a clean EOF from a truncated word, so the
    // buffer is filled by hand.
    let mut filled = 0;
    while filled < buffer.len() {
      let count = input.read(&mut buffer[filled..])?;
      if count == 0 {
        break;
      }
      filled += count;
    }
    match filled {
      0 => break,
      8 => program.push(Word::from_le_bytes(buffer)),
      trailing => return Err(ImageError::TruncatedWord(trailing)),
    }
  }

  Ok(program)
}
