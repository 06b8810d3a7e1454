/*!
  Pass 1 and pass 2 of the assembler.

  Pass 1 handles one logical line at a time: labels, the `data`/`str8`
  directives, the `var`/`param`/`return` stack-frame naming scheme, and
  every real mnemonic. It produces provisional records carrying the encoded
  word, an optional pending label, and which operand slot the label resolves
  into. Pass 2 turns each pending label into a PC-relative delta and writes
  the finished words.

  The `var`/`param`/`return` machinery is purely a naming convention over
  the flat stack. `var a b c` emits `Push 2` (two zero slots, then the
  accumulator) and binds `a` to offset 0 (top), `b` to 1, `c` to 2.
  `param x y` emits nothing: it binds names to the caller-pushed slots that
  sit below the return PC. `return` emits `Ret k` with k the local count of
  the most recent `var`. There is one variable map, reset at each `var` — no
  nesting, no shadowing.
*/

use std::collections::HashMap;

use either::Either;
use log::debug;
use string_cache::DefaultAtom;

use super::literal::parse_int;
use super::tokenizer::Tokenizer;
use super::{AsmError, AsmErrorKind};
use crate::bytecode::str8;
use crate::bytecode::word::{self, Word, OPERAND48_MAX, OPERAND48_MIN};
use crate::bytecode::{Opcode, Syscall};
use crate::vm::STACK_SIZE;

/// One provisional record out of pass 1: an encoded word plus whatever pass
/// 2 still needs to finish it.
#[derive(Clone, Debug)]
struct Line {
  word     :  Word,
  label    :  Option<DefaultAtom>,
  data     :  bool,
  is_48bit :  bool,
  line     :  usize,
}

/// Assembles a complete source text into the word image (header excluded).
pub fn assemble(source: &str) -> Result<Vec<Word>, AsmError> {
  Assembler::new().assemble(source)
}

struct Assembler {
  pc       :  i64,
  labels   :  HashMap<DefaultAtom, i64>,
  varmap   :  HashMap<DefaultAtom, i64>,
  return_n :  i64,
  lines    :  Vec<Line>,
  line     :  usize, // current source line, for error context
}

impl Assembler {
  fn new() -> Assembler {
    Assembler {
      pc       :  0,
      labels   :  HashMap::new(),
      varmap   :  HashMap::new(),
      return_n :  0,
      lines    :  Vec::new(),
      line     :  0,
    }
  }

  fn assemble(mut self, source: &str) -> Result<Vec<Word>, AsmError> {
    let mut tokenizer = Tokenizer::new(source);
    loop {
      self.line = tokenizer.line();
      let fields = match tokenizer.next_line()? {
        None => break,
        Some(fields) => fields,
      };
      if fields.is_empty() {
        continue;
      }
      let line = self.line;
      self.statement(fields).map_err(|kind| AsmError { line, kind })?;
    }
    self.resolve()
  }

  // region Pass 1

  fn statement(&mut self, fields: Vec<String>) -> Result<(), AsmErrorKind> {
    let first = &fields[0];

    if let Some(name) = first.strip_suffix(':') {
      let label = DefaultAtom::from(name);
      debug!("label {} at pc {}", label, self.pc);
      if self.labels.insert(label, self.pc).is_some() {
        return Err(AsmErrorKind::DuplicateLabel(name.to_string()));
      }
      // A label may share its line with the statement it marks.
      return match fields.len() {
        1 => Ok(()),
        _ => self.statement(fields[1..].to_vec()),
      };
    }

    let mnemonic = first.to_lowercase();
    let args = &fields[1..];
    check_argument_count(&mnemonic, args.len())?;

    match mnemonic.as_str() {
      "data" => {
        // A full-width raw word: no opcode, no encoding checks. A low byte
        // that collides with an opcode is allowed.
        let value =
          parse_int(&args[0]).ok_or_else(|| AsmErrorKind::BadInteger(args[0].clone()))?;
        self.emit(Line {
          word     :  value,
          label    :  None,
          data     :  true,
          is_48bit :  false,
          line     :  self.line,
        });
      }

      "str8" => {
        for word in str8::encode(args[0].as_bytes())? {
          self.emit(Line {
            word,
            label    :  None,
            data     :  true,
            is_48bit :  false,
            line     :  self.line,
          });
        }
      }

      "var" => {
        self.varmap.clear();
        // Push reserves len-1 zero slots and then pushes the accumulator,
        // so the first declared name is the pushed value at offset 0 (top).
        let word = word::set_operand(
          word::set_opcode(0, Opcode::Push.code()),
          args.len() as i64 - 1,
        )?;
        self.return_n = args.len() as i64;
        for (index, name) in args.iter().enumerate() {
          self.varmap.insert(DefaultAtom::from(name.as_str()), index as i64);
        }
        debug!("var -> Push {} binding {:?}", args.len() - 1, args);
        self.code_line(word);
      }

      "param" => {
        // Parameters sit below the return PC pushed by Call, hence the +1.
        // A declaration only; no word is emitted.
        let start = self.return_n + 1;
        for (index, name) in args.iter().enumerate() {
          self.varmap.insert(DefaultAtom::from(name.as_str()), start + index as i64);
        }
        debug!("param -> bound {:?} from offset {}", args, start);
      }

      "return" => {
        // The variable map survives: a body may have several return points.
        let word =
          word::set_operand(word::set_opcode(0, Opcode::Ret.code()), self.return_n)?;
        debug!("return -> Ret {}", self.return_n);
        self.code_line(word);
      }

      _ => self.instruction(&mnemonic, fields[1..].to_vec())?,
    }
    Ok(())
  }

  fn instruction(&mut self, mnemonic: &str, mut args: Vec<String>) -> Result<(), AsmErrorKind> {
    let opcode = Opcode::from_mnemonic(mnemonic)
      .ok_or_else(|| AsmErrorKind::UnknownInstruction(mnemonic.to_string()))?;

    if opcode.is_stack_family() {
      for (index, arg) in args.iter_mut().enumerate() {
        if !starts_with_letter(arg) {
          continue;
        }
        match self.varmap.get(&DefaultAtom::from(arg.as_str())) {
          Some(slot) => {
            debug!("resolved variable {} to stack offset {}", arg, slot);
            *arg = slot.to_string();
          }
          // The first argument of SysS is the syscall name, not a variable.
          None if opcode == Opcode::SysS && index == 0 => {}
          None => return Err(AsmErrorKind::UnknownVariable(arg.clone())),
        }
      }
    }

    let mut word = word::set_opcode(0, opcode.code());
    let mut label = None;
    let mut is_48bit = false;

    use Opcode::*;
    match opcode {
      Sys | SysS => {
        let call = Syscall::from_name(&args[0])
          .ok_or_else(|| AsmErrorKind::UnknownSyscall(args[0].clone()))?;
        is_48bit = true;
        match label_or_value(&args[1])? {
          Either::Left(target) => {
            // Id alone for now; pass 2 fills the 48 bits above it.
            word = word::set_operand(word, i64::from(call.code()))?;
            label = Some(target);
          }
          Either::Right(value) => {
            if !(OPERAND48_MIN..=OPERAND48_MAX).contains(&value) {
              return Err(AsmErrorKind::ArgumentOutOfRange {
                value,
                low: OPERAND48_MIN,
                high: OPERAND48_MAX,
              });
            }
            word = word::set_operand(word, (value << 8) | i64::from(call.code()))?;
          }
        }
      }

      StoreSb => {
        // Base offset of the byte span, and the stack index holding the
        // byte offset within it.
        let base = parse_bounded(&args[0], 0, STACK_SIZE as i64 - 1)?;
        let index = parse_bounded(&args[1], 0, STACK_SIZE as i64 - 1)?;
        word = word::set_operand(word, index)?;
        word = word::set_operand48(word, base)?;
        is_48bit = true;
      }

      IncrS => {
        let delta = parse_bounded(&args[0], -128, 127)?;
        let index = parse_bounded(&args[1], 0, STACK_SIZE as i64 - 1)?;
        word = word::set_operand(word, delta)?;
        word = word::set_operand48(word, index)?;
        is_48bit = true;
      }

      IncrR => {
        let delta = parse_bounded(&args[0], -128, 127)?;
        word = word::set_operand(word, delta)?;
        is_48bit = true;
        match label_or_value(&args[1])? {
          Either::Left(target) => label = Some(target),
          Either::Right(offset) => word = word::set_operand48(word, offset)?,
        }
      }

      Jne | Jeq | Jlt | Jgt | Jgte | Jlte => {
        // Comparison value byte, then the jump target.
        let value = parse_bounded(&args[0], 0, 255)?;
        word = word::set_operand(word, value)?;
        is_48bit = true;
        match label_or_value(&args[1])? {
          Either::Left(target) => label = Some(target),
          Either::Right(delta) => word = word::set_operand48(word, delta)?,
        }
      }

      _ => {
        // Labels are allowed even for immediate operands, e.g. loading an
        // address delta into the accumulator.
        match label_or_value(&args[0])? {
          Either::Left(target) => label = Some(target),
          Either::Right(value) => word = word::set_operand(word, value)?,
        }
      }
    }

    self.emit(Line {
      word,
      label,
      data     :  false,
      is_48bit,
      line     :  self.line,
    });
    Ok(())
  }

  fn emit(&mut self, line: Line) {
    self.lines.push(line);
    self.pc += 1;
  }

  fn code_line(&mut self, word: Word) {
    self.emit(Line {
      word,
      label    :  None,
      data     :  false,
      is_48bit :  false,
      line     :  self.line,
    });
  }

  // endregion

  // region Pass 2

  /// Resolves every pending label to a PC-relative delta and writes it into
  /// the record's 56- or 48-bit slot, range-checked.
  fn resolve(self) -> Result<Vec<Word>, AsmError> {
    let mut code = Vec::with_capacity(self.lines.len());
    for (pc, record) in self.lines.iter().enumerate() {
      let mut word = record.word;
      if !record.data {
        if let Some(label) = &record.label {
          let target = self.labels.get(label).ok_or_else(|| AsmError {
            line: record.line,
            kind: AsmErrorKind::UnknownLabel(label.to_string()),
          })?;
          let delta = target - pc as i64;
          let write = match record.is_48bit {
            true  => word::set_operand48(word, delta),
            false => word::set_operand(word, delta),
          };
          word = write.map_err(|e| AsmError { line: record.line, kind: e.into() })?;
        }
      }
      code.push(word);
    }
    Ok(code)
  }

  // endregion
}

fn check_argument_count(mnemonic: &str, got: usize) -> Result<(), AsmErrorKind> {
  let (expected, ok): (&'static str, bool) = match mnemonic {
    "return" => ("0", got == 0),
    "var" | "param" => ("at least 1", got >= 1),
    "incrr" | "incrs" | "sys" | "syss" | "storesb" | "jne" | "jeq" | "jlt" | "jgt"
    | "jgte" | "jlte" => ("2", got == 2),
    _ => ("1", got == 1),
  };
  match ok {
    true => Ok(()),
    false => Err(AsmErrorKind::WrongArgumentCount {
      mnemonic: mnemonic.to_string(),
      expected,
      got,
    }),
  }
}

/// An argument is a label reference when it begins with a letter, and an
/// integer literal otherwise.
fn label_or_value(arg: &str) -> Result<Either<DefaultAtom, i64>, AsmErrorKind> {
  if starts_with_letter(arg) {
    return Ok(Either::Left(DefaultAtom::from(arg)));
  }
  match parse_int(arg) {
    Some(value) => Ok(Either::Right(value)),
    None => Err(AsmErrorKind::BadInteger(arg.to_string())),
  }
}

fn parse_bounded(arg: &str, low: i64, high: i64) -> Result<i64, AsmErrorKind> {
  let value = parse_int(arg).ok_or_else(|| AsmErrorKind::BadInteger(arg.to_string()))?;
  if !(low..=high).contains(&value) {
    return Err(AsmErrorKind::ArgumentOutOfRange { value, low, high });
  }
  Ok(value)
}

fn starts_with_letter(s: &str) -> bool {
  s.chars().next().map_or(false, char::is_alphabetic)
}
