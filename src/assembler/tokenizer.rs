/*!
  The tokenizer turns one logical line of assembly source into a list of
  string tokens.

  An LF ends a logical line unless it falls inside a backtick literal. CR is
  ignored unconditionally. Outside of quotes, runs of spaces and tabs
  separate tokens, and `#` or `;` starts a comment that discards the rest of
  the logical line.

  Three quote flavors exist, each openable only where a token could start
  (after whitespace or at the start of the line):

    "…"  backslash escapes are decoded; `\"` continues the literal.
    '…'  escapes are decoded; the result must be exactly one code point and
         the produced token is `0x<hex>` of that code point.
    `…`  raw: backslashes are literal and LF is allowed inside.
*/

use std::str::Chars;

use super::chariter::CharIter;
use super::{AsmError, AsmErrorKind};

pub struct Tokenizer<'d> {
  text: CharIter<'d>,
}

impl<'d> Tokenizer<'d> {
  pub fn new(source: &'d str) -> Self {
    Tokenizer { text: CharIter::new(source) }
  }

  /// Line number of the next unread character.
  pub fn line(&self) -> usize {
    self.text.line()
  }

  /**
    Tokenizes the next logical line. `Ok(None)` is end of input. A line that
    is blank or pure comment yields `Ok(Some(vec![]))`; callers skip those.
  */
  pub fn next_line(&mut self) -> Result<Option<Vec<String>>, AsmError> {
    if self.text.is_empty() {
      return Ok(None);
    }

    // Errors anywhere in the logical line report its starting line.
    let start_line = self.text.line();
    let syntax = |message: String| AsmError {
      line: start_line,
      kind: AsmErrorKind::Syntax(message),
    };

    let mut tokens  :  Vec<String>  = Vec::new();
    let mut current :  String       = String::new();
    let mut in_quote = false;
    let mut in_escape = false;
    let mut which_quote = ' ';
    let mut prev = ' ';

    loop {
      let ch = match self.text.next() {
        None => break,
        Some(c) => c,
      };

      match ch {
        // Stray CRs (Windows line endings) are ignored, and do not count as
        // the "previous character" for the quote-opening rule.
        '\r' => continue,

        '\n' if !in_quote || which_quote != '`' => break,

        '"' | '\'' | '`' if !in_quote => {
          if prev != ' ' && prev != '\t' {
            return Err(syntax(format!(
              "unexpected quote {:?} in the middle of a token; token so far: {:?}",
              ch, current
            )));
          }
          if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
          }
          which_quote = ch;
          in_quote = true;
        }

        c if in_quote && c == which_quote && !in_escape => {
          let token = unquote(&current, which_quote).map_err(&syntax)?;
          tokens.push(token);
          current.clear();
          in_quote = false;
        }

        '#' | ';' if !in_quote => {
          if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
          }
          // The rest of the logical line is comment, including its LF.
          for c in self.text.by_ref() {
            if c == '\n' {
              break;
            }
          }
          return Ok(Some(tokens));
        }

        ' ' | '\t' if !in_quote => {
          // Collapses whitespace runs.
          if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
          }
        }

        '\\' if in_quote && which_quote != '`' && !in_escape => {
          current.push('\\');
          in_escape = true;
        }

        c => {
          current.push(c);
          in_escape = false;
        }
      }

      prev = ch;
    }

    if in_quote {
      return Err(syntax(format!(
        "unterminated {} quote at end of line; contents so far: {:?}",
        which_quote, current
      )));
    }
    if !current.is_empty() {
      tokens.push(current);
    }
    Ok(Some(tokens))
  }
}

/**
  Decodes the escapes of a double- or single-quoted literal; backtick
  literals pass through untouched. Single-quoted literals must decode to
  exactly one code point and render as its hex value.
*/
fn unquote(raw: &str, which_quote: char) -> Result<String, String> {
  if which_quote == '`' {
    return Ok(raw.to_string());
  }

  let mut decoded = String::with_capacity(raw.len());
  let mut chars = raw.chars();
  while let Some(ch) = chars.next() {
    if ch != '\\' {
      decoded.push(ch);
      continue;
    }
    match chars.next() {
      Some('n')  => decoded.push('\n'),
      Some('t')  => decoded.push('\t'),
      Some('r')  => decoded.push('\r'),
      Some('\\') => decoded.push('\\'),
      Some('"')  => decoded.push('"'),
      Some('\'') => decoded.push('\''),
      Some('x')  => decoded.push(hex_escape(&mut chars, 2)?),
      Some('u')  => decoded.push(hex_escape(&mut chars, 4)?),
      Some(other) => return Err(format!("unknown escape \\{}", other)),
      None => return Err("dangling backslash in literal".to_string()),
    }
  }

  match which_quote {
    '\'' => {
      let mut code_points = decoded.chars();
      match (code_points.next(), code_points.next()) {
        (Some(c), None) => Ok(format!("0x{:x}", c as u32)),
        _ => Err(format!(
          "single-quoted literal must be exactly one character, got {:?}",
          decoded
        )),
      }
    }
    _ => Ok(decoded),
  }
}

fn hex_escape(chars: &mut Chars<'_>, digits: u32) -> Result<char, String> {
  let mut value: u32 = 0;
  for _ in 0..digits {
    let digit = chars
      .next()
      .and_then(|c| c.to_digit(16))
      .ok_or_else(|| format!("malformed hex escape (expected {} hex digits)", digits))?;
    value = value * 16 + digit;
  }
  char::from_u32(value).ok_or_else(|| format!("escape out of range: {:x}", value))
}
