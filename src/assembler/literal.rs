/*!
  Signed integer literals: decimal, `0x…` hexadecimal, `0o…` or leading-zero
  octal, and `0b…` binary, with an optional sign.
*/

use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case};
use nom::character::complete::{digit1, hex_digit1, oct_digit1, one_of};
use nom::combinator::{all_consuming, map, opt, recognize, verify};
use nom::multi::many1;
use nom::sequence::{pair, preceded};
use nom::IResult;

fn binary_digits(input: &str) -> IResult<&str, &str> {
  recognize(many1(one_of("01")))(input)
}

/// Dissects the radix prefix, giving (radix, digits).
fn magnitude(input: &str) -> IResult<&str, (u32, &str)> {
  alt((
    map(preceded(tag_no_case("0x"), hex_digit1), |digits| (16, digits)),
    map(preceded(tag_no_case("0b"), binary_digits), |digits| (2, digits)),
    map(preceded(tag_no_case("0o"), oct_digit1), |digits| (8, digits)),
    // Legacy leading-zero octal, e.g. 0755.
    map(preceded(tag("0"), oct_digit1), |digits| (8, digits)),
    // Decimal; a leading zero with more digits is not decimal.
    map(
      verify(digit1, |digits: &str| digits.len() == 1 || !digits.starts_with('0')),
      |digits| (10, digits),
    ),
  ))(input)
}

/// Parses a signed integer literal. The whole string must be consumed.
/// `None` on malformed input or 64-bit overflow.
pub fn parse_int(text: &str) -> Option<i64> {
  let (_, (sign, (radix, digits))) =
    all_consuming(pair(opt(one_of("+-")), magnitude))(text).ok()?;

  let value = u64::from_str_radix(digits, radix).ok()?;
  match sign {
    Some('-') => {
      if value > (1u64 << 63) {
        return None;
      }
      Some((value as i64).wrapping_neg())
    }
    _ => {
      if value > i64::MAX as u64 {
        return None;
      }
      Some(value as i64)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decimal() {
    assert_eq!(parse_int("0"), Some(0));
    assert_eq!(parse_int("42"), Some(42));
    assert_eq!(parse_int("-1"), Some(-1));
    assert_eq!(parse_int("+7"), Some(7));
    assert_eq!(parse_int("9223372036854775807"), Some(i64::MAX));
    assert_eq!(parse_int("-9223372036854775808"), Some(i64::MIN));
  }

  #[test]
  fn radix_prefixes() {
    assert_eq!(parse_int("0x48"), Some(0x48));
    assert_eq!(parse_int("0XFF"), Some(255));
    assert_eq!(parse_int("-0x10"), Some(-16));
    assert_eq!(parse_int("0b101"), Some(5));
    assert_eq!(parse_int("0o17"), Some(15));
    assert_eq!(parse_int("017"), Some(15));
  }

  #[test]
  fn rejects_garbage() {
    assert_eq!(parse_int(""), None);
    assert_eq!(parse_int("x"), None);
    assert_eq!(parse_int("0x"), None);
    assert_eq!(parse_int("0xZZ"), None);
    assert_eq!(parse_int("12ab"), None);
    assert_eq!(parse_int("09"), None); // neither octal nor decimal
    assert_eq!(parse_int("1 2"), None);
    assert_eq!(parse_int("--1"), None);
    assert_eq!(parse_int("9223372036854775808"), None); // one past i64::MAX
    assert_eq!(parse_int("-9223372036854775809"), None);
  }
}
