//! Position addressing for ordered collections and strings.
//!
//! A position is either a raw integer or a token such as `1st`, `3rd`,
//! `last` or `2ndlast`.

use std::fmt;

use crate::core::types::ValueError;
use crate::schema::value::Value;

/// A parsed position: a 0-based offset counted from the start or the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub offset: usize,
    pub from_end: bool,
}

impl Position {
    /// Parse a position token: `<N><ordinal>`, `last`, or `<N><ordinal>last`.
    /// A bare integer, signed or not, is read as a raw position.
    pub fn parse(token: &str) -> Result<Position, ValueError> {
        let token = token.trim();
        let invalid = || ValueError::InvalidPosition(token.to_string());
        if let Ok(n) = token.parse::<i64>() {
            return Ok(Self::from_raw(n));
        }

        let digits_end = token
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(token.len());
        let (digits, mut rest) = token.split_at(digits_end);

        let ordinal = if digits.is_empty() {
            None
        } else {
            let n: usize = digits.parse().map_err(|_| invalid())?;
            if n == 0 {
                return Err(invalid());
            }
            for suffix in ["st", "nd", "rd", "th"] {
                if let Some(stripped) = rest.strip_prefix(suffix) {
                    rest = stripped;
                    break;
                }
            }
            Some(n)
        };

        let from_end = match rest {
            "" => false,
            "last" => true,
            _ => return Err(invalid()),
        };
        if ordinal.is_none() && !from_end {
            return Err(invalid());
        }

        Ok(Position {
            offset: ordinal.map_or(0, |n| n - 1),
            from_end,
        })
    }

    /// Interpret a raw integer. Positive integers are 1-based from the start.
    /// Zero and negative integers count from the end by magnitude, so `0` is
    /// the last element and `-1` the one before it.
    pub fn from_raw(n: i64) -> Position {
        if n > 0 {
            Position {
                offset: (n - 1) as usize,
                from_end: false,
            }
        } else {
            Position {
                offset: n.unsigned_abs() as usize,
                from_end: true,
            }
        }
    }

    /// Read a position from a number (truncated) or a token string.
    pub fn from_value(value: &Value) -> Result<Position, ValueError> {
        match value {
            Value::Number(n) => Ok(Self::from_raw(n.trunc() as i64)),
            Value::Text(token) => Self::parse(token),
            other => Err(ValueError::InvalidPosition(other.to_string())),
        }
    }

    /// Resolve against a sequence of `len` elements.
    pub fn resolve(&self, len: usize) -> Result<usize, ValueError> {
        if self.offset >= len {
            return Err(ValueError::PositionOutOfRange {
                position: self.to_string(),
                len,
            });
        }
        if self.from_end {
            Ok(len - 1 - self.offset)
        } else {
            Ok(self.offset)
        }
    }
}

fn ordinal_suffix(n: usize) -> &'static str {
    match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.offset + 1;
        match (self.from_end, self.offset) {
            (true, 0) => f.write_str("last"),
            (true, _) => write!(f, "{}{}last", n, ordinal_suffix(n)),
            (false, _) => write!(f, "{}{}", n, ordinal_suffix(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(token: &str, len: usize) -> Result<usize, ValueError> {
        Position::parse(token)?.resolve(len)
    }

    #[test]
    fn ordinals_from_start() {
        assert_eq!(resolve("1st", 5).unwrap(), 0);
        assert_eq!(resolve("3rd", 5).unwrap(), 2);
        assert_eq!(resolve("5th", 5).unwrap(), 4);
    }

    #[test]
    fn last_and_nth_last() {
        assert_eq!(resolve("last", 5).unwrap(), 4);
        assert_eq!(resolve("2ndlast", 5).unwrap(), 3);
        assert_eq!(resolve("5thlast", 5).unwrap(), 0);
    }

    #[test]
    fn out_of_range_is_an_error() {
        assert_eq!(
            resolve("6th", 5).unwrap_err(),
            ValueError::PositionOutOfRange {
                position: "6th".to_string(),
                len: 5,
            }
        );
        assert!(resolve("last", 0).is_err());
    }

    #[test]
    fn bad_tokens_are_rejected() {
        for token in ["", "first", "0th", "2ndfirst", "lastly"] {
            assert!(
                matches!(Position::parse(token), Err(ValueError::InvalidPosition(_))),
                "token {:?} should be invalid",
                token
            );
        }
    }

    #[test]
    fn raw_integers() {
        assert_eq!(Position::from_raw(1).resolve(5).unwrap(), 0);
        assert_eq!(Position::from_raw(5).resolve(5).unwrap(), 4);
        assert_eq!(Position::from_raw(0).resolve(5).unwrap(), 4);
        assert_eq!(Position::from_raw(-1).resolve(5).unwrap(), 3);
        assert!(Position::from_raw(6).resolve(5).is_err());
    }

    #[test]
    fn integer_text_is_a_raw_position() {
        assert_eq!(resolve("2", 5).unwrap(), 1);
        assert_eq!(resolve("0", 5).unwrap(), 4);
        assert_eq!(resolve("-1", 5).unwrap(), 3);
        assert_eq!(resolve(" -4 ", 5).unwrap(), 0);
        assert!(resolve("-5", 5).is_err());
        assert_eq!(
            Position::from_value(&Value::text("-1")).unwrap(),
            Position::from_value(&Value::from(-1)).unwrap()
        );
    }

    #[test]
    fn display_round_trips_tokens() {
        for token in ["1st", "2nd", "3rd", "11th", "22nd", "last", "2ndlast"] {
            assert_eq!(Position::parse(token).unwrap().to_string(), token);
        }
    }
}
