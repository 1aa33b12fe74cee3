//! Challenge solver for the login handshake
//!
//! The endpoint sends an arithmetic program such as `=100; +50; -20; *2; /3; Bitti`.
//! Each `;`-separated step applies one operator with an unsigned literal to an
//! accumulator starting at zero. The final accumulator is the login token.

/// Marks the end of the program; any step containing it is ignored.
pub const END_SENTINEL: &str = "Bitti";

/// Errors produced while evaluating a challenge
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeError {
    #[error("division by zero in challenge step '{0}'")]
    DivisionByZero(String),

    #[error("arithmetic overflow in challenge step '{0}'")]
    Overflow(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'=' => Some(Self::Assign),
            b'+' => Some(Self::Add),
            b'-' => Some(Self::Sub),
            b'*' => Some(Self::Mul),
            b'/' => Some(Self::Div),
            _ => None,
        }
    }
}

/// Evaluate a challenge program into its response token.
pub fn solve(program: &str) -> Result<i64, ChallengeError> {
    let mut acc: i64 = 0;

    for step in program
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.contains(END_SENTINEL))
    {
        let Some((op, literal)) = parse_step(step) else {
            continue;
        };
        let value: i64 = literal
            .parse()
            .map_err(|_| ChallengeError::Overflow(step.to_string()))?;

        acc = match op {
            Op::Assign => Some(value),
            Op::Add => acc.checked_add(value),
            Op::Sub => acc.checked_sub(value),
            Op::Mul => acc.checked_mul(value),
            Op::Div => {
                if value == 0 {
                    return Err(ChallengeError::DivisionByZero(step.to_string()));
                }
                floor_div(acc, value)
            }
        }
        .ok_or_else(|| ChallengeError::Overflow(step.to_string()))?;
    }

    Ok(acc)
}

/// Find the first operator in `step` that is followed by an optional `=`,
/// optional whitespace and at least one digit.
fn parse_step(step: &str) -> Option<(Op, &str)> {
    let bytes = step.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        let Some(op) = Op::from_byte(b) else {
            continue;
        };

        let mut j = i + 1;
        if bytes.get(j) == Some(&b'=') {
            j += 1;
        }
        while bytes.get(j).is_some_and(|c| c.is_ascii_whitespace()) {
            j += 1;
        }
        let start = j;
        while bytes.get(j).is_some_and(u8::is_ascii_digit) {
            j += 1;
        }
        if j > start {
            return Some((op, &step[start..j]));
        }
    }

    None
}

/// Integer division rounding towards negative infinity.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_program() {
        assert_eq!(solve("=100; +50; -20; *2; /3; Bitti"), Ok(86));
    }

    #[test]
    fn test_division_floors_negative() {
        assert_eq!(solve("=-7;/2"), Ok(-4));
        assert_eq!(solve("-1;/3"), Ok(-1));
        assert_eq!(solve("-9;/3"), Ok(-3));
    }

    #[test]
    fn test_operator_with_equals_and_spaces() {
        assert_eq!(solve("= 10; += 5; *= 3"), Ok(45));
    }

    #[test]
    fn test_unrecognized_steps_are_skipped() {
        assert_eq!(solve("=4; hello; +; *x; +1"), Ok(5));
    }

    #[test]
    fn test_sentinel_step_discarded_anywhere() {
        assert_eq!(solve("=3; +100 Bitti; *2"), Ok(6));
    }

    #[test]
    fn test_empty_program() {
        assert_eq!(solve(""), Ok(0));
        assert_eq!(solve(" ; ;Bitti"), Ok(0));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            solve("=5;/0"),
            Err(ChallengeError::DivisionByZero("/0".into()))
        );
    }

    #[test]
    fn test_overflow_is_reported() {
        assert!(matches!(
            solve("=9223372036854775807;+1"),
            Err(ChallengeError::Overflow(_))
        ));
        assert!(matches!(
            solve("=99999999999999999999"),
            Err(ChallengeError::Overflow(_))
        ));
    }

    #[test]
    fn test_deterministic() {
        let program = "=12; *7; -3; /4; +1";
        assert_eq!(solve(program), solve(program));
        assert_eq!(solve(program), Ok(21));
    }
}
