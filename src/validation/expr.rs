//! Arithmetic expression evaluation.
//!
//! Grammar:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/' | '%') unary)*
//! unary  := '-' unary | '+' unary | power
//! power  := atom ('^' unary)?
//! atom   := number | '(' expr ')'
//! ```
//!
//! Nesting is bounded by [`MAX_DEPTH`].

use thiserror::Error;

/// Deepest nesting of parentheses and unary operators accepted.
pub const MAX_DEPTH: usize = 256;

/// Errors raised while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    /// Input ended where a value was expected.
    #[error("Unexpected end of expression")]
    UnexpectedEnd,
    /// Character that is not part of the grammar.
    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedChar {
        /// Offending character.
        ch: char,
        /// Byte offset.
        pos: usize,
    },
    /// Number literal that cannot be parsed.
    #[error("Invalid number: {literal}")]
    InvalidNumber {
        /// Literal text.
        literal: String,
    },
    /// Division or remainder by zero.
    #[error("Division by zero")]
    DivisionByZero,
    /// Result is NaN or infinite.
    #[error("Result is not a finite number")]
    NonFinite,
    /// Nesting exceeds [`MAX_DEPTH`].
    #[error("Expression nested deeper than {max} levels")]
    TooDeep {
        /// Limit that was exceeded.
        max: usize,
    },
}

/// Evaluate an arithmetic expression.
pub fn evaluate(input: &str) -> Result<f64, ExprError> {
    let mut parser = Parser {
        chars: input.char_indices().collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    parser.skip_whitespace();
    if let Some(&(pos, ch)) = parser.chars.get(parser.pos) {
        return Err(ExprError::UnexpectedChar { ch, pos });
    }
    if !value.is_finite() {
        return Err(ExprError::NonFinite);
    }
    Ok(value)
}

struct Parser {
    chars: Vec<(usize, char)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn descend(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep { max: MAX_DEPTH });
        }
        Ok(())
    }

    fn skip_whitespace(&mut self) {
        while self
            .chars
            .get(self.pos)
            .is_some_and(|(_, c)| c.is_whitespace())
        {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn expr(&mut self) -> Result<f64, ExprError> {
        let mut value = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, ExprError> {
        let mut value = self.unary()?;
        while let Some(op @ ('*' | '/' | '%')) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = match op {
                '*' => value * rhs,
                _ if rhs == 0.0 => return Err(ExprError::DivisionByZero),
                '/' => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, ExprError> {
        self.descend()?;
        let value = self.unary_inner();
        self.depth -= 1;
        value
    }

    fn unary_inner(&mut self) -> Result<f64, ExprError> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some('+') => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, ExprError> {
        let base = self.atom()?;
        if self.peek() == Some('^') {
            self.pos += 1;
            // right-associative
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, ExprError> {
        match self.peek() {
            None => Err(ExprError::UnexpectedEnd),
            Some('(') => {
                self.pos += 1;
                self.descend()?;
                let value = self.expr()?;
                self.depth -= 1;
                match self.peek() {
                    Some(')') => {
                        self.pos += 1;
                        Ok(value)
                    }
                    Some(ch) => Err(ExprError::UnexpectedChar {
                        ch,
                        pos: self.chars[self.pos].0,
                    }),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(ch) => Err(ExprError::UnexpectedChar {
                ch,
                pos: self.chars[self.pos].0,
            }),
        }
    }

    fn number(&mut self) -> Result<f64, ExprError> {
        let start = self.pos;
        while self
            .chars
            .get(self.pos)
            .is_some_and(|(_, c)| c.is_ascii_digit() || *c == '.')
        {
            self.pos += 1;
        }
        let literal: String = self.chars[start..self.pos].iter().map(|&(_, c)| c).collect();
        literal
            .parse::<f64>()
            .map_err(|_| ExprError::InvalidNumber { literal })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_and_parentheses() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("10 - 4 - 3").unwrap(), 3.0);
        assert_eq!(evaluate("17 % 5").unwrap(), 2.0);
    }

    #[test]
    fn test_power_is_right_associative() {
        assert_eq!(evaluate("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(evaluate("-2 ^ 2").unwrap(), -4.0);
    }

    #[test]
    fn test_unary_and_decimals() {
        assert_eq!(evaluate("-(1.5 + 0.5)").unwrap(), -2.0);
        assert_eq!(evaluate("--3").unwrap(), 3.0);
        assert!((evaluate("0.1 + 0.2").unwrap() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_errors() {
        assert_eq!(evaluate("1 / 0"), Err(ExprError::DivisionByZero));
        assert_eq!(evaluate("5 % 0"), Err(ExprError::DivisionByZero));
        assert_eq!(evaluate("2 +"), Err(ExprError::UnexpectedEnd));
        assert_eq!(evaluate(""), Err(ExprError::UnexpectedEnd));
        assert!(matches!(
            evaluate("2 + x"),
            Err(ExprError::UnexpectedChar { ch: 'x', .. })
        ));
        assert!(matches!(
            evaluate("1.2.3"),
            Err(ExprError::InvalidNumber { .. })
        ));
        assert!(matches!(
            evaluate("(1 + 2"),
            Err(ExprError::UnexpectedEnd)
        ));
        assert!(matches!(
            evaluate("1 2"),
            Err(ExprError::UnexpectedChar { ch: '2', .. })
        ));
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |depth: usize| format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(evaluate(&nested(100)).unwrap(), 1.0);
        assert_eq!(
            evaluate(&nested(10_000)),
            Err(ExprError::TooDeep { max: MAX_DEPTH })
        );
        assert_eq!(
            evaluate(&format!("{}5", "-".repeat(100_000))),
            Err(ExprError::TooDeep { max: MAX_DEPTH })
        );
        assert!(matches!(
            evaluate(&"2^".repeat(50_000)),
            Err(ExprError::TooDeep { .. })
        ));
    }

    #[test]
    fn test_depth_resets_between_siblings() {
        let sibling = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        let sum = vec![sibling; 20].join(" + ");
        assert_eq!(evaluate(&sum).unwrap(), 20.0);
    }
}
