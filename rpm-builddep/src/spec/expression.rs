// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Evaluation of `%if` expressions.

Operands are integers, double-quoted strings and bare words (treated as
strings). Operators, loosest binding first:

| Operators                   |
|-----------------------------|
| `\|\|`                      |
| `&&`                        |
| `==` `!=` `<` `<=` `>` `>=` |
| `+` `-`                     |
| `*` `/`                     |
| `!` `-` (unary)             |

Macros are expanded before evaluation.
*/

use {super::SpecError, std::cmp::Ordering};

/// The value of an expression.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    Int(i64),
    Str(String),
}

impl Value {
    /// Truthiness: non-zero integers and non-empty strings are true.
    pub fn is_true(&self) -> bool {
        match self {
            Self::Int(v) => *v != 0,
            Self::Str(s) => !s.is_empty(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Token {
    Int(i64),
    Str(String),
    Op(&'static str),
    LeftParen,
    RightParen,
}

const OPERATORS: &[&str] = &[
    "||", "&&", "==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "!",
];

fn tokenize(expr: &str) -> Result<Vec<Token>, SpecError> {
    let mut tokens = vec![];
    let mut rest = expr.trim_start();

    while let Some(c) = rest.chars().next() {
        if c == '(' {
            tokens.push(Token::LeftParen);
            rest = &rest[1..];
        } else if c == ')' {
            tokens.push(Token::RightParen);
            rest = &rest[1..];
        } else if c == '"' {
            let end = rest[1..]
                .find('"')
                .ok_or_else(|| SpecError::Expression(expr.to_string()))?;
            tokens.push(Token::Str(rest[1..end + 1].to_string()));
            rest = &rest[end + 2..];
        } else if c.is_ascii_digit() {
            let end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            let value = rest[..end]
                .parse::<i64>()
                .map_err(|_| SpecError::Expression(expr.to_string()))?;
            tokens.push(Token::Int(value));
            rest = &rest[end..];
        } else if c.is_alphabetic() || c == '_' || c == '%' {
            let end = rest
                .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '.' | '%')))
                .unwrap_or(rest.len());
            tokens.push(Token::Str(rest[..end].to_string()));
            rest = &rest[end..];
        } else if let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(*op)) {
            tokens.push(Token::Op(*op));
            rest = &rest[op.len()..];
        } else {
            return Err(SpecError::Expression(expr.to_string()));
        }

        rest = rest.trim_start();
    }

    Ok(tokens)
}

struct Parser<'a> {
    expr: &'a str,
    tokens: Vec<Token>,
    position: usize,
}

impl<'a> Parser<'a> {
    fn error(&self) -> SpecError {
        SpecError::Expression(self.expr.to_string())
    }

    fn peek_op(&self, candidates: &[&'static str]) -> Option<&'static str> {
        match self.tokens.get(self.position) {
            Some(Token::Op(op)) if candidates.contains(op) => Some(*op),
            _ => None,
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn logical_or(&mut self) -> Result<Value, SpecError> {
        let mut left = self.logical_and()?;

        while self.peek_op(&["||"]).is_some() {
            self.position += 1;
            let right = self.logical_and()?;
            left = Value::Int((left.is_true() || right.is_true()) as i64);
        }

        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Value, SpecError> {
        let mut left = self.comparison()?;

        while self.peek_op(&["&&"]).is_some() {
            self.position += 1;
            let right = self.comparison()?;
            left = Value::Int((left.is_true() && right.is_true()) as i64);
        }

        Ok(left)
    }

    fn comparison(&mut self) -> Result<Value, SpecError> {
        let mut left = self.additive()?;

        while let Some(op) = self.peek_op(&["==", "!=", "<", "<=", ">", ">="]) {
            self.position += 1;
            let right = self.additive()?;

            let ordering = match (&left, &right) {
                (Value::Int(a), Value::Int(b)) => a.cmp(b),
                (Value::Str(a), Value::Str(b)) => a.cmp(b),
                _ => return Err(self.error()),
            };

            let result = match op {
                "==" => ordering == Ordering::Equal,
                "!=" => ordering != Ordering::Equal,
                "<" => ordering == Ordering::Less,
                "<=" => ordering != Ordering::Greater,
                ">" => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };

            left = Value::Int(result as i64);
        }

        Ok(left)
    }

    fn additive(&mut self) -> Result<Value, SpecError> {
        let mut left = self.multiplicative()?;

        while let Some(op) = self.peek_op(&["+", "-"]) {
            self.position += 1;
            let right = self.multiplicative()?;

            left = match (left, right, op) {
                (Value::Int(a), Value::Int(b), "+") => Value::Int(a.wrapping_add(b)),
                (Value::Int(a), Value::Int(b), _) => Value::Int(a.wrapping_sub(b)),
                (Value::Str(a), Value::Str(b), "+") => Value::Str(a + &b),
                _ => return Err(self.error()),
            };
        }

        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Value, SpecError> {
        let mut left = self.unary()?;

        while let Some(op) = self.peek_op(&["*", "/"]) {
            self.position += 1;
            let right = self.unary()?;

            left = match (left, right, op) {
                (Value::Int(_), Value::Int(0), "/") => {
                    return Err(SpecError::Expression(format!(
                        "{}: division by zero",
                        self.expr
                    )))
                }
                (Value::Int(a), Value::Int(b), "/") => Value::Int(a.wrapping_div(b)),
                (Value::Int(a), Value::Int(b), _) => Value::Int(a.wrapping_mul(b)),
                _ => return Err(self.error()),
            };
        }

        Ok(left)
    }

    fn unary(&mut self) -> Result<Value, SpecError> {
        if self.peek_op(&["!"]).is_some() {
            self.position += 1;
            return Ok(Value::Int(!self.unary()?.is_true() as i64));
        }

        if self.peek_op(&["-"]).is_some() {
            self.position += 1;
            return match self.unary()? {
                Value::Int(v) => Ok(Value::Int(v.wrapping_neg())),
                Value::Str(_) => Err(self.error()),
            };
        }

        self.primary()
    }

    fn primary(&mut self) -> Result<Value, SpecError> {
        match self.next() {
            Some(Token::Int(v)) => Ok(Value::Int(v)),
            Some(Token::Str(s)) => Ok(Value::Str(s)),
            Some(Token::LeftParen) => {
                let value = self.logical_or()?;
                match self.next() {
                    Some(Token::RightParen) => Ok(value),
                    _ => Err(self.error()),
                }
            }
            _ => Err(self.error()),
        }
    }
}

/// Evaluate an already macro-expanded expression.
pub fn evaluate(expr: &str) -> Result<Value, SpecError> {
    let mut parser = Parser {
        expr,
        tokens: tokenize(expr)?,
        position: 0,
    };

    if parser.tokens.is_empty() {
        return Err(SpecError::Expression(expr.to_string()));
    }

    let value = parser.logical_or()?;

    if parser.position != parser.tokens.len() {
        return Err(parser.error());
    }

    Ok(value)
}
