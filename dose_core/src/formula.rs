//! Sandboxed arithmetic evaluator for dose formula strings.
//!
//! Formulas are small arithmetic expressions over the patient's weight and
//! age (e.g. `"45 * weightKg / 2"`). They are parsed with a hand-rolled
//! tokenizer and recursive-descent parser supporting `+ - * / ( )`, unary
//! minus, decimal literals, and exactly the bound identifiers `weightKg`,
//! `ageInMonths`, and (in mL-formula context) `dose`. Nothing else is
//! accepted, so admin-entered formulas can never execute arbitrary code.

use std::fmt;

/// Error raised while parsing or evaluating a formula string
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormulaError {
    #[error("formula is empty")]
    Empty,

    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unexpected token at position {pos}: expected {expected}")]
    UnexpectedToken { pos: usize, expected: &'static str },

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("identifier 'dose' is not available in this context")]
    DoseNotBound,

    #[error("formula did not evaluate to a finite number")]
    NotFinite,

    #[error("formula evaluated to a negative dose ({0})")]
    Negative(f64),
}

/// Values available to a formula during evaluation.
///
/// `dose` is only bound when evaluating an explicit mL formula, where it
/// carries the working milligram dose after all capping.
#[derive(Clone, Copy, Debug)]
pub struct Bindings {
    pub weight_kg: f64,
    pub age_in_months: f64,
    pub dose: Option<f64>,
}

impl Bindings {
    /// Bindings for a plain dose or max-dose formula
    pub fn patient(weight_kg: f64, age_in_months: f64) -> Self {
        Self {
            weight_kg,
            age_in_months,
            dose: None,
        }
    }

    /// Bindings for an mL formula, with the working dose available
    pub fn with_dose(weight_kg: f64, age_in_months: f64, dose: f64) -> Self {
        Self {
            weight_kg,
            age_in_months,
            dose: Some(dose),
        }
    }

    fn lookup(&self, name: &str) -> Result<f64, FormulaError> {
        match name {
            "weightKg" => Ok(self.weight_kg),
            "ageInMonths" => Ok(self.age_in_months),
            "dose" => self.dose.ok_or(FormulaError::DoseNotBound),
            other => Err(FormulaError::UnknownIdentifier(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

fn tokenize(expr: &str) -> Result<Vec<(usize, Token)>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push((pos, Token::Plus));
            }
            '-' => {
                chars.next();
                tokens.push((pos, Token::Minus));
            }
            '*' => {
                chars.next();
                tokens.push((pos, Token::Star));
            }
            '/' => {
                chars.next();
                tokens.push((pos, Token::Slash));
            }
            '(' => {
                chars.next();
                tokens.push((pos, Token::LParen));
            }
            ')' => {
                chars.next();
                tokens.push((pos, Token::RParen));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut literal = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        literal.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value: f64 = literal
                    .parse()
                    .map_err(|_| FormulaError::UnexpectedChar { ch, pos })?;
                tokens.push((pos, Token::Number(value)));
            }
            c if c.is_ascii_alphabetic() => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((pos, Token::Ident(ident)));
            }
            other => {
                return Err(FormulaError::UnexpectedChar { ch: other, pos });
            }
        }
    }

    Ok(tokens)
}

/// Recursive-descent parser/evaluator over the token stream.
///
/// Grammar:
/// ```text
/// expr    := term (('+' | '-') term)*
/// term    := unary (('*' | '/') unary)*
/// unary   := '-' unary | primary
/// primary := NUMBER | IDENT | '(' expr ')'
/// ```
struct Parser<'a> {
    tokens: &'a [(usize, Token)],
    pos: usize,
    bindings: &'a Bindings,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn source_pos(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(p, _)| *p)
            .unwrap_or(0)
    }

    fn expr(&mut self) -> Result<f64, FormulaError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.next();
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.next();
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, FormulaError> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.next();
                    value *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.next();
                    value /= self.unary()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, FormulaError> {
        if let Some(Token::Minus) = self.peek() {
            self.next();
            return Ok(-self.unary()?);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<f64, FormulaError> {
        let pos = self.source_pos();
        match self.next().cloned() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Ident(name)) => self.bindings.lookup(&name),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(FormulaError::UnexpectedToken {
                        pos,
                        expected: "closing parenthesis",
                    }),
                }
            }
            _ => Err(FormulaError::UnexpectedToken {
                pos,
                expected: "number, identifier, or parenthesized expression",
            }),
        }
    }
}

/// Evaluate a formula string against the given bindings.
///
/// The result must be a finite, non-negative number; anything else
/// (division by zero, a negative dose) is rejected.
pub fn evaluate(expr: &str, bindings: &Bindings) -> Result<f64, FormulaError> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(FormulaError::Empty);
    }

    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        bindings,
    };
    let value = parser.expr()?;

    if parser.pos != tokens.len() {
        return Err(FormulaError::UnexpectedToken {
            pos: parser.source_pos(),
            expected: "end of formula",
        });
    }
    if !value.is_finite() {
        return Err(FormulaError::NotFinite);
    }
    if value < 0.0 {
        return Err(FormulaError::Negative(value));
    }

    Ok(value)
}

/// Check that a formula parses and evaluates cleanly, without caring about
/// the numeric result.
///
/// Intended for eager validation when an admin saves an override or default
/// edit, so a typo surfaces immediately instead of silently degrading the
/// calculation path later. Uses representative placeholder bindings; set
/// `allow_dose` when validating an mL formula.
pub fn validate(expr: &str, allow_dose: bool) -> Result<(), FormulaError> {
    let bindings = Bindings {
        weight_kg: 10.0,
        age_in_months: 24.0,
        dose: if allow_dose { Some(100.0) } else { None },
    };
    match evaluate(expr, &bindings) {
        Ok(_) => Ok(()),
        // The numeric outcome at the placeholder inputs is not the check:
        // "weightKg - 20" is negative there and "weightKg/(ageInMonths-24)"
        // divides by zero there, yet both are legitimate formulas. Only
        // structural errors are fatal.
        Err(FormulaError::Negative(_)) | Err(FormulaError::NotFinite) => Ok(()),
        Err(e) => Err(e),
    }
}
