//! Filter expression language.
//!
//! ```text
//! expression := or
//! or         := and (("||" | "or") and)*
//! and        := unary (("&&" | "and") unary)*
//! unary      := ("!" | "not") unary | "(" expression ")" | condition
//! condition  := field op value
//! ```
//!
//! Comparison operators (`==`, `!=`, `<`, `<=`, `>`, `>=`) compare
//! numerically when both sides are numbers (durations in seconds) and as
//! strings otherwise. String operators: `^=` prefix, `$=` suffix, `*=`
//! substring, `~=` regex, `!~` negated regex. Values are bare words or
//! double-quoted strings. A condition on a missing field is false.

// Local crates
use crate::filter::{
    errors::FilterError,
    matcher::{Matcher, compile_regex},
};
use crate::parser::fields::{FieldValue, ParsedFields};

// External crates
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::Ne => ordering != Ordering::Equal,
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Le => ordering != Ordering::Greater,
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Ge => ordering != Ordering::Less,
        }
    }
}

/// A single `field op value` test.
#[derive(Debug, Clone)]
pub enum Condition {
    Compare {
        field: String,
        op: Comparison,
        value: String,
        number: Option<f64>,
    },
    Match {
        field: String,
        matcher: Matcher,
        negate: bool,
    },
}

impl Condition {
    fn evaluate(&self, fields: &ParsedFields) -> bool {
        match self {
            Condition::Compare {
                field,
                op,
                value,
                number,
            } => match fields.get(field) {
                Some(lhs) => compare(lhs, *op, value, *number),
                None => false,
            },
            Condition::Match {
                field,
                matcher,
                negate,
            } => match fields.get(field) {
                Some(lhs) => matcher.matches(&lhs.to_text()) != *negate,
                None => false,
            },
        }
    }
}

fn compare(lhs: &FieldValue, op: Comparison, value: &str, number: Option<f64>) -> bool {
    let ordering = match (lhs.as_f64(), number) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => Some(lhs.to_text().as_ref().cmp(value)),
    };

    ordering.is_some_and(|ordering| op.holds(ordering))
}

/// Compiled filter expression tree.
#[derive(Debug, Clone)]
pub enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Condition(Condition),
}

impl Expr {
    /// Parse and compile an expression.
    pub fn parse(expression: &str) -> Result<Self, FilterError> {
        let tokens = lex(expression)?;
        if tokens.is_empty() {
            return Err(syntax(expression, 0, "expression is empty"));
        }

        let mut parser = Parser {
            expression,
            tokens,
            cursor: 0,
        };
        let expr = parser.parse_or()?;

        if let Some(extra) = parser.tokens.get(parser.cursor) {
            return Err(syntax(expression, extra.position, "unexpected trailing input"));
        }

        Ok(expr)
    }

    /// Side-effect free evaluation against one parsed line.
    pub fn evaluate(&self, fields: &ParsedFields) -> bool {
        match self {
            Expr::And(l, r) => l.evaluate(fields) && r.evaluate(fields),
            Expr::Or(l, r) => l.evaluate(fields) || r.evaluate(fields),
            Expr::Not(e) => !e.evaluate(fields),
            Expr::Condition(c) => c.evaluate(fields),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Cmp(Comparison),
    Prefix,
    Suffix,
    Contains,
    Regex,
    NotRegex,
}

#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    Word(String),
    Quoted(String),
    Op(Op),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

#[derive(Debug, Clone)]
struct Token {
    lexeme: Lexeme,
    position: usize,
}

fn syntax(expression: &str, position: usize, reason: &str) -> FilterError {
    FilterError::Syntax {
        expression: expression.to_string(),
        position,
        reason: reason.to_string(),
    }
}

const RESERVED: &[char] = &['(', ')', '"', '=', '!', '<', '>', '&', '|', '^', '$', '*', '~'];

fn lex(expression: &str) -> Result<Vec<Token>, FilterError> {
    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let push = |tokens: &mut Vec<Token>, lexeme| tokens.push(Token { lexeme, position });

        match c {
            '(' => {
                chars.next();
                push(&mut tokens, Lexeme::LParen);
            }
            ')' => {
                chars.next();
                push(&mut tokens, Lexeme::RParen);
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, '"')) => value.push('"'),
                            Some((_, '\\')) => value.push('\\'),
                            // Other escapes pass through untouched for regexes.
                            Some((_, other)) => {
                                value.push('\\');
                                value.push(other);
                            }
                            None => break,
                        },
                        other => value.push(other),
                    }
                }
                if !closed {
                    return Err(syntax(expression, position, "unterminated string"));
                }
                push(&mut tokens, Lexeme::Quoted(value));
            }
            _ if RESERVED.contains(&c) => {
                chars.next();
                let next = chars.peek().map(|&(_, c)| c);
                let (lexeme, pair) = match (c, next) {
                    ('&', Some('&')) => (Lexeme::And, true),
                    ('|', Some('|')) => (Lexeme::Or, true),
                    ('=', Some('=')) => (Lexeme::Op(Op::Cmp(Comparison::Eq)), true),
                    ('!', Some('=')) => (Lexeme::Op(Op::Cmp(Comparison::Ne)), true),
                    ('!', Some('~')) => (Lexeme::Op(Op::NotRegex), true),
                    ('<', Some('=')) => (Lexeme::Op(Op::Cmp(Comparison::Le)), true),
                    ('>', Some('=')) => (Lexeme::Op(Op::Cmp(Comparison::Ge)), true),
                    ('^', Some('=')) => (Lexeme::Op(Op::Prefix), true),
                    ('$', Some('=')) => (Lexeme::Op(Op::Suffix), true),
                    ('*', Some('=')) => (Lexeme::Op(Op::Contains), true),
                    ('~', Some('=')) => (Lexeme::Op(Op::Regex), true),
                    ('<', _) => (Lexeme::Op(Op::Cmp(Comparison::Lt)), false),
                    ('>', _) => (Lexeme::Op(Op::Cmp(Comparison::Gt)), false),
                    ('!', _) => (Lexeme::Not, false),
                    _ => return Err(syntax(expression, position, "unknown operator")),
                };
                if pair {
                    chars.next();
                }
                push(&mut tokens, lexeme);
            }
            _ => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_whitespace() || RESERVED.contains(&c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                let lexeme = match word.to_ascii_lowercase().as_str() {
                    "and" => Lexeme::And,
                    "or" => Lexeme::Or,
                    "not" => Lexeme::Not,
                    _ => Lexeme::Word(word),
                };
                push(&mut tokens, lexeme);
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<Token>,
    cursor: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Lexeme> {
        self.tokens.get(self.cursor).map(|t| &t.lexeme)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.cursor)
            .map_or(self.expression.len(), |t| t.position)
    }

    fn eat(&mut self, lexeme: &Lexeme) -> bool {
        if self.peek() == Some(lexeme) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn next(&mut self) -> Option<Lexeme> {
        let lexeme = self.tokens.get(self.cursor).map(|t| t.lexeme.clone());
        if lexeme.is_some() {
            self.cursor += 1;
        }
        lexeme
    }

    fn error(&self, reason: &str) -> FilterError {
        syntax(self.expression, self.position(), reason)
    }

    fn parse_or(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_and()?;
        while self.eat(&Lexeme::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_unary()?;
        while self.eat(&Lexeme::And) {
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, FilterError> {
        if self.eat(&Lexeme::Not) {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        if self.eat(&Lexeme::LParen) {
            let inner = self.parse_or()?;
            if !self.eat(&Lexeme::RParen) {
                return Err(self.error("expected `)`"));
            }
            return Ok(inner);
        }
        self.parse_condition().map(Expr::Condition)
    }

    fn parse_condition(&mut self) -> Result<Condition, FilterError> {
        let field = match self.peek() {
            Some(Lexeme::Word(w)) if w.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {
                w.clone()
            }
            _ => return Err(self.error("expected a field name")),
        };
        self.cursor += 1;

        let op = match self.peek() {
            Some(Lexeme::Op(op)) => *op,
            _ => return Err(self.error("expected an operator")),
        };
        self.cursor += 1;

        let value_position = self.position();
        let value = match self.next() {
            Some(Lexeme::Word(w)) | Some(Lexeme::Quoted(w)) => w,
            _ => return Err(syntax(self.expression, value_position, "expected a value")),
        };

        let condition = match op {
            Op::Cmp(op) => Condition::Compare {
                field,
                op,
                number: value.parse::<f64>().ok().filter(|n| n.is_finite()),
                value,
            },
            Op::Prefix => Condition::Match {
                field,
                matcher: Matcher::Prefix(value),
                negate: false,
            },
            Op::Suffix => Condition::Match {
                field,
                matcher: Matcher::Suffix(value),
                negate: false,
            },
            Op::Contains => Condition::Match {
                field,
                matcher: Matcher::Substring(value),
                negate: false,
            },
            Op::Regex | Op::NotRegex => Condition::Match {
                field,
                matcher: Matcher::Regex(compile_regex(&value)?),
                negate: op == Op::NotRegex,
            },
        };

        Ok(condition)
    }
}
