use std::iter::Peekable;
use std::str::CharIndices;

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::validation::value::{NULL_LITERAL, Value};

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Binary operators, from lowest to highest precedence: `||`, `&&`, comparisons, `+ -`,
/// `* /`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

/// A parsed rule expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(Value),
    Op(BinaryOp),
    Not,
    LParen,
    RParen,
}

/// Parses a rule expression into an [`Expr`].
pub fn parse(source: &str) -> SyncResult<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        position: 0,
        source,
    };

    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        bail!(
            ErrorKind::InvalidExpression,
            "Unexpected trailing token in rule expression",
            format!("{token:?} in `{source}`")
        );
    }

    Ok(expr)
}

fn tokenize(source: &str) -> SyncResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '\'' | '"' => {
                chars.next();
                tokens.push(Token::Literal(Value::Str(read_string(
                    &mut chars, c, source,
                )?)));
            }
            '0'..='9' => tokens.push(Token::Literal(read_number(&mut chars, source)?)),
            c if c.is_alphabetic() || c == '_' => {
                let word = read_while(&mut chars, source, start, |c| {
                    c.is_alphanumeric() || c == '_' || c == '.'
                });
                let token = match word {
                    "true" | "TRUE" => Token::Literal(Value::Bool(true)),
                    "false" | "FALSE" => Token::Literal(Value::Bool(false)),
                    "null" | NULL_LITERAL => Token::Literal(Value::Null),
                    _ => Token::Ident(word.to_string()),
                };
                tokens.push(token);
            }
            _ => {
                chars.next();
                let next = chars.peek().map(|&(_, c)| c);
                let (token, double) = match (c, next) {
                    ('=', Some('=')) => (Token::Op(BinaryOp::Eq), true),
                    ('!', Some('=')) => (Token::Op(BinaryOp::Ne), true),
                    ('<', Some('=')) => (Token::Op(BinaryOp::Le), true),
                    ('>', Some('=')) => (Token::Op(BinaryOp::Ge), true),
                    ('&', Some('&')) => (Token::Op(BinaryOp::And), true),
                    ('|', Some('|')) => (Token::Op(BinaryOp::Or), true),
                    ('!', _) => (Token::Not, false),
                    ('<', _) => (Token::Op(BinaryOp::Lt), false),
                    ('>', _) => (Token::Op(BinaryOp::Gt), false),
                    ('+', _) => (Token::Op(BinaryOp::Add), false),
                    ('-', _) => (Token::Op(BinaryOp::Sub), false),
                    ('*', _) => (Token::Op(BinaryOp::Mul), false),
                    ('/', _) => (Token::Op(BinaryOp::Div), false),
                    _ => bail!(
                        ErrorKind::InvalidExpression,
                        "Unexpected character in rule expression",
                        format!("`{c}` at offset {start} in `{source}`")
                    ),
                };
                if double {
                    chars.next();
                }
                tokens.push(token);
            }
        }
    }

    Ok(tokens)
}

fn read_while<'a>(
    chars: &mut Peekable<CharIndices<'_>>,
    source: &'a str,
    start: usize,
    predicate: impl Fn(char) -> bool,
) -> &'a str {
    let mut end = start;
    while let Some(&(index, c)) = chars.peek() {
        if !predicate(c) {
            break;
        }
        end = index + c.len_utf8();
        chars.next();
    }

    &source[start..end]
}

fn read_string(
    chars: &mut Peekable<CharIndices<'_>>,
    quote: char,
    source: &str,
) -> SyncResult<String> {
    let mut value = String::new();
    while let Some((_, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => value.push(escaped),
                None => break,
            },
            c if c == quote => return Ok(value),
            c => value.push(c),
        }
    }

    bail!(
        ErrorKind::InvalidExpression,
        "Unterminated string literal in rule expression",
        source
    )
}

fn read_number(chars: &mut Peekable<CharIndices<'_>>, source: &str) -> SyncResult<Value> {
    let start = chars.peek().map(|&(index, _)| index).unwrap_or_default();
    let text = read_while(chars, source, start, |c| c.is_ascii_digit() || c == '.');

    let value = if text.contains('.') {
        text.parse().ok().map(Value::Float)
    } else {
        match text.parse::<i64>() {
            Ok(value) => Some(Value::Int(value)),
            Err(_) => text.parse().ok().map(Value::UInt),
        }
    };

    match value {
        Some(value) => Ok(value),
        None => bail!(
            ErrorKind::InvalidExpression,
            "Rule contains a malformed number",
            text.to_string()
        ),
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn peek_op(&self, ops: &[BinaryOp]) -> Option<BinaryOp> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => Some(*op),
            _ => None,
        }
    }

    fn parse_or(&mut self) -> SyncResult<Expr> {
        self.parse_left_assoc(&[BinaryOp::Or], Self::parse_and)
    }

    fn parse_and(&mut self) -> SyncResult<Expr> {
        self.parse_left_assoc(&[BinaryOp::And], Self::parse_comparison)
    }

    fn parse_comparison(&mut self) -> SyncResult<Expr> {
        const COMPARISONS: &[BinaryOp] = &[
            BinaryOp::Eq,
            BinaryOp::Ne,
            BinaryOp::Lt,
            BinaryOp::Le,
            BinaryOp::Gt,
            BinaryOp::Ge,
        ];

        let left = self.parse_additive()?;
        match self.peek_op(COMPARISONS) {
            Some(op) => {
                self.position += 1;
                let right = self.parse_additive()?;
                Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
            }
            None => Ok(left),
        }
    }

    fn parse_additive(&mut self) -> SyncResult<Expr> {
        self.parse_left_assoc(&[BinaryOp::Add, BinaryOp::Sub], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> SyncResult<Expr> {
        self.parse_left_assoc(&[BinaryOp::Mul, BinaryOp::Div], Self::parse_unary)
    }

    fn parse_left_assoc(
        &mut self,
        ops: &[BinaryOp],
        operand: fn(&mut Self) -> SyncResult<Expr>,
    ) -> SyncResult<Expr> {
        let mut left = operand(self)?;
        while let Some(op) = self.peek_op(ops) {
            self.position += 1;
            let right = operand(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> SyncResult<Expr> {
        match self.peek() {
            Some(Token::Not) => {
                self.position += 1;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.parse_unary()?)))
            }
            Some(Token::Op(BinaryOp::Sub)) => {
                self.position += 1;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> SyncResult<Expr> {
        match self.next() {
            Some(Token::Literal(value)) => Ok(Expr::Literal(value)),
            Some(Token::Ident(name)) => Ok(Expr::Variable(name)),
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(expr),
                    _ => bail!(
                        ErrorKind::InvalidExpression,
                        "Missing closing parenthesis in rule expression",
                        self.source
                    ),
                }
            }
            Some(token) => bail!(
                ErrorKind::InvalidExpression,
                "Unexpected token in rule expression",
                format!("{token:?} in `{}`", self.source)
            ),
            None => bail!(
                ErrorKind::InvalidExpression,
                "Rule expression ended unexpectedly",
                self.source
            ),
        }
    }
}
