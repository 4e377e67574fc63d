//! Restricted boolean expression language for custom rules.
//!
//! Custom-rule conditions and prerequisites are plain data: a source string
//! parsed into an AST and walked by a small interpreter. There is no access to
//! host-language execution, so a rule can compare and combine, nothing else.
//!
//! Grammar (whitespace-insensitive):
//!
//! ```text
//! expr       := or
//! or         := and (("||" | "or") and)*
//! and        := unary (("&&" | "and") unary)*
//! unary      := ("!" | "not") unary | comparison
//! comparison := operand (cmp operand | ["not"] "in" list)?
//! cmp        := "==" | "!=" | "<" | "<=" | ">" | ">="
//! operand    := number | string | "true" | "false" | ident | "(" expr ")"
//! list       := "[" operand ("," operand)* "]"
//! ```
//!
//! Identifiers resolve through a [`VariableScope`]; evaluation is strictly
//! typed (comparing a number with a string is an error, not `false`) and the
//! top-level expression must produce a boolean.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Parse- or evaluation-time failure, with the byte offset it was detected at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct ExpressionError {
    pub message: String,
    pub offset: usize,
}

impl ExpressionError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// A typed expression value.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Read-only variable resolution for expression evaluation.
pub trait VariableScope {
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl VariableScope for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Literal(Value),
    Var { name: String, offset: usize },
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Compare {
        op: CmpOp,
        offset: usize,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    InList {
        negated: bool,
        offset: usize,
        needle: Box<Node>,
        list: Vec<Node>,
    },
}

/// A parsed custom-rule expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    root: Node,
    source: String,
}

impl Expression {
    /// Upper bound on accepted source length, so a stored rule cannot balloon
    /// evaluation cost.
    pub const MAX_SOURCE_LEN: usize = 1024;

    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        if source.len() > Self::MAX_SOURCE_LEN {
            return Err(ExpressionError::new(
                format!(
                    "expression length {} exceeds maximum {}",
                    source.len(),
                    Self::MAX_SOURCE_LEN
                ),
                0,
            ));
        }

        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            source_len: source.len(),
        };
        let root = parser.parse_or()?;
        if let Some((_, offset)) = parser.peek() {
            return Err(ExpressionError::new("unexpected trailing input", offset));
        }
        Ok(Self {
            root,
            source: source.to_string(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates against `scope`; the expression must produce a boolean.
    pub fn evaluate(&self, scope: &dyn VariableScope) -> Result<bool, ExpressionError> {
        match eval(&self.root, scope)? {
            Value::Bool(value) => Ok(value),
            other => Err(ExpressionError::new(
                format!("expression must produce a boolean, got {}", other.type_name()),
                0,
            )),
        }
    }
}

// --- lexer ---

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    And,
    Or,
    Not,
    In,
    Cmp(CmpOp),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'(' => {
                tokens.push((Token::LParen, i));
                i += 1;
            }
            b')' => {
                tokens.push((Token::RParen, i));
                i += 1;
            }
            b'[' => {
                tokens.push((Token::LBracket, i));
                i += 1;
            }
            b']' => {
                tokens.push((Token::RBracket, i));
                i += 1;
            }
            b',' => {
                tokens.push((Token::Comma, i));
                i += 1;
            }
            b'&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push((Token::And, i));
                    i += 2;
                } else {
                    return Err(ExpressionError::new("expected '&&'", i));
                }
            }
            b'|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push((Token::Or, i));
                    i += 2;
                } else {
                    return Err(ExpressionError::new("expected '||'", i));
                }
            }
            b'=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((Token::Cmp(CmpOp::Eq), i));
                    i += 2;
                } else {
                    return Err(ExpressionError::new("expected '==' (assignment is not supported)", i));
                }
            }
            b'!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((Token::Cmp(CmpOp::Ne), i));
                    i += 2;
                } else {
                    tokens.push((Token::Not, i));
                    i += 1;
                }
            }
            b'<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((Token::Cmp(CmpOp::Le), i));
                    i += 2;
                } else {
                    tokens.push((Token::Cmp(CmpOp::Lt), i));
                    i += 1;
                }
            }
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((Token::Cmp(CmpOp::Ge), i));
                    i += 2;
                } else {
                    tokens.push((Token::Cmp(CmpOp::Gt), i));
                    i += 1;
                }
            }
            b'\'' | b'"' => {
                let quote = b;
                let start = i;
                i += 1;
                let content_start = i;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                if i >= bytes.len() {
                    return Err(ExpressionError::new("unterminated string literal", start));
                }
                let text = source[content_start..i].to_string();
                tokens.push((Token::Str(text), start));
                i += 1;
            }
            b'0'..=b'9' | b'-' => {
                let start = i;
                if b == b'-' {
                    if !matches!(bytes.get(i + 1), Some(b'0'..=b'9')) {
                        return Err(ExpressionError::new("expected a digit after '-'", i));
                    }
                    i += 1;
                }
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if i < bytes.len() && bytes[i] == b'.' {
                    i += 1;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text = &source[start..i];
                let value: f64 = text
                    .parse()
                    .map_err(|_| ExpressionError::new(format!("invalid number '{text}'"), start))?;
                tokens.push((Token::Number(value), start));
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.')
                {
                    i += 1;
                }
                let word = &source[start..i];
                let token = match word {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(word.to_string()),
                };
                tokens.push((token, start));
            }
            _ => {
                return Err(ExpressionError::new(
                    format!("unexpected character '{}'", &source[i..].chars().next().unwrap_or('?')),
                    i,
                ));
            }
        }
    }

    Ok(tokens)
}

// --- parser ---

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    source_len: usize,
}

impl Parser {
    fn peek(&self) -> Option<(&Token, usize)> {
        self.tokens.get(self.pos).map(|(t, o)| (t, *o))
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<usize, ExpressionError> {
        match self.next() {
            Some((token, offset)) if &token == expected => Ok(offset),
            Some((_, offset)) => Err(ExpressionError::new(format!("expected {what}"), offset)),
            None => Err(ExpressionError::new(
                format!("expected {what}, found end of input"),
                self.source_len,
            )),
        }
    }

    fn parse_or(&mut self) -> Result<Node, ExpressionError> {
        let mut node = self.parse_and()?;
        while matches!(self.peek(), Some((Token::Or, _))) {
            self.next();
            let rhs = self.parse_and()?;
            node = Node::Or(Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> Result<Node, ExpressionError> {
        let mut node = self.parse_unary()?;
        while matches!(self.peek(), Some((Token::And, _))) {
            self.next();
            let rhs = self.parse_unary()?;
            node = Node::And(Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn parse_unary(&mut self) -> Result<Node, ExpressionError> {
        // `not` doubles as the first half of `not in`; only treat it as a
        // unary operator when it is not immediately followed by `in`.
        if matches!(self.peek(), Some((Token::Not, _)))
            && !matches!(self.tokens.get(self.pos + 1), Some((Token::In, _)))
        {
            self.next();
            let inner = self.parse_unary()?;
            return Ok(Node::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Node, ExpressionError> {
        let lhs = self.parse_operand()?;

        match self.peek() {
            Some((Token::Cmp(op), offset)) => {
                let op = *op;
                self.next();
                let rhs = self.parse_operand()?;
                Ok(Node::Compare {
                    op,
                    offset,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                })
            }
            Some((Token::In, offset)) => {
                self.next();
                let list = self.parse_list()?;
                Ok(Node::InList {
                    negated: false,
                    offset,
                    needle: Box::new(lhs),
                    list,
                })
            }
            Some((Token::Not, offset)) => {
                self.next();
                self.expect(&Token::In, "'in' after 'not'")?;
                let list = self.parse_list()?;
                Ok(Node::InList {
                    negated: true,
                    offset,
                    needle: Box::new(lhs),
                    list,
                })
            }
            _ => Ok(lhs),
        }
    }

    fn parse_operand(&mut self) -> Result<Node, ExpressionError> {
        match self.next() {
            Some((Token::Number(value), _)) => Ok(Node::Literal(Value::Number(value))),
            Some((Token::Str(text), _)) => Ok(Node::Literal(Value::Text(text))),
            Some((Token::True, _)) => Ok(Node::Literal(Value::Bool(true))),
            Some((Token::False, _)) => Ok(Node::Literal(Value::Bool(false))),
            Some((Token::Ident(name), offset)) => Ok(Node::Var { name, offset }),
            Some((Token::LParen, _)) => {
                let node = self.parse_or()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(node)
            }
            Some((_, offset)) => Err(ExpressionError::new("expected a value", offset)),
            None => Err(ExpressionError::new(
                "expected a value, found end of input",
                self.source_len,
            )),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<Node>, ExpressionError> {
        self.expect(&Token::LBracket, "'['")?;
        let mut items = Vec::new();
        loop {
            items.push(self.parse_operand()?);
            match self.next() {
                Some((Token::Comma, _)) => continue,
                Some((Token::RBracket, _)) => break,
                Some((_, offset)) => {
                    return Err(ExpressionError::new("expected ',' or ']'", offset))
                }
                None => {
                    return Err(ExpressionError::new(
                        "expected ',' or ']', found end of input",
                        self.source_len,
                    ))
                }
            }
        }
        Ok(items)
    }
}

// --- interpreter ---

fn eval(node: &Node, scope: &dyn VariableScope) -> Result<Value, ExpressionError> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Var { name, offset } => scope
            .lookup(name)
            .ok_or_else(|| ExpressionError::new(format!("unknown variable '{name}'"), *offset)),
        Node::Not(inner) => match eval(inner, scope)? {
            Value::Bool(value) => Ok(Value::Bool(!value)),
            other => Err(ExpressionError::new(
                format!("'!' requires a boolean, got {}", other.type_name()),
                0,
            )),
        },
        Node::And(lhs, rhs) => {
            // Short-circuit: the right side is not evaluated when the left
            // already settles the result.
            match eval(lhs, scope)? {
                Value::Bool(false) => Ok(Value::Bool(false)),
                Value::Bool(true) => expect_bool(eval(rhs, scope)?, "'&&'"),
                other => Err(ExpressionError::new(
                    format!("'&&' requires booleans, got {}", other.type_name()),
                    0,
                )),
            }
        }
        Node::Or(lhs, rhs) => match eval(lhs, scope)? {
            Value::Bool(true) => Ok(Value::Bool(true)),
            Value::Bool(false) => expect_bool(eval(rhs, scope)?, "'||'"),
            other => Err(ExpressionError::new(
                format!("'||' requires booleans, got {}", other.type_name()),
                0,
            )),
        },
        Node::Compare {
            op,
            offset,
            lhs,
            rhs,
        } => {
            let lhs = eval(lhs, scope)?;
            let rhs = eval(rhs, scope)?;
            compare(*op, &lhs, &rhs, *offset).map(Value::Bool)
        }
        Node::InList {
            negated,
            offset,
            needle,
            list,
        } => {
            let needle = eval(needle, scope)?;
            let mut found = false;
            for item in list {
                let item = eval(item, scope)?;
                if compare(CmpOp::Eq, &needle, &item, *offset)? {
                    found = true;
                    break;
                }
            }
            Ok(Value::Bool(found != *negated))
        }
    }
}

fn expect_bool(value: Value, operator: &str) -> Result<Value, ExpressionError> {
    match value {
        Value::Bool(_) => Ok(value),
        other => Err(ExpressionError::new(
            format!("{operator} requires booleans, got {}", other.type_name()),
            0,
        )),
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value, offset: usize) -> Result<bool, ExpressionError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        }),
        (Value::Text(a), Value::Text(b)) => match op {
            CmpOp::Eq => Ok(a == b),
            CmpOp::Ne => Ok(a != b),
            _ => Err(ExpressionError::new(
                format!("'{}' requires numbers, got strings", op.symbol()),
                offset,
            )),
        },
        (Value::Bool(a), Value::Bool(b)) => match op {
            CmpOp::Eq => Ok(a == b),
            CmpOp::Ne => Ok(a != b),
            _ => Err(ExpressionError::new(
                format!("'{}' requires numbers, got booleans", op.symbol()),
                offset,
            )),
        },
        _ => Err(ExpressionError::new(
            format!(
                "cannot compare {} with {}",
                lhs.type_name(),
                rhs.type_name()
            ),
            offset,
        )),
    }
}
