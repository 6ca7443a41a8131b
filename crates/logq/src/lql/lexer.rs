//! Tokenizer for filter expressions.

use crate::error::{QueryError, Result};
use crate::lql::ast::CmpOp;

/// Kinds of lexical tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident(String),
    Str(String),
    Int(i64),
    Cmp(CmpOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
    Eof,
}

impl TokenKind {
    /// Short human-readable description used in error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::Str(s) => format!("string '{s}'"),
            Self::Int(n) => format!("integer {n}"),
            Self::Cmp(op) => format!("operator '{op}'"),
            Self::And => "AND".to_string(),
            Self::Or => "OR".to_string(),
            Self::Not => "NOT".to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::Eof => "end of expression".to_string(),
        }
    }
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

const fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

const fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-' | b'/')
}

/// Splits `text` into tokens, always ending with [`TokenKind::Eof`].
pub(crate) fn tokenize(text: &str) -> Result<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    let syntax = |position: usize, message: String| QueryError::Syntax {
        expr: text.to_string(),
        position,
        message,
    };

    while pos < bytes.len() {
        let b = bytes[pos];
        if b.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;
        let kind = match b {
            b'(' => {
                pos += 1;
                TokenKind::LParen
            }
            b')' => {
                pos += 1;
                TokenKind::RParen
            }
            b'=' => {
                pos += 1;
                TokenKind::Cmp(CmpOp::Eq)
            }
            b'!' if bytes.get(pos + 1) == Some(&b'=') => {
                pos += 2;
                TokenKind::Cmp(CmpOp::Ne)
            }
            b'<' | b'>' => {
                let or_equal = bytes.get(pos + 1) == Some(&b'=');
                pos += if or_equal { 2 } else { 1 };
                TokenKind::Cmp(match (b, or_equal) {
                    (b'<', false) => CmpOp::Lt,
                    (b'<', true) => CmpOp::Le,
                    (_, false) => CmpOp::Gt,
                    (_, true) => CmpOp::Ge,
                })
            }
            b'\'' | b'"' => {
                let Some(len) = text[pos + 1..].find(char::from(b)) else {
                    return Err(syntax(start, "unterminated string literal".to_string()));
                };
                let value = text[pos + 1..pos + 1 + len].to_string();
                pos += len + 2;
                TokenKind::Str(value)
            }
            b'-' | b'+' | b'0'..=b'9' => {
                let digits_start = if b.is_ascii_digit() { pos } else { pos + 1 };
                let mut end = digits_start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if end == digits_start {
                    return Err(syntax(start, format!("expected digits after '{}'", char::from(b))));
                }
                if end < bytes.len() && is_ident_byte(bytes[end]) {
                    return Err(syntax(end, "malformed integer literal".to_string()));
                }
                let value = text[pos..end].parse::<i64>().map_err(|_| {
                    syntax(start, format!("integer literal {} is out of range", &text[pos..end]))
                })?;
                pos = end;
                TokenKind::Int(value)
            }
            b if is_ident_start(b) => {
                while pos < bytes.len() && is_ident_byte(bytes[pos]) {
                    pos += 1;
                }
                let word = &text[start..pos];
                match word.to_ascii_uppercase().as_str() {
                    "AND" => TokenKind::And,
                    "OR" => TokenKind::Or,
                    "NOT" => TokenKind::Not,
                    "CONTAINS" => TokenKind::Cmp(CmpOp::Contains),
                    _ => TokenKind::Ident(word.to_string()),
                }
            }
            _ => {
                let c = text[pos..].chars().next().unwrap_or('?');
                return Err(syntax(start, format!("unexpected character '{c}'")));
            }
        };

        tokens.push(Token { kind, pos: start });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        pos: text.len(),
    });
    Ok(tokens)
}
