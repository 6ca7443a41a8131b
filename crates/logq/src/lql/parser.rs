//! Recursive-descent parser and type checker.
//!
//! ```text
//! expr       := orExpr
//! orExpr     := andExpr ( OR andExpr )*
//! andExpr    := notExpr ( AND notExpr )*
//! notExpr    := NOT notExpr | primary
//! primary    := comparison | '(' expr ')'
//! comparison := field op literal
//! ```

use chrono::DateTime;

use crate::error::{QueryError, Result};
use crate::lql::CompileOptions;
use crate::lql::ast::{CmpOp, Comparison, Expr, Field, Value};
use crate::lql::lexer::{Token, TokenKind, tokenize};

/// Parses and type-checks `text` into a predicate tree.
pub(crate) fn parse(text: &str, options: &CompileOptions) -> Result<Expr> {
    if text.len() > options.max_length {
        return Err(QueryError::Syntax {
            expr: text.to_string(),
            position: 0,
            message: format!(
                "expression is {} bytes, longer than the {}-byte limit",
                text.len(),
                options.max_length
            ),
        });
    }

    let tokens = tokenize(text)?;
    if tokens.len() == 1 {
        return Ok(Expr::All);
    }

    let mut parser = Parser {
        text,
        tokens,
        pos: 0,
        depth: 0,
        max_depth: options.max_depth,
    };
    let expr = parser.parse_or()?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::Eof {
        return Err(parser.syntax(
            trailing.pos,
            format!("unexpected {} after expression", trailing.kind.describe()),
        ));
    }
    Ok(expr)
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &Token {
        // tokenize always ends with Eof, and Eof is never consumed.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn syntax(&self, position: usize, message: impl Into<String>) -> QueryError {
        QueryError::Syntax {
            expr: self.text.to_string(),
            position,
            message: message.into(),
        }
    }

    fn type_error(&self, position: usize, message: impl Into<String>) -> QueryError {
        QueryError::Type {
            expr: self.text.to_string(),
            position,
            message: message.into(),
        }
    }

    fn enter(&mut self, pos: usize) -> Result<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.syntax(
                pos,
                format!("expression nests deeper than {} levels", self.max_depth),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek().kind == TokenKind::Or {
            self.bump();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.peek().kind == TokenKind::And {
            self.bump();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.peek().kind != TokenKind::Not {
            return self.parse_primary();
        }
        let not = self.bump();
        self.enter(not.pos)?;
        let inner = self.parse_not()?;
        self.leave();
        Ok(Expr::Not(Box::new(inner)))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        if self.peek().kind != TokenKind::LParen {
            return self.parse_comparison();
        }
        let open = self.bump();
        self.enter(open.pos)?;
        let inner = self.parse_or()?;
        let close = self.bump();
        if close.kind != TokenKind::RParen {
            return Err(self.syntax(
                close.pos,
                format!(
                    "expected ')' to close '(' at {}, found {}",
                    open.pos,
                    close.kind.describe()
                ),
            ));
        }
        self.leave();
        Ok(inner)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let field_token = self.bump();
        let name = match field_token.kind {
            TokenKind::Ident(name) => name,
            other => {
                return Err(self.syntax(
                    field_token.pos,
                    format!("expected field name or '(', found {}", other.describe()),
                ));
            }
        };

        let op_token = self.bump();
        let op = match op_token.kind {
            TokenKind::Cmp(op) => op,
            other => {
                return Err(self.syntax(
                    op_token.pos,
                    format!(
                        "expected comparison operator after '{name}', found {}",
                        other.describe()
                    ),
                ));
            }
        };

        let literal = self.bump();
        let value = match literal.kind {
            TokenKind::Int(n) => Value::Int(n),
            TokenKind::Str(s) => Value::Str(s),
            other => {
                return Err(self.syntax(
                    literal.pos,
                    format!("expected literal after '{op}', found {}", other.describe()),
                ));
            }
        };

        let field = Field::bind(&name);
        let value = self.check(field_token.pos, &field, op, value)?;
        Ok(Expr::Compare(Comparison { field, op, value }))
    }

    /// Validates an operator/literal pairing for `field`, converting
    /// timestamp strings to nanoseconds.
    fn check(&self, pos: usize, field: &Field, op: CmpOp, value: Value) -> Result<Value> {
        match field {
            Field::Timestamp => {
                if op == CmpOp::Contains {
                    return Err(self.type_error(pos, "'contains' cannot be applied to ts"));
                }
                match value {
                    Value::Int(n) => Ok(Value::Int(n)),
                    Value::Str(s) => parse_time_literal(&s).map(Value::Int).ok_or_else(|| {
                        self.type_error(
                            pos,
                            format!("ts literal '{s}' is neither an integer nor an RFC 3339 time"),
                        )
                    }),
                }
            }
            Field::Message => {
                if op.is_relational() {
                    return Err(self.type_error(
                        pos,
                        format!("'{op}' cannot be applied to msg; use =, != or contains"),
                    ));
                }
                match value {
                    Value::Str(s) => Ok(Value::Str(s)),
                    Value::Int(n) => Err(self.type_error(
                        pos,
                        format!("msg must be compared with a string literal, not {n}"),
                    )),
                }
            }
            Field::Tag(key) => match value {
                Value::Str(s) => Ok(Value::Str(s)),
                Value::Int(n) => Err(self.type_error(
                    pos,
                    format!("tag '{key}' must be compared with a string literal, not {n}"),
                )),
            },
        }
    }
}

/// Parses a quoted timestamp: an integer or an RFC 3339 time.
fn parse_time_literal(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(n) = text.parse::<i64>() {
        return Some(n);
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .and_then(|dt| dt.timestamp_nanos_opt())
}
