//! Predicate tree produced by the compiler.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CmpOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `contains` (case-sensitive substring)
    Contains,
}

impl CmpOp {
    /// Returns the operator as written in expressions.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Contains => "contains",
        }
    }

    /// Returns true for `<`, `<=`, `>`, `>=`.
    #[must_use]
    pub const fn is_relational(&self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a comparison reads from the event or its tag line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    /// The event timestamp (`ts`).
    Timestamp,
    /// The event message (`msg`).
    Message,
    /// A tag looked up by key.
    Tag(String),
}

impl Field {
    /// Binds an identifier from expression text.
    ///
    /// Every other name becomes a tag key, including names the lexer would
    /// read as keywords.
    #[must_use]
    pub fn bind(name: &str) -> Self {
        match name {
            "ts" => Self::Timestamp,
            "msg" => Self::Message,
            key => Self::Tag(key.to_string()),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timestamp => f.write_str("ts"),
            Self::Message => f.write_str("msg"),
            Self::Tag(key) => f.write_str(key),
        }
    }
}

/// A type-checked literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Nanosecond timestamp; only paired with [`Field::Timestamp`].
    Int(i64),
    /// Text; paired with [`Field::Message`] and [`Field::Tag`].
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) if s.contains('\'') => write!(f, "\"{s}\""),
            Self::Str(s) => write!(f, "'{s}'"),
        }
    }
}

/// A single `field op literal` test.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Comparison {
    /// Left-hand side.
    pub field: Field,
    /// Operator.
    pub op: CmpOp,
    /// Right-hand side.
    pub value: Value,
}

/// Compiled predicate tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Matches every event (compiled from empty text).
    All,
    /// A leaf comparison.
    Compare(Comparison),
    /// Both sides must match; the right side is skipped once the left fails.
    And(Box<Expr>, Box<Expr>),
    /// Either side must match; the right side is skipped once the left passes.
    Or(Box<Expr>, Box<Expr>),
    /// Negation.
    Not(Box<Expr>),
}

impl fmt::Display for Expr {
    /// Fully parenthesized form.
    ///
    /// Trees produced by the compiler render to text that compiles back to
    /// the same tree. Hand-built trees carry no such guarantee: a nested
    /// [`Expr::All`], a tag key spelled like a keyword, or a string holding
    /// both quote characters has no spelling in the grammar.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => Ok(()),
            Self::Compare(c) => write!(f, "{} {} {}", c.field, c.op, c.value),
            Self::And(l, r) => write!(f, "({l} AND {r})"),
            Self::Or(l, r) => write!(f, "({l} OR {r})"),
            Self::Not(inner) => write!(f, "NOT {inner}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(field: Field, op: CmpOp, value: Value) -> Expr {
        Expr::Compare(Comparison { field, op, value })
    }

    #[test]
    fn bind_reserved_names() {
        assert_eq!(Field::bind("ts"), Field::Timestamp);
        assert_eq!(Field::bind("msg"), Field::Message);
        assert_eq!(Field::bind("TS"), Field::Tag("TS".to_string()));
    }

    #[test]
    fn display_parenthesizes_combinators() {
        let expr = Expr::Or(
            Box::new(cmp(Field::Timestamp, CmpOp::Eq, Value::Int(4))),
            Box::new(Expr::Not(Box::new(cmp(
                Field::Message,
                CmpOp::Contains,
                Value::Str("asdf".to_string()),
            )))),
        );
        assert_eq!(expr.to_string(), "(ts = 4 OR NOT msg contains 'asdf')");
    }

    #[test]
    fn display_switches_quotes() {
        let expr = cmp(
            Field::Tag("note".to_string()),
            CmpOp::Eq,
            Value::Str("it's".to_string()),
        );
        assert_eq!(expr.to_string(), "note = \"it's\"");
    }

    #[test]
    fn relational_operators() {
        assert!(CmpOp::Lt.is_relational());
        assert!(CmpOp::Ge.is_relational());
        assert!(!CmpOp::Eq.is_relational());
        assert!(!CmpOp::Contains.is_relational());
    }
}
