//! Predicate evaluation.

use std::cmp::Ordering;

use crate::event::LogEvent;
use crate::lql::ast::{CmpOp, Comparison, Expr, Field, Value};
use crate::tag::TagLine;

/// Field values a predicate can read.
///
/// Implemented for [`EventFields`]; callers with their own row types can
/// implement it to evaluate predicates without building a [`LogEvent`].
pub trait FieldSource {
    /// Event timestamp in nanoseconds.
    fn timestamp(&self) -> i64;

    /// Event message.
    fn message(&self) -> &str;

    /// Tag value for `key`, or `None` if the stream has no such tag.
    fn tag(&self, key: &str) -> Option<&str>;
}

/// An event paired with the tag line of its stream.
#[derive(Debug, Clone, Copy)]
pub struct EventFields<'a> {
    /// The event.
    pub event: &'a LogEvent,
    /// Its stream's tag line.
    pub tags: &'a TagLine,
}

impl FieldSource for EventFields<'_> {
    fn timestamp(&self) -> i64 {
        self.event.timestamp()
    }

    fn message(&self) -> &str {
        self.event.message()
    }

    fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key)
    }
}

impl Expr {
    /// Evaluates the tree against `fields`.
    ///
    /// `AND` and `OR` evaluate their right operand only when the left one
    /// does not already decide the result.
    pub fn evaluate<F: FieldSource + ?Sized>(&self, fields: &F) -> bool {
        match self {
            Self::All => true,
            Self::Compare(c) => c.evaluate(fields),
            Self::And(l, r) => l.evaluate(fields) && r.evaluate(fields),
            Self::Or(l, r) => l.evaluate(fields) || r.evaluate(fields),
            Self::Not(inner) => !inner.evaluate(fields),
        }
    }
}

impl Comparison {
    /// Evaluates one comparison. A missing tag never matches, whatever the
    /// operator.
    pub fn evaluate<F: FieldSource + ?Sized>(&self, fields: &F) -> bool {
        match (&self.field, &self.value) {
            (Field::Timestamp, Value::Int(n)) => ordered(self.op, fields.timestamp().cmp(n)),
            (Field::Message, Value::Str(s)) => text(self.op, fields.message(), s),
            (Field::Tag(key), Value::Str(s)) => fields
                .tag(key)
                .is_some_and(|actual| text(self.op, actual, s)),
            // Ruled out by the type checker.
            _ => false,
        }
    }
}

const fn ordered(op: CmpOp, ord: Ordering) -> bool {
    match op {
        CmpOp::Eq => ord.is_eq(),
        CmpOp::Ne => ord.is_ne(),
        CmpOp::Lt => ord.is_lt(),
        CmpOp::Le => ord.is_le(),
        CmpOp::Gt => ord.is_gt(),
        CmpOp::Ge => ord.is_ge(),
        CmpOp::Contains => false,
    }
}

fn text(op: CmpOp, actual: &str, expected: &str) -> bool {
    match op {
        CmpOp::Contains => actual.contains(expected),
        _ => ordered(op, actual.cmp(expected)),
    }
}
