//! Tag lines: the key-value identity attached to a whole record stream.
//!
//! Accepted syntax is a comma-separated list of `key=value` pairs, optionally
//! wrapped in braces. Values containing separators must be double-quoted;
//! inside quotes `\"` and `\\` are the only escapes.
//!
//! ```text
//! host=a,pod=b
//! {host=a, pod="web,1"}
//! ```
//!
//! Duplicate keys are allowed and the last occurrence wins.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{QueryError, Result};

/// Immutable, cheaply clonable key-value identity of a log stream.
#[derive(Clone)]
pub struct TagLine {
    inner: Arc<Inner>,
}

struct Inner {
    /// Text as supplied to `parse`.
    text: String,
    /// Normalized pairs, sorted by key.
    pairs: Vec<(String, String)>,
    /// Key -> index into `pairs`.
    index: HashMap<String, usize>,
}

impl TagLine {
    /// Parses a tag line.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::TagSyntax`] on empty keys, missing `=`,
    /// unescaped separators in unquoted values, or unterminated quotes.
    pub fn parse(text: &str) -> Result<Self> {
        let pairs = Scanner::new(text).parse_line()?;
        Ok(Self::from_normalized(text.to_string(), pairs))
    }

    /// Returns a tag line with no pairs.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_normalized(String::new(), BTreeMap::new())
    }

    fn from_normalized(text: String, pairs: BTreeMap<String, String>) -> Self {
        let pairs: Vec<(String, String)> = pairs.into_iter().collect();
        let index = pairs
            .iter()
            .enumerate()
            .map(|(i, (key, _))| (key.clone(), i))
            .collect();
        Self {
            inner: Arc::new(Inner { text, pairs, index }),
        }
    }

    /// Looks up the value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner
            .index
            .get(key)
            .map(|i| self.inner.pairs[*i].1.as_str())
    }

    /// Returns true if the line has a pair for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.index.contains_key(key)
    }

    /// Iterates pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner
            .pairs
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.pairs.len()
    }

    /// Returns true if the line has no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.pairs.is_empty()
    }

    /// The text this line was parsed from.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.inner.text
    }
}

impl Default for TagLine {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for TagLine {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner.pairs == other.inner.pairs
    }
}

impl Eq for TagLine {}

impl Hash for TagLine {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.pairs.hash(state);
    }
}

impl fmt::Display for TagLine {
    /// Writes the canonical form: pairs sorted by key, values quoted only
    /// when they contain separators or whitespace.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}=")?;
            if needs_quotes(value) {
                f.write_str("\"")?;
                for c in value.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("\"")?;
            } else {
                f.write_str(value)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for TagLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagLine({self})")
    }
}

impl FromStr for TagLine {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for TagLine {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TagLine {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

const fn is_key_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-' | b'/')
}

const fn is_separator(b: u8) -> bool {
    matches!(b, b',' | b'=' | b'"' | b'{' | b'}')
}

fn needs_quotes(value: &str) -> bool {
    value
        .bytes()
        .any(|b| is_separator(b) || b.is_ascii_whitespace())
}

/// Byte cursor over tag line text.
struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    const fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let text = self.text;
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        &text[start..self.pos]
    }

    fn error(&self, position: usize, message: impl Into<String>) -> QueryError {
        QueryError::TagSyntax {
            line: self.text.to_string(),
            position,
            message: message.into(),
        }
    }

    fn parse_line(mut self) -> Result<BTreeMap<String, String>> {
        let mut pairs = BTreeMap::new();

        self.skip_ws();
        let braced = self.eat(b'{');
        let at_close = |s: &Self| s.at_end() || (braced && s.peek() == Some(b'}'));

        loop {
            self.skip_ws();
            if at_close(&self) {
                break;
            }

            let (key, value) = self.parse_pair()?;
            pairs.insert(key, value);

            self.skip_ws();
            if self.eat(b',') {
                continue;
            }
            if at_close(&self) {
                break;
            }
            return Err(self.error(self.pos, "expected ',' between pairs"));
        }

        if braced && !self.eat(b'}') {
            return Err(self.error(self.pos, "missing closing '}'"));
        }
        self.skip_ws();
        if !self.at_end() {
            return Err(self.error(self.pos, "unexpected characters after tag line"));
        }

        Ok(pairs)
    }

    fn parse_pair(&mut self) -> Result<(String, String)> {
        let key_start = self.pos;
        let key = self.take_while(is_key_byte);
        if key.is_empty() {
            return Err(match self.text[self.pos..].chars().next() {
                Some(c) if !matches!(c, '=' | ',') && !c.is_whitespace() => {
                    self.error(key_start, format!("invalid character '{c}' in key"))
                }
                _ => self.error(key_start, "empty key"),
            });
        }

        self.skip_ws();
        if !self.eat(b'=') {
            return Err(self.error(self.pos, format!("expected '=' after key '{key}'")));
        }
        self.skip_ws();

        let value = if self.eat(b'"') {
            self.parse_quoted()?
        } else {
            let value = self
                .take_while(|b| !is_separator(b) && !b.is_ascii_whitespace())
                .to_string();
            if let Some(b @ (b'=' | b'"' | b'{')) = self.peek() {
                return Err(self.error(
                    self.pos,
                    format!("unescaped '{}' in value of '{key}'", char::from(b)),
                ));
            }
            value
        };

        Ok((key.to_string(), value))
    }

    /// Parses the rest of a quoted value; the opening quote is consumed.
    fn parse_quoted(&mut self) -> Result<String> {
        let open = self.pos - 1;
        let mut value = String::new();
        let mut chars = self.text[self.pos..].char_indices();

        while let Some((offset, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += offset + 1;
                    return Ok(value);
                }
                '\\' => match chars.next() {
                    Some((_, escaped @ ('"' | '\\'))) => value.push(escaped),
                    Some((_, other)) => {
                        return Err(self.error(
                            self.pos + offset,
                            format!("invalid escape '\\{other}' in quoted value"),
                        ));
                    }
                    None => break,
                },
                _ => value.push(c),
            }
        }

        Err(self.error(open, "unterminated quoted value"))
    }
}
