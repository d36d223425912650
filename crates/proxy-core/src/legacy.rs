//! Decoder for the vendor API's legacy serialized-object payloads.
//!
//! The upstream answers download-info requests with PHP `serialize()` output
//! rather than JSON. Grammar, one tag per node:
//!
//! ```text
//! N;                          null
//! b:<0|1>;                    boolean
//! i:<int>;                    integer
//! d:<float>;                  float (also INF, -INF, NAN)
//! s:<bytes>:"<text>";         string, length counted in UTF-8 bytes
//! a:<count>:{<key><value>...} ordered map, keys are integers or strings
//! O:<len>:"<class>":<count>:{...}  object, class name discarded
//! ```
//!
//! Tags are matched case-insensitively. All offsets are byte offsets into the
//! input and every read is bounds-checked, so malformed or truncated payloads
//! fail with [`DecodeError`] instead of yielding partial values.

use std::fmt;

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use thiserror::Error;

/// Maximum nesting of maps/objects accepted before bailing out.
///
/// The parser recurses once per level, so this has to hold on a 2 MiB
/// thread stack in unoptimized builds too.
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEnd { offset: usize },

    #[error("unknown type tag `{tag}` at offset {offset}")]
    UnknownTag { tag: char, offset: usize },

    #[error("expected `{expected}` at offset {offset}")]
    Expected { expected: char, offset: usize },

    #[error("invalid {kind} literal `{literal}` at offset {offset}")]
    InvalidLiteral {
        kind: &'static str,
        literal: String,
        offset: usize,
    },

    #[error("string at offset {offset} does not match its declared length of {declared} bytes")]
    LengthMismatch { declared: usize, offset: usize },

    #[error("map key at offset {offset} is neither an integer nor a string")]
    InvalidKey { offset: usize },

    #[error("nesting exceeds {limit} levels at offset {offset}")]
    TooDeep { limit: usize, offset: usize },

    #[error("trailing data at offset {offset}")]
    TrailingData { offset: usize },
}

/// Map key as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(value) => write!(f, "{value}"),
            Key::Str(value) => f.write_str(value),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.to_owned())
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

/// A decoded node. Arrays and objects both become ordered maps.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Map(IndexMap<Key, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<Key, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a string key when this value is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?.get(&Key::from(key))
    }
}

impl From<Value> for JsonValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => JsonValue::Null,
            Value::Bool(value) => JsonValue::Bool(value),
            Value::Int(value) => JsonValue::Number(value.into()),
            Value::Float(value) => Number::from_f64(value)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Str(value) => JsonValue::String(value),
            Value::Map(map) => JsonValue::Object(
                map.into_iter()
                    .map(|(key, value)| (key.to_string(), JsonValue::from(value)))
                    .collect::<JsonMap<_, _>>(),
            ),
        }
    }
}

/// Wire type of a decoded node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Array,
    Object,
}

/// One decoded node together with the number of input bytes it spans.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub tag: Tag,
    pub consumed: usize,
    pub value: Value,
}

/// Decodes a complete payload. Trailing ASCII whitespace is tolerated.
pub fn decode(raw: &str) -> Result<Value, DecodeError> {
    let mut parser = Parser::new(raw, 0);
    let node = parser.node()?;
    let rest = raw[parser.pos..].trim_start_matches(|c: char| c.is_ascii_whitespace());
    if !rest.is_empty() {
        return Err(DecodeError::TrailingData {
            offset: raw.len() - rest.len(),
        });
    }
    Ok(node.value)
}

/// Decodes the single node starting at `offset`, ignoring whatever follows it.
pub fn decode_node(raw: &str, offset: usize) -> Result<Node, DecodeError> {
    if offset > raw.len() {
        return Err(DecodeError::UnexpectedEnd { offset: raw.len() });
    }
    Parser::new(raw, offset).node()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, pos: usize) -> Self {
        Self {
            input,
            pos,
            depth: 0,
        }
    }

    fn node(&mut self) -> Result<Node, DecodeError> {
        let start = self.pos;
        let tag = self.tag()?;
        self.pos += 1;
        let value = match tag {
            Tag::Null => {
                self.expect(b';')?;
                Value::Null
            }
            Tag::Bool => {
                self.expect(b':')?;
                let at = self.pos;
                match self.read_until(b';')? {
                    "0" => Value::Bool(false),
                    "1" => Value::Bool(true),
                    other => return Err(invalid("boolean", other, at)),
                }
            }
            Tag::Int => {
                self.expect(b':')?;
                let at = self.pos;
                let literal = self.read_until(b';')?;
                Value::Int(
                    literal
                        .parse::<i64>()
                        .map_err(|_| invalid("integer", literal, at))?,
                )
            }
            Tag::Float => {
                self.expect(b':')?;
                let at = self.pos;
                let literal = self.read_until(b';')?;
                Value::Float(parse_float(literal).ok_or_else(|| invalid("float", literal, at))?)
            }
            Tag::Str => {
                self.expect(b':')?;
                let text = self.quoted()?;
                self.expect(b';')?;
                Value::Str(text.to_owned())
            }
            Tag::Array => {
                self.expect(b':')?;
                Value::Map(self.entries()?)
            }
            Tag::Object => {
                self.expect(b':')?;
                self.quoted()?;
                self.expect(b':')?;
                Value::Map(self.entries()?)
            }
        };
        Ok(Node {
            tag,
            consumed: self.pos - start,
            value,
        })
    }

    fn tag(&self) -> Result<Tag, DecodeError> {
        let byte = self.peek()?;
        Ok(match byte.to_ascii_lowercase() {
            b'n' => Tag::Null,
            b'b' => Tag::Bool,
            b'i' => Tag::Int,
            b'd' => Tag::Float,
            b's' => Tag::Str,
            b'a' => Tag::Array,
            b'o' => Tag::Object,
            _ => {
                return Err(DecodeError::UnknownTag {
                    tag: self.char_at(self.pos),
                    offset: self.pos,
                });
            }
        })
    }

    /// `<count>:{ key value ... }`
    fn entries(&mut self) -> Result<IndexMap<Key, Value>, DecodeError> {
        let at = self.pos;
        let literal = self.read_until(b':')?;
        let count = literal
            .parse::<usize>()
            .map_err(|_| invalid("count", literal, at))?;
        self.expect(b'{')?;
        self.enter()?;

        // Every pair takes at least four bytes, so a lying count can't force a huge allocation.
        let mut map = IndexMap::with_capacity(count.min(self.remaining() / 4));
        for _ in 0..count {
            let key_at = self.pos;
            if !matches!(self.tag()?, Tag::Int | Tag::Str) {
                return Err(DecodeError::InvalidKey { offset: key_at });
            }
            let key = match self.node()?.value {
                Value::Int(value) => Key::Int(value),
                Value::Str(value) => Key::Str(value),
                _ => return Err(DecodeError::InvalidKey { offset: key_at }),
            };
            let value = self.node()?.value;
            map.insert(key, value);
        }

        self.expect(b'}')?;
        self.depth -= 1;
        Ok(map)
    }

    /// `<len>:"<text>"` where `len` counts UTF-8 bytes.
    fn quoted(&mut self) -> Result<&'a str, DecodeError> {
        let at = self.pos;
        let literal = self.read_until(b':')?;
        let declared = literal
            .parse::<usize>()
            .map_err(|_| invalid("length", literal, at))?;
        self.expect(b'"')?;

        let start = self.pos;
        let mut units = 0usize;
        let mut chars = self.input[start..].chars();
        while units < declared {
            let ch = chars.next().ok_or(DecodeError::UnexpectedEnd {
                offset: self.input.len(),
            })?;
            units += ch.len_utf8();
        }
        if units != declared || self.input.as_bytes().get(start + units) != Some(&b'"') {
            return Err(DecodeError::LengthMismatch {
                declared,
                offset: start,
            });
        }

        self.pos = start + units + 1;
        Ok(&self.input[start..start + units])
    }

    /// Returns the text up to `stop` and moves past it.
    fn read_until(&mut self, stop: u8) -> Result<&'a str, DecodeError> {
        let start = self.pos;
        let bytes = self.input.as_bytes().get(start..).unwrap_or_default();
        let len = bytes
            .iter()
            .position(|&byte| byte == stop)
            .ok_or(DecodeError::UnexpectedEnd {
                offset: self.input.len(),
            })?;
        self.pos = start + len + 1;
        self.input
            .get(start..start + len)
            .ok_or(DecodeError::UnexpectedEnd { offset: start })
    }

    fn expect(&mut self, expected: u8) -> Result<(), DecodeError> {
        if self.peek()? != expected {
            return Err(DecodeError::Expected {
                expected: char::from(expected),
                offset: self.pos,
            });
        }
        self.pos += 1;
        Ok(())
    }

    fn peek(&self) -> Result<u8, DecodeError> {
        self.input
            .as_bytes()
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEnd {
                offset: self.input.len(),
            })
    }

    fn enter(&mut self) -> Result<(), DecodeError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep {
                limit: MAX_DEPTH,
                offset: self.pos,
            });
        }
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.input.len().saturating_sub(self.pos)
    }

    fn char_at(&self, offset: usize) -> char {
        self.input
            .get(offset..)
            .and_then(|rest| rest.chars().next())
            .unwrap_or(char::REPLACEMENT_CHARACTER)
    }
}

fn parse_float(literal: &str) -> Option<f64> {
    match literal {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NAN" => Some(f64::NAN),
        other => other.parse::<f64>().ok(),
    }
}

fn invalid(kind: &'static str, literal: &str, offset: usize) -> DecodeError {
    DecodeError::InvalidLiteral {
        kind,
        literal: literal.to_owned(),
        offset,
    }
}
