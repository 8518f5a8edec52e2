//! Path-based value extraction from raw records.
//!
//! Expressions use a JMESPath-style subset:
//! - `a.b.c` - nested object field access
//! - `"odd key".x` - quoted identifiers for keys with spaces or dots
//! - `items[0]`, `items[-1]` - array indexing (negative counts from the end)
//! - `items[*].name` - list projection
//! - `items[].name` - flatten projection (one level of nested arrays is merged)
//! - `prices.*` - object value projection
//! - `@` - the current node (an empty expression means the same)
//!
//! Projections drop elements where the rest of the path does not resolve, or
//! resolves to `null`. Evaluation returns a [`PathError`] for missing keys, type
//! mismatches and syntax errors so callers can tell "absent" apart from "null".

use std::iter::Peekable;
use std::str::{Chars, FromStr};

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("invalid path expression '{expr}': {reason}")]
    Syntax { expr: String, reason: String },
    #[error("key '{0}' not found")]
    MissingKey(String),
    #[error("index {0} out of bounds")]
    IndexOutOfBounds(i64),
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(String),
    Index(i64),
    /// `[*]`
    Project,
    /// `[]`
    Flatten,
    /// `.*`
    Values,
}

/// A parsed path expression, reusable across records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    segments: Vec<Segment>,
}

impl PathExpr {
    pub fn parse(expr: &str) -> Result<Self, PathError> {
        Parser::new(expr).parse()
    }

    pub fn evaluate(&self, value: &Value) -> Result<Value, PathError> {
        eval(value, &self.segments)
    }
}

impl FromStr for PathExpr {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PathExpr::parse(s)
    }
}

/// Extract a value, keeping the failure reason.
pub fn extract(record: &Value, expr: &str) -> Result<Value, PathError> {
    PathExpr::parse(expr)?.evaluate(record)
}

/// Extract a value, collapsing every failure to `null`.
pub fn extract_or_null(record: &Value, expr: &str) -> Value {
    extract(record, expr).unwrap_or(Value::Null)
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn eval(value: &Value, segments: &[Segment]) -> Result<Value, PathError> {
    let Some((first, rest)) = segments.split_first() else {
        return Ok(value.clone());
    };

    match first {
        Segment::Field(name) => match value {
            Value::Object(map) => match map.get(name) {
                Some(inner) => eval(inner, rest),
                None => Err(PathError::MissingKey(name.clone())),
            },
            other => Err(PathError::TypeMismatch {
                expected: "object",
                found: kind(other),
            }),
        },
        Segment::Index(idx) => match value {
            Value::Array(items) => {
                let len = items.len() as i64;
                let pos = if *idx < 0 { len + idx } else { *idx };
                if pos < 0 || pos >= len {
                    return Err(PathError::IndexOutOfBounds(*idx));
                }
                eval(&items[pos as usize], rest)
            }
            other => Err(PathError::TypeMismatch {
                expected: "array",
                found: kind(other),
            }),
        },
        Segment::Project => match value {
            Value::Array(items) => Ok(project(items.iter(), rest)),
            other => Err(PathError::TypeMismatch {
                expected: "array",
                found: kind(other),
            }),
        },
        Segment::Flatten => match value {
            Value::Array(items) => {
                let flat = items.iter().flat_map(|item| match item {
                    Value::Array(inner) => inner.iter().collect::<Vec<_>>(),
                    single => vec![single],
                });
                Ok(project(flat, rest))
            }
            other => Err(PathError::TypeMismatch {
                expected: "array",
                found: kind(other),
            }),
        },
        Segment::Values => match value {
            Value::Object(map) => Ok(project(map.values(), rest)),
            other => Err(PathError::TypeMismatch {
                expected: "object",
                found: kind(other),
            }),
        },
    }
}

fn project<'a>(items: impl Iterator<Item = &'a Value>, rest: &[Segment]) -> Value {
    Value::Array(
        items
            .filter_map(|item| eval(item, rest).ok())
            .filter(|v| !v.is_null())
            .collect(),
    )
}

/* ----------------------------
Parser
---------------------------- */

struct Parser<'a> {
    expr: &'a str,
    chars: Peekable<Chars<'a>>,
}

impl<'a> Parser<'a> {
    fn new(expr: &'a str) -> Self {
        let trimmed = expr.trim();
        Self {
            expr: trimmed,
            chars: trimmed.chars().peekable(),
        }
    }

    fn error(&self, reason: impl Into<String>) -> PathError {
        PathError::Syntax {
            expr: self.expr.to_string(),
            reason: reason.into(),
        }
    }

    fn parse(mut self) -> Result<PathExpr, PathError> {
        let mut segments = Vec::new();

        match self.chars.peek() {
            None => return Ok(PathExpr { segments }),
            Some('@') => {
                self.chars.next();
            }
            Some('[') => {}
            Some('*') => {
                self.chars.next();
                segments.push(Segment::Values);
            }
            Some(_) => segments.push(Segment::Field(self.identifier()?)),
        }

        while let Some(&c) = self.chars.peek() {
            match c {
                '.' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'*') {
                        self.chars.next();
                        segments.push(Segment::Values);
                    } else {
                        segments.push(Segment::Field(self.identifier()?));
                    }
                }
                '[' => {
                    self.chars.next();
                    segments.push(self.bracket()?);
                }
                other => return Err(self.error(format!("unexpected character '{other}'"))),
            }
        }

        Ok(PathExpr { segments })
    }

    fn identifier(&mut self) -> Result<String, PathError> {
        if self.chars.peek() == Some(&'"') {
            return self.quoted();
        }
        let mut ident = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                ident.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        if ident.is_empty() {
            Err(self.error("expected identifier"))
        } else {
            Ok(ident)
        }
    }

    fn quoted(&mut self) -> Result<String, PathError> {
        self.chars.next(); // opening quote
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some('"') => return Ok(out),
                Some('\\') => match self.chars.next() {
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated escape")),
                },
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated quoted identifier")),
            }
        }
    }

    /// Parses what follows `[`: `]`, `*]` or an optionally negative integer then `]`.
    fn bracket(&mut self) -> Result<Segment, PathError> {
        let segment = match self.chars.peek() {
            Some(']') => Segment::Flatten,
            Some('*') => {
                self.chars.next();
                Segment::Project
            }
            _ => {
                let mut digits = String::new();
                if self.chars.peek() == Some(&'-') {
                    digits.push('-');
                    self.chars.next();
                }
                while let Some(&c) = self.chars.peek() {
                    if c.is_ascii_digit() {
                        digits.push(c);
                        self.chars.next();
                    } else {
                        break;
                    }
                }
                let idx = digits
                    .parse::<i64>()
                    .map_err(|_| self.error("expected array index"))?;
                Segment::Index(idx)
            }
        };
        if self.chars.next() != Some(']') {
            return Err(self.error("expected ']'"));
        }
        Ok(segment)
    }
}
