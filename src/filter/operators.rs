// src/filter/operators.rs
//! Filter operators, the field-type compatibility table and the operator catalog.
//!
//! Operators are a closed enum; every lookup by name goes through [`Operator::parse`]
//! and unknown names fail closed. The compatibility table and labels are static data,
//! so the catalog served to configuration tooling is deterministic.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of a filterable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Select,
}

impl FieldType {
    pub const ALL: [FieldType; 4] = [
        FieldType::String,
        FieldType::Number,
        FieldType::Boolean,
        FieldType::Select,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Select => "select",
        }
    }

    /// Operators legal for this type, in catalog order.
    pub fn allowed_operators(self) -> &'static [Operator] {
        match self {
            FieldType::String => &STRING_OPERATORS,
            FieldType::Number => &NUMBER_OPERATORS,
            FieldType::Boolean | FieldType::Select => &EQUALITY_OPERATORS,
        }
    }

    pub fn allows(self, op: Operator) -> bool {
        self.allowed_operators().contains(&op)
    }
}

impl FromStr for FieldType {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(FieldType::String),
            "number" => Ok(FieldType::Number),
            "boolean" => Ok(FieldType::Boolean),
            "select" => Ok(FieldType::Select),
            _ => Err(UnknownName(s.to_string())),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A name that does not correspond to any known operator or field type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown name '{0}'")]
pub struct UnknownName(pub String);

/// Comparison and text operators usable in a filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
}

const STRING_OPERATORS: [Operator; 6] = [
    Operator::Eq,
    Operator::Neq,
    Operator::Contains,
    Operator::StartsWith,
    Operator::EndsWith,
    Operator::Regex,
];

const NUMBER_OPERATORS: [Operator; 6] = [
    Operator::Eq,
    Operator::Neq,
    Operator::Gt,
    Operator::Gte,
    Operator::Lt,
    Operator::Lte,
];

const EQUALITY_OPERATORS: [Operator; 2] = [Operator::Eq, Operator::Neq];

impl Operator {
    pub const ALL: [Operator; 10] = [
        Operator::Eq,
        Operator::Neq,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::Contains,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::Regex,
    ];

    /// Wire identifier used in filter conditions (`{"gte": 100}`).
    pub fn id(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Contains => "contains",
            Operator::StartsWith => "startswith",
            Operator::EndsWith => "endswith",
            Operator::Regex => "regex",
        }
    }

    /// Human-readable label for configuration tooling.
    pub fn label(self) -> &'static str {
        match self {
            Operator::Eq => "Equals",
            Operator::Neq => "Not equals",
            Operator::Gt => "Greater than",
            Operator::Gte => "Greater or equal",
            Operator::Lt => "Less than",
            Operator::Lte => "Less or equal",
            Operator::Contains => "Contains",
            Operator::StartsWith => "Starts with",
            Operator::EndsWith => "Ends with",
            Operator::Regex => "Matches regex",
        }
    }

    /// Look up an operator by its wire identifier. Exact, case-sensitive match.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.id() == name)
    }

    /// Test `field` against `operand`. Never panics; every failure is `false`.
    pub fn evaluate(self, field: &Value, operand: &Value) -> bool {
        match self {
            Operator::Eq => any_pattern(operand).iter().any(|p| loose_eq(field, p)),
            Operator::Neq => !Operator::Eq.evaluate(field, operand),
            Operator::Gt => numeric_cmp(field, operand, |a, b| a > b),
            Operator::Gte => numeric_cmp(field, operand, |a, b| a >= b),
            Operator::Lt => numeric_cmp(field, operand, |a, b| a < b),
            Operator::Lte => numeric_cmp(field, operand, |a, b| a <= b),
            Operator::Contains => text_match(field, operand, |hay, pat| hay.contains(pat)),
            Operator::StartsWith => text_match(field, operand, |hay, pat| hay.starts_with(pat)),
            Operator::EndsWith => text_match(field, operand, |hay, pat| hay.ends_with(pat)),
            Operator::Regex => regex_match(field, operand),
        }
    }
}

impl FromStr for Operator {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::parse(s).ok_or_else(|| UnknownName(s.to_string()))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// String-keyed entry point. Unknown operator names yield `false`.
pub fn evaluate(op_name: &str, field: &Value, operand: &Value) -> bool {
    Operator::parse(op_name)
        .map(|op| op.evaluate(field, operand))
        .unwrap_or(false)
}

/* ----------------------------
Coercion helpers
---------------------------- */

/// Numeric view of a value: numbers, numeric strings (trimmed) and booleans (1/0).
pub(crate) fn to_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Textual view of a value. Strings are used verbatim; everything else is its JSON text.
pub(crate) fn to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A list operand means "any of"; anything else is a single pattern.
fn any_pattern(operand: &Value) -> &[Value] {
    match operand {
        Value::Array(items) => items.as_slice(),
        other => std::slice::from_ref(other),
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    if left.is_null() || right.is_null() {
        return left.is_null() && right.is_null();
    }
    match (to_number(left), to_number(right)) {
        (Some(a), Some(b)) => a == b,
        _ => to_text(left) == to_text(right),
    }
}

fn numeric_cmp(field: &Value, operand: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (to_number(field), to_number(operand)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn text_match(field: &Value, operand: &Value, test: impl Fn(&str, &str) -> bool) -> bool {
    if field.is_null() {
        return false;
    }
    let hay = to_text(field).to_lowercase();
    any_pattern(operand)
        .iter()
        .any(|p| test(&hay, &to_text(p).to_lowercase()))
}

fn regex_match(field: &Value, operand: &Value) -> bool {
    regex_any(field, &compile_patterns(operand))
}

/// Compile every pattern of a regex operand, case-insensitive. Invalid patterns are
/// dropped, so they never match.
pub(crate) fn compile_patterns(operand: &Value) -> Vec<Regex> {
    any_pattern(operand)
        .iter()
        .filter_map(|p| {
            RegexBuilder::new(&to_text(p))
                .case_insensitive(true)
                .build()
                .ok()
        })
        .collect()
}

pub(crate) fn regex_any(field: &Value, patterns: &[Regex]) -> bool {
    if field.is_null() {
        return false;
    }
    let hay = to_text(field);
    patterns.iter().any(|re| re.is_match(&hay))
}

/* ----------------------------
Catalog
---------------------------- */

/// One `{id, label}` entry of the operators catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperatorInfo {
    pub id: &'static str,
    pub label: &'static str,
}

impl From<Operator> for OperatorInfo {
    fn from(op: Operator) -> Self {
        Self {
            id: op.id(),
            label: op.label(),
        }
    }
}

/// Field type → legal operators. Field order is the serialized order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperatorsCatalog {
    pub string: Vec<OperatorInfo>,
    pub number: Vec<OperatorInfo>,
    pub boolean: Vec<OperatorInfo>,
    pub select: Vec<OperatorInfo>,
}

static CATALOG: Lazy<OperatorsCatalog> = Lazy::new(|| OperatorsCatalog {
    string: catalog_for(FieldType::String),
    number: catalog_for(FieldType::Number),
    boolean: catalog_for(FieldType::Boolean),
    select: catalog_for(FieldType::Select),
});

pub fn catalog_for(field_type: FieldType) -> Vec<OperatorInfo> {
    field_type
        .allowed_operators()
        .iter()
        .copied()
        .map(OperatorInfo::from)
        .collect()
}

/// Catalog lookup by type name; an unknown type yields an empty list.
pub fn catalog(field_type: &str) -> Vec<OperatorInfo> {
    field_type
        .parse::<FieldType>()
        .map(catalog_for)
        .unwrap_or_default()
}

/// The full catalog, built once per process.
pub fn operators_catalog() -> &'static OperatorsCatalog {
    &CATALOG
}
