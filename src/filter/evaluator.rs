// src/filter/evaluator.rs
//! Backend filter evaluation against raw records.
//!
//! Combination policy is fixed: every supplied field condition must pass (AND across
//! fields), and every operator inside one field's condition must pass (AND across
//! operators). There is no OR form.

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use super::operators::{compile_patterns, regex_any, FieldType, Operator};
use crate::path::{PathError, PathExpr};
use crate::sources::BackendFilterDescriptor;

/// Caller conditions keyed by backend filter key.
pub type FilterSet = Map<String, Value>;

enum Check<'a> {
    Op(Operator, &'a Value),
    Regex(Vec<Regex>),
    Reject,
}

/// A condition prepared once (operators resolved, regexes compiled) and tested
/// against many values.
///
/// - `null` condition: no constraint.
/// - object condition: operator → operand, all must pass; an unknown operator, or
///   one not legal for `field_type`, fails the condition.
/// - anything else: implicit equality.
pub struct CompiledCondition<'a> {
    checks: Vec<Check<'a>>,
}

impl<'a> CompiledCondition<'a> {
    pub fn new(condition: &'a Value, field_type: Option<FieldType>) -> Self {
        let checks = match condition {
            Value::Null => Vec::new(),
            Value::Object(ops) => ops
                .iter()
                .map(|(name, operand)| compile_check(name, operand, field_type))
                .collect(),
            primitive => vec![Check::Op(Operator::Eq, primitive)],
        };
        Self { checks }
    }

    pub fn test(&self, value: &Value) -> bool {
        self.checks.iter().all(|check| match check {
            Check::Op(op, operand) => op.evaluate(value, operand),
            Check::Regex(patterns) => regex_any(value, patterns),
            Check::Reject => false,
        })
    }
}

fn compile_check<'a>(name: &str, operand: &'a Value, field_type: Option<FieldType>) -> Check<'a> {
    let Some(op) = Operator::parse(name) else {
        debug!(operator = %name, "unknown filter operator");
        return Check::Reject;
    };
    if let Some(ft) = field_type {
        if !ft.allows(op) {
            debug!(operator = %op, field_type = %ft, "operator not allowed for field type");
            return Check::Reject;
        }
    }
    match op {
        Operator::Regex => Check::Regex(compile_patterns(operand)),
        other => Check::Op(other, operand),
    }
}

/// Test one extracted value against one condition.
pub fn match_condition(value: &Value, condition: &Value, field_type: Option<FieldType>) -> bool {
    CompiledCondition::new(condition, field_type).test(value)
}

struct FieldFilter<'a> {
    desc: &'a BackendFilterDescriptor,
    path: Result<PathExpr, PathError>,
    condition: CompiledCondition<'a>,
}

/// The active conditions of a filter set, with paths parsed once.
pub struct CompiledFilters<'a> {
    fields: Vec<FieldFilter<'a>>,
}

impl<'a> CompiledFilters<'a> {
    pub fn new(descriptors: &'a [BackendFilterDescriptor], filters: &'a FilterSet) -> Self {
        let fields = descriptors
            .iter()
            .filter_map(|desc| {
                let condition = filters.get(&desc.key).filter(|c| !c.is_null())?;
                if !desc.filterable {
                    debug!(key = %desc.key, "ignoring condition on non-filterable field");
                    return None;
                }
                Some(FieldFilter {
                    desc,
                    path: PathExpr::parse(desc.path()),
                    condition: CompiledCondition::new(condition, Some(desc.field_type)),
                })
            })
            .collect();
        Self { fields }
    }

    /// True when no condition constrains anything.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether `record` satisfies every active condition.
    pub fn matches(&self, record: &Value) -> bool {
        self.fields.iter().all(|f| {
            let extracted = match &f.path {
                Ok(expr) => expr.evaluate(record),
                Err(e) => Err(e.clone()),
            };
            match extracted {
                Ok(value) => f.condition.test(&value),
                Err(e) => {
                    debug!(key = %f.desc.key, path = f.desc.path(), error = %e, "filter field did not resolve");
                    false
                }
            }
        })
    }
}

/// Whether `record` satisfies every supplied condition.
pub fn matches(record: &Value, descriptors: &[BackendFilterDescriptor], filters: &FilterSet) -> bool {
    CompiledFilters::new(descriptors, filters).matches(record)
}

/// Keep the records that match, in their original order.
pub fn apply(
    records: Vec<Value>,
    descriptors: &[BackendFilterDescriptor],
    filters: &FilterSet,
) -> Vec<Value> {
    if filters.is_empty() {
        return records;
    }
    let compiled = CompiledFilters::new(descriptors, filters);
    if compiled.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|r| compiled.matches(r))
        .collect()
}
