// src/normalize.rs
//! Response normalization: unwrap upstream payloads into raw records and map raw
//! records onto [`UnifiedItem`]s through a per-source field mapping.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::filter::operators::to_number;
use crate::path;
use crate::sources::{FieldMapping, SourceDescriptor};

pub const FALLBACK_URL: &str = "#";

/// Unwrap a payload into records.
///
/// Priority order:
/// 1. a list is used as-is
/// 2. an object with a non-null `data`: the list, or the single value wrapped
/// 3. any other non-empty object is one record, verbatim (including `data: null`)
/// 4. everything else yields nothing
pub fn normalize(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items,
        Value::Object(mut obj) => {
            if obj.get("data").is_some_and(|d| !d.is_null()) {
                match obj.remove("data") {
                    Some(Value::Array(items)) => items,
                    Some(single) => vec![single],
                    None => Vec::new(),
                }
            } else if obj.is_empty() {
                Vec::new()
            } else {
                vec![Value::Object(obj)]
            }
        }
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedItem {
    pub id: String,
    pub name: Option<String>,
    pub url: String,
    pub price: Option<f64>,
    pub raw: Value,
}

/// Evaluate every mapping entry against `record`. A failed extraction yields `null`
/// for that target only.
pub fn map_fields(record: &Value, mapping: &FieldMapping) -> Map<String, Value> {
    mapping
        .iter()
        .map(|(target, expr)| {
            let value = match path::extract(record, expr) {
                Ok(v) => v,
                Err(e) => {
                    debug!(field = %target, path = %expr, error = %e, "field mapping resolved to null");
                    Value::Null
                }
            };
            (target.clone(), value)
        })
        .collect()
}

/// Map surviving raw records into unified items. `id` falls back to
/// `"{source_id}-{index}"`, `url` to the source's `default_url` and then `"#"`.
pub fn unify(records: Vec<Value>, source: &SourceDescriptor) -> Vec<UnifiedItem> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let mapped = map_fields(&record, &source.mapping);
            let id = mapped
                .get("id")
                .and_then(scalar_text)
                .unwrap_or_else(|| format!("{}-{}", source.id, index));
            let name = mapped.get("name").and_then(scalar_text);
            let url = mapped
                .get("url")
                .and_then(scalar_text)
                .or_else(|| source.default_url.clone().filter(|u| !u.is_empty()))
                .unwrap_or_else(|| FALLBACK_URL.to_string());
            let price = mapped.get("price").and_then(to_number);
            UnifiedItem {
                id,
                name,
                url,
                price,
                raw: record,
            }
        })
        .collect()
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
