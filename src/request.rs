// src/request.rs
//! Builds the outbound HTTP request for a source. Pure apart from secret lookups.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::SecretLookup;
use crate::sources::{HttpMethod, SourceDescriptor};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex")
});

/// A fully formed request, ready for the fetcher.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Ordered; a list value contributes one pair per element.
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl OutboundRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn query_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.query
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

pub fn build_request(
    source: &SourceDescriptor,
    api_filters: &Map<String, Value>,
    secrets: &dyn SecretLookup,
) -> OutboundRequest {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    headers.insert("Accept".to_string(), "application/json".to_string());
    for (name, value) in &source.headers {
        headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
        headers.insert(name.clone(), value.clone());
    }
    for (name, value) in headers.iter_mut() {
        if PLACEHOLDER.is_match(value) {
            *value = interpolate(&source.id, name, value, secrets);
        }
    }

    let mut query = Vec::new();
    for desc in &source.api_filters {
        let Some(param) = desc.api_param.as_deref().filter(|p| !p.is_empty()) else {
            continue;
        };
        let value = match api_filters.get(&desc.key) {
            Some(Value::Object(_)) => {
                debug!(source_id = %source.id, key = %desc.key, "operator mapping not forwarded to upstream");
                continue;
            }
            Some(v) if !v.is_null() => v,
            _ => match desc.default.as_ref().filter(|d| !d.is_null()) {
                Some(d) => d,
                None => {
                    if desc.required {
                        warn!(source_id = %source.id, key = %desc.key, "required api filter has no value");
                    }
                    continue;
                }
            },
        };
        push_query_value(&mut query, param, value);
    }

    let body = match source.method {
        HttpMethod::Get => None,
        _ => source.body.clone(),
    };

    OutboundRequest {
        method: source.method,
        url: source.endpoint.clone(),
        headers,
        query,
        body,
    }
}

fn interpolate(source_id: &str, header: &str, template: &str, secrets: &dyn SecretLookup) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let token = &caps[1];
            secrets.lookup(token).unwrap_or_else(|| {
                warn!(source_id, header, token, "unresolved header placeholder, sending empty value");
                String::new()
            })
        })
        .into_owned()
}

fn push_query_value(query: &mut Vec<(String, String)>, param: &str, value: &Value) {
    match value {
        Value::Array(items) => {
            for item in items {
                if let Some(s) = primitive_text(item) {
                    query.push((param.to_string(), s));
                }
            }
        }
        other => {
            if let Some(s) = primitive_text(other) {
                query.push((param.to_string(), s));
            }
        }
    }
}

fn primitive_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
