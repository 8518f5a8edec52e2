// src/sources/types.rs
use std::collections::{BTreeMap, HashSet};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::filter::operators::FieldType;

/// Target field of a unified item → path expression into the raw record.
pub type FieldMapping = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    #[default]
    #[serde(rename = "GET", alias = "get")]
    Get,
    #[serde(rename = "POST", alias = "post")]
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Caller input forwarded to the external API as a query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiFilterDescriptor {
    pub key: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub label: Option<String>,
    /// Outbound query parameter name; `None` means the value is never forwarded.
    #[serde(default)]
    pub api_param: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default = "default_true")]
    pub user_editable: bool,
    #[serde(default)]
    pub options: Option<Vec<String>>,
}

/// Caller input evaluated locally against fetched raw records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendFilterDescriptor {
    pub key: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub label: Option<String>,
    /// Path into the raw record; falls back to `key`.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_true")]
    pub filterable: bool,
    #[serde(default)]
    pub options: Option<Vec<String>>,
}

impl BackendFilterDescriptor {
    pub fn path(&self) -> &str {
        self.path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(&self.key)
    }
}

/// Declarative configuration for one external data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub endpoint: String,
    #[serde(default)]
    pub method: HttpMethod,
    /// Custom headers; values may hold `{{TOKEN}}` placeholders.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Static request body, sent for non-GET methods only.
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub api_filters: Vec<ApiFilterDescriptor>,
    #[serde(default)]
    pub backend_filters: Vec<BackendFilterDescriptor>,
    #[serde(default)]
    pub mapping: FieldMapping,
    /// Used for items whose mapping yields no `url`.
    #[serde(default)]
    pub default_url: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub auth_required: bool,
}

fn default_true() -> bool {
    true
}

impl SourceDescriptor {
    /// Checks the structural invariants a registry must uphold before serving a source.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("source id must not be empty");
        }
        if self.endpoint.trim().is_empty() {
            bail!("source '{}': endpoint must not be empty", self.id);
        }
        if let Some(dup) = first_duplicate(self.api_filters.iter().map(|f| f.key.as_str())) {
            bail!("source '{}': duplicate api filter key '{dup}'", self.id);
        }
        if let Some(dup) = first_duplicate(self.backend_filters.iter().map(|f| f.key.as_str())) {
            bail!("source '{}': duplicate backend filter key '{dup}'", self.id);
        }
        Ok(())
    }
}

fn first_duplicate<'a>(keys: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut seen = HashSet::new();
    keys.into_iter().find(|k| !seen.insert(*k))
}
