// src/sources/config.rs
use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::types::SourceDescriptor;

pub const ENV_SOURCES_CONFIG_PATH: &str = "SOURCES_CONFIG_PATH";
pub const DEFAULT_SOURCES_CONFIG_PATH: &str = "config/sources.json";

/// Load source descriptors from an explicit path. Supports TOML or JSON formats.
pub fn load_sources_from(path: &Path) -> Result<Vec<SourceDescriptor>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let sources = parse_sources(&content, ext.as_str())
        .with_context(|| format!("parsing sources from {}", path.display()))?;
    validate_all(&sources)?;
    Ok(sources)
}

/// Resolve the sources file path:
/// 1) $SOURCES_CONFIG_PATH
/// 2) config/sources.json
/// 3) config/sources.toml
///
/// Returns `(path, explicit)`; `explicit` is true when the env var chose it.
pub fn resolve_sources_path() -> (PathBuf, bool) {
    if let Ok(p) = std::env::var(ENV_SOURCES_CONFIG_PATH) {
        return (PathBuf::from(p), true);
    }
    let json_p = PathBuf::from(DEFAULT_SOURCES_CONFIG_PATH);
    if json_p.exists() {
        return (json_p, false);
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return (toml_p, false);
    }
    (json_p, false)
}

/// Load sources using env var + fallbacks. A missing fallback file yields no sources;
/// a missing file named by the env var is an error.
pub fn load_sources_default() -> Result<Vec<SourceDescriptor>> {
    let (path, explicit) = resolve_sources_path();
    if !path.exists() {
        if explicit {
            return Err(anyhow!("{ENV_SOURCES_CONFIG_PATH} points to non-existent path"));
        }
        return Ok(Vec::new());
    }
    load_sources_from(&path)
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<SourceDescriptor>> {
    if hint_ext == "toml" {
        return parse_toml(s);
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if let Ok(v) = parse_toml(s) {
        return Ok(v);
    }
    // Re-run JSON to surface its (more likely relevant) error.
    parse_json(s)
}

#[derive(serde::Deserialize)]
struct SourcesFile {
    #[serde(default)]
    sources: Vec<SourceDescriptor>,
}

fn parse_toml(s: &str) -> Result<Vec<SourceDescriptor>> {
    let v: SourcesFile = toml::from_str(s)?;
    Ok(v.sources)
}

/// Accepts either a bare array or `{"sources": [...]}`.
fn parse_json(s: &str) -> Result<Vec<SourceDescriptor>> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum JsonSources {
        List(Vec<SourceDescriptor>),
        Wrapped(SourcesFile),
    }
    let v: JsonSources = serde_json::from_str(s)?;
    Ok(match v {
        JsonSources::List(list) => list,
        JsonSources::Wrapped(file) => file.sources,
    })
}

pub(crate) fn validate_all(sources: &[SourceDescriptor]) -> Result<()> {
    let mut ids = HashSet::new();
    for s in sources {
        s.validate()?;
        if !ids.insert(s.id.as_str()) {
            bail!("duplicate source id '{}'", s.id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_list_and_wrapped_forms() {
        let list = r#"[{"id":"a","name":"A","endpoint":"http://a.test"}]"#;
        let wrapped = r#"{"sources":[{"id":"b","name":"B","endpoint":"http://b.test"}]}"#;
        assert_eq!(parse_json(list).unwrap()[0].id, "a");
        assert_eq!(parse_json(wrapped).unwrap()[0].id, "b");
    }

    #[test]
    fn toml_array_of_tables() {
        let toml = r#"
[[sources]]
id = "cmc"
name = "CoinMarketCap"
endpoint = "https://example.test/listings"
method = "GET"

[sources.mapping]
id = "symbol"
name = "name"

[[sources.backend_filters]]
key = "price"
type = "number"
path = "quote.USD.price"
"#;
        let v = parse_sources(toml, "toml").unwrap();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].mapping.get("id").map(String::as_str), Some("symbol"));
        assert_eq!(v[0].backend_filters[0].path(), "quote.USD.price");
    }

    #[test]
    fn duplicate_ids_fail_validation() {
        let list = r#"[
            {"id":"a","name":"A","endpoint":"http://a.test"},
            {"id":"a","name":"A2","endpoint":"http://a2.test"}
        ]"#;
        let v = parse_json(list).unwrap();
        let err = validate_all(&v).unwrap_err().to_string();
        assert!(err.contains("duplicate source id 'a'"), "{err}");
    }
}
