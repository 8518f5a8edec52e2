// src/config/secrets.rs
use std::collections::HashMap;
use std::fmt;

/// Read-only lookup of secret values by token name (`{{TOKEN}}` in header templates).
pub trait SecretLookup: Send + Sync {
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Immutable snapshot of secret values, taken once at startup.
#[derive(Clone, Default)]
pub struct Secrets {
    values: HashMap<String, String>,
}

impl Secrets {
    /// Snapshot the whole process environment (after `.env` has been loaded).
    pub fn from_env() -> Self {
        Self {
            values: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl SecretLookup for Secrets {
    fn lookup(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

// Never print values.
impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("count", &self.values.len())
            .finish()
    }
}
