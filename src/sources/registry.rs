// src/sources/registry.rs
//! Source Registry: the only owner of source descriptors.
//!
//! The search core asks for a descriptor by id on every query and receives an owned
//! snapshot, so a reload between two queries is honored by the second one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::info;

use super::config::{load_sources_from, validate_all};
use super::types::SourceDescriptor;

#[async_trait]
pub trait SourceRegistry: Send + Sync {
    async fn get_source_by_id(&self, id: &str) -> Result<Option<SourceDescriptor>>;
    async fn list_sources(&self) -> Result<Vec<SourceDescriptor>>;

    /// Re-read the backing store. Returns the number of sources now registered.
    async fn reload(&self) -> Result<usize> {
        Ok(self.list_sources().await?.len())
    }
}

/// Descriptor map guarded by a lock that is only written on reload.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    sources: RwLock<BTreeMap<String, SourceDescriptor>>,
}

impl InMemoryRegistry {
    pub fn new(sources: Vec<SourceDescriptor>) -> Result<Self> {
        let reg = Self::default();
        reg.replace_all(sources)?;
        Ok(reg)
    }

    /// Atomically swap the registered set. Invalid input leaves the current set untouched.
    pub fn replace_all(&self, sources: Vec<SourceDescriptor>) -> Result<usize> {
        validate_all(&sources)?;
        let fresh: BTreeMap<_, _> = sources.into_iter().map(|s| (s.id.clone(), s)).collect();
        let count = fresh.len();
        let mut guard = self
            .sources
            .write()
            .map_err(|_| anyhow!("source registry lock poisoned"))?;
        *guard = fresh;
        Ok(count)
    }

    pub fn get(&self, id: &str) -> Result<Option<SourceDescriptor>> {
        let guard = self
            .sources
            .read()
            .map_err(|_| anyhow!("source registry lock poisoned"))?;
        Ok(guard.get(id).cloned())
    }

    pub fn all(&self) -> Result<Vec<SourceDescriptor>> {
        let guard = self
            .sources
            .read()
            .map_err(|_| anyhow!("source registry lock poisoned"))?;
        Ok(guard.values().cloned().collect())
    }
}

#[async_trait]
impl SourceRegistry for InMemoryRegistry {
    async fn get_source_by_id(&self, id: &str) -> Result<Option<SourceDescriptor>> {
        self.get(id)
    }

    async fn list_sources(&self) -> Result<Vec<SourceDescriptor>> {
        self.all()
    }
}

/// Registry backed by a JSON/TOML sources file.
#[derive(Debug)]
pub struct FileSourceRegistry {
    path: PathBuf,
    inner: InMemoryRegistry,
}

impl FileSourceRegistry {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let sources = load_sources_from(&path)?;
        let inner = InMemoryRegistry::new(sources)?;
        Ok(Self { path, inner })
    }

    /// Start with no sources; a later `reload` picks the file up once it exists.
    pub fn empty(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            inner: InMemoryRegistry::default(),
        }
    }
}

#[async_trait]
impl SourceRegistry for FileSourceRegistry {
    async fn get_source_by_id(&self, id: &str) -> Result<Option<SourceDescriptor>> {
        self.inner.get(id)
    }

    async fn list_sources(&self) -> Result<Vec<SourceDescriptor>> {
        self.inner.all()
    }

    async fn reload(&self) -> Result<usize> {
        let sources = load_sources_from(&self.path)?;
        let count = self.inner.replace_all(sources)?;
        info!(path = %self.path.display(), count, "source registry reloaded");
        Ok(count)
    }
}
