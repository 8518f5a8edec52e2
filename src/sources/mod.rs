// src/sources/mod.rs
pub mod config;
pub mod registry;
pub mod types;

pub use registry::{FileSourceRegistry, InMemoryRegistry, SourceRegistry};
pub use types::{
    ApiFilterDescriptor, BackendFilterDescriptor, FieldMapping, HttpMethod, SourceDescriptor,
};
