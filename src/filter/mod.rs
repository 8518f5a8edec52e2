// src/filter/mod.rs
pub mod evaluator;
pub mod operators;

pub use evaluator::{apply, match_condition, matches, CompiledCondition, CompiledFilters, FilterSet};
pub use operators::{catalog, catalog_for, evaluate, operators_catalog, FieldType, Operator, OperatorInfo, OperatorsCatalog};
