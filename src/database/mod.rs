//! Relational side of the pipeline: column types and the DuckDB store.
pub mod column;
pub mod store;
