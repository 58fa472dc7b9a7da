//! # Query synthesis and execution
//!
//! The synthesizer asks the model for SQL, validates it against the schema
//! slice and, when validation or execution fails, feeds the error back for
//! another attempt. The executor runs accepted statements read-only.
pub mod executor;
pub mod prompt;
pub mod synthesizer;
pub mod validator;

use crate::selector::SchemaSlice;
use std::sync::Arc;

/// SQL produced by the model, with the slice it was written against.
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateQuery {
    pub sql: String,
    pub slice: Arc<SchemaSlice>,
    /// 1-based attempt number within the repair loop
    pub attempt: usize,
}
