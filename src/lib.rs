//! # rusty_ask
//!
//! Ask natural-language questions about spreadsheet files and get answers
//! computed by SQL over the data.
//!
//! ## Pipeline
//!
//! - **Ingestion**: `.xlsx`/`.xlsm` workbooks and `.csv`/`.tsv` files (local
//!   paths, directories, glob patterns or remote URLs) are read sheet by
//!   sheet, normalized into typed relational tables and written to DuckDB
//! - **Schema catalog**: a versioned record of every ingested table, its
//!   columns, their inferred types and a few sample values
//! - **Schema selection**: each question is matched against the catalog and
//!   only the relevant tables and columns are offered to the model
//! - **Query synthesis**: the model writes DuckDB SQL; every candidate is
//!   parsed and checked against the selected schema, and failures are fed
//!   back for a bounded number of retries
//! - **Execution**: accepted queries run read-only, with a row cap and a
//!   timeout, on their own connection
//! - **Summary**: the result rows are turned into a prose answer
//!
//! The model is reached through the [`TextGenerator`] trait;
//! [`OpenAiCompatibleGenerator`] talks to any OpenAI-compatible endpoint.
//!
//! ## Example
//!
//! ```no_run
//! use rusty_ask::{CancelToken, Config, Engine, OpenAiCompatibleGenerator};
//! use std::sync::Arc;
//!
//! let config = Config::load("rusty_ask.toml".as_ref())?;
//! let generator = OpenAiCompatibleGenerator::new(&config.model, &std::env::var("GROQ_API_KEY")?)?;
//! let engine = Engine::new(config, Arc::new(generator))?;
//! engine.ingest(&["school_data/*.xlsx"])?;
//! let answer = engine.ask("How many students are in each grade?", &CancelToken::new())?;
//! println!("{}", answer.text);
//! # Ok::<(), anyhow::Error>(())
//! ```
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
mod helpers;
pub mod ingest;
pub mod llm;
pub mod query;
pub mod selector;
pub mod spreadsheet;
pub mod summarizer;
pub mod value;

pub use cancel::CancelToken;
pub use catalog::ColumnDef;
pub use catalog::SchemaCatalog;
pub use catalog::TableSchema;
pub use config::Config;
pub use database::column::ColumnType;
pub use engine::Answer;
pub use engine::Engine;
pub use error::RustyAskError;
pub use llm::GenerationError;
pub use llm::OpenAiCompatibleGenerator;
pub use llm::Prompt;
pub use llm::TextGenerator;
pub use query::executor::ExecutionResult;
pub use selector::LexicalRanker;
pub use selector::RankingStrategy;
pub use selector::SchemaSlice;
pub use selector::TableScore;
pub use spreadsheet::RawSheet;
pub use value::CellValue;
