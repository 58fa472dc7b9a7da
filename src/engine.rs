//! # Engine
//!
//! Wires the pipeline together and owns the dataset: the store and its
//! catalog, replaced together by each ingestion. Questions share the dataset
//! through a read lock; ingestion takes the write lock, builds a complete new
//! dataset aside and swaps it in only once every sheet has loaded.
use crate::cancel::CancelToken;
use crate::catalog::SchemaCatalog;
use crate::config::Config;
use crate::database::store::remove_database_files;
use crate::database::store::staging_path;
use crate::database::store::Store;
use crate::error::RustyAskError;
use crate::ingest::load_sheet;
use crate::ingest::read_inputs;
use crate::ingest::IngestError;
use crate::llm::GenerationError;
use crate::llm::TextGenerator;
use crate::query::executor::QueryExecutor;
use crate::query::synthesizer::QuerySynthesizer;
use crate::query::synthesizer::SynthesisError;
use crate::query::validator::referenced_tables;
use crate::selector::LexicalRanker;
use crate::selector::RankingStrategy;
use crate::selector::SchemaSelector;
use crate::spreadsheet::Criteria;
use crate::spreadsheet::RawSheet;
use crate::summarizer::AnswerSummarizer;
use crate::summarizer::SummaryError;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

/// The answer to one question.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    /// The query the answer was derived from
    pub sql: String,
    /// Attempts the repair loop used
    pub attempts: usize,
    pub row_count: usize,
    /// Tables the query read
    pub tables: Vec<String>,
}

struct Dataset {
    store: Option<Store>,
    catalog: Arc<SchemaCatalog>,
}

pub struct Engine {
    config: Config,
    criteria: Criteria,
    dataset: RwLock<Dataset>,
    selector: SchemaSelector,
    synthesizer: QuerySynthesizer,
    summarizer: AnswerSummarizer,
}

impl Engine {
    pub fn new(config: Config, generator: Arc<dyn TextGenerator>) -> Result<Engine, RustyAskError> {
        Self::with_ranker(config, generator, Arc::new(LexicalRanker))
    }

    pub fn with_ranker(
        config: Config,
        generator: Arc<dyn TextGenerator>,
        ranker: Arc<dyn RankingStrategy>,
    ) -> Result<Engine, RustyAskError> {
        let criteria = config.ingest.criteria().map_err(IngestError::from)?;
        Ok(Engine {
            criteria,
            dataset: RwLock::new(Dataset {
                store: None,
                catalog: Arc::new(SchemaCatalog::default()),
            }),
            selector: SchemaSelector::new(&config.selector, ranker),
            synthesizer: QuerySynthesizer::new(Arc::clone(&generator), &config.synthesis),
            summarizer: AnswerSummarizer::new(generator, &config.summary),
            config,
        })
    }

    /// The current catalog.
    pub fn catalog(&self) -> Arc<SchemaCatalog> {
        Arc::clone(&self.dataset.read().unwrap_or_else(PoisonError::into_inner).catalog)
    }

    /// Reads the inputs and replaces the dataset with their sheets.
    ///
    /// Inputs may be files, directories, glob patterns or URLs. On failure the
    /// previous dataset stays in place.
    pub fn ingest<S: AsRef<str>>(&self, inputs: &[S]) -> Result<Arc<SchemaCatalog>, RustyAskError> {
        let sheets = read_inputs(inputs, &self.criteria)?;
        if sheets.is_empty() {
            let inputs: Vec<&str> = inputs.iter().map(|input| input.as_ref()).collect();
            return Err(IngestError::NoInputs(inputs.join(", ")).into());
        }
        self.ingest_sheets(sheets)
    }

    /// Replaces the dataset with already-read sheets.
    pub fn ingest_sheets(&self, sheets: Vec<RawSheet>) -> Result<Arc<SchemaCatalog>, RustyAskError> {
        let mut dataset = self.dataset.write().unwrap_or_else(PoisonError::into_inner);
        let mut catalog = SchemaCatalog::new(dataset.catalog.version() + 1);
        let database = self.config.ingest.database.as_deref();
        let staging = match database {
            Some(path) => Store::create(&staging_path(path))?,
            None => Store::open_in_memory()?,
        };

        for sheet in sheets {
            if let Err(e) = load_sheet(&staging, &mut catalog, sheet) {
                log::warn!("Ingestion aborted, keeping catalog version {}: {e}", dataset.catalog.version());
                discard(staging);
                return Err(e.into());
            }
        }

        let store = match database {
            Some(path) => swap_database(&mut dataset, staging, path).inspect_err(|e| {
                log::warn!("Ingestion aborted, keeping catalog version {}: {e}", dataset.catalog.version());
            })?,
            None => staging,
        };
        let catalog = Arc::new(catalog);
        log::info!("Ingested {} tables (catalog version {})", catalog.len(), catalog.version());
        dataset.store = Some(store);
        dataset.catalog = Arc::clone(&catalog);
        Ok(catalog)
    }

    /// Answers a question from the current dataset.
    ///
    /// Selects the relevant schema, runs the synthesis and repair loop with
    /// execution, then summarizes the result. `cancel` is checked between
    /// stages and interrupts in-flight model calls and queries.
    pub fn ask(&self, question: &str, cancel: &CancelToken) -> Result<Answer, RustyAskError> {
        if cancel.is_cancelled() {
            return Err(RustyAskError::Cancelled);
        }
        let dataset = self.dataset.read().unwrap_or_else(PoisonError::into_inner);
        let store = match &dataset.store {
            Some(store) if !dataset.catalog.is_empty() => store,
            _ => return Err(RustyAskError::NoData),
        };

        let slice = Arc::new(self.selector.select(question, &dataset.catalog));
        log::debug!("Selected tables {:?} for {question:?}", slice.table_names());
        let executor = QueryExecutor::new(store, &self.config.execution);
        let outcome = self
            .synthesizer
            .synthesize_with(question, Arc::clone(&slice), cancel, |candidate| executor.execute(candidate, cancel));
        let (candidate, result) = match outcome {
            Ok(accepted) => accepted,
            Err(SynthesisError::Cancelled) => return Err(RustyAskError::Cancelled),
            Err(e) => return Err(e.into()),
        };

        if cancel.is_cancelled() {
            return Err(RustyAskError::Cancelled);
        }
        let text = match self.summarizer.summarize(question, &candidate.sql, &result, cancel) {
            Ok(text) => text,
            Err(SummaryError::Generation(GenerationError::Cancelled)) => return Err(RustyAskError::Cancelled),
            Err(e) => return Err(e.into()),
        };
        log::info!(
            "Answered {question:?} with attempt {} ({} rows)",
            candidate.attempt,
            result.row_count()
        );
        Ok(Answer {
            text,
            tables: referenced_tables(&candidate.sql, &slice).unwrap_or_default(),
            sql: candidate.sql,
            attempts: candidate.attempt,
            row_count: result.row_count(),
        })
    }
}

/// Moves a complete staging database over `path`, replacing the current store.
///
/// The current store is closed only once `path` is known to be replaceable,
/// and is reopened from the untouched file if the move fails.
fn swap_database(dataset: &mut Dataset, staging: Store, path: &Path) -> Result<Store, IngestError> {
    if let Err(e) = Store::check_target(path) {
        discard(staging);
        return Err(e);
    }
    let Some(previous) = dataset.store.take() else {
        return staging.promote(path);
    };
    let result = match previous.close() {
        Ok(()) => staging.promote(path),
        Err(e) => {
            discard(staging);
            Err(e.into())
        }
    };
    if result.is_err() {
        match Store::open(path) {
            Ok(store) => dataset.store = Some(store),
            Err(e) => {
                log::error!("Failed to reopen {}, dropping the current dataset: {e}", path.display());
                dataset.catalog = Arc::new(SchemaCatalog::new(dataset.catalog.version()));
            }
        }
    }
    result
}

/// Closes a staging store and deletes its files.
fn discard(store: Store) {
    let path = store.path().map(Path::to_path_buf);
    if let Err(e) = store.close() {
        log::warn!("Failed to close staging database: {e}");
    }
    if let Some(path) = path {
        if let Err(e) = remove_database_files(&path) {
            log::warn!("Failed to remove staging database {}: {e}", path.display());
        }
    }
}
