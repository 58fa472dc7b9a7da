use crate::cancel::CancelToken;
use crate::config::SynthesisConfig;
use crate::llm::generate_with_deadline;
use crate::llm::GenerationError;
use crate::llm::TextGenerator;
use crate::query::executor::ExecutionError;
use crate::query::prompt::sql_prompt;
use crate::query::prompt::Feedback;
use crate::query::validator::validate;
use crate::query::CandidateQuery;
use crate::selector::SchemaSlice;
use regex::Regex;
use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").expect("Hardcode regex pattern"));

static SQL_LABEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^\s*sql\s*:\s*").expect("Hardcode regex pattern"));

static QUERY_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*(select|with)\b").expect("Hardcode regex pattern"));

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    #[error("No valid query after {attempts} attempts: {last_error}")]
    Exhausted {
        attempts: usize,
        last_candidate: Option<CandidateQuery>,
        last_error: String,
    },

    #[error("Query synthesis cancelled")]
    Cancelled,
}

/// Turns a question into SQL through the text generator, retrying with error
/// feedback until a candidate validates and runs or the attempts run out.
pub struct QuerySynthesizer {
    generator: Arc<dyn TextGenerator>,
    max_attempts: usize,
    timeout: Duration,
}

impl QuerySynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &SynthesisConfig) -> Self {
        QuerySynthesizer {
            generator,
            max_attempts: config.max_attempts.max(1),
            timeout: config.generation_timeout(),
        }
    }

    /// Produces a candidate that passes static validation against `slice`.
    pub fn synthesize(
        &self,
        question: &str,
        slice: Arc<SchemaSlice>,
        cancel: &CancelToken,
    ) -> Result<CandidateQuery, SynthesisError> {
        self.synthesize_with(question, slice, cancel, |_| Ok(())).map(|(candidate, _)| candidate)
    }

    /// Produces a candidate that validates and for which `run` succeeds.
    ///
    /// Generation failures, validation errors and `run` errors each use up
    /// one attempt and are fed back into the next prompt. Cancellation ends
    /// the loop at once.
    pub fn synthesize_with<T, F>(
        &self,
        question: &str,
        slice: Arc<SchemaSlice>,
        cancel: &CancelToken,
        mut run: F,
    ) -> Result<(CandidateQuery, T), SynthesisError>
    where
        F: FnMut(&CandidateQuery) -> Result<T, ExecutionError>,
    {
        let mut feedback: Option<Feedback> = None;
        let mut last_candidate: Option<CandidateQuery> = None;
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return Err(SynthesisError::Cancelled);
            }
            let prompt = sql_prompt(question, &slice, feedback.as_ref());
            log::debug!("Attempt {attempt} prompt:\n{}", prompt.user);

            let text = match generate_with_deadline(&self.generator, &prompt, self.timeout, cancel) {
                Ok(text) => text,
                Err(GenerationError::Cancelled) => return Err(SynthesisError::Cancelled),
                Err(e) => {
                    log::warn!("Attempt {attempt}: generation failed: {e}");
                    last_error = e.to_string();
                    feedback = Some(Feedback {
                        sql: String::new(),
                        error: last_error.to_owned(),
                    });
                    continue;
                }
            };

            let candidate = CandidateQuery {
                sql: extract_sql(&text),
                slice: Arc::clone(&slice),
                attempt,
            };
            log::debug!("Attempt {attempt} candidate: {}", candidate.sql);
            let outcome = match validate(&candidate.sql, &slice) {
                Ok(_) => run(&candidate),
                Err(e) => Err(ExecutionError::Rejected(e)),
            };
            match outcome {
                Ok(value) => return Ok((candidate, value)),
                Err(ExecutionError::Cancelled) => return Err(SynthesisError::Cancelled),
                Err(e) => {
                    log::warn!("Attempt {attempt}: {e}");
                    last_error = e.to_string();
                    feedback = Some(Feedback {
                        sql: candidate.sql.to_owned(),
                        error: last_error.to_owned(),
                    });
                    last_candidate = Some(candidate);
                }
            }
        }

        Err(SynthesisError::Exhausted {
            attempts: self.max_attempts,
            last_candidate,
            last_error,
        })
    }
}

/// Pulls the SQL out of a model reply.
///
/// Keeps the first fenced code block if there is one, drops a leading `SQL:`
/// label and any prose before the first `SELECT`/`WITH` line, and strips
/// trailing semicolons.
pub fn extract_sql(text: &str) -> String {
    let body = CODE_FENCE
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|body| body.as_str())
        .unwrap_or(text);
    let body = SQL_LABEL.replace(body, "");
    let body = match QUERY_START.find(&body) {
        Some(start) => &body[start.start()..],
        None => &body[..],
    };
    body.trim().trim_end_matches(|ch: char| ch == ';' || ch.is_whitespace()).to_owned()
}
