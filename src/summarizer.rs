//! Turns a query result into a prose answer.
use crate::cancel::CancelToken;
use crate::config::SummaryConfig;
use crate::llm::generate_with_deadline;
use crate::llm::GenerationError;
use crate::llm::TextGenerator;
use crate::query::executor::ExecutionResult;
use crate::query::prompt::summary_prompt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SummaryError {
    #[error("{0}")]
    Generation(#[from] GenerationError),
}

pub struct AnswerSummarizer {
    generator: Arc<dyn TextGenerator>,
    sample_rows: usize,
    timeout: Duration,
}

impl AnswerSummarizer {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &SummaryConfig) -> Self {
        AnswerSummarizer {
            generator,
            sample_rows: config.sample_rows,
            timeout: config.generation_timeout(),
        }
    }

    /// Writes the answer to `question` from the rows `sql` returned.
    ///
    /// An empty result is answered directly, without a model call.
    pub fn summarize(
        &self,
        question: &str,
        sql: &str,
        result: &ExecutionResult,
        cancel: &CancelToken,
    ) -> Result<String, SummaryError> {
        if result.row_count() == 0 {
            return Ok(no_data_answer(question));
        }
        let prompt = summary_prompt(question, sql, result, self.sample_rows);
        log::debug!("Summary prompt:\n{}", prompt.user);
        let answer = generate_with_deadline(&self.generator, &prompt, self.timeout, cancel)?;
        Ok(answer.trim().to_owned())
    }
}

fn no_data_answer(question: &str) -> String {
    format!("No matching data was found for \"{}\": the query returned no rows.", question.trim())
}
