//! # Text generation
//!
//! The pipeline talks to a language model only through [`TextGenerator`].
//! Calls run under a deadline and the caller's cancel token; an abandoned
//! call keeps running on its worker thread and its reply is dropped.
mod openai;

pub use openai::OpenAiCompatibleGenerator;

use crate::cancel::run_with_deadline;
use crate::cancel::CancelToken;
use crate::cancel::Interrupted;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model call cancelled")]
    Cancelled,

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Network error: {0}")]
    Transport(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// A two-part chat prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// External text-generation collaborator.
///
/// Implementations may block for as long as they like; callers bound the wait.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError>;
}

/// Runs one generation under `timeout` and `cancel`, rejecting blank replies.
pub(crate) fn generate_with_deadline(
    generator: &Arc<dyn TextGenerator>,
    prompt: &Prompt,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<String, GenerationError> {
    let generator = Arc::clone(generator);
    let prompt = prompt.clone();
    let text = match run_with_deadline(move || generator.generate(&prompt), timeout, cancel, || {}) {
        Ok(result) => result?,
        Err(Interrupted::Timeout) => return Err(GenerationError::Timeout(timeout)),
        Err(Interrupted::Cancelled) => return Err(GenerationError::Cancelled),
        Err(Interrupted::Failed) => return Err(GenerationError::InvalidResponse("generator panicked".to_owned())),
    };
    if text.trim().is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(text)
}
