use crate::config::ModelConfig;
use crate::llm::GenerationError;
use crate::llm::Prompt;
use crate::llm::TextGenerator;
use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;

// ============================================================================
// Chat completions API types
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for any endpoint speaking the OpenAI `chat/completions` protocol.
///
/// This is a blocking client; the pipeline runs it on a worker thread.
pub struct OpenAiCompatibleGenerator {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatibleGenerator {
    pub fn new(config: &ModelConfig, api_key: &str) -> Result<Self, GenerationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;
        Ok(OpenAiCompatibleGenerator {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.to_owned(),
            model: config.model.to_owned(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl TextGenerator for OpenAiCompatibleGenerator {
    fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response.text().map_err(|e| GenerationError::Transport(e.to_string()))?;
        if !status.is_success() {
            let message = match serde_json::from_str::<ApiError>(&body) {
                Ok(error) => error.error.message,
                Err(_) => body,
            };
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }
        parse_completion(&body)
    }
}

/// Extracts the first choice's message text from a completion body.
fn parse_completion(body: &str) -> Result<String, GenerationError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::InvalidResponse("No choices in response".to_owned()))?
        .message
        .content
        .unwrap_or_default();
    let content = content.trim();
    if content.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(content.to_owned())
}
