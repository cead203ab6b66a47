//! Language model backends reached over HTTP.

mod ollama;
mod openai_compatible;

pub use ollama::{OllamaGenerator, DEFAULT_OLLAMA_HOST, DEFAULT_OLLAMA_MODEL};
pub use openai_compatible::OpenAiCompatibleGenerator;

use std::time::Duration;

use serde::Deserialize;

use crate::domain::DomainError;

pub(crate) fn build_agent(timeout_secs: u64) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
}

/// Error body returned by both Ollama (`{"error": "..."}`) and
/// OpenAI-compatible servers (`{"error": {"message": "..."}}`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Message { message: String },
    Plain(String),
}

impl ErrorDetail {
    fn into_message(self) -> String {
        match self {
            ErrorDetail::Message { message } => message,
            ErrorDetail::Plain(message) => message,
        }
    }
}

pub(crate) fn handle_http_error(backend: &str, error: ureq::Error) -> DomainError {
    match error {
        ureq::Error::Status(code, response) => match response.into_json::<ErrorBody>() {
            Ok(body) => DomainError::generation(format!(
                "{backend} returned HTTP {code}: {}",
                body.error.into_message()
            )),
            Err(_) => DomainError::generation(format!("{backend} returned HTTP {code}")),
        },
        ureq::Error::Transport(transport) => {
            DomainError::generation(format!("{backend} unreachable: {transport}"))
        }
    }
}
