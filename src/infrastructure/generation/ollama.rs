use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    application::services::{GenerationRequest, Generator},
    domain::DomainError,
};

use super::{build_agent, handle_http_error};

pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1:8b-instruct-q4_K_M";

#[derive(Debug, Serialize)]
struct GeneratePayload<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: usize,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Non-streaming client for Ollama's `/api/generate`.
pub struct OllamaGenerator {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    temperature: f32,
}

impl OllamaGenerator {
    pub fn new(host: &str, model: impl Into<String>, temperature: f32, timeout_secs: u64) -> Self {
        Self {
            agent: build_agent(timeout_secs),
            endpoint: format!("{}/api/generate", host.trim_end_matches('/')),
            model: model.into(),
            temperature,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn payload<'a>(&'a self, request: &'a GenerationRequest) -> GeneratePayload<'a> {
        GeneratePayload {
            model: &self.model,
            system: &request.system_prompt,
            prompt: &request.prompt,
            stream: false,
            options: GenerateOptions {
                num_predict: request.max_tokens,
                temperature: self.temperature,
            },
        }
    }
}

impl Generator for OllamaGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, DomainError> {
        debug!(
            target: "edith::generator",
            model = %self.model,
            max_tokens = request.max_tokens,
            "calling ollama"
        );

        let response = self
            .agent
            .post(&self.endpoint)
            .send_json(self.payload(request))
            .map_err(|err| handle_http_error("ollama", err))?;

        let body: GenerateResponse = response.into_json().map_err(|err| {
            DomainError::generation(format!("invalid ollama response: {err}"))
        })?;

        Ok(body.response.trim().to_string())
    }

    fn name(&self) -> &str {
        &self.model
    }
}
