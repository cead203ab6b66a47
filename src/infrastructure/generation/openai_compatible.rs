use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    application::services::{GenerationRequest, Generator},
    domain::DomainError,
};

use super::{build_agent, handle_http_error};

#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: usize,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any server exposing `/v1/chat/completions` (llama.cpp, vLLM,
/// LM Studio, hosted APIs).
pub struct OpenAiCompatibleGenerator {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl OpenAiCompatibleGenerator {
    /// `api_key_env` names the environment variable holding the bearer token.
    /// A missing variable means unauthenticated requests.
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key_env: Option<&str>,
        temperature: f32,
        timeout_secs: u64,
    ) -> Self {
        let api_key = api_key_env.and_then(|var| match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Some(key),
            _ => {
                warn!(target: "edith::generator", env = var, "api key variable not set; sending unauthenticated requests");
                None
            }
        });

        Self {
            agent: build_agent(timeout_secs),
            endpoint: chat_endpoint(base_url),
            model: model.into(),
            api_key,
            temperature,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn payload<'a>(&'a self, request: &'a GenerationRequest) -> ChatPayload<'a> {
        ChatPayload {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: self.temperature,
            stream: false,
        }
    }
}

/// Accepts `http://host`, `http://host/v1` or a full completions URL.
fn chat_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{base}/chat/completions")
    } else {
        format!("{base}/v1/chat/completions")
    }
}

impl Generator for OpenAiCompatibleGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, DomainError> {
        debug!(
            target: "edith::generator",
            model = %self.model,
            max_tokens = request.max_tokens,
            "calling chat completions"
        );

        let mut call = self.agent.post(&self.endpoint);
        if let Some(key) = &self.api_key {
            call = call.set("Authorization", &format!("Bearer {key}"));
        }

        let response = call
            .send_json(self.payload(request))
            .map_err(|err| handle_http_error("chat completions", err))?;

        let body: ChatResponse = response.into_json().map_err(|err| {
            DomainError::generation(format!("invalid chat completions response: {err}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| DomainError::generation("chat completions returned no choices"))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_normalisation() {
        assert_eq!(
            chat_endpoint("http://localhost:8080"),
            "http://localhost:8080/v1/chat/completions"
        );
        assert_eq!(
            chat_endpoint("https://api.example.com/v1/"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            chat_endpoint("http://h/v1/chat/completions"),
            "http://h/v1/chat/completions"
        );
    }

    #[test]
    fn payload_has_system_then_user_message() {
        let generator = OpenAiCompatibleGenerator::new("http://h", "gpt", None, 0.5, 5);
        let request = GenerationRequest::new("sys", "question", 64);

        let json = serde_json::to_value(generator.payload(&request)).unwrap();

        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "question");
        assert_eq!(json["max_tokens"], 64);
    }

    #[test]
    fn reply_content_is_extracted() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":" hi there "}}]}"#,
        )
        .unwrap();
        assert_eq!(
            body.choices[0].message.content.as_deref().map(str::trim),
            Some("hi there")
        );
    }
}
