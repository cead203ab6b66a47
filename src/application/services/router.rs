use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::domain::{
    ClassificationResult, DomainError, MetadataFilter, QueryOutcome, SourceRef,
};

use super::classifier::QueryClassifier;
use super::collaborators::{GenerationRequest, Generator};
use super::retrieval::{RetrievalGate, RetrievalOutcome};

pub const GROUNDED_SYSTEM_PROMPT: &str = "You are EDITH, a precise and helpful AI assistant.
When answering from provided context:
- Be direct and concise (2-3 sentences max unless asked for details)
- Use bullet points for lists
- If the answer is in the context, state it clearly
- If uncertain or info missing, say so briefly
- Don't add information not in the context";

pub const FALLBACK_SYSTEM_PROMPT: &str = "You are EDITH, a helpful AI assistant for the user's personal notes.
The user's notes contained nothing relevant to this question.
Start your reply by saying briefly that you couldn't find this in their notes,
then answer concisely from general knowledge.";

pub const CONVERSATIONAL_SYSTEM_PROMPT: &str = "You are EDITH, a friendly and personable AI assistant that helps the user with their notes.
Keep replies short, warm and natural. You don't need to cite anything for casual conversation.";

pub const ERROR_APOLOGY: &str = "Sorry, I ran into a problem while answering that. Please try again.";

const CANNED_REPLY_MAX_WORDS: usize = 4;

/// Short phrases answered without a model call. Checked in order.
const CANNED_REPLIES: &[(&str, &str)] = &[
    (
        "thank you",
        "You're welcome! Let me know if there's anything else in your notes I can help with.",
    ),
    (
        "thanks",
        "You're welcome! Let me know if there's anything else in your notes I can help with.",
    ),
    (
        "good morning",
        "Good morning! What would you like to look into today?",
    ),
    (
        "good night",
        "Good night! Your notes will be right here when you come back.",
    ),
    ("goodbye", "Goodbye! Come back anytime."),
    ("bye", "Goodbye! Come back anytime."),
    (
        "hello",
        "Hello! I'm EDITH. Ask me anything about your notes, or just chat.",
    ),
    (
        "hey",
        "Hey! I'm EDITH. Ask me anything about your notes, or just chat.",
    ),
    (
        "hi",
        "Hi! I'm EDITH. Ask me anything about your notes, or just chat.",
    ),
];

/// Router knobs persisted in the app config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Minimum classifier confidence for a knowledge query to attempt retrieval.
    pub classifier_threshold: f32,
    pub grounded_max_tokens: usize,
    pub fallback_max_tokens: usize,
    pub conversational_max_tokens: usize,
    /// Confidence reported for fallback answers; kept below any plausible grounded score.
    pub fallback_confidence: f32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            classifier_threshold: 0.4,
            grounded_max_tokens: 1024,
            fallback_max_tokens: 512,
            conversational_max_tokens: 256,
            fallback_confidence: 0.3,
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !(0.0..=1.0).contains(&self.classifier_threshold) {
            return Err(DomainError::validation(
                "classifier_threshold must be within [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.fallback_confidence) {
            return Err(DomainError::validation(
                "fallback_confidence must be within [0, 1]",
            ));
        }
        if self.conversational_max_tokens == 0
            || self.grounded_max_tokens == 0
            || self.fallback_max_tokens == 0
        {
            return Err(DomainError::validation("token budgets must be non-zero"));
        }
        if self.conversational_max_tokens > self.grounded_max_tokens {
            return Err(DomainError::validation(
                "conversational_max_tokens cannot exceed grounded_max_tokens",
            ));
        }
        Ok(())
    }
}

/// States a single query moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Classifying,
    Retrieving,
    Grounded,
    Fallback,
    Conversing,
    Error,
}

impl RouteState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RouteState::Grounded | RouteState::Fallback | RouteState::Conversing | RouteState::Error
        )
    }
}

impl fmt::Display for RouteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RouteState::Classifying => "classifying",
            RouteState::Retrieving => "retrieving",
            RouteState::Grounded => "grounded",
            RouteState::Fallback => "fallback",
            RouteState::Conversing => "conversing",
            RouteState::Error => "error",
        };
        f.write_str(label)
    }
}

/// Ties classification and retrieval confidence to a generation mode.
///
/// Holds no per-query state; one router serves any number of concurrent queries.
pub struct ResponseRouter {
    classifier: QueryClassifier,
    gate: Arc<RetrievalGate>,
    generator: Arc<dyn Generator>,
    config: RouterConfig,
}

impl ResponseRouter {
    pub fn new(
        gate: Arc<RetrievalGate>,
        generator: Arc<dyn Generator>,
        config: RouterConfig,
    ) -> Self {
        Self {
            classifier: QueryClassifier::new(),
            gate,
            generator,
            config,
        }
    }

    pub fn classifier(&self) -> &QueryClassifier {
        &self.classifier
    }

    /// Answers one question. Never fails: errors end in an `error` outcome.
    pub fn answer_query(
        &self,
        question: &str,
        filter: Option<&MetadataFilter>,
        force_retrieval: bool,
    ) -> QueryOutcome {
        info!(
            target: "edith::router",
            query = %preview(question),
            force_retrieval,
            "processing query"
        );

        match self.route(question, filter, force_retrieval) {
            Ok(outcome) => {
                info!(
                    target: "edith::router",
                    mode = %outcome.mode,
                    confidence = outcome.confidence,
                    sources = outcome.num_sources,
                    "query answered"
                );
                outcome
            }
            Err(err) => {
                error!(
                    target: "edith::router",
                    state = %RouteState::Error,
                    kind = err.kind(),
                    error = %err,
                    "query failed"
                );
                QueryOutcome::error(ERROR_APOLOGY, err.to_string())
            }
        }
    }

    /// Transition out of `Classifying`.
    pub fn next_state(&self, classification: &ClassificationResult, force_retrieval: bool) -> RouteState {
        let wants_retrieval = classification.category.seeks_knowledge()
            && classification.confidence >= self.config.classifier_threshold;

        if force_retrieval || wants_retrieval {
            RouteState::Retrieving
        } else {
            RouteState::Conversing
        }
    }

    fn route(
        &self,
        question: &str,
        filter: Option<&MetadataFilter>,
        force_retrieval: bool,
    ) -> Result<QueryOutcome, DomainError> {
        if question.trim().is_empty() {
            return Err(DomainError::validation("question cannot be empty"));
        }

        let classification = self.classifier.classify(question);
        match self.next_state(&classification, force_retrieval) {
            RouteState::Retrieving => {
                let no_filter = MetadataFilter::new();
                let retrieval = self.gate.retrieve(question, filter.unwrap_or(&no_filter));
                if retrieval.is_empty() {
                    self.fallback(question, &retrieval)
                } else {
                    self.grounded(question, retrieval)
                }
            }
            _ => self.converse(question, &classification),
        }
    }

    fn grounded(
        &self,
        question: &str,
        retrieval: RetrievalOutcome,
    ) -> Result<QueryOutcome, DomainError> {
        let request = GenerationRequest::with_context(
            GROUNDED_SYSTEM_PROMPT,
            question,
            &retrieval.context,
            self.config.grounded_max_tokens,
        );
        let answer = self.generator.generate(&request)?;
        let sources = SourceRef::dedup_from(&retrieval.matches);

        Ok(QueryOutcome::grounded(
            answer.trim(),
            retrieval.confidence,
            sources,
        ))
    }

    fn fallback(
        &self,
        question: &str,
        retrieval: &RetrievalOutcome,
    ) -> Result<QueryOutcome, DomainError> {
        if retrieval.degraded {
            warn!(target: "edith::router", "retrieval degraded; answering without notes");
        }
        let request = GenerationRequest::new(
            FALLBACK_SYSTEM_PROMPT,
            question,
            self.config.fallback_max_tokens,
        );
        let answer = self.generator.generate(&request)?;

        Ok(QueryOutcome::fallback(
            answer.trim(),
            self.config.fallback_confidence,
        ))
    }

    fn converse(
        &self,
        question: &str,
        classification: &ClassificationResult,
    ) -> Result<QueryOutcome, DomainError> {
        if let Some(reply) = canned_reply(question) {
            return Ok(QueryOutcome::conversational(
                reply,
                classification.confidence,
            ));
        }

        let request = GenerationRequest::new(
            CONVERSATIONAL_SYSTEM_PROMPT,
            question,
            self.config.conversational_max_tokens,
        );
        let answer = self.generator.generate(&request)?;

        Ok(QueryOutcome::conversational(
            answer.trim(),
            classification.confidence,
        ))
    }
}

/// Canned answer for short greetings, thanks and farewells.
///
/// Phrases match on whole words of the normalised query, so `hi` does not fire on `this`.
pub fn canned_reply(question: &str) -> Option<&'static str> {
    let words: Vec<String> = question
        .split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .collect();

    if words.is_empty() || words.len() > CANNED_REPLY_MAX_WORDS {
        return None;
    }

    let padded = format!(" {} ", words.join(" "));
    CANNED_REPLIES
        .iter()
        .find(|(phrase, _)| padded.contains(&format!(" {phrase} ")))
        .map(|(_, reply)| *reply)
}

fn preview(question: &str) -> String {
    let mut preview: String = question.chars().take(50).collect();
    if question.chars().count() > 50 {
        preview.push_str("...");
    }
    preview
}
