use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::application::dtos::NoteAnalysis;
use crate::domain::{DomainError, MetadataFilter};

use super::collaborators::{EmbeddingEngine, GenerationRequest, Generator};
use super::retrieval::{assemble_context, RetrievalGate};

pub const NO_NOTES_MESSAGE: &str = "No notes found to summarize.";

const SUMMARY_SEED_QUERY: &str = "main topics themes key points summary";
const SUMMARY_TOP_K: usize = 10;
const SUMMARY_CONTEXT_CHARS: usize = 3000;
const SUMMARY_MAX_TOKENS: usize = 1024;
const ANALYSIS_MAX_TOKENS: usize = 768;

const SUMMARY_SYSTEM_PROMPT: &str =
    "You are EDITH, an assistant that writes faithful summaries of the user's notes. Only use what the notes say.";

const ANALYSIS_SYSTEM_PROMPT: &str =
    "You are EDITH, an assistant that analyses notes and extracts structure from them.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStyle {
    #[default]
    Comprehensive,
    Bullet,
    Brief,
}

impl SummaryStyle {
    pub fn instruction(&self) -> &'static str {
        match self {
            SummaryStyle::Comprehensive => "Create a detailed, comprehensive summary of the following notes, covering all main topics and key points.",
            SummaryStyle::Bullet => "Create a bullet-point summary of the key points from the following notes.",
            SummaryStyle::Brief => "Create a brief, concise summary of the main ideas in the following notes.",
        }
    }
}

impl std::str::FromStr for SummaryStyle {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "comprehensive" => Ok(SummaryStyle::Comprehensive),
            "bullet" | "bullets" => Ok(SummaryStyle::Bullet),
            "brief" => Ok(SummaryStyle::Brief),
            other => Err(DomainError::validation(format!(
                "unknown summary style `{other}`"
            ))),
        }
    }
}

/// Corpus-level summaries and single-note analysis.
pub struct InsightService {
    embedder: Arc<dyn EmbeddingEngine>,
    gate: Arc<RetrievalGate>,
    generator: Arc<dyn Generator>,
    embedding_model: String,
}

impl InsightService {
    pub fn new(
        embedder: Arc<dyn EmbeddingEngine>,
        gate: Arc<RetrievalGate>,
        generator: Arc<dyn Generator>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            gate,
            generator,
            embedding_model: embedding_model.into(),
        }
    }

    /// Summarises whatever the index returns for a generic topical query.
    pub fn summarize_notes(
        &self,
        filter: &MetadataFilter,
        style: SummaryStyle,
    ) -> Result<String, DomainError> {
        let seed = self.embedder.embed(&self.embedding_model, SUMMARY_SEED_QUERY)?;
        let outcome = self
            .gate
            .retrieve_vector(&seed, SUMMARY_TOP_K, f32::MIN, filter);

        if outcome.is_empty() {
            info!(target: "edith::generator", "nothing indexed to summarise");
            return Ok(NO_NOTES_MESSAGE.to_string());
        }

        let context = assemble_context(&outcome.matches, SUMMARY_CONTEXT_CHARS);
        let prompt = format!("{}\n\nNotes:\n{context}\n\nSummary:", style.instruction());
        let summary = self.generator.generate(&GenerationRequest::new(
            SUMMARY_SYSTEM_PROMPT,
            prompt,
            SUMMARY_MAX_TOKENS,
        ))?;

        Ok(summary.trim().to_string())
    }

    /// Never fails; generator errors are reported inside the analysis.
    pub fn analyze_note(&self, note: &str) -> NoteAnalysis {
        let note_length = note.chars().count();
        if note.trim().is_empty() {
            return NoteAnalysis::failed(note_length, "note is empty");
        }

        let prompt = format!(
            "Analyze the following note and provide:\n\
             1. Main topics/themes\n\
             2. Key points or takeaways\n\
             3. Any action items or important dates\n\
             4. Overall category or subject area\n\n\
             Note:\n{note}\n\nAnalysis:"
        );

        match self.generator.generate(&GenerationRequest::new(
            ANALYSIS_SYSTEM_PROMPT,
            prompt,
            ANALYSIS_MAX_TOKENS,
        )) {
            Ok(analysis) => NoteAnalysis::succeeded(analysis.trim(), note_length),
            Err(err) => {
                warn!(target: "edith::generator", error = %err, "note analysis failed");
                NoteAnalysis::failed(note_length, err.to_string())
            }
        }
    }
}
