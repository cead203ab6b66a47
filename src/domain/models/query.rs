use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::RetrievalMatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryCategory {
    Knowledge,
    Conversational,
    Hybrid,
}

impl QueryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryCategory::Knowledge => "knowledge",
            QueryCategory::Conversational => "conversational",
            QueryCategory::Hybrid => "hybrid",
        }
    }

    /// Whether queries of this category may go through retrieval.
    pub fn seeks_knowledge(&self) -> bool {
        matches!(self, QueryCategory::Knowledge | QueryCategory::Hybrid)
    }
}

impl fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw scores from the fallback scorer, kept so the decision can be audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierScores {
    pub knowledge: u32,
    pub conversational: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: QueryCategory,
    pub confidence: f32,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<ClassifierScores>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerMode {
    #[serde(rename = "rag")]
    Rag,
    #[serde(rename = "conversational")]
    Conversational,
    #[serde(rename = "conversational-fallback")]
    ConversationalFallback,
    #[serde(rename = "error")]
    Error,
}

impl AnswerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerMode::Rag => "rag",
            AnswerMode::Conversational => "conversational",
            AnswerMode::ConversationalFallback => "conversational-fallback",
            AnswerMode::Error => "error",
        }
    }
}

impl fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source attribution for a grounded answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub filename: String,
    pub relevance_score: f32,
    #[serde(rename = "type")]
    pub doc_type: String,
}

impl SourceRef {
    /// One entry per filename, in the order the matches are given (best first).
    pub fn dedup_from(matches: &[RetrievalMatch]) -> Vec<SourceRef> {
        let mut seen = HashSet::new();
        matches
            .iter()
            .filter(|m| seen.insert(m.filename().to_string()))
            .map(|m| SourceRef {
                filename: m.filename().to_string(),
                relevance_score: m.similarity_score,
                doc_type: m.metadata.doc_type().to_string(),
            })
            .collect()
    }
}

/// The answer handed back to callers of the query pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub answer: String,
    pub mode: AnswerMode,
    pub confidence: f32,
    pub sources: Vec<SourceRef>,
    pub num_sources: usize,
    /// Underlying failure, for operators only. Never shown as the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_error: Option<String>,
}

impl QueryOutcome {
    fn build(answer: String, mode: AnswerMode, confidence: f32, sources: Vec<SourceRef>) -> Self {
        Self {
            answer,
            mode,
            confidence,
            num_sources: sources.len(),
            sources,
            debug_error: None,
        }
    }

    pub fn grounded(answer: impl Into<String>, confidence: f32, sources: Vec<SourceRef>) -> Self {
        Self::build(answer.into(), AnswerMode::Rag, confidence, sources)
    }

    pub fn conversational(answer: impl Into<String>, confidence: f32) -> Self {
        Self::build(
            answer.into(),
            AnswerMode::Conversational,
            confidence,
            Vec::new(),
        )
    }

    pub fn fallback(answer: impl Into<String>, confidence: f32) -> Self {
        Self::build(
            answer.into(),
            AnswerMode::ConversationalFallback,
            confidence,
            Vec::new(),
        )
    }

    pub fn error(apology: impl Into<String>, cause: impl Into<String>) -> Self {
        let mut outcome = Self::build(apology.into(), AnswerMode::Error, 0.0, Vec::new());
        outcome.debug_error = Some(cause.into());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DocumentMetadata;

    fn hit(filename: &str, score: f32) -> RetrievalMatch {
        RetrievalMatch {
            chunk_text: format!("text from {filename}"),
            similarity_score: score,
            metadata: DocumentMetadata::from_pairs([("filename", filename), ("type", "text")]),
        }
    }

    #[test]
    fn sources_are_deduplicated_by_first_seen_filename() {
        let matches = vec![hit("a.md", 0.9), hit("b.md", 0.8), hit("a.md", 0.75)];
        let sources = SourceRef::dedup_from(&matches);

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].filename, "a.md");
        assert_eq!(sources[0].relevance_score, 0.9);
        assert_eq!(sources[1].filename, "b.md");
    }

    #[test]
    fn num_sources_tracks_sources() {
        let outcome = QueryOutcome::grounded(
            "answer",
            0.9,
            SourceRef::dedup_from(&[hit("a.md", 0.9)]),
        );
        assert_eq!(outcome.num_sources, outcome.sources.len());
    }

    #[test]
    fn mode_serializes_with_wire_names() {
        let json = serde_json::to_value(QueryOutcome::fallback("x", 0.3)).unwrap();
        assert_eq!(json["mode"], "conversational-fallback");
        assert!(json.get("debug_error").is_none());

        let json = serde_json::to_value(QueryOutcome::error("sorry", "boom")).unwrap();
        assert_eq!(json["mode"], "error");
        assert_eq!(json["confidence"], 0.0);
    }
}
