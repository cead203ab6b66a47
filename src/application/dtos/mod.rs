use serde::{Deserialize, Serialize};

use crate::application::services::SummaryStyle;
use crate::domain::{IndexStats, MetadataFilter};

/// Question submitted by the CLI (or any other outer surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<MetadataFilter>,
    #[serde(default)]
    pub force_retrieval: bool,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            filter: None,
            force_retrieval: false,
        }
    }
}

/// Totals from one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    /// Documents that produced no chunks.
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStatsResponse {
    pub total_chunks: usize,
    pub embedding_dimension: Option<usize>,
    pub embedding_model: String,
}

impl IndexStatsResponse {
    pub fn new(stats: IndexStats, embedding_model: impl Into<String>) -> Self {
        Self {
            total_chunks: stats.count,
            embedding_dimension: stats.dimension,
            embedding_model: embedding_model.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryRequest {
    #[serde(default)]
    pub filter: MetadataFilter,
    #[serde(default)]
    pub style: SummaryStyle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub style: SummaryStyle,
    pub summary: String,
}

/// Structured result of a single-note analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteAnalysis {
    pub success: bool,
    #[serde(default)]
    pub analysis: String,
    pub note_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NoteAnalysis {
    pub fn succeeded(analysis: impl Into<String>, note_length: usize) -> Self {
        Self {
            success: true,
            analysis: analysis.into(),
            note_length,
            error: None,
        }
    }

    pub fn failed(note_length: usize, error: impl Into<String>) -> Self {
        Self {
            success: false,
            analysis: String::new(),
            note_length,
            error: Some(error.into()),
        }
    }
}

/// Health/readiness report for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatusResponse {
    pub ok: bool,
    pub message: String,
    pub details: Option<String>,
}
