use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod metadata;
mod query;

pub use metadata::{DocumentMetadata, MetadataFilter, MetadataValue, FILENAME_KEY, TYPE_KEY};
pub use query::{
    AnswerMode, ClassificationResult, ClassifierScores, QueryCategory, QueryOutcome, SourceRef,
};

/// One loaded source document, as supplied by a document loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl SourceDocument {
    pub fn new(text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// A bounded, ordered segment of one source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub sequence_index: usize,
    pub char_count: usize,
    pub metadata: DocumentMetadata,
}

impl Chunk {
    /// Builds a chunk from raw text. The text is trimmed and `char_count`
    /// is derived from the trimmed value.
    pub fn new(text: &str, sequence_index: usize, metadata: DocumentMetadata) -> Self {
        let text = text.trim().to_string();
        Self {
            char_count: text.chars().count(),
            text,
            sequence_index,
            metadata,
        }
    }

    pub fn filename(&self) -> &str {
        self.metadata.filename()
    }
}

/// Vector representation of a chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkEmbedding {
    pub model: String,
    pub vector: Vec<f32>,
}

impl ChunkEmbedding {
    pub fn new(model: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            model: model.into(),
            vector,
        }
    }

    pub fn dims(&self) -> usize {
        self.vector.len()
    }
}

/// A chunk together with its embedding, as owned by the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub id: Uuid,
    pub chunk: Chunk,
    pub embedding: ChunkEmbedding,
    pub ingested_at: DateTime<Utc>,
}

impl EmbeddedChunk {
    pub fn new(chunk: Chunk, embedding: ChunkEmbedding) -> Self {
        Self {
            id: Uuid::new_v4(),
            chunk,
            embedding,
            ingested_at: Utc::now(),
        }
    }
}

/// Raw hit returned by a vector index query.
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub id: Uuid,
    pub similarity_score: f32,
    pub chunk: Chunk,
}

/// Size of the index as seen by this process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub count: usize,
    pub dimension: Option<usize>,
}

/// A retrieved chunk that survived (or is about to face) the similarity gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalMatch {
    pub chunk_text: String,
    pub similarity_score: f32,
    pub metadata: DocumentMetadata,
}

impl RetrievalMatch {
    pub fn filename(&self) -> &str {
        self.metadata.filename()
    }
}

impl From<IndexMatch> for RetrievalMatch {
    fn from(value: IndexMatch) -> Self {
        Self {
            chunk_text: value.chunk.text,
            similarity_score: value.similarity_score,
            metadata: value.chunk.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_trims_and_counts_characters() {
        let chunk = Chunk::new("  naïve café \n", 0, DocumentMetadata::new());
        assert_eq!(chunk.text, "naïve café");
        assert_eq!(chunk.char_count, 10);
    }
}
