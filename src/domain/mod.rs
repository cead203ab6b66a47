//! Domain layer: core entities and value objects for the notes pipeline.

pub mod errors;
pub mod models;

pub use errors::DomainError;
pub use models::{
    AnswerMode, Chunk, ChunkEmbedding, ClassificationResult, ClassifierScores, DocumentMetadata,
    EmbeddedChunk, IndexMatch, IndexStats, MetadataFilter, MetadataValue, QueryCategory,
    QueryOutcome, RetrievalMatch, SourceDocument, SourceRef, FILENAME_KEY, TYPE_KEY,
};
