//! Contracts for the external collaborators the pipeline depends on.

use std::path::Path;

use crate::domain::{
    DomainError, EmbeddedChunk, IndexMatch, IndexStats, MetadataFilter, SourceDocument,
};

/// Abstraction over any embedding engine (hash embedder, FastEmbed, ...).
///
/// Vectors are expected to be L2-normalised so cosine similarity reduces to a
/// dot product.
pub trait EmbeddingEngine: Send + Sync {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, DomainError>;

    fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        texts.iter().map(|text| self.embed(model, text)).collect()
    }

    fn dims(&self, _model: &str) -> Option<usize> {
        None
    }
}

/// Contract for the vector index.
///
/// Implementations are shared with other writers, so callers must not assume
/// a stable total count between calls.
pub trait VectorStore: Send + Sync {
    /// Swaps every chunk matching `filter` for `records` in one step and
    /// returns how many old chunks went. On failure nothing changes.
    fn replace_matching(
        &self,
        filter: &MetadataFilter,
        records: &[EmbeddedChunk],
    ) -> Result<usize, DomainError>;

    /// Up to `limit` nearest chunks honouring `filter`, best match first.
    fn query(
        &self,
        vector: &[f32],
        limit: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<IndexMatch>, DomainError>;

    /// Removes every chunk whose metadata matches `filter`; returns how many went.
    fn delete_matching(&self, filter: &MetadataFilter) -> Result<usize, DomainError>;

    fn stats(&self) -> Result<IndexStats, DomainError>;

    fn ping(&self) -> Result<(), DomainError>;
}

/// A single call to the language model.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub prompt: String,
    pub max_tokens: usize,
}

impl GenerationRequest {
    pub fn new(system_prompt: impl Into<String>, prompt: impl Into<String>, max_tokens: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            prompt: prompt.into(),
            max_tokens,
        }
    }

    /// Prompt carrying retrieved context ahead of the user's message.
    pub fn with_context(
        system_prompt: impl Into<String>,
        message: &str,
        context: &str,
        max_tokens: usize,
    ) -> Self {
        Self::new(
            system_prompt,
            format!("Context:\n{context}\n\nQuestion: {message}"),
            max_tokens,
        )
    }
}

/// Language model backend. Treated as a black box.
pub trait Generator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> Result<String, DomainError>;

    fn name(&self) -> &str;
}

/// Supplies `(text, metadata)` pairs; file format handling lives behind this trait.
pub trait DocumentLoader: Send + Sync {
    fn load_directory(
        &self,
        directory: &Path,
        recursive: bool,
    ) -> Result<Vec<SourceDocument>, DomainError>;
}
