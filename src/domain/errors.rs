use thiserror::Error;

/// Failures raised anywhere in the notes pipeline.
///
/// `answer_query` never returns these; the router folds them into an
/// `error` outcome. Ingestion, summaries and bootstrap propagate them.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Bad configuration or request input (empty question, overlap >= size).
    #[error("invalid input: {0}")]
    Validation(String),

    /// A knob is in range but above what the pipeline will honour.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Missing note directory or file.
    #[error("not found: {0}")]
    NotFound(String),

    /// The vector index could not be opened, read or written.
    #[error("index failure: {0}")]
    Storage(String),

    /// Embedding backend failed, or produced vectors of the wrong shape.
    #[error("embedding failure: {0}")]
    Embedding(String),

    /// The language model backend failed to produce an answer.
    #[error("generation failure: {0}")]
    Generation(String),

    #[error("unexpected error: {0}")]
    Other(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn limit(msg: impl Into<String>) -> Self {
        Self::LimitExceeded(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Short label used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation",
            DomainError::LimitExceeded(_) => "limit",
            DomainError::NotFound(_) => "not_found",
            DomainError::Storage(_) => "storage",
            DomainError::Embedding(_) => "embedding",
            DomainError::Generation(_) => "generation",
            DomainError::Other(_) => "other",
        }
    }
}
