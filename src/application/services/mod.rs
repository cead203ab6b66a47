//! Service layer: the query pipeline plus ingestion and insight.

mod assistant;
mod chunker;
mod classifier;
mod collaborators;
mod ingestion;
mod insight;
mod retrieval;
mod router;

pub use assistant::{AssistantConfig, NotesAssistant};
pub use chunker::{Chunker, ChunkingConfig};
pub use classifier::QueryClassifier;
pub use collaborators::{
    DocumentLoader, EmbeddingEngine, GenerationRequest, Generator, VectorStore,
};
pub use ingestion::IngestionService;
pub use insight::{InsightService, SummaryStyle, NO_NOTES_MESSAGE};
pub use retrieval::{
    assemble_context, filter_by_threshold, RetrievalConfig, RetrievalGate, RetrievalOutcome,
};
pub use router::{
    canned_reply, ResponseRouter, RouteState, RouterConfig, CONVERSATIONAL_SYSTEM_PROMPT,
    ERROR_APOLOGY, FALLBACK_SYSTEM_PROMPT, GROUNDED_SYSTEM_PROMPT,
};
