//! Infrastructure layer wiring concrete adapters (embeddings, storage, generation, loading).

pub mod embeddings;
pub mod generation;
pub mod loader;
pub mod storage;

#[cfg(feature = "fastembed-engine")]
pub use embeddings::FastEmbedEngine;
pub use embeddings::SimpleEmbedEngine;
pub use generation::{OllamaGenerator, OpenAiCompatibleGenerator};
pub use loader::TextDocumentLoader;
pub use storage::SledVectorStore;
