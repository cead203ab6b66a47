use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::application::dtos::{
    HealthStatusResponse, IndexStatsResponse, IngestReport, NoteAnalysis, QueryRequest,
    SummaryRequest, SummaryResponse,
};
use crate::domain::{
    Chunk, ClassificationResult, DocumentMetadata, DomainError, MetadataFilter, QueryOutcome,
    SourceDocument,
};

use super::chunker::{Chunker, ChunkingConfig};
use super::collaborators::{DocumentLoader, EmbeddingEngine, Generator, VectorStore};
use super::ingestion::IngestionService;
use super::insight::InsightService;
use super::retrieval::{RetrievalConfig, RetrievalGate};
use super::router::{ResponseRouter, RouterConfig};

/// Everything the assistant needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub embedding_model: String,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub router: RouterConfig,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            embedding_model: "edith/simple-hash".into(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            router: RouterConfig::default(),
        }
    }
}

impl AssistantConfig {
    pub fn with_model(embedding_model: impl Into<String>) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.embedding_model.trim().is_empty() {
            return Err(DomainError::validation("embedding model cannot be empty"));
        }
        self.chunking.validate()?;
        self.retrieval.validate()?;
        self.router.validate()?;
        // Grounded answers score at least the threshold; fallback must stay below.
        if self.router.fallback_confidence >= self.retrieval.similarity_threshold {
            return Err(DomainError::validation(format!(
                "fallback_confidence ({}) must be lower than similarity_threshold ({})",
                self.router.fallback_confidence, self.retrieval.similarity_threshold
            )));
        }
        Ok(())
    }
}

/// Single entry point over ingestion, querying and note insight.
pub struct NotesAssistant {
    chunker: Chunker,
    router: ResponseRouter,
    ingestion: IngestionService,
    insight: InsightService,
    embedder: Arc<dyn EmbeddingEngine>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn Generator>,
    embedding_model: String,
}

impl NotesAssistant {
    pub fn new(
        embedder: Arc<dyn EmbeddingEngine>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
        loader: Arc<dyn DocumentLoader>,
        config: AssistantConfig,
    ) -> Result<Self, DomainError> {
        config.validate()?;

        let AssistantConfig {
            embedding_model,
            chunking,
            retrieval,
            router,
        } = config;

        let gate = Arc::new(RetrievalGate::new(
            embedder.clone(),
            store.clone(),
            embedding_model.clone(),
            retrieval,
        ));

        Ok(Self {
            chunker: Chunker::new(chunking),
            router: ResponseRouter::new(gate.clone(), generator.clone(), router),
            ingestion: IngestionService::new(
                Chunker::new(chunking),
                embedder.clone(),
                store.clone(),
                loader,
                embedding_model.clone(),
                retrieval.embed_batch_size,
            ),
            insight: InsightService::new(
                embedder.clone(),
                gate,
                generator.clone(),
                embedding_model.clone(),
            ),
            embedder,
            store,
            generator,
            embedding_model,
        })
    }

    pub fn answer_query(
        &self,
        question: &str,
        filter: Option<&MetadataFilter>,
        force_retrieval: bool,
    ) -> QueryOutcome {
        self.router.answer_query(question, filter, force_retrieval)
    }

    pub fn answer(&self, request: &QueryRequest) -> QueryOutcome {
        self.answer_query(
            &request.question,
            request.filter.as_ref(),
            request.force_retrieval,
        )
    }

    pub fn classify(&self, query: &str) -> ClassificationResult {
        self.router.classifier().classify(query)
    }

    pub fn chunk(&self, text: &str, metadata: &DocumentMetadata) -> Vec<Chunk> {
        self.chunker.chunk(text, metadata)
    }

    pub fn ingest_documents(
        &self,
        documents: Vec<SourceDocument>,
    ) -> Result<IngestReport, DomainError> {
        self.ingestion.ingest_documents(documents)
    }

    pub fn ingest_directory(
        &self,
        directory: &Path,
        recursive: bool,
    ) -> Result<IngestReport, DomainError> {
        self.ingestion.ingest_directory(directory, recursive)
    }

    /// Drops every indexed chunk of `filename`; returns how many went.
    pub fn forget(&self, filename: &str) -> Result<usize, DomainError> {
        let removed = self
            .store
            .delete_matching(&MetadataFilter::by_filename(filename))?;
        info!(target: "edith::store", filename, removed, "forgot document");
        Ok(removed)
    }

    pub fn summarize(&self, request: &SummaryRequest) -> Result<SummaryResponse, DomainError> {
        let summary = self
            .insight
            .summarize_notes(&request.filter, request.style)?;
        Ok(SummaryResponse {
            style: request.style,
            summary,
        })
    }

    pub fn analyze(&self, note: &str) -> NoteAnalysis {
        self.insight.analyze_note(note)
    }

    pub fn stats(&self) -> Result<IndexStatsResponse, DomainError> {
        let stats = self.store.stats()?;
        Ok(IndexStatsResponse::new(stats, &self.embedding_model))
    }

    pub fn embedding_dimensions(&self) -> Option<usize> {
        self.embedder.dims(&self.embedding_model)
    }

    pub fn health(&self) -> Result<HealthStatusResponse, DomainError> {
        self.store.ping()?;
        info!(target: "edith::store", "health check passed");

        Ok(HealthStatusResponse {
            ok: true,
            message: "ready".into(),
            details: Some(format!(
                "model: {}, generator: {}, checked_at: {}",
                self.embedding_model,
                self.generator.name(),
                Utc::now()
            )),
        })
    }
}
