use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::application::dtos::IngestReport;
use crate::domain::{
    Chunk, ChunkEmbedding, DomainError, EmbeddedChunk, MetadataFilter, SourceDocument,
};

use super::chunker::Chunker;
use super::collaborators::{DocumentLoader, EmbeddingEngine, VectorStore};

/// Loads, chunks, embeds and indexes documents.
pub struct IngestionService {
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingEngine>,
    store: Arc<dyn VectorStore>,
    loader: Arc<dyn DocumentLoader>,
    embedding_model: String,
    batch_size: usize,
}

impl IngestionService {
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingEngine>,
        store: Arc<dyn VectorStore>,
        loader: Arc<dyn DocumentLoader>,
        embedding_model: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
            loader,
            embedding_model: embedding_model.into(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn ingest_directory(
        &self,
        directory: &Path,
        recursive: bool,
    ) -> Result<IngestReport, DomainError> {
        info!(
            target: "edith::ingest",
            directory = %directory.display(),
            recursive,
            "loading documents"
        );
        let documents = self.loader.load_directory(directory, recursive)?;
        if documents.is_empty() {
            warn!(target: "edith::ingest", directory = %directory.display(), "no documents found");
        }
        self.ingest_documents(documents)
    }

    /// Indexes already-loaded documents. Chunks previously stored under the
    /// same filename are replaced.
    pub fn ingest_documents(
        &self,
        documents: Vec<SourceDocument>,
    ) -> Result<IngestReport, DomainError> {
        let mut report = IngestReport::default();

        for document in documents {
            let filename = document.metadata.filename().to_string();
            let chunks = self.chunk_document(&document);
            if chunks.is_empty() {
                debug!(target: "edith::ingest", filename = %filename, "document produced no chunks");
                report.skipped += 1;
                continue;
            }

            let records = self.embed_chunks(chunks)?;

            let removed = self
                .store
                .replace_matching(&MetadataFilter::by_filename(filename.as_str()), &records)?;
            let stored = records.len();

            info!(
                target: "edith::ingest",
                filename = %filename,
                chunks = stored,
                replaced = removed,
                "indexed document"
            );
            report.documents += 1;
            report.chunks += stored;
        }

        info!(
            target: "edith::ingest",
            documents = report.documents,
            chunks = report.chunks,
            skipped = report.skipped,
            "ingestion finished"
        );
        Ok(report)
    }

    fn chunk_document(&self, document: &SourceDocument) -> Vec<Chunk> {
        self.chunker
            .chunk(&document.text, &document.metadata)
            .into_iter()
            .map(|mut chunk| {
                chunk.metadata = chunk
                    .metadata
                    .with("chunk_id", chunk.sequence_index)
                    .with("char_count", chunk.char_count);
                chunk
            })
            .collect()
    }

    /// Embeds in fixed batches across the rayon pool. Batches are cut before
    /// dispatch and collected by index, so vectors line up with their chunks.
    fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<EmbeddedChunk>, DomainError> {
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();

        let vectors: Vec<Vec<f32>> = texts
            .par_chunks(self.batch_size)
            .map(|batch| self.embedder.embed_batch(&self.embedding_model, batch))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();

        if vectors.len() != chunks.len() {
            return Err(DomainError::embedding(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                EmbeddedChunk::new(chunk, ChunkEmbedding::new(&self.embedding_model, vector))
            })
            .collect())
    }
}
