use std::path::{Path, PathBuf};

use bincode::Options;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sled::{Config, Db, IVec, Tree};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    application::services::VectorStore,
    domain::{
        Chunk, ChunkEmbedding, DocumentMetadata, DomainError, EmbeddedChunk, IndexMatch,
        IndexStats, MetadataFilter,
    },
};

const CHUNKS_TREE: &str = "chunks";

/// On-disk layout of one chunk.
///
/// Metadata values are untagged, which bincode cannot read back, so the
/// metadata map travels as a JSON string inside the bincode record.
#[derive(Serialize, Deserialize)]
struct StoredChunk {
    id: Uuid,
    text: String,
    sequence_index: usize,
    char_count: usize,
    metadata_json: String,
    model: String,
    vector: Vec<f32>,
    ingested_at: DateTime<Utc>,
}

impl StoredChunk {
    fn from_record(record: &EmbeddedChunk) -> Result<Self, DomainError> {
        let metadata_json = serde_json::to_string(&record.chunk.metadata)
            .map_err(|err| DomainError::storage(format!("failed to encode metadata: {err}")))?;
        Ok(Self {
            id: record.id,
            text: record.chunk.text.clone(),
            sequence_index: record.chunk.sequence_index,
            char_count: record.chunk.char_count,
            metadata_json,
            model: record.embedding.model.clone(),
            vector: record.embedding.vector.clone(),
            ingested_at: record.ingested_at,
        })
    }

    fn metadata(&self) -> Result<DocumentMetadata, DomainError> {
        serde_json::from_str(&self.metadata_json)
            .map_err(|err| DomainError::storage(format!("failed to decode metadata: {err}")))
    }

    fn into_record(self) -> Result<EmbeddedChunk, DomainError> {
        let metadata = self.metadata()?;
        Ok(EmbeddedChunk {
            id: self.id,
            chunk: Chunk {
                text: self.text,
                sequence_index: self.sequence_index,
                char_count: self.char_count,
                metadata,
            },
            embedding: ChunkEmbedding::new(self.model, self.vector),
            ingested_at: self.ingested_at,
        })
    }
}

/// Embedded vector index backed by `sled`.
///
/// Chunks live in a single tree keyed by id. Similarity is a brute-force
/// cosine scan in memory, which is fine for a personal notes corpus.
pub struct SledVectorStore {
    db: Db,
    chunks: Tree,
    data_dir: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl SledVectorStore {
    /// Opens (or creates) a sled database rooted at `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|err| {
            DomainError::storage(format!("failed to create data directory {:?}: {err}", dir))
        })?;

        let db = Config::default()
            .path(&dir)
            .cache_capacity(64 * 1024 * 1024)
            .mode(sled::Mode::HighThroughput)
            .open()
            .map_err(|err| DomainError::storage(format!("failed to open sled db: {err}")))?;

        Self::from_db(db, Some(dir))
    }

    /// In-memory database removed on drop.
    pub fn open_temporary() -> Result<Self, DomainError> {
        let db = Config::new()
            .temporary(true)
            .open()
            .map_err(|err| DomainError::storage(format!("failed to open sled db: {err}")))?;
        Self::from_db(db, None)
    }

    fn from_db(db: Db, data_dir: Option<PathBuf>) -> Result<Self, DomainError> {
        let chunks = db
            .open_tree(CHUNKS_TREE)
            .map_err(|err| DomainError::storage(format!("failed to open chunks tree: {err}")))?;

        Ok(Self {
            db,
            chunks,
            data_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, DomainError> {
        bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .serialize(value)
            .map_err(|err| DomainError::storage(format!("serialization error: {err}")))
    }

    fn decode(bytes: &IVec) -> Result<StoredChunk, DomainError> {
        bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .deserialize(bytes.as_ref())
            .map_err(|err| DomainError::storage(format!("deserialization error: {err}")))
    }

    fn encode_key(id: &Uuid) -> [u8; 16] {
        *id.as_bytes()
    }

    fn entries(&self) -> impl Iterator<Item = Result<(IVec, StoredChunk), DomainError>> + '_ {
        self.chunks.iter().map(|entry| {
            let (key, value) = entry
                .map_err(|err| DomainError::storage(format!("failed to read chunk: {err}")))?;
            Ok((key, Self::decode(&value)?))
        })
    }

    fn flush(&self) -> Result<(), DomainError> {
        self.chunks
            .flush()
            .map_err(|err| DomainError::storage(format!("failed to flush chunks: {err}")))?;
        Ok(())
    }
}

/// Cosine similarity of two equal-length vectors; zero vectors score 0.
pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut q_norm = 0.0f32;
    let mut c_norm = 0.0f32;

    for (q, c) in query.iter().zip(candidate.iter()) {
        dot += q * c;
        q_norm += q * q;
        c_norm += c * c;
    }

    let denom = q_norm.sqrt() * c_norm.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0)
}

impl VectorStore for SledVectorStore {
    fn replace_matching(
        &self,
        filter: &MetadataFilter,
        records: &[EmbeddedChunk],
    ) -> Result<usize, DomainError> {
        let _guard = self.write_lock.lock();

        // Encode everything before touching the tree so a bad record leaves it intact.
        let mut batch = sled::Batch::default();
        let mut removed = 0usize;
        for entry in self.entries() {
            let (key, stored) = entry?;
            if filter.matches(&stored.metadata()?) {
                batch.remove(key);
                removed += 1;
            }
        }
        for record in records {
            let bytes = Self::serialize(&StoredChunk::from_record(record)?)?;
            batch.insert(&Self::encode_key(&record.id)[..], bytes);
        }

        self.chunks
            .apply_batch(batch)
            .map_err(|err| DomainError::storage(format!("failed to replace chunks: {err}")))?;
        self.flush()?;

        debug!(
            target: "edith::store",
            removed,
            inserted = records.len(),
            "replaced chunks"
        );
        Ok(removed)
    }

    fn query(
        &self,
        vector: &[f32],
        limit: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<IndexMatch>, DomainError> {
        let mut scored: Vec<(f32, StoredChunk)> = Vec::new();
        let mut mismatched = 0usize;

        for entry in self.entries() {
            let (_, stored) = entry?;
            if stored.vector.len() != vector.len() {
                mismatched += 1;
                continue;
            }
            if !filter.is_empty() && !filter.matches(&stored.metadata()?) {
                continue;
            }
            let score = cosine_similarity(vector, &stored.vector);
            scored.push((score, stored));
        }

        if mismatched > 0 {
            warn!(
                target: "edith::store",
                skipped = mismatched,
                query_dims = vector.len(),
                "skipped chunks with a different embedding dimension"
            );
        }

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(score, stored)| {
                let record = stored.into_record()?;
                Ok(IndexMatch {
                    id: record.id,
                    similarity_score: score,
                    chunk: record.chunk,
                })
            })
            .collect()
    }

    fn delete_matching(&self, filter: &MetadataFilter) -> Result<usize, DomainError> {
        let _guard = self.write_lock.lock();

        let mut doomed = Vec::new();
        for entry in self.entries() {
            let (key, stored) = entry?;
            if filter.matches(&stored.metadata()?) {
                doomed.push(key);
            }
        }

        let mut batch = sled::Batch::default();
        for key in &doomed {
            batch.remove(key.clone());
        }
        self.chunks
            .apply_batch(batch)
            .map_err(|err| DomainError::storage(format!("failed to delete chunks: {err}")))?;
        self.flush()?;

        debug!(target: "edith::store", removed = doomed.len(), "deleted chunks");
        Ok(doomed.len())
    }

    fn stats(&self) -> Result<IndexStats, DomainError> {
        let dimension = match self.entries().next() {
            Some(entry) => Some(entry?.1.vector.len()),
            None => None,
        };
        Ok(IndexStats {
            count: self.chunks.len(),
            dimension,
        })
    }

    fn ping(&self) -> Result<(), DomainError> {
        self.db
            .flush()
            .map_err(|err| DomainError::storage(format!("failed to flush db: {err}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(filename: &str, index: usize, vector: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk::new(
            Chunk::new(
                &format!("{filename} chunk {index}"),
                index,
                DocumentMetadata::from_pairs([("filename", filename), ("type", "text")])
                    .with("chunk_id", index),
            ),
            ChunkEmbedding::new("test", vector),
        )
    }

    fn seed(store: &SledVectorStore, filename: &str, records: &[EmbeddedChunk]) {
        store
            .replace_matching(&MetadataFilter::by_filename(filename), records)
            .unwrap();
    }

    #[test]
    fn query_orders_by_cosine_and_truncates() {
        let store = SledVectorStore::open_temporary().unwrap();
        seed(
            &store,
            "a.md",
            &[record("a.md", 0, vec![1.0, 0.0]), record("a.md", 1, vec![0.6, 0.8])],
        );
        seed(&store, "b.md", &[record("b.md", 0, vec![0.0, 1.0])]);

        let hits = store.query(&[1.0, 0.0], 2, &MetadataFilter::new()).unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "a.md chunk 0");
        assert!((hits[0].similarity_score - 1.0).abs() < 1e-6);
        assert!((hits[1].similarity_score - 0.6).abs() < 1e-6);
        assert_eq!(hits[1].chunk.metadata.filename(), "a.md");
    }

    #[test]
    fn filter_and_delete_by_filename() {
        let store = SledVectorStore::open_temporary().unwrap();
        seed(&store, "a.md", &[record("a.md", 0, vec![1.0, 0.0])]);
        seed(
            &store,
            "b.md",
            &[record("b.md", 0, vec![1.0, 0.0]), record("b.md", 1, vec![0.0, 1.0])],
        );

        let only_b = MetadataFilter::by_filename("b.md");
        let hits = store.query(&[1.0, 0.0], 10, &only_b).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.chunk.filename() == "b.md"));

        assert_eq!(store.delete_matching(&only_b).unwrap(), 2);
        assert_eq!(store.stats().unwrap().count, 1);
    }

    #[test]
    fn mismatched_dimensions_are_skipped() {
        let store = SledVectorStore::open_temporary().unwrap();
        seed(&store, "a.md", &[record("a.md", 0, vec![1.0, 0.0])]);
        seed(&store, "old.md", &[record("old.md", 0, vec![1.0, 0.0, 0.0])]);

        let hits = store.query(&[1.0, 0.0], 10, &MetadataFilter::new()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.filename(), "a.md");
    }

    #[test]
    fn metadata_survives_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let original = record("notes.md", 3, vec![0.0, 1.0]);
        {
            let store = SledVectorStore::open(dir.path()).unwrap();
            seed(&store, "notes.md", &[original.clone()]);
        }

        let store = SledVectorStore::open(dir.path()).unwrap();
        let hits = store.query(&[0.0, 1.0], 1, &MetadataFilter::new()).unwrap();
        assert_eq!(hits[0].id, original.id);
        assert_eq!(hits[0].chunk, original.chunk);
        assert_eq!(
            store.stats().unwrap(),
            IndexStats {
                count: 1,
                dimension: Some(2)
            }
        );
    }

    #[test]
    fn replace_swaps_only_matching_chunks() {
        let store = SledVectorStore::open_temporary().unwrap();
        seed(
            &store,
            "a.md",
            &[record("a.md", 0, vec![1.0, 0.0]), record("a.md", 1, vec![0.0, 1.0])],
        );
        seed(&store, "b.md", &[record("b.md", 0, vec![1.0, 0.0])]);

        let removed = store
            .replace_matching(
                &MetadataFilter::by_filename("a.md"),
                &[record("a.md", 0, vec![0.6, 0.8])],
            )
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.stats().unwrap().count, 2);
        let a_hits = store
            .query(&[1.0, 0.0], 10, &MetadataFilter::by_filename("a.md"))
            .unwrap();
        assert_eq!(a_hits.len(), 1);
        assert!((a_hits[0].similarity_score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn concurrent_replacements_leave_one_generation() {
        let store = std::sync::Arc::new(SledVectorStore::open_temporary().unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    let records: Vec<EmbeddedChunk> =
                        (0..3).map(|i| record("a.md", i, vec![1.0, 0.0])).collect();
                    seed(&store, "a.md", &records);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.stats().unwrap().count, 3);
    }

    #[test]
    fn zero_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
