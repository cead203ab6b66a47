use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{DomainError, MetadataFilter, RetrievalMatch};

use super::collaborators::{EmbeddingEngine, VectorStore};

const CONTEXT_SEPARATOR: &str = "\n---\n";
const MAX_TOP_K: usize = 100;

/// Retrieval knobs persisted in the app config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub max_context_chars: usize,
    pub embed_batch_size: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.7,
            max_context_chars: 2000,
            embed_batch_size: 10,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.top_k == 0 {
            return Err(DomainError::validation("top_k must be at least 1"));
        }
        if self.top_k > MAX_TOP_K {
            return Err(DomainError::limit(format!(
                "top_k {} exceeds the maximum of {MAX_TOP_K}",
                self.top_k
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(DomainError::validation(
                "similarity_threshold must be within [0, 1]",
            ));
        }
        if self.embed_batch_size == 0 {
            return Err(DomainError::validation(
                "embed_batch_size must be at least 1",
            ));
        }
        Ok(())
    }
}

/// What the gate hands to the router.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub context: String,
    /// Surviving matches, best first.
    pub matches: Vec<RetrievalMatch>,
    /// Score of the best surviving match; 0.0 when nothing survived.
    pub confidence: f32,
    /// Set when the embedder or index failed and the outcome was degraded to empty.
    pub degraded: bool,
}

impl RetrievalOutcome {
    fn degraded() -> Self {
        Self {
            degraded: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Embeds the query, asks the index for neighbours, drops weak matches and
/// packs the rest into a bounded context.
pub struct RetrievalGate {
    embedder: Arc<dyn EmbeddingEngine>,
    store: Arc<dyn VectorStore>,
    embedding_model: String,
    config: RetrievalConfig,
}

impl RetrievalGate {
    pub fn new(
        embedder: Arc<dyn EmbeddingEngine>,
        store: Arc<dyn VectorStore>,
        embedding_model: impl Into<String>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            embedding_model: embedding_model.into(),
            config,
        }
    }

    /// Full path from question text. Embedding or index failures degrade to
    /// an empty outcome instead of an error.
    pub fn retrieve(&self, question: &str, filter: &MetadataFilter) -> RetrievalOutcome {
        let vector = match self.embedder.embed(&self.embedding_model, question.trim()) {
            Ok(vector) => vector,
            Err(err) => {
                warn!(target: "edith::retrieval", error = %err, "query embedding failed; treating as no matches");
                return RetrievalOutcome::degraded();
            }
        };

        self.retrieve_vector(
            &vector,
            self.config.top_k,
            self.config.similarity_threshold,
            filter,
        )
    }

    pub fn retrieve_vector(
        &self,
        vector: &[f32],
        k: usize,
        threshold: f32,
        filter: &MetadataFilter,
    ) -> RetrievalOutcome {
        let hits = match self.store.query(vector, k.max(1), filter) {
            Ok(hits) => hits,
            Err(err) => {
                warn!(target: "edith::retrieval", error = %err, "index query failed; treating as no matches");
                return RetrievalOutcome::degraded();
            }
        };

        let candidates: Vec<RetrievalMatch> = hits.into_iter().map(RetrievalMatch::from).collect();
        let top_scores: Vec<f32> = candidates
            .iter()
            .take(3)
            .map(|m| m.similarity_score)
            .collect();

        let matches = filter_by_threshold(candidates, threshold);
        info!(
            target: "edith::retrieval",
            ?top_scores,
            threshold,
            surviving = matches.len(),
            "retrieved matches"
        );

        let confidence = matches.first().map_or(0.0, |m| m.similarity_score);
        let context = assemble_context(&matches, self.config.max_context_chars);

        RetrievalOutcome {
            context,
            matches,
            confidence,
            degraded: false,
        }
    }
}

/// Keeps matches scoring at least `threshold`, sorted best first.
pub fn filter_by_threshold(matches: Vec<RetrievalMatch>, threshold: f32) -> Vec<RetrievalMatch> {
    let mut surviving: Vec<RetrievalMatch> = matches
        .into_iter()
        .filter(|m| m.similarity_score >= threshold)
        .collect();
    surviving.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
    surviving
}

/// Formats matches as `[Source: <filename>]` blocks joined by a separator.
///
/// Blocks are added in order while the whole string, separators included,
/// stays within `max_chars`. Assembly stops at the first block that does not
/// fit; blocks are never cut.
pub fn assemble_context(matches: &[RetrievalMatch], max_chars: usize) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut length = 0usize;

    for m in matches {
        let block = format!("[Source: {}]\n{}\n", m.filename(), m.chunk_text);
        let block_len = block.chars().count();
        let separator_len = if blocks.is_empty() {
            0
        } else {
            CONTEXT_SEPARATOR.len()
        };

        if length + separator_len + block_len > max_chars {
            break;
        }
        length += separator_len + block_len;
        blocks.push(block);
    }

    blocks.join(CONTEXT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Chunk, DocumentMetadata, EmbeddedChunk, IndexMatch, IndexStats,
    };
    use parking_lot::Mutex;
    use uuid::Uuid;

    struct FixedStore {
        scores: Vec<f32>,
        fail: bool,
        last_limit: Mutex<Option<usize>>,
    }

    impl FixedStore {
        fn with_scores(scores: &[f32]) -> Self {
            Self {
                scores: scores.to_vec(),
                fail: false,
                last_limit: Mutex::new(None),
            }
        }

        fn failing() -> Self {
            Self {
                scores: Vec::new(),
                fail: true,
                last_limit: Mutex::new(None),
            }
        }
    }

    impl VectorStore for FixedStore {
        fn replace_matching(
            &self,
            _filter: &MetadataFilter,
            _records: &[EmbeddedChunk],
        ) -> Result<usize, DomainError> {
            Ok(0)
        }

        fn query(
            &self,
            _vector: &[f32],
            limit: usize,
            _filter: &MetadataFilter,
        ) -> Result<Vec<IndexMatch>, DomainError> {
            *self.last_limit.lock() = Some(limit);
            if self.fail {
                return Err(DomainError::storage("index offline"));
            }
            Ok(self
                .scores
                .iter()
                .take(limit)
                .enumerate()
                .map(|(i, score)| IndexMatch {
                    id: Uuid::new_v4(),
                    similarity_score: *score,
                    chunk: Chunk::new(
                        &format!("chunk {i}"),
                        i,
                        DocumentMetadata::from_pairs([("filename", format!("note{i}.md"))]),
                    ),
                })
                .collect())
        }

        fn delete_matching(&self, _filter: &MetadataFilter) -> Result<usize, DomainError> {
            Ok(0)
        }

        fn stats(&self) -> Result<IndexStats, DomainError> {
            Ok(IndexStats::default())
        }

        fn ping(&self) -> Result<(), DomainError> {
            Ok(())
        }
    }

    struct UnitEmbedder {
        fail: bool,
    }

    impl EmbeddingEngine for UnitEmbedder {
        fn embed(&self, _model: &str, _text: &str) -> Result<Vec<f32>, DomainError> {
            if self.fail {
                Err(DomainError::embedding("model not loaded"))
            } else {
                Ok(vec![1.0, 0.0])
            }
        }
    }

    fn gate(store: FixedStore, fail_embed: bool) -> RetrievalGate {
        RetrievalGate::new(
            Arc::new(UnitEmbedder { fail: fail_embed }),
            Arc::new(store),
            "test",
            RetrievalConfig::default(),
        )
    }

    fn hit(filename: &str, text: &str, score: f32) -> RetrievalMatch {
        RetrievalMatch {
            chunk_text: text.into(),
            similarity_score: score,
            metadata: DocumentMetadata::from_pairs([("filename", filename)]),
        }
    }

    #[test]
    fn threshold_drops_weak_matches_and_reports_best_score() {
        let outcome = gate(FixedStore::with_scores(&[0.9, 0.72, 0.5]), false)
            .retrieve("what is a cell?", &MetadataFilter::new());

        let scores: Vec<f32> = outcome.matches.iter().map(|m| m.similarity_score).collect();
        assert_eq!(scores, vec![0.9, 0.72]);
        assert_eq!(outcome.confidence, 0.9);
        assert!(!outcome.degraded);
        assert!(outcome.context.contains("[Source: note0.md]\nchunk 0\n"));
    }

    #[test]
    fn nothing_above_threshold_is_empty_not_error() {
        let outcome = gate(FixedStore::with_scores(&[0.4, 0.3]), false)
            .retrieve("what is a cell?", &MetadataFilter::new());

        assert!(outcome.is_empty());
        assert_eq!(outcome.confidence, 0.0);
        assert!(outcome.context.is_empty());
        assert!(!outcome.degraded);
    }

    #[test]
    fn embedding_failure_degrades_to_empty() {
        let outcome = gate(FixedStore::with_scores(&[0.9]), true)
            .retrieve("anything", &MetadataFilter::new());
        assert!(outcome.is_empty());
        assert!(outcome.degraded);
    }

    #[test]
    fn index_failure_degrades_to_empty() {
        let outcome = gate(FixedStore::failing(), false).retrieve("anything", &MetadataFilter::new());
        assert!(outcome.is_empty());
        assert!(outcome.degraded);
    }

    #[test]
    fn k_is_forwarded_to_the_index() {
        let store = Arc::new(FixedStore::with_scores(&[0.9, 0.9, 0.9, 0.9]));
        let gate = RetrievalGate::new(
            Arc::new(UnitEmbedder { fail: false }),
            store.clone(),
            "test",
            RetrievalConfig::default(),
        );
        let outcome = gate.retrieve_vector(&[1.0, 0.0], 2, 0.5, &MetadataFilter::new());

        assert_eq!(*store.last_limit.lock(), Some(2));
        assert_eq!(outcome.matches.len(), 2);
    }

    #[test]
    fn raising_threshold_never_adds_matches() {
        let candidates: Vec<RetrievalMatch> = [0.95, 0.81, 0.7, 0.69, 0.2, -0.3]
            .iter()
            .map(|s| hit("a.md", "x", *s))
            .collect();

        let mut previous = usize::MAX;
        for step in 0..=10 {
            let threshold = step as f32 / 10.0;
            let surviving = filter_by_threshold(candidates.clone(), threshold).len();
            assert!(surviving <= previous);
            previous = surviving;
        }
    }

    #[test]
    fn filter_sorts_best_first() {
        let surviving = filter_by_threshold(
            vec![hit("a.md", "a", 0.75), hit("b.md", "b", 0.9)],
            0.7,
        );
        assert_eq!(surviving[0].filename(), "b.md");
    }

    #[test]
    fn context_stops_before_overflowing_block() {
        let matches = vec![
            hit("a.md", &"a".repeat(40), 0.9),
            hit("b.md", &"b".repeat(40), 0.8),
            hit("c.md", "short", 0.75),
        ];
        // One block is "[Source: a.md]\n" (15) + 40 + "\n" (1) = 56 chars.
        let context = assemble_context(&matches, 100);

        assert!(context.starts_with("[Source: a.md]"));
        assert!(!context.contains("b.md"));
        assert!(!context.contains("c.md"), "assembly stops at first overflow");
        assert!(context.chars().count() <= 100);
    }

    #[test]
    fn context_blocks_are_separated() {
        let matches = vec![hit("a.md", "alpha", 0.9), hit("b.md", "beta", 0.8)];
        let context = assemble_context(&matches, 2000);
        assert_eq!(
            context,
            "[Source: a.md]\nalpha\n\n---\n[Source: b.md]\nbeta\n"
        );
    }

    #[test]
    fn oversized_top_k_is_a_limit_error() {
        let config = RetrievalConfig {
            top_k: 1000,
            ..RetrievalConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DomainError::LimitExceeded(_))
        ));
        assert!(RetrievalConfig::default().validate().is_ok());
    }
}
