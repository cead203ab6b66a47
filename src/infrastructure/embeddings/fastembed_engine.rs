use std::str::FromStr;

use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use parking_lot::Mutex;
use tracing::info;

use crate::{application::services::EmbeddingEngine, domain::DomainError};

pub const DEFAULT_FASTEMBED_MODEL: &str = "BAAI/bge-small-en-v1.5";

/// Embedding engine backed by `fastembed`'s `TextEmbedding`.
///
/// The loaded model sits behind a `Mutex`; batches go through in one call so
/// the lock is taken once per batch.
pub struct FastEmbedEngine {
    model_label: String,
    dimensions: usize,
    inner: Mutex<TextEmbedding>,
}

impl FastEmbedEngine {
    pub fn try_new(model_name: impl AsRef<str>) -> Result<Self, DomainError> {
        let label = model_name.as_ref().trim();
        if label.is_empty() {
            return Err(DomainError::validation(
                "fastembed model name cannot be empty",
            ));
        }

        let embedding_model = EmbeddingModel::from_str(label).map_err(|err| {
            DomainError::embedding(format!("failed to parse fastembed model `{label}`: {err}"))
        })?;

        let model_info = TextEmbedding::get_model_info(&embedding_model).map_err(|err| {
            DomainError::embedding(format!(
                "unable to read metadata for fastembed model `{label}`: {err}"
            ))
        })?;

        let text_embedding = TextEmbedding::try_new(TextInitOptions::new(embedding_model.clone()))
            .map_err(|err| {
                DomainError::embedding(format!(
                    "failed to initialise fastembed model `{label}`: {err}"
                ))
            })?;

        info!(target: "edith::ingest", model = label, dims = model_info.dim, "fastembed model loaded");

        Ok(Self {
            model_label: label.to_string(),
            dimensions: model_info.dim,
            inner: Mutex::new(text_embedding),
        })
    }

    fn check_model(&self, model: &str) -> Result<(), DomainError> {
        if model.eq_ignore_ascii_case(&self.model_label) {
            Ok(())
        } else {
            Err(DomainError::embedding(format!(
                "engine initialised for `{}` but `{}` requested",
                self.model_label, model
            )))
        }
    }
}

impl EmbeddingEngine for FastEmbedEngine {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, DomainError> {
        if text.trim().is_empty() {
            return Err(DomainError::validation("text payload cannot be empty"));
        }
        self.embed_batch(model, &[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::embedding("fastembed returned no embedding"))
    }

    fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        self.check_model(model)?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self
            .inner
            .lock()
            .embed(texts.to_vec(), None)
            .map_err(|err| DomainError::embedding(format!("fastembed inference failed: {err}")))?;

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(DomainError::embedding(format!(
                "unexpected embedding dimension (expected {}, got {})",
                self.dimensions,
                bad.len()
            )));
        }

        Ok(vectors)
    }

    fn dims(&self, _model: &str) -> Option<usize> {
        Some(self.dimensions)
    }
}
