use ahash::AHasher;
use std::hash::{Hash, Hasher};

use crate::{application::services::EmbeddingEngine, domain::DomainError};

pub const DEFAULT_SIMPLE_MODEL: &str = "edith/simple-hash";
pub const DEFAULT_SIMPLE_DIMENSIONS: usize = 384;

const BIGRAM_WEIGHT: f32 = 0.5;

/// A lightweight, deterministic embedding engine that hashes lowercased words
/// and adjacent word pairs into a fixed-size signed vector.
///
/// Not a semantic model. It keeps the pipeline usable offline and makes
/// retrieval reproducible in tests.
#[derive(Debug, Clone)]
pub struct SimpleEmbedEngine {
    model_name: String,
    dimensions: usize,
}

impl SimpleEmbedEngine {
    pub fn try_new(model_name: impl Into<String>, dimensions: usize) -> Result<Self, DomainError> {
        let model_name = model_name.into();
        if model_name.trim().is_empty() {
            return Err(DomainError::validation("embedding model name cannot be empty"));
        }
        if dimensions == 0 {
            return Err(DomainError::validation(
                "embedding dimensions must be greater than zero",
            ));
        }
        Ok(Self {
            model_name,
            dimensions: dimensions.clamp(8, 4096),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let mut hasher = AHasher::default();
        feature.hash(&mut hasher);
        let hash = hasher.finish();
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        ((hash % self.dimensions as u64) as usize, sign)
    }

    fn embed_internal(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let tokens = Self::tokenize(text);

        for token in &tokens {
            let (idx, sign) = self.bucket(token);
            vector[idx] += sign;
        }
        for pair in tokens.windows(2) {
            let (idx, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            vector[idx] += sign * BIGRAM_WEIGHT;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }

        vector
    }

    fn check_model(&self, model: &str) -> Result<(), DomainError> {
        if model.eq_ignore_ascii_case(&self.model_name) {
            Ok(())
        } else {
            Err(DomainError::embedding(format!(
                "engine initialised for `{}` but `{}` requested",
                self.model_name, model
            )))
        }
    }
}

impl Default for SimpleEmbedEngine {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_SIMPLE_MODEL.into(),
            dimensions: DEFAULT_SIMPLE_DIMENSIONS,
        }
    }
}

impl EmbeddingEngine for SimpleEmbedEngine {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, DomainError> {
        self.check_model(model)?;
        if text.trim().is_empty() {
            return Err(DomainError::validation("text payload cannot be empty"));
        }
        Ok(self.embed_internal(text))
    }

    fn dims(&self, _model: &str) -> Option<usize> {
        Some(self.dimensions)
    }
}
