use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::application::services::{
    AssistantConfig, ChunkingConfig, RetrievalConfig, RouterConfig,
};
use crate::domain::DomainError;
use crate::infrastructure::embeddings::{DEFAULT_SIMPLE_DIMENSIONS, DEFAULT_SIMPLE_MODEL};
use crate::infrastructure::generation::{DEFAULT_OLLAMA_HOST, DEFAULT_OLLAMA_MODEL};

/// Default filename used to persist configuration within the data directory.
const CONFIG_FILENAME: &str = "config.json";

pub const ENV_CHUNK_SIZE: &str = "EDITH_CHUNK_SIZE";
pub const ENV_CHUNK_OVERLAP: &str = "EDITH_CHUNK_OVERLAP";
pub const ENV_TOP_K: &str = "EDITH_TOP_K";
pub const ENV_SIMILARITY_THRESHOLD: &str = "EDITH_SIMILARITY_THRESHOLD";
pub const ENV_OLLAMA_HOST: &str = "EDITH_OLLAMA_HOST";
pub const ENV_MODEL: &str = "EDITH_MODEL";

/// Every key understood by [`AppConfig::apply_overrides`].
pub const OVERRIDE_KEYS: &[&str] = &[
    ENV_CHUNK_SIZE,
    ENV_CHUNK_OVERLAP,
    ENV_TOP_K,
    ENV_SIMILARITY_THRESHOLD,
    ENV_OLLAMA_HOST,
    ENV_MODEL,
];

/// Embedding backends compiled into the binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum EmbeddingBackend {
    /// Deterministic hash embedder (always available).
    Simple {
        #[serde(default = "default_simple_model")]
        model: String,
        #[serde(default = "default_simple_dim")]
        dimensions: usize,
    },
    /// Semantic embeddings powered by FastEmbed (feature gated).
    #[cfg(feature = "fastembed-engine")]
    FastEmbed {
        #[serde(default = "default_fastembed_model")]
        model: String,
    },
}

impl EmbeddingBackend {
    pub fn id(&self) -> &'static str {
        match self {
            EmbeddingBackend::Simple { .. } => "simple",
            #[cfg(feature = "fastembed-engine")]
            EmbeddingBackend::FastEmbed { .. } => "fast-embed",
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            EmbeddingBackend::Simple { model, .. } => model,
            #[cfg(feature = "fastembed-engine")]
            EmbeddingBackend::FastEmbed { model } => model,
        }
    }
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        EmbeddingBackend::Simple {
            model: default_simple_model(),
            dimensions: default_simple_dim(),
        }
    }
}

/// Language model backends reachable over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum GeneratorBackend {
    Ollama {
        #[serde(default = "default_ollama_host")]
        host: String,
        #[serde(default = "default_ollama_model")]
        model: String,
        #[serde(default = "default_temperature")]
        temperature: f32,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    OpenAiCompatible {
        base_url: String,
        model: String,
        /// Name of the environment variable holding the bearer token.
        #[serde(default)]
        api_key_env: Option<String>,
        #[serde(default = "default_temperature")]
        temperature: f32,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

impl GeneratorBackend {
    pub fn id(&self) -> &'static str {
        match self {
            GeneratorBackend::Ollama { .. } => "ollama",
            GeneratorBackend::OpenAiCompatible { .. } => "open-ai-compatible",
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            GeneratorBackend::Ollama { model, .. } => model,
            GeneratorBackend::OpenAiCompatible { model, .. } => model,
        }
    }

    fn set_model(&mut self, value: String) {
        match self {
            GeneratorBackend::Ollama { model, .. } => *model = value,
            GeneratorBackend::OpenAiCompatible { model, .. } => *model = value,
        }
    }

    fn temperature(&self) -> f32 {
        match self {
            GeneratorBackend::Ollama { temperature, .. } => *temperature,
            GeneratorBackend::OpenAiCompatible { temperature, .. } => *temperature,
        }
    }
}

impl Default for GeneratorBackend {
    fn default() -> Self {
        GeneratorBackend::Ollama {
            host: default_ollama_host(),
            model: default_ollama_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Complete persisted configuration payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub embedding: EmbeddingBackend,
    #[serde(default)]
    pub generator: GeneratorBackend,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub router: RouterConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.generator.model_name().trim().is_empty() {
            return Err(DomainError::validation("generator model cannot be empty"));
        }
        if !(0.0..=2.0).contains(&self.generator.temperature()) {
            return Err(DomainError::validation(
                "generator temperature must be within [0, 2]",
            ));
        }
        self.assistant_config().validate()
    }

    /// Applies `EDITH_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), DomainError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`; unparsable values are rejected.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), DomainError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_override(&lookup, ENV_CHUNK_SIZE)? {
            self.chunking.chunk_size = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_CHUNK_OVERLAP)? {
            self.chunking.chunk_overlap = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_TOP_K)? {
            self.retrieval.top_k = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_SIMILARITY_THRESHOLD)? {
            self.retrieval.similarity_threshold = value;
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.trim().is_empty()) {
            self.generator.set_model(model.trim().to_string());
        }
        if let Some(value) = lookup(ENV_OLLAMA_HOST).filter(|v| !v.trim().is_empty()) {
            match &mut self.generator {
                GeneratorBackend::Ollama { host, .. } => *host = value.trim().to_string(),
                other => warn!(
                    target: "edith::config",
                    backend = other.id(),
                    "EDITH_OLLAMA_HOST ignored for non-ollama generator"
                ),
            }
        }
        Ok(())
    }

    pub fn assistant_config(&self) -> AssistantConfig {
        AssistantConfig {
            embedding_model: self.embedding.model_name().to_string(),
            chunking: self.chunking,
            retrieval: self.retrieval,
            router: self.router,
        }
    }
}

fn parse_override<T, F>(lookup: &F, key: &str) -> Result<Option<T>, DomainError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| DomainError::validation(format!("{key}={raw}: {err}"))),
        _ => Ok(None),
    }
}

/// Thread-safe manager responsible for loading and persisting `AppConfig`.
pub struct ConfigManager {
    path: PathBuf,
    state: RwLock<AppConfig>,
}

impl ConfigManager {
    /// Create a manager rooted at `data_dir`. The JSON file will be located at
    /// `<data_dir>/config.json`. A missing or unreadable file yields defaults.
    pub fn load(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = data_dir.as_ref().join(CONFIG_FILENAME);
        let config = if path.exists() {
            match fs::read(&path)
                .map_err(|err| err.to_string())
                .and_then(|bytes| {
                    serde_json::from_slice::<AppConfig>(&bytes).map_err(|err| err.to_string())
                }) {
                Ok(config) => config,
                Err(err) => {
                    warn!(target: "edith::config", path = %path.display(), error = %err, "ignoring unreadable config file");
                    AppConfig::default()
                }
            }
        } else {
            AppConfig::default()
        };

        Ok(Self {
            path,
            state: RwLock::new(config),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current configuration.
    pub fn current(&self) -> AppConfig {
        self.state.read().clone()
    }

    /// Applies `change`, validates the result and persists it.
    pub fn update<F>(&self, change: F) -> anyhow::Result<AppConfig>
    where
        F: FnOnce(&mut AppConfig) -> Result<(), DomainError>,
    {
        let mut guard = self.state.write();
        let mut next = guard.clone();
        change(&mut next)?;
        next.validate()?;
        self.persist(&next)?;
        *guard = next.clone();
        Ok(next)
    }

    /// Ensure the backing directory exists and write the JSON payload.
    fn persist(&self, config: &AppConfig) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(config)?;
        fs::write(&self.path, payload)
    }
}

const fn default_simple_dim() -> usize {
    DEFAULT_SIMPLE_DIMENSIONS
}

fn default_simple_model() -> String {
    DEFAULT_SIMPLE_MODEL.to_string()
}

#[cfg(feature = "fastembed-engine")]
fn default_fastembed_model() -> String {
    crate::infrastructure::embeddings::DEFAULT_FASTEMBED_MODEL.to_string()
}

fn default_ollama_host() -> String {
    DEFAULT_OLLAMA_HOST.to_string()
}

fn default_ollama_model() -> String {
    DEFAULT_OLLAMA_MODEL.to_string()
}

const fn default_temperature() -> f32 {
    0.7
}

const fn default_timeout_secs() -> u64 {
    120
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.similarity_threshold, 0.7);
        assert_eq!(config.router.fallback_confidence, 0.3);
        assert_eq!(config.generator.id(), "ollama");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_and_corrupt_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::load(dir.path()).unwrap();
        assert_eq!(manager.current(), AppConfig::default());

        fs::write(dir.path().join(CONFIG_FILENAME), b"{not json").unwrap();
        let manager = ConfigManager::load(dir.path()).unwrap();
        assert_eq!(manager.current(), AppConfig::default());
    }

    #[test]
    fn updates_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::load(dir.path()).unwrap();
        manager
            .update(|config| {
                config.retrieval.top_k = 8;
                config.generator = GeneratorBackend::OpenAiCompatible {
                    base_url: "http://localhost:8080".into(),
                    model: "qwen".into(),
                    api_key_env: Some("EDITH_TEST_KEY".into()),
                    temperature: 0.2,
                    timeout_secs: 30,
                };
                Ok(())
            })
            .unwrap();

        let reloaded = ConfigManager::load(dir.path()).unwrap().current();
        assert_eq!(reloaded.retrieval.top_k, 8);
        assert_eq!(reloaded.generator.id(), "open-ai-compatible");

        let raw = fs::read_to_string(dir.path().join(CONFIG_FILENAME)).unwrap();
        assert!(raw.contains("\"backend\": \"open-ai-compatible\""));
    }

    #[test]
    fn invalid_update_is_rejected_and_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::load(dir.path()).unwrap();
        let result = manager.update(|config| {
            config.chunking.chunk_overlap = 5000;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(manager.current().chunking.chunk_overlap, 200);
        assert!(!dir.path().join(CONFIG_FILENAME).exists());
    }

    #[test]
    fn unparsable_override_in_update_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::load(dir.path()).unwrap();
        assert_eq!(manager.path(), dir.path().join(CONFIG_FILENAME));

        let result =
            manager.update(|config| config.apply_overrides(lookup(&[(ENV_TOP_K, "many")])));
        assert!(result.is_err());
        assert!(!manager.path().exists());

        let saved = manager
            .update(|config| config.apply_overrides(lookup(&[(ENV_TOP_K, "4")])))
            .unwrap();
        assert_eq!(saved.retrieval.top_k, 4);
        assert!(manager.path().exists());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_sections() {
        let config: AppConfig =
            serde_json::from_str(r#"{"retrieval": {"top_k": 3}}"#).unwrap();
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.similarity_threshold, 0.7);
        assert_eq!(config.chunking, ChunkingConfig::default());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(lookup(&[
                (ENV_CHUNK_SIZE, "500"),
                (ENV_CHUNK_OVERLAP, "50"),
                (ENV_TOP_K, "3"),
                (ENV_SIMILARITY_THRESHOLD, "0.5"),
                (ENV_OLLAMA_HOST, "http://gpu-box:11434"),
                (ENV_MODEL, "mistral"),
            ]))
            .unwrap();

        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.similarity_threshold, 0.5);
        assert_eq!(config.generator.model_name(), "mistral");
        assert!(matches!(
            &config.generator,
            GeneratorBackend::Ollama { host, .. } if host == "http://gpu-box:11434"
        ));
    }

    #[test]
    fn threshold_must_stay_above_fallback_confidence() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(lookup(&[(ENV_SIMILARITY_THRESHOLD, "0.2")]))
            .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fallback_confidence"));

        config.router.fallback_confidence = 0.1;
        assert!(config.validate().is_ok());

        config.router.fallback_confidence = 0.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_env_values_are_errors() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(lookup(&[(ENV_TOP_K, "many")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_TOP_K));

        let mut config = AppConfig::default();
        config
            .apply_overrides(lookup(&[(ENV_CHUNK_OVERLAP, "1000")]))
            .unwrap();
        assert!(config.validate().is_err());
    }
}
