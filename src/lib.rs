use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod settings;

use application::services::{
    EmbeddingEngine as EmbeddingEngineTrait, Generator, NotesAssistant, VectorStore,
};
#[cfg(feature = "fastembed-engine")]
use infrastructure::FastEmbedEngine;
use infrastructure::{
    OllamaGenerator, OpenAiCompatibleGenerator, SimpleEmbedEngine, SledVectorStore,
    TextDocumentLoader,
};
use settings::{AppConfig, ConfigManager, EmbeddingBackend, GeneratorBackend};

/// Everything a front end needs, built once at startup.
pub struct AppHandles {
    pub assistant: Arc<NotesAssistant>,
    pub config: Arc<ConfigManager>,
    pub data_dir: PathBuf,
}

/// Entry point invoked from `main.rs`.
pub fn run() -> ExitCode {
    let cli = cli::Cli::parse();
    init_tracing();

    match try_run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(target: "edith", error = ?err, "command failed");
            eprintln!("[edith] {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn try_run(cli: cli::Cli) -> Result<()> {
    let handles = build_environment(cli.data_dir.clone())
        .context("failed to bootstrap EDITH environment")?;
    cli::execute(&handles, cli)
}

fn init_tracing() {
    init_tracing_with_writer(std::io::stderr);
}

fn init_tracing_with_writer<W>(make_writer: fn() -> W)
where
    W: std::io::Write + Send + Sync + 'static,
{
    static INIT: std::sync::OnceLock<()> = std::sync::OnceLock::new();

    let _ = INIT.get_or_init(|| {
        let filter = std::env::var("EDITH_LOG").unwrap_or_else(|_| "info".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(make_writer)
            .compact()
            .try_init();
    });
}

/// Loads config (file, then `EDITH_*` overrides), opens the index under the
/// data directory and wires the assistant. Invalid configuration is fatal.
pub fn build_environment(data_dir_override: Option<PathBuf>) -> Result<AppHandles> {
    let data_dir = resolve_data_dir(data_dir_override)?;

    let config = Arc::new(ConfigManager::load(&data_dir).context("failed to load config file")?);
    let mut active_config = config.current();
    active_config
        .apply_env_overrides()
        .context("invalid EDITH_* environment override")?;
    active_config
        .validate()
        .context("invalid configuration")?;

    let store_path = data_dir.join("store");
    let store_impl = SledVectorStore::open(&store_path)
        .map_err(|err| anyhow!(err.to_string()))
        .context("failed to open embedded store")?;
    let store: Arc<dyn VectorStore> = Arc::new(store_impl);

    let embedder = init_embedder(&active_config.embedding)
        .context("failed to initialise embedding backend")?;
    let generator = init_generator(&active_config.generator);

    let assistant = Arc::new(
        NotesAssistant::new(
            embedder,
            store,
            generator,
            Arc::new(TextDocumentLoader::new()),
            active_config.assistant_config(),
        )
        .map_err(|err| anyhow!(err.to_string()))?,
    );

    log_startup(&active_config, &data_dir);
    warn_on_dimension_drift(&assistant);

    Ok(AppHandles {
        assistant,
        config,
        data_dir,
    })
}

fn log_startup(config: &AppConfig, data_dir: &std::path::Path) {
    info!(
        target: "edith",
        data_dir = %data_dir.display(),
        embedding = config.embedding.id(),
        embedding_model = config.embedding.model_name(),
        generator = config.generator.id(),
        generator_model = config.generator.model_name(),
        "environment ready"
    );
}

/// Chunks embedded at another dimension are invisible to queries until re-ingested.
fn warn_on_dimension_drift(assistant: &NotesAssistant) {
    let indexed = match assistant.stats() {
        Ok(stats) => stats.embedding_dimension,
        Err(err) => {
            warn!(target: "edith::store", error = %err, "unable to read index stats");
            return;
        }
    };
    if let (Some(indexed), Some(active)) = (indexed, assistant.embedding_dimensions()) {
        if indexed != active {
            warn!(
                target: "edith::store",
                indexed,
                active,
                "index was built with a different embedding dimension; re-run ingest"
            );
        }
    }
}

fn init_embedder(backend: &EmbeddingBackend) -> Result<Arc<dyn EmbeddingEngineTrait>> {
    match backend {
        EmbeddingBackend::Simple { model, dimensions } => {
            let engine = SimpleEmbedEngine::try_new(model.clone(), *dimensions)
                .map_err(|err| anyhow!(err.to_string()))?;
            Ok(Arc::new(engine))
        }
        #[cfg(feature = "fastembed-engine")]
        EmbeddingBackend::FastEmbed { model } => {
            let engine = FastEmbedEngine::try_new(model).map_err(|err| anyhow!(err.to_string()))?;
            Ok(Arc::new(engine))
        }
    }
}

fn init_generator(backend: &GeneratorBackend) -> Arc<dyn Generator> {
    match backend {
        GeneratorBackend::Ollama {
            host,
            model,
            temperature,
            timeout_secs,
        } => Arc::new(OllamaGenerator::new(
            host,
            model.clone(),
            *temperature,
            *timeout_secs,
        )),
        GeneratorBackend::OpenAiCompatible {
            base_url,
            model,
            api_key_env,
            temperature,
            timeout_secs,
        } => Arc::new(OpenAiCompatibleGenerator::new(
            base_url,
            model.clone(),
            api_key_env.as_deref(),
            *temperature,
            *timeout_secs,
        )),
    }
}

fn resolve_data_dir(data_dir_override: Option<PathBuf>) -> Result<PathBuf> {
    let dir = match data_dir_override {
        Some(dir) => dir,
        None => directories::ProjectDirs::from("dev", "edith", "Edith")
            .ok_or_else(|| anyhow!("unable to determine OS data dir"))?
            .data_dir()
            .to_path_buf(),
    };
    std::fs::create_dir_all(&dir).context("failed to create data directory")?;
    Ok(dir)
}
