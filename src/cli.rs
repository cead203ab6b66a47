//! Command-line surface. Parses arguments and formats results; all behaviour
//! lives in [`NotesAssistant`].

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::application::services::{NotesAssistant, SummaryStyle};
use crate::application::{QueryRequest, SummaryRequest};
use crate::domain::{MetadataFilter, MetadataValue, QueryOutcome};
use crate::settings::OVERRIDE_KEYS;
use crate::AppHandles;

/// Ask questions about your notes
#[derive(Debug, Parser)]
#[command(
    name = "edith",
    version = env!("CARGO_PKG_VERSION"),
    about = "Ask questions about your notes",
    long_about = "Index plain-text notes and answer questions grounded in them, falling back to general chat when the notes have nothing relevant."
)]
pub struct Cli {
    /// Directory holding the index and config.json
    #[arg(long, global = true, env = "EDITH_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Index every .txt/.md/.markdown file under a directory
    Ingest {
        #[arg(value_name = "DIR", default_value = "./documents")]
        dir: PathBuf,

        /// Only read files directly inside DIR
        #[arg(long)]
        no_recursive: bool,
    },

    /// Answer one question
    Query {
        #[arg(value_name = "TEXT")]
        text: String,

        /// Search the notes even if the question looks conversational
        #[arg(long)]
        force_retrieval: bool,

        /// Restrict retrieval to chunks whose metadata matches (repeatable)
        #[arg(long = "filter", value_name = "KEY=VALUE", value_parser = parse_filter)]
        filters: Vec<(String, MetadataValue)>,
    },

    /// Summarise the indexed notes
    Summary {
        /// comprehensive, bullet or brief
        #[arg(long, default_value = "comprehensive")]
        style: SummaryStyle,

        #[arg(long = "filter", value_name = "KEY=VALUE", value_parser = parse_filter)]
        filters: Vec<(String, MetadataValue)>,
    },

    /// Analyse a single note file
    Analyze {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Drop every indexed chunk of one note
    Forget {
        /// Filename as recorded at ingest time (relative to the ingest root)
        #[arg(value_name = "FILENAME")]
        filename: String,
    },

    /// Show index size and embedding dimension
    Stats,

    /// Check that the index is reachable
    Health,

    /// Show the saved config, or change it with `--set chunk_size=800`
    Config {
        /// Same keys as the EDITH_* environment overrides, without the prefix (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_setting)]
        sets: Vec<(String, String)>,
    },

    /// Interactive session; `quit` or `exit` ends it, `summary` prints a summary
    Chat {
        #[arg(long)]
        force_retrieval: bool,
    },
}

fn parse_filter(raw: &str) -> Result<(String, MetadataValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("filter key cannot be empty".into());
    }
    Ok((key.to_string(), MetadataValue::parse_loose(value)))
}

/// Maps `chunk-size=800` to (`EDITH_CHUNK_SIZE`, `800`).
fn parse_setting(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim().to_ascii_uppercase().replace('-', "_");
    let key = if key.starts_with("EDITH_") {
        key
    } else {
        format!("EDITH_{key}")
    };
    if !OVERRIDE_KEYS.contains(&key.as_str()) {
        return Err(format!(
            "unknown setting `{key}`; expected one of {}",
            OVERRIDE_KEYS.join(", ")
        ));
    }
    Ok((key, value.trim().to_string()))
}

fn to_filter(filters: Vec<(String, MetadataValue)>) -> Option<MetadataFilter> {
    if filters.is_empty() {
        None
    } else {
        Some(filters.into_iter().collect())
    }
}

pub fn execute(handles: &AppHandles, cli: Cli) -> Result<()> {
    let assistant = handles.assistant.as_ref();
    let json = cli.json;
    match cli.command {
        Commands::Ingest { dir, no_recursive } => {
            let report = assistant
                .ingest_directory(&dir, !no_recursive)
                .with_context(|| format!("failed to ingest {}", dir.display()))?;
            if json {
                print_json(&report)?;
            } else {
                println!(
                    "Indexed {} documents ({} chunks), skipped {}",
                    report.documents, report.chunks, report.skipped
                );
            }
        }
        Commands::Query {
            text,
            force_retrieval,
            filters,
        } => {
            let request = QueryRequest {
                question: text,
                filter: to_filter(filters),
                force_retrieval,
            };
            print_outcome(&assistant.answer(&request), json)?;
        }
        Commands::Summary { style, filters } => {
            let request = SummaryRequest {
                filter: to_filter(filters).unwrap_or_default(),
                style,
            };
            let response = assistant.summarize(&request).context("summary failed")?;
            if json {
                print_json(&response)?;
            } else {
                println!("{}", response.summary);
            }
        }
        Commands::Analyze { file } => {
            let note = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let analysis = assistant.analyze(&note);
            if json {
                print_json(&analysis)?;
            } else if analysis.success {
                println!("{}", analysis.analysis);
            } else {
                anyhow::bail!(
                    "analysis failed: {}",
                    analysis.error.unwrap_or_else(|| "unknown error".into())
                );
            }
        }
        Commands::Forget { filename } => {
            let removed = assistant
                .forget(&filename)
                .with_context(|| format!("failed to forget {filename}"))?;
            if json {
                print_json(&serde_json::json!({ "filename": filename, "removed": removed }))?;
            } else {
                println!("Removed {removed} chunks of {filename}");
            }
        }
        Commands::Stats => {
            let stats = assistant.stats().context("failed to read index stats")?;
            if json {
                print_json(&stats)?;
            } else {
                println!("chunks:    {}", stats.total_chunks);
                println!(
                    "dimension: {}",
                    stats
                        .embedding_dimension
                        .map_or_else(|| "-".to_string(), |d| d.to_string())
                );
                println!("model:     {}", stats.embedding_model);
            }
        }
        Commands::Health => {
            let status = assistant.health().context("health check failed")?;
            if json {
                print_json(&status)?;
            } else {
                println!("{}", status.message);
                if let Some(details) = status.details {
                    println!("{details}");
                }
            }
        }
        Commands::Config { sets } => {
            let config = if sets.is_empty() {
                handles.config.current()
            } else {
                handles
                    .config
                    .update(|config| {
                        config.apply_overrides(|key| {
                            sets.iter()
                                .find(|(name, _)| name == key)
                                .map(|(_, value)| value.clone())
                        })
                    })
                    .context("failed to update config")?
            };
            if json {
                print_json(&serde_json::json!({
                    "path": handles.config.path(),
                    "data_dir": handles.data_dir,
                    "config": config,
                }))?;
            } else {
                println!("config:   {}", handles.config.path().display());
                println!("data dir: {}", handles.data_dir.display());
                print_json(&config)?;
                if !sets.is_empty() {
                    println!("Saved; EDITH_* environment variables still take precedence.");
                }
            }
        }
        Commands::Chat { force_retrieval } => chat(assistant, force_retrieval, json)?,
    }
    Ok(())
}

fn chat(assistant: &NotesAssistant, force_retrieval: bool, json: bool) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    println!("EDITH ready. Type `quit` to leave, `summary` for an overview of your notes.");

    loop {
        print!("> ");
        stdout.flush().context("failed to flush stdout")?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("failed to read input")? == 0 {
            break;
        }
        let input = line.trim();
        match input.to_ascii_lowercase().as_str() {
            "" => continue,
            "quit" | "exit" => break,
            "summary" => {
                match assistant.summarize(&SummaryRequest::default()) {
                    Ok(response) => println!("{}\n", response.summary),
                    Err(err) => println!("Could not summarise: {err}\n"),
                }
                continue;
            }
            _ => {}
        }

        let outcome = assistant.answer_query(input, None, force_retrieval);
        print_outcome(&outcome, json)?;
        println!();
    }
    Ok(())
}

fn print_outcome(outcome: &QueryOutcome, json: bool) -> Result<()> {
    if json {
        return print_json(outcome);
    }

    println!("{}", outcome.answer);
    println!(
        "\n[{} | confidence {:.2}]",
        outcome.mode, outcome.confidence
    );
    for source in &outcome.sources {
        println!(
            "  - {} ({:.2})",
            source.filename, source.relevance_score
        );
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    println!("{rendered}");
    Ok(())
}
