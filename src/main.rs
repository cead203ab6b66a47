use std::process::ExitCode;

/// EDITH command-line entry point.
///
/// # Environment Variables
///
/// - `EDITH_LOG`: logging filter (trace, debug, info, warn, error)
/// - `EDITH_DATA_DIR`: override the data directory location
/// - `EDITH_CHUNK_SIZE`, `EDITH_CHUNK_OVERLAP`, `EDITH_TOP_K`,
///   `EDITH_SIMILARITY_THRESHOLD`, `EDITH_OLLAMA_HOST`, `EDITH_MODEL`:
///   override the persisted configuration
fn main() -> ExitCode {
    edith_lib::run()
}
