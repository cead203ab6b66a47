use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{
    application::services::DocumentLoader,
    domain::{DocumentMetadata, DomainError, SourceDocument, FILENAME_KEY, TYPE_KEY},
};

pub const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

/// Reads plain-text and markdown notes from disk.
///
/// `filename` is the path relative to the scanned directory, so two notes
/// with the same name in different folders stay distinct.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDocumentLoader;

impl TextDocumentLoader {
    pub fn new() -> Self {
        Self
    }

    fn is_supported(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                TEXT_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false)
    }

    fn list_files(directory: &Path, recursive: bool) -> Vec<PathBuf> {
        let walker = WalkDir::new(directory).follow_links(true);
        let walker = if recursive { walker } else { walker.max_depth(1) };

        let mut files: Vec<PathBuf> = walker
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(target: "edith::ingest", error = %err, "skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && Self::is_supported(entry.path()))
            .map(|entry| entry.into_path())
            .collect();

        files.sort();
        files
    }

    pub fn load_file(&self, path: &Path, root: &Path) -> Result<SourceDocument, DomainError> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            DomainError::other(format!("failed to read {}: {err}", path.display()))
        })?;

        let filename = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        let metadata = DocumentMetadata::from_pairs([
            (FILENAME_KEY, filename),
            (TYPE_KEY, "text".to_string()),
            ("path", path.display().to_string()),
        ])
        .with("char_count", text.chars().count());

        Ok(SourceDocument::new(text, metadata))
    }
}

impl DocumentLoader for TextDocumentLoader {
    fn load_directory(
        &self,
        directory: &Path,
        recursive: bool,
    ) -> Result<Vec<SourceDocument>, DomainError> {
        if !directory.is_dir() {
            return Err(DomainError::not_found(format!(
                "directory {} does not exist",
                directory.display()
            )));
        }

        let mut documents = Vec::new();
        for path in Self::list_files(directory, recursive) {
            match self.load_file(&path, directory) {
                Ok(document) => {
                    debug!(target: "edith::ingest", path = %path.display(), "loaded document");
                    documents.push(document);
                }
                Err(err) => warn!(target: "edith::ingest", error = %err, "skipping document"),
            }
        }

        Ok(documents)
    }
}
