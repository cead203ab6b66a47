//! Document loaders feeding the ingestion service.

mod text_loader;

pub use text_loader::{TextDocumentLoader, TEXT_EXTENSIONS};
