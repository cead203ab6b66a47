//! Splits document text into bounded, overlapping chunks.
//!
//! Sections (markdown headers, numbered headings, ALL CAPS labels) are tried
//! first; text without at least two sections falls back to blank-line
//! paragraphs. Paragraphs are accumulated greedily up to `chunk_size`, and
//! each new chunk is seeded with a sentence-snapped tail of the previous one.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Chunk, DocumentMetadata, DomainError};

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const SEPARATOR_LEN: usize = PARAGRAPH_SEPARATOR.len();

static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:#{1,6}[ \t]+\S.*|[A-Z][A-Z \t]+:[ \t]*|\d+\.[ \t]+[A-Z].*)$")
        .expect("section header pattern is valid")
});

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph break pattern is valid"));

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("sentence end pattern is valid"));

/// Size bounds for the chunker. Both values are in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, DomainError> {
        let config = Self {
            chunk_size,
            chunk_overlap,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.chunk_size == 0 {
            return Err(DomainError::validation("chunk_size must be greater than zero"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(DomainError::validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Chunks one document. Empty or whitespace-only text yields no chunks.
    ///
    /// Every chunk carries the document's metadata as it was at this call.
    pub fn chunk(&self, text: &str, metadata: &DocumentMetadata) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let pieces = match split_sections(text) {
            Some(sections) => sections
                .into_iter()
                .flat_map(|section| {
                    if char_len(section) <= self.config.chunk_size {
                        vec![section.to_string()]
                    } else {
                        self.accumulate(&split_paragraphs(section))
                    }
                })
                .collect(),
            None => self.accumulate(&split_paragraphs(text)),
        };

        let chunks: Vec<Chunk> = pieces
            .iter()
            .filter(|piece| !piece.trim().is_empty())
            .enumerate()
            .map(|(index, piece)| Chunk::new(piece, index, metadata.clone()))
            .collect();

        debug!(
            target: "edith::chunker",
            filename = metadata.filename(),
            chunks = chunks.len(),
            "chunked document"
        );
        chunks
    }

    /// Greedy accumulation of paragraphs into chunk-sized buffers.
    fn accumulate(&self, paragraphs: &[&str]) -> Vec<String> {
        let size = self.config.chunk_size;
        let mut pieces = Vec::new();
        let mut buffer = String::new();
        let mut buffer_len = 0usize;

        for paragraph in paragraphs {
            let paragraph_len = char_len(paragraph);

            if buffer_len > 0 && buffer_len + SEPARATOR_LEN + paragraph_len > size {
                let closed = buffer.trim().to_string();
                // Overlap never pushes the next chunk past size + overlap.
                let budget = (size + self.config.chunk_overlap)
                    .saturating_sub(paragraph_len + SEPARATOR_LEN)
                    .min(self.config.chunk_overlap);
                let tail = overlap_tail(&closed, budget).to_string();
                pieces.push(closed);

                buffer.clear();
                if !tail.is_empty() {
                    buffer.push_str(&tail);
                    buffer.push_str(PARAGRAPH_SEPARATOR);
                }
                buffer.push_str(paragraph);
            } else {
                if !buffer.is_empty() {
                    buffer.push_str(PARAGRAPH_SEPARATOR);
                }
                buffer.push_str(paragraph);
            }
            buffer_len = char_len(&buffer);
        }

        if !buffer.trim().is_empty() {
            pieces.push(buffer.trim().to_string());
        }
        pieces
    }
}

/// Returns the sections of `text` when it has at least two, `None` otherwise.
fn split_sections(text: &str) -> Option<Vec<&str>> {
    let mut starts: Vec<usize> = SECTION_HEADER.find_iter(text).map(|m| m.start()).collect();
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }

    let sections: Vec<&str> = starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            text[start..end].trim()
        })
        .filter(|section| !section.is_empty())
        .collect();

    (sections.len() >= 2).then_some(sections)
}

fn split_paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .collect()
}

/// Last `budget` characters of `text`, moved forward to the first sentence
/// start inside that window when there is one.
///
/// Every whole sentence that fits in the budget is carried over, not just the
/// final one: a short closing sentence alone gives the next chunk too little
/// context. Text without a sentence break inside the window keeps the raw
/// character tail.
fn overlap_tail(text: &str, budget: usize) -> &str {
    if budget == 0 {
        return "";
    }
    let total = char_len(text);
    if total <= budget {
        return text;
    }

    let start = text
        .char_indices()
        .nth(total - budget)
        .map_or(text.len(), |(offset, _)| offset);
    let window = &text[start..];

    match SENTENCE_END.find(window) {
        Some(boundary) if boundary.end() < window.len() => window[boundary.end()..].trim(),
        _ => window.trim(),
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(filename: &str) -> DocumentMetadata {
        DocumentMetadata::from_pairs([("filename", filename), ("type", "text")])
    }

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkingConfig::new(size, overlap).unwrap())
    }

    fn sentence_paragraph(label: usize, sentences: usize) -> String {
        (0..sentences)
            .map(|i| format!("Paragraph {label} sentence {i} talks about gardening."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = chunker(1000, 200).chunk("Para one.\n\nPara two.", &meta("a.md"));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].sequence_index, 0);
        assert_eq!(chunks[0].text, "Para one.\n\nPara two.");
        assert_eq!(chunks[0].char_count, chunks[0].text.chars().count());
    }

    #[test]
    fn blank_input_yields_nothing() {
        let chunker = Chunker::default();
        assert!(chunker.chunk("", &meta("a.md")).is_empty());
        assert!(chunker.chunk("  \n\t\n ", &meta("a.md")).is_empty());
    }

    #[test]
    fn indices_are_contiguous_from_zero() {
        let text = (0..12)
            .map(|i| sentence_paragraph(i, 3))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunker(300, 60).chunk(&text, &meta("a.md"));

        assert!(chunks.len() > 1);
        for (expected, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence_index, expected);
        }
    }

    #[test]
    fn chunks_respect_size_plus_overlap() {
        let text = (0..20)
            .map(|i| sentence_paragraph(i, 2))
            .collect::<Vec<_>>()
            .join("\n\n");
        let size = 250;
        let overlap = 80;
        let chunks = chunker(size, overlap).chunk(&text, &meta("a.md"));

        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(
                chunk.char_count <= size + overlap,
                "chunk {} has {} chars",
                chunk.sequence_index,
                chunk.char_count
            );
        }
    }

    #[test]
    fn oversized_paragraph_is_kept_whole() {
        let huge = "word ".repeat(200);
        let text = format!("Intro paragraph.\n\n{}\n\nOutro paragraph.", huge.trim());
        let chunks = chunker(100, 20).chunk(&text, &meta("a.md"));

        assert!(chunks.iter().any(|c| c.text == huge.trim()));
    }

    #[test]
    fn every_paragraph_survives_chunking() {
        let paragraphs: Vec<String> = (0..15).map(|i| sentence_paragraph(i, 2)).collect();
        let text = paragraphs.join("\n\n");
        let chunks = chunker(200, 50).chunk(&text, &meta("a.md"));
        let joined = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        for paragraph in &paragraphs {
            assert!(joined.contains(paragraph.as_str()), "lost: {paragraph}");
        }
    }

    #[test]
    fn overlap_starts_at_a_sentence_when_possible() {
        let first = "Alpha one is here. Alpha two follows now. Alpha three ends it.";
        let second = "Beta paragraph stands alone and is fairly long to force a split.";
        let text = format!("{first}\n\n{second}");
        let chunks = chunker(80, 40).chunk(&text, &meta("a.md"));

        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].text.starts_with("Alpha three ends it."));
        assert!(chunks[1].text.ends_with(second));
    }

    #[test]
    fn sections_are_chunked_independently() {
        let text = "# Biology\nCells divide.\n\n# Physics\nForce equals mass times acceleration.";
        let chunks = chunker(1000, 200).chunk(text, &meta("a.md"));

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.starts_with("# Biology"));
        assert!(chunks[1].text.starts_with("# Physics"));
        assert_eq!(chunks[1].sequence_index, 1);
    }

    #[test]
    fn oversized_section_is_split_with_overlap() {
        let size = 200;
        let overlap = 50;
        let long_paragraphs: Vec<String> = (0..8).map(|i| sentence_paragraph(i, 2)).collect();
        let text = format!(
            "# Garden\n\n{}\n\n# Kitchen\n\nBake bread on Sunday.",
            long_paragraphs.join("\n\n")
        );
        let chunks = chunker(size, overlap).chunk(&text, &meta("a.md"));

        assert!(chunks.len() > 3, "got {} chunks", chunks.len());
        for (expected, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence_index, expected);
            assert!(
                chunk.char_count <= size + overlap,
                "chunk {} has {} chars",
                expected,
                chunk.char_count
            );
        }

        let joined = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        for paragraph in &long_paragraphs {
            assert!(joined.contains(paragraph.as_str()), "lost: {paragraph}");
        }
        assert_eq!(
            chunks.last().map(|c| c.text.as_str()),
            Some("# Kitchen\n\nBake bread on Sunday.")
        );
    }

    #[test]
    fn single_header_with_preamble_counts_as_two_sections() {
        let text = "Some preamble text.\n\nSUMMARY:\nThe key points.";
        let sections = split_sections(text).unwrap();
        assert_eq!(sections, vec!["Some preamble text.", "SUMMARY:\nThe key points."]);
    }

    #[test]
    fn text_without_headers_uses_paragraphs() {
        assert!(split_sections("just one\n\nor two paragraphs").is_none());
    }

    #[test]
    fn chunks_keep_metadata_from_emission_time() {
        let chunker = Chunker::default();
        let original = meta("a.md");
        let chunks = chunker.chunk("Some text.", &original);
        let _renamed = original.with("filename", "b.md");

        assert_eq!(chunks[0].filename(), "a.md");
    }

    #[test]
    fn overlap_tail_respects_budget_and_char_boundaries() {
        let text = "héllo wörld ünïcode";
        let tail = overlap_tail(text, 7);
        assert!(tail.chars().count() <= 7);
        assert_eq!(overlap_tail(text, 0), "");
        assert_eq!(overlap_tail("short", 10), "short");
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(ChunkingConfig::new(100, 100).is_err());
        assert!(ChunkingConfig::new(0, 0).is_err());
        assert!(ChunkingConfig::new(100, 0).is_ok());
    }
}
