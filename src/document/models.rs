//! Core data structures for document handling
//!
//! This module defines the document kinds we understand, the text segments
//! returned by extraction, and the sizing model used to pick streaming options.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub const KB: u64 = 1024;
pub const MB: u64 = 1024 * KB;
pub const GB: u64 = 1024 * MB;

/// Files at or above this size are routed to the streaming engine by default.
pub const DEFAULT_STREAMING_THRESHOLD: u64 = 10 * MB;

/// Expansion factor between a compressed container and its decompressed XML.
pub const XML_EXPANSION_FACTOR: u64 = 10;

/// The two OOXML part layouts we rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    /// `.docx`: one `word/document.xml` body part, text in `w:t`
    Word,
    /// `.pptx`: one `ppt/slides/slideN.xml` part per slide, text in `a:t`
    Presentation,
}

impl DocumentKind {
    /// Detect the kind from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "docx" => Some(DocumentKind::Word),
            "pptx" => Some(DocumentKind::Presentation),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            DocumentKind::Word => "docx",
            DocumentKind::Presentation => "pptx",
        }
    }

    /// Qualified name of the element that carries displayable text.
    pub fn text_element(self) -> &'static [u8] {
        match self {
            DocumentKind::Word => b"w:t",
            DocumentKind::Presentation => b"a:t",
        }
    }

    /// Qualified name of the paragraph element grouping text runs.
    pub(crate) fn paragraph_element(self) -> &'static [u8] {
        match self {
            DocumentKind::Word => b"w:p",
            DocumentKind::Presentation => b"a:p",
        }
    }

    /// Part whose absence means the archive is not this kind of document.
    pub(crate) fn required_part(self) -> &'static str {
        match self {
            DocumentKind::Word => "word/document.xml",
            DocumentKind::Presentation => "ppt/presentation.xml",
        }
    }

    pub(crate) fn matches_extension(self, path: &Path) -> bool {
        DocumentKind::from_path(path) == Some(self)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Word => write!(f, "Word document"),
            DocumentKind::Presentation => write!(f, "PowerPoint presentation"),
        }
    }
}

/// A unit of extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextSegment {
    /// One non-empty paragraph of a word-processing body
    Paragraph(String),
    /// All text of one slide, text elements joined by newlines
    Slide { number: u32, text: String },
}

impl TextSegment {
    pub fn text(&self) -> &str {
        match self {
            TextSegment::Paragraph(text) => text,
            TextSegment::Slide { text, .. } => text,
        }
    }
}

impl fmt::Display for TextSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextSegment::Paragraph(text) => write!(f, "{text}"),
            TextSegment::Slide { number, text } => write!(f, "Slide {number}:\n{text}"),
        }
    }
}

/// Join extracted segments into a single string, one segment per block.
pub fn segments_to_string(segments: &[TextSegment]) -> String {
    segments
        .iter()
        .map(|segment| segment.to_string())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// File-size bands used to size streaming buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeTier {
    Tiny,
    Medium,
    Large,
    VeryLarge,
}

impl SizeTier {
    pub fn for_size(file_size: u64) -> Self {
        match file_size {
            size if size < MB => SizeTier::Tiny,
            size if size < 10 * MB => SizeTier::Medium,
            size if size < 100 * MB => SizeTier::Large,
            _ => SizeTier::VeryLarge,
        }
    }
}

/// Buffer sizing for the streaming engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingOptions {
    /// Read buffer size and the granularity of chunked text callbacks
    pub chunk_size: usize,
    /// Largest single token the engine will hold in flight
    pub max_memory: u64,
    /// Reuse read buffers through a `BufferPool`
    pub enable_memory_pool: bool,
}

impl Default for StreamingOptions {
    fn default() -> Self {
        StreamingOptions {
            chunk_size: 64 * KB as usize,
            max_memory: 100 * MB,
            enable_memory_pool: true,
        }
    }
}

impl StreamingOptions {
    /// Pick options from the input file size.
    pub fn adaptive(file_size: u64) -> Self {
        match SizeTier::for_size(file_size) {
            SizeTier::Tiny => StreamingOptions {
                chunk_size: 16 * KB as usize,
                max_memory: 10 * MB,
                enable_memory_pool: false,
            },
            SizeTier::Medium => StreamingOptions {
                chunk_size: 64 * KB as usize,
                max_memory: 50 * MB,
                enable_memory_pool: true,
            },
            SizeTier::Large => StreamingOptions {
                chunk_size: 256 * KB as usize,
                max_memory: 100 * MB,
                enable_memory_pool: true,
            },
            SizeTier::VeryLarge => StreamingOptions {
                chunk_size: MB as usize,
                max_memory: 200 * MB,
                enable_memory_pool: true,
            },
        }
    }
}

/// Which document engine handles a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Engine {
    Standard,
    Streaming,
}

impl Engine {
    /// Streaming for inputs at or above `threshold`, standard below it.
    pub fn for_size(file_size: u64, threshold: u64) -> Self {
        if file_size >= threshold {
            Engine::Streaming
        } else {
            Engine::Standard
        }
    }
}

/// Render a byte count for humans.
pub fn format_bytes(bytes: u64) -> String {
    match bytes {
        b if b >= GB => format!("{:.2} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.2} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.2} KB", b as f64 / KB as f64),
        b => format!("{b} B"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(
            DocumentKind::from_path(Path::new("a/report.docx")),
            Some(DocumentKind::Word)
        );
        assert_eq!(
            DocumentKind::from_path(Path::new("DECK.PPTX")),
            Some(DocumentKind::Presentation)
        );
        assert_eq!(DocumentKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(DocumentKind::from_path(Path::new("docx")), None);
    }

    #[test]
    fn test_adaptive_tiers() {
        let tiny = StreamingOptions::adaptive(512 * KB);
        assert_eq!(tiny.chunk_size, 16 * 1024);
        assert!(!tiny.enable_memory_pool);

        let medium = StreamingOptions::adaptive(5 * MB);
        assert_eq!(medium.chunk_size, 64 * 1024);
        assert_eq!(medium.max_memory, 50 * MB);
        assert!(medium.enable_memory_pool);

        let large = StreamingOptions::adaptive(50 * MB);
        assert_eq!(large.chunk_size, 256 * 1024);
        assert_eq!(large.max_memory, 100 * MB);

        let very_large = StreamingOptions::adaptive(150 * MB);
        assert_eq!(SizeTier::for_size(150 * MB), SizeTier::VeryLarge);
        assert_eq!(very_large.chunk_size, 1024 * 1024);
        assert_eq!(very_large.max_memory, 200 * MB);
        assert!(very_large.enable_memory_pool);
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(SizeTier::for_size(MB - 1), SizeTier::Tiny);
        assert_eq!(SizeTier::for_size(MB), SizeTier::Medium);
        assert_eq!(SizeTier::for_size(10 * MB), SizeTier::Large);
        assert_eq!(SizeTier::for_size(100 * MB), SizeTier::VeryLarge);
    }

    #[test]
    fn test_engine_threshold() {
        let threshold = DEFAULT_STREAMING_THRESHOLD;
        assert_eq!(Engine::for_size(threshold - 1, threshold), Engine::Standard);
        assert_eq!(Engine::for_size(threshold, threshold), Engine::Streaming);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(10 * MB), "10.00 MB");
        assert_eq!(format_bytes(2 * GB), "2.00 GB");
    }

    #[test]
    fn test_slide_segment_display() {
        let segment = TextSegment::Slide {
            number: 2,
            text: "Title\nBody".to_string(),
        };
        assert_eq!(segment.to_string(), "Slide 2:\nTitle\nBody");
        assert_eq!(segment.text(), "Title\nBody");
    }
}
