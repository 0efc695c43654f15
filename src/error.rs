//! Error types for document access and replacement runs
//!
//! `DocumentError` covers a single open container, `RuleError` covers rule
//! validation, and `ReplaceError` is what the orchestration layer hands back to
//! callers. Each wrapper keeps the underlying cause reachable via `source()`.

use std::path::PathBuf;

/// Errors raised while opening, reading, rewriting or saving a document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid file format for {}: expected .{expected}", .path.display())]
    WrongExtension {
        path: PathBuf,
        expected: &'static str,
    },

    #[error("Invalid container {}: {reason}", .path.display())]
    InvalidContainer { path: PathBuf, reason: String },

    #[error("Search text cannot be empty")]
    EmptySearch,

    #[error("Document is closed")]
    Closed,

    #[error("Memory limit exceeded: {used} > {limit} bytes")]
    MemoryLimitExceeded { used: u64, limit: u64 },

    #[error("Failed to persist {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl DocumentError {
    pub(crate) fn invalid_container(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        DocumentError::InvalidContainer {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// A replacement rule failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("old field cannot be empty")]
    EmptySearch,

    #[error("old and new values cannot be the same")]
    NoOp,
}

/// Errors surfaced by the replacement orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ReplaceError {
    #[error("Path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Unsupported document type: {} (only .docx and .pptx are supported)", .0.display())]
    UnsupportedType(PathBuf),

    #[error("Invalid rule at index {index}: {source}")]
    InvalidRule {
        index: usize,
        #[source]
        source: RuleError,
    },

    #[error("Failed to process {}: {source}", .path.display())]
    Document {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    #[error("Error walking directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid exclude pattern: {0}")]
    InvalidPattern(#[from] glob::PatternError),

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("{failed} of {total} documents could not be processed")]
    PartialBatchFailure { failed: usize, total: usize },
}

impl ReplaceError {
    pub(crate) fn document(path: impl Into<PathBuf>, source: DocumentError) -> Self {
        ReplaceError::Document {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = DocumentError> = std::result::Result<T, E>;
