//! ooxml-replace: Bulk text replacement for .docx and .pptx files
//!
//! This library opens Office Open XML containers, rewrites the text nodes of
//! their document and slide parts without disturbing markup, and saves the
//! result atomically. Large files go through a streaming engine whose memory
//! use is bounded by the largest single XML token.

pub mod config;
pub mod document;
pub mod error;
pub mod replace;

pub use config::Config;
pub use document::{Document, DocumentKind, StandardDocument, StreamingDocument, TextSegment};
pub use error::{DocumentError, ReplaceError, RuleError};
pub use replace::{BatchSummary, ReplaceOptions, ReplaceResult, Replacer, Rule};

/// Output format for batch reports
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// One line per file
    #[default]
    Text,
    /// Results as a JSON document
    Json,
}
