//! Document containers, text model and rewrite engines
//!
//! This module opens `.docx` and `.pptx` containers, extracts their text and
//! rewrites text nodes. Two engines implement the same `Document` capability
//! set: `StandardDocument` holds text parts in memory, `StreamingDocument`
//! rewrites parts token by token straight into a new archive.

pub(crate) mod container;
pub mod memory;
pub mod models;
pub mod standard;
pub mod streaming;
pub mod text;

use std::path::Path;

use crate::error::Result;

pub use memory::{
    AlertHandler, AlertLevel, BufferPool, MemoryAlert, MemoryMonitor, MemorySample,
    MemorySampler, MonitorConfig, ProcessMemorySampler, ReclaimHook, available_memory,
    estimate_memory, estimate_memory_for_size, should_process_in_memory,
};
pub use models::*;
pub use standard::StandardDocument;
pub use streaming::StreamingDocument;
pub use text::{escape_xml, replace_in_xml};

/// Operations every open document supports.
///
/// Once `close` has been called every other operation fails with
/// `DocumentError::Closed`; `close` itself may be called any number of times.
pub trait Document: Send {
    fn kind(&self) -> DocumentKind;

    fn path(&self) -> &Path;

    /// Paragraphs of a word-processing body, or the text of each slide.
    fn get_text(&mut self) -> Result<Vec<TextSegment>>;

    /// Replace every occurrence of `old` inside text nodes.
    ///
    /// Returns the number of occurrences replaced; zero is not an error.
    fn replace_text(&mut self, old: &str, new: &str) -> Result<usize>;

    /// Apply `(old, new)` pairs in order and return the total count.
    ///
    /// The streaming engine writes all of them in a single swap, so a failure
    /// leaves the file as it was.
    fn replace_all(&mut self, pairs: &[(&str, &str)]) -> Result<usize> {
        let mut total = 0;
        for (old, new) in pairs {
            total += self.replace_text(old, new)?;
        }
        Ok(total)
    }

    /// Persist to the path the document was opened from.
    fn save(&mut self) -> Result<()>;

    /// Persist to `path`, creating parent directories as needed.
    fn save_as(&mut self, path: &Path) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn is_modified(&self) -> bool;

    fn is_closed(&self) -> bool;
}

/// Open a document with the in-memory engine, picking the kind by extension.
pub fn open(path: &Path) -> Result<Box<dyn Document>> {
    Ok(Box::new(StandardDocument::open(path)?))
}

/// Open a document with an explicit engine.
pub fn open_with(
    path: &Path,
    engine: Engine,
    options: StreamingOptions,
) -> Result<Box<dyn Document>> {
    match engine {
        Engine::Standard => Ok(Box::new(StandardDocument::open(path)?)),
        Engine::Streaming => Ok(Box::new(StreamingDocument::open(path, options)?)),
    }
}
