//! Token-streaming document engine
//!
//! Text parts are never materialized. A replacement pulls XML tokens from the
//! compressed entry, rewrites character data inside text elements, and pushes
//! each token straight into a new archive. The new archive is renamed over
//! the original and the handle reopens it.
//!
//! Tracked memory is the size of the largest token held in flight, so it stays
//! bounded no matter how large the document is.

use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::container::{
    self, copy_entry, deflated, open_archive, prepare_output_path, text_parts,
    validate_document_path, Archive, TextPart,
};
use super::memory::BufferPool;
use super::models::{DocumentKind, StreamingOptions, TextSegment};
use super::text::{collect_text, replace_decoded};
use super::Document;
use crate::error::{DocumentError, Result};

/// A document rewritten through a token stream.
pub struct StreamingDocument {
    path: PathBuf,
    kind: DocumentKind,
    options: StreamingOptions,
    // `None` once closed
    archive: Option<Archive>,
    pool: Option<Arc<BufferPool>>,
    memory_usage: u64,
    modified: bool,
}

impl StreamingDocument {
    /// Open a `.docx` or `.pptx`, choosing the kind from the extension.
    pub fn open(path: &Path, options: StreamingOptions) -> Result<Self> {
        let kind = validate_document_path(path, None)?;
        let archive = open_archive(path, kind)?;

        let pool = options
            .enable_memory_pool
            .then(|| Arc::new(BufferPool::new(options.chunk_size)));

        debug!(
            "Opened {} for streaming ({}, chunk {} bytes)",
            path.display(),
            kind,
            options.chunk_size
        );

        Ok(StreamingDocument {
            path: path.to_path_buf(),
            kind,
            options,
            archive: Some(archive),
            pool,
            memory_usage: 0,
            modified: false,
        })
    }

    /// Draw buffers from a pool shared with other documents.
    ///
    /// Has no effect when the options disable pooling, or when the pool hands
    /// out buffers of a different size than the configured chunk size.
    pub fn with_pool(mut self, pool: Arc<BufferPool>) -> Self {
        if !self.options.enable_memory_pool {
            return self;
        }
        if pool.buffer_size() != self.options.chunk_size {
            debug!(
                "Keeping own pool: shared buffers are {} bytes, chunk is {}",
                pool.buffer_size(),
                self.options.chunk_size
            );
            return self;
        }
        self.pool = Some(pool);
        self
    }

    pub fn options(&self) -> StreamingOptions {
        self.options
    }

    /// Largest token held in flight during the last operation, in bytes.
    pub fn memory_usage(&self) -> u64 {
        self.memory_usage
    }

    fn archive(&mut self) -> Result<&mut Archive> {
        self.archive.as_mut().ok_or(DocumentError::Closed)
    }

    fn parts(&mut self) -> Result<Vec<TextPart>> {
        let kind = self.kind;
        Ok(text_parts(self.archive()?, kind))
    }

    fn take_buffer(&self) -> Vec<u8> {
        match &self.pool {
            Some(pool) => pool.get(),
            None => vec![0; self.options.chunk_size],
        }
    }

    fn return_buffer(&self, buffer: Vec<u8>) {
        if let Some(pool) = &self.pool {
            pool.put(buffer);
        }
    }

    pub fn slide_count(&mut self) -> Result<usize> {
        Ok(self.slide_numbers()?.len())
    }

    /// Slide numbers in ascending order; empty for word-processing documents.
    pub fn slide_numbers(&mut self) -> Result<Vec<u32>> {
        if self.kind == DocumentKind::Word {
            self.archive()?;
            return Ok(Vec::new());
        }
        Ok(self.parts()?.into_iter().map(|part| part.number).collect())
    }

    /// Feed the document's text to `processor` in bounded chunks.
    ///
    /// A chunk is flushed at the end of every text element, or earlier once
    /// it grows past the configured chunk size. The first argument is the
    /// part number (the slide number for presentations).
    pub fn process_text_chunked<F>(&mut self, mut processor: F) -> Result<()>
    where
        F: FnMut(u32, &str) -> Result<()>,
    {
        let parts = self.parts()?;
        let kind = self.kind;
        let chunk_size = self.options.chunk_size;
        let mut buffer = self.take_buffer();

        let result = (|| -> Result<()> {
            let archive = self.archive.as_mut().ok_or(DocumentError::Closed)?;
            for part in &parts {
                let entry = archive.by_name(&part.name)?;
                let input = BufReader::with_capacity(chunk_size, entry);
                chunk_text(input, kind, chunk_size, &mut buffer, |chunk| {
                    processor(part.number, chunk)
                })?;
            }
            Ok(())
        })();

        self.return_buffer(buffer);
        result
    }

    /// Stream every `(old, new)` pair through the parts in one pass and
    /// atomically swap in the result.
    ///
    /// Pairs are applied in order to each text node, so the outcome matches
    /// applying them one at a time. Either all of them reach disk or none do.
    fn rewrite(&mut self, pairs: &[(&str, &str)]) -> Result<usize> {
        let parts = self.parts()?;
        let kind = self.kind;
        let options = self.options;
        let mut event_buffer = self.take_buffer();
        let mut copy_buffer = self.take_buffer();
        let mut in_flight = 0u64;

        let result = (|| -> Result<Option<(container::StagedArchive, usize)>> {
            let archive = self.archive.as_mut().ok_or(DocumentError::Closed)?;

            // Read-only pass so parts without a match are copied byte for byte
            let mut matching = HashSet::new();
            for part in &parts {
                let entry = archive.by_name(&part.name)?;
                let input = BufReader::with_capacity(options.chunk_size, entry);
                if part_contains(input, kind, pairs, &mut event_buffer, &options, &mut in_flight)? {
                    matching.insert(part.name.clone());
                }
            }
            if matching.is_empty() {
                return Ok(None);
            }

            let mut total = 0;
            let staged = container::stage_archive(&self.path, |zip| {
                for index in 0..archive.len() {
                    let name = archive.by_index_raw(index)?.name().to_string();
                    if !matching.contains(&name) {
                        copy_entry(archive, index, zip, &mut copy_buffer)?;
                        continue;
                    }

                    let entry = archive.by_index(index)?;
                    let input = BufReader::with_capacity(options.chunk_size, entry);
                    zip.start_file(name.as_str(), deflated())?;
                    let count = rewrite_part(
                        input,
                        &mut *zip,
                        kind,
                        pairs,
                        &mut event_buffer,
                        &options,
                        &mut in_flight,
                    )?;
                    debug!("{}: {} replacements", name, count);
                    total += count;
                }
                Ok(())
            })?;
            Ok(Some((staged, total)))
        })();

        self.memory_usage = in_flight;
        self.return_buffer(event_buffer);
        self.return_buffer(copy_buffer);

        let Some((staged, total)) = result? else {
            return Ok(0);
        };

        // Release the source before the swap, then reopen whichever file is in place
        self.archive = None;
        let persisted = staged.persist(&self.path);
        self.archive = Some(open_archive(&self.path, kind)?);
        persisted?;

        self.modified = true;
        info!(
            "Rewrote {} by streaming ({} replacements)",
            self.path.display(),
            total
        );
        Ok(total)
    }
}

impl Document for StreamingDocument {
    fn kind(&self) -> DocumentKind {
        self.kind
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn get_text(&mut self) -> Result<Vec<TextSegment>> {
        let parts = self.parts()?;
        let kind = self.kind;
        let chunk_size = self.options.chunk_size;
        let archive = self.archive()?;

        let mut segments = Vec::new();
        for part in parts {
            let entry = archive.by_name(&part.name)?;
            let collected = collect_text(BufReader::with_capacity(chunk_size, entry), kind)?;
            match kind {
                DocumentKind::Word => {
                    segments.extend(collected.paragraphs.into_iter().map(TextSegment::Paragraph));
                }
                DocumentKind::Presentation => {
                    if !collected.runs.is_empty() {
                        segments.push(TextSegment::Slide {
                            number: part.number,
                            text: collected.runs.join("\n"),
                        });
                    }
                }
            }
        }
        Ok(segments)
    }

    fn replace_text(&mut self, old: &str, new: &str) -> Result<usize> {
        self.replace_all(&[(old, new)])
    }

    fn replace_all(&mut self, pairs: &[(&str, &str)]) -> Result<usize> {
        self.archive()?;
        if pairs.iter().any(|(old, _)| old.is_empty()) {
            return Err(DocumentError::EmptySearch);
        }
        if pairs.is_empty() {
            return Ok(0);
        }
        self.rewrite(pairs)
    }

    /// Replacements are persisted as they happen, so this only checks the handle.
    fn save(&mut self) -> Result<()> {
        self.archive()?;
        Ok(())
    }

    fn save_as(&mut self, path: &Path) -> Result<()> {
        self.archive()?;
        prepare_output_path(path, self.kind)?;
        if path == self.path.as_path() {
            return Ok(());
        }

        let mut buffer = self.take_buffer();
        let result = (|| -> Result<()> {
            let archive = self.archive.as_mut().ok_or(DocumentError::Closed)?;
            container::write_atomically(path, |zip| {
                for index in 0..archive.len() {
                    copy_entry(archive, index, zip, &mut buffer)?;
                }
                Ok(())
            })
        })();
        self.return_buffer(buffer);
        result?;

        info!("Saved {}", path.display());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.archive.take().is_some() {
            if let Some(pool) = &self.pool {
                debug!("Closing {} ({} pooled buffers)", self.path.display(), pool.pooled());
            }
            self.pool = None;
        }
        Ok(())
    }

    fn is_modified(&self) -> bool {
        self.modified
    }

    fn is_closed(&self) -> bool {
        self.archive.is_none()
    }
}

fn track(event_len: usize, options: &StreamingOptions, in_flight: &mut u64) -> Result<()> {
    let used = event_len as u64;
    if used > options.max_memory {
        return Err(DocumentError::MemoryLimitExceeded {
            used,
            limit: options.max_memory,
        });
    }
    *in_flight = (*in_flight).max(used);
    Ok(())
}

/// Whether any text element of the part contains one of the search strings.
///
/// A part with none of them cannot match a later pair either, since every
/// replacement starts from a match.
fn part_contains<R: BufRead>(
    input: R,
    kind: DocumentKind,
    pairs: &[(&str, &str)],
    buffer: &mut Vec<u8>,
    options: &StreamingOptions,
    in_flight: &mut u64,
) -> Result<bool> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(false);
    let text_element = kind.text_element();
    let mut in_text = false;

    loop {
        buffer.clear();
        let event = reader.read_event_into(buffer)?;
        track(event.len(), options, in_flight)?;
        match &event {
            Event::Start(e) if e.name().as_ref() == text_element => in_text = true,
            Event::End(e) if e.name().as_ref() == text_element => in_text = false,
            Event::Text(e) if in_text => {
                let decoded = e.unescape()?;
                if pairs.iter().any(|(old, _)| decoded.contains(old)) {
                    return Ok(true);
                }
            }
            Event::Eof => return Ok(false),
            _ => {}
        }
    }
}

/// Copy a part token by token, rewriting text inside text elements.
#[allow(clippy::too_many_arguments)]
fn rewrite_part<R: BufRead, W: Write>(
    input: R,
    output: W,
    kind: DocumentKind,
    pairs: &[(&str, &str)],
    buffer: &mut Vec<u8>,
    options: &StreamingOptions,
    in_flight: &mut u64,
) -> Result<usize> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(output);
    let text_element = kind.text_element();
    let mut in_text = false;
    let mut count = 0;

    loop {
        buffer.clear();
        let event = reader.read_event_into(buffer)?;
        track(event.len(), options, in_flight)?;
        match &event {
            Event::Start(e) if e.name().as_ref() == text_element => in_text = true,
            Event::End(e) if e.name().as_ref() == text_element => in_text = false,
            Event::Text(e) if in_text => {
                let mut text = e.unescape()?.into_owned();
                let mut replaced_here = 0;
                for (old, new) in pairs {
                    if let Some((replaced, n)) = replace_decoded(&text, old, new) {
                        text = replaced;
                        replaced_here += n;
                    }
                }
                if replaced_here > 0 {
                    count += replaced_here;
                    let rewritten = BytesText::new(&text);
                    track(rewritten.len(), options, in_flight)?;
                    writer.write_event(Event::Text(rewritten))?;
                    continue;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        writer.write_event(event)?;
    }

    writer.into_inner().flush()?;
    Ok(count)
}

/// Stream the text of one part to `emit` in chunks of about `chunk_size` bytes.
fn chunk_text<R: BufRead, F>(
    input: R,
    kind: DocumentKind,
    chunk_size: usize,
    buffer: &mut Vec<u8>,
    mut emit: F,
) -> Result<()>
where
    F: FnMut(&str) -> Result<()>,
{
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(false);
    let text_element = kind.text_element();
    let mut in_text = false;
    let mut current = String::new();

    loop {
        buffer.clear();
        match reader.read_event_into(buffer)? {
            Event::Start(ref e) if e.name().as_ref() == text_element => in_text = true,
            Event::End(ref e) if e.name().as_ref() == text_element => {
                in_text = false;
                if !current.is_empty() {
                    emit(&current)?;
                    current.clear();
                }
            }
            Event::Text(ref e) if in_text => current.push_str(&e.unescape()?),
            Event::Eof => break,
            _ => {}
        }

        if current.len() > chunk_size {
            emit(&current)?;
            current.clear();
        }
    }

    if !current.is_empty() {
        emit(&current)?;
    }
    Ok(())
}
