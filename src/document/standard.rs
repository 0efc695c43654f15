//! In-memory document engine
//!
//! Loads every text-bearing part as a string, rewrites text nodes in place and
//! rebuilds the archive on save, substituting only the parts that changed.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::container::{
    self, copy_entry, deflated, open_archive, prepare_output_path, read_part, text_parts,
    validate_document_path, Archive, TextPart,
};
use super::models::{DocumentKind, TextSegment};
use super::text::{collect_text, replace_in_xml};
use super::Document;
use crate::error::{DocumentError, Result};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug)]
struct LoadedPart {
    part: TextPart,
    xml: String,
    modified: bool,
}

/// A document whose text parts are held in memory.
pub struct StandardDocument {
    path: PathBuf,
    kind: DocumentKind,
    // `None` once closed
    archive: Option<Archive>,
    parts: Vec<LoadedPart>,
    modified: bool,
}

impl StandardDocument {
    /// Open a `.docx` or `.pptx`, choosing the kind from the extension.
    pub fn open(path: &Path) -> Result<Self> {
        let kind = validate_document_path(path, None)?;
        Self::open_kind(path, kind)
    }

    /// Open a document that must be of `kind`.
    pub fn open_as(path: &Path, kind: DocumentKind) -> Result<Self> {
        validate_document_path(path, Some(kind))?;
        Self::open_kind(path, kind)
    }

    fn open_kind(path: &Path, kind: DocumentKind) -> Result<Self> {
        let mut archive = open_archive(path, kind)?;
        let parts = load_parts(&mut archive, kind)?;

        debug!(
            "Opened {} ({}, {} text parts)",
            path.display(),
            kind,
            parts.len()
        );

        Ok(StandardDocument {
            path: path.to_path_buf(),
            kind,
            archive: Some(archive),
            parts,
            modified: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.archive.is_none() {
            return Err(DocumentError::Closed);
        }
        Ok(())
    }

    /// Slide numbers in ascending order; empty for word-processing documents.
    pub fn slide_numbers(&self) -> Result<Vec<u32>> {
        self.ensure_open()?;
        Ok(match self.kind {
            DocumentKind::Word => Vec::new(),
            DocumentKind::Presentation => self.parts.iter().map(|p| p.part.number).collect(),
        })
    }

    /// Raw XML of a loaded text part.
    pub fn part_xml(&self, name: &str) -> Result<Option<&str>> {
        self.ensure_open()?;
        Ok(self
            .parts
            .iter()
            .find(|p| p.part.name == name)
            .map(|p| p.xml.as_str()))
    }

    fn write_to(&mut self, target: &Path) -> Result<()> {
        let archive = self.archive.as_mut().ok_or(DocumentError::Closed)?;
        let replaced: HashMap<&str, &str> = self
            .parts
            .iter()
            .filter(|p| p.modified)
            .map(|p| (p.part.name.as_str(), p.xml.as_str()))
            .collect();

        let staged = container::stage_archive(target, |zip| {
            let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
            for index in 0..archive.len() {
                let name = archive.by_index_raw(index)?.name().to_string();
                match replaced.get(name.as_str()) {
                    Some(xml) => {
                        zip.start_file(name.as_str(), deflated())?;
                        zip.write_all(xml.as_bytes())?;
                    }
                    None => copy_entry(archive, index, zip, &mut buffer)?,
                }
            }
            Ok(())
        })?;

        if target == self.path.as_path() {
            // Release the source before swapping it out, then read the new file
            self.archive = None;
            let persisted = staged.persist(target);
            self.archive = Some(open_archive(&self.path, self.kind)?);
            persisted?;
            for part in &mut self.parts {
                part.modified = false;
            }
            self.modified = false;
        } else {
            staged.persist(target)?;
        }

        info!("Saved {}", target.display());
        Ok(())
    }
}

fn load_parts(archive: &mut Archive, kind: DocumentKind) -> Result<Vec<LoadedPart>> {
    text_parts(archive, kind)
        .into_iter()
        .map(|part| {
            let xml = read_part(archive, &part.name)?;
            Ok(LoadedPart {
                part,
                xml,
                modified: false,
            })
        })
        .collect()
}

impl Document for StandardDocument {
    fn kind(&self) -> DocumentKind {
        self.kind
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn get_text(&mut self) -> Result<Vec<TextSegment>> {
        self.ensure_open()?;

        let mut segments = Vec::new();
        for loaded in &self.parts {
            let collected = collect_text(loaded.xml.as_bytes(), self.kind)?;
            match self.kind {
                DocumentKind::Word => {
                    segments.extend(collected.paragraphs.into_iter().map(TextSegment::Paragraph));
                }
                DocumentKind::Presentation => {
                    if !collected.runs.is_empty() {
                        segments.push(TextSegment::Slide {
                            number: loaded.part.number,
                            text: collected.runs.join("\n"),
                        });
                    }
                }
            }
        }
        Ok(segments)
    }

    fn replace_text(&mut self, old: &str, new: &str) -> Result<usize> {
        self.ensure_open()?;
        if old.is_empty() {
            return Err(DocumentError::EmptySearch);
        }

        let mut total = 0;
        for loaded in &mut self.parts {
            let (xml, count) = replace_in_xml(&loaded.xml, self.kind, old, new);
            if count > 0 {
                let xml = xml.into_owned();
                loaded.xml = xml;
                loaded.modified = true;
                total += count;
                debug!("{}: {} replacements", loaded.part.name, count);
            }
        }

        if total > 0 {
            self.modified = true;
        }
        Ok(total)
    }

    fn save(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.modified {
            debug!("No changes to save for {}", self.path.display());
            return Ok(());
        }
        let target = self.path.clone();
        self.write_to(&target)
    }

    fn save_as(&mut self, path: &Path) -> Result<()> {
        self.ensure_open()?;
        prepare_output_path(path, self.kind)?;
        self.write_to(path)
    }

    fn close(&mut self) -> Result<()> {
        if self.archive.take().is_some() {
            self.parts.clear();
            debug!("Closed {}", self.path.display());
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
