//! Container access and persistence
//!
//! This module handles path validation, opening the zip container, locating
//! the text-bearing parts, copying untouched entries, and the temp-file-then-
//! rename save used by both engines.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::models::DocumentKind;
use crate::error::{DocumentError, Result};

pub(crate) type Archive = ZipArchive<BufReader<File>>;
pub(crate) type ArchiveWriter = ZipWriter<BufWriter<File>>;

static SLIDE_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap());

/// A text-bearing XML part of the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TextPart {
    pub(crate) name: String,
    /// 1-based slide number, or 1 for the word-processing body
    pub(crate) number: u32,
}

/// Check that `path` exists and carries the extension of `kind`.
///
/// When `kind` is `None` the kind is taken from the extension.
pub(crate) fn validate_document_path(
    path: &Path,
    kind: Option<DocumentKind>,
) -> Result<DocumentKind> {
    if !path.exists() {
        return Err(DocumentError::NotFound(path.to_path_buf()));
    }

    match (kind, DocumentKind::from_path(path)) {
        (Some(expected), Some(found)) if expected == found => Ok(found),
        (Some(expected), _) => Err(DocumentError::WrongExtension {
            path: path.to_path_buf(),
            expected: expected.extension(),
        }),
        (None, Some(found)) => Ok(found),
        (None, None) => Err(DocumentError::WrongExtension {
            path: path.to_path_buf(),
            expected: "docx or .pptx",
        }),
    }
}

/// Check an output path for `save_as` and create its parent directories.
pub(crate) fn prepare_output_path(path: &Path, kind: DocumentKind) -> Result<()> {
    if !kind.matches_extension(path) {
        return Err(DocumentError::WrongExtension {
            path: path.to_path_buf(),
            expected: kind.extension(),
        });
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Open the zip container and make sure it is the expected kind of document.
pub(crate) fn open_archive(path: &Path, kind: DocumentKind) -> Result<Archive> {
    let file = File::open(path)?;
    let archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| DocumentError::invalid_container(path, e))?;

    let required = kind.required_part();
    if !archive.file_names().any(|name| name == required) {
        // A spreadsheet renamed to .docx is a common mistake worth naming
        let reason = if archive.file_names().any(|name| name == "xl/workbook.xml") {
            format!("missing {required} (this appears to be an Excel workbook)")
        } else {
            format!("missing {required}")
        };
        return Err(DocumentError::invalid_container(path, reason));
    }

    Ok(archive)
}

/// List the text-bearing parts of an archive, slides in ascending order.
pub(crate) fn text_parts(archive: &Archive, kind: DocumentKind) -> Vec<TextPart> {
    match kind {
        DocumentKind::Word => vec![TextPart {
            name: kind.required_part().to_string(),
            number: 1,
        }],
        DocumentKind::Presentation => {
            let mut slides: Vec<TextPart> = archive
                .file_names()
                .filter_map(|name| {
                    let number = SLIDE_PART.captures(name)?.get(1)?.as_str().parse().ok()?;
                    Some(TextPart {
                        name: name.to_string(),
                        number,
                    })
                })
                .collect();
            slides.sort_by_key(|part| part.number);
            slides
        }
    }
}

/// Read one entry fully into a string.
pub(crate) fn read_part(archive: &mut Archive, name: &str) -> Result<String> {
    let mut entry = archive.by_name(name)?;
    let mut content = String::with_capacity(entry.size() as usize);
    entry.read_to_string(&mut content)?;
    Ok(content)
}

pub(crate) fn deflated() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Copy entry `index` into `writer` without touching its content.
///
/// Stored and deflated entries are copied as raw compressed bytes. Anything
/// else is decompressed and written deflated so every reader can open it.
pub(crate) fn copy_entry(
    archive: &mut Archive,
    index: usize,
    writer: &mut ArchiveWriter,
    buffer: &mut [u8],
) -> Result<()> {
    let method = archive.by_index_raw(index)?.compression();
    match method {
        CompressionMethod::Stored | CompressionMethod::Deflated => {
            let entry = archive.by_index_raw(index)?;
            writer.raw_copy_file(entry)?;
        }
        other => {
            let mut entry = archive.by_index(index)?;
            debug!(
                "Normalizing {} from {:?} to Deflated",
                entry.name(),
                other
            );
            writer.start_file(entry.name().to_string(), deflated())?;
            copy_with_buffer(&mut entry, writer, buffer)?;
        }
    }
    Ok(())
}

/// `io::copy` through a caller-provided buffer.
pub(crate) fn copy_with_buffer<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    buffer: &mut [u8],
) -> Result<u64> {
    let mut copied = 0u64;
    loop {
        let n = reader.read(buffer)?;
        if n == 0 {
            return Ok(copied);
        }
        writer.write_all(&buffer[..n])?;
        copied += n as u64;
    }
}

/// A fully written archive waiting to be renamed over its target.
///
/// Dropping it without calling `persist` deletes the temporary file.
pub(crate) struct StagedArchive {
    temp: NamedTempFile,
}

impl StagedArchive {
    /// Rename the staged archive over `target`.
    pub(crate) fn persist(self, target: &Path) -> Result<()> {
        if let Ok(metadata) = fs::metadata(target) {
            fs::set_permissions(self.temp.path(), metadata.permissions())?;
        }

        self.temp
            .persist(target)
            .map_err(|e| DocumentError::Persist {
                path: target.to_path_buf(),
                source: e.error,
            })?;

        debug!("Persisted {}", target.display());
        Ok(())
    }
}

/// Write a complete archive to a temporary file in `target`'s directory.
///
/// Same-directory staging keeps the later rename atomic.
pub(crate) fn stage_archive<F>(target: &Path, build: F) -> Result<StagedArchive>
where
    F: FnOnce(&mut ArchiveWriter) -> Result<()>,
{
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let temp = tempfile::Builder::new()
        .prefix(".ooxml-replace-")
        .suffix(".tmp")
        .tempfile_in(&dir)?;

    let mut zip = ZipWriter::new(BufWriter::new(temp.as_file().try_clone()?));
    build(&mut zip)?;
    let mut writer = zip.finish()?;
    writer.flush()?;
    writer.get_ref().sync_all()?;

    Ok(StagedArchive { temp })
}

/// Stage a new archive and rename it into place in one step.
pub(crate) fn write_atomically<F>(target: &Path, build: F) -> Result<()>
where
    F: FnOnce(&mut ArchiveWriter) -> Result<()>,
{
    stage_archive(target, build)?.persist(target)
}
