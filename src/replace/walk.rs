//! Directory traversal for batch runs

use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::document::DocumentKind;
use crate::error::ReplaceError;

/// Collect supported documents under `dir` in traversal order.
///
/// `exclude` is a glob matched against the base name of each file.
/// Directory names are never matched, so every subdirectory is walked.
pub fn find_documents(
    dir: &Path,
    recursive: bool,
    exclude: Option<&str>,
) -> Result<Vec<PathBuf>, ReplaceError> {
    if !dir.exists() {
        return Err(ReplaceError::NotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(ReplaceError::NotADirectory(dir.to_path_buf()));
    }

    let exclude = exclude.map(Pattern::new).transpose()?;
    let is_excluded = |entry: &DirEntry| {
        exclude
            .as_ref()
            .is_some_and(|pattern| pattern.matches(&entry.file_name().to_string_lossy()))
    };

    let walker = WalkDir::new(dir)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();

    let mut documents = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() || is_excluded(&entry) {
            continue;
        }
        if DocumentKind::from_path(entry.path()).is_some() {
            documents.push(entry.into_path());
        }
    }

    debug!(
        "Found {} documents in {}",
        documents.len(),
        dir.display()
    );
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    fn names(dir: &Path, paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.strip_prefix(dir).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_top_level_only() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "a.docx");
        touch(temp.path(), "b.PPTX");
        touch(temp.path(), "notes.txt");
        touch(temp.path(), "nested/c.docx");

        let found = find_documents(temp.path(), false, None).unwrap();
        assert_eq!(names(temp.path(), &found), vec!["a.docx", "b.PPTX"]);
    }

    #[test]
    fn test_recursive() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "a.docx");
        touch(temp.path(), "nested/c.docx");
        touch(temp.path(), "nested/deeper/d.pptx");

        let found = find_documents(temp.path(), true, None).unwrap();
        assert_eq!(
            names(temp.path(), &found),
            vec!["a.docx", "nested/c.docx", "nested/deeper/d.pptx"]
        );
    }

    #[test]
    fn test_exclude_matches_file_name() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "report.docx");
        touch(temp.path(), "~$report.docx");
        touch(temp.path(), "archive/old.docx");

        let found = find_documents(temp.path(), true, Some("~$*")).unwrap();
        assert_eq!(names(temp.path(), &found), vec!["archive/old.docx", "report.docx"]);

        let found = find_documents(temp.path(), true, Some("archive")).unwrap();
        assert_eq!(
            names(temp.path(), &found),
            vec!["archive/old.docx", "report.docx", "~$report.docx"]
        );
    }

    #[test]
    fn test_exclude_ignores_directory_names() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "drafts/report.docx");
        touch(temp.path(), "draft-old.docx");

        let found = find_documents(temp.path(), true, Some("draft*")).unwrap();
        assert_eq!(names(temp.path(), &found), vec!["drafts/report.docx"]);
    }

    #[test]
    fn test_invalid_pattern() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            find_documents(temp.path(), false, Some("[")),
            Err(ReplaceError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_missing_and_non_directory() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            find_documents(&temp.path().join("missing"), false, None),
            Err(ReplaceError::NotFound(_))
        ));

        touch(temp.path(), "file.docx");
        assert!(matches!(
            find_documents(&temp.path().join("file.docx"), false, None),
            Err(ReplaceError::NotADirectory(_))
        ));
    }
}
