//! Per-file outcomes and batch summaries

use serde::{Serialize, Serializer};
use std::path::PathBuf;

use crate::error::ReplaceError;

/// Outcome of processing one file.
#[derive(Debug, Serialize)]
pub struct ReplaceResult {
    pub file_path: PathBuf,
    pub success: bool,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<ReplaceError>,
    pub replacements_applied: usize,
}

impl ReplaceResult {
    pub fn succeeded(file_path: PathBuf, replacements_applied: usize) -> Self {
        ReplaceResult {
            file_path,
            success: true,
            error: None,
            replacements_applied,
        }
    }

    pub fn failed(file_path: PathBuf, error: ReplaceError) -> Self {
        ReplaceResult {
            file_path,
            success: false,
            error: Some(error),
            replacements_applied: 0,
        }
    }
}

fn serialize_error<S: Serializer>(
    error: &Option<ReplaceError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => serializer.serialize_some(&error.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Totals over a batch of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_replacements: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[ReplaceResult]) -> Self {
        let failed = results.iter().filter(|r| !r.success).count();
        BatchSummary {
            total_files: results.len(),
            succeeded: results.len() - failed,
            failed,
            total_replacements: results.iter().map(|r| r.replacements_applied).sum(),
        }
    }

    /// Turn a batch with any failed file into `PartialBatchFailure`.
    pub fn into_result(self) -> Result<Self, ReplaceError> {
        if self.failed > 0 {
            return Err(ReplaceError::PartialBatchFailure {
                failed: self.failed,
                total: self.total_files,
            });
        }
        Ok(self)
    }
}

/// The results that failed, paired with their errors.
pub fn failures(results: &[ReplaceResult]) -> impl Iterator<Item = (&PathBuf, &ReplaceError)> {
    results
        .iter()
        .filter_map(|r| r.error.as_ref().map(|error| (&r.file_path, error)))
}
