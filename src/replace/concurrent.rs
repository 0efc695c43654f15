//! Bounded concurrent directory runs
//!
//! Each file is one unit of work, run on the blocking pool behind a
//! semaphore sized to the worker count. Results are collected by the file's
//! traversal index, so output order never depends on completion order.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use super::replacer::{log_summary, Replacer};
use super::results::ReplaceResult;
use super::rule::{validate_rules, Rule};
use super::walk::find_documents;
use crate::error::ReplaceError;

impl Replacer {
    /// Concurrent form of `replace_in_directory`.
    ///
    /// At most `worker_count()` files are open at any time.
    pub async fn replace_in_directory_concurrent(
        &self,
        dir: &Path,
        rules: &[Rule],
        recursive: bool,
        exclude: Option<&str>,
    ) -> Result<Vec<ReplaceResult>, ReplaceError> {
        validate_rules(rules)?;
        let paths = find_documents(dir, recursive, exclude)?;
        let workers = self.options().worker_count();
        info!(
            "Processing {} documents in {} with {} workers",
            paths.len(),
            dir.display(),
            workers
        );

        let monitor = self.start_monitor();
        let semaphore = Arc::new(Semaphore::new(workers));
        let rules: Arc<[Rule]> = rules.into();

        let handles: Vec<_> = paths
            .iter()
            .cloned()
            .map(|path| {
                let semaphore = Arc::clone(&semaphore);
                let replacer = self.clone();
                let rules = Arc::clone(&rules);
                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| ReplaceError::Worker(e.to_string()))?;
                    debug!("Worker picked up {}", path.display());
                    tokio::task::spawn_blocking(move || replacer.process_file(path, &rules))
                        .await
                        .map_err(|e| ReplaceError::Worker(e.to_string()))
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (path, handle) in paths.into_iter().zip(handles) {
            let result = match handle.await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    error!("Worker for {} failed: {}", path.display(), e);
                    ReplaceResult::failed(path, e)
                }
                Err(e) => {
                    error!("Worker for {} crashed: {}", path.display(), e);
                    ReplaceResult::failed(path, ReplaceError::Worker(e.to_string()))
                }
            };
            results.push(result);
        }

        if let Some(monitor) = monitor {
            monitor.stop();
        }

        log_summary(dir, &results);
        Ok(results)
    }
}
