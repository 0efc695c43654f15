//! Replacement orchestration
//!
//! `Replacer` applies a rule list to a single document or to every supported
//! document under a directory. The engine is chosen per file from its size:
//! inputs below the streaming threshold are rewritten in memory, larger ones
//! are streamed. A failure in one file is recorded in that file's result and
//! never stops a directory run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::results::{BatchSummary, ReplaceResult};
use super::rule::{validate_rules, Rule};
use super::walk::find_documents;
use crate::document::{
    format_bytes, BufferPool, Document, DocumentKind, Engine, MemoryMonitor, MonitorConfig,
    StandardDocument, StreamingDocument, StreamingOptions, DEFAULT_STREAMING_THRESHOLD, MB,
};
use crate::error::ReplaceError;

/// How a `Replacer` picks engines and workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceOptions {
    /// Files at or above this size use the streaming engine
    pub streaming_threshold: u64,
    /// Stream every file regardless of size
    pub force_streaming: bool,
    /// Concurrent workers; 0 means host parallelism
    pub max_workers: usize,
    /// Sample process memory while a run is in progress
    pub enable_monitor: bool,
    /// Explicit monitor thresholds; derived from the streaming threshold when absent
    pub monitor: Option<MonitorConfig>,
}

impl Default for ReplaceOptions {
    fn default() -> Self {
        ReplaceOptions {
            streaming_threshold: DEFAULT_STREAMING_THRESHOLD,
            force_streaming: false,
            max_workers: 0,
            enable_monitor: false,
            monitor: None,
        }
    }
}

impl ReplaceOptions {
    pub fn engine_for(&self, file_size: u64) -> Engine {
        if self.force_streaming {
            Engine::Streaming
        } else {
            Engine::for_size(file_size, self.streaming_threshold)
        }
    }

    /// Monitor settings for a run, if monitoring is on.
    pub fn monitor_config(&self) -> Option<MonitorConfig> {
        if let Some(config) = self.monitor {
            return Some(config);
        }
        self.enable_monitor.then(|| MonitorConfig {
            warning_threshold: self.streaming_threshold.saturating_mul(5),
            critical_threshold: self.streaming_threshold.saturating_mul(10),
            check_interval: Duration::from_secs(1),
        })
    }

    /// Worker count with 0 resolved to host parallelism.
    pub fn worker_count(&self) -> usize {
        match self.max_workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
    }
}

/// Suggested options for processing `path`, based on its size.
pub fn recommended_options(path: &Path) -> std::io::Result<ReplaceOptions> {
    let size = std::fs::metadata(path)?.len();
    let defaults = ReplaceOptions::default();
    Ok(match size {
        s if s < MB => defaults,
        s if s < 10 * MB => ReplaceOptions {
            enable_monitor: true,
            ..defaults
        },
        s if s < 50 * MB => ReplaceOptions {
            streaming_threshold: 5 * MB,
            enable_monitor: true,
            ..defaults
        },
        _ => ReplaceOptions {
            streaming_threshold: MB,
            enable_monitor: true,
            ..defaults
        },
    })
}

/// Applies rule lists to documents.
///
/// Clones share one buffer pool per chunk size, so a concurrent run reuses
/// buffers across workers and a critical memory alert can drain them all at
/// once.
#[derive(Clone)]
pub struct Replacer {
    options: ReplaceOptions,
    pools: Arc<Mutex<HashMap<usize, Arc<BufferPool>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for Replacer {
    fn default() -> Self {
        Self::new(ReplaceOptions::default())
    }
}

impl Replacer {
    pub fn new(options: ReplaceOptions) -> Self {
        Replacer {
            options,
            pools: Arc::default(),
        }
    }

    pub fn options(&self) -> &ReplaceOptions {
        &self.options
    }

    /// The shared pool handing out buffers of `chunk_size` bytes.
    pub fn pool_for(&self, chunk_size: usize) -> Arc<BufferPool> {
        let mut pools = lock(&self.pools);
        let pool = pools
            .entry(chunk_size)
            .or_insert_with(|| Arc::new(BufferPool::new(chunk_size)));
        Arc::clone(pool)
    }

    /// Start a monitor for one run when monitoring is enabled.
    pub(crate) fn start_monitor(&self) -> Option<MemoryMonitor> {
        let config = self.options.monitor_config()?;
        let monitor = MemoryMonitor::new(config);
        let pools = Arc::clone(&self.pools);
        monitor.add_reclaim_hook(Arc::new(move || {
            lock(&pools).values().for_each(|pool| pool.clear());
        }));
        monitor.start();
        Some(monitor)
    }

    /// Apply every rule to one document and save it if anything changed.
    ///
    /// Returns the number of occurrences replaced.
    pub fn apply_rules(&self, path: &Path, rules: &[Rule]) -> Result<usize, ReplaceError> {
        validate_rules(rules)?;
        let monitor = self.start_monitor();
        let result = self.apply_validated(path, rules);
        if let Some(monitor) = monitor {
            monitor.stop();
            let stats = monitor.stats();
            debug!(
                "Memory during {}: peak {}, average {}",
                path.display(),
                format_bytes(stats.peak_usage),
                format_bytes(stats.moving_average)
            );
        }
        result
    }

    fn apply_validated(&self, path: &Path, rules: &[Rule]) -> Result<usize, ReplaceError> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReplaceError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ReplaceError::document(path, e.into())),
        };
        if DocumentKind::from_path(path).is_none() {
            return Err(ReplaceError::UnsupportedType(path.to_path_buf()));
        }

        let size = metadata.len();
        let engine = self.options.engine_for(size);
        debug!(
            "Processing {} ({}) with the {:?} engine",
            path.display(),
            format_bytes(size),
            engine
        );

        let mut document: Box<dyn Document> = match engine {
            Engine::Standard => Box::new(
                StandardDocument::open(path).map_err(|e| ReplaceError::document(path, e))?,
            ),
            Engine::Streaming => {
                let options = StreamingOptions::adaptive(size);
                Box::new(
                    StreamingDocument::open(path, options)
                        .map_err(|e| ReplaceError::document(path, e))?
                        .with_pool(self.pool_for(options.chunk_size)),
                )
            }
        };

        let outcome = apply_to_document(document.as_mut(), rules);
        let closed = document.close();
        let total = outcome.map_err(|e| ReplaceError::document(path, e))?;
        closed.map_err(|e| ReplaceError::document(path, e))?;
        Ok(total)
    }

    /// Process one file, capturing any error in the result.
    pub fn replace_in_file(&self, path: &Path, rules: &[Rule]) -> ReplaceResult {
        let result = self.apply_rules(path, rules);
        to_result(path.to_path_buf(), result)
    }

    /// Process every supported document under `dir`.
    ///
    /// Rules are validated before any file is opened. Results follow
    /// traversal order.
    pub fn replace_in_directory(
        &self,
        dir: &Path,
        rules: &[Rule],
        recursive: bool,
        exclude: Option<&str>,
    ) -> Result<Vec<ReplaceResult>, ReplaceError> {
        validate_rules(rules)?;
        let paths = find_documents(dir, recursive, exclude)?;
        info!("Processing {} documents in {}", paths.len(), dir.display());

        let monitor = self.start_monitor();
        let results: Vec<ReplaceResult> = paths
            .into_iter()
            .map(|path| {
                let result = self.apply_validated(&path, rules);
                to_result(path, result)
            })
            .collect();
        if let Some(monitor) = monitor {
            monitor.stop();
        }

        log_summary(dir, &results);
        Ok(results)
    }

    /// Process one already-validated file on a worker.
    pub(crate) fn process_file(&self, path: PathBuf, rules: &[Rule]) -> ReplaceResult {
        let result = self.apply_validated(&path, rules);
        to_result(path, result)
    }
}

fn apply_to_document(
    document: &mut dyn Document,
    rules: &[Rule],
) -> crate::error::Result<usize> {
    let pairs: Vec<(&str, &str)> = rules
        .iter()
        .map(|rule| (rule.old.as_str(), rule.new.as_str()))
        .collect();
    let total = document.replace_all(&pairs)?;
    debug!(
        "{}: {} rules, {} replacements",
        document.path().display(),
        pairs.len(),
        total
    );
    if total > 0 {
        document.save()?;
    }
    Ok(total)
}

fn to_result(path: PathBuf, result: Result<usize, ReplaceError>) -> ReplaceResult {
    match result {
        Ok(count) => {
            info!("{}: {} replacements", path.display(), count);
            ReplaceResult::succeeded(path, count)
        }
        Err(e) => {
            warn!("{}", e);
            ReplaceResult::failed(path, e)
        }
    }
}

pub(crate) fn log_summary(dir: &Path, results: &[ReplaceResult]) {
    let summary = BatchSummary::from_results(results);
    info!(
        "Finished {}: {} files, {} failed, {} replacements",
        dir.display(),
        summary.total_files,
        summary.failed,
        summary.total_replacements
    );
}
