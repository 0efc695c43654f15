//! Memory monitoring and buffer reuse
//!
//! `MemoryMonitor` samples process memory on its own thread, keeps peak and
//! average figures, and raises alerts when usage crosses the configured
//! thresholds. `BufferPool` hands out fixed-size buffers to the streaming
//! engine; a critical alert drains it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

use super::models::{format_bytes, GB, MB, XML_EXPANSION_FACTOR};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Source of memory readings, in bytes.
pub trait MemorySampler: Send {
    fn sample(&mut self) -> u64;
}

/// Resident memory of the current process, read through `sysinfo`.
pub struct ProcessMemorySampler {
    system: System,
    pid: Option<Pid>,
}

impl ProcessMemorySampler {
    pub fn new() -> Self {
        ProcessMemorySampler {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for ProcessMemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for ProcessMemorySampler {
    fn sample(&mut self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system
            .process(pid)
            .map(|process| process.memory())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Warning => write!(f, "WARNING"),
            AlertLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Raised when a sample crosses a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryAlert {
    pub level: AlertLevel,
    pub usage: u64,
    pub limit: u64,
}

impl fmt::Display for MemoryAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let percent = if self.limit == 0 {
            0.0
        } else {
            self.usage as f64 / self.limit as f64 * 100.0
        };
        write!(
            f,
            "[{}] Memory usage: {} / {} ({:.1}%)",
            self.level,
            format_bytes(self.usage),
            format_bytes(self.limit),
            percent
        )
    }
}

pub type AlertHandler = Arc<dyn Fn(&MemoryAlert) + Send + Sync>;
pub type ReclaimHook = Arc<dyn Fn() + Send + Sync>;

/// Snapshot of the monitor's statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySample {
    pub current_usage: u64,
    pub peak_usage: u64,
    pub moving_average: u64,
    pub samples: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub warning_threshold: u64,
    pub critical_threshold: u64,
    pub check_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            warning_threshold: 500 * MB,
            critical_threshold: GB,
            check_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Default)]
struct Stats {
    current: u64,
    peak: u64,
    total: u128,
    count: u64,
    average: u64,
}

struct Shared {
    config: MonitorConfig,
    stats: Stats,
    alert_handler: AlertHandler,
    reclaim_hooks: Vec<ReclaimHook>,
    sampler: Box<dyn MemorySampler>,
}

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Background sampler of process memory.
///
/// One instance per orchestration run. `start` and `stop` are idempotent and
/// the monitor can be restarted after a stop.
pub struct MemoryMonitor {
    shared: Arc<Mutex<Shared>>,
    worker: Mutex<Option<Worker>>,
}

impl MemoryMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_sampler(config, Box::new(ProcessMemorySampler::new()))
    }

    pub fn with_sampler(config: MonitorConfig, sampler: Box<dyn MemorySampler>) -> Self {
        MemoryMonitor {
            shared: Arc::new(Mutex::new(Shared {
                config,
                stats: Stats::default(),
                alert_handler: Arc::new(|alert: &MemoryAlert| warn!("{alert}")),
                reclaim_hooks: Vec::new(),
                sampler,
            })),
            worker: Mutex::new(None),
        }
    }

    pub fn set_thresholds(&self, warning: u64, critical: u64) {
        let mut shared = lock(&self.shared);
        shared.config.warning_threshold = warning;
        shared.config.critical_threshold = critical;
    }

    pub fn set_alert_handler(&self, handler: AlertHandler) {
        lock(&self.shared).alert_handler = handler;
    }

    /// Register work to run when usage crosses the critical threshold.
    pub fn add_reclaim_hook(&self, hook: ReclaimHook) {
        lock(&self.shared).reclaim_hooks.push(hook);
    }

    pub fn config(&self) -> MonitorConfig {
        lock(&self.shared).config
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker).is_some()
    }

    pub fn start(&self) {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return;
        }

        let (stop, stop_rx) = mpsc::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let interval = lock(&self.shared).config.check_interval;

        let handle = std::thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => check_memory(&shared),
                    _ => break,
                }
            }
        });

        debug!("Memory monitor started ({:?} interval)", interval);
        *worker = Some(Worker { stop, handle });
    }

    pub fn stop(&self) {
        let Some(worker) = lock(&self.worker).take() else {
            return;
        };
        // The thread also exits when the sender is dropped
        let _ = worker.stop.send(());
        if worker.handle.join().is_err() {
            warn!("Memory monitor thread panicked");
        }
        debug!("Memory monitor stopped");
    }

    /// Take one sample immediately, on the caller's thread.
    pub fn check_now(&self) {
        check_memory(&self.shared);
    }

    pub fn stats(&self) -> MemorySample {
        let shared = lock(&self.shared);
        MemorySample {
            current_usage: shared.stats.current,
            peak_usage: shared.stats.peak,
            moving_average: shared.stats.average,
            samples: shared.stats.count,
            timestamp: Utc::now(),
        }
    }

    pub fn reset(&self) {
        lock(&self.shared).stats = Stats::default();
    }
}

impl Drop for MemoryMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn check_memory(shared: &Mutex<Shared>) {
    let (alert, handler, hooks) = {
        let mut shared = lock(shared);
        let usage = shared.sampler.sample();

        let stats = &mut shared.stats;
        stats.current = usage;
        stats.peak = stats.peak.max(usage);
        stats.count += 1;
        stats.total += u128::from(usage);
        stats.average = (stats.total / u128::from(stats.count)) as u64;

        let config = shared.config;
        let alert = if usage > config.critical_threshold {
            Some(MemoryAlert {
                level: AlertLevel::Critical,
                usage,
                limit: config.critical_threshold,
            })
        } else if usage > config.warning_threshold {
            Some(MemoryAlert {
                level: AlertLevel::Warning,
                usage,
                limit: config.warning_threshold,
            })
        } else {
            None
        };

        (
            alert,
            Arc::clone(&shared.alert_handler),
            shared.reclaim_hooks.clone(),
        )
    };

    // Callbacks run without the lock so they may query the monitor
    if let Some(alert) = alert {
        handler(&alert);
        if alert.level == AlertLevel::Critical {
            for hook in &hooks {
                hook();
            }
        }
    }
}

/// Pool of equally sized byte buffers shared between workers.
pub struct BufferPool {
    size: usize,
    max_pooled: usize,
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new(size: usize) -> Self {
        BufferPool {
            size,
            max_pooled: 16,
            buffers: Mutex::new(Vec::new()),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.size
    }

    /// A buffer of exactly `buffer_size()` bytes.
    pub fn get(&self) -> Vec<u8> {
        match lock(&self.buffers).pop() {
            Some(buffer) => buffer,
            None => vec![0; self.size],
        }
    }

    /// Return a buffer; undersized buffers are dropped.
    pub fn put(&self, mut buffer: Vec<u8>) {
        if buffer.capacity() < self.size {
            return;
        }
        buffer.resize(self.size, 0);
        let mut buffers = lock(&self.buffers);
        if buffers.len() < self.max_pooled {
            buffers.push(buffer);
        }
    }

    /// Zero a buffer before returning it.
    pub fn reset(&self, mut buffer: Vec<u8>) {
        buffer.iter_mut().for_each(|byte| *byte = 0);
        self.put(buffer);
    }

    pub fn pooled(&self) -> usize {
        lock(&self.buffers).len()
    }

    /// Release every pooled buffer.
    pub fn clear(&self) {
        let released = std::mem::take(&mut *lock(&self.buffers));
        if !released.is_empty() {
            debug!("Released {} pooled buffers", released.len());
        }
    }
}

/// Predicted decompressed size of a container of `file_size` bytes.
pub fn estimate_memory_for_size(file_size: u64) -> u64 {
    file_size.saturating_mul(XML_EXPANSION_FACTOR)
}

/// Predict memory needed to process `path` without opening it.
pub fn estimate_memory(path: &Path) -> std::io::Result<u64> {
    Ok(estimate_memory_for_size(std::fs::metadata(path)?.len()))
}

/// Available system memory in bytes.
pub fn available_memory() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    system.available_memory()
}

/// Whether the estimate fits in 80% of `available`.
pub fn should_process_in_memory(file_size: u64, available: u64) -> bool {
    estimate_memory_for_size(file_size) < available / 100 * 80
}
