// src/assets/cache.rs
// Path-keyed cache of asset bytes with time-based eviction.
// One mutex guards the entry map and the running byte total together.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{debug, info};

use super::AssetError;

#[derive(Debug)]
struct CacheEntry {
    data: Bytes,
    last_access: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<PathBuf, CacheEntry>,
    total_size: u64,
}

/// Outcome of one eviction sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub pruned_entries: usize,
    pub pruned_bytes: u64,
    pub resident_entries_before: usize,
    pub resident_bytes_before: u64,
}

#[derive(Clone)]
pub struct AssetCache {
    state: Arc<Mutex<CacheState>>,
    retention: Duration,
}

impl AssetCache {
    pub fn new(retention: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            retention,
        }
    }

    /// Return the bytes for `path`, reading the file on a miss.
    /// The returned buffer shares storage with the cache entry.
    pub async fn get_or_load(&self, path: &Path) -> Result<Bytes, AssetError> {
        if let Some(data) = self.touch(path) {
            debug!(path = %path.display(), "Asset cache hit");
            return Ok(data);
        }

        // Read outside the lock; a concurrent loader may win the insert below
        let data = tokio::fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|source| AssetError::Io { path: path.to_path_buf(), source })?;

        let mut state = self.state.lock();
        let now = Instant::now();
        if let Some(existing) = state.entries.get_mut(path) {
            existing.last_access = now;
            return Ok(existing.data.clone());
        }

        state.total_size += data.len() as u64;
        state.entries.insert(
            path.to_path_buf(),
            CacheEntry { data: data.clone(), last_access: now },
        );
        debug!(
            path = %path.display(),
            bytes = data.len(),
            cache_bytes = state.total_size,
            "Asset cache miss, loaded from disk"
        );
        Ok(data)
    }

    fn touch(&self, path: &Path) -> Option<Bytes> {
        let mut state = self.state.lock();
        state.entries.get_mut(path).map(|entry| {
            entry.last_access = Instant::now();
            entry.data.clone()
        })
    }

    /// Drop every entry whose last access is older than the retention window,
    /// measured against `now`
    pub fn sweep_at(&self, now: Instant) -> SweepReport {
        let mut state = self.state.lock();
        let resident_entries_before = state.entries.len();
        let resident_bytes_before = state.total_size;

        let retention = self.retention;
        let mut pruned_bytes = 0u64;
        state.entries.retain(|_, entry| {
            let keep = now.saturating_duration_since(entry.last_access) <= retention;
            if !keep {
                pruned_bytes += entry.data.len() as u64;
            }
            keep
        });
        state.total_size -= pruned_bytes;

        SweepReport {
            pruned_entries: resident_entries_before - state.entries.len(),
            pruned_bytes,
            resident_entries_before,
            resident_bytes_before,
        }
    }

    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now())
    }

    /// Running total of cached bytes
    pub fn total_size(&self) -> u64 {
        self.state.lock().total_size
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.state.lock().entries.contains_key(path)
    }

    /// Periodic eviction loop; spawn it alongside the server
    pub async fn run_manager(self, interval: Duration) {
        info!(
            interval_secs = interval.as_secs(),
            retention_secs = self.retention.as_secs(),
            "Starting asset cache manager"
        );
        let mut ticker = time::interval(interval);
        // The first tick completes immediately; skip it so the first sweep waits a full interval
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let report = self.sweep();
            info!(
                "Cache invalidation pruned {} ({}) of {} ({}) resources",
                report.pruned_entries,
                format_bytes(report.pruned_bytes),
                report.resident_entries_before,
                format_bytes(report.resident_bytes_before),
            );
        }
    }
}

/// Human-readable size in binary units, e.g. `1.5 KiB`
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0usize;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let suffix = b"KMGTPE"[exp] as char;
    format!("{:.1} {}iB", bytes as f64 / div as f64, suffix)
}
