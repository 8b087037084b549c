//! STOWAGE - Store Metrics
//! Lock-free operation counters kept per store, readable while the store is in use.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Atomic operation counters for one store.
///
/// All counters use `Ordering::Relaxed`; they are for observation only.
#[derive(Debug)]
pub struct StoreMetrics {
    pub puts: AtomicU64,
    pub gets: AtomicU64,
    /// Keys removed through `del` (a multi-key delete counts each key).
    pub deletes: AtomicU64,
    pub scans: AtomicU64,
    /// Records written through `import_all`.
    pub imports: AtomicU64,
    /// Total bytes written (keys + encoded values).
    pub bytes_written: AtomicU64,
    /// Total bytes read (encoded values returned by get and scans).
    pub bytes_read: AtomicU64,
    pub opens: AtomicU64,
    pub closes: AtomicU64,
    created: Instant,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self {
            puts: AtomicU64::new(0),
            gets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            scans: AtomicU64::new(0),
            imports: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            opens: AtomicU64::new(0),
            closes: AtomicU64::new(0),
            created: Instant::now(),
        }
    }

    pub fn record_put(&self, key_size: usize, value_size: usize) {
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.bytes_written
            .fetch_add((key_size + value_size) as u64, Ordering::Relaxed);
    }

    pub fn record_get(&self, value_size: Option<usize>) {
        self.gets.fetch_add(1, Ordering::Relaxed);
        if let Some(size) = value_size {
            self.bytes_read.fetch_add(size as u64, Ordering::Relaxed);
        }
    }

    pub fn record_delete(&self, keys: usize) {
        self.deletes.fetch_add(keys as u64, Ordering::Relaxed);
    }

    pub fn record_scan(&self, bytes: usize) {
        self.scans.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_import(&self, records: usize, bytes: usize) {
        self.imports.fetch_add(records as u64, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_open(&self) {
        self.opens.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_close(&self) {
        self.closes.fetch_add(1, Ordering::Relaxed);
    }

    /// Seconds since the store handle was created.
    pub fn uptime_secs(&self) -> f64 {
        self.created.elapsed().as_secs_f64()
    }

    /// Total number of data operations (puts + gets + deletes + scans + imports).
    pub fn total_ops(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
            + self.gets.load(Ordering::Relaxed)
            + self.deletes.load(Ordering::Relaxed)
            + self.scans.load(Ordering::Relaxed)
            + self.imports.load(Ordering::Relaxed)
    }

    /// Format metrics as a human-readable report.
    pub fn report(&self, name: &str) -> String {
        format!(
            "\n═══ Store '{}' Metrics ═══\n\
             Operations:\n\
               puts:      {}\n\
               gets:      {}\n\
               deletes:   {}\n\
               scans:     {}\n\
               imports:   {}\n\
               total ops: {}\n\
             I/O:\n\
               written:   {} bytes\n\
               read:      {} bytes\n\
             Lifecycle:\n\
               opens:     {}\n\
               closes:    {}\n\
             Uptime: {:.2}s",
            name,
            self.puts.load(Ordering::Relaxed),
            self.gets.load(Ordering::Relaxed),
            self.deletes.load(Ordering::Relaxed),
            self.scans.load(Ordering::Relaxed),
            self.imports.load(Ordering::Relaxed),
            self.total_ops(),
            self.bytes_written.load(Ordering::Relaxed),
            self.bytes_read.load(Ordering::Relaxed),
            self.opens.load(Ordering::Relaxed),
            self.closes.load(Ordering::Relaxed),
            self.uptime_secs(),
        )
    }
}

impl Default for StoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}
