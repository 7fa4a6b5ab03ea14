//! Session Metrics
//!
//! Process-local counters for one build session. They complement the
//! statistics kept in the store and are summarised in the log when the
//! service is closed.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by every load and store
#[derive(Debug, Default)]
pub struct SessionMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    /// Raw artifact bytes handed to the host
    bytes_loaded: AtomicU64,
    /// Encoded bytes written to the store
    bytes_stored: AtomicU64,
    failures: AtomicU64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_hit(&self, raw_bytes: usize) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.bytes_loaded.fetch_add(raw_bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_store(&self, encoded_bytes: usize) {
        self.stores.fetch_add(1, Ordering::Relaxed);
        self.bytes_stored.fetch_add(encoded_bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            bytes_loaded: self.bytes_loaded.load(Ordering::Relaxed),
            bytes_stored: self.bytes_stored.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SessionMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub bytes_loaded: u64,
    pub bytes_stored: u64,
    pub failures: u64,
}

impl SessionSnapshot {
    pub fn total_loads(&self) -> u64 {
        self.hits + self.misses
    }

    /// Calculate hit ratio
    pub fn hit_ratio(&self) -> f64 {
        let total = self.total_loads();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let metrics = SessionMetrics::new();
        metrics.record_hit(10);
        metrics.record_hit(20);
        metrics.record_miss();
        metrics.record_store(8);
        metrics.record_failure();

        let snap = metrics.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.bytes_loaded, 30);
        assert_eq!(snap.bytes_stored, 8);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.total_loads(), 3);
        assert!((snap.hit_ratio() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_hit_ratio() {
        assert_eq!(SessionSnapshot::default().hit_ratio(), 0.0);
    }
}
