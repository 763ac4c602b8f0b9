//! Process-wide query counters, latency window and history log.
//!
//! Counters and the latency window live behind one mutex; the two live
//! gauges (`active_queries`, `active_connections`) are atomics raised by
//! [`MetricsRecorder::track_query`] / [`MetricsRecorder::track_connection`]
//! and lowered when the returned [`ActiveGuard`] drops, on every exit path.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use crate::envelope::CacheOutcome;

/// Number of latencies echoed back in [`MetricsSnapshot::recent_exec_times`].
const RECENT_LATENCIES: usize = 20;

/// One answered request, as shown by `recent_history`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub query: String,
    pub elapsed_sec: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub cache: CacheOutcome,
}

/// Read-side view of the recorder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_queries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub active_queries: i64,
    pub active_connections: i64,
    pub avg_exec_sec: f64,
    pub p95_exec_sec: f64,
    pub recent_exec_times: Vec<f64>,
    /// Filled in by the caller from the ingestion store.
    pub indexed_documents: i64,
    pub indexed_chunks: i64,
}

#[derive(Debug, Default)]
struct Counters {
    total_queries: u64,
    cache_hits: u64,
    cache_misses: u64,
    latencies: VecDeque<f64>,
    history: VecDeque<HistoryEntry>,
}

pub struct MetricsRecorder {
    state: Mutex<Counters>,
    active_queries: AtomicI64,
    active_connections: AtomicI64,
    latency_window: usize,
    history_capacity: usize,
}

/// Decrements its gauge when dropped.
#[must_use = "the gauge is lowered as soon as the guard is dropped"]
pub struct ActiveGuard<'a> {
    gauge: &'a AtomicI64,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.gauge.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new(500, 100)
    }
}

impl MetricsRecorder {
    pub fn new(latency_window: usize, history_capacity: usize) -> Self {
        Self {
            state: Mutex::new(Counters::default()),
            active_queries: AtomicI64::new(0),
            active_connections: AtomicI64::new(0),
            latency_window: latency_window.max(1),
            history_capacity: history_capacity.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn track_query(&self) -> ActiveGuard<'_> {
        self.active_queries.fetch_add(1, Ordering::SeqCst);
        ActiveGuard {
            gauge: &self.active_queries,
        }
    }

    pub fn track_connection(&self) -> ActiveGuard<'_> {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
        ActiveGuard {
            gauge: &self.active_connections,
        }
    }

    /// Count one request. Called before the cache lookup.
    pub fn record_request(&self) {
        self.lock().total_queries += 1;
    }

    /// Record the outcome and latency of a finished request and append it
    /// to the history log.
    pub fn record_completion(&self, query: &str, kind: &str, cache: CacheOutcome, elapsed: f64) {
        let mut state = self.lock();
        match cache {
            CacheOutcome::Hit => state.cache_hits += 1,
            CacheOutcome::Miss => state.cache_misses += 1,
        }

        state.latencies.push_back(elapsed);
        while state.latencies.len() > self.latency_window {
            state.latencies.pop_front();
        }

        state.history.push_back(HistoryEntry {
            query: query.to_string(),
            elapsed_sec: elapsed,
            kind: kind.to_string(),
            cache,
        });
        while state.history.len() > self.history_capacity {
            state.history.pop_front();
        }
    }

    /// Up to `limit` history entries, most recent first.
    pub fn recent_history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.lock().history.iter().rev().take(limit).cloned().collect()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let (total_queries, cache_hits, cache_misses, times) = {
            let state = self.lock();
            let times: Vec<f64> = state.latencies.iter().copied().collect();
            (state.total_queries, state.cache_hits, state.cache_misses, times)
        };

        let avg = if times.is_empty() {
            0.0
        } else {
            times.iter().sum::<f64>() / times.len() as f64
        };
        let recent = times[times.len().saturating_sub(RECENT_LATENCIES)..].to_vec();

        MetricsSnapshot {
            total_queries,
            cache_hits,
            cache_misses,
            active_queries: self.active_queries.load(Ordering::SeqCst),
            active_connections: self.active_connections.load(Ordering::SeqCst),
            avg_exec_sec: avg,
            p95_exec_sec: p95(&times),
            recent_exec_times: recent,
            indexed_documents: 0,
            indexed_chunks: 0,
        }
    }

    /// Zero the counters and latency window. Live gauges and history are
    /// left alone: in-flight guards still own their increments.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.total_queries = 0;
        state.cache_hits = 0;
        state.cache_misses = 0;
        state.latencies.clear();
    }
}

/// 95th percentile of a sorted copy, index `floor(0.95 * (n - 1))`.
fn p95(times: &[f64]) -> f64 {
    if times.is_empty() {
        return 0.0;
    }
    let mut sorted = times.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = ((0.95 * (sorted.len() - 1) as f64).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}
