use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Tracks coordination counters across scan runs
#[derive(Debug, Clone)]
pub struct ScanMetrics {
    // Line metrics
    lines_read: Arc<AtomicU64>,
    lines_matched: Arc<AtomicU64>,

    // Coordination metrics
    tasks_spawned: Arc<AtomicU64>,
    empty_polls: Arc<AtomicU64>,
    partial_merges: Arc<AtomicU64>,
    peak_queue_depth: Arc<AtomicU64>,

    runs_completed: Arc<AtomicU64>,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self {
            lines_read: Arc::new(AtomicU64::new(0)),
            lines_matched: Arc::new(AtomicU64::new(0)),
            tasks_spawned: Arc::new(AtomicU64::new(0)),
            empty_polls: Arc::new(AtomicU64::new(0)),
            partial_merges: Arc::new(AtomicU64::new(0)),
            peak_queue_depth: Arc::new(AtomicU64::new(0)),
            runs_completed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a finished run
    pub fn record_run(&self, lines: u64, matched: u64) {
        self.lines_read.fetch_add(lines, Ordering::Relaxed);
        self.lines_matched.fetch_add(matched, Ordering::Relaxed);
        let runs = self.runs_completed.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Run {} recorded: {} lines, {} matched", runs, lines, matched);
    }

    pub fn record_tasks_spawned(&self, count: u64) {
        self.tasks_spawned.fetch_add(count, Ordering::Relaxed);
    }

    /// Records polls of an empty handoff queue
    pub fn record_empty_polls(&self, count: u64) {
        self.empty_polls.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_partial_merges(&self, count: u64) {
        self.partial_merges.fetch_add(count, Ordering::Relaxed);
    }

    /// Records a queue depth, keeping the highest seen
    pub fn record_queue_depth(&self, depth: u64) {
        let mut peak = self.peak_queue_depth.load(Ordering::Relaxed);
        while depth > peak {
            match self.peak_queue_depth.compare_exchange_weak(
                peak,
                depth,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => peak = current,
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            lines_matched: self.lines_matched.load(Ordering::Relaxed),
            tasks_spawned: self.tasks_spawned.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            partial_merges: self.partial_merges.load(Ordering::Relaxed),
            peak_queue_depth: self.peak_queue_depth.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.snapshot();
        info!(
            "Scan stats:\n\
             Runs completed: {}\n\
             Lines read/matched: {}/{}\n\
             Tasks spawned: {}\n\
             Empty queue polls: {}\n\
             Partial merges: {}\n\
             Peak queue depth: {}",
            stats.runs_completed,
            stats.lines_read,
            stats.lines_matched,
            stats.tasks_spawned,
            stats.empty_polls,
            stats.partial_merges,
            stats.peak_queue_depth
        );
    }
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`ScanMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub lines_read: u64,
    pub lines_matched: u64,
    pub tasks_spawned: u64,
    pub empty_polls: u64,
    pub partial_merges: u64,
    pub peak_queue_depth: u64,
    pub runs_completed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_tracking() {
        let metrics = ScanMetrics::new();
        metrics.record_run(100, 40);
        metrics.record_run(50, 10);

        let stats = metrics.snapshot();
        assert_eq!(stats.runs_completed, 2);
        assert_eq!(stats.lines_read, 150);
        assert_eq!(stats.lines_matched, 50);
    }

    #[test]
    fn test_peak_queue_depth() {
        let metrics = ScanMetrics::new();
        metrics.record_queue_depth(10);
        metrics.record_queue_depth(50);
        metrics.record_queue_depth(20);
        assert_eq!(metrics.snapshot().peak_queue_depth, 50);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = ScanMetrics::new();
        let clone = metrics.clone();
        clone.record_tasks_spawned(3);
        clone.record_empty_polls(7);
        clone.record_partial_merges(4);

        let stats = metrics.snapshot();
        assert_eq!(stats.tasks_spawned, 3);
        assert_eq!(stats.empty_polls, 7);
        assert_eq!(stats.partial_merges, 4);
    }
}
