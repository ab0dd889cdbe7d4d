use std::io;
use std::num::NonZeroUsize;
use tracing::{debug, info};

use crate::errors::{ScanError, ScanResult};
use crate::metrics::ScanMetrics;
use crate::pattern::Pattern;
use crate::pool::WorkerPool;
use crate::source::LineSource;
use crate::stats::LineStats;
use crate::strategy::{fanout, guarded, handoff, serial, PhaseTracker, RunPhase, Strategy};

/// Runs scans on a fixed-size worker pool.
///
/// The pool and its per-worker accumulators live as long as the scanner and
/// are reused by every scan; each scan resets whatever state it needs, so
/// running the same input twice always gives the same stats.
#[derive(Debug)]
pub struct Scanner {
    pool: WorkerPool,
    metrics: ScanMetrics,
}

impl Scanner {
    pub fn new(workers: NonZeroUsize) -> ScanResult<Self> {
        Self::with_metrics(workers, ScanMetrics::new())
    }

    pub fn with_metrics(workers: NonZeroUsize, metrics: ScanMetrics) -> ScanResult<Self> {
        Ok(Self {
            pool: WorkerPool::new(workers)?,
            metrics,
        })
    }

    pub fn workers(&self) -> NonZeroUsize {
        self.pool.workers()
    }

    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }

    /// Scans `source` to exhaustion with `strategy`.
    ///
    /// Any read error fails the whole scan with
    /// [`ScanError::SourceReadFailure`]; there are no partial results.
    pub fn scan<S: LineSource + Send>(
        &mut self,
        strategy: Strategy,
        pattern: &Pattern,
        source: &mut S,
    ) -> ScanResult<LineStats> {
        info!(
            "Starting {} scan with {} workers for pattern '{}'",
            strategy,
            self.workers(),
            pattern.as_str()
        );

        let phase = PhaseTracker::new(strategy);
        phase.advance(RunPhase::Running);

        let pool = &mut self.pool;
        let metrics = &self.metrics;
        let read = |result: io::Result<LineStats>| result.map_err(ScanError::source_read_failure);
        let stats = match strategy {
            Strategy::Serial => read(serial::scan(pattern, source, &phase)),
            Strategy::GuardedRead => read(guarded::scan(pool, pattern, source, &phase, metrics)),
            Strategy::ReductionMerge => {
                read(guarded::scan_reduce(pool, pattern, source, &phase, metrics))
            }
            // Also fails with a pool error if the reader thread cannot start
            Strategy::ProducerConsumer(wait) => {
                handoff::scan(pool, pattern, source, wait, &phase, metrics)
            }
            Strategy::TaskFanoutShared(counter) => read(fanout::scan_shared(
                pool, pattern, source, counter, &phase, metrics,
            )),
            Strategy::TaskFanoutPerWorker => {
                read(fanout::scan_per_worker(pool, pattern, source, &phase, metrics))
            }
        }?;

        phase.advance(RunPhase::Done);
        debug_assert!(stats.matched_count <= stats.line_count);
        self.metrics.record_run(stats.line_count, stats.matched_count);

        info!(
            "{} scan complete. {} lines, {} matched",
            strategy, stats.line_count, stats.matched_count
        );
        Ok(stats)
    }
}

/// Scans `source` with the strategy named `strategy_name`.
///
/// The strategy name, worker count and pattern are all validated before any
/// worker is started or the source is touched.
pub fn run<S: LineSource + Send>(
    strategy_name: &str,
    pattern: &str,
    source: &mut S,
    worker_count: usize,
) -> ScanResult<LineStats> {
    let strategy: Strategy = strategy_name.parse()?;
    let workers =
        NonZeroUsize::new(worker_count).ok_or(ScanError::InvalidWorkerCount(worker_count))?;
    let pattern = Pattern::new(pattern)?;
    debug!("Validated {} run with {} workers", strategy, workers);

    let mut scanner = Scanner::new(workers)?;
    scanner.scan(strategy, &pattern, source)
}
