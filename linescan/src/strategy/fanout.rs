use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use super::{PhaseTracker, RunPhase, SharedCounter};
use crate::metrics::ScanMetrics;
use crate::pattern::Pattern;
use crate::pool::WorkerPool;
use crate::source::LineSource;
use crate::stats::{LineStats, MergeTarget};

/// Match counter shared by every fan-out task
#[derive(Debug)]
enum SharedMatches {
    Atomic(AtomicU64),
    Locked(Mutex<u64>),
}

impl SharedMatches {
    fn new(kind: SharedCounter) -> Self {
        match kind {
            SharedCounter::Atomic => SharedMatches::Atomic(AtomicU64::new(0)),
            SharedCounter::Locked => SharedMatches::Locked(Mutex::new(0)),
        }
    }

    fn increment(&self) {
        match self {
            SharedMatches::Atomic(count) => {
                count.fetch_add(1, Ordering::Relaxed);
            }
            SharedMatches::Locked(count) => {
                *count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
            }
        }
    }

    fn into_inner(self) -> u64 {
        match self {
            SharedMatches::Atomic(count) => count.into_inner(),
            SharedMatches::Locked(count) => count.into_inner().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

/// The reader counts lines itself and spawns one task per line; each task
/// bumps the shared match counter when its line matches.
pub(crate) fn scan_shared<S: LineSource + Send>(
    pool: &WorkerPool,
    pattern: &Pattern,
    source: &mut S,
    counter: SharedCounter,
    phase: &PhaseTracker,
    metrics: &ScanMetrics,
) -> io::Result<LineStats> {
    let matches = SharedMatches::new(counter);

    let lines = pool.fan_out(|scope| -> io::Result<u64> {
        let matches = &matches;
        let mut lines = 0;
        while let Some(line) = source.next_line()? {
            lines += 1;
            scope.spawn(move |_| {
                if pattern.matches(&line) {
                    matches.increment();
                }
            });
        }
        phase.advance(RunPhase::Draining);
        Ok(lines)
    });
    // The scope has joined every task, including on the error path
    let lines = lines?;
    metrics.record_tasks_spawned(lines);
    phase.advance(RunPhase::Merged);

    Ok(LineStats::new(lines, matches.into_inner()))
}

/// The reader spawns one task per line; each task records into the
/// accumulator of whichever worker runs it. The pool merges every worker's
/// accumulator once, after all tasks have finished.
pub(crate) fn scan_per_worker<S: LineSource + Send>(
    pool: &mut WorkerPool,
    pattern: &Pattern,
    source: &mut S,
    phase: &PhaseTracker,
    metrics: &ScanMetrics,
) -> io::Result<LineStats> {
    pool.accumulators_mut().reset();

    let accumulators = pool.accumulators();
    let spawned = pool.fan_out(|scope| -> io::Result<u64> {
        let mut spawned = 0;
        while let Some(line) = source.next_line()? {
            spawned += 1;
            scope.spawn(move |_| accumulators.record(pattern.matches(&line)));
        }
        phase.advance(RunPhase::Draining);
        Ok(spawned)
    })?;
    metrics.record_tasks_spawned(spawned);

    let target = MergeTarget::new();
    let merged = pool.accumulators_mut().merge_into(&target);
    metrics.record_partial_merges(merged as u64);
    phase.advance(RunPhase::Merged);

    let total = target.into_inner();
    debug!("{} tasks recorded into {} worker accumulators", spawned, merged);
    debug_assert_eq!(total.line_count, spawned);
    Ok(total)
}
