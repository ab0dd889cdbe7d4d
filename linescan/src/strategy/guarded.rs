use rayon::prelude::*;
use std::io;
use tracing::trace;

use super::{PhaseTracker, RunPhase};
use crate::metrics::ScanMetrics;
use crate::pattern::Pattern;
use crate::pool::WorkerPool;
use crate::source::{LineSource, SynchronizedLineSource};
use crate::stats::{LineStats, MergeTarget};

/// One worker's share of a guarded scan: take lines until the source runs
/// dry, matching outside the read lock.
fn drain<S: LineSource>(
    source: &SynchronizedLineSource<S>,
    pattern: &Pattern,
    phase: &PhaseTracker,
) -> LineStats {
    let mut local = LineStats::ZERO;
    while let Some(line) = source.try_read_line() {
        local.record(pattern.matches(&line));
    }
    phase.advance(RunPhase::Draining);
    local
}

/// Every worker reads under the read lock and counts privately; each then
/// merges its count once under the separate merge lock.
pub(crate) fn scan<S: LineSource + Send>(
    pool: &WorkerPool,
    pattern: &Pattern,
    source: &mut S,
    phase: &PhaseTracker,
    metrics: &ScanMetrics,
) -> io::Result<LineStats> {
    let source = SynchronizedLineSource::new(source);
    let target = MergeTarget::new();

    let merges = pool.team(|worker| {
        let local = drain(&source, pattern, phase);
        trace!("Worker {} finished with {:?}", worker, local);
        target.merge(local);
    });
    metrics.record_partial_merges(merges.len() as u64);
    phase.advance(RunPhase::Merged);

    source.finish()?;
    Ok(target.into_inner())
}

/// Same reading as [`scan`], but the partial counts are combined by a rayon
/// reduction over [`LineStats::merge`] instead of an explicit lock.
pub(crate) fn scan_reduce<S: LineSource + Send>(
    pool: &WorkerPool,
    pattern: &Pattern,
    source: &mut S,
    phase: &PhaseTracker,
    metrics: &ScanMetrics,
) -> io::Result<LineStats> {
    let source = SynchronizedLineSource::new(source);
    let workers = pool.workers().get();

    let total = pool.install(|| {
        (0..workers)
            .into_par_iter()
            .map(|_| drain(&source, pattern, phase))
            .reduce(LineStats::default, LineStats::merge)
    });
    metrics.record_partial_merges(workers as u64);
    phase.advance(RunPhase::Merged);

    source.finish()?;
    Ok(total)
}
