use rayon::{Scope, ThreadPool, ThreadPoolBuilder};
use std::cell::Cell;
use std::num::NonZeroUsize;
use thread_local::ThreadLocal;
use tracing::{debug, trace};

use crate::errors::{ScanError, ScanResult};
use crate::stats::{LineStats, MergeTarget};

/// Per-worker partial results, owned by the pool.
///
/// Each worker thread gets its own slot the first time it records anything,
/// and only that thread ever touches the slot during a run. A rayon job runs
/// to completion on the thread that started it as long as it does not call
/// back into the scheduler, so tasks that only match a line and record the
/// result never interleave on one slot.
#[derive(Debug, Default)]
pub struct WorkerAccumulators {
    slots: ThreadLocal<Cell<LineStats>>,
}

impl WorkerAccumulators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `partial` to the calling worker's slot
    #[inline]
    pub fn add(&self, partial: LineStats) {
        let slot = self.slots.get_or_default();
        slot.set(slot.get().merge(partial));
    }

    /// Records one line handled by the calling worker
    #[inline]
    pub fn record(&self, matched: bool) {
        self.add(LineStats::new(1, u64::from(matched)));
    }

    /// Drops every slot so the next run starts from zero
    pub fn reset(&mut self) {
        self.slots.clear();
    }

    /// Merges every slot into `target` and zeroes it. Returns the number of
    /// slots merged.
    pub fn merge_into(&mut self, target: &MergeTarget) -> usize {
        let mut merged = 0;
        for slot in self.slots.iter_mut() {
            target.merge(std::mem::take(slot.get_mut()));
            merged += 1;
        }
        debug!("Merged {} per-worker accumulators", merged);
        merged
    }
}

/// A fixed-size team of worker threads.
///
/// Wraps a dedicated rayon pool so every run gets exactly the configured
/// number of OS threads, independent of rayon's global pool.
#[derive(Debug)]
pub struct WorkerPool {
    pool: ThreadPool,
    workers: NonZeroUsize,
    accumulators: WorkerAccumulators,
}

impl WorkerPool {
    pub fn new(workers: NonZeroUsize) -> ScanResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.get())
            .thread_name(|index| format!("linescan-worker-{}", index))
            .build()
            .map_err(|e| ScanError::worker_pool(e.to_string()))?;

        debug!("Started worker pool with {} threads", workers);

        Ok(Self {
            pool,
            workers,
            accumulators: WorkerAccumulators::new(),
        })
    }

    pub fn workers(&self) -> NonZeroUsize {
        self.workers
    }

    /// Runs `op` once on every worker at the same time and collects the
    /// results, indexed by worker.
    pub fn team<OP, R>(&self, op: OP) -> Vec<R>
    where
        OP: Fn(usize) -> R + Sync,
        R: Send,
    {
        self.pool.broadcast(|ctx| {
            trace!("Worker {} of {} joined the team", ctx.index(), ctx.num_threads());
            op(ctx.index())
        })
    }

    /// Runs `op` inside the pool, so rayon parallel iterators use its threads
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    /// Runs `reader` on one worker with a scope it can spawn tasks into.
    /// Returns once `reader` and every task it spawned have finished.
    pub fn fan_out<'scope, OP, R>(&self, reader: OP) -> R
    where
        OP: FnOnce(&Scope<'scope>) -> R + Send,
        R: Send,
    {
        self.pool.scope(reader)
    }

    pub fn accumulators(&self) -> &WorkerAccumulators {
        &self.accumulators
    }

    pub fn accumulators_mut(&mut self) -> &mut WorkerAccumulators {
        &mut self.accumulators
    }
}
