//! Coordination strategies for counting lines and matches.
//!
//! Every strategy reads the whole source, matches every line exactly once and
//! produces the same [`LineStats`](crate::stats::LineStats) for the same input.
//! They differ only in how workers share the read position and combine their
//! partial results:
//!
//! | strategy              | reading                    | combining                    |
//! |-----------------------|----------------------------|------------------------------|
//! | `serial`              | caller thread              | none                         |
//! | `guarded-read`        | every worker, under a lock | per-worker, merge lock       |
//! | `reduction-merge`     | every worker, under a lock | per-worker, rayon `reduce`   |
//! | `producer-consumer`   | dedicated reader thread    | per-consumer, merge lock     |
//! | `task-shared`         | one worker spawns tasks    | shared atomic or locked count|
//! | `task-per-worker`     | one worker spawns tasks    | pool-owned per-worker slots  |
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::debug;

use crate::errors::ScanError;

pub(crate) mod fanout;
pub(crate) mod guarded;
pub(crate) mod handoff;
pub(crate) mod serial;

/// How idle consumers wait on the handoff queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitMode {
    /// Busy-poll the queue
    #[default]
    Spin,
    /// Sleep on a condition variable until a line or the close arrives
    Block,
}

/// How fan-out tasks update the shared match counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharedCounter {
    #[default]
    Atomic,
    Locked,
}

/// A coordination scheme for scanning a line source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Single thread, no coordination
    Serial,
    /// Workers read under a lock, count privately, merge under a second lock
    GuardedRead,
    /// Like `GuardedRead`, but partial counts are combined by a parallel reduction
    ReductionMerge,
    /// One reader thread feeds a queue drained by the workers
    ProducerConsumer(WaitMode),
    /// One task per line, all updating one shared counter
    TaskFanoutShared(SharedCounter),
    /// One task per line, each updating the executing worker's accumulator
    TaskFanoutPerWorker,
}

impl Strategy {
    pub const ALL: [Strategy; 8] = [
        Strategy::Serial,
        Strategy::GuardedRead,
        Strategy::ReductionMerge,
        Strategy::ProducerConsumer(WaitMode::Spin),
        Strategy::ProducerConsumer(WaitMode::Block),
        Strategy::TaskFanoutShared(SharedCounter::Atomic),
        Strategy::TaskFanoutShared(SharedCounter::Locked),
        Strategy::TaskFanoutPerWorker,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Serial => "serial",
            Strategy::GuardedRead => "guarded-read",
            Strategy::ReductionMerge => "reduction-merge",
            Strategy::ProducerConsumer(WaitMode::Spin) => "producer-consumer",
            Strategy::ProducerConsumer(WaitMode::Block) => "producer-consumer-blocking",
            Strategy::TaskFanoutShared(SharedCounter::Atomic) => "task-shared",
            Strategy::TaskFanoutShared(SharedCounter::Locked) => "task-shared-locked",
            Strategy::TaskFanoutPerWorker => "task-per-worker",
        }
    }

    /// Older short name still accepted on the command line, if there is one
    pub fn legacy_name(&self) -> Option<&'static str> {
        match self {
            Strategy::Serial => Some("serial"),
            Strategy::GuardedRead => Some("parallel"),
            Strategy::ReductionMerge => Some("parallelRed"),
            Strategy::ProducerConsumer(WaitMode::Spin) => Some("parallelQ"),
            Strategy::TaskFanoutShared(SharedCounter::Atomic) => Some("taskCritical"),
            Strategy::TaskFanoutPerWorker => Some("taskTR"),
            _ => None,
        }
    }

    pub fn is_parallel(&self) -> bool {
        !matches!(self, Strategy::Serial)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = ScanError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|s| s.name() == name || s.legacy_name() == Some(name))
            .ok_or_else(|| ScanError::unknown_strategy(name))
    }
}

/// Lifecycle of one scan run. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum RunPhase {
    NotStarted = 0,
    Running = 1,
    /// The source is exhausted; workers are finishing in-flight lines
    Draining = 2,
    /// Every partial result has been merged
    Merged = 3,
    Done = 4,
}

impl RunPhase {
    fn from_u8(value: u8) -> RunPhase {
        match value {
            0 => RunPhase::NotStarted,
            1 => RunPhase::Running,
            2 => RunPhase::Draining,
            3 => RunPhase::Merged,
            _ => RunPhase::Done,
        }
    }
}

/// Shared, forward-only view of a run's phase
#[derive(Debug)]
pub struct PhaseTracker {
    strategy: Strategy,
    phase: AtomicU8,
}

impl PhaseTracker {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            phase: AtomicU8::new(RunPhase::NotStarted as u8),
        }
    }

    /// Moves to `next` unless the run is already there or further along.
    /// Returns true if this call made the transition.
    pub fn advance(&self, next: RunPhase) -> bool {
        let previous = RunPhase::from_u8(self.phase.fetch_max(next as u8, Ordering::AcqRel));
        let moved = previous < next;
        if moved {
            debug!("{}: {:?} -> {:?}", self.strategy, previous, next);
        }
        moved
    }

    pub fn current(&self) -> RunPhase {
        RunPhase::from_u8(self.phase.load(Ordering::Acquire))
    }
}
