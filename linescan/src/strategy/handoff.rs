use std::io;
use std::thread;
use tracing::{debug, trace};

use super::{PhaseTracker, RunPhase, WaitMode};
use crate::errors::{ScanError, ScanResult};
use crate::metrics::ScanMetrics;
use crate::pattern::Pattern;
use crate::pool::WorkerPool;
use crate::queue::{HandoffQueue, TryPop};
use crate::source::LineSource;
use crate::stats::{LineStats, MergeTarget};

const SPINS_BEFORE_YIELD: u32 = 64;

/// Closes the queue when dropped, so consumers terminate even if the reader
/// returns early with an error or panics.
struct CloseOnDrop<'a, T>(&'a HandoffQueue<T>);

impl<T> Drop for CloseOnDrop<'_, T> {
    fn drop(&mut self) {
        self.0.close();
    }
}

fn produce<S: LineSource>(
    source: &mut S,
    queue: &HandoffQueue<String>,
    phase: &PhaseTracker,
) -> io::Result<u64> {
    let _close = CloseOnDrop(queue);
    let mut produced = 0;
    while let Some(line) = source.next_line()? {
        queue.push(line);
        produced += 1;
    }
    phase.advance(RunPhase::Draining);
    debug!("Reader finished after {} lines", produced);
    Ok(produced)
}

/// Drains the queue until it reports closed. Returns the consumer's counts
/// and how many times it found the queue empty.
fn consume(queue: &HandoffQueue<String>, pattern: &Pattern, wait: WaitMode) -> (LineStats, u64) {
    let mut local = LineStats::ZERO;
    let mut empty_polls = 0;

    match wait {
        WaitMode::Spin => {
            let mut spins = 0u32;
            loop {
                match queue.try_pop() {
                    TryPop::Item(line) => {
                        spins = 0;
                        local.record(pattern.matches(&line));
                    }
                    TryPop::Empty => {
                        empty_polls += 1;
                        spins += 1;
                        if spins % SPINS_BEFORE_YIELD == 0 {
                            thread::yield_now();
                        } else {
                            std::hint::spin_loop();
                        }
                    }
                    TryPop::Closed => break,
                }
            }
        }
        WaitMode::Block => {
            while let Some(line) = queue.pop_blocking() {
                local.record(pattern.matches(&line));
            }
        }
    }

    (local, empty_polls)
}

fn reader_spawn_failed(err: io::Error) -> ScanError {
    ScanError::worker_pool(format!("could not start reader thread: {}", err))
}

/// A dedicated reader thread moves lines into the handoff queue; every pool
/// worker consumes from it and merges its own count when the queue closes.
pub(crate) fn scan<S: LineSource + Send>(
    pool: &WorkerPool,
    pattern: &Pattern,
    source: &mut S,
    wait: WaitMode,
    phase: &PhaseTracker,
    metrics: &ScanMetrics,
) -> ScanResult<LineStats> {
    let queue = HandoffQueue::new();
    let target = MergeTarget::new();

    let produced = thread::scope(|s| -> ScanResult<u64> {
        let reader = {
            let queue = &queue;
            thread::Builder::new()
                .name("linescan-reader".to_string())
                .spawn_scoped(s, move || produce(source, queue, phase))
                .map_err(reader_spawn_failed)?
        };

        let polls = pool.team(|worker| {
            let (local, empty_polls) = consume(&queue, pattern, wait);
            trace!(
                "Consumer {} finished with {:?} after {} empty polls",
                worker,
                local,
                empty_polls
            );
            target.merge(local);
            empty_polls
        });
        metrics.record_empty_polls(polls.iter().sum());
        metrics.record_partial_merges(polls.len() as u64);

        match reader.join() {
            Ok(result) => result.map_err(ScanError::source_read_failure),
            Err(payload) => std::panic::resume_unwind(payload),
        }
    })?;

    metrics.record_queue_depth(queue.peak_depth() as u64);
    phase.advance(RunPhase::Merged);

    let total = target.into_inner();
    debug_assert_eq!(total.line_count, produced);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryLineSource;
    use crate::strategy::Strategy;
    use std::num::NonZeroUsize;

    struct BrokenSource {
        remaining: usize,
    }

    impl LineSource for BrokenSource {
        fn next_line(&mut self) -> io::Result<Option<String>> {
            if self.remaining == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
            }
            self.remaining -= 1;
            Ok(Some("abc".to_string()))
        }
    }

    fn run(workers: usize, wait: WaitMode, source: &mut (impl LineSource + Send)) -> ScanResult<LineStats> {
        let pool = WorkerPool::new(NonZeroUsize::new(workers).unwrap()).unwrap();
        let pattern = Pattern::new("ab").unwrap();
        let phase = PhaseTracker::new(Strategy::ProducerConsumer(wait));
        scan(&pool, &pattern, source, wait, &phase, &ScanMetrics::new())
    }

    #[test]
    fn test_spin_consumers() {
        let mut source = MemoryLineSource::from_lines((0..10_000).map(|i| {
            if i % 4 == 0 { "abc" } else { "xyz" }
        }));
        let stats = run(4, WaitMode::Spin, &mut source).unwrap();
        assert_eq!(stats, LineStats::new(10_000, 2_500));
    }

    #[test]
    fn test_blocking_consumers() {
        let mut source = MemoryLineSource::from_lines((0..10_000).map(|i| {
            if i % 2 == 0 { "abc" } else { "xyz" }
        }));
        let stats = run(3, WaitMode::Block, &mut source).unwrap();
        assert_eq!(stats, LineStats::new(10_000, 5_000));
    }

    #[test]
    fn test_single_consumer_buffers_everything() {
        let mut source = MemoryLineSource::from_lines(vec!["abc"; 1000]);
        let stats = run(1, WaitMode::Spin, &mut source).unwrap();
        assert_eq!(stats, LineStats::new(1000, 1000));
    }

    #[test]
    fn test_reader_error_still_releases_consumers() {
        for wait in [WaitMode::Spin, WaitMode::Block] {
            let mut source = BrokenSource { remaining: 500 };
            let err = run(4, wait, &mut source).unwrap_err();
            match err {
                ScanError::SourceReadFailure(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
                other => panic!("expected a read failure, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_reader_spawn_failure_is_a_pool_error() {
        let err = reader_spawn_failed(io::Error::new(io::ErrorKind::OutOfMemory, "no threads left"));
        assert!(matches!(err, ScanError::WorkerPool(ref msg) if msg.contains("no threads left")));
        assert!(!matches!(err, ScanError::SourceReadFailure(_)));
    }
}
