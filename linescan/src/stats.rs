use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::sync::{Mutex, PoisonError};
use tracing::trace;

/// Line and match counts for a scan, or for any part of one.
///
/// Merging is associative and commutative with [`LineStats::ZERO`] as the
/// identity, so splitting the input across any number of workers and merging
/// the partial results in any order gives the same totals as a serial scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineStats {
    /// Number of lines read
    pub line_count: u64,
    /// Number of lines the pattern matched
    pub matched_count: u64,
}

impl LineStats {
    pub const ZERO: LineStats = LineStats {
        line_count: 0,
        matched_count: 0,
    };

    pub fn new(line_count: u64, matched_count: u64) -> Self {
        Self {
            line_count,
            matched_count,
        }
    }

    /// Records one line read from the source.
    #[inline]
    pub fn record(&mut self, matched: bool) {
        self.line_count += 1;
        if matched {
            self.matched_count += 1;
        }
    }

    #[inline]
    pub fn merge(self, other: LineStats) -> LineStats {
        LineStats {
            line_count: self.line_count + other.line_count,
            matched_count: self.matched_count + other.matched_count,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl Add for LineStats {
    type Output = LineStats;

    fn add(self, rhs: LineStats) -> LineStats {
        self.merge(rhs)
    }
}

impl AddAssign for LineStats {
    fn add_assign(&mut self, rhs: LineStats) {
        *self = self.merge(rhs);
    }
}

impl Sum for LineStats {
    fn sum<I: Iterator<Item = LineStats>>(iter: I) -> LineStats {
        iter.fold(LineStats::ZERO, LineStats::merge)
    }
}

/// Destination of the final per-worker merge.
///
/// Has its own lock, separate from the read position and the handoff queue,
/// so a worker merging its partial result never contends with readers.
#[derive(Debug, Default)]
pub struct MergeTarget {
    total: Mutex<LineStats>,
}

impl MergeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one worker's partial result.
    pub fn merge(&self, partial: LineStats) {
        let mut total = self.total.lock().unwrap_or_else(PoisonError::into_inner);
        *total += partial;
        trace!(
            "Merged partial {:?}, running total {:?}",
            partial,
            *total
        );
    }

    pub fn into_inner(self) -> LineStats {
        self.total
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_record() {
        let mut stats = LineStats::ZERO;
        stats.record(true);
        stats.record(false);
        stats.record(true);
        assert_eq!(stats, LineStats::new(3, 2));
    }

    #[test]
    fn test_merge_identity() {
        let stats = LineStats::new(7, 3);
        assert_eq!(stats.merge(LineStats::ZERO), stats);
        assert_eq!(LineStats::ZERO.merge(stats), stats);
        assert!(LineStats::default().is_zero());
    }

    #[test]
    fn test_merge_associative_and_commutative() {
        let a = LineStats::new(10, 4);
        let b = LineStats::new(3, 0);
        let c = LineStats::new(5, 5);

        assert_eq!(a.merge(b), b.merge(a));
        assert_eq!(a.merge(b).merge(c), a.merge(b.merge(c)));
        assert_eq!(a + b + c, LineStats::new(18, 9));
    }

    #[test]
    fn test_sum() {
        let parts = vec![LineStats::new(1, 1), LineStats::new(2, 0), LineStats::new(4, 3)];
        let total: LineStats = parts.into_iter().sum();
        assert_eq!(total, LineStats::new(7, 4));

        let empty: LineStats = Vec::<LineStats>::new().into_iter().sum();
        assert!(empty.is_zero());
    }

    #[test]
    fn test_merge_target_concurrent() {
        let target = Arc::new(MergeTarget::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let target = Arc::clone(&target);
                thread::spawn(move || {
                    for _ in 0..100 {
                        target.merge(LineStats::new(2, 1));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let target = Arc::try_unwrap(target).unwrap();
        assert_eq!(target.into_inner(), LineStats::new(1600, 800));
    }
}
