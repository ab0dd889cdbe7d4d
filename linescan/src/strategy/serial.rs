use std::io;

use super::{PhaseTracker, RunPhase};
use crate::pattern::Pattern;
use crate::source::LineSource;
use crate::stats::LineStats;

/// Reads and matches every line on the calling thread.
pub(crate) fn scan<S: LineSource>(
    pattern: &Pattern,
    source: &mut S,
    phase: &PhaseTracker,
) -> io::Result<LineStats> {
    let mut stats = LineStats::ZERO;
    while let Some(line) = source.next_line()? {
        stats.record(pattern.matches(&line));
    }
    phase.advance(RunPhase::Draining);
    phase.advance(RunPhase::Merged);
    Ok(stats)
}
