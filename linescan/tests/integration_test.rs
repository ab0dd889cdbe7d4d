use anyhow::Result;
use linescan::generate::write_random_lines;
use linescan::{
    run, EncodingMode, LineSource, LineStats, MemoryLineSource, Pattern, ReaderLineSource,
    ScanError, Scanner, Strategy,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{self, Cursor};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;

const VOWELS: &str = "[aA].*[eE].*[iI].*[oO].*[uU]";

fn random_text(seed: u64, width: usize, lines: usize) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_random_lines(&mut buffer, &mut StdRng::seed_from_u64(seed), width, lines)?;
    Ok(buffer)
}

fn text_source(text: &[u8]) -> ReaderLineSource<Cursor<Vec<u8>>> {
    ReaderLineSource::new(Cursor::new(text.to_vec()), EncodingMode::FailFast)
}

#[test]
fn test_every_strategy_agrees_with_serial() -> Result<()> {
    let text = random_text(3, 60, 20_000)?;
    let expected = run("serial", VOWELS, &mut text_source(&text), 1)?;
    assert_eq!(expected.line_count, 20_000);
    assert!(expected.matched_count > 0);

    for workers in [1, 2, 8] {
        for strategy in Strategy::ALL {
            let stats = run(strategy.name(), VOWELS, &mut text_source(&text), workers)?;
            assert_eq!(stats, expected, "{} with {} workers", strategy, workers);
        }
    }
    Ok(())
}

#[test]
fn test_three_line_scenario() -> Result<()> {
    for workers in [1, 4] {
        for strategy in Strategy::ALL {
            let mut source = MemoryLineSource::from_lines(["abc", "xyz", "abcd"]);
            let stats = run(strategy.name(), "ab", &mut source, workers)?;
            assert_eq!(stats, LineStats::new(3, 2), "{} with {} workers", strategy, workers);
        }
    }
    Ok(())
}

#[test]
fn test_empty_and_single_line_sources() -> Result<()> {
    for strategy in Strategy::ALL {
        let stats = run(strategy.name(), "ab", &mut MemoryLineSource::default(), 4)?;
        assert_eq!(stats, LineStats::ZERO, "{}", strategy);

        let stats = run(strategy.name(), "ab", &mut text_source(b"no newline, ab"), 4)?;
        assert_eq!(stats, LineStats::new(1, 1), "{}", strategy);
    }
    Ok(())
}

#[test]
fn test_large_input_counts_every_line() -> Result<()> {
    let lines: Vec<String> = (0..100_000).map(|i| format!("row {}", i)).collect();
    for strategy in Strategy::ALL {
        let mut source = MemoryLineSource::from_lines(lines.iter().cloned());
        // Every row number containing a 7
        let stats = run(strategy.name(), "7", &mut source, 8)?;
        assert_eq!(stats, LineStats::new(100_000, 40_951), "{}", strategy);
    }
    Ok(())
}

#[test]
fn test_rerunning_gives_identical_results() -> Result<()> {
    let text = random_text(11, 40, 5_000)?;
    let pattern = Pattern::new(VOWELS)?;
    let mut scanner = Scanner::new(NonZeroUsize::new(4).unwrap())?;

    for strategy in Strategy::ALL {
        let first = scanner.scan(strategy, &pattern, &mut text_source(&text))?;
        let second = scanner.scan(strategy, &pattern, &mut text_source(&text))?;
        assert_eq!(first, second, "{}", strategy);

        let fresh = run(strategy.name(), VOWELS, &mut text_source(&text), 4)?;
        assert_eq!(first, fresh, "{}", strategy);
    }
    Ok(())
}

#[test]
fn test_partitioned_scans_merge_to_serial_total() -> Result<()> {
    let text = random_text(5, 50, 9_000)?;
    let whole = run("serial", VOWELS, &mut text_source(&text), 1)?;

    let lines: Vec<String> = String::from_utf8(text)?.lines().map(str::to_string).collect();
    let mut parts = Vec::new();
    for chunk in lines.chunks(1_234) {
        let mut source = MemoryLineSource::from_lines(chunk.iter().cloned());
        parts.push(run("guarded-read", VOWELS, &mut source, 3)?);
    }

    let forward: LineStats = parts.iter().copied().sum();
    let backward = parts
        .iter()
        .rev()
        .fold(LineStats::ZERO, |acc, part| part.merge(acc));
    assert_eq!(forward, whole);
    assert_eq!(backward, whole);
    Ok(())
}

/// Counts calls and fails the test if it is ever read
struct SpySource {
    calls: AtomicUsize,
}

impl LineSource for SpySource {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("source must not be read when the run is rejected");
    }
}

#[test]
fn test_invalid_pattern_never_touches_source() {
    for strategy in Strategy::ALL {
        let mut spy = SpySource {
            calls: AtomicUsize::new(0),
        };
        let err = run(strategy.name(), "([unclosed", &mut spy, 4).unwrap_err();
        assert!(matches!(err, ScanError::InvalidPattern(_)), "{}", strategy);
        assert_eq!(spy.calls.load(Ordering::SeqCst), 0);
    }
}

#[test]
fn test_configuration_errors() {
    let mut source = MemoryLineSource::from_lines(["abc"]);
    let err = run("quantum", "ab", &mut source, 4).unwrap_err();
    assert!(matches!(err, ScanError::UnknownStrategy(ref name) if name == "quantum"));

    let err = run("guarded-read", "ab", &mut source, 0).unwrap_err();
    assert!(matches!(err, ScanError::InvalidWorkerCount(0)));
    assert!(err.is_configuration_error());
}

/// Yields `good` lines, then fails
struct FailingSource {
    good: usize,
}

impl LineSource for FailingSource {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        if self.good == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "device went away"));
        }
        self.good -= 1;
        Ok(Some("abc".to_string()))
    }
}

#[test]
fn test_read_failure_fails_every_strategy() {
    for workers in [1, 4] {
        for strategy in Strategy::ALL {
            let mut source = FailingSource { good: 1_000 };
            let err = run(strategy.name(), "ab", &mut source, workers).unwrap_err();
            assert!(
                matches!(err, ScanError::SourceReadFailure(_)),
                "{} with {} workers returned {:?}",
                strategy,
                workers,
                err
            );
        }
    }
}

#[test]
fn test_invalid_utf8_is_a_read_failure() {
    let mut source = ReaderLineSource::new(
        Cursor::new(b"fine\n\xc3\x28 broken\n".to_vec()),
        EncodingMode::FailFast,
    );
    let err = run("producer-consumer", "fine", &mut source, 2).unwrap_err();
    assert!(matches!(err, ScanError::SourceReadFailure(_)));

    let mut source = ReaderLineSource::new(
        Cursor::new(b"fine\n\xc3\x28 broken\n".to_vec()),
        EncodingMode::Lossy,
    );
    let stats = run("producer-consumer", "broken", &mut source, 2).unwrap();
    assert_eq!(stats, LineStats::new(2, 1));
}

#[test]
fn test_scan_file_on_disk() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("large.txt");
    std::fs::write(&path, random_text(99, 70, 3_000)?)?;

    let expected = run(
        "serial",
        VOWELS,
        &mut ReaderLineSource::open(&path, EncodingMode::FailFast)?,
        1,
    )?;
    for strategy in Strategy::ALL.into_iter().filter(Strategy::is_parallel) {
        let mut source = ReaderLineSource::open(&path, EncodingMode::FailFast)?;
        assert_eq!(run(strategy.name(), VOWELS, &mut source, 4)?, expected);
    }
    Ok(())
}
