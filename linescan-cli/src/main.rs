use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use itertools::Itertools;
use linescan::{
    generate::write_random_lines, CliOverrides, EncodingMode, LineSource, LineStats, MemoryLineSource, Pattern,
    ReaderLineSource, ScanConfig, ScanError, Scanner, Strategy,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{self, BufWriter};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;
use tracing_subscriber::EnvFilter;

type Result<T> = std::result::Result<T, ScanError>;

const DEFAULT_BENCH_PATTERN: &str = "[aA].*[eE].*[iI].*[oO].*[uU]";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
struct CliScanConfig {
    /// Strategy to use (see `linescan list`)
    strategy: String,

    /// Pattern to count (regular expression unless -F is given)
    pattern: String,

    /// File to scan (default: standard input)
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Match without regard to case
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// Treat the pattern as a literal string
    #[arg(short = 'F', long)]
    fixed_strings: bool,

    /// How to handle invalid UTF-8 sequences [default: failfast]
    #[arg(long, value_enum)]
    encoding: Option<EncodingArg>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Report elapsed time on stderr
    #[arg(long)]
    time: bool,

    /// Configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum EncodingArg {
    /// Fail the scan on the first invalid sequence
    #[value(name = "failfast")]
    FailFast,
    /// Replace invalid sequences with U+FFFD
    Lossy,
}

impl From<EncodingArg> for EncodingMode {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::FailFast => EncodingMode::FailFast,
            EncodingArg::Lossy => EncodingMode::Lossy,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Count lines and matching lines with one strategy
    Scan(Box<CliScanConfig>),

    /// List available strategies
    List,

    /// Write random text lines to stdout
    Generate {
        /// Characters per line
        width: usize,

        /// Number of lines
        count: usize,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Time every strategy over a range of thread counts
    Bench {
        /// Input file, read into memory once
        #[arg(short = 'f', long)]
        file: PathBuf,

        /// Pattern to count
        #[arg(short = 'p', long, default_value = DEFAULT_BENCH_PATTERN)]
        pattern: String,

        /// Thread counts to try
        #[arg(short = 'j', long, value_delimiter = ',', default_values_t = vec![1, 2, 4, 8])]
        threads: Vec<usize>,

        /// Runs per strategy and thread count
        #[arg(short = 'r', long, default_value = "3")]
        repeats: usize,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan(args) => scan(*args),
        Commands::List => {
            init_logging("warn");
            print_strategies();
            Ok(())
        }
        Commands::Generate { width, count, seed } => {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let stdout = io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            write_random_lines(&mut writer, &mut rng, width, count)?;
            Ok(())
        }
        Commands::Bench {
            file,
            pattern,
            threads,
            repeats,
        } => {
            init_logging("warn");
            bench(file, &pattern, &threads, repeats.max(1))
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn scan(args: CliScanConfig) -> Result<()> {
    let cli = CliOverrides {
        strategy: args.strategy,
        pattern: args.pattern,
        input: args.file,
        thread_count: args.threads,
        case_insensitive: args.ignore_case,
        fixed_strings: args.fixed_strings,
        encoding_mode: args.encoding.map(EncodingMode::from),
        log_level: args.log_level,
    };

    let config = ScanConfig::load_from(args.config.as_deref())
        .map_err(|e| ScanError::config_error(e.to_string()))?
        .merge_with_cli(cli);
    init_logging(&config.log_level);

    // Everything that can be rejected up front is, before any thread starts
    let strategy = config.strategy()?;
    let pattern = config.compile_pattern()?;

    let mut source: Box<dyn LineSource + Send> = match &config.input {
        Some(path) => Box::new(ReaderLineSource::open(path, config.encoding_mode)?),
        None => Box::new(ReaderLineSource::stdin(config.encoding_mode)),
    };

    let mut scanner = Scanner::new(config.thread_count)?;
    debug!(
        "Scanning {} with {} on {} threads",
        config
            .input
            .as_ref()
            .map_or_else(|| "stdin".to_string(), |p| p.display().to_string()),
        strategy,
        config.thread_count
    );
    let start = Instant::now();
    let stats = scanner.scan(strategy, &pattern, &mut source)?;
    let elapsed = start.elapsed();
    scanner.metrics().log_stats();

    if args.json {
        let output = serde_json::json!({
            "strategy": strategy.name(),
            "threads": config.thread_count.get(),
            "line_count": stats.line_count,
            "matched_count": stats.matched_count,
        });
        println!("{}", output);
    } else {
        print_stats(strategy, config.thread_count, &stats);
    }

    if args.time {
        eprintln!("Time");
        eprintln!("{}", strategy);
        eprintln!("Threads,     Time");
        eprintln!("{}, {} s", config.thread_count, elapsed.as_secs_f64());
    }
    Ok(())
}

fn print_stats(strategy: Strategy, threads: NonZeroUsize, stats: &LineStats) {
    println!(
        "{} ({}) Total Lines: {}, Matching Lines: {}",
        strategy, threads, stats.line_count, stats.matched_count
    );
}

fn print_strategies() {
    println!("Available strategies:");
    for strategy in Strategy::ALL {
        match strategy.legacy_name() {
            Some(alias) if alias != strategy.name() => {
                println!("  {} (alias: {})", strategy.name().green(), alias)
            }
            _ => println!("  {}", strategy.name().green()),
        }
    }
}

/// Timing of one strategy at one thread count
struct BenchRow {
    strategy: Strategy,
    threads: usize,
    best: Duration,
    mean: Duration,
    stats: LineStats,
}

fn bench(file: PathBuf, pattern: &str, threads: &[usize], repeats: usize) -> Result<()> {
    let pattern = Pattern::new(pattern)?;
    if let Some(&zero) = threads.iter().find(|&&t| t == 0) {
        return Err(ScanError::InvalidWorkerCount(zero));
    }

    let mut reader = ReaderLineSource::open(&file, EncodingMode::Lossy)?;
    let mut lines = Vec::new();
    while let Some(line) = reader.next_line().map_err(ScanError::source_read_failure)? {
        lines.push(line);
    }
    println!(
        "Scanning {} lines from {} for '{}', {} repeats",
        lines.len(),
        file.display(),
        pattern.as_str(),
        repeats
    );

    let mut rows = Vec::new();
    let mut serial = Scanner::new(NonZeroUsize::MIN)?;
    rows.push(time_strategy(&mut serial, Strategy::Serial, &pattern, &lines, repeats)?);

    for threads in threads.iter().copied().unique() {
        let workers = NonZeroUsize::new(threads).ok_or(ScanError::InvalidWorkerCount(threads))?;
        let mut scanner = Scanner::new(workers)?;
        for strategy in Strategy::ALL.into_iter().filter(Strategy::is_parallel) {
            rows.push(time_strategy(&mut scanner, strategy, &pattern, &lines, repeats)?);
        }
    }

    print_bench(&rows)
}

fn time_strategy(
    scanner: &mut Scanner,
    strategy: Strategy,
    pattern: &Pattern,
    lines: &[String],
    repeats: usize,
) -> Result<BenchRow> {
    let mut timings = Vec::with_capacity(repeats);
    let mut stats = LineStats::ZERO;
    for _ in 0..repeats {
        let mut source = MemoryLineSource::from_lines(lines.iter().cloned());
        let start = Instant::now();
        stats = scanner.scan(strategy, pattern, &mut source)?;
        timings.push(start.elapsed());
    }

    Ok(BenchRow {
        strategy,
        threads: scanner.workers().get(),
        best: timings.iter().copied().min().unwrap_or_default(),
        mean: timings.iter().sum::<Duration>() / timings.len().max(1) as u32,
        stats,
    })
}

fn print_bench(rows: &[BenchRow]) -> Result<()> {
    let Some(reference) = rows.iter().find(|r| r.strategy == Strategy::Serial).map(|r| r.stats)
    else {
        return Ok(());
    };

    println!(
        "{:<28} {:>7} {:>14} {:>14}  result",
        "strategy", "threads", "best", "mean"
    );
    let mut mismatches = 0;
    for row in rows {
        let verdict = if row.stats == reference {
            "ok".green()
        } else {
            mismatches += 1;
            "MISMATCH".red()
        };
        println!(
            "{:<28} {:>7} {:>14} {:>14}  {}",
            row.strategy.name(),
            row.threads,
            humantime::format_duration(round_to_micros(row.best)).to_string(),
            humantime::format_duration(round_to_micros(row.mean)).to_string(),
            verdict
        );
    }
    println!(
        "Total Lines: {}, Matching Lines: {}",
        reference.line_count, reference.matched_count
    );

    if mismatches > 0 {
        eprintln!(
            "{}",
            format!("{} runs disagreed with the serial scan", mismatches).red()
        );
        std::process::exit(2);
    }
    Ok(())
}

fn round_to_micros(duration: Duration) -> Duration {
    Duration::from_micros(duration.as_micros() as u64)
}
