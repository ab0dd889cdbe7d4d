pub mod config;
pub mod errors;
pub mod generate;
pub mod metrics;
pub mod pattern;
pub mod pool;
pub mod queue;
pub mod scanner;
pub mod source;
pub mod stats;
pub mod strategy;

pub use config::{CliOverrides, ScanConfig};
pub use errors::{ScanError, ScanResult};
pub use metrics::{MetricsSnapshot, ScanMetrics};
pub use pattern::{Pattern, PatternOptions};
pub use scanner::{run, Scanner};
pub use source::{EncodingMode, LineSource, MemoryLineSource, ReaderLineSource, SynchronizedLineSource};
pub use stats::LineStats;
pub use strategy::{RunPhase, SharedCounter, Strategy, WaitMode};
