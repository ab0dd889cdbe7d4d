use config::{Config as ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::errors::ScanResult;
use crate::pattern::{Pattern, PatternOptions};
use crate::source::EncodingMode;
use crate::strategy::Strategy;

/// Configuration for a scan run.
///
/// # Configuration Locations
///
/// Loaded from these locations, later ones overriding earlier ones:
/// 1. Global `$CONFIG_DIR/linescan/config.yaml`
/// 2. Local `.linescan.yaml` in the current directory
/// 3. Custom config file specified via `--config`
///
/// Command-line arguments take precedence over all of them, see
/// [`ScanConfig::merge_with_cli`].
///
/// # Configuration Format
///
/// ```yaml
/// # Strategy name (serial, guarded-read, producer-consumer, task-per-worker, ...)
/// strategy: "guarded-read"
///
/// # Pattern to count (regex unless fixed_strings is set)
/// pattern: "[aA].*[eE].*[iI].*[oO].*[uU]"
///
/// # Input file; stdin when absent
/// input: "large.txt"
///
/// # Worker count (default: CPU cores)
/// thread_count: 8
///
/// case_insensitive: false
/// fixed_strings: false
///
/// # How to handle invalid UTF-8 (failfast, lossy)
/// encoding_mode: "failfast"
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "info"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Name of the coordination strategy
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// The pattern to count matches of
    #[serde(default)]
    pub pattern: String,

    /// File to scan; standard input when `None`
    #[serde(default)]
    pub input: Option<PathBuf>,

    /// Number of workers
    /// Defaults to number of CPU cores if not specified
    #[serde(default = "default_thread_count")]
    pub thread_count: NonZeroUsize,

    #[serde(default)]
    pub case_insensitive: bool,

    #[serde(default)]
    pub fixed_strings: bool,

    #[serde(default)]
    pub encoding_mode: EncodingMode,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Values given on the command line. `None` means the flag was absent and
/// the configuration files decide.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub strategy: String,
    pub pattern: String,
    pub input: Option<PathBuf>,
    pub thread_count: Option<NonZeroUsize>,
    pub case_insensitive: bool,
    pub fixed_strings: bool,
    pub encoding_mode: Option<EncodingMode>,
    pub log_level: Option<String>,
}

fn default_strategy() -> String {
    Strategy::Serial.name().to_string()
}

fn default_thread_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            pattern: String::new(),
            input: None,
            thread_count: default_thread_count(),
            case_insensitive: false,
            fixed_strings: false,
            encoding_mode: EncodingMode::default(),
            log_level: default_log_level(),
        }
    }
}

impl ScanConfig {
    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration from the default locations plus a specific file
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("linescan/config.yaml")),
            Some(PathBuf::from(".linescan.yaml")),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        // An explicitly requested file must exist
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder.build()?.try_deserialize()
    }

    /// Merges CLI arguments with configuration file values.
    ///
    /// The strategy and pattern are positional on the command line and always
    /// win. Every optional flag the user gave wins too, even when it equals
    /// the built-in default.
    pub fn merge_with_cli(mut self, cli: CliOverrides) -> Self {
        self.strategy = cli.strategy;
        self.pattern = cli.pattern;

        if let Some(input) = cli.input {
            self.input = Some(input);
        }
        if let Some(threads) = cli.thread_count {
            self.thread_count = threads;
        }
        if cli.case_insensitive {
            self.case_insensitive = true;
        }
        if cli.fixed_strings {
            self.fixed_strings = true;
        }
        if let Some(mode) = cli.encoding_mode {
            self.encoding_mode = mode;
        }
        if let Some(level) = cli.log_level {
            self.log_level = level;
        }
        self
    }

    pub fn pattern_options(&self) -> PatternOptions {
        PatternOptions {
            fixed_strings: self.fixed_strings,
            case_insensitive: self.case_insensitive,
        }
    }

    /// Resolves the strategy name
    pub fn strategy(&self) -> ScanResult<Strategy> {
        self.strategy.parse()
    }

    /// Compiles the configured pattern
    pub fn compile_pattern(&self) -> ScanResult<Pattern> {
        Pattern::with_options(&self.pattern, self.pattern_options())
    }
}
