use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{ScanError, ScanResult};

const SIMPLE_PATTERN_THRESHOLD: usize = 32;

/// Options controlling how a pattern is compiled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternOptions {
    /// Treat the pattern as a literal string, never as a regex
    #[serde(default)]
    pub fixed_strings: bool,
    /// Match without regard to letter case
    #[serde(default)]
    pub case_insensitive: bool,
}

/// How a compiled pattern is evaluated
#[derive(Debug, Clone)]
enum MatchStrategy {
    Simple(String),
    Regex(Regex),
}

/// A compiled line predicate.
///
/// Compiled once before any worker starts and then only read, so a single
/// instance is shared by reference with every worker.
#[derive(Debug, Clone)]
pub struct Pattern {
    text: String,
    strategy: MatchStrategy,
}

impl Pattern {
    /// Compiles `text` with default options
    pub fn new(text: &str) -> ScanResult<Self> {
        Self::with_options(text, PatternOptions::default())
    }

    pub fn with_options(text: &str, options: PatternOptions) -> ScanResult<Self> {
        let strategy = if !options.case_insensitive
            && (options.fixed_strings || Self::is_simple_pattern(text))
        {
            MatchStrategy::Simple(text.to_string())
        } else {
            let source = if options.fixed_strings {
                regex::escape(text)
            } else {
                text.to_string()
            };
            let regex = RegexBuilder::new(&source)
                .case_insensitive(options.case_insensitive)
                .build()
                .map_err(|e| ScanError::invalid_pattern(e.to_string()))?;
            MatchStrategy::Regex(regex)
        };

        debug!(
            "Compiled pattern '{}' as {}",
            text,
            match strategy {
                MatchStrategy::Simple(_) => "literal",
                MatchStrategy::Regex(_) => "regex",
            }
        );

        Ok(Self {
            text: text.to_string(),
            strategy,
        })
    }

    /// Determines if a pattern can use plain substring search
    fn is_simple_pattern(pattern: &str) -> bool {
        pattern.len() < SIMPLE_PATTERN_THRESHOLD
            && !pattern.contains(|c: char| c.is_ascii_punctuation() && c != '_' && c != '-')
    }

    /// True if the pattern occurs anywhere in `line`.
    #[inline]
    pub fn matches(&self, line: &str) -> bool {
        match &self.strategy {
            MatchStrategy::Simple(literal) => line.contains(literal.as_str()),
            MatchStrategy::Regex(regex) => regex.is_match(line),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.strategy, MatchStrategy::Simple(_))
    }
}
