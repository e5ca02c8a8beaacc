//! Artifact and Timer Patterns
//!
//! Artifacts are files a run is expected to leave in its working directory,
//! matched by regex against paths relative to that directory. Timers are numbers
//! (seconds) scraped from the run's output with a regex.

use regex::Regex;
use std::fmt;
use std::path::PathBuf;

/// Output file matched by a regex
#[derive(Debug, Clone)]
pub struct ArtifactPattern {
    /// Artifact name used in reports
    pub name: String,
    /// Regex over `/`-separated relative paths
    pub pattern: Regex,
    /// Whether a missing artifact is reported
    pub required: bool,
}

impl ArtifactPattern {
    /// Compile a pattern
    pub fn new(name: impl Into<String>, pattern: &str, required: bool) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            pattern: Regex::new(pattern)?,
            required,
        })
    }

    /// Whether `relative_path` is this artifact
    pub fn matches(&self, relative_path: &str) -> bool {
        self.pattern.is_match(relative_path)
    }
}

/// Where a timer is read from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TimerSource {
    /// Captured standard output
    #[default]
    Stdout,
    /// Captured standard error
    Stderr,
    /// A file relative to the working directory
    File(PathBuf),
}

impl fmt::Display for TimerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerSource::Stdout => f.write_str("stdout"),
            TimerSource::Stderr => f.write_str("stderr"),
            TimerSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Number extracted from run output
#[derive(Debug, Clone)]
pub struct TimerPattern {
    /// Timer name used in reports
    pub name: String,
    /// Regex with a `value` capture (or a first capture group)
    pub pattern: Regex,
    /// Text to search
    pub source: TimerSource,
}

impl TimerPattern {
    /// Compile a pattern
    pub fn new(name: impl Into<String>, pattern: &str, source: TimerSource) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            pattern: Regex::new(pattern)?,
            source,
        })
    }

    /// Value of the last match in `text`.
    ///
    /// The `value` capture is used when present, then the first capture group,
    /// then the whole match. Fortran `D` exponents are accepted.
    pub fn extract(&self, text: &str) -> Option<f64> {
        let caps = self.pattern.captures_iter(text).last()?;
        let m = caps
            .name("value")
            .or_else(|| caps.get(1))
            .or_else(|| caps.get(0))?;
        m.as_str().trim().replace(['d', 'D'], "e").parse().ok()
    }
}
