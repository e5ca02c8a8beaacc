//! Spec Errors

use ifsbench_namelist::ConfigError;
use std::fmt;
use thiserror::Error;

/// One reason a spec is invalid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Experiment the violation belongs to, if known
    pub experiment: Option<String>,
    /// What is wrong
    pub message: String,
}

impl Violation {
    pub(crate) fn new(experiment: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            experiment: experiment.map(str::to_string),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.experiment {
            Some(id) => write!(f, "[{}] {}", id, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Every violation found while validating one or more specs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct InvalidSpecError {
    /// All violations, in discovery order
    pub violations: Vec<Violation>,
}

impl fmt::Display for InvalidSpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid benchmark spec ({} problem", self.violations.len())?;
        if self.violations.len() != 1 {
            f.write_str("s")?;
        }
        f.write_str(")")?;
        for violation in &self.violations {
            write!(f, "\n  - {}", violation)?;
        }
        Ok(())
    }
}

/// Errors raised while loading or validating a spec
#[derive(Debug, Error)]
pub enum SpecError {
    /// Validation failed
    #[error(transparent)]
    Invalid(#[from] InvalidSpecError),

    /// Namelist layer or override problem outside validation
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Spec source file is not valid TOML or has unknown fields
    #[error("Spec source error in {path}: {message}")]
    Source {
        /// Source file
        path: String,
        /// Parser message
        message: String,
    },

    /// Spec source could not be read
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl SpecError {
    /// Violations carried by an `Invalid` error
    pub fn violations(&self) -> &[Violation] {
        match self {
            SpecError::Invalid(e) => &e.violations,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_spec_lists_every_violation() {
        let err = InvalidSpecError {
            violations: vec![
                Violation::new(Some("t21"), "tasks must be positive"),
                Violation::new(None, "duplicate experiment id 't21'"),
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("invalid benchmark spec (2 problems)"));
        assert!(text.contains("[t21] tasks must be positive"));
        assert!(text.contains("- duplicate experiment id 't21'"));
    }
}
