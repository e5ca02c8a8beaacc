//! Namelist Errors

use thiserror::Error;

/// Text-format error, located by line and (when known) group
#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line}{}: {message}", group.as_ref().map(|g| format!(" in group &{}", g)).unwrap_or_default())]
pub struct FormatError {
    /// 1-based line number
    pub line: usize,
    /// Group being parsed when the error occurred
    pub group: Option<String>,
    /// What went wrong
    pub message: String,
}

impl FormatError {
    pub(crate) fn new(line: usize, group: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            line,
            group: group.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Errors raised while building, reading or transforming a namelist
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Same key assigned twice in one group (case-insensitive)
    #[error("Duplicate key '{key}' in group '{group}'")]
    DuplicateKey {
        /// Group name
        group: String,
        /// Offending key
        key: String,
    },

    /// Group, key or record field name that is not a Fortran identifier
    #[error("Invalid name '{0}'")]
    InvalidName(String),

    /// Same group defined twice while duplicates are rejected
    #[error("Duplicate group '{0}'")]
    DuplicateGroup(String),

    /// Value does not match the declared type
    #[error("Type mismatch for {group}.{key}: expected {expected}, got {found}")]
    TypeMismatch {
        /// Group name
        group: String,
        /// Key name
        key: String,
        /// Declared or existing type
        expected: String,
        /// Supplied type
        found: String,
    },

    /// Lookup of an unset key
    #[error("Key '{key}' not found in group '{group}'")]
    KeyNotFound {
        /// Group name
        group: String,
        /// Key name
        key: String,
    },

    /// Empty array or empty record supplied as a value
    #[error("Empty value for {group}.{key}")]
    EmptyValue {
        /// Group name
        group: String,
        /// Key name
        key: String,
    },

    /// Malformed namelist text, schema or override string
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// File could not be read or written
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Result alias for namelist operations
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_display() {
        let err = FormatError::new(12, Some("NAMPAR0"), "unexpected ')'");
        assert_eq!(err.to_string(), "line 12 in group &NAMPAR0: unexpected ')'");

        let err = FormatError::new(1, None, "expected '&'");
        assert_eq!(err.to_string(), "line 1: expected '&'");
    }
}
