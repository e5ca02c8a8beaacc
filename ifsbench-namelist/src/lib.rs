#![warn(missing_docs)]
//! ifsbench Namelist Engine
//!
//! Typed Fortran namelists for benchmark configuration:
//! - A structurally shared model with copy-on-write edits
//! - Reader and writer for the namelist text format, with optional schema typing
//! - Ordered layer composition into a fingerprinted effective configuration
//! - Structural diff with float tolerance and per-element array mode
//! - `GROUP/KEY=VALUE` style overrides

mod cache;
mod compose;
mod diff;
mod error;
mod model;
mod overrides;
mod parser;
mod schema;
mod value;
mod writer;

pub use cache::ConfigCache;
pub use compose::{ConfigLayer, EffectiveConfig, LayerIdentity, Provenance, compose};
pub use diff::{ArrayDiffMode, Change, ChangeKind, DiffOptions, DiffReport, diff};
pub use error::{ConfigError, FormatError, Result};
pub use model::{Group, Namelist, NamelistBuilder, is_valid_name};
pub use overrides::{NamelistOverride, OverrideOp, apply_all};
pub use parser::{
    GroupMergeStrategy, MAX_VALUES, ParseOptions, parse_file, parse_literal, parse_str, parse_str_with,
    parse_value,
};
pub use schema::{Schema, TypeSpec};
pub use value::{Array, Scalar, ScalarKind, Value};
pub use writer::{WriteOptions, to_string, to_string_with, write_file};

/// File name the model reads its namelist from unless a spec says otherwise
pub const DEFAULT_NAMELIST_FILE: &str = "fort.4";

impl Namelist {
    /// Read a namelist file
    pub fn from_file(path: &std::path::Path, options: &ParseOptions) -> Result<Self> {
        parse_file(path, options)
    }
}

impl std::str::FromStr for Namelist {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        parse_str(s)
    }
}
