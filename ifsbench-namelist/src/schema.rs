//! Namelist Schema
//!
//! Optional per-key type declarations. A schema is loaded from TOML:
//!
//! ```toml
//! [NAMPAR0]
//! NPROC = "int"
//! LSTATS = "bool"
//!
//! [NAMDYN]
//! REXTRA = "float[4]"
//! ```
//!
//! Keys absent from the schema are accepted untyped.

use crate::error::{ConfigError, FormatError, Result};
use crate::model::normalize;
use crate::value::{Array, Scalar, ScalarKind, Value};
use indexmap::IndexMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Declared type of a namelist key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSpec {
    /// Single scalar
    Scalar(ScalarKind),
    /// Array of scalars with an optional fixed upper bound
    Array {
        /// Element type
        element: ScalarKind,
        /// Highest allowed index
        bound: Option<usize>,
    },
    /// Nested record
    Record,
}

fn parse_kind(s: &str) -> Option<ScalarKind> {
    match s {
        "bool" => Some(ScalarKind::Bool),
        "int" => Some(ScalarKind::Int),
        "float" => Some(ScalarKind::Float),
        "str" => Some(ScalarKind::Str),
        _ => None,
    }
}

impl FromStr for TypeSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s == "record" {
            return Ok(TypeSpec::Record);
        }
        if let Some(open) = s.find('[') {
            let element = parse_kind(&s[..open]).ok_or_else(|| format!("unknown type '{}'", s))?;
            let inner = s[open + 1..]
                .strip_suffix(']')
                .ok_or_else(|| format!("unterminated array type '{}'", s))?;
            let bound = if inner.is_empty() {
                None
            } else {
                let n: usize = inner
                    .parse()
                    .map_err(|_| format!("invalid array bound in '{}'", s))?;
                if n == 0 {
                    return Err(format!("array bound must be positive in '{}'", s));
                }
                Some(n)
            };
            return Ok(TypeSpec::Array { element, bound });
        }
        parse_kind(&s)
            .map(TypeSpec::Scalar)
            .ok_or_else(|| format!("unknown type '{}'", s))
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Scalar(kind) => write!(f, "{}", kind),
            TypeSpec::Array {
                element,
                bound: Some(n),
            } => write!(f, "{}[{}]", element, n),
            TypeSpec::Array { element, bound: None } => write!(f, "{}[]", element),
            TypeSpec::Record => f.write_str("record"),
        }
    }
}

/// Type declarations keyed by group and key (case-insensitive)
#[derive(Debug, Clone, Default)]
pub struct Schema {
    groups: IndexMap<String, IndexMap<String, TypeSpec>>,
}

impl Schema {
    /// Empty schema (accepts everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the type of `group.key`
    pub fn declare(&mut self, group: &str, key: &str, spec: TypeSpec) -> &mut Self {
        self.groups
            .entry(normalize(group))
            .or_default()
            .insert(normalize(key), spec);
        self
    }

    /// Declared type of `group.key`, if any
    pub fn lookup(&self, group: &str, key: &str) -> Option<TypeSpec> {
        self.groups
            .get(&normalize(group))
            .and_then(|keys| keys.get(&normalize(key)))
            .copied()
    }

    /// Number of declared keys
    pub fn len(&self) -> usize {
        self.groups.values().map(IndexMap::len).sum()
    }

    /// Whether nothing is declared
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parse a TOML schema document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(text).map_err(|e| {
            let line = e
                .span()
                .map(|span| text[..span.start].lines().count().max(1))
                .unwrap_or(0);
            FormatError::new(line, None, e.message().to_string())
        })?;

        let mut schema = Schema::new();
        for (group, keys) in &table {
            let keys = keys.as_table().ok_or_else(|| {
                FormatError::new(0, Some(group), "schema groups must be tables")
            })?;
            for (key, spec) in keys {
                let spec = spec
                    .as_str()
                    .ok_or_else(|| {
                        FormatError::new(0, Some(group), format!("type of '{}' must be a string", key))
                    })?
                    .parse::<TypeSpec>()
                    .map_err(|msg| FormatError::new(0, Some(group), format!("{}: {}", key, msg)))?;
                schema.declare(group, key, spec);
            }
        }
        Ok(schema)
    }

    /// Load a TOML schema file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Type `value` against the declaration for `group.key`.
    ///
    /// Integers widen to floats, and a scalar assigned to an array key becomes
    /// element 1. Undeclared keys pass through unchanged.
    pub fn coerce(&self, group: &str, key: &str, value: Value) -> Result<Value> {
        let Some(spec) = self.lookup(group, key) else {
            return Ok(value);
        };
        let mismatch = |found: String| ConfigError::TypeMismatch {
            group: group.to_string(),
            key: key.to_string(),
            expected: spec.to_string(),
            found,
        };

        match (spec, value) {
            (TypeSpec::Scalar(kind), Value::Scalar(s)) => {
                let found = s.kind();
                coerce_scalar(kind, s)
                    .map(Value::Scalar)
                    .ok_or_else(|| mismatch(found.to_string()))
            }
            (TypeSpec::Record, value @ Value::Record(_)) => Ok(value),
            (TypeSpec::Array { element, .. }, Value::Scalar(s)) => {
                let found = s.kind();
                let s = coerce_scalar(element, s).ok_or_else(|| mismatch(found.to_string()))?;
                Ok(Value::Array(Array::from_values([s])))
            }
            (TypeSpec::Array { element, bound }, Value::Array(array)) => {
                if bound.is_some_and(|n| array.upper_bound() > n) {
                    let kind = array.element_kind().unwrap_or(element);
                    return Err(mismatch(format!("{}[{}]", kind, array.upper_bound())));
                }
                let mut typed = Array::new();
                for (index, s) in array.iter() {
                    let found = s.kind();
                    let s = coerce_scalar(element, s.clone())
                        .ok_or_else(|| mismatch(format!("{}[]", found)))?;
                    typed.insert(index, s);
                }
                Ok(Value::Array(typed))
            }
            (_, other) => Err(mismatch(other.type_name())),
        }
    }
}

fn coerce_scalar(kind: ScalarKind, value: Scalar) -> Option<Scalar> {
    match (kind, value) {
        (ScalarKind::Float, Scalar::Int(i)) => Some(Scalar::Float(i as f64)),
        (kind, value) if value.kind() == kind => Some(value),
        _ => None,
    }
}
