//! Typed Namelist Values
//!
//! A namelist entry holds exactly one of:
//! - a scalar (logical, integer, real, character)
//! - a 1-indexed array of scalars, possibly sparse (`KEY(3) = ...` only sets index 3)
//! - a nested record (`KEY%FIELD = ...`)
//!
//! Equality is typed: `1` and `1.0` are different values. Floats compare exactly
//! unless a relative tolerance is supplied through [`Value::approx_eq`].

use crate::model::Group;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Scalar namelist value
#[derive(Debug, Clone)]
pub enum Scalar {
    /// Fortran logical
    Bool(bool),
    /// Fortran integer
    Int(i64),
    /// Fortran real
    Float(f64),
    /// Fortran character string
    Str(String),
}

/// Type tag of a scalar, used for schema checks and error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// Logical
    Bool,
    /// Integer
    Int,
    /// Real
    Float,
    /// Character string
    Str,
}

impl ScalarKind {
    /// Short lowercase name (`bool`, `int`, `float`, `str`)
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
            ScalarKind::Str => "str",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compare two floats with a relative tolerance.
///
/// A tolerance of zero means exact equality. NaN equals NaN so that every value
/// is equal to itself. Infinities only ever equal themselves.
pub(crate) fn floats_close(a: f64, b: f64, tolerance: f64) -> bool {
    if a == b || (a.is_nan() && b.is_nan()) {
        return true;
    }
    if tolerance <= 0.0 || !a.is_finite() || !b.is_finite() {
        return false;
    }
    (a - b).abs() <= tolerance * a.abs().max(b.abs())
}

impl Scalar {
    /// Type tag of this scalar
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::Bool(_) => ScalarKind::Bool,
            Scalar::Int(_) => ScalarKind::Int,
            Scalar::Float(_) => ScalarKind::Float,
            Scalar::Str(_) => ScalarKind::Str,
        }
    }

    /// Typed comparison; floats use `tolerance` as a relative bound
    pub fn approx_eq(&self, other: &Scalar, tolerance: f64) -> bool {
        match (self, other) {
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Int(a), Scalar::Int(b)) => a == b,
            (Scalar::Float(a), Scalar::Float(b)) => floats_close(*a, *b, tolerance),
            (Scalar::Str(a), Scalar::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.approx_eq(other, 0.0)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{:?}", x),
            Scalar::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(v as i64)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Str(v)
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Int(i) => serializer.serialize_i64(*i),
            Scalar::Float(x) => serializer.serialize_f64(*x),
            Scalar::Str(s) => serializer.serialize_str(s),
        }
    }
}

/// 1-indexed array of scalars.
///
/// Only assigned indices are stored, in ascending order. An array is never
/// allowed to hold an undefined element.
#[derive(Debug, Clone, Default)]
pub struct Array {
    elements: BTreeMap<usize, Scalar>,
}

impl Array {
    /// Create an empty array
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an array whose elements start at index 1
    pub fn from_values<T: Into<Scalar>>(values: impl IntoIterator<Item = T>) -> Self {
        Self::with_start(1, values)
    }

    /// Create an array whose first element sits at `start` (1-based)
    ///
    /// # Panics
    /// Panics if `start` is zero.
    pub fn with_start<T: Into<Scalar>>(start: usize, values: impl IntoIterator<Item = T>) -> Self {
        let mut array = Self::new();
        for (offset, value) in values.into_iter().enumerate() {
            array.insert(start + offset, value.into());
        }
        array
    }

    /// Set the element at `index`, returning the previous element if any
    ///
    /// # Panics
    /// Panics if `index` is zero; namelist arrays are 1-indexed.
    pub fn insert(&mut self, index: usize, value: Scalar) -> Option<Scalar> {
        assert!(index >= 1, "namelist arrays are 1-indexed");
        self.elements.insert(index, value)
    }

    /// Append after the current upper bound, returning the new index
    pub fn push(&mut self, value: Scalar) -> usize {
        let index = self.upper_bound() + 1;
        self.elements.insert(index, value);
        index
    }

    /// Element at a 1-based index
    pub fn get(&self, index: usize) -> Option<&Scalar> {
        self.elements.get(&index)
    }

    /// Number of assigned elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether no element is assigned
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Highest assigned index (0 for an empty array)
    pub fn upper_bound(&self) -> usize {
        self.elements.keys().next_back().copied().unwrap_or(0)
    }

    /// Whether the assigned indices are exactly `1..=len`
    pub fn is_contiguous(&self) -> bool {
        self.upper_bound() == self.len()
    }

    /// Iterate `(index, element)` pairs in index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Scalar)> {
        self.elements.iter().map(|(i, v)| (*i, v))
    }

    /// Type of the first element, if any
    pub fn element_kind(&self) -> Option<ScalarKind> {
        self.elements.values().next().map(Scalar::kind)
    }

    /// Split into runs of consecutive indices: `(start, elements)`
    pub fn runs(&self) -> Vec<(usize, Vec<&Scalar>)> {
        let mut runs: Vec<(usize, Vec<&Scalar>)> = Vec::new();
        for (index, value) in self.iter() {
            match runs.last_mut() {
                Some((start, values)) if *start + values.len() == index => values.push(value),
                _ => runs.push((index, vec![value])),
            }
        }
        runs
    }

    /// Element-wise typed comparison
    pub fn approx_eq(&self, other: &Array, tolerance: f64) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|((ia, a), (ib, b))| ia == ib && a.approx_eq(b, tolerance))
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        self.approx_eq(other, 0.0)
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        let contiguous = self.is_contiguous();
        for (n, (index, value)) in self.iter().enumerate() {
            if n > 0 {
                f.write_str(", ")?;
            }
            if contiguous {
                write!(f, "{}", value)?;
            } else {
                write!(f, "{}: {}", index, value)?;
            }
        }
        f.write_str("]")
    }
}

impl Serialize for Array {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_contiguous() {
            let mut seq = serializer.serialize_seq(Some(self.len()))?;
            for (_, value) in self.iter() {
                seq.serialize_element(value)?;
            }
            seq.end()
        } else {
            let mut map = serializer.serialize_map(Some(self.len()))?;
            for (index, value) in self.iter() {
                map.serialize_entry(&index.to_string(), value)?;
            }
            map.end()
        }
    }
}

/// A namelist value
#[derive(Debug, Clone)]
pub enum Value {
    /// Single scalar
    Scalar(Scalar),
    /// 1-indexed array of scalars
    Array(Array),
    /// Nested record (derived type)
    Record(Group),
}

impl Value {
    /// Type description used in error messages (`int`, `float[]`, `record`)
    pub fn type_name(&self) -> String {
        match self {
            Value::Scalar(s) => s.kind().name().to_string(),
            Value::Array(a) => match a.element_kind() {
                Some(kind) => format!("{}[]", kind),
                None => "[]".to_string(),
            },
            Value::Record(_) => "record".to_string(),
        }
    }

    /// Typed comparison; floats (also inside arrays and records) use `tolerance`
    pub fn approx_eq(&self, other: &Value, tolerance: f64) -> bool {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => a.approx_eq(b, tolerance),
            (Value::Array(a), Value::Array(b)) => a.approx_eq(b, tolerance),
            (Value::Record(a), Value::Record(b)) => a.approx_eq(b, tolerance),
            _ => false,
        }
    }

    /// Scalar payload, if this is a scalar
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Array payload, if this is an array
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Record payload, if this is a record
    pub fn as_record(&self) -> Option<&Group> {
        match self {
            Value::Record(g) => Some(g),
            _ => None,
        }
    }

    /// Integer payload
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Scalar(Scalar::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Float payload
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Scalar(Scalar::Float(x)) => Some(*x),
            _ => None,
        }
    }

    /// Logical payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// String payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(Scalar::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Whether this value carries no data (empty array or empty record)
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Scalar(_) => false,
            Value::Array(a) => a.is_empty(),
            Value::Record(g) => g.is_empty(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.approx_eq(other, 0.0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => write!(f, "{}", s),
            Value::Array(a) => write!(f, "{}", a),
            Value::Record(g) => {
                f.write_str("{")?;
                for (n, (key, value)) in g.iter().enumerate() {
                    if n > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} = {}", key, value)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Scalar(s) => s.serialize(serializer),
            Value::Array(a) => a.serialize(serializer),
            Value::Record(g) => g.serialize(serializer),
        }
    }
}

impl From<Scalar> for Value {
    fn from(v: Scalar) -> Self {
        Value::Scalar(v)
    }
}

impl From<Array> for Value {
    fn from(v: Array) -> Self {
        Value::Array(v)
    }
}

impl From<Group> for Value {
    fn from(v: Group) -> Self {
        Value::Record(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Scalar(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Scalar(v.into())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Scalar(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Scalar(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Scalar(v.into())
    }
}
