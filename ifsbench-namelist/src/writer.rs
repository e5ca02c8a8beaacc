//! Namelist Writer
//!
//! Serializes a [`Namelist`] back to the text format read by [`crate::parser`].
//! Output is deterministic for a given model, which makes it the canonical form
//! hashed by layer fingerprints and effective-config digests.

use crate::error::{ConfigError, Result};
use crate::model::Namelist;
use crate::value::{Array, Scalar, Value};
use std::fmt::{self, Write as _};
use std::path::Path;

/// Writer options
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Uppercase group names, keys and logicals
    pub uppercase: bool,
    /// Trailing comma after each assignment
    pub end_comma: bool,
    /// Indentation of assignments
    pub indent: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            uppercase: true,
            end_comma: true,
            indent: 4,
        }
    }
}

/// Serialize with default options
pub fn to_string(namelist: &Namelist) -> String {
    to_string_with(namelist, &WriteOptions::default())
}

/// Serialize with explicit options
pub fn to_string_with(namelist: &Namelist, options: &WriteOptions) -> String {
    let mut out = String::new();
    for (n, group) in namelist.groups().enumerate() {
        if n > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "&{}", options.name(group.name()));
        for (key, value) in group.iter() {
            write_assignment(&mut out, &options.name(key), value, options);
        }
        out.push_str("/\n");
    }
    out
}

/// Write a namelist file
pub fn write_file(namelist: &Namelist, path: &Path, options: &WriteOptions) -> Result<()> {
    std::fs::write(path, to_string_with(namelist, options)).map_err(|e| ConfigError::io(path, e))
}

impl WriteOptions {
    fn name(&self, name: &str) -> String {
        if self.uppercase {
            name.to_ascii_uppercase()
        } else {
            name.to_string()
        }
    }

    fn scalar(&self, value: &Scalar) -> String {
        match value {
            Scalar::Bool(b) => {
                let text = if *b { ".true." } else { ".false." };
                if self.uppercase {
                    text.to_ascii_uppercase()
                } else {
                    text.to_string()
                }
            }
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(x) => format!("{:?}", x),
            Scalar::Str(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

fn write_assignment(out: &mut String, target: &str, value: &Value, options: &WriteOptions) {
    match value {
        Value::Scalar(s) => write_line(out, target, &options.scalar(s), options),
        Value::Array(array) => write_array(out, target, array, options),
        Value::Record(record) => {
            for (field, value) in record.iter() {
                let target = format!("{}%{}", target, options.name(field));
                write_assignment(out, &target, value, options);
            }
        }
    }
}

/// Contiguous arrays of two or more elements use the plain form; anything
/// else is written per run so that it reads back as an array.
fn write_array(out: &mut String, target: &str, array: &Array, options: &WriteOptions) {
    if array.is_contiguous() && array.len() > 1 {
        let values: Vec<String> = array.iter().map(|(_, v)| options.scalar(v)).collect();
        write_line(out, target, &values.join(", "), options);
        return;
    }
    for (start, values) in array.runs() {
        let values: Vec<String> = values.into_iter().map(|v| options.scalar(v)).collect();
        write_line(out, &format!("{}({})", target, start), &values.join(", "), options);
    }
}

/// Right-hand side text of a scalar or contiguous array assignment
pub(crate) fn value_text(value: &Value) -> Option<String> {
    let options = WriteOptions::default();
    match value {
        Value::Scalar(s) => Some(options.scalar(s)),
        Value::Array(array) if array.is_contiguous() => {
            let values: Vec<String> = array.iter().map(|(_, v)| options.scalar(v)).collect();
            Some(values.join(", "))
        }
        _ => None,
    }
}

fn write_line(out: &mut String, target: &str, rhs: &str, options: &WriteOptions) {
    let comma = if options.end_comma { "," } else { "" };
    let _ = writeln!(out, "{:indent$}{} = {}{}", "", target, rhs, comma, indent = options.indent);
}

impl fmt::Display for Namelist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_string(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Group;
    use crate::parser::parse_str;

    fn sample() -> Namelist {
        let mut record = Group::new("yrec").unwrap();
        record.insert("n", Value::from(2)).unwrap();
        record.insert("label", Value::from("a'b")).unwrap();

        let mut sparse = Array::with_start(2, [1.5, 2.5]);
        sparse.insert(7, Scalar::Float(-3.0));

        Namelist::builder()
            .set("nampar0", "nproc", 4)
            .set("nampar0", "lstats", false)
            .set("namdyn", "rlist", Array::from_values([1, 2, 3]))
            .set("namdyn", "sparse", sparse)
            .set("namdyn", "single", Array::from_values(["x"]))
            .set("namdyn", "yrec", record)
            .group("namct0")
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_output() {
        let text = to_string(&sample());
        let expected = "\
&NAMPAR0
    NPROC = 4,
    LSTATS = .FALSE.,
/

&NAMDYN
    RLIST = 1, 2, 3,
    SPARSE(2) = 1.5, 2.5,
    SPARSE(7) = -3.0,
    SINGLE(1) = 'x',
    YREC%N = 2,
    YREC%LABEL = 'a''b',
/

&NAMCT0
/
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_lowercase_without_commas() {
        let options = WriteOptions {
            uppercase: false,
            end_comma: false,
            indent: 2,
        };
        let text = to_string_with(&sample(), &options);
        assert!(text.starts_with("&nampar0\n  nproc = 4\n  lstats = .false.\n/\n"));
    }

    #[test]
    fn test_round_trip() {
        let nml = sample();
        assert_eq!(parse_str(&to_string(&nml)).unwrap(), nml);
    }

    #[test]
    fn test_write_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fort.4");
        write_file(&sample(), &path, &WriteOptions::default()).unwrap();
        let read = crate::parser::parse_file(&path, &Default::default()).unwrap();
        assert_eq!(read, sample());
    }
}
