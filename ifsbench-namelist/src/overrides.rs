//! Namelist Overrides
//!
//! Targeted edits applied on top of a composed configuration. The string form
//! is what users pass on the command line:
//!
//! | Form | Operation |
//! |------|-----------|
//! | `GROUP/KEY=VALUE` | set (creates the group if missing) |
//! | `GROUP/KEY+=VALUE` | append a scalar to an array |
//! | `GROUP/KEY-` | delete (no-op if absent) |

use crate::error::{ConfigError, FormatError, Result};
use crate::model::{Namelist, is_reserved_group_name, is_valid_name};
use crate::parser::parse_value;
use crate::value::{Array, Scalar, Value};
use crate::writer::value_text;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// What an override does to its key
#[derive(Debug, Clone, PartialEq)]
pub enum OverrideOp {
    /// Replace (or create) the value
    Set(Value),
    /// Append one element to an array
    Append(Scalar),
    /// Remove the key
    Delete,
}

/// An edit of a single `group.key`
#[derive(Debug, Clone, PartialEq)]
pub struct NamelistOverride {
    /// Group name
    pub group: String,
    /// Key name
    pub key: String,
    /// Operation
    pub op: OverrideOp,
}

impl NamelistOverride {
    /// Set `group.key` to `value`
    pub fn set(group: impl Into<String>, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            group: group.into(),
            key: key.into(),
            op: OverrideOp::Set(value.into()),
        }
    }

    /// Append `value` to the array at `group.key`
    pub fn append(group: impl Into<String>, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self {
            group: group.into(),
            key: key.into(),
            op: OverrideOp::Append(value.into()),
        }
    }

    /// Delete `group.key`
    pub fn delete(group: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            key: key.into(),
            op: OverrideOp::Delete,
        }
    }

    /// Apply to `namelist`, returning the edited copy
    pub fn apply(&self, namelist: &Namelist) -> Result<Namelist> {
        match &self.op {
            OverrideOp::Set(value) => {
                debug!(group = %self.group, key = %self.key, %value, "Set namelist entry");
                namelist.with_override(&self.group, &self.key, value.clone())
            }
            OverrideOp::Append(scalar) => {
                let array = match namelist.group(&self.group).and_then(|g| g.get(&self.key)) {
                    None => Array::from_values([scalar.clone()]),
                    Some(Value::Array(existing)) => {
                        if let Some(kind) = existing.element_kind() {
                            if kind != scalar.kind() {
                                return Err(self.mismatch(format!("{}[]", kind), scalar.kind().to_string()));
                            }
                        }
                        if existing.upper_bound() == usize::MAX {
                            return Err(FormatError::new(
                                1,
                                Some(&self.group),
                                format!("cannot append to '{}': last index is already usize::MAX", self.key),
                            )
                            .into());
                        }
                        let mut array = existing.clone();
                        array.push(scalar.clone());
                        array
                    }
                    Some(other) => {
                        return Err(self.mismatch("array".to_string(), other.type_name()));
                    }
                };
                debug!(group = %self.group, key = %self.key, value = %scalar, "Append to namelist entry");
                namelist.with_override(&self.group, &self.key, Value::Array(array))
            }
            OverrideOp::Delete => {
                debug!(group = %self.group, key = %self.key, "Delete namelist entry");
                Ok(namelist.without_key(&self.group, &self.key))
            }
        }
    }

    fn mismatch(&self, expected: String, found: String) -> ConfigError {
        ConfigError::TypeMismatch {
            group: self.group.clone(),
            key: self.key.clone(),
            expected,
            found,
        }
    }
}

/// Apply overrides in order
pub fn apply_all(namelist: &Namelist, overrides: &[NamelistOverride]) -> Result<Namelist> {
    let mut current = namelist.clone();
    for o in overrides {
        current = o.apply(&current)?;
    }
    Ok(current)
}

impl FromStr for NamelistOverride {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |message: String| ConfigError::Format(FormatError::new(1, None, message));

        let (group, rest) = s
            .split_once('/')
            .ok_or_else(|| invalid(format!("override '{}' must look like GROUP/KEY=VALUE", s)))?;
        let group = group.trim();
        if group.is_empty() {
            return Err(invalid(format!("override '{}' has no group", s)));
        }
        if !is_valid_name(group) || is_reserved_group_name(group) {
            return Err(invalid(format!("override '{}' has invalid group name '{}'", s, group)));
        }

        let (key, op) = if let Some((key, value)) = rest.split_once("+=") {
            let value = parse_value(value.trim())?;
            let Value::Scalar(scalar) = value else {
                return Err(invalid(format!("override '{}' can only append a single value", s)));
            };
            (key, OverrideOp::Append(scalar))
        } else if let Some((key, value)) = rest.split_once('=') {
            (key, OverrideOp::Set(parse_value(value.trim())?))
        } else if let Some(key) = rest.trim_end().strip_suffix('-') {
            (key, OverrideOp::Delete)
        } else {
            return Err(invalid(format!(
                "override '{}' needs '=VALUE', '+=VALUE' or a trailing '-'",
                s
            )));
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(invalid(format!("override '{}' has no key", s)));
        }
        if !is_valid_name(key) {
            return Err(invalid(format!("override '{}' has invalid key name '{}'", s, key)));
        }
        Ok(Self {
            group: group.to_string(),
            key: key.to_string(),
            op,
        })
    }
}

impl fmt::Display for NamelistOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            OverrideOp::Set(value) => match value_text(value) {
                Some(text) => write!(f, "{}/{}={}", self.group, self.key, text),
                None => write!(f, "{}/{}={}", self.group, self.key, value),
            },
            OverrideOp::Append(scalar) => {
                let text = value_text(&Value::Scalar(scalar.clone())).unwrap_or_default();
                write!(f, "{}/{}+={}", self.group, self.key, text)
            }
            OverrideOp::Delete => write!(f, "{}/{}-", self.group, self.key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Namelist {
        Namelist::builder()
            .set("NAMPAR0", "NPROC", 4)
            .set("NAMPAR0", "NLIST", Array::from_values([1, 2]))
            .build()
            .unwrap()
    }

    #[test]
    fn test_parse_forms() {
        let set: NamelistOverride = "NAMPAR0/NPROC=8".parse().unwrap();
        assert_eq!(set, NamelistOverride::set("NAMPAR0", "NPROC", 8));

        let list: NamelistOverride = "NAMX/R = 1.0, 2.0".parse().unwrap();
        assert_eq!(list.op, OverrideOp::Set(Value::Array(Array::from_values([1.0, 2.0]))));

        let append: NamelistOverride = "NAMPAR0/NLIST+=3".parse().unwrap();
        assert_eq!(append, NamelistOverride::append("NAMPAR0", "NLIST", 3));

        let delete: NamelistOverride = "NAMPAR0/NPROC-".parse().unwrap();
        assert_eq!(delete, NamelistOverride::delete("NAMPAR0", "NPROC"));

        assert!("NPROC=8".parse::<NamelistOverride>().is_err());
        assert!("NAMPAR0/NPROC".parse::<NamelistOverride>().is_err());
        assert!("NAMPAR0/=1".parse::<NamelistOverride>().is_err());
        assert!("NAMPAR0/NLIST+=1,2".parse::<NamelistOverride>().is_err());
    }

    #[test]
    fn test_parse_rejects_unwritable_names() {
        for text in ["NAMCT0/X-=1", "NAMCT0/A B=1", "NAM CT0/X=1", "END/X=1", "NAMCT0/X%Y=1", "NAMCT0/X(1)=1"] {
            let err = text.parse::<NamelistOverride>().unwrap_err();
            assert!(err.to_string().contains("invalid"), "{}: {}", text, err);
        }
        // Surrounding whitespace is trimmed before the check
        assert!(" NAMCT0 / NSTOP =1".parse::<NamelistOverride>().is_ok());
    }

    #[test]
    fn test_apply_rejects_unwritable_names() {
        let err = NamelistOverride::set("NAMCT0", "X-", 1).apply(&base()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidName(_)));
    }

    #[test]
    fn test_display_round_trips() {
        for text in ["NAMPAR0/NPROC=8", "NAMCT0/CNMEXP='hbas'", "A/B+=.TRUE.", "A/B-", "A/R=1.5, 2.0"] {
            let parsed: NamelistOverride = text.parse().unwrap();
            assert_eq!(parsed.to_string(), text);
        }
    }

    #[test]
    fn test_set_creates_group() {
        let next = NamelistOverride::set("NEW", "K", "v").apply(&base()).unwrap();
        assert_eq!(next.get("NEW", "K").unwrap(), &Value::from("v"));
    }

    #[test]
    fn test_append() {
        let next = NamelistOverride::append("NAMPAR0", "NLIST", 3)
            .apply(&base())
            .unwrap();
        assert_eq!(
            next.get("NAMPAR0", "NLIST").unwrap(),
            &Value::Array(Array::from_values([1, 2, 3]))
        );

        let created = NamelistOverride::append("NAMPAR0", "NEWLIST", 1.5)
            .apply(&base())
            .unwrap();
        assert_eq!(
            created.get("NAMPAR0", "NEWLIST").unwrap(),
            &Value::Array(Array::from_values([1.5]))
        );
    }

    #[test]
    fn test_append_type_errors() {
        let err = NamelistOverride::append("NAMPAR0", "NLIST", "x")
            .apply(&base())
            .unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));

        let err = NamelistOverride::append("NAMPAR0", "NPROC", 1)
            .apply(&base())
            .unwrap_err();
        assert!(err.to_string().contains("expected array"));

        let full = Namelist::builder()
            .set("A", "X", Value::Array(Array::with_start(usize::MAX, [1])))
            .build()
            .unwrap();
        let err = NamelistOverride::append("A", "X", 2).apply(&full).unwrap_err();
        assert!(matches!(err, ConfigError::Format(_)));
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let nml = base();
        assert_eq!(NamelistOverride::delete("NOPE", "X").apply(&nml).unwrap(), nml);
        assert_eq!(NamelistOverride::delete("NAMPAR0", "X").apply(&nml).unwrap(), nml);

        let next = NamelistOverride::delete("nampar0", "nproc").apply(&nml).unwrap();
        assert!(next.get("NAMPAR0", "NPROC").is_err());
    }

    #[test]
    fn test_apply_all_in_order() {
        let overrides = vec![
            NamelistOverride::set("A", "X", 1),
            NamelistOverride::set("A", "X", 2),
            NamelistOverride::delete("NAMPAR0", "NLIST"),
        ];
        let next = apply_all(&base(), &overrides).unwrap();
        assert_eq!(next.get("A", "X").unwrap(), &Value::from(2));
        assert!(next.get("NAMPAR0", "NLIST").is_err());
    }
}
