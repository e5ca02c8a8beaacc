//! Namelist Model
//!
//! A [`Namelist`] is an ordered collection of [`Group`]s, each an ordered map from
//! case-insensitive keys to typed [`Value`]s. Groups sit behind `Arc`s so that
//! copy-on-write transformations clone only the group they touch; the rest of the
//! model stays shared with the original.

use crate::error::{ConfigError, Result};
use crate::schema::Schema;
use crate::value::Value;
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::sync::Arc;

/// Lookup form of a group or key name
pub(crate) fn normalize(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Whether `name` is a Fortran identifier: a letter or `_`, then letters, digits or `_`
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `&END` terminates a group, so it can never open one
pub(crate) fn is_reserved_group_name(name: &str) -> bool {
    name.eq_ignore_ascii_case("end")
}

pub(crate) fn check_name(name: &str) -> Result<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidName(name.to_string()))
    }
}

pub(crate) fn check_group_name(name: &str) -> Result<()> {
    check_name(name)?;
    if is_reserved_group_name(name) {
        return Err(ConfigError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Named, ordered set of key/value assignments
#[derive(Debug, Clone)]
pub struct Group {
    name: String,
    /// Normalized key -> (key as written, value)
    entries: IndexMap<String, (String, Value)>,
}

impl Group {
    /// Create an empty group; `name` must be a valid identifier
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        check_name(&name)?;
        Ok(Self::unchecked(name))
    }

    /// Nameless group used as the missing side of a comparison
    pub(crate) fn empty() -> Self {
        Self::unchecked(String::new())
    }

    fn unchecked(name: String) -> Self {
        Self {
            name,
            entries: IndexMap::new(),
        }
    }

    /// Group name as written
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case-insensitive lookup
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(&normalize(key)).map(|(_, v)| v)
    }

    /// Whether `key` is set
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&normalize(key))
    }

    /// Add a new key, rejecting duplicates and empty values
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        self.check_entry(&key, &value)?;
        let norm = normalize(&key);
        if self.entries.contains_key(&norm) {
            return Err(ConfigError::DuplicateKey {
                group: self.name.clone(),
                key,
            });
        }
        self.entries.insert(norm, (key, value));
        Ok(())
    }

    /// Set a key, replacing any previous value in place
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Result<Option<Value>> {
        let key = key.into();
        self.check_entry(&key, &value)?;
        Ok(self.entries.insert(normalize(&key), (key, value)).map(|(_, v)| v))
    }

    /// Overwrite entries with those of `other`, which is already validated
    pub(crate) fn merge_from(&mut self, other: &Group) {
        for (norm, (key, value)) in &other.entries {
            self.entries.insert(norm.clone(), (key.clone(), value.clone()));
        }
    }

    /// Remove a key, preserving the order of the remaining ones
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(&normalize(key)).map(|(_, v)| v)
    }

    /// Iterate `(key, value)` pairs in assignment order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys in assignment order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|(k, _)| k.as_str())
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the group has no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Order-insensitive comparison of the entries with a float tolerance.
    ///
    /// The group name is not compared; callers match groups by name.
    pub fn approx_eq(&self, other: &Group, tolerance: f64) -> bool {
        self.len() == other.len()
            && self.entries.iter().all(|(norm, (_, value))| {
                other
                    .entries
                    .get(norm)
                    .is_some_and(|(_, theirs)| value.approx_eq(theirs, tolerance))
            })
    }

    fn check_entry(&self, key: &str, value: &Value) -> Result<()> {
        check_name(key)?;
        if value.is_empty() {
            return Err(ConfigError::EmptyValue {
                group: self.name.clone(),
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.approx_eq(other, 0.0)
    }
}

impl Serialize for Group {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Ordered collection of namelist groups with structural sharing
#[derive(Debug, Clone, Default)]
pub struct Namelist {
    groups: Arc<IndexMap<String, Arc<Group>>>,
}

impl Namelist {
    /// Create an empty namelist
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a builder
    pub fn builder() -> NamelistBuilder {
        NamelistBuilder::default()
    }

    /// Build from raw `(group, key, value)` triples.
    ///
    /// Groups are created in order of first appearance. Duplicate keys within a
    /// group raise `DuplicateKey`; with a schema every value is typed (and
    /// coerced) against its declaration.
    pub fn from_entries<G, K>(
        entries: impl IntoIterator<Item = (G, K, Value)>,
        schema: Option<&Schema>,
    ) -> Result<Self>
    where
        G: Into<String>,
        K: Into<String>,
    {
        let mut builder = Self::builder();
        for (group, key, value) in entries {
            builder = builder.set(group, key, value);
        }
        match schema {
            Some(schema) => builder.build_with_schema(schema),
            None => builder.build(),
        }
    }

    /// Typed lookup
    pub fn get(&self, group: &str, key: &str) -> Result<&Value> {
        self.group(group)
            .and_then(|g| g.get(key))
            .ok_or_else(|| ConfigError::KeyNotFound {
                group: group.to_string(),
                key: key.to_string(),
            })
    }

    /// Case-insensitive group lookup
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(&normalize(name)).map(Arc::as_ref)
    }

    /// Whether a group with this name exists
    pub fn contains_group(&self, name: &str) -> bool {
        self.groups.contains_key(&normalize(name))
    }

    /// Groups in order
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values().map(Arc::as_ref)
    }

    /// Number of groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether there are no groups
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Whether both namelists hold the very same allocation for a group
    pub fn shares_group(&self, other: &Namelist, name: &str) -> bool {
        let norm = normalize(name);
        match (self.groups.get(&norm), other.groups.get(&norm)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// New namelist with `group.key` set to `value`, creating the group if needed
    pub fn with_override(&self, group: &str, key: &str, value: Value) -> Result<Namelist> {
        let mut next = self.clone();
        next.group_mut(group)?.set(key, value)?;
        Ok(next)
    }

    /// New namelist without `group.key`; unchanged if the key is not set
    pub fn without_key(&self, group: &str, key: &str) -> Namelist {
        let Some(existing) = self.group(group) else {
            return self.clone();
        };
        if !existing.contains_key(key) {
            return self.clone();
        }
        let mut next = self.clone();
        if let Some(existing) = next.shared_group_mut(group) {
            existing.remove(key);
        }
        next
    }

    /// New namelist with `group` replacing the group of the same name (or appended)
    pub fn with_group(&self, group: Group) -> Result<Namelist> {
        check_group_name(group.name())?;
        let mut next = self.clone();
        next.insert_shared(Arc::new(group));
        Ok(next)
    }

    /// New namelist without the named group
    pub fn without_group(&self, name: &str) -> Namelist {
        if !self.contains_group(name) {
            return self.clone();
        }
        let mut next = self.clone();
        Arc::make_mut(&mut next.groups).shift_remove(&normalize(name));
        next
    }

    /// Type every value against `schema`, returning the coerced namelist
    pub fn validate(&self, schema: &Schema) -> Result<Namelist> {
        let mut next = self.clone();
        for group in self.groups() {
            for (key, value) in group.iter() {
                let coerced = schema.coerce(group.name(), key, value.clone())?;
                if &coerced != value {
                    next.group_mut(group.name())?.set(key, coerced)?;
                }
            }
        }
        Ok(next)
    }

    /// Order-insensitive structural comparison with a float tolerance
    pub fn approx_eq(&self, other: &Namelist, tolerance: f64) -> bool {
        self.len() == other.len()
            && self.groups.iter().all(|(norm, group)| {
                other
                    .groups
                    .get(norm)
                    .is_some_and(|theirs| group.approx_eq(theirs, tolerance))
            })
    }

    /// Mutable access to a group, created if missing and cloned only if shared
    pub(crate) fn group_mut(&mut self, name: &str) -> Result<&mut Group> {
        let groups = Arc::make_mut(&mut self.groups);
        let entry = match groups.entry(normalize(name)) {
            indexmap::map::Entry::Occupied(entry) => entry.into_mut(),
            indexmap::map::Entry::Vacant(entry) => {
                check_group_name(name)?;
                entry.insert(Arc::new(Group::unchecked(name.to_string())))
            }
        };
        Ok(Arc::make_mut(entry))
    }

    /// Insert or replace a group without copying it
    pub(crate) fn insert_shared(&mut self, group: Arc<Group>) {
        Arc::make_mut(&mut self.groups).insert(normalize(group.name()), group);
    }

    /// Mutable access to an existing group, cloned only if shared
    pub(crate) fn shared_group_mut(&mut self, name: &str) -> Option<&mut Group> {
        Arc::make_mut(&mut self.groups)
            .get_mut(&normalize(name))
            .map(Arc::make_mut)
    }

    pub(crate) fn shared_groups(&self) -> impl Iterator<Item = &Arc<Group>> {
        self.groups.values()
    }
}

impl PartialEq for Namelist {
    fn eq(&self, other: &Self) -> bool {
        self.approx_eq(other, 0.0)
    }
}

impl Serialize for Namelist {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for group in self.groups() {
            map.serialize_entry(group.name(), group)?;
        }
        map.end()
    }
}

enum BuildStep {
    Group(String),
    Entry(String, String, Value),
}

/// Incremental namelist construction
#[derive(Default)]
pub struct NamelistBuilder {
    steps: Vec<BuildStep>,
}

impl NamelistBuilder {
    /// Declare a group (it is kept even if no key is ever assigned)
    pub fn group(mut self, name: impl Into<String>) -> Self {
        self.steps.push(BuildStep::Group(name.into()));
        self
    }

    /// Assign `group.key`
    pub fn set(mut self, group: impl Into<String>, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.steps
            .push(BuildStep::Entry(group.into(), key.into(), value.into()));
        self
    }

    /// Finish without type checking
    pub fn build(self) -> Result<Namelist> {
        self.finish(None)
    }

    /// Finish, typing every value against `schema`
    pub fn build_with_schema(self, schema: &Schema) -> Result<Namelist> {
        self.finish(Some(schema))
    }

    fn finish(self, schema: Option<&Schema>) -> Result<Namelist> {
        let mut namelist = Namelist::new();
        for step in self.steps {
            match step {
                BuildStep::Group(name) => {
                    namelist.group_mut(&name)?;
                }
                BuildStep::Entry(group, key, value) => {
                    let value = match schema {
                        Some(schema) => schema.coerce(&group, &key, value)?,
                        None => value,
                    };
                    namelist.group_mut(&group)?.insert(key, value)?;
                }
            }
        }
        Ok(namelist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Array;

    fn sample() -> Namelist {
        Namelist::builder()
            .set("NAMPAR0", "NPROC", 4)
            .set("NAMPAR0", "LSTATS", true)
            .set("NAMCT0", "CNMEXP", "hbas")
            .build()
            .unwrap()
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let nml = sample();
        assert_eq!(nml.get("nampar0", "nproc").unwrap(), &Value::from(4));
        assert!(matches!(
            nml.get("NAMPAR0", "MISSING"),
            Err(ConfigError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_key_any_case() {
        let err = Namelist::builder()
            .set("NAMPAR0", "NPROC", 4)
            .set("nampar0", "nProc", 8)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateKey { .. }));
    }

    #[test]
    fn test_empty_values_rejected() {
        let err = Namelist::builder()
            .set("NAMPAR0", "ARR", Array::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue { .. }));
    }

    #[test]
    fn test_with_override_is_copy_on_write() {
        let nml = sample();
        let next = nml.with_override("NAMPAR0", "NPROC", Value::from(8)).unwrap();

        assert_eq!(nml.get("NAMPAR0", "NPROC").unwrap(), &Value::from(4));
        assert_eq!(next.get("NAMPAR0", "NPROC").unwrap(), &Value::from(8));
        // Untouched group is still the same allocation
        assert!(nml.shares_group(&next, "NAMCT0"));
        assert!(!nml.shares_group(&next, "NAMPAR0"));
    }

    #[test]
    fn test_override_keeps_key_position() {
        let next = sample()
            .with_override("NAMPAR0", "NPROC", Value::from(8))
            .unwrap();
        let keys: Vec<_> = next.group("NAMPAR0").unwrap().keys().collect();
        assert_eq!(keys, vec!["NPROC", "LSTATS"]);
    }

    #[test]
    fn test_without_key_and_group() {
        let nml = sample();
        let next = nml.without_key("NAMPAR0", "LSTATS");
        assert!(next.get("NAMPAR0", "LSTATS").is_err());
        assert_eq!(nml.without_key("NOPE", "X"), nml);
        assert!(!nml.without_group("NAMCT0").contains_group("namct0"));
    }

    #[test]
    fn test_equality_ignores_order() {
        let a = Namelist::builder()
            .set("A", "X", 1)
            .set("B", "Y", 2)
            .build()
            .unwrap();
        let b = Namelist::builder()
            .set("b", "y", 2)
            .set("a", "x", 1)
            .build()
            .unwrap();
        assert_eq!(a, b);

        let c = a.with_override("A", "X", Value::from(1.0)).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_invalid_names_rejected_everywhere() {
        for key in ["X-", "A B", "", "1X"] {
            let err = Namelist::builder().set("NAMCT0", key, 1).build().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidName(ref n) if n == key), "{key}: {err}");
        }
        for group in ["END", "end", "NAM-1", ""] {
            let err = Namelist::builder().set(group, "NSTOP", 1).build().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidName(_)), "{group}: {err}");
            assert!(Namelist::builder().group(group).build().is_err());
        }

        let nml = sample();
        assert!(nml.with_override("NAMCT0", "X-", Value::from(1)).is_err());
        assert!(nml.with_override("A B", "X", Value::from(1)).is_err());
        assert!(Group::new("Y%Z").is_err());

        let mut group = Group::new("NAMDYN").unwrap();
        assert!(group.insert("SITR ", Value::from(1.0)).is_err());
        assert!(group.set("_OK1", Value::from(1.0)).is_ok());
        assert!(nml.with_group(group).is_ok());
        assert!(nml.with_group(Group::new("End").unwrap()).is_err());

        // An END key is fine, only a group may not be called END
        assert!(Namelist::builder().set("NAMCT0", "END", 1).build().is_ok());
    }

    #[test]
    fn test_declared_empty_group_is_kept() {
        let nml = Namelist::builder().group("NAMDYN").build().unwrap();
        assert!(nml.contains_group("NAMDYN"));
        assert!(nml.group("NAMDYN").unwrap().is_empty());
    }
}
