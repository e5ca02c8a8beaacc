//! Layered Configuration Composition
//!
//! An [`EffectiveConfig`] is built from an ordered stack of [`ConfigLayer`]s,
//! lowest precedence first. For every `(group, key)` the later layer wins with a
//! full replacement of the value; arrays and records are never merged partially.
//! Groups untouched by later layers are inherited as-is, sharing storage with the
//! layer that introduced them.

use crate::error::Result;
use crate::model::Namelist;
use crate::overrides::NamelistOverride;
use crate::parser::{ParseOptions, parse_file};
use crate::writer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Where a layer comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Model defaults
    Default,
    /// Site or machine settings
    Site,
    /// Experiment settings
    Experiment,
    /// Command-line overrides
    Cli,
}

impl Provenance {
    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Default => "default",
            Provenance::Site => "site",
            Provenance::Experiment => "experiment",
            Provenance::Cli => "cli",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Provenance::Default),
            "site" => Ok(Provenance::Site),
            "experiment" => Ok(Provenance::Experiment),
            "cli" => Ok(Provenance::Cli),
            other => Err(format!("unknown provenance '{}'", other)),
        }
    }
}

/// Identity of a layer as recorded in manifests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerIdentity {
    /// Layer name
    pub name: String,
    /// Layer provenance
    pub provenance: Provenance,
    /// SHA-256 over name, provenance and canonical text
    pub fingerprint: String,
}

/// Immutable, fingerprinted namelist fragment
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    identity: LayerIdentity,
    namelist: Namelist,
}

impl ConfigLayer {
    /// Wrap a namelist as a layer
    pub fn new(name: impl Into<String>, provenance: Provenance, namelist: Namelist) -> Self {
        let name = name.into();
        let fingerprint = hex_digest([
            name.as_bytes(),
            provenance.as_str().as_bytes(),
            writer::to_string(&namelist).as_bytes(),
        ]);
        Self {
            identity: LayerIdentity {
                name,
                provenance,
                fingerprint,
            },
            namelist,
        }
    }

    /// Read a layer from a namelist file; the file stem names the layer
    pub fn from_file(path: &Path, provenance: Provenance, options: &ParseOptions) -> Result<Self> {
        let namelist = parse_file(path, options)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, provenance, namelist))
    }

    /// Layer name
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Layer provenance
    pub fn provenance(&self) -> Provenance {
        self.identity.provenance
    }

    /// Content fingerprint
    pub fn fingerprint(&self) -> &str {
        &self.identity.fingerprint
    }

    /// Name, provenance and fingerprint
    pub fn identity(&self) -> &LayerIdentity {
        &self.identity
    }

    /// Layer content
    pub fn namelist(&self) -> &Namelist {
        &self.namelist
    }
}

/// Result of composing a layer stack (and applying overrides)
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    namelist: Namelist,
    layers: Vec<LayerIdentity>,
    overrides: Vec<String>,
    digest: String,
}

impl EffectiveConfig {
    fn from_parts(namelist: Namelist, layers: Vec<LayerIdentity>, overrides: Vec<String>) -> Self {
        let digest = hex_digest([writer::to_string(&namelist).as_bytes()]);
        Self {
            namelist,
            layers,
            overrides,
            digest,
        }
    }

    /// Composed namelist
    pub fn namelist(&self) -> &Namelist {
        &self.namelist
    }

    /// Contributing layers, lowest precedence first
    pub fn layers(&self) -> &[LayerIdentity] {
        &self.layers
    }

    /// Overrides applied after composition, in order
    pub fn overrides(&self) -> &[String] {
        &self.overrides
    }

    /// SHA-256 of the canonical serialization
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Canonical namelist text
    pub fn to_text(&self) -> String {
        writer::to_string(&self.namelist)
    }

    /// New config with `overrides` applied in order
    pub fn apply_overrides(&self, overrides: &[NamelistOverride]) -> Result<EffectiveConfig> {
        if overrides.is_empty() {
            return Ok(self.clone());
        }
        let mut namelist = self.namelist.clone();
        for o in overrides {
            namelist = o.apply(&namelist)?;
        }
        let mut applied = self.overrides.clone();
        applied.extend(overrides.iter().map(ToString::to_string));
        Ok(Self::from_parts(namelist, self.layers.clone(), applied))
    }

    /// Freeze this config into a layer so it can seed another composition
    pub fn to_layer(&self, name: impl Into<String>, provenance: Provenance) -> ConfigLayer {
        ConfigLayer::new(name, provenance, self.namelist.clone())
    }
}

/// Compose layers, lowest precedence first
pub fn compose(layers: &[ConfigLayer]) -> EffectiveConfig {
    let mut result = Namelist::new();
    for layer in layers {
        for group in layer.namelist().shared_groups() {
            if !result.contains_group(group.name()) {
                result.insert_shared(Arc::clone(group));
                continue;
            }
            if let Some(target) = result.shared_group_mut(group.name()) {
                target.merge_from(group);
            }
        }
    }
    let identities: Vec<LayerIdentity> = layers.iter().map(|l| l.identity().clone()).collect();
    let config = EffectiveConfig::from_parts(result, identities, Vec::new());
    debug!(
        layers = layers.len(),
        groups = config.namelist().len(),
        digest = %&config.digest()[..12],
        "Composed configuration"
    );
    config
}

pub(crate) fn hex_digest<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Array, Value};

    fn layer(name: &str, provenance: Provenance, nml: Namelist) -> ConfigLayer {
        ConfigLayer::new(name, provenance, nml)
    }

    #[test]
    fn test_later_layer_wins_and_groups_inherit() {
        let defaults = Namelist::builder()
            .set("A", "X", 1)
            .set("A", "ARR", Array::from_values([1, 2, 3]))
            .set("C", "Z", true)
            .build()
            .unwrap();
        let site = Namelist::builder()
            .set("a", "x", 2)
            .set("A", "ARR", Array::from_values([9]))
            .set("B", "Y", "hi")
            .build()
            .unwrap();

        let effective = compose(&[
            layer("defaults", Provenance::Default, defaults.clone()),
            layer("site", Provenance::Site, site),
        ]);
        let nml = effective.namelist();

        assert_eq!(nml.get("A", "X").unwrap(), &Value::from(2));
        // Whole-array replacement, no element merge
        assert_eq!(nml.get("A", "ARR").unwrap(), &Value::Array(Array::from_values([9])));
        assert_eq!(nml.get("B", "Y").unwrap(), &Value::from("hi"));
        assert_eq!(nml.get("C", "Z").unwrap(), &Value::from(true));

        let order: Vec<_> = nml.groups().map(|g| g.name().to_ascii_uppercase()).collect();
        assert_eq!(order, vec!["A", "C", "B"]);

        // Inputs untouched, untouched groups shared
        assert_eq!(defaults.get("A", "X").unwrap(), &Value::from(1));
        assert!(nml.shares_group(&defaults, "C"));
        assert_eq!(effective.layers().len(), 2);
    }

    #[test]
    fn test_digest_is_deterministic() {
        let nml = Namelist::builder().set("A", "X", 1).build().unwrap();
        let a = compose(&[layer("l", Provenance::Default, nml.clone())]);
        let b = compose(&[layer("l", Provenance::Default, nml)]);
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.to_text(), b.to_text());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_fingerprint_depends_on_name_and_provenance() {
        let nml = Namelist::builder().set("A", "X", 1).build().unwrap();
        let a = layer("l", Provenance::Default, nml.clone());
        let b = layer("l", Provenance::Site, nml.clone());
        let c = layer("m", Provenance::Default, nml);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_apply_overrides_records_them() {
        let nml = Namelist::builder().set("A", "X", 1).build().unwrap();
        let base = compose(&[layer("l", Provenance::Default, nml)]);
        let over: NamelistOverride = "A/X=5".parse().unwrap();
        let next = base.apply_overrides(&[over]).unwrap();

        assert_eq!(next.namelist().get("A", "X").unwrap(), &Value::from(5));
        assert_eq!(next.overrides(), &["A/X=5".to_string()]);
        assert_ne!(next.digest(), base.digest());
        assert_eq!(base.namelist().get("A", "X").unwrap(), &Value::from(1));
    }

    #[test]
    fn test_provenance_parse() {
        assert_eq!("SITE".parse(), Ok(Provenance::Site));
        assert!("user".parse::<Provenance>().is_err());
    }
}
