//! Shared Effective-Config Cache
//!
//! Concurrent runs of specs that share a layer stack and override list compose
//! the configuration once. The cache is read-mostly: lookups take a read lock,
//! and a miss composes outside any lock before inserting.

use crate::compose::{ConfigLayer, EffectiveConfig, compose, hex_digest};
use crate::error::Result;
use crate::overrides::NamelistOverride;
use fxhash::FxHashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::trace;

/// Composed configurations keyed by layer fingerprints and overrides
#[derive(Debug, Default)]
pub struct ConfigCache {
    entries: RwLock<FxHashMap<String, Arc<EffectiveConfig>>>,
}

impl ConfigCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity of a layer stack plus overrides
    pub fn key_for(layers: &[ConfigLayer], overrides: &[NamelistOverride]) -> String {
        let overrides: Vec<String> = overrides.iter().map(ToString::to_string).collect();
        hex_digest(
            layers
                .iter()
                .map(|l| l.fingerprint().as_bytes())
                .chain(std::iter::once(&b"--"[..]))
                .chain(overrides.iter().map(|o| o.as_bytes())),
        )
    }

    /// Cached config for this stack, composing it on a miss
    pub fn get_or_compose(
        &self,
        layers: &[ConfigLayer],
        overrides: &[NamelistOverride],
    ) -> Result<Arc<EffectiveConfig>> {
        self.get_or_insert_with(layers, overrides, || {
            Ok(Arc::new(compose(layers).apply_overrides(overrides)?))
        })
    }

    /// Cached config for this stack; on a miss `make` supplies the entry.
    ///
    /// Whatever `make` returns is only kept if no other caller registered the
    /// same stack first, so every caller ends up with the same `Arc`.
    pub fn get_or_insert_with(
        &self,
        layers: &[ConfigLayer],
        overrides: &[NamelistOverride],
        make: impl FnOnce() -> Result<Arc<EffectiveConfig>>,
    ) -> Result<Arc<EffectiveConfig>> {
        let key = Self::key_for(layers, overrides);
        if let Some(hit) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            trace!(key = %&key[..12], "Config cache hit");
            return Ok(Arc::clone(hit));
        }

        let config = make()?;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have composed the same stack meanwhile
        let entry = entries.entry(key).or_insert(config);
        Ok(Arc::clone(entry))
    }

    /// Number of cached configs
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached config
    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
