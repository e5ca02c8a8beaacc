//! Environment Pipeline
//!
//! The environment of a run is built from a base mapping followed by an ordered
//! list of operations. `append` and `prepend` join with `:` like `PATH`-style
//! variables; on an unset variable they behave like `set`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

/// Separator used by `append` and `prepend`
pub const PATH_SEPARATOR: &str = ":";

/// Resolved environment of a run
pub type EnvMap = BTreeMap<String, String>;

/// One environment edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum EnvOp {
    /// Set a variable
    Set {
        /// Variable name
        key: String,
        /// New value
        value: String,
    },
    /// Append to a variable
    Append {
        /// Variable name
        key: String,
        /// Appended value
        value: String,
    },
    /// Prepend to a variable
    Prepend {
        /// Variable name
        key: String,
        /// Prepended value
        value: String,
    },
    /// Remove a variable
    Delete {
        /// Variable name
        key: String,
    },
    /// Remove every variable
    Clear,
}

impl EnvOp {
    /// Apply to `env` in place
    pub fn apply(&self, env: &mut EnvMap) {
        match self {
            EnvOp::Set { key, value } => {
                trace!(%key, %value, "Set environment variable");
                env.insert(key.clone(), value.clone());
            }
            EnvOp::Append { key, value } => {
                trace!(%key, %value, "Append to environment variable");
                let joined = match env.get(key) {
                    Some(current) => format!("{}{}{}", current, PATH_SEPARATOR, value),
                    None => value.clone(),
                };
                env.insert(key.clone(), joined);
            }
            EnvOp::Prepend { key, value } => {
                trace!(%key, %value, "Prepend to environment variable");
                let joined = match env.get(key) {
                    Some(current) => format!("{}{}{}", value, PATH_SEPARATOR, current),
                    None => value.clone(),
                };
                env.insert(key.clone(), joined);
            }
            EnvOp::Delete { key } => {
                trace!(%key, "Delete environment variable");
                env.remove(key);
            }
            EnvOp::Clear => {
                trace!("Clear environment");
                env.clear();
            }
        }
    }
}

/// Base mapping plus ordered operations
#[derive(Debug, Clone, Default)]
pub struct EnvPipeline {
    base: EnvMap,
    ops: Vec<EnvOp>,
}

impl EnvPipeline {
    /// Pipeline starting from `base`
    pub fn new(base: EnvMap) -> Self {
        Self {
            base,
            ops: Vec::new(),
        }
    }

    /// Add one operation
    pub fn push(&mut self, op: EnvOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Add several operations
    pub fn extend(&mut self, ops: impl IntoIterator<Item = EnvOp>) -> &mut Self {
        self.ops.extend(ops);
        self
    }

    /// Build the environment
    pub fn execute(&self) -> EnvMap {
        let mut env = self.base.clone();
        for op in &self.ops {
            op.apply(&mut env);
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> EnvMap {
        EnvMap::from([
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("HOME".to_string(), "/home/bench".to_string()),
        ])
    }

    #[test]
    fn test_append_prepend() {
        let mut pipeline = EnvPipeline::new(base());
        pipeline
            .push(EnvOp::Append {
                key: "PATH".into(),
                value: "/opt/bin".into(),
            })
            .push(EnvOp::Prepend {
                key: "PATH".into(),
                value: "/first".into(),
            })
            .push(EnvOp::Append {
                key: "LD_LIBRARY_PATH".into(),
                value: "/opt/lib".into(),
            });
        let env = pipeline.execute();
        assert_eq!(env["PATH"], "/first:/usr/bin:/opt/bin");
        assert_eq!(env["LD_LIBRARY_PATH"], "/opt/lib");
    }

    #[test]
    fn test_delete_and_clear_order() {
        let mut pipeline = EnvPipeline::new(base());
        pipeline.extend([
            EnvOp::Delete { key: "HOME".into() },
            EnvOp::Delete { key: "MISSING".into() },
        ]);
        assert_eq!(pipeline.execute().len(), 1);

        pipeline.extend([
            EnvOp::Clear,
            EnvOp::Set {
                key: "A".into(),
                value: "1".into(),
            },
        ]);
        let env = pipeline.execute();
        assert_eq!(env.len(), 1);
        assert_eq!(env["A"], "1");
    }

    #[test]
    fn test_deserialize_ops() {
        #[derive(Deserialize)]
        struct Doc {
            ops: Vec<EnvOp>,
        }
        let doc: Doc = toml::from_str(
            r#"
            ops = [
                { op = "append", key = "PATH", value = "/x" },
                { op = "delete", key = "TMP" },
                { op = "clear" },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(doc.ops.len(), 3);
        assert_eq!(doc.ops[2], EnvOp::Clear);
    }
}
