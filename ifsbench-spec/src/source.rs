//! Spec Source Files
//!
//! A spec source is a TOML file with one `[[benchmark]]` table per experiment.
//! Relative paths (executables with a `/`, layer files, schema, baseline)
//! resolve against the directory holding the file.
//!
//! ```toml
//! schema = "schema.toml"
//!
//! [[benchmark]]
//! id = "t21-fc"
//! executable = "bin/ifsMASTER"
//! launcher = "mpirun"
//! tags = ["smoke"]
//! resources = { tasks = 4, threads_per_task = 2, wall_time = "30m" }
//! layers = [
//!     { path = "defaults.nml", provenance = "default" },
//!     { name = "fc", groups = { NAMRIP = { CSTOP = "t24" } } },
//! ]
//! overrides = ["NAMPAR0/NPROC=4"]
//! artifacts = [{ name = "gridpoint", pattern = '^ICMGG.*\+\d+$' }]
//! timers = [{ name = "total", pattern = 'TOTAL\s+(?P<value>[0-9.]+)' }]
//! ```

use crate::artifacts::TimerSource;
use crate::env::EnvOp;
use crate::error::{InvalidSpecError, SpecError, Violation};
use crate::launcher::LauncherKind;
use crate::resources::{Resources, parse_duration};
use crate::spec::{BenchmarkSpec, SpecContext};
use ifsbench_namelist::{
    Array, ConfigLayer, Group, GroupMergeStrategy, Namelist, ParseOptions, Provenance, Scalar, Schema, Value,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SourceFile {
    #[serde(default)]
    schema: Option<PathBuf>,
    #[serde(default)]
    duplicate_groups: Option<String>,
    #[serde(default)]
    benchmark: Vec<BenchmarkDraft>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BenchmarkDraft {
    id: String,
    executable: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    launcher: LauncherKind,
    #[serde(default)]
    launcher_flags: Vec<String>,
    #[serde(default)]
    namelist_file: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    baseline: Option<PathBuf>,
    #[serde(default = "default_inherit_env")]
    inherit_env: bool,
    #[serde(default)]
    library_paths: Vec<String>,
    #[serde(default)]
    resources: ResourcesDraft,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    env_ops: Vec<EnvOp>,
    #[serde(default)]
    layers: Vec<LayerDraft>,
    #[serde(default)]
    overrides: Vec<String>,
    #[serde(default)]
    artifacts: Vec<ArtifactDraft>,
    #[serde(default)]
    timers: Vec<TimerDraft>,
}

fn default_inherit_env() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResourcesDraft {
    tasks: Option<i64>,
    threads_per_task: Option<i64>,
    nodes: Option<i64>,
    memory_mb: Option<i64>,
    wall_time: Option<String>,
    grace_period: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayerDraft {
    path: Option<PathBuf>,
    name: Option<String>,
    provenance: Option<Provenance>,
    groups: Option<toml::Table>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArtifactDraft {
    name: String,
    pattern: String,
    #[serde(default = "default_required")]
    required: bool,
}

fn default_required() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TimerDraft {
    name: String,
    pattern: String,
    source: Option<String>,
    file: Option<PathBuf>,
}

/// Load and validate every benchmark in a spec source file.
///
/// All violations of all benchmarks are reported together.
pub fn load_specs(path: &Path, context: &SpecContext) -> Result<Vec<BenchmarkSpec>, SpecError> {
    let text = std::fs::read_to_string(path).map_err(|source| SpecError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let specs = parse_source(&text, &path.display().to_string(), base_dir, context)?;
    info!(path = %path.display(), count = specs.len(), "Loaded benchmark specs");
    Ok(specs)
}

/// Validate spec source text; relative paths resolve against `base_dir`
pub fn parse_specs(text: &str, base_dir: &Path, context: &SpecContext) -> Result<Vec<BenchmarkSpec>, SpecError> {
    parse_source(text, "<string>", base_dir, context)
}

fn parse_source(
    text: &str,
    origin: &str,
    base_dir: &Path,
    context: &SpecContext,
) -> Result<Vec<BenchmarkSpec>, SpecError> {
    let source: SourceFile = toml::from_str(text).map_err(|e| SpecError::Source {
        path: origin.to_string(),
        message: e.message().to_string(),
    })?;

    let mut violations = Vec::new();
    let mut options = ParseOptions::default();

    if let Some(schema_path) = &source.schema {
        match Schema::load(&base_dir.join(schema_path)) {
            Ok(schema) => options.schema = Some(schema),
            Err(e) => violations.push(Violation::new(None, format!("schema: {}", e))),
        }
    }
    if let Some(strategy) = &source.duplicate_groups {
        match strategy.parse::<GroupMergeStrategy>() {
            Ok(s) => options.duplicate_groups = s,
            Err(e) => violations.push(Violation::new(None, e)),
        }
    }
    if source.benchmark.is_empty() {
        violations.push(Violation::new(None, "no [[benchmark]] tables"));
    }

    let mut seen = HashSet::new();
    let mut specs = Vec::with_capacity(source.benchmark.len());
    for draft in source.benchmark {
        if !seen.insert(draft.id.clone()) {
            violations.push(Violation::new(None, format!("duplicate experiment id '{}'", draft.id)));
        }
        match draft.into_spec(base_dir, &options, context) {
            Ok(spec) => specs.push(spec),
            Err(found) => violations.extend(found),
        }
    }

    if violations.is_empty() {
        debug!(origin, count = specs.len(), "Parsed spec source");
        Ok(specs)
    } else {
        Err(InvalidSpecError { violations }.into())
    }
}

impl BenchmarkDraft {
    fn into_spec(
        self,
        base_dir: &Path,
        options: &ParseOptions,
        context: &SpecContext,
    ) -> Result<BenchmarkSpec, Vec<Violation>> {
        let mut problems = Vec::new();
        let resources = self.resources.into_resources(&mut problems);

        let mut builder = BenchmarkSpec::builder(self.id, self.executable)
            .base_dir(base_dir)
            .args(self.args)
            .launcher(self.launcher)
            .launcher_flags(self.launcher_flags)
            .inherit_env(self.inherit_env)
            .resources(resources);

        if let Some(file) = self.namelist_file {
            builder = builder.namelist_file(file);
        }
        if let Some(baseline) = self.baseline {
            builder = builder.baseline(baseline);
        }
        for tag in self.tags {
            builder = builder.tag(tag);
        }
        for (key, value) in self.env {
            builder = builder.env(key, value);
        }
        for op in self.env_ops {
            builder = builder.env_op(op);
        }
        for path in self.library_paths {
            builder = builder.library_path(path);
        }

        for (index, draft) in self.layers.into_iter().enumerate() {
            let provenance = draft.provenance.unwrap_or(if index == 0 {
                Provenance::Default
            } else {
                Provenance::Experiment
            });
            match draft.into_layer(index, provenance, base_dir, options) {
                Ok(layer) => builder = builder.layer(layer),
                Err(problem) => problems.push(problem),
            }
        }
        for text in &self.overrides {
            builder = builder.override_str(text);
        }

        for artifact in self.artifacts {
            builder = builder.artifact(artifact.name, &artifact.pattern, artifact.required);
        }
        for timer in self.timers {
            let source = match (timer.source.as_deref(), timer.file) {
                (None | Some("stdout"), None) => TimerSource::Stdout,
                (Some("stderr"), None) => TimerSource::Stderr,
                (None | Some("file"), Some(file)) => TimerSource::File(file),
                (Some("file"), None) => {
                    problems.push(format!("timer '{}': source = \"file\" needs a file", timer.name));
                    continue;
                }
                (Some(other), _) => {
                    problems.push(format!("timer '{}': invalid source '{}'", timer.name, other));
                    continue;
                }
            };
            builder = builder.timer(timer.name, &timer.pattern, source);
        }

        for problem in problems {
            builder = builder.problem(problem);
        }
        builder.build_collecting(context)
    }
}

impl ResourcesDraft {
    fn into_resources(self, problems: &mut Vec<String>) -> Resources {
        fn count<T: TryFrom<i64> + Default>(name: &str, value: i64, problems: &mut Vec<String>) -> T {
            if value <= 0 {
                problems.push(format!("resources.{} must be positive", name));
                return T::default();
            }
            T::try_from(value).unwrap_or_else(|_| {
                problems.push(format!("resources.{} is too large", name));
                T::default()
            })
        }

        let mut resources = Resources::default();
        // Non-positive counts are reported here, so the defaults stand in for them
        if let Some(v) = self.tasks {
            resources.tasks = count::<u32>("tasks", v, problems).max(1);
        }
        if let Some(v) = self.threads_per_task {
            resources.threads_per_task = count::<u32>("threads_per_task", v, problems).max(1);
        }
        if let Some(v) = self.nodes {
            resources.nodes = Some(count::<u32>("nodes", v, problems).max(1));
        }
        if let Some(v) = self.memory_mb {
            resources.memory_mb = Some(count::<u64>("memory_mb", v, problems).max(1));
        }
        if let Some(s) = self.wall_time {
            match parse_duration(&s) {
                Ok(d) => resources.wall_time = d,
                Err(e) => problems.push(format!("resources.wall_time: {}", e)),
            }
        }
        if let Some(s) = self.grace_period {
            match parse_duration(&s) {
                Ok(d) => resources.grace_period = d,
                Err(e) => problems.push(format!("resources.grace_period: {}", e)),
            }
        }
        resources
    }
}

impl LayerDraft {
    fn into_layer(
        self,
        index: usize,
        provenance: Provenance,
        base_dir: &Path,
        options: &ParseOptions,
    ) -> Result<ConfigLayer, String> {
        match (self.path, self.groups) {
            (Some(path), None) => {
                let full = base_dir.join(&path);
                let layer = ConfigLayer::from_file(&full, provenance, options)
                    .map_err(|e| format!("layer '{}': {}", path.display(), e))?;
                Ok(match self.name {
                    Some(name) => ConfigLayer::new(name, provenance, layer.namelist().clone()),
                    None => layer,
                })
            }
            (None, Some(groups)) => {
                let name = self.name.unwrap_or_else(|| format!("layer-{}", index + 1));
                let namelist = inline_namelist(&groups, options).map_err(|e| format!("layer '{}': {}", name, e))?;
                Ok(ConfigLayer::new(name, provenance, namelist))
            }
            (Some(_), Some(_)) => Err(format!("layer {}: give either path or groups, not both", index + 1)),
            (None, None) => Err(format!("layer {}: needs a path or groups", index + 1)),
        }
    }
}

fn inline_namelist(groups: &toml::Table, options: &ParseOptions) -> Result<Namelist, String> {
    let mut builder = Namelist::builder();
    for (group, entries) in groups {
        let toml::Value::Table(entries) = entries else {
            return Err(format!("group '{}' must be a table", group));
        };
        builder = builder.group(group.clone());
        for (key, value) in entries {
            let value = toml_value(key, value).map_err(|e| format!("{}.{}: {}", group, key, e))?;
            builder = builder.set(group.clone(), key.clone(), value);
        }
    }
    let built = match &options.schema {
        Some(schema) => builder.build_with_schema(schema),
        None => builder.build(),
    };
    built.map_err(|e| e.to_string())
}

fn toml_scalar(value: &toml::Value) -> Result<Scalar, String> {
    match value {
        toml::Value::String(s) => Ok(Scalar::from(s.as_str())),
        toml::Value::Integer(i) => Ok(Scalar::from(*i)),
        toml::Value::Float(f) => Ok(Scalar::from(*f)),
        toml::Value::Boolean(b) => Ok(Scalar::from(*b)),
        toml::Value::Datetime(_) => Err("datetimes are not namelist values".to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => Err("array elements must be scalars".to_string()),
    }
}

fn toml_value(name: &str, value: &toml::Value) -> Result<Value, String> {
    match value {
        toml::Value::Array(items) => {
            if items.is_empty() {
                return Err("empty arrays are not allowed".to_string());
            }
            let scalars = items.iter().map(toml_scalar).collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(Array::from_values(scalars)))
        }
        toml::Value::Table(fields) => {
            if fields.is_empty() {
                return Err("empty records are not allowed".to_string());
            }
            let mut record = Group::new(name).map_err(|e| e.to_string())?;
            for (field, v) in fields {
                let v = toml_value(field, v)?;
                record.insert(field.clone(), v).map_err(|e| e.to_string())?;
            }
            Ok(Value::Record(record))
        }
        scalar => toml_scalar(scalar).map(Value::Scalar),
    }
}
