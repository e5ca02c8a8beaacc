//! Benchmark Specification
//!
//! A [`BenchmarkSpec`] describes one experiment completely: what to run, with
//! which resources and environment, which configuration layers make up its
//! namelist, and what to collect afterwards. Specs are validated once, when they
//! are built, and are immutable afterwards.

use crate::artifacts::{ArtifactPattern, TimerPattern, TimerSource};
use crate::env::{EnvMap, EnvOp, EnvPipeline};
use crate::error::{InvalidSpecError, SpecError, Violation};
use crate::launcher::{LaunchCommand, LauncherKind};
use crate::resources::{Resources, parse_duration};
use ifsbench_namelist::{
    ConfigCache, ConfigError, ConfigLayer, DEFAULT_NAMELIST_FILE, EffectiveConfig, NamelistOverride,
    compose,
};
use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Number of MPI tasks
pub const ENV_TASKS: &str = "IFSBENCH_TASKS";
/// OpenMP threads per task
pub const ENV_THREADS_PER_TASK: &str = "IFSBENCH_THREADS_PER_TASK";
/// Memory limit in megabytes
pub const ENV_MEMORY_MB: &str = "IFSBENCH_MEMORY_MB";
/// Wall-time limit (duration string)
pub const ENV_WALL_TIME: &str = "IFSBENCH_WALL_TIME";
/// Colon-separated executable search path, searched before `PATH`
pub const ENV_EXEC_PATH: &str = "IFSBENCH_EXEC_PATH";

/// Snapshot of the process environment taken when specs are loaded.
///
/// Supplies the `IFSBENCH_*` overrides, the `PATH` used to resolve bare
/// executable names, and the base environment inherited by runs.
#[derive(Debug, Clone, Default)]
pub struct SpecContext {
    vars: EnvMap,
}

impl SpecContext {
    /// Snapshot of the current process environment
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Context from explicit variables
    pub fn from_vars<K: Into<String>, V: Into<String>>(vars: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Variable lookup
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Every variable
    pub fn vars(&self) -> &EnvMap {
        &self.vars
    }

    fn apply_resource_overrides(&self, resources: &mut Resources, problems: &mut Vec<String>) {
        fn parse<T: std::str::FromStr>(name: &str, raw: &str, problems: &mut Vec<String>) -> Option<T> {
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    problems.push(format!("{}: invalid value '{}'", name, raw));
                    None
                }
            }
        }

        if let Some(raw) = self.var(ENV_TASKS) {
            if let Some(v) = parse(ENV_TASKS, raw, problems) {
                resources.tasks = v;
            }
        }
        if let Some(raw) = self.var(ENV_THREADS_PER_TASK) {
            if let Some(v) = parse(ENV_THREADS_PER_TASK, raw, problems) {
                resources.threads_per_task = v;
            }
        }
        if let Some(raw) = self.var(ENV_MEMORY_MB) {
            if let Some(v) = parse(ENV_MEMORY_MB, raw, problems) {
                resources.memory_mb = Some(v);
            }
        }
        if let Some(raw) = self.var(ENV_WALL_TIME) {
            match parse_duration(raw) {
                Ok(d) => resources.wall_time = d,
                Err(e) => problems.push(format!("{}: {}", ENV_WALL_TIME, e)),
            }
        }
    }

    /// Resolve an executable name.
    ///
    /// Names containing `/` are taken as paths (relative ones against
    /// `base_dir`); bare names are searched in `IFSBENCH_EXEC_PATH`, then `PATH`.
    pub fn resolve_executable(&self, name: &str, base_dir: &Path) -> Result<PathBuf, String> {
        if name.is_empty() {
            return Err("executable is empty".to_string());
        }
        if name.contains('/') {
            let path = base_dir.join(name);
            return check_executable(&path).map(|()| path);
        }

        let search = [self.var(ENV_EXEC_PATH), self.var("PATH")];
        let dirs = search
            .iter()
            .flatten()
            .flat_map(|p| p.split(':'))
            .filter(|d| !d.is_empty());
        let mut last_problem = None;
        for dir in dirs {
            let candidate = Path::new(dir).join(name);
            if !candidate.exists() {
                continue;
            }
            match check_executable(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(problem) => last_problem = Some(problem),
            }
        }
        Err(last_problem.unwrap_or_else(|| format!("executable '{}' not found in {} or PATH", name, ENV_EXEC_PATH)))
    }
}

fn check_executable(path: &Path) -> Result<(), String> {
    let meta = std::fs::metadata(path).map_err(|_| format!("executable '{}' does not exist", path.display()))?;
    if !meta.is_file() {
        return Err(format!("executable '{}' is not a file", path.display()));
    }
    if meta.permissions().mode() & 0o111 == 0 {
        return Err(format!("executable '{}' is not executable", path.display()));
    }
    Ok(())
}

/// Whether `id` can be used as a directory name
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Validated, immutable benchmark description
#[derive(Debug, Clone)]
pub struct BenchmarkSpec {
    id: String,
    executable: PathBuf,
    args: Vec<String>,
    resources: Resources,
    launcher: LauncherKind,
    launcher_flags: Vec<String>,
    env: EnvMap,
    layers: Vec<ConfigLayer>,
    overrides: Vec<NamelistOverride>,
    namelist_file: String,
    artifacts: Vec<ArtifactPattern>,
    timers: Vec<TimerPattern>,
    baseline: Option<PathBuf>,
    tags: Vec<String>,
    effective: OnceLock<Arc<EffectiveConfig>>,
}

impl BenchmarkSpec {
    /// Start building a spec
    pub fn builder(id: impl Into<String>, executable: impl Into<String>) -> SpecBuilder {
        SpecBuilder::new(id, executable)
    }

    /// Experiment identifier (also the working directory name)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Resolved executable
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Executable arguments
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Requested resources
    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    /// Launcher kind
    pub fn launcher(&self) -> LauncherKind {
        self.launcher
    }

    /// Extra launcher flags
    pub fn launcher_flags(&self) -> &[String] {
        &self.launcher_flags
    }

    /// Resolved environment of the run
    pub fn env(&self) -> &EnvMap {
        &self.env
    }

    /// Configuration layers, lowest precedence first
    pub fn layers(&self) -> &[ConfigLayer] {
        &self.layers
    }

    /// Namelist overrides applied after composition
    pub fn overrides(&self) -> &[NamelistOverride] {
        &self.overrides
    }

    /// File name the namelist is materialized as
    pub fn namelist_file(&self) -> &str {
        &self.namelist_file
    }

    /// Declared artifacts
    pub fn artifacts(&self) -> &[ArtifactPattern] {
        &self.artifacts
    }

    /// Declared timers
    pub fn timers(&self) -> &[TimerPattern] {
        &self.timers
    }

    /// Regression baseline (namelist file or previous run directory)
    pub fn baseline(&self) -> Option<&Path> {
        self.baseline.as_deref()
    }

    /// Tags for selection
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Whether the spec carries `tag`
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Command that starts the run
    pub fn launch_command(&self) -> LaunchCommand {
        self.launcher.command(
            &self.executable,
            &self.args,
            &self.resources,
            &self.launcher_flags,
            self.env.clone(),
        )
    }

    /// Effective configuration, composed once per spec instance
    pub fn compose(&self) -> Result<Arc<EffectiveConfig>, ConfigError> {
        if let Some(config) = self.effective.get() {
            return Ok(Arc::clone(config));
        }
        let config = Arc::new(compose(&self.layers).apply_overrides(&self.overrides)?);
        Ok(Arc::clone(self.effective.get_or_init(|| config)))
    }

    /// Effective configuration shared through `cache` by every spec with the same stack.
    ///
    /// The first spec to get here registers its own config; later ones get that
    /// same `Arc` back.
    pub fn compose_cached(&self, cache: &ConfigCache) -> Result<Arc<EffectiveConfig>, ConfigError> {
        cache.get_or_insert_with(&self.layers, &self.overrides, || self.compose())
    }

    /// New spec with a different layer stack (and a fresh config cache)
    pub fn with_layers(&self, layers: Vec<ConfigLayer>) -> Result<BenchmarkSpec, SpecError> {
        let mut next = self.clone();
        next.layers = layers;
        next.revalidate()
    }

    /// New spec with `extra` overrides applied after the existing ones
    pub fn with_overrides(&self, extra: &[NamelistOverride]) -> Result<BenchmarkSpec, SpecError> {
        let mut next = self.clone();
        next.overrides.extend(extra.iter().cloned());
        next.revalidate()
    }

    fn revalidate(mut self) -> Result<BenchmarkSpec, SpecError> {
        self.effective = OnceLock::new();
        let mut violations = Vec::new();
        if self.layers.is_empty() {
            violations.push(Violation::new(Some(&self.id), "no configuration layers"));
        } else if let Err(e) = self.compose() {
            violations.push(Violation::new(Some(&self.id), format!("applying overrides: {}", e)));
        }
        if violations.is_empty() {
            Ok(self)
        } else {
            Err(InvalidSpecError { violations }.into())
        }
    }
}

/// Collects spec inputs and validates them all at once.
///
/// Problems found while adding inputs (bad regexes, bad override strings) are
/// recorded and reported by [`SpecBuilder::build`] together with everything else.
#[derive(Debug, Clone)]
pub struct SpecBuilder {
    id: String,
    executable: String,
    base_dir: PathBuf,
    args: Vec<String>,
    resources: Resources,
    launcher: LauncherKind,
    launcher_flags: Vec<String>,
    inherit_env: bool,
    env: BTreeMap<String, String>,
    env_ops: Vec<EnvOp>,
    library_paths: Vec<String>,
    layers: Vec<ConfigLayer>,
    overrides: Vec<NamelistOverride>,
    namelist_file: String,
    artifacts: Vec<ArtifactPattern>,
    timers: Vec<TimerPattern>,
    baseline: Option<PathBuf>,
    tags: Vec<String>,
    problems: Vec<String>,
}

impl SpecBuilder {
    fn new(id: impl Into<String>, executable: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            executable: executable.into(),
            base_dir: PathBuf::from("."),
            args: Vec::new(),
            resources: Resources::default(),
            launcher: LauncherKind::default(),
            launcher_flags: Vec::new(),
            inherit_env: true,
            env: BTreeMap::new(),
            env_ops: Vec::new(),
            library_paths: Vec::new(),
            layers: Vec::new(),
            overrides: Vec::new(),
            namelist_file: DEFAULT_NAMELIST_FILE.to_string(),
            artifacts: Vec::new(),
            timers: Vec::new(),
            baseline: None,
            tags: Vec::new(),
            problems: Vec::new(),
        }
    }

    /// Directory that relative paths resolve against
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Executable arguments
    pub fn args<S: Into<String>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Requested resources
    pub fn resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }

    /// Launcher kind
    pub fn launcher(mut self, launcher: LauncherKind) -> Self {
        self.launcher = launcher;
        self
    }

    /// Extra launcher flags
    pub fn launcher_flags<S: Into<String>>(mut self, flags: impl IntoIterator<Item = S>) -> Self {
        self.launcher_flags = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Start from the loader's environment (default) or from an empty one
    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    /// Set a variable in the base mapping
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add an environment operation
    pub fn env_op(mut self, op: EnvOp) -> Self {
        self.env_ops.push(op);
        self
    }

    /// Append a directory to `LD_LIBRARY_PATH`
    pub fn library_path(mut self, path: impl Into<String>) -> Self {
        self.library_paths.push(path.into());
        self
    }

    /// Add a configuration layer (lowest precedence first)
    pub fn layer(mut self, layer: ConfigLayer) -> Self {
        self.layers.push(layer);
        self
    }

    /// Add a namelist override
    pub fn namelist_override(mut self, o: NamelistOverride) -> Self {
        self.overrides.push(o);
        self
    }

    /// Add a namelist override from its string form
    pub fn override_str(mut self, text: &str) -> Self {
        match text.parse() {
            Ok(o) => self.overrides.push(o),
            Err(e) => self.problems.push(format!("override '{}': {}", text, e)),
        }
        self
    }

    /// Namelist file name in the working directory
    pub fn namelist_file(mut self, name: impl Into<String>) -> Self {
        self.namelist_file = name.into();
        self
    }

    /// Declare an artifact
    pub fn artifact(mut self, name: impl Into<String>, pattern: &str, required: bool) -> Self {
        let name = name.into();
        match ArtifactPattern::new(name.clone(), pattern, required) {
            Ok(a) => self.artifacts.push(a),
            Err(e) => self.problems.push(format!("artifact '{}': invalid regex: {}", name, e)),
        }
        self
    }

    /// Declare a timer
    pub fn timer(mut self, name: impl Into<String>, pattern: &str, source: TimerSource) -> Self {
        let name = name.into();
        match TimerPattern::new(name.clone(), pattern, source) {
            Ok(t) => self.timers.push(t),
            Err(e) => self.problems.push(format!("timer '{}': invalid regex: {}", name, e)),
        }
        self
    }

    /// Regression baseline
    pub fn baseline(mut self, path: impl Into<PathBuf>) -> Self {
        self.baseline = Some(path.into());
        self
    }

    /// Add a tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Record a problem found by the caller while preparing inputs
    pub fn problem(mut self, message: impl Into<String>) -> Self {
        self.problems.push(message.into());
        self
    }

    /// Validate everything and freeze the spec
    pub fn build(self, context: &SpecContext) -> Result<BenchmarkSpec, SpecError> {
        self.build_collecting(context).map_err(|violations| InvalidSpecError { violations }.into())
    }

    /// Like [`build`](Self::build), returning the raw violation list
    pub(crate) fn build_collecting(self, context: &SpecContext) -> Result<BenchmarkSpec, Vec<Violation>> {
        let mut problems = self.problems;

        if self.id.is_empty() {
            problems.push("experiment id is empty".to_string());
        } else if !is_safe_id(&self.id) {
            problems.push(format!(
                "experiment id '{}' is not a safe directory name (use letters, digits, '_', '-', '.')",
                self.id
            ));
        }

        let executable = match context.resolve_executable(&self.executable, &self.base_dir) {
            Ok(path) => Some(path),
            Err(problem) => {
                problems.push(problem);
                None
            }
        };

        let mut resources = self.resources;
        context.apply_resource_overrides(&mut resources, &mut problems);
        problems.extend(resources.problems());

        if self.namelist_file.is_empty() || self.namelist_file.contains('/') {
            problems.push(format!("namelist file '{}' must be a plain file name", self.namelist_file));
        }

        let mut spec = BenchmarkSpec {
            id: self.id,
            executable: executable.unwrap_or_default(),
            args: self.args,
            env: EnvMap::new(),
            resources,
            launcher: self.launcher,
            launcher_flags: self.launcher_flags,
            layers: self.layers,
            overrides: self.overrides,
            namelist_file: self.namelist_file,
            artifacts: self.artifacts,
            timers: self.timers,
            baseline: self.baseline.map(|p| self.base_dir.join(p)),
            tags: self.tags,
            effective: OnceLock::new(),
        };

        if spec.layers.is_empty() {
            problems.push("no configuration layers".to_string());
        } else if let Err(e) = spec.compose() {
            problems.push(format!("applying overrides: {}", e));
        }

        let mut pipeline = EnvPipeline::new(if self.inherit_env {
            context.vars().clone()
        } else {
            EnvMap::new()
        });
        pipeline.extend(self.env.into_iter().map(|(key, value)| EnvOp::Set { key, value }));
        pipeline.extend(self.env_ops);
        pipeline.extend(self.library_paths.into_iter().map(|value| EnvOp::Append {
            key: "LD_LIBRARY_PATH".to_string(),
            value,
        }));
        pipeline.push(EnvOp::Set {
            key: "OMP_NUM_THREADS".to_string(),
            value: spec.resources.threads_per_task.to_string(),
        });
        spec.env = pipeline.execute();

        if problems.is_empty() {
            debug!(id = %spec.id, executable = %spec.executable.display(), "Validated benchmark spec");
            Ok(spec)
        } else {
            let id = (!spec.id.is_empty()).then_some(spec.id.as_str());
            Err(problems.into_iter().map(|p| Violation::new(id, p)).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifsbench_namelist::{Namelist, Provenance, Value};
    use std::fs;
    use std::time::Duration;

    fn fake_executable(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn defaults() -> ConfigLayer {
        let nml = Namelist::builder().set("NAMPAR0", "NPROC", 4).build().unwrap();
        ConfigLayer::new("defaults", Provenance::Default, nml)
    }

    #[test]
    fn test_build_valid_spec() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_executable(dir.path(), "ifs");
        let ctx = SpecContext::from_vars([("PATH", "/usr/bin"), ("HOME", "/root")]);

        let spec = BenchmarkSpec::builder("t21", exe.to_str().unwrap())
            .layer(defaults())
            .override_str("NAMPAR0/NPROC=8")
            .env("DR_HOOK", "1")
            .library_path("/opt/lib")
            .resources(Resources {
                threads_per_task: 2,
                ..Default::default()
            })
            .build(&ctx)
            .unwrap();

        assert_eq!(spec.executable(), exe);
        assert_eq!(spec.env()["OMP_NUM_THREADS"], "2");
        assert_eq!(spec.env()["LD_LIBRARY_PATH"], "/opt/lib");
        assert_eq!(spec.env()["HOME"], "/root");
        assert_eq!(spec.env()["DR_HOOK"], "1");
        assert_eq!(
            spec.compose().unwrap().namelist().get("NAMPAR0", "NPROC").unwrap(),
            &Value::from(8)
        );
    }

    #[test]
    fn test_missing_executable_and_every_other_problem() {
        let ctx = SpecContext::from_vars([("PATH", "/nonexistent")]);
        let err = BenchmarkSpec::builder("bad id", "no-such-binary")
            .resources(Resources {
                tasks: 0,
                ..Default::default()
            })
            .artifact("out", "(", true)
            .override_str("oops")
            .build(&ctx)
            .unwrap_err();

        let messages: Vec<String> = err.violations().iter().map(|v| v.message.clone()).collect();
        assert!(messages.iter().any(|m| m.contains("not found")));
        assert!(messages.iter().any(|m| m.contains("safe directory name")));
        assert!(messages.iter().any(|m| m.contains("tasks must be positive")));
        assert!(messages.iter().any(|m| m.contains("invalid regex")));
        assert!(messages.iter().any(|m| m.contains("override 'oops'")));
        assert!(messages.iter().any(|m| m.contains("no configuration layers")));
    }

    #[test]
    fn test_not_executable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain");
        fs::write(&path, "data").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let err = BenchmarkSpec::builder("x", path.to_str().unwrap())
            .layer(defaults())
            .build(&SpecContext::default())
            .unwrap_err();
        assert!(err.violations()[0].message.contains("not executable"));
    }

    #[test]
    fn test_exec_path_searched_before_path() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let preferred = fake_executable(first.path(), "ifs");
        fake_executable(second.path(), "ifs");

        let ctx = SpecContext::from_vars([
            (ENV_EXEC_PATH, first.path().to_str().unwrap()),
            ("PATH", second.path().to_str().unwrap()),
        ]);
        let resolved = ctx.resolve_executable("ifs", Path::new(".")).unwrap();
        assert_eq!(resolved, preferred);
    }

    #[test]
    fn test_resource_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_executable(dir.path(), "ifs");
        let ctx = SpecContext::from_vars([
            (ENV_TASKS, "16"),
            (ENV_THREADS_PER_TASK, "4"),
            (ENV_MEMORY_MB, "2048"),
            (ENV_WALL_TIME, "5m"),
        ]);
        let spec = BenchmarkSpec::builder("x", exe.to_str().unwrap())
            .layer(defaults())
            .build(&ctx)
            .unwrap();
        assert_eq!(spec.resources().tasks, 16);
        assert_eq!(spec.resources().threads_per_task, 4);
        assert_eq!(spec.resources().memory_mb, Some(2048));
        assert_eq!(spec.resources().wall_time, Duration::from_secs(300));

        let bad = SpecContext::from_vars([(ENV_TASKS, "many")]);
        let err = BenchmarkSpec::builder("x", exe.to_str().unwrap())
            .layer(defaults())
            .build(&bad)
            .unwrap_err();
        assert!(err.violations()[0].message.contains(ENV_TASKS));
    }

    #[test]
    fn test_compose_is_cached_and_with_layers_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_executable(dir.path(), "ifs");
        let spec = BenchmarkSpec::builder("x", exe.to_str().unwrap())
            .layer(defaults())
            .build(&SpecContext::default())
            .unwrap();

        let a = spec.compose().unwrap();
        let b = spec.compose().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let extra = Namelist::builder().set("NAMPAR0", "NPROC", 2).build().unwrap();
        let next = spec
            .with_layers(vec![defaults(), ConfigLayer::new("site", Provenance::Site, extra)])
            .unwrap();
        assert_eq!(
            next.compose().unwrap().namelist().get("NAMPAR0", "NPROC").unwrap(),
            &Value::from(2)
        );
        // Original spec unchanged
        assert_eq!(spec.compose().unwrap().digest(), a.digest());

        assert!(spec.with_layers(Vec::new()).is_err());
    }

    #[test]
    fn test_specs_with_the_same_stack_share_a_cached_config() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_executable(dir.path(), "ifs");
        let build = |id: &str, over: &str| {
            BenchmarkSpec::builder(id, exe.to_str().unwrap())
                .layer(defaults())
                .override_str(over)
                .build(&SpecContext::default())
                .unwrap()
        };
        let a = build("a", "NAMPAR0/NPROC=8");
        let b = build("b", "NAMPAR0/NPROC=8");
        let c = build("c", "NAMPAR0/NPROC=16");

        let cache = ConfigCache::new();
        let from_a = a.compose_cached(&cache).unwrap();
        let from_b = b.compose_cached(&cache).unwrap();
        let from_c = c.compose_cached(&cache).unwrap();

        assert!(Arc::ptr_eq(&from_a, &from_b));
        assert!(Arc::ptr_eq(&from_a, &a.compose().unwrap()));
        assert!(!Arc::ptr_eq(&from_b, &b.compose().unwrap()));
        assert!(!Arc::ptr_eq(&from_a, &from_c));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_failing_override_is_a_violation() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_executable(dir.path(), "ifs");
        let err = BenchmarkSpec::builder("x", exe.to_str().unwrap())
            .layer(defaults())
            .override_str("NAMPAR0/NPROC+=1")
            .build(&SpecContext::default())
            .unwrap_err();
        assert!(err.violations()[0].message.contains("applying overrides"));
    }

    #[test]
    fn test_safe_ids() {
        assert!(is_safe_id("t21_fc-1.0"));
        assert!(!is_safe_id(".."));
        assert!(!is_safe_id("a/b"));
        assert!(!is_safe_id(""));
    }
}
