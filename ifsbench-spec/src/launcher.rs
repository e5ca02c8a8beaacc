//! Launchers
//!
//! Turn an executable, its arguments and the requested resources into the
//! command line that is actually spawned. MPI launchers are external programs
//! found on the run's `PATH`.

use crate::env::EnvMap;
use crate::resources::Resources;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// How the executable is started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LauncherKind {
    /// Run the executable directly
    #[default]
    Direct,
    /// Open MPI style `mpirun`
    Mpirun,
    /// Slurm `srun`
    Srun,
}

impl LauncherKind {
    /// Launcher program, if any
    pub fn program(self) -> Option<&'static str> {
        match self {
            LauncherKind::Direct => None,
            LauncherKind::Mpirun => Some("mpirun"),
            LauncherKind::Srun => Some("srun"),
        }
    }

    /// Flags derived from the resources
    pub fn resource_flags(self, resources: &Resources) -> Vec<String> {
        match self {
            LauncherKind::Direct => Vec::new(),
            LauncherKind::Mpirun => {
                let mut flags = vec!["-n".to_string(), resources.tasks.to_string()];
                if resources.threads_per_task > 1 {
                    flags.push("--map-by".to_string());
                    flags.push(format!("core:PE={}", resources.threads_per_task));
                }
                flags
            }
            LauncherKind::Srun => {
                let mut flags = vec![
                    format!("--ntasks={}", resources.tasks),
                    format!("--cpus-per-task={}", resources.threads_per_task),
                ];
                if let Some(nodes) = resources.nodes {
                    flags.push(format!("--nodes={}", nodes));
                }
                if let Some(mb) = resources.memory_mb {
                    flags.push(format!("--mem={}M", mb));
                }
                flags
            }
        }
    }

    /// Full command for `executable` with `args`
    pub fn command(
        self,
        executable: &Path,
        args: &[String],
        resources: &Resources,
        extra_flags: &[String],
        env: EnvMap,
    ) -> LaunchCommand {
        let exe = executable.display().to_string();
        match self.program() {
            None => LaunchCommand {
                program: exe,
                args: args.to_vec(),
                env,
            },
            Some(program) => {
                let mut full = self.resource_flags(resources);
                full.extend(extra_flags.iter().cloned());
                full.push(exe);
                full.extend(args.iter().cloned());
                LaunchCommand {
                    program: program.to_string(),
                    args: full,
                    env,
                }
            }
        }
    }
}

impl fmt::Display for LauncherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LauncherKind::Direct => "direct",
            LauncherKind::Mpirun => "mpirun",
            LauncherKind::Srun => "srun",
        })
    }
}

impl FromStr for LauncherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(LauncherKind::Direct),
            "mpirun" => Ok(LauncherKind::Mpirun),
            "srun" => Ok(LauncherKind::Srun),
            other => Err(format!("Unknown launcher: {}", other)),
        }
    }
}

/// Program, arguments and environment of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchCommand {
    /// Program to spawn
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Complete environment of the child
    #[serde(skip)]
    pub env: EnvMap,
}

impl LaunchCommand {
    /// Program followed by arguments
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Shell-like rendering for logs and dry runs
    pub fn display(&self) -> String {
        self.argv()
            .iter()
            .map(|a| {
                if a.is_empty() || a.contains(char::is_whitespace) {
                    format!("'{}'", a.replace('\'', r"'\''"))
                } else {
                    a.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn resources() -> Resources {
        Resources {
            tasks: 8,
            threads_per_task: 4,
            nodes: Some(2),
            memory_mb: Some(64000),
            ..Default::default()
        }
    }

    fn exe() -> PathBuf {
        PathBuf::from("/opt/ifs/bin/ifsMASTER")
    }

    #[test]
    fn test_direct() {
        let cmd = LauncherKind::Direct.command(&exe(), &["-v".into()], &resources(), &[], EnvMap::new());
        assert_eq!(cmd.argv(), vec!["/opt/ifs/bin/ifsMASTER", "-v"]);
    }

    #[test]
    fn test_mpirun() {
        let cmd = LauncherKind::Mpirun.command(
            &exe(),
            &["-v".into()],
            &resources(),
            &["--oversubscribe".into()],
            EnvMap::new(),
        );
        assert_eq!(
            cmd.argv(),
            vec![
                "mpirun",
                "-n",
                "8",
                "--map-by",
                "core:PE=4",
                "--oversubscribe",
                "/opt/ifs/bin/ifsMASTER",
                "-v"
            ]
        );

        let single = Resources::default();
        assert_eq!(LauncherKind::Mpirun.resource_flags(&single), vec!["-n", "1"]);
    }

    #[test]
    fn test_srun() {
        let flags = LauncherKind::Srun.resource_flags(&resources());
        assert_eq!(
            flags,
            vec!["--ntasks=8", "--cpus-per-task=4", "--nodes=2", "--mem=64000M"]
        );
    }

    #[test]
    fn test_display_quotes_whitespace() {
        let cmd = LaunchCommand {
            program: "run me".into(),
            args: vec!["a".into(), "it's x".into()],
            env: EnvMap::new(),
        };
        assert_eq!(cmd.display(), r"'run me' a 'it'\''s x'");
    }

    #[test]
    fn test_parse_launcher() {
        assert_eq!("SRUN".parse(), Ok(LauncherKind::Srun));
        assert!("aprun".parse::<LauncherKind>().is_err());
    }
}
