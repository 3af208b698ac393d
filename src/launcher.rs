//! Launch-mode resolution.
//!
//! A launch mode maps to a command-line prefix prepended to the job's argv
//! and to a version probe for the launch backend itself:
//!
//! | mode  | prefix      | version probe             |
//! |-------|-------------|---------------------------|
//! | cli   | (none)      | none                      |
//! | shell | `$SHELL`    | `<shell> --version`       |
//! | bash  | `/bin/bash` | `bash --version`          |
//! | slurm | `sbatch`    | `sinfo -V`                |
//! | sge   | `qsub`      | `qstat --help` (1st line) |

use std::collections::BTreeMap;

use crate::record::BackendInfo;
use crate::runner::ProcessRunner;
use crate::version;
use crate::{RecapError, RecapResult};

/// Fixed interpreter used by bash mode.
pub const BASH_PATH: &str = "/bin/bash";

/// Environment variable naming the invoking shell, read from the captured
/// snapshot (never from the ambient environment).
pub const SHELL_VAR: &str = "SHELL";

/// Closed set of job-launch backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Treat the script argument as a raw command and run it directly.
    Cli,
    /// Run the script under the invoking shell.
    Shell,
    /// Run the script under the fixed bash interpreter.
    Bash,
    /// Submit the script with Slurm's `sbatch`.
    Slurm,
    /// Submit the script with SGE's `qsub`.
    Sge,
}

impl LaunchMode {
    pub const ALL: [LaunchMode; 5] = [
        LaunchMode::Cli,
        LaunchMode::Shell,
        LaunchMode::Bash,
        LaunchMode::Slurm,
        LaunchMode::Sge,
    ];

    /// Resolve a mode name. Unrecognized names are rejected here rather than
    /// deep inside execution; the CLI layer constrains its flag to the same
    /// closed list.
    pub fn resolve(name: &str) -> RecapResult<LaunchMode> {
        match name {
            "cli" => Ok(LaunchMode::Cli),
            "shell" => Ok(LaunchMode::Shell),
            "bash" => Ok(LaunchMode::Bash),
            "slurm" => Ok(LaunchMode::Slurm),
            "sge" => Ok(LaunchMode::Sge),
            other => Err(RecapError::UnsupportedLauncher(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchMode::Cli => "cli",
            LaunchMode::Shell => "shell",
            LaunchMode::Bash => "bash",
            LaunchMode::Slurm => "slurm",
            LaunchMode::Sge => "sge",
        }
    }

    /// Whether the job input is a script file (hashed and scanned line by
    /// line) rather than a raw command.
    pub fn is_file_mode(&self) -> bool {
        !matches!(self, LaunchMode::Cli)
    }

    /// The zero-or-one-element prefix prepended to the job's argv.
    ///
    /// Shell mode takes the shell path from the captured environment
    /// snapshot; an unset `SHELL` is a configuration error.
    pub fn prefix(&self, env: &BTreeMap<String, String>) -> RecapResult<Vec<String>> {
        match self {
            LaunchMode::Cli => Ok(Vec::new()),
            LaunchMode::Shell => {
                let shell = env.get(SHELL_VAR).ok_or_else(|| {
                    RecapError::EnvironmentMisconfigured(format!(
                        "`{SHELL_VAR}` is not set; shell mode needs the invoking shell's path"
                    ))
                })?;
                Ok(vec![shell.clone()])
            }
            LaunchMode::Bash => Ok(vec![BASH_PATH.to_string()]),
            LaunchMode::Slurm => Ok(vec!["sbatch".to_string()]),
            LaunchMode::Sge => Ok(vec!["qsub".to_string()]),
        }
    }

    /// Probe the launch backend's own version.
    ///
    /// Cli mode has no backend beyond the invoked command itself, so no
    /// probe runs and the version is absent. Any probe failure is fatal:
    /// a backend that cannot report its version is treated as unavailable.
    pub fn backend_info(
        &self,
        runner: &dyn ProcessRunner,
        env: &BTreeMap<String, String>,
        verbose: bool,
    ) -> RecapResult<BackendInfo> {
        let probe_target = match self {
            LaunchMode::Cli => None,
            LaunchMode::Shell => {
                let prefix = self.prefix(env)?;
                Some(prefix[0].clone())
            }
            LaunchMode::Bash => Some("bash".to_string()),
            LaunchMode::Slurm => Some("sinfo".to_string()),
            LaunchMode::Sge => Some("qstat".to_string()),
        };

        let version = match probe_target {
            None => None,
            Some(target) => {
                let text = match self {
                    // sinfo reports its version with -V, not --version
                    LaunchMode::Slurm => run_sinfo_probe(runner, &target, verbose),
                    _ => version::run_probe(runner, &target, verbose),
                }
                .map_err(|reason| RecapError::BackendUnavailable {
                    backend: self.as_str().to_string(),
                    reason,
                })?;
                Some(text)
            }
        };

        Ok(BackendInfo {
            name: self.as_str().to_string(),
            version,
        })
    }
}

fn run_sinfo_probe(
    runner: &dyn ProcessRunner,
    target: &str,
    verbose: bool,
) -> Result<String, String> {
    let argv = vec![target.to_string(), "-V".to_string()];
    let output = runner.run(&argv).map_err(|e| e.to_string())?;
    if !output.success() {
        return Err(format!("probe `{}` failed", argv.join(" ")));
    }
    if verbose {
        Ok(output.stdout.trim_end().to_string())
    } else {
        Ok(output.stdout.lines().next().unwrap_or_default().to_string())
    }
}
