//! Host facts and reproducible-environment provisioning.
//!
//! `HostFacts` snapshots the machine identity and the ambient process
//! environment exactly once, at pipeline start. After capture the snapshot
//! is the only environment the pipeline consults; the two documented
//! variables (`SHELL`, `SPACK_ROOT`) are read from it, never from the
//! ambient environment.
//!
//! `provision` builds a named Spack environment from a manifest in two
//! explicit phases (create, then activate + install) so each phase's
//! failure is independently diagnosable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::runner::ProcessRunner;
use crate::{RecapError, RecapResult};

/// Environment variable naming the Spack installation root, read from the
/// captured snapshot.
pub const SPACK_ROOT_VAR: &str = "SPACK_ROOT";

/// Marker line emitted by a successful `spack env create`.
const CREATE_MARKER: &str = "Created environment";

/// Host identity plus the one-time environment snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostFacts {
    pub hostname: String,
    pub architecture: String,
    /// Snapshot of the process environment at capture time. Keys are unique;
    /// the map is never re-read from the ambient environment.
    pub environment: BTreeMap<String, String>,
}

impl HostFacts {
    /// Capture host facts, snapshotting the current process environment.
    pub fn capture(runner: &dyn ProcessRunner) -> RecapResult<HostFacts> {
        Self::capture_with_env(runner, std::env::vars().collect())
    }

    /// Capture host facts with an explicit environment snapshot.
    pub fn capture_with_env(
        runner: &dyn ProcessRunner,
        environment: BTreeMap<String, String>,
    ) -> RecapResult<HostFacts> {
        let architecture = host_query(runner, "arch")?;
        let hostname = host_query(runner, "hostname")?;
        Ok(HostFacts {
            hostname,
            architecture,
            environment,
        })
    }
}

/// One OS identity query, trimmed of trailing whitespace.
fn host_query(runner: &dyn ProcessRunner, command: &str) -> RecapResult<String> {
    let output = runner
        .run(&[command.to_string()])
        .map_err(|e| RecapError::HostQuery {
            command: command.to_string(),
            reason: e.to_string(),
        })?;
    if !output.success() {
        return Err(RecapError::HostQuery {
            command: command.to_string(),
            reason: format!("exited with code {:?}", output.code),
        });
    }
    Ok(output.stdout.trim_end().to_string())
}

/// Supported reproducible-environment managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvKind {
    Spack,
}

impl EnvKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKind::Spack => "spack",
        }
    }
}

/// Provenance of a provisioned package environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedEnvironment {
    pub env_type: EnvKind,
    pub manifest_path: PathBuf,
    pub manifest_contents: String,
    pub install_log: String,
}

/// Result of a successful provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub environment: ProvisionedEnvironment,
    /// Directory of the created environment, parsed from the create output.
    /// Recorded as `SPACK_ENV` in the record's environment snapshot.
    pub env_dir: String,
}

/// Create and install a named package environment from a manifest.
///
/// Phase 1 creates the environment; phase 2 sources the manager's setup
/// script, activates the environment and installs its dependencies in one
/// composite shell invocation. Failure in either phase aborts provisioning;
/// an environment the manager may have partially registered is left behind
/// and named in the error.
pub fn provision(
    runner: &dyn ProcessRunner,
    name: &str,
    kind: EnvKind,
    manifest_path: &Path,
    env: &BTreeMap<String, String>,
) -> RecapResult<ProvisionOutcome> {
    let manifest_contents = std::fs::read_to_string(manifest_path).map_err(|e| {
        RecapError::EnvironmentCreationFailed {
            name: name.to_string(),
            reason: format!("cannot read manifest `{}`: {e}", manifest_path.display()),
        }
    })?;

    let env_dir = create_environment(runner, name, manifest_path)?;
    debug!(name, env_dir = %env_dir, "environment created");

    let install_log = install_environment(runner, name, env)?;
    debug!(name, "environment installed");

    Ok(ProvisionOutcome {
        environment: ProvisionedEnvironment {
            env_type: kind,
            manifest_path: manifest_path.to_path_buf(),
            manifest_contents,
            install_log,
        },
        env_dir,
    })
}

/// Phase 1: `spack env create <name> <manifest>`.
///
/// The created environment's directory is parsed out of the command output:
/// the success marker line is located, and the directory is the last
/// whitespace token of the line after it. No marker means no environment;
/// nothing degraded is accepted.
fn create_environment(
    runner: &dyn ProcessRunner,
    name: &str,
    manifest_path: &Path,
) -> RecapResult<String> {
    let argv = vec![
        "spack".to_string(),
        "env".to_string(),
        "create".to_string(),
        name.to_string(),
        manifest_path.display().to_string(),
    ];
    let output = runner.run(&argv).map_err(|e| RecapError::EnvironmentCreationFailed {
        name: name.to_string(),
        reason: e.to_string(),
    })?;

    if !output.success() {
        return Err(RecapError::EnvironmentCreationFailed {
            name: name.to_string(),
            reason: format!("`spack env create` exited with code {:?}", output.code),
        });
    }

    parse_created_env_dir(&output.stdout).ok_or_else(|| RecapError::EnvironmentCreationFailed {
        name: name.to_string(),
        reason: format!("no `{CREATE_MARKER}` marker in create output"),
    })
}

/// Locate the success marker and return the environment directory from the
/// following line. Public within the crate for direct parse tests.
pub(crate) fn parse_created_env_dir(stdout: &str) -> Option<String> {
    let mut lines = stdout.lines();
    lines.find(|line| line.contains(CREATE_MARKER))?;
    let dir = lines.next()?.split_whitespace().next_back()?;
    if dir.is_empty() {
        return None;
    }
    Some(dir.to_string())
}

/// Phase 2: source the setup script, activate, install — one composite
/// shell invocation so the activation state carries into the install.
fn install_environment(
    runner: &dyn ProcessRunner,
    name: &str,
    env: &BTreeMap<String, String>,
) -> RecapResult<String> {
    let spack_root = env.get(SPACK_ROOT_VAR).ok_or_else(|| {
        RecapError::EnvironmentMisconfigured(format!(
            "`{SPACK_ROOT_VAR}` is not set; provisioning needs the Spack installation root"
        ))
    })?;

    let quoted_name = shlex::try_quote(name).map_err(|_| {
        RecapError::EnvironmentCreationFailed {
            name: name.to_string(),
            reason: "environment name is not shell-quotable".to_string(),
        }
    })?;
    let quoted_setup = shlex::try_quote(&format!("{spack_root}/share/spack/setup-env.sh"))
        .map_err(|_| RecapError::EnvironmentMisconfigured(
            format!("`{SPACK_ROOT_VAR}` is not shell-quotable"),
        ))?
        .into_owned();

    let composite = format!(
        ". {quoted_setup}; spack env activate {quoted_name}; spack install"
    );
    let argv = vec!["sh".to_string(), "-c".to_string(), composite];

    let output = runner.run(&argv).map_err(|e| RecapError::EnvironmentInstallFailed {
        name: name.to_string(),
        reason: e.to_string(),
    })?;

    if !output.success() {
        return Err(RecapError::EnvironmentInstallFailed {
            name: name.to_string(),
            reason: format!("install command exited with code {:?}", output.code),
        });
    }

    Ok(output.stdout)
}
