//! Capture pipeline orchestration.
//!
//! The pipeline is strictly sequential: host facts, optional provisioning,
//! launcher resolution, input hashing, executable version capture, then the
//! job itself. Each stage blocks until complete and the first failure aborts
//! the whole run; no record is written for a failed pipeline.

use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use tracing::info;

use crate::environment::{self, EnvKind, HostFacts};
use crate::launcher::LaunchMode;
use crate::record::ProvenanceRecord;
use crate::recorder;
use crate::runner::{OsProcessRunner, ProcessRunner};
use crate::{RecapError, RecapResult};

/// Validated configuration for one capture run, supplied by the CLI layer.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub launcher: LaunchMode,
    /// Record identifier; defaults to `recap-HH-MM-SS` when absent.
    pub name: Option<String>,
    /// Keep full multi-line version output instead of the first line.
    pub verbose_version: bool,
    /// Environment manager and manifest, both present or both absent.
    pub env: Option<(EnvKind, PathBuf)>,
    /// The command or script file plus its arguments. Never empty.
    pub script: Vec<String>,
    pub output_dir: PathBuf,
}

impl CaptureConfig {
    pub fn new(launcher: LaunchMode, script: Vec<String>) -> Self {
        CaptureConfig {
            launcher,
            name: None,
            verbose_version: false,
            env: None,
            script,
            output_dir: PathBuf::from("."),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_verbose_version(mut self, verbose: bool) -> Self {
        self.verbose_version = verbose;
        self
    }

    pub fn with_environment(mut self, kind: EnvKind, manifest: impl Into<PathBuf>) -> Self {
        self.env = Some((kind, manifest.into()));
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

/// Run the capture pipeline and return the assembled record.
///
/// Snapshots the ambient process environment once, at pipeline start.
/// Performs no output-file I/O; `run` layers that on top.
pub fn capture(
    config: &CaptureConfig,
    runner: &dyn ProcessRunner,
) -> RecapResult<ProvenanceRecord> {
    capture_with_env(config, runner, std::env::vars().collect())
}

/// Capture with an explicit environment snapshot instead of the ambient one.
pub fn capture_with_env(
    config: &CaptureConfig,
    runner: &dyn ProcessRunner,
    environment: std::collections::BTreeMap<String, String>,
) -> RecapResult<ProvenanceRecord> {
    if config.script.is_empty() {
        return Err(RecapError::EmptyCommand);
    }

    let name = config.name.clone().unwrap_or_else(default_name);
    info!(name = %name, launcher = config.launcher.as_str(), "starting capture");

    let mut host = HostFacts::capture_with_env(runner, environment)?;

    let provisioned = match &config.env {
        None => None,
        Some((kind, manifest)) => {
            let outcome =
                environment::provision(runner, &name, *kind, manifest, &host.environment)?;
            // derived value lands in the record's snapshot copy, not in the
            // ambient process environment
            host.environment
                .insert("SPACK_ENV".to_string(), outcome.env_dir);
            Some(outcome.environment)
        }
    };

    let prefix = config.launcher.prefix(&host.environment)?;
    let launch_mode =
        config
            .launcher
            .backend_info(runner, &host.environment, config.verbose_version)?;

    let input_hash = recorder::hash_input(config.launcher, &config.script)?;
    let executables = recorder::collect_executable_versions(
        runner,
        config.launcher,
        &config.script,
        config.verbose_version,
    )?;

    let outcome = recorder::execute(runner, &prefix, &config.script)?;

    Ok(recorder::assemble(
        name,
        host,
        provisioned,
        launch_mode,
        input_hash,
        executables,
        outcome,
    ))
}

/// Run the capture pipeline with the OS runner and write the record.
pub fn run(config: CaptureConfig) -> RecapResult<PathBuf> {
    let record = capture(&config, &OsProcessRunner)?;
    let path = record.write_to_dir(Path::new(&config.output_dir))?;
    println!("recorded `{}` -> {}", record.name, path.display());
    Ok(path)
}

fn default_name() -> String {
    let stamp = time::format_description::parse("[hour]-[minute]-[second]")
        .ok()
        .and_then(|fmt| OffsetDateTime::now_utc().format(&fmt).ok())
        .unwrap_or_else(|| "unnamed".to_string());
    format!("recap-{stamp}")
}
