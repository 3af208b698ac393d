pub mod environment;
pub mod launcher;
pub mod record;
pub mod recorder;
pub mod run_cmd;
pub mod runner;
pub mod version;

use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for the capture pipeline.
///
/// Every variant is fatal: the pipeline aborts on the first error and no
/// record is written.
#[derive(Debug, Error)]
pub enum RecapError {
    #[error("unsupported launcher `{0}`")]
    UnsupportedLauncher(String),

    #[error("environment misconfigured: {0}")]
    EnvironmentMisconfigured(String),

    #[error("launch backend `{backend}` unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("environment `{name}` could not be created: {reason}")]
    EnvironmentCreationFailed { name: String, reason: String },

    #[error("environment `{name}` could not be installed: {reason}")]
    EnvironmentInstallFailed { name: String, reason: String },

    #[error("cannot capture version of `{command}`: {reason}")]
    VersionCapture { command: String, reason: String },

    #[error("failed to hash `{path}`: {source}")]
    HashComputation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("job exited with {status}: {stderr}")]
    JobExecution { status: String, stderr: String },

    #[error("failed to run `{command}`: {source}")]
    ProcessSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("host query `{command}` failed: {reason}")]
    HostQuery { command: String, reason: String },

    #[error("empty command line")]
    EmptyCommand,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type RecapResult<T> = Result<T, RecapError>;
