//! Input hashing, executable version capture, timed execution, and record
//! assembly.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};

use crate::environment::{HostFacts, ProvisionedEnvironment};
use crate::launcher::LaunchMode;
use crate::record::{BackendInfo, ExecutableVersion, ProvenanceRecord};
use crate::runner::ProcessRunner;
use crate::version;
use crate::{RecapError, RecapResult};

/// Read size for the streaming file hash; memory use stays bounded
/// regardless of file size.
const HASH_CHUNK_BYTES: usize = 64 * 1024;

/// Compute the SHA-256 fingerprint of the job input.
///
/// In cli mode the input is the argument strings themselves: the raw byte
/// concatenation, order preserved, no separators. In file modes it is the
/// byte content of the script file, streamed in fixed-size chunks.
pub fn hash_input(mode: LaunchMode, script: &[String]) -> RecapResult<String> {
    if mode.is_file_mode() {
        let path = script.first().ok_or(RecapError::EmptyCommand)?;
        hash_file(Path::new(path))
    } else {
        let mut hasher = Sha256::new();
        for arg in script {
            hasher.update(arg.as_bytes());
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

fn hash_file(path: &Path) -> RecapResult<String> {
    let map_err = |source| RecapError::HashComputation {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(map_err)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_BYTES];
    loop {
        let n = file.read(&mut buf).map_err(map_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Capture the version of every distinct executable the job invokes.
///
/// In cli mode that is exactly the invoked command. In file modes the script
/// is scanned line by line: interpreter-directive lines (any line containing
/// `#!`) and empty lines are skipped, and each remaining line contributes
/// its first whitespace-delimited token. A command seen more than once is
/// probed only at its first occurrence. A command whose probe fails is
/// fatal; there is no partial-success mode.
pub fn collect_executable_versions(
    runner: &dyn ProcessRunner,
    mode: LaunchMode,
    script: &[String],
    verbose: bool,
) -> RecapResult<BTreeMap<String, ExecutableVersion>> {
    let mut executables = BTreeMap::new();

    if mode.is_file_mode() {
        let path = script.first().ok_or(RecapError::EmptyCommand)?;
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script `{path}`"))?;
        for line in contents.lines() {
            if line.contains("#!") {
                continue;
            }
            let Some(command) = line.split_whitespace().next() else {
                continue;
            };
            capture_once(runner, command, verbose, &mut executables)?;
        }
    } else {
        let command = script.first().ok_or(RecapError::EmptyCommand)?;
        capture_once(runner, command, verbose, &mut executables)?;
    }

    Ok(executables)
}

fn capture_once(
    runner: &dyn ProcessRunner,
    command: &str,
    verbose: bool,
    executables: &mut BTreeMap<String, ExecutableVersion>,
) -> RecapResult<()> {
    if executables.contains_key(command) {
        return Ok(());
    }
    let version = version::run_probe(runner, command, verbose).map_err(|reason| {
        RecapError::VersionCapture {
            command: command.to_string(),
            reason,
        }
    })?;
    debug!(command, "captured executable version");
    executables.insert(
        command.to_string(),
        ExecutableVersion {
            command: command.to_string(),
            version,
        },
    );
    Ok(())
}

/// Output of the timed job execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Standard output of the job. Standard error is discarded, not merged.
    pub stdout: String,
    pub start_time: OffsetDateTime,
    pub end_time: OffsetDateTime,
}

/// Launch the job and time it.
///
/// The final argv is `prefix ++ script`; wall-clock time is recorded
/// immediately before and after the child runs. A non-zero exit is fatal.
pub fn execute(
    runner: &dyn ProcessRunner,
    prefix: &[String],
    script: &[String],
) -> RecapResult<ExecutionOutcome> {
    let mut argv = Vec::with_capacity(prefix.len() + script.len());
    argv.extend_from_slice(prefix);
    argv.extend_from_slice(script);
    info!(command = %argv.join(" "), "launching job");

    let start_time = OffsetDateTime::now_utc();
    let output = runner.run(&argv)?;
    let end_time = OffsetDateTime::now_utc();

    if !output.success() {
        return Err(RecapError::JobExecution {
            status: match output.code {
                Some(code) => format!("code {code}"),
                None => "signal".to_string(),
            },
            stderr: output.stderr,
        });
    }

    Ok(ExecutionOutcome {
        stdout: output.stdout,
        start_time,
        end_time,
    })
}

/// Pure aggregation of the captured pieces into the root record. No I/O.
pub fn assemble(
    name: String,
    host: HostFacts,
    provisioned: Option<ProvisionedEnvironment>,
    launch_mode: BackendInfo,
    input_hash: String,
    executables: BTreeMap<String, ExecutableVersion>,
    outcome: ExecutionOutcome,
) -> ProvenanceRecord {
    ProvenanceRecord {
        name,
        host,
        provisioned,
        launch_mode,
        input_hash,
        executables,
        start_time: format_timestamp(outcome.start_time),
        end_time: format_timestamp(outcome.end_time),
        script_output: outcome.stdout,
    }
}

fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_default()
}
