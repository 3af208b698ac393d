//! Provenance record schema.
//!
//! The record is the tool's single output artifact: everything needed to
//! later prove or re-derive what ran, with what dependencies, on what host.
//! It is assembled exactly once per invocation, fully populated before
//! serialization, and never mutated after write.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::environment::{HostFacts, ProvisionedEnvironment};
use crate::RecapResult;

/// Suffix appended to the record name to form the output file name.
pub const RECORD_SUFFIX: &str = ".out";

/// Launch backend identity and captured version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendInfo {
    pub name: String,
    /// Absent for cli mode, which has no backend beyond the invoked command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Captured version of one external executable the job invokes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutableVersion {
    pub command: String,
    pub version: String,
}

/// The root provenance aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub name: String,
    pub host: HostFacts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioned: Option<ProvisionedEnvironment>,
    pub launch_mode: BackendInfo,
    /// SHA-256 of the job input, hex-encoded. Identical input always yields
    /// the identical hash, independent of host or time.
    pub input_hash: String,
    /// One entry per distinct command the job invokes, keyed by command name.
    pub executables: BTreeMap<String, ExecutableVersion>,
    pub start_time: String,
    pub end_time: String,
    pub script_output: String,
}

impl ProvenanceRecord {
    /// Output file name for this record.
    pub fn file_name(&self) -> String {
        format!("{}{RECORD_SUFFIX}", self.name)
    }

    /// Write the record as indentation-formatted JSON under `dir`.
    pub fn write_to_dir(&self, dir: &Path) -> RecapResult<std::path::PathBuf> {
        let path = dir.join(self.file_name());
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create `{}`", dir.display()))?;
        let json = serde_json::to_vec_pretty(self)
            .with_context(|| format!("failed to serialize record `{}`", self.name))?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write record to `{}`", path.display()))?;
        Ok(path)
    }
}
