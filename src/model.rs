//! Core data types shared across the pipeline: shards, agent configuration,
//! and the file representations that flow from the downloader through the
//! processor chain to the audit saver.

use std::path::{Path, PathBuf};

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

/// A tenant partition: a name, which upload agent serves it, and the
/// outbound-facing conveniences (filename template, return address) that
/// belong to it. Shards are immutable for the lifetime of a `Scheduler`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shard {
    pub name: String,
    pub upload_agent: String,
    #[serde(default)]
    pub filename_template: Option<String>,
    #[serde(default)]
    pub return_address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Ftp,
    Sftp,
    Mock,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPaths {
    pub inbound: String,
    #[serde(default)]
    pub outbound: String,
    #[serde(default)]
    pub reconciliation: String,
    #[serde(default)]
    pub return_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAgentConfig {
    pub id: String,
    pub kind: AgentKind,
    pub hostname: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub passive: bool,
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    pub paths: AgentPaths,
    /// CIDRs this agent's resolved hostname IP must fall inside. Empty means
    /// unrestricted (only appropriate for `Mock`).
    #[serde(default)]
    pub allowed_ips: Vec<String>,
}

impl UploadAgentConfig {
    pub fn allowed_networks(&self) -> Result<Vec<IpNetwork>, crate::error::ConfigError> {
        self.allowed_ips
            .iter()
            .map(|s| {
                s.parse::<IpNetwork>()
                    .map_err(|e| crate::error::ConfigError::InvalidCidr(s.clone(), e))
            })
            .collect()
    }
}

fn default_port() -> u16 {
    21
}

/// Raw bytes read from or about to be written to a remote endpoint. This is
/// the `File` type `Agent` methods operate on.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub filepath: PathBuf,
    pub contents: Vec<u8>,
}

impl RawFile {
    pub fn basename(&self) -> String {
        self.filepath
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// One category of remote directory a shard's agent exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCategory {
    Inbound,
    Reconciliation,
    Return,
}

impl RemoteCategory {
    pub fn subdir(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Reconciliation => "reconciliation",
            Self::Return => "return",
        }
    }
}

/// A per-tick local snapshot of everything the downloader pulled from the
/// remote endpoint. Exclusively owned by one tick; nothing deletes
/// `local_dir` implicitly (no `Drop` impl) — deletion only happens through
/// the explicit cleanup step (`crate::cleanup`), so an aborted tick always
/// leaves evidence on disk for operator recovery.
#[derive(Debug, Clone)]
pub struct DownloadedFiles {
    pub local_dir: PathBuf,
    pub inbound: Vec<PathBuf>,
    pub return_files: Vec<PathBuf>,
    pub reconciliation: Vec<PathBuf>,
    /// Always empty in this implementation: the `Agent` contract (spec.md
    /// §4.7) exposes no getter for a distinct "corrections" remote root, so
    /// there is nothing to populate this from. Kept as a field so the shape
    /// matches spec.md §3's data model exactly; see DESIGN.md.
    pub corrections: Vec<PathBuf>,
    /// Per-file remote paths actually downloaded, keyed by local path, so
    /// cleanup can issue `Agent::delete` against the original remote
    /// location without re-deriving it from the local layout.
    pub remote_paths: std::collections::HashMap<PathBuf, String>,
}

impl DownloadedFiles {
    pub fn empty(local_dir: PathBuf) -> Self {
        Self {
            local_dir,
            inbound: Vec::new(),
            return_files: Vec::new(),
            reconciliation: Vec::new(),
            corrections: Vec::new(),
            remote_paths: std::collections::HashMap::new(),
        }
    }

    pub fn all_local_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.inbound
            .iter()
            .chain(self.return_files.iter())
            .chain(self.reconciliation.iter())
            .chain(self.corrections.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.inbound.is_empty()
            && self.return_files.is_empty()
            && self.reconciliation.is_empty()
            && self.corrections.is_empty()
    }

    pub fn category_of(&self, path: &Path) -> Option<RemoteCategory> {
        if self.inbound.iter().any(|p| p == path) {
            Some(RemoteCategory::Inbound)
        } else if self.return_files.iter().any(|p| p == path) {
            Some(RemoteCategory::Return)
        } else if self.reconciliation.iter().any(|p| p == path) {
            Some(RemoteCategory::Reconciliation)
        } else {
            None
        }
    }
}

/// An ACH file once it has been downloaded and (successfully) parsed — the
/// value each `Processor::handle` receives.
#[derive(Debug, Clone)]
pub struct IngestedFile {
    pub filepath: PathBuf,
    pub contents: Vec<u8>,
    pub ach: crate::ach::AchFile,
}

impl IngestedFile {
    pub fn basename(&self) -> String {
        self.filepath
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Tagged event envelope emitted to the `EventSink`. Each variant carries the
/// base filename, the whole parsed file, and a category-relevant subset of
/// batches/entries.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum Event {
    PrenoteFile(PrenoteFileEvent),
    CorrectionFile(CorrectionFileEvent),
    IncomingFile(IncomingFileEvent),
    ReturnFile(ReturnFileEvent),
    ReconciliationFile(ReconciliationFileEvent),
}

/// Carries the whole parsed file plus a copy of `batches` filtered down to
/// only the prenote entries each batch contained, per spec.md §4.5.
#[derive(Debug, Clone, Serialize)]
pub struct PrenoteFileEvent {
    pub filename: String,
    pub file: crate::ach::AchFile,
    pub batches: Vec<crate::ach::Batch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrectionFileEvent {
    pub filename: String,
    pub file: crate::ach::AchFile,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncomingFileEvent {
    pub filename: String,
    pub file: crate::ach::AchFile,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReturnFileEvent {
    pub filename: String,
    pub file: crate::ach::AchFile,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationFileEvent {
    pub filename: String,
    pub file: crate::ach::AchFile,
}
