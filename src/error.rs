//! Error taxonomy for the inbound ODFI pipeline.
//!
//! Leaf operations return one of the typed errors below; per-shard and
//! per-tick orchestration wraps them with shard/file context rather than
//! discarding the underlying cause.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("shard '{0}' references unknown upload agent '{1}'")]
    UnknownAgent(String, String),
    #[error("duplicate shard name '{0}'")]
    DuplicateShard(String),
    #[error("invalid CIDR '{0}': {1}")]
    InvalidCidr(String, ipnetwork::IpNetworkError),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{hostname} is not permitted by the agent's outbound IP allow-list")]
    IpNotAllowed { hostname: String },
    #[error("failed to resolve hostname {0}: {1}")]
    Resolve(String, std::io::Error),
    #[error("listing {path} on {hostname} failed: {source}")]
    List {
        hostname: String,
        path: String,
        #[source]
        source: eyre::Report,
    },
    #[error("reading {path} from {hostname} failed: {source}")]
    Read {
        hostname: String,
        path: String,
        #[source]
        source: eyre::Report,
    },
    #[error("deleting {path} from {hostname} failed: {source}")]
    Delete {
        hostname: String,
        path: String,
        #[source]
        source: eyre::Report,
    },
    #[error("uploading {path} to {hostname} failed: {source}")]
    Upload {
        hostname: String,
        path: String,
        #[source]
        source: eyre::Report,
    },
    #[error("connecting to {hostname} failed: {source}")]
    Connect {
        hostname: String,
        #[source]
        source: eyre::Report,
    },
}

#[derive(Debug, Error)]
pub enum AchParseError {
    #[error("file is empty")]
    Empty,
    #[error("missing file header record")]
    MissingFileHeader,
    #[error("missing file control record")]
    MissingFileControl,
    #[error("batch at line {0} is missing its header record")]
    MissingBatchHeader(usize),
    #[error("record at line {line} has unexpected length {len} (expected 94)")]
    BadRecordLength { line: usize, len: usize },
    #[error("record at line {0} has an unrecognized record type '{1}'")]
    UnknownRecordType(usize, char),
    #[error("field '{field}' at line {line} is not a valid integer: {value}")]
    BadInteger {
        line: usize,
        field: &'static str,
        value: String,
    },
}

/// A prenote entry whose amount is nonzero. Recorded, not fatal: the entry is
/// still counted and emitted, per spec.
#[derive(Debug, Error)]
#[error("non-zero prenotification amount={amount} traceNumber={trace_number}")]
pub struct ClassificationError {
    pub amount: i64,
    pub trace_number: String,
}

#[derive(Debug, Error)]
pub enum EmissionError {
    #[error("sending event for {filename} failed: {source}")]
    Send {
        filename: String,
        #[source]
        source: eyre::Report,
    },
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("saving audit copy of {filename} to {key} failed: {source}")]
    Save {
        filename: String,
        key: String,
        #[source]
        source: eyre::Report,
    },
}

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("deleting remote file {path} failed: {source}")]
    RemoteDelete {
        path: String,
        #[source]
        source: TransportError,
    },
    #[error("removing local directory {path} failed: {source}")]
    LocalRemove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert delivery failed: {0}")]
    Delivery(#[from] eyre::Report),
}

/// A per-shard tick failure carrying both the earliest error in the chain
/// and the full aggregate. Spec.md §7/§9: "the alerter sees the *first* in
/// chain; logs see all" — `first` is what `Alerter::alert_error` is called
/// with, `full` (this type's `Display`) is what gets logged.
#[derive(Debug)]
pub struct TickFailure {
    pub first: eyre::Report,
    pub full: eyre::Report,
}

impl TickFailure {
    /// Wraps a single error as both the first cause and the whole story —
    /// used at leaf `?` sites (agent construction, download, cleanup) where
    /// there's no aggregate to collapse.
    pub fn single(err: eyre::Report) -> Self {
        let full = eyre::eyre!("{err}");
        Self { first: err, full }
    }
}

impl std::fmt::Display for TickFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full)
    }
}

impl std::error::Error for TickFailure {}

impl From<eyre::Report> for TickFailure {
    fn from(err: eyre::Report) -> Self {
        TickFailure::single(err)
    }
}
