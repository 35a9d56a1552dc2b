//! Processor chain and dispatch (spec.md §4.4).
//!
//! A `Processor` declares a `type_name` and an async `handle` that observes
//! one parsed file and produces side-effects (events, metrics). The registry
//! is built once at startup and is immutable; `process_files` is the
//! per-tick dispatch that applies every processor to every downloaded file,
//! persists an audit copy, and accumulates errors without letting one
//! processor's failure block the others.

pub mod prenote;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::audit::AuditSaver;
use crate::error::AchParseError;
use crate::events::EventSink;
use crate::model::{DownloadedFiles, IngestedFile};
use crate::multierror::{MultiError, ProcessorFailure};

#[async_trait]
pub trait Processor: Send + Sync {
    fn type_name(&self) -> &str;
    async fn handle(&self, file: &IngestedFile, sink: &dyn EventSink) -> eyre::Result<()>;
}

/// Immutable, ordered list of processors constructed once at startup.
pub struct ProcessorRegistry {
    processors: Vec<Box<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new(processors: Vec<Box<dyn Processor>>) -> Self {
        Self { processors }
    }

    pub fn processors(&self) -> &[Box<dyn Processor>] {
        &self.processors
    }
}

/// Per-tick options that affect parsing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    pub allow_missing_batch_header: bool,
}

/// Applies every registered processor to every file in `snapshot`, in
/// lexicographic path order within each category, persisting an audit copy
/// of each file regardless of per-processor outcome. Returns the aggregate
/// error, empty if nothing failed. `cancel` is checked between files so a
/// shutdown stops the chain early (spec.md §5); files already audited stay
/// audited, and whatever is left unaudited is still on disk for the next
/// tick or for operator inspection.
pub async fn process_files(
    snapshot: &DownloadedFiles,
    registry: &ProcessorRegistry,
    sink: &dyn EventSink,
    audit: &AuditSaver,
    options: ProcessOptions,
    cancel: &CancellationToken,
) -> MultiError {
    let mut errors = MultiError::new();

    let mut paths: Vec<_> = snapshot.all_local_paths().cloned().collect();
    paths.sort();

    for path in paths {
        if cancel.is_cancelled() {
            warn!("shutdown requested mid-tick, stopping the processor chain early");
            break;
        }
        let filepath = path.to_string_lossy().into_owned();
        let contents = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                errors.push(ProcessorFailure {
                    processor_type: "downloader".into(),
                    filepath,
                    source: eyre::Report::new(e),
                });
                continue;
            }
        };

        let ach = match parse_with_fallback(&contents, options.allow_missing_batch_header) {
            Ok(ach) => ach,
            Err(e) => {
                errors.push(ProcessorFailure {
                    processor_type: "parser".into(),
                    filepath,
                    source: eyre::Report::new(e),
                });
                continue;
            }
        };

        let file = IngestedFile {
            filepath: path.clone(),
            contents: contents.clone(),
            ach,
        };

        for processor in registry.processors() {
            if let Err(e) = processor.handle(&file, sink).await {
                errors.push(ProcessorFailure {
                    processor_type: processor.type_name().to_string(),
                    filepath: filepath.clone(),
                    source: e,
                });
            }
        }

        if let Err(e) = audit.save(&file.basename(), &file.contents).await {
            errors.push(ProcessorFailure {
                processor_type: "audit".into(),
                filepath: filepath.clone(),
                source: eyre::Report::new(e),
            });
        }
    }

    errors
}

fn parse_with_fallback(
    bytes: &[u8],
    allow_missing_batch_header: bool,
) -> Result<crate::ach::AchFile, AchParseError> {
    match crate::ach::parse(bytes) {
        Ok(ach) => Ok(ach),
        Err(AchParseError::MissingBatchHeader(_)) if allow_missing_batch_header => {
            crate::ach::parse_relaxed(bytes)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditSaver, FilesystemAuditStore};
    use crate::events::InMemorySink;
    use crate::model::DownloadedFiles;
    use tempfile::tempdir;

    #[tokio::test]
    async fn unreadable_file_is_recorded_but_does_not_abort_the_tick() {
        let dir = tempdir().unwrap();
        let mut snapshot = DownloadedFiles::empty(dir.path().to_path_buf());
        snapshot.inbound.push(dir.path().join("missing.ach"));

        let registry = ProcessorRegistry::new(vec![]);
        let (sink, _rx) = InMemorySink::new(4);
        let audit = AuditSaver::new(
            Box::new(FilesystemAuditStore::new(dir.path().join("audit"))),
            "host",
        );

        let errors = process_files(
            &snapshot,
            &registry,
            &sink,
            &audit,
            ProcessOptions::default(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_the_chain_before_any_file_is_touched() {
        let dir = tempdir().unwrap();
        let mut snapshot = DownloadedFiles::empty(dir.path().to_path_buf());
        let file_path = dir.path().join("a.ach");
        tokio::fs::write(&file_path, b"irrelevant").await.unwrap();
        snapshot.inbound.push(file_path);

        let registry = ProcessorRegistry::new(vec![]);
        let (sink, _rx) = InMemorySink::new(4);
        let audit = AuditSaver::new(
            Box::new(FilesystemAuditStore::new(dir.path().join("audit"))),
            "host",
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let errors = process_files(
            &snapshot,
            &registry,
            &sink,
            &audit,
            ProcessOptions::default(),
            &cancel,
        )
        .await;
        assert!(errors.is_empty());
        assert!(!dir.path().join("audit").exists());
    }
}
