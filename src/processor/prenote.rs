//! Prenote classifier (spec.md §4.5) — the worked-example emitter.
//!
//! Identifies pre-notification entries, emits a single `PrenoteFile` event
//! per file when at least one exists anywhere in it, and increments the
//! per-(origin, destination, transactionCode) counter for every prenote
//! entry seen, valid or not. A prenote entry with a nonzero amount is still
//! counted and still emitted — it's recorded as a classification error, not
//! dropped.

use async_trait::async_trait;
use tracing::warn;

use super::Processor;
use crate::ach::{Batch, EntryDetail};
use crate::error::ClassificationError;
use crate::events::EventSink;
use crate::metrics;
use crate::model::{Event, IngestedFile, PrenoteFileEvent};

pub struct PrenoteEmitter {
    /// Case-insensitive substring the file's path must contain to be
    /// considered by this emitter. Empty means "match everything".
    path_matcher: String,
}

impl PrenoteEmitter {
    pub fn new(path_matcher: impl Into<String>) -> Self {
        Self {
            path_matcher: path_matcher.into().to_lowercase(),
        }
    }
}

#[async_trait]
impl Processor for PrenoteEmitter {
    fn type_name(&self) -> &str {
        "prenote"
    }

    async fn handle(&self, file: &IngestedFile, sink: &dyn EventSink) -> eyre::Result<()> {
        if !self.path_matcher.is_empty() {
            let path = file.filepath.to_string_lossy().to_lowercase();
            if !path.contains(&self.path_matcher) {
                return Ok(());
            }
        }

        let origin = file.ach.header.immediate_origin.clone();
        let destination = file.ach.header.immediate_destination.clone();

        let mut filtered_batches = Vec::new();
        let mut classification_errors = Vec::new();

        for batch in &file.ach.batches {
            let prenote_entries: Vec<EntryDetail> = batch
                .entries()
                .iter()
                .filter(|e| e.transaction_code.is_prenote())
                .cloned()
                .collect();

            for entry in &prenote_entries {
                metrics::record_prenote_entry(&origin, &destination, entry.transaction_code.code());
                if entry.amount != 0 {
                    classification_errors.push(ClassificationError {
                        amount: entry.amount,
                        trace_number: entry.trace_number.clone(),
                    });
                }
            }

            if !prenote_entries.is_empty() {
                filtered_batches.push(Batch {
                    header: batch.header.clone(),
                    entries: prenote_entries,
                });
            }
        }

        for err in &classification_errors {
            warn!(
                amount = err.amount,
                trace_number = %err.trace_number,
                filepath = %file.filepath.display(),
                "prenote entry has a non-zero amount"
            );
        }

        if filtered_batches.is_empty() {
            return Ok(());
        }

        sink.send(Event::PrenoteFile(PrenoteFileEvent {
            filename: file.basename(),
            file: file.ach.clone(),
            batches: filtered_batches,
        }))
        .await?;

        Ok(())
    }
}
