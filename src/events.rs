//! Event sink (spec.md §6): the opaque boundary between classification and
//! whatever downstream bus consumes the tagged `Event` envelopes. At-least-
//! once delivery is assumed; idempotence is the consumer's job.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use crate::error::EmissionError;
use crate::model::Event;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: Event) -> Result<(), EmissionError>;
}

/// Logs each event at info level as JSON. Useful as a default sink and in
/// tests that only care whether emission was attempted.
pub struct LoggingSink;

#[async_trait]
impl EventSink for LoggingSink {
    async fn send(&self, event: Event) -> Result<(), EmissionError> {
        match serde_json::to_string(&event) {
            Ok(json) => {
                info!(event = %json, "emitting event");
                Ok(())
            }
            Err(e) => Err(EmissionError::Send {
                filename: event_filename(&event),
                source: eyre::eyre!(e),
            }),
        }
    }
}

/// Bounded in-memory sink for tests and for any consumer that wants a local
/// channel instead of a network bus.
pub struct InMemorySink {
    tx: mpsc::Sender<Event>,
}

impl InMemorySink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for InMemorySink {
    async fn send(&self, event: Event) -> Result<(), EmissionError> {
        let filename = event_filename(&event);
        self.tx
            .send(event)
            .await
            .map_err(|e| EmissionError::Send {
                filename,
                source: eyre::eyre!(e),
            })
    }
}

fn event_filename(event: &Event) -> String {
    match event {
        Event::PrenoteFile(e) => e.filename.clone(),
        Event::CorrectionFile(e) => e.filename.clone(),
        Event::IncomingFile(e) => e.filename.clone(),
        Event::ReturnFile(e) => e.filename.clone(),
        Event::ReconciliationFile(e) => e.filename.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IncomingFileEvent};

    fn sample() -> Event {
        Event::IncomingFile(IncomingFileEvent {
            filename: "file.ach".into(),
            file: crate::ach::test_support::file_with_entries(vec![]),
        })
    }

    #[tokio::test]
    async fn in_memory_sink_delivers_sent_event() {
        let (sink, mut rx) = InMemorySink::new(4);
        sink.send(sample()).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(event_filename(&received), "file.ach");
    }

    #[tokio::test]
    async fn logging_sink_never_fails_on_a_well_formed_event() {
        let sink = LoggingSink;
        assert!(sink.send(sample()).await.is_ok());
    }
}
