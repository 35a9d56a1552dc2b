//! Scheduler (spec.md §4.1, §4.2): owns the tick timer, the manual-trigger
//! channel, and shard enumeration. A single `tokio::select!` loop is the
//! only task that observes the ticker — no shared "busy" flag, per
//! spec.md §9's "manual-trigger / tick coupling" note.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent;
use crate::alerting::Alerter;
use crate::audit::{AuditSaver, FilesystemAuditStore};
use crate::cleanup::{self, CleanupOptions};
use crate::config::GatewayConfig;
use crate::downloader;
use crate::error::TickFailure;
use crate::events::EventSink;
use crate::processor::{process_files, ProcessOptions, ProcessorRegistry};

struct Trigger {
    waiter: oneshot::Sender<eyre::Result<()>>,
}

/// Manual-trigger handle. Cloning is cheap; the sender side has capacity 1
/// so a second concurrent trigger is rejected rather than queued further.
#[derive(Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<Trigger>,
}

impl TriggerHandle {
    /// Requests an out-of-band tick and waits for its aggregate result. If a
    /// trigger is already queued, returns immediately with a "busy" error
    /// instead of blocking — the spec permits either behavior, and this
    /// avoids deadlocking the sender on a full channel.
    pub async fn trigger(&self) -> eyre::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .try_send(Trigger { waiter: tx })
            .map_err(|_| eyre::eyre!("a manual trigger is already queued"))?;
        rx.await.map_err(|_| eyre::eyre!("scheduler stopped before the trigger ran"))?
    }
}

pub struct Scheduler {
    config: Arc<GatewayConfig>,
    registry: Arc<ProcessorRegistry>,
    sink: Arc<dyn EventSink>,
    alerter: Arc<dyn Alerter>,
    cancel: CancellationToken,
    trigger_rx: mpsc::Receiver<Trigger>,
    trigger_tx: mpsc::Sender<Trigger>,
}

impl Scheduler {
    pub fn new(
        config: Arc<GatewayConfig>,
        registry: Arc<ProcessorRegistry>,
        sink: Arc<dyn EventSink>,
        alerter: Arc<dyn Alerter>,
    ) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        Self {
            config,
            registry,
            sink,
            alerter,
            cancel: CancellationToken::new(),
            trigger_rx,
            trigger_tx,
        }
    }

    pub fn trigger_handle(&self) -> TriggerHandle {
        TriggerHandle {
            tx: self.trigger_tx.clone(),
        }
    }

    pub fn shutdown_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drives the loop until shutdown. Single entry only.
    pub async fn start(mut self) {
        let mut ticker = interval(Duration::from_secs(self.config.inbound.interval_seconds.max(1)));
        ticker.tick().await; // first tick fires immediately; consume it here

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    info!("scheduled tick firing");
                    self.tick_all().await;
                }
                Some(trigger) = self.trigger_rx.recv() => {
                    info!("manual trigger firing");
                    let result = self.tick_all_result().await;
                    let _ = trigger.waiter.send(result);
                }
                _ = self.cancel.cancelled() => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn tick_all(&self) {
        let _ = self.tick_all_result().await;
    }

    /// Runs every configured shard in order, collecting nothing from a
    /// per-shard failure beyond alerting — one misbehaving remote must never
    /// halt the fleet. Returns an error only to support `Trigger`'s waiter
    /// contract; the scheduler loop itself ignores it.
    async fn tick_all_result(&self) -> eyre::Result<()> {
        let mut last_error = None;

        for name in &self.config.inbound.shard_names {
            if self.cancel.is_cancelled() {
                break;
            }

            let Some(shard) = self.config.shard(name) else {
                warn!(shard = %name, "configured shard name not found, skipping");
                continue;
            };

            let Some(agent_cfg) = self.config.agent_config(&shard.upload_agent) else {
                warn!(shard = %name, "shard references unknown agent config, skipping");
                continue;
            };

            if let Err(e) = self.tick_one(shard, agent_cfg).await {
                error!(shard = %name, error = %e.full, "tick failed");
                let _ = self.alerter.alert_error(name, &e.first).await;
                last_error = Some(eyre::eyre!("{}", e.full));
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn tick_one(
        &self,
        shard: &crate::model::Shard,
        agent_cfg: &crate::model::UploadAgentConfig,
    ) -> Result<(), TickFailure> {
        let mut conn = agent::new(agent_cfg).await?;

        let result = self.run_tick_body(shard, conn.as_ref()).await;

        if let Err(e) = conn.close().await {
            warn!(shard = %shard.name, error = %e, "closing agent failed");
        }

        result
    }

    /// Runs download → process → cleanup for one shard. `self.cancel` is
    /// threaded into every suspension point (spec.md §5): the downloader
    /// checks it between and within remote roots, the processor chain
    /// checks it between files, and cleanup is skipped outright if shutdown
    /// arrived before it was reached, leaving the local working directory
    /// for operator recovery (spec.md §8's shutdown-mid-tick invariant).
    async fn run_tick_body(
        &self,
        shard: &crate::model::Shard,
        agent: &dyn crate::agent::Agent,
    ) -> Result<(), TickFailure> {
        let snapshot = downloader::copy_files_from_remote(agent, shard, &self.cancel).await?;

        let audit = AuditSaver::new(
            Box::new(FilesystemAuditStore::new(&self.config.inbound.audit.directory)),
            agent.hostname(),
        );

        let options = ProcessOptions {
            allow_missing_batch_header: self
                .config
                .inbound
                .processors
                .validation
                .allow_missing_batch_header,
        };

        let errors = process_files(
            &snapshot,
            &self.registry,
            self.sink.as_ref(),
            &audit,
            options,
            &self.cancel,
        )
        .await;

        if let Some(failure) = errors.into_tick_failure() {
            return Err(failure);
        }

        if self.cancel.is_cancelled() {
            warn!(shard = %shard.name, "shutdown requested mid-tick, skipping cleanup");
            return Ok(());
        }

        let cleanup_options = CleanupOptions {
            keep_remote_files: self.config.inbound.storage.keep_remote_files,
            remove_zero_byte_files: self.config.inbound.storage.remove_zero_byte_files,
            cleanup_local_directory: self.config.inbound.storage.cleanup_local_directory,
        };
        let cleanup_errors = cleanup::run(agent, &snapshot, cleanup_options).await;
        if let Some(first) = cleanup_errors.first() {
            // Cleanup errors are surfaced (spec.md §7) but must not block the
            // tick loop from moving on to the next shard; logs get every
            // failure, the alerter (via tick_all_result) gets only the first.
            let full = cleanup_errors
                .iter()
                .enumerate()
                .fold(String::new(), |mut acc, (i, e)| {
                    use std::fmt::Write;
                    let _ = writeln!(acc, "  [{i}] {e}");
                    acc
                });
            warn!(shard = %shard.name, errors = %full, "cleanup reported errors");
            return Err(TickFailure {
                first: eyre::eyre!("{first}"),
                full: eyre::eyre!(
                    "{} cleanup error(s) for shard '{}':\n{full}",
                    cleanup_errors.len(),
                    shard.name
                ),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::LoggingAlerter;
    use crate::config::{
        AuditConfig, GatewayConfig, InboundConfig, ProcessorsConfig, StorageConfig,
        ValidationOptions,
    };
    use crate::events::InMemorySink;
    use crate::model::{AgentKind, AgentPaths, Shard, UploadAgentConfig};
    use tempfile::tempdir;

    fn test_config(audit_dir: std::path::PathBuf) -> GatewayConfig {
        GatewayConfig {
            inbound: InboundConfig {
                interval_seconds: 3600,
                shard_names: vec!["shard1".into()],
                storage: StorageConfig::default(),
                audit: AuditConfig { directory: audit_dir },
                processors: ProcessorsConfig {
                    validation: ValidationOptions::default(),
                    prenote_path_matcher: String::new(),
                },
            },
            shards: vec![Shard {
                name: "shard1".into(),
                upload_agent: "agent1".into(),
                filename_template: None,
                return_address: None,
            }],
            upload_agents: vec![UploadAgentConfig {
                id: "agent1".into(),
                kind: AgentKind::Mock,
                hostname: "mock.local".into(),
                username: String::new(),
                password: String::new(),
                port: 0,
                timeout_seconds: None,
                passive: false,
                ca_file: None,
                paths: AgentPaths {
                    inbound: "inbound".into(),
                    outbound: "outbound".into(),
                    reconciliation: "recon".into(),
                    return_path: "return".into(),
                },
                allowed_ips: vec![],
            }],
            alert_webhook_url: None,
        }
    }

    #[tokio::test]
    async fn a_shard_with_no_inbound_files_ticks_successfully() {
        let dir = tempdir().unwrap();
        let config = Arc::new(test_config(dir.path().join("audit")));
        let registry = Arc::new(ProcessorRegistry::new(vec![]));
        let (sink, _rx) = InMemorySink::new(4);
        let scheduler = Scheduler::new(
            config,
            registry,
            Arc::new(sink),
            Arc::new(LoggingAlerter),
        );

        let result = scheduler.tick_all_result().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn shutdown_before_a_tick_skips_every_shard() {
        let dir = tempdir().unwrap();
        let config = Arc::new(test_config(dir.path().join("audit")));
        let registry = Arc::new(ProcessorRegistry::new(vec![]));
        let (sink, _rx) = InMemorySink::new(4);
        let scheduler = Scheduler::new(config, registry, Arc::new(sink), Arc::new(LoggingAlerter));

        scheduler.shutdown();
        let result = scheduler.tick_all_result().await;
        assert!(result.is_ok());
    }

    /// Wraps a `MockAgent` but fails every `delete`, so cleanup always
    /// reports at least one error without needing real transport failures.
    struct FailingDeleteAgent(crate::agent::mock::MockAgent);

    #[async_trait::async_trait]
    impl crate::agent::Agent for FailingDeleteAgent {
        fn id(&self) -> &str {
            self.0.id()
        }
        fn hostname(&self) -> &str {
            self.0.hostname()
        }
        async fn ping(&self) -> Result<(), crate::error::TransportError> {
            self.0.ping().await
        }
        async fn close(&mut self) -> Result<(), crate::error::TransportError> {
            self.0.close().await
        }
        fn inbound_path(&self) -> &str {
            self.0.inbound_path()
        }
        fn outbound_path(&self) -> &str {
            self.0.outbound_path()
        }
        fn reconciliation_path(&self) -> &str {
            self.0.reconciliation_path()
        }
        fn return_path(&self) -> &str {
            self.0.return_path()
        }
        async fn delete(&self, path: &str) -> Result<(), crate::error::TransportError> {
            Err(crate::error::TransportError::Delete {
                hostname: self.hostname().to_string(),
                path: path.to_string(),
                source: eyre::eyre!("mock agent configured to fail deletes"),
            })
        }
        async fn upload_file(
            &self,
            file: crate::model::RawFile,
        ) -> Result<(), crate::error::TransportError> {
            self.0.upload_file(file).await
        }
        async fn read_file(&self, path: &str) -> Result<crate::model::RawFile, crate::error::TransportError> {
            self.0.read_file(path).await
        }
        async fn get_inbound_files(&self) -> Result<Vec<String>, crate::error::TransportError> {
            self.0.get_inbound_files().await
        }
        async fn get_reconciliation_files(&self) -> Result<Vec<String>, crate::error::TransportError> {
            self.0.get_reconciliation_files().await
        }
        async fn get_return_files(&self) -> Result<Vec<String>, crate::error::TransportError> {
            self.0.get_return_files().await
        }
    }

    #[tokio::test]
    async fn a_cleanup_failure_is_surfaced_rather_than_only_logged() {
        use crate::agent::mock::MockAgent;

        let dir = tempdir().unwrap();
        let config = Arc::new(test_config(dir.path().join("audit")));
        let registry = Arc::new(ProcessorRegistry::new(vec![]));
        let (sink, _rx) = InMemorySink::new(4);
        let scheduler = Scheduler::new(
            config.clone(),
            registry,
            Arc::new(sink),
            Arc::new(LoggingAlerter),
        );

        let agent_cfg = config.agent_config("agent1").unwrap();
        let agent = FailingDeleteAgent(MockAgent::new(agent_cfg));
        agent.0.seed_inbound("a.ach", b"irrelevant".to_vec());

        let shard = config.shard("shard1").unwrap();
        let result = scheduler.run_tick_body(shard, &agent).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn shutdown_before_the_tick_body_leaves_remote_files_untouched() {
        use crate::agent::mock::MockAgent;

        let dir = tempdir().unwrap();
        let config = Arc::new(test_config(dir.path().join("audit")));
        let registry = Arc::new(ProcessorRegistry::new(vec![]));
        let (sink, _rx) = InMemorySink::new(4);
        let scheduler = Scheduler::new(
            config.clone(),
            registry,
            Arc::new(sink),
            Arc::new(LoggingAlerter),
        );

        let agent_cfg = config.agent_config("agent1").unwrap();
        let agent = MockAgent::new(agent_cfg);
        agent.seed_inbound("a.ach", b"irrelevant".to_vec());

        scheduler.shutdown();
        let shard = config.shard("shard1").unwrap();
        scheduler.run_tick_body(shard, &agent).await.unwrap();

        // Storage defaults to `!keep_remote_files`, so a completed tick would
        // have deleted this; cancellation must have short-circuited before
        // download even started (downloader checks `cancel` first), and the
        // cleanup-skip guard in `run_tick_body` is the second line of
        // defense for shutdown landing after download but before cleanup.
        assert!(agent.contains("inbound/a.ach"));
    }
}
