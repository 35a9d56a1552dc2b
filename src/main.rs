use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ach_odfi_gateway::alerting::{Alerter, CompositeAlerter, LoggingAlerter, WebhookAlerter};
use ach_odfi_gateway::config::GatewayConfig;
use ach_odfi_gateway::events::{EventSink, LoggingSink};
use ach_odfi_gateway::processor::prenote::PrenoteEmitter;
use ach_odfi_gateway::processor::{Processor, ProcessorRegistry};
use ach_odfi_gateway::scheduler::Scheduler;

#[derive(Parser, Debug)]
#[command(name = "odfi-gateway", about = "ACH inbound ODFI processing core")]
struct Cli {
    /// Path to the gateway JSON config file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Run a single tick and exit instead of starting the scheduler loop.
    #[arg(long)]
    once: bool,

    /// Override the configured tick interval, in seconds.
    #[arg(long)]
    interval: Option<u64>,

    /// Keep remote files and skip local-directory cleanup regardless of what
    /// the config says, for exercising a tick without consuming anything.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = GatewayConfig::load(&cli.config).await?;

    if let Some(interval) = cli.interval {
        config.inbound.interval_seconds = interval;
    }
    if cli.dry_run {
        config.inbound.storage.keep_remote_files = true;
        config.inbound.storage.remove_zero_byte_files = false;
        config.inbound.storage.cleanup_local_directory = false;
    }
    let config = Arc::new(config);

    let processors: Vec<Box<dyn Processor>> = vec![Box::new(PrenoteEmitter::new(
        config.inbound.processors.prenote_path_matcher.clone(),
    ))];
    let registry = Arc::new(ProcessorRegistry::new(processors));

    let sink: Arc<dyn EventSink> = Arc::new(LoggingSink);

    let alerter: Arc<dyn Alerter> = match &config.alert_webhook_url {
        Some(url) => Arc::new(CompositeAlerter::new(vec![
            Box::new(LoggingAlerter),
            Box::new(WebhookAlerter::new(url.clone())),
        ])),
        None => Arc::new(LoggingAlerter),
    };

    let scheduler = Scheduler::new(config, registry, sink, alerter);

    if cli.once {
        let handle = scheduler.trigger_handle();
        let shutdown = scheduler.shutdown_handle();
        tokio::spawn(scheduler.start());
        let result = handle.trigger().await;
        shutdown.cancel();
        return result;
    }

    let shutdown = scheduler.shutdown_handle();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    scheduler.start().await;
    Ok(())
}
