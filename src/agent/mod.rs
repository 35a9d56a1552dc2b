//! `Agent` — a stateless-per-call handle to one remote file-transfer
//! endpoint (spec.md §4.7). Agents are constructed fresh for every tick and
//! closed at the end of it; they are never cached or shared across shards.

pub mod cidr;
pub mod ftp;
pub mod mock;
pub mod sftp;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::model::{RawFile, UploadAgentConfig};

#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;
    fn hostname(&self) -> &str;

    async fn ping(&self) -> Result<(), TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;

    fn inbound_path(&self) -> &str;
    fn outbound_path(&self) -> &str;
    fn reconciliation_path(&self) -> &str;
    fn return_path(&self) -> &str;

    async fn delete(&self, path: &str) -> Result<(), TransportError>;
    async fn upload_file(&self, file: RawFile) -> Result<(), TransportError>;
    async fn read_file(&self, path: &str) -> Result<RawFile, TransportError>;

    async fn get_inbound_files(&self) -> Result<Vec<String>, TransportError>;
    async fn get_reconciliation_files(&self) -> Result<Vec<String>, TransportError>;
    async fn get_return_files(&self) -> Result<Vec<String>, TransportError>;
}

/// Constructs the transport named by `cfg.kind`, enforcing the outbound IP
/// allow-list invariant before returning (spec.md §3: "at construction, the
/// resolved hostname IP must fall inside the allowed list or construction
/// fails").
pub async fn new(cfg: &UploadAgentConfig) -> eyre::Result<Box<dyn Agent>> {
    let allowed = cfg.allowed_networks()?;
    if !matches!(cfg.kind, crate::model::AgentKind::Mock) {
        cidr::enforce_allow_list(&cfg.hostname, &allowed)?;
    }

    match cfg.kind {
        crate::model::AgentKind::Ftp => Ok(Box::new(ftp::FtpAgent::connect(cfg).await?)),
        crate::model::AgentKind::Sftp => Ok(Box::new(sftp::SftpAgent::connect(cfg).await?)),
        crate::model::AgentKind::Mock => Ok(Box::new(mock::MockAgent::new(cfg))),
    }
}

/// Removes files whose basename starts with `.` — every transport's
/// listing methods funnel through this so hidden files never appear in a
/// snapshot (spec.md §8 invariant).
pub(crate) fn drop_hidden(mut paths: Vec<String>) -> Vec<String> {
    paths.retain(|p| {
        !std::path::Path::new(p)
            .file_name()
            .map(|n| n.to_string_lossy().starts_with('.'))
            .unwrap_or(false)
    });
    paths
}
