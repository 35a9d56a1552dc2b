//! FTP transport, backed by `suppaftp`.
//!
//! Connection, login, and passive-mode selection happen once in
//! [`FtpAgent::connect`]; every other method reopens nothing and issues a
//! single command against the already-established control connection.

use std::time::Duration;

use async_trait::async_trait;
use suppaftp::{AsyncNativeTlsFtpStream, FtpError};
use tokio::sync::Mutex;

use super::{drop_hidden, Agent};
use crate::error::TransportError;
use crate::metrics;
use crate::model::{AgentPaths, RawFile, UploadAgentConfig};

pub struct FtpAgent {
    id: String,
    hostname: String,
    paths: AgentPaths,
    stream: Mutex<AsyncNativeTlsFtpStream>,
}

impl FtpAgent {
    pub async fn connect(cfg: &UploadAgentConfig) -> eyre::Result<Self> {
        let addr = format!("{}:{}", cfg.hostname, cfg.port);
        let mut stream = AsyncNativeTlsFtpStream::connect(&addr)
            .await
            .map_err(|e| connect_err(&cfg.hostname, e))?;

        if let Some(secs) = cfg.timeout_seconds {
            stream.get_ref().set_timeout(Duration::from_secs(secs)).ok();
        }

        stream
            .login(&cfg.username, &cfg.password)
            .await
            .map_err(|e| connect_err(&cfg.hostname, e))?;

        if cfg.passive {
            stream.set_mode(suppaftp::Mode::Passive);
        } else {
            stream.set_mode(suppaftp::Mode::Active);
        }

        metrics::set_ftp_agent_up(&cfg.hostname, true);

        Ok(Self {
            id: cfg.id.clone(),
            hostname: cfg.hostname.clone(),
            paths: cfg.paths.clone(),
            stream: Mutex::new(stream),
        })
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, TransportError> {
        let mut stream = self.stream.lock().await;
        let names = stream
            .nlst(Some(path))
            .await
            .map_err(|e| TransportError::List {
                hostname: self.hostname.clone(),
                path: path.to_string(),
                source: eyre::eyre!(e),
            })?;
        Ok(drop_hidden(names))
    }
}

fn connect_err(hostname: &str, e: FtpError) -> eyre::Report {
    eyre::eyre!("connecting to {hostname}: {e}")
}

#[async_trait]
impl Agent for FtpAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn hostname(&self) -> &str {
        &self.hostname
    }

    async fn ping(&self) -> Result<(), TransportError> {
        let mut stream = self.stream.lock().await;
        let ok = stream.noop().await.is_ok();
        metrics::set_ftp_agent_up(&self.hostname, ok);
        if ok {
            Ok(())
        } else {
            Err(TransportError::Connect {
                hostname: self.hostname.clone(),
                source: eyre::eyre!("NOOP failed"),
            })
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let mut stream = self.stream.lock().await;
        stream.quit().await.map_err(|e| TransportError::Connect {
            hostname: self.hostname.clone(),
            source: eyre::eyre!(e),
        })?;
        metrics::set_ftp_agent_up(&self.hostname, false);
        Ok(())
    }

    fn inbound_path(&self) -> &str {
        &self.paths.inbound
    }

    fn outbound_path(&self) -> &str {
        &self.paths.outbound
    }

    fn reconciliation_path(&self) -> &str {
        &self.paths.reconciliation
    }

    fn return_path(&self) -> &str {
        &self.paths.return_path
    }

    async fn delete(&self, path: &str) -> Result<(), TransportError> {
        let mut stream = self.stream.lock().await;
        stream.rm(path).await.map_err(|e| TransportError::Delete {
            hostname: self.hostname.clone(),
            path: path.to_string(),
            source: eyre::eyre!(e),
        })
    }

    async fn upload_file(&self, file: RawFile) -> Result<(), TransportError> {
        let remote = format!("{}/{}", self.paths.outbound, file.filepath.display());
        let mut stream = self.stream.lock().await;
        let mut cursor = std::io::Cursor::new(file.contents);
        stream
            .put_file(&remote, &mut cursor)
            .await
            .map_err(|e| TransportError::Upload {
                hostname: self.hostname.clone(),
                path: remote,
                source: eyre::eyre!(e),
            })?;
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<RawFile, TransportError> {
        let mut stream = self.stream.lock().await;
        let contents = stream
            .retr_as_buffer(path)
            .await
            .map_err(|e| TransportError::Read {
                hostname: self.hostname.clone(),
                path: path.to_string(),
                source: eyre::eyre!(e),
            })?
            .into_inner();
        Ok(RawFile {
            filepath: std::path::PathBuf::from(
                std::path::Path::new(path).file_name().unwrap_or_default(),
            ),
            contents,
        })
    }

    async fn get_inbound_files(&self) -> Result<Vec<String>, TransportError> {
        self.list(&self.paths.inbound).await
    }

    async fn get_reconciliation_files(&self) -> Result<Vec<String>, TransportError> {
        self.list(&self.paths.reconciliation).await
    }

    async fn get_return_files(&self) -> Result<Vec<String>, TransportError> {
        self.list(&self.paths.return_path).await
    }
}
