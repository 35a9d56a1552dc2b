//! SFTP transport, backed by `ssh2`.
//!
//! `ssh2` is a blocking library; every operation below runs on a blocking
//! thread via `tokio::task::spawn_blocking` against an `Arc<Mutex<Session>>`
//! shared with the agent, mirroring the session/sftp handle pattern used for
//! direct libssh2 bindings elsewhere in the pack.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ssh2::Session;

use super::{drop_hidden, Agent};
use crate::error::TransportError;
use crate::metrics;
use crate::model::{AgentPaths, RawFile, UploadAgentConfig};

pub struct SftpAgent {
    id: String,
    hostname: String,
    paths: AgentPaths,
    session: Arc<Mutex<Session>>,
}

impl SftpAgent {
    pub async fn connect(cfg: &UploadAgentConfig) -> eyre::Result<Self> {
        let hostname = cfg.hostname.clone();
        let port = cfg.port;
        let username = cfg.username.clone();
        let password = cfg.password.clone();

        let session = tokio::task::spawn_blocking(move || -> eyre::Result<Session> {
            let addr = format!("{hostname}:{port}");
            let tcp = TcpStream::connect(&addr)?;
            let mut sess = Session::new()?;
            sess.set_tcp_stream(tcp);
            sess.handshake()?;
            sess.userauth_password(&username, &password)?;
            if !sess.authenticated() {
                eyre::bail!("authentication to {addr} failed");
            }
            Ok(sess)
        })
        .await??;

        metrics::set_sftp_agent_up(&cfg.hostname, true);

        Ok(Self {
            id: cfg.id.clone(),
            hostname: cfg.hostname.clone(),
            paths: cfg.paths.clone(),
            session: Arc::new(Mutex::new(session)),
        })
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, TransportError> {
        let session = self.session.clone();
        let path = path.to_string();
        let hostname = self.hostname.clone();
        let entries = tokio::task::spawn_blocking(move || -> eyre::Result<Vec<String>> {
            let sess = session.lock().unwrap();
            let sftp = sess.sftp()?;
            let dir = sftp.readdir(std::path::Path::new(&path))?;
            Ok(dir
                .into_iter()
                .filter(|(_, stat)| !stat.is_dir())
                .filter_map(|(p, _)| p.to_str().map(str::to_string))
                .collect())
        })
        .await
        .map_err(|e| TransportError::List {
            hostname: hostname.clone(),
            path: path.clone(),
            source: eyre::eyre!(e),
        })?
        .map_err(|e| TransportError::List {
            hostname,
            path,
            source: e,
        })?;
        Ok(drop_hidden(entries))
    }
}

#[async_trait]
impl Agent for SftpAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn hostname(&self) -> &str {
        &self.hostname
    }

    async fn ping(&self) -> Result<(), TransportError> {
        let session = self.session.clone();
        let ok = tokio::task::spawn_blocking(move || {
            let sess = session.lock().unwrap();
            sess.sftp().is_ok()
        })
        .await
        .unwrap_or(false);
        metrics::set_sftp_agent_up(&self.hostname, ok);
        if ok {
            Ok(())
        } else {
            Err(TransportError::Connect {
                hostname: self.hostname.clone(),
                source: eyre::eyre!("sftp channel unavailable"),
            })
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let session = self.session.clone();
        tokio::task::spawn_blocking(move || {
            let sess = session.lock().unwrap();
            let _ = sess.disconnect(None, "done", None);
        })
        .await
        .map_err(|e| TransportError::Connect {
            hostname: self.hostname.clone(),
            source: eyre::eyre!(e),
        })?;
        metrics::set_sftp_agent_up(&self.hostname, false);
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
        let session = self.session.clone();
        let p = path.to_string();
        let hostname = self.hostname.clone();
        tokio::task::spawn_blocking(move || -> eyre::Result<()> {
            let sess = session.lock().unwrap();
            let sftp = sess.sftp()?;
            sftp.unlink(std::path::Path::new(&p))?;
            Ok(())
        })
        .await
        .map_err(|e| TransportError::Delete {
            hostname: hostname.clone(),
            path: path.to_string(),
            source: eyre::eyre!(e),
        })?
        .map_err(|e| TransportError::Delete {
            hostname,
            path: path.to_string(),
            source: e,
        })
    }

    async fn upload_file(&self, file: RawFile) -> Result<(), TransportError> {
        let session = self.session.clone();
        let remote = format!("{}/{}", self.paths.outbound, file.filepath.display());
        let hostname = self.hostname.clone();
        let contents = file.contents;
        let remote_for_err = remote.clone();
        tokio::task::spawn_blocking(move || -> eyre::Result<()> {
            let sess = session.lock().unwrap();
            let sftp = sess.sftp()?;
            let mut handle = sftp.create(std::path::Path::new(&remote))?;
            handle.write_all(&contents)?;
            Ok(())
        })
        .await
        .map_err(|e| TransportError::Upload {
            hostname: hostname.clone(),
            path: remote_for_err.clone(),
            source: eyre::eyre!(e),
        })?
        .map_err(|e| TransportError::Upload {
            hostname,
            path: remote_for_err,
            source: e,
        })
    }

    async fn read_file(&self, path: &str) -> Result<RawFile, TransportError> {
        let session = self.session.clone();
        let p = path.to_string();
        let hostname = self.hostname.clone();
        let contents = tokio::task::spawn_blocking(move || -> eyre::Result<Vec<u8>> {
            let sess = session.lock().unwrap();
            let sftp = sess.sftp()?;
            let mut handle = sftp.open(std::path::Path::new(&p))?;
            let mut buf = Vec::new();
            handle.read_to_end(&mut buf)?;
            Ok(buf)
        })
        .await
        .map_err(|e| TransportError::Read {
            hostname: hostname.clone(),
            path: path.to_string(),
            source: eyre::eyre!(e),
        })?
        .map_err(|e| TransportError::Read {
            hostname,
            path: path.to_string(),
            source: e,
        })?;

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
