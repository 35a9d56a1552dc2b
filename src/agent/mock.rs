//! In-memory `Agent` used by the test suite. Models one remote endpoint as a
//! `Mutex<HashMap<path, bytes>>` so tests can assert on what the pipeline
//! read, wrote, and deleted without any real network I/O — the same role
//! `mockall`-style test doubles play in `ferrex`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{drop_hidden, Agent};
use crate::error::TransportError;
use crate::model::{AgentPaths, RawFile, UploadAgentConfig};

pub struct MockAgent {
    id: String,
    hostname: String,
    paths: AgentPaths,
    files: Mutex<HashMap<String, Vec<u8>>>,
    pings_ok: bool,
}

impl MockAgent {
    pub fn new(cfg: &UploadAgentConfig) -> Self {
        Self {
            id: cfg.id.clone(),
            hostname: cfg.hostname.clone(),
            paths: cfg.paths.clone(),
            files: Mutex::new(HashMap::new()),
            pings_ok: true,
        }
    }

    /// Test helper: seed a file at `path` (joined under `root`) with
    /// `contents`.
    pub fn seed(&self, root: &str, relative: &str, contents: impl Into<Vec<u8>>) {
        let key = format!("{root}/{relative}");
        self.files.lock().unwrap().insert(key, contents.into());
    }

    pub fn seed_inbound(&self, relative: &str, contents: impl Into<Vec<u8>>) {
        let root = self.paths.inbound.clone();
        self.seed(&root, relative, contents);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    fn list(&self, root: &str) -> Vec<String> {
        let files = self.files.lock().unwrap();
        let prefix = format!("{root}/");
        let matched: Vec<String> = files
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        drop_hidden(matched)
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn hostname(&self) -> &str {
        &self.hostname
    }

    async fn ping(&self) -> Result<(), TransportError> {
        if self.pings_ok {
            Ok(())
        } else {
            Err(TransportError::Connect {
                hostname: self.hostname.clone(),
                source: eyre::eyre!("mock agent configured to fail pings"),
            })
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
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
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    async fn upload_file(&self, file: RawFile) -> Result<(), TransportError> {
        let key = format!("{}/{}", self.paths.outbound, file.filepath.display());
        self.files.lock().unwrap().insert(key, file.contents);
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<RawFile, TransportError> {
        let files = self.files.lock().unwrap();
        let contents = files
            .get(path)
            .ok_or_else(|| TransportError::Read {
                hostname: self.hostname.clone(),
                path: path.to_string(),
                source: eyre::eyre!("no such file in mock agent"),
            })?
            .clone();
        Ok(RawFile {
            filepath: std::path::PathBuf::from(
                std::path::Path::new(path)
                    .file_name()
                    .unwrap_or_default(),
            ),
            contents,
        })
    }

    async fn get_inbound_files(&self) -> Result<Vec<String>, TransportError> {
        Ok(self.list(&self.paths.inbound))
    }

    async fn get_reconciliation_files(&self) -> Result<Vec<String>, TransportError> {
        Ok(self.list(&self.paths.reconciliation))
    }

    async fn get_return_files(&self) -> Result<Vec<String>, TransportError> {
        Ok(self.list(&self.paths.return_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AgentKind;

    fn cfg() -> UploadAgentConfig {
        UploadAgentConfig {
            id: "mock1".into(),
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
        }
    }

    #[tokio::test]
    async fn hidden_files_are_excluded_from_listings() {
        let agent = MockAgent::new(&cfg());
        agent.seed_inbound("visible.ach", b"hello".to_vec());
        agent.seed_inbound(".hidden.ach", b"nope".to_vec());

        let files = agent.get_inbound_files().await.unwrap();
        assert_eq!(files, vec!["inbound/visible.ach".to_string()]);
    }

    #[tokio::test]
    async fn read_file_roundtrips_contents() {
        let agent = MockAgent::new(&cfg());
        agent.seed_inbound("a.ach", b"payload".to_vec());
        let file = agent.read_file("inbound/a.ach").await.unwrap();
        assert_eq!(file.contents, b"payload");
        assert_eq!(file.filepath.to_str().unwrap(), "a.ach");
    }
}
