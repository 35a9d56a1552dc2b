//! Gateway configuration: the JSON file shape and the fail-fast validation
//! that runs once at startup (spec.md §6, "Configuration options").

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::{Shard, UploadAgentConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    /// Local filesystem directory audit copies are written under. Other
    /// backends are a matter of swapping the `AuditStore` implementation at
    /// startup; the config shape here only covers the filesystem default.
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOptions {
    #[serde(default)]
    pub allow_missing_batch_header: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorsConfig {
    #[serde(default)]
    pub validation: ValidationOptions,
    #[serde(default)]
    pub prenote_path_matcher: String,
}

impl Default for ProcessorsConfig {
    fn default() -> Self {
        Self {
            validation: ValidationOptions::default(),
            prenote_path_matcher: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default)]
    pub keep_remote_files: bool,
    #[serde(default)]
    pub remove_zero_byte_files: bool,
    #[serde(default)]
    pub cleanup_local_directory: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            keep_remote_files: false,
            remove_zero_byte_files: false,
            cleanup_local_directory: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundConfig {
    /// Tick period, in seconds.
    pub interval_seconds: u64,
    pub shard_names: Vec<String>,
    #[serde(default)]
    pub storage: StorageConfig,
    pub audit: AuditConfig,
    #[serde(default)]
    pub processors: ProcessorsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    pub inbound: InboundConfig,
    pub shards: Vec<Shard>,
    pub upload_agents: Vec<UploadAgentConfig>,
    /// Optional webhook URL; when absent, alerts only go to the log.
    #[serde(default)]
    pub alert_webhook_url: Option<String>,
}

impl GatewayConfig {
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })?;
        let cfg: GatewayConfig =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen_shards = HashSet::new();
        for shard in &self.shards {
            if !seen_shards.insert(shard.name.clone()) {
                return Err(ConfigError::DuplicateShard(shard.name.clone()));
            }
        }

        let agent_ids: HashSet<&str> = self.upload_agents.iter().map(|a| a.id.as_str()).collect();
        for shard in &self.shards {
            if !agent_ids.contains(shard.upload_agent.as_str()) {
                return Err(ConfigError::UnknownAgent(
                    shard.name.clone(),
                    shard.upload_agent.clone(),
                ));
            }
        }

        for name in &self.inbound.shard_names {
            if !self.shards.iter().any(|s| &s.name == name) {
                return Err(ConfigError::Invalid(format!(
                    "inbound.shardNames references unknown shard '{name}'"
                )));
            }
        }

        for agent in &self.upload_agents {
            agent.allowed_networks()?;
        }

        Ok(())
    }

    pub fn shard(&self, name: &str) -> Option<&Shard> {
        self.shards.iter().find(|s| s.name == name)
    }

    pub fn agent_config(&self, id: &str) -> Option<&UploadAgentConfig> {
        self.upload_agents.iter().find(|a| a.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "inbound": {
                "intervalSeconds": 3600,
                "shardNames": ["shard1"],
                "audit": { "directory": "/tmp/audit" }
            },
            "shards": [
                { "name": "shard1", "uploadAgent": "agent1" }
            ],
            "uploadAgents": [
                {
                    "id": "agent1",
                    "kind": "mock",
                    "hostname": "mock.local",
                    "paths": { "inbound": "inbound" }
                }
            ]
        }"#
    }

    #[test]
    fn duplicate_shard_names_are_rejected() {
        let json = r#"{
            "inbound": { "intervalSeconds": 60, "shardNames": [], "audit": { "directory": "/tmp" } },
            "shards": [
                { "name": "dup", "uploadAgent": "a" },
                { "name": "dup", "uploadAgent": "a" }
            ],
            "uploadAgents": [
                { "id": "a", "kind": "mock", "hostname": "h", "paths": { "inbound": "in" } }
            ]
        }"#;
        let cfg: GatewayConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::DuplicateShard(_))));
    }

    #[test]
    fn shard_referencing_unknown_agent_is_rejected() {
        let json = r#"{
            "inbound": { "intervalSeconds": 60, "shardNames": [], "audit": { "directory": "/tmp" } },
            "shards": [ { "name": "s1", "uploadAgent": "missing" } ],
            "uploadAgents": []
        }"#;
        let cfg: GatewayConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::UnknownAgent(_, _))));
    }

    #[test]
    fn well_formed_config_validates() {
        let cfg: GatewayConfig = serde_json::from_str(sample_json()).unwrap();
        assert!(cfg.validate().is_ok());
        assert!(cfg.shard("shard1").is_some());
        assert!(cfg.agent_config("agent1").is_some());
    }
}
