//! Post-process cleanup (spec.md §4.2 step 4, §4.3).
//!
//! Only ever invoked after the audit saver has confirmed every file in the
//! tick was persisted — callers must not call this module when that
//! invariant doesn't hold.

use std::path::Path;

use tracing::warn;

use crate::agent::Agent;
use crate::error::CleanupError;
use crate::model::DownloadedFiles;

#[derive(Debug, Clone, Copy)]
pub struct CleanupOptions {
    pub keep_remote_files: bool,
    pub remove_zero_byte_files: bool,
    pub cleanup_local_directory: bool,
}

/// Deletes remote files and reconciles the local working directory per
/// `options`. Per-file remote-delete failures are collected but do not stop
/// the rest of cleanup from running.
pub async fn run(
    agent: &dyn Agent,
    snapshot: &DownloadedFiles,
    options: CleanupOptions,
) -> Vec<CleanupError> {
    let mut errors = Vec::new();

    if !options.keep_remote_files {
        for (local, remote) in &snapshot.remote_paths {
            if let Err(e) = agent.delete(remote).await {
                warn!(path = %remote, error = %e, "deleting remote file failed");
                errors.push(CleanupError::RemoteDelete {
                    path: remote.clone(),
                    source: e,
                });
            }
            let _ = local;
        }
    }

    if options.remove_zero_byte_files {
        remove_zero_byte_remote_files(agent, snapshot, &mut errors).await;
    }

    if options.cleanup_local_directory {
        if let Err(e) = tokio::fs::remove_dir_all(&snapshot.local_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %snapshot.local_dir.display(), error = %e, "removing local working directory failed");
                errors.push(CleanupError::LocalRemove {
                    path: snapshot.local_dir.clone(),
                    source: e,
                });
            }
        }
    } else {
        remove_empty_subdirectories(&snapshot.local_dir, &mut errors).await;
    }

    errors
}

async fn remove_zero_byte_remote_files(
    agent: &dyn Agent,
    snapshot: &DownloadedFiles,
    errors: &mut Vec<CleanupError>,
) {
    for path in snapshot.all_local_paths() {
        let is_zero = tokio::fs::metadata(path)
            .await
            .map(|m| m.len() == 0)
            .unwrap_or(false);
        if !is_zero {
            continue;
        }
        if let Some(remote) = snapshot.remote_paths.get(path) {
            if let Err(e) = agent.delete(remote).await {
                warn!(path = %remote, error = %e, "deleting zero-byte remote file failed");
                errors.push(CleanupError::RemoteDelete {
                    path: remote.clone(),
                    source: e,
                });
            }
        }
    }
}

async fn remove_empty_subdirectories(root: &Path, errors: &mut Vec<CleanupError>) {
    if !root.exists() {
        return;
    }
    for entry in walkdir::WalkDir::new(root)
        .contents_first(true)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_dir() {
            continue;
        }
        let path = entry.path();
        let is_empty = tokio::fs::read_dir(path)
            .await
            .map(|mut rd| matches!(rd.next_entry().await, Ok(None)))
            .unwrap_or(false);
        if is_empty && path != root {
            if let Err(e) = tokio::fs::remove_dir(path).await {
                warn!(path = %path.display(), error = %e, "removing empty local subdirectory failed");
                errors.push(CleanupError::LocalRemove {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mock::MockAgent;
    use crate::model::{AgentKind, AgentPaths, UploadAgentConfig};
    use tempfile::tempdir;

    fn cfg() -> UploadAgentConfig {
        UploadAgentConfig {
            id: "a1".into(),
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
    async fn keep_remote_files_skips_remote_deletes() {
        let agent = MockAgent::new(&cfg());
        agent.seed_inbound("a.ach", b"x".to_vec());

        let dir = tempdir().unwrap();
        let mut snapshot = DownloadedFiles::empty(dir.path().to_path_buf());
        let local = dir.path().join("a.ach");
        tokio::fs::write(&local, b"x").await.unwrap();
        snapshot.inbound.push(local.clone());
        snapshot
            .remote_paths
            .insert(local, "inbound/a.ach".to_string());

        let errors = run(
            &agent,
            &snapshot,
            CleanupOptions {
                keep_remote_files: true,
                remove_zero_byte_files: false,
                cleanup_local_directory: false,
            },
        )
        .await;

        assert!(errors.is_empty());
        assert!(agent.contains("inbound/a.ach"));
    }

    #[tokio::test]
    async fn cleanup_local_directory_removes_the_whole_tree() {
        let agent = MockAgent::new(&cfg());
        let dir = tempdir().unwrap();
        let nested = dir.path().join("inbound");
        tokio::fs::create_dir_all(&nested).await.unwrap();
        tokio::fs::write(nested.join("a.ach"), b"x").await.unwrap();

        let snapshot = DownloadedFiles::empty(dir.path().to_path_buf());
        let errors = run(
            &agent,
            &snapshot,
            CleanupOptions {
                keep_remote_files: true,
                remove_zero_byte_files: false,
                cleanup_local_directory: true,
            },
        )
        .await;

        assert!(errors.is_empty());
        assert!(!dir.path().exists());
    }
}
