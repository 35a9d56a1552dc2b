//! Remote → local snapshotting (spec.md §4.3).
//!
//! Each call to [`copy_files_from_remote`] creates a fresh per-tick directory
//! named after the agent's hostname and the current timestamp, lists every
//! configured remote root, and fetches each listed file into a
//! category-specific subdirectory so files with the same basename in two
//! roots never collide.

use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::Agent;
use crate::model::{DownloadedFiles, RemoteCategory, Shard};

/// Caps how many files are fetched concurrently within one root.
const MAX_CONCURRENT_DOWNLOADS: usize = 8;

/// Snapshots every configured remote root for `shard`. `cancel` is checked
/// between roots and between individual file fetches so a shutdown aborts
/// outstanding I/O instead of completing the whole snapshot (spec.md §5);
/// whatever was already fetched stays on disk under the returned snapshot's
/// `local_dir` for operator recovery.
pub async fn copy_files_from_remote(
    agent: &dyn Agent,
    shard: &Shard,
    cancel: &CancellationToken,
) -> eyre::Result<DownloadedFiles> {
    let local_dir = stage_dir(agent.hostname())?;

    let mut result = DownloadedFiles::empty(local_dir.clone());

    for category in [
        RemoteCategory::Inbound,
        RemoteCategory::Reconciliation,
        RemoteCategory::Return,
    ] {
        if cancel.is_cancelled() {
            warn!(shard = %shard.name, "download cancelled, leaving remaining roots unfetched");
            break;
        }
        let fetched = copy_root(
            agent,
            category,
            &local_dir,
            &mut result.remote_paths,
            shard,
            cancel,
        )
        .await;
        match category {
            RemoteCategory::Inbound => result.inbound = fetched,
            RemoteCategory::Reconciliation => result.reconciliation = fetched,
            RemoteCategory::Return => result.return_files = fetched,
        }
    }

    Ok(result)
}

fn stage_dir(hostname: &str) -> eyre::Result<PathBuf> {
    let now = chrono::Local::now().format("%Y%m%d-%H%M%S%.f");
    let mut dir = std::env::temp_dir();
    dir.push(format!("odfi-{hostname}-{now}"));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

async fn copy_root(
    agent: &dyn Agent,
    category: RemoteCategory,
    local_dir: &Path,
    remote_paths: &mut std::collections::HashMap<PathBuf, String>,
    shard: &Shard,
    cancel: &CancellationToken,
) -> Vec<PathBuf> {
    let listing = match category {
        RemoteCategory::Inbound => agent.get_inbound_files().await,
        RemoteCategory::Reconciliation => agent.get_reconciliation_files().await,
        RemoteCategory::Return => agent.get_return_files().await,
    };

    let remote_files = match listing {
        Ok(files) => files,
        Err(e) => {
            warn!(shard = %shard.name, category = category.subdir(), error = %e, "listing remote root failed, returning this root empty");
            return Vec::new();
        }
    };

    let subdir = local_dir.join(category.subdir());
    if let Err(e) = std::fs::create_dir_all(&subdir) {
        warn!(shard = %shard.name, category = category.subdir(), error = %e, "creating local category directory failed");
        return Vec::new();
    }

    let fetched: Vec<(PathBuf, String)> = stream::iter(remote_files.into_iter())
        .map(|remote_path| {
            let subdir = subdir.clone();
            async move {
                match agent.read_file(&remote_path).await {
                    Ok(raw) => {
                        let local_path = subdir.join(raw.basename());
                        match write_local(&local_path, &raw.contents).await {
                            Ok(()) => Some((local_path, remote_path)),
                            Err(e) => {
                                warn!(path = %remote_path, error = %e, "writing downloaded file locally failed");
                                None
                            }
                        }
                    }
                    Err(e) => {
                        warn!(path = %remote_path, error = %e, "downloading remote file failed");
                        None
                    }
                }
            }
        })
        .buffer_unordered(MAX_CONCURRENT_DOWNLOADS)
        .filter_map(|x| async move { x })
        .take_until(cancel.cancelled())
        .collect()
        .await;

    info!(shard = %shard.name, category = category.subdir(), count = fetched.len(), "downloaded remote category");

    let mut local_paths = Vec::with_capacity(fetched.len());
    for (local, remote) in fetched {
        remote_paths.insert(local.clone(), remote);
        local_paths.push(local);
    }
    local_paths
}

async fn write_local(path: &Path, contents: &[u8]) -> eyre::Result<()> {
    let mut f = tokio::fs::File::create(path).await?;
    f.write_all(contents).await?;
    f.flush().await?;
    Ok(())
}
