//! File-backed membership store with change notifications.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

use crate::error::{MembershipError, MembershipResult};

/// One load-balanced node. `url` is the node's private IP.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerEntry {
    pub name: String,
    pub url: String,
}

struct Inner {
    path: PathBuf,
    entries: Mutex<Vec<ServerEntry>>,
    revision_tx: watch::Sender<u64>,
}

/// Shared handle to the membership list.
///
/// Duplicate entries are legal; no uniqueness is enforced beyond caller
/// discipline. Every successful mutation rewrites the file in full and
/// bumps the revision watched by the config synchronizer.
#[derive(Clone)]
pub struct MembershipStore {
    inner: Arc<Inner>,
}

impl MembershipStore {
    /// Load the store from `path`. A missing file is an empty cluster.
    pub fn load(path: impl AsRef<Path>) -> MembershipResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| MembershipError::Parse {
                path: path.display().to_string(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "membership file not found, starting empty");
                Vec::new()
            }
            Err(source) => {
                return Err(MembershipError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        let (revision_tx, _) = watch::channel(0);
        Ok(Self {
            inner: Arc::new(Inner {
                path,
                entries: Mutex::new(entries),
                revision_tx,
            }),
        })
    }

    /// Path of the backing membership file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Snapshot of the current entries.
    pub async fn list(&self) -> Vec<ServerEntry> {
        self.inner.entries.lock().await.clone()
    }

    /// Number of entries currently registered.
    pub async fn len(&self) -> usize {
        self.inner.entries.lock().await.len()
    }

    /// Whether the cluster has no registered nodes.
    pub async fn is_empty(&self) -> bool {
        self.inner.entries.lock().await.is_empty()
    }

    /// Append an entry and rewrite the file.
    pub async fn add(&self, entry: ServerEntry) -> MembershipResult<()> {
        let mut entries = self.inner.entries.lock().await;
        entries.push(entry.clone());
        self.persist(&entries)?;
        drop(entries);

        self.notify();
        info!(name = %entry.name, url = %entry.url, "node registered in membership");
        Ok(())
    }

    /// Remove every entry whose `url` matches `ip` and rewrite the file.
    ///
    /// Returns the number of entries removed. Removing zero entries is not
    /// an error and produces no change notification.
    pub async fn remove_by_url(&self, ip: &str) -> MembershipResult<usize> {
        let mut entries = self.inner.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| e.url != ip);
        let removed = before - entries.len();
        if removed == 0 {
            debug!(%ip, "no membership entry matched for removal");
            return Ok(0);
        }
        self.persist(&entries)?;
        drop(entries);

        self.notify();
        info!(%ip, removed, "node removed from membership");
        Ok(removed)
    }

    /// Subscribe to change notifications. The value is a revision counter
    /// bumped after every successful mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision_tx.subscribe()
    }

    fn persist(&self, entries: &[ServerEntry]) -> MembershipResult<()> {
        let text =
            serde_json::to_string_pretty(entries).map_err(|source| MembershipError::Parse {
                path: self.inner.path.display().to_string(),
                source,
            })?;
        std::fs::write(&self.inner.path, text).map_err(|source| MembershipError::Write {
            path: self.inner.path.display().to_string(),
            source,
        })
    }

    fn notify(&self) {
        self.inner.revision_tx.send_modify(|rev| *rev += 1);
    }
}
