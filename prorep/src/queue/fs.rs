use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::Pattern;
use tracing::debug;

use crate::error::{ErrorKind, ProrepResult};
use crate::prorep_error;
use crate::queue::decode::decode_payload;
use crate::queue::lock::{LOCK_SUFFIX, is_locked, try_lock, unlock};
use crate::queue::{ChangeQueue, ClaimInfo};
use crate::types::{Payload, QueueEntry};

/// Suffix of entries that are still being written by the producer.
pub const PARTIAL_SUFFIX: &str = "_partial";

#[derive(Debug)]
struct Inner {
    dir: PathBuf,
    pattern: Pattern,
}

/// [`ChangeQueue`] backed by a shared directory.
///
/// Producers publish an entry by writing `<name>_partial` and renaming it to `<name>`, so a
/// listed entry is always complete. Claims are `<name>.lock` markers next to the entry.
#[derive(Debug, Clone)]
pub struct FsQueue {
    inner: Arc<Inner>,
}

impl FsQueue {
    /// Creates a queue over `dir`, listing file names that match `glob_pattern`.
    pub fn new(dir: impl Into<PathBuf>, glob_pattern: &str) -> ProrepResult<Self> {
        let pattern = Pattern::new(glob_pattern).map_err(|err| {
            prorep_error!(
                ErrorKind::ConfigError,
                "Invalid queue glob pattern",
                glob_pattern,
                source: err
            )
        })?;

        Ok(Self {
            inner: Arc::new(Inner {
                dir: dir.into(),
                pattern,
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    fn is_candidate(&self, file_name: &str) -> bool {
        !file_name.ends_with(PARTIAL_SUFFIX)
            && !file_name.ends_with(LOCK_SUFFIX)
            && self.inner.pattern.matches(file_name)
    }
}

impl ChangeQueue for FsQueue {
    async fn list(&self) -> ProrepResult<Vec<QueueEntry>> {
        let mut read_dir = tokio::fs::read_dir(&self.inner.dir).await.map_err(|err| {
            prorep_error!(
                ErrorKind::IoError,
                "Could not list the queue directory",
                self.inner.dir.display(),
                source: err
            )
        })?;

        let mut paths = Vec::new();
        while let Some(dir_entry) = read_dir.next_entry().await? {
            let file_name = dir_entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                debug!(file_name = ?file_name, "skipping non UTF-8 file name in queue directory");
                continue;
            };

            if !self.is_candidate(file_name) || !dir_entry.file_type().await?.is_file() {
                continue;
            }

            paths.push(dir_entry.path());
        }

        paths.sort();

        Ok(paths
            .into_iter()
            .enumerate()
            .map(|(index, path)| QueueEntry::new(path, index + 1))
            .collect())
    }

    async fn is_claimed(&self, entry: &QueueEntry) -> ProrepResult<bool> {
        is_locked(&entry.path).await
    }

    async fn try_claim(&self, entry: &QueueEntry, claim: &ClaimInfo) -> ProrepResult<bool> {
        try_lock(&entry.path, claim).await
    }

    async fn release(&self, entry: &QueueEntry) -> ProrepResult<()> {
        unlock(&entry.path).await
    }

    async fn read_payload(&self, entry: &QueueEntry) -> ProrepResult<Payload> {
        let bytes = tokio::fs::read(&entry.path).await.map_err(|err| {
            prorep_error!(
                ErrorKind::UnreadablePayload,
                "Queue entry could not be read",
                entry.path.display(),
                source: err
            )
        })?;
        debug!(entry = %entry, bytes = bytes.len(), "read queue entry payload");

        decode_payload(&bytes)
    }

    async fn delete(&self, entry: &QueueEntry) -> ProrepResult<()> {
        Ok(tokio::fs::remove_file(&entry.path).await?)
    }
}
