//! Lock markers guarding queue entries.
//!
//! A claim is a sibling file named `<entry>.lock`. Its existence is the only exclusion signal;
//! the body records who claimed the entry so an operator can clear stale markers.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::warn;
use uuid::Uuid;

use crate::error::ProrepResult;

/// Suffix appended to an entry path to form its lock marker.
pub const LOCK_SUFFIX: &str = ".lock";

/// Diagnostic metadata written into a lock marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimInfo {
    pub claimed_at: DateTime<Local>,
    pub host: String,
    pub worker_id: Uuid,
}

impl ClaimInfo {
    /// Creates claim metadata for the current host and time.
    pub fn new(worker_id: Uuid) -> Self {
        Self {
            claimed_at: Local::now(),
            host: gethostname::gethostname().to_string_lossy().into_owned(),
            worker_id,
        }
    }
}

impl fmt::Display for ClaimInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "timestamp:{}", self.claimed_at.format("%Y-%m-%d %H:%M:%S%.6f"))?;
        writeln!(f, "host:{}", self.host)?;
        writeln!(f, "worker:{}", self.worker_id)
    }
}

/// Returns the lock marker path for an entry.
pub fn lock_path(entry_path: &Path) -> PathBuf {
    let mut path = OsString::from(entry_path.as_os_str());
    path.push(LOCK_SUFFIX);
    PathBuf::from(path)
}

/// Returns whether the marker for `entry_path` exists.
pub async fn is_locked(entry_path: &Path) -> ProrepResult<bool> {
    Ok(tokio::fs::try_exists(lock_path(entry_path)).await?)
}

/// Creates the marker for `entry_path` if no one holds it.
///
/// The marker is created with create-new semantics, so of several concurrent callers exactly one
/// gets `true`.
pub async fn try_lock(entry_path: &Path, claim: &ClaimInfo) -> ProrepResult<bool> {
    let marker = lock_path(entry_path);
    if tokio::fs::try_exists(&marker).await? {
        return Ok(false);
    }

    let file = match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&marker)
        .await
    {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => return Err(err.into()),
    };

    write_claim(&marker, file, claim).await?;

    Ok(true)
}

/// Writes the claim body into a freshly created `marker`, removing the marker if that fails.
async fn write_claim<W>(marker: &Path, mut file: W, claim: &ClaimInfo) -> ProrepResult<()>
where
    W: AsyncWrite + Unpin,
{
    let written = match file.write_all(claim.to_string().as_bytes()).await {
        Ok(()) => file.flush().await,
        Err(err) => Err(err),
    };
    drop(file);

    if let Err(err) = written {
        if let Err(remove_err) = tokio::fs::remove_file(marker).await {
            warn!(
                marker = %marker.display(),
                error = %remove_err,
                "could not remove a lock marker after a failed write"
            );
        }
        return Err(err.into());
    }

    Ok(())
}

/// Removes the marker for `entry_path`. A missing marker is not an error.
pub async fn unlock(entry_path: &Path) -> ProrepResult<()> {
    match tokio::fs::remove_file(lock_path(entry_path)).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
