//! Age-based removal of job output.

use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::StorageError;

/// Outcome of one sweep over the output root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Remove every entry under `root` last modified more than `retention`
/// before `now`.
///
/// A missing root is an empty sweep. Entries that vanish mid-sweep are
/// skipped; other per-entry failures are counted and logged but never stop
/// the sweep.
pub async fn sweep_expired(
    root: &Path,
    retention: Duration,
    now: SystemTime,
) -> Result<SweepReport, StorageError> {
    let mut report = SweepReport::default();

    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(root = %root.display(), "Output root missing, nothing to sweep");
            return Ok(report);
        }
        Err(e) => return Err(e.into()),
    };

    let cutoff = now.checked_sub(retention).unwrap_or(SystemTime::UNIX_EPOCH);

    while let Some(entry) = entries.next_entry().await? {
        report.scanned += 1;
        let path = entry.path();

        let metadata = match tokio::fs::symlink_metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Retention: stat failed");
                report.failed += 1;
                continue;
            }
        };

        let modified = match metadata.modified() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Retention: no mtime");
                report.failed += 1;
                continue;
            }
        };
        if modified >= cutoff {
            continue;
        }

        let removed = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match removed {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Retention: removed expired output");
                report.removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Retention: removal failed");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}
