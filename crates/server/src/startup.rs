// Startup tasks: mirror directory creation and the initial full sync.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::git::mirror::{MirrorSync, SyncSummary};

/// Ensure the mirror base directory exists before any workspace is created.
pub fn prepare_mirror_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create mirror directory {}", path.display()))?;
    info!(path = %path.display(), "mirror directory ready");
    Ok(())
}

/// Bring every configured repository up to date once before serving.
///
/// Failures are reported and skipped so one unreachable remote cannot keep
/// the server from starting.
pub async fn initial_sync(mirror: &MirrorSync) -> SyncSummary {
    info!("starting initial sync");
    let summary = mirror.sync_all().await;
    if summary.failed.is_empty() {
        info!(updated = summary.updated.len(), "initial sync complete");
    } else {
        warn!(
            updated = summary.updated.len(),
            failed = ?summary.failed,
            "initial sync finished with failures"
        );
    }
    summary
}
