// ABOUTME: Backup command - run before the upgrade
// ABOUTME: Dumps the database, fingerprints every table, and saves the snapshot

use crate::backup::run_backup;
use crate::config::{BackupConfig, VerifierConfig};
use crate::snapshot;
use anyhow::{Context, Result};
use std::path::Path;

/// Capture the pre-upgrade state of a database
///
/// Steps:
/// 1. Dumps the database with pg_dump unless `backup` is `None`
/// 2. Scans every table in parallel into a snapshot
/// 3. Saves the snapshot to `snapshot_file`
///
/// A failed dump is logged and does not stop the snapshot. Failing to connect,
/// to list tables, or to write the snapshot file is fatal.
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use pg_upgrade_verifier::commands::backup;
/// # use pg_upgrade_verifier::config::{ScanOptions, VerifierConfig};
/// # async fn example() -> Result<()> {
/// let config = VerifierConfig::new(
///     "postgresql://postgres@localhost:5432",
///     Some("app"),
///     4,
///     ScanOptions::default(),
/// )?;
/// backup(&config, None, "migration_snapshot.json".as_ref()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn backup(
    config: &VerifierConfig,
    dump: Option<&BackupConfig>,
    snapshot_file: &Path,
) -> Result<()> {
    tracing::info!("Starting pre-upgrade backup of '{}'...", config.database);
    tracing::info!("");

    match dump {
        Some(dump) => {
            tracing::info!("Step 1/2: Dumping database...");
            if let Err(e) = run_backup(dump).await {
                tracing::error!("✗ Database dump failed: {:#}", e);
                tracing::error!("  Continuing with the snapshot; take a backup by other means before upgrading");
            }
        }
        None => tracing::info!("Step 1/2: Skipping database dump"),
    }

    tracing::info!("Step 2/2: Taking snapshot...");
    let snapshot = snapshot::take_snapshot(config).await?;
    snapshot::save(&snapshot, snapshot_file).context("Failed to save snapshot")?;

    tracing::info!("");
    tracing::info!("✅ Backup complete");
    tracing::info!(
        "  Snapshot: {} ({} tables)",
        snapshot_file.display(),
        snapshot.len()
    );
    if snapshot.failed_count() > 0 {
        tracing::warn!(
            "  {} table(s) could not be scanned and will be reported as Scan Error",
            snapshot.failed_count()
        );
    }
    tracing::info!("  Run 'compare' after the upgrade to check for differences");
    Ok(())
}
