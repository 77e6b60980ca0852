// ABOUTME: Compare command - run after the upgrade
// ABOUTME: Re-scans the database and diffs it against the saved pre-upgrade snapshot

use crate::config::VerifierConfig;
use crate::diff::{self, DiffReport};
use crate::report::{log_summary, write_report};
use crate::snapshot;
use anyhow::{bail, Context, Result};
use std::path::Path;

/// Compare the current database against the pre-upgrade snapshot
///
/// The saved snapshot is loaded before connecting, so a missing or corrupt
/// file fails fast without touching the database. The report is always
/// written; with `fail_on_change` the command then returns an error if any
/// table differs.
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use pg_upgrade_verifier::commands::compare;
/// # use pg_upgrade_verifier::config::{ScanOptions, VerifierConfig};
/// # async fn example() -> Result<()> {
/// let config = VerifierConfig::new(
///     "postgresql://postgres@localhost:5432",
///     Some("app"),
///     4,
///     ScanOptions::default(),
/// )?;
/// let report = compare(
///     &config,
///     "migration_snapshot.json".as_ref(),
///     "upgrade_diff_report.json".as_ref(),
///     false,
/// )
/// .await?;
/// println!("{} tables changed", report.changed_tables());
/// # Ok(())
/// # }
/// ```
pub async fn compare(
    config: &VerifierConfig,
    snapshot_file: &Path,
    output: &Path,
    fail_on_change: bool,
) -> Result<DiffReport> {
    tracing::info!("Starting post-upgrade comparison of '{}'...", config.database);
    tracing::info!("");

    tracing::info!("Step 1/3: Loading pre-upgrade snapshot...");
    let before = snapshot::load(snapshot_file).context("Cannot compare without a valid snapshot")?;

    tracing::info!("Step 2/3: Taking post-upgrade snapshot...");
    let after = snapshot::take_snapshot(config).await?;

    tracing::info!("Step 3/3: Comparing snapshots...");
    let report = diff::compare(&before, &after);
    write_report(&report, output)?;
    log_summary(&report);

    if fail_on_change {
        ensure_unchanged(&report, output)?;
    }

    Ok(report)
}

/// Fail when any table changed or could not be verified
fn ensure_unchanged(report: &DiffReport, output: &Path) -> Result<()> {
    if report.needs_attention() {
        bail!(
            "{} table(s) changed and {} table(s) could not be verified during the upgrade (see {})",
            report.changed_tables(),
            report.scan_errors(),
            output.display()
        );
    }
    Ok(())
}
