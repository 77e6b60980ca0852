// ABOUTME: Wrapper for pg_dump to take a full logical backup before the upgrade
// ABOUTME: Runs pg_dump locally or inside a Docker container and writes one SQL file

use crate::config::{BackupConfig, BackupTarget};
use crate::utils::{check_required_tools, sanitize_dsn};
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::process::Command;

/// Dump the whole database to `config.dump_file`
///
/// The dump is written to a temporary sibling and moved into place only when
/// pg_dump exits successfully, so a failed run never leaves a truncated file.
pub async fn run_backup(config: &BackupConfig) -> Result<()> {
    let path = config.dump_file.as_path();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create dump file in {}", dir.display()))?;

    match &config.target {
        BackupTarget::Local => {
            tracing::info!(
                "Dumping database '{}' with local pg_dump ({})",
                config.database,
                sanitize_dsn(&config.dsn)
            );
            check_required_tools(&["pg_dump"])?;

            let output = Command::new("pg_dump")
                .arg(format!("--dbname={}", config.dsn))
                .arg(format!("--file={}", tmp.path().display()))
                .output()
                .await
                .context("Failed to execute pg_dump. Is PostgreSQL client installed?")?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                bail!("pg_dump failed: {}", stderr.trim());
            }
        }
        BackupTarget::Container(container) => {
            tracing::info!(
                "Dumping database '{}' from container '{}' as user '{}'",
                config.database,
                container,
                config.user
            );
            check_required_tools(&["docker"])?;

            let stdout = tmp
                .reopen()
                .context("Failed to open dump file for writing")?;
            let output = Command::new("docker")
                .args(container_dump_args(container, &config.user, &config.database))
                .stdout(Stdio::from(stdout))
                .stderr(Stdio::piped())
                .output()
                .await
                .context("Failed to execute docker. Is Docker installed and running?")?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                bail!(
                    "pg_dump in container '{}' failed: {}",
                    container,
                    stderr.trim()
                );
            }
        }
    }

    tmp.persist(path)
        .with_context(|| format!("Failed to write dump file {}", path.display()))?;

    tracing::info!("✓ Backup written to {}", path.display());
    Ok(())
}

fn container_dump_args(container: &str, user: &str, database: &str) -> Vec<String> {
    ["exec", "-i", container, "pg_dump", "-U", user, database]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
