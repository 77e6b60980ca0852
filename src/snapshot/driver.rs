// ABOUTME: Parallel scan driver that fans tables out across a fixed set of workers
// ABOUTME: Joins every worker before assembling the snapshot so no table is left behind

use super::scanner::scan_table;
use super::{Snapshot, TableSnapshot};
use crate::config::VerifierConfig;
use crate::postgres::{list_tables, ConnectionPool, PrimaryKey, TableInfo};
use crate::utils::sanitize_identifier;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Discover every business table and fingerprint it
///
/// Connecting and listing tables are the only fatal steps; once scanning
/// starts, failures are recorded per table.
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use pg_upgrade_verifier::config::{ScanOptions, VerifierConfig};
/// # use pg_upgrade_verifier::snapshot::take_snapshot;
/// # async fn example() -> Result<()> {
/// let config = VerifierConfig::new(
///     "postgresql://postgres@localhost:5432",
///     Some("app"),
///     4,
///     ScanOptions::default(),
/// )?;
/// let snapshot = take_snapshot(&config).await?;
/// println!("{} tables scanned", snapshot.len());
/// # Ok(())
/// # }
/// ```
pub async fn take_snapshot(config: &VerifierConfig) -> Result<Snapshot> {
    let pool = Arc::new(ConnectionPool::connect(config).await?);

    tracing::info!("Discovering tables...");
    let tables = {
        let client = pool.acquire().await?;
        list_tables(&client)
            .await
            .context("Failed to enumerate tables")?
    };

    let keyless = tables
        .iter()
        .filter(|t| !matches!(t.primary_key, PrimaryKey::Single(_)))
        .count();
    if keyless > 0 {
        tracing::info!(
            "{} table(s) have no single-column primary key; only row count and checksum are tracked for them",
            keyless
        );
    }

    tracing::info!(
        "Scanning {} tables with {} workers...",
        tables.len(),
        config.workers
    );

    let options = config.scan;
    let scan_pool = Arc::clone(&pool);
    let snapshot = scan_tables(tables, config.workers, move |table| {
        let pool = Arc::clone(&scan_pool);
        async move {
            match pool.acquire().await {
                Ok(mut conn) => scan_table(&mut conn, &table, &options).await,
                Err(e) => {
                    tracing::warn!(
                        "✗ Failed to scan {}: {:#}",
                        sanitize_identifier(&table.id().to_string()),
                        e
                    );
                    TableSnapshot::failed(format!("{:#}", e))
                }
            }
        }
    })
    .await?;

    pool.close();

    let failed = snapshot.failed_count();
    if failed > 0 {
        tracing::warn!("⚠ {} table(s) could not be scanned", failed);
    }
    tracing::info!(
        "✓ Snapshot complete: {} tables ({} scanned, {} failed)",
        snapshot.len(),
        snapshot.len() - failed,
        failed
    );

    Ok(snapshot)
}

/// Run `scan` over every table using at most `workers` concurrent tasks
///
/// Exactly `min(workers, tables.len())` tasks are spawned on the runtime and
/// pull tables from a shared queue until it is empty. Each table is scanned
/// by exactly one task, so each snapshot entry is written once. The function
/// returns only after every task has finished.
pub async fn scan_tables<F, Fut>(tables: Vec<TableInfo>, workers: usize, scan: F) -> Result<Snapshot>
where
    F: Fn(TableInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TableSnapshot> + Send + 'static,
{
    let total = tables.len();
    let worker_count = workers.max(1).min(total.max(1));

    let progress = ProgressBar::new(total as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );

    let queue = Arc::new(Mutex::new(VecDeque::from(tables)));
    let scan = Arc::new(scan);
    let mut tasks = JoinSet::new();

    for _ in 0..worker_count {
        let queue = Arc::clone(&queue);
        let scan = Arc::clone(&scan);
        let progress = progress.clone();

        tasks.spawn(async move {
            let mut results = Vec::new();
            loop {
                let next = queue.lock().await.pop_front();
                let Some(table) = next else {
                    break;
                };

                let id = table.id();
                let outcome = scan(table).await;
                progress.inc(1);
                progress.set_message(format!("Scanned {}", sanitize_identifier(&id.to_string())));
                results.push((id, outcome));
            }
            results
        });
    }

    let mut snapshot = Snapshot::new();
    while let Some(joined) = tasks.join_next().await {
        let results = joined.context("Scan worker terminated unexpectedly")?;
        for (id, outcome) in results {
            if snapshot.insert(id.clone(), outcome).is_some() {
                tracing::warn!("Table {} was listed more than once", id);
            }
        }
    }

    progress.finish_with_message("Scan complete");
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Fingerprint, TableId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn table(name: &str) -> TableInfo {
        TableInfo {
            schema: "public".to_string(),
            name: name.to_string(),
            primary_key: PrimaryKey::Single("id".to_string()),
        }
    }

    fn fingerprint(count: i64) -> TableSnapshot {
        TableSnapshot::Scanned(Fingerprint {
            count,
            ..Fingerprint::default()
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_scan_tables_covers_every_table() {
        let tables: Vec<TableInfo> = (0..25).map(|i| table(&format!("t{:02}", i))).collect();

        let snapshot = scan_tables(tables, 4, |table| async move {
            let n: i64 = table.name[1..].parse().unwrap();
            fingerprint(n)
        })
        .await
        .unwrap();

        assert_eq!(snapshot.len(), 25);
        for i in 0..25 {
            let id = TableId::new("public", format!("t{:02}", i));
            assert_eq!(snapshot.get(&id), Some(&fingerprint(i)));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_failure_does_not_affect_other_tables() {
        let tables = vec![table("accounts"), table("broken"), table("orders")];

        let snapshot = scan_tables(tables, 2, |table| async move {
            if table.name == "broken" {
                TableSnapshot::failed("permission denied for table broken")
            } else {
                fingerprint(10)
            }
        })
        .await
        .unwrap();

        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.failed_count(), 1);
        assert_eq!(
            snapshot.get(&TableId::new("public", "accounts")),
            Some(&fingerprint(10))
        );
        assert_eq!(
            snapshot.get(&TableId::new("public", "orders")),
            Some(&fingerprint(10))
        );
        assert_eq!(
            snapshot
                .get(&TableId::new("public", "broken"))
                .and_then(|t| t.error()),
            Some("permission denied for table broken")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_never_exceeds_worker_count() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let tables: Vec<TableInfo> = (0..12).map(|i| table(&format!("t{}", i))).collect();

        let (active_in, peak_in) = (Arc::clone(&active), Arc::clone(&peak));
        let snapshot = scan_tables(tables, 3, move |_table| {
            let active = Arc::clone(&active_in);
            let peak = Arc::clone(&peak_in);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                fingerprint(1)
            }
        })
        .await
        .unwrap();

        assert_eq!(snapshot.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_empty_table_list_yields_empty_snapshot() {
        let snapshot = scan_tables(Vec::new(), 4, |_table| async { fingerprint(0) })
            .await
            .unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    #[ignore]
    async fn test_take_snapshot_against_database() {
        let url = std::env::var("TEST_DATABASE_URL").unwrap();
        let config =
            VerifierConfig::new(&url, None, 2, crate::config::ScanOptions::default()).unwrap();

        let snapshot = take_snapshot(&config).await.unwrap();
        println!("Scanned {} tables", snapshot.len());
        assert!(snapshot.iter().all(|(id, _)| id.schema != "pg_catalog"));
    }
}
