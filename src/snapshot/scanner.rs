// ABOUTME: Fingerprints a single table: row count, primary key set, and content checksum
// ABOUTME: Any failure is captured in the table's record instead of aborting the run

use super::checksum::{aggregate_query, digest_stream_query, fold_numeric_sum, ContentChecksum};
use super::{Fingerprint, TableSnapshot};
use crate::config::{ChecksumStrategy, ScanOptions};
use crate::postgres::TableInfo;
use crate::utils::{quote_ident, sanitize_identifier};
use anyhow::{Context, Result};
use futures::{pin_mut, TryStreamExt};
use std::collections::BTreeSet;
use tokio_postgres::{Client, IsolationLevel, Transaction};

/// Scan one table and return its fingerprint, or a failure record
///
/// All reads happen inside a single `REPEATABLE READ READ ONLY` transaction,
/// so the count, key set, and checksum describe the same point in time even
/// while other sessions keep writing.
pub async fn scan_table(
    client: &mut Client,
    table: &TableInfo,
    options: &ScanOptions,
) -> TableSnapshot {
    let display_name = sanitize_identifier(&table.id().to_string());

    match fingerprint_table(client, table, options).await {
        Ok(fingerprint) => {
            tracing::debug!(
                "{}: {} rows, {} keys, checksum {}",
                display_name,
                fingerprint.count,
                fingerprint.pks.len(),
                fingerprint.checksum
            );
            TableSnapshot::Scanned(fingerprint)
        }
        Err(e) => {
            tracing::warn!("✗ Failed to scan {}: {:#}", display_name, e);
            TableSnapshot::failed(format!("{:#}", e))
        }
    }
}

async fn fingerprint_table(
    client: &mut Client,
    table: &TableInfo,
    options: &ScanOptions,
) -> Result<Fingerprint> {
    let qualified = format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.name));

    let tx = client
        .build_transaction()
        .isolation_level(IsolationLevel::RepeatableRead)
        .read_only(true)
        .start()
        .await
        .context("Failed to start read-only transaction")?;

    if let Some(timeout) = options.table_timeout {
        tx.batch_execute(&format!(
            "SET LOCAL statement_timeout = {}",
            timeout.as_millis()
        ))
        .await
        .context("Failed to set statement timeout")?;
    }

    let (count, checksum) = match options.strategy {
        ChecksumStrategy::Aggregate => aggregate_fingerprint(&tx, &qualified).await?,
        ChecksumStrategy::Stream => streamed_fingerprint(&tx, &qualified).await?,
    };

    let pk_col = table.primary_key.column().map(str::to_string);
    let pks = match &pk_col {
        Some(column) => collect_primary_keys(&tx, &qualified, column).await?,
        None => BTreeSet::new(),
    };

    tx.commit()
        .await
        .context("Failed to finish read-only transaction")?;

    Ok(Fingerprint {
        count,
        checksum,
        pk_col,
        pks,
    })
}

/// Count and checksum in one server-side aggregate
async fn aggregate_fingerprint(tx: &Transaction<'_>, qualified: &str) -> Result<(i64, i64)> {
    let row = tx
        .query_one(&aggregate_query(qualified), &[])
        .await
        .context("Failed to compute row count and checksum")?;

    let count: i64 = row.get(0);
    let sum: String = row.get(1);
    let checksum = fold_numeric_sum(&sum)?;

    Ok((count, checksum))
}

/// Count and checksum folded client-side from one digest per row
async fn streamed_fingerprint(tx: &Transaction<'_>, qualified: &str) -> Result<(i64, i64)> {
    let params: Vec<String> = Vec::new();
    let rows = tx
        .query_raw(digest_stream_query(qualified).as_str(), params)
        .await
        .context("Failed to stream row digests")?;
    pin_mut!(rows);

    let mut checksum = ContentChecksum::new();
    while let Some(row) = rows
        .try_next()
        .await
        .context("Failed to read row digest")?
    {
        let digest: String = row.get(0);
        checksum.add_digest(&digest)?;
    }

    Ok((checksum.rows(), checksum.value()))
}

/// Distinct primary key values as text
async fn collect_primary_keys(
    tx: &Transaction<'_>,
    qualified: &str,
    column: &str,
) -> Result<BTreeSet<String>> {
    let query = format!(
        "SELECT DISTINCT {}::text FROM {}",
        quote_ident(column),
        qualified
    );
    let params: Vec<String> = Vec::new();
    let rows = tx
        .query_raw(query.as_str(), params)
        .await
        .with_context(|| format!("Failed to read primary key column {}", column))?;
    pin_mut!(rows);

    let mut pks = BTreeSet::new();
    while let Some(row) = rows
        .try_next()
        .await
        .context("Failed to read primary key value")?
    {
        let value: Option<String> = row.get(0);
        if let Some(value) = value {
            pks.insert(value);
        }
    }

    Ok(pks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postgres::{connect, PrimaryKey};
    use std::time::Duration;

    fn users_table() -> TableInfo {
        TableInfo {
            schema: "public".to_string(),
            name: "scanner_users".to_string(),
            primary_key: PrimaryKey::Single("id".to_string()),
        }
    }

    async fn setup(client: &Client) {
        client
            .batch_execute(
                "DROP TABLE IF EXISTS scanner_users;
                 CREATE TABLE scanner_users (id INT PRIMARY KEY, name TEXT);
                 INSERT INTO scanner_users VALUES (1, 'ada'), (2, 'grace'), (3, 'edsger');",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_scan_table_fingerprint() {
        let url = std::env::var("TEST_DATABASE_URL").unwrap();
        let mut client = connect(&url).await.unwrap();
        setup(&client).await;

        let result = scan_table(&mut client, &users_table(), &ScanOptions::default()).await;
        let fingerprint = result.fingerprint().expect("scan should succeed").clone();

        assert_eq!(fingerprint.count, 3);
        assert_eq!(fingerprint.pk_col.as_deref(), Some("id"));
        let expected: BTreeSet<String> = ["1", "2", "3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(fingerprint.pks, expected);
    }

    #[tokio::test]
    #[ignore]
    async fn test_checksum_strategies_agree() {
        let url = std::env::var("TEST_DATABASE_URL").unwrap();
        let mut client = connect(&url).await.unwrap();
        setup(&client).await;

        let aggregate = scan_table(&mut client, &users_table(), &ScanOptions::default()).await;
        let streamed = scan_table(
            &mut client,
            &users_table(),
            &ScanOptions {
                strategy: ChecksumStrategy::Stream,
                table_timeout: None,
            },
        )
        .await;

        assert_eq!(aggregate, streamed);
    }

    #[tokio::test]
    #[ignore]
    async fn test_checksum_ignores_physical_row_order() {
        let url = std::env::var("TEST_DATABASE_URL").unwrap();
        let mut client = connect(&url).await.unwrap();
        setup(&client).await;

        let before = scan_table(&mut client, &users_table(), &ScanOptions::default()).await;

        // Rewrite rows so they land in a different physical order
        client
            .batch_execute(
                "CREATE TEMP TABLE scanner_copy AS SELECT * FROM scanner_users ORDER BY id DESC;
                 DELETE FROM scanner_users;
                 INSERT INTO scanner_users SELECT * FROM scanner_copy;",
            )
            .await
            .unwrap();

        let after = scan_table(&mut client, &users_table(), &ScanOptions::default()).await;
        assert_eq!(before, after);
    }

    #[tokio::test]
    #[ignore]
    async fn test_missing_table_is_recorded_as_failure() {
        let url = std::env::var("TEST_DATABASE_URL").unwrap();
        let mut client = connect(&url).await.unwrap();

        let table = TableInfo {
            schema: "public".to_string(),
            name: "does_not_exist_anywhere".to_string(),
            primary_key: PrimaryKey::Missing,
        };
        let result = scan_table(
            &mut client,
            &table,
            &ScanOptions {
                strategy: ChecksumStrategy::Aggregate,
                table_timeout: Some(Duration::from_secs(5)),
            },
        )
        .await;

        let error = result.error().expect("scan should fail");
        assert!(error.contains("does_not_exist_anywhere"));

        // The connection is still usable after the failed transaction
        client.query_one("SELECT 1", &[]).await.unwrap();
    }
}
