// ABOUTME: Bounded connection pool sized to the scan worker count
// ABOUTME: Verifies connectivity up front and hands out connections that return on drop

use super::connection::{connect_with_retry, make_tls};
use crate::config::VerifierConfig;
use crate::utils;
use anyhow::{Context, Result};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};

/// A connection checked out of the pool; dropping it returns it to the pool
pub type PooledConnection = Object;

/// Pool of at most `workers` connections to the verified database
pub struct ConnectionPool {
    pool: Pool,
    size: usize,
}

impl ConnectionPool {
    /// Open the pool, failing fast if the database cannot be reached at all
    ///
    /// A first connection (with retry and backoff) runs before the pool is
    /// built, so a hard connectivity failure aborts the run before any table
    /// is scanned.
    pub async fn connect(config: &VerifierConfig) -> Result<Self> {
        tracing::info!(
            "Connecting to {} ...",
            utils::sanitize_dsn(&config.dsn)
        );
        let first = connect_with_retry(&config.dsn)
            .await
            .context("Failed to connect to database")?;
        let version: String = first
            .query_one("SHOW server_version", &[])
            .await
            .context("Failed to query PostgreSQL version")?
            .get(0);
        tracing::info!("✓ Connected to PostgreSQL {}", version);
        drop(first);

        let pg_config = config
            .dsn
            .parse::<tokio_postgres::Config>()
            .context("Invalid connection string")?;
        let manager = Manager::from_config(
            pg_config,
            make_tls()?,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(config.workers)
            .build()
            .context("Failed to build connection pool")?;

        tracing::info!(
            "Connection pool initialized ({} connections)",
            config.workers
        );

        Ok(Self {
            pool,
            size: config.workers,
        })
    }

    /// Wait for a free connection
    ///
    /// Exhaustion is not an error: callers queue until another task drops its
    /// connection.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        self.pool
            .get()
            .await
            .context("Failed to acquire a pooled connection")
    }

    /// Maximum number of connections the pool will open
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn close(&self) {
        self.pool.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanOptions;

    #[tokio::test]
    async fn test_connect_fails_fast_on_unreachable_server() {
        let config = VerifierConfig::new(
            "postgresql://postgres@127.0.0.1:1",
            Some("nowhere"),
            2,
            ScanOptions::default(),
        )
        .unwrap();

        let result = ConnectionPool::connect(&config).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore]
    async fn test_pool_is_bounded_and_reuses_connections() {
        let url = std::env::var("TEST_DATABASE_URL")
            .expect("TEST_DATABASE_URL must be set for integration tests");
        let config = VerifierConfig::new(&url, None, 2, ScanOptions::default()).unwrap();
        let pool = ConnectionPool::connect(&config).await.unwrap();
        assert_eq!(pool.size(), 2);

        let first = pool.acquire().await.unwrap();
        let second = pool.acquire().await.unwrap();

        // Both slots are taken, so a third acquire waits until one is dropped
        let third = tokio::time::timeout(std::time::Duration::from_millis(200), pool.acquire()).await;
        assert!(third.is_err());

        drop(first);
        let third = pool.acquire().await.unwrap();
        third.query_one("SELECT 1", &[]).await.unwrap();
        drop(second);
    }
}
