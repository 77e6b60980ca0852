// ABOUTME: CLI entry point for pg-upgrade-verifier
// ABOUTME: Parses commands and routes to the backup and compare handlers

use clap::{Args, Parser, Subcommand};
use pg_upgrade_verifier::commands;
use pg_upgrade_verifier::config::{
    self, BackupConfig, BackupTarget, ChecksumStrategy, ScanOptions, VerifierConfig,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "pg-upgrade-verifier")]
#[command(
    about = "Snapshot a PostgreSQL database before a major-version upgrade and diff it afterwards",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ConnectionArgs {
    /// Base connection URL (postgresql://...; key/value strings are not accepted);
    /// the database name is appended when the URL has none
    #[arg(
        long,
        default_value_t = std::env::var("PGVERIFY_DB_URL")
            .unwrap_or_else(|_| config::DEFAULT_DB_URL.to_string())
    )]
    db_url: String,
    /// Number of parallel scan workers (also the connection pool size)
    #[arg(long, default_value_t = config::DEFAULT_WORKERS)]
    threads: usize,
    /// Path of the snapshot file
    #[arg(long, default_value = config::DEFAULT_SNAPSHOT_FILE)]
    snapshot_file: PathBuf,
}

#[derive(Args, Clone)]
struct ScanArgs {
    /// Per-statement timeout for table scans; a table runs up to two statements,
    /// and a cancelled scan is recorded as a scan error (must be at least 1)
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    table_timeout: Option<u64>,
    /// How the per-table content checksum is computed
    #[arg(long, value_enum, default_value_t = ChecksumStrategy::Aggregate)]
    checksum_strategy: ChecksumStrategy,
}

impl ScanArgs {
    fn options(&self) -> ScanOptions {
        ScanOptions {
            strategy: self.checksum_strategy,
            table_timeout: self.table_timeout.map(Duration::from_secs),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Dump the database and save a fingerprint of every table (run before upgrading)
    Backup {
        /// Database to back up and snapshot
        #[arg(long)]
        db_name: String,
        #[command(flatten)]
        connection: ConnectionArgs,
        #[command(flatten)]
        scan: ScanArgs,
        /// Run pg_dump inside this Docker container
        #[arg(long, env = "PGVERIFY_CONTAINER")]
        container: Option<String>,
        /// Run the local pg_dump even if a container is configured
        #[arg(long)]
        local: bool,
        /// Dump file path (default: <db>_backup_<timestamp>.sql)
        #[arg(long)]
        dump_file: Option<PathBuf>,
        /// Only take the snapshot, without running pg_dump
        #[arg(long)]
        skip_dump: bool,
    },
    /// Re-scan the database and diff it against the saved snapshot (run after upgrading)
    Compare {
        /// Database to compare (default: the database named in --db-url)
        #[arg(long)]
        db_name: Option<String>,
        #[command(flatten)]
        connection: ConnectionArgs,
        #[command(flatten)]
        scan: ScanArgs,
        /// Path of the JSON diff report
        #[arg(long, default_value = config::DEFAULT_REPORT_FILE)]
        output: PathBuf,
        /// Exit with an error when any table changed or could not be scanned
        #[arg(long)]
        fail_on_change: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Backup {
            db_name,
            connection,
            scan,
            container,
            local,
            dump_file,
            skip_dump,
        } => {
            let verifier = VerifierConfig::new(
                &connection.db_url,
                Some(db_name.as_str()),
                connection.threads,
                scan.options(),
            )?;
            let dump = if skip_dump {
                None
            } else {
                let target = BackupTarget::resolve(container, local);
                Some(BackupConfig::new(&verifier, target, dump_file)?)
            };
            commands::backup(&verifier, dump.as_ref(), &connection.snapshot_file).await
        }
        Commands::Compare {
            db_name,
            connection,
            scan,
            output,
            fail_on_change,
        } => {
            let verifier = VerifierConfig::new(
                &connection.db_url,
                db_name.as_deref(),
                connection.threads,
                scan.options(),
            )?;
            commands::compare(&verifier, &connection.snapshot_file, &output, fail_on_change)
                .await
                .map(|_| ())
        }
    }
}
