// ABOUTME: Per-table fingerprints captured in one scan run
// ABOUTME: Defines table identity, scan outcomes, and the snapshot map plus its submodules

pub mod checksum;
pub mod driver;
pub mod scanner;
pub mod store;

pub use checksum::{digest_prefix, ContentChecksum};
pub use driver::{scan_tables, take_snapshot};
pub use scanner::scan_table;
pub use store::{load, save};

use anyhow::{bail, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// A table's `(schema, table)` identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId {
    pub schema: String,
    pub table: String,
}

impl TableId {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

impl FromStr for TableId {
    type Err = anyhow::Error;

    /// Parse `schema.table`, splitting at the first dot
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('.') {
            Some((schema, table)) if !schema.is_empty() && !table.is_empty() => {
                Ok(TableId::new(schema, table))
            }
            _ => bail!("expected 'schema.table', got '{}'", s),
        }
    }
}

/// Row count, key set, and content checksum of one table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fingerprint {
    pub count: i64,
    pub checksum: i64,
    /// Single-column primary key used for key-set comparison
    pub pk_col: Option<String>,
    /// Primary key values in text form; empty when `pk_col` is `None`
    pub pks: BTreeSet<String>,
}

/// Outcome of scanning one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSnapshot {
    Scanned(Fingerprint),
    Failed { error: String },
}

impl TableSnapshot {
    pub fn failed(error: impl Into<String>) -> Self {
        TableSnapshot::Failed {
            error: error.into(),
        }
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        match self {
            TableSnapshot::Scanned(fingerprint) => Some(fingerprint),
            TableSnapshot::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            TableSnapshot::Scanned(_) => None,
            TableSnapshot::Failed { error } => Some(error),
        }
    }
}

/// Every table fingerprint from one run, ordered by table identity
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    tables: BTreeMap<TableId, TableSnapshot>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a table's outcome, returning the previous one if the table was already present
    pub fn insert(&mut self, id: TableId, table: TableSnapshot) -> Option<TableSnapshot> {
        self.tables.insert(id, table)
    }

    pub fn get(&self, id: &TableId) -> Option<&TableSnapshot> {
        self.tables.get(id)
    }

    pub fn contains(&self, id: &TableId) -> bool {
        self.tables.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TableId, &TableSnapshot)> {
        self.tables.iter()
    }

    pub fn table_ids(&self) -> impl Iterator<Item = &TableId> {
        self.tables.keys()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Number of tables whose scan failed
    pub fn failed_count(&self) -> usize {
        self.tables
            .values()
            .filter(|table| matches!(table, TableSnapshot::Failed { .. }))
            .count()
    }
}

impl FromIterator<(TableId, TableSnapshot)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (TableId, TableSnapshot)>>(iter: I) -> Self {
        Self {
            tables: iter.into_iter().collect(),
        }
    }
}
