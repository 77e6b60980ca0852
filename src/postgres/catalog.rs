// ABOUTME: Business table discovery for snapshot scans
// ABOUTME: Lists user tables outside system schemas along with their primary key shape

use anyhow::{Context, Result};
use tokio_postgres::Client;

use crate::snapshot::TableId;

/// Primary key layout of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryKey {
    /// Exactly one key column; key sets can be compared
    Single(String),
    /// Multi-column key; only count and checksum are compared
    Composite(Vec<String>),
    /// No primary key; only count and checksum are compared
    Missing,
}

impl PrimaryKey {
    /// Classify the key from its columns in key order
    pub fn from_columns(mut columns: Vec<String>) -> Self {
        match columns.len() {
            0 => PrimaryKey::Missing,
            1 => PrimaryKey::Single(columns.remove(0)),
            _ => PrimaryKey::Composite(columns),
        }
    }

    /// Column usable for key-set comparison
    pub fn column(&self) -> Option<&str> {
        match self {
            PrimaryKey::Single(column) => Some(column),
            PrimaryKey::Composite(_) | PrimaryKey::Missing => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub primary_key: PrimaryKey,
}

impl TableInfo {
    pub fn id(&self) -> TableId {
        TableId::new(&self.schema, &self.name)
    }
}

/// List all ordinary tables in the current database with their primary keys
///
/// System schemas (`pg_catalog`, `information_schema`, TOAST and temporary
/// schemas) are skipped. Results are ordered by schema, then table name.
pub async fn list_tables(client: &Client) -> Result<Vec<TableInfo>> {
    let rows = client
        .query(
            "SELECT
                n.nspname::text,
                c.relname::text,
                COALESCE(pk.columns, ARRAY[]::text[])
             FROM pg_catalog.pg_class c
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
             LEFT JOIN LATERAL (
                SELECT array_agg(a.attname::text ORDER BY k.ord) AS columns
                FROM pg_catalog.pg_index i
                CROSS JOIN LATERAL unnest(i.indkey) WITH ORDINALITY AS k(attnum, ord)
                JOIN pg_catalog.pg_attribute a
                    ON a.attrelid = i.indrelid AND a.attnum = k.attnum
                WHERE i.indrelid = c.oid AND i.indisprimary
             ) pk ON true
             WHERE c.relkind = 'r'
               AND n.nspname NOT IN ('pg_catalog', 'information_schema')
               AND n.nspname NOT LIKE 'pg\\_toast%'
               AND n.nspname NOT LIKE 'pg\\_temp\\_%'
             ORDER BY n.nspname, c.relname",
            &[],
        )
        .await
        .context("Failed to list tables")?;

    let tables = rows
        .iter()
        .map(|row| TableInfo {
            schema: row.get(0),
            name: row.get(1),
            primary_key: PrimaryKey::from_columns(row.get(2)),
        })
        .collect();

    Ok(tables)
}
