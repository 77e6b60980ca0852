// ABOUTME: Persists snapshots as human-diffable JSON and reads them back
// ABOUTME: Validates every entry on load so a malformed file fails before comparison starts

use super::checksum::fold_numeric_sum;
use super::{Fingerprint, Snapshot, TableId, TableSnapshot};
use crate::error::SnapshotError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// One table's record in the snapshot file
///
/// Failed scans are written with zeroed values and the error text, which keeps
/// the file shape uniform for anyone reading it by hand.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedTable {
    #[serde(default)]
    count: Option<i64>,
    #[serde(default)]
    checksum: Option<PersistedChecksum>,
    #[serde(default)]
    pks: Vec<String>,
    #[serde(default)]
    pk_col: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Checksums are written as strings so JSON readers that use doubles keep
/// all 64 bits; plain numbers are accepted on load.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum PersistedChecksum {
    Text(String),
    Number(i64),
}

impl From<&TableSnapshot> for PersistedTable {
    fn from(table: &TableSnapshot) -> Self {
        match table {
            TableSnapshot::Scanned(fingerprint) => PersistedTable {
                count: Some(fingerprint.count),
                checksum: Some(PersistedChecksum::Text(fingerprint.checksum.to_string())),
                pks: fingerprint.pks.iter().cloned().collect(),
                pk_col: fingerprint.pk_col.clone(),
                error: None,
            },
            TableSnapshot::Failed { error } => PersistedTable {
                count: Some(0),
                checksum: Some(PersistedChecksum::Text("0".to_string())),
                pks: Vec::new(),
                pk_col: None,
                error: Some(error.clone()),
            },
        }
    }
}

impl PersistedTable {
    fn into_table_snapshot(self) -> Result<TableSnapshot, String> {
        if let Some(error) = self.error {
            return Ok(TableSnapshot::Failed { error });
        }

        let count = self.count.ok_or("missing 'count'")?;
        if count < 0 {
            return Err(format!("'count' must be non-negative, got {}", count));
        }

        let checksum = match self.checksum.ok_or("missing 'checksum'")? {
            PersistedChecksum::Number(value) => value,
            PersistedChecksum::Text(text) => {
                fold_numeric_sum(&text).map_err(|e| format!("invalid 'checksum': {:#}", e))?
            }
        };

        if self.pk_col.is_none() && !self.pks.is_empty() {
            return Err("'pks' present without 'pk_col'".to_string());
        }

        Ok(TableSnapshot::Scanned(Fingerprint {
            count,
            checksum,
            pk_col: self.pk_col,
            pks: self.pks.into_iter().collect(),
        }))
    }
}

/// Write a snapshot to `path` as pretty-printed JSON
///
/// Fails with [`SnapshotError::InvalidEntry`] before touching the file when a
/// table's `schema.table` key would not load back as the same table.
///
/// The file is written to a temporary sibling and renamed into place, so an
/// interrupted save never leaves a truncated snapshot behind.
pub fn save(snapshot: &Snapshot, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
    let path = path.as_ref();
    let write_error = |source| SnapshotError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut records: BTreeMap<String, PersistedTable> = BTreeMap::new();
    for (id, table) in snapshot.iter() {
        let key = id.to_string();
        // Keys are split at the first dot on load; anything else would be
        // read back as a different table or collide with one
        if key.parse::<TableId>().ok().as_ref() != Some(id) {
            return Err(SnapshotError::InvalidEntry {
                path: path.to_path_buf(),
                key,
                reason: format!(
                    "schema '{}' contains a dot, so the key cannot be read back unambiguously",
                    id.schema
                ),
            });
        }
        records.insert(key, PersistedTable::from(table));
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_error)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, &records)
            .map_err(|e| write_error(std::io::Error::other(e)))?;
        writer.write_all(b"\n").map_err(write_error)?;
        writer.flush().map_err(write_error)?;
    }
    tmp.persist(path).map_err(|e| write_error(e.error))?;

    tracing::info!("Snapshot saved to {}", path.display());
    Ok(())
}

/// Read a snapshot previously written by [`save`]
pub fn load(path: impl AsRef<Path>) -> Result<Snapshot, SnapshotError> {
    let path = path.as_ref();

    let file = File::open(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            SnapshotError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            SnapshotError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let records: BTreeMap<String, PersistedTable> =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            if source.is_io() {
                SnapshotError::Read {
                    path: path.to_path_buf(),
                    source: source.into(),
                }
            } else {
                SnapshotError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

    let mut snapshot = Snapshot::new();
    for (key, record) in records {
        let invalid = |reason: String| SnapshotError::InvalidEntry {
            path: path.to_path_buf(),
            key: key.clone(),
            reason,
        };

        let id: TableId = key.parse().map_err(|e: anyhow::Error| invalid(e.to_string()))?;
        let table = record.into_table_snapshot().map_err(invalid)?;
        snapshot.insert(id, table);
    }

    tracing::info!(
        "Loaded snapshot {} ({} tables)",
        path.display(),
        snapshot.len()
    );
    Ok(snapshot)
}
