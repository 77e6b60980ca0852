// ABOUTME: Compares a before-upgrade snapshot with an after-upgrade snapshot
// ABOUTME: Classifies each table's differences into summary rows and detail rows

use crate::snapshot::{Fingerprint, Snapshot, TableId, TableSnapshot};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Maximum number of IDs listed in one detail row
pub const DETAIL_ID_LIMIT: usize = 100;

/// Kind of difference found for a table
///
/// Variants are declared in the order they appear in a summary label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ChangeType {
    #[serde(rename = "Removed Table")]
    RemovedTable,
    #[serde(rename = "Added Table")]
    AddedTable,
    #[serde(rename = "Scan Error")]
    ScanError,
    #[serde(rename = "Count Mismatch")]
    CountMismatch,
    #[serde(rename = "Missing IDs")]
    MissingIds,
    #[serde(rename = "Added IDs")]
    AddedIds,
    #[serde(rename = "Content Mismatch")]
    ContentMismatch,
}

impl ChangeType {
    pub fn label(&self) -> &'static str {
        match self {
            ChangeType::RemovedTable => "Removed Table",
            ChangeType::AddedTable => "Added Table",
            ChangeType::ScanError => "Scan Error",
            ChangeType::CountMismatch => "Count Mismatch",
            ChangeType::MissingIds => "Missing IDs",
            ChangeType::AddedIds => "Added IDs",
            ChangeType::ContentMismatch => "Content Mismatch",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One summary row per table found in either snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffRow {
    pub schema: String,
    pub table: String,
    /// `None` when the table is absent or failed to scan on that side
    pub before_count: Option<i64>,
    pub after_count: Option<i64>,
    /// Whether the data differs; a scan error alone leaves this `false`
    /// because nothing could be compared
    pub is_change: bool,
    pub change_types: Vec<ChangeType>,
}

impl DiffRow {
    /// Comma-separated change types, empty for an unchanged table
    pub fn change_label(&self) -> String {
        self.change_types
            .iter()
            .map(ChangeType::label)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Body of a detail row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DetailPayload {
    /// Up to [`DETAIL_ID_LIMIT`] IDs plus the total number found
    Ids { ids: Vec<String>, total: usize },
    Text(String),
}

impl DetailPayload {
    fn ids(all: Vec<String>) -> Self {
        let total = all.len();
        let ids = all.into_iter().take(DETAIL_ID_LIMIT).collect();
        DetailPayload::Ids { ids, total }
    }
}

impl fmt::Display for DetailPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetailPayload::Ids { ids, total } => {
                write!(f, "{}", ids.join(", "))?;
                if *total > ids.len() {
                    write!(f, " (+{} more)", total - ids.len())?;
                }
                Ok(())
            }
            DetailPayload::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffDetail {
    pub schema: String,
    pub table: String,
    pub change_type: ChangeType,
    pub payload: DetailPayload,
}

/// Full comparison result: summary rows and detail rows, ordered by table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    pub summary: Vec<DiffRow>,
    pub details: Vec<DiffDetail>,
}

impl DiffReport {
    pub fn changed_tables(&self) -> usize {
        self.summary.iter().filter(|row| row.is_change).count()
    }

    pub fn has_changes(&self) -> bool {
        self.summary.iter().any(|row| row.is_change)
    }

    /// Tables that could not be compared because a scan failed on either side
    pub fn scan_errors(&self) -> usize {
        self.tables_with(ChangeType::ScanError)
    }

    /// True when a table changed or could not be verified
    pub fn needs_attention(&self) -> bool {
        self.has_changes() || self.scan_errors() > 0
    }

    /// Number of tables whose change types include `change_type`
    pub fn tables_with(&self, change_type: ChangeType) -> usize {
        self.summary
            .iter()
            .filter(|row| row.change_types.contains(&change_type))
            .count()
    }

    pub fn row(&self, id: &TableId) -> Option<&DiffRow> {
        self.summary
            .iter()
            .find(|row| row.schema == id.schema && row.table == id.table)
    }

    pub fn details_for<'a>(&'a self, id: &'a TableId) -> impl Iterator<Item = &'a DiffDetail> {
        self.details
            .iter()
            .filter(move |detail| detail.schema == id.schema && detail.table == id.table)
    }
}

/// Primary keys present only before, and only after
///
/// Both lists are empty when either side has no single-column key. The lists
/// are sorted and never share an element.
pub fn key_differences(before: &Fingerprint, after: &Fingerprint) -> (Vec<String>, Vec<String>) {
    if before.pk_col.is_none() || after.pk_col.is_none() {
        return (Vec::new(), Vec::new());
    }

    let missing = before.pks.difference(&after.pks).cloned().collect();
    let added = after.pks.difference(&before.pks).cloned().collect();
    (missing, added)
}

/// Compare two snapshots table by table
pub fn compare(before: &Snapshot, after: &Snapshot) -> DiffReport {
    let ids: BTreeSet<&TableId> = before.table_ids().chain(after.table_ids()).collect();
    let mut report = DiffReport::default();

    for id in ids {
        let mut builder = TableDiff::new(id);

        match (before.get(id), after.get(id)) {
            (Some(old), None) => builder.removed(old),
            (None, Some(new)) => builder.added(new),
            (Some(old), Some(new)) => match (old, new) {
                (TableSnapshot::Scanned(old), TableSnapshot::Scanned(new)) => {
                    builder.fingerprints(old, new)
                }
                _ => builder.scan_error(old, new),
            },
            (None, None) => continue,
        }

        builder.finish(&mut report);
    }

    report
}

/// Accumulates one table's summary row and detail rows
struct TableDiff<'a> {
    id: &'a TableId,
    before_count: Option<i64>,
    after_count: Option<i64>,
    change_types: Vec<ChangeType>,
    details: Vec<(ChangeType, DetailPayload)>,
}

impl<'a> TableDiff<'a> {
    fn new(id: &'a TableId) -> Self {
        Self {
            id,
            before_count: None,
            after_count: None,
            change_types: Vec::new(),
            details: Vec::new(),
        }
    }

    fn flag(&mut self, change_type: ChangeType, payload: Option<DetailPayload>) {
        if !self.change_types.contains(&change_type) {
            self.change_types.push(change_type);
        }
        if let Some(payload) = payload {
            self.details.push((change_type, payload));
        }
    }

    fn removed(&mut self, old: &TableSnapshot) {
        self.before_count = count_of(old);
        let text = match old {
            TableSnapshot::Scanned(fp) => format!(
                "Table existed before the upgrade ({} rows) and is gone now",
                fp.count
            ),
            TableSnapshot::Failed { error } => format!(
                "Table existed before the upgrade (scan failed: {}) and is gone now",
                error
            ),
        };
        self.flag(ChangeType::RemovedTable, Some(DetailPayload::Text(text)));
    }

    fn added(&mut self, new: &TableSnapshot) {
        self.after_count = count_of(new);
        let text = match new {
            TableSnapshot::Scanned(fp) => {
                format!("Table did not exist before the upgrade ({} rows now)", fp.count)
            }
            TableSnapshot::Failed { error } => format!(
                "Table did not exist before the upgrade (scan failed: {})",
                error
            ),
        };
        self.flag(ChangeType::AddedTable, Some(DetailPayload::Text(text)));
    }

    fn scan_error(&mut self, old: &TableSnapshot, new: &TableSnapshot) {
        self.before_count = count_of(old);
        self.after_count = count_of(new);

        let mut messages = Vec::new();
        if let Some(error) = old.error() {
            messages.push(format!("before: {}", error));
        }
        if let Some(error) = new.error() {
            messages.push(format!("after: {}", error));
        }
        self.flag(
            ChangeType::ScanError,
            Some(DetailPayload::Text(messages.join("; "))),
        );
    }

    fn fingerprints(&mut self, old: &Fingerprint, new: &Fingerprint) {
        self.before_count = Some(old.count);
        self.after_count = Some(new.count);

        let (missing, added) = key_differences(old, new);
        let count_changed = old.count != new.count;
        let keys_changed = !missing.is_empty() || !added.is_empty();
        let checksum_changed = old.checksum != new.checksum;

        if count_changed {
            let detail = (!keys_changed).then(|| {
                DetailPayload::Text(
                    "No primary key differences found (duplicate keys or no single-column primary key)"
                        .to_string(),
                )
            });
            self.flag(ChangeType::CountMismatch, detail);
        }
        if !missing.is_empty() {
            self.flag(ChangeType::MissingIds, Some(DetailPayload::ids(missing)));
        }
        if !added.is_empty() {
            self.flag(ChangeType::AddedIds, Some(DetailPayload::ids(added)));
        }
        if !count_changed && !keys_changed && checksum_changed {
            let text = format!(
                "Row count identical ({}) and key set unchanged, but content checksum differs",
                old.count
            );
            self.flag(ChangeType::ContentMismatch, Some(DetailPayload::Text(text)));
        }
    }

    fn finish(self, report: &mut DiffReport) {
        let schema = self.id.schema.clone();
        let table = self.id.table.clone();

        for (change_type, payload) in self.details {
            report.details.push(DiffDetail {
                schema: schema.clone(),
                table: table.clone(),
                change_type,
                payload,
            });
        }

        report.summary.push(DiffRow {
            schema,
            table,
            before_count: self.before_count,
            after_count: self.after_count,
            is_change: self
                .change_types
                .iter()
                .any(|change_type| *change_type != ChangeType::ScanError),
            change_types: self.change_types,
        });
    }
}

fn count_of(table: &TableSnapshot) -> Option<i64> {
    table.fingerprint().map(|fp| fp.count)
}
