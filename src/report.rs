// ABOUTME: Writes the diff report to disk and prints a readable summary to the log
// ABOUTME: The JSON document holds the summary rows and the detail rows side by side

use crate::diff::{ChangeType, DiffReport};
use crate::utils::sanitize_identifier;
use anyhow::{Context, Result};
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Write `report` as pretty-printed JSON, replacing any existing file
pub fn write_report(report: &DiffReport, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create report file in {}", dir.display()))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, report).context("Failed to serialize report")?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    tmp.persist(path)
        .with_context(|| format!("Failed to write report {}", path.display()))?;

    tracing::info!("Report written to {}", path.display());
    Ok(())
}

/// Log each changed or unverified table and the overall counts
pub fn log_summary(report: &DiffReport) {
    tracing::info!("");
    for row in report.summary.iter().filter(|row| !row.change_types.is_empty()) {
        let name = sanitize_identifier(&format!("{}.{}", row.schema, row.table));
        let marker = if row.is_change { "✗" } else { "⚠" };
        tracing::warn!(
            "  {} {}: {} (before: {}, after: {})",
            marker,
            name,
            row.change_label(),
            format_count(row.before_count),
            format_count(row.after_count)
        );
    }
    for detail in &report.details {
        tracing::debug!(
            "    {}.{} [{}] {}",
            detail.schema,
            detail.table,
            detail.change_type,
            detail.payload
        );
    }

    let total = report.summary.len();
    let changed = report.changed_tables();
    let unverified = report.scan_errors();

    tracing::info!("");
    tracing::info!("========================================");
    tracing::info!("Upgrade Comparison Summary");
    tracing::info!("========================================");
    tracing::info!("Total tables: {}", total);
    tracing::info!("✓ Unchanged: {}", total - changed - unverified);
    tracing::info!("✗ Changed: {}", changed);
    tracing::info!("⚠ Not verified (scan error): {}", unverified);
    for change_type in [
        ChangeType::RemovedTable,
        ChangeType::AddedTable,
        ChangeType::ScanError,
        ChangeType::CountMismatch,
        ChangeType::MissingIds,
        ChangeType::AddedIds,
        ChangeType::ContentMismatch,
    ] {
        let n = report.tables_with(change_type);
        if n > 0 {
            tracing::info!("    {}: {}", change_type, n);
        }
    }
    tracing::info!("========================================");
    tracing::info!("");

    if !report.needs_attention() {
        tracing::info!("✓ All tables match the pre-upgrade snapshot");
    }
    if changed > 0 {
        tracing::warn!("⚠ {} table(s) differ from the pre-upgrade snapshot", changed);
        tracing::warn!("  Review the report for the affected IDs");
    }
    if unverified > 0 {
        tracing::warn!(
            "⚠ {} table(s) could not be scanned and were not verified",
            unverified
        );
    }
}

fn format_count(count: Option<i64>) -> String {
    count.map_or_else(|| "-".to_string(), |n| n.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::compare;
    use crate::snapshot::{Fingerprint, Snapshot, TableId, TableSnapshot};
    use tempfile::tempdir;

    fn sample_report() -> DiffReport {
        let before: Snapshot = [(
            TableId::new("public", "users"),
            TableSnapshot::Scanned(Fingerprint {
                count: 2,
                checksum: 9,
                pk_col: Some("id".to_string()),
                pks: ["1", "2"].iter().map(|s| s.to_string()).collect(),
            }),
        )]
        .into_iter()
        .collect();
        compare(&before, &Snapshot::new())
    }

    #[test]
    fn test_write_report_contains_summary_and_details() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");

        write_report(&sample_report(), &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["summary"][0]["table"], "users");
        assert_eq!(value["summary"][0]["is_change"], true);
        assert!(value["summary"][0]["after_count"].is_null());
        assert_eq!(value["details"][0]["change_type"], "Removed Table");
    }

    #[test]
    fn test_write_report_into_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("report.json");
        assert!(write_report(&sample_report(), &path).is_err());
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(Some(42)), "42");
        assert_eq!(format_count(None), "-");
    }
}
