// ABOUTME: Structured errors for the persisted snapshot file
// ABOUTME: Lets callers tell a missing file apart from an unreadable or malformed one

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read snapshot file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write snapshot file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot file {} is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Snapshot file {} has an invalid entry '{key}': {reason}", path.display())]
    InvalidEntry {
        path: PathBuf,
        key: String,
        reason: String,
    },
}
