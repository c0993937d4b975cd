//! Persistence for per-spec `metadata.json` records.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::SpecMetadata;

/// File name of the record inside a spec folder.
pub const METADATA_FILE: &str = "metadata.json";

/// Load a spec record from disk.
pub fn load_metadata(path: &Path) -> Result<SpecMetadata> {
    debug!(path = %path.display(), "loading metadata");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read metadata {}", path.display()))?;
    let meta: SpecMetadata = serde_json::from_str(&contents)
        .with_context(|| format!("parse metadata {}", path.display()))?;
    Ok(meta)
}

/// Atomically write a spec record to disk (temp file + rename).
pub fn save_metadata(path: &Path, meta: &SpecMetadata) -> Result<()> {
    debug!(path = %path.display(), id = %meta.id, status = %meta.status, "writing metadata");
    let mut buf = serde_json::to_string_pretty(meta).context("encode metadata")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("metadata path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp metadata {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace metadata {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SpecStatus;
    use chrono::{TimeZone, Utc};

    fn sample() -> SpecMetadata {
        SpecMetadata {
            id: "spec-io".to_string(),
            name: "IO layer".to_string(),
            status: SpecStatus::InProgress,
            depends_on: vec!["spec-core".to_string()],
            last_run: Some(Utc.with_ymd_and_hms(2025, 3, 2, 9, 15, 0).unwrap()),
            notes: "attempt 1 remaining tasks: wire config".to_string(),
            acceptance_commands: vec!["make all".to_string()],
        }
    }

    /// Verifies write then read preserves all fields.
    #[test]
    fn metadata_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("spec-io").join(METADATA_FILE);

        let meta = sample();
        save_metadata(&path, &meta).expect("write");
        let loaded = load_metadata(&path).expect("load");
        assert_eq!(loaded, meta);
    }

    /// Guards the on-disk field naming other tooling depends on.
    #[test]
    fn metadata_serializes_camel_case_keys() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(METADATA_FILE);
        save_metadata(&path, &sample()).expect("write");

        let contents = fs::read_to_string(&path).expect("read");
        assert!(contents.contains("\"dependsOn\""));
        assert!(contents.contains("\"lastRun\""));
        assert!(contents.contains("\"acceptanceCommands\""));
        assert!(contents.contains("\"in-progress\""));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn load_tolerates_minimal_records() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(METADATA_FILE);
        fs::write(
            &path,
            "{\"id\":\"spec-min\",\"name\":\"Minimal\",\"status\":\"todo\"}\n",
        )
        .expect("write");

        let meta = load_metadata(&path).expect("load");
        assert_eq!(meta.status, SpecStatus::Todo);
        assert!(meta.depends_on.is_empty());
        assert!(meta.last_run.is_none());
        assert!(meta.notes.is_empty());
        assert!(meta.acceptance_commands.is_empty());
    }

    #[test]
    fn load_missing_file_errors() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_metadata(&temp.path().join("absent.json")).expect_err("must fail");
        assert!(err.to_string().contains("read metadata"));
    }
}
