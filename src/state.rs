//! Size record handed from `btrfs-shrink` to `part-rebuild`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Default file name of the record, relative to the working directory.
pub const DEFAULT_STATE_FILE: &str = "btrfs.json";

/// Final byte size of the shrunk filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeRecord {
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<String>,
}

impl SizeRecord {
    /// New record stamped with the current UTC time.
    pub fn now(size: u64) -> Self {
        let recorded_at = OffsetDateTime::now_utc().format(&Rfc3339).ok();
        Self { size, recorded_at }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json)
            .with_context(|| format!("writing size record '{}'", path.display()))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading size record '{}'", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing size record '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_bare_size_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("btrfs.json");
        fs::write(&path, r#"{"size": 4294967296}"#).unwrap();

        let record = SizeRecord::read(&path).unwrap();
        assert_eq!(record.size, 4294967296);
        assert!(record.recorded_at.is_none());
    }

    #[test]
    fn written_record_is_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("btrfs.json");
        let record = SizeRecord::now(1234);
        record.write(&path).unwrap();

        let back = SizeRecord::read(&path).unwrap();
        assert_eq!(back, record);
        assert!(back.recorded_at.is_some());
    }

    #[test]
    fn rejects_missing_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("btrfs.json");
        fs::write(&path, r#"{"recorded_at": "2026-01-01T00:00:00Z"}"#).unwrap();
        assert!(SizeRecord::read(&path).is_err());
    }
}
