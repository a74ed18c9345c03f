//! Partition table model and the resized extraction plan.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::process::Cmd;

/// Sector size assumed when `sfdisk` doesn't report one.
pub const DEFAULT_SECTOR_SIZE: u64 = 512;

#[derive(Debug, Deserialize)]
struct SfdiskDump {
    partitiontable: PartitionTable,
}

/// Partition table as reported by `sfdisk --json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PartitionTable {
    #[serde(rename = "sectorsize", default = "default_sector_size")]
    pub sector_size: u64,
    #[serde(default)]
    pub partitions: Vec<Partition>,
}

fn default_sector_size() -> u64 {
    DEFAULT_SECTOR_SIZE
}

/// One partition; `start` and `size` are in sectors.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Partition {
    #[serde(default)]
    pub name: Option<String>,
    pub start: u64,
    pub size: u64,
}

impl PartitionTable {
    pub fn parse(json: &str) -> Result<Self> {
        let dump: SfdiskDump =
            serde_json::from_str(json).context("parsing 'sfdisk --json' output")?;
        if dump.partitiontable.sector_size == 0 {
            bail!("partition table reports a sector size of zero");
        }
        Ok(dump.partitiontable)
    }

    /// Read the table of a disk image with `sfdisk --json`.
    pub fn read(image: &Path) -> Result<Self> {
        let result = Cmd::new("sfdisk")
            .arg("--json")
            .arg_path(image)
            .error_msg(format!("reading partition table of {}", image.display()))
            .run()?;
        Self::parse(&result.stdout)
    }
}

/// Byte range of the source image to copy into `<name>.raw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub name: String,
    pub start: u64,
    pub count: u64,
    pub sector_size: u64,
}

impl Extraction {
    pub fn file_name(&self) -> String {
        format!("{}.raw", self.name)
    }

    pub fn byte_len(&self) -> u64 {
        self.count * self.sector_size
    }
}

/// Sectors needed to hold `bytes`, rounded up.
pub fn sectors_for(bytes: u64, sector_size: u64) -> u64 {
    bytes.div_ceil(sector_size)
}

/// Build the extraction list, sizing the root partition to `root_size` bytes.
///
/// Every other partition keeps its allocated size. The root may only
/// shrink; a recorded size beyond its allocation would produce a table that
/// doesn't match the data, so it is rejected before anything is touched.
pub fn plan_extractions(
    table: &PartitionTable,
    root_name: &str,
    root_size: u64,
) -> Result<Vec<Extraction>> {
    let root_sectors = sectors_for(root_size, table.sector_size);
    let mut saw_root = false;
    let mut plan = Vec::with_capacity(table.partitions.len());

    for (index, partition) in table.partitions.iter().enumerate() {
        let name = match partition.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => bail!(
                "partition {} (start sector {}) has no name; cannot extract it",
                index + 1,
                partition.start
            ),
        };
        if name.contains('/') || name == "." || name == ".." {
            bail!("partition name '{}' is not usable as a file name", name);
        }

        let count = if name == root_name {
            if root_sectors > partition.size {
                bail!(
                    "recorded root size {} bytes needs {} sectors but partition '{}' only has {}",
                    root_size,
                    root_sectors,
                    name,
                    partition.size
                );
            }
            saw_root = true;
            root_sectors
        } else {
            partition.size
        };

        plan.push(Extraction {
            name: name.to_string(),
            start: partition.start,
            count,
            sector_size: table.sector_size,
        });
    }

    if !saw_root {
        bail!("root partition '{}' not found in partition table", root_name);
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SFDISK_OUTPUT: &str = r#"{
       "partitiontable": {
          "label": "gpt",
          "id": "1F4B1D2A-6A4F-4B6E-9C5B-3C1D8F0A2E11",
          "device": "image.raw",
          "unit": "sectors",
          "firstlba": 2048,
          "lastlba": 20971486,
          "sectorsize": 512,
          "partitions": [
             {"node": "image.raw1", "start": 2048, "size": 1048576,
              "type": "C12A7328-F81F-11D2-BA4B-00A0C93EC93B",
              "uuid": "8E2B6A3C-0D3F-4F7A-9B1E-2C4D6F8A0B1C", "name": "ESP"},
             {"node": "image.raw2", "start": 1050624, "size": 16777216,
              "type": "4F68BCE3-E8CD-4DB1-96E7-FBCAF984B709",
              "uuid": "3A5C7E9F-1B2D-4E6F-8A0C-2E4F6A8C0E1A", "name": "KDELinuxLive"}
          ]
       }
    }"#;

    #[test]
    fn parses_sfdisk_json() {
        let table = PartitionTable::parse(SFDISK_OUTPUT).unwrap();
        assert_eq!(table.sector_size, 512);
        assert_eq!(table.partitions.len(), 2);
        assert_eq!(table.partitions[0].name.as_deref(), Some("ESP"));
        assert_eq!(table.partitions[1].start, 1050624);
        assert_eq!(table.partitions[1].size, 16777216);
    }

    #[test]
    fn missing_sector_size_defaults() {
        let table = PartitionTable::parse(
            r#"{"partitiontable": {"partitions": [{"start": 34, "size": 10, "name": "a"}]}}"#,
        )
        .unwrap();
        assert_eq!(table.sector_size, DEFAULT_SECTOR_SIZE);
    }

    #[test]
    fn sectors_round_up() {
        assert_eq!(sectors_for(0, 512), 0);
        assert_eq!(sectors_for(1, 512), 1);
        assert_eq!(sectors_for(512, 512), 1);
        assert_eq!(sectors_for(513, 512), 2);
        for size in [1u64, 511, 4095, 4096, 4097, 3_221_225_473] {
            for sector in [512u64, 4096] {
                let sectors = sectors_for(size, sector);
                assert!(sectors * sector >= size);
                assert!(sectors * sector < size + sector);
            }
        }
    }

    #[test]
    fn plan_resizes_only_root() {
        let table = PartitionTable::parse(SFDISK_OUTPUT).unwrap();
        let plan = plan_extractions(&table, "KDELinuxLive", 4_000_000_001).unwrap();

        assert_eq!(plan[0].name, "ESP");
        assert_eq!(plan[0].count, 1048576);
        assert_eq!(plan[1].name, "KDELinuxLive");
        assert_eq!(plan[1].start, 1050624);
        assert_eq!(plan[1].count, sectors_for(4_000_000_001, 512));
        assert_eq!(plan[1].file_name(), "KDELinuxLive.raw");
        assert!(plan[1].byte_len() >= 4_000_000_001);
    }

    #[test]
    fn plan_requires_root() {
        let table = PartitionTable::parse(SFDISK_OUTPUT).unwrap();
        let err = plan_extractions(&table, "Missing", 1024).unwrap_err();
        assert!(err.to_string().contains("'Missing' not found"));
    }

    #[test]
    fn plan_rejects_growing_root() {
        let table = PartitionTable::parse(SFDISK_OUTPUT).unwrap();
        let too_big = 16777216 * 512 + 1;
        assert!(plan_extractions(&table, "KDELinuxLive", too_big).is_err());
        assert!(plan_extractions(&table, "KDELinuxLive", 16777216 * 512).is_ok());
    }

    #[test]
    fn plan_rejects_unusable_names() {
        let unnamed = PartitionTable {
            sector_size: 512,
            partitions: vec![Partition {
                name: None,
                start: 2048,
                size: 8,
            }],
        };
        assert!(plan_extractions(&unnamed, "root", 0).is_err());

        let traversal = PartitionTable {
            sector_size: 512,
            partitions: vec![Partition {
                name: Some("../etc".into()),
                start: 2048,
                size: 8,
            }],
        };
        assert!(plan_extractions(&traversal, "root", 0).is_err());
    }
}
