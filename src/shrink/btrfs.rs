//! `btrfs-progs` backed [`Filesystem`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::Filesystem;
use crate::process::Cmd;

#[derive(Debug, Deserialize)]
struct DfReport {
    #[serde(rename = "filesystem-df")]
    block_groups: Vec<BlockGroup>,
}

#[derive(Debug, Deserialize)]
struct BlockGroup {
    total: u64,
}

/// Sum of block-group totals from `btrfs --format json filesystem df`.
pub fn parse_allocated(json: &str) -> Result<u64> {
    let report: DfReport =
        serde_json::from_str(json).context("parsing 'btrfs filesystem df' JSON output")?;
    report
        .block_groups
        .iter()
        .try_fold(0u64, |sum, bg| sum.checked_add(bg.total))
        .context("block-group totals overflow u64")
}

/// Size in bytes from `findmnt --bytes --noheadings --output size`.
pub fn parse_mount_size(output: &str) -> Result<u64> {
    let trimmed = output.trim();
    trimmed
        .parse()
        .with_context(|| format!("unexpected findmnt size output '{}'", trimmed))
}

/// A mounted btrfs filesystem.
#[derive(Debug, Clone)]
pub struct BtrfsMount {
    mountpoint: PathBuf,
}

impl BtrfsMount {
    pub fn new(mountpoint: &Path) -> Self {
        Self {
            mountpoint: mountpoint.to_path_buf(),
        }
    }

    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    fn resize(&self, size_arg: &str) -> Result<()> {
        Cmd::new("btrfs")
            .args(["filesystem", "resize", size_arg])
            .arg_path(&self.mountpoint)
            .error_msg(format!("btrfs filesystem resize {} failed", size_arg))
            .run()?;
        Ok(())
    }
}

impl Filesystem for BtrfsMount {
    fn mount_size(&mut self) -> Result<u64> {
        let result = Cmd::new("findmnt")
            .args(["--bytes", "--noheadings", "--output", "size"])
            .arg_path(&self.mountpoint)
            .error_msg(format!("{} is not a mount point", self.mountpoint.display()))
            .run()?;
        parse_mount_size(&result.stdout)
    }

    fn allocated(&mut self) -> Result<u64> {
        let result = Cmd::new("btrfs")
            .args(["--format", "json", "filesystem", "df"])
            .arg_path(&self.mountpoint)
            .run()?;
        parse_allocated(&result.stdout)
    }

    fn resize_to(&mut self, size: u64) -> Result<()> {
        self.resize(&size.to_string())
    }

    fn shrink_by(&mut self, quantum: u64) -> Result<()> {
        self.resize(&format!("-{}", quantum))
    }

    fn sync(&mut self) -> Result<()> {
        Cmd::new("btrfs")
            .args(["filesystem", "sync"])
            .arg_path(&self.mountpoint)
            .run()?;
        Ok(())
    }
}
