//! Partition table rebuilder.
//!
//! Rebuilds a disk image so its partitions are only as large as their
//! content. Non-root partitions are copied byte for byte; the root partition
//! is cut to the size `btrfs-shrink` recorded. The old image is emptied and
//! `systemd-repart` assembles a fresh one from the extracted files.
//!
//! There is no rollback. Once the image is emptied, any later failure means
//! starting over from a fresh source image.

pub mod extract;
pub mod table;

pub use table::{plan_extractions, sectors_for, Extraction, Partition, PartitionTable};

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::process::Cmd;
use crate::state::SizeRecord;

/// Name of the root partition in the image definitions.
pub const DEFAULT_ROOT_PARTITION: &str = "KDELinuxLive";

/// Repart definitions used for reassembly.
pub const DEFAULT_DEFINITIONS: &str = "mkosi.repart-rebuild";

#[derive(Debug, Clone)]
pub struct RebuildOptions {
    pub image: PathBuf,
    pub state_file: PathBuf,
    pub definitions: PathBuf,
    pub root_partition: String,
    /// Where extracted partitions are written; passed to repart as `--root`.
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RebuildReport {
    pub sector_size: u64,
    pub partitions: Vec<Extraction>,
}

/// Run the full extract, empty, repart, clean-up sequence.
pub fn rebuild_image(options: &RebuildOptions) -> Result<RebuildReport> {
    if !options.definitions.is_dir() {
        bail!(
            "repart definitions directory '{}' does not exist",
            options.definitions.display()
        );
    }

    let record = SizeRecord::read(&options.state_file)?;

    let image = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&options.image)
        .with_context(|| format!("opening image '{}'", options.image.display()))?;
    image
        .try_lock_exclusive()
        .with_context(|| format!("image '{}' is in use", options.image.display()))?;

    let table = PartitionTable::read(&options.image)?;
    let plan = plan_extractions(&table, &options.root_partition, record.size)?;
    println!(
        "[rebuild] root partition '{}' resized to {} sectors of {} bytes",
        options.root_partition,
        sectors_for(record.size, table.sector_size),
        table.sector_size
    );

    let extracted = extract::extract_all(&options.image, &plan, &options.work_dir)?;

    image
        .set_len(0)
        .with_context(|| format!("emptying image '{}'", options.image.display()))?;
    drop(image);
    println!("[rebuild] emptied {}", options.image.display());

    repart(&options.image, &options.definitions, &options.work_dir)?;

    extract::remove_all(&extracted)?;
    println!("[rebuild] rebuilt {}", options.image.display());

    Ok(RebuildReport {
        sector_size: table.sector_size,
        partitions: plan,
    })
}

/// Assemble `image` from the partition files in `root` using `definitions`.
pub fn repart(image: &Path, definitions: &Path, root: &Path) -> Result<()> {
    Cmd::new("systemd-repart")
        .args(["--size=auto", "--empty=allow", "--dry-run=no"])
        .arg(format!("--definitions={}", definitions.display()))
        .arg("--root")
        .arg_path(root)
        .arg_path(image)
        .error_msg("systemd-repart failed to reassemble the image")
        .run_interactive()?;
    Ok(())
}
