//! Copy partition byte ranges out of an image with `dd`.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::table::Extraction;
use crate::process::Cmd;

/// Copy one partition into `<work_dir>/<name>.raw`.
pub fn extract_partition(image: &Path, extraction: &Extraction, work_dir: &Path) -> Result<PathBuf> {
    let output = work_dir.join(extraction.file_name());
    Cmd::new("dd")
        .arg(format!("if={}", image.display()))
        .arg(format!("of={}", output.display()))
        .arg(format!("bs={}", extraction.sector_size))
        .arg(format!("skip={}", extraction.start))
        .arg(format!("count={}", extraction.count))
        .error_msg(format!("dd failed extracting partition '{}'", extraction.name))
        .run()?;
    Ok(output)
}

/// Extract every planned partition, in table order.
pub fn extract_all(image: &Path, plan: &[Extraction], work_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut outputs = Vec::with_capacity(plan.len());
    for extraction in plan {
        println!(
            "[rebuild] extracting {} ({} sectors from {})",
            extraction.name, extraction.count, extraction.start
        );
        outputs.push(extract_partition(image, extraction, work_dir)?);
    }
    Ok(outputs)
}

/// Delete extracted partition files.
pub fn remove_all(files: &[PathBuf]) -> Result<()> {
    for file in files {
        fs::remove_file(file).with_context(|| format!("removing '{}'", file.display()))?;
    }
    Ok(())
}
