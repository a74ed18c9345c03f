//! Remove a leftover build subvolume.
//!
//! Image builds leave a `kde-linux_*` subvolume (with nested subvolumes
//! below it) in the work directory. Plain `rm -r` can't remove nested
//! subvolumes, so this deletes it recursively through `btrfs`.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::process::Cmd;

/// Name prefix of build subvolumes.
pub const SUBVOLUME_PREFIX: &str = "kde-linux_";

/// Directories directly below `work_dir` that look like build subvolumes,
/// in lexical order.
pub fn candidates(work_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(work_dir)
        .with_context(|| format!("reading '{}'", work_dir.display()))?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(SUBVOLUME_PREFIX) && entry.path().is_dir() {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

/// First candidate below `work_dir` that `is_subvolume` accepts.
pub fn find_subvolume<F>(work_dir: &Path, mut is_subvolume: F) -> Result<PathBuf>
where
    F: FnMut(&Path) -> bool,
{
    match candidates(work_dir)?.into_iter().find(|path| is_subvolume(path.as_path())) {
        Some(path) => Ok(path),
        None => bail!(
            "no {}* subvolume found in '{}'",
            SUBVOLUME_PREFIX,
            work_dir.display()
        ),
    }
}

/// Whether `btrfs subvolume show` recognizes `path` as a subvolume.
pub fn is_subvolume(path: &Path) -> bool {
    Cmd::new("btrfs")
        .args(["subvolume", "show"])
        .arg_path(path)
        .allow_fail()
        .run()
        .map(|result| result.success())
        .unwrap_or(false)
}

/// Find the build subvolume below `work_dir` and delete it with everything
/// nested in it. Returns the deleted path.
pub fn cleanup(work_dir: &Path) -> Result<PathBuf> {
    let work_dir = fs::canonicalize(work_dir)
        .with_context(|| format!("resolving '{}'", work_dir.display()))?;
    let subvolume = find_subvolume(&work_dir, is_subvolume)?;

    Cmd::new("btrfs")
        .args(["subvolume", "delete", "--recursive"])
        .arg_path(&subvolume)
        .error_msg(format!("deleting subvolume {}", subvolume.display()))
        .run()?;
    println!("[cleanup] deleted subvolume {}", subvolume.display());

    let sync = Cmd::new("btrfs")
        .args(["filesystem", "sync"])
        .arg_path(&work_dir)
        .run();
    if let Err(e) = sync {
        tracing::warn!("syncing {}: {:#}", work_dir.display(), e);
    }

    Ok(subvolume)
}
