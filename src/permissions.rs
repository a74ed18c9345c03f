//! Reset file modes of checked-out image definition trees.
//!
//! Some checkouts end up with arbitrary permissions. Everything below a
//! `mkosi.*` directory is reset: `0755` if the caller can execute it,
//! `0644` otherwise. Symlinks are left alone.

use anyhow::{Context, Result};
use rustix::fs::{access, Access};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory name prefix of trees to fix.
pub const TREE_PREFIX: &str = "mkosi.";

const EXECUTABLE_MODE: u32 = 0o755;
const REGULAR_MODE: u32 = 0o644;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixReport {
    pub executable: usize,
    pub regular: usize,
    pub symlinks_skipped: usize,
}

/// Whether the calling user may execute (or, for directories, search) `path`.
pub fn is_executable(path: &Path) -> bool {
    access(path, Access::EXEC_OK).is_ok()
}

/// `mkosi.*` directories directly under `root`, sorted.
pub fn find_trees(root: &Path) -> Result<Vec<PathBuf>> {
    let mut trees = Vec::new();
    let entries =
        fs::read_dir(root).with_context(|| format!("reading directory '{}'", root.display()))?;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(TREE_PREFIX) {
            continue;
        }
        if entry.file_type()?.is_dir() {
            trees.push(entry.path());
        }
    }
    trees.sort();
    Ok(trees)
}

/// Fix every entry below the `mkosi.*` directories of `root`.
pub fn fix_permissions(root: &Path) -> Result<FixReport> {
    let mut report = FixReport::default();

    for tree in find_trees(root)? {
        for entry in WalkDir::new(&tree).min_depth(1).follow_links(false) {
            let entry = entry.with_context(|| format!("walking '{}'", tree.display()))?;
            if entry.path_is_symlink() {
                report.symlinks_skipped += 1;
                continue;
            }

            let mode = if is_executable(entry.path()) {
                report.executable += 1;
                EXECUTABLE_MODE
            } else {
                report.regular += 1;
                REGULAR_MODE
            };
            fs::set_permissions(entry.path(), fs::Permissions::from_mode(mode))
                .with_context(|| format!("setting mode of '{}'", entry.path().display()))?;
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    fn mode(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn finds_only_mkosi_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("mkosi.extra")).unwrap();
        fs::create_dir(dir.path().join("mkosi.conf.d")).unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("mkosi.conf"), "").unwrap();

        let trees = find_trees(dir.path()).unwrap();
        let names: Vec<_> = trees
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["mkosi.conf.d", "mkosi.extra"]);
    }

    #[test]
    fn executable_follows_mode_bits() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.sh");
        let data = dir.path().join("data.conf");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::write(&data, "x").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        fs::set_permissions(&data, fs::Permissions::from_mode(0o644)).unwrap();

        assert!(is_executable(&script));
        assert!(!is_executable(&data));
        assert!(!is_executable(&dir.path().join("missing")));
    }

    #[test]
    fn resets_modes_and_skips_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("mkosi.extra");
        let bin = tree.join("usr/bin");
        fs::create_dir_all(&bin).unwrap();

        let script = bin.join("tool");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o700)).unwrap();

        let data = tree.join(".hidden.conf");
        fs::write(&data, "x").unwrap();
        fs::set_permissions(&data, fs::Permissions::from_mode(0o600)).unwrap();

        let outside = dir.path().join("outside");
        fs::write(&outside, "").unwrap();
        fs::set_permissions(&outside, fs::Permissions::from_mode(0o600)).unwrap();
        symlink(&outside, tree.join("link")).unwrap();

        let report = fix_permissions(dir.path()).unwrap();

        assert_eq!(mode(&script), 0o755);
        assert_eq!(mode(&data), 0o644);
        assert_eq!(mode(&bin), 0o755);
        assert_eq!(mode(&outside), 0o600);
        assert_eq!(report.symlinks_skipped, 1);
        assert_eq!(report.regular, 1);
        // usr, usr/bin, tool
        assert_eq!(report.executable, 3);
    }
}
