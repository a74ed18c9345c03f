//! Preflight checks for host tools.
//!
//! Each procedure verifies the tools it shells out to before touching any
//! image, so a missing package fails fast instead of half-way through a
//! destructive sequence.
//!
//! # Example
//!
//! ```rust
//! use image_pipeline::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("btrfs") {
//!     println!("btrfs-progs not installed");
//! }
//!
//! let tools = &[("sfdisk", "util-linux"), ("dd", "coreutils")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::{bail, Result};

/// Check if a command exists in PATH.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Tools used by `btrfs-shrink`. Each tuple is (command_name, package_name).
pub const SHRINK_TOOLS: &[(&str, &str)] = &[("btrfs", "btrfs-progs"), ("findmnt", "util-linux")];

/// Extra tools `btrfs-shrink` needs when it also truncates a backing file.
pub const UNMOUNT_TOOLS: &[(&str, &str)] = &[("umount", "util-linux")];

/// Tools used by `part-rebuild`.
pub const REBUILD_TOOLS: &[(&str, &str)] = &[
    ("sfdisk", "util-linux"),
    ("dd", "coreutils"),
    ("systemd-repart", "systemd"),
];

/// Tools used by `smoke-test`.
pub const SMOKE_TOOLS: &[(&str, &str)] = &[
    ("cp", "coreutils"),
    ("systemd-dissect", "systemd"),
    ("qemu-system-x86_64", "qemu"),
];

/// Tools used by `update-local`.
pub const UPDATE_TOOLS: &[(&str, &str)] = &[("systemd-inhibit", "systemd")];

/// Tools used by `btrfs-cleanup`.
pub const CLEANUP_TOOLS: &[(&str, &str)] = &[("btrfs", "btrfs-progs")];

/// Tools `btrfs-shrink` needs; `umount` only when it will unmount.
pub fn shrink_tools(unmount: bool) -> Vec<(&'static str, &'static str)> {
    let mut tools = SHRINK_TOOLS.to_vec();
    if unmount {
        tools.extend_from_slice(UNMOUNT_TOOLS);
    }
    tools
}

/// Check that specific tools are available.
///
/// Returns an error listing every missing tool with its package, not just
/// the first one.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<_> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .collect();

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}
