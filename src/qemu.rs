//! QEMU command construction for boot-testing raw disk images.
//!
//! Provides `QemuBuilder` for the VM command line and `find_ovmf()` for
//! locating UEFI firmware when the configured path is missing.

use std::path::{Path, PathBuf};

use crate::process::Cmd;

/// Firmware the smoke test boots with unless configured otherwise.
pub const DEFAULT_FIRMWARE: &str = "/usr/share/OVMF/x64/OVMF.4m.fd";

/// Guest memory unless configured otherwise.
pub const DEFAULT_MEMORY: &str = "4G";

/// Builder for the `qemu-system-x86_64` command line.
#[derive(Debug, Clone)]
pub struct QemuBuilder {
    disk: PathBuf,
    firmware: Option<PathBuf>,
    memory: String,
}

impl QemuBuilder {
    /// Boot `disk` as a raw drive with hardware acceleration.
    pub fn new(disk: &Path) -> Self {
        Self {
            disk: disk.to_path_buf(),
            firmware: None,
            memory: DEFAULT_MEMORY.to_string(),
        }
    }

    pub fn firmware(mut self, path: &Path) -> Self {
        self.firmware = Some(path.to_path_buf());
        self
    }

    pub fn memory(mut self, memory: &str) -> Self {
        self.memory = memory.to_string();
        self
    }

    pub fn build(self) -> Cmd {
        let mut cmd = Cmd::new("qemu-system-x86_64")
            .arg("-drive")
            .arg(format!("file={},format=raw", self.disk.display()))
            .args(["-m", &self.memory])
            .args(["-enable-kvm", "-cpu", "host"]);

        if let Some(firmware) = &self.firmware {
            cmd = cmd.arg("-bios").arg_path(firmware);
        }

        cmd
    }
}

/// Resolve the firmware to boot with.
///
/// The configured path wins when it exists; otherwise the usual distro
/// locations are searched.
pub fn resolve_firmware(configured: &Path) -> Option<PathBuf> {
    if configured.exists() {
        return Some(configured.to_path_buf());
    }
    find_ovmf()
}

/// Find OVMF firmware for UEFI boot.
pub fn find_ovmf() -> Option<PathBuf> {
    let candidates = [
        // Arch
        "/usr/share/OVMF/x64/OVMF.4m.fd",
        "/usr/share/edk2-ovmf/x64/OVMF.fd",
        // Fedora/RHEL
        "/usr/share/edk2/ovmf/OVMF_CODE.fd",
        "/usr/share/OVMF/OVMF_CODE.fd",
        // Debian/Ubuntu
        "/usr/share/OVMF/OVMF_CODE_4M.fd",
        "/usr/share/qemu/OVMF.fd",
    ];

    candidates.iter().map(PathBuf::from).find(|p| p.exists())
}
