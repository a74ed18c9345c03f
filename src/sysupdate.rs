//! Run `systemd-sysupdate` against a local image directory.
//!
//! The installed transfer definitions point at the remote repository. Copies
//! of them with `[Source]` rewritten to the local directory are written to a
//! temporary directory, and sysupdate is pointed at that instead.

use anyhow::{anyhow, bail, Context, Result};
use configparser::ini::Ini;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use crate::process::Cmd;

/// Where the installed transfer definitions live.
pub const DEFAULT_DEFINITIONS_SOURCE: &str = "/usr/lib/sysupdate.d";

pub const SYSUPDATE_BINARY: &str = "/usr/lib/systemd/systemd-sysupdate";

pub const DEFAULT_INHIBIT_WHO: &str = "KDE Linux Updater";

/// Accessing this triggers the ESP automount, which sysupdate doesn't do itself.
const ESP_AUTOMOUNT_PATH: &str = "/efi/EFI";

/// Transfer files rewritten for a local update and their source type.
pub const LOCAL_TRANSFERS: &[(&str, &str)] = &[
    ("50-root-x86-64.conf", "tar"),
    ("60-esp.conf", "regular-file"),
];

/// Rewrite `Source.Type` and `Source.Path` of a transfer definition.
///
/// Key case is preserved. A definition without a `[Source]` section is an
/// error rather than silently gaining one.
pub fn rewrite_source(contents: &str, source_type: &str, source_path: &Path) -> Result<String> {
    let mut ini = Ini::new_cs();
    ini.read(contents.to_string())
        .map_err(|e| anyhow!("parsing transfer definition: {}", e))?;

    if !ini.sections().iter().any(|s| s == "Source") {
        bail!("transfer definition has no [Source] section");
    }

    ini.set("Source", "Type", Some(source_type.to_string()));
    ini.set(
        "Source",
        "Path",
        Some(source_path.to_string_lossy().into_owned()),
    );
    Ok(ini.writes())
}

/// Write rewritten copies of [`LOCAL_TRANSFERS`] from `source_dir` into `output_dir`.
pub fn write_local_definitions(source_dir: &Path, output_dir: &Path, image_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(LOCAL_TRANSFERS.len());
    for (file, source_type) in LOCAL_TRANSFERS {
        let input = source_dir.join(file);
        let contents = fs::read_to_string(&input)
            .with_context(|| format!("reading transfer definition '{}'", input.display()))?;
        let rewritten = rewrite_source(&contents, source_type, image_dir)
            .with_context(|| format!("rewriting '{}'", input.display()))?;

        let output = output_dir.join(file);
        fs::write(&output, rewritten)
            .with_context(|| format!("writing '{}'", output.display()))?;
        tracing::debug!(path = %output.display(), source_type, "wrote local transfer definition");
        written.push(output);
    }
    Ok(written)
}

#[derive(Debug, Clone)]
pub struct LocalUpdate {
    pub image_dir: PathBuf,
    pub definitions_source: PathBuf,
    pub inhibit_who: String,
    /// Passed through to systemd-sysupdate verbatim, e.g. `update`.
    pub sysupdate_args: Vec<String>,
}

/// The inhibited sysupdate invocation for `definitions`.
pub fn sysupdate_command(update: &LocalUpdate, definitions: &Path) -> Cmd {
    Cmd::new("systemd-inhibit")
        .args(["--what=sleep:shutdown", "--mode=block"])
        .arg(format!("--who={}", update.inhibit_who))
        .arg("--why=Updating System")
        .arg(SYSUPDATE_BINARY)
        .arg(format!("--definitions={}", definitions.display()))
        // TODO: drop once the local images are signed and can be verified.
        .arg("--verify=no")
        .args(&update.sysupdate_args)
        .env("TAR_OPTIONS", "--zstd")
        .allow_fail()
}

/// Rewrite the definitions and run sysupdate. Returns sysupdate's status.
pub fn run_local_update(update: &LocalUpdate) -> Result<ExitStatus> {
    if !update.image_dir.is_dir() {
        bail!("{} is not a valid directory.", update.image_dir.display());
    }

    let definitions = tempfile::tempdir().context("creating temporary definitions directory")?;
    write_local_definitions(&update.definitions_source, definitions.path(), &update.image_dir)?;

    if let Err(e) = fs::metadata(ESP_AUTOMOUNT_PATH) {
        tracing::debug!("{} not accessible: {}", ESP_AUTOMOUNT_PATH, e);
    }

    println!(
        "[update] updating from {} via {}",
        update.image_dir.display(),
        definitions.path().display()
    );
    sysupdate_command(update, definitions.path()).run_interactive()
}

/// Whether the process runs with root privileges.
pub fn is_root() -> bool {
    rustix::process::geteuid().is_root()
}
