use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use image_pipeline::qemu::{self, DEFAULT_FIRMWARE, DEFAULT_MEMORY};
use image_pipeline::smoke::{self, SmokeOptions, DEFAULT_HOOK_NAME, DEFAULT_TIMEOUT};
use image_pipeline::{cli, logging, preflight, Config};

#[derive(Parser)]
#[command(name = "smoke-test")]
#[command(about = "Boot a disk image in QEMU and wait for it to report success")]
struct Cli {
    /// Raw disk image to test (a copy is booted, the original is untouched)
    image: PathBuf,

    /// EFI base image handed to the boot hook
    efi_base: PathBuf,

    /// Boot hook injected into the copy (default: basic-test-efi-addon.sh
    /// next to this executable)
    #[arg(long)]
    hook: Option<PathBuf>,

    /// UEFI firmware
    #[arg(long)]
    firmware: Option<PathBuf>,

    /// Guest memory (default: 4G)
    #[arg(long)]
    memory: Option<String>,

    /// Seconds to wait for the guest's verdict (default: 300)
    #[arg(long)]
    timeout: Option<u64>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn default_hook() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("locating current executable")?;
    let dir = exe
        .parent()
        .context("current executable has no parent directory")?;
    Ok(dir.join(DEFAULT_HOOK_NAME))
}

fn run(cli: Cli) -> Result<i32> {
    let config = Config::load(cli.config.as_deref())?;
    preflight::check_required_tools(preflight::SMOKE_TOOLS)?;

    let hook = match cli.hook.or(config.smoke.hook) {
        Some(hook) => hook,
        None => default_hook()?,
    };
    let configured_firmware = cli
        .firmware
        .or(config.smoke.firmware)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FIRMWARE));
    let firmware = qemu::resolve_firmware(&configured_firmware).with_context(|| {
        format!(
            "UEFI firmware not found at {} or any known location",
            configured_firmware.display()
        )
    })?;
    let timeout = cli
        .timeout
        .or(config.smoke.timeout_secs)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT);

    let options = SmokeOptions {
        image: cli.image,
        efi_base: cli.efi_base,
        hook,
        firmware,
        memory: cli
            .memory
            .or(config.smoke.memory)
            .unwrap_or_else(|| DEFAULT_MEMORY.to_string()),
        timeout,
    };

    let verdict = smoke::run_smoke_test(&options)?;
    Ok(verdict.exit_code())
}

fn main() {
    logging::init();
    let cli: Cli = cli::parse();
    cli::exit_with(run(cli))
}
