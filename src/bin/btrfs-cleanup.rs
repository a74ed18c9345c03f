use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use image_pipeline::{cleanup, cli, logging, preflight};

#[derive(Parser)]
#[command(name = "btrfs-cleanup")]
#[command(about = "Recursively delete the leftover kde-linux_* build subvolume")]
struct Cli {
    /// Work directory containing the build subvolume
    work_path: PathBuf,
}

fn run(cli: Cli) -> Result<i32> {
    preflight::check_required_tools(preflight::CLEANUP_TOOLS)?;
    cleanup::cleanup(&cli.work_path)?;
    Ok(0)
}

fn main() {
    logging::init();
    let cli: Cli = cli::parse();
    cli::exit_with(run(cli))
}
