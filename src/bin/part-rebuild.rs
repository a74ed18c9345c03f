use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use image_pipeline::rebuild::{self, RebuildOptions, DEFAULT_DEFINITIONS, DEFAULT_ROOT_PARTITION};
use image_pipeline::state::DEFAULT_STATE_FILE;
use image_pipeline::{cli, logging, preflight, Config};

#[derive(Parser)]
#[command(name = "part-rebuild")]
#[command(about = "Rebuild a disk image with partitions sized to their content")]
#[command(
    after_help = "The image is emptied before systemd-repart runs. If anything fails after that,\nstart over from a fresh source image."
)]
struct Cli {
    /// Raw disk image to rebuild in place
    image: PathBuf,

    /// Size record written by btrfs-shrink (default: btrfs.json)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// systemd-repart definitions directory (default: mkosi.repart-rebuild)
    #[arg(long)]
    definitions: Option<PathBuf>,

    /// Name of the root partition (default: KDELinuxLive)
    #[arg(long)]
    root_partition: Option<String>,

    /// Directory for extracted partition files
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn run(cli: Cli) -> Result<i32> {
    let config = Config::load(cli.config.as_deref())?;
    preflight::check_required_tools(preflight::REBUILD_TOOLS)?;

    let options = RebuildOptions {
        image: cli.image,
        state_file: cli
            .state_file
            .or(config.rebuild.state_file)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
        definitions: cli
            .definitions
            .or(config.rebuild.definitions)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DEFINITIONS)),
        root_partition: cli
            .root_partition
            .or(config.rebuild.root_partition)
            .unwrap_or_else(|| DEFAULT_ROOT_PARTITION.to_string()),
        work_dir: cli.work_dir,
    };

    let report = rebuild::rebuild_image(&options)?;
    for partition in &report.partitions {
        println!(
            "  {:<24} {:>12} sectors",
            partition.name, partition.count
        );
    }

    Ok(0)
}

fn main() {
    logging::init();
    let cli: Cli = cli::parse();
    cli::exit_with(run(cli))
}
