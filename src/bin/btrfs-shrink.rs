use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use image_pipeline::shrink::{self, BtrfsMount, ShrinkStrategy, StrategyKind};
use image_pipeline::state::DEFAULT_STATE_FILE;
use image_pipeline::{cli, logging, preflight, Config};

#[derive(Parser)]
#[command(name = "btrfs-shrink")]
#[command(about = "Shrink a mounted btrfs filesystem to near its minimum size")]
struct Cli {
    /// Mount point of the filesystem to shrink
    mountpoint: PathBuf,

    /// Backing image file; if given, the filesystem is unmounted and the
    /// file truncated to match
    backing_file: Option<PathBuf>,

    /// Headroom and step policy
    #[arg(long, value_enum)]
    strategy: Option<StrategyKind>,

    /// Step size in bytes, overriding the strategy's
    #[arg(long)]
    quantum: Option<u64>,

    /// Where to record the final size (default: btrfs.json)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn run(cli: Cli) -> Result<i32> {
    let config = Config::load(cli.config.as_deref())?;
    preflight::check_required_tools(&preflight::shrink_tools(cli.backing_file.is_some()))?;

    let kind = cli.strategy.or(config.shrink.strategy).unwrap_or_default();
    let mut strategy = ShrinkStrategy::new(kind);
    if let Some(quantum) = cli.quantum.or(config.shrink.quantum) {
        strategy = strategy.with_quantum(quantum);
    }
    let state_file = cli
        .state_file
        .or(config.shrink.state_file)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE));

    println!(
        "[shrink] {} using {:?} strategy, {} byte steps",
        cli.mountpoint.display(),
        kind,
        strategy.quantum
    );

    let mut fs = BtrfsMount::new(&cli.mountpoint);
    let report = shrink::shrink_filesystem(&mut fs, &strategy)?;
    shrink::record_size(&report, &state_file)?;

    if let Some(backing_file) = &cli.backing_file {
        shrink::unmount_and_truncate(fs.mountpoint(), backing_file, &report)?;
    }

    Ok(0)
}

fn main() {
    logging::init();
    let cli: Cli = cli::parse();
    cli::exit_with(run(cli))
}
