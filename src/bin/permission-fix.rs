use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use image_pipeline::permissions;
use image_pipeline::{cli, logging};

#[derive(Parser)]
#[command(name = "permission-fix")]
#[command(about = "Reset file modes below mkosi.* directories to 0755/0644")]
struct Cli {
    /// Checkout root containing the mkosi.* directories
    #[arg(default_value = ".")]
    root: PathBuf,
}

fn run(cli: Cli) -> Result<i32> {
    let report = permissions::fix_permissions(&cli.root)?;
    println!(
        "[permissions] {} executable, {} regular, {} symlinks skipped",
        report.executable, report.regular, report.symlinks_skipped
    );
    Ok(0)
}

fn main() {
    logging::init();
    let cli: Cli = cli::parse();
    cli::exit_with(run(cli))
}
