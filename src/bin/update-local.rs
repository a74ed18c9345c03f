use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use image_pipeline::sysupdate::{
    self, LocalUpdate, DEFAULT_DEFINITIONS_SOURCE, DEFAULT_INHIBIT_WHO,
};
use image_pipeline::{cli, logging, preflight, Config};

#[derive(Parser)]
#[command(name = "update-local")]
#[command(about = "Update the system with image files saved locally")]
struct Cli {
    /// Directory holding the root tarball and EFI image of the new version
    path: PathBuf,

    /// Options passed to systemd-sysupdate; you probably want 'update'
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    sysupdate_options: Vec<String>,

    /// Directory with the installed transfer definitions
    #[arg(long)]
    definitions_source: Option<PathBuf>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn run(cli: Cli) -> Result<i32> {
    if !sysupdate::is_root() {
        eprintln!("Please run as root or with run0");
        return Ok(cli::EXIT_FAILURE);
    }

    let config = Config::load(cli.config.as_deref())?;
    preflight::check_required_tools(preflight::UPDATE_TOOLS)?;

    let update = LocalUpdate {
        image_dir: cli.path,
        definitions_source: cli
            .definitions_source
            .or(config.update.definitions_source)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DEFINITIONS_SOURCE)),
        inhibit_who: config
            .update
            .inhibit_who
            .unwrap_or_else(|| DEFAULT_INHIBIT_WHO.to_string()),
        sysupdate_args: cli.sysupdate_options,
    };

    let status = sysupdate::run_local_update(&update)?;
    Ok(status.code().unwrap_or(cli::EXIT_FAILURE))
}

fn main() {
    logging::init();
    let cli: Cli = cli::parse();
    cli::exit_with(run(cli))
}
