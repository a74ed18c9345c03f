use clap::Parser;

use image_pipeline::advisory::{self, EXIT_NOT_FOUND};

/// Invoked by the shell for unknown commands, so every argument is data:
/// no help or version flags, and names starting with `-` are accepted.
#[derive(Parser)]
#[command(name = "command-not-found")]
#[command(disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    /// The command that wasn't found
    #[arg(allow_hyphen_values = true)]
    command: String,

    /// Arguments the command was called with (ignored)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() {
    match Cli::try_parse() {
        Ok(cli) => println!("{}", advisory::advise(&cli.command)),
        Err(e) => {
            let _ = e.print();
        }
    }
    std::process::exit(EXIT_NOT_FOUND);
}
