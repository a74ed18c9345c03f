//! Shared entry-point plumbing for the binaries.

use anyhow::Result;
use clap::Parser;

/// Exit status for usage errors and failed procedures.
pub const EXIT_FAILURE: i32 = 1;

/// Parse arguments, exiting with [`EXIT_FAILURE`] on usage errors.
///
/// clap's own usage exit code is 2; the tools report every failure as 1.
/// `--help` and `--version` still exit 0.
pub fn parse<T: Parser>() -> T {
    match T::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_FAILURE } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

/// Exit with the procedure's status, printing the error chain on failure.
pub fn exit_with(result: Result<i32>) -> ! {
    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::debug!("{:?}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(EXIT_FAILURE);
        }
    }
}
