//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use backfill_cli::CliError;

fn main() {
    match backfill_cli::run() {
        Ok(()) => {}
        // Lets clap print help and version output with its own exit codes.
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => {
            eprintln!("backfill: {err}");
            std::process::exit(1);
        }
    }
}
