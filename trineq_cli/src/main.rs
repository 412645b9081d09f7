#![allow(missing_docs)]

use clap::Parser;
use std::process::ExitCode;
use trineq_cli::{run, Cli};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::FAILURE
        }
    }
}
