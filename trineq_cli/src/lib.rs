#![allow(missing_docs)]

mod app;
mod ejm;
mod srb;

use clap::{Parser, ValueEnum};
use git_version::git_version;

/// How the event tree is treated with respect to the on-disk symmetric-event-tree cache (spec
/// §6). The library itself never touches disk for this; the CLI would, for the `Read`/`Write`
/// variants, but the demo scenarios registered so far always rebuild the tree fresh.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SymtreeIo {
    /// Build the tree fresh and don't persist it.
    None,
    /// Read a previously-written tree from disk.
    Read,
    /// Build the tree fresh and persist it afterwards.
    Write,
}

/// Command-line parameters (spec §6), grounded on `user::InfCLI`.
#[derive(Parser)]
#[command(
    arg_required_else_help = true,
    author,
    about,
    disable_help_subcommand = true,
    name = "trineq",
    version = git_version!(args = ["--always", "--dirty", "--long", "--tags"], cargo_prefix = "", fallback = "unknown")
)]
pub struct Cli {
    /// Name of the application to run.
    pub app: String,

    /// Verbosity level.
    #[arg(default_value = "4", long)]
    pub verb: u32,

    /// Number of worker threads for the tree-search oracle.
    #[arg(default_value = "1", long)]
    pub threads: usize,

    /// Whether to read or write the symmetric event tree cache.
    #[arg(default_value = "none", long = "symtree-io", value_enum)]
    pub symtree_io: SymtreeIo,

    /// Visibility parameter used by scenarios that study a family of distributions.
    #[arg(default_value = "0", long)]
    pub vis: i64,
}

/// Runs the application named by `cli.app`.
///
/// # Errors
///
/// Returns an error if `cli.app` doesn't match any registered application, or propagates any
/// error from running it.
pub fn run(cli: &Cli) -> anyhow::Result<()> {
    app::find_and_run(&cli.app, cli)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_command() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
