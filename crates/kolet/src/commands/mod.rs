//! CLI command dispatch and execution

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod reboot_request;
mod run;
mod run_test_unit;

/// kolet - agent for tests running on a kola-managed machine
#[derive(Parser, Debug)]
#[command(
    name = "kolet",
    version,
    about = "Native test functions and the reboot handshake for kola",
    long_about = "Runs on the machine under test: executes native test functions, \
                  monitors external test units, and hands a reboot mark to the harness"
)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: /etc/kolet/config.toml if present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a native test function
    Run(run::RunArgs),

    /// Run a service unit and wait for it to finish or request a reboot
    RunTestUnit(run_test_unit::RunTestUnitArgs),

    /// Record a reboot mark and wait for the harness to acknowledge it
    RebootRequest(reboot_request::RebootRequestArgs),
}

impl Cli {
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run(args) => run::execute(args),
            Commands::RunTestUnit(args) => run_test_unit::execute(args, self.config).await,
            Commands::RebootRequest(args) => reboot_request::execute(args, self.config).await,
        }
    }
}
