//! kolet - on-target agent for the kola test harness
//!
//! Runs on the machine under test. Executes native test functions, runs
//! external test units to completion, and carries a reboot mark across a
//! reboot for the harness.

use clap::Parser;
use kolet_core::error::EXIT_FAILURE;
use kolet_core::KoletError;

mod commands;
mod native;

use commands::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    kolet_core::logging::init(cli.verbose());

    if let Err(e) = cli.execute().await {
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code(&e));
    }
}

/// Usage errors exit 2, everything else 1.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<KoletError>()
        .map_or(EXIT_FAILURE, KoletError::exit_code)
}
