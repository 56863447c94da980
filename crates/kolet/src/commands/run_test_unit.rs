//! Run-test-unit command implementation

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use kolet_core::config::{resolve_config, ConfigOverrides};
use kolet_core::manager::SystemdManager;
use kolet_core::{run_ext_unit, Completion};
use tracing::info;

/// Run a service unit and wait for it to finish or request a reboot
#[derive(Args, Debug)]
pub struct RunTestUnitArgs {
    /// Unit to run; `.service` is appended when missing
    unit: String,

    /// Give up after this many seconds (default: wait forever)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Interval between unit-list polls
    #[arg(long, value_name = "MS")]
    poll_interval_ms: Option<u64>,
}

/// Execute the run-test-unit command
pub async fn execute(args: RunTestUnitArgs, config_path: Option<PathBuf>) -> Result<()> {
    let overrides = ConfigOverrides {
        config_path,
        unit_timeout_secs: args.timeout,
        poll_interval_ms: args.poll_interval_ms,
    };
    let config = resolve_config(&overrides)?;

    let manager = SystemdManager::connect_system().await?;
    match run_ext_unit(&manager, &config, &args.unit).await? {
        Completion::UnitSucceeded => {
            info!("{} succeeded", args.unit);
        }
        Completion::RebootDetected(record) => {
            record
                .emit(&mut io::stdout().lock())
                .context("writing reboot record")?;
        }
    }
    Ok(())
}
