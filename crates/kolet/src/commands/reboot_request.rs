//! Reboot-request command implementation

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use kolet_core::config::{resolve_config, ConfigOverrides};
use kolet_core::manager::SystemdManager;
use kolet_core::{request_reboot, KoletError};

/// Record a reboot mark and wait for the harness to acknowledge it
#[derive(Args, Debug)]
pub struct RebootRequestArgs {
    /// Opaque mark handed to the test after the reboot (may be empty or
    /// start with `-`)
    #[arg(allow_hyphen_values = true)]
    mark: Option<String>,
}

/// Execute the reboot-request command
pub async fn execute(args: RebootRequestArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mark = args
        .mark
        .ok_or_else(|| KoletError::InvalidArgument("Must provide reboot mark".to_string()))?;

    let config = resolve_config(&ConfigOverrides {
        config_path,
        ..Default::default()
    })?;

    let manager = SystemdManager::connect_system().await?;
    request_reboot(&manager, &config, &mark).await?;
    Ok(())
}
