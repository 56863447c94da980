//! The requesting half of the reboot handshake

use tracing::info;

use super::MarkStore;
use crate::config::AgentConfig;
use crate::error::KoletError;
use crate::manager::UnitManager;

/// What the synchronization unit runs until it is stopped externally.
pub const SYNC_UNIT_COMMAND: [&str; 2] = ["sleep", "infinity"];

/// Persist `mark`, then block in the synchronization unit until the harness
/// stops it.
///
/// Returns once the request has been acknowledged; the caller reboots.
pub async fn request_reboot<M: UnitManager>(
    manager: &M,
    config: &AgentConfig,
    mark: &str,
) -> Result<(), KoletError> {
    info!("Requesting reboot with mark: {mark}");
    MarkStore::new(&config.mark_path).write(mark)?;

    let command: Vec<String> = SYNC_UNIT_COMMAND.iter().map(|s| s.to_string()).collect();
    manager
        .run_transient_and_wait(&config.wait_unit, &command)
        .await?;

    info!("Reboot request acknowledged");
    Ok(())
}
