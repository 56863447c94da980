//! autopkgtest reboot helpers
//!
//! Tests written for autopkgtest reboot by calling `/tmp/autopkgtest-reboot
//! <mark>`. These helpers forward to `reboot-request` so such tests run
//! unchanged under kolet.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tracing::debug;

use crate::config::AgentConfig;
use crate::error::KoletError;

/// `autopkgtest-reboot`: request the reboot, then reboot.
pub fn reboot_script(agent: &str) -> String {
    format!("#!/bin/bash\nset -euo pipefail\n{agent} reboot-request -- \"$1\"\nreboot\n")
}

/// `autopkgtest-reboot-prepare`: request the reboot and leave rebooting to
/// the caller.
pub fn reboot_prepare_script(agent: &str) -> String {
    format!("#!/bin/bash\nset -euo pipefail\nexec {agent} reboot-request -- \"$1\"\n")
}

/// Write both helpers at their configured paths, mode 0755.
pub fn install(config: &AgentConfig) -> Result<(), KoletError> {
    write_executable(
        &config.reboot_script_path,
        &reboot_script(&config.agent_command),
    )?;
    write_executable(
        &config.reboot_prepare_script_path,
        &reboot_prepare_script(&config.agent_command),
    )
}

fn write_executable(path: &Path, contents: &str) -> Result<(), KoletError> {
    fs::write(path, contents).map_err(|e| KoletError::persistence(path, e))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|e| KoletError::persistence(path, e))?;
    debug!("installed {}", path.display());
    Ok(())
}
