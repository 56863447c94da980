//! Configuration discovery and resolution

use super::types::AgentConfig;
use crate::error::KoletError;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Config file consulted when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/kolet/config.toml";

/// Command-line overrides for configuration
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Explicit config file; errors loading it are fatal
    pub config_path: Option<PathBuf>,
    /// Override the monitoring deadline
    pub unit_timeout_secs: Option<u64>,
    /// Override the unit-list poll interval
    pub poll_interval_ms: Option<u64>,
}

/// Resolve configuration from all sources
///
/// Priority (highest to lowest):
/// 1. Command-line overrides
/// 2. Environment variables
/// 3. Config file (`--config`, else `/etc/kolet/config.toml`)
/// 4. Defaults
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<AgentConfig, KoletError> {
    resolve_config_from(overrides, Path::new(DEFAULT_CONFIG_PATH))
}

/// Like [`resolve_config`], with the fallback config file location supplied.
pub fn resolve_config_from(
    overrides: &ConfigOverrides,
    default_path: &Path,
) -> Result<AgentConfig, KoletError> {
    // 3. Config file
    let mut config = match &overrides.config_path {
        Some(path) => load_config_file(path)?,
        None if default_path.exists() => match load_config_file(default_path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring unreadable config: {e}");
                AgentConfig::default()
            }
        },
        None => AgentConfig::default(),
    };

    // 2. Environment
    apply_env_overrides(&mut config);

    // 1. Command line
    apply_cli_overrides(&mut config, overrides);

    Ok(config)
}

/// Load config from a TOML file
fn load_config_file(path: &Path) -> Result<AgentConfig, KoletError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| KoletError::persistence(path, e))?;
    toml::from_str(&contents).map_err(|e| KoletError::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Apply environment variable overrides
fn apply_env_overrides(config: &mut AgentConfig) {
    if let Ok(path) = std::env::var("KOLET_MARK_PATH") {
        config.mark_path = PathBuf::from(path);
    }

    if let Ok(unit) = std::env::var("KOLET_WAIT_UNIT") {
        config.wait_unit = unit;
    }

    if let Ok(agent) = std::env::var("KOLET_AGENT") {
        config.agent_command = agent;
    }

    if let Ok(raw) = std::env::var("KOLET_UNIT_TIMEOUT") {
        match raw.parse::<u64>() {
            Ok(secs) => config.unit_timeout_secs = Some(secs),
            Err(_) => warn!("Ignoring non-numeric KOLET_UNIT_TIMEOUT={raw:?}"),
        }
    }

    if let Ok(raw) = std::env::var("KOLET_POLL_INTERVAL_MS") {
        match raw.parse::<u64>() {
            Ok(ms) => config.poll_interval_ms = ms,
            Err(_) => warn!("Ignoring non-numeric KOLET_POLL_INTERVAL_MS={raw:?}"),
        }
    }
}

/// Apply command-line overrides
fn apply_cli_overrides(config: &mut AgentConfig, overrides: &ConfigOverrides) {
    if let Some(secs) = overrides.unit_timeout_secs {
        config.unit_timeout_secs = Some(secs);
    }

    if let Some(ms) = overrides.poll_interval_ms {
        config.poll_interval_ms = ms;
    }
}
