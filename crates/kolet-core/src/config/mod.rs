//! Configuration resolution
//!
//! Resolves agent configuration from multiple sources with priority:
//! 1. Command-line flags (passed as parameters)
//! 2. Environment variables (`KOLET_*`)
//! 3. Config file (`--config` or `/etc/kolet/config.toml`)
//! 4. Defaults

mod discovery;
mod types;

pub use discovery::{resolve_config, resolve_config_from, ConfigOverrides, DEFAULT_CONFIG_PATH};
pub use types::AgentConfig;
