//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Well-known names and paths shared by the two halves of the reboot
/// handshake, plus monitoring knobs.
///
/// Both the agent that requests a reboot and the agent that watches for it
/// must agree on `mark_path` and `wait_unit`; the defaults are what the
/// harness expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// File the reboot mark is written to
    pub mark_path: PathBuf,
    /// Transient unit started by `reboot-request` and watched for by
    /// `run-test-unit`
    pub wait_unit: String,
    /// Location of the `autopkgtest-reboot` helper
    pub reboot_script_path: PathBuf,
    /// Location of the `autopkgtest-reboot-prepare` helper
    pub reboot_prepare_script_path: PathBuf,
    /// How the helper scripts invoke this agent
    pub agent_command: String,
    /// Interval between unit-list polls, in milliseconds
    pub poll_interval_ms: u64,
    /// Give up on the monitored unit after this many seconds (unset: wait forever)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_timeout_secs: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mark_path: PathBuf::from("/run/kolet-reboot"),
            wait_unit: "kola-runext-reboot-wait.service".to_string(),
            reboot_script_path: PathBuf::from("/tmp/autopkgtest-reboot"),
            reboot_prepare_script_path: PathBuf::from("/tmp/autopkgtest-reboot-prepare"),
            agent_command: "~core/kolet".to_string(),
            poll_interval_ms: 1000,
            unit_timeout_secs: None,
        }
    }
}

impl AgentConfig {
    /// Poll interval as a `Duration`, never zero.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Monitoring deadline, if one is configured.
    pub fn unit_timeout(&self) -> Option<Duration> {
        self.unit_timeout_secs.map(Duration::from_secs)
    }
}
