//! Snapshots of a unit's reported properties

use std::fmt;

/// Unit `ActiveState` as reported by systemd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveState {
    Inactive,
    Activating,
    Active,
    Deactivating,
    Failed,
    Reloading,
    Maintenance,
    /// A state this agent does not know about
    Other(String),
}

impl ActiveState {
    /// Parse the D-Bus string form.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "inactive" => Self::Inactive,
            "activating" => Self::Activating,
            "active" => Self::Active,
            "deactivating" => Self::Deactivating,
            "failed" => Self::Failed,
            "reloading" => Self::Reloading,
            "maintenance" => Self::Maintenance,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Inactive => "inactive",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Deactivating => "deactivating",
            Self::Failed => "failed",
            Self::Reloading => "reloading",
            Self::Maintenance => "maintenance",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for ActiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the main process of a service ended (`ExecMainCode`).
///
/// Values are the `si_code` constants from `<bits/siginfo-consts.h>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMainCode {
    /// No main process has exited yet
    None,
    /// CLD_EXITED: `exec_main_status` is an exit code
    Exited,
    /// CLD_KILLED: `exec_main_status` is a signal number
    Killed,
    /// CLD_DUMPED: killed, with a core dump
    Dumped,
    Other(i32),
}

impl ExecMainCode {
    pub const CLD_EXITED: i32 = 1;
    pub const CLD_KILLED: i32 = 2;
    pub const CLD_DUMPED: i32 = 3;

    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => Self::None,
            Self::CLD_EXITED => Self::Exited,
            Self::CLD_KILLED => Self::Killed,
            Self::CLD_DUMPED => Self::Dumped,
            other => Self::Other(other),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Exited => Self::CLD_EXITED,
            Self::Killed => Self::CLD_KILLED,
            Self::Dumped => Self::CLD_DUMPED,
            Self::Other(code) => code,
        }
    }
}

/// One snapshot of the properties that decide a unit's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitObservation {
    pub active_state: ActiveState,
    pub sub_state: String,
    /// Service `Result` (`success`, `exit-code`, `signal`, ...)
    pub result: String,
    pub exec_main_code: ExecMainCode,
    /// Exit code or signal number, depending on `exec_main_code`
    pub exec_main_status: i32,
}

impl UnitObservation {
    /// Build an observation from raw D-Bus property values.
    pub fn from_raw(
        active_state: &str,
        sub_state: &str,
        result: &str,
        exec_main_code: i32,
        exec_main_status: i32,
    ) -> Self {
        Self {
            active_state: ActiveState::parse(active_state),
            sub_state: sub_state.to_string(),
            result: result.to_string(),
            exec_main_code: ExecMainCode::from_raw(exec_main_code),
            exec_main_status,
        }
    }

    /// A unit that has not been started yet.
    pub fn inactive() -> Self {
        Self::from_raw("inactive", "dead", "success", 0, 0)
    }
}

impl fmt::Display for UnitObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} result={} code={} status={}",
            self.active_state,
            self.sub_state,
            self.result,
            self.exec_main_code.raw(),
            self.exec_main_status
        )
    }
}
