//! Outcome classification for the unit under test
//!
//! [`classify`] turns one [`UnitObservation`] into a [`Classification`]:
//! a verdict plus an independent `terminal` flag. The two are separate
//! because a unit killed by a signal has finished its lifecycle and is still
//! an error.
//!
//! | Observation | Verdict | terminal |
//! |-------------|---------|----------|
//! | `Result=exit-code` | `Failed(ExitCode)` | no |
//! | `inactive` | `StartRequired` | no |
//! | `activating` | `Pending` | no |
//! | `active/exited`, exited 0 | `Succeeded` | yes |
//! | `active/exited`, exited nonzero | `Failed(NonZeroExit)` | no |
//! | `active/exited`, killed | `Failed(KilledBySignal)` | yes |
//! | `active/exited`, other code | `Failed(UnhandledCode)` | no |
//! | `active/running` | `Pending` | no |
//! | `active/failed` | `Failed(SubStateFailed)` | yes |
//! | `active/<other>` | `Pending` | no |
//! | any other state | `Failed(UnhandledState)` | yes |

use std::fmt;

use super::observation::{ActiveState, ExecMainCode, UnitObservation};

/// Why a unit is considered failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The service manager reported `Result=exit-code`
    ExitCode(i32),
    /// Exited with a nonzero status without `Result=exit-code`
    NonZeroExit(i32),
    /// Main process was killed by this signal
    KilledBySignal(i32),
    /// `ExecMainCode` was not one the agent understands
    UnhandledCode(i32),
    /// Active state with substate `failed`
    SubStateFailed,
    /// An `ActiveState` other than inactive/activating/active
    UnhandledState(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExitCode(code) => write!(f, "result 'exit-code': exited with code {code}"),
            Self::NonZeroExit(code) => write!(f, "nonzero exit {code}"),
            Self::KilledBySignal(sig) => write!(f, "killed by signal {sig}"),
            Self::UnhandledCode(code) => write!(f, "unhandled completion code {code}"),
            Self::SubStateFailed => write!(f, "unit in substate 'failed'"),
            Self::UnhandledState(state) => write!(f, "unhandled unit state '{state}'"),
        }
    }
}

/// What to do about the unit after one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Keep waiting
    Pending,
    /// Keep waiting, after asking the manager to start the unit again
    StartRequired,
    /// Main process exited with status 0
    Succeeded,
    Failed(FailureReason),
}

/// A verdict paired with whether the unit finished its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    pub terminal: bool,
}

impl Classification {
    fn pending() -> Self {
        Self {
            verdict: Verdict::Pending,
            terminal: false,
        }
    }

    fn failed(reason: FailureReason, terminal: bool) -> Self {
        Self {
            verdict: Verdict::Failed(reason),
            terminal,
        }
    }

    /// Whether monitoring stops on this classification.
    ///
    /// Every failure stops monitoring, terminal or not; failed test units
    /// are never retried.
    pub fn is_decisive(&self) -> bool {
        matches!(self.verdict, Verdict::Succeeded | Verdict::Failed(_))
    }
}

/// Classify one observation of the unit under test.
///
/// Pure: no I/O, no hidden state. The first matching rule wins.
pub fn classify(obs: &UnitObservation) -> Classification {
    if obs.result == "exit-code" {
        return Classification::failed(FailureReason::ExitCode(obs.exec_main_status), false);
    }

    match &obs.active_state {
        ActiveState::Inactive => Classification {
            verdict: Verdict::StartRequired,
            terminal: false,
        },
        ActiveState::Activating => Classification::pending(),
        ActiveState::Active => match obs.sub_state.as_str() {
            "exited" => classify_exited(obs),
            "running" => Classification::pending(),
            "failed" => Classification::failed(FailureReason::SubStateFailed, true),
            _ => Classification::pending(),
        },
        other => Classification::failed(FailureReason::UnhandledState(other.to_string()), true),
    }
}

fn classify_exited(obs: &UnitObservation) -> Classification {
    let status = obs.exec_main_status;
    match obs.exec_main_code {
        ExecMainCode::Exited if status == 0 => Classification {
            verdict: Verdict::Succeeded,
            terminal: true,
        },
        // Result=exit-code normally catches this first.
        ExecMainCode::Exited => Classification::failed(FailureReason::NonZeroExit(status), false),
        ExecMainCode::Killed => Classification::failed(FailureReason::KilledBySignal(status), true),
        code => Classification::failed(FailureReason::UnhandledCode(code.raw()), false),
    }
}
