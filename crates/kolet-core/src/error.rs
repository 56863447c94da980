//! Error types for kolet operations

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::unit::FailureReason;

/// Exit status for malformed invocations (unknown test, missing argument).
pub const EXIT_USAGE: i32 = 2;

/// Exit status for every other failure.
pub const EXIT_FAILURE: i32 = 1;

/// Errors produced by the agent
#[derive(Debug, Error)]
pub enum KoletError {
    /// Malformed invocation
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No native function registered under this test/function pair
    #[error("no native function '{func}' registered for test '{test}'")]
    NativeNotFound { test: String, func: String },

    /// A native test function returned an error
    #[error("native function {test}.{func} failed: {source}")]
    Native {
        test: String,
        func: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Talking to the service manager failed
    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: zbus::Error,
    },

    /// The unit-change poller reported a failure
    #[error("unit subscription error: {0}")]
    Poll(String),

    /// The unit-change stream ended without an outcome
    #[error("unit subscription closed unexpectedly")]
    SubscriptionClosed,

    /// The monitored unit reached a failing state
    #[error("unit {unit} failed: {reason}")]
    UnitFailed {
        unit: String,
        reason: FailureReason,
        /// Whether the unit finished its lifecycle despite failing
        terminal: bool,
    },

    /// Reading or writing agent state on disk failed
    #[error("I/O error on {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The synchronization unit could not be run
    #[error("starting {unit}: {detail}")]
    SyncUnit { unit: String, detail: String },

    /// A configured deadline expired before the unit finished
    #[error("timed out after {after:?} waiting for unit {unit}")]
    Timeout { unit: String, after: Duration },

    /// Configuration could not be loaded
    #[error("configuration error in {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// The reboot record could not be encoded
    #[error("serializing reboot record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl KoletError {
    /// Wrap a D-Bus error with a short description of the failed call.
    pub fn transport(context: impl Into<String>, source: zbus::Error) -> Self {
        Self::Transport {
            context: context.into(),
            source,
        }
    }

    /// Wrap an I/O error with the path it happened on.
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a usage error rather than a runtime failure.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::NativeNotFound { .. })
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        if self.is_usage() {
            EXIT_USAGE
        } else {
            EXIT_FAILURE
        }
    }
}
