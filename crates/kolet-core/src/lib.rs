//! Core library for kolet, the on-target agent of the kola test harness.
//!
//! kolet runs on the machine under test. It executes native test functions,
//! runs external test units to completion, and implements the reboot
//! handshake that lets a test hand a small "mark" across a reboot:
//!
//! - [`unit`]: unit property snapshots and the pure outcome classifier
//! - [`manager`]: the service-manager capability ([`UnitManager`]) with a
//!   systemd D-Bus backend and the changed-unit subscription
//! - [`monitor`]: the reboot-aware monitoring loop behind `run-test-unit`
//! - [`reboot`]: mark persistence, the reboot request, the reboot record
//! - [`native`]: the native test function registry behind `run`

pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod monitor;
pub mod native;
pub mod reboot;
pub mod scripts;
pub mod unit;

pub use config::AgentConfig;
pub use error::KoletError;
pub use manager::{ChangeBatch, UnitManager, UnitSubscription};
pub use monitor::{run_ext_unit, Completion};
pub use reboot::{request_reboot, MarkStore, RebootRecord};
pub use unit::{classify, Classification, UnitObservation, Verdict};
