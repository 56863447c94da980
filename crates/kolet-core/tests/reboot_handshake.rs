//! Reboot handshake across the public API
//!
//! One boot runs `request_reboot`; the monitoring side of the same machine
//! sees the sync unit start and acknowledges the mark the test wrote.

use std::sync::{Arc, Mutex};

use kolet_core::manager::{MockCall, MockUnitManager, UnitChange};
use kolet_core::{request_reboot, run_ext_unit, AgentConfig, Completion, RebootRecord};
use kolet_core::{KoletError, UnitObservation};
use tempfile::TempDir;

fn config(dir: &TempDir) -> AgentConfig {
    AgentConfig {
        mark_path: dir.path().join("kolet-reboot"),
        reboot_script_path: dir.path().join("autopkgtest-reboot"),
        reboot_prepare_script_path: dir.path().join("autopkgtest-reboot-prepare"),
        ..AgentConfig::default()
    }
}

fn running() -> UnitObservation {
    UnitObservation::from_raw("active", "running", "success", 0, 0)
}

#[tokio::test]
async fn requested_mark_reaches_the_monitor() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);

    let (requester, _feed) = MockUnitManager::new();
    request_reboot(&requester, &config, "-cycle 2-").await.unwrap();
    assert!(matches!(
        requester.get_calls().as_slice(),
        [MockCall::RunTransient { unit, .. }] if unit == &config.wait_unit
    ));

    let (monitor, feed) = MockUnitManager::new();
    let monitor = monitor.with_observations("test.service", [running()]);
    feed.batch(vec![UnitChange::started(&config.wait_unit)]).await;

    let done = run_ext_unit(&monitor, &config, "test").await.unwrap();
    assert_eq!(done, Completion::RebootDetected(RebootRecord::new("-cycle 2-")));
    assert!(monitor.unsubscribed());
}

#[tokio::test]
async fn mark_is_on_disk_before_the_sync_unit_runs() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let seen = Arc::new(Mutex::new(None));

    let mark_path = config.mark_path.clone();
    let seen_in_hook = Arc::clone(&seen);
    let (requester, _feed) = MockUnitManager::new();
    let requester = requester.with_transient_hook(move |_, _| {
        *seen_in_hook.lock().unwrap() = std::fs::read_to_string(&mark_path).ok();
        Ok(())
    });

    request_reboot(&requester, &config, "m").await.unwrap();
    assert_eq!(seen.lock().unwrap().as_deref(), Some("m"));
}

#[tokio::test]
async fn sync_unit_failure_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let (requester, _feed) = MockUnitManager::new();
    let requester = requester.with_transient_hook(|unit, _| {
        Err(KoletError::SyncUnit {
            unit: unit.to_string(),
            detail: "killed".to_string(),
        })
    });

    let err = request_reboot(&requester, &config, "m").await.unwrap_err();
    assert!(matches!(err, KoletError::SyncUnit { .. }));
    assert_eq!(err.exit_code(), 1);
}
