//! Reboot-aware monitoring of an external test unit
//!
//! [`run_ext_unit`] starts a service unit and waits for one of two things:
//! the unit reaching a decisive state, or the synchronization unit starting
//! (a test inside the unit asked for a reboot). Both are driven by the same
//! stream of changed-unit batches.
//!
//! Each step is reduced to an [`Outcome`] by [`decide`], which is where the
//! priority rule lives: a started synchronization unit wins over anything
//! the target unit reports in the same batch.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::KoletError;
use crate::manager::{SubscriptionEvent, UnitChange, UnitManager, UnitSubscription};
use crate::reboot::{MarkStore, RebootRecord};
use crate::scripts;
use crate::unit::{classify, service_unit_name, Classification, FailureReason, Verdict};

/// How a monitored unit run ended successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The unit's main process exited 0
    UnitSucceeded,
    /// A reboot was requested from inside the unit
    RebootDetected(RebootRecord),
}

/// What a change batch means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchEvent {
    /// The synchronization unit is starting or running
    RebootRequested,
    /// The target unit changed; observe it again
    TargetChanged,
    Unrelated,
}

/// Result of one monitoring step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    /// Pending, after starting the target unit again
    Restart,
    UnitSucceeded,
    UnitFailed {
        reason: FailureReason,
        terminal: bool,
    },
    RebootDetected,
}

impl From<&Classification> for Outcome {
    fn from(c: &Classification) -> Self {
        match &c.verdict {
            Verdict::Pending => Self::Pending,
            Verdict::StartRequired => Self::Restart,
            Verdict::Succeeded => Self::UnitSucceeded,
            Verdict::Failed(reason) => Self::UnitFailed {
                reason: reason.clone(),
                terminal: c.terminal,
            },
        }
    }
}

/// Classify a change batch against the target and synchronization units.
///
/// The synchronization unit only counts once it is reported as started;
/// its removal or deactivation in a later batch is not a reboot request.
pub fn route_batch(batch: &[UnitChange], target: &str, sync_unit: &str) -> BatchEvent {
    let reboot = batch.iter().any(|change| {
        change.name == sync_unit && change.status.as_ref().is_some_and(|s| s.is_started())
    });
    if reboot {
        BatchEvent::RebootRequested
    } else if batch.iter().any(|change| change.name == target) {
        BatchEvent::TargetChanged
    } else {
        BatchEvent::Unrelated
    }
}

/// Combine a batch event with the target's classification, if one was taken.
pub fn decide(event: BatchEvent, target: Option<&Classification>) -> Outcome {
    match event {
        BatchEvent::RebootRequested => Outcome::RebootDetected,
        BatchEvent::TargetChanged => target.map(Outcome::from).unwrap_or(Outcome::Pending),
        BatchEvent::Unrelated => Outcome::Pending,
    }
}

/// One `run-test-unit` invocation: the target unit plus the subscription
/// that watches it.
///
/// Always finish with [`MonitoredUnitSession::close`].
pub struct MonitoredUnitSession<'a, M: UnitManager> {
    manager: &'a M,
    unit: String,
    sync_unit: String,
    marks: MarkStore,
    timeout: Option<Duration>,
    subscription: UnitSubscription,
}

impl<'a, M: UnitManager> MonitoredUnitSession<'a, M> {
    /// Start `unit` and subscribe to unit changes.
    pub async fn open(manager: &'a M, config: &AgentConfig, unit: String) -> Result<Self, KoletError> {
        manager.start_unit(&unit).await?;
        let subscription = manager.subscribe(config.poll_interval()).await?;
        Ok(Self {
            manager,
            unit,
            sync_unit: config.wait_unit.clone(),
            marks: MarkStore::new(&config.mark_path),
            timeout: config.unit_timeout(),
            subscription,
        })
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Wait for the unit to finish or a reboot request to appear.
    pub async fn wait(&mut self) -> Result<Completion, KoletError> {
        let deadline = self.timeout.map(|after| (Instant::now() + after, after));

        let initial = self.observe_target().await?;
        if let Some(done) = self.apply(decide(BatchEvent::TargetChanged, Some(&initial))).await? {
            return Ok(done);
        }

        loop {
            let event = match deadline {
                Some((at, after)) => {
                    match tokio::time::timeout_at(at, self.subscription.next_event()).await {
                        Ok(event) => event,
                        Err(_) => {
                            return Err(KoletError::Timeout {
                                unit: self.unit.clone(),
                                after,
                            });
                        }
                    }
                }
                None => self.subscription.next_event().await,
            };

            let batch = match event {
                SubscriptionEvent::Changes(batch) => batch,
                SubscriptionEvent::Error(e) => return Err(e),
                SubscriptionEvent::Closed => return Err(KoletError::SubscriptionClosed),
            };

            let outcome = match route_batch(&batch, &self.unit, &self.sync_unit) {
                BatchEvent::Unrelated => continue,
                event @ BatchEvent::RebootRequested => decide(event, None),
                event @ BatchEvent::TargetChanged => {
                    let c = self.observe_target().await?;
                    decide(event, Some(&c))
                }
            };

            if let Some(done) = self.apply(outcome).await? {
                return Ok(done);
            }
        }
    }

    /// Release the subscription.
    pub async fn close(self) -> Result<(), KoletError> {
        self.manager.unsubscribe(self.subscription).await
    }

    async fn observe_target(&self) -> Result<Classification, KoletError> {
        let obs = self.manager.observe(&self.unit).await?;
        let c = classify(&obs);
        debug!("{}: {obs} => {:?}", self.unit, c.verdict);
        Ok(c)
    }

    async fn apply(&self, outcome: Outcome) -> Result<Option<Completion>, KoletError> {
        match outcome {
            Outcome::Pending => Ok(None),
            Outcome::Restart => {
                debug!("{} is inactive, starting it again", self.unit);
                self.manager.start_unit(&self.unit).await?;
                Ok(None)
            }
            Outcome::UnitSucceeded => Ok(Some(Completion::UnitSucceeded)),
            Outcome::UnitFailed { reason, terminal } => {
                if let FailureReason::UnhandledCode(code) = &reason {
                    warn!("{}: unhandled ExecMainCode {code}", self.unit);
                }
                Err(KoletError::UnitFailed {
                    unit: self.unit.clone(),
                    reason,
                    terminal,
                })
            }
            Outcome::RebootDetected => {
                let record = RebootRecord::new(self.marks.read()?);
                info!(
                    "Acknowledged reboot request with mark: {}",
                    record.to_json_line()?
                );
                Ok(Some(Completion::RebootDetected(record)))
            }
        }
    }
}

/// Run `unit` to completion, watching for a reboot request on the way.
///
/// The subscription is released on every return path. A failure to release
/// it is logged and does not mask the run's own result.
pub async fn run_ext_unit<M: UnitManager>(
    manager: &M,
    config: &AgentConfig,
    unit: &str,
) -> Result<Completion, KoletError> {
    let unit = service_unit_name(unit)?;
    scripts::install(config)?;

    let mut session = MonitoredUnitSession::open(manager, config, unit).await?;
    let result = session.wait().await;
    let unit = session.unit().to_string();
    if let Err(e) = session.close().await {
        warn!("releasing subscription for {unit}: {e}");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{MockCall, MockFeed, MockUnitManager, UnitStatus};
    use crate::unit::UnitObservation;
    use tempfile::TempDir;

    const SYNC: &str = "kola-runext-reboot-wait.service";

    fn config(dir: &TempDir) -> AgentConfig {
        AgentConfig {
            mark_path: dir.path().join("kolet-reboot"),
            reboot_script_path: dir.path().join("autopkgtest-reboot"),
            reboot_prepare_script_path: dir.path().join("autopkgtest-reboot-prepare"),
            ..AgentConfig::default()
        }
    }

    fn obs(state: &str, sub: &str, result: &str, code: i32, status: i32) -> UnitObservation {
        UnitObservation::from_raw(state, sub, result, code, status)
    }

    fn running() -> UnitObservation {
        obs("active", "running", "success", 0, 0)
    }

    fn exited_ok() -> UnitObservation {
        obs("active", "exited", "success", 1, 0)
    }

    fn changed(name: &str) -> Vec<UnitChange> {
        vec![UnitChange::started(name)]
    }

    #[test]
    fn sync_unit_wins_over_target_in_the_same_batch() {
        let batch = vec![UnitChange::started("t.service"), UnitChange::started(SYNC)];
        let event = route_batch(&batch, "t.service", SYNC);
        assert_eq!(event, BatchEvent::RebootRequested);

        let terminal = classify(&exited_ok());
        assert_eq!(decide(event, Some(&terminal)), Outcome::RebootDetected);
    }

    #[test]
    fn stopped_sync_unit_is_not_a_request() {
        let batch = vec![
            UnitChange::with_status(UnitStatus::new(SYNC, "loaded", "inactive", "dead")),
            UnitChange::removed(SYNC),
        ];
        assert_eq!(route_batch(&batch, "t.service", SYNC), BatchEvent::Unrelated);
    }

    #[test]
    fn routes_target_and_unrelated_batches() {
        assert_eq!(
            route_batch(&changed("t.service"), "t.service", SYNC),
            BatchEvent::TargetChanged
        );
        assert_eq!(
            route_batch(&[UnitChange::removed("t.service")], "t.service", SYNC),
            BatchEvent::TargetChanged
        );
        assert_eq!(
            route_batch(&changed("other.service"), "t.service", SYNC),
            BatchEvent::Unrelated
        );
        assert_eq!(decide(BatchEvent::Unrelated, None), Outcome::Pending);
    }

    #[test]
    fn outcome_follows_classification() {
        assert_eq!(
            decide(BatchEvent::TargetChanged, Some(&classify(&UnitObservation::inactive()))),
            Outcome::Restart
        );
        assert_eq!(
            decide(BatchEvent::TargetChanged, Some(&classify(&exited_ok()))),
            Outcome::UnitSucceeded
        );
        assert_eq!(
            decide(
                BatchEvent::TargetChanged,
                Some(&classify(&obs("active", "exited", "signal", 2, 9)))
            ),
            Outcome::UnitFailed {
                reason: FailureReason::KilledBySignal(9),
                terminal: true
            }
        );
    }

    async fn feed_all(feed: &MockFeed, batches: Vec<Vec<UnitChange>>) {
        for batch in batches {
            feed.batch(batch).await;
        }
    }

    #[tokio::test]
    async fn foo_runs_to_success() {
        let dir = TempDir::new().unwrap();
        let (mock, feed) = MockUnitManager::new();
        let mock = mock.with_observations(
            "foo.service",
            [
                UnitObservation::inactive(),
                obs("activating", "start", "success", 0, 0),
                running(),
                exited_ok(),
            ],
        );
        feed_all(
            &feed,
            vec![
                changed("foo.service"),
                changed("unrelated.service"),
                changed("foo.service"),
                changed("foo.service"),
            ],
        )
        .await;

        let done = run_ext_unit(&mock, &config(&dir), "foo").await.unwrap();
        assert_eq!(done, Completion::UnitSucceeded);
        assert_eq!(mock.started_units(), ["foo.service", "foo.service"]);
        assert!(mock.unsubscribed());
        assert!(mock.subscription_released());
    }

    #[tokio::test]
    async fn bar_fails_with_exit_code() {
        let dir = TempDir::new().unwrap();
        let (mock, _feed) = MockUnitManager::new();
        let mock =
            mock.with_observations("bar.service", [obs("active", "exited", "exit-code", 1, 1)]);

        let err = run_ext_unit(&mock, &config(&dir), "bar.service")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exit-code"), "{err}");
        assert!(matches!(
            err,
            KoletError::UnitFailed {
                reason: FailureReason::ExitCode(1),
                terminal: false,
                ..
            }
        ));
        assert_eq!(err.exit_code(), 1);
        assert!(mock.unsubscribed());
    }

    #[tokio::test]
    async fn baz_reports_reboot_with_mark() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        MarkStore::new(&config.mark_path).write("cycle-1").unwrap();

        let (mock, feed) = MockUnitManager::new();
        let mock = mock.with_observations("baz.service", [running()]);
        feed_all(&feed, vec![changed("baz.service"), changed(SYNC)]).await;

        let done = run_ext_unit(&mock, &config, "baz").await.unwrap();
        let Completion::RebootDetected(record) = done else {
            panic!("expected reboot, got {done:?}");
        };
        assert_eq!(record.to_json_line().unwrap(), r#"{"reboot":"cycle-1"}"#);
        assert!(mock.unsubscribed());
    }

    #[tokio::test]
    async fn reboot_wins_even_when_target_finishes_in_the_same_batch() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        MarkStore::new(&config.mark_path).write("m").unwrap();

        let (mock, feed) = MockUnitManager::new();
        let mock = mock.with_observations("t.service", [running(), exited_ok()]);
        feed.batch(vec![UnitChange::started(SYNC), UnitChange::started("t.service")])
            .await;

        let done = run_ext_unit(&mock, &config, "t").await.unwrap();
        assert_eq!(done, Completion::RebootDetected(RebootRecord::new("m")));
        // Only the initial observation; the batch never re-observes the target.
        let observes = mock
            .get_calls()
            .into_iter()
            .filter(|c| matches!(c, MockCall::Observe(_)))
            .count();
        assert_eq!(observes, 1);
    }

    #[tokio::test]
    async fn decisive_initial_observation_needs_no_events() {
        let dir = TempDir::new().unwrap();
        let (mock, feed) = MockUnitManager::new();
        let mock = mock.with_observations("t.service", [exited_ok()]);
        drop(feed);

        let done = run_ext_unit(&mock, &config(&dir), "t").await.unwrap();
        assert_eq!(done, Completion::UnitSucceeded);
    }

    #[tokio::test]
    async fn missing_mark_is_a_persistence_error() {
        let dir = TempDir::new().unwrap();
        let (mock, feed) = MockUnitManager::new();
        let mock = mock.with_observations("t.service", [running()]);
        feed.batch(changed(SYNC)).await;

        let err = run_ext_unit(&mock, &config(&dir), "t").await.unwrap_err();
        assert!(matches!(err, KoletError::Persistence { .. }));
        assert!(mock.unsubscribed());
    }

    #[tokio::test]
    async fn transport_error_is_propagated_and_subscription_released() {
        let dir = TempDir::new().unwrap();
        let (mock, feed) = MockUnitManager::new();
        let mock = mock.with_observations("t.service", [running()]);
        feed.error(KoletError::Poll("bus went away".to_string())).await;

        let err = run_ext_unit(&mock, &config(&dir), "t").await.unwrap_err();
        assert!(matches!(err, KoletError::Poll(_)));
        assert!(mock.unsubscribed());
        assert!(mock.subscription_released());
    }

    #[tokio::test]
    async fn reboot_batch_queued_before_an_error_is_still_reported() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        MarkStore::new(&config.mark_path).write("cycle-1").unwrap();

        let (mock, feed) = MockUnitManager::new();
        let mock = mock.with_observations("t.service", [running()]);
        feed.batch(changed(SYNC)).await;
        feed.error(KoletError::Poll("bus went away".to_string())).await;

        let done = run_ext_unit(&mock, &config, "t").await.unwrap();
        assert_eq!(done, Completion::RebootDetected(RebootRecord::new("cycle-1")));
        assert!(mock.unsubscribed());
    }

    #[tokio::test]
    async fn closed_stream_is_an_error() {
        let dir = TempDir::new().unwrap();
        let (mock, feed) = MockUnitManager::new();
        let mock = mock.with_observations("t.service", [running()]);
        feed.close();

        let err = run_ext_unit(&mock, &config(&dir), "t").await.unwrap_err();
        assert!(matches!(err, KoletError::SubscriptionClosed));
        assert!(mock.unsubscribed());
    }

    #[tokio::test]
    async fn observe_failure_releases_subscription() {
        let dir = TempDir::new().unwrap();
        let (mock, _feed) = MockUnitManager::new();
        let mock = mock.with_observe_error("no such object");

        let err = run_ext_unit(&mock, &config(&dir), "t").await.unwrap_err();
        assert!(matches!(err, KoletError::Transport { .. }));
        assert!(mock.unsubscribed());
    }

    #[tokio::test]
    async fn start_failure_never_subscribes() {
        let dir = TempDir::new().unwrap();
        let (mock, _feed) = MockUnitManager::new();
        let mock = mock.with_start_error("unit not found");

        let err = run_ext_unit(&mock, &config(&dir), "t").await.unwrap_err();
        assert!(matches!(err, KoletError::Transport { .. }));
        assert_eq!(
            mock.get_calls(),
            vec![MockCall::StartUnit("t.service".to_string())]
        );
    }

    #[tokio::test]
    async fn inactive_target_is_started_once_per_observation() {
        let dir = TempDir::new().unwrap();
        let (mock, feed) = MockUnitManager::new();
        let mock = mock.with_observations(
            "t.service",
            [
                UnitObservation::inactive(),
                UnitObservation::inactive(),
                exited_ok(),
            ],
        );
        feed_all(&feed, vec![changed("t.service"), changed("t.service")]).await;

        run_ext_unit(&mock, &config(&dir), "t").await.unwrap();
        assert_eq!(mock.started_units().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires_into_timeout() {
        let dir = TempDir::new().unwrap();
        let config = AgentConfig {
            unit_timeout_secs: Some(30),
            ..config(&dir)
        };
        let (mock, _feed) = MockUnitManager::new();
        let mock = mock.with_observations("t.service", [running()]);

        let err = run_ext_unit(&mock, &config, "t").await.unwrap_err();
        assert!(matches!(
            err,
            KoletError::Timeout { ref unit, after } if unit == "t.service" && after == Duration::from_secs(30)
        ));
        assert!(mock.unsubscribed());
    }

    #[tokio::test]
    async fn empty_unit_name_is_a_usage_error() {
        let dir = TempDir::new().unwrap();
        let (mock, _feed) = MockUnitManager::new();
        let err = run_ext_unit(&mock, &config(&dir), "").await.unwrap_err();
        assert!(err.is_usage());
        assert!(mock.get_calls().is_empty());
    }

    #[tokio::test]
    async fn helper_scripts_are_installed() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let (mock, _feed) = MockUnitManager::new();
        let mock = mock.with_observations("t.service", [exited_ok()]);

        run_ext_unit(&mock, &config, "t").await.unwrap();
        assert!(config.reboot_script_path.exists());
        assert!(config.reboot_prepare_script_path.exists());
    }
}
