//! Scripted unit manager for testing

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{ChangeBatch, Delivery, UnitManager, UnitSubscription};
use crate::error::KoletError;
use crate::unit::UnitObservation;

/// Record of manager calls for test assertions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    StartUnit(String),
    Observe(String),
    Subscribe,
    Unsubscribe,
    RunTransient { unit: String, command: Vec<String> },
}

type TransientHook = Box<dyn Fn(&str, &[String]) -> Result<(), KoletError> + Send + Sync>;

/// Test-side handle that pushes change batches and errors, in order, into
/// the subscription handed out by [`MockUnitManager::subscribe`].
///
/// Dropping it (or calling [`MockFeed::close`]) ends the change stream.
#[derive(Debug)]
pub struct MockFeed {
    deliveries: mpsc::Sender<Delivery>,
}

impl MockFeed {
    /// Queue a change batch.
    pub async fn batch(&self, batch: ChangeBatch) {
        let _ = self.deliveries.send(Ok(batch)).await;
    }

    /// Queue a subscription error.
    pub async fn error(&self, err: KoletError) {
        let _ = self.deliveries.send(Err(err)).await;
    }

    /// End the change stream.
    pub fn close(self) {}
}

/// Mock unit manager. Returns scripted observations.
///
/// Each unit has a queue of observations; `observe` pops from it and keeps
/// returning the last one once the queue is down to a single entry. Units
/// with no script observe as freshly loaded and inactive.
pub struct MockUnitManager {
    observations: Mutex<HashMap<String, VecDeque<UnitObservation>>>,
    deliveries: Mutex<Option<mpsc::Receiver<Delivery>>>,
    subscription_token: Mutex<Option<CancellationToken>>,
    start_error: Option<String>,
    observe_error: Option<String>,
    transient_hook: Option<TransientHook>,
    /// Track calls for verification
    pub call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl MockUnitManager {
    /// Create a mock manager and the feed for its subscription.
    pub fn new() -> (Self, MockFeed) {
        let (tx, rx) = mpsc::channel(64);
        let manager = Self {
            observations: Mutex::new(HashMap::new()),
            deliveries: Mutex::new(Some(rx)),
            subscription_token: Mutex::new(None),
            start_error: None,
            observe_error: None,
            transient_hook: None,
            call_log: Arc::new(Mutex::new(Vec::new())),
        };
        let feed = MockFeed { deliveries: tx };
        (manager, feed)
    }

    /// Script the observations `unit` reports, in order.
    pub fn with_observations(
        self,
        unit: &str,
        observations: impl IntoIterator<Item = UnitObservation>,
    ) -> Self {
        self.observations
            .lock()
            .unwrap()
            .insert(unit.to_string(), observations.into_iter().collect());
        self
    }

    /// Make `start_unit` fail with a transport error.
    pub fn with_start_error(mut self, message: &str) -> Self {
        self.start_error = Some(message.to_string());
        self
    }

    /// Make `observe` fail with a transport error.
    pub fn with_observe_error(mut self, message: &str) -> Self {
        self.observe_error = Some(message.to_string());
        self
    }

    /// Run `hook` in place of the transient unit.
    pub fn with_transient_hook(
        mut self,
        hook: impl Fn(&str, &[String]) -> Result<(), KoletError> + Send + Sync + 'static,
    ) -> Self {
        self.transient_hook = Some(Box::new(hook));
        self
    }

    /// Get a copy of the call log for assertions
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Units passed to `start_unit`, in call order.
    pub fn started_units(&self) -> Vec<String> {
        self.get_calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::StartUnit(unit) => Some(unit),
                _ => None,
            })
            .collect()
    }

    /// Whether the subscription handed out was explicitly released.
    pub fn unsubscribed(&self) -> bool {
        self.get_calls().contains(&MockCall::Unsubscribe)
    }

    /// Whether the subscription handed out has been released or dropped.
    pub fn subscription_released(&self) -> bool {
        self.subscription_token
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    fn log_call(&self, call: MockCall) {
        self.call_log.lock().unwrap().push(call);
    }
}

fn mock_transport(context: &str, message: &str) -> KoletError {
    KoletError::transport(context, zbus::Error::Failure(message.to_string()))
}

impl UnitManager for MockUnitManager {
    async fn start_unit(&self, unit: &str) -> Result<(), KoletError> {
        self.log_call(MockCall::StartUnit(unit.to_string()));
        match &self.start_error {
            Some(message) => Err(mock_transport(&format!("starting {unit}"), message)),
            None => Ok(()),
        }
    }

    async fn observe(&self, unit: &str) -> Result<UnitObservation, KoletError> {
        self.log_call(MockCall::Observe(unit.to_string()));
        if let Some(message) = &self.observe_error {
            return Err(mock_transport(&format!("reading properties of {unit}"), message));
        }

        let mut observations = self.observations.lock().unwrap();
        let obs = match observations.get_mut(unit) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(obs.unwrap_or_else(UnitObservation::inactive))
    }

    async fn subscribe(&self, _interval: Duration) -> Result<UnitSubscription, KoletError> {
        self.log_call(MockCall::Subscribe);
        let deliveries = self
            .deliveries
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| mock_transport("subscribing", "already subscribed"))?;
        let subscription = UnitSubscription::from_channel(deliveries);
        *self.subscription_token.lock().unwrap() = Some(subscription.cancel_token());
        Ok(subscription)
    }

    async fn unsubscribe(&self, subscription: UnitSubscription) -> Result<(), KoletError> {
        self.log_call(MockCall::Unsubscribe);
        subscription.close().await;
        Ok(())
    }

    async fn run_transient_and_wait(&self, unit: &str, command: &[String]) -> Result<(), KoletError> {
        self.log_call(MockCall::RunTransient {
            unit: unit.to_string(),
            command: command.to_vec(),
        });
        match &self.transient_hook {
            Some(hook) => hook(unit, command),
            None => Ok(()),
        }
    }
}
