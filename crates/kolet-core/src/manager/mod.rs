//! Service-manager capability used by the monitor and the reboot handshake
//!
//! [`UnitManager`] is the seam between the protocol logic and the host's
//! service manager. [`SystemdManager`] talks to systemd over the system bus;
//! `MockUnitManager` (feature `test-support`) scripts observations and
//! change batches for tests.
//!
//! Unit changes arrive as [`ChangeBatch`]es on a [`UnitSubscription`].
//! Batches and errors share one channel, so they are seen in the order the
//! poller produced them.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::KoletError;
use crate::unit::UnitObservation;

#[cfg(any(test, feature = "test-support"))]
mod mock;
mod poller;
mod systemd;

#[cfg(any(test, feature = "test-support"))]
pub use mock::{MockCall, MockFeed, MockUnitManager};
pub use poller::{diff_snapshots, UnitLister};
pub use systemd::SystemdManager;

/// One row of the manager's unit list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStatus {
    pub name: String,
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
}

impl UnitStatus {
    pub fn new(name: &str, load_state: &str, active_state: &str, sub_state: &str) -> Self {
        Self {
            name: name.to_string(),
            load_state: load_state.to_string(),
            active_state: active_state.to_string(),
            sub_state: sub_state.to_string(),
        }
    }

    /// Whether the unit is starting or running.
    pub fn is_started(&self) -> bool {
        matches!(self.active_state.as_str(), "active" | "activating")
    }
}

/// A unit whose status changed between two polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitChange {
    pub name: String,
    /// New status, or `None` if the unit disappeared
    pub status: Option<UnitStatus>,
}

impl UnitChange {
    /// A change reporting the unit as running.
    pub fn started(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: Some(UnitStatus::new(name, "loaded", "active", "running")),
        }
    }

    /// A change with an explicit status.
    pub fn with_status(status: UnitStatus) -> Self {
        Self {
            name: status.name.clone(),
            status: Some(status),
        }
    }

    /// A change reporting the unit as gone.
    pub fn removed(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: None,
        }
    }
}

/// Units that changed since the previous delivery, sorted by name.
pub type ChangeBatch = Vec<UnitChange>;

/// What a subscription produced next.
#[derive(Debug)]
pub enum SubscriptionEvent {
    Changes(ChangeBatch),
    Error(KoletError),
    /// The change stream ended
    Closed,
}

/// One delivery on a subscription: a batch, or the error that ended it.
pub type Delivery = Result<ChangeBatch, KoletError>;

/// Live stream of unit changes.
///
/// Owned by exactly one monitoring session. Hand it back through
/// [`UnitManager::unsubscribe`] when done; dropping it also stops the
/// background poller.
#[derive(Debug)]
pub struct UnitSubscription {
    deliveries: mpsc::Receiver<Delivery>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl UnitSubscription {
    /// Build a subscription from a raw channel, with no background task.
    pub fn from_channel(deliveries: mpsc::Receiver<Delivery>) -> Self {
        Self {
            deliveries,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Start polling `lister` every `interval` and deliver changed units.
    pub fn spawn_poller<L: UnitLister>(lister: L, interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(poller::poll_units(lister, interval, tx, cancel.clone()));
        Self {
            deliveries: rx,
            cancel,
            task: Some(task),
        }
    }

    /// Token cancelled once the subscription is released.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the next batch or error, in delivery order.
    ///
    /// Cancel-safe: dropping the future loses nothing.
    pub async fn next_event(&mut self) -> SubscriptionEvent {
        match self.deliveries.recv().await {
            Some(Ok(batch)) => SubscriptionEvent::Changes(batch),
            Some(Err(err)) => SubscriptionEvent::Error(err),
            None => SubscriptionEvent::Closed,
        }
    }

    /// Stop the poller and wait for it to exit.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for UnitSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Async interface to the host's service manager.
///
/// Uses RPITIT with explicit Send bounds so implementations can be plain
/// `async fn`s.
pub trait UnitManager: Send + Sync {
    /// Queue a start job for `unit` (mode `fail`).
    fn start_unit(&self, unit: &str) -> impl Future<Output = Result<(), KoletError>> + Send;

    /// Read the properties that decide the unit's outcome.
    fn observe(
        &self,
        unit: &str,
    ) -> impl Future<Output = Result<UnitObservation, KoletError>> + Send;

    /// Register for unit changes, delivered every `interval`.
    fn subscribe(
        &self,
        interval: Duration,
    ) -> impl Future<Output = Result<UnitSubscription, KoletError>> + Send;

    /// Release a subscription obtained from [`UnitManager::subscribe`].
    fn unsubscribe(
        &self,
        subscription: UnitSubscription,
    ) -> impl Future<Output = Result<(), KoletError>> + Send;

    /// Run `command` as the transient unit `unit` and wait until it stops.
    fn run_transient_and_wait(
        &self,
        unit: &str,
        command: &[String],
    ) -> impl Future<Output = Result<(), KoletError>> + Send;
}
