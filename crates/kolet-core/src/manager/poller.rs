//! Unit-list polling that turns snapshots into change batches

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ChangeBatch, Delivery, UnitChange, UnitStatus};
use crate::error::KoletError;

/// Source of unit-list snapshots.
pub trait UnitLister: Send + Sync + 'static {
    fn list_units(&self) -> impl Future<Output = Result<Vec<UnitStatus>, KoletError>> + Send;
}

/// Compare a fresh snapshot against `known`, update `known`, and return the
/// units that are new, changed, or gone, sorted by name.
pub fn diff_snapshots(
    known: &mut BTreeMap<String, UnitStatus>,
    units: Vec<UnitStatus>,
) -> ChangeBatch {
    let mut current: BTreeMap<String, UnitStatus> = units
        .into_iter()
        .map(|status| (status.name.clone(), status))
        .collect();

    let mut batch: ChangeBatch = current
        .values()
        .filter(|status| known.get(&status.name) != Some(*status))
        .cloned()
        .map(UnitChange::with_status)
        .collect();

    batch.extend(
        known
            .keys()
            .filter(|name| !current.contains_key(*name))
            .map(|name| UnitChange::removed(name)),
    );
    batch.sort_by(|a, b| a.name.cmp(&b.name));

    std::mem::swap(known, &mut current);
    batch
}

/// Poll until cancelled, the receiver goes away, or listing fails.
///
/// The first poll reports every listed unit. A listing error is delivered
/// after every batch sent before it, and ends the loop.
pub(super) async fn poll_units<L: UnitLister>(
    lister: L,
    interval: Duration,
    deliveries: mpsc::Sender<Delivery>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut known = BTreeMap::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let listed = tokio::select! {
            _ = cancel.cancelled() => return,
            listed = lister.list_units() => listed,
        };

        match listed {
            Ok(units) => {
                let batch = diff_snapshots(&mut known, units);
                if batch.is_empty() {
                    continue;
                }
                debug!("{} unit(s) changed", batch.len());
                if deliveries.send(Ok(batch)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = deliveries.send(Err(e)).await;
                return;
            }
        }
    }
}
