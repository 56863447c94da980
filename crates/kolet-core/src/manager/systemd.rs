//! systemd backend for [`UnitManager`] over the system D-Bus

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;
use zbus::proxy::CacheProperties;
use zbus::zvariant::OwnedObjectPath;
use zbus::Connection;

use super::{UnitLister, UnitManager, UnitStatus, UnitSubscription};
use crate::error::KoletError;
use crate::unit::UnitObservation;

/// One entry of `ListUnits`: name, description, load state, active state,
/// substate, followed unit, object path, job id, job type, job path.
type ListedUnit = (
    String,
    String,
    String,
    String,
    String,
    String,
    OwnedObjectPath,
    u32,
    String,
    OwnedObjectPath,
);

#[zbus::proxy(
    interface = "org.freedesktop.systemd1.Manager",
    default_service = "org.freedesktop.systemd1",
    default_path = "/org/freedesktop/systemd1",
    gen_blocking = false
)]
trait Manager {
    fn start_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    fn load_unit(&self, name: &str) -> zbus::Result<OwnedObjectPath>;

    fn subscribe(&self) -> zbus::Result<()>;

    fn unsubscribe(&self) -> zbus::Result<()>;

    fn list_units(&self) -> zbus::Result<Vec<ListedUnit>>;
}

#[zbus::proxy(
    interface = "org.freedesktop.systemd1.Unit",
    default_service = "org.freedesktop.systemd1",
    gen_blocking = false
)]
trait Unit {
    #[zbus(property)]
    fn active_state(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn sub_state(&self) -> zbus::Result<String>;
}

#[zbus::proxy(
    interface = "org.freedesktop.systemd1.Service",
    default_service = "org.freedesktop.systemd1",
    gen_blocking = false
)]
trait Service {
    #[zbus(property)]
    fn result(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn exec_main_code(&self) -> zbus::Result<i32>;

    #[zbus(property)]
    fn exec_main_status(&self) -> zbus::Result<i32>;
}

/// Service manager backed by systemd on the system bus.
#[derive(Debug, Clone)]
pub struct SystemdManager {
    conn: Connection,
}

impl SystemdManager {
    /// Connect to the system bus.
    pub async fn connect_system() -> Result<Self, KoletError> {
        let conn = Connection::system()
            .await
            .map_err(|e| KoletError::transport("connecting to the system bus", e))?;
        Ok(Self { conn })
    }

    async fn manager(&self) -> Result<ManagerProxy<'static>, KoletError> {
        self.proxy()
            .await
            .map_err(|e| KoletError::transport("creating systemd manager proxy", e))
    }

    async fn proxy(&self) -> zbus::Result<ManagerProxy<'static>> {
        ManagerProxy::new(&self.conn).await
    }

    async fn read_observation(&self, unit: &str) -> zbus::Result<UnitObservation> {
        let path = self.proxy().await?.load_unit(unit).await?;

        // Properties must be fresh on every observation.
        let unit_proxy = UnitProxy::builder(&self.conn)
            .path(path.as_str())?
            .cache_properties(CacheProperties::No)
            .build()
            .await?;
        let service_proxy = ServiceProxy::builder(&self.conn)
            .path(path.as_str())?
            .cache_properties(CacheProperties::No)
            .build()
            .await?;

        let active_state = unit_proxy.active_state().await?;
        let sub_state = unit_proxy.sub_state().await?;
        let result = service_proxy.result().await?;
        let exec_main_code = service_proxy.exec_main_code().await?;
        let exec_main_status = service_proxy.exec_main_status().await?;

        Ok(UnitObservation::from_raw(
            &active_state,
            &sub_state,
            &result,
            exec_main_code,
            exec_main_status,
        ))
    }
}

impl UnitManager for SystemdManager {
    async fn start_unit(&self, unit: &str) -> Result<(), KoletError> {
        let job = self
            .manager()
            .await?
            .start_unit(unit, "fail")
            .await
            .map_err(|e| KoletError::transport(format!("starting {unit}"), e))?;
        debug!("queued start job {} for {unit}", job.as_str());
        Ok(())
    }

    async fn observe(&self, unit: &str) -> Result<UnitObservation, KoletError> {
        let obs = self
            .read_observation(unit)
            .await
            .map_err(|e| KoletError::transport(format!("reading properties of {unit}"), e))?;
        debug!("{unit}: {obs}");
        Ok(obs)
    }

    async fn subscribe(&self, interval: Duration) -> Result<UnitSubscription, KoletError> {
        self.manager()
            .await?
            .subscribe()
            .await
            .map_err(|e| KoletError::transport("subscribing to systemd", e))?;
        let lister = SystemdLister {
            conn: self.conn.clone(),
        };
        Ok(UnitSubscription::spawn_poller(lister, interval))
    }

    async fn unsubscribe(&self, subscription: UnitSubscription) -> Result<(), KoletError> {
        subscription.close().await;
        self.manager()
            .await?
            .unsubscribe()
            .await
            .map_err(|e| KoletError::transport("unsubscribing from systemd", e))
    }

    async fn run_transient_and_wait(&self, unit: &str, command: &[String]) -> Result<(), KoletError> {
        let args = systemd_run_args(unit, command);
        debug!("systemd-run {}", args.join(" "));

        let output = Command::new("systemd-run")
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| KoletError::SyncUnit {
                unit: unit.to_string(),
                detail: format!("failed to execute systemd-run: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KoletError::SyncUnit {
                unit: unit.to_string(),
                detail: format!("systemd-run {}: {}", output.status, stderr.trim()),
            });
        }
        Ok(())
    }
}

/// Arguments for running `command` as the transient unit `unit` and
/// blocking until it stops.
fn systemd_run_args(unit: &str, command: &[String]) -> Vec<String> {
    let mut args: Vec<String> = ["-q", "--wait", "--unit", unit, "--"]
        .into_iter()
        .map(str::to_string)
        .collect();
    args.extend(command.iter().cloned());
    args
}

/// Lists units through `ListUnits` for the change poller.
struct SystemdLister {
    conn: Connection,
}

impl UnitLister for SystemdLister {
    async fn list_units(&self) -> Result<Vec<UnitStatus>, KoletError> {
        let units = ManagerProxy::new(&self.conn)
            .await
            .map_err(|e| KoletError::transport("creating systemd manager proxy", e))?
            .list_units()
            .await
            .map_err(|e| KoletError::transport("listing units", e))?;

        Ok(units
            .into_iter()
            .map(|(name, _, load, active, sub, ..)| UnitStatus {
                name,
                load_state: load,
                active_state: active,
                sub_state: sub,
            })
            .collect())
    }
}
