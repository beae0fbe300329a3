use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use infra_core::{DriverInfo, ErrorCode, InfraError, now_ms};
use infra_ipc::{DriverRegistrar, Session};
use tracing::{error, info, warn};

use crate::{classes::MachineClassCatalog, driver::RelayDriver};

type DriverMap = HashMap<String, DriverEntry>;

/// One registered driver connection.
struct DriverEntry {
    session: Arc<Session>,
    driver: RelayDriver,
    connected_at_ms: u64,
}

/// Connected drivers keyed by provider name.
///
/// A provider has at most one live session. A new registration replaces and
/// closes the old one; a session that terminates removes itself.
pub struct DriverRegistry {
    drivers: Arc<Mutex<DriverMap>>,
    classes: Arc<MachineClassCatalog>,
    call_timeout: Option<Duration>,
}

impl DriverRegistry {
    pub fn new(classes: Arc<MachineClassCatalog>, call_timeout: Option<Duration>) -> Self {
        Self {
            drivers: Arc::new(Mutex::new(HashMap::new())),
            classes,
            call_timeout,
        }
    }

    /// Returns the driver façade for `provider`.
    pub fn driver(&self, provider: &str) -> Result<RelayDriver, InfraError> {
        let drivers = lock_drivers(&self.drivers)?;
        match drivers.get(provider) {
            Some(entry) if !entry.session.is_closed() => Ok(entry.driver.clone()),
            _ => Err(
                InfraError::new(ErrorCode::NotFound, "no driver registered for provider")
                    .with_detail(format!("provider={provider}")),
            ),
        }
    }

    /// Snapshot of connected drivers ordered by provider name.
    pub fn list(&self) -> Result<Vec<DriverInfo>, InfraError> {
        let drivers = lock_drivers(&self.drivers)?;
        let mut infos: Vec<DriverInfo> = drivers
            .iter()
            .map(|(provider, entry)| DriverInfo {
                provider: provider.clone(),
                connected_at_ms: entry.connected_at_ms,
                outstanding: entry.session.outstanding() as u64,
            })
            .collect();
        infos.sort_by(|left, right| left.provider.cmp(&right.provider));
        Ok(infos)
    }

    /// Closes every session, failing their outstanding calls.
    pub fn close_all(&self) {
        match lock_drivers(&self.drivers) {
            Ok(drivers) => {
                for entry in drivers.values() {
                    entry.session.close();
                }
            }
            Err(err) => error!(error = %err, "failed to close driver sessions"),
        }
    }
}

impl DriverRegistrar for DriverRegistry {
    fn register(&self, session: Session) {
        let session = match self.call_timeout {
            Some(limit) => session.with_call_timeout(limit),
            None => session,
        }
        .spawn();
        let provider = session.provider().to_string();

        let entry = DriverEntry {
            session: Arc::clone(&session),
            driver: RelayDriver::new(session.clone(), Arc::clone(&self.classes)),
            connected_at_ms: now_ms(),
        };

        let replaced = match lock_drivers(&self.drivers) {
            Ok(mut drivers) => drivers.insert(provider.clone(), entry),
            Err(err) => {
                error!(provider = %provider, error = %err, "failed to record driver session");
                session.close();
                return;
            }
        };
        if let Some(previous) = replaced {
            warn!(provider = %provider, "replacing existing driver registration");
            previous.session.close();
        }
        info!(provider = %provider, "driver available");

        let drivers = Arc::clone(&self.drivers);
        tokio::spawn(async move {
            session.wait().await;
            let Ok(mut drivers) = lock_drivers(&drivers) else {
                return;
            };
            let current = drivers
                .get(&provider)
                .is_some_and(|entry| Arc::ptr_eq(&entry.session, &session));
            if current {
                drivers.remove(&provider);
                info!(provider = %provider, "driver unregistered");
            }
        });
    }
}

/// Acquires the driver map lock and converts poisoning to an infra error.
fn lock_drivers(drivers: &Mutex<DriverMap>) -> Result<MutexGuard<'_, DriverMap>, InfraError> {
    drivers
        .lock()
        .map_err(|_| InfraError::new(ErrorCode::Internal, "driver registry lock poisoned"))
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::DriverRegistry;
    use crate::classes::MachineClassCatalog;
    use infra_core::ErrorCode;
    use infra_ipc::{DriverRegistrar, Session};
    use tokio::{io::duplex, time::sleep};

    fn registry() -> DriverRegistry {
        DriverRegistry::new(Arc::new(MachineClassCatalog::default()), None)
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn registered_driver_is_listed_and_removed_on_disconnect() {
        let registry = registry();
        let (relay_side, driver_side) = duplex(4096);
        registry.register(Session::new("azure", relay_side));

        let drivers = registry.list().expect("list");
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].provider, "azure");
        assert_eq!(drivers[0].outstanding, 0);
        assert!(registry.driver("azure").is_ok());

        drop(driver_side);
        eventually(|| registry.list().expect("list").is_empty()).await;

        let err = registry.driver("azure").err().expect("driver should be gone");
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn newer_registration_replaces_older() {
        let registry = registry();
        let (first_relay, _first_driver) = duplex(4096);
        let (second_relay, _second_driver) = duplex(4096);

        registry.register(Session::new("azure", first_relay));
        registry.register(Session::new("azure", second_relay));

        // The replaced session closes, but must not evict its successor.
        sleep(Duration::from_millis(50)).await;
        let drivers = registry.list().expect("list");
        assert_eq!(drivers.len(), 1);
        assert!(registry.driver("azure").is_ok());
    }

    #[tokio::test]
    async fn close_all_empties_registry() {
        let registry = registry();
        let (aws_relay, _aws_driver) = duplex(4096);
        let (azure_relay, _azure_driver) = duplex(4096);
        registry.register(Session::new("aws", aws_relay));
        registry.register(Session::new("azure", azure_relay));

        let providers: Vec<String> = registry
            .list()
            .expect("list")
            .into_iter()
            .map(|info| info.provider)
            .collect();
        assert_eq!(providers, vec!["aws".to_string(), "azure".to_string()]);

        registry.close_all();
        eventually(|| registry.list().expect("list").is_empty()).await;
    }
}
