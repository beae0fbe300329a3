use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use infra_driver_proto::{
    CreateResponse, DeleteResponse, ERROR_OK, OperationParams, OperationResult, OperationType,
};
use infra_ipc::{DriverEndpoint, IpcError, OperationHandler};
use infra_provider::{DataDisk, DataDiskSpec, ProviderAdapter, ProviderError, VolumeSpec};
use infra_provider_azure::AzureAdapter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Driver error code for requests missing a machine name.
pub const ERROR_INVALID_PARAMS: i32 = 3;
/// Driver error code when internal state is unusable.
pub const ERROR_INTERNAL: i32 = 4;

/// Disks and volumes every machine created by this driver gets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineLayout {
    #[serde(default)]
    pub data_disks: Vec<DataDiskSpec>,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
}

impl MachineLayout {
    pub fn load(path: &Path) -> Result<Self, DriverError> {
        let bytes = fs::read(path)
            .map_err(|err| DriverError::Layout(format!("{}: {err}", path.display())))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| DriverError::Layout(format!("{}: {err}", path.display())))
    }
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub provider: String,
    pub resource_group: String,
    pub layout: MachineLayout,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Ipc(#[from] IpcError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("invalid machine layout: {0}")]
    Layout(String),
}

/// Picks the translation adapter for a provider name.
pub fn select_adapter(
    provider: &str,
    resource_group: &str,
) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
    match provider {
        infra_provider_azure::PROVIDER_NAME => Ok(Arc::new(AzureAdapter::new(resource_group))),
        other => Err(ProviderError::Unsupported(other.to_string())),
    }
}

/// What the driver remembers about a machine it created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineRecord {
    pub provider_id: String,
    pub class_revision: i64,
    pub data_disks: Vec<DataDisk>,
}

/// In-memory driver: answers create/delete by recording machines locally.
pub struct LocalDriver {
    adapter: Arc<dyn ProviderAdapter>,
    layout: MachineLayout,
    machines: Mutex<HashMap<String, MachineRecord>>,
}

impl LocalDriver {
    pub fn new(adapter: Arc<dyn ProviderAdapter>, layout: MachineLayout) -> Self {
        Self {
            adapter,
            layout,
            machines: Mutex::new(HashMap::new()),
        }
    }

    pub fn machine(&self, name: &str) -> Option<MachineRecord> {
        self.machines_lock()
            .and_then(|machines| machines.get(name).cloned())
    }

    fn create(&self, params: OperationParams) -> CreateResponse {
        let name = params.machine_name;
        if name.is_empty() {
            return CreateResponse {
                provider_id: String::new(),
                node_name: String::new(),
                error: ERROR_INVALID_PARAMS,
            };
        }

        let Some(mut machines) = self.machines_lock() else {
            return CreateResponse {
                provider_id: String::new(),
                node_name: String::new(),
                error: ERROR_INTERNAL,
            };
        };

        if let Some(existing) = machines.get(&name) {
            debug!(machine = %name, "machine already exists");
            return CreateResponse {
                provider_id: existing.provider_id.clone(),
                node_name: name,
                error: ERROR_OK,
            };
        }

        let record = MachineRecord {
            provider_id: self.adapter.provider_id(&name),
            class_revision: params.machine_class_meta.revision,
            data_disks: self.adapter.data_disks(&name, &self.layout.data_disks),
        };
        info!(
            provider = self.adapter.name(),
            machine = %name,
            machine_class = %params.machine_class_meta.name,
            provider_id = %record.provider_id,
            data_disks = record.data_disks.len(),
            "machine created"
        );
        let provider_id = record.provider_id.clone();
        machines.insert(name.clone(), record);

        CreateResponse {
            provider_id,
            node_name: name,
            error: ERROR_OK,
        }
    }

    fn delete(&self, params: OperationParams) -> DeleteResponse {
        let name = params.machine_name;
        if name.is_empty() {
            return DeleteResponse {
                error: ERROR_INVALID_PARAMS,
            };
        }

        let Some(mut machines) = self.machines_lock() else {
            return DeleteResponse {
                error: ERROR_INTERNAL,
            };
        };
        if machines.remove(&name).is_none() {
            debug!(machine = %name, "machine already gone");
            return DeleteResponse { error: ERROR_OK };
        }
        drop(machines);

        match self.adapter.volume_names(&self.layout.volumes) {
            Ok(volumes) => {
                info!(provider = self.adapter.name(), machine = %name, ?volumes, "machine deleted");
                DeleteResponse { error: ERROR_OK }
            }
            Err(err) => {
                warn!(machine = %name, error = %err, "failed to resolve attached volumes");
                DeleteResponse {
                    error: ERROR_INTERNAL,
                }
            }
        }
    }

    fn machines_lock(&self) -> Option<MutexGuard<'_, HashMap<String, MachineRecord>>> {
        let guard = self.machines.lock();
        if guard.is_err() {
            warn!("machine table lock poisoned");
        }
        guard.ok()
    }
}

#[async_trait]
impl OperationHandler for LocalDriver {
    async fn handle(
        &self,
        operation_type: &OperationType,
        params: OperationParams,
    ) -> Option<OperationResult> {
        match operation_type {
            OperationType::Create => Some(OperationResult::Create(self.create(params))),
            OperationType::Delete => Some(OperationResult::Delete(self.delete(params))),
            OperationType::Other(name) => {
                warn!(operation = %name, "unsupported operation, answering without a result");
                None
            }
        }
    }
}

/// Registers with the relay and serves operations until it hangs up.
pub async fn run_driver(socket: &Path, config: DriverConfig) -> Result<(), DriverError> {
    let adapter = select_adapter(&config.provider, &config.resource_group)?;
    let endpoint = DriverEndpoint::connect(socket, &config.provider).await?;
    info!(provider = endpoint.provider(), socket = %socket.display(), "registered with relay");

    let driver = Arc::new(LocalDriver::new(adapter, config.layout));
    endpoint.serve(driver).await?;
    info!("relay closed the connection");
    Ok(())
}
