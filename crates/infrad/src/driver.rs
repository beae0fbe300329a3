use std::sync::Arc;

use async_trait::async_trait;
use infra_core::MachineId;
use infra_driver_proto::{
    CreateResponse, ERROR_NO_RESPONSE, OperationParams, OperationResult, OperationType,
};
use infra_ipc::{IpcError, Session};
use tracing::{info, warn};

use crate::classes::MachineClassCatalog;

/// Request/response channel to one driver.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn send_and_wait(
        &self,
        operation_type: OperationType,
        params: OperationParams,
    ) -> Result<Option<OperationResult>, IpcError>;
}

#[async_trait]
impl Gateway for Session {
    async fn send_and_wait(
        &self,
        operation_type: OperationType,
        params: OperationParams,
    ) -> Result<Option<OperationResult>, IpcError> {
        Session::send_and_wait(self, operation_type, params).await
    }
}

/// Result of a create call as seen by the reconciliation side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOutcome {
    pub provider_id: String,
    pub node_name: String,
    pub error: i32,
}

impl CreateOutcome {
    fn no_response() -> Self {
        Self {
            provider_id: String::new(),
            node_name: String::new(),
            error: ERROR_NO_RESPONSE,
        }
    }
}

impl From<CreateResponse> for CreateOutcome {
    fn from(value: CreateResponse) -> Self {
        Self {
            provider_id: value.provider_id,
            node_name: value.node_name,
            error: value.error,
        }
    }
}

/// Machine lifecycle operations backed by an external driver.
///
/// Never fails: transport problems and missing answers surface as
/// [`ERROR_NO_RESPONSE`], provider failures as the driver's own code.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn create(
        &self,
        provider_name: &str,
        machine_class: &str,
        machine_id: &MachineId,
    ) -> CreateOutcome;

    async fn delete(&self, provider_name: &str, machine_class: &str, machine_id: &MachineId)
    -> i32;
}

/// [`Driver`] that forwards operations over a driver gateway.
#[derive(Clone)]
pub struct RelayDriver {
    gateway: Arc<dyn Gateway>,
    classes: Arc<MachineClassCatalog>,
}

impl RelayDriver {
    pub fn new(gateway: Arc<dyn Gateway>, classes: Arc<MachineClassCatalog>) -> Self {
        Self { gateway, classes }
    }

    fn params(
        &self,
        machine_class: &str,
        machine_id: &MachineId,
        with_user_data: bool,
    ) -> OperationParams {
        let (meta, class) = self.classes.resolve(machine_class);
        OperationParams {
            machine_class_meta: meta,
            cloud_config: class.cloud_config,
            user_data: if with_user_data {
                class.user_data
            } else {
                String::new()
            },
            machine_id: machine_id.0.clone(),
            machine_name: machine_id.0.clone(),
        }
    }
}

#[async_trait]
impl Driver for RelayDriver {
    async fn create(
        &self,
        provider_name: &str,
        machine_class: &str,
        machine_id: &MachineId,
    ) -> CreateOutcome {
        let params = self.params(machine_class, machine_id, true);
        let result = self
            .gateway
            .send_and_wait(OperationType::Create, params)
            .await;

        match result {
            Ok(Some(OperationResult::Create(response))) => {
                info!(
                    provider = provider_name,
                    machine_class,
                    %machine_id,
                    provider_id = %response.provider_id,
                    node_name = %response.node_name,
                    error = response.error,
                    "create returned"
                );
                CreateOutcome::from(response)
            }
            Ok(Some(other)) => {
                warn!(
                    provider = provider_name,
                    %machine_id,
                    result = %other.operation_type(),
                    "driver answered create with another operation's result"
                );
                CreateOutcome::no_response()
            }
            Ok(None) => {
                warn!(provider = provider_name, %machine_id, "driver returned no create result");
                CreateOutcome::no_response()
            }
            Err(err) => {
                warn!(provider = provider_name, %machine_id, error = %err, "create request failed");
                CreateOutcome::no_response()
            }
        }
    }

    async fn delete(
        &self,
        provider_name: &str,
        machine_class: &str,
        machine_id: &MachineId,
    ) -> i32 {
        let params = self.params(machine_class, machine_id, false);
        let result = self
            .gateway
            .send_and_wait(OperationType::Delete, params)
            .await;

        match result {
            Ok(Some(OperationResult::Delete(response))) => {
                info!(
                    provider = provider_name,
                    machine_class,
                    %machine_id,
                    error = response.error,
                    "delete returned"
                );
                response.error
            }
            Ok(Some(other)) => {
                warn!(
                    provider = provider_name,
                    %machine_id,
                    result = %other.operation_type(),
                    "driver answered delete with another operation's result"
                );
                ERROR_NO_RESPONSE
            }
            Ok(None) => {
                warn!(provider = provider_name, %machine_id, "driver returned no delete result");
                ERROR_NO_RESPONSE
            }
            Err(err) => {
                warn!(provider = provider_name, %machine_id, error = %err, "delete request failed");
                ERROR_NO_RESPONSE
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use super::{CreateOutcome, Driver, Gateway, RelayDriver};
    use crate::classes::{MachineClass, MachineClassCatalog};
    use async_trait::async_trait;
    use infra_core::MachineId;
    use infra_driver_proto::{
        CreateResponse, DeleteResponse, ERROR_NO_RESPONSE, OperationParams, OperationResult,
        OperationType,
    };
    use infra_ipc::IpcError;

    /// Replays one canned answer and records what was sent.
    struct StubGateway {
        answer: Mutex<Option<Result<Option<OperationResult>, IpcError>>>,
        sent: Mutex<Vec<(OperationType, OperationParams)>>,
    }

    impl StubGateway {
        fn new(answer: Result<Option<OperationResult>, IpcError>) -> Arc<Self> {
            Arc::new(Self {
                answer: Mutex::new(Some(answer)),
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Gateway for StubGateway {
        async fn send_and_wait(
            &self,
            operation_type: OperationType,
            params: OperationParams,
        ) -> Result<Option<OperationResult>, IpcError> {
            self.sent
                .lock()
                .expect("sent lock")
                .push((operation_type, params));
            self.answer
                .lock()
                .expect("answer lock")
                .take()
                .expect("stub answers once")
        }
    }

    fn catalog() -> Arc<MachineClassCatalog> {
        Arc::new(MachineClassCatalog::new(HashMap::from([(
            "standard".to_string(),
            MachineClass {
                revision: 7,
                cloud_config: "#cloud-config".to_string(),
                user_data: "boot script".to_string(),
            },
        )])))
    }

    fn machine() -> MachineId {
        MachineId("machine-1".to_string())
    }

    #[tokio::test]
    async fn create_decodes_driver_result() {
        let gateway = StubGateway::new(Ok(Some(OperationResult::Create(CreateResponse {
            provider_id: "azure:///rg/machine-1".to_string(),
            node_name: "machine-1".to_string(),
            error: 0,
        }))));
        let driver = RelayDriver::new(gateway.clone(), catalog());

        let outcome = driver.create("azure", "standard", &machine()).await;
        assert_eq!(
            outcome,
            CreateOutcome {
                provider_id: "azure:///rg/machine-1".to_string(),
                node_name: "machine-1".to_string(),
                error: 0,
            }
        );

        let sent = gateway.sent.lock().expect("sent lock");
        let (operation_type, params) = &sent[0];
        assert_eq!(operation_type, &OperationType::Create);
        assert_eq!(params.machine_class_meta.name, "standard");
        assert_eq!(params.machine_class_meta.revision, 7);
        assert_eq!(params.cloud_config, "#cloud-config");
        assert_eq!(params.user_data, "boot script");
        assert_eq!(params.machine_id, "machine-1");
        assert_eq!(params.machine_name, "machine-1");
    }

    #[tokio::test]
    async fn create_without_body_returns_sentinel() {
        let driver = RelayDriver::new(StubGateway::new(Ok(None)), catalog());

        let outcome = driver.create("azure", "standard", &machine()).await;
        assert_eq!(outcome.provider_id, "");
        assert_eq!(outcome.node_name, "");
        assert_eq!(outcome.error, ERROR_NO_RESPONSE);
        assert_eq!(outcome.error, 2);
    }

    #[tokio::test]
    async fn create_after_session_loss_returns_sentinel() {
        let driver = RelayDriver::new(StubGateway::new(Err(IpcError::SessionClosed)), catalog());

        let outcome = driver.create("azure", "standard", &machine()).await;
        assert_eq!(outcome.error, ERROR_NO_RESPONSE);
        assert!(outcome.provider_id.is_empty());
    }

    #[tokio::test]
    async fn create_with_wrong_variant_returns_sentinel() {
        let gateway = StubGateway::new(Ok(Some(OperationResult::Delete(DeleteResponse {
            error: 0,
        }))));
        let driver = RelayDriver::new(gateway, catalog());

        let outcome = driver.create("azure", "standard", &machine()).await;
        assert_eq!(outcome.error, ERROR_NO_RESPONSE);
    }

    #[tokio::test]
    async fn provider_failure_passes_through() {
        let gateway = StubGateway::new(Ok(Some(OperationResult::Create(CreateResponse {
            provider_id: String::new(),
            node_name: String::new(),
            error: 13,
        }))));
        let driver = RelayDriver::new(gateway, catalog());

        assert_eq!(driver.create("azure", "standard", &machine()).await.error, 13);
    }

    #[tokio::test]
    async fn delete_omits_user_data_and_returns_driver_code() {
        let gateway = StubGateway::new(Ok(Some(OperationResult::Delete(DeleteResponse {
            error: 5,
        }))));
        let driver = RelayDriver::new(gateway.clone(), catalog());

        assert_eq!(driver.delete("azure", "standard", &machine()).await, 5);

        let sent = gateway.sent.lock().expect("sent lock");
        assert_eq!(sent[0].0, OperationType::Delete);
        assert!(sent[0].1.user_data.is_empty());
        assert_eq!(sent[0].1.cloud_config, "#cloud-config");
    }

    #[tokio::test]
    async fn delete_without_body_returns_sentinel() {
        let driver = RelayDriver::new(StubGateway::new(Ok(None)), catalog());
        assert_eq!(
            driver.delete("azure", "standard", &machine()).await,
            ERROR_NO_RESPONSE
        );
    }
}
