use std::sync::Arc;

use infra_core::{InfraError, MachineRef, PROTOCOL_VERSION, Request, Response};

use crate::{driver::Driver, registry::DriverRegistry};

#[derive(Clone)]
pub struct Handler {
    registry: Arc<DriverRegistry>,
}

impl Handler {
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self { registry }
    }

    pub async fn handle(&self, request: Request) -> Response {
        let result = match request {
            Request::Version {} => Ok(Response::Version {
                daemon: env!("CARGO_PKG_VERSION").to_string(),
                protocol: PROTOCOL_VERSION,
            }),
            Request::Health {} => Ok(Response::Health {
                status: "ok".to_string(),
            }),
            Request::ListDrivers {} => self
                .registry
                .list()
                .map(|drivers| Response::Drivers { drivers }),
            Request::CreateMachine { machine } => self.create_machine(machine).await,
            Request::DeleteMachine { machine } => self.delete_machine(machine).await,
        };

        match result {
            Ok(response) => response,
            Err(err) => to_error_response(err),
        }
    }

    async fn create_machine(&self, machine: MachineRef) -> Result<Response, InfraError> {
        let driver = self.registry.driver(&machine.provider)?;
        let outcome = driver
            .create(&machine.provider, &machine.machine_class, &machine.machine_id)
            .await;
        Ok(Response::MachineCreated {
            provider_id: outcome.provider_id,
            node_name: outcome.node_name,
            error: outcome.error,
        })
    }

    async fn delete_machine(&self, machine: MachineRef) -> Result<Response, InfraError> {
        let driver = self.registry.driver(&machine.provider)?;
        let error = driver
            .delete(&machine.provider, &machine.machine_class, &machine.machine_id)
            .await;
        Ok(Response::MachineDeleted { error })
    }
}

fn to_error_response(err: InfraError) -> Response {
    Response::Error {
        code: err.code,
        message: err.message,
        detail: err.detail,
    }
}
