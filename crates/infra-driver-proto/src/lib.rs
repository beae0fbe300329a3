use std::fmt;

use infra_core::OperationId;
use serde::{Deserialize, Serialize};

pub const DRIVER_PROTOCOL_VERSION: u32 = 1;

/// Error code reported by a driver for a successful operation.
pub const ERROR_OK: i32 = 0;
/// Error code synthesized by the relay when no response body is available.
pub const ERROR_NO_RESPONSE: i32 = 2;

/// First frame a driver sends after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverHello {
    pub protocol: u32,
    pub provider: String,
}

/// Relay answer to [`DriverHello`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayHello {
    HelloAck { protocol: u32 },
    HelloReject { reason: String },
}

/// Operation discriminator carried on every request.
///
/// Known operations get their own variant; anything else is kept verbatim so
/// newer drivers and relays can still exchange frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperationType {
    Create,
    Delete,
    Other(String),
}

impl OperationType {
    pub fn as_str(&self) -> &str {
        match self {
            OperationType::Create => "create",
            OperationType::Delete => "delete",
            OperationType::Other(name) => name,
        }
    }
}

impl From<String> for OperationType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "create" => OperationType::Create,
            "delete" => OperationType::Delete,
            _ => OperationType::Other(value),
        }
    }
}

impl From<OperationType> for String {
    fn from(value: OperationType) -> Self {
        match value {
            OperationType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineClassMeta {
    pub name: String,
    pub revision: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationParams {
    pub machine_class_meta: MachineClassMeta,
    pub cloud_config: String,
    pub user_data: String,
    pub machine_id: String,
    pub machine_name: String,
}

/// Relay to driver frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub operation_id: OperationId,
    pub operation_type: OperationType,
    pub operation_params: OperationParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateResponse {
    pub provider_id: String,
    pub node_name: String,
    pub error: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub error: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationResult {
    Create(CreateResponse),
    Delete(DeleteResponse),
}

impl OperationResult {
    /// Operation this result answers.
    pub fn operation_type(&self) -> OperationType {
        match self {
            OperationResult::Create(_) => OperationType::Create,
            OperationResult::Delete(_) => OperationType::Delete,
        }
    }
}

/// Driver to relay frame. A missing `result` means the driver had no answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResponse {
    pub operation_id: OperationId,
    #[serde(default)]
    pub result: Option<OperationResult>,
}
