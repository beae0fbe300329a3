use serde::{Deserialize, Serialize};

use crate::{ErrorCode, MachineId, ReqId};

/// Control protocol version expected by current binaries.
pub const PROTOCOL_VERSION: u32 = 1;

/// Request envelope carrying metadata plus a typed request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope<T> {
    /// Client-generated request identifier.
    pub req_id: ReqId,
    /// Typed request payload.
    pub body: T,
}

/// Response envelope carrying metadata plus a typed response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope<T> {
    /// Request identifier echoed from the request envelope.
    pub req_id: ReqId,
    /// Typed response payload.
    pub body: T,
}

/// Addresses one machine through a registered provider driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRef {
    /// Provider name the driver registered under.
    pub provider: String,
    /// Machine class the machine is built from.
    pub machine_class: String,
    /// Machine identifier.
    pub machine_id: MachineId,
}

/// Snapshot of one connected driver session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverInfo {
    /// Provider name announced during registration.
    pub provider: String,
    /// Registration timestamp in UNIX milliseconds.
    pub connected_at_ms: u64,
    /// Requests sent to the driver and still awaiting a response.
    pub outstanding: u64,
}

/// Control RPC request variants supported by the relay daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Returns daemon and protocol version metadata.
    Version {},
    /// Returns liveness status.
    Health {},
    /// Lists currently registered drivers.
    ListDrivers {},
    /// Asks the provider driver to create a machine.
    CreateMachine {
        /// Target machine.
        machine: MachineRef,
    },
    /// Asks the provider driver to delete a machine.
    DeleteMachine {
        /// Target machine.
        machine: MachineRef,
    },
}

/// Control RPC response variants returned by the relay daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Protocol version details.
    Version {
        /// Daemon version string.
        daemon: String,
        /// Protocol version number.
        protocol: u32,
    },
    /// Service health result.
    Health {
        /// Health status string.
        status: String,
    },
    /// Registered drivers.
    Drivers {
        /// One entry per provider.
        drivers: Vec<DriverInfo>,
    },
    /// Driver answer to a create request.
    MachineCreated {
        /// Provider-assigned resource identifier, empty on failure.
        provider_id: String,
        /// Node name the machine will join as, empty on failure.
        node_name: String,
        /// Driver error code, zero on success.
        error: i32,
    },
    /// Driver answer to a delete request.
    MachineDeleted {
        /// Driver error code, zero on success.
        error: i32,
    },
    /// Structured error response.
    Error {
        /// High-level error category.
        code: ErrorCode,
        /// Human-readable summary.
        message: String,
        /// Optional extended context.
        detail: Option<String>,
    },
}
