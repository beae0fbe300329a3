pub mod errors;
pub mod ids;
pub mod paths;
pub mod protocol;
pub mod time;

pub use errors::{ErrorCode, InfraError};
pub use ids::{MachineId, OperationId, ReqId};
pub use paths::{default_control_socket, default_driver_socket, default_runtime_dir};
pub use protocol::{
    DriverInfo, MachineRef, PROTOCOL_VERSION, Request, RequestEnvelope, Response,
    ResponseEnvelope,
};
pub use time::now_ms;
