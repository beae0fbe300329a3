//! CBOR-over-UNIX-socket transport for the relay: control RPC, driver
//! registration, and the multiplexed driver session.

mod error;

pub mod client;
pub mod codec;
pub mod correlation;
pub mod endpoint;
pub mod framing;
pub mod registration;
pub mod server;
pub mod session;

pub use client::ControlClient;
pub use correlation::{CorrelationTable, Delivery, PendingSlot};
pub use endpoint::{DriverEndpoint, OperationHandler};
pub use error::IpcError;
pub use registration::{DriverRegistrar, accept_driver, serve_drivers};
pub use server::{RequestHandler, serve_unix};
pub use session::Session;
