pub mod config;
pub mod device;
pub mod error;
pub mod hub;
pub mod init;
pub mod messages;
pub mod pilot;
pub mod port;
pub mod robot;
pub mod runtime;
pub mod sensor;
pub mod sim;

pub use error::{DeviceError, InitError, PilotError};
pub use init::{CancelToken, Capability, CapabilitySelection, Devices, RetryPolicy};
pub use robot::{Drive, Robot};
