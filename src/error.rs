// Error types shared by devices, the initializer and the pilot

use crate::hub::HubError;
use crate::init::Capability;

/// Errors raised while binding or reading a device handle
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Unknown port {0:?}")]
    UnknownPort(String),

    #[error("No device connected on port {port}")]
    NoDevice { port: String },

    #[error("Wrong device on port {port}: expected {expected}, found {found}")]
    WrongDevice {
        port: String,
        expected: String,
        found: String,
    },

    #[error("Device on port {port} does not provide mode {mode:?}")]
    ModeUnavailable { port: String, mode: String },

    #[error("Hub error: {0}")]
    Hub(#[from] HubError),

    #[error("Device lock poisoned on port {port}")]
    Poisoned { port: String },
}

impl DeviceError {
    /// Absent or mismatched devices may appear later (cable plugged, sensor
    /// still booting) and are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NoDevice { .. } | Self::WrongDevice { .. })
    }
}

/// Errors raised by the concurrent device initializer
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("Failed to open actuator on port {port}: {source}")]
    Actuator {
        port: String,
        #[source]
        source: DeviceError,
    },

    #[error("Sensor port error: {0}")]
    Port(#[source] DeviceError),

    #[error("{capability} sensor failed: {source}")]
    Sensor {
        capability: Capability,
        #[source]
        source: DeviceError,
    },

    #[error("{capability} sensor mode negotiation failed: {source}")]
    ModeNegotiation {
        capability: Capability,
        #[source]
        source: DeviceError,
    },

    #[error("{capability} sensor not acquired after {attempts} attempts: {last}")]
    RetriesExhausted {
        capability: Capability,
        attempts: u32,
        last: DeviceError,
    },

    #[error("Initialization cancelled")]
    Cancelled,

    #[error("Devices are not initialized")]
    NotInitialized,

    #[error("Acquisition task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Pilot error: {0}")]
    Pilot(#[from] PilotError),
}

/// Errors raised by chassis construction and motion primitives
#[derive(Debug, thiserror::Error)]
pub enum PilotError {
    #[error("Invalid wheel geometry: {0}")]
    Geometry(String),

    #[error("Invalid motion limit {name}: {value}")]
    Limit { name: &'static str, value: f64 },

    #[error("Motor error: {0}")]
    Motor(#[from] DeviceError),
}
