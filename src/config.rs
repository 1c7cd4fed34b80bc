// Physical constants, port conventions, topics and the loadable robot config
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::init::{CapabilitySelection, RetryPolicy};
use crate::pilot::{MotionLimits, WheelSpec};

// Wheel geometry (meters)
pub const WHEEL_DIAMETER: f64 = 0.056;
pub const WHEEL_SPACING: f64 = 0.12;

// Default motion limits
pub const LINEAR_SPEED: f64 = 0.3; // m/s
pub const LINEAR_ACCELERATION: f64 = 0.9; // m/s^2
pub const ANGULAR_SPEED: f64 = 180.0; // deg/s
pub const ANGULAR_ACCELERATION: f64 = 540.0; // deg/s^2

// Actuator slots
pub const CLAW_MOTOR_PORT: &str = "A";
pub const LEFT_MOTOR_PORT: &str = "B";
pub const RIGHT_MOTOR_PORT: &str = "C";

// Sensor slots, indexed like the capability selection [touch, gyro, color, distance]
pub const SENSOR_PORTS: [&str; 4] = ["S1", "S2", "S3", "S4"];

// Retry defaults for sensor acquisition
pub const RETRY_MAX_ATTEMPTS: u32 = 100;
pub const RETRY_INITIAL_BACKOFF: Duration = Duration::from_millis(20);
pub const RETRY_MAX_BACKOFF: Duration = Duration::from_secs(1);

// Runtime loop frequency
pub const LOOP_HZ: u64 = 20;

// Zenoh topics
pub const TOPIC_CMD_MOTION: &str = "brick/cmd/motion"; // commands
pub const TOPIC_STATE_POSE: &str = "brick/state/pose"; // odometry
pub const TOPIC_STATE_STATUS: &str = "brick/state/status"; // readiness

// Serial port of the brick I/O hub
pub const HUB_PORT: &str = "/dev/ttyACM0";
pub const HUB_BAUDRATE: u32 = 115_200;

/// Everything a deployment may override, all fields defaulted.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RobotConfig {
    pub capabilities: CapabilitySelection,
    pub wheels: WheelConfig,
    pub limits: MotionLimits,
    pub retry: RetryPolicy,
    pub hub: HubConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    pub diameter: f64,
    pub spacing: f64,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            diameter: WHEEL_DIAMETER,
            spacing: WHEEL_SPACING,
        }
    }
}

impl WheelConfig {
    /// Left wheel sits at +spacing/2, right wheel at -spacing/2.
    pub fn specs(&self) -> (WheelSpec, WheelSpec) {
        (
            WheelSpec::new(self.diameter, self.spacing / 2.0),
            WheelSpec::new(self.diameter, -self.spacing / 2.0),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub port: String,
    pub baudrate: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            port: HUB_PORT.to_string(),
            baudrate: HUB_BAUDRATE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl RobotConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
