// Device seams: the brick, sensor handles and regulated motors
//
// Concrete implementations live in `hub` (serial I/O hub) and `sim`
// (deterministic simulated brick).

use std::fmt;

use crate::error::DeviceError;
use crate::port::Port;

/// Sensor device types the brick can host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SensorKind {
    Touch = 0x10,
    Gyro = 0x11,
    Color = 0x12,
    Ultrasonic = 0x13,
}

/// Motor device types the brick can host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MotorKind {
    Large = 0x20,
    Medium = 0x21,
}

impl SensorKind {
    pub fn from_type_id(id: u8) -> Option<Self> {
        match id {
            0x10 => Some(Self::Touch),
            0x11 => Some(Self::Gyro),
            0x12 => Some(Self::Color),
            0x13 => Some(Self::Ultrasonic),
            _ => None,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Touch => write!(f, "touch"),
            Self::Gyro => write!(f, "gyro"),
            Self::Color => write!(f, "color"),
            Self::Ultrasonic => write!(f, "ultrasonic"),
        }
    }
}

impl fmt::Display for MotorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Large => write!(f, "large motor"),
            Self::Medium => write!(f, "medium motor"),
        }
    }
}

/// Human-readable name for a raw device type id reported by a port
pub fn type_name(id: u8) -> String {
    match id {
        0x00 => "nothing".to_string(),
        0x20 => MotorKind::Large.to_string(),
        0x21 => MotorKind::Medium.to_string(),
        other => SensorKind::from_type_id(other)
            .map(|k| k.to_string())
            .unwrap_or_else(|| format!("unknown device 0x{:02X}", other)),
    }
}

/// A sampling mode accepted by a sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeInfo {
    pub name: String,
    /// Device-side index used when fetching
    pub index: u8,
    /// Values produced per sample
    pub channels: usize,
}

/// The brick: resolves ports and opens exclusive device handles on them
pub trait Brick: Send + Sync {
    fn port(&self, name: &str) -> Result<Port, DeviceError> {
        Port::resolve(name)
    }

    /// Bind a sensor handle. Fails with `NoDevice`/`WrongDevice` when the
    /// port is empty or hosts something else.
    fn open_sensor(&self, port: &Port, kind: SensorKind)
    -> Result<Box<dyn SensorDevice>, DeviceError>;

    fn open_motor(&self, port: &Port, kind: MotorKind)
    -> Result<Box<dyn RegulatedMotor>, DeviceError>;
}

/// An open sensor binding
pub trait SensorDevice: Send {
    fn port(&self) -> &Port;

    /// Negotiate a named sampling mode
    fn select_mode(&mut self, name: &str) -> Result<ModeInfo, DeviceError>;

    /// Synchronously read one sample of `mode` into `buf` (len == channels)
    fn fetch(&mut self, mode: &ModeInfo, buf: &mut [f32]) -> Result<(), DeviceError>;

    /// Re-zero the sensor's reference (gyro angle)
    fn reset(&mut self) -> Result<(), DeviceError>;

    /// Release the port. Idempotent.
    fn close(&mut self);
}

/// A speed-regulated motor with a tachometer, shared across threads
pub trait RegulatedMotor: Send + Sync {
    fn port(&self) -> &Port;

    /// Target speed in degrees/second
    fn set_speed(&self, deg_per_sec: f64) -> Result<(), DeviceError>;

    /// Ramp in degrees/second^2
    fn set_acceleration(&self, deg_per_sec2: f64) -> Result<(), DeviceError>;

    fn forward(&self) -> Result<(), DeviceError>;

    fn backward(&self) -> Result<(), DeviceError>;

    fn stop(&self) -> Result<(), DeviceError>;

    /// Start turning the shaft by `degrees` (signed) and return immediately
    fn rotate_by(&self, degrees: f64) -> Result<(), DeviceError>;

    /// Accumulated shaft rotation in degrees
    fn tacho_count(&self) -> Result<f64, DeviceError>;

    fn is_moving(&self) -> Result<bool, DeviceError>;
}
