// Ultrasonic sensor: single-channel distance

use crate::device::{Brick, SensorKind};
use crate::error::DeviceError;
use crate::port::Port;

use super::{ModeRequest, Sampler};

const MODES: [ModeRequest; 1] = [ModeRequest::new("Distance", 1)];

pub struct UltrasonicSensor {
    sampler: Sampler,
}

impl UltrasonicSensor {
    pub const KIND: SensorKind = SensorKind::Ultrasonic;

    pub fn open(brick: &dyn Brick, port: &Port) -> Result<Self, DeviceError> {
        let device = brick.open_sensor(port, Self::KIND)?;
        Ok(Self {
            sampler: Sampler::negotiate(device, &MODES)?,
        })
    }

    /// Distance in meters to the nearest object in front of the sensor.
    ///
    /// `f64::INFINITY` when nothing is in range.
    pub fn distance(&self) -> Result<f64, DeviceError> {
        self.sampler.read(0, |s| {
            let d = s[0] as f64;
            if d.is_nan() { f64::INFINITY } else { d.max(0.0) }
        })
    }

    pub fn port(&self) -> &Port {
        self.sampler.port()
    }
}
