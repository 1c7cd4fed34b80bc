// Touch sensor: single-channel presence

use crate::device::{Brick, SensorKind};
use crate::error::DeviceError;
use crate::port::Port;

use super::{ModeRequest, Sampler};

const MODES: [ModeRequest; 1] = [ModeRequest::new("Touch", 1)];

pub struct TouchSensor {
    sampler: Sampler,
}

impl TouchSensor {
    pub const KIND: SensorKind = SensorKind::Touch;

    pub fn open(brick: &dyn Brick, port: &Port) -> Result<Self, DeviceError> {
        let device = brick.open_sensor(port, Self::KIND)?;
        Ok(Self {
            sampler: Sampler::negotiate(device, &MODES)?,
        })
    }

    /// Whether the sensor button is pressed
    pub fn is_pressed(&self) -> Result<bool, DeviceError> {
        self.sampler.read(0, |s| s[0] != 0.0)
    }

    pub fn port(&self) -> &Port {
        self.sampler.port()
    }
}
