// Gyro sensor: two-channel angle and rate

use crate::device::{Brick, SensorKind};
use crate::error::DeviceError;
use crate::port::Port;

use super::{ModeRequest, Sampler};

/// Channel 0 is the rate (deg/s), channel 1 the angle (deg)
const MODES: [ModeRequest; 1] = [ModeRequest::new("AngleAndRate", 2)];

pub struct GyroSensor {
    sampler: Sampler,
}

impl GyroSensor {
    pub const KIND: SensorKind = SensorKind::Gyro;

    pub fn open(brick: &dyn Brick, port: &Port) -> Result<Self, DeviceError> {
        let device = brick.open_sensor(port, Self::KIND)?;
        Ok(Self {
            sampler: Sampler::negotiate(device, &MODES)?,
        })
    }

    /// Orientation in degrees relative to the last reset
    pub fn angle(&self) -> Result<f64, DeviceError> {
        self.sampler.read(0, |s| s[1] as f64)
    }

    /// Angular velocity in degrees/second
    pub fn angular_velocity(&self) -> Result<f64, DeviceError> {
        self.sampler.read(0, |s| s[0] as f64)
    }

    /// Make the current orientation the zero reference
    pub fn reset(&self) -> Result<(), DeviceError> {
        self.sampler.reset()
    }

    pub fn port(&self) -> &Port {
        self.sampler.port()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimBrick, SimSensor};

    #[test]
    fn test_channels_map_to_rate_and_angle() {
        let brick = SimBrick::new();
        let port = brick.port("S2").unwrap();
        brick.attach_sensor(
            &port,
            SimSensor::new(SensorKind::Gyro).with_samples("AngleAndRate", vec![vec![12.0, 45.0]]),
        );

        let gyro = GyroSensor::open(&brick, &port).unwrap();
        assert_eq!(gyro.angle().unwrap(), 45.0);
        assert_eq!(gyro.angular_velocity().unwrap(), 12.0);
        // Two accessor calls, two device reads
        assert_eq!(brick.fetch_count(&port), 2);
    }

    #[test]
    fn test_reset_reaches_device() {
        let brick = SimBrick::new();
        let port = brick.port("S2").unwrap();
        brick.attach_sensor(&port, SimSensor::new(SensorKind::Gyro));

        let gyro = GyroSensor::open(&brick, &port).unwrap();
        gyro.reset().unwrap();
        assert_eq!(brick.reset_count(&port), 1);
    }
}
