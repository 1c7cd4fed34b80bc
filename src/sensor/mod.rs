// Sensor samplers
//
// A `Sampler` owns an opaque sensor handle plus one fixed-size buffer per
// negotiated mode. The typed sensors (touch, gyro, color, ultrasonic) are thin
// wrappers that name the modes they need and derive semantic values from the
// raw channels.

mod color;
mod gyro;
mod touch;
mod ultrasonic;

use std::sync::Mutex;

use tracing::{debug, warn};

use crate::device::{ModeInfo, SensorDevice};
use crate::error::DeviceError;
use crate::port::Port;

pub use color::{ColorId, ColorSensor};
pub use gyro::GyroSensor;
pub use touch::TouchSensor;
pub use ultrasonic::UltrasonicSensor;

/// A mode the sampler must negotiate: device mode name and channel count
#[derive(Debug, Clone, Copy)]
pub struct ModeRequest {
    pub name: &'static str,
    pub channels: usize,
}

impl ModeRequest {
    pub const fn new(name: &'static str, channels: usize) -> Self {
        Self { name, channels }
    }
}

/// One negotiated mode and its private sample buffer
struct SampleProvider {
    mode: ModeInfo,
    buffer: Vec<f32>,
}

struct SamplerInner {
    device: Box<dyn SensorDevice>,
    providers: Vec<SampleProvider>,
}

/// Uniform sampling over a sensor handle
pub struct Sampler {
    port: Port,
    inner: Mutex<SamplerInner>,
}

impl Sampler {
    /// Negotiate every requested mode, in order.
    ///
    /// If any mode cannot be provided the device binding is released before
    /// the error is returned.
    pub fn negotiate(mut device: Box<dyn SensorDevice>, modes: &[ModeRequest]) -> Result<Self, DeviceError> {
        let port = device.port().clone();
        let mut providers = Vec::with_capacity(modes.len());

        for request in modes {
            match Self::select(device.as_mut(), request) {
                Ok(mode) => {
                    debug!(
                        "Negotiated mode {:?} on {} ({} channels)",
                        mode.name, port, mode.channels
                    );
                    providers.push(SampleProvider {
                        buffer: vec![0.0; mode.channels],
                        mode,
                    });
                }
                Err(e) => {
                    warn!("Mode {:?} unavailable on {}, releasing port: {}", request.name, port, e);
                    device.close();
                    return Err(e);
                }
            }
        }

        Ok(Self {
            port,
            inner: Mutex::new(SamplerInner { device, providers }),
        })
    }

    fn select(device: &mut dyn SensorDevice, request: &ModeRequest) -> Result<ModeInfo, DeviceError> {
        let mode = device.select_mode(request.name)?;
        if mode.channels != request.channels {
            return Err(DeviceError::ModeUnavailable {
                port: device.port().name().to_string(),
                mode: format!(
                    "{} ({} channels, expected {})",
                    request.name, mode.channels, request.channels
                ),
            });
        }
        Ok(mode)
    }

    pub fn port(&self) -> &Port {
        &self.port
    }

    /// Fetch a fresh sample for the `mode`-th negotiated mode and derive a value from it
    pub fn read<T>(&self, mode: usize, derive: impl FnOnce(&[f32]) -> T) -> Result<T, DeviceError> {
        let mut inner = self.inner.lock().map_err(|_| DeviceError::Poisoned {
            port: self.port.name().to_string(),
        })?;
        let SamplerInner { device, providers } = &mut *inner;
        let provider = &mut providers[mode];
        device.fetch(&provider.mode, &mut provider.buffer)?;
        Ok(derive(&provider.buffer))
    }

    /// Re-zero the underlying device
    pub fn reset(&self) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock().map_err(|_| DeviceError::Poisoned {
            port: self.port.name().to_string(),
        })?;
        inner.device.reset()
    }

    /// Channel count of the `mode`-th negotiated mode
    pub fn channels(&self, mode: usize) -> Result<usize, DeviceError> {
        let inner = self.inner.lock().map_err(|_| DeviceError::Poisoned {
            port: self.port.name().to_string(),
        })?;
        Ok(inner.providers[mode].buffer.len())
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.get_mut() {
            inner.device.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Brick, SensorKind};
    use crate::sim::{SimBrick, SimSensor};

    #[test]
    fn test_buffers_sized_to_mode_channels() {
        let brick = SimBrick::new();
        let port = brick.port("S3").unwrap();
        brick.attach_sensor(&port, SimSensor::new(SensorKind::Color));

        let device = brick.open_sensor(&port, SensorKind::Color).unwrap();
        let sampler = Sampler::negotiate(
            device,
            &[ModeRequest::new("Red", 1), ModeRequest::new("RGB", 3)],
        )
        .unwrap();
        assert_eq!(sampler.channels(0).unwrap(), 1);
        assert_eq!(sampler.channels(1).unwrap(), 3);
    }

    #[test]
    fn test_failed_negotiation_releases_port() {
        let brick = SimBrick::new();
        let port = brick.port("S1").unwrap();
        brick.attach_sensor(&port, SimSensor::new(SensorKind::Touch).without_mode("Touch"));

        let device = brick.open_sensor(&port, SensorKind::Touch).unwrap();
        assert!(brick.is_bound(&port));

        let result = Sampler::negotiate(device, &[ModeRequest::new("Touch", 1)]);
        assert!(matches!(result, Err(DeviceError::ModeUnavailable { .. })));
        assert!(!brick.is_bound(&port));
    }

    #[test]
    fn test_channel_mismatch_is_negotiation_failure() {
        let brick = SimBrick::new();
        let port = brick.port("S4").unwrap();
        brick.attach_sensor(&port, SimSensor::new(SensorKind::Ultrasonic));

        let device = brick.open_sensor(&port, SensorKind::Ultrasonic).unwrap();
        let result = Sampler::negotiate(device, &[ModeRequest::new("Distance", 2)]);
        assert!(matches!(result, Err(DeviceError::ModeUnavailable { .. })));
        assert!(!brick.is_bound(&port));
    }

    #[test]
    fn test_every_read_fetches() {
        let brick = SimBrick::new();
        let port = brick.port("S4").unwrap();
        brick.attach_sensor(
            &port,
            SimSensor::new(SensorKind::Ultrasonic).with_samples("Distance", vec![vec![0.5], vec![0.7]]),
        );

        let device = brick.open_sensor(&port, SensorKind::Ultrasonic).unwrap();
        let sampler = Sampler::negotiate(device, &[ModeRequest::new("Distance", 1)]).unwrap();
        assert_eq!(sampler.read(0, |b| b[0]).unwrap(), 0.5);
        assert_eq!(sampler.read(0, |b| b[0]).unwrap(), 0.7);
        assert_eq!(brick.fetch_count(&port), 2);
    }

    #[test]
    fn test_poisoned_sampler_reports_error() {
        let brick = SimBrick::new();
        let port = brick.port("S1").unwrap();
        brick.attach_sensor(&port, SimSensor::new(SensorKind::Touch));

        let device = brick.open_sensor(&port, SensorKind::Touch).unwrap();
        let sampler = Sampler::negotiate(device, &[ModeRequest::new("Touch", 1)]).unwrap();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = sampler.inner.lock().unwrap();
            panic!("reader crashed");
        }));

        assert!(matches!(sampler.channels(0), Err(DeviceError::Poisoned { .. })));
        assert!(matches!(sampler.read(0, |b| b[0]), Err(DeviceError::Poisoned { .. })));
    }

    #[test]
    fn test_drop_releases_port() {
        let brick = SimBrick::new();
        let port = brick.port("S1").unwrap();
        brick.attach_sensor(&port, SimSensor::new(SensorKind::Touch));

        let device = brick.open_sensor(&port, SensorKind::Touch).unwrap();
        let sampler = Sampler::negotiate(device, &[ModeRequest::new("Touch", 1)]).unwrap();
        assert!(brick.is_bound(&port));
        drop(sampler);
        assert!(!brick.is_bound(&port));
    }
}
