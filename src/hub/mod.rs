// Brick I/O hub over a serial link
//
// Provides:
// - The hub packet protocol (`protocol`)
// - `HubBrick`: the `Brick` implementation that opens sensor and motor
//   handles on hub slots, all sharing one serial bus

pub mod protocol;

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::device::{Brick, ModeInfo, MotorKind, RegulatedMotor, SensorDevice, SensorKind, type_name};
use crate::error::DeviceError;
use crate::port::Port;

pub use protocol::{HubBus, HubError, Instruction, RunDirection, Status};

type SharedBus = Arc<Mutex<HubBus>>;

fn lock<'a>(bus: &'a SharedBus, port: &Port) -> Result<MutexGuard<'a, HubBus>, DeviceError> {
    bus.lock().map_err(|_| DeviceError::Poisoned {
        port: port.name().to_string(),
    })
}

/// Send an instruction to a port's slot and map non-ok statuses
fn request(
    bus: &SharedBus,
    port: &Port,
    instruction: Instruction,
    params: &[u8],
) -> Result<Vec<u8>, DeviceError> {
    let response = lock(bus, port)?.transact(port.slot(), instruction, params)?;
    match response.status {
        Status::Ok => Ok(response.params),
        Status::NoDevice => Err(DeviceError::NoDevice {
            port: port.name().to_string(),
        }),
        Status::WrongDevice => Err(DeviceError::WrongDevice {
            port: port.name().to_string(),
            expected: String::new(),
            found: type_name(response.params.first().copied().unwrap_or(0)),
        }),
        Status::ModeUnavailable => Err(DeviceError::ModeUnavailable {
            port: port.name().to_string(),
            mode: String::from_utf8_lossy(params).into_owned(),
        }),
    }
}

/// Open a slot expecting a specific device type
fn open_slot(bus: &SharedBus, port: &Port, type_id: u8, expected: String) -> Result<(), DeviceError> {
    match request(bus, port, Instruction::Open, &[type_id]) {
        Err(DeviceError::WrongDevice { port, found, .. }) => Err(DeviceError::WrongDevice {
            port,
            expected,
            found,
        }),
        other => other.map(|_| ()),
    }
}

/// The physical brick, reached through its I/O hub
pub struct HubBrick {
    bus: SharedBus,
}

impl HubBrick {
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self, HubError> {
        info!("Opening brick hub on {} @ {} baud", port_name, baudrate);
        let bus = HubBus::open_with_baudrate(port_name, baudrate)?;
        Ok(Self::from_bus(bus))
    }

    pub fn from_bus(bus: HubBus) -> Self {
        Self {
            bus: Arc::new(Mutex::new(bus)),
        }
    }
}

impl Brick for HubBrick {
    fn open_sensor(&self, port: &Port, kind: SensorKind) -> Result<Box<dyn SensorDevice>, DeviceError> {
        open_slot(&self.bus, port, kind as u8, kind.to_string())?;
        debug!("Opened {} sensor on {}", kind, port);
        Ok(Box::new(HubSensor {
            bus: self.bus.clone(),
            port: port.clone(),
            open: true,
        }))
    }

    fn open_motor(&self, port: &Port, kind: MotorKind) -> Result<Box<dyn RegulatedMotor>, DeviceError> {
        open_slot(&self.bus, port, kind as u8, kind.to_string())?;
        debug!("Opened {} on {}", kind, port);
        Ok(Box::new(HubMotor {
            bus: self.bus.clone(),
            port: port.clone(),
        }))
    }
}

/// Sensor handle bound to one hub slot
pub struct HubSensor {
    bus: SharedBus,
    port: Port,
    open: bool,
}

impl SensorDevice for HubSensor {
    fn port(&self) -> &Port {
        &self.port
    }

    fn select_mode(&mut self, name: &str) -> Result<ModeInfo, DeviceError> {
        let params = request(&self.bus, &self.port, Instruction::SelectMode, name.as_bytes())?;
        match params.as_slice() {
            [index, channels] => Ok(ModeInfo {
                name: name.to_string(),
                index: *index,
                channels: *channels as usize,
            }),
            _ => Err(HubError::InvalidResponse {
                slot: self.port.slot(),
                reason: format!("Mode reply has {} bytes", params.len()),
            }
            .into()),
        }
    }

    fn fetch(&mut self, mode: &ModeInfo, buf: &mut [f32]) -> Result<(), DeviceError> {
        let params = request(&self.bus, &self.port, Instruction::Fetch, &[mode.index])?;
        protocol::decode_f32s(self.port.slot(), &params, buf)?;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        request(&self.bus, &self.port, Instruction::Reset, &[]).map(|_| ())
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(e) = request(&self.bus, &self.port, Instruction::Close, &[]) {
            tracing::warn!("Failed to close sensor on {}: {}", self.port, e);
        }
    }
}

impl Drop for HubSensor {
    fn drop(&mut self) {
        self.close();
    }
}

/// Motor handle bound to one hub slot
pub struct HubMotor {
    bus: SharedBus,
    port: Port,
}

impl HubMotor {
    fn send_f32(&self, instruction: Instruction, value: f64) -> Result<(), DeviceError> {
        let bytes = (value as f32).to_le_bytes();
        request(&self.bus, &self.port, instruction, &bytes).map(|_| ())
    }

    fn run(&self, direction: RunDirection) -> Result<(), DeviceError> {
        request(&self.bus, &self.port, Instruction::MotorRun, &[direction as u8]).map(|_| ())
    }
}

impl RegulatedMotor for HubMotor {
    fn port(&self) -> &Port {
        &self.port
    }

    fn set_speed(&self, deg_per_sec: f64) -> Result<(), DeviceError> {
        self.send_f32(Instruction::MotorSpeed, deg_per_sec.abs())
    }

    fn set_acceleration(&self, deg_per_sec2: f64) -> Result<(), DeviceError> {
        self.send_f32(Instruction::MotorAcceleration, deg_per_sec2.abs())
    }

    fn forward(&self) -> Result<(), DeviceError> {
        self.run(RunDirection::Forward)
    }

    fn backward(&self) -> Result<(), DeviceError> {
        self.run(RunDirection::Backward)
    }

    fn stop(&self) -> Result<(), DeviceError> {
        self.run(RunDirection::Stop)
    }

    fn rotate_by(&self, degrees: f64) -> Result<(), DeviceError> {
        self.send_f32(Instruction::MotorRotate, degrees)
    }

    fn tacho_count(&self) -> Result<f64, DeviceError> {
        let params = request(&self.bus, &self.port, Instruction::MotorTacho, &[])?;
        Ok(protocol::decode_i32(self.port.slot(), &params)? as f64)
    }

    fn is_moving(&self) -> Result<bool, DeviceError> {
        let params = request(&self.bus, &self.port, Instruction::MotorMoving, &[])?;
        Ok(params.first().copied().unwrap_or(0) != 0)
    }
}

impl Drop for HubMotor {
    fn drop(&mut self) {
        // Try to stop the motor when the handle is dropped (safety measure)
        if let Err(e) = self.stop() {
            tracing::warn!("Failed to stop motor on {} on drop: {}", self.port, e);
        }
    }
}
