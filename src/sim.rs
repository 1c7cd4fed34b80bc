// Simulated brick for testing and running without hardware
//
// Sensors are programmable (absent for the first N opens, missing modes,
// scripted samples) and every port operation is logged. Motors are ideal:
// `rotate_by` lands instantly and running motors integrate speed over time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tracing::debug;

use crate::device::{Brick, ModeInfo, MotorKind, RegulatedMotor, SensorDevice, SensorKind};
use crate::error::DeviceError;
use crate::port::Port;

/// A logged port operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortOp {
    Open(&'static str),
    Close(&'static str),
}

/// Channel count of every mode a simulated sensor knows
fn mode_channels(kind: SensorKind, name: &str) -> Option<usize> {
    match (kind, name) {
        (SensorKind::Touch, "Touch") => Some(1),
        (SensorKind::Gyro, "AngleAndRate") => Some(2),
        (SensorKind::Color, "Red") | (SensorKind::Color, "ColorID") => Some(1),
        (SensorKind::Color, "RGB") => Some(3),
        (SensorKind::Ultrasonic, "Distance") => Some(1),
        _ => None,
    }
}

/// Behavior of one simulated sensor
#[derive(Debug, Clone)]
pub struct SimSensor {
    kind: SensorKind,
    absent_for: u32,
    missing_modes: Vec<String>,
    samples: HashMap<String, Vec<Vec<f32>>>,
}

impl SimSensor {
    pub fn new(kind: SensorKind) -> Self {
        Self {
            kind,
            absent_for: 0,
            missing_modes: Vec::new(),
            samples: HashMap::new(),
        }
    }

    /// Report "no device" for the first `attempts` opens
    pub fn absent_for(mut self, attempts: u32) -> Self {
        self.absent_for = attempts;
        self
    }

    /// Refuse to negotiate `mode`
    pub fn without_mode(mut self, mode: &str) -> Self {
        self.missing_modes.push(mode.to_string());
        self
    }

    /// Samples returned in order by `mode`; the last one repeats
    pub fn with_samples(mut self, mode: &str, samples: Vec<Vec<f32>>) -> Self {
        self.samples.insert(mode.to_string(), samples);
        self
    }
}

#[derive(Debug)]
struct SensorSlot {
    sensor: SimSensor,
    attempts: u32,
    bound: bool,
    fetches: u32,
    resets: u32,
}

#[derive(Debug, Default)]
struct MotorState {
    speed: f64,
    acceleration: f64,
    tacho: f64,
    direction: f64,
    since: Option<Instant>,
}

impl MotorState {
    fn tacho_now(&self) -> f64 {
        match self.since {
            Some(start) => self.tacho + self.direction * self.speed * start.elapsed().as_secs_f64(),
            None => self.tacho,
        }
    }

    fn settle(&mut self) {
        self.tacho = self.tacho_now();
        self.since = None;
        self.direction = 0.0;
    }

    fn run(&mut self, direction: f64) {
        self.settle();
        self.direction = direction;
        self.since = Some(Instant::now());
    }
}

#[derive(Default)]
struct SimState {
    sensors: HashMap<u8, SensorSlot>,
    motors: HashMap<u8, (MotorKind, Arc<Mutex<MotorState>>)>,
    ops: Vec<PortOp>,
}

/// A brick whose ports are simulated in memory
#[derive(Clone)]
pub struct SimBrick {
    state: Arc<Mutex<SimState>>,
}

fn lock_state(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    // A panicking test thread must not hide the log from other assertions
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Default for SimBrick {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBrick {
    /// A brick with the claw (A) and both drive motors (B, C) attached and
    /// no sensors
    pub fn new() -> Self {
        let brick = Self {
            state: Arc::new(Mutex::new(SimState::default())),
        };
        for (name, kind) in [("A", MotorKind::Medium), ("B", MotorKind::Large), ("C", MotorKind::Large)] {
            if let Ok(port) = Port::resolve(name) {
                brick.attach_motor(&port, kind);
            }
        }
        brick
    }

    /// Motors plus all four sensors on their conventional ports
    pub fn fully_equipped() -> Self {
        let brick = Self::new();
        let sensors = [
            ("S1", SimSensor::new(SensorKind::Touch)),
            ("S2", SimSensor::new(SensorKind::Gyro)),
            (
                "S3",
                SimSensor::new(SensorKind::Color)
                    .with_samples("Red", vec![vec![0.42]])
                    .with_samples("RGB", vec![vec![0.3, 0.5, 0.2]])
                    .with_samples("ColorID", vec![vec![6.0]]),
            ),
            ("S4", SimSensor::new(SensorKind::Ultrasonic).with_samples("Distance", vec![vec![1.5]])),
        ];
        for (name, sensor) in sensors {
            if let Ok(port) = Port::resolve(name) {
                brick.attach_sensor(&port, sensor);
            }
        }
        brick
    }

    pub fn attach_sensor(&self, port: &Port, sensor: SimSensor) {
        lock_state(&self.state).sensors.insert(
            port.slot(),
            SensorSlot {
                sensor,
                attempts: 0,
                bound: false,
                fetches: 0,
                resets: 0,
            },
        );
    }

    pub fn attach_motor(&self, port: &Port, kind: MotorKind) {
        lock_state(&self.state)
            .motors
            .insert(port.slot(), (kind, Arc::new(Mutex::new(MotorState::default()))));
    }

    /// Every open/close issued so far, in order
    pub fn ops(&self) -> Vec<PortOp> {
        lock_state(&self.state).ops.clone()
    }

    /// Ports that have seen at least one open
    pub fn touched_ports(&self) -> Vec<&'static str> {
        let mut ports: Vec<_> = lock_state(&self.state)
            .ops
            .iter()
            .filter_map(|op| match op {
                PortOp::Open(name) => Some(*name),
                PortOp::Close(_) => None,
            })
            .collect();
        ports.sort_unstable();
        ports.dedup();
        ports
    }

    /// Open attempts made on a sensor port
    pub fn attempts(&self, port: &Port) -> u32 {
        lock_state(&self.state)
            .sensors
            .get(&port.slot())
            .map_or(0, |s| s.attempts)
    }

    pub fn is_bound(&self, port: &Port) -> bool {
        lock_state(&self.state)
            .sensors
            .get(&port.slot())
            .is_some_and(|s| s.bound)
    }

    pub fn fetch_count(&self, port: &Port) -> u32 {
        lock_state(&self.state)
            .sensors
            .get(&port.slot())
            .map_or(0, |s| s.fetches)
    }

    pub fn reset_count(&self, port: &Port) -> u32 {
        lock_state(&self.state)
            .sensors
            .get(&port.slot())
            .map_or(0, |s| s.resets)
    }

    /// Speed and acceleration last set on a motor
    pub fn motor_settings(&self, port: &Port) -> Option<(f64, f64)> {
        let state = lock_state(&self.state);
        let (_, motor) = state.motors.get(&port.slot())?;
        let motor = motor.lock().unwrap_or_else(|p| p.into_inner());
        Some((motor.speed, motor.acceleration))
    }
}

impl Brick for SimBrick {
    fn open_sensor(&self, port: &Port, kind: SensorKind) -> Result<Box<dyn SensorDevice>, DeviceError> {
        let mut state = lock_state(&self.state);
        state.ops.push(PortOp::Open(port.name()));

        let Some(slot) = state.sensors.get_mut(&port.slot()) else {
            return Err(DeviceError::NoDevice {
                port: port.name().to_string(),
            });
        };
        slot.attempts += 1;

        if slot.attempts <= slot.sensor.absent_for {
            return Err(DeviceError::NoDevice {
                port: port.name().to_string(),
            });
        }
        if slot.sensor.kind != kind {
            return Err(DeviceError::WrongDevice {
                port: port.name().to_string(),
                expected: kind.to_string(),
                found: slot.sensor.kind.to_string(),
            });
        }
        if slot.bound {
            return Err(DeviceError::WrongDevice {
                port: port.name().to_string(),
                expected: kind.to_string(),
                found: "a bound handle".to_string(),
            });
        }

        slot.bound = true;
        debug!("Simulated {} sensor opened on {}", kind, port);
        Ok(Box::new(SimSensorDevice {
            state: self.state.clone(),
            port: port.clone(),
            kind,
            cursors: HashMap::new(),
            selected: 0,
            open: true,
        }))
    }

    fn open_motor(&self, port: &Port, kind: MotorKind) -> Result<Box<dyn RegulatedMotor>, DeviceError> {
        let mut state = lock_state(&self.state);
        state.ops.push(PortOp::Open(port.name()));

        match state.motors.get(&port.slot()) {
            Some((found, motor)) if *found == kind => Ok(Box::new(SimMotor {
                port: port.clone(),
                state: motor.clone(),
            })),
            Some((found, _)) => Err(DeviceError::WrongDevice {
                port: port.name().to_string(),
                expected: kind.to_string(),
                found: found.to_string(),
            }),
            None => Err(DeviceError::NoDevice {
                port: port.name().to_string(),
            }),
        }
    }
}

struct SimSensorDevice {
    state: Arc<Mutex<SimState>>,
    port: Port,
    kind: SensorKind,
    cursors: HashMap<String, usize>,
    selected: u8,
    open: bool,
}

impl SensorDevice for SimSensorDevice {
    fn port(&self) -> &Port {
        &self.port
    }

    fn select_mode(&mut self, name: &str) -> Result<ModeInfo, DeviceError> {
        let state = lock_state(&self.state);
        let missing = state
            .sensors
            .get(&self.port.slot())
            .is_none_or(|s| s.sensor.missing_modes.iter().any(|m| m == name));

        match mode_channels(self.kind, name) {
            Some(channels) if !missing => {
                let index = self.selected;
                self.selected += 1;
                Ok(ModeInfo {
                    name: name.to_string(),
                    index,
                    channels,
                })
            }
            _ => Err(DeviceError::ModeUnavailable {
                port: self.port.name().to_string(),
                mode: name.to_string(),
            }),
        }
    }

    fn fetch(&mut self, mode: &ModeInfo, buf: &mut [f32]) -> Result<(), DeviceError> {
        let mut state = lock_state(&self.state);
        let slot = state
            .sensors
            .get_mut(&self.port.slot())
            .ok_or_else(|| DeviceError::NoDevice {
                port: self.port.name().to_string(),
            })?;
        slot.fetches += 1;

        let cursor = self.cursors.entry(mode.name.clone()).or_insert(0);
        match slot.sensor.samples.get(&mode.name) {
            Some(samples) if !samples.is_empty() => {
                let sample = &samples[(*cursor).min(samples.len() - 1)];
                *cursor += 1;
                for (dst, src) in buf.iter_mut().zip(sample.iter().chain(std::iter::repeat(&0.0))) {
                    *dst = *src;
                }
            }
            _ => buf.fill(0.0),
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        if let Some(slot) = lock_state(&self.state).sensors.get_mut(&self.port.slot()) {
            slot.resets += 1;
        }
        Ok(())
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let mut state = lock_state(&self.state);
        state.ops.push(PortOp::Close(self.port.name()));
        if let Some(slot) = state.sensors.get_mut(&self.port.slot()) {
            slot.bound = false;
        }
    }
}

impl Drop for SimSensorDevice {
    fn drop(&mut self) {
        self.close();
    }
}

struct SimMotor {
    port: Port,
    state: Arc<Mutex<MotorState>>,
}

impl SimMotor {
    fn motor(&self) -> MutexGuard<'_, MotorState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl RegulatedMotor for SimMotor {
    fn port(&self) -> &Port {
        &self.port
    }

    fn set_speed(&self, deg_per_sec: f64) -> Result<(), DeviceError> {
        let mut motor = self.motor();
        let direction = motor.direction;
        motor.settle();
        motor.speed = deg_per_sec.abs();
        if direction != 0.0 {
            motor.run(direction);
        }
        Ok(())
    }

    fn set_acceleration(&self, deg_per_sec2: f64) -> Result<(), DeviceError> {
        self.motor().acceleration = deg_per_sec2.abs();
        Ok(())
    }

    fn forward(&self) -> Result<(), DeviceError> {
        self.motor().run(1.0);
        Ok(())
    }

    fn backward(&self) -> Result<(), DeviceError> {
        self.motor().run(-1.0);
        Ok(())
    }

    fn stop(&self) -> Result<(), DeviceError> {
        self.motor().settle();
        Ok(())
    }

    fn rotate_by(&self, degrees: f64) -> Result<(), DeviceError> {
        let mut motor = self.motor();
        motor.settle();
        motor.tacho += degrees;
        Ok(())
    }

    fn tacho_count(&self) -> Result<f64, DeviceError> {
        Ok(self.motor().tacho_now())
    }

    fn is_moving(&self) -> Result<bool, DeviceError> {
        Ok(self.motor().since.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_then_present() {
        let brick = SimBrick::new();
        let port = brick.port("S2").unwrap();
        brick.attach_sensor(&port, SimSensor::new(SensorKind::Gyro).absent_for(2));

        for _ in 0..2 {
            assert!(matches!(
                brick.open_sensor(&port, SensorKind::Gyro),
                Err(DeviceError::NoDevice { .. })
            ));
        }
        assert!(brick.open_sensor(&port, SensorKind::Gyro).is_ok());
        assert_eq!(brick.attempts(&port), 3);
    }

    #[test]
    fn test_port_binds_one_handle() {
        let brick = SimBrick::new();
        let port = brick.port("S1").unwrap();
        brick.attach_sensor(&port, SimSensor::new(SensorKind::Touch));

        let first = brick.open_sensor(&port, SensorKind::Touch).unwrap();
        assert!(brick.open_sensor(&port, SensorKind::Touch).is_err());
        drop(first);
        assert!(brick.open_sensor(&port, SensorKind::Touch).is_ok());
    }

    #[test]
    fn test_ideal_motor_rotation() {
        let brick = SimBrick::new();
        let port = brick.port("B").unwrap();
        let motor = brick.open_motor(&port, MotorKind::Large).unwrap();

        motor.rotate_by(360.0).unwrap();
        motor.rotate_by(-90.0).unwrap();
        assert_eq!(motor.tacho_count().unwrap(), 270.0);
        assert!(!motor.is_moving().unwrap());
    }

    #[test]
    fn test_running_motor_accumulates() {
        let brick = SimBrick::new();
        let port = brick.port("C").unwrap();
        let motor = brick.open_motor(&port, MotorKind::Large).unwrap();

        motor.set_speed(1000.0).unwrap();
        motor.forward().unwrap();
        assert!(motor.is_moving().unwrap());
        std::thread::sleep(std::time::Duration::from_millis(20));
        motor.stop().unwrap();
        assert!(motor.tacho_count().unwrap() > 0.0);
        assert!(!motor.is_moving().unwrap());
    }

    #[test]
    fn test_wrong_motor_kind() {
        let brick = SimBrick::new();
        let port = brick.port("A").unwrap();
        assert!(matches!(
            brick.open_motor(&port, MotorKind::Large),
            Err(DeviceError::WrongDevice { .. })
        ));
        let empty = brick.port("D").unwrap();
        assert!(matches!(
            brick.open_motor(&empty, MotorKind::Large),
            Err(DeviceError::NoDevice { .. })
        ));
    }
}
