// Robot: owns the brick bindings, built once and borrowed by every consumer

use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use crate::config::RobotConfig;
use crate::device::Brick;
use crate::error::InitError;
use crate::init::{self, CancelToken, Devices};
use crate::messages::RobotStatus;
use crate::pilot::{DifferentialChassis, MotionLimits, Pilot, PoseEstimator, Wheel, WheelSpec};

/// Receives readiness transitions (LEDs, sound, display, telemetry...)
pub trait StatusIndicator: Send + Sync {
    fn show(&self, status: RobotStatus);
}

/// Indicator that only logs
pub struct LogIndicator;

impl StatusIndicator for LogIndicator {
    fn show(&self, status: RobotStatus) {
        match status {
            RobotStatus::Initializing => info!("Initializing..."),
            RobotStatus::Ready => info!("Ready!"),
            RobotStatus::Degraded => warn!("Ready, with missing sensors"),
            RobotStatus::Failed => error!("Initialization failed"),
        }
    }
}

/// Remembers the last status shown, for the runtime to publish
#[derive(Default)]
pub struct StatusCell(Mutex<Option<RobotStatus>>);

impl StatusCell {
    pub fn get(&self) -> Option<RobotStatus> {
        *self.0.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl StatusIndicator for StatusCell {
    fn show(&self, status: RobotStatus) {
        LogIndicator.show(status);
        *self.0.lock().unwrap_or_else(|p| p.into_inner()) = Some(status);
    }
}

/// The pilot and the pose estimator attached to it
pub struct Drive {
    pilot: Arc<Pilot>,
    pose: Arc<PoseEstimator>,
}

impl Drive {
    pub fn pilot(&self) -> &Arc<Pilot> {
        &self.pilot
    }

    pub fn pose(&self) -> &Arc<PoseEstimator> {
        &self.pose
    }
}

pub struct Robot {
    brick: Arc<dyn Brick>,
    config: RobotConfig,
    indicator: Arc<dyn StatusIndicator>,
    devices: OnceCell<Devices>,
    drive: OnceLock<Drive>,
}

impl Robot {
    pub fn new(brick: Arc<dyn Brick>, config: RobotConfig) -> Self {
        Self {
            brick,
            config,
            indicator: Arc::new(LogIndicator),
            devices: OnceCell::new(),
            drive: OnceLock::new(),
        }
    }

    pub fn with_indicator(mut self, indicator: Arc<dyn StatusIndicator>) -> Self {
        self.indicator = indicator;
        self
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    /// Open the actuators and every enabled sensor.
    ///
    /// Returns the existing devices without touching hardware if a previous
    /// call succeeded. Concurrent callers wait for the first one. Sensors that
    /// could not be acquired are listed in `Devices::failed` and the status
    /// becomes `Degraded`.
    pub async fn init_devices(&self, cancel: &CancelToken) -> Result<&Devices, InitError> {
        self.devices
            .get_or_try_init(|| async move {
                self.indicator.show(RobotStatus::Initializing);
                let result = init::initialize(
                    self.brick.clone(),
                    self.config.capabilities,
                    &self.config.retry,
                    cancel,
                )
                .await;
                self.indicator.show(match &result {
                    Ok(devices) if devices.failed().is_empty() => RobotStatus::Ready,
                    Ok(_) => RobotStatus::Degraded,
                    Err(_) => RobotStatus::Failed,
                });
                result
            })
            .await
    }

    pub fn devices(&self) -> Option<&Devices> {
        self.devices.get()
    }

    /// Build the pilot and pose estimator with the configured wheels and limits
    pub fn init_pilot(&self) -> Result<&Drive, InitError> {
        let wheels = self.config.wheels.specs();
        self.init_pilot_with(wheels, self.config.limits)
    }

    /// Build the pilot with explicit wheels and limits. A no-op when a pilot
    /// already exists.
    pub fn init_pilot_with(&self, wheels: (WheelSpec, WheelSpec), limits: MotionLimits) -> Result<&Drive, InitError> {
        if let Some(drive) = self.drive.get() {
            return Ok(drive);
        }
        let devices = self.devices().ok_or(InitError::NotInitialized)?;

        let chassis = DifferentialChassis::new(
            Wheel::new(devices.left_motor().clone(), wheels.0),
            Wheel::new(devices.right_motor().clone(), wheels.1),
        )?;
        let pilot = Arc::new(Pilot::new(chassis, limits)?);
        let pose = PoseEstimator::attach(&pilot)?;

        Ok(self.drive.get_or_init(|| Drive { pilot, pose }))
    }

    pub fn drive(&self) -> Option<&Drive> {
        self.drive.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MotorKind, SensorKind};
    use crate::init::{Capability, CapabilitySelection, RetryPolicy};
    use crate::port::Port;
    use crate::sim::{SimBrick, SimSensor};

    struct Recorder(Mutex<Vec<RobotStatus>>);

    impl StatusIndicator for Recorder {
        fn show(&self, status: RobotStatus) {
            self.0.lock().unwrap().push(status);
        }
    }

    fn config(selection: [bool; 4]) -> RobotConfig {
        RobotConfig {
            capabilities: CapabilitySelection::from_array(selection),
            retry: RetryPolicy::immediate(5),
            ..RobotConfig::default()
        }
    }

    #[tokio::test]
    async fn test_second_init_touches_nothing() {
        let brick = SimBrick::fully_equipped();
        let robot = Robot::new(Arc::new(brick.clone()), config([true, true, true, true]));
        let cancel = CancelToken::new();

        robot.init_devices(&cancel).await.unwrap();
        let ops = brick.ops().len();
        robot.init_devices(&cancel).await.unwrap();
        assert_eq!(brick.ops().len(), ops);
    }

    #[tokio::test]
    async fn test_ready_only_after_join() {
        let brick = SimBrick::new();
        brick.attach_sensor(
            &Port::resolve("S2").unwrap(),
            SimSensor::new(SensorKind::Gyro).absent_for(2),
        );
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let robot = Robot::new(Arc::new(brick), config([false, true, false, false]))
            .with_indicator(recorder.clone());

        let devices = robot.init_devices(&CancelToken::new()).await.unwrap();
        assert!(devices.gyro().is_some());
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![RobotStatus::Initializing, RobotStatus::Ready]
        );
    }

    #[tokio::test]
    async fn test_mode_failure_degrades_but_keeps_robot() {
        let brick = SimBrick::new();
        let s1 = Port::resolve("S1").unwrap();
        let s2 = Port::resolve("S2").unwrap();
        brick.attach_sensor(&s1, SimSensor::new(SensorKind::Touch).without_mode("Touch"));
        brick.attach_sensor(&s2, SimSensor::new(SensorKind::Gyro));
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let robot = Robot::new(Arc::new(brick.clone()), config([true, true, false, false]))
            .with_indicator(recorder.clone());

        let devices = robot.init_devices(&CancelToken::new()).await.unwrap();
        assert!(devices.touch().is_none());
        assert!(devices.gyro().is_some());
        assert_eq!(devices.failed().len(), 1);
        assert_eq!(devices.failed()[0].0, Capability::Touch);
        assert!(brick.is_bound(&s2));
        assert_eq!(recorder.0.lock().unwrap().last(), Some(&RobotStatus::Degraded));

        // The drive does not depend on the failed sensor
        let drive = robot.init_pilot().unwrap();
        drive.pilot().rotate(90.0).unwrap();
        assert!((drive.pose().pose().unwrap().heading - 90.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_init_is_not_cached() {
        let brick = SimBrick::new();
        let c = Port::resolve("C").unwrap();
        brick.attach_motor(&c, MotorKind::Medium);
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let robot = Robot::new(Arc::new(brick.clone()), config([false; 4])).with_indicator(recorder.clone());

        let err = robot.init_devices(&CancelToken::new()).await.err().unwrap();
        assert!(matches!(err, InitError::Actuator { ref port, .. } if port == "C"));
        assert!(robot.devices().is_none());
        assert_eq!(recorder.0.lock().unwrap().last(), Some(&RobotStatus::Failed));

        // The right drive motor plugged in later can still be acquired
        brick.attach_motor(&c, MotorKind::Large);
        assert!(robot.init_devices(&CancelToken::new()).await.is_ok());
        assert_eq!(recorder.0.lock().unwrap().last(), Some(&RobotStatus::Ready));
    }

    #[tokio::test]
    async fn test_pilot_requires_devices_and_is_built_once() {
        let robot = Robot::new(Arc::new(SimBrick::new()), config([false; 4]));
        assert!(matches!(robot.init_pilot(), Err(InitError::NotInitialized)));

        robot.init_devices(&CancelToken::new()).await.unwrap();
        let first = Arc::as_ptr(robot.init_pilot().unwrap().pilot());
        let second = Arc::as_ptr(robot.init_pilot().unwrap().pilot());
        assert_eq!(first, second);

        let limits = robot.drive().unwrap().pilot().limits();
        assert_eq!(limits, MotionLimits::default());
    }

    #[tokio::test]
    async fn test_pilot_overrides() {
        let robot = Robot::new(Arc::new(SimBrick::new()), config([false; 4]));
        robot.init_devices(&CancelToken::new()).await.unwrap();

        let limits = MotionLimits {
            linear_speed: 0.1,
            ..MotionLimits::default()
        };
        let wheels = (WheelSpec::new(0.043, 0.08), WheelSpec::new(0.043, -0.08));
        let drive = robot.init_pilot_with(wheels, limits).unwrap();
        assert_eq!(drive.pilot().limits().linear_speed, 0.1);
        assert!((drive.pilot().chassis().track_width() - 0.16).abs() < 1e-12);

        drive.pilot().rotate(90.0).unwrap();
        drive.pilot().rotate(-90.0).unwrap();
        assert!(drive.pose().pose().unwrap().heading.abs() < 1e-9);
    }
}
