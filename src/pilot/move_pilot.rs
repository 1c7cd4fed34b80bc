// Motion planner over a differential chassis
//
// Primitives: forward/backward (run until stopped), rotate and travel
// (blocking until the wheels settle), stop. Registered move listeners are told
// the absolute wheel travel at every primitive boundary and on `sync`.

use std::sync::{Mutex, MutexGuard, Weak};
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ANGULAR_ACCELERATION, ANGULAR_SPEED, LINEAR_ACCELERATION, LINEAR_SPEED};
use crate::error::{DeviceError, PilotError};

use super::chassis::{DifferentialChassis, WheelAngles};

/// How often a blocking move polls the wheels
const SETTLE_POLL: Duration = Duration::from_millis(5);

/// Speed and acceleration limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionLimits {
    pub linear_speed: f64,        // m/s
    pub linear_acceleration: f64, // m/s^2
    pub angular_speed: f64,       // deg/s
    pub angular_acceleration: f64, // deg/s^2
}

impl Default for MotionLimits {
    fn default() -> Self {
        Self {
            linear_speed: LINEAR_SPEED,
            linear_acceleration: LINEAR_ACCELERATION,
            angular_speed: ANGULAR_SPEED,
            angular_acceleration: ANGULAR_ACCELERATION,
        }
    }
}

impl MotionLimits {
    fn validate(&self) -> Result<(), PilotError> {
        for (name, value) in [
            ("linear_speed", self.linear_speed),
            ("linear_acceleration", self.linear_acceleration),
            ("angular_speed", self.angular_speed),
            ("angular_acceleration", self.angular_acceleration),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(PilotError::Limit { name, value });
            }
        }
        Ok(())
    }
}

/// Current motion command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Motion {
    Idle,
    Forward,
    Backward,
    Rotating,
    Travelling,
}

/// Receives absolute wheel travel (meters) from the pilot
pub trait MoveListener: Send + Sync {
    fn wheels_moved(&self, left: f64, right: f64);
}

pub struct Pilot {
    chassis: DifferentialChassis,
    limits: Mutex<MotionLimits>,
    motion: Mutex<Motion>,
    listeners: Mutex<Vec<Weak<dyn MoveListener>>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Pilot {
    pub fn new(chassis: DifferentialChassis, limits: MotionLimits) -> Result<Self, PilotError> {
        limits.validate()?;
        info!(
            "Pilot ready: track {:.3} m, {:.2} m/s, {:.0} deg/s",
            chassis.track_width(),
            limits.linear_speed,
            limits.angular_speed
        );
        Ok(Self {
            chassis,
            limits: Mutex::new(limits),
            motion: Mutex::new(Motion::Idle),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn chassis(&self) -> &DifferentialChassis {
        &self.chassis
    }

    pub fn limits(&self) -> MotionLimits {
        *guard(&self.limits)
    }

    /// Replace all limits at once; takes effect from the next primitive
    pub fn set_limits(&self, limits: MotionLimits) -> Result<(), PilotError> {
        limits.validate()?;
        *guard(&self.limits) = limits;
        Ok(())
    }

    pub fn set_linear_speed(&self, speed: f64) -> Result<(), PilotError> {
        self.update_limits(|l| l.linear_speed = speed)
    }

    pub fn set_linear_acceleration(&self, acceleration: f64) -> Result<(), PilotError> {
        self.update_limits(|l| l.linear_acceleration = acceleration)
    }

    pub fn set_angular_speed(&self, speed: f64) -> Result<(), PilotError> {
        self.update_limits(|l| l.angular_speed = speed)
    }

    pub fn set_angular_acceleration(&self, acceleration: f64) -> Result<(), PilotError> {
        self.update_limits(|l| l.angular_acceleration = acceleration)
    }

    fn update_limits(&self, change: impl FnOnce(&mut MotionLimits)) -> Result<(), PilotError> {
        let mut limits = guard(&self.limits);
        let mut next = *limits;
        change(&mut next);
        next.validate()?;
        *limits = next;
        Ok(())
    }

    pub fn motion(&self) -> Motion {
        *guard(&self.motion)
    }

    pub fn is_moving(&self) -> Result<bool, PilotError> {
        Ok(self.chassis.left().motor.is_moving()? || self.chassis.right().motor.is_moving()?)
    }

    pub fn add_listener(&self, listener: Weak<dyn MoveListener>) {
        guard(&self.listeners).push(listener);
    }

    /// Absolute meters rolled by the left and right wheels
    pub fn wheel_travel(&self) -> Result<(f64, f64), PilotError> {
        let tacho = WheelAngles {
            left: self.chassis.left().motor.tacho_count()?,
            right: self.chassis.right().motor.tacho_count()?,
        };
        Ok(self.chassis.wheel_meters(tacho))
    }

    /// Report the current wheel travel to every live listener
    pub fn sync(&self) -> Result<(), PilotError> {
        let (left, right) = self.wheel_travel()?;
        let listeners: Vec<_> = {
            let mut listeners = guard(&self.listeners);
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.wheels_moved(left, right);
        }
        Ok(())
    }

    /// Drive straight ahead at the linear speed until stopped
    pub fn forward(&self) -> Result<(), PilotError> {
        self.run(Motion::Forward)
    }

    /// Drive straight back at the linear speed until stopped
    pub fn backward(&self) -> Result<(), PilotError> {
        self.run(Motion::Backward)
    }

    fn run(&self, motion: Motion) -> Result<(), PilotError> {
        self.sync()?;
        self.apply_linear_limits()?;
        let (left, right) = (&self.chassis.left().motor, &self.chassis.right().motor);
        match motion {
            Motion::Backward => {
                left.backward()?;
                right.backward()?;
            }
            _ => {
                left.forward()?;
                right.forward()?;
            }
        }
        debug!("Pilot running {:?}", motion);
        *guard(&self.motion) = motion;
        Ok(())
    }

    /// Turn in place by `degrees` (positive = counter-clockwise), blocking
    /// until the turn completes
    pub fn rotate(&self, degrees: f64) -> Result<(), PilotError> {
        self.sync()?;
        self.apply_angular_limits()?;
        debug!("Pilot rotating {:.1} deg", degrees);
        let angles = self.chassis.rotation_angles(degrees);
        self.move_blocking(Motion::Rotating, angles)
    }

    /// Roll `meters` straight (negative = backwards), blocking until done
    pub fn travel(&self, meters: f64) -> Result<(), PilotError> {
        self.sync()?;
        self.apply_linear_limits()?;
        debug!("Pilot travelling {:.3} m", meters);
        let angles = self.chassis.travel_angles(meters);
        self.move_blocking(Motion::Travelling, angles)
    }

    /// Halt both wheels immediately
    pub fn stop(&self) -> Result<(), PilotError> {
        self.chassis.left().motor.stop()?;
        self.chassis.right().motor.stop()?;
        *guard(&self.motion) = Motion::Idle;
        debug!("Pilot stopped");
        self.sync()
    }

    fn move_blocking(&self, motion: Motion, angles: WheelAngles) -> Result<(), PilotError> {
        *guard(&self.motion) = motion;
        let result = self.turn_wheels(angles);
        *guard(&self.motion) = Motion::Idle;
        result?;
        self.sync()
    }

    fn turn_wheels(&self, angles: WheelAngles) -> Result<(), DeviceError> {
        let (left, right) = (&self.chassis.left().motor, &self.chassis.right().motor);
        left.rotate_by(angles.left)?;
        right.rotate_by(angles.right)?;
        while left.is_moving()? || right.is_moving()? {
            sleep(SETTLE_POLL);
        }
        Ok(())
    }

    fn apply_linear_limits(&self) -> Result<(), DeviceError> {
        let limits = self.limits();
        self.apply_rates(
            self.chassis.linear_rates(limits.linear_speed),
            self.chassis.linear_rates(limits.linear_acceleration),
        )
    }

    fn apply_angular_limits(&self) -> Result<(), DeviceError> {
        let limits = self.limits();
        self.apply_rates(
            self.chassis.angular_rates(limits.angular_speed),
            self.chassis.angular_rates(limits.angular_acceleration),
        )
    }

    fn apply_rates(&self, speed: WheelAngles, acceleration: WheelAngles) -> Result<(), DeviceError> {
        let (left, right) = (&self.chassis.left().motor, &self.chassis.right().motor);
        left.set_speed(speed.left)?;
        right.set_speed(speed.right)?;
        left.set_acceleration(acceleration.left)?;
        right.set_acceleration(acceleration.right)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Brick, MotorKind};
    use crate::pilot::{Wheel, WheelSpec};
    use crate::sim::SimBrick;
    use std::sync::Arc;

    fn pilot(brick: &SimBrick) -> Pilot {
        let open = |name: &str, offset: f64| {
            let port = brick.port(name).unwrap();
            let motor = brick.open_motor(&port, MotorKind::Large).unwrap();
            Wheel::new(Arc::from(motor), WheelSpec::new(0.056, offset))
        };
        let chassis = DifferentialChassis::new(open("B", 0.06), open("C", -0.06)).unwrap();
        Pilot::new(chassis, MotionLimits::default()).unwrap()
    }

    #[test]
    fn test_default_limits_are_exact() {
        let pilot = pilot(&SimBrick::new());
        let limits = pilot.limits();
        assert_eq!(limits.linear_speed, 0.3);
        assert_eq!(limits.linear_acceleration, 0.9);
        assert_eq!(limits.angular_speed, 180.0);
        assert_eq!(limits.angular_acceleration, 540.0);
    }

    #[test]
    fn test_limit_validation() {
        let pilot = pilot(&SimBrick::new());
        assert!(matches!(
            pilot.set_linear_speed(0.0),
            Err(PilotError::Limit { name: "linear_speed", .. })
        ));
        assert!(pilot.set_angular_acceleration(f64::NAN).is_err());
        // A rejected change leaves the previous limits untouched
        assert_eq!(pilot.limits(), MotionLimits::default());

        pilot.set_angular_speed(90.0).unwrap();
        assert_eq!(pilot.limits().angular_speed, 90.0);
    }

    #[test]
    fn test_forward_sets_wheel_speed_and_stop_idles() {
        let brick = SimBrick::new();
        let pilot = pilot(&brick);

        pilot.forward().unwrap();
        assert_eq!(pilot.motion(), Motion::Forward);
        assert!(pilot.is_moving().unwrap());

        let (speed, accel) = brick.motor_settings(&brick.port("B").unwrap()).unwrap();
        let per_meter = WheelSpec::new(0.056, 0.06).degrees_per_meter();
        assert!((speed - 0.3 * per_meter).abs() < 1e-9);
        assert!((accel - 0.9 * per_meter).abs() < 1e-9);

        pilot.stop().unwrap();
        assert_eq!(pilot.motion(), Motion::Idle);
        assert!(!pilot.is_moving().unwrap());
    }

    #[test]
    fn test_rotate_and_travel_block_until_settled() {
        let brick = SimBrick::new();
        let pilot = pilot(&brick);

        pilot.rotate(90.0).unwrap();
        assert_eq!(pilot.motion(), Motion::Idle);
        let (left, right) = pilot.wheel_travel().unwrap();
        assert!((right - std::f64::consts::FRAC_PI_2 * 0.06).abs() < 1e-9);
        assert!((left + right).abs() < 1e-9);

        pilot.travel(0.5).unwrap();
        let (left2, right2) = pilot.wheel_travel().unwrap();
        assert!((left2 - left - 0.5).abs() < 1e-9);
        assert!((right2 - right - 0.5).abs() < 1e-9);
    }

    struct Recorder(Mutex<Vec<(f64, f64)>>);

    impl MoveListener for Recorder {
        fn wheels_moved(&self, left: f64, right: f64) {
            self.0.lock().unwrap().push((left, right));
        }
    }

    #[test]
    fn test_listeners_see_primitive_boundaries() {
        let pilot = pilot(&SimBrick::new());
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let weak: Weak<dyn MoveListener> = Arc::downgrade(&recorder) as Weak<dyn MoveListener>;
        pilot.add_listener(weak);

        pilot.travel(0.1).unwrap();
        let seen = recorder.0.lock().unwrap().clone();
        // Once before the move, once after
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (0.0, 0.0));
        assert!((seen[1].0 - 0.1).abs() < 1e-9);

        drop(recorder);
        pilot.travel(0.1).unwrap();
        assert!(guard(&pilot.listeners).is_empty());
    }
}
