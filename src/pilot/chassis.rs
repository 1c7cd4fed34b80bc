// Differential-drive chassis model
// Converts body motions (meters, degrees of heading) into wheel shaft rotations.

use std::f64::consts::PI;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::device::RegulatedMotor;
use crate::error::PilotError;

/// Tolerance when checking that the two wheel offsets mirror each other
const OFFSET_TOLERANCE: f64 = 1e-9;

/// One wheel: diameter and signed lateral offset from the centerline (meters).
/// Positive offsets are on the left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelSpec {
    pub diameter: f64,
    pub offset: f64,
}

impl WheelSpec {
    pub fn new(diameter: f64, offset: f64) -> Self {
        Self { diameter, offset }
    }

    /// Shaft degrees for one meter of rolling
    pub fn degrees_per_meter(&self) -> f64 {
        360.0 / (PI * self.diameter)
    }

    /// Meters rolled for `degrees` of shaft rotation
    pub fn meters(&self, degrees: f64) -> f64 {
        degrees / self.degrees_per_meter()
    }
}

/// A wheel spec bound to the motor driving it
#[derive(Clone)]
pub struct Wheel {
    pub motor: Arc<dyn RegulatedMotor>,
    pub spec: WheelSpec,
}

impl Wheel {
    pub fn new(motor: Arc<dyn RegulatedMotor>, spec: WheelSpec) -> Self {
        Self { motor, spec }
    }
}

/// Shaft rotations (degrees) for a pair of wheels
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelAngles {
    pub left: f64,
    pub right: f64,
}

/// Two-wheel differential chassis
pub struct DifferentialChassis {
    left: Wheel,
    right: Wheel,
}

impl DifferentialChassis {
    /// Build a chassis from two wheels in either order. The offsets must be
    /// non-zero, of equal magnitude and opposite sign.
    pub fn new(a: Wheel, b: Wheel) -> Result<Self, PilotError> {
        for wheel in [&a, &b] {
            if !(wheel.spec.diameter > 0.0 && wheel.spec.diameter.is_finite()) {
                return Err(PilotError::Geometry(format!(
                    "wheel diameter must be positive, got {}",
                    wheel.spec.diameter
                )));
            }
            if wheel.spec.offset == 0.0 || !wheel.spec.offset.is_finite() {
                return Err(PilotError::Geometry(format!(
                    "wheel offset must be non-zero, got {}",
                    wheel.spec.offset
                )));
            }
        }
        if (a.spec.offset + b.spec.offset).abs() > OFFSET_TOLERANCE {
            return Err(PilotError::Geometry(format!(
                "wheel offsets {} and {} are not mirrored",
                a.spec.offset, b.spec.offset
            )));
        }

        let (left, right) = if a.spec.offset > 0.0 { (a, b) } else { (b, a) };
        Ok(Self { left, right })
    }

    pub fn left(&self) -> &Wheel {
        &self.left
    }

    pub fn right(&self) -> &Wheel {
        &self.right
    }

    /// Distance between the wheel contact points (meters)
    pub fn track_width(&self) -> f64 {
        self.left.spec.offset - self.right.spec.offset
    }

    /// Shaft rotations to roll `meters` straight ahead
    pub fn travel_angles(&self, meters: f64) -> WheelAngles {
        WheelAngles {
            left: meters * self.left.spec.degrees_per_meter(),
            right: meters * self.right.spec.degrees_per_meter(),
        }
    }

    /// Shaft rotations to turn the chassis in place by `degrees`
    /// (positive = counter-clockwise, left wheel rolls back)
    pub fn rotation_angles(&self, degrees: f64) -> WheelAngles {
        let radians = degrees.to_radians();
        WheelAngles {
            left: -radians * self.left.spec.offset * self.left.spec.degrees_per_meter(),
            right: -radians * self.right.spec.offset * self.right.spec.degrees_per_meter(),
        }
    }

    /// Shaft rates (deg/s) for a linear rate in m/s (also used for m/s^2)
    pub fn linear_rates(&self, per_sec: f64) -> WheelAngles {
        self.travel_angles(per_sec.abs())
    }

    /// Shaft rates (deg/s) for a heading rate in deg/s (also used for deg/s^2)
    pub fn angular_rates(&self, per_sec: f64) -> WheelAngles {
        let angles = self.rotation_angles(per_sec.abs());
        WheelAngles {
            left: angles.left.abs(),
            right: angles.right.abs(),
        }
    }

    /// Meters rolled by each wheel given tachometer readings (degrees)
    pub fn wheel_meters(&self, tacho: WheelAngles) -> (f64, f64) {
        (
            self.left.spec.meters(tacho.left),
            self.right.spec.meters(tacho.right),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Brick, MotorKind};
    use crate::sim::SimBrick;

    fn wheel(brick: &SimBrick, port: &str, offset: f64) -> Wheel {
        let port = brick.port(port).unwrap();
        let motor = brick.open_motor(&port, MotorKind::Large).unwrap();
        Wheel::new(Arc::from(motor), WheelSpec::new(0.056, offset))
    }

    fn chassis() -> DifferentialChassis {
        let brick = SimBrick::new();
        DifferentialChassis::new(wheel(&brick, "B", 0.06), wheel(&brick, "C", -0.06)).unwrap()
    }

    #[test]
    fn test_track_width() {
        assert!((chassis().track_width() - 0.12).abs() < 1e-12);
    }

    #[test]
    fn test_wheel_order_is_normalized() {
        let brick = SimBrick::new();
        let chassis =
            DifferentialChassis::new(wheel(&brick, "C", -0.06), wheel(&brick, "B", 0.06)).unwrap();
        assert_eq!(chassis.left().motor.port().name(), "B");
        assert_eq!(chassis.right().motor.port().name(), "C");
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let brick = SimBrick::new();
        assert!(DifferentialChassis::new(wheel(&brick, "B", 0.06), wheel(&brick, "C", -0.05)).is_err());
        assert!(DifferentialChassis::new(wheel(&brick, "B", 0.06), wheel(&brick, "C", 0.06)).is_err());
        assert!(DifferentialChassis::new(wheel(&brick, "B", 0.0), wheel(&brick, "C", 0.0)).is_err());

        let port = brick.port("B").unwrap();
        let motor: Arc<dyn RegulatedMotor> = Arc::from(brick.open_motor(&port, MotorKind::Large).unwrap());
        let flat = Wheel::new(motor.clone(), WheelSpec::new(0.0, 0.06));
        let other = Wheel::new(motor, WheelSpec::new(0.056, -0.06));
        assert!(matches!(
            DifferentialChassis::new(flat, other),
            Err(PilotError::Geometry(_))
        ));
    }

    #[test]
    fn test_one_circumference_is_one_turn() {
        let chassis = chassis();
        let angles = chassis.travel_angles(PI * 0.056);
        assert!((angles.left - 360.0).abs() < 1e-9);
        assert!((angles.right - 360.0).abs() < 1e-9);
    }

    #[test]
    fn test_rotation_spins_wheels_opposite() {
        let chassis = chassis();
        let angles = chassis.rotation_angles(90.0);
        // Counter-clockwise: left back, right forward
        assert!(angles.left < 0.0);
        assert!(angles.right > 0.0);
        assert!((angles.left + angles.right).abs() < 1e-9);

        // Each wheel rolls a quarter of the turning circle
        let arc = PI / 2.0 * 0.06;
        assert!((chassis.left().spec.meters(angles.right) - arc).abs() < 1e-12);
    }

    #[test]
    fn test_rates_are_magnitudes() {
        let chassis = chassis();
        let rates = chassis.angular_rates(-180.0);
        assert!(rates.left > 0.0 && rates.right > 0.0);
        assert_eq!(chassis.linear_rates(-0.3), chassis.linear_rates(0.3));
    }
}
