// Dead-reckoning pose estimation from the pilot's wheel travel

use std::sync::{Arc, Mutex, Weak};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PilotError;

use super::move_pilot::{MoveListener, Pilot};

/// Estimated position (meters) and heading (degrees, (-180, 180], CCW positive)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

/// Normalize an angle in degrees into (-180, 180]
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped > 180.0 { wrapped - 360.0 } else { wrapped }
}

/// Arc-model differential odometry state
#[derive(Debug, Clone)]
struct Odometry {
    track_width: f64,
    last: (f64, f64),
    x: f64,
    y: f64,
    theta: f64, // radians, unwrapped
}

impl Odometry {
    fn new(track_width: f64, start: (f64, f64)) -> Self {
        Self {
            track_width,
            last: start,
            x: 0.0,
            y: 0.0,
            theta: 0.0,
        }
    }

    /// Fold in absolute wheel travel
    fn integrate(&mut self, left: f64, right: f64) {
        let delta_left = left - self.last.0;
        let delta_right = right - self.last.1;
        self.last = (left, right);

        let delta_theta = (delta_right - delta_left) / self.track_width;
        let delta_linear = (delta_left + delta_right) / 2.0;

        if delta_theta.abs() < 1e-9 {
            // Straight line
            self.x += delta_linear * self.theta.cos();
            self.y += delta_linear * self.theta.sin();
        } else {
            // Arc of radius delta_linear / delta_theta; zero for in-place turns
            let radius = delta_linear / delta_theta;
            let end = self.theta + delta_theta;
            self.x += radius * (end.sin() - self.theta.sin());
            self.y += radius * (self.theta.cos() - end.cos());
        }
        self.theta += delta_theta;
    }

    fn pose(&self) -> Pose {
        Pose {
            x: self.x,
            y: self.y,
            heading: normalize_degrees(self.theta.to_degrees()),
        }
    }
}

/// Tracks the robot pose by integrating the pilot's wheel motion.
///
/// Error accumulates with distance and turning; nothing corrects it.
pub struct PoseEstimator {
    pilot: Arc<Pilot>,
    odometry: Mutex<Odometry>,
}

impl PoseEstimator {
    /// Attach to a pilot; the current position becomes the origin
    pub fn attach(pilot: &Arc<Pilot>) -> Result<Arc<Self>, PilotError> {
        let start = pilot.wheel_travel()?;
        let estimator = Arc::new(Self {
            pilot: pilot.clone(),
            odometry: Mutex::new(Odometry::new(pilot.chassis().track_width(), start)),
        });
        let listener: Weak<dyn MoveListener> = Arc::downgrade(&estimator) as Weak<dyn MoveListener>;
        pilot.add_listener(listener);
        Ok(estimator)
    }

    /// Current estimate, including any motion still in progress
    pub fn pose(&self) -> Result<Pose, PilotError> {
        self.pilot.sync()?;
        Ok(self.last_pose())
    }

    /// Estimate as of the last pilot report, without touching the motors
    pub fn last_pose(&self) -> Pose {
        self.odometry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pose()
    }
}

impl MoveListener for PoseEstimator {
    fn wheels_moved(&self, left: f64, right: f64) {
        let mut odometry = self
            .odometry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        odometry.integrate(left, right);
        let pose = odometry.pose();
        debug!(
            "Pose: x={:.3} y={:.3} heading={:.1}",
            pose.x, pose.y, pose.heading
        );
    }
}
