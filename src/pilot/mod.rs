// Kinematic pilot for the differential-drive base
//
// Provides:
// - Differential chassis model (wheel geometry -> shaft rotations)
// - Motion planner with speed/acceleration limits
// - Dead-reckoning pose estimator fed by the planner

mod chassis;
mod move_pilot;
mod pose;

pub use chassis::{DifferentialChassis, Wheel, WheelAngles, WheelSpec};
pub use move_pilot::{Motion, MotionLimits, MoveListener, Pilot};
pub use pose::{Pose, PoseEstimator, normalize_degrees};
