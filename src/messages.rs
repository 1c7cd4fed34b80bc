// Define message types exchanged with the runtime

use serde::{Deserialize, Serialize};

use crate::pilot::{Motion, Pose};

// Command from teleop/scripts -> runtime
// Internally tagged: {"cmd": "rotate", "degrees": 90.0}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum MotionCommand {
    Forward,
    Backward,
    Rotate { degrees: f64 },
    Travel { meters: f64 },
    Stop,
}

/// Readiness published by the runtime and shown by status indicators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    Initializing,
    Ready,
    /// Running, but some enabled sensors could not be acquired
    Degraded,
    Failed,
}

// Pose estimate published by the runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PoseReport {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub motion: Motion,
}

impl PoseReport {
    pub fn new(pose: Pose, motion: Motion) -> Self {
        Self {
            x: pose.x,
            y: pose.y,
            heading: pose.heading,
            motion,
        }
    }
}
