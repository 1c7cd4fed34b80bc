// Color sensor: reflected red, RGB and color classification

use serde::{Deserialize, Serialize};

use crate::device::{Brick, SensorKind};
use crate::error::DeviceError;
use crate::port::Port;

use super::{ModeRequest, Sampler};

const RED: usize = 0;
const RGB: usize = 1;
const COLOR_ID: usize = 2;

const MODES: [ModeRequest; 3] = [
    ModeRequest::new("Red", 1),
    ModeRequest::new("RGB", 3),
    ModeRequest::new("ColorID", 1),
];

/// Surface colors the sensor can classify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorId {
    None,
    Red,
    Green,
    Blue,
    Yellow,
    White,
    Black,
    Brown,
}

impl ColorId {
    pub const ALL: [ColorId; 8] = [
        Self::None,
        Self::Red,
        Self::Green,
        Self::Blue,
        Self::Yellow,
        Self::White,
        Self::Black,
        Self::Brown,
    ];

    /// Map a raw color id; anything outside the identifiable set is `None`
    pub fn from_id(id: i32) -> Self {
        match id {
            0 => Self::Red,
            1 => Self::Green,
            2 => Self::Blue,
            3 => Self::Yellow,
            6 => Self::White,
            7 => Self::Black,
            13 => Self::Brown,
            _ => Self::None,
        }
    }

    pub fn id(self) -> i32 {
        match self {
            Self::None => -1,
            Self::Red => 0,
            Self::Green => 1,
            Self::Blue => 2,
            Self::Yellow => 3,
            Self::White => 6,
            Self::Black => 7,
            Self::Brown => 13,
        }
    }
}

fn unit(v: f32) -> f64 {
    if v.is_nan() { 0.0 } else { (v as f64).clamp(0.0, 1.0) }
}

pub struct ColorSensor {
    sampler: Sampler,
}

impl ColorSensor {
    pub const KIND: SensorKind = SensorKind::Color;

    pub fn open(brick: &dyn Brick, port: &Port) -> Result<Self, DeviceError> {
        let device = brick.open_sensor(port, Self::KIND)?;
        Ok(Self {
            sampler: Sampler::negotiate(device, &MODES)?,
        })
    }

    /// Reflected light from the red LED, normalized to [0, 1]
    pub fn reflected_red(&self) -> Result<f64, DeviceError> {
        self.sampler.read(RED, |s| unit(s[0]))
    }

    /// Reflected red, green and blue under white light, each in [0, 1]
    pub fn reflected_rgb(&self) -> Result<[f64; 3], DeviceError> {
        self.sampler.read(RGB, |s| [unit(s[0]), unit(s[1]), unit(s[2])])
    }

    /// Classified surface color
    pub fn color(&self) -> Result<ColorId, DeviceError> {
        self.sampler.read(COLOR_ID, |s| {
            if s[0].is_finite() {
                ColorId::from_id(s[0] as i32)
            } else {
                ColorId::None
            }
        })
    }

    pub fn port(&self) -> &Port {
        self.sampler.port()
    }
}
