//! Coordinate transform between the InjectMan motor axes and the workspace frame.
//!
//! The third motor axis is tilted by a fixed angle θ in the x/z plane. Calibration measures
//! three distances on the rig (`d1`, `d3`, `z`), from which
//! `sin θ = d1 / d3` and `cos θ = z / d3` are derived once and never recomputed.
//!
//! ```text
//! forward:  x = d1 - d3·sin θ     y = d2     z = d3·cos θ
//! inverse:  d3 = z / cos θ        d1 = x + d3·sin θ     d2 = y
//! ```
//!
//! All values are micrometers.

use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};
use std::ops::Add;

/// Calibration distances measured on the rig, in micrometers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Motor-1 travel across the calibration triangle.
    pub d1: f64,
    /// Motor-3 travel along the tilted axis.
    pub d3: f64,
    /// Vertical rise over the same triangle.
    pub z: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            d1: 11917.0,
            d3: 15557.0,
            z: 1e4,
        }
    }
}

/// Workspace position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Along motor 1.
    pub x: f64,
    /// Along motor 2.
    pub y: f64,
    /// Vertical.
    pub z: f64,
}

impl Position {
    /// Position from its coordinates.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

/// Motor-axis position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotorPosition {
    /// Motor 1 (horizontal).
    pub d1: f64,
    /// Motor 2 (horizontal, perpendicular).
    pub d2: f64,
    /// Motor 3 (tilted by θ from vertical).
    pub d3: f64,
}

impl MotorPosition {
    /// Position from its axis values.
    pub fn new(d1: f64, d2: f64, d3: f64) -> Self {
        Self { d1, d2, d3 }
    }

    /// Axis values in wire order.
    pub fn to_array(self) -> [f64; 3] {
        [self.d1, self.d2, self.d3]
    }
}

/// Trigonometric constants of the tilted axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    sin_theta: f64,
    cos_theta: f64,
}

impl Geometry {
    /// Derive the constants from calibration distances.
    ///
    /// # Errors
    ///
    /// [`DaqError::Configuration`] if any distance is non-finite, or if `d3` or `z` is zero
    /// (the inverse transform divides by `cos θ`).
    pub fn from_calibration(cal: &Calibration) -> AppResult<Self> {
        if ![cal.d1, cal.d3, cal.z].iter().all(|v| v.is_finite()) {
            return Err(DaqError::Configuration(format!(
                "calibration distances must be finite: {cal:?}"
            )));
        }
        if cal.d3 == 0.0 || cal.z == 0.0 {
            return Err(DaqError::Configuration(format!(
                "calibration d3 and z must be non-zero: {cal:?}"
            )));
        }
        Ok(Self {
            sin_theta: cal.d1 / cal.d3,
            cos_theta: cal.z / cal.d3,
        })
    }

    /// Use precomputed constants. `cos_theta` must be non-zero.
    pub fn new(sin_theta: f64, cos_theta: f64) -> Self {
        Self {
            sin_theta,
            cos_theta,
        }
    }

    /// `sin θ`
    pub fn sin_theta(&self) -> f64 {
        self.sin_theta
    }

    /// `cos θ`
    pub fn cos_theta(&self) -> f64 {
        self.cos_theta
    }

    /// Motor frame to workspace frame.
    pub fn motor_to_position(&self, m: MotorPosition) -> Position {
        Position {
            x: m.d1 - m.d3 * self.sin_theta,
            y: m.d2,
            z: m.d3 * self.cos_theta,
        }
    }

    /// Workspace frame to motor frame.
    pub fn position_to_motor(&self, p: Position) -> MotorPosition {
        let d3 = p.z / self.cos_theta;
        MotorPosition {
            d1: p.x + d3 * self.sin_theta,
            d2: p.y,
            d3,
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        let cal = Calibration::default();
        Self::new(cal.d1 / cal.d3, cal.z / cal.d3)
    }
}
