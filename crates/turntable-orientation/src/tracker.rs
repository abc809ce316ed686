//! [`Orientation`] – world-frame yaw/pitch/roll readings.
//!
//! A reading decomposes the model's world rotation as yaw about world up,
//! then pitch about world right, then roll (R = Ry · Rx · Rz).  Every
//! component is normalised to `[0, 360)` degrees.
//!
//! Deltas between two readings are the shortest signed difference per axis,
//! wrapped by [`wrap180`] into `[-180, 180)`, so crossing the 0°/360° seam
//! gives a small step rather than a near-full turn.
//!
//! # Example
//!
//! ```rust
//! use turntable_orientation::tracker::Orientation;
//!
//! let before = Orientation::new(10.0, 0.0, 0.0);
//! let after = Orientation::new(355.0, 0.0, 0.0);
//! assert_eq!(before.delta_to(&after).yaw, -15.0);
//! ```

use tracing::trace;
use turntable_types::Angles;

use crate::rotation::Quaternion;

/// Limit beyond which the pitch is treated as gimbal-locked.
const GIMBAL_LIMIT: f32 = 0.999_99;

/// Normalise `degrees` into `[0, 360)`.
pub fn normalize360(degrees: f32) -> f32 {
    // f64 holds every f32 sum and remainder below exactly.
    let r = (f64::from(degrees)).rem_euclid(360.0) as f32;
    // Rounding can land exactly on 360 for tiny negative inputs.
    if r >= 360.0 { 0.0 } else { r }
}

/// Wrap an angular difference into `[-180, 180)`.
///
/// Periodic with period 360 and idempotent: `wrap180(350.0) == -10.0`,
/// `wrap180(181.0) == -179.0`, `wrap180(180.0) == -180.0`.  The shift and
/// the remainder are taken in f64, so `wrap180(d) == wrap180(d + 360.0)`
/// holds exactly whenever `d + 360.0` is itself representable.
pub fn wrap180(degrees: f32) -> f32 {
    let w = ((f64::from(degrees) + 180.0).rem_euclid(360.0) - 180.0) as f32;
    if w >= 180.0 { -180.0 } else { w }
}

/// World-frame orientation reading in degrees, each axis in `[0, 360)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Orientation {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl Orientation {
    /// Build a reading, normalising every component into `[0, 360)`.
    pub fn new(yaw: f32, pitch: f32, roll: f32) -> Self {
        Self {
            yaw: normalize360(yaw),
            pitch: normalize360(pitch),
            roll: normalize360(roll),
        }
    }

    /// Extract yaw, pitch and roll from a world rotation.
    ///
    /// Near ±90° pitch the yaw and roll axes coincide; the whole residual
    /// rotation is then attributed to yaw and roll is reported as 0.
    pub fn from_quaternion(q: Quaternion) -> Self {
        let m = q.normalize().to_matrix();
        let m23 = m[1][2].clamp(-1.0, 1.0);
        let pitch = (-m23).asin();
        let (yaw, roll) = if m23.abs() < GIMBAL_LIMIT {
            (m[0][2].atan2(m[2][2]), m[1][0].atan2(m[1][1]))
        } else {
            trace!(m23, "pitch at gimbal limit; roll folded into yaw");
            ((-m[2][0]).atan2(m[0][0]), 0.0)
        };
        Self::new(yaw.to_degrees(), pitch.to_degrees(), roll.to_degrees())
    }

    /// Shortest signed per-axis change from `self` to `after`.
    pub fn delta_to(&self, after: &Orientation) -> OrientationDelta {
        OrientationDelta {
            yaw: wrap180(after.yaw - self.yaw),
            pitch: wrap180(after.pitch - self.pitch),
            roll: wrap180(after.roll - self.roll),
        }
    }

    /// Reading obtained by adding `delta` to this one (modulo 360).
    pub fn apply(&self, delta: &OrientationDelta) -> Orientation {
        Orientation::new(self.yaw + delta.yaw, self.pitch + delta.pitch, self.roll + delta.roll)
    }

    /// Yaw/pitch pair as logged on the wire.
    pub fn angles(&self) -> Angles {
        Angles {
            yaw: self.yaw,
            pitch: self.pitch,
        }
    }
}

/// Wrap-corrected difference between two [`Orientation`] readings; every
/// component lies in `[-180, 180)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrientationDelta {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl OrientationDelta {
    pub fn angles(&self) -> Angles {
        Angles {
            yaw: self.yaw,
            pitch: self.pitch,
        }
    }
}
