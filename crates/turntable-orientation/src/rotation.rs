//! Rotation primitives.
//!
//! World convention: +Y is up, the default camera sits on +Z looking down -Z,
//! so camera right is +X.  Angles passed to the public API are in degrees
//! unless a parameter name says `rad`.
//!
//! # Example
//!
//! ```rust
//! use turntable_orientation::rotation::{CameraAxes, Quaternion};
//!
//! let axes = CameraAxes::default_view();
//! // Turn the model 5° to the viewer's right.
//! let q = Quaternion::identity().rotate_on_world_axis(axes.up, 5.0);
//! assert!((q.w - 2.5f32.to_radians().cos()).abs() < 1e-6);
//! assert!((q.y - 2.5f32.to_radians().sin()).abs() < 1e-6);
//! ```

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// World up (+Y).
    pub fn up() -> Self {
        Self::new(0.0, 1.0, 0.0)
    }

    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector in the same direction; the zero vector is returned as-is.
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == 0.0 {
            self
        } else {
            Self::new(self.x / len, self.y / len, self.z / len)
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Quaternion
// ────────────────────────────────────────────────────────────────────────────

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `degrees` about `axis` (normalised internally).
    pub fn from_axis_angle(axis: Vec3, degrees: f32) -> Self {
        let axis = axis.normalize();
        let half = degrees.to_radians() * 0.5;
        let s = half.sin();
        Self::new(half.cos(), axis.x * s, axis.y * s, axis.z * s)
    }

    /// Rotation built as yaw about Y, then pitch about X, then roll about Z
    /// (R = Ry · Rx · Rz).
    pub fn from_yaw_pitch_roll(yaw: f32, pitch: f32, roll: f32) -> Self {
        let qy = Self::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), yaw);
        let qx = Self::from_axis_angle(Vec3::new(1.0, 0.0, 0.0), pitch);
        let qz = Self::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), roll);
        qy.mul(qx).mul(qz)
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rescale to unit length, removing drift accumulated over many steps.
    pub fn normalize(self) -> Self {
        let n = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if n == 0.0 {
            Self::identity()
        } else {
            Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
        }
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// Apply a rotation of `degrees` about a world-space `axis` on top of the
    /// current rotation (the world rotation is premultiplied).
    pub fn rotate_on_world_axis(self, axis: Vec3, degrees: f32) -> Self {
        Self::from_axis_angle(axis, degrees).mul(self).normalize()
    }

    /// Row-major 3×3 rotation matrix.
    pub fn to_matrix(self) -> [[f32; 3]; 3] {
        let Self { w, x, y, z } = self;
        [
            [
                1.0 - 2.0 * (y * y + z * z),
                2.0 * (x * y - w * z),
                2.0 * (x * z + w * y),
            ],
            [
                2.0 * (x * y + w * z),
                1.0 - 2.0 * (x * x + z * z),
                2.0 * (y * z - w * x),
            ],
            [
                2.0 * (x * z - w * y),
                2.0 * (y * z + w * x),
                1.0 - 2.0 * (x * x + y * y),
            ],
        ]
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CameraAxes
// ────────────────────────────────────────────────────────────────────────────

/// World-space right and up vectors of the viewing camera.
///
/// Directional controls rotate about these axes rather than the model's
/// local axes, so "up" always tilts the model towards the top of the screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraAxes {
    pub right: Vec3,
    pub up: Vec3,
}

impl CameraAxes {
    /// Derive the axes from the camera's world view direction:
    /// `right = dir × worldUp`, `up = right × dir`.
    pub fn from_view_direction(direction: Vec3) -> Self {
        let direction = direction.normalize();
        let right = direction.cross(Vec3::up()).normalize();
        let up = right.cross(direction).normalize();
        Self { right, up }
    }

    /// Axes of the default camera looking down -Z.
    pub fn default_view() -> Self {
        Self::from_view_direction(Vec3::new(0.0, 0.0, -1.0))
    }
}

impl Default for CameraAxes {
    fn default() -> Self {
        Self::default_view()
    }
}
