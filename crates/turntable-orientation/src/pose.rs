//! Name-seeded initial pose.
//!
//! Every model starts at a pose derived from its own name, so two
//! participants see the same model from the same starting view while
//! different models start at different views.  Both angles are multiples of
//! the 5° control step.

use crate::rotation::{Quaternion, Vec3};

/// Angular resolution of the seeded pose, matching one control step.
const POSE_STEP_DEGREES: u32 = 5;

/// Polynomial rolling hash (`h = h * 31 + unit`, modulo 2³²) over the UTF-16
/// code units of `s`.
pub fn name_hash(s: &str) -> u32 {
    s.encode_utf16()
        .fold(0u32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as u32))
}

/// Initial (x, y) rotation in degrees for the model called `name`.
pub fn seeded_angles(name: &str) -> (f32, f32) {
    let slots = 360 / POSE_STEP_DEGREES;
    let x = (name_hash(name) % slots) * POSE_STEP_DEGREES;
    let y = (name_hash(&format!("/{name}")) % slots) * POSE_STEP_DEGREES;
    (x as f32, y as f32)
}

/// Initial world rotation for the model called `name`: the seeded X angle
/// composed with the seeded Y angle (X-Y-Z order, no Z component).
pub fn seeded_pose(name: &str) -> Quaternion {
    let (x, y) = seeded_angles(name);
    let qx = Quaternion::from_axis_angle(Vec3::new(1.0, 0.0, 0.0), x);
    let qy = Quaternion::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), y);
    qx.mul(qy).normalize()
}
