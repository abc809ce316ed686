//! `turntable-orientation` – OrientationTracker.
//!
//! Turns the world rotation of a displayed model into the yaw/pitch/roll
//! readings that are logged for every step, and provides the rotation
//! primitives the recorder uses to turn a model in front of the camera.
//!
//! # Modules
//!
//! - [`rotation`] – [`Vec3`][rotation::Vec3], [`Quaternion`][rotation::Quaternion]
//!   and [`CameraAxes`][rotation::CameraAxes]: camera-relative rotation axes so
//!   the arrow-key mapping stays stable whatever the model's own pose.
//! - [`tracker`] – [`Orientation`][tracker::Orientation]: Y-X-Z Euler
//!   extraction normalised to `[0, 360)`, [`wrap180`][tracker::wrap180] and
//!   wrap-corrected deltas between two readings.
//! - [`pose`] – [`seeded_pose`][pose::seeded_pose]: deterministic initial
//!   pose derived from a model name.

pub mod pose;
pub mod rotation;
pub mod tracker;

pub use pose::seeded_pose;
pub use rotation::{CameraAxes, Quaternion, Vec3};
pub use tracker::{Orientation, OrientationDelta, normalize360, wrap180};
