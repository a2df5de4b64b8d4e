//! Geometry primitives shared by the softrig crates: f32 bounding boxes,
//! collision-triangle local coordinates and small vector helpers.

mod aabb;
mod geometry;
mod triangle;

pub use aabb::{Aabb, GUARD_LIMIT};
pub use geometry::{angle_between, project_on_plane, rotate_about_axis, safe_normalize};
pub use triangle::{LocalCoords, Triangle};

pub use glam::{Mat3, Vec3};
