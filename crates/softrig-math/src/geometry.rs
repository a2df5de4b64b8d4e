//! Small vector helpers used by the force kernels.

use glam::{Quat, Vec3};

/// Unit vector of `v`, or zero when `v` is too short to normalise.
#[inline]
pub fn safe_normalize(v: Vec3) -> Vec3 {
    v.try_normalize().unwrap_or(Vec3::ZERO)
}

/// Component of `v` lying in the plane with unit normal `normal`.
#[inline]
pub fn project_on_plane(v: Vec3, normal: Vec3) -> Vec3 {
    v - normal * v.dot(normal)
}

/// Rotate `v` by `angle` radians around the unit `axis` (right handed).
#[inline]
pub fn rotate_about_axis(v: Vec3, angle: f32, axis: Vec3) -> Vec3 {
    Quat::from_axis_angle(axis, angle) * v
}

/// Unsigned angle between two vectors in radians; zero if either is zero.
pub fn angle_between(a: Vec3, b: Vec3) -> f32 {
    let denom = a.length() * b.length();
    if denom <= f32::EPSILON {
        return 0.0;
    }
    (a.dot(b) / denom).clamp(-1.0, 1.0).acos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_safe_normalize_zero() {
        assert_eq!(safe_normalize(Vec3::ZERO), Vec3::ZERO);
        assert!((safe_normalize(Vec3::new(0.0, 3.0, 4.0)).length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_project_on_plane_removes_normal_part() {
        let p = project_on_plane(Vec3::new(1.0, 2.0, 3.0), Vec3::Y);
        assert_eq!(p, Vec3::new(1.0, 0.0, 3.0));
    }

    #[test]
    fn test_rotate_quarter_turn() {
        let r = rotate_about_axis(Vec3::X, FRAC_PI_2, Vec3::Y);
        assert!((r - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-6);
    }

    #[test]
    fn test_angle_between() {
        assert!((angle_between(Vec3::X, Vec3::Z) - FRAC_PI_2).abs() < 1e-6);
        assert_eq!(angle_between(Vec3::X, Vec3::ZERO), 0.0);
    }
}
