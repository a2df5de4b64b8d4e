//! Collision triangles and their local (barycentric + normal) frame.

use glam::{Mat3, Vec3};

/// A collision triangle `(a, b, c)` with `c` as the frame origin.
///
/// The local frame has axes `u = a - c`, `v = b - c` and the unit normal
/// `n = normalize(u × v)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

/// A point expressed in a triangle's local frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalCoords {
    /// Weight of vertex `a`.
    pub alpha: f32,
    /// Weight of vertex `b`.
    pub beta: f32,
    /// Weight of vertex `c`, `1 - alpha - beta`.
    pub gamma: f32,
    /// Signed distance along the triangle normal.
    pub distance: f32,
}

impl LocalCoords {
    /// True when the projection falls inside the triangle and the point is
    /// within `margin` of its plane.
    pub fn inside(&self, margin: f32) -> bool {
        self.alpha >= 0.0
            && self.beta >= 0.0
            && self.gamma >= 0.0
            && self.distance.abs() <= margin
    }
}

impl Triangle {
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { a, b, c }
    }

    /// Unit normal, or zero for a degenerate triangle.
    pub fn normal(&self) -> Vec3 {
        (self.a - self.c)
            .cross(self.b - self.c)
            .try_normalize()
            .unwrap_or(Vec3::ZERO)
    }

    /// Express `p` in the triangle frame. `None` for degenerate triangles.
    pub fn to_local(&self, p: Vec3) -> Option<LocalCoords> {
        let u = self.a - self.c;
        let v = self.b - self.c;
        let n = u.cross(v).try_normalize()?;
        let frame = Mat3::from_cols(u, v, n);
        if frame.determinant().abs() <= f32::EPSILON {
            return None;
        }
        let local = frame.inverse() * (p - self.c);
        Some(LocalCoords {
            alpha: local.x,
            beta: local.y,
            gamma: 1.0 - local.x - local.y,
            distance: local.z,
        })
    }

    /// Axis-aligned bounds of the three vertices.
    pub fn bounds(&self) -> crate::Aabb {
        crate::Aabb::from_points([self.a, self.b, self.c])
    }
}
