//! Implicit kd-tree over contacter nodes.
//!
//! Points are stored in a flat array ordered so that every sub-range is
//! split at its median on axis `depth % 3`. Building is
//! O(n log n) via `select_nth_unstable_by`; box queries visit only the
//! sub-ranges whose splitting plane the box straddles.

use std::cmp::Ordering;

use glam::Vec3;
use softrig_math::Aabb;

/// Ranges at or below this size are scanned linearly.
const LEAF_SIZE: usize = 8;

/// A contacter node as seen by the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionPoint {
    pub position: Vec3,
    /// Owning vehicle slot.
    pub owner: usize,
    pub node: usize,
}

#[derive(Debug, Default, Clone)]
pub struct PointDetector {
    points: Vec<CollisionPoint>,
}

impl PointDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Replace the point set and rebuild the tree.
    pub fn rebuild<I: IntoIterator<Item = CollisionPoint>>(&mut self, points: I) {
        self.points.clear();
        self.points.extend(points);
        build(&mut self.points, 0);
    }

    /// Collect every point inside `bounds` (inclusive) into `out`.
    pub fn query<'a>(&'a self, bounds: &Aabb, out: &mut Vec<&'a CollisionPoint>) {
        out.clear();
        if bounds.is_empty() {
            return;
        }
        query(&self.points, 0, bounds, out);
    }
}

fn axis_value(p: Vec3, axis: usize) -> f32 {
    match axis {
        0 => p.x,
        1 => p.y,
        _ => p.z,
    }
}

fn build(points: &mut [CollisionPoint], depth: usize) {
    if points.len() <= LEAF_SIZE {
        return;
    }
    let axis = depth % 3;
    let mid = points.len() / 2;
    points.select_nth_unstable_by(mid, |a, b| {
        axis_value(a.position, axis)
            .partial_cmp(&axis_value(b.position, axis))
            .unwrap_or(Ordering::Equal)
    });
    let (left, right) = points.split_at_mut(mid);
    build(left, depth + 1);
    build(&mut right[1..], depth + 1);
}

fn query<'a>(
    points: &'a [CollisionPoint],
    depth: usize,
    bounds: &Aabb,
    out: &mut Vec<&'a CollisionPoint>,
) {
    if points.len() <= LEAF_SIZE {
        out.extend(points.iter().filter(|p| bounds.contains_point(p.position)));
        return;
    }
    let axis = depth % 3;
    let mid = points.len() / 2;
    let pivot = &points[mid];
    if bounds.contains_point(pivot.position) {
        out.push(pivot);
    }
    let split = axis_value(pivot.position, axis);
    if axis_value(bounds.min, axis) <= split {
        query(&points[..mid], depth + 1, bounds, out);
    }
    if axis_value(bounds.max, axis) >= split {
        query(&points[mid + 1..], depth + 1, bounds, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize) -> Vec<CollisionPoint> {
        let mut pts = Vec::new();
        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    pts.push(CollisionPoint {
                        position: Vec3::new(x as f32, y as f32, z as f32),
                        owner: (x + y) % 2,
                        node: pts.len(),
                    });
                }
            }
        }
        pts
    }

    #[test]
    fn test_query_matches_brute_force() {
        let pts = grid(9);
        let mut det = PointDetector::new();
        det.rebuild(pts.clone());
        assert_eq!(det.len(), 729);

        let bounds = Aabb::new(Vec3::new(1.5, 2.0, -1.0), Vec3::new(4.0, 3.5, 2.0));
        let mut out = Vec::new();
        det.query(&bounds, &mut out);
        let mut found: Vec<usize> = out.iter().map(|p| p.node).collect();
        found.sort_unstable();
        let mut expected: Vec<usize> = pts
            .iter()
            .filter(|p| bounds.contains_point(p.position))
            .map(|p| p.node)
            .collect();
        expected.sort_unstable();
        assert_eq!(found, expected);
        assert_eq!(found.len(), 3 * 2 * 3);
    }

    #[test]
    fn test_empty_and_small_sets() {
        let mut det = PointDetector::new();
        let mut empty = Vec::new();
        det.query(&Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)), &mut empty);
        assert!(empty.is_empty());

        det.rebuild(grid(1));
        let mut out = Vec::new();
        det.query(&Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)), &mut out);
        assert_eq!(out.len(), 1);
        det.query(&Aabb::EMPTY, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_duplicate_coordinates() {
        let pts: Vec<_> = (0..50)
            .map(|i| CollisionPoint {
                position: Vec3::new(1.0, 1.0, (i % 3) as f32),
                owner: 0,
                node: i,
            })
            .collect();
        let mut det = PointDetector::new();
        det.rebuild(pts);
        let mut out = Vec::new();
        det.query(&Aabb::new(Vec3::new(1.0, 1.0, 1.0), Vec3::new(1.0, 1.0, 1.0)), &mut out);
        assert_eq!(out.len(), 17);
    }
}
