//! Axis-aligned bounding boxes

use crate::core::types::{Vec2, Vec3};

/// 3D axis-aligned bounding box, used for terrain culling
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Get center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get size (max - min)
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Check if two AABBs intersect
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Move the box without changing its size
    pub fn translate(&mut self, offset: Vec3) {
        self.min += offset;
        self.max += offset;
    }

    /// Return merged AABB containing both
    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// 2D axis-aligned bounding box.
///
/// This is the only positional representation of a collision body and
/// the bounds type of [`QuadTree`](super::QuadTree) nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Aabb2 {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb2 {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Create from center and half-extents
    pub fn from_center_half_extent(center: Vec2, half_extent: Vec2) -> Self {
        Self {
            min: center - half_extent,
            max: center + half_extent,
        }
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    pub fn half_extent(&self) -> Vec2 {
        self.size() * 0.5
    }

    /// Inclusive point containment
    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x &&
        p.y >= self.min.y && p.y <= self.max.y
    }

    /// True if `other` lies entirely inside this box
    pub fn contains(&self, other: &Aabb2) -> bool {
        other.min.x >= self.min.x && other.max.x <= self.max.x &&
        other.min.y >= self.min.y && other.max.y <= self.max.y
    }

    /// Inclusive intersection (touching edges count)
    pub fn intersects(&self, other: &Aabb2) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y
    }

    /// Strict overlap: boxes that merely touch do not overlap
    pub fn overlaps(&self, other: &Aabb2) -> bool {
        self.min.x < other.max.x && self.max.x > other.min.x &&
        self.min.y < other.max.y && self.max.y > other.min.y
    }

    pub fn translate(&mut self, offset: Vec2) {
        self.min += offset;
        self.max += offset;
    }

    pub fn translated(&self, offset: Vec2) -> Aabb2 {
        Aabb2 {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    pub fn merged(&self, other: &Aabb2) -> Aabb2 {
        Aabb2 {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Child quadrant for quadtree subdivision.
    /// index: 0-3 (bit 0 = +x half, bit 1 = +y half)
    pub fn child_quadrant(&self, index: usize) -> Aabb2 {
        let center = self.center();
        let min = Vec2::new(
            if index & 1 != 0 { center.x } else { self.min.x },
            if index & 2 != 0 { center.y } else { self.min.y },
        );
        let max = Vec2::new(
            if index & 1 != 0 { self.max.x } else { center.x },
            if index & 2 != 0 { self.max.y } else { center.y },
        );
        Aabb2 { min, max }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_translate_and_merge() {
        let mut a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        a.translate(Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(a.min, Vec3::new(2.0, 0.0, 0.0));
        let b = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let m = a.merged(&b);
        assert_eq!(m.min, Vec3::ZERO);
        assert_eq!(m.max, Vec3::new(3.0, 1.0, 1.0));
        assert_eq!(m.center(), Vec3::new(1.5, 0.5, 0.5));
    }

    #[test]
    fn test_overlap_is_strict() {
        let a = Aabb2::new(Vec2::ZERO, Vec2::splat(10.0));
        let touching = Aabb2::new(Vec2::new(10.0, 0.0), Vec2::new(20.0, 10.0));
        assert!(a.intersects(&touching));
        assert!(!a.overlaps(&touching));

        let inside = Aabb2::new(Vec2::splat(5.0), Vec2::splat(15.0));
        assert!(a.overlaps(&inside));
    }

    #[test]
    fn test_contains() {
        let a = Aabb2::new(Vec2::ZERO, Vec2::splat(10.0));
        assert!(a.contains(&Aabb2::new(Vec2::ONE, Vec2::splat(2.0))));
        assert!(!a.contains(&Aabb2::new(Vec2::ONE, Vec2::splat(12.0))));
        assert!(a.contains_point(Vec2::splat(10.0)));
    }

    #[test]
    fn test_child_quadrant() {
        let parent = Aabb2::new(Vec2::ZERO, Vec2::splat(2.0));
        assert_eq!(parent.child_quadrant(0), Aabb2::new(Vec2::ZERO, Vec2::ONE));
        assert_eq!(parent.child_quadrant(3), Aabb2::new(Vec2::ONE, Vec2::splat(2.0)));
        assert_eq!(parent.child_quadrant(1).min, Vec2::new(1.0, 0.0));
    }
}
