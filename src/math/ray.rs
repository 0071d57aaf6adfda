//! Ray types and slab intersection

use crate::core::types::{Vec2, Vec3};
use super::aabb::{Aabb, Aabb2};

/// A 3D ray defined by origin and direction
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    /// Precomputed 1/direction for fast AABB intersection
    pub inv_direction: Vec3,
}

impl Ray {
    /// Create a new ray (direction should be normalized)
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            inv_direction: direction.recip(),
        }
    }

    /// Get point along ray at parameter t
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Ray-AABB intersection using slab method
    /// Returns Some((t_near, t_far)) if intersection, None otherwise
    pub fn intersects_aabb(&self, aabb: &Aabb) -> Option<(f32, f32)> {
        let t1 = (aabb.min - self.origin) * self.inv_direction;
        let t2 = (aabb.max - self.origin) * self.inv_direction;

        let t_min = t1.min(t2);
        let t_max = t1.max(t2);

        let t_near = t_min.max_element();
        let t_far = t_max.min_element();

        if t_near <= t_far && t_far >= 0.0 {
            Some((t_near.max(0.0), t_far))
        } else {
            None
        }
    }
}

/// A 2D ray used for collision queries
#[derive(Clone, Copy, Debug)]
pub struct Ray2 {
    pub origin: Vec2,
    pub direction: Vec2,
    pub inv_direction: Vec2,
}

impl Ray2 {
    pub fn new(origin: Vec2, direction: Vec2) -> Self {
        Self {
            origin,
            direction,
            inv_direction: direction.recip(),
        }
    }

    pub fn at(&self, t: f32) -> Vec2 {
        self.origin + self.direction * t
    }

    /// Slab intersection; `t_near` is clamped to 0 when the origin is inside.
    pub fn intersects_aabb(&self, aabb: &Aabb2) -> Option<(f32, f32)> {
        let t1 = (aabb.min - self.origin) * self.inv_direction;
        let t2 = (aabb.max - self.origin) * self.inv_direction;

        let t_min = t1.min(t2);
        let t_max = t1.max(t2);

        let t_near = t_min.x.max(t_min.y);
        let t_far = t_max.x.min(t_max.y);

        if t_near <= t_far && t_far >= 0.0 {
            Some((t_near.max(0.0), t_far))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersects_aabb_hit() {
        let ray = Ray::new(Vec3::new(-2.0, 0.5, 0.5), Vec3::X);
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let (t_near, t_far) = ray.intersects_aabb(&aabb).unwrap();
        assert!((t_near - 2.0).abs() < 0.001);
        assert!((t_far - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_ray2_hit_and_miss() {
        let aabb = Aabb2::new(Vec2::ZERO, Vec2::ONE);
        let ray = Ray2::new(Vec2::new(-2.0, 0.5), Vec2::X);
        let (t_near, t_far) = ray.intersects_aabb(&aabb).unwrap();
        assert!((t_near - 2.0).abs() < 0.001);
        assert!((t_far - 3.0).abs() < 0.001);
        assert_eq!(ray.at(2.0), Vec2::new(0.0, 0.5));

        let miss = Ray2::new(Vec2::new(-2.0, 5.0), Vec2::X);
        assert!(miss.intersects_aabb(&aabb).is_none());

        let behind = Ray2::new(Vec2::new(3.0, 0.5), Vec2::X);
        assert!(behind.intersects_aabb(&aabb).is_none());
    }

    #[test]
    fn test_ray2_inside() {
        let aabb = Aabb2::new(Vec2::ZERO, Vec2::ONE);
        let ray = Ray2::new(Vec2::splat(0.5), Vec2::Y);
        let (t_near, t_far) = ray.intersects_aabb(&aabb).unwrap();
        assert_eq!(t_near, 0.0);
        assert!((t_far - 0.5).abs() < 0.001);
    }
}
