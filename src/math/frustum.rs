//! View frustum for terrain culling

use crate::core::types::{Vec3, Vec4, Mat4};
use super::aabb::Aabb;

/// Camera-side visibility test consumed by the clipmap renderer
pub trait Culler {
    /// True if the box is entirely outside the view volume
    fn is_clipped(&self, aabb: &Aabb) -> bool;
}

/// A plane defined by normal and distance from origin
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Signed distance from point to plane (positive = in front)
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// View frustum with 6 planes (Near, Far, Left, Right, Top, Bottom)
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from view-projection matrix
    /// (Gribb/Hartmann, rows combined with row 3)
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let raw = [
            rows[3] + rows[2], // near
            rows[3] - rows[2], // far
            rows[3] + rows[0], // left
            rows[3] - rows[0], // right
            rows[3] - rows[1], // top
            rows[3] + rows[1], // bottom
        ];

        let mut planes = [Plane::new(Vec3::ZERO, 0.0); 6];
        for (plane, r) in planes.iter_mut().zip(raw) {
            *plane = Self::normalize_plane(r);
        }

        Self { planes }
    }

    fn normalize_plane(plane: Vec4) -> Plane {
        let normal = plane.truncate();
        let len = normal.length();
        if len > 0.0 {
            Plane::new(normal / len, plane.w / len)
        } else {
            Plane::new(Vec3::ZERO, plane.w)
        }
    }

    /// Check if point is inside frustum
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }

    /// Check if AABB intersects frustum (conservative test)
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            // Corner most aligned with the plane normal (p-vertex)
            let p = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );

            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }
}

impl Culler for Frustum {
    fn is_clipped(&self, aabb: &Aabb) -> bool {
        !self.intersects_aabb(aabb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn looking_down_negative_z() -> Frustum {
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        Frustum::from_view_projection(&(proj * view))
    }

    #[test]
    fn test_plane_distance() {
        let plane = Plane::new(Vec3::Y, 0.0);
        assert_eq!(plane.distance_to_point(Vec3::new(0.0, 5.0, 0.0)), 5.0);
        assert_eq!(plane.distance_to_point(Vec3::new(0.0, -3.0, 0.0)), -3.0);
    }

    #[test]
    fn test_frustum_contains_point() {
        let frustum = looking_down_negative_z();
        assert!(frustum.contains_point(Vec3::ZERO));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 10.0)));
    }

    #[test]
    fn test_culler_clips_box_behind_camera() {
        let frustum = looking_down_negative_z();
        let visible = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let behind = Aabb::new(Vec3::new(-1.0, -1.0, 20.0), Vec3::new(1.0, 1.0, 22.0));
        assert!(!frustum.is_clipped(&visible));
        assert!(frustum.is_clipped(&behind));
    }
}
