//! Contacts between overlapping body pairs

use glam::Vec2;

use crate::math::Aabb2;

use super::body::BodyHandle;

/// Order-independent identity of a body pair, built from the body ids
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContactKey {
    pub low: u16,
    pub high: u16,
}

impl ContactKey {
    pub fn new(a: u16, b: u16) -> Self {
        Self {
            low: a.min(b),
            high: a.max(b),
        }
    }

    pub fn involves(&self, id: u16) -> bool {
        self.low == id || self.high == id
    }
}

/// Geometry of an overlap
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Collision {
    /// Translation that separates body2 from body1
    pub penetration: Vec2,
    pub normal: Vec2,
    /// Centre of the overlap region
    pub point: Vec2,
}

/// A persistent overlap between two bodies, `body1` having the lower id
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contact {
    pub body1: BodyHandle,
    pub body2: BodyHandle,
    pub collision: Collision,
    /// Update pass that last confirmed the overlap
    pub generation: u64,
    /// Consecutive passes the overlap has been reconfirmed
    pub age: u32,
}

impl Contact {
    /// The other body of the pair, if `body` is part of it
    pub fn other(&self, body: BodyHandle) -> Option<BodyHandle> {
        if body == self.body1 {
            Some(self.body2)
        } else if body == self.body2 {
            Some(self.body1)
        } else {
            None
        }
    }
}

/// Overlap of `a` and `b`, separated along the axis of least overlap.
///
/// The penetration points from `a` towards `b` (ties pick x). When the
/// centres coincide on that axis there is no direction to push in, and
/// `(nudge, 0)` is used instead.
pub fn compute_collision(a: &Aabb2, b: &Aabb2, nudge: f32) -> Option<Collision> {
    if !a.overlaps(b) {
        return None;
    }
    let min = a.min.max(b.min);
    let max = a.max.min(b.max);
    let overlap = max - min;
    let delta = b.center() - a.center();

    let penetration = if overlap.x <= overlap.y {
        Vec2::new(delta.x.signum() * overlap.x, 0.0)
    } else {
        Vec2::new(0.0, delta.y.signum() * overlap.y)
    };
    let centred = if overlap.x <= overlap.y { delta.x == 0.0 } else { delta.y == 0.0 };
    let penetration = if centred {
        log::warn!("Coincident collision centres at {}, nudging apart", a.center());
        Vec2::new(nudge, 0.0)
    } else {
        penetration
    };

    Some(Collision {
        penetration,
        normal: penetration.normalize_or_zero(),
        point: (min + max) * 0.5,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aabb(x0: f32, y0: f32, x1: f32, y1: f32) -> Aabb2 {
        Aabb2::new(Vec2::new(x0, y0), Vec2::new(x1, y1))
    }

    #[test]
    fn test_key_is_order_independent() {
        assert_eq!(ContactKey::new(3, 9), ContactKey::new(9, 3));
        assert!(ContactKey::new(3, 9).involves(9));
        assert!(!ContactKey::new(3, 9).involves(4));
    }

    #[test]
    fn test_touching_boxes_do_not_collide() {
        assert!(compute_collision(&aabb(0.0, 0.0, 1.0, 1.0), &aabb(1.0, 0.0, 2.0, 1.0), 0.01).is_none());
    }

    #[test]
    fn test_least_overlap_axis() {
        // 1 unit of x overlap, 4 of y
        let c = compute_collision(&aabb(0.0, 0.0, 4.0, 4.0), &aabb(3.0, 0.0, 7.0, 4.0), 0.01).unwrap();
        assert_eq!(c.penetration, Vec2::new(1.0, 0.0));
        assert_eq!(c.normal, Vec2::X);
        assert_eq!(c.point, Vec2::new(3.5, 2.0));

        let c = compute_collision(&aabb(0.0, 3.0, 4.0, 7.0), &aabb(0.0, 0.0, 4.0, 4.0), 0.01).unwrap();
        assert_eq!(c.penetration, Vec2::new(0.0, -1.0));
    }

    #[test]
    fn test_tie_prefers_x() {
        let c = compute_collision(&aabb(0.0, 0.0, 10.0, 10.0), &aabb(5.0, 5.0, 15.0, 15.0), 0.01).unwrap();
        assert_eq!(c.penetration, Vec2::new(5.0, 0.0));
    }

    #[test]
    fn test_coincident_centres_nudge() {
        let a = aabb(0.0, 0.0, 2.0, 2.0);
        let c = compute_collision(&a, &a, 0.25).unwrap();
        assert_eq!(c.penetration, Vec2::new(0.25, 0.0));
    }
}
