//! Mathematical utilities and spatial data structures

pub mod aabb;
pub mod ray;
pub mod frustum;
pub mod quadtree;

pub use aabb::{Aabb, Aabb2};
pub use ray::{Ray, Ray2};
pub use frustum::{Culler, Frustum, Plane};
pub use quadtree::{QuadItem, QuadNode, QuadTree};
