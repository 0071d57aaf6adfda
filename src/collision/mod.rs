//! 2D collision detection over axis-aligned boxes.
//!
//! Bodies are boxes in a generational pool. Every update rebuilds a
//! quadtree broad phase, tests candidate pairs, tracks persistent contacts
//! across updates and pushes overlapping solid bodies apart by mass.

pub mod body;
pub mod contact;
pub mod event;
pub mod manager;

pub use body::{Body, BodyDesc, BodyHandle, OwnerId};
pub use contact::{compute_collision, Collision, Contact, ContactKey};
pub use event::{CollisionEvent, CollisionReceiver};
pub use manager::{CollisionManager, CollisionStats, RayHit};
