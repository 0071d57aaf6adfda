//! Collision bodies

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::math::Aabb2;
use glam::Vec2;

new_key_type! {
    /// Generational handle to a body; stale handles simply miss on lookup.
    pub struct BodyHandle;
}

/// Opaque identifier of whoever receives a body's collision events
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(pub u64);

/// Parameters for [`CollisionManager::create_body`](super::CollisionManager::create_body)
#[derive(Clone, Debug, PartialEq)]
pub struct BodyDesc {
    pub bounds: Aabb2,
    pub dynamic: bool,
    pub solid: bool,
    pub mass: f32,
    pub active: bool,
    pub owner: Option<OwnerId>,
}

impl Default for BodyDesc {
    fn default() -> Self {
        Self {
            bounds: Aabb2::default(),
            dynamic: true,
            solid: true,
            mass: 1.0,
            active: true,
            owner: None,
        }
    }
}

impl BodyDesc {
    /// Immovable world geometry
    pub fn fixed(bounds: Aabb2) -> Self {
        Self {
            bounds,
            dynamic: false,
            ..Default::default()
        }
    }

    pub fn dynamic(bounds: Aabb2, mass: f32) -> Self {
        Self {
            bounds,
            mass,
            ..Default::default()
        }
    }

    /// Detection only; never pushed apart
    pub fn sensor(mut self) -> Self {
        self.solid = false;
        self
    }

    pub fn with_owner(mut self, owner: OwnerId) -> Self {
        self.owner = Some(owner);
        self
    }
}

/// A collidable box. The bounds are the body's only position.
#[derive(Clone, Debug, PartialEq)]
pub struct Body {
    pub(crate) id: u16,
    pub bounds: Aabb2,
    /// Movable; static bodies never collide with each other
    pub dynamic: bool,
    /// Participates in penetration resolution
    pub solid: bool,
    pub mass: f32,
    /// Inactive bodies are left out of the broad phase
    pub active: bool,
    pub owner: Option<OwnerId>,
}

impl Body {
    pub(crate) fn from_desc(id: u16, desc: BodyDesc) -> Self {
        Self {
            id,
            bounds: desc.bounds,
            dynamic: desc.dynamic,
            solid: desc.solid,
            mass: desc.mass,
            active: desc.active,
            owner: desc.owner,
        }
    }

    /// Stable id, used to order the two bodies of a contact
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn center(&self) -> Vec2 {
        self.bounds.center()
    }

    pub fn translate(&mut self, offset: Vec2) {
        self.bounds.translate(offset);
    }

    /// Move so the bounds are centred on `center`
    pub fn set_center(&mut self, center: Vec2) {
        let offset = center - self.bounds.center();
        self.bounds.translate(offset);
    }
}
