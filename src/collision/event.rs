//! Collision events delivered to body owners

use glam::Vec2;

use super::body::{BodyHandle, OwnerId};
use super::contact::ContactKey;

/// A notification for the owner of `body`
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CollisionEvent {
    /// `body` started overlapping `other`
    Begin {
        recipient: OwnerId,
        body: BodyHandle,
        other: BodyHandle,
        contact: ContactKey,
    },
    /// `body` stopped overlapping `other`, or `other` was destroyed
    End {
        recipient: OwnerId,
        body: BodyHandle,
        other: BodyHandle,
    },
    /// `body` was pushed by `shift` to separate it from `other`
    Resolve {
        recipient: OwnerId,
        body: BodyHandle,
        other: BodyHandle,
        shift: Vec2,
    },
}

impl CollisionEvent {
    pub fn recipient(&self) -> OwnerId {
        match *self {
            CollisionEvent::Begin { recipient, .. }
            | CollisionEvent::End { recipient, .. }
            | CollisionEvent::Resolve { recipient, .. } => recipient,
        }
    }

    pub fn body(&self) -> BodyHandle {
        match *self {
            CollisionEvent::Begin { body, .. }
            | CollisionEvent::End { body, .. }
            | CollisionEvent::Resolve { body, .. } => body,
        }
    }
}

/// Anything that consumes collision events
pub trait CollisionReceiver {
    fn receive(&mut self, event: &CollisionEvent);
}

impl CollisionReceiver for Vec<CollisionEvent> {
    fn receive(&mut self, event: &CollisionEvent) {
        self.push(*event);
    }
}

/// Queue `make(owner)` for `body`'s owner, if it has one
pub(crate) fn notify(
    events: &mut Vec<CollisionEvent>,
    owner: Option<OwnerId>,
    make: impl FnOnce(OwnerId) -> CollisionEvent,
) {
    if let Some(owner) = owner {
        events.push(make(owner));
    }
}
