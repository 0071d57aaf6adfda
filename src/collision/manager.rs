//! Body pool, broad/narrow phase and contact tracking

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};

use glam::Vec2;
use serde::Serialize;
use slotmap::SlotMap;

use crate::config::CollisionConfig;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::{Aabb2, QuadTree, Ray2};

use super::body::{Body, BodyDesc, BodyHandle};
use super::contact::{compute_collision, Contact, ContactKey};
use super::event::{notify, CollisionEvent, CollisionReceiver};

/// A body hit by a ray at distance `t`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub body: BodyHandle,
    pub t: f32,
}

/// Counters for the last update
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CollisionStats {
    pub bodies: u32,
    pub active_bodies: u32,
    pub pair_tests: u32,
    pub contacts: u32,
    pub begins: u32,
    pub ends: u32,
    pub resolves: u32,
}

/// Owns every body and the contacts between them.
///
/// Each [`update`](Self::update) rebuilds the quadtree from the active
/// bodies, tests every body against the bodies stored along its quadtree
/// branches, then ends stale contacts and pushes solid bodies apart.
/// A contact is confirmed by stamping it with the current generation and
/// recording its key for the pass; one left unconfirmed after the narrow
/// phase is no longer overlapping. Overlaps found by calling
/// [`test_collision`](Self::test_collision) between updates are retested by
/// the next pass rather than trusted.
///
/// Events queue up across updates until [`drain_events`](Self::drain_events)
/// or [`dispatch`](Self::dispatch) takes them.
pub struct CollisionManager {
    config: CollisionConfig,
    bodies: SlotMap<BodyHandle, Body>,
    ids_in_use: HashSet<u16>,
    next_id: u16,
    contacts: BTreeMap<ContactKey, Contact>,
    tree: QuadTree<BodyHandle>,
    generation: u64,
    /// Contacts confirmed by the running update
    confirmed: HashSet<ContactKey>,
    /// Pending until drained; never cleared by `update`
    events: Vec<CollisionEvent>,
    stats: CollisionStats,
}

impl CollisionManager {
    pub fn new(config: CollisionConfig) -> Result<Self> {
        config.validate()?;
        log::info!(
            "Collision manager: pool of {} bodies, quadtree depth {} / {} per node",
            config.max_bodies,
            config.quadtree_max_depth,
            config.quadtree_node_capacity
        );
        Ok(Self {
            bodies: SlotMap::with_capacity_and_key(config.max_bodies),
            ids_in_use: HashSet::with_capacity(config.max_bodies),
            next_id: 0,
            contacts: BTreeMap::new(),
            tree: QuadTree::new(Aabb2::default(), config.quadtree_max_depth, config.quadtree_node_capacity),
            generation: 0,
            confirmed: HashSet::new(),
            events: Vec::new(),
            stats: CollisionStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &CollisionConfig {
        &self.config
    }

    /// Take a body from the pool; fails with `PoolExhausted` when full
    pub fn create_body(&mut self, desc: BodyDesc) -> Result<BodyHandle> {
        if self.bodies.len() >= self.config.max_bodies {
            return Err(Error::PoolExhausted {
                capacity: self.config.max_bodies,
            });
        }
        let id = self.allocate_id();
        self.ids_in_use.insert(id);
        Ok(self.bodies.insert(Body::from_desc(id, desc)))
    }

    /// Next free id after the last one handed out, wrapping
    fn allocate_id(&mut self) -> u16 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if !self.ids_in_use.contains(&id) {
                return id;
            }
        }
    }

    /// Return a body to the pool.
    ///
    /// Its contacts are dropped at once and the owner of each former partner
    /// receives `End`. Destroying a stale handle fails with `InvalidBody`.
    pub fn destroy_body(&mut self, handle: BodyHandle) -> Result<Body> {
        let body = self.bodies.remove(handle).ok_or(Error::InvalidBody)?;
        self.ids_in_use.remove(&body.id);

        let keys: Vec<ContactKey> = self.contacts.keys().filter(|k| k.involves(body.id)).copied().collect();
        for key in keys {
            self.confirmed.remove(&key);
            let Some(contact) = self.contacts.remove(&key) else { continue };
            if let Some(other) = contact.other(handle) {
                let owner = self.bodies.get(other).and_then(|b| b.owner);
                notify(&mut self.events, owner, |recipient| CollisionEvent::End {
                    recipient,
                    body: other,
                    other: handle,
                });
            }
        }
        log::debug!("Destroyed body {}", body.id);
        Ok(body)
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(handle)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> {
        self.bodies.iter()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn contact(&self, key: &ContactKey) -> Option<&Contact> {
        self.contacts.get(key)
    }

    pub fn contact_between(&self, a: BodyHandle, b: BodyHandle) -> Option<&Contact> {
        let key = ContactKey::new(self.bodies.get(a)?.id, self.bodies.get(b)?.id);
        self.contacts.get(&key)
    }

    pub fn contacts(&self) -> impl Iterator<Item = (&ContactKey, &Contact)> {
        self.contacts.iter()
    }

    /// Number of completed update passes
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stats(&self) -> &CollisionStats {
        &self.stats
    }

    /// Events queued since the last drain
    pub fn events(&self) -> &[CollisionEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<CollisionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Hand every queued event to `receiver`
    pub fn dispatch<R: CollisionReceiver + ?Sized>(&mut self, receiver: &mut R) {
        for event in self.events.drain(..) {
            receiver.receive(&event);
        }
    }

    /// Run one detection and resolution pass.
    ///
    /// Begin, End and Resolve events are appended to the queue; callers that
    /// never drain it keep every event of every update.
    pub fn update(&mut self) {
        self.stats = CollisionStats {
            bodies: self.bodies.len() as u32,
            ..Default::default()
        };
        self.confirmed.clear();

        self.rebuild_broad_phase();
        self.narrow_phase();
        self.resolve_collisions();

        self.generation += 1;
        self.stats.contacts = self.contacts.len() as u32;
        log::debug!(
            "Collision update {}: {} active bodies, {} pair tests, {} contacts (+{} -{}), {} resolved",
            self.generation,
            self.stats.active_bodies,
            self.stats.pair_tests,
            self.stats.contacts,
            self.stats.begins,
            self.stats.ends,
            self.stats.resolves
        );
    }

    fn rebuild_broad_phase(&mut self) {
        let root = self
            .bodies
            .values()
            .filter(|b| b.active)
            .map(|b| b.bounds)
            .reduce(|a, b| a.merged(&b))
            .unwrap_or_default();

        self.tree.clear(root);
        for (handle, body) in &self.bodies {
            if body.active {
                self.tree.insert(body.bounds, handle);
                self.stats.active_bodies += 1;
            }
        }
    }

    fn narrow_phase(&mut self) {
        let active: Vec<(BodyHandle, Aabb2)> = self
            .bodies
            .iter()
            .filter(|(_, b)| b.active)
            .map(|(h, b)| (h, b.bounds))
            .collect();

        let mut candidates = Vec::new();
        for (handle, bounds) in active {
            candidates.clear();
            self.tree.for_each_candidate(&bounds, |item| {
                if item.value != handle {
                    candidates.push(item.value);
                }
            });
            for &other in &candidates {
                self.test_collision(handle, other);
            }
        }
    }

    /// Test one pair and record the contact if they overlap.
    ///
    /// The pair is ordered by body id, so `(a, b)` and `(b, a)` reach the
    /// same contact. Pairs of static bodies never collide, and a pair already
    /// confirmed in this pass is not retested.
    pub fn test_collision(&mut self, a: BodyHandle, b: BodyHandle) -> Option<ContactKey> {
        if a == b {
            return None;
        }
        let (body_a, body_b) = (self.bodies.get(a)?, self.bodies.get(b)?);
        if !body_a.dynamic && !body_b.dynamic {
            return None;
        }
        let (first, second, body1, body2) = if body_a.id < body_b.id {
            (a, b, body_a, body_b)
        } else {
            (b, a, body_b, body_a)
        };

        let key = ContactKey::new(body1.id, body2.id);
        let generation = self.generation;
        if self.confirmed.contains(&key) {
            return Some(key);
        }

        self.stats.pair_tests += 1;
        let collision = compute_collision(&body1.bounds, &body2.bounds, self.config.degenerate_nudge)?;
        self.confirmed.insert(key);

        match self.contacts.entry(key) {
            Entry::Occupied(mut entry) => {
                let contact = entry.get_mut();
                contact.collision = collision;
                contact.generation = generation;
                contact.age += 1;
            }
            Entry::Vacant(entry) => {
                entry.insert(Contact {
                    body1: first,
                    body2: second,
                    collision,
                    generation,
                    age: 0,
                });
                self.stats.begins += 1;
                notify(&mut self.events, body1.owner, |recipient| CollisionEvent::Begin {
                    recipient,
                    body: first,
                    other: second,
                    contact: key,
                });
                notify(&mut self.events, body2.owner, |recipient| CollisionEvent::Begin {
                    recipient,
                    body: second,
                    other: first,
                    contact: key,
                });
            }
        }
        Some(key)
    }

    /// End contacts this pass did not confirm, then separate solid pairs
    fn resolve_collisions(&mut self) {
        let stale: Vec<ContactKey> = self
            .contacts
            .keys()
            .filter(|k| !self.confirmed.contains(k))
            .copied()
            .collect();

        for key in stale {
            let Some(contact) = self.contacts.remove(&key) else { continue };
            self.stats.ends += 1;
            for (body, other) in [(contact.body1, contact.body2), (contact.body2, contact.body1)] {
                let owner = self.bodies.get(body).and_then(|b| b.owner);
                notify(&mut self.events, owner, |recipient| CollisionEvent::End { recipient, body, other });
            }
        }

        for contact in self.contacts.values() {
            let Some([body1, body2]) = self.bodies.get_disjoint_mut([contact.body1, contact.body2]) else {
                continue;
            };
            if !body1.solid || !body2.solid {
                continue;
            }

            // Fraction of the penetration each body takes; the heavier moves less
            let (w1, w2) = match (body1.dynamic, body2.dynamic) {
                (false, false) => continue,
                (false, true) => (0.0, 1.0),
                (true, false) => (1.0, 0.0),
                (true, true) => {
                    let total = body1.mass + body2.mass;
                    if total > 0.0 {
                        (body2.mass / total, body1.mass / total)
                    } else {
                        (0.5, 0.5)
                    }
                }
            };

            let d = contact.collision.penetration;
            let moves = [
                (&mut *body1, contact.body1, contact.body2, -d * w1),
                (&mut *body2, contact.body2, contact.body1, d * w2),
            ];
            for (body, handle, other, shift) in moves {
                if shift == Vec2::ZERO {
                    continue;
                }
                body.translate(shift);
                notify(&mut self.events, body.owner, |recipient| CollisionEvent::Resolve {
                    recipient,
                    body: handle,
                    other,
                    shift,
                });
            }
            self.stats.resolves += 1;
        }
    }

    fn accepts(&self, handle: BodyHandle, filter: &impl Fn(&Body) -> bool) -> bool {
        self.bodies.get(handle).is_some_and(|b| filter(b))
    }

    /// Bodies whose bounds contain `point`
    pub fn find_at_point(&self, point: Vec2, filter: impl Fn(&Body) -> bool) -> Vec<BodyHandle> {
        let mut found = Vec::new();
        self.tree.query_point(point, |item| {
            if self.accepts(item.value, &filter) {
                found.push(item.value);
            }
        });
        found
    }

    /// Bodies whose bounds intersect `area`
    pub fn find_in_area(&self, area: &Aabb2, filter: impl Fn(&Body) -> bool) -> Vec<BodyHandle> {
        let mut found = Vec::new();
        self.tree.query_area(area, |item| {
            if self.accepts(item.value, &filter) {
                found.push(item.value);
            }
        });
        found
    }

    /// Every body hit by `ray` within `max_t`, nearest first
    pub fn find_on_ray(&self, ray: &Ray2, max_t: f32, filter: impl Fn(&Body) -> bool) -> Vec<RayHit> {
        let mut hits = Vec::new();
        self.tree.query_ray(ray, max_t, |item, t| {
            if self.accepts(item.value, &filter) {
                hits.push(RayHit { body: item.value, t });
            }
        });
        hits.sort_by(|a, b| a.t.total_cmp(&b.t));
        hits
    }

    /// Nearest body hit by `ray` within `max_t`
    pub fn find_closest(&self, ray: &Ray2, max_t: f32, filter: impl Fn(&Body) -> bool) -> Option<RayHit> {
        self.tree
            .find_closest(ray, max_t, |handle| self.accepts(*handle, &filter))
            .map(|(item, t)| RayHit { body: item.value, t })
    }
}
