//! Pipeline callbacks: contact filtering, pre-solve gating and collision
//! event collection.

use std::sync::{Mutex, PoisonError};

use rapier2d::prelude::*;
use rustc_hash::FxHashSet;

use super::convert::{from_point, from_vector};
use super::tables::ColliderTag;
use crate::solver::{HitEvent, PreSolveEvent, ShapePair};

fn tag(colliders: &ColliderSet, handle: ColliderHandle) -> Option<ColliderTag> {
    colliders.get(handle).and_then(|c| ColliderTag::unpack(c.user_data))
}

fn filters_allow(colliders: &ColliderSet, a: ColliderHandle, b: ColliderHandle) -> bool {
    match (tag(colliders, a), tag(colliders, b)) {
        (Some(a), Some(b)) => a.filter.should_collide(&b.filter),
        _ => true,
    }
}

#[derive(Debug, Default)]
struct PreSolveBatch {
    seen: FxHashSet<(u32, u32)>,
    events: Vec<PreSolveEvent>,
}

/// Hooks for one step.
///
/// `previous` is the set of pairs reported in the last step's batch and
/// `accepted` the pairs the game kept. A pair in `previous` but not in
/// `accepted` gets no contact response this step.
pub(super) struct ContactHooks<'a> {
    accepted: &'a FxHashSet<(u32, u32)>,
    previous: &'a FxHashSet<(u32, u32)>,
    batch: Mutex<PreSolveBatch>,
}

impl<'a> ContactHooks<'a> {
    pub fn new(accepted: &'a FxHashSet<(u32, u32)>, previous: &'a FxHashSet<(u32, u32)>) -> Self {
        Self {
            accepted,
            previous,
            batch: Mutex::new(PreSolveBatch::default()),
        }
    }

    /// Pairs offered this step, each once, in report order.
    pub fn into_reports(self) -> Vec<PreSolveEvent> {
        self.batch.into_inner().unwrap_or_else(PoisonError::into_inner).events
    }
}

impl PhysicsHooks for ContactHooks<'_> {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        filters_allow(context.colliders, context.collider1, context.collider2)
            .then_some(SolverFlags::COMPUTE_IMPULSES)
    }

    fn filter_intersection_pair(&self, context: &PairFilterContext) -> bool {
        filters_allow(context.colliders, context.collider1, context.collider2)
    }

    fn modify_solver_contacts(&self, context: &mut ContactModificationContext) {
        let (Some(a), Some(b)) = (
            tag(context.colliders, context.collider1),
            tag(context.colliders, context.collider2),
        ) else {
            return;
        };
        let pair = ShapePair::new(a.shape, b.shape);
        let key = pair.key();
        {
            let mut batch = self.batch.lock().unwrap_or_else(PoisonError::into_inner);
            if batch.seen.insert(key) {
                batch.events.push(PreSolveEvent {
                    pair,
                    normal: from_vector(context.normal),
                });
            }
        }
        if self.previous.contains(&key) && !self.accepted.contains(&key) {
            context.solver_contacts.clear();
        }
    }
}

#[derive(Debug, Default)]
pub(super) struct CollectedEvents {
    pub begins: Vec<ShapePair>,
    pub ends: Vec<ShapePair>,
    pub hits: Vec<HitEvent>,
}

/// Gathers begin, end and hit events during a step.
pub(super) struct EventCollector {
    hit_speed_threshold: f32,
    events: Mutex<CollectedEvents>,
}

impl EventCollector {
    pub fn new(hit_speed_threshold: f32) -> Self {
        Self {
            hit_speed_threshold,
            events: Mutex::new(CollectedEvents::default()),
        }
    }

    pub fn into_events(self) -> CollectedEvents {
        self.events.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn hit(
        &self,
        bodies: &RigidBodySet,
        colliders: &ColliderSet,
        pair: &ContactPair,
    ) -> Option<HitEvent> {
        let a = tag(colliders, pair.collider1)?;
        let b = tag(colliders, pair.collider2)?;
        if !a.hit_events && !b.hit_events {
            return None;
        }
        let (manifold, contact) = pair.find_deepest_contact()?;
        let c1 = colliders.get(pair.collider1)?;
        let c2 = colliders.get(pair.collider2)?;
        let normal = c1.position() * manifold.local_n1;
        let point = c1.position() * contact.local_p1;

        let velocity_at = |collider: &Collider| {
            collider
                .parent()
                .and_then(|handle| bodies.get(handle))
                .map(|body| body.velocity_at_point(&point))
                .unwrap_or_else(Vector::zeros)
        };
        let relative = velocity_at(c2) - velocity_at(c1);
        let approach_speed = -relative.dot(&normal);
        if approach_speed < self.hit_speed_threshold {
            return None;
        }
        Some(HitEvent {
            pair: ShapePair::new(a.shape, b.shape),
            normal: from_vector(&normal),
            point: from_point(&point),
            approach_speed,
        })
    }
}

impl EventHandler for EventCollector {
    fn handle_collision_event(
        &self,
        bodies: &RigidBodySet,
        colliders: &ColliderSet,
        event: CollisionEvent,
        contact_pair: Option<&ContactPair>,
    ) {
        // Removed colliders belong to fixtures the adapter already dropped.
        if event.removed() {
            return;
        }
        let (Some(a), Some(b)) = (
            tag(colliders, event.collider1()),
            tag(colliders, event.collider2()),
        ) else {
            return;
        };
        let pair = ShapePair::new(a.shape, b.shape);
        let hit = match (event.started(), event.sensor(), contact_pair) {
            (true, false, Some(contact_pair)) => self.hit(bodies, colliders, contact_pair),
            _ => None,
        };

        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if event.started() {
            events.begins.push(pair);
        } else {
            events.ends.push(pair);
        }
        if let Some(hit) = hit {
            events.hits.push(hit);
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}
