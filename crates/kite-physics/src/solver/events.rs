//! Flat per-step event buffers filled by a solver step.

use glam::Vec2;
use kite_config::OverflowPolicy;

use super::{BodyIndex, ShapePair, Transform};

/// A body the solver moved this step, with its new transform (units).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveEvent {
    pub body: BodyIndex,
    pub transform: Transform,
}

/// A pair that started touching fast enough to count as an impact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitEvent {
    pub pair: ShapePair,
    /// Unit normal pointing from shape `a` towards shape `b`.
    pub normal: Vec2,
    /// World contact point, units.
    pub point: Vec2,
    /// Relative speed along the normal at the moment of impact, units/s.
    pub approach_speed: f32,
}

/// A touching pair offered to the pre-solve callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreSolveEvent {
    pub pair: ShapePair,
    pub normal: Vec2,
}

/// Bounded or growable event list.
///
/// Under [`OverflowPolicy::Grow`] the capacity is only the initial
/// allocation. Under [`OverflowPolicy::DropNewest`] pushes beyond the
/// capacity are discarded and counted in [`dropped`](Self::dropped).
#[derive(Debug, Clone)]
pub struct EventBuffer<T> {
    items: Vec<T>,
    capacity: usize,
    policy: OverflowPolicy,
    dropped: usize,
}

impl<T> EventBuffer<T> {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            policy,
            dropped: 0,
        }
    }

    /// An unallocated buffer with the same capacity and policy.
    pub fn empty_like(&self) -> Self {
        Self {
            items: Vec::new(),
            capacity: self.capacity,
            policy: self.policy,
            dropped: 0,
        }
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Append an event. Returns `false` if it was dropped.
    pub fn push(&mut self, item: T) -> bool {
        if self.policy == OverflowPolicy::DropNewest && self.items.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.dropped = 0;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Events discarded since the last [`clear`](Self::clear).
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> Default for EventBuffer<T> {
    fn default() -> Self {
        Self::new(256, OverflowPolicy::Grow)
    }
}

/// The five streams one step produces.
#[derive(Debug, Clone, Default)]
pub struct StepEvents {
    pub moves: EventBuffer<MoveEvent>,
    pub begins: EventBuffer<ShapePair>,
    pub ends: EventBuffer<ShapePair>,
    pub hits: EventBuffer<HitEvent>,
    pub pre_solves: EventBuffer<PreSolveEvent>,
}

impl StepEvents {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            moves: EventBuffer::new(capacity, policy),
            begins: EventBuffer::new(capacity, policy),
            ends: EventBuffer::new(capacity, policy),
            hits: EventBuffer::new(capacity, policy),
            pre_solves: EventBuffer::new(capacity, policy),
        }
    }

    /// Unallocated buffers configured like these ones.
    pub fn empty_like(&self) -> Self {
        Self {
            moves: self.moves.empty_like(),
            begins: self.begins.empty_like(),
            ends: self.ends.empty_like(),
            hits: self.hits.empty_like(),
            pre_solves: self.pre_solves.empty_like(),
        }
    }

    pub fn clear(&mut self) {
        self.moves.clear();
        self.begins.clear();
        self.ends.clear();
        self.hits.clear();
        self.pre_solves.clear();
    }

    /// Total events dropped across all five buffers.
    pub fn dropped(&self) -> usize {
        self.moves.dropped()
            + self.begins.dropped()
            + self.ends.dropped()
            + self.hits.dropped()
            + self.pre_solves.dropped()
    }
}
