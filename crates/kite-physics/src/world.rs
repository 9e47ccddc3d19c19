//! The world and its per-step event protocol.
//!
//! [`World::update`] runs, in order:
//!
//! 1. transmit last step's accept list (or clear a stale one),
//! 2. step the solver,
//! 3. refresh the transform cache of every moved body,
//! 4. dispatch begin, end, hit and pre-solve callbacks,
//! 5. collect the pre-solve pairs left enabled for the next step.
//!
//! No `RefCell` borrow is held while a callback runs, so callbacks may call
//! back into any world, body, fixture or joint, including destroying the
//! fixtures they were handed. Every pair is re-resolved right before its
//! callback for that reason.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use glam::Vec2;
use kite_config::PhysicsConfig;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::body::Body;
use crate::contact::Contact;
use crate::error::PhysicsError;
use crate::fixture::Fixture;
use crate::handle_table::HandleTable;
use crate::joint::Joint;
use crate::solver::{
    EventBuffer, JointId, ShapeFlag, ShapeIndex, ShapePair, Solver, StepEvents, WorldDef,
    WorldHandle,
};
use crate::units::MeterScale;

pub(crate) type SharedSolver = Rc<RefCell<Box<dyn Solver>>>;

/// Material defaults for fixtures created in a world.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FixtureDefaults {
    pub density: f32,
    pub friction: f32,
}

/// Which contact callback to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    BeginContact,
    EndContact,
    Hit,
    PreSolve,
}

/// Closest fixture along a ray, in pixels.
#[derive(Debug, Clone)]
pub struct RayCastHit {
    pub fixture: Fixture,
    pub point: Vec2,
    pub normal: Vec2,
    /// Fraction of the way from the ray start to its end.
    pub fraction: f32,
}

// ---------------------------------------------------------------------------
// Callback slots
// ---------------------------------------------------------------------------

type ContactFn = dyn FnMut(&Contact);
type HitFn = dyn FnMut(&Contact, f32);
type PreSolveFn = dyn FnMut(&mut Contact);

/// One callback plus a version bumped on every replacement.
///
/// A running callback is taken out of its slot and only put back if nobody
/// replaced or cleared the slot while it ran.
struct Slot<C: ?Sized> {
    callback: Option<Box<C>>,
    version: u64,
    registered: bool,
}

impl<C: ?Sized> Slot<C> {
    fn replace(&mut self, callback: Option<Box<C>>) -> Option<Box<C>> {
        self.version = self.version.wrapping_add(1);
        self.registered = callback.is_some();
        std::mem::replace(&mut self.callback, callback)
    }

    fn take(&mut self) -> Option<(Box<C>, u64)> {
        let version = self.version;
        self.callback.take().map(|cb| (cb, version))
    }

    fn restore(&mut self, callback: Box<C>, version: u64) -> Option<Box<C>> {
        if self.version == version && self.callback.is_none() {
            self.callback = Some(callback);
            None
        } else {
            Some(callback)
        }
    }
}

impl<C: ?Sized> Default for Slot<C> {
    fn default() -> Self {
        Self {
            callback: None,
            version: 0,
            registered: false,
        }
    }
}

#[derive(Default)]
struct ContactCallbacks {
    begin: Slot<ContactFn>,
    end: Slot<ContactFn>,
    hit: Slot<HitFn>,
    pre_solve: Slot<PreSolveFn>,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub(crate) struct WorldState {
    pub handle: Option<WorldHandle>,
    pub bodies: HandleTable<Body>,
    pub fixtures: HandleTable<Fixture>,
    pub joints: FxHashMap<JointId, Joint>,
    /// Incremented once per step; body caches stamped with it are current.
    pub frame: u64,
    pub hit_events: bool,
    pub pre_solve_events: bool,
    hit_speed_threshold: f32,
    accept: EventBuffer<ShapePair>,
    solver_holds_accept_list: bool,
    events: StepEvents,
}

pub(crate) struct WorldShared {
    pub solver: SharedSolver,
    pub scale: MeterScale,
    pub defaults: FixtureDefaults,
    pub state: RefCell<WorldState>,
    callbacks: RefCell<ContactCallbacks>,
}

impl WorldShared {
    pub fn handle(&self) -> Option<WorldHandle> {
        self.state.borrow().handle
    }

    pub fn frame(&self) -> u64 {
        self.state.borrow().frame
    }

    pub fn fixture(&self, index: ShapeIndex) -> Option<Fixture> {
        self.state.borrow().fixtures.get(index.0).cloned()
    }
}

impl Drop for WorldShared {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let Some(handle) = state.handle.take() else {
            return;
        };
        let Ok(mut solver) = self.solver.try_borrow_mut() else {
            return;
        };
        for (index, _) in state.fixtures.drain() {
            solver.free_shape_index(ShapeIndex(index));
        }
        for (index, _) in state.bodies.drain() {
            solver.free_body_index(crate::solver::BodyIndex(index));
        }
        state.joints.clear();
        solver.destroy_world(handle);
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// A simulation world owning bodies, fixtures and joints.
///
/// Cloning is cheap and yields another handle to the same world.
#[derive(Clone)]
pub struct World(pub(crate) Rc<WorldShared>);

impl World {
    pub(crate) fn create(
        solver: SharedSolver,
        scale: MeterScale,
        config: &PhysicsConfig,
        gravity: Vec2,
        allow_sleep: bool,
    ) -> Result<Self, PhysicsError> {
        let def = WorldDef {
            gravity: scale.vec_to_units(gravity),
            allow_sleep,
            hit_speed_threshold: config.hit_speed_threshold,
        };
        let handle = solver
            .borrow_mut()
            .create_world(&def)
            .ok_or(PhysicsError::CapacityExhausted("world"))?;
        debug!(world = handle.0.get(), ?gravity, allow_sleep, "world created");

        let state = WorldState {
            handle: Some(handle),
            bodies: HandleTable::new(),
            fixtures: HandleTable::new(),
            joints: FxHashMap::default(),
            frame: 0,
            hit_events: false,
            pre_solve_events: false,
            hit_speed_threshold: config.hit_speed_threshold,
            accept: EventBuffer::new(config.event_capacity, config.overflow),
            solver_holds_accept_list: false,
            events: StepEvents::new(config.event_capacity, config.overflow),
        };
        Ok(Self(Rc::new(WorldShared {
            solver,
            scale,
            defaults: FixtureDefaults {
                density: config.default_density,
                friction: config.default_friction,
            },
            state: RefCell::new(state),
            callbacks: RefCell::new(ContactCallbacks::default()),
        })))
    }

    pub(crate) fn from_shared(shared: Rc<WorldShared>) -> Self {
        Self(shared)
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.handle().is_none()
    }

    pub fn ptr_eq(&self, other: &World) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Advance the simulation by `dt` seconds and dispatch its contacts.
    pub fn update(&self, dt: f32, sub_steps: u32) {
        let Some(mut events) = self.step_solver(dt, sub_steps) else {
            return;
        };

        self.dispatch_pairs(events.begins.as_slice(), CallbackKind::BeginContact);
        self.dispatch_pairs(events.ends.as_slice(), CallbackKind::EndContact);
        self.dispatch_hits(&events);
        self.dispatch_pre_solves(&events);

        events.clear();
        if let Ok(mut state) = self.0.state.try_borrow_mut() {
            if state.accept.dropped() > 0 {
                warn!(dropped = state.accept.dropped(), "accept list full; pairs left disabled");
            }
            state.events = events;
        }
    }

    /// Steps 1–3 of the protocol. Returns the step's events, or `None` on a
    /// destroyed world.
    fn step_solver(&self, dt: f32, sub_steps: u32) -> Option<StepEvents> {
        let mut state = self.0.state.borrow_mut();
        let handle = state.handle?;
        let mut solver = self.0.solver.borrow_mut();

        if state.pre_solve_events {
            solver.set_accept_list(handle, state.accept.as_slice());
            state.accept.clear();
            state.solver_holds_accept_list = true;
        } else if state.solver_holds_accept_list {
            solver.set_accept_list(handle, &[]);
            state.solver_holds_accept_list = false;
        }

        // A nested update finds `state.events` already taken; the spare keeps its limits.
        let spare = state.events.empty_like();
        let mut events = std::mem::replace(&mut state.events, spare);
        events.clear();
        solver.step(handle, dt, sub_steps, &mut events);
        drop(solver);

        state.frame += 1;
        let frame = state.frame;
        for moved in events.moves.iter() {
            if let Some(body) = state.bodies.get(moved.body.0) {
                body.store_cache(moved.transform, frame);
            }
        }

        trace!(
            frame,
            moves = events.moves.len(),
            begins = events.begins.len(),
            ends = events.ends.len(),
            hits = events.hits.len(),
            pre_solves = events.pre_solves.len(),
            "world stepped"
        );
        if events.dropped() > 0 {
            warn!(frame, dropped = events.dropped(), "event buffers full; newest events dropped");
        }
        Some(events)
    }

    fn resolve_pair(&self, pair: ShapePair) -> Option<(Fixture, Fixture)> {
        let state = self.0.state.try_borrow().ok()?;
        state.handle?;
        let a = state.fixtures.get(pair.a.0)?.clone();
        let b = state.fixtures.get(pair.b.0)?.clone();
        Some((a, b))
    }

    fn dispatch_pairs(&self, pairs: &[ShapePair], kind: CallbackKind) {
        for pair in pairs {
            let Some((a, b)) = self.resolve_pair(*pair) else {
                continue;
            };
            let contact = Contact::touching(a, b);
            match kind {
                CallbackKind::BeginContact => self.invoke(|c| &mut c.begin, |cb| cb(&contact)),
                _ => self.invoke(|c| &mut c.end, |cb| cb(&contact)),
            };
        }
    }

    fn dispatch_hits(&self, events: &StepEvents) {
        let scale = self.0.scale.clone();
        for hit in events.hits.iter() {
            let Some((a, b)) = self.resolve_pair(hit.pair) else {
                continue;
            };
            let speed = scale.to_pixels(hit.approach_speed);
            let contact = Contact::hit(a, b, hit.normal, scale.vec_to_pixels(hit.point), speed);
            self.invoke(|c| &mut c.hit, |cb| cb(&contact, speed));
        }
    }

    fn dispatch_pre_solves(&self, events: &StepEvents) {
        for pre in events.pre_solves.iter() {
            let Some((a, b)) = self.resolve_pair(pre.pair) else {
                continue;
            };
            let mut contact = Contact::pre_solve(a, b, pre.normal);
            let invoked = self.invoke(|c| &mut c.pre_solve, |cb| cb(&mut contact));
            if !invoked || !contact.is_enabled() {
                continue;
            }
            let mut state = self.0.state.borrow_mut();
            // The callback may have unregistered itself or destroyed the world.
            if state.handle.is_some() && state.pre_solve_events {
                state.accept.push(pre.pair);
            }
        }
    }

    /// Run the callback in `slot`, if any. Returns whether one ran.
    fn invoke<C: ?Sized>(
        &self,
        slot: fn(&mut ContactCallbacks) -> &mut Slot<C>,
        call: impl FnOnce(&mut C),
    ) -> bool {
        let taken = slot(&mut self.0.callbacks.borrow_mut()).take();
        let Some((mut callback, version)) = taken else {
            return false;
        };
        call(&mut *callback);
        let replaced = slot(&mut self.0.callbacks.borrow_mut()).restore(callback, version);
        drop(replaced);
        true
    }

    // -- callback registration ------------------------------------------------

    pub fn on_begin_contact(&self, callback: impl FnMut(&Contact) + 'static) {
        let old = self.0.callbacks.borrow_mut().begin.replace(Some(Box::new(callback)));
        drop(old);
    }

    pub fn on_end_contact(&self, callback: impl FnMut(&Contact) + 'static) {
        let old = self.0.callbacks.borrow_mut().end.replace(Some(Box::new(callback)));
        drop(old);
    }

    /// Impact callback. The second argument is the approach speed in
    /// pixels/s. Turns on hit events for every fixture in the world.
    pub fn on_hit(&self, callback: impl FnMut(&Contact, f32) + 'static) {
        let old = self.0.callbacks.borrow_mut().hit.replace(Some(Box::new(callback)));
        drop(old);
        self.set_shape_events(ShapeFlag::HitEvents, true);
    }

    /// Pre-solve callback. Calling [`Contact::set_enabled`]`(false)` leaves
    /// the pair without collision response on the next step.
    pub fn on_pre_solve(&self, callback: impl FnMut(&mut Contact) + 'static) {
        let old = self
            .0
            .callbacks
            .borrow_mut()
            .pre_solve
            .replace(Some(Box::new(callback)));
        drop(old);
        self.set_shape_events(ShapeFlag::PreSolveEvents, true);
    }

    /// Unregister a callback. Clearing pre-solve also drops the pending
    /// accept list.
    pub fn clear_callback(&self, kind: CallbackKind) {
        let mut callbacks = self.0.callbacks.borrow_mut();
        match kind {
            CallbackKind::BeginContact => drop(callbacks.begin.replace(None)),
            CallbackKind::EndContact => drop(callbacks.end.replace(None)),
            CallbackKind::Hit => {
                let old = callbacks.hit.replace(None);
                drop(callbacks);
                drop(old);
                self.set_shape_events(ShapeFlag::HitEvents, false);
            }
            CallbackKind::PreSolve => {
                let old = callbacks.pre_solve.replace(None);
                drop(callbacks);
                drop(old);
                self.set_shape_events(ShapeFlag::PreSolveEvents, false);
                self.0.state.borrow_mut().accept.clear();
            }
        }
    }

    pub fn has_callback(&self, kind: CallbackKind) -> bool {
        let callbacks = self.0.callbacks.borrow();
        match kind {
            CallbackKind::BeginContact => callbacks.begin.registered,
            CallbackKind::EndContact => callbacks.end.registered,
            CallbackKind::Hit => callbacks.hit.registered,
            CallbackKind::PreSolve => callbacks.pre_solve.registered,
        }
    }

    fn set_shape_events(&self, flag: ShapeFlag, value: bool) {
        let indices: Vec<ShapeIndex> = {
            let mut state = self.0.state.borrow_mut();
            match flag {
                ShapeFlag::HitEvents => state.hit_events = value,
                ShapeFlag::PreSolveEvents => state.pre_solve_events = value,
                ShapeFlag::Sensor => {}
            }
            if state.handle.is_none() {
                return;
            }
            state.fixtures.iter().map(|(i, _)| ShapeIndex(i)).collect()
        };
        let mut solver = self.0.solver.borrow_mut();
        for index in indices {
            solver.set_shape_flag(index, flag, value);
        }
    }

    // -- lifecycle ------------------------------------------------------------

    /// Destroy the world. Every body, fixture and joint it owns is marked
    /// destroyed; the wrappers themselves stay valid as inert handles.
    pub fn destroy(&self) {
        let (handle, bodies, fixtures, joints) = {
            let mut state = self.0.state.borrow_mut();
            let Some(handle) = state.handle.take() else {
                return;
            };
            state.accept.clear();
            let joints: Vec<Joint> = state.joints.drain().map(|(_, j)| j).collect();
            (handle, state.bodies.drain(), state.fixtures.drain(), joints)
        };

        for joint in &joints {
            joint.mark_destroyed();
        }
        {
            let mut solver = self.0.solver.borrow_mut();
            for (index, fixture) in &fixtures {
                fixture.mark_destroyed();
                solver.free_shape_index(ShapeIndex(*index));
            }
            for (_, body) in &bodies {
                if let Some(index) = body.mark_destroyed() {
                    solver.free_body_index(index);
                }
            }
            solver.destroy_world(handle);
        }
        debug!(
            world = handle.0.get(),
            bodies = bodies.len(),
            fixtures = fixtures.len(),
            joints = joints.len(),
            "world destroyed"
        );

        let callbacks = std::mem::take(&mut *self.0.callbacks.borrow_mut());
        drop(callbacks);
    }

    // -- queries --------------------------------------------------------------

    /// Gravity in pixels/s².
    pub fn gravity(&self) -> Vec2 {
        let Some(handle) = self.0.handle() else {
            return Vec2::ZERO;
        };
        let g = self.0.solver.borrow().gravity(handle);
        self.0.scale.vec_to_pixels(g)
    }

    pub fn set_gravity(&self, x: f32, y: f32) {
        let Some(handle) = self.0.handle() else {
            return;
        };
        let g = self.0.scale.vec_to_units(Vec2::new(x, y));
        self.0.solver.borrow_mut().set_gravity(handle, g);
    }

    /// Live bodies as counted by the solver.
    pub fn body_count(&self) -> usize {
        match self.0.handle() {
            Some(handle) => self.0.solver.borrow().body_count(handle),
            None => 0,
        }
    }

    /// Live bodies in index order.
    pub fn bodies(&self) -> Vec<Body> {
        let state = self.0.state.borrow();
        state.bodies.iter().map(|(_, b)| b.clone()).collect()
    }

    pub fn joints(&self) -> Vec<Joint> {
        let state = self.0.state.borrow();
        state.joints.values().cloned().collect()
    }

    /// Minimum approach speed for hit events, pixels/s.
    pub fn hit_speed_threshold(&self) -> f32 {
        let threshold = self.0.state.borrow().hit_speed_threshold;
        self.0.scale.to_pixels(threshold)
    }

    /// Closest fixture crossed by the segment `(x1, y1) → (x2, y2)`.
    pub fn ray_cast(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> Option<RayCastHit> {
        let handle = self.0.handle()?;
        let scale = &self.0.scale;
        let origin = scale.vec_to_units(Vec2::new(x1, y1));
        let translation = scale.vec_to_units(Vec2::new(x2 - x1, y2 - y1));
        let hit = self.0.solver.borrow().ray_cast(handle, origin, translation)?;
        Some(RayCastHit {
            fixture: self.0.fixture(hit.shape)?,
            point: scale.vec_to_pixels(hit.point),
            normal: hit.normal,
            fraction: hit.fraction,
        })
    }

    /// Fixtures whose bounding boxes overlap the given rectangle.
    pub fn query_bounding_box(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> Vec<Fixture> {
        let Some(handle) = self.0.handle() else {
            return Vec::new();
        };
        let scale = &self.0.scale;
        let lower = scale.vec_to_units(Vec2::new(x1.min(x2), y1.min(y2)));
        let upper = scale.vec_to_units(Vec2::new(x1.max(x2), y1.max(y2)));
        let shapes = self.0.solver.borrow().query_aabb(handle, lower, upper);
        shapes.into_iter().filter_map(|s| self.0.fixture(s)).collect()
    }
}

impl PartialEq for World {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.state.try_borrow() {
            Ok(state) => f
                .debug_struct("World")
                .field("handle", &state.handle)
                .field("bodies", &state.bodies.len())
                .field("fixtures", &state.fixtures.len())
                .field("joints", &state.joints.len())
                .finish(),
            Err(_) => f.debug_struct("World").finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
#[path = "world_tests.rs"]
mod tests;
