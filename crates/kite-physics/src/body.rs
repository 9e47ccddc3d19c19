//! Rigid bodies.
//!
//! A [`Body`] wraps a solver body index. Spatial values cross the API in
//! pixels and are converted through the world's meter scale; angles and
//! dimensionless values pass through unchanged. Once destroyed, every
//! accessor returns its type's default and every mutator does nothing.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use glam::Vec2;
use tracing::{debug, warn};

use crate::error::PhysicsError;
use crate::fixture::Fixture;
use crate::joint::Joint;
use crate::solver::{BodyDef, BodyFlag, BodyIndex, BodyScalar, Solver, Transform};
use crate::units::MeterScale;
use crate::world::{World, WorldShared};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BodyType {
    #[default]
    Static,
    Kinematic,
    Dynamic,
}

impl BodyType {
    pub fn as_str(self) -> &'static str {
        match self {
            BodyType::Static => "static",
            BodyType::Kinematic => "kinematic",
            BodyType::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BodyType {
    type Err = PhysicsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(BodyType::Static),
            "kinematic" => Ok(BodyType::Kinematic),
            "dynamic" => Ok(BodyType::Dynamic),
            other => Err(PhysicsError::UnknownBodyType(other.to_string())),
        }
    }
}

/// Mass properties in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MassData {
    pub mass: f32,
    /// Center of mass in body-local pixels.
    pub center: Vec2,
    /// Rotational inertia about the center of mass, mass·px².
    pub inertia: f32,
}

#[derive(Debug, Clone, Copy)]
struct CachedTransform {
    transform: Transform,
    frame: u64,
}

pub(crate) struct BodyInner {
    index: Cell<Option<BodyIndex>>,
    world: Weak<WorldShared>,
    pub(crate) fixtures: RefCell<Vec<Fixture>>,
    cache: Cell<Option<CachedTransform>>,
    user_data: RefCell<Option<Rc<dyn Any>>>,
}

/// Handle to a body. Clones refer to the same body.
#[derive(Clone)]
pub struct Body(pub(crate) Rc<BodyInner>);

impl Body {
    pub(crate) fn create(
        world: &World,
        x: f32,
        y: f32,
        body_type: BodyType,
    ) -> Result<Self, PhysicsError> {
        let shared = &world.0;
        let handle = shared.handle().ok_or(PhysicsError::WorldDestroyed)?;
        let def = BodyDef {
            world: handle,
            body_type,
            position: shared.scale.vec_to_units(Vec2::new(x, y)),
            angle: 0.0,
        };
        let index = shared
            .solver
            .borrow_mut()
            .create_body(&def)
            .ok_or(PhysicsError::CapacityExhausted("body"))?;

        let body = Body(Rc::new(BodyInner {
            index: Cell::new(Some(index)),
            world: Rc::downgrade(shared),
            fixtures: RefCell::new(Vec::new()),
            cache: Cell::new(None),
            user_data: RefCell::new(None),
        }));
        let previous = shared.state.borrow_mut().bodies.insert(index.0, body.clone());
        if let Some(previous) = previous {
            warn!(index = index.0, "solver reissued a live body index");
            previous.mark_destroyed();
        }
        debug!(index = index.0, %body_type, x, y, "body created");
        Ok(body)
    }

    pub(crate) fn index(&self) -> Option<BodyIndex> {
        self.0.index.get()
    }

    pub(crate) fn shared(&self) -> Option<Rc<WorldShared>> {
        self.0.index.get()?;
        self.0.world.upgrade()
    }

    pub(crate) fn from_inner(inner: Rc<BodyInner>) -> Self {
        Self(inner)
    }

    /// Invalidate without touching the solver. Returns the index it held.
    pub(crate) fn mark_destroyed(&self) -> Option<BodyIndex> {
        self.0.cache.set(None);
        let fixtures = std::mem::take(&mut *self.0.fixtures.borrow_mut());
        for fixture in &fixtures {
            fixture.mark_destroyed();
        }
        self.0.index.take()
    }

    pub(crate) fn store_cache(&self, transform: Transform, frame: u64) {
        self.0.cache.set(Some(CachedTransform { transform, frame }));
    }

    fn read<R: Default>(&self, f: impl FnOnce(&dyn Solver, BodyIndex, &MeterScale) -> R) -> R {
        let (Some(index), Some(world)) = (self.0.index.get(), self.0.world.upgrade()) else {
            return R::default();
        };
        let solver = world.solver.borrow();
        f(&**solver, index, &world.scale)
    }

    fn write(&self, f: impl FnOnce(&mut dyn Solver, BodyIndex, &MeterScale)) {
        let (Some(index), Some(world)) = (self.0.index.get(), self.0.world.upgrade()) else {
            return;
        };
        let mut solver = world.solver.borrow_mut();
        f(&mut **solver, index, &world.scale);
    }

    /// Transform in units, from the cache when it is from this frame.
    fn transform_units(&self) -> Option<Transform> {
        let index = self.0.index.get()?;
        let world = self.0.world.upgrade()?;
        let frame = world.frame();
        if let Some(cached) = self.0.cache.get()
            && cached.frame == frame
        {
            return Some(cached.transform);
        }
        let transform = world.solver.borrow().body_transform(index);
        self.store_cache(transform, frame);
        Some(transform)
    }

    fn write_transform(&self, transform: Transform) {
        let Some(world) = self.shared() else {
            return;
        };
        self.write(|solver, index, _| solver.set_body_transform(index, transform));
        self.store_cache(transform, world.frame());
    }

    // -- transform ------------------------------------------------------------

    /// Position of the body origin in pixels.
    pub fn position(&self) -> Vec2 {
        let Some(world) = self.0.world.upgrade() else {
            return Vec2::ZERO;
        };
        self.transform_units()
            .map(|t| world.scale.vec_to_pixels(t.position))
            .unwrap_or_default()
    }

    pub fn x(&self) -> f32 {
        self.position().x
    }

    pub fn y(&self) -> f32 {
        self.position().y
    }

    /// Rotation in radians.
    pub fn angle(&self) -> f32 {
        self.transform_units().map(|t| t.angle).unwrap_or_default()
    }

    pub fn set_position(&self, x: f32, y: f32) {
        let (Some(current), Some(world)) = (self.transform_units(), self.shared()) else {
            return;
        };
        self.write_transform(Transform {
            position: world.scale.vec_to_units(Vec2::new(x, y)),
            angle: current.angle,
        });
    }

    pub fn set_angle(&self, angle: f32) {
        let Some(current) = self.transform_units() else {
            return;
        };
        self.write_transform(Transform {
            position: current.position,
            angle,
        });
    }

    pub fn set_transform(&self, x: f32, y: f32, angle: f32) {
        let Some(world) = self.shared() else {
            return;
        };
        self.write_transform(Transform {
            position: world.scale.vec_to_units(Vec2::new(x, y)),
            angle,
        });
    }

    /// Body-local point (pixels) to world pixels.
    pub fn world_point(&self, local: Vec2) -> Vec2 {
        self.read(|solver, index, scale| {
            scale.vec_to_pixels(solver.world_point(index, scale.vec_to_units(local)))
        })
    }

    /// World point (pixels) to body-local pixels.
    pub fn local_point(&self, world: Vec2) -> Vec2 {
        self.read(|solver, index, scale| {
            scale.vec_to_pixels(solver.local_point(index, scale.vec_to_units(world)))
        })
    }

    // -- velocity -------------------------------------------------------------

    /// Linear velocity in pixels/s.
    pub fn linear_velocity(&self) -> Vec2 {
        self.read(|solver, index, scale| scale.vec_to_pixels(solver.linear_velocity(index)))
    }

    pub fn set_linear_velocity(&self, vx: f32, vy: f32) {
        self.write(|solver, index, scale| {
            solver.set_linear_velocity(index, scale.vec_to_units(Vec2::new(vx, vy)))
        });
    }

    /// Angular velocity in radians/s.
    pub fn angular_velocity(&self) -> f32 {
        self.scalar(BodyScalar::AngularVelocity)
    }

    pub fn set_angular_velocity(&self, omega: f32) {
        self.set_scalar(BodyScalar::AngularVelocity, omega);
    }

    pub fn linear_damping(&self) -> f32 {
        self.scalar(BodyScalar::LinearDamping)
    }

    pub fn set_linear_damping(&self, damping: f32) {
        self.set_scalar(BodyScalar::LinearDamping, damping);
    }

    pub fn angular_damping(&self) -> f32 {
        self.scalar(BodyScalar::AngularDamping)
    }

    pub fn set_angular_damping(&self, damping: f32) {
        self.set_scalar(BodyScalar::AngularDamping, damping);
    }

    pub fn gravity_scale(&self) -> f32 {
        self.scalar(BodyScalar::GravityScale)
    }

    pub fn set_gravity_scale(&self, scale: f32) {
        self.set_scalar(BodyScalar::GravityScale, scale);
    }

    fn scalar(&self, scalar: BodyScalar) -> f32 {
        self.read(|solver, index, _| solver.body_scalar(index, scalar))
    }

    fn set_scalar(&self, scalar: BodyScalar, value: f32) {
        self.write(|solver, index, _| solver.set_body_scalar(index, scalar, value));
    }

    // -- flags ----------------------------------------------------------------

    pub fn is_bullet(&self) -> bool {
        self.flag(BodyFlag::Bullet)
    }

    pub fn set_bullet(&self, bullet: bool) {
        self.set_flag(BodyFlag::Bullet, bullet);
    }

    pub fn is_awake(&self) -> bool {
        self.flag(BodyFlag::Awake)
    }

    pub fn set_awake(&self, awake: bool) {
        self.set_flag(BodyFlag::Awake, awake);
    }

    /// Whether the body takes part in the simulation at all.
    pub fn is_enabled(&self) -> bool {
        self.flag(BodyFlag::Enabled)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.set_flag(BodyFlag::Enabled, enabled);
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.flag(BodyFlag::FixedRotation)
    }

    pub fn set_fixed_rotation(&self, fixed: bool) {
        self.set_flag(BodyFlag::FixedRotation, fixed);
    }

    pub fn is_sleeping_allowed(&self) -> bool {
        self.flag(BodyFlag::SleepingAllowed)
    }

    pub fn set_sleeping_allowed(&self, allowed: bool) {
        self.set_flag(BodyFlag::SleepingAllowed, allowed);
    }

    fn flag(&self, flag: BodyFlag) -> bool {
        self.read(|solver, index, _| solver.body_flag(index, flag))
    }

    fn set_flag(&self, flag: BodyFlag, value: bool) {
        self.write(|solver, index, _| solver.set_body_flag(index, flag, value));
    }

    pub fn body_type(&self) -> BodyType {
        self.read(|solver, index, _| solver.body_type(index))
    }

    pub fn set_body_type(&self, body_type: BodyType) {
        self.write(|solver, index, _| solver.set_body_type(index, body_type));
    }

    // -- forces ---------------------------------------------------------------

    /// Apply a force (pixel space) for the next step, at the center of mass
    /// or at a world point.
    pub fn apply_force(&self, force: Vec2, point: Option<Vec2>) {
        self.write(|solver, index, scale| {
            solver.apply_force(
                index,
                scale.force_to_units(force),
                point.map(|p| scale.vec_to_units(p)),
                true,
            )
        });
    }

    pub fn apply_linear_impulse(&self, impulse: Vec2, point: Option<Vec2>) {
        self.write(|solver, index, scale| {
            solver.apply_linear_impulse(
                index,
                scale.force_to_units(impulse),
                point.map(|p| scale.vec_to_units(p)),
                true,
            )
        });
    }

    pub fn apply_torque(&self, torque: f32) {
        self.write(|solver, index, scale| {
            solver.apply_torque(index, scale.torque_to_units(torque), true)
        });
    }

    pub fn apply_angular_impulse(&self, impulse: f32) {
        self.write(|solver, index, scale| {
            solver.apply_angular_impulse(index, scale.torque_to_units(impulse), true)
        });
    }

    // -- mass -----------------------------------------------------------------

    pub fn mass(&self) -> f32 {
        self.mass_data().mass
    }

    pub fn inertia(&self) -> f32 {
        self.mass_data().inertia
    }

    pub fn mass_data(&self) -> MassData {
        self.read(|solver, index, scale| {
            let data = solver.body_mass_data(index);
            MassData {
                mass: data.mass,
                center: scale.vec_to_pixels(data.center),
                inertia: scale.inertia_to_pixels(data.inertia),
            }
        })
    }

    // -- ownership ------------------------------------------------------------

    pub fn fixtures(&self) -> Vec<Fixture> {
        self.0.fixtures.borrow().clone()
    }

    /// Joints attached to this body.
    pub fn joints(&self) -> Vec<Joint> {
        let Some(world) = self.shared() else {
            return Vec::new();
        };
        let state = world.state.borrow();
        state
            .joints
            .values()
            .filter(|j| j.involves(self))
            .cloned()
            .collect()
    }

    /// Owning world, while the body is live.
    pub fn world(&self) -> Option<World> {
        self.shared().map(World::from_shared)
    }

    pub fn set_user_data(&self, data: impl Any) {
        *self.0.user_data.borrow_mut() = Some(Rc::new(data));
    }

    pub fn user_data(&self) -> Option<Rc<dyn Any>> {
        self.0.user_data.borrow().clone()
    }

    pub fn clear_user_data(&self) {
        self.0.user_data.borrow_mut().take();
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.index.get().is_none()
    }

    pub fn ptr_eq(&self, other: &Body) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Destroy the body, its fixtures and every joint attached to it.
    pub fn destroy(&self) {
        let Some(index) = self.0.index.get() else {
            return;
        };
        let Some(world) = self.0.world.upgrade() else {
            self.mark_destroyed();
            return;
        };

        let fixtures = std::mem::take(&mut *self.0.fixtures.borrow_mut());
        for fixture in &fixtures {
            fixture.destroy();
        }
        for joint in self.joints() {
            joint.destroy();
        }

        self.0.index.set(None);
        self.0.cache.set(None);
        world.state.borrow_mut().bodies.remove(index.0);
        {
            let mut solver = world.solver.borrow_mut();
            solver.destroy_body(index);
            solver.free_body_index(index);
        }
        debug!(index = index.0, fixtures = fixtures.len(), "body destroyed");
    }
}

impl PartialEq for Body {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("index", &self.0.index.get())
            .field("fixtures", &self.0.fixtures.borrow().len())
            .finish()
    }
}
