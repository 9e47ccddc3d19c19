//! Shapes attached to bodies.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use glam::Vec2;
use tracing::{debug, warn};

use crate::body::{Body, BodyInner};
use crate::error::PhysicsError;
use crate::shape::Shape;
use crate::solver::{ChainDef, Filter, ShapeDef, ShapeFlag, ShapeIndex, ShapeScalar, Solver};
use crate::units::MeterScale;
use crate::world::WorldShared;

pub(crate) struct FixtureInner {
    index: Cell<Option<ShapeIndex>>,
    body: Weak<BodyInner>,
    world: Weak<WorldShared>,
    shape: Shape,
    chain: bool,
    user_data: RefCell<Option<Rc<dyn Any>>>,
}

/// One shape instance on a body, with its material.
///
/// Chain fixtures are collision-only: their density, friction and
/// restitution cannot be changed after creation.
#[derive(Clone)]
pub struct Fixture(Rc<FixtureInner>);

impl Fixture {
    pub(crate) fn create(
        body: &Body,
        shape: &Shape,
        density: Option<f32>,
    ) -> Result<Self, PhysicsError> {
        let body_index = body.index().ok_or(PhysicsError::BodyDestroyed)?;
        let world = body.shared().ok_or(PhysicsError::WorldDestroyed)?;
        if world.handle().is_none() {
            return Err(PhysicsError::WorldDestroyed);
        }
        let (hit_events, pre_solve_events) = {
            let state = world.state.borrow();
            (state.hit_events, state.pre_solve_events)
        };
        let scale = &world.scale;
        let defaults = world.defaults;

        let geometry = shape.geometry(scale);
        let chain = geometry.is_none();
        let index = {
            let mut solver = world.solver.borrow_mut();
            match geometry {
                Some(geometry) => solver.create_shape(
                    body_index,
                    &ShapeDef {
                        geometry,
                        density: density.unwrap_or(defaults.density),
                        friction: defaults.friction,
                        restitution: 0.0,
                        sensor: false,
                        filter: Filter::default(),
                        hit_events,
                        pre_solve_events,
                    },
                ),
                None => solver.create_chain(
                    body_index,
                    &ChainDef {
                        points: shape.chain_points(scale),
                        looped: shape.is_looped(),
                        friction: defaults.friction,
                        restitution: 0.0,
                        filter: Filter::default(),
                        hit_events,
                        pre_solve_events,
                    },
                ),
            }
        }
        .ok_or(PhysicsError::CapacityExhausted("shape"))?;

        let fixture = Fixture(Rc::new(FixtureInner {
            index: Cell::new(Some(index)),
            body: Rc::downgrade(&body.0),
            world: Rc::downgrade(&world),
            shape: shape.clone(),
            chain,
            user_data: RefCell::new(None),
        }));
        let previous = world.state.borrow_mut().fixtures.insert(index.0, fixture.clone());
        if let Some(previous) = previous {
            warn!(index = index.0, "solver reissued a live shape index");
            previous.mark_destroyed();
        }
        body.0.fixtures.borrow_mut().push(fixture.clone());
        debug!(index = index.0, kind = %shape.shape_type(), "fixture created");
        Ok(fixture)
    }

    pub(crate) fn index(&self) -> Option<ShapeIndex> {
        self.0.index.get()
    }

    pub(crate) fn mark_destroyed(&self) {
        self.0.index.set(None);
    }

    fn read<R: Default>(&self, f: impl FnOnce(&dyn Solver, ShapeIndex, &MeterScale) -> R) -> R {
        let (Some(index), Some(world)) = (self.0.index.get(), self.0.world.upgrade()) else {
            return R::default();
        };
        let solver = world.solver.borrow();
        f(&**solver, index, &world.scale)
    }

    fn write(&self, f: impl FnOnce(&mut dyn Solver, ShapeIndex)) {
        let (Some(index), Some(world)) = (self.0.index.get(), self.0.world.upgrade()) else {
            return;
        };
        let mut solver = world.solver.borrow_mut();
        f(&mut **solver, index);
    }

    fn set_material(&self, scalar: ShapeScalar, value: f32) {
        if self.0.chain {
            warn!(?scalar, "chain fixtures are collision-only; ignoring material change");
            return;
        }
        self.write(|solver, index| solver.set_shape_scalar(index, scalar, value));
    }

    /// Descriptor this fixture was created from (pixels).
    pub fn shape(&self) -> &Shape {
        &self.0.shape
    }

    pub fn body(&self) -> Option<Body> {
        self.0.body.upgrade().map(Body::from_inner)
    }

    pub fn is_chain(&self) -> bool {
        self.0.chain
    }

    pub fn friction(&self) -> f32 {
        self.read(|solver, index, _| solver.shape_scalar(index, ShapeScalar::Friction))
    }

    pub fn set_friction(&self, friction: f32) {
        self.set_material(ShapeScalar::Friction, friction);
    }

    pub fn restitution(&self) -> f32 {
        self.read(|solver, index, _| solver.shape_scalar(index, ShapeScalar::Restitution))
    }

    pub fn set_restitution(&self, restitution: f32) {
        self.set_material(ShapeScalar::Restitution, restitution);
    }

    pub fn density(&self) -> f32 {
        self.read(|solver, index, _| solver.shape_scalar(index, ShapeScalar::Density))
    }

    /// Change density; the body's mass is recomputed.
    pub fn set_density(&self, density: f32) {
        self.set_material(ShapeScalar::Density, density);
    }

    pub fn is_sensor(&self) -> bool {
        self.read(|solver, index, _| solver.shape_flag(index, ShapeFlag::Sensor))
    }

    pub fn set_sensor(&self, sensor: bool) {
        if self.0.chain {
            warn!("chain fixtures cannot be sensors; ignoring");
            return;
        }
        self.write(|solver, index| solver.set_shape_flag(index, ShapeFlag::Sensor, sensor));
    }

    pub fn filter_data(&self) -> Filter {
        self.read(|solver, index, _| solver.shape_filter(index))
    }

    pub fn set_filter_data(&self, filter: Filter) {
        self.write(|solver, index| solver.set_shape_filter(index, filter));
    }

    /// World-space bounding box in pixels as `(lower, upper)`.
    pub fn bounding_box(&self) -> (Vec2, Vec2) {
        self.read(|solver, index, scale| {
            let (lower, upper) = solver.shape_aabb(index);
            (scale.vec_to_pixels(lower), scale.vec_to_pixels(upper))
        })
    }

    pub fn set_user_data(&self, data: impl Any) {
        *self.0.user_data.borrow_mut() = Some(Rc::new(data));
    }

    pub fn user_data(&self) -> Option<Rc<dyn Any>> {
        self.0.user_data.borrow().clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.index.get().is_none()
    }

    pub fn ptr_eq(&self, other: &Fixture) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Detach from the body and free the solver shape.
    pub fn destroy(&self) {
        let Some(index) = self.0.index.take() else {
            return;
        };
        if let Some(world) = self.0.world.upgrade()
            && world.handle().is_some()
        {
            world.state.borrow_mut().fixtures.remove(index.0);
            let mut solver = world.solver.borrow_mut();
            if self.0.chain {
                solver.destroy_chain(index);
            } else {
                solver.destroy_shape(index);
            }
            solver.free_shape_index(index);
        }
        if let Some(body) = self.0.body.upgrade() {
            body.fixtures.borrow_mut().retain(|f| !f.ptr_eq(self));
        }
        debug!(index = index.0, "fixture destroyed");
    }
}

impl PartialEq for Fixture {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Fixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fixture")
            .field("index", &self.0.index.get())
            .field("shape", &self.0.shape.shape_type())
            .field("chain", &self.0.chain)
            .finish()
    }
}
