//! The process-level physics context.
//!
//! [`Physics`] owns the configuration, the shared meter scale and the
//! solver. The solver is loaded on first use; a failed load is reported
//! once and the same error is returned from then on.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec2;
use kite_config::{PhysicsConfig, SolverBackend};
use tracing::{error, info};

use crate::body::{Body, BodyType};
use crate::error::PhysicsError;
use crate::fixture::Fixture;
use crate::joint::{
    DistanceJoint, MotorJoint, MouseJoint, PrismaticJoint, RevoluteJoint, WeldJoint, WheelJoint,
};
use crate::shape::Shape;
use crate::solver::Solver;
use crate::units::MeterScale;
use crate::world::{SharedSolver, World};

/// Builds the solver the first time it is needed.
pub type SolverLoader = Box<dyn FnOnce(&PhysicsConfig) -> Result<Box<dyn Solver>, PhysicsError>>;

enum SolverState {
    Pending(Option<SolverLoader>),
    Ready(SharedSolver),
    Failed(PhysicsError),
}

pub struct Physics {
    config: PhysicsConfig,
    scale: MeterScale,
    solver: RefCell<SolverState>,
}

fn default_loader(config: &PhysicsConfig) -> Result<Box<dyn Solver>, PhysicsError> {
    match config.backend {
        #[cfg(feature = "rapier")]
        SolverBackend::Rapier => Ok(Box::new(crate::solver::rapier::RapierSolver::new(config))),
        #[cfg(not(feature = "rapier"))]
        SolverBackend::Rapier => Err(PhysicsError::SolverUnavailable(
            "built without the `rapier` feature".to_string(),
        )),
    }
}

impl Physics {
    /// Context using the configured backend.
    pub fn new(config: PhysicsConfig) -> Result<Self, PhysicsError> {
        Self::with_loader(config, Box::new(default_loader))
    }

    pub fn with_loader(config: PhysicsConfig, loader: SolverLoader) -> Result<Self, PhysicsError> {
        let scale = MeterScale::new(config.meter)?;
        Ok(Self {
            config,
            scale,
            solver: RefCell::new(SolverState::Pending(Some(loader))),
        })
    }

    /// Context around an already-built solver.
    pub fn with_solver(
        config: PhysicsConfig,
        solver: Box<dyn Solver>,
    ) -> Result<Self, PhysicsError> {
        let scale = MeterScale::new(config.meter)?;
        Ok(Self {
            config,
            scale,
            solver: RefCell::new(SolverState::Ready(Rc::new(RefCell::new(solver)))),
        })
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Whether a solver has been loaded successfully.
    pub fn is_available(&self) -> bool {
        matches!(*self.solver.borrow(), SolverState::Ready(_))
    }

    /// Load the solver if that has not been tried yet.
    pub fn load(&self) -> Result<(), PhysicsError> {
        self.solver().map(drop)
    }

    fn solver(&self) -> Result<SharedSolver, PhysicsError> {
        let mut state = self.solver.borrow_mut();
        let loader = match &mut *state {
            SolverState::Ready(solver) => return Ok(solver.clone()),
            SolverState::Failed(err) => return Err(err.clone()),
            SolverState::Pending(loader) => loader.take(),
        };
        let result = match loader {
            Some(loader) => loader(&self.config),
            None => Err(PhysicsError::SolverUnavailable("solver loader missing".to_string())),
        };
        match result {
            Ok(solver) => {
                info!(backend = ?self.config.backend, "physics solver loaded");
                let solver: SharedSolver = Rc::new(RefCell::new(solver));
                *state = SolverState::Ready(solver.clone());
                Ok(solver)
            }
            Err(err) => {
                error!(%err, "failed to load physics solver");
                *state = SolverState::Failed(err.clone());
                Err(err)
            }
        }
    }

    // -- meter scale ----------------------------------------------------------

    /// Pixels per physics unit.
    pub fn meter_scale(&self) -> f32 {
        self.scale.get()
    }

    /// Change the scale used by every later conversion. State already held
    /// by the solver is not rescaled.
    pub fn set_meter_scale(&self, scale: f32) -> Result<(), PhysicsError> {
        self.scale.set(scale)
    }

    pub fn scale(&self) -> &MeterScale {
        &self.scale
    }

    // -- factories ------------------------------------------------------------

    /// Gravity in pixels/s².
    pub fn new_world(
        &self,
        gravity_x: f32,
        gravity_y: f32,
        allow_sleep: bool,
    ) -> Result<World, PhysicsError> {
        let solver = self.solver()?;
        World::create(
            solver,
            self.scale.clone(),
            &self.config,
            Vec2::new(gravity_x, gravity_y),
            allow_sleep,
        )
    }

    /// World with the configured gravity and sleep setting.
    pub fn new_default_world(&self) -> Result<World, PhysicsError> {
        let [gx, gy] = self.config.gravity;
        self.new_world(gx, gy, self.config.allow_sleep)
    }

    pub fn new_body(
        &self,
        world: &World,
        x: f32,
        y: f32,
        body_type: BodyType,
    ) -> Result<Body, PhysicsError> {
        Body::create(world, x, y, body_type)
    }

    /// Attach `shape` to `body`. `density` defaults to the configured one.
    pub fn new_fixture(
        &self,
        body: &Body,
        shape: &Shape,
        density: Option<f32>,
    ) -> Result<Fixture, PhysicsError> {
        Fixture::create(body, shape, density)
    }

    pub fn new_circle_shape(&self, x: f32, y: f32, radius: f32) -> Result<Shape, PhysicsError> {
        Shape::circle(x, y, radius)
    }

    /// Rectangle centered at `(x, y)`, rotated by `angle` radians.
    pub fn new_rectangle_shape(
        &self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        angle: f32,
    ) -> Result<Shape, PhysicsError> {
        Shape::rectangle(x, y, width, height, angle)
    }

    pub fn new_polygon_shape(&self, vertices: &[Vec2]) -> Result<Shape, PhysicsError> {
        Shape::polygon(vertices)
    }

    pub fn new_edge_shape(
        &self,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    ) -> Result<Shape, PhysicsError> {
        Shape::segment(Vec2::new(x1, y1), Vec2::new(x2, y2))
    }

    pub fn new_chain_shape(&self, looped: bool, points: &[Vec2]) -> Result<Shape, PhysicsError> {
        Shape::chain(points, looped)
    }

    /// Shape from a type name and flat coordinates, see [`Shape::parse`].
    pub fn new_shape(&self, kind: &str, coords: &[f32]) -> Result<Shape, PhysicsError> {
        Shape::parse(kind, coords)
    }

    /// Joint keeping `(x1, y1)` on A and `(x2, y2)` on B at their current
    /// distance.
    #[allow(clippy::too_many_arguments)]
    pub fn new_distance_joint(
        &self,
        body_a: &Body,
        body_b: &Body,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        collide_connected: bool,
    ) -> Result<DistanceJoint, PhysicsError> {
        DistanceJoint::create(
            body_a,
            body_b,
            Vec2::new(x1, y1),
            Vec2::new(x2, y2),
            collide_connected,
        )
    }

    pub fn new_revolute_joint(
        &self,
        body_a: &Body,
        body_b: &Body,
        x: f32,
        y: f32,
        collide_connected: bool,
    ) -> Result<RevoluteJoint, PhysicsError> {
        RevoluteJoint::create(body_a, body_b, Vec2::new(x, y), collide_connected)
    }

    /// Slide along the world axis `(axis_x, axis_y)` through `(x, y)`.
    #[allow(clippy::too_many_arguments)]
    pub fn new_prismatic_joint(
        &self,
        body_a: &Body,
        body_b: &Body,
        x: f32,
        y: f32,
        axis_x: f32,
        axis_y: f32,
        collide_connected: bool,
    ) -> Result<PrismaticJoint, PhysicsError> {
        PrismaticJoint::create(
            body_a,
            body_b,
            Vec2::new(x, y),
            Vec2::new(axis_x, axis_y),
            collide_connected,
        )
    }

    pub fn new_weld_joint(
        &self,
        body_a: &Body,
        body_b: &Body,
        x: f32,
        y: f32,
        collide_connected: bool,
    ) -> Result<WeldJoint, PhysicsError> {
        WeldJoint::create(body_a, body_b, Vec2::new(x, y), collide_connected)
    }

    /// Drag `body` towards the world point `(x, y)`, starting from there.
    pub fn new_mouse_joint(&self, body: &Body, x: f32, y: f32) -> Result<MouseJoint, PhysicsError> {
        MouseJoint::create(body, Vec2::new(x, y))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_wheel_joint(
        &self,
        body_a: &Body,
        body_b: &Body,
        x: f32,
        y: f32,
        axis_x: f32,
        axis_y: f32,
        collide_connected: bool,
    ) -> Result<WheelJoint, PhysicsError> {
        WheelJoint::create(
            body_a,
            body_b,
            Vec2::new(x, y),
            Vec2::new(axis_x, axis_y),
            collide_connected,
        )
    }

    pub fn new_motor_joint(
        &self,
        body_a: &Body,
        body_b: &Body,
        correction_factor: f32,
        collide_connected: bool,
    ) -> Result<MotorJoint, PhysicsError> {
        MotorJoint::create(body_a, body_b, correction_factor, collide_connected)
    }
}

impl std::fmt::Debug for Physics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Physics")
            .field("meter", &self.scale.get())
            .field("available", &self.is_available())
            .finish()
    }
}
