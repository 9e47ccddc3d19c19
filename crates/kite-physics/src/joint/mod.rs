//! Joints between two bodies.
//!
//! Every kind shares the [`Joint`] base (bodies, anchors, reaction, the
//! collide-connected flag, destruction) and adds its own accessors through
//! a typed wrapper that derefs to the base. Anchors are given in world
//! pixels at creation and frozen into each body's local frame.

mod kinds;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use glam::Vec2;
use tracing::debug;

use crate::body::Body;
use crate::error::PhysicsError;
use crate::solver::{JointDef, JointFlag, JointId, JointKindDef, JointScalar, JointVector, Solver};
use crate::units::MeterScale;
use crate::world::WorldShared;

pub use kinds::{
    DistanceJoint, MotorJoint, MouseJoint, PrismaticJoint, RevoluteJoint, WeldJoint, WheelJoint,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointType {
    Distance,
    Revolute,
    Prismatic,
    Weld,
    Mouse,
    Wheel,
    Motor,
}

impl JointType {
    pub fn as_str(self) -> &'static str {
        match self {
            JointType::Distance => "distance",
            JointType::Revolute => "revolute",
            JointType::Prismatic => "prismatic",
            JointType::Weld => "weld",
            JointType::Mouse => "mouse",
            JointType::Wheel => "wheel",
            JointType::Motor => "motor",
        }
    }
}

impl fmt::Display for JointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JointType {
    type Err = PhysicsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "distance" => Ok(JointType::Distance),
            "revolute" => Ok(JointType::Revolute),
            "prismatic" => Ok(JointType::Prismatic),
            "weld" => Ok(JointType::Weld),
            "mouse" => Ok(JointType::Mouse),
            "wheel" => Ok(JointType::Wheel),
            "motor" => Ok(JointType::Motor),
            other => Err(PhysicsError::UnknownJointType(other.to_string())),
        }
    }
}

/// How a joint scalar converts between pixels and units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Unit {
    Length,
    Force,
    Torque,
    Plain,
}

impl Unit {
    fn to_units(self, scale: &MeterScale, value: f32) -> f32 {
        match self {
            Unit::Length => scale.to_units(value),
            Unit::Force => scale.force_scalar_to_units(value),
            Unit::Torque => scale.torque_to_units(value),
            Unit::Plain => value,
        }
    }

    fn to_pixels(self, scale: &MeterScale, value: f32) -> f32 {
        match self {
            Unit::Length => scale.to_pixels(value),
            Unit::Force => scale.force_scalar_to_pixels(value),
            Unit::Torque => scale.torque_to_pixels(value),
            Unit::Plain => value,
        }
    }
}

/// Where the joint is anchored, in world pixels, at creation.
pub(crate) enum Anchors {
    /// One shared world point.
    Shared(Vec2),
    /// One world point per body.
    Separate(Vec2, Vec2),
    /// Each body's own origin.
    Origins,
}

pub(crate) struct JointInner {
    id: Cell<Option<JointId>>,
    kind: JointType,
    world: Weak<WorldShared>,
    body_a: Body,
    body_b: Body,
    user_data: RefCell<Option<Rc<dyn Any>>>,
}

/// Base handle shared by every joint kind.
#[derive(Clone)]
pub struct Joint(Rc<JointInner>);

impl Joint {
    /// Create a joint of `kind` between `body_a` and `body_b`, both in
    /// `body_a`'s world. `kind` carries units already.
    pub(crate) fn create(
        kind: JointType,
        body_a: &Body,
        body_b: &Body,
        anchors: Anchors,
        collide_connected: bool,
        build: impl FnOnce(&MeterScale, Vec2, Vec2) -> JointKindDef,
    ) -> Result<Self, PhysicsError> {
        let index_a = body_a.index().ok_or(PhysicsError::BodyDestroyed)?;
        let index_b = body_b.index().ok_or(PhysicsError::BodyDestroyed)?;
        let world = body_a.shared().ok_or(PhysicsError::WorldDestroyed)?;
        if !body_b.shared().is_some_and(|w| Rc::ptr_eq(&w, &world)) {
            return Err(PhysicsError::WorldMismatch);
        }
        let handle = world.handle().ok_or(PhysicsError::WorldDestroyed)?;
        let scale = &world.scale;

        let id = {
            let mut solver = world.solver.borrow_mut();
            let ta = solver.body_transform(index_a);
            let tb = solver.body_transform(index_b);
            let (world_a, world_b) = match anchors {
                Anchors::Shared(p) => {
                    let p = scale.vec_to_units(p);
                    (p, p)
                }
                Anchors::Separate(a, b) => (scale.vec_to_units(a), scale.vec_to_units(b)),
                Anchors::Origins => (ta.position, tb.position),
            };
            let def = JointDef {
                world: handle,
                body_a: index_a,
                body_b: index_b,
                local_anchor_a: solver.local_point(index_a, world_a),
                local_anchor_b: solver.local_point(index_b, world_b),
                reference_angle: tb.angle - ta.angle,
                collide_connected,
                kind: build(scale, world_a, world_b),
            };
            solver
                .create_joint(&def)
                .ok_or(PhysicsError::CapacityExhausted("joint"))?
        };

        let joint = Joint(Rc::new(JointInner {
            id: Cell::new(Some(id)),
            kind,
            world: Rc::downgrade(&world),
            body_a: body_a.clone(),
            body_b: body_b.clone(),
            user_data: RefCell::new(None),
        }));
        world.state.borrow_mut().joints.insert(id, joint.clone());
        debug!(id = id.raw(), %kind, "joint created");
        Ok(joint)
    }

    pub(crate) fn mark_destroyed(&self) {
        self.0.id.set(None);
    }

    pub(crate) fn involves(&self, body: &Body) -> bool {
        self.0.body_a.ptr_eq(body) || self.0.body_b.ptr_eq(body)
    }

    fn read<R: Default>(&self, f: impl FnOnce(&dyn Solver, JointId, &MeterScale) -> R) -> R {
        let (Some(id), Some(world)) = (self.0.id.get(), self.0.world.upgrade()) else {
            return R::default();
        };
        let solver = world.solver.borrow();
        f(&**solver, id, &world.scale)
    }

    fn write(&self, f: impl FnOnce(&mut dyn Solver, JointId, &MeterScale)) {
        let (Some(id), Some(world)) = (self.0.id.get(), self.0.world.upgrade()) else {
            return;
        };
        let mut solver = world.solver.borrow_mut();
        f(&mut **solver, id, &world.scale);
    }

    pub(crate) fn scalar(&self, scalar: JointScalar, unit: Unit) -> f32 {
        self.read(|solver, id, scale| unit.to_pixels(scale, solver.joint_scalar(id, scalar)))
    }

    pub(crate) fn set_scalar(&self, scalar: JointScalar, unit: Unit, value: f32) {
        self.write(|solver, id, scale| {
            solver.set_joint_scalar(id, scalar, unit.to_units(scale, value))
        });
    }

    pub(crate) fn flag(&self, flag: JointFlag) -> bool {
        self.read(|solver, id, _| solver.joint_flag(id, flag))
    }

    pub(crate) fn set_flag(&self, flag: JointFlag, value: bool) {
        self.write(|solver, id, _| solver.set_joint_flag(id, flag, value));
    }

    /// Vector in pixels (all joint vectors are lengths).
    pub(crate) fn vector(&self, vector: JointVector) -> Vec2 {
        self.read(|solver, id, scale| scale.vec_to_pixels(solver.joint_vector(id, vector)))
    }

    pub(crate) fn set_vector(&self, vector: JointVector, value: Vec2) {
        self.write(|solver, id, scale| {
            solver.set_joint_vector(id, vector, scale.vec_to_units(value))
        });
    }

    /// Wake both bodies. Motor changes do nothing to sleeping bodies
    /// otherwise.
    pub(crate) fn wake_bodies(&self) {
        if self.is_destroyed() {
            return;
        }
        self.0.body_a.set_awake(true);
        self.0.body_b.set_awake(true);
    }

    // -- shared surface -------------------------------------------------------

    pub fn joint_type(&self) -> JointType {
        self.0.kind
    }

    pub fn bodies(&self) -> (Body, Body) {
        (self.0.body_a.clone(), self.0.body_b.clone())
    }

    pub fn collide_connected(&self) -> bool {
        self.read(|solver, id, _| solver.joint_collide_connected(id))
    }

    pub fn set_collide_connected(&self, collide: bool) {
        self.write(|solver, id, _| solver.set_joint_collide_connected(id, collide));
    }

    /// Current world-space anchors in pixels.
    pub fn anchors(&self) -> (Vec2, Vec2) {
        self.read(|solver, id, scale| {
            let (a, b) = solver.joint_world_anchors(id);
            (scale.vec_to_pixels(a), scale.vec_to_pixels(b))
        })
    }

    pub fn anchor_a(&self) -> Vec2 {
        self.anchors().0
    }

    pub fn anchor_b(&self) -> Vec2 {
        self.anchors().1
    }

    /// Anchors frozen at creation, each in its own body's frame, pixels.
    pub fn local_anchors(&self) -> (Vec2, Vec2) {
        self.read(|solver, id, scale| {
            let (a, b) = solver.joint_local_anchors(id);
            (scale.vec_to_pixels(a), scale.vec_to_pixels(b))
        })
    }

    /// Constraint force over the last step of length `dt`, pixel space.
    pub fn reaction_force(&self, dt: f32) -> Vec2 {
        if dt <= 0.0 {
            return Vec2::ZERO;
        }
        self.read(|solver, id, scale| {
            let (linear, _) = solver.joint_constraint_impulse(id);
            scale.force_to_pixels(linear / dt)
        })
    }

    /// Constraint torque over the last step of length `dt`, pixel space.
    pub fn reaction_torque(&self, dt: f32) -> f32 {
        if dt <= 0.0 {
            return 0.0;
        }
        self.read(|solver, id, scale| {
            let (_, angular) = solver.joint_constraint_impulse(id);
            scale.torque_to_pixels(angular / dt)
        })
    }

    pub fn set_user_data(&self, data: impl Any) {
        *self.0.user_data.borrow_mut() = Some(Rc::new(data));
    }

    pub fn user_data(&self) -> Option<Rc<dyn Any>> {
        self.0.user_data.borrow().clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.id.get().is_none()
    }

    pub fn ptr_eq(&self, other: &Joint) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn destroy(&self) {
        let Some(id) = self.0.id.take() else {
            return;
        };
        if let Some(world) = self.0.world.upgrade()
            && world.handle().is_some()
        {
            world.state.borrow_mut().joints.remove(&id);
            world.solver.borrow_mut().destroy_joint(id);
        }
        debug!(id = id.raw(), kind = %self.0.kind, "joint destroyed");
    }
}

impl PartialEq for Joint {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Joint")
            .field("kind", &self.0.kind)
            .field("id", &self.0.id.get().map(JointId::raw))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_type_from_str() {
        for kind in [
            JointType::Distance,
            JointType::Revolute,
            JointType::Prismatic,
            JointType::Weld,
            JointType::Mouse,
            JointType::Wheel,
            JointType::Motor,
        ] {
            assert_eq!(kind.as_str().parse::<JointType>(), Ok(kind));
        }
        assert_eq!(
            "rope".parse::<JointType>(),
            Err(PhysicsError::UnknownJointType("rope".into()))
        );
    }

    #[test]
    fn test_unit_conversion_tags() {
        let scale = MeterScale::new(10.0).unwrap();
        assert_eq!(Unit::Length.to_units(&scale, 50.0), 5.0);
        assert_eq!(Unit::Force.to_units(&scale, 50.0), 5.0);
        assert_eq!(Unit::Torque.to_units(&scale, 500.0), 5.0);
        assert_eq!(Unit::Plain.to_units(&scale, 0.7), 0.7);
        assert_eq!(Unit::Torque.to_pixels(&scale, 5.0), 500.0);
    }
}
