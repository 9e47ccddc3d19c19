//! Joint records and their rapier constraint equivalents.
//!
//! Every joint is a [`GenericJoint`] rebuilt from its record whenever a
//! parameter changes. Frames are placed so that both land on the same
//! world pose at creation; axis joints rotate the frames so the slide axis
//! is the local X axis.

use std::f32::consts::TAU;

use glam::Vec2;
use rapier2d::prelude::*;

use super::convert::isometry;
use crate::solver::{JointDef, JointFlag, JointKindDef, JointScalar, JointVector, WorldHandle};

/// Damping factor for velocity motors.
const MOTOR_FACTOR: f32 = 1.0;
/// Position-motor stiffness of a motor joint at correction factor 1.
const MOTOR_JOINT_STIFFNESS: f32 = 100.0;
const MOUSE_FREQUENCY: f32 = 5.0;
const MOUSE_DAMPING_RATIO: f32 = 0.7;
const MOUSE_FORCE_PER_MASS: f32 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum JointKind {
    Distance,
    Revolute,
    Prismatic,
    Weld,
    Mouse,
    Wheel,
    Motor,
}

/// Stiffness and damping of a mass-normalized spring.
fn spring(frequency: f32, damping_ratio: f32) -> (f32, f32) {
    let omega = TAU * frequency;
    (omega * omega, 2.0 * damping_ratio * omega)
}

#[derive(Debug, Clone)]
pub(super) struct JointRecord {
    pub world: WorldHandle,
    /// Rapier bodies; for mouse joints `rigid_a` is the world's ground body.
    pub rigid_a: RigidBodyHandle,
    pub rigid_b: RigidBodyHandle,
    pub handle: ImpulseJointHandle,
    pub kind: JointKind,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub reference_angle: f32,
    pub collide_connected: bool,
    /// Unit slide axis in A's frame.
    pub local_axis: Vec2,

    pub length: f32,
    pub frequency: f32,
    pub damping_ratio: f32,
    pub limit_enabled: bool,
    pub lower: f32,
    pub upper: f32,
    pub motor_enabled: bool,
    pub spring_enabled: bool,
    pub motor_speed: f32,
    pub max_motor_force: f32,
    pub max_motor_torque: f32,

    pub target: Vec2,
    pub linear_offset: Vec2,
    pub angular_offset: f32,
    pub max_force: f32,
    pub max_torque: f32,
    pub correction_factor: f32,
}

impl JointRecord {
    /// Record for `def`; `handle` is filled in once the joint is inserted.
    pub fn new(
        def: &JointDef,
        rigid_a: RigidBodyHandle,
        rigid_b: RigidBodyHandle,
        mass_b: f32,
    ) -> Self {
        let mut record = Self {
            world: def.world,
            rigid_a,
            rigid_b,
            handle: ImpulseJointHandle::invalid(),
            kind: JointKind::Revolute,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            collide_connected: def.collide_connected,
            local_axis: Vec2::X,
            length: 0.0,
            frequency: 0.0,
            damping_ratio: 0.0,
            limit_enabled: false,
            lower: 0.0,
            upper: 0.0,
            motor_enabled: false,
            spring_enabled: false,
            motor_speed: 0.0,
            max_motor_force: 0.0,
            max_motor_torque: 0.0,
            target: Vec2::ZERO,
            linear_offset: Vec2::ZERO,
            angular_offset: 0.0,
            max_force: 0.0,
            max_torque: 0.0,
            correction_factor: 0.0,
        };
        match def.kind {
            JointKindDef::Distance {
                length,
                frequency,
                damping_ratio,
            } => {
                record.kind = JointKind::Distance;
                record.length = length;
                record.frequency = frequency;
                record.damping_ratio = damping_ratio;
            }
            JointKindDef::Revolute => {}
            JointKindDef::Prismatic { local_axis } => {
                record.kind = JointKind::Prismatic;
                record.local_axis = local_axis.normalize_or(Vec2::X);
            }
            JointKindDef::Weld {
                frequency,
                damping_ratio,
            } => {
                record.kind = JointKind::Weld;
                record.frequency = frequency;
                record.damping_ratio = damping_ratio;
            }
            JointKindDef::Mouse { target, max_force } => {
                record.kind = JointKind::Mouse;
                record.target = target;
                record.max_force = max_force.unwrap_or(MOUSE_FORCE_PER_MASS * mass_b);
                record.frequency = MOUSE_FREQUENCY;
                record.damping_ratio = MOUSE_DAMPING_RATIO;
            }
            JointKindDef::Wheel { local_axis } => {
                record.kind = JointKind::Wheel;
                record.local_axis = local_axis.normalize_or(Vec2::X);
                record.spring_enabled = true;
                record.frequency = 2.0;
                record.damping_ratio = 0.7;
            }
            JointKindDef::Motor {
                linear_offset,
                angular_offset,
                max_force,
                max_torque,
                correction_factor,
            } => {
                record.kind = JointKind::Motor;
                record.linear_offset = linear_offset;
                record.angular_offset = angular_offset;
                record.max_force = max_force;
                record.max_torque = max_torque;
                record.correction_factor = correction_factor.clamp(0.0, 1.0);
            }
        }
        record
    }

    fn axis_angle(&self) -> f32 {
        self.local_axis.y.atan2(self.local_axis.x)
    }

    fn frames(&self, builder: GenericJointBuilder, base_angle: f32) -> GenericJointBuilder {
        builder
            .local_frame1(isometry(self.local_anchor_a, base_angle))
            .local_frame2(isometry(self.local_anchor_b, base_angle - self.reference_angle))
    }

    /// Angle of frame 1 relative to body A.
    pub fn frame_angle(&self) -> f32 {
        match self.kind {
            JointKind::Prismatic | JointKind::Wheel => self.axis_angle(),
            JointKind::Motor => self.angular_offset,
            _ => 0.0,
        }
    }

    pub fn generic(&self) -> GenericJoint {
        let builder = match self.kind {
            JointKind::Distance => {
                let builder = self
                    .frames(GenericJointBuilder::new(JointAxesMask::empty()), 0.0)
                    .coupled_axes(JointAxesMask::LIN_AXES);
                if self.frequency > 0.0 {
                    let (stiffness, damping) = spring(self.frequency, self.damping_ratio);
                    builder
                        .motor_position(JointAxis::LinX, self.length, stiffness, damping)
                        .motor_model(JointAxis::LinX, MotorModel::AccelerationBased)
                } else {
                    builder.limits(JointAxis::LinX, [self.length, self.length])
                }
            }
            JointKind::Revolute => {
                let locked = JointAxesMask::LOCKED_REVOLUTE_AXES;
                let mut builder = self.frames(GenericJointBuilder::new(locked), 0.0);
                if self.limit_enabled {
                    builder = builder.limits(JointAxis::AngX, [self.lower, self.upper]);
                }
                if self.motor_enabled {
                    builder = builder
                        .motor_velocity(JointAxis::AngX, self.motor_speed, MOTOR_FACTOR)
                        .motor_max_force(JointAxis::AngX, self.max_motor_torque);
                }
                builder
            }
            JointKind::Prismatic => {
                let mut builder = self.frames(
                    GenericJointBuilder::new(JointAxesMask::LOCKED_PRISMATIC_AXES),
                    self.axis_angle(),
                );
                if self.limit_enabled {
                    builder = builder.limits(JointAxis::LinX, [self.lower, self.upper]);
                }
                if self.motor_enabled {
                    builder = builder
                        .motor_velocity(JointAxis::LinX, self.motor_speed, MOTOR_FACTOR)
                        .motor_max_force(JointAxis::LinX, self.max_motor_force);
                }
                builder
            }
            JointKind::Weld if self.frequency > 0.0 => {
                let (stiffness, damping) = spring(self.frequency, self.damping_ratio);
                let mut builder = self.frames(GenericJointBuilder::new(JointAxesMask::ANG_X), 0.0);
                for axis in [JointAxis::LinX, JointAxis::LinY] {
                    builder = builder
                        .motor_position(axis, 0.0, stiffness, damping)
                        .motor_model(axis, MotorModel::AccelerationBased);
                }
                builder
            }
            JointKind::Weld => {
                self.frames(GenericJointBuilder::new(JointAxesMask::LOCKED_FIXED_AXES), 0.0)
            }
            JointKind::Wheel => {
                let mut builder =
                    self.frames(GenericJointBuilder::new(JointAxesMask::LIN_Y), self.axis_angle());
                if self.spring_enabled && self.frequency > 0.0 {
                    let (stiffness, damping) = spring(self.frequency, self.damping_ratio);
                    builder = builder
                        .motor_position(JointAxis::LinX, 0.0, stiffness, damping)
                        .motor_model(JointAxis::LinX, MotorModel::AccelerationBased);
                }
                if self.limit_enabled {
                    builder = builder.limits(JointAxis::LinX, [self.lower, self.upper]);
                }
                if self.motor_enabled {
                    builder = builder
                        .motor_velocity(JointAxis::AngX, self.motor_speed, MOTOR_FACTOR)
                        .motor_max_force(JointAxis::AngX, self.max_motor_torque);
                }
                builder
            }
            JointKind::Mouse => {
                let (stiffness, damping) = spring(self.frequency, self.damping_ratio);
                let mut builder = GenericJointBuilder::new(JointAxesMask::empty())
                    .local_frame1(isometry(self.target, 0.0))
                    .local_frame2(isometry(self.local_anchor_b, 0.0));
                for axis in [JointAxis::LinX, JointAxis::LinY] {
                    builder = builder
                        .motor_position(axis, 0.0, stiffness, damping)
                        .motor_max_force(axis, self.max_force)
                        .motor_model(axis, MotorModel::AccelerationBased);
                }
                builder
            }
            JointKind::Motor => {
                let stiffness = self.correction_factor * MOTOR_JOINT_STIFFNESS;
                let damping = 2.0 * stiffness.sqrt();
                let mut builder = GenericJointBuilder::new(JointAxesMask::empty())
                    .local_frame1(isometry(self.linear_offset, self.angular_offset))
                    .local_frame2(Isometry::identity());
                for (axis, max) in [
                    (JointAxis::LinX, self.max_force),
                    (JointAxis::LinY, self.max_force),
                    (JointAxis::AngX, self.max_torque),
                ] {
                    builder = builder
                        .motor_position(axis, 0.0, stiffness, damping)
                        .motor_max_force(axis, max)
                        .motor_model(axis, MotorModel::AccelerationBased);
                }
                builder
            }
        };
        builder.contacts_enabled(self.collide_connected).build()
    }

    /// Stored scalar, `None` for read-only or unsupported ones.
    pub fn scalar(&self, scalar: JointScalar) -> Option<f32> {
        use JointKind::*;
        use JointScalar as S;
        let value = match (self.kind, scalar) {
            (Distance, S::Length) => self.length,
            (Distance | Weld | Mouse | Wheel, S::Frequency) => self.frequency,
            (Distance | Weld | Mouse | Wheel, S::DampingRatio) => self.damping_ratio,
            (Revolute | Prismatic | Wheel, S::LowerLimit) => self.lower,
            (Revolute | Prismatic | Wheel, S::UpperLimit) => self.upper,
            (Revolute | Prismatic | Wheel, S::MotorSpeed) => self.motor_speed,
            (Prismatic, S::MaxMotorForce) => self.max_motor_force,
            (Revolute | Wheel, S::MaxMotorTorque) => self.max_motor_torque,
            (Motor, S::AngularOffset) => self.angular_offset,
            (Motor | Mouse, S::MaxForce) => self.max_force,
            (Motor, S::MaxTorque) => self.max_torque,
            (Motor, S::CorrectionFactor) => self.correction_factor,
            _ => return None,
        };
        Some(value)
    }

    /// Store `value`; `false` if the kind has no such writable scalar.
    pub fn set_scalar(&mut self, scalar: JointScalar, value: f32) -> bool {
        if self.scalar(scalar).is_none() {
            return false;
        }
        let slot = match scalar {
            JointScalar::Length => &mut self.length,
            JointScalar::Frequency => &mut self.frequency,
            JointScalar::DampingRatio => &mut self.damping_ratio,
            JointScalar::LowerLimit => &mut self.lower,
            JointScalar::UpperLimit => &mut self.upper,
            JointScalar::MotorSpeed => &mut self.motor_speed,
            JointScalar::MaxMotorForce => &mut self.max_motor_force,
            JointScalar::MaxMotorTorque => &mut self.max_motor_torque,
            JointScalar::AngularOffset => &mut self.angular_offset,
            JointScalar::MaxForce => &mut self.max_force,
            JointScalar::MaxTorque => &mut self.max_torque,
            JointScalar::CorrectionFactor => &mut self.correction_factor,
            JointScalar::MotorTorque | JointScalar::Angle | JointScalar::Translation => {
                return false;
            }
        };
        *slot = match scalar {
            JointScalar::CorrectionFactor => value.clamp(0.0, 1.0),
            JointScalar::Length | JointScalar::Frequency | JointScalar::DampingRatio => {
                value.max(0.0)
            }
            _ => value,
        };
        true
    }

    fn has_limit_and_motor(&self) -> bool {
        matches!(
            self.kind,
            JointKind::Revolute | JointKind::Prismatic | JointKind::Wheel
        )
    }

    pub fn flag(&self, flag: JointFlag) -> bool {
        match flag {
            JointFlag::LimitEnabled => self.has_limit_and_motor() && self.limit_enabled,
            JointFlag::MotorEnabled => self.has_limit_and_motor() && self.motor_enabled,
            JointFlag::SpringEnabled => self.kind == JointKind::Wheel && self.spring_enabled,
        }
    }

    pub fn set_flag(&mut self, flag: JointFlag, value: bool) -> bool {
        let slot = match flag {
            JointFlag::LimitEnabled if self.has_limit_and_motor() => &mut self.limit_enabled,
            JointFlag::MotorEnabled if self.has_limit_and_motor() => &mut self.motor_enabled,
            JointFlag::SpringEnabled if self.kind == JointKind::Wheel => &mut self.spring_enabled,
            _ => return false,
        };
        *slot = value;
        true
    }

    pub fn vector(&self, vector: JointVector) -> Vec2 {
        match (self.kind, vector) {
            (JointKind::Mouse, JointVector::Target) => self.target,
            (JointKind::Motor, JointVector::LinearOffset) => self.linear_offset,
            _ => Vec2::ZERO,
        }
    }

    pub fn set_vector(&mut self, vector: JointVector, value: Vec2) -> bool {
        match (self.kind, vector) {
            (JointKind::Mouse, JointVector::Target) => self.target = value,
            (JointKind::Motor, JointVector::LinearOffset) => self.linear_offset = value,
            _ => return false,
        }
        true
    }
}
