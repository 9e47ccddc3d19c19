use std::ops::Deref;

use glam::Vec2;

use super::{Anchors, Joint, JointType, Unit};
use crate::body::Body;
use crate::error::PhysicsError;
use crate::solver::{JointFlag, JointKindDef, JointScalar, JointVector};

macro_rules! joint_kind {
    ($(#[$meta:meta])* $name:ident, $kind:expr, $downcast:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name(Joint);

        impl Deref for $name {
            type Target = Joint;

            fn deref(&self) -> &Joint {
                &self.0
            }
        }

        impl $name {
            pub fn into_joint(self) -> Joint {
                self.0
            }
        }

        impl TryFrom<Joint> for $name {
            type Error = Joint;

            fn try_from(joint: Joint) -> Result<Self, Joint> {
                if joint.joint_type() == $kind {
                    Ok(Self(joint))
                } else {
                    Err(joint)
                }
            }
        }

        impl From<$name> for Joint {
            fn from(joint: $name) -> Joint {
                joint.0
            }
        }

        impl Joint {
            pub fn $downcast(&self) -> Option<$name> {
                $name::try_from(self.clone()).ok()
            }
        }
    };
}

joint_kind!(
    /// Keeps two anchor points at a fixed distance, rigidly or as a spring.
    DistanceJoint,
    JointType::Distance,
    as_distance
);
joint_kind!(
    /// Pins two bodies together at a shared point.
    RevoluteJoint,
    JointType::Revolute,
    as_revolute
);
joint_kind!(
    /// Lets body B slide along an axis fixed in body A.
    PrismaticJoint,
    JointType::Prismatic,
    as_prismatic
);
joint_kind!(WeldJoint, JointType::Weld, as_weld);
joint_kind!(
    /// Drags a body towards a world target.
    MouseJoint,
    JointType::Mouse,
    as_mouse
);
joint_kind!(
    /// Suspension along an axis plus a free, motorized rotation.
    WheelJoint,
    JointType::Wheel,
    as_wheel
);
joint_kind!(
    /// Drives body B towards an offset in body A's frame.
    MotorJoint,
    JointType::Motor,
    as_motor
);

/// World axis in body A's frame.
fn local_axis(body_a: &Body, axis: Vec2) -> Vec2 {
    let axis = axis.try_normalize().unwrap_or(Vec2::X);
    Vec2::from_angle(-body_a.angle()).rotate(axis)
}

// ---------------------------------------------------------------------------
// Distance
// ---------------------------------------------------------------------------

impl DistanceJoint {
    pub(crate) fn create(
        body_a: &Body,
        body_b: &Body,
        anchor_a: Vec2,
        anchor_b: Vec2,
        collide_connected: bool,
    ) -> Result<Self, PhysicsError> {
        Joint::create(
            JointType::Distance,
            body_a,
            body_b,
            Anchors::Separate(anchor_a, anchor_b),
            collide_connected,
            |_, a, b| JointKindDef::Distance {
                length: a.distance(b),
                frequency: 0.0,
                damping_ratio: 0.0,
            },
        )
        .map(Self)
    }

    /// Rest length in pixels.
    pub fn length(&self) -> f32 {
        self.scalar(JointScalar::Length, Unit::Length)
    }

    pub fn set_length(&self, length: f32) {
        self.set_scalar(JointScalar::Length, Unit::Length, length);
    }

    /// Spring frequency in Hz; zero makes the joint rigid.
    pub fn frequency(&self) -> f32 {
        self.scalar(JointScalar::Frequency, Unit::Plain)
    }

    pub fn set_frequency(&self, hz: f32) {
        self.set_scalar(JointScalar::Frequency, Unit::Plain, hz);
    }

    pub fn damping_ratio(&self) -> f32 {
        self.scalar(JointScalar::DampingRatio, Unit::Plain)
    }

    pub fn set_damping_ratio(&self, ratio: f32) {
        self.set_scalar(JointScalar::DampingRatio, Unit::Plain, ratio);
    }
}

// ---------------------------------------------------------------------------
// Revolute
// ---------------------------------------------------------------------------

impl RevoluteJoint {
    pub(crate) fn create(
        body_a: &Body,
        body_b: &Body,
        anchor: Vec2,
        collide_connected: bool,
    ) -> Result<Self, PhysicsError> {
        Joint::create(
            JointType::Revolute,
            body_a,
            body_b,
            Anchors::Shared(anchor),
            collide_connected,
            |_, _, _| JointKindDef::Revolute,
        )
        .map(Self)
    }

    /// Angle of B relative to A, radians, zero at creation.
    pub fn joint_angle(&self) -> f32 {
        self.scalar(JointScalar::Angle, Unit::Plain)
    }

    pub fn is_limit_enabled(&self) -> bool {
        self.flag(JointFlag::LimitEnabled)
    }

    pub fn set_limit_enabled(&self, enabled: bool) {
        self.set_flag(JointFlag::LimitEnabled, enabled);
    }

    pub fn lower_limit(&self) -> f32 {
        self.scalar(JointScalar::LowerLimit, Unit::Plain)
    }

    pub fn upper_limit(&self) -> f32 {
        self.scalar(JointScalar::UpperLimit, Unit::Plain)
    }

    /// Rotation limits in radians.
    pub fn set_limits(&self, lower: f32, upper: f32) {
        self.set_scalar(JointScalar::LowerLimit, Unit::Plain, lower.min(upper));
        self.set_scalar(JointScalar::UpperLimit, Unit::Plain, lower.max(upper));
    }

    pub fn is_motor_enabled(&self) -> bool {
        self.flag(JointFlag::MotorEnabled)
    }

    pub fn set_motor_enabled(&self, enabled: bool) {
        self.set_flag(JointFlag::MotorEnabled, enabled);
        self.wake_bodies();
    }

    /// Motor speed in radians/s.
    pub fn motor_speed(&self) -> f32 {
        self.scalar(JointScalar::MotorSpeed, Unit::Plain)
    }

    pub fn set_motor_speed(&self, speed: f32) {
        self.set_scalar(JointScalar::MotorSpeed, Unit::Plain, speed);
        self.wake_bodies();
    }

    pub fn max_motor_torque(&self) -> f32 {
        self.scalar(JointScalar::MaxMotorTorque, Unit::Torque)
    }

    pub fn set_max_motor_torque(&self, torque: f32) {
        self.set_scalar(JointScalar::MaxMotorTorque, Unit::Torque, torque);
        self.wake_bodies();
    }
}

// ---------------------------------------------------------------------------
// Prismatic
// ---------------------------------------------------------------------------

impl PrismaticJoint {
    pub(crate) fn create(
        body_a: &Body,
        body_b: &Body,
        anchor: Vec2,
        axis: Vec2,
        collide_connected: bool,
    ) -> Result<Self, PhysicsError> {
        let local_axis = local_axis(body_a, axis);
        Joint::create(
            JointType::Prismatic,
            body_a,
            body_b,
            Anchors::Shared(anchor),
            collide_connected,
            |_, _, _| JointKindDef::Prismatic { local_axis },
        )
        .map(Self)
    }

    /// Displacement of B along the axis in pixels, zero at creation.
    pub fn translation(&self) -> f32 {
        self.scalar(JointScalar::Translation, Unit::Length)
    }

    pub fn is_limit_enabled(&self) -> bool {
        self.flag(JointFlag::LimitEnabled)
    }

    pub fn set_limit_enabled(&self, enabled: bool) {
        self.set_flag(JointFlag::LimitEnabled, enabled);
    }

    pub fn lower_limit(&self) -> f32 {
        self.scalar(JointScalar::LowerLimit, Unit::Length)
    }

    pub fn upper_limit(&self) -> f32 {
        self.scalar(JointScalar::UpperLimit, Unit::Length)
    }

    /// Translation limits in pixels.
    pub fn set_limits(&self, lower: f32, upper: f32) {
        self.set_scalar(JointScalar::LowerLimit, Unit::Length, lower.min(upper));
        self.set_scalar(JointScalar::UpperLimit, Unit::Length, lower.max(upper));
    }

    pub fn is_motor_enabled(&self) -> bool {
        self.flag(JointFlag::MotorEnabled)
    }

    pub fn set_motor_enabled(&self, enabled: bool) {
        self.set_flag(JointFlag::MotorEnabled, enabled);
        self.wake_bodies();
    }

    /// Motor speed in pixels/s.
    pub fn motor_speed(&self) -> f32 {
        self.scalar(JointScalar::MotorSpeed, Unit::Length)
    }

    pub fn set_motor_speed(&self, speed: f32) {
        self.set_scalar(JointScalar::MotorSpeed, Unit::Length, speed);
        self.wake_bodies();
    }

    pub fn max_motor_force(&self) -> f32 {
        self.scalar(JointScalar::MaxMotorForce, Unit::Force)
    }

    pub fn set_max_motor_force(&self, force: f32) {
        self.set_scalar(JointScalar::MaxMotorForce, Unit::Force, force);
        self.wake_bodies();
    }
}

// ---------------------------------------------------------------------------
// Weld
// ---------------------------------------------------------------------------

impl WeldJoint {
    pub(crate) fn create(
        body_a: &Body,
        body_b: &Body,
        anchor: Vec2,
        collide_connected: bool,
    ) -> Result<Self, PhysicsError> {
        Joint::create(
            JointType::Weld,
            body_a,
            body_b,
            Anchors::Shared(anchor),
            collide_connected,
            |_, _, _| JointKindDef::Weld {
                frequency: 0.0,
                damping_ratio: 0.0,
            },
        )
        .map(Self)
    }

    /// Linear spring frequency in Hz; zero welds rigidly.
    pub fn frequency(&self) -> f32 {
        self.scalar(JointScalar::Frequency, Unit::Plain)
    }

    pub fn set_frequency(&self, hz: f32) {
        self.set_scalar(JointScalar::Frequency, Unit::Plain, hz);
    }

    pub fn damping_ratio(&self) -> f32 {
        self.scalar(JointScalar::DampingRatio, Unit::Plain)
    }

    pub fn set_damping_ratio(&self, ratio: f32) {
        self.set_scalar(JointScalar::DampingRatio, Unit::Plain, ratio);
    }
}

// ---------------------------------------------------------------------------
// Mouse
// ---------------------------------------------------------------------------

impl MouseJoint {
    /// Both joint bodies are `body`; the solver supplies the fixed end.
    pub(crate) fn create(body: &Body, target: Vec2) -> Result<Self, PhysicsError> {
        Joint::create(
            JointType::Mouse,
            body,
            body,
            Anchors::Shared(target),
            false,
            |_, target, _| JointKindDef::Mouse {
                target,
                max_force: None,
            },
        )
        .map(Self)
    }

    /// The dragged body.
    pub fn body(&self) -> Body {
        self.bodies().1
    }

    /// Target in world pixels.
    pub fn target(&self) -> Vec2 {
        self.vector(JointVector::Target)
    }

    pub fn set_target(&self, x: f32, y: f32) {
        self.set_vector(JointVector::Target, Vec2::new(x, y));
        self.wake_bodies();
    }

    pub fn max_force(&self) -> f32 {
        self.scalar(JointScalar::MaxForce, Unit::Force)
    }

    pub fn set_max_force(&self, force: f32) {
        self.set_scalar(JointScalar::MaxForce, Unit::Force, force);
    }

    pub fn frequency(&self) -> f32 {
        self.scalar(JointScalar::Frequency, Unit::Plain)
    }

    pub fn set_frequency(&self, hz: f32) {
        self.set_scalar(JointScalar::Frequency, Unit::Plain, hz);
    }

    pub fn damping_ratio(&self) -> f32 {
        self.scalar(JointScalar::DampingRatio, Unit::Plain)
    }

    pub fn set_damping_ratio(&self, ratio: f32) {
        self.set_scalar(JointScalar::DampingRatio, Unit::Plain, ratio);
    }
}

// ---------------------------------------------------------------------------
// Wheel
// ---------------------------------------------------------------------------

impl WheelJoint {
    pub(crate) fn create(
        body_a: &Body,
        body_b: &Body,
        anchor: Vec2,
        axis: Vec2,
        collide_connected: bool,
    ) -> Result<Self, PhysicsError> {
        let local_axis = local_axis(body_a, axis);
        Joint::create(
            JointType::Wheel,
            body_a,
            body_b,
            Anchors::Shared(anchor),
            collide_connected,
            |_, _, _| JointKindDef::Wheel { local_axis },
        )
        .map(Self)
    }

    pub fn is_spring_enabled(&self) -> bool {
        self.flag(JointFlag::SpringEnabled)
    }

    pub fn set_spring_enabled(&self, enabled: bool) {
        self.set_flag(JointFlag::SpringEnabled, enabled);
    }

    /// Suspension frequency in Hz.
    pub fn frequency(&self) -> f32 {
        self.scalar(JointScalar::Frequency, Unit::Plain)
    }

    pub fn set_frequency(&self, hz: f32) {
        self.set_scalar(JointScalar::Frequency, Unit::Plain, hz);
    }

    pub fn damping_ratio(&self) -> f32 {
        self.scalar(JointScalar::DampingRatio, Unit::Plain)
    }

    pub fn set_damping_ratio(&self, ratio: f32) {
        self.set_scalar(JointScalar::DampingRatio, Unit::Plain, ratio);
    }

    pub fn is_limit_enabled(&self) -> bool {
        self.flag(JointFlag::LimitEnabled)
    }

    pub fn set_limit_enabled(&self, enabled: bool) {
        self.set_flag(JointFlag::LimitEnabled, enabled);
    }

    pub fn lower_limit(&self) -> f32 {
        self.scalar(JointScalar::LowerLimit, Unit::Length)
    }

    pub fn upper_limit(&self) -> f32 {
        self.scalar(JointScalar::UpperLimit, Unit::Length)
    }

    /// Suspension travel limits in pixels.
    pub fn set_limits(&self, lower: f32, upper: f32) {
        self.set_scalar(JointScalar::LowerLimit, Unit::Length, lower.min(upper));
        self.set_scalar(JointScalar::UpperLimit, Unit::Length, lower.max(upper));
    }

    pub fn is_motor_enabled(&self) -> bool {
        self.flag(JointFlag::MotorEnabled)
    }

    pub fn set_motor_enabled(&self, enabled: bool) {
        self.set_flag(JointFlag::MotorEnabled, enabled);
        self.wake_bodies();
    }

    /// Wheel spin speed in radians/s.
    pub fn motor_speed(&self) -> f32 {
        self.scalar(JointScalar::MotorSpeed, Unit::Plain)
    }

    pub fn set_motor_speed(&self, speed: f32) {
        self.set_scalar(JointScalar::MotorSpeed, Unit::Plain, speed);
        self.wake_bodies();
    }

    pub fn max_motor_torque(&self) -> f32 {
        self.scalar(JointScalar::MaxMotorTorque, Unit::Torque)
    }

    pub fn set_max_motor_torque(&self, torque: f32) {
        self.set_scalar(JointScalar::MaxMotorTorque, Unit::Torque, torque);
        self.wake_bodies();
    }

    /// Torque the motor applied over the last step.
    pub fn motor_torque(&self) -> f32 {
        self.scalar(JointScalar::MotorTorque, Unit::Torque)
    }
}

// ---------------------------------------------------------------------------
// Motor
// ---------------------------------------------------------------------------

impl MotorJoint {
    /// Offsets start at B's current pose relative to A.
    pub(crate) fn create(
        body_a: &Body,
        body_b: &Body,
        correction_factor: f32,
        collide_connected: bool,
    ) -> Result<Self, PhysicsError> {
        let offset = body_a.local_point(body_b.position());
        let angular_offset = body_b.angle() - body_a.angle();
        Joint::create(
            JointType::Motor,
            body_a,
            body_b,
            Anchors::Origins,
            collide_connected,
            |scale, _, _| JointKindDef::Motor {
                linear_offset: scale.vec_to_units(offset),
                angular_offset,
                max_force: 1.0,
                max_torque: 1.0,
                correction_factor: correction_factor.clamp(0.0, 1.0),
            },
        )
        .map(Self)
    }

    /// Target position of B in A's frame, pixels.
    pub fn linear_offset(&self) -> Vec2 {
        self.vector(JointVector::LinearOffset)
    }

    pub fn set_linear_offset(&self, x: f32, y: f32) {
        self.set_vector(JointVector::LinearOffset, Vec2::new(x, y));
        self.wake_bodies();
    }

    /// Target angle of B relative to A, radians.
    pub fn angular_offset(&self) -> f32 {
        self.scalar(JointScalar::AngularOffset, Unit::Plain)
    }

    pub fn set_angular_offset(&self, angle: f32) {
        self.set_scalar(JointScalar::AngularOffset, Unit::Plain, angle);
        self.wake_bodies();
    }

    pub fn max_force(&self) -> f32 {
        self.scalar(JointScalar::MaxForce, Unit::Force)
    }

    pub fn set_max_force(&self, force: f32) {
        self.set_scalar(JointScalar::MaxForce, Unit::Force, force);
        self.wake_bodies();
    }

    pub fn max_torque(&self) -> f32 {
        self.scalar(JointScalar::MaxTorque, Unit::Torque)
    }

    pub fn set_max_torque(&self, torque: f32) {
        self.set_scalar(JointScalar::MaxTorque, Unit::Torque, torque);
        self.wake_bodies();
    }

    /// Position correction in `[0, 1]`.
    pub fn correction_factor(&self) -> f32 {
        self.scalar(JointScalar::CorrectionFactor, Unit::Plain)
    }

    pub fn set_correction_factor(&self, factor: f32) {
        self.set_scalar(JointScalar::CorrectionFactor, Unit::Plain, factor.clamp(0.0, 1.0));
        self.wake_bodies();
    }
}
