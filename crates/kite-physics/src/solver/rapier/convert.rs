//! glam ↔ nalgebra conversions.

use glam::Vec2;
use rapier2d::prelude::*;

use crate::body::BodyType;
use crate::solver::Transform;

pub(super) fn to_vector(v: Vec2) -> Vector<Real> {
    vector![v.x, v.y]
}

pub(super) fn to_point(v: Vec2) -> Point<Real> {
    point![v.x, v.y]
}

pub(super) fn from_vector(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}

pub(super) fn from_point(p: &Point<Real>) -> Vec2 {
    Vec2::new(p.x, p.y)
}

pub(super) fn isometry(translation: Vec2, angle: f32) -> Isometry<Real> {
    Isometry::new(to_vector(translation), angle)
}

pub(super) fn transform(position: &Isometry<Real>) -> Transform {
    Transform {
        position: from_vector(&position.translation.vector),
        angle: position.rotation.angle(),
    }
}

pub(super) fn to_body_type(body_type: BodyType) -> RigidBodyType {
    match body_type {
        BodyType::Static => RigidBodyType::Fixed,
        BodyType::Kinematic => RigidBodyType::KinematicVelocityBased,
        BodyType::Dynamic => RigidBodyType::Dynamic,
    }
}

pub(super) fn from_body_type(body_type: RigidBodyType) -> BodyType {
    match body_type {
        RigidBodyType::Fixed => BodyType::Static,
        RigidBodyType::Dynamic => BodyType::Dynamic,
        RigidBodyType::KinematicPositionBased | RigidBodyType::KinematicVelocityBased => {
            BodyType::Kinematic
        }
    }
}
