//! Pixel-space 2D physics over an external rigid-body solver.
//!
//! The solver owns the simulation and speaks metric units and numeric
//! handles. This crate wraps those handles in game-facing [`World`],
//! [`Body`], [`Fixture`], [`Joint`] and [`Contact`] objects, converts every
//! spatial quantity through the shared [`MeterScale`], and turns the flat
//! per-step event buffers into begin/end/hit/pre-solve callbacks.
//!
//! ```no_run
//! use kite_config::PhysicsConfig;
//! use kite_physics::{BodyType, Physics, Shape};
//!
//! let physics = Physics::new(PhysicsConfig::default())?;
//! let world = physics.new_world(0.0, 300.0, true)?;
//! let ball = physics.new_body(&world, 0.0, 0.0, BodyType::Dynamic)?;
//! physics.new_fixture(&ball, &Shape::circle(0.0, 0.0, 10.0)?, Some(1.0))?;
//! world.on_begin_contact(|contact| {
//!     let (a, b) = contact.fixtures();
//!     println!("touch {:?} {:?}", a.body().map(|b| b.position()), b.is_sensor());
//! });
//! world.update(1.0 / 60.0, 4);
//! # Ok::<(), kite_physics::PhysicsError>(())
//! ```

mod body;
mod contact;
mod error;
mod fixture;
mod handle_table;
mod joint;
mod physics;
mod shape;
pub mod solver;
mod units;
mod world;

pub use body::{Body, BodyType, MassData};
pub use contact::Contact;
pub use error::PhysicsError;
pub use fixture::Fixture;
pub use joint::{
    DistanceJoint, Joint, JointType, MotorJoint, MouseJoint, PrismaticJoint, RevoluteJoint,
    WeldJoint, WheelJoint,
};
pub use physics::{Physics, SolverLoader};
pub use shape::{Shape, ShapeType};
pub use solver::Filter;
pub use units::MeterScale;
pub use world::{CallbackKind, RayCastHit, World};
