//! Small scenes exercising each part of the adapter.

use std::cell::Cell;
use std::rc::Rc;

use glam::Vec2;
use kite_physics::{Body, BodyType, Physics, PhysicsError, Shape, World};
use tracing::{debug, info};

fn step(physics: &Physics, world: &World, frames: u32) {
    let config = physics.config();
    for _ in 0..frames {
        world.update(config.fixed_dt, config.sub_steps);
    }
}

fn slab(
    physics: &Physics,
    world: &World,
    x: f32,
    top: f32,
    width: f32,
) -> Result<Body, PhysicsError> {
    let body = physics.new_body(world, x, top + 10.0, BodyType::Static)?;
    physics.new_fixture(&body, &Shape::rectangle(0.0, 0.0, width, 20.0, 0.0)?, None)?;
    Ok(body)
}

/// A ball dropped onto a slab, reporting contacts and the impact speed.
pub fn drop_ball(physics: &Physics, frames: u32) -> Result<(), PhysicsError> {
    let world = physics.new_world(0.0, 300.0, true)?;
    slab(physics, &world, 0.0, 90.0, 400.0)?;
    let ball = physics.new_body(&world, 0.0, 0.0, BodyType::Dynamic)?;
    physics.new_fixture(&ball, &Shape::circle(0.0, 0.0, 10.0)?, None)?;

    let touches = Rc::new(Cell::new(0u32));
    let seen = touches.clone();
    world.on_begin_contact(move |_| seen.set(seen.get() + 1));
    world.on_hit(|contact, speed| {
        info!(speed, point = ?contact.position(), "ball hit the ground");
    });

    step(physics, &world, frames);
    info!(
        y = ball.y(),
        awake = ball.is_awake(),
        touches = touches.get(),
        "drop_ball finished"
    );
    world.destroy();
    Ok(())
}

/// A bob swinging on a revolute joint.
pub fn pendulum(physics: &Physics, frames: u32) -> Result<(), PhysicsError> {
    let world = physics.new_world(0.0, 300.0, true)?;
    let pivot = physics.new_body(&world, 0.0, 0.0, BodyType::Static)?;
    let bob = physics.new_body(&world, 60.0, 0.0, BodyType::Dynamic)?;
    physics.new_fixture(&bob, &Shape::circle(0.0, 0.0, 5.0)?, None)?;
    let joint = physics.new_revolute_joint(&pivot, &bob, 0.0, 0.0, false)?;

    for frame in 0..frames {
        step(physics, &world, 1);
        if frame % 15 == 0 {
            debug!(frame, angle = joint.joint_angle(), position = ?bob.position(), "pendulum");
        }
    }
    info!(
        radius = bob.position().length(),
        angle = joint.joint_angle(),
        "pendulum finished"
    );
    world.destroy();
    Ok(())
}

/// A ball thrown up through a platform that only blocks from above.
pub fn one_way_platform(physics: &Physics, frames: u32) -> Result<(), PhysicsError> {
    let world = physics.new_world(0.0, 300.0, true)?;
    let platform = slab(physics, &world, 0.0, 0.0, 200.0)?;
    let ball = physics.new_body(&world, 0.0, 60.0, BodyType::Dynamic)?;
    physics.new_fixture(&ball, &Shape::circle(0.0, 0.0, 10.0)?, None)?;
    ball.set_linear_velocity(0.0, -400.0);

    let rejected = Rc::new(Cell::new(0u32));
    let count = rejected.clone();
    world.on_pre_solve(move |contact| {
        let (a, b) = contact.fixtures();
        let (Some(a), Some(b)) = (a.body(), b.body()) else {
            return;
        };
        let mover = if a.ptr_eq(&platform) { b } else { a };
        if mover.linear_velocity().y < 0.0 {
            contact.set_enabled(false);
            count.set(count.get() + 1);
        }
    });

    step(physics, &world, frames);
    info!(
        y = ball.y(),
        rejected = rejected.get(),
        "one_way_platform finished"
    );
    world.destroy();
    Ok(())
}

/// Ray casts and a box query against a row of crates.
pub fn ray_probe(physics: &Physics) -> Result<(), PhysicsError> {
    let world = physics.new_world(0.0, 0.0, true)?;
    for i in 0..4 {
        let x = 50.0 + 40.0 * i as f32;
        let body = physics.new_body(&world, x, 0.0, BodyType::Static)?;
        physics.new_fixture(&body, &Shape::rectangle(0.0, 0.0, 20.0, 20.0, 0.0)?, None)?;
    }

    match world.ray_cast(0.0, 0.0, 300.0, 0.0) {
        Some(hit) => info!(
            point = ?hit.point,
            normal = ?hit.normal,
            fraction = hit.fraction,
            "ray hit"
        ),
        None => info!("ray missed"),
    }
    let centers: Vec<Vec2> = world
        .query_bounding_box(60.0, -5.0, 140.0, 5.0)
        .iter()
        .filter_map(|fixture| fixture.body())
        .map(|body| body.position())
        .collect();
    info!(?centers, "box query");
    world.destroy();
    Ok(())
}
