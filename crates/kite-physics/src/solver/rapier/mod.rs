//! [`Solver`] on rapier2d.
//!
//! Each world owns a full rapier pipeline. Bodies and shapes get dense
//! indices from [`IndexTable`]s shared by all worlds; a collider's
//! `user_data` carries its shape index and filter so the step hooks can
//! resolve pairs without the tables. Queries scan the world's colliders.

mod convert;
mod hooks;
mod joints;
mod tables;

use std::num::NonZeroUsize;

use glam::Vec2;
use kite_config::PhysicsConfig;
use rapier2d::parry::bounding_volume::Aabb;
use rapier2d::parry::query::Ray;
use rapier2d::prelude::*;
use rustc_hash::FxHashSet;
use tracing::{debug, trace, warn};

use self::convert::{
    from_body_type, from_point, from_vector, isometry, to_body_type, to_point, to_vector, transform,
};
use self::hooks::{ContactHooks, EventCollector};
use self::joints::{JointKind, JointRecord};
use self::tables::{ColliderTag, IndexTable, body_index, body_tag};
use super::{
    BodyDef, BodyFlag, BodyIndex, BodyScalar, ChainDef, Filter, JointDef, JointFlag, JointId,
    JointKindDef, JointScalar, JointVector, MoveEvent, RayHit, ShapeDef, ShapeFlag, ShapeGeometry,
    ShapeIndex, ShapePair, ShapeScalar, Solver, SolverMassData, StepEvents, Transform, WorldDef,
    WorldHandle,
};
use crate::body::BodyType;

struct RapierWorld {
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,

    allow_sleep: bool,
    hit_speed_threshold: f32,
    /// Fixed body mouse joints pull against, created on first use.
    ground: Option<RigidBodyHandle>,
    accepted: FxHashSet<(u32, u32)>,
    /// Keys of the pairs in the last pre-solve batch.
    reported: FxHashSet<(u32, u32)>,
    last_dt: f32,
}

impl RapierWorld {
    fn new(def: &WorldDef) -> Self {
        Self {
            gravity: to_vector(def.gravity),
            params: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            allow_sleep: def.allow_sleep,
            hit_speed_threshold: def.hit_speed_threshold,
            ground: None,
            accepted: FxHashSet::default(),
            reported: FxHashSet::default(),
            last_dt: 0.0,
        }
    }

    fn ground(&mut self) -> RigidBodyHandle {
        if let Some(ground) = self.ground {
            return ground;
        }
        let ground = self.bodies.insert(RigidBodyBuilder::fixed().build());
        self.ground = Some(ground);
        ground
    }

    fn world_point(&self, body: RigidBodyHandle, local: Vec2) -> Vec2 {
        self.bodies
            .get(body)
            .map_or(local, |rb| from_point(&(rb.position() * to_point(local))))
    }

    fn angle(&self, body: RigidBodyHandle) -> f32 {
        self.bodies.get(body).map_or(0.0, |rb| rb.rotation().angle())
    }
}

#[derive(Debug, Clone, Copy)]
struct BodyRecord {
    world: WorldHandle,
    handle: RigidBodyHandle,
    sleep_allowed: bool,
}

#[derive(Debug, Clone, Copy)]
struct ShapeRecord {
    world: WorldHandle,
    body: BodyIndex,
    collider: ColliderHandle,
    tag: ColliderTag,
    pre_solve: bool,
}

#[derive(Debug)]
struct JointSlot {
    generation: u16,
    record: Option<JointRecord>,
}

fn world_ref(worlds: &[Option<RapierWorld>], handle: WorldHandle) -> Option<&RapierWorld> {
    worlds.get(handle.slot())?.as_ref()
}

fn world_mut(worlds: &mut [Option<RapierWorld>], handle: WorldHandle) -> Option<&mut RapierWorld> {
    worlds.get_mut(handle.slot())?.as_mut()
}

fn joint_ref(joints: &[JointSlot], id: JointId) -> Option<&JointRecord> {
    let slot = joints.get(id.slot() as usize)?;
    if slot.generation != id.generation() {
        return None;
    }
    slot.record.as_ref()
}

fn joint_mut(joints: &mut [JointSlot], id: JointId) -> Option<&mut JointRecord> {
    let slot = joints.get_mut(id.slot() as usize)?;
    if slot.generation != id.generation() {
        return None;
    }
    slot.record.as_mut()
}

/// Non-zero groups are decided by the pair-filter hooks, so they pass
/// rapier's own bitmask test unconditionally.
fn interaction_groups(filter: Filter) -> InteractionGroups {
    if filter.group != 0 {
        return InteractionGroups::all();
    }
    InteractionGroups::new(
        Group::from_bits_truncate(u32::from(filter.category)),
        Group::from_bits_truncate(u32::from(filter.mask)),
    )
}

fn active_hooks(filter: Filter, pre_solve: bool) -> ActiveHooks {
    let mut hooks = ActiveHooks::empty();
    if filter.group != 0 {
        hooks |= ActiveHooks::FILTER_CONTACT_PAIRS | ActiveHooks::FILTER_INTERSECTION_PAIR;
    }
    if pre_solve {
        hooks |= ActiveHooks::MODIFY_SOLVER_CONTACTS;
    }
    hooks
}

fn finish_collider(
    builder: ColliderBuilder,
    tag: ColliderTag,
    pre_solve: bool,
    (friction, restitution): (f32, f32),
) -> Collider {
    builder
        .friction(friction)
        .restitution(restitution)
        .restitution_combine_rule(CoefficientCombineRule::Max)
        .collision_groups(interaction_groups(tag.filter))
        .active_events(ActiveEvents::COLLISION_EVENTS)
        .active_hooks(active_hooks(tag.filter, pre_solve))
        .user_data(tag.pack())
        .build()
}

fn aabb_overlaps(aabb: &Aabb, lower: Vec2, upper: Vec2) -> bool {
    aabb.mins.x <= upper.x
        && aabb.maxs.x >= lower.x
        && aabb.mins.y <= upper.y
        && aabb.maxs.y >= lower.y
}

pub struct RapierSolver {
    worlds: Vec<Option<RapierWorld>>,
    bodies: IndexTable<BodyRecord>,
    shapes: IndexTable<ShapeRecord>,
    joints: Vec<JointSlot>,
    free_joints: Vec<u32>,
}

impl RapierSolver {
    pub fn new(config: &PhysicsConfig) -> Self {
        debug!(
            max_bodies = config.max_bodies,
            max_shapes = config.max_shapes,
            "rapier solver ready"
        );
        Self {
            worlds: Vec::new(),
            bodies: IndexTable::new(config.max_bodies),
            shapes: IndexTable::new(config.max_shapes),
            joints: Vec::new(),
            free_joints: Vec::new(),
        }
    }

    fn rigid(&self, body: BodyIndex) -> Option<&RigidBody> {
        let record = self.bodies.get(body.0)?;
        world_ref(&self.worlds, record.world)?.bodies.get(record.handle)
    }

    fn rigid_mut(&mut self, body: BodyIndex) -> Option<&mut RigidBody> {
        let record = self.bodies.get(body.0)?;
        world_mut(&mut self.worlds, record.world)?.bodies.get_mut(record.handle)
    }

    fn collider(&self, shape: ShapeIndex) -> Option<&Collider> {
        let record = self.shapes.get(shape.0)?;
        world_ref(&self.worlds, record.world)?.colliders.get(record.collider)
    }

    fn attach(
        &mut self,
        body: BodyIndex,
        builder: ColliderBuilder,
        tag: ColliderTag,
        pre_solve: bool,
        material: (f32, f32),
    ) -> Option<ShapeIndex> {
        let record = *self.bodies.get(body.0)?;
        let world = world_mut(&mut self.worlds, record.world)?;
        let index = self.shapes.claim(|index| {
            let tag = ColliderTag {
                shape: ShapeIndex(index),
                ..tag
            };
            let collider = finish_collider(builder, tag, pre_solve, material);
            let collider = world.colliders.insert_with_parent(
                collider,
                record.handle,
                &mut world.bodies,
            );
            ShapeRecord {
                world: record.world,
                body,
                collider,
                tag,
                pre_solve,
            }
        });
        let Some(index) = index else {
            warn!(body = body.0, "shape index capacity exhausted");
            return None;
        };
        if let Some(rb) = world.bodies.get_mut(record.handle) {
            rb.recompute_mass_properties_from_colliders(&world.colliders);
        }
        Some(ShapeIndex(index))
    }

    fn remove_shape(&mut self, shape: ShapeIndex) {
        let Some(record) = self.shapes.retire(shape.0) else {
            return;
        };
        if let Some(world) = world_mut(&mut self.worlds, record.world) {
            world
                .colliders
                .remove(record.collider, &mut world.islands, &mut world.bodies, true);
        }
    }

    fn update_shape(
        &mut self,
        shape: ShapeIndex,
        change: impl FnOnce(&mut ShapeRecord, &mut Collider),
    ) {
        let Some(record) = self.shapes.get_mut(shape.0) else {
            return;
        };
        let Some(collider) = world_mut(&mut self.worlds, record.world)
            .and_then(|w| w.colliders.get_mut(record.collider))
        else {
            return;
        };
        change(record, collider);
    }

    /// Apply `change` and rebuild the rapier joint if it reports a change.
    fn update_joint(&mut self, joint: JointId, change: impl FnOnce(&mut JointRecord) -> bool) {
        let Some(record) = joint_mut(&mut self.joints, joint) else {
            return;
        };
        if !change(record) {
            return;
        }
        if let Some(world) = world_mut(&mut self.worlds, record.world)
            && let Some(rapier_joint) = world.impulse_joints.get_mut(record.handle)
        {
            rapier_joint.data = record.generic();
        }
    }

    fn joint_world(&self, joint: JointId) -> Option<(&JointRecord, &RapierWorld)> {
        let record = joint_ref(&self.joints, joint)?;
        Some((record, world_ref(&self.worlds, record.world)?))
    }
}

impl Solver for RapierSolver {
    // -- world ----------------------------------------------------------------

    fn create_world(&mut self, def: &WorldDef) -> Option<WorldHandle> {
        let slot = self.worlds.len();
        // Joint ids carry the world slot in 16 bits.
        u16::try_from(slot).ok()?;
        let handle = WorldHandle::from_slot(slot)?;
        self.worlds.push(Some(RapierWorld::new(def)));
        debug!(world = slot, "rapier world created");
        Some(handle)
    }

    fn destroy_world(&mut self, world: WorldHandle) {
        let Some(slot) = self.worlds.get_mut(world.slot()) else {
            return;
        };
        if slot.take().is_none() {
            return;
        }
        self.bodies.retire_where(|b| b.world == world);
        self.shapes.retire_where(|s| s.world == world);
        for (index, slot) in self.joints.iter_mut().enumerate() {
            if slot.record.as_ref().is_some_and(|r| r.world == world) {
                slot.record = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free_joints.push(index as u32);
            }
        }
        debug!(world = world.slot(), "rapier world destroyed");
    }

    fn gravity(&self, world: WorldHandle) -> Vec2 {
        world_ref(&self.worlds, world).map_or(Vec2::ZERO, |w| from_vector(&w.gravity))
    }

    fn set_gravity(&mut self, world: WorldHandle, gravity: Vec2) {
        if let Some(w) = world_mut(&mut self.worlds, world) {
            w.gravity = to_vector(gravity);
        }
    }

    fn body_count(&self, world: WorldHandle) -> usize {
        self.bodies.iter().filter(|(_, b)| b.world == world).count()
    }

    fn set_accept_list(&mut self, world: WorldHandle, pairs: &[ShapePair]) {
        if let Some(w) = world_mut(&mut self.worlds, world) {
            w.accepted = pairs.iter().map(|p| p.key()).collect();
        }
    }

    fn step(&mut self, world: WorldHandle, dt: f32, sub_steps: u32, events: &mut StepEvents) {
        let Some(w) = world_mut(&mut self.worlds, world) else {
            return;
        };
        if dt <= 0.0 {
            return;
        }
        w.params.dt = dt;
        w.params.num_solver_iterations =
            NonZeroUsize::new(sub_steps as usize).unwrap_or(NonZeroUsize::MIN);
        w.last_dt = dt;

        for (_, record) in self.bodies.iter() {
            if record.world != world || (record.sleep_allowed && w.allow_sleep) {
                continue;
            }
            if let Some(rb) = w.bodies.get_mut(record.handle)
                && rb.is_dynamic()
            {
                rb.wake_up(true);
            }
        }

        let hooks = ContactHooks::new(&w.accepted, &w.reported);
        let collector = EventCollector::new(w.hit_speed_threshold);
        w.pipeline.step(
            &w.gravity,
            &w.params,
            &mut w.islands,
            &mut w.broad_phase,
            &mut w.narrow_phase,
            &mut w.bodies,
            &mut w.colliders,
            &mut w.impulse_joints,
            &mut w.multibody_joints,
            &mut w.ccd,
            None,
            &hooks,
            &collector,
        );
        let pre_solves = hooks.into_reports();
        let collected = collector.into_events();
        w.reported = pre_solves.iter().map(|e| e.pair.key()).collect();

        for (_, rb) in w.bodies.iter_mut() {
            rb.reset_forces(false);
            rb.reset_torques(false);
        }

        let active = w
            .islands
            .active_dynamic_bodies()
            .iter()
            .chain(w.islands.active_kinematic_bodies());
        for handle in active {
            let Some(rb) = w.bodies.get(*handle) else {
                continue;
            };
            let Some(index) = body_index(rb.user_data) else {
                continue;
            };
            events.moves.push(MoveEvent {
                body: BodyIndex(index),
                transform: transform(rb.position()),
            });
        }
        for pair in collected.begins {
            events.begins.push(pair);
        }
        for pair in collected.ends {
            events.ends.push(pair);
        }
        for hit in collected.hits {
            events.hits.push(hit);
        }
        for pre_solve in pre_solves {
            events.pre_solves.push(pre_solve);
        }
        trace!(world = world.slot(), dt, sub_steps, "rapier step");
    }

    fn ray_cast(&self, world: WorldHandle, origin: Vec2, translation: Vec2) -> Option<RayHit> {
        let w = world_ref(&self.worlds, world)?;
        if translation == Vec2::ZERO {
            return None;
        }
        let ray = Ray::new(to_point(origin), to_vector(translation));
        let mut best: Option<RayHit> = None;
        for (_, collider) in w.colliders.iter() {
            if collider.is_sensor() {
                continue;
            }
            let Some(tag) = ColliderTag::unpack(collider.user_data) else {
                continue;
            };
            let shape = collider.shape();
            let Some(fraction) = shape.cast_ray(collider.position(), &ray, 1.0, true) else {
                continue;
            };
            if best.is_some_and(|b| b.fraction <= fraction) {
                continue;
            }
            let normal = shape
                .cast_ray_and_get_normal(collider.position(), &ray, 1.0, true)
                .map_or(Vec2::ZERO, |hit| from_vector(&hit.normal));
            best = Some(RayHit {
                shape: tag.shape,
                point: origin + translation * fraction,
                normal,
                fraction,
            });
        }
        best
    }

    fn query_aabb(&self, world: WorldHandle, lower: Vec2, upper: Vec2) -> Vec<ShapeIndex> {
        let Some(w) = world_ref(&self.worlds, world) else {
            return Vec::new();
        };
        let mut hits: Vec<ShapeIndex> = w
            .colliders
            .iter()
            .filter(|(_, c)| aabb_overlaps(&c.compute_aabb(), lower, upper))
            .filter_map(|(_, c)| ColliderTag::unpack(c.user_data).map(|tag| tag.shape))
            .collect();
        hits.sort_unstable();
        hits
    }

    // -- body -----------------------------------------------------------------

    fn create_body(&mut self, def: &BodyDef) -> Option<BodyIndex> {
        let w = world_mut(&mut self.worlds, def.world)?;
        let index = self.bodies.claim(|index| {
            let rb = RigidBodyBuilder::new(to_body_type(def.body_type))
                .translation(to_vector(def.position))
                .rotation(def.angle)
                .user_data(body_tag(index))
                .build();
            BodyRecord {
                world: def.world,
                handle: w.bodies.insert(rb),
                sleep_allowed: true,
            }
        });
        if index.is_none() {
            warn!("body index capacity exhausted");
        }
        index.map(BodyIndex)
    }

    fn destroy_body(&mut self, body: BodyIndex) {
        let Some(record) = self.bodies.retire(body.0) else {
            return;
        };
        self.shapes.retire_where(|s| s.body == body);
        if let Some(w) = world_mut(&mut self.worlds, record.world) {
            w.bodies.remove(
                record.handle,
                &mut w.islands,
                &mut w.colliders,
                &mut w.impulse_joints,
                &mut w.multibody_joints,
                true,
            );
        }
    }

    fn free_body_index(&mut self, body: BodyIndex) {
        self.bodies.free(body.0);
    }

    fn body_transform(&self, body: BodyIndex) -> Transform {
        self.rigid(body).map(|rb| transform(rb.position())).unwrap_or_default()
    }

    fn set_body_transform(&mut self, body: BodyIndex, transform: Transform) {
        if let Some(rb) = self.rigid_mut(body) {
            rb.set_position(isometry(transform.position, transform.angle), true);
        }
    }

    fn linear_velocity(&self, body: BodyIndex) -> Vec2 {
        self.rigid(body).map(|rb| from_vector(rb.linvel())).unwrap_or_default()
    }

    fn set_linear_velocity(&mut self, body: BodyIndex, velocity: Vec2) {
        if let Some(rb) = self.rigid_mut(body) {
            rb.set_linvel(to_vector(velocity), true);
        }
    }

    fn body_scalar(&self, body: BodyIndex, scalar: BodyScalar) -> f32 {
        let Some(rb) = self.rigid(body) else {
            return 0.0;
        };
        match scalar {
            BodyScalar::AngularVelocity => rb.angvel(),
            BodyScalar::GravityScale => rb.gravity_scale(),
            BodyScalar::LinearDamping => rb.linear_damping(),
            BodyScalar::AngularDamping => rb.angular_damping(),
        }
    }

    fn set_body_scalar(&mut self, body: BodyIndex, scalar: BodyScalar, value: f32) {
        let Some(rb) = self.rigid_mut(body) else {
            return;
        };
        match scalar {
            BodyScalar::AngularVelocity => rb.set_angvel(value, true),
            BodyScalar::GravityScale => rb.set_gravity_scale(value, true),
            BodyScalar::LinearDamping => rb.set_linear_damping(value),
            BodyScalar::AngularDamping => rb.set_angular_damping(value),
        }
    }

    fn body_flag(&self, body: BodyIndex, flag: BodyFlag) -> bool {
        if flag == BodyFlag::SleepingAllowed {
            return self.bodies.get(body.0).is_some_and(|b| b.sleep_allowed);
        }
        let Some(rb) = self.rigid(body) else {
            return false;
        };
        match flag {
            BodyFlag::Bullet => rb.is_ccd_enabled(),
            BodyFlag::Awake => !rb.is_sleeping(),
            BodyFlag::Enabled => rb.is_enabled(),
            BodyFlag::FixedRotation => rb.locked_axes().contains(LockedAxes::ROTATION_LOCKED),
            BodyFlag::SleepingAllowed => false,
        }
    }

    fn set_body_flag(&mut self, body: BodyIndex, flag: BodyFlag, value: bool) {
        if flag == BodyFlag::SleepingAllowed
            && let Some(record) = self.bodies.get_mut(body.0)
        {
            record.sleep_allowed = value;
        }
        let Some(rb) = self.rigid_mut(body) else {
            return;
        };
        match flag {
            BodyFlag::Bullet => rb.enable_ccd(value),
            BodyFlag::Awake if value => rb.wake_up(true),
            BodyFlag::Awake => rb.sleep(),
            BodyFlag::Enabled => rb.set_enabled(value),
            BodyFlag::FixedRotation => rb.lock_rotations(value, true),
            BodyFlag::SleepingAllowed if !value => rb.wake_up(true),
            BodyFlag::SleepingAllowed => {}
        }
    }

    fn body_type(&self, body: BodyIndex) -> BodyType {
        self.rigid(body).map(|rb| from_body_type(rb.body_type())).unwrap_or_default()
    }

    fn set_body_type(&mut self, body: BodyIndex, body_type: BodyType) {
        if let Some(rb) = self.rigid_mut(body) {
            rb.set_body_type(to_body_type(body_type), true);
        }
    }

    fn apply_force(&mut self, body: BodyIndex, force: Vec2, point: Option<Vec2>, wake: bool) {
        let Some(rb) = self.rigid_mut(body) else {
            return;
        };
        match point {
            Some(point) => rb.add_force_at_point(to_vector(force), to_point(point), wake),
            None => rb.add_force(to_vector(force), wake),
        }
    }

    fn apply_linear_impulse(
        &mut self,
        body: BodyIndex,
        impulse: Vec2,
        point: Option<Vec2>,
        wake: bool,
    ) {
        let Some(rb) = self.rigid_mut(body) else {
            return;
        };
        match point {
            Some(point) => rb.apply_impulse_at_point(to_vector(impulse), to_point(point), wake),
            None => rb.apply_impulse(to_vector(impulse), wake),
        }
    }

    fn apply_torque(&mut self, body: BodyIndex, torque: f32, wake: bool) {
        if let Some(rb) = self.rigid_mut(body) {
            rb.add_torque(torque, wake);
        }
    }

    fn apply_angular_impulse(&mut self, body: BodyIndex, impulse: f32, wake: bool) {
        if let Some(rb) = self.rigid_mut(body) {
            rb.apply_torque_impulse(impulse, wake);
        }
    }

    fn body_mass_data(&self, body: BodyIndex) -> SolverMassData {
        let Some(rb) = self.rigid(body) else {
            return SolverMassData::default();
        };
        let props = &rb.mass_properties().local_mprops;
        SolverMassData {
            mass: rb.mass(),
            center: from_point(&props.local_com),
            inertia: props.principal_inertia(),
        }
    }

    fn world_point(&self, body: BodyIndex, local: Vec2) -> Vec2 {
        self.rigid(body)
            .map(|rb| from_point(&(rb.position() * to_point(local))))
            .unwrap_or_default()
    }

    fn local_point(&self, body: BodyIndex, world: Vec2) -> Vec2 {
        self.rigid(body)
            .map(|rb| from_point(&rb.position().inverse_transform_point(&to_point(world))))
            .unwrap_or_default()
    }

    // -- shape ----------------------------------------------------------------

    fn create_shape(&mut self, body: BodyIndex, def: &ShapeDef) -> Option<ShapeIndex> {
        let builder = match &def.geometry {
            ShapeGeometry::Circle { center, radius } => {
                ColliderBuilder::ball(*radius).translation(to_vector(*center))
            }
            ShapeGeometry::Box {
                half_extents,
                center,
                angle,
            } => ColliderBuilder::cuboid(half_extents.x, half_extents.y)
                .position(isometry(*center, *angle)),
            ShapeGeometry::Polygon { vertices } => {
                let points: Vec<Point<Real>> = vertices.iter().copied().map(to_point).collect();
                let Some(builder) = ColliderBuilder::convex_hull(&points) else {
                    warn!(vertices = points.len(), "degenerate polygon rejected");
                    return None;
                };
                builder
            }
            ShapeGeometry::Segment { a, b } => ColliderBuilder::segment(to_point(*a), to_point(*b)),
        };
        let builder = builder.density(def.density.max(0.0)).sensor(def.sensor);
        let tag = ColliderTag {
            shape: ShapeIndex(0),
            filter: def.filter,
            hit_events: def.hit_events,
            chain: false,
        };
        self.attach(body, builder, tag, def.pre_solve_events, (def.friction, def.restitution))
    }

    fn create_chain(&mut self, body: BodyIndex, def: &ChainDef) -> Option<ShapeIndex> {
        let points: Vec<Point<Real>> = def.points.iter().copied().map(to_point).collect();
        let count = u32::try_from(points.len()).ok()?;
        let indices = def
            .looped
            .then(|| (0..count).map(|i| [i, (i + 1) % count]).collect::<Vec<_>>());
        let builder = ColliderBuilder::polyline(points, indices).density(0.0);
        let tag = ColliderTag {
            shape: ShapeIndex(0),
            filter: def.filter,
            hit_events: def.hit_events,
            chain: true,
        };
        self.attach(body, builder, tag, def.pre_solve_events, (def.friction, def.restitution))
    }

    fn destroy_shape(&mut self, shape: ShapeIndex) {
        self.remove_shape(shape);
    }

    fn destroy_chain(&mut self, shape: ShapeIndex) {
        self.remove_shape(shape);
    }

    fn free_shape_index(&mut self, shape: ShapeIndex) {
        self.shapes.free(shape.0);
    }

    fn shape_scalar(&self, shape: ShapeIndex, scalar: ShapeScalar) -> f32 {
        let Some(collider) = self.collider(shape) else {
            return 0.0;
        };
        match scalar {
            ShapeScalar::Friction => collider.friction(),
            ShapeScalar::Restitution => collider.restitution(),
            ShapeScalar::Density => collider.density(),
        }
    }

    fn set_shape_scalar(&mut self, shape: ShapeIndex, scalar: ShapeScalar, value: f32) {
        let Some(record) = self.shapes.get(shape.0).copied() else {
            return;
        };
        if record.tag.chain {
            return;
        }
        let Some(w) = world_mut(&mut self.worlds, record.world) else {
            return;
        };
        let Some(collider) = w.colliders.get_mut(record.collider) else {
            return;
        };
        match scalar {
            ShapeScalar::Friction => collider.set_friction(value),
            ShapeScalar::Restitution => collider.set_restitution(value),
            ShapeScalar::Density => {
                collider.set_density(value.max(0.0));
                if let Some(parent) = collider.parent()
                    && let Some(rb) = w.bodies.get_mut(parent)
                {
                    rb.recompute_mass_properties_from_colliders(&w.colliders);
                }
            }
        }
    }

    fn shape_flag(&self, shape: ShapeIndex, flag: ShapeFlag) -> bool {
        let Some(record) = self.shapes.get(shape.0) else {
            return false;
        };
        match flag {
            ShapeFlag::Sensor => self.collider(shape).is_some_and(|c| c.is_sensor()),
            ShapeFlag::HitEvents => record.tag.hit_events,
            ShapeFlag::PreSolveEvents => record.pre_solve,
        }
    }

    fn set_shape_flag(&mut self, shape: ShapeIndex, flag: ShapeFlag, value: bool) {
        self.update_shape(shape, |record, collider| match flag {
            ShapeFlag::Sensor if !record.tag.chain => collider.set_sensor(value),
            ShapeFlag::Sensor => {}
            ShapeFlag::HitEvents => {
                record.tag.hit_events = value;
                collider.user_data = record.tag.pack();
            }
            ShapeFlag::PreSolveEvents => {
                record.pre_solve = value;
                collider.set_active_hooks(active_hooks(record.tag.filter, value));
            }
        });
    }

    fn shape_filter(&self, shape: ShapeIndex) -> Filter {
        self.shapes.get(shape.0).map(|r| r.tag.filter).unwrap_or_default()
    }

    fn set_shape_filter(&mut self, shape: ShapeIndex, filter: Filter) {
        self.update_shape(shape, |record, collider| {
            record.tag.filter = filter;
            collider.user_data = record.tag.pack();
            collider.set_collision_groups(interaction_groups(filter));
            collider.set_active_hooks(active_hooks(filter, record.pre_solve));
        });
    }

    fn shape_aabb(&self, shape: ShapeIndex) -> (Vec2, Vec2) {
        self.collider(shape)
            .map(|c| {
                let aabb = c.compute_aabb();
                (from_point(&aabb.mins), from_point(&aabb.maxs))
            })
            .unwrap_or_default()
    }

    // -- joint ----------------------------------------------------------------

    fn create_joint(&mut self, def: &JointDef) -> Option<JointId> {
        let a = *self.bodies.get(def.body_a.0)?;
        let b = *self.bodies.get(def.body_b.0)?;
        if a.world != def.world || b.world != def.world {
            warn!("joint bodies are not in the joint's world");
            return None;
        }
        let world_tag = u16::try_from(def.world.slot()).ok()?;
        let w = world_mut(&mut self.worlds, def.world)?;

        let slot = match self.free_joints.pop() {
            Some(slot) => slot,
            None => {
                let slot = u32::try_from(self.joints.len()).ok()?;
                self.joints.push(JointSlot {
                    generation: 0,
                    record: None,
                });
                slot
            }
        };
        let entry = &mut self.joints[slot as usize];
        let Some(id) = JointId::pack(slot, world_tag, entry.generation) else {
            self.free_joints.push(slot);
            return None;
        };

        let rigid_a = match def.kind {
            JointKindDef::Mouse { .. } => w.ground(),
            _ => a.handle,
        };
        let mass_b = w.bodies.get(b.handle).map_or(0.0, |rb| rb.mass());
        let mut record = JointRecord::new(def, rigid_a, b.handle, mass_b);
        record.handle = w.impulse_joints.insert(rigid_a, b.handle, record.generic(), true);
        debug!(slot, kind = ?record.kind, "rapier joint created");
        entry.record = Some(record);
        Some(id)
    }

    fn destroy_joint(&mut self, joint: JointId) {
        let Some(slot) = self.joints.get_mut(joint.slot() as usize) else {
            return;
        };
        if slot.generation != joint.generation() {
            return;
        }
        let Some(record) = slot.record.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free_joints.push(joint.slot());
        if let Some(w) = world_mut(&mut self.worlds, record.world) {
            w.impulse_joints.remove(record.handle, true);
        }
    }

    fn joint_local_anchors(&self, joint: JointId) -> (Vec2, Vec2) {
        joint_ref(&self.joints, joint)
            .map(|r| (r.local_anchor_a, r.local_anchor_b))
            .unwrap_or_default()
    }

    fn joint_world_anchors(&self, joint: JointId) -> (Vec2, Vec2) {
        let Some((record, w)) = self.joint_world(joint) else {
            return Default::default();
        };
        let a = match record.kind {
            JointKind::Mouse => record.target,
            _ => w.world_point(record.rigid_a, record.local_anchor_a),
        };
        (a, w.world_point(record.rigid_b, record.local_anchor_b))
    }

    fn joint_collide_connected(&self, joint: JointId) -> bool {
        joint_ref(&self.joints, joint).is_some_and(|r| r.collide_connected)
    }

    fn set_joint_collide_connected(&mut self, joint: JointId, value: bool) {
        self.update_joint(joint, |record| {
            record.collide_connected = value;
            true
        });
    }

    fn joint_constraint_impulse(&self, joint: JointId) -> (Vec2, f32) {
        let Some((record, w)) = self.joint_world(joint) else {
            return Default::default();
        };
        let Some(rapier_joint) = w.impulse_joints.get(record.handle) else {
            return Default::default();
        };
        let impulses = rapier_joint.impulses;
        let linear = match record.kind {
            // Coupled axes push along the line between the anchors.
            JointKind::Distance => {
                let (a, b) = self.joint_world_anchors(joint);
                (b - a).normalize_or_zero() * impulses.x
            }
            _ => {
                let angle = w.angle(record.rigid_a) + record.frame_angle();
                Vec2::from_angle(angle).rotate(Vec2::new(impulses.x, impulses.y))
            }
        };
        (linear, impulses.z)
    }

    fn joint_scalar(&self, joint: JointId, scalar: JointScalar) -> f32 {
        let Some((record, w)) = self.joint_world(joint) else {
            return 0.0;
        };
        match (record.kind, scalar) {
            (JointKind::Revolute, JointScalar::Angle) => {
                w.angle(record.rigid_b) - w.angle(record.rigid_a) - record.reference_angle
            }
            (JointKind::Prismatic | JointKind::Wheel, JointScalar::Translation) => {
                let (a, b) = self.joint_world_anchors(joint);
                let axis = Vec2::from_angle(w.angle(record.rigid_a)).rotate(record.local_axis);
                (b - a).dot(axis)
            }
            (JointKind::Revolute | JointKind::Wheel, JointScalar::MotorTorque) => {
                if w.last_dt <= 0.0 {
                    return 0.0;
                }
                w.impulse_joints
                    .get(record.handle)
                    .map_or(0.0, |j| j.impulses.z / w.last_dt)
            }
            _ => record.scalar(scalar).unwrap_or(0.0),
        }
    }

    fn set_joint_scalar(&mut self, joint: JointId, scalar: JointScalar, value: f32) {
        self.update_joint(joint, |record| record.set_scalar(scalar, value));
    }

    fn joint_flag(&self, joint: JointId, flag: JointFlag) -> bool {
        joint_ref(&self.joints, joint).is_some_and(|r| r.flag(flag))
    }

    fn set_joint_flag(&mut self, joint: JointId, flag: JointFlag, value: bool) {
        self.update_joint(joint, |record| record.set_flag(flag, value));
    }

    fn joint_vector(&self, joint: JointId, vector: JointVector) -> Vec2 {
        joint_ref(&self.joints, joint).map_or(Vec2::ZERO, |r| r.vector(vector))
    }

    fn set_joint_vector(&mut self, joint: JointId, vector: JointVector, value: Vec2) {
        self.update_joint(joint, |record| record.set_vector(vector, value));
    }
}

#[cfg(test)]
#[path = "rapier_tests.rs"]
mod tests;
