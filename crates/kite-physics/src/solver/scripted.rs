//! Deterministic solver for protocol tests.
//!
//! Steps replay queued [`ScriptedFrame`]s instead of simulating, and every
//! call that matters to the adapter protocol is recorded in
//! [`ScriptedState`] for later assertions.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use glam::Vec2;
use rustc_hash::FxHashMap;

use super::*;

/// Events one scripted step will emit.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedFrame {
    pub moves: Vec<MoveEvent>,
    pub begins: Vec<ShapePair>,
    pub ends: Vec<ShapePair>,
    pub hits: Vec<HitEvent>,
    pub pre_solves: Vec<PreSolveEvent>,
}

#[derive(Debug, Clone)]
pub(crate) struct ScriptedWorld {
    pub def: WorldDef,
}

#[derive(Debug, Clone)]
pub(crate) struct ScriptedBody {
    pub world: WorldHandle,
    pub body_type: BodyType,
    pub transform: Transform,
    pub velocity: Vec2,
    pub flags: FxHashMap<BodyFlag, bool>,
    pub scalars: FxHashMap<BodyScalar, f32>,
    pub live: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct ScriptedShape {
    pub body: BodyIndex,
    pub chain: bool,
    pub scalars: FxHashMap<ShapeScalar, f32>,
    pub flags: FxHashMap<ShapeFlag, bool>,
    pub filter: Filter,
    pub live: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct ScriptedJoint {
    pub def: JointDef,
    pub collide_connected: bool,
    pub scalars: FxHashMap<JointScalar, f32>,
    pub flags: FxHashMap<JointFlag, bool>,
    pub vectors: FxHashMap<JointVector, Vec2>,
    pub impulse: (Vec2, f32),
}

/// Everything the scripted solver knows and every call it has seen.
#[derive(Debug, Default)]
pub(crate) struct ScriptedState {
    pub worlds: Vec<Option<ScriptedWorld>>,
    pub bodies: Vec<Option<ScriptedBody>>,
    pub shapes: Vec<Option<ScriptedShape>>,
    pub joints: FxHashMap<JointId, ScriptedJoint>,
    free_bodies: Vec<u32>,
    free_shapes: Vec<u32>,
    next_joint: u32,
    pub body_capacity: Option<usize>,

    pub frames: VecDeque<ScriptedFrame>,
    pub ray_hit: Option<RayHit>,
    pub query_hits: Vec<ShapeIndex>,
    pub mass_data: SolverMassData,

    pub steps: Vec<(f32, u32)>,
    pub accept_lists: Vec<Vec<ShapePair>>,
    pub wakes: Vec<BodyIndex>,
    pub forces: Vec<(BodyIndex, Vec2, Option<Vec2>)>,
    pub impulses: Vec<(BodyIndex, Vec2, Option<Vec2>)>,
    pub torques: Vec<(BodyIndex, f32)>,
    pub destroyed_worlds: Vec<WorldHandle>,
    pub destroyed_bodies: Vec<BodyIndex>,
    pub destroyed_shapes: Vec<ShapeIndex>,
    pub destroyed_chains: Vec<ShapeIndex>,
    /// Material writes that reached a chain shape; rapier chains have no material.
    pub chain_material_writes: usize,
    pub destroyed_joints: Vec<JointId>,
    pub freed_bodies: Vec<BodyIndex>,
    pub freed_shapes: Vec<ShapeIndex>,
    pub shape_defs: Vec<(ShapeIndex, ShapeDef)>,
    pub chain_defs: Vec<(ShapeIndex, ChainDef)>,
}

impl ScriptedState {
    pub fn push_frame(&mut self, frame: ScriptedFrame) {
        self.frames.push_back(frame);
    }

    pub fn body(&self, index: BodyIndex) -> Option<&ScriptedBody> {
        self.bodies
            .get(index.0 as usize)
            .and_then(Option::as_ref)
            .filter(|b| b.live)
    }

    pub fn shape(&self, index: ShapeIndex) -> Option<&ScriptedShape> {
        self.shapes
            .get(index.0 as usize)
            .and_then(Option::as_ref)
            .filter(|s| s.live)
    }

    fn body_mut(&mut self, index: BodyIndex) -> Option<&mut ScriptedBody> {
        self.bodies
            .get_mut(index.0 as usize)
            .and_then(Option::as_mut)
            .filter(|b| b.live)
    }

    fn shape_mut(&mut self, index: ShapeIndex) -> Option<&mut ScriptedShape> {
        self.shapes
            .get_mut(index.0 as usize)
            .and_then(Option::as_mut)
            .filter(|s| s.live)
    }

    fn alloc_shape(&mut self, shape: ScriptedShape) -> ShapeIndex {
        if let Some(i) = self.free_shapes.pop() {
            self.shapes[i as usize] = Some(shape);
            ShapeIndex(i)
        } else {
            self.shapes.push(Some(shape));
            ShapeIndex(self.shapes.len() as u32 - 1)
        }
    }

    fn kill_shapes_of(&mut self, body: BodyIndex) {
        for shape in self.shapes.iter_mut().flatten() {
            if shape.body == body {
                shape.live = false;
            }
        }
    }
}

/// Test solver sharing its state with the test body.
pub(crate) struct ScriptedSolver {
    pub state: Rc<RefCell<ScriptedState>>,
}

impl ScriptedSolver {
    pub fn new() -> (Self, Rc<RefCell<ScriptedState>>) {
        let state = Rc::new(RefCell::new(ScriptedState::default()));
        (
            Self {
                state: Rc::clone(&state),
            },
            state,
        )
    }
}

fn rotate(v: Vec2, angle: f32) -> Vec2 {
    Vec2::from_angle(angle).rotate(v)
}

impl Solver for ScriptedSolver {
    fn create_world(&mut self, def: &WorldDef) -> Option<WorldHandle> {
        let mut s = self.state.borrow_mut();
        s.worlds.push(Some(ScriptedWorld { def: def.clone() }));
        WorldHandle::from_slot(s.worlds.len() - 1)
    }

    fn destroy_world(&mut self, world: WorldHandle) {
        let mut s = self.state.borrow_mut();
        if let Some(slot) = s.worlds.get_mut(world.slot()) {
            *slot = None;
        }
        for body in s.bodies.iter_mut().flatten() {
            if body.world == world {
                body.live = false;
            }
        }
        s.destroyed_worlds.push(world);
    }

    fn gravity(&self, world: WorldHandle) -> Vec2 {
        let s = self.state.borrow();
        s.worlds
            .get(world.slot())
            .and_then(Option::as_ref)
            .map(|w| w.def.gravity)
            .unwrap_or_default()
    }

    fn set_gravity(&mut self, world: WorldHandle, gravity: Vec2) {
        let mut s = self.state.borrow_mut();
        if let Some(Some(w)) = s.worlds.get_mut(world.slot()) {
            w.def.gravity = gravity;
        }
    }

    fn body_count(&self, world: WorldHandle) -> usize {
        let s = self.state.borrow();
        s.bodies
            .iter()
            .flatten()
            .filter(|b| b.live && b.world == world)
            .count()
    }

    fn set_accept_list(&mut self, _world: WorldHandle, pairs: &[ShapePair]) {
        self.state.borrow_mut().accept_lists.push(pairs.to_vec());
    }

    fn step(&mut self, _world: WorldHandle, dt: f32, sub_steps: u32, events: &mut StepEvents) {
        let mut s = self.state.borrow_mut();
        s.steps.push((dt, sub_steps));
        let Some(frame) = s.frames.pop_front() else {
            return;
        };
        for mv in frame.moves {
            if let Some(body) = s.body_mut(mv.body) {
                body.transform = mv.transform;
            }
            events.moves.push(mv);
        }
        for pair in frame.begins {
            events.begins.push(pair);
        }
        for pair in frame.ends {
            events.ends.push(pair);
        }
        for hit in frame.hits {
            events.hits.push(hit);
        }
        for pre in frame.pre_solves {
            events.pre_solves.push(pre);
        }
    }

    fn ray_cast(&self, _world: WorldHandle, _origin: Vec2, _translation: Vec2) -> Option<RayHit> {
        self.state.borrow().ray_hit
    }

    fn query_aabb(&self, _world: WorldHandle, _lower: Vec2, _upper: Vec2) -> Vec<ShapeIndex> {
        self.state.borrow().query_hits.clone()
    }

    fn create_body(&mut self, def: &BodyDef) -> Option<BodyIndex> {
        let mut s = self.state.borrow_mut();
        let live = s.bodies.iter().flatten().filter(|b| b.live).count();
        if s.body_capacity.is_some_and(|cap| live >= cap) {
            return None;
        }
        let mut flags = FxHashMap::default();
        flags.insert(BodyFlag::Awake, true);
        flags.insert(BodyFlag::Enabled, true);
        flags.insert(BodyFlag::SleepingAllowed, true);
        let mut scalars = FxHashMap::default();
        scalars.insert(BodyScalar::GravityScale, 1.0);
        let body = ScriptedBody {
            world: def.world,
            body_type: def.body_type,
            transform: Transform {
                position: def.position,
                angle: def.angle,
            },
            velocity: Vec2::ZERO,
            flags,
            scalars,
            live: true,
        };
        if let Some(i) = s.free_bodies.pop() {
            s.bodies[i as usize] = Some(body);
            Some(BodyIndex(i))
        } else {
            s.bodies.push(Some(body));
            Some(BodyIndex(s.bodies.len() as u32 - 1))
        }
    }

    fn destroy_body(&mut self, body: BodyIndex) {
        let mut s = self.state.borrow_mut();
        if let Some(b) = s.body_mut(body) {
            b.live = false;
        }
        s.kill_shapes_of(body);
        s.destroyed_bodies.push(body);
    }

    fn free_body_index(&mut self, body: BodyIndex) {
        let mut s = self.state.borrow_mut();
        if let Some(slot) = s.bodies.get_mut(body.0 as usize)
            && slot.is_some()
        {
            *slot = None;
            s.free_bodies.push(body.0);
            s.freed_bodies.push(body);
        }
    }

    fn body_transform(&self, body: BodyIndex) -> Transform {
        self.state
            .borrow()
            .body(body)
            .map(|b| b.transform)
            .unwrap_or_default()
    }

    fn set_body_transform(&mut self, body: BodyIndex, transform: Transform) {
        if let Some(b) = self.state.borrow_mut().body_mut(body) {
            b.transform = transform;
        }
    }

    fn linear_velocity(&self, body: BodyIndex) -> Vec2 {
        self.state
            .borrow()
            .body(body)
            .map(|b| b.velocity)
            .unwrap_or_default()
    }

    fn set_linear_velocity(&mut self, body: BodyIndex, velocity: Vec2) {
        if let Some(b) = self.state.borrow_mut().body_mut(body) {
            b.velocity = velocity;
        }
    }

    fn body_scalar(&self, body: BodyIndex, scalar: BodyScalar) -> f32 {
        self.state
            .borrow()
            .body(body)
            .and_then(|b| b.scalars.get(&scalar).copied())
            .unwrap_or_default()
    }

    fn set_body_scalar(&mut self, body: BodyIndex, scalar: BodyScalar, value: f32) {
        if let Some(b) = self.state.borrow_mut().body_mut(body) {
            b.scalars.insert(scalar, value);
        }
    }

    fn body_flag(&self, body: BodyIndex, flag: BodyFlag) -> bool {
        self.state
            .borrow()
            .body(body)
            .and_then(|b| b.flags.get(&flag).copied())
            .unwrap_or_default()
    }

    fn set_body_flag(&mut self, body: BodyIndex, flag: BodyFlag, value: bool) {
        let mut s = self.state.borrow_mut();
        if flag == BodyFlag::Awake && value {
            s.wakes.push(body);
        }
        if let Some(b) = s.body_mut(body) {
            b.flags.insert(flag, value);
        }
    }

    fn body_type(&self, body: BodyIndex) -> BodyType {
        self.state
            .borrow()
            .body(body)
            .map(|b| b.body_type)
            .unwrap_or_default()
    }

    fn set_body_type(&mut self, body: BodyIndex, body_type: BodyType) {
        if let Some(b) = self.state.borrow_mut().body_mut(body) {
            b.body_type = body_type;
        }
    }

    fn apply_force(&mut self, body: BodyIndex, force: Vec2, point: Option<Vec2>, _wake: bool) {
        self.state.borrow_mut().forces.push((body, force, point));
    }

    fn apply_linear_impulse(
        &mut self,
        body: BodyIndex,
        impulse: Vec2,
        point: Option<Vec2>,
        _wake: bool,
    ) {
        self.state.borrow_mut().impulses.push((body, impulse, point));
    }

    fn apply_torque(&mut self, body: BodyIndex, torque: f32, _wake: bool) {
        self.state.borrow_mut().torques.push((body, torque));
    }

    fn apply_angular_impulse(&mut self, body: BodyIndex, impulse: f32, _wake: bool) {
        self.state.borrow_mut().torques.push((body, impulse));
    }

    fn body_mass_data(&self, body: BodyIndex) -> SolverMassData {
        let s = self.state.borrow();
        s.body(body).map(|_| s.mass_data).unwrap_or_default()
    }

    fn world_point(&self, body: BodyIndex, local: Vec2) -> Vec2 {
        let t = self.body_transform(body);
        t.position + rotate(local, t.angle)
    }

    fn local_point(&self, body: BodyIndex, world: Vec2) -> Vec2 {
        let t = self.body_transform(body);
        rotate(world - t.position, -t.angle)
    }

    fn create_shape(&mut self, body: BodyIndex, def: &ShapeDef) -> Option<ShapeIndex> {
        let mut s = self.state.borrow_mut();
        s.body(body)?;
        let mut scalars = FxHashMap::default();
        scalars.insert(ShapeScalar::Friction, def.friction);
        scalars.insert(ShapeScalar::Restitution, def.restitution);
        scalars.insert(ShapeScalar::Density, def.density);
        let mut flags = FxHashMap::default();
        flags.insert(ShapeFlag::Sensor, def.sensor);
        flags.insert(ShapeFlag::HitEvents, def.hit_events);
        flags.insert(ShapeFlag::PreSolveEvents, def.pre_solve_events);
        let index = s.alloc_shape(ScriptedShape {
            body,
            chain: false,
            scalars,
            flags,
            filter: def.filter,
            live: true,
        });
        s.shape_defs.push((index, def.clone()));
        Some(index)
    }

    fn create_chain(&mut self, body: BodyIndex, def: &ChainDef) -> Option<ShapeIndex> {
        let mut s = self.state.borrow_mut();
        s.body(body)?;
        let mut scalars = FxHashMap::default();
        scalars.insert(ShapeScalar::Friction, def.friction);
        scalars.insert(ShapeScalar::Restitution, def.restitution);
        let mut flags = FxHashMap::default();
        flags.insert(ShapeFlag::HitEvents, def.hit_events);
        flags.insert(ShapeFlag::PreSolveEvents, def.pre_solve_events);
        let index = s.alloc_shape(ScriptedShape {
            body,
            chain: true,
            scalars,
            flags,
            filter: def.filter,
            live: true,
        });
        s.chain_defs.push((index, def.clone()));
        Some(index)
    }

    fn destroy_shape(&mut self, shape: ShapeIndex) {
        let mut s = self.state.borrow_mut();
        if let Some(sh) = s.shape_mut(shape) {
            sh.live = false;
        }
        s.destroyed_shapes.push(shape);
    }

    fn destroy_chain(&mut self, shape: ShapeIndex) {
        let mut s = self.state.borrow_mut();
        if let Some(sh) = s.shape_mut(shape) {
            sh.live = false;
        }
        s.destroyed_chains.push(shape);
    }

    fn free_shape_index(&mut self, shape: ShapeIndex) {
        let mut s = self.state.borrow_mut();
        if let Some(slot) = s.shapes.get_mut(shape.0 as usize)
            && slot.is_some()
        {
            *slot = None;
            s.free_shapes.push(shape.0);
            s.freed_shapes.push(shape);
        }
    }

    fn shape_scalar(&self, shape: ShapeIndex, scalar: ShapeScalar) -> f32 {
        self.state
            .borrow()
            .shape(shape)
            .and_then(|sh| sh.scalars.get(&scalar).copied())
            .unwrap_or_default()
    }

    fn set_shape_scalar(&mut self, shape: ShapeIndex, scalar: ShapeScalar, value: f32) {
        let mut s = self.state.borrow_mut();
        let Some(sh) = s.shape_mut(shape) else {
            return;
        };
        if sh.chain {
            s.chain_material_writes += 1;
            return;
        }
        sh.scalars.insert(scalar, value);
    }

    fn shape_flag(&self, shape: ShapeIndex, flag: ShapeFlag) -> bool {
        self.state
            .borrow()
            .shape(shape)
            .and_then(|sh| sh.flags.get(&flag).copied())
            .unwrap_or_default()
    }

    fn set_shape_flag(&mut self, shape: ShapeIndex, flag: ShapeFlag, value: bool) {
        if let Some(sh) = self.state.borrow_mut().shape_mut(shape) {
            sh.flags.insert(flag, value);
        }
    }

    fn shape_filter(&self, shape: ShapeIndex) -> Filter {
        self.state
            .borrow()
            .shape(shape)
            .map(|sh| sh.filter)
            .unwrap_or_default()
    }

    fn set_shape_filter(&mut self, shape: ShapeIndex, filter: Filter) {
        if let Some(sh) = self.state.borrow_mut().shape_mut(shape) {
            sh.filter = filter;
        }
    }

    fn shape_aabb(&self, shape: ShapeIndex) -> (Vec2, Vec2) {
        let s = self.state.borrow();
        match s.shape(shape).and_then(|sh| s.body(sh.body)) {
            Some(body) => {
                let p = body.transform.position;
                (p - Vec2::ONE, p + Vec2::ONE)
            }
            None => (Vec2::ZERO, Vec2::ZERO),
        }
    }

    fn create_joint(&mut self, def: &JointDef) -> Option<JointId> {
        let mut s = self.state.borrow_mut();
        s.body(def.body_b)?;
        let slot = s.next_joint;
        s.next_joint += 1;
        let id = JointId::pack(slot, def.world.slot() as u16, 0)?;
        let mut scalars = FxHashMap::default();
        let mut vectors = FxHashMap::default();
        match def.kind {
            JointKindDef::Distance { length, .. } => {
                scalars.insert(JointScalar::Length, length);
            }
            JointKindDef::Mouse { target, .. } => {
                vectors.insert(JointVector::Target, target);
            }
            JointKindDef::Motor {
                linear_offset,
                angular_offset,
                correction_factor,
                ..
            } => {
                vectors.insert(JointVector::LinearOffset, linear_offset);
                scalars.insert(JointScalar::AngularOffset, angular_offset);
                scalars.insert(JointScalar::CorrectionFactor, correction_factor);
            }
            _ => {}
        }
        s.joints.insert(
            id,
            ScriptedJoint {
                def: def.clone(),
                collide_connected: def.collide_connected,
                scalars,
                flags: FxHashMap::default(),
                vectors,
                impulse: (Vec2::ZERO, 0.0),
            },
        );
        Some(id)
    }

    fn destroy_joint(&mut self, joint: JointId) {
        let mut s = self.state.borrow_mut();
        s.joints.remove(&joint);
        s.destroyed_joints.push(joint);
    }

    fn joint_local_anchors(&self, joint: JointId) -> (Vec2, Vec2) {
        self.state
            .borrow()
            .joints
            .get(&joint)
            .map(|j| (j.def.local_anchor_a, j.def.local_anchor_b))
            .unwrap_or_default()
    }

    fn joint_world_anchors(&self, joint: JointId) -> (Vec2, Vec2) {
        let def = match self.state.borrow().joints.get(&joint) {
            Some(j) => j.def.clone(),
            None => return (Vec2::ZERO, Vec2::ZERO),
        };
        (
            self.world_point(def.body_a, def.local_anchor_a),
            self.world_point(def.body_b, def.local_anchor_b),
        )
    }

    fn joint_collide_connected(&self, joint: JointId) -> bool {
        self.state
            .borrow()
            .joints
            .get(&joint)
            .is_some_and(|j| j.collide_connected)
    }

    fn set_joint_collide_connected(&mut self, joint: JointId, value: bool) {
        if let Some(j) = self.state.borrow_mut().joints.get_mut(&joint) {
            j.collide_connected = value;
        }
    }

    fn joint_constraint_impulse(&self, joint: JointId) -> (Vec2, f32) {
        self.state
            .borrow()
            .joints
            .get(&joint)
            .map(|j| j.impulse)
            .unwrap_or_default()
    }

    fn joint_scalar(&self, joint: JointId, scalar: JointScalar) -> f32 {
        self.state
            .borrow()
            .joints
            .get(&joint)
            .and_then(|j| j.scalars.get(&scalar).copied())
            .unwrap_or_default()
    }

    fn set_joint_scalar(&mut self, joint: JointId, scalar: JointScalar, value: f32) {
        if let Some(j) = self.state.borrow_mut().joints.get_mut(&joint) {
            j.scalars.insert(scalar, value);
        }
    }

    fn joint_flag(&self, joint: JointId, flag: JointFlag) -> bool {
        self.state
            .borrow()
            .joints
            .get(&joint)
            .and_then(|j| j.flags.get(&flag).copied())
            .unwrap_or_default()
    }

    fn set_joint_flag(&mut self, joint: JointId, flag: JointFlag, value: bool) {
        if let Some(j) = self.state.borrow_mut().joints.get_mut(&joint) {
            j.flags.insert(flag, value);
        }
    }

    fn joint_vector(&self, joint: JointId, vector: JointVector) -> Vec2 {
        self.state
            .borrow()
            .joints
            .get(&joint)
            .and_then(|j| j.vectors.get(&vector).copied())
            .unwrap_or_default()
    }

    fn set_joint_vector(&mut self, joint: JointId, vector: JointVector, value: Vec2) {
        if let Some(j) = self.state.borrow_mut().joints.get_mut(&joint) {
            j.vectors.insert(vector, value);
        }
    }
}
