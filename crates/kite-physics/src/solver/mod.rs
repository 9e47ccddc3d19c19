//! The solver seam.
//!
//! Everything behind [`Solver`] runs in metric units and numeric handles.
//! The adapter never looks past this trait; the shipped implementation is
//! [`rapier::RapierSolver`] (cargo feature `rapier`).

use std::num::{NonZeroU32, NonZeroU64};

use glam::Vec2;

use crate::body::BodyType;

mod events;
#[cfg(feature = "rapier")]
pub mod rapier;
#[cfg(test)]
pub(crate) mod scripted;

pub use events::{EventBuffer, HitEvent, MoveEvent, PreSolveEvent, StepEvents};

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// A live solver world. Zero is never a valid world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldHandle(pub NonZeroU32);

impl WorldHandle {
    /// Handle for the world in slot `slot` (zero-based).
    pub fn from_slot(slot: usize) -> Option<Self> {
        u32::try_from(slot + 1).ok().and_then(NonZeroU32::new).map(Self)
    }

    pub fn slot(self) -> usize {
        self.0.get() as usize - 1
    }
}

/// Dense body index, reused after [`Solver::free_body_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyIndex(pub u32);

/// Dense shape index, reused after [`Solver::free_shape_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeIndex(pub u32);

/// Packed joint identifier: slot + 1 in the low 32 bits, the world slot in
/// the next 16 and a wrapping generation in the top 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JointId(NonZeroU64);

impl JointId {
    pub fn pack(slot: u32, world: u16, generation: u16) -> Option<Self> {
        let low = u64::from(slot.checked_add(1)?);
        let raw = low | (u64::from(world) << 32) | (u64::from(generation) << 48);
        NonZeroU64::new(raw).map(Self)
    }

    pub fn from_raw(raw: u64) -> Option<Self> {
        let id = NonZeroU64::new(raw).map(Self)?;
        // A zero low word would mean slot -1.
        ((raw as u32) != 0).then_some(id)
    }

    pub fn raw(self) -> u64 {
        self.0.get()
    }

    pub fn slot(self) -> u32 {
        (self.0.get() as u32).wrapping_sub(1)
    }

    pub fn world(self) -> u16 {
        (self.0.get() >> 32) as u16
    }

    pub fn generation(self) -> u16 {
        (self.0.get() >> 48) as u16
    }
}

/// Two shapes in the order the solver reported them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapePair {
    pub a: ShapeIndex,
    pub b: ShapeIndex,
}

impl ShapePair {
    pub fn new(a: ShapeIndex, b: ShapeIndex) -> Self {
        Self { a, b }
    }

    /// Order-independent key.
    pub fn key(self) -> (u32, u32) {
        if self.a.0 <= self.b.0 {
            (self.a.0, self.b.0)
        } else {
            (self.b.0, self.a.0)
        }
    }
}

// ---------------------------------------------------------------------------
// Definitions and plain data
// ---------------------------------------------------------------------------

/// Position (units) and angle (radians).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    pub position: Vec2,
    pub angle: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldDef {
    pub gravity: Vec2,
    pub allow_sleep: bool,
    /// Minimum approach speed for hit events, units/s.
    pub hit_speed_threshold: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BodyDef {
    pub world: WorldHandle,
    pub body_type: BodyType,
    pub position: Vec2,
    pub angle: f32,
}

/// Collision filter.
///
/// Two shapes collide when each one's category is in the other's mask.
/// A shared non-zero `group` overrides that: positive always collides,
/// negative never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    pub category: u16,
    pub mask: u16,
    pub group: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category: 0x0001,
            mask: 0xFFFF,
            group: 0,
        }
    }
}

impl Filter {
    pub fn should_collide(&self, other: &Filter) -> bool {
        if self.group == other.group && self.group != 0 {
            return self.group > 0;
        }
        (self.mask & other.category) != 0 && (self.category & other.mask) != 0
    }
}

/// Solid geometry in body-local units.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeGeometry {
    Circle { center: Vec2, radius: f32 },
    /// Rectangle given by half extents, offset and rotation.
    Box { half_extents: Vec2, center: Vec2, angle: f32 },
    /// Convex polygon, 3 to 8 vertices.
    Polygon { vertices: Vec<Vec2> },
    Segment { a: Vec2, b: Vec2 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeDef {
    pub geometry: ShapeGeometry,
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub sensor: bool,
    pub filter: Filter,
    pub hit_events: bool,
    pub pre_solve_events: bool,
}

/// Open or looped polyline. Chains collide but carry no mass.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainDef {
    pub points: Vec<Vec2>,
    pub looped: bool,
    pub friction: f32,
    pub restitution: f32,
    pub filter: Filter,
    pub hit_events: bool,
    pub pre_solve_events: bool,
}

/// Per-kind joint parameters fixed at creation.
#[derive(Debug, Clone, PartialEq)]
pub enum JointKindDef {
    Distance {
        length: f32,
        frequency: f32,
        damping_ratio: f32,
    },
    Revolute,
    Prismatic {
        /// Slide axis in body A's frame.
        local_axis: Vec2,
    },
    Weld {
        frequency: f32,
        damping_ratio: f32,
    },
    /// Body B is dragged towards `target`; body A is ignored.
    Mouse {
        target: Vec2,
        /// `None` picks 1000 × mass of body B.
        max_force: Option<f32>,
    },
    Wheel {
        local_axis: Vec2,
    },
    Motor {
        linear_offset: Vec2,
        angular_offset: f32,
        max_force: f32,
        max_torque: f32,
        correction_factor: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct JointDef {
    pub world: WorldHandle,
    pub body_a: BodyIndex,
    pub body_b: BodyIndex,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Angle of B relative to A at creation.
    pub reference_angle: f32,
    pub collide_connected: bool,
    pub kind: JointKindDef,
}

/// Mass, local center of mass and rotational inertia about that center.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SolverMassData {
    pub mass: f32,
    pub center: Vec2,
    pub inertia: f32,
}

/// Closest ray hit in units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub shape: ShapeIndex,
    pub point: Vec2,
    pub normal: Vec2,
    /// Fraction of the ray's translation at the hit.
    pub fraction: f32,
}

// ---------------------------------------------------------------------------
// Property selectors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyFlag {
    Bullet,
    Awake,
    Enabled,
    FixedRotation,
    SleepingAllowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyScalar {
    AngularVelocity,
    GravityScale,
    LinearDamping,
    AngularDamping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeFlag {
    Sensor,
    HitEvents,
    PreSolveEvents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeScalar {
    Friction,
    Restitution,
    Density,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointFlag {
    LimitEnabled,
    MotorEnabled,
    SpringEnabled,
}

/// Joint scalars. Which ones a kind supports is listed on each
/// game-facing joint type; unsupported reads return 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointScalar {
    Length,
    Frequency,
    DampingRatio,
    LowerLimit,
    UpperLimit,
    MotorSpeed,
    MaxMotorForce,
    MaxMotorTorque,
    /// Read-only: current motor torque estimate.
    MotorTorque,
    /// Read-only: revolute joint angle.
    Angle,
    /// Read-only: prismatic joint translation.
    Translation,
    AngularOffset,
    MaxForce,
    MaxTorque,
    CorrectionFactor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointVector {
    /// Mouse joint target, world.
    Target,
    /// Motor joint offset of B in A's frame.
    LinearOffset,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// An external rigid-body solver addressed by numeric handles.
///
/// All quantities are in the solver's native units. Any call naming a
/// handle that is no longer live is ignored and reads return
/// `Default::default()`.
pub trait Solver {
    // World

    fn create_world(&mut self, def: &WorldDef) -> Option<WorldHandle>;
    fn destroy_world(&mut self, world: WorldHandle);
    fn gravity(&self, world: WorldHandle) -> Vec2;
    fn set_gravity(&mut self, world: WorldHandle, gravity: Vec2);
    fn body_count(&self, world: WorldHandle) -> usize;

    /// Pairs that stay enabled on the next step.
    ///
    /// Every pair reported in the previous step's pre-solve batch and absent
    /// from `pairs` has its contact response disabled for the next step.
    /// Pairs not reported in that batch are unaffected.
    fn set_accept_list(&mut self, world: WorldHandle, pairs: &[ShapePair]);

    /// Advance `world` by `dt` seconds with `sub_steps` solver iterations and
    /// append the step's events to `events`.
    fn step(&mut self, world: WorldHandle, dt: f32, sub_steps: u32, events: &mut StepEvents);

    /// Closest shape hit by the segment `origin → origin + translation`.
    fn ray_cast(&self, world: WorldHandle, origin: Vec2, translation: Vec2) -> Option<RayHit>;

    /// Shapes whose bounding boxes overlap `[lower, upper]`.
    fn query_aabb(&self, world: WorldHandle, lower: Vec2, upper: Vec2) -> Vec<ShapeIndex>;

    // Body

    /// `None` when the body index capacity is exhausted.
    fn create_body(&mut self, def: &BodyDef) -> Option<BodyIndex>;
    /// Remove the body and every shape on it. The index stays reserved.
    fn destroy_body(&mut self, body: BodyIndex);
    fn free_body_index(&mut self, body: BodyIndex);

    fn body_transform(&self, body: BodyIndex) -> Transform;
    fn set_body_transform(&mut self, body: BodyIndex, transform: Transform);
    fn linear_velocity(&self, body: BodyIndex) -> Vec2;
    fn set_linear_velocity(&mut self, body: BodyIndex, velocity: Vec2);
    fn body_scalar(&self, body: BodyIndex, scalar: BodyScalar) -> f32;
    fn set_body_scalar(&mut self, body: BodyIndex, scalar: BodyScalar, value: f32);
    fn body_flag(&self, body: BodyIndex, flag: BodyFlag) -> bool;
    fn set_body_flag(&mut self, body: BodyIndex, flag: BodyFlag, value: bool);
    fn body_type(&self, body: BodyIndex) -> BodyType;
    fn set_body_type(&mut self, body: BodyIndex, body_type: BodyType);

    /// Force at `point` (world), or at the center of mass when `None`.
    fn apply_force(&mut self, body: BodyIndex, force: Vec2, point: Option<Vec2>, wake: bool);
    fn apply_linear_impulse(
        &mut self,
        body: BodyIndex,
        impulse: Vec2,
        point: Option<Vec2>,
        wake: bool,
    );
    fn apply_torque(&mut self, body: BodyIndex, torque: f32, wake: bool);
    fn apply_angular_impulse(&mut self, body: BodyIndex, impulse: f32, wake: bool);

    fn body_mass_data(&self, body: BodyIndex) -> SolverMassData;
    fn world_point(&self, body: BodyIndex, local: Vec2) -> Vec2;
    fn local_point(&self, body: BodyIndex, world: Vec2) -> Vec2;

    // Shape

    fn create_shape(&mut self, body: BodyIndex, def: &ShapeDef) -> Option<ShapeIndex>;
    fn create_chain(&mut self, body: BodyIndex, def: &ChainDef) -> Option<ShapeIndex>;
    /// Remove the shape. The index stays reserved.
    fn destroy_shape(&mut self, shape: ShapeIndex);
    fn destroy_chain(&mut self, shape: ShapeIndex);
    fn free_shape_index(&mut self, shape: ShapeIndex);

    fn shape_scalar(&self, shape: ShapeIndex, scalar: ShapeScalar) -> f32;
    fn set_shape_scalar(&mut self, shape: ShapeIndex, scalar: ShapeScalar, value: f32);
    fn shape_flag(&self, shape: ShapeIndex, flag: ShapeFlag) -> bool;
    fn set_shape_flag(&mut self, shape: ShapeIndex, flag: ShapeFlag, value: bool);
    fn shape_filter(&self, shape: ShapeIndex) -> Filter;
    fn set_shape_filter(&mut self, shape: ShapeIndex, filter: Filter);
    /// World-space bounding box as `(lower, upper)`.
    fn shape_aabb(&self, shape: ShapeIndex) -> (Vec2, Vec2);

    // Joint

    fn create_joint(&mut self, def: &JointDef) -> Option<JointId>;
    fn destroy_joint(&mut self, joint: JointId);
    /// Anchors frozen at creation, each in its own body's frame.
    fn joint_local_anchors(&self, joint: JointId) -> (Vec2, Vec2);
    /// Current world-space anchors.
    fn joint_world_anchors(&self, joint: JointId) -> (Vec2, Vec2);
    fn joint_collide_connected(&self, joint: JointId) -> bool;
    fn set_joint_collide_connected(&mut self, joint: JointId, value: bool);
    /// Last step's constraint impulse: linear (world) and angular.
    fn joint_constraint_impulse(&self, joint: JointId) -> (Vec2, f32);
    fn joint_scalar(&self, joint: JointId, scalar: JointScalar) -> f32;
    fn set_joint_scalar(&mut self, joint: JointId, scalar: JointScalar, value: f32);
    fn joint_flag(&self, joint: JointId, flag: JointFlag) -> bool;
    fn set_joint_flag(&mut self, joint: JointId, flag: JointFlag, value: bool);
    fn joint_vector(&self, joint: JointId, vector: JointVector) -> Vec2;
    fn set_joint_vector(&mut self, joint: JointId, vector: JointVector, value: Vec2);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_id_packing() {
        let id = JointId::pack(41, 3, 0xBEEF).unwrap();
        assert_eq!(id.slot(), 41);
        assert_eq!(id.world(), 3);
        assert_eq!(id.generation(), 0xBEEF);
        assert_eq!(JointId::from_raw(id.raw()), Some(id));
    }

    #[test]
    fn test_joint_id_rejects_zero_low_word() {
        assert_eq!(JointId::from_raw(0), None);
        assert_eq!(JointId::from_raw(1 << 32), None);
    }

    #[test]
    fn test_world_handle_slot() {
        let handle = WorldHandle::from_slot(0).unwrap();
        assert_eq!(handle.0.get(), 1);
        assert_eq!(handle.slot(), 0);
    }

    #[test]
    fn test_pair_key_is_order_independent() {
        let ab = ShapePair::new(ShapeIndex(7), ShapeIndex(2));
        let ba = ShapePair::new(ShapeIndex(2), ShapeIndex(7));
        assert_eq!(ab.key(), ba.key());
        assert_ne!(ab, ba);
    }

    #[test]
    fn test_filter_rules() {
        let a = Filter {
            category: 0b01,
            mask: 0b10,
            group: 0,
        };
        let b = Filter {
            category: 0b10,
            mask: 0b01,
            group: 0,
        };
        assert!(a.should_collide(&b));
        assert!(!a.should_collide(&a));

        let never = Filter { group: -2, ..Filter::default() };
        assert!(!never.should_collide(&never));

        let always = Filter {
            category: 0b01,
            mask: 0,
            group: 4,
        };
        assert!(always.should_collide(&always), "positive group overrides the mask");
    }
}
