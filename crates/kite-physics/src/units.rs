//! Pixel ⇄ physics-unit conversion.
//!
//! One physics unit (a "meter") is `scale` pixels. Lengths, positions and
//! velocities divide by the scale on the way in; forces and impulses also
//! divide once; torques and angular impulses divide by the scale squared.
//! Angles, masses, densities and other dimensionless values pass through.

use std::cell::Cell;
use std::rc::Rc;

use glam::Vec2;

use crate::error::PhysicsError;

/// Default pixels per physics unit.
pub const DEFAULT_METER_SCALE: f32 = 30.0;

/// Shared, mutable pixels-per-unit factor.
///
/// Clones share the same value: the physics context and every world it
/// creates see a change immediately. Changing the scale never rescales
/// state already stored in the solver, only later conversions.
#[derive(Debug, Clone)]
pub struct MeterScale(Rc<Cell<f32>>);

impl MeterScale {
    /// Create a scale, rejecting non-positive or non-finite values.
    pub fn new(scale: f32) -> Result<Self, PhysicsError> {
        validate(scale)?;
        Ok(Self(Rc::new(Cell::new(scale))))
    }

    /// Current pixels per unit.
    pub fn get(&self) -> f32 {
        self.0.get()
    }

    /// Replace the scale for subsequent conversions.
    pub fn set(&self, scale: f32) -> Result<(), PhysicsError> {
        validate(scale)?;
        self.0.set(scale);
        Ok(())
    }

    /// Pixels → units.
    #[inline]
    pub fn to_units(&self, px: f32) -> f32 {
        px / self.get()
    }

    /// Units → pixels.
    #[inline]
    pub fn to_pixels(&self, units: f32) -> f32 {
        units * self.get()
    }

    #[inline]
    pub fn vec_to_units(&self, px: Vec2) -> Vec2 {
        px / self.get()
    }

    #[inline]
    pub fn vec_to_pixels(&self, units: Vec2) -> Vec2 {
        units * self.get()
    }

    /// Pixel-space force (or linear impulse) → solver force.
    #[inline]
    pub fn force_to_units(&self, force: Vec2) -> Vec2 {
        force / self.get()
    }

    #[inline]
    pub fn force_to_pixels(&self, force: Vec2) -> Vec2 {
        force * self.get()
    }

    /// Scalar force, e.g. a motor's maximum force.
    #[inline]
    pub fn force_scalar_to_units(&self, force: f32) -> f32 {
        force / self.get()
    }

    #[inline]
    pub fn force_scalar_to_pixels(&self, force: f32) -> f32 {
        force * self.get()
    }

    /// Pixel-space torque (or angular impulse) → solver torque.
    #[inline]
    pub fn torque_to_units(&self, torque: f32) -> f32 {
        let s = self.get();
        torque / (s * s)
    }

    #[inline]
    pub fn torque_to_pixels(&self, torque: f32) -> f32 {
        let s = self.get();
        torque * s * s
    }

    /// Rotational inertia carries length squared.
    #[inline]
    pub fn inertia_to_pixels(&self, inertia: f32) -> f32 {
        let s = self.get();
        inertia * s * s
    }
}

impl Default for MeterScale {
    fn default() -> Self {
        Self(Rc::new(Cell::new(DEFAULT_METER_SCALE)))
    }
}

fn validate(scale: f32) -> Result<(), PhysicsError> {
    if scale > 0.0 && scale.is_finite() {
        Ok(())
    } else {
        Err(PhysicsError::InvalidScale(scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn test_default_scale_is_thirty() {
        assert_eq!(MeterScale::default().get(), 30.0);
    }

    #[test]
    fn test_round_trip_across_scales() {
        for scale in [0.5, 1.0, 30.0, 64.0, 1000.0] {
            let s = MeterScale::new(scale).unwrap();
            for p in [-12345.5_f32, -1.0, 0.0, 0.25, 77.7, 4096.0] {
                let back = s.to_pixels(s.to_units(p));
                assert!(
                    (back - p).abs() <= EPSILON * p.abs().max(1.0),
                    "scale {scale}: {p} came back as {back}"
                );
            }
        }
    }

    #[test]
    fn test_force_scales_once_torque_twice() {
        let s = MeterScale::new(10.0).unwrap();
        assert_eq!(s.force_to_units(Vec2::new(100.0, -50.0)), Vec2::new(10.0, -5.0));
        assert_eq!(s.torque_to_units(1000.0), 10.0);
        assert_eq!(s.torque_to_pixels(10.0), 1000.0);
        assert_eq!(s.inertia_to_pixels(2.0), 200.0);
    }

    #[test]
    fn test_non_positive_scale_rejected() {
        assert_eq!(MeterScale::new(0.0).unwrap_err(), PhysicsError::InvalidScale(0.0));
        assert!(MeterScale::new(-3.0).is_err());
        assert!(MeterScale::new(f32::NAN).is_err());

        let s = MeterScale::default();
        assert!(s.set(-1.0).is_err());
        assert_eq!(s.get(), 30.0, "a rejected set must leave the scale untouched");
    }

    #[test]
    fn test_clones_share_the_value() {
        let a = MeterScale::default();
        let b = a.clone();
        a.set(64.0).unwrap();
        assert_eq!(b.get(), 64.0);
        assert_eq!(b.to_units(128.0), 2.0);
    }
}
