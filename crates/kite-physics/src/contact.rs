use glam::Vec2;

use crate::fixture::Fixture;

/// One fixture pair at the moment of a contact event.
///
/// Begin and end contacts carry identity only. Hit contacts add the normal,
/// the world point (pixels) and the approach speed (pixels/s). Pre-solve
/// contacts carry the normal and a mutable enable flag.
#[derive(Debug, Clone)]
pub struct Contact {
    fixture_a: Fixture,
    fixture_b: Fixture,
    normal: Option<Vec2>,
    point: Option<Vec2>,
    approach_speed: f32,
    enabled: bool,
}

impl Contact {
    pub(crate) fn touching(fixture_a: Fixture, fixture_b: Fixture) -> Self {
        Self {
            fixture_a,
            fixture_b,
            normal: None,
            point: None,
            approach_speed: 0.0,
            enabled: true,
        }
    }

    pub(crate) fn hit(
        fixture_a: Fixture,
        fixture_b: Fixture,
        normal: Vec2,
        point: Vec2,
        approach_speed: f32,
    ) -> Self {
        Self {
            normal: Some(normal),
            point: Some(point),
            approach_speed,
            ..Self::touching(fixture_a, fixture_b)
        }
    }

    pub(crate) fn pre_solve(fixture_a: Fixture, fixture_b: Fixture, normal: Vec2) -> Self {
        Self {
            normal: Some(normal),
            ..Self::touching(fixture_a, fixture_b)
        }
    }

    pub fn fixtures(&self) -> (Fixture, Fixture) {
        (self.fixture_a.clone(), self.fixture_b.clone())
    }

    pub fn fixture_a(&self) -> &Fixture {
        &self.fixture_a
    }

    pub fn fixture_b(&self) -> &Fixture {
        &self.fixture_b
    }

    /// Unit normal from fixture A towards fixture B.
    pub fn normal(&self) -> Option<Vec2> {
        self.normal
    }

    /// World contact point in pixels (hit contacts only).
    pub fn position(&self) -> Option<Vec2> {
        self.point
    }

    /// Approach speed in pixels/s (hit contacts only, otherwise 0).
    pub fn approach_speed(&self) -> f32 {
        self.approach_speed
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Only meaningful inside a pre-solve callback, the one place a contact
    /// is handed out mutably.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether `fixture` is one of the pair.
    pub fn involves(&self, fixture: &Fixture) -> bool {
        self.fixture_a.ptr_eq(fixture) || self.fixture_b.ptr_eq(fixture)
    }
}
