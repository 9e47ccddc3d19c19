//! Pixel-space geometry descriptors.
//!
//! A [`Shape`] is plain data: nothing touches the solver until it is
//! attached to a body as a fixture, at which point it is converted to units
//! through the meter scale.

use std::fmt;
use std::str::FromStr;

use glam::Vec2;

use crate::error::PhysicsError;
use crate::solver::ShapeGeometry;
use crate::units::MeterScale;

/// Most vertices a polygon may have.
pub const MAX_POLYGON_VERTICES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeType {
    Circle,
    Polygon,
    Segment,
    Chain,
}

impl ShapeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ShapeType::Circle => "circle",
            ShapeType::Polygon => "polygon",
            ShapeType::Segment => "segment",
            ShapeType::Chain => "chain",
        }
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShapeType {
    type Err = PhysicsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "circle" => Ok(ShapeType::Circle),
            "polygon" | "rectangle" => Ok(ShapeType::Polygon),
            "segment" | "edge" => Ok(ShapeType::Segment),
            "chain" => Ok(ShapeType::Chain),
            other => Err(PhysicsError::UnknownShapeType(other.to_string())),
        }
    }
}

/// Immutable geometry in pixels.
///
/// Points are the circle center, the polygon or chain vertices, or the two
/// segment endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    kind: ShapeType,
    radius: f32,
    points: Vec<Vec2>,
    looped: bool,
}

impl Shape {
    pub fn circle(x: f32, y: f32, radius: f32) -> Result<Self, PhysicsError> {
        if !(radius > 0.0 && radius.is_finite()) {
            return Err(PhysicsError::InvalidShape(format!(
                "circle radius must be positive, got {radius}"
            )));
        }
        Ok(Self {
            kind: ShapeType::Circle,
            radius,
            points: vec![Vec2::new(x, y)],
            looped: false,
        })
    }

    /// Rectangle of `width` × `height` centered on `(x, y)`, rotated by
    /// `angle` radians.
    pub fn rectangle(
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        angle: f32,
    ) -> Result<Self, PhysicsError> {
        if !(width > 0.0 && height > 0.0) {
            return Err(PhysicsError::InvalidShape(format!(
                "rectangle needs positive extents, got {width}x{height}"
            )));
        }
        let half = Vec2::new(width, height) * 0.5;
        let center = Vec2::new(x, y);
        let corners = [
            Vec2::new(-half.x, -half.y),
            Vec2::new(half.x, -half.y),
            Vec2::new(half.x, half.y),
            Vec2::new(-half.x, half.y),
        ];
        let points = if angle == 0.0 {
            corners.iter().map(|c| center + *c).collect()
        } else {
            let rot = Vec2::from_angle(angle);
            corners.iter().map(|c| center + rot.rotate(*c)).collect()
        };
        Ok(Self {
            kind: ShapeType::Polygon,
            radius: 0.0,
            points,
            looped: true,
        })
    }

    /// Convex polygon from 3 to 8 vertices.
    pub fn polygon(vertices: &[Vec2]) -> Result<Self, PhysicsError> {
        if !(3..=MAX_POLYGON_VERTICES).contains(&vertices.len()) {
            return Err(PhysicsError::InvalidShape(format!(
                "polygon needs 3 to {MAX_POLYGON_VERTICES} vertices, got {}",
                vertices.len()
            )));
        }
        if !spans_area(vertices) {
            return Err(PhysicsError::InvalidShape(
                "polygon vertices are collinear or coincide".into(),
            ));
        }
        Ok(Self {
            kind: ShapeType::Polygon,
            radius: 0.0,
            points: vertices.to_vec(),
            looped: true,
        })
    }

    pub fn segment(a: Vec2, b: Vec2) -> Result<Self, PhysicsError> {
        if a == b {
            return Err(PhysicsError::InvalidShape("segment endpoints coincide".into()));
        }
        Ok(Self {
            kind: ShapeType::Segment,
            radius: 0.0,
            points: vec![a, b],
            looped: false,
        })
    }

    /// Polyline through `points`; `looped` closes it back to the start.
    pub fn chain(points: &[Vec2], looped: bool) -> Result<Self, PhysicsError> {
        let min = if looped { 3 } else { 2 };
        if points.len() < min {
            return Err(PhysicsError::InvalidShape(format!(
                "chain needs at least {min} points, got {}",
                points.len()
            )));
        }
        Ok(Self {
            kind: ShapeType::Chain,
            radius: 0.0,
            points: points.to_vec(),
            looped,
        })
    }

    /// Build a shape from a type name and a flat coordinate list.
    ///
    /// | kind                   | coords                                     |
    /// |------------------------|--------------------------------------------|
    /// | `circle`               | `r` or `x y r`                             |
    /// | `rectangle`            | `w h`, `x y w h` or `x y w h angle`        |
    /// | `polygon`              | `x1 y1 x2 y2 x3 y3 ...`                    |
    /// | `segment` / `edge`     | `x1 y1 x2 y2`                              |
    /// | `chain`                | `x1 y1 x2 y2 ...` (open)                   |
    pub fn parse(kind: &str, coords: &[f32]) -> Result<Self, PhysicsError> {
        let wrong_arity = || {
            PhysicsError::InvalidShape(format!("{} coordinates do not fit a {kind}", coords.len()))
        };
        match kind {
            "circle" => match *coords {
                [r] => Self::circle(0.0, 0.0, r),
                [x, y, r] => Self::circle(x, y, r),
                _ => Err(wrong_arity()),
            },
            "rectangle" => match *coords {
                [w, h] => Self::rectangle(0.0, 0.0, w, h, 0.0),
                [x, y, w, h] => Self::rectangle(x, y, w, h, 0.0),
                [x, y, w, h, angle] => Self::rectangle(x, y, w, h, angle),
                _ => Err(wrong_arity()),
            },
            "polygon" => Self::polygon(&pairs(coords).ok_or_else(wrong_arity)?),
            "segment" | "edge" => match *coords {
                [x1, y1, x2, y2] => Self::segment(Vec2::new(x1, y1), Vec2::new(x2, y2)),
                _ => Err(wrong_arity()),
            },
            "chain" => Self::chain(&pairs(coords).ok_or_else(wrong_arity)?, false),
            other => Err(PhysicsError::UnknownShapeType(other.to_string())),
        }
    }

    pub fn shape_type(&self) -> ShapeType {
        self.kind
    }

    /// Circle radius in pixels, 0 for other kinds.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    pub fn is_looped(&self) -> bool {
        self.kind == ShapeType::Chain && self.looped
    }

    /// Axis-aligned rectangle as `(center, half_extents)`, if this polygon
    /// is one.
    pub fn as_axis_aligned_box(&self) -> Option<(Vec2, Vec2)> {
        if self.kind != ShapeType::Polygon {
            return None;
        }
        let &[p0, p1, p2, p3] = self.points.as_slice() else {
            return None;
        };
        // Edges alternate horizontal/vertical, starting with either.
        let horizontal_first = p0.y == p1.y && p1.x == p2.x && p2.y == p3.y && p3.x == p0.x;
        let vertical_first = p0.x == p1.x && p1.y == p2.y && p2.x == p3.x && p3.y == p0.y;
        if !(horizontal_first || vertical_first) {
            return None;
        }
        let half = ((p2 - p0) * 0.5).abs();
        if half.x == 0.0 || half.y == 0.0 {
            return None;
        }
        Some(((p0 + p2) * 0.5, half))
    }

    /// Solver geometry in units. Chains have none; they are created through
    /// their own solver call.
    pub(crate) fn geometry(&self, scale: &MeterScale) -> Option<ShapeGeometry> {
        match self.kind {
            ShapeType::Circle => Some(ShapeGeometry::Circle {
                center: scale.vec_to_units(self.points[0]),
                radius: scale.to_units(self.radius),
            }),
            ShapeType::Polygon => Some(match self.as_axis_aligned_box() {
                Some((center, half)) => ShapeGeometry::Box {
                    half_extents: scale.vec_to_units(half),
                    center: scale.vec_to_units(center),
                    angle: 0.0,
                },
                None => ShapeGeometry::Polygon {
                    vertices: self.points.iter().map(|p| scale.vec_to_units(*p)).collect(),
                },
            }),
            ShapeType::Segment => Some(ShapeGeometry::Segment {
                a: scale.vec_to_units(self.points[0]),
                b: scale.vec_to_units(self.points[1]),
            }),
            ShapeType::Chain => None,
        }
    }

    pub(crate) fn chain_points(&self, scale: &MeterScale) -> Vec<Vec2> {
        self.points.iter().map(|p| scale.vec_to_units(*p)).collect()
    }
}

fn pairs(coords: &[f32]) -> Option<Vec<Vec2>> {
    if coords.len() % 2 != 0 {
        return None;
    }
    Some(coords.chunks_exact(2).map(|c| Vec2::new(c[0], c[1])).collect())
}

/// Whether the points enclose some area, judged relative to their extent.
fn spans_area(points: &[Vec2]) -> bool {
    let Some(&origin) = points.first() else {
        return false;
    };
    let far = points.iter().fold(origin, |best, p| {
        if p.distance_squared(origin) > best.distance_squared(origin) {
            *p
        } else {
            best
        }
    });
    let axis = far - origin;
    let reach = axis.length_squared();
    if reach <= f32::EPSILON {
        return false;
    }
    points.iter().any(|p| axis.perp_dot(*p - origin).abs() > reach * 1e-4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrotated_rectangle_uses_box_geometry() {
        let shape = Shape::rectangle(30.0, 60.0, 60.0, 30.0, 0.0).unwrap();
        let geometry = shape.geometry(&MeterScale::default()).unwrap();
        assert_eq!(
            geometry,
            ShapeGeometry::Box {
                half_extents: Vec2::new(1.0, 0.5),
                center: Vec2::new(1.0, 2.0),
                angle: 0.0,
            }
        );
    }

    #[test]
    fn test_rotated_rectangle_uses_polygon_geometry() {
        let shape = Shape::rectangle(0.0, 0.0, 60.0, 30.0, 0.3).unwrap();
        assert!(shape.as_axis_aligned_box().is_none());
        match shape.geometry(&MeterScale::default()) {
            Some(ShapeGeometry::Polygon { vertices }) => assert_eq!(vertices.len(), 4),
            other => panic!("expected polygon, got {other:?}"),
        }
    }

    #[test]
    fn test_box_detection_accepts_either_winding_start() {
        let vertical_first = Shape::polygon(&[
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 10.0),
            Vec2::new(20.0, 10.0),
            Vec2::new(20.0, 0.0),
        ])
        .unwrap();
        assert_eq!(
            vertical_first.as_axis_aligned_box(),
            Some((Vec2::new(10.0, 5.0), Vec2::new(10.0, 5.0)))
        );

        let trapezoid = Shape::polygon(&[
            Vec2::new(0.0, 0.0),
            Vec2::new(20.0, 0.0),
            Vec2::new(15.0, 10.0),
            Vec2::new(5.0, 10.0),
        ])
        .unwrap();
        assert!(trapezoid.as_axis_aligned_box().is_none());
    }

    #[test]
    fn test_polygon_vertex_limits() {
        let tri = [Vec2::ZERO, Vec2::X, Vec2::Y];
        assert!(Shape::polygon(&tri).is_ok());
        assert!(Shape::polygon(&tri[..2]).is_err());
        assert!(Shape::polygon(&[Vec2::ZERO; 9]).is_err());
    }

    #[test]
    fn test_polygon_rejects_zero_area() {
        let collinear = [Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), Vec2::new(20.0, 0.0)];
        assert!(matches!(
            Shape::polygon(&collinear),
            Err(PhysicsError::InvalidShape(_))
        ));
        assert!(Shape::polygon(&[Vec2::ONE; 4]).is_err());
        let diagonal = [Vec2::ZERO, Vec2::splat(5.0), Vec2::splat(10.0), Vec2::splat(2.5)];
        assert!(Shape::polygon(&diagonal).is_err());
        assert!(Shape::parse("polygon", &[0.0, 0.0, 10.0, 0.0, 20.0, 0.0]).is_err());

        let sliver = [Vec2::ZERO, Vec2::new(100.0, 0.0), Vec2::new(50.0, 0.5)];
        assert!(Shape::polygon(&sliver).is_ok());
    }

    #[test]
    fn test_chain_minimum_points() {
        assert!(Shape::chain(&[Vec2::ZERO, Vec2::X], false).is_ok());
        assert!(Shape::chain(&[Vec2::ZERO, Vec2::X], true).is_err());
        assert!(Shape::chain(&[Vec2::ZERO], false).is_err());
        let chain = Shape::chain(&[Vec2::ZERO, Vec2::X, Vec2::Y], true).unwrap();
        assert!(chain.is_looped());
        assert!(chain.geometry(&MeterScale::default()).is_none());
    }

    #[test]
    fn test_parse_shapes() {
        let circle = Shape::parse("circle", &[3.0, 4.0, 5.0]).unwrap();
        assert_eq!(circle.shape_type(), ShapeType::Circle);
        assert_eq!(circle.radius(), 5.0);
        assert_eq!(circle.points(), &[Vec2::new(3.0, 4.0)]);

        let rect = Shape::parse("rectangle", &[10.0, 20.0]).unwrap();
        assert!(rect.as_axis_aligned_box().is_some());

        let edge = Shape::parse("edge", &[0.0, 0.0, 10.0, 0.0]).unwrap();
        assert_eq!(edge.shape_type(), ShapeType::Segment);

        let chain = Shape::parse("chain", &[0.0, 0.0, 1.0, 1.0, 2.0, 0.0]).unwrap();
        assert_eq!(chain.points().len(), 3);
    }

    #[test]
    fn test_parse_rejects_unknown_kind_and_bad_arity() {
        assert_eq!(
            Shape::parse("hexagon", &[1.0]),
            Err(PhysicsError::UnknownShapeType("hexagon".into()))
        );
        assert!(matches!(
            Shape::parse("segment", &[1.0, 2.0, 3.0]),
            Err(PhysicsError::InvalidShape(_))
        ));
        assert!(Shape::parse("polygon", &[0.0, 0.0, 1.0, 0.0, 1.0]).is_err());
    }

    #[test]
    fn test_shape_type_from_str() {
        assert_eq!("edge".parse::<ShapeType>(), Ok(ShapeType::Segment));
        assert!("blob".parse::<ShapeType>().is_err());
        assert_eq!(ShapeType::Chain.to_string(), "chain");
    }

    #[test]
    fn test_circle_rejects_bad_radius() {
        assert!(Shape::circle(0.0, 0.0, 0.0).is_err());
        assert!(Shape::circle(0.0, 0.0, -2.0).is_err());
    }
}
