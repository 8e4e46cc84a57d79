use super::{Point2d, Vector2d};
use cgmath::{Angle, Deg, Rad};

/// Gets the unit vector pointing along a heading given in degrees.
///
/// Headings follow screen conventions: 0° points along +x and
/// 90° points along +y.
pub fn heading_vector(degrees: f64) -> Vector2d {
    let (sin, cos) = Rad::from(Deg(degrees)).sin_cos();
    Vector2d::new(cos, sin)
}

/// Gets the absolute angle in degrees of the ray from `from` to `to`.
pub fn angle_between(from: Point2d, to: Point2d) -> f64 {
    let delta = to - from;
    Deg::from(Rad::atan2(delta.y, delta.x)).0
}

/// Wraps an angle in degrees into the interval (-180, 180].
pub fn wrap_degrees(degrees: f64) -> f64 {
    let wrapped = (degrees + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Gets the smallest absolute difference between two angles in degrees.
pub fn angular_distance(a: f64, b: f64) -> f64 {
    ((a - b + 180.0).rem_euclid(360.0) - 180.0).abs()
}
