use super::VehicleSnapshot;
use crate::debug::debug_line;
use crate::geometry::RoadGeometry;
use crate::math::{angle_between, angular_distance, heading_vector, wrap_degrees, Point2d};
use crate::VehicleId;
use cgmath::MetricSpace;

/// The sensor directions in degrees, relative to the vehicle's heading.
pub const SENSOR_ANGLES: [f64; 5] = [-90.0, -45.0, 0.0, 45.0, 90.0];

/// Other vehicles are detected by a sensor when they lie within
/// this many degrees of its ray.
const SENSOR_CONE: f64 = 15.0;

/// The readings of a vehicle's range sensors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorReadings {
    /// The distance measured by each sensor as a fraction of the sensor range.
    pub distances: [f64; 5],
    /// The end point of each sensor ray in world space.
    pub endpoints: [Point2d; 5],
}

impl SensorReadings {
    /// Readings for sensors that see nothing, with every ray ending at `pos`.
    pub(crate) fn clear(pos: Point2d) -> Self {
        Self {
            distances: [1.0; 5],
            endpoints: [pos; 5],
        }
    }
}

/// Casts each sensor ray against the road edges and the other vehicles.
///
/// # Parameters
/// * `id` - The sensing vehicle, which is skipped in `others`
/// * `pos` - The sensing vehicle's position
/// * `angle` - The sensing vehicle's heading in degrees
/// * `range` - The sensor range in world units
/// * `others` - The vehicles that may be detected
/// * `geometry` - The road layout
pub fn sense(
    id: VehicleId,
    pos: Point2d,
    angle: f64,
    range: f64,
    others: &[VehicleSnapshot],
    geometry: &dyn RoadGeometry,
) -> SensorReadings {
    let mut readings = SensorReadings::clear(pos);

    for (idx, offset) in SENSOR_ANGLES.iter().enumerate() {
        let ray_angle = angle + offset;
        let wall = geometry.wall_ray_distance(pos.x, pos.y, ray_angle, range);
        let dist = others
            .iter()
            .filter(|other| other.id != id)
            .map(|other| peer_distance(pos, ray_angle, other.pos, range))
            .fold(f64::min(wall, range), f64::min);

        readings.distances[idx] = dist / range;
        readings.endpoints[idx] = pos + dist * heading_vector(ray_angle);
        debug_line("sensor", id, pos, readings.endpoints[idx]);
    }

    readings
}

/// The distance to another vehicle if it lies within the cone
/// of a sensor ray, otherwise the sensor range.
fn peer_distance(pos: Point2d, ray_angle: f64, other: Point2d, range: f64) -> f64 {
    let dist = pos.distance(other);
    let bearing = angle_between(pos, other);
    if angular_distance(bearing, ray_angle) <= SENSOR_CONE && dist <= range {
        dist
    } else {
        range
    }
}

/// The angle in degrees from the vehicle's heading to its destination, in (-180, 180].
pub fn destination_angle(pos: Point2d, angle: f64, destination: Point2d) -> f64 {
    wrap_degrees(angle_between(pos, destination) - angle)
}

/// The distance to the nearest signal as a fraction of the sensor range, capped at 1.
pub fn signal_distance(pos: Point2d, signals: impl Iterator<Item = Point2d>, range: f64) -> f64 {
    let nearest = signals
        .map(|signal| pos.distance(signal))
        .fold(f64::INFINITY, f64::min);
    f64::min(nearest, range) / range
}
