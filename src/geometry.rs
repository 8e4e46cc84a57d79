//! The road layout that vehicles drive on.

use crate::config::ConfigError;
use crate::math::{heading_vector, Point2d};
use smallvec::SmallVec;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The step between samples when marching a ray, in world units.
const RAY_STEP: f64 = 2.0;

/// A position and heading in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// The position in world units.
    pub pos: Point2d,
    /// The heading in degrees.
    pub angle: f64,
}

/// The queries the simulation needs from the road layout.
pub trait RoadGeometry {
    /// Casts a ray from `(x, y)` along `angle` degrees and returns the distance
    /// to the first point off the drivable surface, capped at `max_distance`.
    fn wall_ray_distance(&self, x: f64, y: f64, angle: f64, max_distance: f64) -> f64;

    /// Whether the point `(x, y)` lies off the drivable surface.
    fn is_off_drivable_surface(&self, x: f64, y: f64) -> bool;

    /// The poses at which randomly spawned vehicles enter the world.
    fn entry_points(&self) -> SmallVec<[Pose; 4]>;

    /// The destinations of randomly spawned vehicles.
    fn exit_points(&self) -> SmallVec<[Point2d; 4]>;

    /// The centre of the intersection.
    fn intersection_center(&self) -> Point2d;

    /// Half the width of a road.
    fn lane_half_width(&self) -> f64;
}

/// An axis aligned rectangle, inclusive of its top left edges.
#[derive(Clone, Copy, Debug)]
struct Rect {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

impl Rect {
    fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left
            && x < self.left + self.width
            && y >= self.top
            && y < self.top + self.height
    }
}

/// A single crossroad: a horizontal and a vertical road spanning the world,
/// crossing at its centre.
#[derive(Clone, Debug)]
pub struct CrossroadLayout {
    width: f64,
    height: f64,
    road_width: f64,
    horizontal: Rect,
    vertical: Rect,
}

impl CrossroadLayout {
    /// Creates a crossroad in a world of the given size.
    pub fn new(width: f64, height: f64, road_width: f64) -> Result<Self, ConfigError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(width) || !valid(height) || !valid(road_width) {
            return Err(ConfigError::InvalidConfig(
                "layout dimensions must be positive",
            ));
        }
        if road_width > width.min(height) {
            return Err(ConfigError::InvalidConfig(
                "roads must fit within the world",
            ));
        }

        let half_road = 0.5 * road_width;
        Ok(Self {
            width,
            height,
            road_width,
            horizontal: Rect {
                left: 0.0,
                top: 0.5 * height - half_road,
                width,
                height: road_width,
            },
            vertical: Rect {
                left: 0.5 * width - half_road,
                top: 0.0,
                width: road_width,
                height,
            },
        })
    }

    /// The width of the world.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// The height of the world.
    pub fn height(&self) -> f64 {
        self.height
    }

    fn is_on_road(&self, x: f64, y: f64) -> bool {
        self.horizontal.contains(x, y) || self.vertical.contains(x, y)
    }
}

impl RoadGeometry for CrossroadLayout {
    fn wall_ray_distance(&self, x: f64, y: f64, angle: f64, max_distance: f64) -> f64 {
        let dir = heading_vector(angle);
        let mut dist = 0.0;
        while dist < max_distance {
            if !self.is_on_road(x + dist * dir.x, y + dist * dir.y) {
                return dist;
            }
            dist += RAY_STEP;
        }
        max_distance
    }

    fn is_off_drivable_surface(&self, x: f64, y: f64) -> bool {
        !self.is_on_road(x, y)
    }

    fn entry_points(&self) -> SmallVec<[Pose; 4]> {
        let (w, h, q) = (self.width, self.height, 0.25 * self.road_width);
        [
            (10.0, 0.5 * h - q, 0.0),
            (w - 10.0, 0.5 * h + q, 180.0),
            (0.5 * w - q, 10.0, 90.0),
            (0.5 * w + q, h - 10.0, 270.0),
        ]
        .into_iter()
        .map(|(x, y, angle)| Pose {
            pos: Point2d::new(x, y),
            angle,
        })
        .collect()
    }

    fn exit_points(&self) -> SmallVec<[Point2d; 4]> {
        let (w, h, q) = (self.width, self.height, 0.25 * self.road_width);
        [
            Point2d::new(w - 10.0, 0.5 * h - q),
            Point2d::new(10.0, 0.5 * h + q),
            Point2d::new(0.5 * w + q, 10.0),
            Point2d::new(0.5 * w - q, h - 10.0),
        ]
        .into_iter()
        .collect()
    }

    fn intersection_center(&self) -> Point2d {
        Point2d::new(0.5 * self.width, 0.5 * self.height)
    }

    fn lane_half_width(&self) -> f64 {
        0.5 * self.road_width
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn layout() -> CrossroadLayout {
        CrossroadLayout::new(1000.0, 800.0, 60.0).unwrap()
    }

    #[test]
    fn drivable_surface() {
        let layout = layout();
        assert!(!layout.is_off_drivable_surface(50.0, 400.0));
        assert!(!layout.is_off_drivable_surface(500.0, 20.0));
        assert!(!layout.is_off_drivable_surface(0.0, 370.0));
        assert!(layout.is_off_drivable_surface(50.0, 430.0));
        assert!(layout.is_off_drivable_surface(100.0, 100.0));
        assert!(layout.is_off_drivable_surface(-1.0, 400.0));
    }

    #[test]
    fn ray_reaches_edge_of_road() {
        let layout = layout();
        // Straight down from the centre line of the horizontal road
        assert_approx_eq!(layout.wall_ray_distance(100.0, 400.0, 90.0, 150.0), 30.0);
        // Straight up
        assert_approx_eq!(layout.wall_ray_distance(100.0, 400.0, -90.0, 150.0), 32.0);
        // Along the road nothing is hit
        assert_approx_eq!(layout.wall_ray_distance(100.0, 400.0, 0.0, 150.0), 150.0);
        // Starting off road
        assert_approx_eq!(layout.wall_ray_distance(100.0, 100.0, 0.0, 150.0), 0.0);
    }

    #[test]
    fn entry_and_exit_points_are_on_road() {
        let layout = layout();
        for entry in layout.entry_points() {
            assert!(!layout.is_off_drivable_surface(entry.pos.x, entry.pos.y));
        }
        for exit in layout.exit_points() {
            assert!(!layout.is_off_drivable_surface(exit.x, exit.y));
        }
        assert_eq!(layout.entry_points()[2].pos, Point2d::new(485.0, 10.0));
        assert_eq!(layout.exit_points()[0], Point2d::new(990.0, 385.0));
        assert_eq!(layout.intersection_center(), Point2d::new(500.0, 400.0));
        assert_eq!(layout.lane_half_width(), 30.0);
    }

    #[test]
    fn rejects_degenerate_layouts() {
        assert!(CrossroadLayout::new(0.0, 800.0, 60.0).is_err());
        assert!(CrossroadLayout::new(1000.0, 800.0, 900.0).is_err());
        assert!(CrossroadLayout::new(1000.0, f64::INFINITY, 60.0).is_err());
    }
}
