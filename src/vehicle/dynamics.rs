use crate::math::{heading_vector, Point2d};
use crate::util::Interval;
use cgmath::MetricSpace;

/// Added to the policy's acceleration command so vehicles tend to keep moving.
pub const FORWARD_BIAS: f64 = 0.1;

/// Scales the policy's steering command into degrees per tick at full speed.
pub const STEERING_GAIN: f64 = 5.0;

/// Scales the acceleration into a change of speed per tick.
const SPEED_GAIN: f64 = 0.1;

/// The smallest speed magnitude of a moving vehicle.
pub const MIN_SPEED: f64 = 0.5;

/// The speed shed each tick while stopping for a red light.
const SIGNAL_SLOWDOWN: f64 = 0.5;

/// A vehicle displaced less than this between position samples is stuck.
const STUCK_DISPLACEMENT: f64 = 2.0;

/// Detects vehicles that have been going nowhere for a long time.
#[derive(Clone, Copy, Debug)]
pub struct StuckDetector {
    /// The number of ticks the vehicle has been stuck.
    stuck_ticks: u32,
    /// The position at the last sample.
    last_pos: Point2d,
    /// The number of ticks since the last sample.
    since_sample: u32,
}

impl StuckDetector {
    pub fn new(pos: Point2d) -> Self {
        Self {
            stuck_ticks: 0,
            last_pos: pos,
            since_sample: 0,
        }
    }

    /// The number of ticks the vehicle has been stuck for.
    pub fn stuck_ticks(&self) -> u32 {
        self.stuck_ticks
    }

    /// Feeds the detector the vehicle's position for this tick.
    /// Returns `true` if the vehicle has been stuck for more than `max_stuck` ticks,
    /// in which case the detector is reset.
    ///
    /// # Parameters
    /// * `pos` - The vehicle's current position
    /// * `interval` - The number of ticks between position samples
    /// * `max_stuck` - The number of ticks a vehicle may stay stuck
    pub fn update(&mut self, pos: Point2d, interval: u32, max_stuck: u32) -> bool {
        self.since_sample += 1;
        if self.since_sample < interval {
            return false;
        }

        self.since_sample = 0;
        if pos.distance(self.last_pos) < STUCK_DISPLACEMENT {
            self.stuck_ticks += interval;
        } else {
            self.stuck_ticks = 0;
        }
        self.last_pos = pos;

        if self.stuck_ticks > max_stuck {
            self.stuck_ticks = 0;
            true
        } else {
            false
        }
    }
}

/// Applies an acceleration to a speed, keeping it within `envelope`
/// and away from a standstill.
pub fn accelerate(speed: f64, acc: f64, envelope: Interval<f64>) -> f64 {
    enforce_min_speed(envelope.clamp(speed + acc * SPEED_GAIN))
}

/// Snaps speeds slower than [MIN_SPEED] up to it, preserving their direction.
pub fn enforce_min_speed(speed: f64) -> f64 {
    if speed.abs() < MIN_SPEED {
        MIN_SPEED.copysign(speed)
    } else {
        speed
    }
}

/// Slows a vehicle that has to stop for a red light, without stalling it.
pub fn brake_for_signal(speed: f64) -> f64 {
    let magnitude = f64::max(speed.abs() - SIGNAL_SLOWDOWN, MIN_SPEED);
    magnitude.copysign(speed)
}

/// Integrates a vehicle's heading and position over one tick.
///
/// The turn rate scales with the fraction of top speed, so a stationary
/// vehicle cannot pivot on the spot.
///
/// # Returns
/// The new position and heading in degrees.
pub fn advance_pose(
    pos: Point2d,
    angle: f64,
    speed: f64,
    steering: f64,
    max_speed: f64,
) -> (Point2d, f64) {
    let angle = angle + steering * (speed / max_speed);
    let pos = pos + speed * heading_vector(angle);
    (pos, angle)
}
