use self::dynamics::{
    accelerate, advance_pose, brake_for_signal, StuckDetector, FORWARD_BIAS, STEERING_GAIN,
};
use self::sensors::{destination_angle, sense, signal_distance, SensorReadings};
use crate::config::VehicleAttributes;
use crate::debug::debug_circle;
use crate::geometry::{Pose, RoadGeometry};
use crate::light::SignalController;
use crate::math::{heading_vector, Point2d, Vector2d};
use crate::policy::{infer, PolicyParams};
use crate::util::Interval;
use crate::VehicleId;
use cgmath::MetricSpace;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod dynamics;
pub mod sensors;

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID
    pub(crate) id: VehicleId,
    /// The vehicle's attributes.
    attribs: VehicleAttributes,
    /// The colour the vehicle is drawn in.
    color: [u8; 3],
    /// The world space coordinates of the centre of the vehicle.
    pos: Point2d,
    /// The heading in degrees. This is not wrapped and may grow without bound.
    angle: f64,
    /// The speed in world units per tick, negative when reversing.
    speed: f64,
    /// The acceleration applied during the last update.
    acc: f64,
    /// The steering rate applied during the last update, in degrees per tick at full speed.
    steering: f64,
    /// Where the vehicle is heading.
    destination: Point2d,
    /// Whether the vehicle has reached its destination.
    arrived: bool,
    /// Whether the vehicle has crashed.
    crashed: bool,
    /// The readings of the range sensors during the last update.
    sensors: SensorReadings,
    /// Detects when the vehicle has stopped making progress.
    stuck: StuckDetector,
    /// The number of updates the vehicle has performed.
    age: usize,
    /// The policy choosing the vehicle's controls.
    policy: PolicyParams,
}

/// The state of a vehicle as seen by other vehicles during a tick.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub pos: Point2d,
    pub angle: f64,
    pub speed: f64,
    pub width: f64,
}

/// Everything a vehicle observes while it updates.
pub(crate) struct UpdateContext<'a> {
    /// The state of every vehicle at the start of the tick.
    pub others: &'a [VehicleSnapshot],
    /// The road layout.
    pub geometry: &'a dyn RoadGeometry,
    /// The signal controller, whose phase has already been decided for this tick.
    pub controller: &'a SignalController,
}

/// A terminal transition of a vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VehicleOutcome {
    Crashed,
    Arrived,
}

impl Vehicle {
    /// Creates a new vehicle.
    pub(crate) fn new(
        id: VehicleId,
        attribs: &VehicleAttributes,
        pose: Pose,
        destination: Point2d,
        policy: PolicyParams,
        color: [u8; 3],
    ) -> Self {
        Self {
            id,
            attribs: *attribs,
            color,
            pos: pose.pos,
            angle: pose.angle,
            speed: 0.0,
            acc: 0.0,
            steering: 0.0,
            destination,
            arrived: false,
            crashed: false,
            sensors: SensorReadings::clear(pose.pos),
            stuck: StuckDetector::new(pose.pos),
            age: 0,
            policy,
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The colour the vehicle is drawn in.
    pub fn color(&self) -> [u8; 3] {
        self.color
    }

    /// The vehicle's width.
    pub fn width(&self) -> f64 {
        self.attribs.width
    }

    /// The vehicle's length.
    pub fn length(&self) -> f64 {
        self.attribs.length
    }

    /// The coordinates in world space of the centre of the vehicle.
    pub fn position(&self) -> Point2d {
        self.pos
    }

    /// The vehicle's heading in degrees.
    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// A unit vector in world space aligned with the vehicle's heading.
    pub fn direction(&self) -> Vector2d {
        heading_vector(self.angle)
    }

    /// The vehicle's speed in world units per tick.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// The acceleration applied during the last update.
    pub fn acceleration(&self) -> f64 {
        self.acc
    }

    /// The steering rate applied during the last update.
    pub fn steering(&self) -> f64 {
        self.steering
    }

    /// The point the vehicle is driving towards.
    pub fn destination(&self) -> Point2d {
        self.destination
    }

    /// Whether the vehicle has reached its destination.
    pub fn has_arrived(&self) -> bool {
        self.arrived
    }

    /// Whether the vehicle has crashed.
    pub fn has_crashed(&self) -> bool {
        self.crashed
    }

    /// Whether the vehicle has stopped updating for good.
    pub fn is_terminal(&self) -> bool {
        self.arrived || self.crashed
    }

    /// The number of updates the vehicle has performed.
    pub fn age(&self) -> usize {
        self.age
    }

    /// The number of ticks the vehicle has made no progress for.
    pub fn stuck_ticks(&self) -> u32 {
        self.stuck.stuck_ticks()
    }

    /// The normalised sensor distances measured during the last update.
    pub fn sensor_readings(&self) -> &[f64; 5] {
        &self.sensors.distances
    }

    /// The end points of the sensor rays measured during the last update.
    pub fn sensor_endpoints(&self) -> &[Point2d; 5] {
        &self.sensors.endpoints
    }

    /// The vehicle's policy.
    pub fn policy(&self) -> &PolicyParams {
        &self.policy
    }

    /// The range of speeds the vehicle may travel at.
    pub fn speed_envelope(&self) -> Interval<f64> {
        let max = self.attribs.max_speed;
        Interval::new(-0.5 * max, max)
    }

    /// Captures the state other vehicles can observe.
    pub fn snapshot(&self) -> VehicleSnapshot {
        VehicleSnapshot {
            id: self.id,
            pos: self.pos,
            angle: self.angle,
            speed: self.speed,
            width: self.attribs.width,
        }
    }

    /// Advances the vehicle by one tick.
    ///
    /// Returns the vehicle's terminal transition, if it crashed or arrived.
    pub(crate) fn update(&mut self, ctx: &UpdateContext) -> Option<VehicleOutcome> {
        if self.is_terminal() {
            return None;
        }
        self.age += 1;

        let max_speed = self.attribs.max_speed;
        let range = self.attribs.sensor_range;

        // Kick vehicles out of deadlocks
        let interval = self.attribs.position_check_interval;
        if self.stuck.update(self.pos, interval, self.attribs.max_stuck_time) {
            log::trace!("Vehicle {:?} is stuck at {:?}", self.id, self.pos);
            self.speed = 0.5 * max_speed;
        }

        // Observe the surroundings and choose the controls
        self.sensors = sense(self.id, self.pos, self.angle, range, ctx.others, ctx.geometry);
        let signal = signal_distance(self.pos, ctx.controller.signal_positions(), range);
        let dest_angle = destination_angle(self.pos, self.angle, self.destination);
        let d = &self.sensors.distances;
        let input = [
            d[0],
            d[1],
            d[2],
            d[3],
            d[4],
            signal,
            self.speed / max_speed,
            dest_angle / 180.0,
        ];
        let controls = infer(&self.policy, &input);
        self.acc = controls.first().copied().unwrap_or(0.0) + FORWARD_BIAS;
        self.steering = controls.get(1).copied().unwrap_or(0.0) * STEERING_GAIN;

        // Integrate
        self.speed = accelerate(self.speed, self.acc, self.speed_envelope());
        (self.pos, self.angle) =
            advance_pose(self.pos, self.angle, self.speed, self.steering, max_speed);

        if self.check_collision(ctx) {
            log::debug!("Vehicle {:?} crashed at {:?}", self.id, self.pos);
            self.crashed = true;
            self.speed = 0.0;
            return Some(VehicleOutcome::Crashed);
        }

        if self.check_arrival() {
            log::debug!("Vehicle {:?} arrived after {} ticks", self.id, self.age);
            self.arrived = true;
            self.speed = 0.0;
            return Some(VehicleOutcome::Arrived);
        }

        if ctx.controller.should_stop(self.pos, self.angle) {
            log::trace!("Vehicle {:?} is stopping for a red light", self.id);
            debug_circle("stop", self.id, self.pos, 0.5 * self.attribs.length);
            self.speed = brake_for_signal(self.speed);
        }

        None
    }

    /// Whether the vehicle has left the road or touched another vehicle.
    fn check_collision(&self, ctx: &UpdateContext) -> bool {
        if ctx.geometry.is_off_drivable_surface(self.pos.x, self.pos.y) {
            return true;
        }
        ctx.others
            .iter()
            .filter(|other| other.id != self.id)
            .any(|other| self.pos.distance(other.pos) < 0.5 * (self.attribs.width + other.width))
    }

    /// Whether the vehicle is within reach of its destination.
    fn check_arrival(&self) -> bool {
        self.pos.distance(self.destination) < self.attribs.arrival_radius
    }
}
