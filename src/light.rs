use crate::config::{ConfigError, ControllerAttributes};
use crate::math::{heading_vector, Point2d};
use crate::policy::{infer, sample_index, signal_policy, PolicyParams};
use crate::vehicle::VehicleSnapshot;
use cgmath::MetricSpace;
use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Lane vehicle counts are divided by this before being fed to the policy.
const COUNT_NORMALIZATION: f64 = 10.0;

/// Lane wait times are divided by this before being fed to the policy.
const WAIT_NORMALIZATION: f64 = 30.0; // s

/// The right of way assignment of the intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Phase {
    /// North-south traffic has a green light, east-west traffic has a red light.
    NorthSouthGreen = 0,
    /// North-south traffic has a red light, east-west traffic has a green light.
    EastWestGreen = 1,
    /// North-south left turns.
    NorthSouthLeft = 2,
    /// East-west left turns.
    EastWestLeft = 3,
}

/// The axis along which a vehicle travels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    NorthSouth,
    EastWest,
}

/// One of the four approaches to the intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Lane {
    North = 0,
    South = 1,
    East = 2,
    West = 3,
}

/// The state of a traffic light.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LightState {
    Red,
    Amber,
    Green,
}

/// Traffic statistics for a single lane.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LaneStats {
    /// The number of vehicles near the intersection in this lane.
    pub count: usize,
    /// The mean speed of those vehicles as a fraction of the maximum speed.
    /// An empty lane is reported as free flowing, with a value of 1.
    pub avg_speed: f64,
    /// The time in seconds the lane has been waiting at a red light.
    pub wait_time: f64,
}

/// A traffic light post facing one of the approaches.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SignalLight {
    /// The approach the light faces.
    pub lane: Lane,
    /// The position of the light in world units.
    pub pos: Point2d,
    /// The orientation of the light in degrees.
    pub angle: f64,
}

/// The controller of the intersection's traffic lights.
///
/// Each tick it gathers statistics about the vehicles approaching on each lane,
/// and once the current phase has been held for long enough it consults its
/// policy to choose the next phase.
#[derive(Clone, Debug)]
pub struct SignalController {
    /// The controller attributes.
    attribs: ControllerAttributes,
    /// The centre of the intersection.
    center: Point2d,
    /// The current phase.
    phase: Phase,
    /// The simulation time of the last phase change in s.
    last_change: f64,
    /// The statistics of each lane, indexed by [Lane].
    lanes: [LaneStats; 4],
    /// The light posts, indexed by [Lane].
    lights: [SignalLight; 4],
    /// The phase selection policy.
    policy: PolicyParams,
}

impl Phase {
    /// All the phases, in index order.
    pub const ALL: [Phase; 4] = [
        Phase::NorthSouthGreen,
        Phase::EastWestGreen,
        Phase::NorthSouthLeft,
        Phase::EastWestLeft,
    ];

    /// Gets the phase with the given index.
    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    /// Gets the index of the phase.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether through traffic along the axis must stop.
    /// The left turn phases stop through traffic in both directions.
    pub fn is_red(self, axis: Axis) -> bool {
        use Phase::*;
        match axis {
            Axis::NorthSouth => matches!(self, EastWestGreen | NorthSouthLeft | EastWestLeft),
            Axis::EastWest => matches!(self, NorthSouthGreen | NorthSouthLeft | EastWestLeft),
        }
    }

    /// Gets the state of the lights facing the given lane.
    pub fn light_state(self, lane: Lane) -> LightState {
        match self {
            Phase::NorthSouthLeft | Phase::EastWestLeft => LightState::Amber,
            _ if self.is_red(lane.axis()) => LightState::Red,
            _ => LightState::Green,
        }
    }
}

impl Axis {
    /// Determines whether a heading in degrees is closer to vertical or horizontal travel.
    pub fn from_heading(angle: f64) -> Self {
        if angle.to_radians().cos().abs() < 0.5 {
            Axis::NorthSouth
        } else {
            Axis::EastWest
        }
    }
}

impl Lane {
    /// All the lanes, in index order.
    pub const ALL: [Lane; 4] = [Lane::North, Lane::South, Lane::East, Lane::West];

    /// Gets the index of the lane.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The axis of travel of the lane.
    pub fn axis(self) -> Axis {
        match self {
            Lane::North | Lane::South => Axis::NorthSouth,
            Lane::East | Lane::West => Axis::EastWest,
        }
    }

    /// Determines the lane of a vehicle from its position and heading.
    pub fn classify(pos: Point2d, angle: f64, center: Point2d) -> Self {
        match Axis::from_heading(angle) {
            Axis::NorthSouth if pos.y < center.y => Lane::North,
            Axis::NorthSouth => Lane::South,
            Axis::EastWest if pos.x > center.x => Lane::East,
            Axis::EastWest => Lane::West,
        }
    }
}

impl Default for LaneStats {
    fn default() -> Self {
        Self {
            count: 0,
            avg_speed: 1.0,
            wait_time: 0.0,
        }
    }
}

impl SignalController {
    /// Creates a controller with a randomly initialised policy.
    pub fn new(
        attribs: &ControllerAttributes,
        center: Point2d,
        lane_half_width: f64,
        rng: &mut (impl Rng + ?Sized),
    ) -> Result<Self, ConfigError> {
        Self::with_policy(attribs, center, lane_half_width, signal_policy(rng))
    }

    /// Creates a controller which selects phases using the given policy.
    pub fn with_policy(
        attribs: &ControllerAttributes,
        center: Point2d,
        lane_half_width: f64,
        policy: PolicyParams,
    ) -> Result<Self, ConfigError> {
        attribs.validate()?;
        if policy.input_size() != 4 * 3 || policy.output_size() != Phase::ALL.len() {
            return Err(ConfigError::InvalidConfig(
                "signal policy must map 12 inputs to 4 phases",
            ));
        }

        let road = 2.0 * lane_half_width;
        let (cx, cy) = (center.x, center.y);
        let light = |lane, x, y, angle| SignalLight {
            lane,
            pos: Point2d::new(x, y),
            angle,
        };
        let lights = [
            light(Lane::North, cx + road / 3.0, cy - road / 2.0, 0.0),
            light(Lane::South, cx - road / 3.0, cy + road / 2.0, 180.0),
            light(Lane::East, cx + road / 2.0, cy - road / 3.0, 90.0),
            light(Lane::West, cx - road / 2.0, cy + road / 3.0, 270.0),
        ];

        Ok(Self {
            attribs: *attribs,
            center,
            phase: Phase::NorthSouthGreen,
            last_change: 0.0,
            lanes: [LaneStats::default(); 4],
            lights,
            policy,
        })
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The simulation time in seconds at which the current phase began.
    pub fn last_change(&self) -> f64 {
        self.last_change
    }

    /// The statistics of a lane.
    pub fn lane_stats(&self, lane: Lane) -> &LaneStats {
        &self.lanes[lane.index()]
    }

    /// The statistics of all the lanes, in [Lane] index order.
    pub fn all_lane_stats(&self) -> &[LaneStats; 4] {
        &self.lanes
    }

    /// The centre of the controlled intersection.
    pub fn center(&self) -> Point2d {
        self.center
    }

    /// Returns an iterator over the light posts and their current states.
    pub fn iter_lights(&self) -> impl Iterator<Item = (&SignalLight, LightState)> {
        let phase = self.phase;
        self.lights
            .iter()
            .map(move |light| (light, phase.light_state(light.lane)))
    }

    /// Returns an iterator over the positions of the light posts.
    pub fn signal_positions(&self) -> impl Iterator<Item = Point2d> + '_ {
        self.lights.iter().map(|light| light.pos)
    }

    /// Recomputes the vehicle count and mean speed of each lane
    /// from the vehicles near the intersection.
    pub fn refresh_stats<'a>(
        &mut self,
        vehicles: impl IntoIterator<Item = &'a VehicleSnapshot>,
        max_speed: f64,
    ) {
        let mut counts = [0usize; 4];
        let mut speeds = [0.0f64; 4];

        for vehicle in vehicles {
            if vehicle.pos.distance(self.center) > self.attribs.stats_radius {
                continue;
            }
            let lane = Lane::classify(vehicle.pos, vehicle.angle, self.center).index();
            counts[lane] += 1;
            speeds[lane] += vehicle.speed / max_speed;
        }

        for (stats, (count, speed)) in self.lanes.iter_mut().zip(counts.into_iter().zip(speeds)) {
            stats.count = count;
            stats.avg_speed = if count > 0 { speed / count as f64 } else { 1.0 };
        }
    }

    /// Advances the controller to simulation time `now`, in seconds.
    ///
    /// Returns the new phase if the phase changed.
    pub fn update(&mut self, now: f64, rng: &mut (impl Rng + ?Sized)) -> Option<Phase> {
        let mut changed = None;

        if now - self.last_change >= self.attribs.min_phase_duration {
            let probs = infer(&self.policy, &self.policy_input());
            let next = Phase::from_index(sample_index(&probs, rng)).unwrap_or(self.phase);
            if next != self.phase {
                log::debug!(
                    "Signal phase {:?} -> {:?} after {:.1}s",
                    self.phase,
                    next,
                    now - self.last_change
                );
                self.phase = next;
                self.last_change = now;
                for lane in Lane::ALL {
                    if next.light_state(lane) == LightState::Green {
                        self.lanes[lane.index()].wait_time = 0.0;
                    }
                }
                changed = Some(next);
            }
        }

        for lane in Lane::ALL {
            if self.phase.is_red(lane.axis()) {
                self.lanes[lane.index()].wait_time += self.attribs.wait_increment;
            }
        }

        changed
    }

    /// Determines whether a vehicle at `pos` with heading `angle` must stop for a red light.
    pub fn should_stop(&self, pos: Point2d, angle: f64) -> bool {
        if pos.distance(self.center) > self.attribs.stop_radius {
            return false;
        }

        // Approaching means the heading points towards the centre along the axis of travel
        let axis = Axis::from_heading(angle);
        let dir = heading_vector(angle);
        let to_center = self.center - pos;
        let approaching = match axis {
            Axis::NorthSouth => dir.y * to_center.y > 0.0,
            Axis::EastWest => dir.x * to_center.x > 0.0,
        };

        approaching && self.phase.is_red(axis)
    }

    /// Builds the policy input: the normalised count, speed
    /// and wait time of each lane in [Lane] order.
    fn policy_input(&self) -> [f64; 12] {
        let mut input = [0.0; 12];
        for (chunk, stats) in input.chunks_exact_mut(3).zip(&self.lanes) {
            chunk[0] = stats.count as f64 / COUNT_NORMALIZATION;
            chunk[1] = stats.avg_speed;
            chunk[2] = stats.wait_time / WAIT_NORMALIZATION;
        }
        input
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::policy::{OutputActivation, SIGNAL_DIMS};
    use crate::VehicleId;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn controller(min_phase_duration: f64) -> SignalController {
        let attribs = ControllerAttributes {
            min_phase_duration,
            ..Default::default()
        };
        let policy = PolicyParams::zeroed(&SIGNAL_DIMS, OutputActivation::Softmax);
        SignalController::with_policy(&attribs, Point2d::new(500.0, 400.0), 30.0, policy).unwrap()
    }

    fn snapshot(x: f64, y: f64, angle: f64, speed: f64) -> VehicleSnapshot {
        VehicleSnapshot {
            id: VehicleId::default(),
            pos: Point2d::new(x, y),
            angle,
            speed,
            width: 10.0,
        }
    }

    #[test]
    fn empty_lanes_are_free_flowing() {
        let mut ctrl = controller(5.0);
        ctrl.refresh_stats(std::iter::empty(), 5.0);
        for lane in Lane::ALL {
            assert_eq!(ctrl.lane_stats(lane).count, 0);
            assert_eq!(ctrl.lane_stats(lane).avg_speed, 1.0);
        }
    }

    #[test]
    fn classifies_vehicles_into_lanes() {
        let mut ctrl = controller(5.0);
        let vehicles = [
            snapshot(485.0, 300.0, 90.0, 5.0),  // north, heading south
            snapshot(515.0, 450.0, 270.0, 2.5), // south, heading north
            snapshot(515.0, 470.0, -90.0, 0.5), // south
            snapshot(600.0, 415.0, 180.0, 1.0), // east, heading west
            snapshot(350.0, 385.0, 0.0, 4.0),   // west, heading east
            snapshot(100.0, 385.0, 0.0, 4.0),   // too far away
        ];
        ctrl.refresh_stats(&vehicles, 5.0);

        let counts = Lane::ALL.map(|lane| ctrl.lane_stats(lane).count);
        assert_eq!(counts, [1, 2, 1, 1]);
        assert_approx_eq!(ctrl.lane_stats(Lane::North).avg_speed, 1.0);
        assert_approx_eq!(ctrl.lane_stats(Lane::South).avg_speed, 0.3);
        assert_approx_eq!(ctrl.lane_stats(Lane::East).avg_speed, 0.2);
        assert_approx_eq!(ctrl.lane_stats(Lane::West).avg_speed, 0.8);

        ctrl.refresh_stats(std::iter::empty(), 5.0);
        assert_eq!(ctrl.lane_stats(Lane::South).count, 0);
        assert_eq!(ctrl.lane_stats(Lane::South).avg_speed, 1.0);
    }

    #[test]
    fn red_lanes_accrue_wait_time() {
        let mut ctrl = controller(1000.0);
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..10 {
            assert_eq!(ctrl.update(0.0, &mut rng), None);
        }
        assert_eq!(ctrl.lane_stats(Lane::North).wait_time, 0.0);
        assert_eq!(ctrl.lane_stats(Lane::South).wait_time, 0.0);
        assert_approx_eq!(ctrl.lane_stats(Lane::East).wait_time, 1.0);
        assert_approx_eq!(ctrl.lane_stats(Lane::West).wait_time, 1.0);
    }

    #[test]
    fn green_lanes_reset_wait_time_on_switch() {
        let mut ctrl = controller(0.0);
        ctrl.phase = Phase::NorthSouthLeft;
        for lane in &mut ctrl.lanes {
            lane.wait_time = 4.0;
        }
        let mut rng = StdRng::seed_from_u64(21);
        let mut now = 0.0;
        let changed = loop {
            if let Some(phase) = ctrl.update(now, &mut rng) {
                break phase;
            }
            now += 0.5;
        };

        for lane in Lane::ALL {
            let wait = ctrl.lane_stats(lane).wait_time;
            match changed.light_state(lane) {
                // Reset on the switch, then accrues nothing while green
                LightState::Green => assert_eq!(wait, 0.0),
                _ => assert!(wait > 4.0),
            }
        }
        assert_eq!(ctrl.last_change(), now);
    }

    #[test]
    fn phase_changes_are_rate_limited() {
        let mut ctrl = controller(5.0);
        let mut rng = StdRng::seed_from_u64(1234);
        let mut changes = vec![];
        for frame in 0..400 {
            let now = frame as f64 * 0.25;
            if ctrl.update(now, &mut rng).is_some() {
                changes.push(now);
            }
        }

        assert!(!changes.is_empty());
        assert!(changes[0] >= 5.0);
        for pair in changes.windows(2) {
            assert!(pair[1] - pair[0] >= 5.0);
        }
    }

    #[test]
    fn stop_query_respects_phase_and_direction() {
        let mut ctrl = controller(5.0);

        // Heading east from the west, approaching
        let west = Point2d::new(450.0, 385.0);
        ctrl.phase = Phase::NorthSouthGreen;
        assert!(ctrl.should_stop(west, 0.0));
        assert!(ctrl.should_stop(west, 360.0));
        ctrl.phase = Phase::EastWestGreen;
        assert!(!ctrl.should_stop(west, 0.0));

        // Heading south from the north, approaching
        let north = Point2d::new(485.0, 330.0);
        assert!(ctrl.should_stop(north, 90.0));
        assert!(ctrl.should_stop(north, -270.0));
        ctrl.phase = Phase::NorthSouthGreen;
        assert!(!ctrl.should_stop(north, 90.0));

        // Left turn phases stop everyone
        for phase in [Phase::NorthSouthLeft, Phase::EastWestLeft] {
            ctrl.phase = phase;
            assert!(ctrl.should_stop(west, 0.0));
            assert!(ctrl.should_stop(north, 90.0));
        }

        // Leaving the intersection
        ctrl.phase = Phase::NorthSouthGreen;
        assert!(!ctrl.should_stop(Point2d::new(550.0, 400.0), 0.0));

        // Far away
        assert!(!ctrl.should_stop(Point2d::new(100.0, 385.0), 0.0));
    }

    #[test]
    fn stop_query_releases_vehicles_past_the_centre() {
        let mut ctrl = controller(5.0);

        // East-west lanes are offset from the centre line
        ctrl.phase = Phase::NorthSouthGreen;
        assert!(ctrl.should_stop(Point2d::new(450.0, 385.0), 0.0));
        assert!(!ctrl.should_stop(Point2d::new(550.0, 385.0), 0.0));
        assert!(!ctrl.should_stop(Point2d::new(550.0, 385.0), 5.0));
        assert!(ctrl.should_stop(Point2d::new(550.0, 415.0), 180.0));
        assert!(!ctrl.should_stop(Point2d::new(450.0, 415.0), 180.0));
        assert!(!ctrl.should_stop(Point2d::new(450.0, 415.0), -180.0));

        // Likewise the north-south lanes
        ctrl.phase = Phase::EastWestGreen;
        assert!(ctrl.should_stop(Point2d::new(485.0, 350.0), 90.0));
        assert!(!ctrl.should_stop(Point2d::new(485.0, 450.0), 90.0));
        assert!(ctrl.should_stop(Point2d::new(515.0, 450.0), 270.0));
        assert!(!ctrl.should_stop(Point2d::new(515.0, 350.0), 270.0));
        assert!(!ctrl.should_stop(Point2d::new(515.0, 350.0), -90.0));
    }

    #[test]
    fn stop_query_is_pure() {
        let ctrl = controller(5.0);
        let pos = Point2d::new(460.0, 385.0);
        assert_eq!(ctrl.should_stop(pos, 3.0), ctrl.should_stop(pos, 3.0));
    }

    #[test]
    fn light_posts() {
        let mut ctrl = controller(5.0);
        let positions = ctrl.signal_positions().collect::<Vec<_>>();
        assert_eq!(positions[0], Point2d::new(520.0, 370.0));
        assert_eq!(positions[3], Point2d::new(470.0, 420.0));

        let states = ctrl.iter_lights().map(|(_, s)| s).collect::<Vec<_>>();
        use LightState::*;
        assert_eq!(states, [Green, Green, Red, Red]);

        ctrl.phase = Phase::EastWestGreen;
        let states = ctrl.iter_lights().map(|(_, s)| s).collect::<Vec<_>>();
        assert_eq!(states, [Red, Red, Green, Green]);

        ctrl.phase = Phase::EastWestLeft;
        assert!(ctrl.iter_lights().all(|(_, s)| s == Amber));
    }

    #[test]
    fn rejects_mismatched_policy() {
        let policy = PolicyParams::zeroed(&[8, 4, 2], OutputActivation::Softmax);
        let result = SignalController::with_policy(
            &ControllerAttributes::default(),
            Point2d::new(0.0, 0.0),
            30.0,
            policy,
        );
        assert!(result.is_err());
    }
}
