use crate::config::{ConfigError, SimConfig};
#[cfg(feature = "debug")]
use crate::debug::take_debug_frame;
use crate::geometry::{CrossroadLayout, Pose, RoadGeometry};
use crate::light::{Phase, SignalController};
use crate::math::Point2d;
use crate::policy::{driving_policy, OutputActivation, PolicyParams, DRIVING_DIMS};
use crate::vehicle::{UpdateContext, Vehicle, VehicleOutcome, VehicleSnapshot};
use crate::{VehicleId, VehicleSet};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Vehicles without a random route start and finish this far from the edges of the world.
const DEFAULT_ROUTE_MARGIN: f64 = 50.0;

/// A traffic simulation of a single signalised intersection.
///
/// All randomness (vehicle policies, routes, colours and the signal
/// controller's phase choices) is drawn from the injected `R`.
pub struct Simulation<G = CrossroadLayout, R = StdRng> {
    /// The simulation parameters.
    config: SimConfig,
    /// The road layout.
    geometry: G,
    /// The controller of the traffic lights.
    controller: SignalController,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// The source of all randomness in the simulation.
    rng: R,
    /// The current frame of simulation.
    frame: usize,
    /// Debugging information from the previously simulated frame.
    #[cfg(feature = "debug")]
    debug: serde_json::Value,
}

/// What happened during a single tick.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepEvents {
    /// The vehicles that crashed.
    pub crashed: SmallVec<[VehicleId; 4]>,
    /// The vehicles that reached their destination.
    pub arrived: SmallVec<[VehicleId; 4]>,
    /// The phase the signal controller switched to, if it switched.
    pub phase_change: Option<Phase>,
}

impl Simulation<CrossroadLayout> {
    /// Creates a simulation of the crossroad described by `config`,
    /// with randomness seeded by `seed`.
    pub fn new(config: SimConfig, seed: u64) -> Result<Self, ConfigError> {
        let geometry = CrossroadLayout::new(config.width, config.height, config.road_width)?;
        Self::with_geometry(config, geometry, seed)
    }
}

impl<G: RoadGeometry> Simulation<G> {
    /// Creates a simulation on a custom road layout, with randomness seeded by `seed`.
    pub fn with_geometry(config: SimConfig, geometry: G, seed: u64) -> Result<Self, ConfigError> {
        Self::with_rng(config, geometry, StdRng::seed_from_u64(seed))
    }
}

impl<G: RoadGeometry, R: Rng> Simulation<G, R> {
    /// Creates a simulation which draws its randomness from `rng`.
    pub fn with_rng(config: SimConfig, geometry: G, mut rng: R) -> Result<Self, ConfigError> {
        config.validate()?;
        let controller = SignalController::new(
            &config.controller,
            geometry.intersection_center(),
            geometry.lane_half_width(),
            &mut rng,
        )?;
        Ok(Self {
            config,
            geometry,
            controller,
            vehicles: VehicleSet::default(),
            rng,
            frame: 0,
            #[cfg(feature = "debug")]
            debug: serde_json::Value::Null,
        })
    }

    /// Replaces the signal controller's policy. The controller restarts in its initial phase.
    pub fn set_signal_policy(&mut self, policy: PolicyParams) -> Result<(), ConfigError> {
        self.controller = SignalController::with_policy(
            &self.config.controller,
            self.geometry.intersection_center(),
            self.geometry.lane_half_width(),
            policy,
        )?;
        Ok(())
    }

    /// Adds a vehicle with a randomly initialised policy and colour.
    ///
    /// # Parameters
    /// * `random_init` - If true, the vehicle starts at a random entry point
    ///   and heads for a random exit point. Otherwise it drives along the
    ///   centre line of the world from left to right.
    pub fn spawn_vehicle(&mut self, random_init: bool) -> VehicleId {
        let (pose, destination) = if random_init {
            self.random_route()
        } else {
            self.default_route()
        };
        let policy = driving_policy(&mut self.rng);
        let color = self.random_color();
        self.insert_vehicle(pose, destination, policy, color)
    }

    /// Adds a vehicle driven by the given policy.
    pub fn add_vehicle(
        &mut self,
        pose: Pose,
        destination: Point2d,
        policy: PolicyParams,
    ) -> Result<VehicleId, ConfigError> {
        if policy.input_size() != DRIVING_DIMS[0]
            || policy.output_size() != 2
            || policy.output_activation() != OutputActivation::Tanh
        {
            return Err(ConfigError::InvalidConfig(
                "driving policy must map 8 inputs to 2 bounded controls",
            ));
        }
        let color = self.random_color();
        Ok(self.insert_vehicle(pose, destination, policy, color))
    }

    /// Removes a vehicle from the simulation.
    pub fn remove_vehicle(&mut self, id: VehicleId) -> Option<Vehicle> {
        self.vehicles.remove(id)
    }

    /// Removes every vehicle that has reached its destination.
    /// Crashed vehicles are left where they are.
    ///
    /// # Returns
    /// The number of vehicles removed.
    pub fn remove_arrived_vehicles(&mut self) -> usize {
        let before = self.vehicles.len();
        self.vehicles.retain(|_, vehicle| !vehicle.has_arrived());
        before - self.vehicles.len()
    }

    /// Spawns the initial batch of randomly routed vehicles.
    pub fn populate(&mut self) {
        for _ in 0..self.config.spawn.initial_vehicles {
            self.spawn_vehicle(true);
        }
        log::info!("Populated simulation with {} vehicles", self.vehicles.len());
    }

    /// Removes every vehicle and spawns a fresh initial batch.
    /// The simulation clock and the signal controller carry on.
    pub fn reset(&mut self) {
        self.vehicles.clear();
        log::info!("Resetting simulation at frame {}", self.frame);
        self.populate();
    }

    /// Runs one frame of the spawn schedule: removes the vehicles that arrived
    /// during the previous tick, spawns a vehicle when one is due, then steps.
    pub fn run_frame(&mut self) -> StepEvents {
        self.remove_arrived_vehicles();

        let schedule = self.config.spawn;
        let due = schedule.spawn_interval > 0 && (self.frame + 1) % schedule.spawn_interval == 0;
        if due && self.vehicles.len() < schedule.max_vehicles {
            self.spawn_vehicle(true);
        }

        self.step()
    }

    /// Advances the simulation by one tick.
    ///
    /// The signal controller decides its phase from the state of the vehicles
    /// at the start of the tick, then every vehicle updates against that same
    /// state. Arrived vehicles are kept until [remove_arrived_vehicles](Self::remove_arrived_vehicles) is called.
    pub fn step(&mut self) -> StepEvents {
        let mut events = StepEvents::default();
        let now = self.time();
        let snapshot = self
            .vehicles
            .values()
            .map(Vehicle::snapshot)
            .collect::<Vec<VehicleSnapshot>>();

        self.controller
            .refresh_stats(&snapshot, self.config.vehicle.max_speed);
        events.phase_change = self.controller.update(now, &mut self.rng);

        let ctx = UpdateContext {
            others: &snapshot,
            geometry: &self.geometry,
            controller: &self.controller,
        };
        for (vehicle_id, vehicle) in &mut self.vehicles {
            match vehicle.update(&ctx) {
                Some(VehicleOutcome::Crashed) => events.crashed.push(vehicle_id),
                Some(VehicleOutcome::Arrived) => events.arrived.push(vehicle_id),
                None => {}
            }
        }

        #[cfg(feature = "debug")]
        {
            self.debug = take_debug_frame(self.frame);
        }

        self.frame += 1;

        events
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Gets the current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.frame as f64 * self.config.dt
    }

    /// The simulation parameters.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The road layout.
    pub fn geometry(&self) -> &G {
        &self.geometry
    }

    /// The controller of the traffic lights.
    pub fn controller(&self) -> &SignalController {
        &self.controller
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets a reference to the vehicle with the given ID.
    pub fn get_vehicle(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(vehicle_id)
    }

    /// Gets the debugging information for the previously simulated frame,
    /// as a JSON object holding the frame index and its records.
    #[cfg(feature = "debug")]
    pub fn debug(&mut self) -> serde_json::Value {
        self.debug.clone()
    }

    fn insert_vehicle(
        &mut self,
        pose: Pose,
        destination: Point2d,
        policy: PolicyParams,
        color: [u8; 3],
    ) -> VehicleId {
        let attribs = &self.config.vehicle;
        self.vehicles
            .insert_with_key(|id| Vehicle::new(id, attribs, pose, destination, policy, color))
    }

    /// A random entry point and a random exit point.
    fn random_route(&mut self) -> (Pose, Point2d) {
        let entry = self.geometry.entry_points().choose(&mut self.rng).copied();
        let exit = self.geometry.exit_points().choose(&mut self.rng).copied();
        match (entry, exit) {
            (Some(entry), Some(exit)) => (entry, exit),
            _ => self.default_route(),
        }
    }

    /// Along the horizontal centre line, from left to right.
    fn default_route(&self) -> (Pose, Point2d) {
        let y = 0.5 * self.config.height;
        let pose = Pose {
            pos: Point2d::new(DEFAULT_ROUTE_MARGIN, y),
            angle: 0.0,
        };
        let destination = Point2d::new(self.config.width - DEFAULT_ROUTE_MARGIN, y);
        (pose, destination)
    }

    fn random_color(&mut self) -> [u8; 3] {
        std::array::from_fn(|_| self.rng.gen_range(100..=255))
    }
}
