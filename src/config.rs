//! Tunable parameters of the simulation and their validation.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use crate::vehicle::dynamics::MIN_SPEED;
use thiserror::Error;

/// Errors raised when a configuration would make the simulation degenerate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The configuration document could not be parsed.
    #[cfg(feature = "serde")]
    #[error("malformed configuration: {0}")]
    Malformed(String),
}

/// The attributes shared by every simulated vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct VehicleAttributes {
    /// The vehicle width in world units.
    pub width: f64,
    /// The vehicle length in world units.
    pub length: f64,
    /// The top forward speed, in world units per tick.
    /// Reversing is limited to half of this.
    pub max_speed: f64,
    /// The reach of the range sensors in world units.
    pub sensor_range: f64,
    /// A vehicle arrives once it is closer than this to its destination.
    pub arrival_radius: f64,
    /// How often, in ticks, the stuck detector samples the vehicle's position.
    pub position_check_interval: u32,
    /// The number of ticks a vehicle may remain stuck before being kicked forward.
    pub max_stuck_time: u32,
}

/// The attributes of the traffic signal controller.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct ControllerAttributes {
    /// The minimum time a phase is held before it may change, in seconds.
    pub min_phase_duration: f64,
    /// Vehicles within this distance of the centre contribute to lane statistics.
    pub stats_radius: f64,
    /// Vehicles within this distance of the centre must obey the lights.
    pub stop_radius: f64,
    /// The wait time, in seconds, accrued by a red lane each tick.
    pub wait_increment: f64,
}

/// Controls how the simulation is populated with random vehicles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct SpawnSchedule {
    /// The number of vehicles spawned by [populate](crate::Simulation::populate).
    pub initial_vehicles: usize,
    /// A vehicle is spawned every this many frames; 0 disables spawning.
    pub spawn_interval: usize,
    /// Spawning pauses while at least this many vehicles are active.
    pub max_vehicles: usize,
}

/// Static configuration for a simulation.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct SimConfig {
    /// The width of the world in world units.
    pub width: f64,
    /// The height of the world in world units.
    pub height: f64,
    /// The width of each road in world units.
    pub road_width: f64,
    /// The simulated duration of one tick, in seconds.
    pub dt: f64,
    pub vehicle: VehicleAttributes,
    pub controller: ControllerAttributes,
    pub spawn: SpawnSchedule,
}

impl Default for VehicleAttributes {
    fn default() -> Self {
        Self {
            width: 10.0,
            length: 20.0,
            max_speed: 5.0,
            sensor_range: 150.0,
            arrival_radius: 30.0,
            position_check_interval: 30,
            max_stuck_time: 120,
        }
    }
}

impl Default for ControllerAttributes {
    fn default() -> Self {
        Self {
            min_phase_duration: 5.0,
            stats_radius: 200.0,
            stop_radius: 100.0,
            wait_increment: 0.1,
        }
    }
}

impl Default for SpawnSchedule {
    fn default() -> Self {
        Self {
            initial_vehicles: 5,
            spawn_interval: 300,
            max_vehicles: 15,
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: 1000.0,
            height: 800.0,
            road_width: 60.0,
            dt: 1.0 / 60.0,
            vehicle: Default::default(),
            controller: Default::default(),
            spawn: Default::default(),
        }
    }
}

/// Checks that a value is finite and strictly positive.
fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Checks that a value is finite and not negative.
fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

impl VehicleAttributes {
    /// Validates the vehicle attributes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !positive(self.max_speed) {
            return Err(ConfigError::InvalidConfig("max_speed must be positive"));
        }
        // Reversing is capped at half the top speed, which must still clear the minimum speed
        if self.max_speed < 2.0 * MIN_SPEED {
            return Err(ConfigError::InvalidConfig(
                "max_speed must be at least twice the minimum speed",
            ));
        }
        if !positive(self.sensor_range) {
            return Err(ConfigError::InvalidConfig("sensor_range must be positive"));
        }
        if !positive(self.width) || !positive(self.length) {
            return Err(ConfigError::InvalidConfig(
                "vehicle dimensions must be positive",
            ));
        }
        if !positive(self.arrival_radius) {
            return Err(ConfigError::InvalidConfig(
                "arrival_radius must be positive",
            ));
        }
        if self.position_check_interval == 0 {
            return Err(ConfigError::InvalidConfig(
                "position_check_interval must be non-zero",
            ));
        }
        Ok(())
    }
}

impl ControllerAttributes {
    /// Validates the controller attributes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !non_negative(self.min_phase_duration) {
            return Err(ConfigError::InvalidConfig(
                "min_phase_duration must be non-negative",
            ));
        }
        if !positive(self.stats_radius) || !positive(self.stop_radius) {
            return Err(ConfigError::InvalidConfig(
                "controller radii must be positive",
            ));
        }
        if !non_negative(self.wait_increment) {
            return Err(ConfigError::InvalidConfig(
                "wait_increment must be non-negative",
            ));
        }
        Ok(())
    }
}

impl SimConfig {
    /// Validates the whole configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !positive(self.dt) {
            return Err(ConfigError::InvalidConfig("dt must be positive"));
        }
        self.vehicle.validate()?;
        self.controller.validate()
    }

    /// Parses a configuration from a JSON document, filling in missing
    /// fields with their defaults, and validates it.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Malformed(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
