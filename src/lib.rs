pub use cgmath;
pub use config::{ConfigError, ControllerAttributes, SimConfig, SpawnSchedule, VehicleAttributes};
pub use geometry::{CrossroadLayout, Pose, RoadGeometry};
pub use light::{Axis, Lane, LaneStats, LightState, Phase, SignalController, SignalLight};
pub use policy::{driving_policy, infer, signal_policy, OutputActivation, PolicyParams};
pub use simulation::{Simulation, StepEvents};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use util::Interval;
pub use vehicle::dynamics::MIN_SPEED;
pub use vehicle::{Vehicle, VehicleOutcome, VehicleSnapshot};

mod config;
mod debug;
mod geometry;
mod light;
pub mod math;
pub mod policy;
mod simulation;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;
