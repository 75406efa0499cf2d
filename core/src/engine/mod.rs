//! Time-stepped simulation: kinematics, the per-entity radar chain, engine
//! lifecycle and the worker-thread host.

pub mod host;
pub mod motion;
pub mod sensor;
pub mod simulation;
pub mod state;

pub use host::{EngineHandle, EngineHost, HostConfig};
pub use motion::{KinematicState, MissileDynamics, MotionModel, MotionSpec};
pub use sensor::{Geometry, RadarSensor};
pub use simulation::{EngineConfig, SimulationEngine, TickSummary};
pub use state::{
    EngineStatus, EntitySnapshot, Missile, MissileSpec, SimulationSnapshot, SimulationState,
    Target, TargetSpec,
};
