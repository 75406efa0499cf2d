use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::engine::motion::{KinematicState, MissileDynamics, MotionModel};
use crate::interface::detection::{Detection, TargetId};
use crate::physics::rcs::{RcsFluctuation, SwerlingCase, TargetType};
use crate::prelude::{require_positive, RadarError, RadarResult};

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct Target {
    pub id: TargetId,
    pub kinematics: KinematicState,
    pub target_type: TargetType,
    pub motion: MotionModel,
    pub rcs: RcsFluctuation,
}

#[derive(Debug, Clone)]
pub struct Missile {
    pub id: TargetId,
    pub kinematics: KinematicState,
    pub rcs: RcsFluctuation,
    pub dynamics: MissileDynamics,
    /// Flight time so far (s).
    pub elapsed: f64,
    pub guidance: Option<TargetId>,
}

/// Request to place a target.
#[derive(Debug, Clone)]
pub struct TargetSpec {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub mean_rcs: f64,
    pub swerling: SwerlingCase,
    pub target_type: TargetType,
    pub motion: MotionModel,
}

impl TargetSpec {
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>, mean_rcs: f64) -> Self {
        Self {
            position,
            velocity,
            mean_rcs,
            swerling: SwerlingCase::Zero,
            target_type: TargetType::Aircraft,
            motion: MotionModel::ConstantVelocity,
        }
    }

    pub fn with_swerling(mut self, swerling: SwerlingCase) -> Self {
        self.swerling = swerling;
        self
    }

    pub fn with_type(mut self, target_type: TargetType) -> Self {
        self.target_type = target_type;
        self
    }

    pub fn with_motion(mut self, motion: MotionModel) -> Self {
        self.motion = motion;
        self
    }

    pub(crate) fn build(self, id: TargetId) -> RadarResult<Target> {
        check_vector("position", &self.position)?;
        check_vector("velocity", &self.velocity)?;
        Ok(Target {
            id,
            kinematics: KinematicState::new(self.position, self.velocity),
            target_type: self.target_type,
            motion: self.motion,
            rcs: RcsFluctuation::new(self.mean_rcs, self.swerling)?,
        })
    }
}

/// Request to launch a missile, optionally homing on `guidance`.
#[derive(Debug, Clone)]
pub struct MissileSpec {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub mean_rcs: f64,
    pub swerling: SwerlingCase,
    pub dynamics: MissileDynamics,
    pub guidance: Option<TargetId>,
}

impl MissileSpec {
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        Self {
            position,
            velocity,
            mean_rcs: 0.1,
            swerling: SwerlingCase::One,
            dynamics: MissileDynamics::default(),
            guidance: None,
        }
    }

    pub fn guided_at(mut self, target: TargetId) -> Self {
        self.guidance = Some(target);
        self
    }

    pub fn with_dynamics(mut self, dynamics: MissileDynamics) -> Self {
        self.dynamics = dynamics;
        self
    }

    pub(crate) fn build(self, id: TargetId) -> RadarResult<Missile> {
        check_vector("position", &self.position)?;
        check_vector("velocity", &self.velocity)?;
        let dynamics = &self.dynamics;
        for (name, value) in [
            ("burn_time", dynamics.burn_time),
            ("thrust_acceleration", dynamics.thrust_acceleration),
            ("max_lateral_acceleration", dynamics.max_lateral_acceleration),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RadarError::InvalidParameter(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }
        require_positive("navigation_constant", dynamics.navigation_constant)?;
        Ok(Missile {
            id,
            kinematics: KinematicState::new(self.position, self.velocity),
            rcs: RcsFluctuation::new(self.mean_rcs, self.swerling)?,
            dynamics: self.dynamics,
            elapsed: 0.0,
            guidance: self.guidance,
        })
    }
}

fn check_vector(name: &str, value: &Vector3<f64>) -> RadarResult<()> {
    if value.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(RadarError::InvalidParameter(format!("{} must be finite", name)))
    }
}

/// Everything the engine owns. Mutated only through engine operations.
#[derive(Debug, Clone, Default)]
pub struct SimulationState {
    pub timestamp: f64,
    pub tick: u64,
    pub targets: Vec<Target>,
    pub missiles: Vec<Missile>,
    /// Oldest first; bounded by the engine's history limit.
    pub detections: VecDeque<Detection>,
}

impl SimulationState {
    pub fn entity_count(&self) -> usize {
        self.targets.len() + self.missiles.len()
    }

    pub fn contains(&self, id: TargetId) -> bool {
        self.targets.iter().any(|t| t.id == id) || self.missiles.iter().any(|m| m.id == id)
    }

    pub fn kinematics_of(&self, id: TargetId) -> Option<&KinematicState> {
        self.targets
            .iter()
            .find(|t| t.id == id)
            .map(|t| &t.kinematics)
            .or_else(|| self.missiles.iter().find(|m| m.id == id).map(|m| &m.kinematics))
    }
}

/// Read-only view of one entity for displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: TargetId,
    pub target_type: TargetType,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub mean_rcs: f64,
    pub last_rcs: Option<f64>,
}

impl From<&Target> for EntitySnapshot {
    fn from(target: &Target) -> Self {
        Self {
            id: target.id,
            target_type: target.target_type,
            position: target.kinematics.position,
            velocity: target.kinematics.velocity,
            mean_rcs: target.rcs.mean_rcs,
            last_rcs: target.rcs.last_rcs(),
        }
    }
}

impl From<&Missile> for EntitySnapshot {
    fn from(missile: &Missile) -> Self {
        Self {
            id: missile.id,
            target_type: TargetType::Missile,
            position: missile.kinematics.position,
            velocity: missile.kinematics.velocity,
            mean_rcs: missile.rcs.mean_rcs,
            last_rcs: missile.rcs.last_rcs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub status: EngineStatus,
    pub timestamp: f64,
    pub tick: u64,
    pub targets: Vec<EntitySnapshot>,
    pub missiles: Vec<EntitySnapshot>,
    pub detections: Vec<Detection>,
}

impl SimulationSnapshot {
    pub fn capture(status: EngineStatus, state: &SimulationState, recent: usize) -> Self {
        let skip = state.detections.len().saturating_sub(recent);
        Self {
            status,
            timestamp: state.timestamp,
            tick: state.tick,
            targets: state.targets.iter().map(EntitySnapshot::from).collect(),
            missiles: state.missiles.iter().map(EntitySnapshot::from).collect(),
            detections: state.detections.iter().skip(skip).cloned().collect(),
        }
    }

    pub fn empty() -> Self {
        Self::capture(EngineStatus::Idle, &SimulationState::default(), 0)
    }
}
