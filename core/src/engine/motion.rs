//! Kinematic propagation. Every model is a pure map `(state, dt) -> state`.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::physics::constants::STANDARD_GRAVITY;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KinematicState {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

impl KinematicState {
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        Self { position, velocity }
    }
}

/// Externally supplied manoeuvre.
pub type ManeuverFn = dyn Fn(&KinematicState, f64) -> KinematicState + Send + Sync;

#[derive(Clone, Default)]
pub enum MotionModel {
    #[default]
    ConstantVelocity,
    ConstantAcceleration { acceleration: Vector3<f64> },
    Maneuver(Arc<ManeuverFn>),
}

impl fmt::Debug for MotionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionModel::ConstantVelocity => f.write_str("ConstantVelocity"),
            MotionModel::ConstantAcceleration { acceleration } => f
                .debug_struct("ConstantAcceleration")
                .field("acceleration", acceleration)
                .finish(),
            MotionModel::Maneuver(_) => f.write_str("Maneuver(..)"),
        }
    }
}

impl MotionModel {
    pub fn maneuver<F>(profile: F) -> Self
    where
        F: Fn(&KinematicState, f64) -> KinematicState + Send + Sync + 'static,
    {
        MotionModel::Maneuver(Arc::new(profile))
    }

    /// Level turn at `turn_rate` rad/s about the vertical axis, speed preserved.
    pub fn coordinated_turn(turn_rate: f64) -> Self {
        Self::maneuver(move |state, dt| {
            let heading = state.velocity.y.atan2(state.velocity.x);
            let ground_speed = state.velocity.xy().norm();
            let next_heading = heading + turn_rate * dt;
            // arc-average heading keeps the position on the turn circle
            let mid_heading = heading + 0.5 * turn_rate * dt;
            let velocity = Vector3::new(
                ground_speed * next_heading.cos(),
                ground_speed * next_heading.sin(),
                state.velocity.z,
            );
            let displacement = Vector3::new(
                ground_speed * mid_heading.cos() * dt,
                ground_speed * mid_heading.sin() * dt,
                state.velocity.z * dt,
            );
            KinematicState::new(state.position + displacement, velocity)
        })
    }

    pub fn propagate(&self, state: &KinematicState, dt: f64) -> KinematicState {
        match self {
            MotionModel::ConstantVelocity => {
                KinematicState::new(state.position + state.velocity * dt, state.velocity)
            }
            MotionModel::ConstantAcceleration { acceleration } => KinematicState::new(
                state.position + state.velocity * dt + acceleration * (0.5 * dt * dt),
                state.velocity + acceleration * dt,
            ),
            MotionModel::Maneuver(profile) => profile(state, dt),
        }
    }
}

/// Serializable motion request for scenario files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MotionSpec {
    #[default]
    ConstantVelocity,
    ConstantAcceleration { acceleration: [f64; 3] },
    CoordinatedTurn { turn_rate: f64 },
}

impl MotionSpec {
    pub fn to_model(&self) -> MotionModel {
        match self {
            MotionSpec::ConstantVelocity => MotionModel::ConstantVelocity,
            MotionSpec::ConstantAcceleration { acceleration } => MotionModel::ConstantAcceleration {
                acceleration: Vector3::from(*acceleration),
            },
            MotionSpec::CoordinatedTurn { turn_rate } => MotionModel::coordinated_turn(*turn_rate),
        }
    }
}

/// Guided interceptor dynamics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissileDynamics {
    /// Thrust acceleration along the velocity vector while boosting (m/s²).
    pub thrust_acceleration: f64,
    pub burn_time: f64,
    /// Proportional-navigation gain.
    pub navigation_constant: f64,
    /// Lateral acceleration limit (m/s²).
    pub max_lateral_acceleration: f64,
}

impl Default for MissileDynamics {
    fn default() -> Self {
        Self {
            thrust_acceleration: 200.0,
            burn_time: 3.0,
            navigation_constant: 4.0,
            max_lateral_acceleration: 300.0,
        }
    }
}

impl MissileDynamics {
    /// Acceleration at flight time `elapsed`: boost along the velocity, gravity,
    /// and pure proportional navigation `N · Ω × v` towards `target` when known.
    pub fn acceleration(
        &self,
        missile: &KinematicState,
        target: Option<&KinematicState>,
        elapsed: f64,
    ) -> Vector3<f64> {
        let mut acceleration = Vector3::new(0.0, 0.0, -STANDARD_GRAVITY);
        let speed = missile.velocity.norm();

        if elapsed < self.burn_time {
            let heading = if speed > f64::EPSILON {
                missile.velocity / speed
            } else {
                Vector3::z()
            };
            acceleration += heading * self.thrust_acceleration;
        }

        if let Some(target) = target {
            let los = target.position - missile.position;
            let range_sq = los.norm_squared();
            if range_sq > f64::EPSILON {
                let relative_velocity = target.velocity - missile.velocity;
                let los_rate = los.cross(&relative_velocity) / range_sq;
                let mut lateral = los_rate.cross(&missile.velocity) * self.navigation_constant;
                let magnitude = lateral.norm();
                if magnitude > self.max_lateral_acceleration {
                    lateral *= self.max_lateral_acceleration / magnitude;
                }
                acceleration += lateral;
            }
        }
        acceleration
    }

    /// Semi-implicit Euler step.
    pub fn step(
        &self,
        missile: &KinematicState,
        target: Option<&KinematicState>,
        elapsed: f64,
        dt: f64,
    ) -> KinematicState {
        let acceleration = self.acceleration(missile, target, elapsed);
        let velocity = missile.velocity + acceleration * dt;
        KinematicState::new(missile.position + velocity * dt, velocity)
    }
}

/// Smallest separation between two points moving linearly from `a0`/`b0` to
/// `a1`/`b1` over one step.
pub fn closest_approach(
    a0: &Vector3<f64>,
    a1: &Vector3<f64>,
    b0: &Vector3<f64>,
    b1: &Vector3<f64>,
) -> f64 {
    let start = a0 - b0;
    let drift = (a1 - b1) - start;
    let drift_sq = drift.norm_squared();
    let s = if drift_sq > f64::EPSILON {
        (-start.dot(&drift) / drift_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (start + drift * s).norm()
}
