//! Chooses a fusion algorithm from how well the measurements agree.
//!
//! Consistency is the largest pairwise squared Mahalanobis distance
//! `(x_i - x_j)ᵀ (P_i + P_j)⁻¹ (x_i - x_j)`, which is chi-square with six
//! degrees of freedom when both sensors see the same object.

use crate::fusion::dempster::DempsterShaferFuser;
use crate::fusion::kalman::KalmanFuser;
use crate::fusion::measurement::{require_measurements, FusedTrack, SensorMeasurement};
use crate::fusion::particle::ParticleFuser;
use crate::fusion::{Fuser, FusionConfig, FusionMethod};
use crate::math::matrix::MatrixHelper;
use crate::prelude::{RadarError, RadarResult};
use crate::telemetry::log::LogManager;

/// χ²(6) 95% quantile: at or below this the set is treated as consistent.
pub const KALMAN_GATE: f64 = 12.592;
/// χ²(6) 99.9% quantile: above this the sensors are taken to disagree.
pub const PARTICLE_GATE: f64 = 22.458;

#[derive(Debug, Clone)]
pub struct AdaptiveFuser {
    kalman: KalmanFuser,
    particle: ParticleFuser,
    dempster: DempsterShaferFuser,
    logger: LogManager,
}

impl AdaptiveFuser {
    pub fn new(particle: ParticleFuser, dempster: DempsterShaferFuser) -> Self {
        Self {
            kalman: KalmanFuser,
            particle,
            dempster,
            logger: LogManager::new("adaptive"),
        }
    }

    pub fn from_config(config: &FusionConfig) -> RadarResult<Self> {
        Ok(Self::new(
            ParticleFuser::from_config(config)?,
            DempsterShaferFuser::from_config(config)?,
        ))
    }

    /// Maximum pairwise squared Mahalanobis distance (zero for one measurement).
    pub fn inconsistency(measurements: &[SensorMeasurement]) -> RadarResult<f64> {
        let mut worst: f64 = 0.0;
        for (i, a) in measurements.iter().enumerate() {
            for b in &measurements[i + 1..] {
                let residual = a.state() - b.state();
                let d2 = MatrixHelper::mahalanobis_squared(
                    &residual,
                    &(a.uncertainty + b.uncertainty),
                )?;
                worst = worst.max(d2);
            }
        }
        Ok(worst)
    }

    /// Method the policy picks for a given inconsistency score.
    pub fn select(inconsistency: f64) -> FusionMethod {
        if inconsistency <= KALMAN_GATE {
            FusionMethod::Kalman
        } else if inconsistency <= PARTICLE_GATE {
            FusionMethod::ParticleFilter
        } else {
            FusionMethod::DempsterShafer
        }
    }
}

impl Fuser for AdaptiveFuser {
    fn method(&self) -> FusionMethod {
        FusionMethod::Adaptive
    }

    fn fuse(&self, measurements: &[SensorMeasurement]) -> RadarResult<FusedTrack> {
        require_measurements(measurements)?;
        let score = Self::inconsistency(measurements)?;
        let choice = Self::select(score);
        self.logger.record(&format!(
            "inconsistency {:.3} over {} measurements -> {:?}",
            score,
            measurements.len(),
            choice
        ));

        let result = match choice {
            FusionMethod::Kalman => self.kalman.fuse(measurements),
            FusionMethod::ParticleFilter => match self.particle.fuse(measurements) {
                Err(RadarError::DegenerateParticleSet(reason)) => {
                    self.logger.warn(&format!(
                        "particle set degenerate ({}), falling back to Dempster-Shafer",
                        reason
                    ));
                    self.dempster.fuse(measurements)
                }
                other => other,
            },
            _ => self.dempster.fuse(measurements),
        };
        let mut track = result?;
        track.selected_by = Some(FusionMethod::Adaptive);
        Ok(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::measurement::test_support::measurement;

    fn fuser() -> AdaptiveFuser {
        AdaptiveFuser::from_config(&FusionConfig::default()).unwrap()
    }

    #[test]
    fn policy_thresholds_are_ordered() {
        assert_eq!(AdaptiveFuser::select(0.0), FusionMethod::Kalman);
        assert_eq!(AdaptiveFuser::select(KALMAN_GATE), FusionMethod::Kalman);
        assert_eq!(AdaptiveFuser::select(15.0), FusionMethod::ParticleFilter);
        assert_eq!(AdaptiveFuser::select(PARTICLE_GATE + 1.0), FusionMethod::DempsterShafer);
    }

    #[test]
    fn consistent_set_uses_kalman() {
        let a = measurement("radar", [0.0; 3], [0.0; 3], 4.0, 0.9);
        let b = measurement("ir", [1.0, 0.0, 0.0], [0.0; 3], 4.0, 0.8);
        let track = fuser().fuse(&[a, b]).unwrap();
        assert_eq!(track.method, FusionMethod::Kalman);
        assert_eq!(track.selected_by, Some(FusionMethod::Adaptive));
    }

    #[test]
    fn moderate_disagreement_uses_particles() {
        // d² = 16² / (2·8) = 16
        let a = measurement("radar", [0.0; 3], [0.0; 3], 8.0, 0.9);
        let b = measurement("ir", [16.0, 0.0, 0.0], [0.0; 3], 8.0, 0.8);
        assert!((AdaptiveFuser::inconsistency(&[a.clone(), b.clone()]).unwrap() - 16.0).abs() < 1e-9);
        let track = fuser().fuse(&[a, b]).unwrap();
        assert_eq!(track.method, FusionMethod::ParticleFilter);
    }

    #[test]
    fn gross_disagreement_uses_evidence() {
        let a = measurement("radar", [0.0; 3], [0.0; 3], 1.0, 0.9);
        let b = measurement("ir", [500.0, 0.0, 0.0], [0.0; 3], 1.0, 0.4);
        let track = fuser().fuse(&[a, b]).unwrap();
        assert_eq!(track.method, FusionMethod::DempsterShafer);
        assert!(track.evidence.is_some());
    }
}
