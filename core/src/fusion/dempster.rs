//! Evidence-theoretic fusion. Masses over `{present, absent, unknown}` are
//! combined with Dempster's rule; the kinematic state is the mixture of the
//! measurements weighted by the mass each puts on `present`.

use nalgebra::{Matrix6, Vector6};

use crate::fusion::measurement::{require_measurements, FusedTrack, SensorMeasurement};
use crate::fusion::{Fuser, FusionConfig, FusionMethod};
use crate::math::matrix::MatrixHelper;
use crate::prelude::{RadarError, RadarResult};

/// Share of a sensor's doubt committed to `absent` when no explicit evidence
/// is attached.
pub const DEFAULT_ABSENT_PRIOR: f64 = 0.25;

#[derive(Debug, Clone, Copy)]
pub struct DempsterShaferFuser {
    absent_prior: f64,
}

impl Default for DempsterShaferFuser {
    fn default() -> Self {
        Self {
            absent_prior: DEFAULT_ABSENT_PRIOR,
        }
    }
}

impl DempsterShaferFuser {
    pub fn new(absent_prior: f64) -> RadarResult<Self> {
        if !(0.0..=1.0).contains(&absent_prior) {
            return Err(RadarError::InvalidParameter(format!(
                "absent prior must lie in [0, 1], got {}",
                absent_prior
            )));
        }
        Ok(Self { absent_prior })
    }

    pub fn from_config(config: &FusionConfig) -> RadarResult<Self> {
        Self::new(config.absent_prior)
    }

    pub fn absent_prior(&self) -> f64 {
        self.absent_prior
    }
}

impl Fuser for DempsterShaferFuser {
    fn method(&self) -> FusionMethod {
        FusionMethod::DempsterShafer
    }

    fn fuse(&self, measurements: &[SensorMeasurement]) -> RadarResult<FusedTrack> {
        require_measurements(measurements)?;

        let masses: Vec<_> = measurements
            .iter()
            .map(|m| m.mass(self.absent_prior))
            .collect();
        let mut combined = masses[0];
        for mass in &masses[1..] {
            combined = combined.combine(mass)?;
        }

        let total_present: f64 = masses.iter().map(|m| m.present).sum();
        let weights: Vec<f64> = if total_present > 0.0 {
            masses.iter().map(|m| m.present / total_present).collect()
        } else {
            vec![1.0 / masses.len() as f64; masses.len()]
        };

        let state = measurements
            .iter()
            .zip(&weights)
            .fold(Vector6::zeros(), |acc, (m, w)| acc + m.state() * *w);
        let mut mixture = Matrix6::zeros();
        for (measurement, weight) in measurements.iter().zip(&weights) {
            let spread = measurement.state() - state;
            mixture += (measurement.uncertainty + spread * spread.transpose()) * *weight;
        }
        let covariance = MatrixHelper::regularize(&mixture)?;

        let mut track = FusedTrack::from_measurements(
            measurements,
            state,
            covariance,
            combined.present,
            FusionMethod::DempsterShafer,
        );
        track.evidence = Some(combined);
        Ok(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::measurement::test_support::measurement;
    use crate::fusion::measurement::MassAssignment;
    use approx::assert_relative_eq;

    #[test]
    fn presence_mass_weights_the_state() {
        let strong = measurement("radar", [0.0; 3], [0.0; 3], 1.0, 0.9);
        let weak = measurement("ir", [10.0, 0.0, 0.0], [0.0; 3], 1.0, 0.1);
        let track = DempsterShaferFuser::new(0.0).unwrap().fuse(&[strong, weak]).unwrap();
        assert_relative_eq!(track.state[0], 1.0, epsilon = 1e-12);
        let evidence = track.evidence.unwrap();
        assert_relative_eq!(evidence.present, 1.0 - 0.1 * 0.9, epsilon = 1e-12);
        assert_relative_eq!(track.confidence, evidence.present);
        // the mixture covers the disagreement between the two
        assert!(track.covariance[(0, 0)] > 1.0);
    }

    #[test]
    fn total_conflict_is_surfaced() {
        let yes = measurement("radar", [0.0; 3], [0.0; 3], 1.0, 1.0)
            .with_evidence(MassAssignment::new(1.0, 0.0, 0.0).unwrap());
        let no = measurement("ir", [0.0; 3], [0.0; 3], 1.0, 1.0)
            .with_evidence(MassAssignment::new(0.0, 1.0, 0.0).unwrap());
        assert!(matches!(
            DempsterShaferFuser::default().fuse(&[yes, no]),
            Err(RadarError::ConflictingEvidence(_))
        ));
    }

    #[test]
    fn uncommitted_sensors_share_weight() {
        let a = measurement("a", [0.0; 3], [0.0; 3], 1.0, 0.0);
        let b = measurement("b", [4.0, 0.0, 0.0], [0.0; 3], 1.0, 0.0);
        let track = DempsterShaferFuser::new(0.0).unwrap().fuse(&[a, b]).unwrap();
        assert_relative_eq!(track.state[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(track.evidence.unwrap().unknown, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn low_confidence_reports_count_against_presence() {
        let sure = measurement("radar", [0.0; 3], [0.0; 3], 1.0, 0.9);
        let doubtful = measurement("ir", [0.0; 3], [0.0; 3], 1.0, 0.2);
        let fuser = DempsterShaferFuser::default();
        let evidence = fuser.fuse(&[sure, doubtful]).unwrap().evidence.unwrap();
        let sure_mass = MassAssignment::from_confidence(0.9, DEFAULT_ABSENT_PRIOR);
        let doubtful_mass = MassAssignment::from_confidence(0.2, DEFAULT_ABSENT_PRIOR);
        let conflict = 0.9 * doubtful_mass.absent + sure_mass.absent * 0.2;
        assert!(conflict > 0.0);
        assert!(evidence.absent > 0.0);
        assert_relative_eq!(
            evidence.present,
            (0.9 * 0.2 + 0.9 * doubtful_mass.unknown + sure_mass.unknown * 0.2) / (1.0 - conflict),
            epsilon = 1e-12
        );
    }

    #[test]
    fn absent_prior_is_validated() {
        assert!(matches!(
            DempsterShaferFuser::new(1.5),
            Err(RadarError::InvalidParameter(_))
        ));
    }
}
