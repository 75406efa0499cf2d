//! Information-form combination of independent Gaussian estimates.

use nalgebra::{Matrix6, Vector6};

use crate::fusion::measurement::{
    combined_confidence, require_measurements, FusedTrack, SensorMeasurement,
};
use crate::fusion::{Fuser, FusionMethod};
use crate::math::matrix::MatrixHelper;
use crate::prelude::RadarResult;

#[derive(Debug, Clone, Copy, Default)]
pub struct KalmanFuser;

impl KalmanFuser {
    pub fn new() -> Self {
        Self
    }
}

impl Fuser for KalmanFuser {
    fn method(&self) -> FusionMethod {
        FusionMethod::Kalman
    }

    fn fuse(&self, measurements: &[SensorMeasurement]) -> RadarResult<FusedTrack> {
        require_measurements(measurements)?;

        if let [single] = measurements {
            let covariance = if MatrixHelper::is_positive_semidefinite(&single.uncertainty, 1e-9) {
                single.uncertainty
            } else {
                MatrixHelper::regularize(&single.uncertainty)?
            };
            return Ok(FusedTrack::from_measurements(
                measurements,
                single.state(),
                covariance,
                single.confidence,
                FusionMethod::Kalman,
            ));
        }

        let mut information = Matrix6::zeros();
        let mut weighted = Vector6::zeros();
        for measurement in measurements {
            let inverse = MatrixHelper::invert(&measurement.uncertainty)?;
            information += inverse;
            weighted += inverse * measurement.state();
        }
        let covariance = MatrixHelper::invert(&information)?;
        let state = covariance * weighted;

        Ok(FusedTrack::from_measurements(
            measurements,
            state,
            covariance,
            combined_confidence(measurements),
            FusionMethod::Kalman,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::measurement::test_support::measurement;
    use crate::prelude::RadarError;
    use approx::assert_relative_eq;

    #[test]
    fn single_measurement_passes_through() {
        let m = measurement("radar", [1.0, 2.0, 3.0], [4.0, 5.0, 6.0], 9.0, 0.7);
        let track = KalmanFuser.fuse(std::slice::from_ref(&m)).unwrap();
        assert_eq!(track.state, m.state());
        assert_eq!(track.covariance, m.uncertainty);
        assert_eq!(track.confidence, 0.7);
        assert_eq!(track.sensor_ids, vec!["radar".to_string()]);
    }

    #[test]
    fn equal_covariances_average_states() {
        let a = measurement("radar", [0.0, 10.0, 20.0], [1.0, 1.0, 1.0], 4.0, 0.8);
        let b = measurement("ir", [10.0, 20.0, 40.0], [3.0, 1.0, -1.0], 4.0, 0.8);
        let track = KalmanFuser.fuse(&[a, b]).unwrap();
        let expected = Vector6::new(5.0, 15.0, 30.0, 2.0, 1.0, 0.0);
        assert_relative_eq!(track.state, expected, epsilon = 1e-9);
        assert_relative_eq!(track.covariance, Matrix6::identity() * 2.0, epsilon = 1e-9);
        assert_relative_eq!(track.confidence, 0.96, epsilon = 1e-12);
        assert_eq!(track.method, FusionMethod::Kalman);
    }

    #[test]
    fn tighter_sensor_dominates() {
        let precise = measurement("radar", [0.0; 3], [0.0; 3], 1.0, 0.9);
        let coarse = measurement("ir", [100.0, 0.0, 0.0], [0.0; 3], 99.0, 0.9);
        let track = KalmanFuser.fuse(&[precise, coarse]).unwrap();
        assert_relative_eq!(track.state[0], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn empty_set_is_rejected() {
        assert!(matches!(KalmanFuser.fuse(&[]), Err(RadarError::EmptyInput(_))));
    }

    #[test]
    fn indefinite_covariance_is_regularised() {
        let mut m = measurement("radar", [0.0; 3], [0.0; 3], 1.0, 0.5);
        m.uncertainty[(2, 2)] = -4.0;
        let other = measurement("ir", [2.0, 0.0, 0.0], [0.0; 3], 1.0, 0.5);
        let track = KalmanFuser.fuse(&[m, other]).unwrap();
        assert!(track.state.iter().all(|v| v.is_finite()));
        assert!(MatrixHelper::is_positive_semidefinite(&track.covariance, 1e-9));
    }
}
