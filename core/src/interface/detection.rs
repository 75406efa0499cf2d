use nalgebra::{Matrix3, Matrix6, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fusion::measurement::{MeasurementType, SensorMeasurement};
use crate::prelude::{RadarError, RadarResult};

/// Engine-assigned identifier of a target or missile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub u64);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// A CFAR crossing attributed to one simulated entity.
///
/// Angles are radians: azimuth from +x towards +y, elevation above the x-y
/// plane. `radial_velocity` is positive for a closing target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub timestamp: f64,
    pub range: f64,
    pub azimuth: f64,
    pub elevation: f64,
    pub radial_velocity: f64,
    pub doppler_hz: f64,
    /// Integrated matched-filter SNR at the detection cell.
    pub snr_db: f64,
    /// RCS realised for this dwell (m²).
    pub rcs: f64,
    pub range_bin: usize,
    /// Ground truth for scoring only.
    pub target: TargetId,
}

/// One-sigma accuracy used to turn polar detections into Cartesian measurements.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementAccuracy {
    pub range_std: f64,
    pub azimuth_std: f64,
    pub elevation_std: f64,
    pub radial_velocity_std: f64,
    /// Spread assumed across the unobserved cross-range velocity components.
    pub tangential_velocity_std: f64,
}

impl Default for MeasurementAccuracy {
    fn default() -> Self {
        Self {
            range_std: 15.0,
            azimuth_std: 0.01,
            elevation_std: 0.01,
            radial_velocity_std: 1.0,
            tangential_velocity_std: 50.0,
        }
    }
}

impl MeasurementAccuracy {
    pub fn validate(&self) -> RadarResult<()> {
        let fields = [
            ("range_std", self.range_std),
            ("azimuth_std", self.azimuth_std),
            ("elevation_std", self.elevation_std),
            ("radial_velocity_std", self.radial_velocity_std),
            ("tangential_velocity_std", self.tangential_velocity_std),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(RadarError::InvalidParameter(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// SNR (dB) at which a detection is reported with confidence one half.
const CONFIDENCE_MIDPOINT_DB: f64 = 13.0;
/// Width (dB) of the logistic SNR-to-confidence ramp.
const CONFIDENCE_SLOPE_DB: f64 = 3.0;

impl Detection {
    /// Unit line-of-sight vector from the radar towards the detection.
    pub fn line_of_sight(&self) -> Vector3<f64> {
        let (sin_az, cos_az) = self.azimuth.sin_cos();
        let (sin_el, cos_el) = self.elevation.sin_cos();
        Vector3::new(cos_el * cos_az, cos_el * sin_az, sin_el)
    }

    /// Cartesian position seen from a radar at `radar_position`.
    pub fn position(&self, radar_position: &Vector3<f64>) -> Vector3<f64> {
        radar_position + self.line_of_sight() * self.range
    }

    /// Velocity implied by the radial measurement alone (closing is towards the radar).
    pub fn radial_velocity_vector(&self) -> Vector3<f64> {
        -self.line_of_sight() * self.radial_velocity
    }

    /// Logistic mapping of SNR onto `[0, 1]`.
    pub fn confidence(&self) -> f64 {
        1.0 / (1.0 + (-(self.snr_db - CONFIDENCE_MIDPOINT_DB) / CONFIDENCE_SLOPE_DB).exp())
    }

    /// Converts to a fusion measurement. Position covariance is the polar
    /// accuracy propagated through the spherical-to-Cartesian Jacobian; the
    /// velocity block is tight along the line of sight and loose across it.
    pub fn to_measurement(
        &self,
        sensor_id: &str,
        radar_position: &Vector3<f64>,
        accuracy: &MeasurementAccuracy,
    ) -> RadarResult<SensorMeasurement> {
        accuracy.validate()?;
        let (sin_az, cos_az) = self.azimuth.sin_cos();
        let (sin_el, cos_el) = self.elevation.sin_cos();
        let r = self.range;

        let jacobian = Matrix3::new(
            cos_el * cos_az,
            -r * cos_el * sin_az,
            -r * sin_el * cos_az,
            cos_el * sin_az,
            r * cos_el * cos_az,
            -r * sin_el * sin_az,
            sin_el,
            0.0,
            r * cos_el,
        );
        let polar = Matrix3::from_diagonal(&Vector3::new(
            accuracy.range_std.powi(2),
            accuracy.azimuth_std.powi(2),
            accuracy.elevation_std.powi(2),
        ));
        let position_cov = jacobian * polar * jacobian.transpose();

        let los = self.line_of_sight();
        let along = los * los.transpose();
        let across = Matrix3::identity() - along;
        let velocity_cov = along * accuracy.radial_velocity_std.powi(2)
            + across * accuracy.tangential_velocity_std.powi(2);

        let mut uncertainty = Matrix6::zeros();
        uncertainty.fixed_view_mut::<3, 3>(0, 0).copy_from(&position_cov);
        uncertainty.fixed_view_mut::<3, 3>(3, 3).copy_from(&velocity_cov);

        SensorMeasurement::new(
            sensor_id,
            self.timestamp,
            self.position(radar_position),
            self.radial_velocity_vector(),
            MeasurementType::Radar,
            uncertainty,
            self.confidence(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::matrix::MatrixHelper;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn detection(azimuth: f64, elevation: f64) -> Detection {
        Detection {
            timestamp: 2.0,
            range: 10_000.0,
            azimuth,
            elevation,
            radial_velocity: 100.0,
            doppler_hz: 6_671.3,
            snr_db: 30.0,
            rcs: 1.0,
            range_bin: 67,
            target: TargetId(1),
        }
    }

    #[test]
    fn position_is_range_along_line_of_sight() {
        let det = detection(FRAC_PI_2, 0.0);
        let origin = Vector3::new(100.0, 0.0, 5.0);
        let position = det.position(&origin);
        assert_relative_eq!(position, Vector3::new(100.0, 10_000.0, 5.0), epsilon = 1e-6);
        // closing means moving back towards the radar
        assert_relative_eq!(det.radial_velocity_vector(), Vector3::new(0.0, -100.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn measurement_covariance_is_psd_and_oriented() {
        let det = detection(0.0, 0.0);
        let accuracy = MeasurementAccuracy::default();
        let measurement = det
            .to_measurement("radar-1", &Vector3::zeros(), &accuracy)
            .unwrap();
        let cov = measurement.uncertainty;
        assert!(MatrixHelper::is_positive_semidefinite(&cov, 1e-6));
        // down-range variance along x, cross-range along y grows with range
        assert_relative_eq!(cov[(0, 0)], 15.0_f64.powi(2), epsilon = 1e-6);
        assert_relative_eq!(cov[(1, 1)], (10_000.0 * 0.01_f64).powi(2), epsilon = 1e-6);
        assert_relative_eq!(cov[(3, 3)], 1.0, epsilon = 1e-9);
        assert_relative_eq!(cov[(4, 4)], 2_500.0, epsilon = 1e-9);
        assert_eq!(measurement.measurement_type, MeasurementType::Radar);
        assert!(measurement.confidence > 0.99);
    }

    #[test]
    fn confidence_tracks_snr() {
        let mut det = detection(0.0, 0.0);
        det.snr_db = CONFIDENCE_MIDPOINT_DB;
        assert_relative_eq!(det.confidence(), 0.5, epsilon = 1e-12);
        det.snr_db = 0.0;
        assert!(det.confidence() < 0.02);
    }

    #[test]
    fn negative_accuracy_is_rejected() {
        let accuracy = MeasurementAccuracy {
            range_std: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            detection(0.0, 0.0).to_measurement("r", &Vector3::zeros(), &accuracy),
            Err(RadarError::InvalidParameter(_))
        ));
    }
}
