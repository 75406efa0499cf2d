use nalgebra::{Matrix6, Vector3, Vector6};
use serde::{Deserialize, Serialize};

use crate::fusion::FusionMethod;
use crate::prelude::{RadarError, RadarResult};

/// Sensor modality that produced a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementType {
    Radar,
    Infrared,
    Other,
}

/// Basic probability assignment over `{present, absent, unknown}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassAssignment {
    pub present: f64,
    pub absent: f64,
    pub unknown: f64,
}

const MASS_SUM_TOLERANCE: f64 = 1e-9;

impl MassAssignment {
    pub fn new(present: f64, absent: f64, unknown: f64) -> RadarResult<Self> {
        let masses = [present, absent, unknown];
        if masses.iter().any(|m| !m.is_finite() || *m < 0.0) {
            return Err(RadarError::InvalidParameter(format!(
                "masses must be non-negative, got {:?}",
                masses
            )));
        }
        let total: f64 = masses.iter().sum();
        if (total - 1.0).abs() > MASS_SUM_TOLERANCE {
            return Err(RadarError::InvalidParameter(format!(
                "masses must sum to one, got {}",
                total
            )));
        }
        Ok(Self {
            present,
            absent,
            unknown,
        })
    }

    /// Mass derived from a detection confidence: `confidence` goes to
    /// `present`, and `absent_prior` of the remainder is committed to `absent`
    /// (the sensor's false-alarm belief). The rest stays uncommitted.
    pub fn from_confidence(confidence: f64, absent_prior: f64) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        let doubt = 1.0 - confidence;
        let absent = doubt * absent_prior.clamp(0.0, 1.0);
        Self {
            present: confidence,
            absent,
            unknown: doubt - absent,
        }
    }

    /// Mass on `present ∩ absent` when combining with `other`.
    pub fn conflict_with(&self, other: &MassAssignment) -> f64 {
        self.present * other.absent + self.absent * other.present
    }

    /// Dempster's rule of combination.
    pub fn combine(&self, other: &MassAssignment) -> RadarResult<MassAssignment> {
        let conflict = self.conflict_with(other);
        let normalizer = 1.0 - conflict;
        if normalizer <= CONFLICT_EPSILON {
            return Err(RadarError::ConflictingEvidence(format!(
                "conflict mass {:.6} leaves nothing to normalise",
                conflict
            )));
        }
        let present = self.present * other.present
            + self.present * other.unknown
            + self.unknown * other.present;
        let absent =
            self.absent * other.absent + self.absent * other.unknown + self.unknown * other.absent;
        let unknown = self.unknown * other.unknown;
        Ok(MassAssignment {
            present: present / normalizer,
            absent: absent / normalizer,
            unknown: unknown / normalizer,
        })
    }
}

/// Normaliser below which two bodies of evidence count as totally conflicting.
pub const CONFLICT_EPSILON: f64 = 1e-12;

/// A timestamped Cartesian estimate from one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorMeasurement {
    pub sensor_id: String,
    pub timestamp: f64,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub measurement_type: MeasurementType,
    /// Covariance over `[position; velocity]`.
    pub uncertainty: Matrix6<f64>,
    pub confidence: f64,
    /// Explicit evidence; derived from `confidence` when absent.
    #[serde(default)]
    pub evidence: Option<MassAssignment>,
}

impl SensorMeasurement {
    pub fn new(
        sensor_id: &str,
        timestamp: f64,
        position: Vector3<f64>,
        velocity: Vector3<f64>,
        measurement_type: MeasurementType,
        uncertainty: Matrix6<f64>,
        confidence: f64,
    ) -> RadarResult<Self> {
        if !timestamp.is_finite() {
            return Err(RadarError::InvalidParameter("timestamp must be finite".into()));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(RadarError::InvalidParameter(format!(
                "confidence must lie in [0, 1], got {}",
                confidence
            )));
        }
        if position.iter().chain(velocity.iter()).any(|v| !v.is_finite()) {
            return Err(RadarError::InvalidParameter(format!(
                "measurement from {} has a non-finite state",
                sensor_id
            )));
        }
        if uncertainty.iter().any(|v| !v.is_finite()) {
            return Err(RadarError::InvalidParameter(format!(
                "measurement from {} has a non-finite covariance",
                sensor_id
            )));
        }
        Ok(Self {
            sensor_id: sensor_id.to_string(),
            timestamp,
            position,
            velocity,
            measurement_type,
            uncertainty,
            confidence,
            evidence: None,
        })
    }

    pub fn with_evidence(mut self, evidence: MassAssignment) -> Self {
        self.evidence = Some(evidence);
        self
    }

    /// Stacked `[position; velocity]`.
    pub fn state(&self) -> Vector6<f64> {
        Vector6::new(
            self.position.x,
            self.position.y,
            self.position.z,
            self.velocity.x,
            self.velocity.y,
            self.velocity.z,
        )
    }

    /// Explicit evidence, or evidence derived from `confidence`.
    pub fn mass(&self, absent_prior: f64) -> MassAssignment {
        self.evidence
            .unwrap_or_else(|| MassAssignment::from_confidence(self.confidence, absent_prior))
    }
}

/// Result shape shared by every fusion algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedTrack {
    pub state: Vector6<f64>,
    pub covariance: Matrix6<f64>,
    pub confidence: f64,
    /// Algorithm that produced the estimate.
    pub method: FusionMethod,
    /// Set when a dispatcher chose `method` on the caller's behalf.
    pub selected_by: Option<FusionMethod>,
    pub sensor_ids: Vec<String>,
    /// Latest contributing timestamp.
    pub timestamp: f64,
    pub evidence: Option<MassAssignment>,
}

impl FusedTrack {
    pub fn position(&self) -> Vector3<f64> {
        self.state.fixed_rows::<3>(0).into_owned()
    }

    pub fn velocity(&self) -> Vector3<f64> {
        self.state.fixed_rows::<3>(3).into_owned()
    }

    pub(crate) fn from_measurements(
        measurements: &[SensorMeasurement],
        state: Vector6<f64>,
        covariance: Matrix6<f64>,
        confidence: f64,
        method: FusionMethod,
    ) -> Self {
        Self {
            state,
            covariance,
            confidence: confidence.clamp(0.0, 1.0),
            method,
            selected_by: None,
            sensor_ids: contributing_sensors(measurements),
            timestamp: latest_timestamp(measurements),
            evidence: None,
        }
    }
}

/// Probability that at least one sensor is right, treating them as independent.
pub fn combined_confidence(measurements: &[SensorMeasurement]) -> f64 {
    1.0 - measurements
        .iter()
        .map(|m| 1.0 - m.confidence)
        .product::<f64>()
}

/// Sensor ids in first-seen order without repeats.
pub fn contributing_sensors(measurements: &[SensorMeasurement]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::with_capacity(measurements.len());
    for measurement in measurements {
        if !ids.contains(&measurement.sensor_id) {
            ids.push(measurement.sensor_id.clone());
        }
    }
    ids
}

fn latest_timestamp(measurements: &[SensorMeasurement]) -> f64 {
    measurements
        .iter()
        .map(|m| m.timestamp)
        .fold(f64::NEG_INFINITY, f64::max)
}

pub(crate) fn require_measurements(measurements: &[SensorMeasurement]) -> RadarResult<()> {
    if measurements.is_empty() {
        Err(RadarError::EmptyInput("no measurements to fuse".into()))
    } else {
        Ok(())
    }
}
