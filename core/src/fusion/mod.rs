//! Multi-sensor fusion.
//!
//! Every algorithm implements [`Fuser`] and returns the same [`FusedTrack`]
//! shape. [`FusionAlgorithm`] is the configured choice; [`SensorFusion`]
//! adds a time window and track memory on top of it.

pub mod adaptive;
pub mod dempster;
pub mod kalman;
pub mod measurement;
pub mod particle;

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::prelude::{RadarError, RadarResult};
use crate::telemetry::log::LogManager;

pub use adaptive::AdaptiveFuser;
pub use dempster::DempsterShaferFuser;
pub use kalman::KalmanFuser;
pub use measurement::{FusedTrack, MassAssignment, MeasurementType, SensorMeasurement};
pub use particle::ParticleFuser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    Kalman,
    ParticleFilter,
    DempsterShafer,
    Adaptive,
}

/// One capability shared by all fusion algorithms.
pub trait Fuser {
    fn method(&self) -> FusionMethod;
    fn fuse(&self, measurements: &[SensorMeasurement]) -> RadarResult<FusedTrack>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub method: FusionMethod,
    pub particle_count: usize,
    pub resample_threshold: f64,
    pub seed: u64,
    /// Measurements older than the newest by more than this (s) are dropped.
    pub time_window: f64,
    pub history_limit: usize,
    /// Share of a sensor's doubt `1 - confidence` committed to target-absent.
    pub absent_prior: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            method: FusionMethod::Adaptive,
            particle_count: 1_000,
            resample_threshold: 0.5,
            seed: 0,
            time_window: 1.0,
            history_limit: 100,
            absent_prior: dempster::DEFAULT_ABSENT_PRIOR,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FusionAlgorithm {
    Kalman(KalmanFuser),
    ParticleFilter(ParticleFuser),
    DempsterShafer(DempsterShaferFuser),
    Adaptive(AdaptiveFuser),
}

impl FusionAlgorithm {
    pub fn from_config(config: &FusionConfig) -> RadarResult<Self> {
        Ok(match config.method {
            FusionMethod::Kalman => FusionAlgorithm::Kalman(KalmanFuser),
            FusionMethod::ParticleFilter => {
                FusionAlgorithm::ParticleFilter(ParticleFuser::from_config(config)?)
            }
            FusionMethod::DempsterShafer => {
                FusionAlgorithm::DempsterShafer(DempsterShaferFuser::from_config(config)?)
            }
            FusionMethod::Adaptive => FusionAlgorithm::Adaptive(AdaptiveFuser::from_config(config)?),
        })
    }
}

impl Fuser for FusionAlgorithm {
    fn method(&self) -> FusionMethod {
        match self {
            FusionAlgorithm::Kalman(inner) => inner.method(),
            FusionAlgorithm::ParticleFilter(inner) => inner.method(),
            FusionAlgorithm::DempsterShafer(inner) => inner.method(),
            FusionAlgorithm::Adaptive(inner) => inner.method(),
        }
    }

    fn fuse(&self, measurements: &[SensorMeasurement]) -> RadarResult<FusedTrack> {
        match self {
            FusionAlgorithm::Kalman(inner) => inner.fuse(measurements),
            FusionAlgorithm::ParticleFilter(inner) => inner.fuse(measurements),
            FusionAlgorithm::DempsterShafer(inner) => inner.fuse(measurements),
            FusionAlgorithm::Adaptive(inner) => inner.fuse(measurements),
        }
    }
}

/// Tracker front end: windows the input, fuses it, remembers the result.
pub struct SensorFusion {
    config: FusionConfig,
    algorithm: FusionAlgorithm,
    history: VecDeque<FusedTrack>,
    logger: LogManager,
}

impl SensorFusion {
    pub fn new(config: FusionConfig) -> RadarResult<Self> {
        if !(config.time_window > 0.0) {
            return Err(RadarError::InvalidParameter(format!(
                "fusion time window must be positive, got {}",
                config.time_window
            )));
        }
        let algorithm = FusionAlgorithm::from_config(&config)?;
        Ok(Self {
            config,
            algorithm,
            history: VecDeque::new(),
            logger: LogManager::new("fusion"),
        })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn method(&self) -> FusionMethod {
        self.algorithm.method()
    }

    /// Measurements no older than `time_window` before the newest one, in input order.
    pub fn window<'a>(&self, measurements: &'a [SensorMeasurement]) -> Vec<&'a SensorMeasurement> {
        let newest = measurements
            .iter()
            .map(|m| m.timestamp)
            .fold(f64::NEG_INFINITY, f64::max);
        measurements
            .iter()
            .filter(|m| newest - m.timestamp <= self.config.time_window)
            .collect()
    }

    /// Fuses without touching track memory.
    pub fn fuse(&self, measurements: &[SensorMeasurement]) -> RadarResult<FusedTrack> {
        let windowed: Vec<SensorMeasurement> =
            self.window(measurements).into_iter().cloned().collect();
        if windowed.len() < measurements.len() {
            self.logger.record(&format!(
                "dropped {} stale measurements",
                measurements.len() - windowed.len()
            ));
        }
        self.algorithm.fuse(&windowed)
    }

    /// Fuses and records the track.
    pub fn update(&mut self, measurements: &[SensorMeasurement]) -> RadarResult<FusedTrack> {
        let track = self.fuse(measurements)?;
        self.history.push_back(track.clone());
        while self.history.len() > self.config.history_limit.max(1) {
            self.history.pop_front();
        }
        Ok(track)
    }

    pub fn latest(&self) -> Option<&FusedTrack> {
        self.history.back()
    }

    pub fn history(&self) -> impl Iterator<Item = &FusedTrack> {
        self.history.iter()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::measurement::test_support::measurement;

    #[test]
    fn configured_method_is_used() {
        for method in [
            FusionMethod::Kalman,
            FusionMethod::ParticleFilter,
            FusionMethod::DempsterShafer,
            FusionMethod::Adaptive,
        ] {
            let config = FusionConfig {
                method,
                ..Default::default()
            };
            let fusion = SensorFusion::new(config).unwrap();
            assert_eq!(fusion.method(), method);
            let a = measurement("radar", [0.0; 3], [0.0; 3], 4.0, 0.9);
            let b = measurement("ir", [1.0, 0.0, 0.0], [0.0; 3], 4.0, 0.7);
            let track = fusion.fuse(&[a, b]).unwrap();
            assert_eq!(track.sensor_ids.len(), 2);
        }
    }

    #[test]
    fn stale_measurements_fall_out_of_the_window() {
        let fusion = SensorFusion::new(FusionConfig {
            method: FusionMethod::Kalman,
            time_window: 0.5,
            ..Default::default()
        })
        .unwrap();
        let mut old = measurement("radar", [100.0, 0.0, 0.0], [0.0; 3], 1.0, 0.9);
        old.timestamp = 0.0;
        let fresh = measurement("ir", [0.0; 3], [0.0; 3], 1.0, 0.9);
        let track = fusion.fuse(&[old, fresh]).unwrap();
        assert_eq!(track.sensor_ids, vec!["ir".to_string()]);
        assert_eq!(track.state[0], 0.0);
    }

    #[test]
    fn history_is_bounded() {
        let mut fusion = SensorFusion::new(FusionConfig {
            method: FusionMethod::Kalman,
            history_limit: 3,
            ..Default::default()
        })
        .unwrap();
        for step in 0..5 {
            let m = measurement("radar", [step as f64, 0.0, 0.0], [0.0; 3], 1.0, 0.9);
            fusion.update(&[m]).unwrap();
        }
        assert_eq!(fusion.history().count(), 3);
        assert_eq!(fusion.latest().unwrap().state[0], 4.0);
        fusion.clear();
        assert!(fusion.latest().is_none());
    }

    #[test]
    fn opposing_sensors_are_reported_as_conflict() {
        let fusion = SensorFusion::new(FusionConfig {
            method: FusionMethod::DempsterShafer,
            absent_prior: 1.0,
            ..Default::default()
        })
        .unwrap();
        let seen = measurement("radar", [0.0; 3], [0.0; 3], 1.0, 1.0);
        let missed = measurement("ir", [0.0; 3], [0.0; 3], 1.0, 0.0);
        assert!(matches!(
            fusion.fuse(&[seen, missed]),
            Err(RadarError::ConflictingEvidence(_))
        ));
    }

    #[test]
    fn absent_prior_out_of_range_is_rejected() {
        let config = FusionConfig {
            method: FusionMethod::DempsterShafer,
            absent_prior: -0.1,
            ..Default::default()
        };
        assert!(matches!(
            SensorFusion::new(config),
            Err(RadarError::InvalidParameter(_))
        ));
    }

    #[test]
    fn empty_input_is_surfaced() {
        let fusion = SensorFusion::new(FusionConfig::default()).unwrap();
        assert!(matches!(fusion.fuse(&[]), Err(RadarError::EmptyInput(_))));
    }
}
