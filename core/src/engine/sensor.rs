//! Per-entity radar observation: geometry, radar equation, synthetic echo,
//! pulse compression, noncoherent integration and CFAR.

use nalgebra::Vector3;
use num_complex::Complex64;
use rand::Rng;
use rand_distr::StandardNormal;
use std::f64::consts::PI;

use crate::engine::motion::KinematicState;
use crate::engine::simulation::EngineConfig;
use crate::interface::detection::{Detection, MeasurementAccuracy, TargetId};
use crate::physics::atmospheric::{attenuation_for, AtmosphericConditions};
use crate::physics::constants::{linear_to_db, SPEED_OF_LIGHT};
use crate::physics::radar_equation::{doppler_shift, received_power, snr, RadarParameters};
use crate::physics::rcs::{aspect_dependent_rcs, RcsFluctuation, TargetType};
use crate::prelude::{
    require_positive, ProcessingStage, RadarError, RadarResult, StageConfig, StageInput,
};
use crate::processing::cfar::CfarDetector;
use crate::processing::doppler::DopplerWindow;
use crate::processing::range::RangeStage;
use crate::processing::waveform::Waveform;
use crate::telemetry::log::LogManager;

/// Line-of-sight geometry from the radar to an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub range: f64,
    pub azimuth: f64,
    pub elevation: f64,
    /// Positive when closing.
    pub radial_velocity: f64,
    /// Angle between the entity's heading and the line of sight back to the radar.
    pub aspect: Option<f64>,
}

impl Geometry {
    pub fn between(radar_position: &Vector3<f64>, entity: &KinematicState) -> RadarResult<Self> {
        let offset = entity.position - radar_position;
        let range = offset.norm();
        require_positive("range", range)?;
        let los = offset / range;
        let speed = entity.velocity.norm();
        let aspect = (speed > f64::EPSILON)
            .then(|| (entity.velocity.dot(&-los) / speed).clamp(-1.0, 1.0).acos());
        Ok(Self {
            range,
            azimuth: offset.y.atan2(offset.x),
            elevation: (offset.z / range).asin(),
            radial_velocity: -entity.velocity.dot(&los),
            aspect,
        })
    }
}

pub struct RadarSensor {
    radar: RadarParameters,
    position: Vector3<f64>,
    sample_rate: f64,
    range_cells: usize,
    pulses_per_dwell: u32,
    atmosphere: Option<AtmosphericConditions>,
    measurement_noise: Option<MeasurementAccuracy>,
    replica: Waveform,
    range_stage: RangeStage,
    detector: CfarDetector,
    logger: LogManager,
}

impl RadarSensor {
    pub fn new(radar: RadarParameters, config: &EngineConfig) -> RadarResult<Self> {
        radar.validate()?;
        require_positive("sample_rate", config.sample_rate)?;
        if config.range_cells == 0 {
            return Err(RadarError::InvalidParameter("range_cells must be positive".into()));
        }
        if config.pulses_per_dwell == 0 {
            return Err(RadarError::InvalidParameter(
                "pulses_per_dwell must be positive".into(),
            ));
        }
        if let Some(noise) = &config.measurement_noise {
            noise.validate()?;
        }

        let detector = CfarDetector::new(config.cfar)?;
        if detector.window_len() > config.range_cells {
            return Err(RadarError::InsufficientReferenceCells(format!(
                "CFAR window of {} cells exceeds {} range cells",
                detector.window_len(),
                config.range_cells
            )));
        }
        let replica = Waveform::generate(&config.waveform, config.sample_rate)?;
        let mut range_stage = RangeStage::new();
        range_stage.initialize(&StageConfig {
            sample_rate: config.sample_rate,
            waveform: config.waveform.clone(),
            prf: radar.prf,
            cfar: config.cfar,
            window: DopplerWindow::Rectangular,
        })?;

        Ok(Self {
            radar,
            position: config.radar_position,
            sample_rate: config.sample_rate,
            range_cells: config.range_cells,
            pulses_per_dwell: config.pulses_per_dwell,
            atmosphere: config.atmosphere,
            measurement_noise: config.measurement_noise,
            replica,
            range_stage,
            detector,
            logger: LogManager::new("sensor"),
        })
    }

    pub fn position(&self) -> &Vector3<f64> {
        &self.position
    }

    pub fn radar(&self) -> &RadarParameters {
        &self.radar
    }

    /// Range of the first cell an echo cannot start in without spilling past
    /// the sampled window.
    pub fn instrumented_range(&self) -> f64 {
        let cells = self.range_cells.saturating_sub(self.replica.len()) as f64;
        cells * SPEED_OF_LIGHT / (2.0 * self.sample_rate)
    }

    pub fn range_bin(&self, range: f64) -> usize {
        (2.0 * range / SPEED_OF_LIGHT * self.sample_rate).round() as usize
    }

    /// Runs one dwell against one entity. `Ok(None)` means no CFAR crossing at
    /// the entity's cell, or the entity lies outside the sampled window.
    #[allow(clippy::too_many_arguments)]
    pub fn observe<R: Rng + ?Sized>(
        &mut self,
        id: TargetId,
        entity: &KinematicState,
        target_type: TargetType,
        rcs: &mut RcsFluctuation,
        scan: u64,
        timestamp: f64,
        rng: &mut R,
    ) -> RadarResult<Option<Detection>> {
        let geometry = Geometry::between(&self.position, entity)?;
        let bin = self.range_bin(geometry.range);
        if bin + self.replica.len() > self.range_cells {
            self.logger.record(&format!(
                "{} at {:.0} m is beyond the sampled window",
                id, geometry.range
            ));
            return Ok(None);
        }

        let one_way_db = match &self.atmosphere {
            Some(conditions) => attenuation_for(
                self.radar.frequency,
                geometry.range,
                geometry.elevation,
                conditions,
            )?,
            None => 0.0,
        };
        let doppler_hz = doppler_shift(self.radar.frequency, geometry.radial_velocity)?;
        let energy = self.replica.energy();

        let pulses = self.pulses_per_dwell as usize;
        let mut samples = Vec::with_capacity(pulses * self.range_cells);
        let mut realised_rcs = 0.0;
        for pulse in 0..self.pulses_per_dwell {
            let mut sigma = rcs.sample(scan, pulse, rng)?;
            if let Some(aspect) = geometry.aspect {
                sigma = aspect_dependent_rcs(sigma, target_type, aspect);
            }
            realised_rcs += sigma / pulses as f64;

            let power = received_power(&self.radar, sigma, geometry.range, 2.0 * one_way_db)?;
            let ratio = snr(power, self.radar.noise_figure_db, self.radar.bandwidth, None)?;
            let amplitude = (ratio / energy).sqrt();
            let phase = rng.gen_range(0.0..2.0 * PI)
                + 2.0 * PI * doppler_hz * pulse as f64 / self.radar.prf;
            let echo = Complex64::from_polar(amplitude, phase);

            let row_start = samples.len();
            samples.extend((0..self.range_cells).map(|_| complex_noise(rng)));
            for (offset, chip) in self.replica.samples.iter().enumerate() {
                samples[row_start + bin + offset] += chip * echo;
            }
        }

        let compressed = self.range_stage.execute(StageInput {
            samples,
            rows: pulses,
            timestamp: Some(timestamp),
        })?;
        let profile = compressed
            .metadata
            .power_profile
            .ok_or_else(|| RadarError::EmptyInput("range stage produced no power profile".into()))?;
        let decision = self.detector.detect(&profile)?;
        if !decision.detections[bin] {
            return Ok(None);
        }

        let mut detection = Detection {
            timestamp,
            range: geometry.range,
            azimuth: geometry.azimuth,
            elevation: geometry.elevation,
            radial_velocity: geometry.radial_velocity,
            doppler_hz,
            snr_db: linear_to_db(profile[bin]),
            rcs: realised_rcs,
            range_bin: bin,
            target: id,
        };
        if let Some(noise) = &self.measurement_noise {
            detection.range += noise.range_std * rng.sample::<f64, _>(StandardNormal);
            detection.azimuth += noise.azimuth_std * rng.sample::<f64, _>(StandardNormal);
            detection.elevation += noise.elevation_std * rng.sample::<f64, _>(StandardNormal);
            detection.radial_velocity +=
                noise.radial_velocity_std * rng.sample::<f64, _>(StandardNormal);
            detection.range = detection.range.max(0.0);
        }
        Ok(Some(detection))
    }
}

/// Circular complex Gaussian sample with unit variance.
fn complex_noise<R: Rng + ?Sized>(rng: &mut R) -> Complex64 {
    let scale = std::f64::consts::FRAC_1_SQRT_2;
    Complex64::new(
        scale * rng.sample::<f64, _>(StandardNormal),
        scale * rng.sample::<f64, _>(StandardNormal),
    )
}
