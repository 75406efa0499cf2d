use crate::workflow::config::{InfraredConfig, ScenarioConfig, TargetConfig};
use anyhow::Context;
use nalgebra::{Matrix6, Vector3};
use num_complex::Complex64;
use radarcore::engine::{MotionSpec, SimulationSnapshot};
use radarcore::fusion::{MeasurementType, SensorMeasurement};
use radarcore::physics::constants::SPEED_OF_LIGHT;
use radarcore::physics::{doppler_shift, TargetType};
use radarcore::processing::{Waveform, WaveformKind};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const RANGE_SPAN: std::ops::Range<f64> = 5_000.0..60_000.0;
const ALTITUDE_SPAN: std::ops::Range<f64> = 200.0..10_000.0;
const RCS_SPAN: std::ops::Range<f64> = 0.5..20.0;
const MAX_SPEED: f64 = 300.0;

fn random_target<R: Rng>(rng: &mut R, index: usize) -> TargetConfig {
    let range = rng.gen_range(RANGE_SPAN);
    let azimuth = rng.gen_range(-PI..PI);
    let altitude = rng.gen_range(ALTITUDE_SPAN);
    let ground = (range * range - altitude * altitude).max(0.0).sqrt();
    let heading = rng.gen_range(-PI..PI);
    let speed = rng.gen_range(0.0..MAX_SPEED);
    let (target_type, swerling) = match rng.gen_range(0..10) {
        0 => (TargetType::Clutter, 0),
        1 | 2 => (TargetType::Missile, 2),
        _ => (TargetType::Aircraft, rng.gen_range(1..=4)),
    };
    let motion = if rng.gen_bool(0.3) {
        MotionSpec::CoordinatedTurn {
            turn_rate: rng.gen_range(-0.05..0.05),
        }
    } else {
        MotionSpec::ConstantVelocity
    };
    TargetConfig {
        name: Some(format!("random-{}", index)),
        position: [ground * azimuth.cos(), ground * azimuth.sin(), altitude],
        velocity: if target_type == TargetType::Clutter {
            [0.0; 3]
        } else {
            [speed * heading.cos(), speed * heading.sin(), 0.0]
        },
        rcs: rng.gen_range(RCS_SPAN),
        swerling,
        target_type,
        motion,
    }
}

/// Scenario with `targets` random entities, reproducible from `seed`.
pub fn random_scenario(targets: usize, seed: u64) -> ScenarioConfig {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut scenario = ScenarioConfig {
        name: format!("random-{}-seed-{}", targets, seed),
        ..Default::default()
    };
    scenario.targets = (0..targets).map(|idx| random_target(&mut rng, idx)).collect();
    scenario.engine.seed = seed;
    scenario.fusion.seed = seed;
    scenario
}

/// Synthesises a second-modality report for every entity in `snapshot`,
/// perturbing ground truth by the sensor's accuracy. Each report carries the
/// entity id for scoring.
pub fn infrared_measurements<R: Rng>(
    snapshot: &SimulationSnapshot,
    config: &InfraredConfig,
    rng: &mut R,
) -> anyhow::Result<Vec<(radarcore::interface::TargetId, SensorMeasurement)>> {
    let mut measurements = Vec::new();
    if !config.enabled {
        return Ok(measurements);
    }
    let mut uncertainty = Matrix6::zeros();
    for axis in 0..3 {
        uncertainty[(axis, axis)] = config.position_std.powi(2);
        uncertainty[(axis + 3, axis + 3)] = config.velocity_std.powi(2);
    }
    for entity in snapshot.targets.iter().chain(snapshot.missiles.iter()) {
        if !rng.gen_bool(config.detection_probability.clamp(0.0, 1.0)) {
            continue;
        }
        let jitter = |rng: &mut R, std: f64| {
            Vector3::from_fn(|_, _| std * rng.sample::<f64, _>(StandardNormal))
        };
        let position = entity.position + jitter(&mut *rng, config.position_std);
        let velocity = entity.velocity + jitter(&mut *rng, config.velocity_std);
        let measurement = SensorMeasurement::new(
            &config.sensor_id,
            snapshot.timestamp,
            position,
            velocity,
            MeasurementType::Infrared,
            uncertainty,
            config.confidence,
        )
        .with_context(|| format!("infrared measurement of {}", entity.id))?;
        measurements.push((entity.id, measurement));
    }
    Ok(measurements)
}

/// Point scatterer injected into a synthetic burst.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BurstTarget {
    pub range: f64,
    /// Positive when closing (m/s).
    pub radial_velocity: f64,
    /// Post-compression SNR per pulse (dB).
    pub snr_db: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BurstConfig {
    pub pulses: usize,
    pub range_cells: usize,
    pub sample_rate: f64,
    pub carrier_frequency: f64,
    pub prf: f64,
    pub waveform: WaveformKind,
    pub targets: Vec<BurstTarget>,
    pub seed: u64,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            pulses: 32,
            range_cells: 512,
            sample_rate: 1e6,
            carrier_frequency: 10e9,
            prf: 1_000.0,
            waveform: WaveformKind::default(),
            targets: vec![
                BurstTarget {
                    range: 12_000.0,
                    radial_velocity: 4.5,
                    snr_db: 12.0,
                },
                BurstTarget {
                    range: 30_000.0,
                    radial_velocity: -6.0,
                    snr_db: 10.0,
                },
            ],
            seed: 0,
        }
    }
}

/// Coherent pulse train, row-major `pulses × range_cells`.
#[derive(Debug, Clone)]
pub struct EchoBurst {
    pub samples: Vec<Complex64>,
    pub pulses: usize,
    pub range_cells: usize,
    pub sample_rate: f64,
    pub carrier_frequency: f64,
    pub prf: f64,
    pub waveform: WaveformKind,
    pub timestamp: f64,
}

pub fn build_echo_burst(config: &BurstConfig) -> anyhow::Result<EchoBurst> {
    let replica = Waveform::generate(&config.waveform, config.sample_rate)
        .context("generating burst waveform")?;
    let sample_count = config
        .pulses
        .checked_mul(config.range_cells)
        .context("overflow computing sample count for burst")?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let scale = std::f64::consts::FRAC_1_SQRT_2;
    let mut samples: Vec<Complex64> = (0..sample_count)
        .map(|_| {
            Complex64::new(
                scale * rng.sample::<f64, _>(StandardNormal),
                scale * rng.sample::<f64, _>(StandardNormal),
            )
        })
        .collect();

    let energy = replica.energy();
    for target in &config.targets {
        let bin = (2.0 * target.range / SPEED_OF_LIGHT * config.sample_rate).round() as usize;
        if bin + replica.len() > config.range_cells {
            log::warn!("burst target at {:.0} m falls outside the window", target.range);
            continue;
        }
        let doppler = doppler_shift(config.carrier_frequency, target.radial_velocity)
            .context("burst target doppler")?;
        let amplitude = (10f64.powf(target.snr_db / 10.0) / energy).sqrt();
        let phase0 = rng.gen_range(0.0..2.0 * PI);
        for pulse in 0..config.pulses {
            let phase = phase0 + 2.0 * PI * doppler * pulse as f64 / config.prf;
            let echo = Complex64::from_polar(amplitude, phase);
            let row = pulse * config.range_cells;
            for (offset, chip) in replica.samples.iter().enumerate() {
                samples[row + bin + offset] += chip * echo;
            }
        }
    }

    Ok(EchoBurst {
        samples,
        pulses: config.pulses,
        range_cells: config.range_cells,
        sample_rate: config.sample_rate,
        carrier_frequency: config.carrier_frequency,
        prf: config.prf,
        waveform: config.waveform.clone(),
        timestamp: 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use radarcore::engine::{EngineStatus, EntitySnapshot};
    use radarcore::interface::TargetId;

    #[test]
    fn random_scenarios_are_reproducible() {
        let first = random_scenario(6, 13);
        let second = random_scenario(6, 13);
        assert_eq!(first.targets, second.targets);
        assert_eq!(first.targets.len(), 6);
        for target in &first.targets {
            let range = Vector3::from(target.position).norm();
            assert!((5_000.0..=60_000.0).contains(&range), "range {}", range);
            assert!(target.swerling <= 4);
        }
        assert!(first.build_engine().is_ok());
    }

    #[test]
    fn burst_has_expected_shape() {
        let config = BurstConfig::default();
        let burst = build_echo_burst(&config).unwrap();
        assert_eq!(burst.samples.len(), config.pulses * config.range_cells);
        assert_eq!(burst.pulses, 32);
    }

    #[test]
    fn infrared_reports_follow_ground_truth() {
        let snapshot = SimulationSnapshot {
            status: EngineStatus::Running,
            timestamp: 3.0,
            tick: 30,
            targets: vec![EntitySnapshot {
                id: TargetId(4),
                target_type: TargetType::Aircraft,
                position: Vector3::new(1_000.0, 2_000.0, 3_000.0),
                velocity: Vector3::new(100.0, 0.0, 0.0),
                mean_rcs: 1.0,
                last_rcs: None,
            }],
            missiles: Vec::new(),
            detections: Vec::new(),
        };
        let config = InfraredConfig {
            detection_probability: 1.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(5);
        let reports = infrared_measurements(&snapshot, &config, &mut rng).unwrap();
        assert_eq!(reports.len(), 1);
        let (id, measurement) = &reports[0];
        assert_eq!(*id, TargetId(4));
        assert_eq!(measurement.measurement_type, MeasurementType::Infrared);
        assert_eq!(measurement.timestamp, 3.0);
        assert!((measurement.position - snapshot.targets[0].position).norm() < 6.0 * 30.0);

        let disabled = InfraredConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(infrared_measurements(&snapshot, &disabled, &mut rng).unwrap().is_empty());
    }
}
