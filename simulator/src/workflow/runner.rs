use crate::generator::profile::{infrared_measurements, EchoBurst};
use crate::workflow::config::ScenarioConfig;
use anyhow::Context;
use nalgebra::{Matrix6, Vector6};
use radarcore::engine::{SimulationSnapshot, TickSummary};
use radarcore::fusion::{FusedTrack, SensorFusion, SensorMeasurement};
use radarcore::interface::{FeatureVector, TargetId};
use radarcore::math::{MatrixHelper, StatsHelper};
use radarcore::physics::constants::SPEED_OF_LIGHT;
use radarcore::prelude::{ProcessingStage, StageConfig, StageInput};
use radarcore::processing::{CfarStage, DopplerStage, DopplerWindow, RangeStage};
use radarcore::telemetry::PerformanceReport;
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::ControlFlow;

pub const RADAR_SENSOR_ID: &str = "radar-1";

/// χ²(6) 99.9% quantile. A report whose squared Mahalanobis distance to
/// every predicted track exceeds this starts a new track.
pub const ASSOCIATION_GATE: f64 = 22.458;

/// Latest fused estimate for one track.
#[derive(Debug, Clone, Serialize)]
pub struct TrackReport {
    pub id: usize,
    /// Entity most of the track's reports came from. Scoring only.
    pub truth: Option<TargetId>,
    pub updates: usize,
    pub track: FusedTrack,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scenario: String,
    pub ticks: u64,
    pub final_timestamp: f64,
    pub detections: usize,
    pub removed: Vec<TargetId>,
    pub target_failures: usize,
    pub fusion_failures: usize,
    pub tracks: Vec<TrackReport>,
    pub features: Vec<FeatureVector>,
    pub performance: PerformanceReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OfflineDetection {
    pub range_bin: usize,
    pub doppler_bin: usize,
    pub range: f64,
    pub radial_velocity: f64,
}

pub struct OfflineResult {
    pub power_profile: Vec<f64>,
    pub profile_rms: f64,
    pub detection_count: usize,
    pub detections: Vec<OfflineDetection>,
    pub doppler_axis: Vec<f64>,
    pub notes: Vec<String>,
}

struct Tracker {
    id: usize,
    fusion: SensorFusion,
    updates: usize,
    rcs: f64,
    snr_db: f64,
    hits: BTreeMap<TargetId, usize>,
}

impl Tracker {
    fn truth(&self) -> Option<TargetId> {
        self.hits
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(id, _)| *id)
    }
}

/// One sensor report. `truth` and `signature` ride along for scoring and
/// features; association only looks at the measurement.
struct Report {
    measurement: SensorMeasurement,
    truth: TargetId,
    /// RCS and SNR (dB) of a radar detection.
    signature: Option<(f64, f64)>,
}

/// Reports gathered around one predicted track, or around the first report of
/// a new one when `tracker` is `None`.
struct Gate {
    state: Vector6<f64>,
    covariance: Matrix6<f64>,
    tracker: Option<usize>,
    reports: Vec<Report>,
}

/// Constant-velocity prediction of `track` to `timestamp`.
fn predict(track: &FusedTrack, timestamp: f64) -> (Vector6<f64>, Matrix6<f64>) {
    let dt = timestamp - track.timestamp;
    let mut transition = Matrix6::identity();
    for axis in 0..3 {
        transition[(axis, axis + 3)] = dt;
    }
    (
        transition * track.state,
        transition * track.covariance * transition.transpose(),
    )
}

/// Nearest-neighbour gating of one tick's reports against the live tracks.
fn associate(trackers: &[Tracker], reports: Vec<Report>, timestamp: f64) -> anyhow::Result<Vec<Gate>> {
    let mut gates: Vec<Gate> = trackers
        .iter()
        .enumerate()
        .filter_map(|(index, tracker)| {
            tracker.fusion.latest().map(|track| {
                let (state, covariance) = predict(track, timestamp);
                Gate {
                    state,
                    covariance,
                    tracker: Some(index),
                    reports: Vec::new(),
                }
            })
        })
        .collect();

    for report in reports {
        let mut nearest: Option<(usize, f64)> = None;
        for (index, gate) in gates.iter().enumerate() {
            let residual = report.measurement.state() - gate.state;
            let distance = MatrixHelper::mahalanobis_squared(
                &residual,
                &(gate.covariance + report.measurement.uncertainty),
            )
            .context("gating report")?;
            if distance <= ASSOCIATION_GATE && nearest.map_or(true, |(_, best)| distance < best) {
                nearest = Some((index, distance));
            }
        }
        match nearest {
            Some((index, _)) => gates[index].reports.push(report),
            None => gates.push(Gate {
                state: report.measurement.state(),
                covariance: report.measurement.uncertainty,
                tracker: None,
                reports: vec![report],
            }),
        }
    }
    Ok(gates)
}

#[derive(Clone)]
pub struct Runner {
    config: ScenarioConfig,
}

impl Runner {
    pub fn new(config: ScenarioConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn run(&self) -> anyhow::Result<RunReport> {
        self.run_with(|_, _, _| ControlFlow::Continue(()))
    }

    /// Runs the scenario headless. `observer` sees every tick and may end the
    /// run early by returning `ControlFlow::Break`.
    pub fn run_with<F>(&self, mut observer: F) -> anyhow::Result<RunReport>
    where
        F: FnMut(&TickSummary, &SimulationSnapshot, &[TrackReport]) -> ControlFlow<()>,
    {
        let (mut engine, _) = self.config.build_engine()?;
        engine.start().context("starting engine")?;
        let radar_position = *engine.radar_position();
        let accuracy = engine.config().measurement_noise.unwrap_or_default();
        let mut rng = StdRng::seed_from_u64(self.config.engine.seed.wrapping_add(1));

        let mut trackers: Vec<Tracker> = Vec::new();
        let mut next_track = 1;
        let mut removed = Vec::new();
        let mut detections = 0;
        let mut target_failures = 0;
        let mut fusion_failures = 0;
        let mut ticks = 0;

        for _ in 0..self.config.ticks {
            let summary = engine
                .advance_tick(self.config.dt)
                .with_context(|| format!("advancing tick {}", ticks + 1))?;
            ticks += 1;
            detections += summary.detections.len();
            target_failures += summary.failures.len();
            removed.extend(summary.removed.iter().copied());
            let snapshot = engine.snapshot(summary.detections.len());

            let mut reports = Vec::new();
            for detection in &summary.detections {
                let measurement = detection
                    .to_measurement(RADAR_SENSOR_ID, &radar_position, &accuracy)
                    .with_context(|| format!("converting detection of {}", detection.target))?;
                reports.push(Report {
                    measurement,
                    truth: detection.target,
                    signature: Some((detection.rcs, detection.snr_db)),
                });
            }
            for (truth, measurement) in infrared_measurements(&snapshot, &self.config.infrared, &mut rng)? {
                reports.push(Report {
                    measurement,
                    truth,
                    signature: None,
                });
            }

            for gate in associate(&trackers, reports, summary.timestamp)? {
                if gate.reports.is_empty() {
                    continue;
                }
                let index = match gate.tracker {
                    Some(index) => index,
                    None => {
                        trackers.push(Tracker {
                            id: next_track,
                            fusion: SensorFusion::new(self.config.fusion.clone())
                                .context("creating fusion tracker")?,
                            updates: 0,
                            rcs: 0.0,
                            snr_db: 0.0,
                            hits: BTreeMap::new(),
                        });
                        next_track += 1;
                        trackers.len() - 1
                    }
                };
                let tracker = &mut trackers[index];
                for report in &gate.reports {
                    *tracker.hits.entry(report.truth).or_default() += 1;
                    if let Some((rcs, snr_db)) = report.signature {
                        tracker.rcs = rcs;
                        tracker.snr_db = snr_db;
                    }
                }
                let measurements: Vec<SensorMeasurement> =
                    gate.reports.into_iter().map(|report| report.measurement).collect();
                match tracker.fusion.update(&measurements) {
                    Ok(_) => tracker.updates += 1,
                    Err(err) => {
                        fusion_failures += 1;
                        log::warn!("fusion for track {} failed at tick {}: {}", tracker.id, ticks, err);
                    }
                }
            }

            let tracks = track_reports(&trackers);
            if observer(&summary, &snapshot, &tracks).is_break() {
                log::info!("run of {} stopped after {} ticks", self.config.name, ticks);
                break;
            }
        }

        engine.stop();
        let tracks = track_reports(&trackers);
        let features = trackers
            .iter()
            .filter_map(|tracker| {
                tracker
                    .fusion
                    .latest()
                    .map(|track| FeatureVector::from_track(track, tracker.rcs, tracker.snr_db))
            })
            .collect();

        Ok(RunReport {
            scenario: self.config.name.clone(),
            ticks,
            final_timestamp: engine.state().timestamp,
            detections,
            removed,
            target_failures,
            fusion_failures,
            tracks,
            features,
            performance: engine.performance_report(),
        })
    }

    /// Pulse compression, Doppler and CFAR over one coherent burst.
    pub fn execute_offline(&self, burst: &EchoBurst) -> anyhow::Result<OfflineResult> {
        let stage_config = StageConfig {
            sample_rate: burst.sample_rate,
            waveform: burst.waveform.clone(),
            prf: burst.prf,
            cfar: self.config.engine.cfar,
            window: DopplerWindow::Hann,
        };
        let timestamp = Some(burst.timestamp);

        let mut range_stage = RangeStage::new();
        range_stage
            .initialize(&stage_config)
            .context("initializing range stage")?;
        let range_output = range_stage
            .execute(StageInput {
                samples: burst.samples.clone(),
                rows: burst.pulses,
                timestamp,
            })
            .context("executing range stage")?;
        range_stage.cleanup();
        let power_profile = range_output
            .metadata
            .power_profile
            .clone()
            .unwrap_or_default();
        let mut notes = range_output.metadata.notes.clone();

        let mut doppler_stage = DopplerStage::new();
        doppler_stage
            .initialize(&stage_config)
            .context("initializing doppler stage")?;
        let doppler_output = doppler_stage
            .execute(range_output.into_input(timestamp))
            .context("executing doppler stage")?;
        doppler_stage.cleanup();
        let doppler_axis = doppler_output
            .metadata
            .doppler_axis
            .clone()
            .unwrap_or_default();
        notes.extend(doppler_output.metadata.notes.iter().cloned());

        let mut cfar_stage = CfarStage::new();
        cfar_stage
            .initialize(&stage_config)
            .context("initializing cfar stage")?;
        let cfar_output = cfar_stage
            .execute(doppler_output.into_input(timestamp))
            .context("executing cfar stage")?;
        cfar_stage.cleanup();
        notes.extend(cfar_output.metadata.notes.iter().cloned());

        let cell_size = SPEED_OF_LIGHT / (2.0 * burst.sample_rate);
        let detections: Vec<OfflineDetection> = cfar_output
            .metadata
            .detection_cells
            .iter()
            .map(|&(range_bin, doppler_bin)| OfflineDetection {
                range_bin,
                doppler_bin,
                range: range_bin as f64 * cell_size,
                radial_velocity: doppler_axis.get(doppler_bin).copied().unwrap_or_default()
                    * SPEED_OF_LIGHT
                    / (2.0 * burst.carrier_frequency),
            })
            .collect();

        Ok(OfflineResult {
            profile_rms: StatsHelper::rms(&power_profile),
            power_profile,
            detection_count: detections.len(),
            detections,
            doppler_axis,
            notes,
        })
    }
}

fn track_reports(trackers: &[Tracker]) -> Vec<TrackReport> {
    trackers
        .iter()
        .filter_map(|tracker| {
            tracker.fusion.latest().map(|track| TrackReport {
                id: tracker.id,
                truth: tracker.truth(),
                updates: tracker.updates,
                track: track.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::{build_echo_burst, BurstConfig};
    use crate::workflow::config::TargetConfig;
    use radarcore::engine::MotionSpec;
    use radarcore::fusion::FusionMethod;
    use radarcore::physics::TargetType;

    fn single_target(ticks: u64, method: FusionMethod) -> ScenarioConfig {
        let mut config = ScenarioConfig {
            name: "single".into(),
            ticks,
            dt: 0.1,
            targets: vec![TargetConfig {
                name: None,
                position: [8_000.0, 0.0, 500.0],
                velocity: [-100.0, 0.0, 0.0],
                rcs: 10.0,
                swerling: 0,
                target_type: TargetType::Aircraft,
                motion: MotionSpec::ConstantVelocity,
            }],
            ..Default::default()
        };
        config.fusion.method = method;
        config.fusion.particle_count = 200;
        config.infrared.detection_probability = 1.0;
        config
    }

    #[test]
    fn headless_run_fuses_radar_and_infrared() {
        let runner = Runner::new(single_target(10, FusionMethod::Kalman));
        let report = runner.run().unwrap();
        assert_eq!(report.ticks, 10);
        assert_eq!(report.performance.ticks, 10);
        assert_eq!(report.detections, 10);
        assert_eq!(report.tracks.len(), 1);
        assert_eq!(report.features.len(), 1);
        let track = &report.tracks[0];
        assert!(track.truth.is_some());
        assert_eq!(track.updates, 10);
        assert_eq!(track.track.sensor_ids.len(), 2);
        let truth = nalgebra::Vector3::new(8_000.0 - 100.0 * 1.0, 0.0, 500.0);
        assert!((track.track.position() - truth).norm() < 200.0);
        assert!((report.final_timestamp - 1.0).abs() < 1e-9);
    }

    #[test]
    fn observer_can_stop_the_run() {
        let runner = Runner::new(single_target(50, FusionMethod::Adaptive));
        let mut seen = 0;
        let report = runner
            .run_with(|summary, snapshot, tracks| {
                seen += 1;
                assert_eq!(summary.timestamp, snapshot.timestamp);
                assert!(tracks.len() <= 1);
                if seen == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert_eq!(report.ticks, 3);
        assert_eq!(seen, 3);
    }

    #[test]
    fn infrared_only_targets_are_still_tracked() {
        let mut config = single_target(3, FusionMethod::DempsterShafer);
        config.targets[0].position = [300_000.0, 0.0, 500.0];
        let report = Runner::new(config).run().unwrap();
        assert_eq!(report.detections, 0);
        assert_eq!(report.tracks.len(), 1);
        assert_eq!(report.tracks[0].track.sensor_ids, vec!["irst-1".to_string()]);
    }

    #[test]
    fn separated_targets_get_their_own_tracks() {
        let mut config = single_target(8, FusionMethod::Kalman);
        let mut second = config.targets[0].clone();
        second.position = [0.0, 8_000.0, 500.0];
        second.velocity = [0.0, -100.0, 0.0];
        config.targets.push(second);
        let report = Runner::new(config).run().unwrap();
        assert_eq!(report.tracks.len(), 2);
        assert_ne!(report.tracks[0].truth, report.tracks[1].truth);
        for track in &report.tracks {
            assert_eq!(track.updates, 8);
            assert_eq!(track.track.sensor_ids.len(), 2);
        }
    }

    fn report(truth: u64, position: [f64; 3]) -> Report {
        let measurement = SensorMeasurement::new(
            "irst-1",
            0.0,
            nalgebra::Vector3::from(position),
            nalgebra::Vector3::zeros(),
            radarcore::fusion::MeasurementType::Infrared,
            Matrix6::identity() * 100.0,
            0.7,
        )
        .unwrap();
        Report {
            measurement,
            truth: TargetId(truth),
            signature: None,
        }
    }

    #[test]
    fn gating_ignores_entity_labels() {
        let reports = vec![
            report(1, [1_000.0, 0.0, 0.0]),
            report(2, [1_005.0, 0.0, 0.0]),
            report(1, [5_000.0, 0.0, 0.0]),
        ];
        let gates = associate(&[], reports, 0.0).unwrap();
        assert_eq!(gates.len(), 2);
        let truths: Vec<Vec<TargetId>> = gates
            .iter()
            .map(|gate| gate.reports.iter().map(|r| r.truth).collect())
            .collect();
        assert_eq!(truths[0], vec![TargetId(1), TargetId(2)]);
        assert_eq!(truths[1], vec![TargetId(1)]);
        assert!(gates.iter().all(|gate| gate.tracker.is_none()));
    }

    #[test]
    fn tracks_are_predicted_before_gating() {
        let mut fusion = SensorFusion::new(radarcore::fusion::FusionConfig {
            method: FusionMethod::Kalman,
            ..Default::default()
        })
        .unwrap();
        let mut start = report(1, [0.0; 3]).measurement;
        start.velocity = nalgebra::Vector3::new(200.0, 0.0, 0.0);
        fusion.update(&[start]).unwrap();
        let trackers = vec![Tracker {
            id: 1,
            fusion,
            updates: 1,
            rcs: 0.0,
            snr_db: 0.0,
            hits: BTreeMap::new(),
        }];
        let mut moved = report(1, [400.0, 0.0, 0.0]);
        moved.measurement.timestamp = 2.0;
        moved.measurement.velocity = nalgebra::Vector3::new(200.0, 0.0, 0.0);
        let gates = associate(&trackers, vec![moved], 2.0).unwrap();
        assert_eq!(gates.len(), 1);
        assert_eq!(gates[0].tracker, Some(0));
        assert_eq!(gates[0].reports.len(), 1);
    }

    #[test]
    fn offline_chain_finds_burst_targets() {
        let runner = Runner::new(ScenarioConfig::default());
        let burst = build_echo_burst(&BurstConfig::default()).unwrap();
        let result = runner.execute_offline(&burst).unwrap();
        assert_eq!(result.power_profile.len(), burst.range_cells);
        assert_eq!(result.doppler_axis.len(), burst.pulses);
        assert!(result.profile_rms > 0.0);
        let near = |bin: usize| {
            result
                .detections
                .iter()
                .find(|d| d.range_bin.abs_diff(bin) <= 1)
                .copied()
        };
        let first = near(80).expect("12 km target");
        let second = near(200).expect("30 km target");
        assert!(first.radial_velocity > 0.0);
        assert!(second.radial_velocity < 0.0);
        assert!((first.range - 12_000.0).abs() < 300.0);
        assert_eq!(result.detection_count, result.detections.len());
    }
}
