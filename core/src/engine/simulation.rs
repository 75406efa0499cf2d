//! Discrete time-stepped simulation engine.
//!
//! A tick runs in two phases. Kinematics first: every entity is propagated,
//! then intercepts and ground impacts are collected and removed in one pass so
//! iteration order is never disturbed. Detection second: each surviving entity
//! is observed in insertion order at the post-step clock.

use nalgebra::Vector3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::engine::motion::{closest_approach, KinematicState};
use crate::engine::sensor::RadarSensor;
use crate::engine::state::{
    EngineStatus, MissileSpec, SimulationSnapshot, SimulationState, Target, TargetSpec,
};
use crate::interface::detection::{Detection, MeasurementAccuracy, TargetId};
use crate::physics::atmospheric::AtmosphericConditions;
use crate::physics::radar_equation::RadarParameters;
use crate::physics::rcs::TargetType;
use crate::prelude::{RadarError, RadarResult};
use crate::processing::cfar::CfarConfig;
use crate::processing::waveform::WaveformKind;
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::{MetricsRecorder, PerformanceReport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub radar_position: Vector3<f64>,
    /// Fast-time sampling rate (Hz); one range cell is `c / (2 · sample_rate)`.
    pub sample_rate: f64,
    pub range_cells: usize,
    /// Pulses integrated noncoherently per dwell.
    pub pulses_per_dwell: u32,
    pub waveform: WaveformKind,
    pub cfar: CfarConfig,
    /// `None` disables gaseous attenuation.
    pub atmosphere: Option<AtmosphericConditions>,
    /// `None` reports true geometry.
    pub measurement_noise: Option<MeasurementAccuracy>,
    pub detection_history_limit: usize,
    /// Missile-to-target separation (m) that counts as an intercept.
    pub kill_radius: f64,
    pub max_targets: Option<usize>,
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            radar_position: Vector3::zeros(),
            sample_rate: 1e6,
            range_cells: 1024,
            pulses_per_dwell: 1,
            waveform: WaveformKind::default(),
            cfar: CfarConfig::default(),
            atmosphere: Some(AtmosphericConditions::default()),
            measurement_noise: None,
            detection_history_limit: 10_000,
            kill_radius: 50.0,
            max_targets: None,
            seed: 0,
        }
    }
}

/// Outcome of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    pub tick: u64,
    pub timestamp: f64,
    pub detections: Vec<Detection>,
    /// Entities removed by intercept or ground impact this tick.
    pub removed: Vec<TargetId>,
    /// Entities skipped because their observation failed.
    pub failures: Vec<TargetId>,
}

pub struct SimulationEngine {
    config: EngineConfig,
    status: EngineStatus,
    state: SimulationState,
    sensor: RadarSensor,
    rng: ChaCha8Rng,
    next_id: u64,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

impl SimulationEngine {
    pub fn new(radar: RadarParameters, config: EngineConfig) -> RadarResult<Self> {
        if !(config.kill_radius >= 0.0) {
            return Err(RadarError::InvalidParameter(format!(
                "kill radius must be non-negative, got {}",
                config.kill_radius
            )));
        }
        let sensor = RadarSensor::new(radar, &config)?;
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            status: EngineStatus::Idle,
            state: SimulationState::default(),
            sensor,
            next_id: 1,
            metrics: Arc::new(MetricsRecorder::new()),
            logger: LogManager::new("engine"),
        })
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn radar(&self) -> &RadarParameters {
        self.sensor.radar()
    }

    pub fn radar_position(&self) -> &Vector3<f64> {
        self.sensor.position()
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        Arc::clone(&self.metrics)
    }

    pub fn performance_report(&self) -> PerformanceReport {
        self.metrics.snapshot()
    }

    /// `Idle -> Running`. Starting a running engine is a no-op.
    pub fn start(&mut self) -> RadarResult<()> {
        match self.status {
            EngineStatus::Idle => {
                self.status = EngineStatus::Running;
                self.logger.record("engine started");
                Ok(())
            }
            EngineStatus::Running => Ok(()),
            EngineStatus::Stopped => Err(RadarError::InvalidState(
                "a stopped engine cannot be restarted".into(),
            )),
        }
    }

    /// Moves to `Stopped` from any state; the clock and population are kept.
    pub fn stop(&mut self) {
        if self.status != EngineStatus::Stopped {
            self.logger.record(&format!(
                "engine stopped at t={:.3} after {} ticks",
                self.state.timestamp, self.state.tick
            ));
        }
        self.status = EngineStatus::Stopped;
    }

    fn require_mutable(&self, operation: &str) -> RadarResult<()> {
        match self.status {
            EngineStatus::Idle | EngineStatus::Running => Ok(()),
            EngineStatus::Stopped => Err(RadarError::InvalidState(format!(
                "{} is not allowed on a stopped engine",
                operation
            ))),
        }
    }

    fn allocate_id(&mut self) -> RadarResult<TargetId> {
        if let Some(limit) = self.config.max_targets {
            if self.state.entity_count() >= limit {
                return Err(RadarError::InvalidState(format!(
                    "target capacity of {} reached",
                    limit
                )));
            }
        }
        let id = TargetId(self.next_id);
        self.next_id += 1;
        Ok(id)
    }

    pub fn add_target(&mut self, spec: TargetSpec) -> RadarResult<TargetId> {
        self.require_mutable("add_target")?;
        let id = self.allocate_id()?;
        let target = spec.build(id)?;
        self.logger.record(&format!(
            "added {} {:?} at {:?}",
            id, target.target_type, target.kinematics.position
        ));
        self.state.targets.push(target);
        Ok(id)
    }

    pub fn add_missile(&mut self, spec: MissileSpec) -> RadarResult<TargetId> {
        self.require_mutable("add_missile")?;
        let id = self.allocate_id()?;
        let missile = spec.build(id)?;
        self.logger.record(&format!(
            "launched {} guided at {:?}",
            id, missile.guidance
        ));
        self.state.missiles.push(missile);
        Ok(id)
    }

    /// Removes a target or missile. Returns whether anything was removed.
    pub fn remove_target(&mut self, id: TargetId) -> RadarResult<bool> {
        self.require_mutable("remove_target")?;
        let before = self.state.entity_count();
        self.state.targets.retain(|t| t.id != id);
        self.state.missiles.retain(|m| m.id != id);
        Ok(self.state.entity_count() < before)
    }

    pub fn advance_tick(&mut self, dt: f64) -> RadarResult<TickSummary> {
        if self.status != EngineStatus::Running {
            return Err(RadarError::InvalidState(format!(
                "advance_tick requires a running engine, engine is {:?}",
                self.status
            )));
        }
        if !(dt.is_finite() && dt > 0.0) {
            return Err(RadarError::InvalidParameter(format!(
                "time step must be positive, got {}",
                dt
            )));
        }
        let started = Instant::now();

        let removed = self.integrate(dt);
        self.state.timestamp += dt;
        self.state.tick += 1;
        let (detections, failures) = self.observe_all();

        self.state.detections.extend(detections.iter().cloned());
        let limit = self.config.detection_history_limit;
        while self.state.detections.len() > limit {
            self.state.detections.pop_front();
        }

        self.metrics.record_tick(started.elapsed(), detections.len());
        self.logger.record(&format!(
            "tick {} t={:.3}: {} entities, {} detections, {} removed, {} failed",
            self.state.tick,
            self.state.timestamp,
            self.state.entity_count(),
            detections.len(),
            removed.len(),
            failures.len()
        ));

        Ok(TickSummary {
            tick: self.state.tick,
            timestamp: self.state.timestamp,
            detections,
            removed,
            failures,
        })
    }

    /// Advances `ticks` times, stopping at the first error.
    pub fn run(&mut self, ticks: u64, dt: f64) -> RadarResult<Vec<TickSummary>> {
        (0..ticks).map(|_| self.advance_tick(dt)).collect()
    }

    pub fn snapshot(&self, recent_detections: usize) -> SimulationSnapshot {
        SimulationSnapshot::capture(self.status, &self.state, recent_detections)
    }

    /// Propagates every entity, then removes intercepted pairs and missiles
    /// that hit the ground.
    fn integrate(&mut self, dt: f64) -> Vec<TargetId> {
        let before: Vec<(TargetId, KinematicState)> = self
            .state
            .targets
            .iter()
            .map(|t| (t.id, t.kinematics))
            .chain(self.state.missiles.iter().map(|m| (m.id, m.kinematics)))
            .collect();
        let prior = |id: TargetId| before.iter().find(|(other, _)| *other == id).map(|(_, k)| k);

        for target in self.state.targets.iter_mut() {
            target.kinematics = target.motion.propagate(&target.kinematics, dt);
        }
        for missile in self.state.missiles.iter_mut() {
            let aim = missile.guidance.and_then(prior);
            missile.kinematics = missile
                .dynamics
                .step(&missile.kinematics, aim, missile.elapsed, dt);
            missile.elapsed += dt;
        }

        let mut removed: Vec<TargetId> = Vec::new();
        for missile in &self.state.missiles {
            if removed.contains(&missile.id) {
                continue;
            }
            let intercepted = missile.guidance.filter(|id| !removed.contains(id)).and_then(|id| {
                let target_now = self.state.kinematics_of(id)?;
                let target_then = prior(id)?;
                let missile_then = prior(missile.id)?;
                let miss = closest_approach(
                    &missile_then.position,
                    &missile.kinematics.position,
                    &target_then.position,
                    &target_now.position,
                );
                (miss <= self.config.kill_radius).then_some((id, miss))
            });
            if let Some((target, miss)) = intercepted {
                self.logger
                    .record(&format!("{} intercepted {} (miss {:.1} m)", missile.id, target, miss));
                removed.push(missile.id);
                removed.push(target);
            } else if missile.kinematics.position.z < 0.0 {
                self.logger.record(&format!("{} impacted the ground", missile.id));
                removed.push(missile.id);
            }
        }

        if !removed.is_empty() {
            self.state.targets.retain(|t| !removed.contains(&t.id));
            self.state.missiles.retain(|m| !removed.contains(&m.id));
        }
        removed
    }

    fn observe_all(&mut self) -> (Vec<Detection>, Vec<TargetId>) {
        let SimulationEngine {
            state,
            sensor,
            rng,
            metrics,
            logger,
            ..
        } = self;
        let scan = state.tick;
        let timestamp = state.timestamp;

        let entities = state
            .targets
            .iter_mut()
            .map(|target| {
                let Target {
                    id,
                    kinematics,
                    target_type,
                    rcs,
                    ..
                } = target;
                (*id, &*kinematics, *target_type, rcs)
            })
            .chain(
                state
                    .missiles
                    .iter_mut()
                    .map(|m| (m.id, &m.kinematics, TargetType::Missile, &mut m.rcs)),
            );

        let mut detections = Vec::new();
        let mut failures = Vec::new();
        for (id, kinematics, target_type, rcs) in entities {
            match sensor.observe(id, kinematics, target_type, rcs, scan, timestamp, &mut *rng) {
                Ok(Some(detection)) => detections.push(detection),
                Ok(None) => {}
                Err(err) => {
                    logger.warn(&format!("skipping {} this tick: {}", id, err));
                    metrics.record_target_failure();
                    failures.push(id);
                }
            }
        }
        (detections, failures)
    }
}
