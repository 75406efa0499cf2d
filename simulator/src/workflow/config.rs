use anyhow::{anyhow, Context};
use nalgebra::Vector3;
use radarcore::engine::{
    EngineConfig, MissileDynamics, MissileSpec, MotionSpec, SimulationEngine, TargetSpec,
};
use radarcore::fusion::FusionConfig;
use radarcore::interface::TargetId;
use radarcore::physics::{RadarParameters, SwerlingCase, TargetType};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub position: [f64; 3],
    #[serde(default)]
    pub velocity: [f64; 3],
    /// Mean RCS (m²).
    pub rcs: f64,
    #[serde(default)]
    pub swerling: u8,
    #[serde(default = "default_target_type")]
    pub target_type: TargetType,
    #[serde(default)]
    pub motion: MotionSpec,
}

fn default_target_type() -> TargetType {
    TargetType::Aircraft
}

impl TargetConfig {
    pub fn to_spec(&self) -> anyhow::Result<TargetSpec> {
        let swerling = SwerlingCase::try_from(self.swerling)?;
        Ok(TargetSpec::new(
            Vector3::from(self.position),
            Vector3::from(self.velocity),
            self.rcs,
        )
        .with_swerling(swerling)
        .with_type(self.target_type)
        .with_motion(self.motion.to_model()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MissileConfig {
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    #[serde(default = "default_missile_rcs")]
    pub rcs: f64,
    #[serde(default = "default_missile_swerling")]
    pub swerling: u8,
    #[serde(default)]
    pub dynamics: MissileDynamics,
    /// Index into `targets` of the entity to home on.
    #[serde(default)]
    pub target: Option<usize>,
}

fn default_missile_rcs() -> f64 {
    0.1
}

fn default_missile_swerling() -> u8 {
    1
}

impl MissileConfig {
    pub fn to_spec(&self, target_ids: &[TargetId]) -> anyhow::Result<MissileSpec> {
        let mut spec = MissileSpec::new(Vector3::from(self.position), Vector3::from(self.velocity))
            .with_dynamics(self.dynamics);
        spec.mean_rcs = self.rcs;
        spec.swerling = SwerlingCase::try_from(self.swerling)?;
        if let Some(index) = self.target {
            let id = target_ids
                .get(index)
                .ok_or_else(|| anyhow!("missile targets index {} but only {} targets exist", index, target_ids.len()))?;
            spec = spec.guided_at(*id);
        }
        Ok(spec)
    }
}

/// Passive infrared sensor synthesised from ground truth.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfraredConfig {
    pub enabled: bool,
    pub sensor_id: String,
    pub position_std: f64,
    pub velocity_std: f64,
    pub confidence: f64,
    pub detection_probability: f64,
}

impl Default for InfraredConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sensor_id: "irst-1".into(),
            position_std: 30.0,
            velocity_std: 10.0,
            confidence: 0.7,
            detection_probability: 0.9,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub name: String,
    /// Radar block, validated by `RadarParameters::from_value`.
    pub radar: Option<serde_json::Value>,
    pub engine: EngineConfig,
    pub targets: Vec<TargetConfig>,
    pub missiles: Vec<MissileConfig>,
    pub ticks: u64,
    pub dt: f64,
    pub fusion: FusionConfig,
    pub infrared: InfraredConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: "default".into(),
            radar: None,
            engine: EngineConfig::default(),
            targets: Vec::new(),
            missiles: Vec::new(),
            ticks: 100,
            dt: 0.1,
            fusion: FusionConfig::default(),
            infrared: InfraredConfig::default(),
        }
    }
}

impl ScenarioConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading scenario config {}", path_ref.display()))?;
        let config: ScenarioConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing scenario config {}", path_ref.display()))?;
        config
            .validate()
            .with_context(|| format!("validating scenario config {}", path_ref.display()))?;
        Ok(config)
    }

    /// Two crossing aircraft and an interceptor launched at the first.
    pub fn demo() -> Self {
        Self {
            name: "demo".into(),
            targets: vec![
                TargetConfig {
                    name: Some("inbound".into()),
                    position: [20_000.0, 5_000.0, 3_000.0],
                    velocity: [-200.0, 0.0, 0.0],
                    rcs: 5.0,
                    swerling: 1,
                    target_type: TargetType::Aircraft,
                    motion: MotionSpec::ConstantVelocity,
                },
                TargetConfig {
                    name: Some("orbit".into()),
                    position: [12_000.0, -8_000.0, 2_000.0],
                    velocity: [0.0, 150.0, 0.0],
                    rcs: 2.0,
                    swerling: 3,
                    target_type: TargetType::Aircraft,
                    motion: MotionSpec::CoordinatedTurn { turn_rate: 0.05 },
                },
            ],
            missiles: vec![MissileConfig {
                position: [0.0, 0.0, 10.0],
                velocity: [50.0, 10.0, 50.0],
                rcs: default_missile_rcs(),
                swerling: default_missile_swerling(),
                dynamics: MissileDynamics::default(),
                target: Some(0),
            }],
            ..Default::default()
        }
    }

    pub fn with_overrides(mut self, ticks: Option<u64>, dt: Option<f64>, seed: Option<u64>) -> Self {
        if let Some(ticks) = ticks {
            self.ticks = ticks;
        }
        if let Some(dt) = dt {
            self.dt = dt;
        }
        if let Some(seed) = seed {
            self.engine.seed = seed;
            self.fusion.seed = seed;
        }
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(anyhow!("dt must be positive, got {}", self.dt));
        }
        self.radar_parameters()?;
        for (index, target) in self.targets.iter().enumerate() {
            SwerlingCase::try_from(target.swerling)
                .with_context(|| format!("target {}", index))?;
        }
        for (index, missile) in self.missiles.iter().enumerate() {
            SwerlingCase::try_from(missile.swerling)
                .with_context(|| format!("missile {}", index))?;
            if let Some(target) = missile.target {
                if target >= self.targets.len() {
                    return Err(anyhow!("missile {} targets unknown index {}", index, target));
                }
            }
        }
        Ok(())
    }

    pub fn radar_parameters(&self) -> anyhow::Result<RadarParameters> {
        match &self.radar {
            Some(value) => Ok(RadarParameters::from_value(value).context("radar block")?),
            None => Ok(RadarParameters::default()),
        }
    }

    /// Builds the engine and places the scenario; returns target ids in file order.
    pub fn build_engine(&self) -> anyhow::Result<(SimulationEngine, Vec<TargetId>)> {
        let mut engine = SimulationEngine::new(self.radar_parameters()?, self.engine.clone())
            .context("creating simulation engine")?;
        let mut ids = Vec::with_capacity(self.targets.len());
        for (index, target) in self.targets.iter().enumerate() {
            let id = engine
                .add_target(target.to_spec()?)
                .with_context(|| format!("adding target {}", index))?;
            ids.push(id);
        }
        for (index, missile) in self.missiles.iter().enumerate() {
            engine
                .add_missile(missile.to_spec(&ids)?)
                .with_context(|| format!("adding missile {}", index))?;
        }
        Ok((engine, ids))
    }
}
