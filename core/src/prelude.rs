use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::processing::cfar::CfarConfig;
use crate::processing::doppler::DopplerWindow;
use crate::processing::waveform::WaveformKind;

/// Shared configuration for each processing stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Complex sampling rate of the fast-time samples (Hz).
    pub sample_rate: f64,
    pub waveform: WaveformKind,
    pub prf: f64,
    pub cfar: CfarConfig,
    pub window: DopplerWindow,
}

/// Input payload for a processing stage.
///
/// Samples are stored row-major: `rows` slow-time rows (pulses or Doppler bins)
/// of `samples.len() / rows` fast-time cells each.
#[derive(Debug, Clone)]
pub struct StageInput {
    pub samples: Vec<Complex64>,
    pub rows: usize,
    pub timestamp: Option<f64>,
}

impl StageInput {
    pub fn single(samples: Vec<Complex64>, timestamp: Option<f64>) -> Self {
        Self {
            samples,
            rows: 1,
            timestamp,
        }
    }

    pub fn columns(&self) -> usize {
        if self.rows == 0 {
            0
        } else {
            self.samples.len() / self.rows
        }
    }
}

/// Output produced by each stage.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub samples: Vec<Complex64>,
    pub rows: usize,
    pub metadata: StageMetadata,
}

impl StageOutput {
    /// Re-feeds this output as the next stage's input.
    pub fn into_input(self, timestamp: Option<f64>) -> StageInput {
        StageInput {
            samples: self.samples,
            rows: self.rows,
            timestamp,
        }
    }
}

/// Metadata used for chaining stages and telemetry.
#[derive(Debug, Clone, Default)]
pub struct StageMetadata {
    pub power_profile: Option<Vec<f64>>,
    pub doppler_axis: Option<Vec<f64>>,
    pub detection_mask: Option<Vec<bool>>,
    pub thresholds: Option<Vec<f64>>,
    /// `(range cell, row)` of each declared detection.
    pub detection_cells: Vec<(usize, usize)>,
    pub notes: Vec<String>,
}

/// Common error type for the radar core.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RadarError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("invalid distribution: {0}")]
    InvalidDistribution(String),
    #[error("unsupported Barker code length {0}")]
    UnsupportedCodeLength(usize),
    #[error("insufficient reference cells: {0}")]
    InsufficientReferenceCells(String),
    #[error("empty input: {0}")]
    EmptyInput(String),
    #[error("degenerate particle set: {0}")]
    DegenerateParticleSet(String),
    #[error("conflicting evidence: {0}")]
    ConflictingEvidence(String),
    #[error("missing parameter: {0}")]
    MissingParameter(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type RadarResult<T> = Result<T, RadarError>;

/// Trait describing object-oriented signal-processing stages.
pub trait ProcessingStage {
    fn initialize(&mut self, config: &StageConfig) -> RadarResult<()>;
    fn execute(&mut self, input: StageInput) -> RadarResult<StageOutput>;
    fn cleanup(&mut self);
}

/// Fails with `InvalidParameter` unless `value` is finite and strictly positive.
pub(crate) fn require_positive(name: &str, value: f64) -> RadarResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(RadarError::InvalidParameter(format!(
            "{} must be positive, got {}",
            name, value
        )))
    }
}
