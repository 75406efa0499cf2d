//! Constant false-alarm rate detection over a 1-D power profile.
//!
//! For every cell under test (CUT) a reference window of `reference_cells` on
//! each side is taken beyond `guard_cells` guard cells. Near the profile edges
//! the window slides inward so it always fits; the guard region stays centred on
//! the CUT and the multiplier is recomputed for however many reference cells
//! remain. Inputs are square-law (power) samples.

use serde::{Deserialize, Serialize};

use crate::math::stats::StatsHelper;
use crate::prelude::{
    ProcessingStage, RadarError, RadarResult, StageConfig, StageInput, StageMetadata, StageOutput,
};
use crate::telemetry::log::LogManager;

const OS_BISECTION_STEPS: usize = 200;

/// CFAR noise estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CfarVariant {
    CellAveraging,
    /// Order statistic; `rank` is 1-based, defaulting to three quarters of the
    /// reference cells.
    OrderStatistic { rank: Option<usize> },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CfarConfig {
    pub variant: CfarVariant,
    /// Guard cells on each side of the CUT.
    pub guard_cells: usize,
    /// Reference cells on each side of the CUT.
    pub reference_cells: usize,
    /// Design probability of false alarm.
    pub pfa: f64,
}

impl Default for CfarConfig {
    fn default() -> Self {
        Self {
            variant: CfarVariant::CellAveraging,
            guard_cells: 2,
            reference_cells: 16,
            pfa: 1e-6,
        }
    }
}

/// Detection decision and threshold per input cell; both match the input length.
#[derive(Debug, Clone, PartialEq)]
pub struct CfarOutput {
    pub detections: Vec<bool>,
    pub thresholds: Vec<f64>,
}

impl CfarOutput {
    pub fn detection_count(&self) -> usize {
        self.detections.iter().filter(|&&hit| hit).count()
    }

    pub fn detected_cells(&self) -> impl Iterator<Item = usize> + '_ {
        self.detections
            .iter()
            .enumerate()
            .filter_map(|(idx, &hit)| hit.then_some(idx))
    }
}

/// CA-CFAR multiplier `α = N·(Pfa^(−1/N) − 1)`.
pub fn ca_multiplier(pfa: f64, reference_cells: usize) -> f64 {
    let n = reference_cells as f64;
    n * (pfa.powf(-1.0 / n) - 1.0)
}

/// OS-CFAR multiplier solving `Π_{i<k} (N−i)/(N−i+α) = Pfa` for the `rank`-th
/// smallest of `reference_cells` exponential samples.
pub fn os_multiplier(pfa: f64, reference_cells: usize, rank: usize) -> f64 {
    let n = reference_cells as f64;
    let false_alarm = |alpha: f64| {
        (0..rank)
            .map(|i| (n - i as f64) / (n - i as f64 + alpha))
            .product::<f64>()
    };
    let mut low = 0.0;
    let mut high = 1.0;
    while false_alarm(high) > pfa {
        high *= 2.0;
    }
    for _ in 0..OS_BISECTION_STEPS {
        let mid = 0.5 * (low + high);
        if false_alarm(mid) > pfa {
            low = mid;
        } else {
            high = mid;
        }
    }
    0.5 * (low + high)
}

#[derive(Debug, Clone)]
pub struct CfarDetector {
    config: CfarConfig,
}

impl CfarDetector {
    pub fn new(config: CfarConfig) -> RadarResult<Self> {
        if !(config.pfa > 0.0 && config.pfa < 1.0) {
            return Err(RadarError::InvalidParameter(format!(
                "pfa must lie in (0, 1), got {}",
                config.pfa
            )));
        }
        if config.reference_cells == 0 {
            return Err(RadarError::InsufficientReferenceCells(
                "at least one reference cell per side is required".into(),
            ));
        }
        if let CfarVariant::OrderStatistic { rank: Some(0) } = config.variant {
            return Err(RadarError::InvalidParameter("OS-CFAR rank is 1-based".into()));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &CfarConfig {
        &self.config
    }

    /// Cells spanned by guard and reference cells on both sides plus the CUT.
    pub fn window_len(&self) -> usize {
        2 * (self.config.guard_cells + self.config.reference_cells) + 1
    }

    /// Multiplier for the nominal window (`2 * reference_cells` cells).
    pub fn nominal_multiplier(&self) -> f64 {
        let n = 2 * self.config.reference_cells;
        self.multiplier(n)
    }

    fn rank_for(&self, cells: usize) -> usize {
        match self.config.variant {
            CfarVariant::OrderStatistic { rank: Some(rank) } => rank.min(cells),
            _ => ((3 * cells + 3) / 4).clamp(1, cells),
        }
    }

    fn multiplier(&self, cells: usize) -> f64 {
        match self.config.variant {
            CfarVariant::CellAveraging => ca_multiplier(self.config.pfa, cells),
            CfarVariant::OrderStatistic { .. } => {
                os_multiplier(self.config.pfa, cells, self.rank_for(cells))
            }
        }
    }

    pub fn detect(&self, profile: &[f64]) -> RadarResult<CfarOutput> {
        if profile.is_empty() {
            return Err(RadarError::EmptyInput("range profile".into()));
        }
        let window = self.window_len();
        if profile.len() < window {
            return Err(RadarError::InsufficientReferenceCells(format!(
                "window of {} cells does not fit a profile of {}",
                window,
                profile.len()
            )));
        }

        let half = self.config.guard_cells + self.config.reference_cells;
        let guard = self.config.guard_cells;
        let mut multipliers: Vec<Option<f64>> = vec![None; window + 1];
        let mut detections = Vec::with_capacity(profile.len());
        let mut thresholds = Vec::with_capacity(profile.len());
        let mut reference = Vec::with_capacity(window);

        for (cut, &power) in profile.iter().enumerate() {
            let start = cut.saturating_sub(half).min(profile.len() - window);
            reference.clear();
            reference.extend(
                (start..start + window)
                    .filter(|&idx| idx.abs_diff(cut) > guard)
                    .map(|idx| profile[idx]),
            );
            let cells = reference.len();
            let alpha = *multipliers[cells].get_or_insert_with(|| self.multiplier(cells));

            let estimate = match self.config.variant {
                CfarVariant::CellAveraging => StatsHelper::mean(&reference),
                CfarVariant::OrderStatistic { .. } => {
                    StatsHelper::order_statistic(&mut reference, self.rank_for(cells))
                        .unwrap_or_default()
                }
            };
            let threshold = alpha * estimate;
            detections.push(power > threshold);
            thresholds.push(threshold);
        }

        Ok(CfarOutput {
            detections,
            thresholds,
        })
    }
}

/// Detection stage: square-law, collapse rows by maximum, then CFAR.
pub struct CfarStage {
    detector: Option<CfarDetector>,
    logger: LogManager,
}

impl CfarStage {
    pub fn new() -> Self {
        Self {
            detector: None,
            logger: LogManager::new("cfar"),
        }
    }
}

impl Default for CfarStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for CfarStage {
    fn initialize(&mut self, config: &StageConfig) -> RadarResult<()> {
        self.detector = Some(CfarDetector::new(config.cfar)?);
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> RadarResult<StageOutput> {
        let detector = self
            .detector
            .as_ref()
            .ok_or_else(|| RadarError::InvalidState("cfar stage not initialized".into()))?;

        let columns = input.columns();
        if input.rows == 0 || columns == 0 {
            return Err(RadarError::EmptyInput("no samples to scan".into()));
        }
        if input.rows * columns != input.samples.len() {
            return Err(RadarError::InvalidParameter(format!(
                "{} samples do not form {} rows",
                input.samples.len(),
                input.rows
            )));
        }

        let mut profile = vec![0.0_f64; columns];
        let mut peak_rows = vec![0_usize; columns];
        for (row_index, row) in input.samples.chunks(columns).enumerate() {
            for (cell, value) in row.iter().enumerate() {
                let power = value.norm_sqr();
                if power > profile[cell] {
                    profile[cell] = power;
                    peak_rows[cell] = row_index;
                }
            }
        }

        let output = detector.detect(&profile)?;
        let detection_cells: Vec<(usize, usize)> = output
            .detected_cells()
            .map(|cell| (cell, peak_rows[cell]))
            .collect();
        self.logger
            .record(&format!("CfarStage detections {}", detection_cells.len()));

        Ok(StageOutput {
            samples: input.samples,
            rows: input.rows,
            metadata: StageMetadata {
                power_profile: Some(profile),
                detection_mask: Some(output.detections),
                thresholds: Some(output.thresholds),
                notes: vec![format!(
                    "alpha {:.3} over {} reference cells",
                    detector.nominal_multiplier(),
                    2 * detector.config().reference_cells
                )],
                detection_cells,
                ..Default::default()
            },
        })
    }

    fn cleanup(&mut self) {
        self.detector = None;
    }
}
