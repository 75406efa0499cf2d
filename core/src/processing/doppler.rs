use ndarray::{Array2, Axis};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::math::fft::{fftshift, shifted_frequencies, FftHelper};
use crate::physics::constants::SPEED_OF_LIGHT;
use crate::prelude::{
    require_positive, ProcessingStage, RadarError, RadarResult, StageConfig, StageInput,
    StageMetadata, StageOutput,
};
use crate::telemetry::log::LogManager;

/// Taper applied across slow time before the Doppler transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DopplerWindow {
    #[default]
    Rectangular,
    Hann,
}

impl DopplerWindow {
    pub fn coefficients(self, len: usize) -> Vec<f64> {
        match self {
            DopplerWindow::Rectangular => vec![1.0; len],
            DopplerWindow::Hann if len > 1 => (0..len)
                .map(|n| 0.5 * (1.0 - (2.0 * PI * n as f64 / (len - 1) as f64).cos()))
                .collect(),
            DopplerWindow::Hann => vec![1.0; len],
        }
    }
}

/// Range × Doppler spectrum with zero Doppler centred at column `pulses / 2`.
#[derive(Debug, Clone)]
pub struct RangeDopplerMap {
    pub spectrum: Array2<Complex64>,
    /// Doppler frequency (Hz) of each spectrum column.
    pub frequencies: Vec<f64>,
}

impl RangeDopplerMap {
    pub fn power(&self) -> Array2<f64> {
        self.spectrum.mapv(|value| value.norm_sqr())
    }

    /// Radial velocity (m/s, positive closing) of each Doppler column.
    pub fn velocities(&self, carrier_frequency: f64) -> RadarResult<Vec<f64>> {
        require_positive("carrier frequency", carrier_frequency)?;
        Ok(self
            .frequencies
            .iter()
            .map(|f| f * SPEED_OF_LIGHT / (2.0 * carrier_frequency))
            .collect())
    }

    /// `(range bin, Doppler column, power)` of the strongest cell.
    pub fn peak(&self) -> Option<(usize, usize, f64)> {
        self.spectrum
            .indexed_iter()
            .map(|((range, doppler), value)| (range, doppler, value.norm_sqr()))
            .max_by(|a, b| a.2.total_cmp(&b.2))
    }
}

/// Transforms each range bin (row) of a range × pulse matrix along the pulse
/// axis. The output has the input's shape and a frequency axis of `pulses` bins.
pub fn doppler_process(
    data: &Array2<Complex64>,
    prf: f64,
    window: DopplerWindow,
) -> RadarResult<RangeDopplerMap> {
    let (range_bins, pulses) = data.dim();
    if range_bins == 0 || pulses == 0 {
        return Err(RadarError::EmptyInput(format!(
            "range-pulse matrix is {}x{}",
            range_bins, pulses
        )));
    }
    require_positive("prf", prf)?;

    let fft = FftHelper::new(pulses);
    let taper = window.coefficients(pulses);
    let mut spectrum = Array2::<Complex64>::zeros((range_bins, pulses));
    for (row, mut out) in data.axis_iter(Axis(0)).zip(spectrum.axis_iter_mut(Axis(0))) {
        let tapered: Vec<Complex64> = row.iter().zip(taper.iter()).map(|(s, w)| *s * *w).collect();
        let shifted = fftshift(&fft.forward(&tapered));
        for (dst, src) in out.iter_mut().zip(shifted.into_iter()) {
            *dst = src;
        }
    }

    Ok(RangeDopplerMap {
        spectrum,
        frequencies: shifted_frequencies(pulses, prf),
    })
}

/// Doppler stage: input rows are pulses, output rows are Doppler bins.
pub struct DopplerStage {
    prf: Option<f64>,
    window: DopplerWindow,
    logger: LogManager,
}

impl DopplerStage {
    pub fn new() -> Self {
        Self {
            prf: None,
            window: DopplerWindow::Rectangular,
            logger: LogManager::new("doppler"),
        }
    }
}

impl Default for DopplerStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for DopplerStage {
    fn initialize(&mut self, config: &StageConfig) -> RadarResult<()> {
        require_positive("prf", config.prf)?;
        self.prf = Some(config.prf);
        self.window = config.window;
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> RadarResult<StageOutput> {
        let prf = self
            .prf
            .ok_or_else(|| RadarError::InvalidState("doppler stage not initialized".into()))?;
        let pulses = input.rows;
        let cells = input.columns();
        if pulses == 0 || cells == 0 {
            return Err(RadarError::EmptyInput("no samples provided".into()));
        }

        let matrix = Array2::from_shape_fn((cells, pulses), |(cell, pulse)| {
            input.samples[pulse * cells + cell]
        });
        let map = doppler_process(&matrix, prf, self.window)?;

        let mut samples = Vec::with_capacity(cells * pulses);
        for doppler in 0..pulses {
            samples.extend(map.spectrum.column(doppler).iter().copied());
        }

        let peak = map.peak();
        if let Some((cell, doppler, power)) = peak {
            self.logger.record(&format!(
                "DopplerStage peak cell {} at {:.1} Hz ({:.3e})",
                cell, map.frequencies[doppler], power
            ));
        }

        Ok(StageOutput {
            samples,
            rows: pulses,
            metadata: StageMetadata {
                doppler_axis: Some(map.frequencies),
                notes: vec![format!("doppler bins {}", pulses)],
                ..Default::default()
            },
        })
    }

    fn cleanup(&mut self) {
        self.prf = None;
    }
}
