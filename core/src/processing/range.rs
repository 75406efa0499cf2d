use num_complex::Complex64;

use crate::math::fft::FftHelper;
use crate::math::stats::StatsHelper;
use crate::prelude::{
    ProcessingStage, RadarError, RadarResult, StageConfig, StageInput, StageMetadata, StageOutput,
};
use crate::processing::waveform::Waveform;
use crate::telemetry::log::LogManager;

/// Correlates `received` with `replica` (convolution with the time-reversed
/// conjugate replica).
///
/// Output has the full correlation length `N + M - 1`. Index `k` holds lag
/// `k - (M - 1)`, so an echo starting at sample `d` peaks at `d + M - 1` and a
/// zero-delay echo peaks at `M - 1`.
pub fn matched_filter(received: &[Complex64], replica: &[Complex64]) -> RadarResult<Vec<Complex64>> {
    if received.is_empty() {
        return Err(RadarError::EmptyInput("received samples".into()));
    }
    if replica.is_empty() {
        return Err(RadarError::EmptyInput("replica waveform".into()));
    }

    let size = received.len() + replica.len() - 1;
    let fft = FftHelper::new(size);
    let kernel: Vec<Complex64> = replica.iter().rev().map(|s| s.conj()).collect();

    let spectrum = fft.forward(received);
    let response = fft.forward(&kernel);
    let product: Vec<Complex64> = spectrum
        .iter()
        .zip(response.iter())
        .map(|(x, h)| x * h)
        .collect();
    Ok(fft.inverse(&product))
}

/// Matched-filter output re-aligned to the input: element `d` is the response
/// to an echo starting at sample `d`. Length equals `received.len()`.
pub fn compress_aligned(received: &[Complex64], replica: &[Complex64]) -> RadarResult<Vec<Complex64>> {
    let full = matched_filter(received, replica)?;
    let start = replica.len() - 1;
    Ok(full[start..start + received.len()].to_vec())
}

/// Range-processing stage: pulse compression against the configured waveform.
///
/// Each row is compressed independently and scaled by `1/sqrt(E)` (E = replica
/// energy), so unit-variance noise stays unit-variance and a matched echo gains
/// the full time-bandwidth product.
pub struct RangeStage {
    replica: Option<Waveform>,
    logger: LogManager,
}

impl RangeStage {
    pub fn new() -> Self {
        Self {
            replica: None,
            logger: LogManager::new("range"),
        }
    }

    pub fn replica(&self) -> Option<&Waveform> {
        self.replica.as_ref()
    }
}

impl Default for RangeStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for RangeStage {
    fn initialize(&mut self, config: &StageConfig) -> RadarResult<()> {
        self.replica = Some(Waveform::generate(&config.waveform, config.sample_rate)?);
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> RadarResult<StageOutput> {
        let replica = self
            .replica
            .as_ref()
            .ok_or_else(|| RadarError::InvalidState("range stage not initialized".into()))?;

        let columns = input.columns();
        if input.rows == 0 || columns == 0 {
            return Err(RadarError::EmptyInput("no samples to compress".into()));
        }
        if input.rows * columns != input.samples.len() {
            return Err(RadarError::InvalidParameter(format!(
                "{} samples do not form {} rows",
                input.samples.len(),
                input.rows
            )));
        }

        let scale = 1.0 / replica.energy().sqrt();
        let mut samples = Vec::with_capacity(input.samples.len());
        let mut power_profile = vec![0.0; columns];
        for row in input.samples.chunks(columns) {
            let compressed = compress_aligned(row, &replica.samples)?;
            for (cell, value) in compressed.into_iter().enumerate() {
                let value = value * scale;
                power_profile[cell] += value.norm_sqr() / input.rows as f64;
                samples.push(value);
            }
        }

        let mean_power = StatsHelper::mean(&power_profile);
        self.logger
            .record(&format!("RangeStage mean power {:.4}", mean_power));

        Ok(StageOutput {
            samples,
            rows: input.rows,
            metadata: StageMetadata {
                power_profile: Some(power_profile),
                notes: vec![format!("range mean power {:.4}", mean_power)],
                ..Default::default()
            },
        })
    }

    fn cleanup(&mut self) {
        self.replica = None;
    }
}
