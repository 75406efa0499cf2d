//! Transmit waveform synthesis: plain pulse, linear-FM chirp and Barker codes.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::prelude::{require_positive, RadarError, RadarResult};

static BARKER2: [i8; 2] = [1, -1];
static BARKER3: [i8; 3] = [1, 1, -1];
static BARKER4: [i8; 4] = [1, 1, -1, 1];
static BARKER5: [i8; 5] = [1, 1, 1, -1, 1];
static BARKER7: [i8; 7] = [1, 1, 1, -1, -1, 1, -1];
static BARKER11: [i8; 11] = [1, 1, 1, -1, -1, -1, 1, -1, -1, 1, -1];
static BARKER13: [i8; 13] = [1, 1, 1, 1, 1, -1, -1, 1, 1, -1, 1, -1, 1];

/// Binary phase pattern (+1/−1) of the Barker code of `length` chips.
pub fn barker_code(length: usize) -> RadarResult<&'static [i8]> {
    match length {
        2 => Ok(&BARKER2),
        3 => Ok(&BARKER3),
        4 => Ok(&BARKER4),
        5 => Ok(&BARKER5),
        7 => Ok(&BARKER7),
        11 => Ok(&BARKER11),
        13 => Ok(&BARKER13),
        other => Err(RadarError::UnsupportedCodeLength(other)),
    }
}

/// Waveform request, as carried in stage and engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaveformKind {
    /// Unmodulated rectangular pulse.
    Pulse { duration: f64 },
    /// Linear-FM sweep from `start_frequency` to `stop_frequency` (baseband Hz).
    Chirp {
        start_frequency: f64,
        stop_frequency: f64,
        duration: f64,
    },
    /// Bi-phase Barker code of `length` chips, each `chip_width` seconds long.
    Barker { length: usize, chip_width: f64 },
}

impl Default for WaveformKind {
    fn default() -> Self {
        WaveformKind::Barker {
            length: 13,
            chip_width: 1e-6,
        }
    }
}

/// Sampled complex baseband waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub kind: WaveformKind,
    pub sample_rate: f64,
    pub samples: Vec<Complex64>,
}

impl Waveform {
    pub fn generate(kind: &WaveformKind, sample_rate: f64) -> RadarResult<Self> {
        require_positive("sample_rate", sample_rate)?;
        let samples = match *kind {
            WaveformKind::Pulse { duration } => pulse(duration, sample_rate)?,
            WaveformKind::Chirp {
                start_frequency,
                stop_frequency,
                duration,
            } => chirp(start_frequency, stop_frequency, duration, sample_rate)?,
            WaveformKind::Barker { length, chip_width } => {
                phase_coded(length, chip_width, sample_rate)?
            }
        };
        Ok(Self {
            kind: kind.clone(),
            sample_rate,
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sum of squared magnitudes, the matched-filter peak for a unit echo.
    pub fn energy(&self) -> f64 {
        self.samples.iter().map(|s| s.norm_sqr()).sum()
    }
}

fn sample_count(duration: f64, sample_rate: f64) -> RadarResult<usize> {
    require_positive("duration", duration)?;
    let count = (duration * sample_rate).round();
    if count < 1.0 {
        return Err(RadarError::InvalidParameter(format!(
            "duration {} s holds no samples at {} Hz",
            duration, sample_rate
        )));
    }
    Ok(count as usize)
}

/// Constant-envelope, zero-phase pulse.
pub fn pulse(duration: f64, sample_rate: f64) -> RadarResult<Vec<Complex64>> {
    let count = sample_count(duration, sample_rate)?;
    Ok(vec![Complex64::new(1.0, 0.0); count])
}

/// Linear-FM chirp with instantaneous frequency sweeping linearly over `duration`.
pub fn chirp(
    start_frequency: f64,
    stop_frequency: f64,
    duration: f64,
    sample_rate: f64,
) -> RadarResult<Vec<Complex64>> {
    if !start_frequency.is_finite() || !stop_frequency.is_finite() {
        return Err(RadarError::InvalidParameter("chirp frequencies must be finite".into()));
    }
    let count = sample_count(duration, sample_rate)?;
    let rate = (stop_frequency - start_frequency) / duration;
    Ok((0..count)
        .map(|n| {
            let t = n as f64 / sample_rate;
            let phase = 2.0 * PI * (start_frequency * t + 0.5 * rate * t * t);
            Complex64::from_polar(1.0, phase)
        })
        .collect())
}

/// Barker-coded pulse: each chip is held for `chip_width * sample_rate` samples.
pub fn phase_coded(length: usize, chip_width: f64, sample_rate: f64) -> RadarResult<Vec<Complex64>> {
    let code = barker_code(length)?;
    let per_chip = sample_count(chip_width, sample_rate)?;
    Ok(code
        .iter()
        .flat_map(|&chip| std::iter::repeat(Complex64::new(chip as f64, 0.0)).take(per_chip))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sizes_follow_sample_rate_times_duration() {
        assert_eq!(pulse(1e-6, 10e6).unwrap().len(), 10);
        assert_eq!(chirp(-5e6, 5e6, 10e-6, 20e6).unwrap().len(), 200);
        assert_eq!(phase_coded(13, 1e-6, 4e6).unwrap().len(), 52);
    }

    #[test]
    fn barker_table_is_complete() {
        for length in [2, 3, 4, 5, 7, 11, 13] {
            let code = barker_code(length).unwrap();
            assert_eq!(code.len(), length);
            // aperiodic autocorrelation sidelobes never exceed one
            for lag in 1..length {
                let sidelobe: i32 = (0..length - lag)
                    .map(|i| code[i] as i32 * code[i + lag] as i32)
                    .sum();
                assert!(sidelobe.abs() <= 1);
            }
        }
    }

    #[test]
    fn unsupported_code_lengths_fail() {
        for length in [0, 1, 6, 8, 12, 14] {
            assert_eq!(barker_code(length), Err(RadarError::UnsupportedCodeLength(length)));
        }
        assert!(matches!(
            Waveform::generate(&WaveformKind::Barker { length: 9, chip_width: 1e-6 }, 1e6),
            Err(RadarError::UnsupportedCodeLength(9))
        ));
    }

    #[test]
    fn chirp_has_unit_envelope_and_sweeps() {
        let samples = chirp(0.0, 1e6, 100e-6, 10e6).unwrap();
        for s in &samples {
            assert_abs_diff_eq!(s.norm(), 1.0, epsilon = 1e-12);
        }
        let early = (samples[2] * samples[1].conj()).arg().abs();
        let late = (samples[900] * samples[899].conj()).arg().abs();
        assert!(late > early);
    }

    #[test]
    fn energy_of_barker_waveform_counts_samples() {
        let waveform = Waveform::generate(&WaveformKind::default(), 2e6).unwrap();
        assert_eq!(waveform.len(), 26);
        assert_abs_diff_eq!(waveform.energy(), 26.0, epsilon = 1e-12);
    }

    #[test]
    fn non_physical_requests_fail() {
        assert!(pulse(0.0, 1e6).is_err());
        assert!(pulse(1e-6, -1.0).is_err());
        assert!(pulse(1e-9, 1e6).is_err());
    }
}
